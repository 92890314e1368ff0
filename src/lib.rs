//! Complaint Desk: reads customer complaints from a mailbox, applies refund
//! policy, answers by email and records every case in a CRM table.

pub mod complaint;
pub mod config;
pub mod crm;
pub mod error;
pub mod llm;
pub mod mail;
pub mod pipeline;
pub mod transcribe;
