//! Mailbox access: IMAP polling for inbound, SMTP via lettre for outbound.

pub mod fetcher;
pub mod message;
pub mod sender;

pub use fetcher::{ImapFetcher, MailFetcher};
pub use message::{AudioAttachment, MessageBody, MessageUid, RawMessage};
pub use sender::{MailSender, SmtpSender};

use secrecy::SecretString;

use crate::error::ConfigError;

/// Mail server configuration.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Build from a variable lookup. Blank values count as unset. IMAP host,
    /// username and password are required; the SMTP host defaults to the
    /// IMAP host with `imap` replaced by `smtp`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| get(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));
        let port = |key: &str, default: u16| -> Result<u16, ConfigError> {
            match get(key) {
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("'{raw}' is not a port number"),
                }),
                None => Ok(default),
            }
        };

        let imap_host = required("EMAIL_IMAP_HOST")?;
        let imap_port = port("EMAIL_IMAP_PORT", 993)?;
        let smtp_host = get("EMAIL_SMTP_HOST").unwrap_or_else(|| imap_host.replace("imap", "smtp"));
        let smtp_port = port("EMAIL_SMTP_PORT", 587)?;
        let username = required("EMAIL_USERNAME")?;
        let password = SecretString::from(required("EMAIL_PASSWORD")?);
        let from_address = get("EMAIL_FROM").unwrap_or_else(|| username.clone());

        Ok(Self {
            imap_host,
            imap_port,
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_follow_imap_host() {
        let config = EmailConfig::from_lookup(lookup(&[
            ("EMAIL_IMAP_HOST", "imap.shop.example"),
            ("EMAIL_USERNAME", "desk@shop.example"),
            ("EMAIL_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_host, "smtp.shop.example");
        assert_eq!(config.smtp_port, 587);
        assert_eq!(config.from_address, "desk@shop.example");
        assert_eq!(config.password.expose_secret(), "secret");
    }

    #[test]
    fn missing_password_is_reported() {
        let err = EmailConfig::from_lookup(lookup(&[
            ("EMAIL_IMAP_HOST", "imap.shop.example"),
            ("EMAIL_USERNAME", "desk@shop.example"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(k) if k == "EMAIL_PASSWORD"));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = EmailConfig::from_lookup(lookup(&[
            ("EMAIL_IMAP_HOST", "imap.shop.example"),
            ("EMAIL_IMAP_PORT", ""),
            ("EMAIL_SMTP_HOST", "  "),
            ("EMAIL_FROM", ""),
            ("EMAIL_USERNAME", "desk@shop.example"),
            ("EMAIL_PASSWORD", "secret"),
        ]))
        .unwrap();
        assert_eq!(config.imap_port, 993);
        assert_eq!(config.smtp_host, "smtp.shop.example");
        assert_eq!(config.from_address, "desk@shop.example");
    }

    #[test]
    fn bad_port_is_reported() {
        let err = EmailConfig::from_lookup(lookup(&[
            ("EMAIL_IMAP_HOST", "imap.shop.example"),
            ("EMAIL_IMAP_PORT", "nine"),
            ("EMAIL_USERNAME", "u"),
            ("EMAIL_PASSWORD", "p"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key, .. } if key == "EMAIL_IMAP_PORT"));
    }
}
