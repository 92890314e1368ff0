//! Inbox access over raw IMAP (TLS via rustls).
//!
//! Messages are fetched with `BODY.PEEK[]`, so fetching never sets `\Seen`.
//! The pipeline marks a message read only once it has been dealt with.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;

use crate::error::MailAccessError;
use crate::mail::EmailConfig;
use crate::mail::message::{MessageUid, RawMessage};

/// Upper bound for any single socket read.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of unread customer mail.
#[async_trait]
pub trait MailFetcher: Send + Sync {
    /// All unread messages, oldest first. Does not change any flags.
    async fn fetch_unread(&self) -> Result<Vec<RawMessage>, MailAccessError>;

    /// Set `\Seen` on a handled message.
    async fn mark_read(&self, uid: MessageUid) -> Result<(), MailAccessError>;

    /// Set `\Seen \Flagged` on a message that needs a human.
    async fn flag_for_review(&self, uid: MessageUid) -> Result<(), MailAccessError>;
}

/// IMAP fetcher. Each call opens its own session; IMAP I/O is blocking and
/// runs on the blocking pool.
pub struct ImapFetcher {
    config: EmailConfig,
}

impl ImapFetcher {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    async fn with_session<T, F>(&self, op: F) -> Result<T, MailAccessError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ImapSession<TlsStream>) -> Result<T, MailAccessError> + Send + 'static,
    {
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || {
            let mut session = connect(&config)?;
            let result = op(&mut session);
            if let Err(e) = session.logout() {
                tracing::debug!("IMAP logout failed: {e}");
            }
            result
        })
        .await
        .map_err(|e| MailAccessError::Protocol(format!("IMAP task failed: {e}")))?
    }

    async fn store_flags(&self, uid: MessageUid, flags: &'static str) -> Result<(), MailAccessError> {
        self.with_session(move |session| session.add_flags(uid, flags))
            .await
    }
}

#[async_trait]
impl MailFetcher for ImapFetcher {
    async fn fetch_unread(&self) -> Result<Vec<RawMessage>, MailAccessError> {
        let messages = self
            .with_session(|session| {
                let uids = session.search_unseen()?;
                let mut messages = Vec::with_capacity(uids.len());
                for uid in uids {
                    let raw = session.fetch_peek(uid)?;
                    match RawMessage::parse(uid, &raw) {
                        Some(msg) => messages.push(msg),
                        None => tracing::warn!(%uid, "Skipping unparseable message"),
                    }
                }
                Ok(messages)
            })
            .await?;

        tracing::info!(
            count = messages.len(),
            host = %self.config.imap_host,
            "Fetched unread messages"
        );
        Ok(messages)
    }

    async fn mark_read(&self, uid: MessageUid) -> Result<(), MailAccessError> {
        self.store_flags(uid, "(\\Seen)").await
    }

    async fn flag_for_review(&self, uid: MessageUid) -> Result<(), MailAccessError> {
        self.store_flags(uid, "(\\Seen \\Flagged)").await
    }
}

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Open TCP + TLS, log in and select INBOX.
fn connect(config: &EmailConfig) -> Result<ImapSession<TlsStream>, MailAccessError> {
    let tcp = TcpStream::connect((config.imap_host.as_str(), config.imap_port)).map_err(|e| {
        MailAccessError::Connect {
            host: format!("{}:{}", config.imap_host, config.imap_port),
            reason: e.to_string(),
        }
    })?;
    tcp.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut root_store = rustls::RootCertStore::empty();
    root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    let tls_config = Arc::new(
        rustls::ClientConfig::builder()
            .with_root_certificates(root_store)
            .with_no_client_auth(),
    );
    let server_name = rustls_pki_types::ServerName::try_from(config.imap_host.clone())
        .map_err(|e| MailAccessError::Tls(format!("invalid server name: {e}")))?;
    let conn = rustls::ClientConnection::new(tls_config, server_name)
        .map_err(|e| MailAccessError::Tls(e.to_string()))?;

    let mut session = ImapSession::new(rustls::StreamOwned::new(conn, tcp));
    session.greeting()?;
    session.login(&config.username, config.password.expose_secret())?;
    session.select_inbox()?;
    Ok(session)
}

/// Minimal IMAP4rev1 client: tagged commands, untagged responses and
/// `{N}` literals.
pub(crate) struct ImapSession<S> {
    stream: S,
    next_tag: u32,
}

/// A tagged command's output: untagged lines, literals in order, and the
/// final tagged status line.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
    status: String,
}

impl Response {
    fn is_ok(&self) -> bool {
        self.status
            .split_whitespace()
            .nth(1)
            .is_some_and(|s| s.eq_ignore_ascii_case("OK"))
    }
}

impl<S: Read + Write> ImapSession<S> {
    pub(crate) fn new(stream: S) -> Self {
        Self { stream, next_tag: 1 }
    }

    fn greeting(&mut self) -> Result<(), MailAccessError> {
        let line = self.read_line()?;
        if line.starts_with("* OK") || line.starts_with("* PREAUTH") {
            Ok(())
        } else {
            Err(MailAccessError::Protocol(format!(
                "unexpected greeting: {}",
                line.trim_end()
            )))
        }
    }

    fn login(&mut self, user: &str, password: &str) -> Result<(), MailAccessError> {
        let resp = self.command(&format!("LOGIN {} {}", quote(user), quote(password)))?;
        if resp.is_ok() {
            Ok(())
        } else {
            Err(MailAccessError::AuthFailed {
                user: user.to_string(),
            })
        }
    }

    fn select_inbox(&mut self) -> Result<(), MailAccessError> {
        self.expect_ok("SELECT \"INBOX\"")?;
        Ok(())
    }

    pub(crate) fn search_unseen(&mut self) -> Result<Vec<MessageUid>, MailAccessError> {
        let resp = self.expect_ok("UID SEARCH UNSEEN")?;
        let mut uids: Vec<MessageUid> = resp
            .lines
            .iter()
            .filter_map(|line| line.strip_prefix("* SEARCH"))
            .flat_map(|rest| rest.split_whitespace())
            .filter_map(|n| n.parse().ok().map(MessageUid))
            .collect();
        uids.sort();
        Ok(uids)
    }

    pub(crate) fn fetch_peek(&mut self, uid: MessageUid) -> Result<Vec<u8>, MailAccessError> {
        let mut resp = self.expect_ok(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        if resp.literals.is_empty() {
            return Err(MailAccessError::Protocol(format!(
                "no message body returned for UID {uid}"
            )));
        }
        Ok(resp.literals.swap_remove(0))
    }

    pub(crate) fn add_flags(&mut self, uid: MessageUid, flags: &str) -> Result<(), MailAccessError> {
        self.expect_ok(&format!("UID STORE {uid} +FLAGS {flags}"))?;
        tracing::debug!(%uid, flags, "IMAP flags set");
        Ok(())
    }

    fn logout(&mut self) -> Result<(), MailAccessError> {
        self.command("LOGOUT").map(|_| ())
    }

    fn expect_ok(&mut self, cmd: &str) -> Result<Response, MailAccessError> {
        let resp = self.command(cmd)?;
        if resp.is_ok() {
            Ok(resp)
        } else {
            let verb = cmd.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
            Err(MailAccessError::Protocol(format!(
                "{verb} failed: {}",
                resp.status.trim_end()
            )))
        }
    }

    fn command(&mut self, cmd: &str) -> Result<Response, MailAccessError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        self.stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        self.stream.flush()?;

        let mut resp = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(len) = literal_length(&line) {
                let mut literal = vec![0u8; len];
                self.stream.read_exact(&mut literal)?;
                resp.literals.push(literal);
                resp.lines.push(line);
                continue;
            }
            if line.starts_with(&format!("{tag} ")) {
                resp.status = line;
                return Ok(resp);
            }
            resp.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailAccessError> {
        let mut buf = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match self.stream.read(&mut byte)? {
                0 => return Err(MailAccessError::Protocol("IMAP connection closed".into())),
                _ => {
                    buf.push(byte[0]);
                    if buf.ends_with(b"\r\n") {
                        return Ok(String::from_utf8_lossy(&buf).into_owned());
                    }
                }
            }
        }
    }
}

/// Size of a `{N}` literal announced at the end of a response line.
fn literal_length(line: &str) -> Option<usize> {
    let trimmed = line.trim_end_matches("\r\n");
    let open = trimmed.strip_suffix('}')?.rfind('{')?;
    trimmed[open + 1..trimmed.len() - 1].parse().ok()
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}
