//! IMAP mailbox over TLS, spoken directly with rustls.
//!
//! Each call opens its own session: connect, LOGIN, SELECT, work, LOGOUT.
//! Messages are fetched with `BODY.PEEK[]` so reading never sets `\Seen`;
//! acknowledgement is a separate batch of `UID STORE`s on one session.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use mail_parser::MessageParser;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::MailboxError;
use crate::html::strip_html;
use crate::mailbox::{InboundMail, Mailbox, MessageId};

const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// IMAP connection settings.
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub mailbox: String,
}

/// [`Mailbox`] backed by an IMAP server.
pub struct ImapMailbox {
    config: Arc<ImapConfig>,
}

impl ImapMailbox {
    pub fn new(config: ImapConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn fetch_unseen(&self) -> Result<Vec<InboundMail>, MailboxError> {
        let config = Arc::clone(&self.config);
        tokio::task::spawn_blocking(move || fetch_unseen_blocking(&config))
            .await
            .map_err(|e| MailboxError::Task(e.to_string()))?
    }

    async fn mark_read(&self, id: &MessageId) -> Result<(), MailboxError> {
        self.mark_read_all(std::slice::from_ref(id))
            .await
            .pop()
            .unwrap_or(Ok(()))
    }

    /// All acknowledgements share one session.
    async fn mark_read_all(&self, ids: &[MessageId]) -> Vec<Result<(), MailboxError>> {
        if ids.is_empty() {
            return Vec::new();
        }
        let config = Arc::clone(&self.config);
        let uids: Vec<String> = ids.iter().map(|id| id.0.clone()).collect();
        let count = uids.len();
        match tokio::task::spawn_blocking(move || mark_read_blocking(&config, &uids)).await {
            Ok(results) => results,
            Err(e) => {
                let reason = e.to_string();
                (0..count).map(|_| Err(MailboxError::Task(reason.clone()))).collect()
            }
        }
    }
}

fn fetch_unseen_blocking(config: &ImapConfig) -> Result<Vec<InboundMail>, MailboxError> {
    let mut session = ImapSession::open(config)?;

    let uids = session.uid_search_unseen()?;
    if uids.is_empty() {
        info!("No new unread emails found");
    } else {
        info!(count = uids.len(), "Found unread email(s) to process");
    }

    let mut messages = Vec::with_capacity(uids.len());
    for uid in uids {
        let raw = session.uid_fetch_peek(&uid)?;
        let Some(parsed) = MessageParser::default().parse(raw.as_slice()) else {
            warn!(uid = %uid, "Could not parse message, using raw bytes");
            messages.push(InboundMail {
                id: MessageId(uid),
                subject: String::new(),
                body: String::from_utf8_lossy(&raw).into_owned(),
            });
            continue;
        };
        messages.push(InboundMail {
            id: MessageId(uid),
            subject: parsed.subject().unwrap_or_default().to_string(),
            body: message_text(&parsed),
        });
    }

    session.logout();
    Ok(messages)
}

/// One login for the whole batch. If the session cannot be opened every
/// uid fails with the same reason.
fn mark_read_blocking(config: &ImapConfig, uids: &[String]) -> Vec<Result<(), MailboxError>> {
    let mut session = match ImapSession::open(config) {
        Ok(session) => session,
        Err(e) => {
            let reason = e.to_string();
            return uids
                .iter()
                .map(|_| Err(MailboxError::Connection(reason.clone())))
                .collect();
        }
    };

    let results: Vec<_> = uids
        .iter()
        .map(|uid| -> Result<(), MailboxError> {
            session.uid_store_seen(uid)?;
            debug!(uid = %uid, "Marked message as read");
            Ok(())
        })
        .collect();
    session.logout();
    results
}

// ── Message text ────────────────────────────────────────────────────

/// All readable text of a message: every text part, plus every HTML part
/// with tags stripped.
pub fn message_text(parsed: &mail_parser::Message) -> String {
    let mut content = String::new();
    for part in parsed.text_bodies() {
        if let Some(text) = part.text_contents() {
            content.push_str(text);
            content.push('\n');
        }
    }
    for part in parsed.html_bodies() {
        if let Some(html) = part.text_contents() {
            content.push_str(&strip_html(html));
            content.push('\n');
        }
    }
    content
}

// ── Session ─────────────────────────────────────────────────────────

type TlsStream = rustls::StreamOwned<rustls::ClientConnection, TcpStream>;

/// Tagged response to one command.
#[derive(Debug, Default)]
struct Response {
    lines: Vec<String>,
    literals: Vec<Vec<u8>>,
}

struct ImapSession {
    stream: BufReader<TlsStream>,
    next_tag: u32,
}

impl ImapSession {
    /// Connect, read the greeting, LOGIN and SELECT.
    fn open(config: &ImapConfig) -> Result<Self, MailboxError> {
        let tcp = TcpStream::connect((config.host.as_str(), config.port))
            .map_err(|e| MailboxError::Connection(format!("{}:{}: {e}", config.host, config.port)))?;
        tcp.set_read_timeout(Some(READ_TIMEOUT))?;
        tcp.set_write_timeout(Some(READ_TIMEOUT))?;

        let mut root_store = rustls::RootCertStore::empty();
        root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let tls_config = Arc::new(
            rustls::ClientConfig::builder()
                .with_root_certificates(root_store)
                .with_no_client_auth(),
        );
        let server_name = rustls_pki_types::ServerName::try_from(config.host.clone())
            .map_err(|e| MailboxError::Connection(format!("invalid server name: {e}")))?;
        let conn = rustls::ClientConnection::new(tls_config, server_name)
            .map_err(|e| MailboxError::Connection(format!("TLS setup failed: {e}")))?;

        let mut session = Self {
            stream: BufReader::new(rustls::StreamOwned::new(conn, tcp)),
            next_tag: 1,
        };

        let greeting = session.read_line()?;
        if !greeting.starts_with("* OK") && !greeting.starts_with("* PREAUTH") {
            return Err(MailboxError::Connection(format!(
                "unexpected greeting: {}",
                greeting.trim_end()
            )));
        }

        let login = format!(
            "LOGIN {} {}",
            quote(&config.username),
            quote(config.password.expose_secret())
        );
        session
            .command(&login)
            .map_err(|_| MailboxError::AuthFailed {
                user: config.username.clone(),
            })?;

        session.command(&format!("SELECT {}", quote(&config.mailbox)))?;
        Ok(session)
    }

    fn uid_search_unseen(&mut self) -> Result<Vec<String>, MailboxError> {
        let resp = self.command("UID SEARCH UNSEEN")?;
        Ok(parse_search(&resp.lines))
    }

    /// Full RFC 822 message, without setting `\Seen`.
    fn uid_fetch_peek(&mut self, uid: &str) -> Result<Vec<u8>, MailboxError> {
        let resp = self.command(&format!("UID FETCH {uid} BODY.PEEK[]"))?;
        resp.literals
            .into_iter()
            .next()
            .ok_or_else(|| MailboxError::Command {
                command: format!("UID FETCH {uid}"),
                response: "no message body returned".into(),
            })
    }

    fn uid_store_seen(&mut self, uid: &str) -> Result<(), MailboxError> {
        self.command(&format!("UID STORE {uid} +FLAGS.SILENT (\\Seen)"))?;
        Ok(())
    }

    /// Best effort; the session is dropped either way.
    fn logout(mut self) {
        let _ = self.command("LOGOUT");
    }

    /// Send one command and collect its untagged lines and literals up to
    /// the tagged completion. Anything but `OK` is an error.
    fn command(&mut self, cmd: &str) -> Result<Response, MailboxError> {
        let tag = format!("A{}", self.next_tag);
        self.next_tag += 1;

        let stream = self.stream.get_mut();
        stream.write_all(format!("{tag} {cmd}\r\n").as_bytes())?;
        stream.flush()?;

        let verb = cmd.split_whitespace().take(2).collect::<Vec<_>>().join(" ");
        let mut resp = Response::default();
        loop {
            let line = self.read_line()?;
            if let Some(size) = literal_size(&line) {
                let mut literal = vec![0u8; size];
                self.stream.read_exact(&mut literal)?;
                resp.literals.push(literal);
            }
            if let Some(status) = line.strip_prefix(&format!("{tag} ")) {
                if status.starts_with("OK") {
                    return Ok(resp);
                }
                return Err(MailboxError::Command {
                    command: verb,
                    response: status.trim_end().to_string(),
                });
            }
            resp.lines.push(line);
        }
    }

    fn read_line(&mut self) -> Result<String, MailboxError> {
        let mut buf = Vec::new();
        let n = self.stream.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Err(MailboxError::Connection("IMAP connection closed".into()));
        }
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }
}

/// IMAP quoted string.
fn quote(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

/// `{123}` at the end of a response line announces a literal of 123 bytes.
fn literal_size(line: &str) -> Option<usize> {
    let line = line.trim_end_matches(['\r', '\n']);
    let inner = line.strip_suffix('}')?;
    let open = inner.rfind('{')?;
    inner[open + 1..].parse().ok()
}

/// UIDs from `* SEARCH ...` lines.
fn parse_search(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .filter_map(|l| l.strip_prefix("* SEARCH"))
        .flat_map(|rest| rest.split_whitespace())
        .filter(|uid| uid.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_size_parses_trailing_braces() {
        assert_eq!(literal_size("* 1 FETCH (UID 7 BODY[] {342}\r\n"), Some(342));
        assert_eq!(literal_size("* 1 FETCH (UID 7 FLAGS (\\Seen))\r\n"), None);
        assert_eq!(literal_size("A4 OK done\r\n"), None);
    }

    #[test]
    fn search_parses_uids() {
        let lines = vec!["* SEARCH 4 9 12\r\n".to_string()];
        assert_eq!(parse_search(&lines), vec!["4", "9", "12"]);
    }

    #[test]
    fn search_empty() {
        let lines = vec!["* SEARCH\r\n".to_string()];
        assert!(parse_search(&lines).is_empty());
        assert!(parse_search(&[]).is_empty());
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(quote("plain"), "\"plain\"");
        assert_eq!(quote("p\"w\\d"), "\"p\\\"w\\\\d\"");
    }

    #[test]
    fn message_text_reads_plain_part() {
        let raw = b"From: Blue Dart <noreply@bluedart.com>\r\n\
To: me@example.com\r\n\
Subject: Shipment booked\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Your shipment 40512233198 has been picked up\r\n";
        let parsed = MessageParser::default().parse(&raw[..]).unwrap();
        assert_eq!(parsed.subject(), Some("Shipment booked"));
        assert!(message_text(&parsed).contains("40512233198"));
    }

    #[test]
    fn message_text_reads_html_only_message() {
        let raw = b"From: shop@example.com\r\n\
Subject: Order dispatched\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<html><body><p>Waybill <b>77788899900</b></p></body></html>\r\n";
        let parsed = MessageParser::default().parse(&raw[..]).unwrap();
        assert!(message_text(&parsed).contains("77788899900"));
    }
}
