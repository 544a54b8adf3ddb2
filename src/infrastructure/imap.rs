//! IMAP mailbox over TLS. Enabled with the `mailbox-imap` feature.
//!
//! The `imap` crate is blocking, so every session call runs on the blocking pool with the
//! session moved in and back out. A call abandoned by the caller's timeout takes the
//! session with it; the next `connect` opens a fresh one.

use crate::domain::message::MailMessage;
use crate::domain::ports::{Mailbox, MailboxConfigSource, SecretCipher};
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use chrono::DateTime;
use mailparse::{MailHeaderMap, ParsedMail};
use secrecy::ExposeSecret;
use std::net::TcpStream;
use std::sync::Arc;
use tracing::{debug, warn};

type ImapSession = imap::Session<native_tls::TlsStream<TcpStream>>;

pub struct ImapMailbox {
    config: Arc<dyn MailboxConfigSource>,
    cipher: Arc<dyn SecretCipher>,
    session: Option<ImapSession>,
}

impl ImapMailbox {
    /// Creates a new, disconnected mailbox. Configuration is read on each `connect`.
    pub fn new(config: Arc<dyn MailboxConfigSource>, cipher: Arc<dyn SecretCipher>) -> Self {
        Self {
            config,
            cipher,
            session: None,
        }
    }

    async fn with_session<T, F>(&mut self, op: F) -> Result<T>
    where
        F: FnOnce(&mut ImapSession) -> imap::error::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let mut session = self
            .session
            .take()
            .ok_or_else(|| PaymentError::Transport("mailbox not connected".into()))?;
        let (session, result) = tokio::task::spawn_blocking(move || {
            let result = op(&mut session);
            (session, result)
        })
        .await
        .map_err(|e| PaymentError::Transport(format!("imap worker failed: {e}")))?;
        self.session = Some(session);
        result.map_err(|e| PaymentError::Transport(e.to_string()))
    }

    async fn fetch(&mut self, mut uids: Vec<u32>) -> Result<Vec<MailMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        uids.sort_unstable();
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let raw: Vec<(u32, Vec<u8>)> = self
            .with_session(move |s| {
                let fetches = s.uid_fetch(&set, "(UID BODY.PEEK[])")?;
                Ok(fetches
                    .iter()
                    .filter_map(|f| Some((f.uid?, f.body()?.to_vec())))
                    .collect())
            })
            .await?;

        let mut messages = Vec::with_capacity(raw.len());
        for (uid, body) in raw {
            match normalize(uid, &body) {
                Ok(message) => messages.push(message),
                Err(e) => warn!(uid, error = %e, "skipping unparseable message"),
            }
        }
        messages.sort_by_key(|m| m.id.parse::<u32>().unwrap_or(u32::MAX));
        Ok(messages)
    }
}

#[async_trait]
impl Mailbox for ImapMailbox {
    async fn connect(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        let settings = self.config.mailbox_settings().await?;
        let password = self.cipher.decrypt(&settings.encrypted_secret)?;

        let session = tokio::task::spawn_blocking(move || -> Result<ImapSession> {
            let tls = native_tls::TlsConnector::builder()
                .build()
                .map_err(|e| PaymentError::Transport(format!("tls setup failed: {e}")))?;
            let client = imap::connect(
                (settings.host.as_str(), settings.port),
                settings.host.as_str(),
                &tls,
            )
            .map_err(|e| PaymentError::Transport(format!("connect failed: {e}")))?;
            let mut session = client
                .login(&settings.account, password.expose_secret())
                .map_err(|(e, _)| PaymentError::Transport(format!("login failed: {e}")))?;
            session
                .select(&settings.folder)
                .map_err(|e| PaymentError::Transport(format!("select failed: {e}")))?;
            Ok(session)
        })
        .await
        .map_err(|e| PaymentError::Transport(format!("imap worker failed: {e}")))??;

        debug!("mailbox session opened");
        self.session = Some(session);
        Ok(())
    }

    async fn list_unseen(&mut self) -> Result<Vec<MailMessage>> {
        let uids: Vec<u32> = self
            .with_session(|s| s.uid_search("UNSEEN").map(|set| set.into_iter().collect()))
            .await?;
        self.fetch(uids).await
    }

    async fn search(&mut self, text: &str) -> Result<Vec<MailMessage>> {
        let query = format!("TEXT \"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""));
        let uids: Vec<u32> = self
            .with_session(move |s| s.uid_search(&query).map(|set| set.into_iter().collect()))
            .await?;
        self.fetch(uids).await
    }

    async fn mark_read(&mut self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.with_session(move |s| s.uid_store(&id, "+FLAGS (\\Seen)").map(|_| ()))
            .await
    }

    async fn move_to(&mut self, id: &str, folder: &str) -> Result<()> {
        let id = id.to_string();
        let folder = folder.to_string();
        self.with_session(move |s| s.uid_mv(&id, &folder)).await
    }

    async fn disconnect(&mut self) -> Result<()> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };
        tokio::task::spawn_blocking(move || session.logout())
            .await
            .map_err(|e| PaymentError::Transport(format!("imap worker failed: {e}")))?
            .map_err(|e| PaymentError::Transport(format!("logout failed: {e}")))
    }
}

/// Normalizes an RFC 5322 message into a `MailMessage` keyed by its UID.
pub fn normalize(uid: u32, raw: &[u8]) -> Result<MailMessage> {
    let parsed = mailparse::parse_mail(raw)
        .map_err(|e| PaymentError::Validation(format!("malformed message: {e}")))?;
    let headers = parsed.get_headers();

    let from = headers.get_first_value("From").unwrap_or_default();
    let from_address = mailparse::addrparse(&from)
        .ok()
        .and_then(|list| list.extract_single_info())
        .map(|info| info.addr)
        .unwrap_or_else(|| from.clone());
    let date = headers
        .get_first_value("Date")
        .and_then(|d| mailparse::dateparse(&d).ok())
        .and_then(|ts| DateTime::from_timestamp(ts, 0));

    let mut text = None;
    let mut html = None;
    collect_bodies(&parsed, &mut text, &mut html);

    Ok(MailMessage {
        id: uid.to_string(),
        from,
        from_address,
        subject: headers.get_first_value("Subject").unwrap_or_default(),
        date,
        text,
        html,
        message_id: headers.get_first_value("Message-ID"),
    })
}

fn collect_bodies(part: &ParsedMail<'_>, text: &mut Option<String>, html: &mut Option<String>) {
    if part.subparts.is_empty() {
        let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
            "text/plain" => text,
            "text/html" => html,
            _ => return,
        };
        if slot.is_none()
            && let Ok(body) = part.get_body()
        {
            *slot = Some(body);
        }
        return;
    }
    for sub in &part.subparts {
        collect_bodies(sub, text, html);
    }
}
