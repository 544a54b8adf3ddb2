use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One mailbox message, normalized by the mailbox adapter.
///
/// `id` is the adapter's handle (an IMAP UID, or a synthetic id in memory) used for
/// `mark_read`/`move_to`; `message_id` is the RFC 5322 `Message-ID` header when present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailMessage {
    pub id: String,
    /// Display form of the `From` header, e.g. `Venmo <venmo@venmo.com>`.
    pub from: String,
    pub from_address: String,
    pub subject: String,
    pub date: Option<DateTime<Utc>>,
    pub text: Option<String>,
    pub html: Option<String>,
    pub message_id: Option<String>,
}

impl MailMessage {
    /// Domain part of the sender address, lower-cased.
    pub fn sender_domain(&self) -> Option<String> {
        self.from_address
            .rsplit_once('@')
            .map(|(_, domain)| domain.trim().trim_end_matches('>').to_ascii_lowercase())
    }
}
