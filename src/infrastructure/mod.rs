//! Adapters for the domain ports.

pub mod cipher;
#[cfg(feature = "mailbox-imap")]
pub mod imap;
pub mod in_memory;
pub mod json_file;
pub mod notifier;
