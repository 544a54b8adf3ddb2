use crate::domain::order::PaymentStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    /// Mailbox connect, authentication, IO or timeout failure. Aborts the current cycle.
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Order not found: {0}")]
    OrderNotFound(String),
    #[error("Order {reference} is {status}, not awaiting payment")]
    OrderNotAwaiting {
        reference: String,
        status: PaymentStatus,
    },
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Notification error: {0}")]
    Notification(String),
    #[error("Encoding error: {0}")]
    Encoding(String),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PaymentError {
    /// Transport failures abort the remainder of a cycle; everything else is per-item.
    pub fn is_transport(&self) -> bool {
        matches!(self, PaymentError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;
