use super::provider::Provider;
use serde::{Deserialize, Serialize};

/// A provider deep-link carrying the amount and order note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub provider: Provider,
    pub uri: String,
}

/// A scannable rendering of one `PaymentLink`, as a `data:image/png;base64,` URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QrEncoding {
    pub provider: Provider,
    pub data_uri: String,
}
