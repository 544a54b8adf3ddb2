use serde::{Deserialize, Serialize};
use std::fmt;

/// Peer-to-peer payment apps whose notification emails are recognised.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Venmo,
    PayPal,
    CashApp,
    Zelle,
}

impl Provider {
    pub const ALL: [Provider; 4] = [
        Provider::Venmo,
        Provider::PayPal,
        Provider::CashApp,
        Provider::Zelle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Venmo => "venmo",
            Provider::PayPal => "paypal",
            Provider::CashApp => "cashapp",
            Provider::Zelle => "zelle",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
