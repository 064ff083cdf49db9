use serde::{Deserialize, Serialize};
use std::fmt;

/// Venue endpoint class a session is opened against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionClass {
    /// Quotes, reference data, history
    Feed,
    /// Orders and account
    Trade,
}

impl ConnectionClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionClass::Feed => "feed",
            ConnectionClass::Trade => "trade",
        }
    }
}

impl fmt::Display for ConnectionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
