use serde::{Deserialize, Serialize};

/// Time-in-force instructions for order validity
///
/// GTD carries its expiry separately on the order (tag 126), so the variant
/// itself is a plain code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeInForce {
    /// Good Till Canceled: order remains active until explicitly canceled
    #[default]
    GTC,

    /// Immediate or Cancel: execute immediately (partially or fully) and cancel unfilled portion
    IOC,

    /// Good Till Date: order remains active until the expire time
    GTD,
}

impl TimeInForce {
    /// Wire value of tag 59
    pub fn code(&self) -> &'static str {
        match self {
            TimeInForce::GTC => "1",
            TimeInForce::IOC => "3",
            TimeInForce::GTD => "6",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(TimeInForce::GTC),
            "3" => Some(TimeInForce::IOC),
            "6" => Some(TimeInForce::GTD),
            _ => None,
        }
    }

    pub fn requires_expire_time(&self) -> bool {
        matches!(self, TimeInForce::GTD)
    }
}
