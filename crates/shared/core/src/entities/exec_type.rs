use serde::{Deserialize, Serialize};

/// Execution report type (tag 150)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecType {
    New,
    Canceled,
    Replaced,
    PendingCancel,
    Rejected,
    Calculated,
    Expired,
    PendingReplace,
    Trade,
    OrderStatus,
    PendingClose,
}

impl ExecType {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "0" => ExecType::New,
            "4" => ExecType::Canceled,
            "5" => ExecType::Replaced,
            "6" => ExecType::PendingCancel,
            "8" => ExecType::Rejected,
            "B" => ExecType::Calculated,
            "C" => ExecType::Expired,
            "E" => ExecType::PendingReplace,
            "F" => ExecType::Trade,
            "I" => ExecType::OrderStatus,
            "J" => ExecType::PendingClose,
            _ => return None,
        })
    }

    /// Acknowledgement of a request the venue has not finished applying
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            ExecType::PendingCancel | ExecType::PendingReplace | ExecType::PendingClose
        )
    }
}
