use serde::{Deserialize, Serialize};

/// Order lifecycle status as reported in tag 39
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Order has been accepted but not yet filled
    New,
    /// Order has been partially filled
    PartiallyFilled,
    /// Order has been completely filled
    Filled,
    /// Done for the day
    Done,
    /// Order has been canceled
    Canceled,
    /// Cancel request accepted, not yet applied
    PendingCancel,
    /// Order was rejected by the venue
    Rejected,
    /// Calculated
    Calculated,
    /// Order has expired (GTD)
    Expired,
    /// Replace request accepted, not yet applied
    PendingReplace,
    /// Position close pending
    PendingClose,
    /// Submitted, not yet acknowledged
    PendingNew,
}

impl OrderStatus {
    pub fn from_code(code: &str) -> Option<Self> {
        Some(match code {
            "0" => OrderStatus::New,
            "1" => OrderStatus::PartiallyFilled,
            "2" => OrderStatus::Filled,
            "3" => OrderStatus::Done,
            "4" => OrderStatus::Canceled,
            "6" => OrderStatus::PendingCancel,
            "8" => OrderStatus::Rejected,
            "A" => OrderStatus::PendingNew,
            "B" => OrderStatus::Calculated,
            "C" => OrderStatus::Expired,
            "E" => OrderStatus::PendingReplace,
            "F" => OrderStatus::PendingClose,
            _ => return None,
        })
    }

    pub fn code(&self) -> &'static str {
        match self {
            OrderStatus::New => "0",
            OrderStatus::PartiallyFilled => "1",
            OrderStatus::Filled => "2",
            OrderStatus::Done => "3",
            OrderStatus::Canceled => "4",
            OrderStatus::PendingCancel => "6",
            OrderStatus::Rejected => "8",
            OrderStatus::PendingNew => "A",
            OrderStatus::Calculated => "B",
            OrderStatus::Expired => "C",
            OrderStatus::PendingReplace => "E",
            OrderStatus::PendingClose => "F",
        }
    }

    /// Returns true if the order is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Done
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }

    /// Returns true if the order is still working on the book
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            OrderStatus::New | OrderStatus::PartiallyFilled | OrderStatus::Calculated
        )
    }

    /// Returns true while the venue has an acknowledgement outstanding
    pub fn is_pending(&self) -> bool {
        matches!(
            self,
            OrderStatus::PendingNew
                | OrderStatus::PendingCancel
                | OrderStatus::PendingReplace
                | OrderStatus::PendingClose
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_classification() {
        for code in ["2", "3", "4", "8", "C"] {
            let status = OrderStatus::from_code(code).unwrap();
            assert!(status.is_terminal(), "{code} should be terminal");
        }
        for code in ["0", "1", "6", "A", "E", "F"] {
            let status = OrderStatus::from_code(code).unwrap();
            assert!(!status.is_terminal(), "{code} should not be terminal");
        }
    }

    #[test]
    fn test_pending_states() {
        assert!(OrderStatus::PendingCancel.is_pending());
        assert!(OrderStatus::PendingReplace.is_pending());
        assert!(!OrderStatus::New.is_pending());
        assert_eq!(OrderStatus::from_code("Z"), None);
    }

    #[test]
    fn test_code_round_trip() {
        for code in ["0", "1", "2", "3", "4", "6", "8", "A", "B", "C", "E", "F"] {
            assert_eq!(OrderStatus::from_code(code).unwrap().code(), code);
        }
    }
}
