use serde::{Deserialize, Serialize};

/// Order types accepted by the venue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    /// Execute at current market price
    Market,
    /// Execute at specified price or better
    Limit,
    /// Market order triggered when price reaches stop price
    Stop,
    /// Limit order triggered when price reaches stop price
    StopLimit,
}

impl OrderType {
    /// Wire value of tag 40
    pub fn code(&self) -> &'static str {
        match self {
            OrderType::Market => "1",
            OrderType::Limit => "2",
            OrderType::Stop => "3",
            OrderType::StopLimit => "4",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "1" => Some(OrderType::Market),
            "2" => Some(OrderType::Limit),
            "3" => Some(OrderType::Stop),
            "4" => Some(OrderType::StopLimit),
            _ => None,
        }
    }

    /// Whether tag 44 must be sent
    pub fn requires_price(&self) -> bool {
        matches!(self, OrderType::Limit | OrderType::StopLimit)
    }

    /// Whether tag 99 must be sent
    pub fn requires_stop_price(&self) -> bool {
        matches!(self, OrderType::Stop | OrderType::StopLimit)
    }
}
