use serde::{Deserialize, Serialize};

/// Order reject reason (tag 103)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderRejectReason {
    BrokerOption,
    UnknownSymbol,
    OrderExceedsLimit,
    TooLateToEnter,
    UnknownOrder,
    DuplicateOrder,
    StaleOrder,
    IncorrectQuantity,
    UnknownAccount,
    PriceExceedsBand,
    InvalidPriceIncrement,
    Throttled,
    Other(String),
}

impl OrderRejectReason {
    pub fn from_code(code: &str) -> Self {
        match code {
            "0" => OrderRejectReason::BrokerOption,
            "1" => OrderRejectReason::UnknownSymbol,
            "3" => OrderRejectReason::OrderExceedsLimit,
            "4" => OrderRejectReason::TooLateToEnter,
            "5" => OrderRejectReason::UnknownOrder,
            "6" => OrderRejectReason::DuplicateOrder,
            "11" => OrderRejectReason::StaleOrder,
            "13" => OrderRejectReason::IncorrectQuantity,
            "16" => OrderRejectReason::UnknownAccount,
            "17" => OrderRejectReason::PriceExceedsBand,
            "18" => OrderRejectReason::InvalidPriceIncrement,
            "99" => OrderRejectReason::Throttled,
            other => OrderRejectReason::Other(other.to_string()),
        }
    }
}

/// Stable reject classification surfaced to callers
///
/// Collapses the venue's per-message reject tables (market data 281,
/// order 103, cancel 102, business 380) into the handful of cases callers
/// act on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RejectReason {
    UnknownSymbol,
    UnsupportedDepth,
    Throttled,
    UnknownOrder,
    InvalidCredentials,
    Other(String),
}

impl RejectReason {
    /// Market data request reject reason (tag 281)
    pub fn from_market_data_code(code: &str) -> Self {
        match code {
            "0" => RejectReason::UnknownSymbol,
            "5" => RejectReason::UnsupportedDepth,
            "D" => RejectReason::Throttled,
            other => RejectReason::Other(other.to_string()),
        }
    }

    /// Order reject reason (tag 103) or cancel reject reason (tag 102)
    pub fn from_order_reject(reason: &OrderRejectReason) -> Self {
        match reason {
            OrderRejectReason::UnknownSymbol => RejectReason::UnknownSymbol,
            OrderRejectReason::UnknownOrder => RejectReason::UnknownOrder,
            OrderRejectReason::Throttled => RejectReason::Throttled,
            other => RejectReason::Other(format!("{other:?}")),
        }
    }

    /// Business message reject reason (tag 380)
    pub fn from_business_code(code: &str) -> Self {
        match code {
            "2" => RejectReason::UnknownSymbol,
            other => RejectReason::Other(other.to_string()),
        }
    }

    pub fn description(&self) -> &str {
        match self {
            RejectReason::UnknownSymbol => "Unknown symbol",
            RejectReason::UnsupportedDepth => "Unsupported market depth",
            RejectReason::Throttled => "Throttling",
            RejectReason::UnknownOrder => "Unknown order",
            RejectReason::InvalidCredentials => "Invalid credentials",
            RejectReason::Other(code) => code,
        }
    }
}
