//! Typed views of application messages
//!
//! Outbound requests render to field lists; inbound messages parse from a
//! decoded [`ProtocolMessage`](crate::codec::ProtocolMessage). Prices and
//! sizes are `rust_decimal::Decimal`.

pub mod account;
pub mod market_data;
pub mod order;
pub mod reference;

pub use account::AccountInfo;
pub use market_data::{
    BookLevel, EntryType, MarketDataEntry, MarketDataMessage, OrderBookSnapshot, PriceSource,
    UpdateAction,
};
pub use order::{CancelOrder, ExecutionReport, MassStatusRequest, NewOrder, ReplaceOrder};
pub use reference::{HistoryBar, HistoryRequest, MarketHistory, SecurityInfo, SecurityList};

use rust_decimal::Decimal;

/// Numeric field value; the venue sends `N`/`NULL`/empty for "no value"
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("N") || value.eq_ignore_ascii_case("NULL")
    {
        return None;
    }
    value.parse().ok()
}
