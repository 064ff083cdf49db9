//! Topic naming for the order book fan-out

/// Logical topic names
///
/// Topics are per symbol so that subscribers of one instrument never see
/// another's traffic, and so the names carry over unchanged if publication
/// ever moves to an external bus.
pub struct Topics;

impl Topics {
    const ORDER_BOOK_PREFIX: &'static str = "orderbook.";

    /// Order book updates for a symbol: `orderbook.EURUSD`
    pub fn order_book(symbol: &str) -> String {
        format!("{}{}", Self::ORDER_BOOK_PREFIX, symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topics() {
        assert_eq!(Topics::order_book("EURUSD"), "orderbook.EURUSD");
    }
}
