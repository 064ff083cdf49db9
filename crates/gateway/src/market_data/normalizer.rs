//! Snapshot/incremental messages to normalized books
//!
//! One normalizer lives inside each worker, so it is never shared and needs
//! no locking. Books are kept per symbol as level lists: a snapshot keeps
//! every entry it carries, an incremental refresh patches levels by price.
//! Every applied message yields a fresh [`OrderBookSnapshot`].

use std::collections::HashMap;

use chrono::Utc;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::messages::{EntryType, MarketDataMessage, OrderBookSnapshot};

/// How an incremental refresh (`X`) is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncrementalPolicy {
    /// Patch levels by price onto the last book
    #[default]
    Merge,
    /// The message's entries alone form the book
    Rebuild,
}

/// `(price, size)` in arrival order
type Levels = Vec<(Decimal, Option<Decimal>)>;

#[derive(Debug, Default, Clone)]
struct Book {
    bids: Levels,
    asks: Levels,
    last_trade: Option<Decimal>,
}

impl Book {
    fn side(&mut self, entry_type: EntryType) -> Option<&mut Levels> {
        match entry_type {
            EntryType::Bid => Some(&mut self.bids),
            EntryType::Offer => Some(&mut self.asks),
            EntryType::Trade => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct BookNormalizer {
    policy: IncrementalPolicy,
    books: HashMap<String, Book>,
}

impl BookNormalizer {
    pub fn new(policy: IncrementalPolicy) -> Self {
        Self {
            policy,
            books: HashMap::new(),
        }
    }

    pub fn policy(&self) -> IncrementalPolicy {
        self.policy
    }

    /// Fold one message into its symbol's book and return the result
    pub fn apply(&mut self, msg: &MarketDataMessage) -> OrderBookSnapshot {
        let merge = msg.incremental && self.policy == IncrementalPolicy::Merge;
        let book = self.books.entry(msg.symbol.clone()).or_default();
        if !merge {
            // Keep the last trade across rebuilds; quotes are replaced
            let last_trade = book.last_trade;
            *book = Book {
                last_trade,
                ..Book::default()
            };
        }

        for entry in &msg.entries {
            if entry.entry_type == EntryType::Trade {
                book.last_trade = Some(entry.price);
                continue;
            }
            let Some(levels) = book.side(entry.entry_type) else {
                continue;
            };
            if !msg.incremental {
                levels.push((entry.price, entry.size));
            } else if entry.removes_level() {
                levels.retain(|(price, _)| *price != entry.price);
            } else {
                match levels.iter_mut().find(|(price, _)| *price == entry.price) {
                    Some(level) => level.1 = entry.size,
                    None => levels.push((entry.price, entry.size)),
                }
            }
        }

        debug!(
            "{} {} applied: {} bids, {} asks",
            msg.symbol,
            if msg.incremental { "X" } else { "W" },
            book.bids.len(),
            book.asks.len()
        );

        let mut snapshot = OrderBookSnapshot::from_levels(
            msg.symbol.as_str(),
            book.bids.iter().copied(),
            book.asks.iter().copied(),
            book.last_trade,
        );
        snapshot.is_indicative = msg.is_indicative;
        snapshot.md_req_id = msg.md_req_id.clone();
        snapshot.tick_id = msg.tick_id.clone();
        snapshot.orig_time = msg.orig_time.clone();
        snapshot.timestamp = Utc::now();
        snapshot
    }

    /// Forget a symbol's book
    pub fn discard(&mut self, symbol: &str) -> bool {
        self.books.remove(symbol).is_some()
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.books.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MarketDataEntry, UpdateAction};
    use rust_decimal_macros::dec;

    fn entry(entry_type: EntryType, price: Decimal, size: Decimal) -> MarketDataEntry {
        MarketDataEntry {
            entry_type,
            price,
            size: Some(size),
            action: None,
        }
    }

    fn message(incremental: bool, entries: Vec<MarketDataEntry>) -> MarketDataMessage {
        MarketDataMessage {
            incremental,
            symbol: "EURUSD".into(),
            md_req_id: Some("OB_EURUSD_1".into()),
            entries,
            tick_id: None,
            orig_time: None,
            is_indicative: false,
        }
    }

    fn snapshot() -> MarketDataMessage {
        message(
            false,
            vec![
                entry(EntryType::Bid, dec!(1.0850), dec!(1.0)),
                entry(EntryType::Bid, dec!(1.0848), dec!(2.0)),
                entry(EntryType::Offer, dec!(1.0852), dec!(1.5)),
            ],
        )
    }

    #[test]
    fn test_snapshot_builds_book() {
        let mut normalizer = BookNormalizer::default();
        let book = normalizer.apply(&snapshot());

        assert_eq!(book.best_bid, Some(dec!(1.0850)));
        assert_eq!(book.best_ask, Some(dec!(1.0852)));
        assert_eq!(book.mid, Some(dec!(1.0851)));
        assert_eq!(book.spread, Some(dec!(0.0002)));
        assert_eq!(book.bids.len(), 2);
        assert_eq!(book.md_req_id.as_deref(), Some("OB_EURUSD_1"));
    }

    #[test]
    fn test_merge_patches_levels() {
        let mut normalizer = BookNormalizer::new(IncrementalPolicy::Merge);
        normalizer.apply(&snapshot());

        let update = message(
            true,
            vec![
                MarketDataEntry {
                    entry_type: EntryType::Bid,
                    price: dec!(1.0850),
                    size: None,
                    action: Some(UpdateAction::Delete),
                },
                entry(EntryType::Offer, dec!(1.0851), dec!(3)),
                entry(EntryType::Offer, dec!(1.0852), dec!(0)),
            ],
        );
        let book = normalizer.apply(&update);

        assert_eq!(book.best_bid, Some(dec!(1.0848)));
        assert_eq!(book.best_ask, Some(dec!(1.0851)));
        assert_eq!(book.asks.len(), 1);
        assert_eq!(book.bids.len(), 1);
    }

    #[test]
    fn test_rebuild_uses_only_message_entries() {
        let mut normalizer = BookNormalizer::new(IncrementalPolicy::Rebuild);
        normalizer.apply(&snapshot());

        let update = message(true, vec![entry(EntryType::Offer, dec!(1.0860), dec!(1))]);
        let book = normalizer.apply(&update);

        assert!(book.bids.is_empty());
        assert_eq!(book.best_ask, Some(dec!(1.0860)));
        assert_eq!(book.mid, None);
    }

    #[test]
    fn test_snapshot_keeps_every_entry() {
        let mut normalizer = BookNormalizer::default();
        let book = normalizer.apply(&message(
            false,
            vec![
                entry(EntryType::Bid, dec!(1.0850), dec!(1.0)),
                entry(EntryType::Bid, dec!(1.0850), dec!(2.0)),
                entry(EntryType::Bid, dec!(1.0849), dec!(0)),
                entry(EntryType::Offer, dec!(1.0852), dec!(1.5)),
            ],
        ));

        let bids: Vec<_> = book.bids.iter().map(|l| (l.price, l.size, l.level)).collect();
        assert_eq!(
            bids,
            vec![
                (dec!(1.0850), Some(dec!(1.0)), 1),
                (dec!(1.0850), Some(dec!(2.0)), 2),
                (dec!(1.0849), Some(dec!(0)), 3),
            ]
        );
        assert_eq!(book.best_bid, Some(dec!(1.0850)));
    }

    #[test]
    fn test_incremental_zero_size_removes_level() {
        let mut normalizer = BookNormalizer::new(IncrementalPolicy::Merge);
        normalizer.apply(&snapshot());

        let book = normalizer.apply(&message(
            true,
            vec![
                entry(EntryType::Bid, dec!(1.0848), dec!(0)),
                entry(EntryType::Bid, dec!(1.0850), dec!(4)),
            ],
        ));
        assert_eq!(book.bids.len(), 1);
        assert_eq!(book.bids[0].price, dec!(1.0850));
        assert_eq!(book.bids[0].size, Some(dec!(4)));
    }

    #[test]
    fn test_trade_sets_latest_price() {
        let mut normalizer = BookNormalizer::default();
        normalizer.apply(&snapshot());
        let trade = message(true, vec![entry(EntryType::Trade, dec!(1.0851), dec!(1))]);
        let book = normalizer.apply(&trade);

        assert_eq!(book.last_trade, Some(dec!(1.0851)));
        assert_eq!(book.price_source, Some(crate::messages::PriceSource::Trade));
        assert_eq!(book.best_bid, Some(dec!(1.0850)));
    }

    #[test]
    fn test_discard() {
        let mut normalizer = BookNormalizer::default();
        normalizer.apply(&snapshot());
        assert!(normalizer.discard("EURUSD"));
        assert!(!normalizer.discard("EURUSD"));
        assert_eq!(normalizer.symbols().count(), 0);
    }
}
