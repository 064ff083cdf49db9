//! Market data message types

use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codec::{ProtocolMessage, tags};

use super::parse_decimal;

/// Order book level (price, size, 1-based level)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub level: u32,
}

impl BookLevel {
    pub fn new(price: Decimal, size: Option<Decimal>, level: u32) -> Self {
        Self { price, size, level }
    }
}

/// 269 MDEntryType
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryType {
    Bid,
    Offer,
    Trade,
}

impl EntryType {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(EntryType::Bid),
            "1" => Some(EntryType::Offer),
            "2" => Some(EntryType::Trade),
            _ => None,
        }
    }
}

/// 279 MDUpdateAction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateAction {
    New,
    Change,
    Delete,
}

impl UpdateAction {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "0" => Some(UpdateAction::New),
            "1" => Some(UpdateAction::Change),
            "2" => Some(UpdateAction::Delete),
            _ => None,
        }
    }
}

/// One priced entry of a `W`/`X`
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataEntry {
    pub entry_type: EntryType,
    pub price: Decimal,
    pub size: Option<Decimal>,
    pub action: Option<UpdateAction>,
}

impl MarketDataEntry {
    /// Delete action or zero size
    pub fn removes_level(&self) -> bool {
        self.action == Some(UpdateAction::Delete) || self.size.is_some_and(|s| s.is_zero())
    }
}

/// A decoded snapshot (`W`) or incremental refresh (`X`)
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataMessage {
    pub incremental: bool,
    pub symbol: String,
    pub md_req_id: Option<String>,
    pub entries: Vec<MarketDataEntry>,
    pub tick_id: Option<String>,
    pub orig_time: Option<String>,
    pub is_indicative: bool,
}

impl MarketDataMessage {
    /// `None` unless the message is a `W`/`X` naming a symbol
    pub fn parse(msg: &ProtocolMessage) -> Option<Self> {
        let incremental = match msg.msg_type()? {
            tags::msg_type::MARKET_DATA_SNAPSHOT => false,
            tags::msg_type::MARKET_DATA_INCREMENTAL => true,
            _ => return None,
        };
        let symbol = msg.get(tags::SYMBOL)?.to_string();

        let mut entries = Vec::new();
        for (i, group) in msg.group(tags::NO_MD_ENTRIES).iter().enumerate() {
            let Some(entry_type) = group.get(tags::MD_ENTRY_TYPE).and_then(EntryType::from_code)
            else {
                debug!("Skipping entry {} of {symbol}: unknown entry type", i + 1);
                continue;
            };
            let Some(price) = group.get(tags::MD_ENTRY_PX).and_then(parse_decimal) else {
                debug!("Skipping entry {} of {symbol}: no price", i + 1);
                continue;
            };
            entries.push(MarketDataEntry {
                entry_type,
                price,
                size: group.get(tags::MD_ENTRY_SIZE).and_then(parse_decimal),
                action: group
                    .get(tags::MD_UPDATE_ACTION)
                    .and_then(UpdateAction::from_code),
            });
        }

        Some(Self {
            incremental,
            symbol,
            md_req_id: msg.get(tags::MD_REQ_ID).map(str::to_string),
            entries,
            tick_id: msg.get(tags::TICK_ID).map(str::to_string),
            orig_time: msg.get(tags::ORIG_TIME).map(str::to_string),
            is_indicative: msg.get(tags::INDICATIVE_TICK) == Some("1"),
        })
    }
}

/// Where `latest_price` came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceSource {
    Trade,
    Mid,
}

/// Normalized order book for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub symbol: String,
    /// Price descending
    pub bids: Vec<BookLevel>,
    /// Price ascending
    pub asks: Vec<BookLevel>,
    pub best_bid: Option<Decimal>,
    pub best_ask: Option<Decimal>,
    pub mid: Option<Decimal>,
    pub spread: Option<Decimal>,
    pub spread_bps: Option<Decimal>,
    pub last_trade: Option<Decimal>,
    pub latest_price: Option<Decimal>,
    pub price_source: Option<PriceSource>,
    pub is_indicative: bool,
    pub md_req_id: Option<String>,
    pub tick_id: Option<String>,
    pub orig_time: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl OrderBookSnapshot {
    /// Sort, number levels and derive the top-of-book figures
    pub fn from_levels(
        symbol: impl Into<String>,
        bids: impl IntoIterator<Item = (Decimal, Option<Decimal>)>,
        asks: impl IntoIterator<Item = (Decimal, Option<Decimal>)>,
        last_trade: Option<Decimal>,
    ) -> Self {
        let mut bids: Vec<_> = bids.into_iter().collect();
        let mut asks: Vec<_> = asks.into_iter().collect();
        bids.sort_by(|a, b| b.0.cmp(&a.0));
        asks.sort_by(|a, b| a.0.cmp(&b.0));

        let number = |levels: Vec<(Decimal, Option<Decimal>)>| -> Vec<BookLevel> {
            levels
                .into_iter()
                .enumerate()
                .map(|(i, (price, size))| BookLevel::new(price, size, i as u32 + 1))
                .collect()
        };
        let bids = number(bids);
        let asks = number(asks);

        let best_bid = bids.first().map(|l| l.price);
        let best_ask = asks.first().map(|l| l.price);
        let (mid, spread, spread_bps) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                // Out-of-range venue prices leave the figure unset
                let mid = bid
                    .checked_add(ask)
                    .and_then(|sum| sum.checked_div(Decimal::TWO));
                let spread = ask.checked_sub(bid);
                let bps = match (spread, mid) {
                    (Some(spread), Some(mid)) if !mid.is_zero() => spread
                        .checked_div(mid)
                        .and_then(|ratio| ratio.checked_mul(Decimal::from(10_000)))
                        .map(|bps| bps.round_dp(4)),
                    _ => None,
                };
                (mid, spread, bps)
            }
            _ => (None, None, None),
        };

        let (latest_price, price_source) = match (last_trade, mid) {
            (Some(trade), _) => (Some(trade), Some(PriceSource::Trade)),
            (None, Some(mid)) => (Some(mid), Some(PriceSource::Mid)),
            (None, None) => (None, None),
        };

        Self {
            symbol: symbol.into(),
            bids,
            asks,
            best_bid,
            best_ask,
            mid,
            spread,
            spread_bps,
            last_trade,
            latest_price,
            price_source,
            is_indicative: false,
            md_req_id: None,
            tick_id: None,
            orig_time: None,
            timestamp: Utc::now(),
        }
    }

    pub fn depth(&self) -> usize {
        self.bids.len().max(self.asks.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_top_of_book() {
        let book = OrderBookSnapshot::from_levels(
            "EURUSD",
            [(dec!(1.0848), Some(dec!(2.0))), (dec!(1.0850), Some(dec!(1.0)))],
            [(dec!(1.0852), Some(dec!(1.5)))],
            None,
        );

        assert_eq!(book.best_bid, Some(dec!(1.0850)));
        assert_eq!(book.best_ask, Some(dec!(1.0852)));
        assert_eq!(book.mid, Some(dec!(1.0851)));
        assert_eq!(book.spread, Some(dec!(0.0002)));
        assert_eq!(book.spread_bps, Some(dec!(1.8431)));
        assert_eq!(book.latest_price, Some(dec!(1.0851)));
        assert_eq!(book.price_source, Some(PriceSource::Mid));

        assert_eq!(book.bids[0], BookLevel::new(dec!(1.0850), Some(dec!(1.0)), 1));
        assert_eq!(book.bids[1], BookLevel::new(dec!(1.0848), Some(dec!(2.0)), 2));
        assert_eq!(book.asks[0].level, 1);
        assert_eq!(book.depth(), 2);
    }

    #[test]
    fn test_one_sided_book_has_no_derivations() {
        let book = OrderBookSnapshot::from_levels(
            "EURUSD",
            [(dec!(1.0850), Some(dec!(1)))],
            [],
            Some(dec!(1.0849)),
        );
        assert_eq!(book.best_bid, Some(dec!(1.0850)));
        assert_eq!(book.best_ask, None);
        assert_eq!(book.mid, None);
        assert_eq!(book.spread, None);
        assert_eq!(book.spread_bps, None);
        assert_eq!(book.latest_price, Some(dec!(1.0849)));
        assert_eq!(book.price_source, Some(PriceSource::Trade));
    }

    #[test]
    fn test_extreme_prices_leave_derivations_unset() {
        let book = OrderBookSnapshot::from_levels(
            "EURUSD",
            [(Decimal::MAX, Some(dec!(1)))],
            [(Decimal::MAX, Some(dec!(1)))],
            None,
        );
        assert_eq!(book.best_bid, Some(Decimal::MAX));
        assert_eq!(book.best_ask, Some(Decimal::MAX));
        assert_eq!(book.mid, None);
        assert_eq!(book.spread, Some(Decimal::ZERO));
        assert_eq!(book.spread_bps, None);
        assert_eq!(book.latest_price, None);

        let crossed = OrderBookSnapshot::from_levels(
            "EURUSD",
            [(Decimal::MIN, None)],
            [(Decimal::MAX, None)],
            None,
        );
        assert_eq!(crossed.mid, Some(Decimal::ZERO));
        assert_eq!(crossed.spread, None);
        assert_eq!(crossed.spread_bps, None);
    }

    #[test]
    fn test_parse_snapshot_skips_unpriced_entries() {
        let raw = "8=FIX.4.4\x019=0\x0135=W\x0155=EURUSD\x01262=OB_EURUSD_1\x0110094=77\x0110230=1\x01\
                   268=4\x01269=0\x01270=1.0850\x01271=1\x01269=1\x01270=N\x01271=1\x01\
                   269=1\x01270=1.0852\x01271=1.5\x01269=2\x01270=1.0851\x0110=000\x01";
        let msg = crate::codec::decode(raw.as_bytes(), &Default::default()).unwrap();
        let md = MarketDataMessage::parse(&msg).unwrap();

        assert!(!md.incremental);
        assert_eq!(md.symbol, "EURUSD");
        assert_eq!(md.md_req_id.as_deref(), Some("OB_EURUSD_1"));
        assert_eq!(md.tick_id.as_deref(), Some("77"));
        assert!(md.is_indicative);
        assert_eq!(md.entries.len(), 3);
        assert_eq!(md.entries[2].entry_type, EntryType::Trade);
        assert_eq!(md.entries[2].size, None);
    }

    #[test]
    fn test_parse_ignores_other_types() {
        let msg = ProtocolMessage::new()
            .with(tags::MSG_TYPE, "y")
            .with(tags::SYMBOL, "EURUSD");
        assert!(MarketDataMessage::parse(&msg).is_none());
    }

    #[test]
    fn test_removal_entries() {
        let delete = MarketDataEntry {
            entry_type: EntryType::Bid,
            price: dec!(1),
            size: Some(dec!(5)),
            action: Some(UpdateAction::Delete),
        };
        let zero = MarketDataEntry {
            entry_type: EntryType::Offer,
            price: dec!(1),
            size: Some(dec!(0)),
            action: Some(UpdateAction::Change),
        };
        assert!(delete.removes_level());
        assert!(zero.removes_level());
    }
}
