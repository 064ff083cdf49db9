//! Reference data: security list and market history

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codec::encoder::format_sending_time;
use crate::codec::{Field, GroupEntry, ProtocolMessage, tags};

use super::parse_decimal;

/// 559=4: all securities
pub const SECURITY_LIST_ALL: &str = "4";

/// One instrument of a security list (`y`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityInfo {
    pub symbol: String,
    pub security_id: Option<String>,
    pub security_id_source: Option<String>,
    pub description: Option<String>,
    pub currency: Option<String>,
    pub settle_currency: Option<String>,
    pub trade_enabled: bool,
    pub round_lot: Option<Decimal>,
    pub min_trade_volume: Option<Decimal>,
    pub max_trade_volume: Option<Decimal>,
    pub trade_volume_step: Option<Decimal>,
    pub price_precision: Option<u32>,
    pub contract_multiplier: Option<Decimal>,
    pub margin_factor: Option<Decimal>,
    pub swap_size_short: Option<Decimal>,
    pub swap_size_long: Option<Decimal>,
    pub commission: Option<Decimal>,
    pub commission_type: Option<String>,
    pub default_slippage: Option<Decimal>,
    pub status_group_id: Option<String>,
    pub security_group: Option<String>,
    pub swap_enabled: bool,
    pub triple_swap_day: Option<String>,
    pub text: Option<String>,
}

impl SecurityInfo {
    fn parse(entry: &GroupEntry) -> Option<Self> {
        let owned = |tag| entry.get(tag).map(str::to_string);
        let decimal = |tag| entry.get(tag).and_then(parse_decimal);
        Some(Self {
            symbol: entry.get(tags::SYMBOL)?.to_string(),
            security_id: owned(tags::SECURITY_ID),
            security_id_source: owned(tags::SECURITY_ID_SOURCE),
            description: owned(tags::SECURITY_DESC),
            currency: owned(tags::CURRENCY),
            settle_currency: owned(tags::SETTL_CURRENCY),
            trade_enabled: entry.get(tags::TRADE_ENABLED) == Some("Y"),
            round_lot: decimal(tags::ROUND_LOT),
            min_trade_volume: decimal(tags::MIN_TRADE_VOL),
            max_trade_volume: decimal(tags::MAX_TRADE_VOLUME),
            trade_volume_step: decimal(tags::TRADE_VOL_STEP),
            price_precision: entry.get(tags::PRICE_PRECISION).and_then(|v| v.parse().ok()),
            contract_multiplier: decimal(tags::CONTRACT_MULTIPLIER),
            margin_factor: decimal(tags::MARGIN_FACTOR),
            swap_size_short: decimal(tags::SWAP_SIZE_SHORT),
            swap_size_long: decimal(tags::SWAP_SIZE_LONG),
            commission: decimal(tags::COMMISSION),
            commission_type: owned(tags::COMM_TYPE),
            default_slippage: decimal(tags::DEFAULT_SLIPPAGE),
            status_group_id: owned(tags::STATUS_GROUP_ID),
            security_group: owned(tags::SECURITY_GROUP),
            swap_enabled: entry.get(tags::SWAP_ENABLED) == Some("Y"),
            triple_swap_day: owned(tags::TRIPLE_SWAP_DAY),
            text: owned(tags::ENCODED_TEXT),
        })
    }
}

/// Security list (`y`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityList {
    pub request_id: Option<String>,
    pub response_id: Option<String>,
    /// 560; `0` is success
    pub result: Option<String>,
    pub securities: Vec<SecurityInfo>,
}

impl SecurityList {
    pub fn request_fields(request_id: &str) -> Vec<Field> {
        vec![
            Field::new(tags::SECURITY_REQ_ID, request_id),
            Field::new(tags::SECURITY_LIST_REQUEST_TYPE, SECURITY_LIST_ALL),
        ]
    }

    pub fn parse(msg: &ProtocolMessage) -> Self {
        Self {
            request_id: msg.get(tags::SECURITY_REQ_ID).map(str::to_string),
            response_id: msg.get(tags::SECURITY_RESPONSE_ID).map(str::to_string),
            result: msg.get(tags::SECURITY_REQUEST_RESULT).map(str::to_string),
            securities: msg
                .group(tags::NO_RELATED_SYM)
                .iter()
                .filter_map(SecurityInfo::parse)
                .collect(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.as_deref().is_none_or(|r| r == "0")
    }
}

/// Market history request (`U1000`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub symbol: String,
    /// Bar period, e.g. `M1`, `H1`, `D1`
    pub period_id: String,
    pub max_bars: u32,
    pub end_time: DateTime<Utc>,
    /// `A` ask or `B` bid
    pub price_type: String,
    pub graph_type: String,
}

impl HistoryRequest {
    pub fn new(
        symbol: impl Into<String>,
        period_id: impl Into<String>,
        max_bars: u32,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            period_id: period_id.into(),
            max_bars,
            end_time,
            price_type: "B".to_string(),
            graph_type: "B".to_string(),
        }
    }

    /// Bars are requested backwards from `end_time`, hence the negative count
    pub fn to_fields(&self, request_id: &str) -> Vec<Field> {
        vec![
            Field::new(tags::HISTORY_REQ_ID, request_id),
            Field::new(tags::SYMBOL, self.symbol.as_str()),
            Field::new(tags::HISTORY_MAX_BARS, format!("-{}", self.max_bars)),
            Field::new(tags::HISTORY_DATA_TO, format_sending_time(self.end_time)),
            Field::new(tags::PRICE_TYPE, self.price_type.as_str()),
            Field::new(tags::BAR_PERIOD, self.period_id.as_str()),
            Field::new(tags::HISTORY_DATA_TYPE, "G"),
            Field::new(tags::GRAPH_TYPE, self.graph_type.as_str()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryBar {
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub open: Option<Decimal>,
    pub close: Option<Decimal>,
    pub time: Option<String>,
    pub volume: Option<Decimal>,
    pub volume_ex: Option<Decimal>,
}

/// Market history (`U1002`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketHistory {
    pub request_id: Option<String>,
    pub symbol: Option<String>,
    pub period_id: Option<String>,
    pub price_type: Option<String>,
    pub data_from: Option<String>,
    pub data_to: Option<String>,
    pub all_history_from: Option<String>,
    pub all_history_to: Option<String>,
    pub bars: Vec<HistoryBar>,
}

impl MarketHistory {
    pub fn parse(msg: &ProtocolMessage) -> Self {
        let owned = |tag| msg.get(tag).map(str::to_string);
        let bars = msg
            .group(tags::NO_BARS)
            .iter()
            .map(|bar| {
                let decimal = |tag| bar.get(tag).and_then(parse_decimal);
                HistoryBar {
                    high: decimal(tags::BAR_HIGH),
                    low: decimal(tags::BAR_LOW),
                    open: decimal(tags::BAR_OPEN),
                    close: decimal(tags::BAR_CLOSE),
                    time: bar.get(tags::BAR_TIME).map(str::to_string),
                    volume: decimal(tags::BAR_VOLUME),
                    volume_ex: decimal(tags::BAR_VOLUME_EX),
                }
            })
            .collect();
        Self {
            request_id: owned(tags::HISTORY_REQ_ID),
            symbol: owned(tags::SYMBOL),
            period_id: owned(tags::BAR_PERIOD),
            price_type: owned(tags::PRICE_TYPE),
            data_from: owned(tags::HISTORY_DATA_FROM),
            data_to: owned(tags::HISTORY_DATA_TO),
            all_history_from: owned(tags::ALL_HISTORY_FROM),
            all_history_to: owned(tags::ALL_HISTORY_TO),
            bars,
        }
    }
}
