use rust_decimal::Decimal;
use serde::Serialize;

use crate::codec::{Field, ProtocolMessage, tags};

use super::parse_decimal;

/// Account info (`U1006`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AccountInfo {
    pub request_id: Option<String>,
    pub account_id: Option<String>,
    pub account_name: Option<String>,
    pub currency: Option<String>,
    /// `N` net, `G` gross, `C` cash
    pub accounting_type: Option<String>,
    pub balance: Option<Decimal>,
    pub equity: Option<Decimal>,
    pub margin: Option<Decimal>,
    pub leverage: Option<Decimal>,
    pub account_valid: Option<bool>,
    pub account_blocked: Option<bool>,
    pub account_readonly: Option<bool>,
    pub margin_call_level: Option<Decimal>,
    pub stop_out_level: Option<Decimal>,
}

fn flag(value: Option<&str>) -> Option<bool> {
    match value? {
        "Y" | "1" => Some(true),
        "N" | "0" => Some(false),
        _ => None,
    }
}

impl AccountInfo {
    pub fn request_fields(request_id: &str) -> Vec<Field> {
        vec![Field::new(tags::ACCOUNT_INFO_REQ_ID, request_id)]
    }

    pub fn parse(msg: &ProtocolMessage) -> Self {
        let owned = |tag| msg.get(tag).map(str::to_string);
        let decimal = |tag| msg.get(tag).and_then(parse_decimal);
        Self {
            request_id: owned(tags::ACCOUNT_INFO_REQ_ID),
            account_id: owned(tags::ACCOUNT),
            account_name: owned(tags::ACCOUNT_NAME),
            currency: owned(tags::CURRENCY),
            accounting_type: owned(tags::ACCOUNTING_TYPE),
            balance: decimal(tags::BALANCE),
            equity: decimal(tags::EQUITY),
            margin: decimal(tags::MARGIN),
            leverage: decimal(tags::LEVERAGE),
            account_valid: flag(msg.get(tags::ACCOUNT_VALID)),
            account_blocked: flag(msg.get(tags::ACCOUNT_BLOCKED)),
            account_readonly: flag(msg.get(tags::ACCOUNT_READONLY)),
            margin_call_level: decimal(tags::MARGIN_CALL_LEVEL),
            stop_out_level: decimal(tags::STOP_OUT_LEVEL),
        }
    }

    /// Free margin, when equity and margin are both known
    pub fn free_margin(&self) -> Option<Decimal> {
        Some(self.equity? - self.margin?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_account_info() {
        let msg = ProtocolMessage::new()
            .with(tags::MSG_TYPE, "U1006")
            .with(tags::ACCOUNT_INFO_REQ_ID, "AIR_1")
            .with(tags::ACCOUNT, "1001")
            .with(tags::CURRENCY, "USD")
            .with(tags::ACCOUNTING_TYPE, "N")
            .with(tags::BALANCE, "10000.50")
            .with(tags::EQUITY, "10100")
            .with(tags::MARGIN, "250")
            .with(tags::LEVERAGE, "100")
            .with(tags::ACCOUNT_BLOCKED, "N");

        let info = AccountInfo::parse(&msg);
        assert_eq!(info.request_id.as_deref(), Some("AIR_1"));
        assert_eq!(info.account_id.as_deref(), Some("1001"));
        assert_eq!(info.balance, Some(dec!(10000.50)));
        assert_eq!(info.free_margin(), Some(dec!(9850)));
        assert_eq!(info.account_blocked, Some(false));
        assert_eq!(info.account_valid, None);
    }
}
