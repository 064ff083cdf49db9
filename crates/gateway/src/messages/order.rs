//! Order message types

use chrono::{DateTime, Utc};
use fixgate_core::{ExecType, OrderRejectReason, OrderStatus, OrderType, Side, TimeInForce};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::codec::encoder::format_sending_time;
use crate::codec::{Field, ProtocolMessage, tags};

use super::parse_decimal;

/// New order single (`D`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewOrder {
    /// Client-assigned order ID for correlation
    pub client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    /// Required for limit and stop-limit orders
    pub price: Option<Decimal>,
    /// Required for stop and stop-limit orders
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    /// Required for GTD
    pub expire_time: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl NewOrder {
    /// Create a new limit order request
    pub fn limit(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
            stop_price: None,
            time_in_force: TimeInForce::GTC,
            expire_time: None,
            comment: None,
        }
    }

    /// Create a new market order request
    pub fn market(
        client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
        quantity: Decimal,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            stop_price: None,
            time_in_force: TimeInForce::IOC,
            expire_time: None,
            comment: None,
        }
    }

    pub fn with_time_in_force(mut self, tif: TimeInForce) -> Self {
        self.time_in_force = tif;
        self
    }

    pub fn with_expire_time(mut self, expire_time: DateTime<Utc>) -> Self {
        self.expire_time = Some(expire_time);
        self
    }

    pub fn with_stop_price(mut self, stop_price: Decimal) -> Self {
        self.stop_price = Some(stop_price);
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Check the fields the order type and time in force demand
    pub fn validate(&self) -> Result<(), String> {
        if self.client_order_id.is_empty() {
            return Err("client order id is required".into());
        }
        if self.quantity <= Decimal::ZERO {
            return Err(format!("quantity must be positive, got {}", self.quantity));
        }
        if self.order_type.requires_price() && self.price.is_none() {
            return Err(format!("{:?} order requires a price", self.order_type));
        }
        if self.order_type.requires_stop_price() && self.stop_price.is_none() {
            return Err(format!("{:?} order requires a stop price", self.order_type));
        }
        if self.time_in_force.requires_expire_time() && self.expire_time.is_none() {
            return Err("GTD order requires an expire time".into());
        }
        Ok(())
    }

    pub fn to_fields(&self, transact_time: DateTime<Utc>) -> Vec<Field> {
        let mut fields = vec![
            Field::new(tags::CL_ORD_ID, self.client_order_id.as_str()),
            Field::new(tags::SYMBOL, self.symbol.as_str()),
            Field::new(tags::SIDE, self.side.code()),
            Field::new(tags::TRANSACT_TIME, format_sending_time(transact_time)),
            Field::new(tags::ORDER_QTY, self.quantity.to_string()),
            Field::new(tags::ORD_TYPE, self.order_type.code()),
        ];
        push_order_terms(
            &mut fields,
            self.price,
            self.stop_price,
            self.time_in_force,
            self.expire_time,
            self.comment.as_deref(),
        );
        fields
    }
}

fn push_order_terms(
    fields: &mut Vec<Field>,
    price: Option<Decimal>,
    stop_price: Option<Decimal>,
    time_in_force: TimeInForce,
    expire_time: Option<DateTime<Utc>>,
    comment: Option<&str>,
) {
    if let Some(price) = price {
        fields.push(Field::new(tags::PRICE, price.to_string()));
    }
    if let Some(stop) = stop_price {
        fields.push(Field::new(tags::STOP_PX, stop.to_string()));
    }
    fields.push(Field::new(tags::TIME_IN_FORCE, time_in_force.code()));
    if let Some(expire) = expire_time {
        fields.push(Field::new(tags::EXPIRE_TIME, format_sending_time(expire)));
    }
    if let Some(comment) = comment {
        fields.push(Field::new(tags::TEXT, comment));
    }
}

/// Order cancel request (`F`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CancelOrder {
    pub client_order_id: String,
    pub original_client_order_id: String,
    pub symbol: String,
    pub side: Side,
    pub order_id: Option<String>,
}

impl CancelOrder {
    pub fn new(
        client_order_id: impl Into<String>,
        original_client_order_id: impl Into<String>,
        symbol: impl Into<String>,
        side: Side,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            original_client_order_id: original_client_order_id.into(),
            symbol: symbol.into(),
            side,
            order_id: None,
        }
    }

    pub fn to_fields(&self, transact_time: DateTime<Utc>) -> Vec<Field> {
        let mut fields = vec![
            Field::new(tags::CL_ORD_ID, self.client_order_id.as_str()),
            Field::new(tags::ORIG_CL_ORD_ID, self.original_client_order_id.as_str()),
        ];
        if let Some(order_id) = &self.order_id {
            fields.push(Field::new(tags::ORDER_ID, order_id.as_str()));
        }
        fields.push(Field::new(tags::SYMBOL, self.symbol.as_str()));
        fields.push(Field::new(tags::SIDE, self.side.code()));
        fields.push(Field::new(
            tags::TRANSACT_TIME,
            format_sending_time(transact_time),
        ));
        fields
    }
}

/// Order cancel/replace request (`G`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplaceOrder {
    pub client_order_id: String,
    pub original_client_order_id: String,
    pub order_id: Option<String>,
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
    pub expire_time: Option<DateTime<Utc>>,
    pub comment: Option<String>,
}

impl ReplaceOrder {
    /// Replace `original` with new quantity and price
    pub fn amend(
        client_order_id: impl Into<String>,
        original: &NewOrder,
        quantity: Decimal,
        price: Option<Decimal>,
    ) -> Self {
        Self {
            client_order_id: client_order_id.into(),
            original_client_order_id: original.client_order_id.clone(),
            order_id: None,
            symbol: original.symbol.clone(),
            side: original.side,
            order_type: original.order_type,
            quantity,
            price,
            stop_price: original.stop_price,
            time_in_force: original.time_in_force,
            expire_time: original.expire_time,
            comment: original.comment.clone(),
        }
    }

    pub fn to_fields(&self, transact_time: DateTime<Utc>) -> Vec<Field> {
        let mut fields = vec![
            Field::new(tags::CL_ORD_ID, self.client_order_id.as_str()),
            Field::new(tags::ORIG_CL_ORD_ID, self.original_client_order_id.as_str()),
        ];
        if let Some(order_id) = &self.order_id {
            fields.push(Field::new(tags::ORDER_ID, order_id.as_str()));
        }
        fields.extend([
            Field::new(tags::SYMBOL, self.symbol.as_str()),
            Field::new(tags::SIDE, self.side.code()),
            Field::new(tags::TRANSACT_TIME, format_sending_time(transact_time)),
            Field::new(tags::ORDER_QTY, self.quantity.to_string()),
            Field::new(tags::ORD_TYPE, self.order_type.code()),
        ]);
        push_order_terms(
            &mut fields,
            self.price,
            self.stop_price,
            self.time_in_force,
            self.expire_time,
            self.comment.as_deref(),
        );
        fields
    }
}

/// Execution report (`8`)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionReport {
    pub client_order_id: Option<String>,
    pub original_client_order_id: Option<String>,
    pub order_id: Option<String>,
    pub exec_id: Option<String>,
    pub exec_type: Option<ExecType>,
    pub order_status: Option<OrderStatus>,
    pub symbol: Option<String>,
    pub side: Option<Side>,
    pub order_type: Option<OrderType>,
    pub quantity: Option<Decimal>,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub cum_qty: Option<Decimal>,
    pub leaves_qty: Option<Decimal>,
    pub avg_px: Option<Decimal>,
    pub last_px: Option<Decimal>,
    pub last_qty: Option<Decimal>,
    pub text: Option<String>,
    pub reject_reason: Option<OrderRejectReason>,
    /// Raw 60 value
    pub transact_time: Option<String>,
    pub mass_status_req_id: Option<String>,
    pub total_reports: Option<u32>,
    pub last_report: bool,
}

impl ExecutionReport {
    pub fn parse(msg: &ProtocolMessage) -> Self {
        let owned = |tag| msg.get(tag).map(str::to_string);
        let decimal = |tag| msg.get(tag).and_then(parse_decimal);
        Self {
            client_order_id: owned(tags::CL_ORD_ID),
            original_client_order_id: owned(tags::ORIG_CL_ORD_ID),
            order_id: owned(tags::ORDER_ID),
            exec_id: owned(tags::EXEC_ID),
            exec_type: msg.get(tags::EXEC_TYPE).and_then(ExecType::from_code),
            order_status: msg.get(tags::ORD_STATUS).and_then(OrderStatus::from_code),
            symbol: owned(tags::SYMBOL),
            side: msg.get(tags::SIDE).and_then(Side::from_code),
            order_type: msg.get(tags::ORD_TYPE).and_then(OrderType::from_code),
            quantity: decimal(tags::ORDER_QTY),
            price: decimal(tags::PRICE),
            stop_price: decimal(tags::STOP_PX),
            cum_qty: decimal(tags::CUM_QTY),
            leaves_qty: decimal(tags::LEAVES_QTY),
            avg_px: decimal(tags::AVG_PX),
            last_px: decimal(tags::LAST_PX),
            last_qty: decimal(tags::LAST_QTY),
            text: owned(tags::TEXT),
            reject_reason: msg.get(tags::ORD_REJ_REASON).map(OrderRejectReason::from_code),
            transact_time: owned(tags::TRANSACT_TIME),
            mass_status_req_id: owned(tags::MASS_STATUS_REQ_ID),
            total_reports: msg.get(tags::TOT_NUM_REPORTS).and_then(|v| v.parse().ok()),
            last_report: msg.get(tags::LAST_RPT_REQUESTED) == Some("Y"),
        }
    }

    /// The venue refused the request this report answers
    pub fn is_rejected(&self) -> bool {
        self.order_status == Some(OrderStatus::Rejected)
            || self.exec_type == Some(ExecType::Rejected)
    }

    /// Pending-new/cancel/replace: a final report will follow
    pub fn is_pending(&self) -> bool {
        self.order_status.is_some_and(|s| s.is_pending())
            || self.exec_type.is_some_and(|e| e.is_pending())
    }
}

/// Order mass status request (`AF`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MassStatusRequest {
    pub request_id: Option<String>,
}

/// 585=7: status for all orders
pub const MASS_STATUS_ALL_ORDERS: &str = "7";

impl MassStatusRequest {
    pub fn fields(request_id: &str) -> Vec<Field> {
        vec![
            Field::new(tags::MASS_STATUS_REQ_ID, request_id),
            Field::new(tags::MASS_STATUS_REQ_TYPE, MASS_STATUS_ALL_ORDERS),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_limit_order_fields() {
        let order = NewOrder::limit("CL-1", "EURUSD", Side::Buy, dec!(1000), dec!(1.0850))
            .with_comment("hedge");
        order.validate().unwrap();

        let msg = ProtocolMessage::from_fields(order.to_fields(at()));
        assert_eq!(msg.get(tags::CL_ORD_ID), Some("CL-1"));
        assert_eq!(msg.get(tags::SIDE), Some("1"));
        assert_eq!(msg.get(tags::ORD_TYPE), Some("2"));
        assert_eq!(msg.get(tags::ORDER_QTY), Some("1000"));
        assert_eq!(msg.get(tags::PRICE), Some("1.0850"));
        assert_eq!(msg.get(tags::TIME_IN_FORCE), Some("1"));
        assert_eq!(msg.get(tags::TRANSACT_TIME), Some("20240301-12:00:00.000"));
        assert_eq!(msg.get(tags::TEXT), Some("hedge"));
        assert!(!msg.contains(tags::STOP_PX));
    }

    #[test]
    fn test_validation() {
        let mut order = NewOrder::market("CL-2", "EURUSD", Side::Sell, dec!(1));
        order.validate().unwrap();

        order.order_type = OrderType::Limit;
        assert!(order.validate().unwrap_err().contains("price"));

        let gtd = NewOrder::limit("CL-3", "EURUSD", Side::Buy, dec!(1), dec!(1.1))
            .with_time_in_force(TimeInForce::GTD);
        assert!(gtd.validate().is_err());
        gtd.with_expire_time(at()).validate().unwrap();

        let zero = NewOrder::market("CL-4", "EURUSD", Side::Buy, dec!(0));
        assert!(zero.validate().is_err());
    }

    #[test]
    fn test_replace_keeps_original_terms() {
        let original = NewOrder::limit("CL-1", "EURUSD", Side::Buy, dec!(1000), dec!(1.0850));
        let replace = ReplaceOrder::amend("CL-1R", &original, dec!(2000), Some(dec!(1.0840)));
        let msg = ProtocolMessage::from_fields(replace.to_fields(at()));
        assert_eq!(msg.get(tags::ORIG_CL_ORD_ID), Some("CL-1"));
        assert_eq!(msg.get(tags::CL_ORD_ID), Some("CL-1R"));
        assert_eq!(msg.get(tags::ORDER_QTY), Some("2000"));
        assert_eq!(msg.get(tags::PRICE), Some("1.0840"));
    }

    #[test]
    fn test_cancel_fields() {
        let mut cancel = CancelOrder::new("CL-1C", "CL-1", "EURUSD", Side::Buy);
        cancel.order_id = Some("9001".into());
        let msg = ProtocolMessage::from_fields(cancel.to_fields(at()));
        assert_eq!(msg.get(tags::ORIG_CL_ORD_ID), Some("CL-1"));
        assert_eq!(msg.get(tags::ORDER_ID), Some("9001"));
    }

    #[test]
    fn test_parse_execution_report() {
        let msg = ProtocolMessage::new()
            .with(tags::MSG_TYPE, "8")
            .with(tags::CL_ORD_ID, "CL-1")
            .with(tags::ORDER_ID, "9001")
            .with(tags::EXEC_TYPE, "F")
            .with(tags::ORD_STATUS, "1")
            .with(tags::SIDE, "1")
            .with(tags::CUM_QTY, "400")
            .with(tags::LEAVES_QTY, "600")
            .with(tags::LAST_PX, "1.0851");
        let report = ExecutionReport::parse(&msg);
        assert_eq!(report.exec_type, Some(ExecType::Trade));
        assert_eq!(report.order_status, Some(OrderStatus::PartiallyFilled));
        assert_eq!(report.cum_qty, Some(dec!(400)));
        assert_eq!(report.last_px, Some(dec!(1.0851)));
        assert!(!report.is_rejected());
        assert!(!report.is_pending());
    }

    #[test]
    fn test_rejected_and_pending_reports() {
        let rejected = ExecutionReport::parse(
            &ProtocolMessage::new()
                .with(tags::ORD_STATUS, "8")
                .with(tags::ORD_REJ_REASON, "3"),
        );
        assert!(rejected.is_rejected());
        assert_eq!(
            rejected.reject_reason,
            Some(OrderRejectReason::OrderExceedsLimit)
        );

        let pending = ExecutionReport::parse(
            &ProtocolMessage::new()
                .with(tags::ORD_STATUS, "6")
                .with(tags::EXEC_TYPE, "6"),
        );
        assert!(pending.is_pending());
    }
}
