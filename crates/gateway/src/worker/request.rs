//! Caller requests and their wire rendering

use chrono::Utc;
use fixgate_core::ConnectionClass;
use serde::Serialize;
use uuid::Uuid;

use crate::codec::tags::{self, Tag, msg_type};
use crate::codec::Field;
use crate::error::RequestError;
use crate::messages::{
    AccountInfo, CancelOrder, HistoryRequest, MassStatusRequest, NewOrder, ReplaceOrder,
    SecurityList,
};

/// Request classes, used for timeouts and for correlation routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RequestKind {
    SecurityList,
    MarketHistory,
    NewOrder,
    CancelOrder,
    ReplaceOrder,
    MassStatus,
    AccountInfo,
    MarketData,
    TestRequest,
}

impl RequestKind {
    pub const ALL: &'static [RequestKind] = &[
        RequestKind::SecurityList,
        RequestKind::MarketHistory,
        RequestKind::NewOrder,
        RequestKind::CancelOrder,
        RequestKind::ReplaceOrder,
        RequestKind::MassStatus,
        RequestKind::AccountInfo,
        RequestKind::MarketData,
        RequestKind::TestRequest,
    ];

    pub const ORDERS: &'static [RequestKind] = &[
        RequestKind::NewOrder,
        RequestKind::CancelOrder,
        RequestKind::ReplaceOrder,
    ];
}

/// Work a caller can submit to a session
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    SecurityList,
    MarketHistory(HistoryRequest),
    NewOrder(NewOrder),
    CancelOrder(CancelOrder),
    ReplaceOrder(ReplaceOrder),
    MassStatus,
    AccountInfo,
    TestRequest,
    MarketDataSubscribe { symbol: String, depth: u32 },
    MarketDataUnsubscribe { symbol: String, md_req_id: String },
}

/// A request rendered for the wire
#[derive(Debug, Clone)]
pub struct Prepared {
    pub kind: RequestKind,
    pub msg_type: &'static str,
    pub fields: Vec<Field>,
    /// Id and the tag the venue echoes it on; `None` for fire-and-forget
    pub correlation: Option<(String, Tag)>,
}

/// `PREFIX_<epoch ms>_<8 hex>`
pub fn request_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{prefix}_{}_{}", Utc::now().timestamp_millis(), &uuid[..8])
}

/// `OB_<symbol>_<epoch ms>_<8 hex>`
pub fn market_data_request_id(symbol: &str) -> String {
    request_id(&format!("OB_{symbol}"))
}

impl Request {
    pub fn kind(&self) -> RequestKind {
        match self {
            Request::SecurityList => RequestKind::SecurityList,
            Request::MarketHistory(_) => RequestKind::MarketHistory,
            Request::NewOrder(_) => RequestKind::NewOrder,
            Request::CancelOrder(_) => RequestKind::CancelOrder,
            Request::ReplaceOrder(_) => RequestKind::ReplaceOrder,
            Request::MassStatus => RequestKind::MassStatus,
            Request::AccountInfo => RequestKind::AccountInfo,
            Request::TestRequest => RequestKind::TestRequest,
            Request::MarketDataSubscribe { .. } | Request::MarketDataUnsubscribe { .. } => {
                RequestKind::MarketData
            }
        }
    }

    /// Connection class the venue serves this request on, if restricted
    pub fn required_class(&self) -> Option<ConnectionClass> {
        match self {
            Request::SecurityList
            | Request::MarketHistory(_)
            | Request::MarketDataSubscribe { .. }
            | Request::MarketDataUnsubscribe { .. } => Some(ConnectionClass::Feed),
            Request::NewOrder(_)
            | Request::CancelOrder(_)
            | Request::ReplaceOrder(_)
            | Request::MassStatus => Some(ConnectionClass::Trade),
            Request::AccountInfo | Request::TestRequest => None,
        }
    }

    pub fn prepare(&self) -> Result<Prepared, RequestError> {
        let now = Utc::now();
        let kind = self.kind();
        let prepared = |msg_type, fields, id: String, tag| Prepared {
            kind,
            msg_type,
            fields,
            correlation: Some((id, tag)),
        };

        Ok(match self {
            Request::SecurityList => {
                let id = request_id("SLR");
                prepared(
                    msg_type::SECURITY_LIST_REQUEST,
                    SecurityList::request_fields(&id),
                    id,
                    tags::SECURITY_REQ_ID,
                )
            }
            Request::MarketHistory(req) => {
                let id = request_id("MHR");
                prepared(
                    msg_type::MARKET_HISTORY_REQUEST,
                    req.to_fields(&id),
                    id,
                    tags::HISTORY_REQ_ID,
                )
            }
            Request::NewOrder(order) => {
                order
                    .validate()
                    .map_err(|e| RequestError::rejected(format!("Invalid order: {e}"), None))?;
                prepared(
                    msg_type::NEW_ORDER_SINGLE,
                    order.to_fields(now),
                    order.client_order_id.clone(),
                    tags::CL_ORD_ID,
                )
            }
            Request::CancelOrder(cancel) => prepared(
                msg_type::ORDER_CANCEL_REQUEST,
                cancel.to_fields(now),
                cancel.client_order_id.clone(),
                tags::CL_ORD_ID,
            ),
            Request::ReplaceOrder(replace) => prepared(
                msg_type::ORDER_CANCEL_REPLACE,
                replace.to_fields(now),
                replace.client_order_id.clone(),
                tags::CL_ORD_ID,
            ),
            Request::MassStatus => {
                let id = request_id("MSR");
                prepared(
                    msg_type::ORDER_MASS_STATUS_REQUEST,
                    MassStatusRequest::fields(&id),
                    id,
                    tags::MASS_STATUS_REQ_ID,
                )
            }
            Request::AccountInfo => {
                let id = request_id("AIR");
                prepared(
                    msg_type::ACCOUNT_INFO_REQUEST,
                    AccountInfo::request_fields(&id),
                    id,
                    tags::ACCOUNT_INFO_REQ_ID,
                )
            }
            Request::TestRequest => {
                let id = request_id("TEST");
                prepared(
                    msg_type::TEST_REQUEST,
                    vec![Field::new(tags::TEST_REQ_ID, id.as_str())],
                    id,
                    tags::TEST_REQ_ID,
                )
            }
            Request::MarketDataSubscribe { symbol, depth } => {
                let id = market_data_request_id(symbol);
                prepared(
                    msg_type::MARKET_DATA_REQUEST,
                    market_data_fields(&id, symbol, "1", *depth),
                    id,
                    tags::MD_REQ_ID,
                )
            }
            Request::MarketDataUnsubscribe { symbol, md_req_id } => Prepared {
                kind,
                msg_type: msg_type::MARKET_DATA_REQUEST,
                fields: market_data_fields(md_req_id, symbol, "2", 0),
                correlation: None,
            },
        })
    }
}

/// `V`: 263 subscription type, 264 depth, bid/offer/trade entry types
fn market_data_fields(md_req_id: &str, symbol: &str, subscription: &str, depth: u32) -> Vec<Field> {
    vec![
        Field::new(tags::MD_REQ_ID, md_req_id),
        Field::new(tags::SUBSCRIPTION_REQUEST_TYPE, subscription),
        Field::new(tags::MARKET_DEPTH, depth.to_string()),
        Field::new(tags::MD_UPDATE_TYPE, "0"),
        Field::new(tags::NO_MD_ENTRY_TYPES, "3"),
        Field::new(tags::MD_ENTRY_TYPE, "0"),
        Field::new(tags::MD_ENTRY_TYPE, "1"),
        Field::new(tags::MD_ENTRY_TYPE, "2"),
        Field::new(tags::NO_RELATED_SYM, "1"),
        Field::new(tags::SYMBOL, symbol),
    ]
}
