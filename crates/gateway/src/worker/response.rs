//! Turning a correlated inbound message into a request outcome

use fixgate_core::{OrderRejectReason, RejectReason};
use log::debug;
use serde::Serialize;

use crate::codec::tags::{self, msg_type};
use crate::codec::ProtocolMessage;
use crate::error::RequestError;
use crate::messages::{AccountInfo, ExecutionReport, MarketHistory, SecurityList};

use super::pending::PendingRequest;
use super::request::RequestKind;

/// Successful outcome of a request
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data")]
pub enum ResponseData {
    SecurityList(SecurityList),
    MarketHistory(MarketHistory),
    Execution(ExecutionReport),
    MassStatus(Vec<ExecutionReport>),
    AccountInfo(AccountInfo),
    Subscribed {
        md_req_id: String,
        total_snapshots: Option<u32>,
    },
    Heartbeat {
        test_req_id: String,
    },
    /// Fire-and-forget request written to the wire
    Accepted,
}

#[derive(Debug)]
pub enum Disposition {
    /// More messages for this request will follow
    Progress,
    Complete(Result<ResponseData, RequestError>),
}

use Disposition::{Complete, Progress};

pub fn interpret(pending: &mut PendingRequest, msg: &ProtocolMessage) -> Disposition {
    let Some(kind) = msg.msg_type() else {
        return Progress;
    };

    match kind {
        msg_type::SECURITY_LIST => {
            let list = SecurityList::parse(msg);
            if list.is_success() {
                Complete(Ok(ResponseData::SecurityList(list)))
            } else {
                Complete(Err(RequestError::rejected(
                    format!(
                        "Security list request failed: result {}",
                        list.result.as_deref().unwrap_or("?")
                    ),
                    None,
                )))
            }
        }
        msg_type::MARKET_HISTORY => Complete(Ok(ResponseData::MarketHistory(MarketHistory::parse(msg)))),
        msg_type::MARKET_HISTORY_REJECT => {
            let reason = msg
                .get(tags::HISTORY_REJECT_REASON)
                .map(|code| RejectReason::Other(code.to_string()));
            Complete(Err(RequestError::rejected(
                msg.text().unwrap_or("Market history request rejected"),
                reason,
            )))
        }
        msg_type::ACCOUNT_INFO => Complete(Ok(ResponseData::AccountInfo(AccountInfo::parse(msg)))),
        msg_type::EXECUTION_REPORT => execution(pending, ExecutionReport::parse(msg)),
        msg_type::ORDER_CANCEL_REJECT => {
            let reason = msg
                .get(tags::CXL_REJ_REASON)
                .map(|code| match code {
                    "1" => RejectReason::UnknownOrder,
                    other => RejectReason::Other(other.to_string()),
                });
            Complete(Err(RequestError::rejected(
                msg.text().unwrap_or("Order cancel rejected"),
                reason,
            )))
        }
        msg_type::MARKET_DATA_ACK => Complete(Ok(ResponseData::Subscribed {
            md_req_id: pending.correlation_id.clone(),
            total_snapshots: msg.get(tags::TOTAL_SNAPSHOTS).and_then(|v| v.parse().ok()),
        })),
        msg_type::MARKET_DATA_SNAPSHOT => Complete(Ok(ResponseData::Subscribed {
            md_req_id: pending.correlation_id.clone(),
            total_snapshots: None,
        })),
        msg_type::MARKET_DATA_REJECT => {
            let reason = msg
                .get(tags::MD_REQ_REJ_REASON)
                .map(RejectReason::from_market_data_code);
            let message = match (msg.text(), &reason) {
                (Some(text), _) => text.to_string(),
                (None, Some(reason)) => reason.description().to_string(),
                (None, None) => "Market data request rejected".to_string(),
            };
            Complete(Err(RequestError::rejected(message, reason)))
        }
        msg_type::BUSINESS_REJECT => {
            let code = msg.get(tags::BUSINESS_REJECT_REASON);
            Complete(Err(RequestError::rejected(
                format!(
                    "Request rejected: {} (Reason: {}, RefMsgType: {})",
                    msg.text().unwrap_or("Unknown error"),
                    code.unwrap_or("?"),
                    msg.get(tags::REF_MSG_TYPE).unwrap_or("?"),
                ),
                code.map(RejectReason::from_business_code),
            )))
        }
        msg_type::REJECT => Complete(Err(RequestError::rejected(
            format!(
                "Session reject: {} (RefSeqNum: {})",
                msg.text().unwrap_or("Unknown error"),
                msg.get(tags::REF_SEQ_NUM).unwrap_or("?"),
            ),
            None,
        ))),
        msg_type::HEARTBEAT => Complete(Ok(ResponseData::Heartbeat {
            test_req_id: pending.correlation_id.clone(),
        })),
        other => {
            debug!(
                "Ignoring {other} for pending {} ({:?})",
                pending.correlation_id, pending.kind
            );
            Progress
        }
    }
}

fn execution(pending: &mut PendingRequest, report: ExecutionReport) -> Disposition {
    if pending.kind == RequestKind::MassStatus {
        let last = report.last_report;
        let expected = report.total_reports;
        // 911=0 marks an empty result; it carries no order of its own
        if report.order_id.is_some() || report.client_order_id.is_some() {
            pending.reports.push(report);
        }
        let done = last || expected.is_some_and(|n| pending.reports.len() >= n as usize);
        return if done {
            Complete(Ok(ResponseData::MassStatus(std::mem::take(
                &mut pending.reports,
            ))))
        } else {
            Progress
        };
    }

    if report.is_rejected() {
        let reason = report.reject_reason.as_ref().map(RejectReason::from_order_reject);
        let message = report
            .text
            .clone()
            .or_else(|| match &report.reject_reason {
                Some(OrderRejectReason::Other(code)) => Some(format!("Order rejected ({code})")),
                Some(reason) => Some(format!("Order rejected: {reason:?}")),
                None => None,
            })
            .unwrap_or_else(|| "Order rejected".to_string());
        return Complete(Err(RequestError::rejected(message, reason)));
    }

    if report.is_pending() {
        return Progress;
    }
    Complete(Ok(ResponseData::Execution(report)))
}
