//! Inbound-to-request routing
//!
//! Each response message type maps to an ordered list of strategies and
//! the request kinds it may answer:
//!
//! | msg type          | strategies                                  |
//! |-------------------|---------------------------------------------|
//! | `y`               | echo 320                                    |
//! | `U1002`, `U1001`  | echo 10011                                  |
//! | `U1006`           | echo 10100                                  |
//! | `8`               | echo 584 if present, else echo 11           |
//! | `9`               | echo 11                                     |
//! | `W`, `U1011`, `Y` | echo 262                                    |
//! | `j`               | 379 as id, 45 as seq, first unmatched       |
//! | `3`               | 45 as seq, first unmatched                  |
//! | `0` with 112      | echo 112                                    |

use crate::codec::tags::{self, Tag, msg_type};
use crate::codec::ProtocolMessage;

use super::request::RequestKind;

/// How a mapped field identifies the request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappedKey {
    /// The field holds the request's correlation id
    CorrelationId,
    /// The field holds the outbound sequence number the request used
    SequenceNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Correlation {
    /// The response echoes the request id on the tag it was sent with
    DirectEcho(Tag),
    /// A different field of the response identifies the request
    MappedField { tag: Tag, key: MappedKey },
    /// Oldest open request of an eligible kind
    FirstUnmatched,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub strategies: Vec<Correlation>,
    pub kinds: &'static [RequestKind],
}

impl Route {
    fn echo(tag: Tag, kinds: &'static [RequestKind]) -> Self {
        Self {
            strategies: vec![Correlation::DirectEcho(tag)],
            kinds,
        }
    }
}

/// `None` for messages that never answer a request
pub fn route(msg: &ProtocolMessage) -> Option<Route> {
    use Correlation::*;

    let route = match msg.msg_type()? {
        msg_type::SECURITY_LIST => Route::echo(tags::SECURITY_REQ_ID, &[RequestKind::SecurityList]),
        msg_type::MARKET_HISTORY | msg_type::MARKET_HISTORY_REJECT => {
            Route::echo(tags::HISTORY_REQ_ID, &[RequestKind::MarketHistory])
        }
        msg_type::ACCOUNT_INFO => {
            Route::echo(tags::ACCOUNT_INFO_REQ_ID, &[RequestKind::AccountInfo])
        }
        msg_type::EXECUTION_REPORT if msg.contains(tags::MASS_STATUS_REQ_ID) => {
            Route::echo(tags::MASS_STATUS_REQ_ID, &[RequestKind::MassStatus])
        }
        msg_type::EXECUTION_REPORT | msg_type::ORDER_CANCEL_REJECT => {
            Route::echo(tags::CL_ORD_ID, RequestKind::ORDERS)
        }
        msg_type::MARKET_DATA_SNAPSHOT | msg_type::MARKET_DATA_ACK | msg_type::MARKET_DATA_REJECT => {
            Route::echo(tags::MD_REQ_ID, &[RequestKind::MarketData])
        }
        msg_type::BUSINESS_REJECT => Route {
            strategies: vec![
                MappedField {
                    tag: tags::BUSINESS_REJECT_REF_ID,
                    key: MappedKey::CorrelationId,
                },
                MappedField {
                    tag: tags::REF_SEQ_NUM,
                    key: MappedKey::SequenceNumber,
                },
                FirstUnmatched,
            ],
            kinds: RequestKind::ALL,
        },
        msg_type::REJECT => Route {
            strategies: vec![
                MappedField {
                    tag: tags::REF_SEQ_NUM,
                    key: MappedKey::SequenceNumber,
                },
                FirstUnmatched,
            ],
            kinds: RequestKind::ALL,
        },
        msg_type::HEARTBEAT if msg.contains(tags::TEST_REQ_ID) => {
            Route::echo(tags::TEST_REQ_ID, &[RequestKind::TestRequest])
        }
        _ => return None,
    };
    Some(route)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn of(msg_type: &str) -> ProtocolMessage {
        ProtocolMessage::new().with(tags::MSG_TYPE, msg_type)
    }

    #[test]
    fn test_execution_report_routes() {
        let order = route(&of("8")).unwrap();
        assert_eq!(order.strategies, vec![Correlation::DirectEcho(tags::CL_ORD_ID)]);
        assert_eq!(order.kinds, RequestKind::ORDERS);

        let mass = route(&of("8").with(tags::MASS_STATUS_REQ_ID, "MSR_1")).unwrap();
        assert_eq!(
            mass.strategies,
            vec![Correlation::DirectEcho(tags::MASS_STATUS_REQ_ID)]
        );
    }

    #[test]
    fn test_heartbeat_only_routes_with_test_req_id() {
        assert!(route(&of("0")).is_none());
        assert!(route(&of("0").with(tags::TEST_REQ_ID, "TEST_1")).is_some());
    }

    #[test]
    fn test_unsolicited_types_have_no_route() {
        assert!(route(&of("X")).is_none());
        assert!(route(&of("A")).is_none());
        assert!(route(&ProtocolMessage::new()).is_none());
    }

    #[test]
    fn test_session_reject_falls_back_to_first_unmatched() {
        let r = route(&of("3")).unwrap();
        assert_eq!(r.strategies.last(), Some(&Correlation::FirstUnmatched));
        assert_eq!(r.kinds, RequestKind::ALL);
    }
}
