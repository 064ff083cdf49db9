//! Outstanding requests of one worker
//!
//! Shared between the worker's event loop (which resolves entries) and the
//! handles (which insert entries and drop them on timeout), behind a
//! `parking_lot::Mutex`. The lock is never held across an await point.

use std::collections::HashMap;

use log::debug;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::codec::{ProtocolMessage, Tag};
use crate::error::RequestError;
use crate::messages::ExecutionReport;

use super::correlation::{Correlation, MappedKey, Route};
use super::request::RequestKind;
use super::response::ResponseData;

pub type Reply = oneshot::Sender<Result<ResponseData, RequestError>>;

/// A request awaiting its response
#[derive(Debug)]
pub struct PendingRequest {
    pub correlation_id: String,
    pub kind: RequestKind,
    /// Tag the venue echoes `correlation_id` on
    pub echo_tag: Tag,
    pub sent_seq: Option<u64>,
    pub deadline: Instant,
    order: u64,
    reply: Reply,
    /// Mass status reports received so far
    pub(crate) reports: Vec<ExecutionReport>,
}

impl PendingRequest {
    pub fn new(
        correlation_id: impl Into<String>,
        kind: RequestKind,
        echo_tag: Tag,
        deadline: Instant,
        reply: Reply,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            kind,
            echo_tag,
            sent_seq: None,
            deadline,
            order: 0,
            reply,
            reports: Vec::new(),
        }
    }

    /// Deliver the outcome; a caller that already gave up is ignored
    pub fn resolve(self, result: Result<ResponseData, RequestError>) {
        if self.reply.send(result).is_err() {
            debug!(
                "Caller for {} went away before its response",
                self.correlation_id
            );
        }
    }
}

#[derive(Debug, Default)]
pub struct PendingTable {
    entries: HashMap<String, PendingRequest>,
    next_order: u64,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a request. Ids must be unique among open requests.
    pub fn insert(&mut self, mut request: PendingRequest) -> Result<(), RequestError> {
        if self.entries.contains_key(&request.correlation_id) {
            return Err(RequestError::rejected(
                format!("Duplicate request id {}", request.correlation_id),
                None,
            ));
        }
        request.order = self.next_order;
        self.next_order += 1;
        self.entries.insert(request.correlation_id.clone(), request);
        Ok(())
    }

    pub fn remove(&mut self, correlation_id: &str) -> Option<PendingRequest> {
        self.entries.remove(correlation_id)
    }

    pub fn get_mut(&mut self, correlation_id: &str) -> Option<&mut PendingRequest> {
        self.entries.get_mut(correlation_id)
    }

    pub fn contains(&self, correlation_id: &str) -> bool {
        self.entries.contains_key(correlation_id)
    }

    /// Record the outbound sequence number the request went out with
    pub fn mark_sent(&mut self, correlation_id: &str, seq: u64) {
        if let Some(entry) = self.entries.get_mut(correlation_id) {
            entry.sent_seq = Some(seq);
        }
    }

    /// Apply a route's strategies in order; first hit wins
    pub fn find(&self, route: &Route, msg: &ProtocolMessage) -> Option<String> {
        for strategy in &route.strategies {
            let hit = match strategy {
                Correlation::DirectEcho(tag) => msg
                    .get(*tag)
                    .and_then(|id| self.entries.get(id))
                    .filter(|entry| entry.echo_tag == *tag),
                Correlation::MappedField {
                    tag,
                    key: MappedKey::CorrelationId,
                } => msg.get(*tag).and_then(|id| self.entries.get(id)),
                Correlation::MappedField {
                    tag,
                    key: MappedKey::SequenceNumber,
                } => msg
                    .get(*tag)
                    .and_then(|v| v.parse::<u64>().ok())
                    .and_then(|seq| self.entries.values().find(|e| e.sent_seq == Some(seq))),
                Correlation::FirstUnmatched => self
                    .entries
                    .values()
                    .filter(|e| route.kinds.contains(&e.kind))
                    .min_by_key(|e| e.order),
            };
            if let Some(entry) = hit.filter(|e| route.kinds.contains(&e.kind)) {
                return Some(entry.correlation_id.clone());
            }
        }
        None
    }

    /// Remove entries whose deadline has passed
    pub fn sweep_expired(&mut self, now: Instant) -> Vec<PendingRequest> {
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|e| e.deadline <= now)
            .map(|e| e.correlation_id.clone())
            .collect();
        expired
            .iter()
            .filter_map(|id| self.entries.remove(id))
            .collect()
    }

    /// Remove everything, oldest first
    pub fn drain(&mut self) -> Vec<PendingRequest> {
        let mut all: Vec<PendingRequest> = self.entries.drain().map(|(_, e)| e).collect();
        all.sort_by_key(|e| e.order);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
