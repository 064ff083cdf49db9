//! Session lifecycle states

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

/// ```text
/// Disconnected -> LoggingOn -> Active -> LoggingOut -> Disconnected
///                     |          |            |
///                     +----------+------------+--> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum SessionState {
    Disconnected = 0,
    LoggingOn = 1,
    Active = 2,
    LoggingOut = 3,
    Failed = 4,
}

impl SessionState {
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionState::LoggingOn,
            2 => SessionState::Active,
            3 => SessionState::LoggingOut,
            4 => SessionState::Failed,
            _ => SessionState::Disconnected,
        }
    }

    pub fn is_active(self) -> bool {
        self == SessionState::Active
    }

    /// No further traffic will flow on this session
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Disconnected | SessionState::Failed)
    }

    pub fn can_transition(self, to: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, to),
            (Disconnected, LoggingOn)
                | (LoggingOn, Active)
                | (LoggingOn, Disconnected)
                | (LoggingOn, Failed)
                | (Active, LoggingOut)
                | (Active, Disconnected)
                | (Active, Failed)
                | (LoggingOut, Disconnected)
                | (LoggingOut, Failed)
        )
    }
}

/// State and activity shared between a session task and its observers
#[derive(Debug, Clone)]
pub struct SessionStatus {
    inner: Arc<StatusInner>,
}

#[derive(Debug)]
struct StatusInner {
    state: AtomicU8,
    last_activity_ms: AtomicI64,
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StatusInner {
                state: AtomicU8::new(SessionState::Disconnected as u8),
                last_activity_ms: AtomicI64::new(Utc::now().timestamp_millis()),
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.inner.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: SessionState) {
        self.inner.state.store(state as u8, Ordering::Release);
    }

    pub fn touch(&self) {
        self.inner
            .last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Release);
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        let ms = self.inner.last_activity_ms.load(Ordering::Acquire);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now)
    }

    /// Time since the last inbound or outbound traffic
    pub fn idle_for(&self) -> chrono::Duration {
        Utc::now() - self.last_activity()
    }
}
