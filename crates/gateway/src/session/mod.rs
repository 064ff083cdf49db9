//! Session state machine
//!
//! A [`Session`] owns one [`SessionTransport`] and drives the
//! administrative side of the protocol: logon, heartbeats and test requests,
//! peer logout, and our own logout. Application messages pass through
//! [`Session::process`] untouched so the worker can route them.

mod state;

pub use state::{SessionState, SessionStatus};

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::codec::tags::{self, msg_type};
use crate::codec::{Field, ProtocolMessage};
use crate::error::{SessionError, TransportError};
use crate::transport::{Received, SessionTransport};

/// Logon credentials for one user
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub device_id: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            device_id: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"****")
            .field("device_id", &self.device_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Used in log lines, e.g. `alice/feed`
    pub name: String,
    pub heartbeat_interval: Duration,
    pub protocol_spec: Option<String>,
    pub logout_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            name: "session".to_string(),
            heartbeat_interval: Duration::from_secs(30),
            protocol_spec: None,
            logout_timeout: Duration::from_secs(2),
        }
    }
}

pub struct Session<T> {
    transport: T,
    settings: SessionSettings,
    status: SessionStatus,
    created_at: DateTime<Utc>,
    last_heartbeat: Option<DateTime<Utc>>,
    last_sent: Instant,
    last_received: Instant,
    /// TestReqID of our unanswered probe
    outstanding_probe: Option<String>,
}

impl<T: SessionTransport> Session<T> {
    pub fn new(transport: T, settings: SessionSettings, status: SessionStatus) -> Self {
        let now = Instant::now();
        status.set_state(SessionState::Disconnected);
        Self {
            transport,
            settings,
            status,
            created_at: Utc::now(),
            last_heartbeat: None,
            last_sent: now,
            last_received: now,
            outstanding_probe: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    pub fn status(&self) -> &SessionStatus {
        &self.status
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    pub fn next_seq_num(&self) -> u64 {
        self.transport.next_seq_num()
    }

    fn transition(&mut self, to: SessionState) {
        let from = self.status.state();
        if from == to {
            return;
        }
        if !from.can_transition(to) {
            warn!("[{}] Unexpected transition {from:?} -> {to:?}", self.settings.name);
        }
        debug!("[{}] {from:?} -> {to:?}", self.settings.name);
        self.status.set_state(to);
    }

    fn mark_received(&mut self) {
        self.last_received = Instant::now();
        self.status.touch();
    }

    async fn send(&mut self, msg_type: &str, fields: &[Field]) -> Result<u64, TransportError> {
        match self.transport.send(msg_type, fields).await {
            Ok(seq) => {
                self.last_sent = Instant::now();
                self.status.touch();
                Ok(seq)
            }
            Err(e) => {
                warn!("[{}] Send of {msg_type} failed: {e}", self.settings.name);
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Send Logon and wait for the venue's answer.
    ///
    /// Outbound numbering restarts at 1.
    pub async fn logon(
        &mut self,
        credentials: &Credentials,
        timeout: Duration,
    ) -> Result<(), SessionError> {
        self.transition(SessionState::LoggingOn);
        self.transport.reset_sequence();
        self.outstanding_probe = None;

        let mut fields = vec![
            Field::new(tags::ENCRYPT_METHOD, "1"),
            Field::new(
                tags::HEARTBEAT_INTERVAL,
                self.settings.heartbeat_interval.as_secs().to_string(),
            ),
            Field::new(tags::RESET_SEQ_NUM_FLAG, "Y"),
            Field::new(tags::USERNAME, credentials.username.as_str()),
            Field::new(tags::PASSWORD, credentials.password.as_str()),
        ];
        if let Some(device_id) = &credentials.device_id {
            fields.push(Field::new(tags::DEVICE_ID, device_id.as_str()));
        }
        if let Some(spec) = &self.settings.protocol_spec {
            fields.push(Field::new(tags::PROTOCOL_SPEC, spec.as_str()));
        }

        info!("[{}] Logging on as {}", self.settings.name, credentials.username);
        self.send(msg_type::LOGON, &fields).await?;

        let deadline = Instant::now() + timeout;
        loop {
            match self.transport.recv(Some(deadline)).await {
                Ok(Received::Message(msg)) => {
                    self.mark_received();
                    match msg.msg_type() {
                        Some(msg_type::LOGON) => {
                            self.transition(SessionState::Active);
                            info!("[{}] Logon accepted", self.settings.name);
                            return Ok(());
                        }
                        Some(msg_type::LOGOUT) | Some(msg_type::REJECT) => {
                            let reason = msg.text().unwrap_or("Invalid credentials").to_string();
                            warn!("[{}] Logon rejected: {reason}", self.settings.name);
                            self.transport.close().await;
                            self.transition(SessionState::Disconnected);
                            return Err(SessionError::Rejected(reason));
                        }
                        Some(msg_type::TEST_REQUEST) => {
                            let id = msg.get(tags::TEST_REQ_ID).map(str::to_string);
                            self.send_heartbeat(id.as_deref()).await?;
                        }
                        other => {
                            debug!("[{}] Ignoring {other:?} before logon ack", self.settings.name)
                        }
                    }
                }
                Ok(Received::Idle) => continue,
                Ok(Received::Closed) => {
                    warn!("[{}] Connection closed during logon", self.settings.name);
                    self.transition(SessionState::Failed);
                    return Err(TransportError::Closed.into());
                }
                Err(TransportError::Timeout) => {
                    warn!("[{}] No logon response within {timeout:?}", self.settings.name);
                    self.transport.close().await;
                    self.transition(SessionState::Disconnected);
                    return Err(SessionError::LogonTimeout);
                }
                Err(e) => {
                    self.transition(SessionState::Failed);
                    return Err(e.into());
                }
            }
        }
    }

    /// Heartbeat, echoing `test_req_id` when answering a probe
    pub async fn send_heartbeat(&mut self, test_req_id: Option<&str>) -> Result<(), SessionError> {
        let fields: Vec<Field> = test_req_id
            .map(|id| Field::new(tags::TEST_REQ_ID, id))
            .into_iter()
            .collect();
        self.send(msg_type::HEARTBEAT, &fields).await?;
        self.last_heartbeat = Some(Utc::now());
        Ok(())
    }

    /// Probe the peer; returns the TestReqID used
    pub async fn send_test_request(&mut self) -> Result<String, SessionError> {
        let id = format!("TEST_{}", Utc::now().timestamp_millis());
        self.send(
            msg_type::TEST_REQUEST,
            &[Field::new(tags::TEST_REQ_ID, id.as_str())],
        )
        .await?;
        self.outstanding_probe = Some(id.clone());
        Ok(id)
    }

    /// Send an application message; only valid while `Active`
    pub async fn submit(&mut self, msg_type: &str, fields: &[Field]) -> Result<u64, SessionError> {
        let state = self.state();
        if state != SessionState::Active {
            return Err(SessionError::NotActive(state));
        }
        Ok(self.send(msg_type, fields).await?)
    }

    /// Next inbound message, `None` once the peer closed.
    ///
    /// Cancellation safe.
    pub async fn recv(&mut self) -> Result<Option<ProtocolMessage>, TransportError> {
        match self.transport.next_message().await {
            Ok(Some(msg)) => {
                self.mark_received();
                Ok(Some(msg))
            }
            Ok(None) => {
                if self.state() == SessionState::LoggingOut {
                    self.transition(SessionState::Disconnected);
                } else if !self.state().is_terminal() {
                    warn!("[{}] Connection closed by peer", self.settings.name);
                    self.transition(SessionState::Failed);
                }
                Ok(None)
            }
            Err(e) => {
                warn!("[{}] Read failed: {e}", self.settings.name);
                self.transition(SessionState::Failed);
                Err(e)
            }
        }
    }

    /// Handle session-level messages; anything the caller must route is
    /// handed back.
    pub async fn process(
        &mut self,
        msg: ProtocolMessage,
    ) -> Result<Option<ProtocolMessage>, SessionError> {
        match msg.msg_type() {
            Some(msg_type::TEST_REQUEST) => {
                let id = msg.get(tags::TEST_REQ_ID).map(str::to_string);
                self.send_heartbeat(id.as_deref()).await?;
                Ok(None)
            }
            Some(msg_type::HEARTBEAT) => match msg.get(tags::TEST_REQ_ID) {
                Some(id) if self.outstanding_probe.as_deref() == Some(id) => {
                    self.outstanding_probe = None;
                    Ok(None)
                }
                Some(_) => Ok(Some(msg)),
                None => Ok(None),
            },
            Some(msg_type::LOGOUT) => {
                if self.state() == SessionState::LoggingOut {
                    self.transport.close().await;
                    self.transition(SessionState::Disconnected);
                    return Ok(None);
                }
                warn!(
                    "[{}] Venue logged us out: {}",
                    self.settings.name,
                    msg.text().unwrap_or("no reason given")
                );
                self.transition(SessionState::LoggingOut);
                if let Err(e) = self.transport.send(msg_type::LOGOUT, &[]).await {
                    debug!("[{}] Logout ack not sent: {e}", self.settings.name);
                }
                self.transport.close().await;
                self.transition(SessionState::Disconnected);
                Ok(None)
            }
            Some(msg_type::LOGON) => {
                debug!("[{}] Duplicate logon ack ignored", self.settings.name);
                Ok(None)
            }
            Some(msg_type::REJECT) => {
                warn!(
                    "[{}] Session reject for seq {}: {}",
                    self.settings.name,
                    msg.get(tags::REF_SEQ_NUM).unwrap_or("?"),
                    msg.text().unwrap_or("")
                );
                Ok(Some(msg))
            }
            _ => Ok(Some(msg)),
        }
    }

    /// Keepalive duties; call at least once per second
    pub async fn on_timer(&mut self) -> Result<(), SessionError> {
        if self.state() != SessionState::Active {
            return Ok(());
        }
        let now = Instant::now();
        let interval = self.settings.heartbeat_interval;
        let silent = now.saturating_duration_since(self.last_received);

        if silent >= interval * 3 {
            warn!(
                "[{}] Nothing received for {:?}, peer considered dead",
                self.settings.name, silent
            );
            self.transition(SessionState::Failed);
            self.transport.close().await;
            return Err(SessionError::PeerUnresponsive);
        }
        if silent >= interval * 2 && self.outstanding_probe.is_none() {
            let id = self.send_test_request().await?;
            debug!("[{}] Probing quiet peer with {id}", self.settings.name);
        }
        if now.saturating_duration_since(self.last_sent) >= interval {
            self.send_heartbeat(None).await?;
        }
        Ok(())
    }

    /// Log out and close. Safe to call in any state.
    pub async fn logout(&mut self) -> Result<(), SessionError> {
        match self.state() {
            SessionState::Disconnected | SessionState::Failed => {
                self.transport.close().await;
                return Ok(());
            }
            SessionState::LoggingOn | SessionState::LoggingOut => {
                self.transport.close().await;
                self.transition(SessionState::Disconnected);
                return Ok(());
            }
            SessionState::Active => {}
        }

        self.transition(SessionState::LoggingOut);
        info!("[{}] Logging out", self.settings.name);
        if let Err(e) = self
            .transport
            .send(msg_type::LOGOUT, &[Field::new(tags::TEXT, "User logout")])
            .await
        {
            debug!("[{}] Logout not sent: {e}", self.settings.name);
            self.transport.close().await;
            self.transition(SessionState::Disconnected);
            return Ok(());
        }

        let deadline = Instant::now() + self.settings.logout_timeout;
        loop {
            match self.transport.recv(Some(deadline)).await {
                Ok(Received::Message(msg)) => match msg.msg_type() {
                    Some(msg_type::LOGOUT) => break,
                    Some(msg_type::TEST_REQUEST) => {
                        let id = msg.get(tags::TEST_REQ_ID).map(str::to_string);
                        let fields: Vec<Field> = id
                            .map(|id| Field::new(tags::TEST_REQ_ID, id))
                            .into_iter()
                            .collect();
                        if let Err(e) = self.transport.send(msg_type::HEARTBEAT, &fields).await {
                            warn!(
                                "[{}] Heartbeat during logout failed: {e}",
                                self.settings.name
                            );
                            break;
                        }
                    }
                    other => debug!(
                        "[{}] Dropping {other:?} while logging out",
                        self.settings.name
                    ),
                },
                Ok(Received::Idle) => continue,
                Ok(Received::Closed) => break,
                Err(TransportError::Timeout) => {
                    debug!("[{}] No logout ack, closing anyway", self.settings.name);
                    break;
                }
                Err(e) => {
                    debug!("[{}] Read during logout failed: {e}", self.settings.name);
                    break;
                }
            }
        }

        self.transport.close().await;
        self.transition(SessionState::Disconnected);
        info!("[{}] Logged out", self.settings.name);
        Ok(())
    }

    /// Close without logging out
    pub async fn close(&mut self) {
        self.transport.close().await;
        if !self.state().is_terminal() {
            self.transition(SessionState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{DecodeOptions, Encoder};
    use crate::transport::FramedTransport;
    use tokio::io::DuplexStream;

    type Venue = FramedTransport<DuplexStream>;

    fn pair(heartbeat: Duration) -> (Session<FramedTransport<DuplexStream>>, Venue) {
        let (a, b) = tokio::io::duplex(1 << 16);
        let client = FramedTransport::new(
            a,
            Encoder::new("FIX.4.4", "CLIENT", "VENUE"),
            DecodeOptions::strict(),
            Duration::from_millis(50),
            1 << 16,
        );
        let venue = FramedTransport::new(
            b,
            Encoder::new("FIX.4.4", "VENUE", "CLIENT"),
            DecodeOptions::strict(),
            Duration::from_millis(50),
            1 << 16,
        );
        let settings = SessionSettings {
            name: "test/feed".into(),
            heartbeat_interval: heartbeat,
            protocol_spec: Some("FIX44".into()),
            logout_timeout: Duration::from_millis(200),
        };
        (Session::new(client, settings, SessionStatus::new()), venue)
    }

    async fn next(venue: &mut Venue) -> ProtocolMessage {
        venue.next_message().await.unwrap().unwrap()
    }

    async fn logged_on(heartbeat: Duration) -> (Session<FramedTransport<DuplexStream>>, Venue) {
        let (mut session, mut venue) = pair(heartbeat);
        let venue_task = tokio::spawn(async move {
            let logon = next(&mut venue).await;
            assert_eq!(logon.msg_type(), Some("A"));
            venue.send("A", &[]).await.unwrap();
            venue
        });
        session
            .logon(&Credentials::new("alice", "secret"), Duration::from_secs(2))
            .await
            .unwrap();
        (session, venue_task.await.unwrap())
    }

    #[tokio::test]
    async fn test_logon_fields_and_activation() {
        let (mut session, mut venue) = pair(Duration::from_secs(30));
        let venue_task = tokio::spawn(async move {
            let logon = next(&mut venue).await;
            venue.send("A", &[]).await.unwrap();
            logon
        });

        session
            .logon(
                &Credentials::new("alice", "secret").with_device_id("dev-1"),
                Duration::from_secs(2),
            )
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Active);

        let logon = venue_task.await.unwrap();
        assert_eq!(logon.seq_num(), Some(1));
        assert_eq!(logon.get(tags::ENCRYPT_METHOD), Some("1"));
        assert_eq!(logon.get(tags::HEARTBEAT_INTERVAL), Some("30"));
        assert_eq!(logon.get(tags::RESET_SEQ_NUM_FLAG), Some("Y"));
        assert_eq!(logon.get(tags::USERNAME), Some("alice"));
        assert_eq!(logon.get(tags::PASSWORD), Some("secret"));
        assert_eq!(logon.get(tags::DEVICE_ID), Some("dev-1"));
        assert_eq!(logon.get(tags::PROTOCOL_SPEC), Some("FIX44"));
        assert_eq!(session.next_seq_num(), 2);
    }

    #[tokio::test]
    async fn test_logon_rejected_by_logout() {
        let (mut session, mut venue) = pair(Duration::from_secs(30));
        tokio::spawn(async move {
            next(&mut venue).await;
            venue
                .send("5", &[Field::new(tags::TEXT, "Invalid password")])
                .await
                .unwrap();
            venue
        });

        let err = session
            .logon(&Credentials::new("alice", "wrong"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Rejected(ref r) if r == "Invalid password"));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_logon_timeout() {
        let (mut session, _venue) = pair(Duration::from_secs(30));
        let err = session
            .logon(&Credentials::new("alice", "secret"), Duration::from_millis(150))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::LogonTimeout));
        assert_eq!(session.state(), SessionState::Disconnected);
    }

    #[tokio::test]
    async fn test_submit_requires_active() {
        let (mut session, _venue) = pair(Duration::from_secs(30));
        let err = session.submit("x", &[]).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotActive(SessionState::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_inbound_test_request_is_answered() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;

        venue
            .send("1", &[Field::new(tags::TEST_REQ_ID, "PING_7")])
            .await
            .unwrap();
        let msg = session.recv().await.unwrap().unwrap();
        assert!(session.process(msg).await.unwrap().is_none());

        let reply = next(&mut venue).await;
        assert_eq!(reply.msg_type(), Some("0"));
        assert_eq!(reply.get(tags::TEST_REQ_ID), Some("PING_7"));
    }

    #[tokio::test]
    async fn test_application_messages_pass_through() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        venue
            .send("y", &[Field::new(tags::SECURITY_REQ_ID, "SLR_1")])
            .await
            .unwrap();
        let msg = session.recv().await.unwrap().unwrap();
        let routed = session.process(msg).await.unwrap().unwrap();
        assert_eq!(routed.get(tags::SECURITY_REQ_ID), Some("SLR_1"));
    }

    #[tokio::test]
    async fn test_peer_logout_disconnects() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        venue
            .send("5", &[Field::new(tags::TEXT, "Maintenance")])
            .await
            .unwrap();
        let msg = session.recv().await.unwrap().unwrap();
        assert!(session.process(msg).await.unwrap().is_none());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert_eq!(next(&mut venue).await.msg_type(), Some("5"));
    }

    #[tokio::test]
    async fn test_logout_with_ack_is_idempotent() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        let venue_task = tokio::spawn(async move {
            let logout = next(&mut venue).await;
            assert_eq!(logout.text(), Some("User logout"));
            venue.send("5", &[]).await.unwrap();
            venue
        });

        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        venue_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_test_request_during_logout_is_answered() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        let venue_task = tokio::spawn(async move {
            assert_eq!(next(&mut venue).await.msg_type(), Some("5"));
            venue
                .send("1", &[Field::new(tags::TEST_REQ_ID, "TEST_late")])
                .await
                .unwrap();
            let answer = next(&mut venue).await;
            assert_eq!(answer.msg_type(), Some("0"));
            assert_eq!(answer.get(tags::TEST_REQ_ID), Some("TEST_late"));
            venue.send("5", &[]).await.unwrap();
        });

        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        venue_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_logout_ends_when_answer_cannot_be_sent() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        let venue_task = tokio::spawn(async move {
            assert_eq!(next(&mut venue).await.msg_type(), Some("5"));
            venue
                .send("1", &[Field::new(tags::TEST_REQ_ID, "TEST_gone")])
                .await
                .unwrap();
            // Venue goes away without acknowledging
        });

        let started = tokio::time::Instant::now();
        session.logout().await.unwrap();
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(started.elapsed() < Duration::from_millis(150));
        venue_task.await.unwrap();
    }

    #[tokio::test]
    async fn test_heartbeat_probe_and_dead_peer() {
        let interval = Duration::from_secs(10);
        let (mut session, mut venue) = logged_on(interval).await;
        tokio::time::pause();

        // One interval of send silence: heartbeat
        tokio::time::advance(interval).await;
        session.on_timer().await.unwrap();
        assert_eq!(next(&mut venue).await.msg_type(), Some("0"));

        // Two intervals of inbound silence: test request
        tokio::time::advance(interval).await;
        session.on_timer().await.unwrap();
        let probe = next(&mut venue).await;
        assert_eq!(probe.msg_type(), Some("1"));
        assert!(probe.get(tags::TEST_REQ_ID).unwrap().starts_with("TEST_"));

        // Three intervals: dead
        tokio::time::advance(interval).await;
        let err = session.on_timer().await.unwrap_err();
        assert!(matches!(err, SessionError::PeerUnresponsive));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_probe_answer_is_consumed() {
        let (mut session, mut venue) = logged_on(Duration::from_secs(30)).await;
        let id = session.send_test_request().await.unwrap();
        let probe = next(&mut venue).await;
        assert_eq!(probe.get(tags::TEST_REQ_ID), Some(id.as_str()));

        venue
            .send("0", &[Field::new(tags::TEST_REQ_ID, id.as_str())])
            .await
            .unwrap();
        let msg = session.recv().await.unwrap().unwrap();
        assert!(session.process(msg).await.unwrap().is_none());

        // A heartbeat echoing some other id belongs to a caller's test request
        venue
            .send("0", &[Field::new(tags::TEST_REQ_ID, "TEST_other")])
            .await
            .unwrap();
        let msg = session.recv().await.unwrap().unwrap();
        assert!(session.process(msg).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_peer_close_fails_session() {
        let (mut session, venue) = logged_on(Duration::from_secs(30)).await;
        drop(venue);
        assert!(session.recv().await.unwrap().is_none());
        assert_eq!(session.state(), SessionState::Failed);
    }
}
