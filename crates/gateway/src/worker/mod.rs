//! Session workers
//!
//! One tokio task per `(user, connection class)` owns a [`Session`] and its
//! book normalizer. Callers talk to it through a cloneable [`WorkerHandle`]:
//! requests are registered in the shared [`PendingTable`], the wire write is
//! queued as a [`WorkerCommand`], and the caller waits on a oneshot until
//! the correlated response arrives or its deadline passes.
//!
//! ```text
//!  handle.submit ──► PendingTable (insert) ──► mpsc ──► event loop ──► venue
//!        ▲                                              │
//!        └──────── oneshot ◄── interpret ◄── correlate ◄┘ inbound
//! ```

pub mod command;
pub mod correlation;
pub mod pending;
pub mod request;
pub mod response;
pub mod supervisor;

pub use command::WorkerCommand;
pub use correlation::{Correlation, MappedKey, Route};
pub use pending::{PendingRequest, PendingTable};
pub use request::{Prepared, Request, RequestKind};
pub use response::ResponseData;
pub use supervisor::Supervisor;

use std::fmt;
use std::future::Future;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use fixgate_core::ConnectionClass;
use log::{debug, error, info, warn};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::codec::{Field, ProtocolMessage};
use crate::error::{ConnectError, RequestError, RequestErrorKind, SessionError, TransportError};
use crate::market_data::{BookNormalizer, BookPublisher, IncrementalPolicy};
use crate::messages::MarketDataMessage;
use crate::session::{Credentials, Session, SessionSettings, SessionState, SessionStatus};
use crate::transport::SessionTransport;

use response::Disposition;

/// How long past its deadline an entry may linger before the sweep drops it
const SWEEP_GRACE: Duration = Duration::from_secs(1);

/// Identity of a worker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkerKey {
    pub user_id: String,
    pub class: ConnectionClass,
}

impl WorkerKey {
    pub fn new(user_id: impl Into<String>, class: ConnectionClass) -> Self {
        Self {
            user_id: user_id.into(),
            class,
        }
    }
}

impl fmt::Display for WorkerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.class)
    }
}

/// Everything a worker needs besides its transport
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub key: WorkerKey,
    pub credentials: Credentials,
    pub settings: SessionSettings,
    pub logon_timeout: Duration,
    pub timer_resolution: Duration,
    pub command_buffer: usize,
    pub incremental_policy: IncrementalPolicy,
}

impl WorkerConfig {
    pub fn new(key: WorkerKey, credentials: Credentials) -> Self {
        let settings = SessionSettings {
            name: key.to_string(),
            ..SessionSettings::default()
        };
        Self {
            key,
            credentials,
            settings,
            logon_timeout: Duration::from_secs(30),
            timer_resolution: Duration::from_secs(1),
            command_buffer: 256,
            incremental_policy: IncrementalPolicy::default(),
        }
    }
}

/// Point-in-time view of a worker
#[derive(Debug, Clone, Serialize)]
pub struct WorkerStatus {
    pub user_id: String,
    pub class: ConnectionClass,
    pub state: SessionState,
    pub alive: bool,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub uptime_secs: i64,
    pub pending_requests: usize,
}

/// Caller-side handle to a running worker
#[derive(Clone)]
pub struct WorkerHandle {
    key: WorkerKey,
    commands: mpsc::Sender<WorkerCommand>,
    pending: Arc<Mutex<PendingTable>>,
    status: SessionStatus,
    started_at: DateTime<Utc>,
    finished: Arc<AtomicBool>,
}

impl fmt::Debug for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerHandle")
            .field("key", &self.key)
            .field("state", &self.state())
            .finish()
    }
}

impl WorkerHandle {
    pub fn key(&self) -> &WorkerKey {
        &self.key
    }

    pub fn state(&self) -> SessionState {
        self.status.state()
    }

    /// Task still running and session not terminal
    pub fn is_alive(&self) -> bool {
        !self.finished.load(Ordering::Acquire) && !self.state().is_terminal()
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.status.last_activity()
    }

    pub fn idle_for(&self) -> chrono::Duration {
        self.status.idle_for()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn status_report(&self) -> WorkerStatus {
        WorkerStatus {
            user_id: self.key.user_id.clone(),
            class: self.key.class,
            state: self.state(),
            alive: self.is_alive(),
            started_at: self.started_at,
            last_activity: self.last_activity(),
            uptime_secs: (Utc::now() - self.started_at).num_seconds(),
            pending_requests: self.pending_count(),
        }
    }

    /// Send a request and wait for its correlated response.
    ///
    /// On timeout the pending entry is removed; a late response is dropped.
    pub async fn submit(
        &self,
        request: &Request,
        timeout: Duration,
    ) -> Result<ResponseData, RequestError> {
        let state = self.state();
        if !state.is_active() || !self.is_alive() {
            return Err(RequestError::session_not_active(format!(
                "Session {} is {state:?}",
                self.key
            )));
        }

        let Prepared {
            kind,
            msg_type,
            fields,
            correlation,
        } = request.prepare()?;
        let deadline = Instant::now() + timeout;

        let Some((id, echo_tag)) = correlation else {
            self.enqueue(msg_type, fields, None, deadline, timeout).await?;
            return Ok(ResponseData::Accepted);
        };

        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .insert(PendingRequest::new(id.as_str(), kind, echo_tag, deadline, tx))?;
        if let Err(e) = self
            .enqueue(msg_type, fields, Some(id.clone()), deadline, timeout)
            .await
        {
            self.pending.lock().remove(&id);
            return Err(e);
        }
        debug!("[{}] {kind:?} {id} submitted", self.key);

        match tokio::time::timeout_at(deadline, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(RequestError::session_not_active(format!(
                "Session {} closed before responding",
                self.key
            ))),
            Err(_) => {
                self.pending.lock().remove(&id);
                warn!("[{}] {kind:?} {id} timed out after {timeout:?}", self.key);
                Err(RequestError::timeout(timeout))
            }
        }
    }

    async fn enqueue(
        &self,
        msg_type: &str,
        fields: Vec<Field>,
        correlation_id: Option<String>,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<(), RequestError> {
        let command = WorkerCommand::Send {
            msg_type: msg_type.to_string(),
            fields,
            correlation_id,
        };
        match tokio::time::timeout_at(deadline, self.commands.send(command)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(RequestError::session_not_active(format!(
                "Worker {} stopped",
                self.key
            ))),
            Err(_) => Err(RequestError::timeout(timeout)),
        }
    }

    /// Queue a heartbeat
    pub async fn heartbeat(&self) -> Result<(), RequestError> {
        self.command(WorkerCommand::Heartbeat).await
    }

    /// Ask the worker to forget a symbol's cached book
    pub async fn drop_book(&self, symbol: &str) -> Result<(), RequestError> {
        self.command(WorkerCommand::DropBook {
            symbol: symbol.to_string(),
        })
        .await
    }

    async fn command(&self, command: WorkerCommand) -> Result<(), RequestError> {
        if !self.is_alive() {
            return Err(RequestError::session_not_active(format!(
                "Session {} is {:?}",
                self.key,
                self.state()
            )));
        }
        self.commands.send(command).await.map_err(|_| {
            RequestError::session_not_active(format!("Worker {} stopped", self.key))
        })
    }

    /// Ask the worker to log out and exit; true if it finished in time
    pub(crate) async fn request_shutdown(&self, timeout: Duration) -> bool {
        let (done_tx, done_rx) = oneshot::channel();
        let shutdown = async {
            if self
                .commands
                .send(WorkerCommand::Shutdown { done: done_tx })
                .await
                .is_err()
            {
                // Loop already gone
                return;
            }
            let _ = done_rx.await;
        };
        tokio::time::timeout(timeout, shutdown).await.is_ok()
    }
}

/// Open a transport, log on, and start the worker's event loop.
///
/// Resolves once logon has succeeded or failed.
pub async fn spawn<T, F, Fut>(
    config: WorkerConfig,
    publisher: Arc<BookPublisher>,
    open: F,
) -> Result<(WorkerHandle, JoinHandle<()>), ConnectError>
where
    T: SessionTransport + 'static,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, TransportError>> + Send + 'static,
{
    let (commands_tx, commands_rx) = mpsc::channel(config.command_buffer.max(1));
    let pending = Arc::new(Mutex::new(PendingTable::new()));
    let status = SessionStatus::new();
    let finished = Arc::new(AtomicBool::new(false));
    let handle = WorkerHandle {
        key: config.key.clone(),
        commands: commands_tx,
        pending: Arc::clone(&pending),
        status: status.clone(),
        started_at: Utc::now(),
        finished: Arc::clone(&finished),
    };

    let (ready_tx, ready_rx) = oneshot::channel();
    let mut exit = ExitGuard {
        key: config.key.clone(),
        finished,
        status: status.clone(),
        pending: Arc::clone(&pending),
        clean: false,
    };
    let task = tokio::spawn(async move {
        let key = config.key.clone();
        let transport = match open().await {
            Ok(t) => t,
            Err(e) => {
                error!("[{key}] Connection failed: {e}");
                exit.finish();
                let _ = ready_tx.send(Err(ConnectError::Transport(e)));
                return;
            }
        };

        let mut session = Session::new(transport, config.settings, status);
        if let Err(e) = session.logon(&config.credentials, config.logon_timeout).await {
            warn!("[{key}] Logon failed: {e}");
            exit.finish();
            let err = match e {
                SessionError::LogonTimeout => ConnectError::Timeout(config.logon_timeout),
                other => other.into(),
            };
            let _ = ready_tx.send(Err(err));
            return;
        }
        if ready_tx.send(Ok(())).is_err() {
            info!("[{key}] Connect abandoned by caller, logging out");
            let _ = session.logout().await;
            exit.finish();
            return;
        }

        let worker = Worker {
            key,
            session,
            commands: commands_rx,
            pending,
            normalizer: BookNormalizer::new(config.incremental_policy),
            publisher,
            timer_resolution: config.timer_resolution,
        };
        worker.run().await;
        exit.finish();
    });

    match ready_rx.await {
        Ok(Ok(())) => {
            info!("[{}] Worker ready", handle.key);
            Ok((handle, task))
        }
        Ok(Err(e)) => Err(e),
        Err(_) => Err(ConnectError::WorkerUnavailable(format!(
            "worker {} exited during logon",
            handle.key
        ))),
    }
}

/// Marks the worker finished however its task ends. A task that ends
/// without [`ExitGuard::finish`] (panic or abort) leaves the session
/// `Failed` and fails whatever was still pending.
struct ExitGuard {
    key: WorkerKey,
    finished: Arc<AtomicBool>,
    status: SessionStatus,
    pending: Arc<Mutex<PendingTable>>,
    clean: bool,
}

impl ExitGuard {
    fn finish(&mut self) {
        self.clean = true;
        self.finished.store(true, Ordering::Release);
    }
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if !self.clean {
            error!("[{}] Worker task ended abnormally", self.key);
            self.status.set_state(SessionState::Failed);
            let remaining = self.pending.lock().drain();
            for entry in remaining {
                entry.resolve(Err(RequestError::transport(format!(
                    "Worker {} crashed",
                    self.key
                ))));
            }
        }
        self.finished.store(true, Ordering::Release);
    }
}

/// Loop exit carrying the shutdown acknowledgement, if one was requested
type Flow = ControlFlow<Option<oneshot::Sender<()>>>;

struct Worker<T> {
    key: WorkerKey,
    session: Session<T>,
    commands: mpsc::Receiver<WorkerCommand>,
    pending: Arc<Mutex<PendingTable>>,
    normalizer: BookNormalizer,
    publisher: Arc<BookPublisher>,
    timer_resolution: Duration,
}

impl<T: SessionTransport> Worker<T> {
    async fn run(mut self) {
        info!("[{}] Worker started", self.key);
        let mut ticker = tokio::time::interval(self.timer_resolution);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let done = loop {
            let flow = tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => ControlFlow::Break(None),
                },
                inbound = self.session.recv() => self.handle_inbound(inbound).await,
                _ = ticker.tick() => self.on_tick().await,
            };
            if let ControlFlow::Break(done) = flow {
                break done;
            }
        };

        self.teardown().await;
        if let Some(done) = done {
            let _ = done.send(());
        }
    }

    async fn handle_command(&mut self, command: WorkerCommand) -> Flow {
        match command {
            WorkerCommand::Send {
                msg_type,
                fields,
                correlation_id,
            } => match self.session.submit(&msg_type, &fields).await {
                Ok(seq) => {
                    if let Some(id) = correlation_id {
                        self.pending.lock().mark_sent(&id, seq);
                    }
                }
                Err(e) => {
                    warn!("[{}] {msg_type} not sent: {e}", self.key);
                    if let Some(id) = correlation_id {
                        let entry = self.pending.lock().remove(&id);
                        if let Some(entry) = entry {
                            entry.resolve(Err(request_error(&e)));
                        }
                    }
                    if self.session.state().is_terminal() {
                        return ControlFlow::Break(None);
                    }
                }
            },
            WorkerCommand::DropBook { symbol } => {
                if self.normalizer.discard(&symbol) {
                    debug!("[{}] Book for {symbol} discarded", self.key);
                }
            }
            WorkerCommand::Heartbeat => {
                if let Err(e) = self.session.send_heartbeat(None).await {
                    warn!("[{}] Heartbeat not sent: {e}", self.key);
                }
            }
            WorkerCommand::Shutdown { done } => {
                info!("[{}] Shutdown requested", self.key);
                return ControlFlow::Break(Some(done));
            }
        }
        self.continue_unless_terminal()
    }

    async fn handle_inbound(
        &mut self,
        inbound: Result<Option<ProtocolMessage>, TransportError>,
    ) -> Flow {
        match inbound {
            Ok(Some(msg)) => match self.session.process(msg).await {
                Ok(Some(app)) => self.route(app),
                Ok(None) => {}
                Err(e) => warn!("[{}] Session handling failed: {e}", self.key),
            },
            Ok(None) => {
                info!("[{}] Connection closed", self.key);
                return ControlFlow::Break(None);
            }
            Err(e) => {
                error!("[{}] Transport failure: {e}", self.key);
                return ControlFlow::Break(None);
            }
        }
        self.continue_unless_terminal()
    }

    async fn on_tick(&mut self) -> Flow {
        if let Err(e) = self.session.on_timer().await {
            warn!("[{}] Keepalive failed: {e}", self.key);
        }

        // Callers time out on their own; this only reclaims abandoned entries
        if let Some(cutoff) = Instant::now().checked_sub(SWEEP_GRACE) {
            let expired = self.pending.lock().sweep_expired(cutoff);
            for entry in expired {
                debug!("[{}] Sweeping expired {}", self.key, entry.correlation_id);
                entry.resolve(Err(RequestError::new(
                    RequestErrorKind::Timeout,
                    "Request expired",
                )));
            }
        }
        self.continue_unless_terminal()
    }

    fn continue_unless_terminal(&self) -> Flow {
        if self.session.state().is_terminal() {
            ControlFlow::Break(None)
        } else {
            ControlFlow::Continue(())
        }
    }

    /// Feed market data to the publisher and resolve whatever request the
    /// message answers
    fn route(&mut self, msg: ProtocolMessage) {
        let market_data = MarketDataMessage::parse(&msg);
        if let Some(md) = &market_data {
            let snapshot = self.normalizer.apply(md);
            let delivered = self.publisher.publish(&snapshot);
            debug!(
                "[{}] Book {} published to {delivered} subscribers",
                self.key, md.symbol
            );
        }

        let Some(route) = correlation::route(&msg) else {
            if market_data.is_none() {
                debug!(
                    "[{}] Unsolicited {} dropped",
                    self.key,
                    msg.msg_type().unwrap_or("?")
                );
            }
            return;
        };

        let mut table = self.pending.lock();
        let Some(id) = table.find(&route, &msg) else {
            if market_data.is_none() {
                debug!(
                    "[{}] No pending request for {}, dropped",
                    self.key,
                    msg.to_log_string()
                );
            }
            return;
        };
        let disposition = match table.get_mut(&id) {
            Some(entry) => response::interpret(entry, &msg),
            None => return,
        };
        if let Disposition::Complete(result) = disposition {
            if let Err(e) = &result {
                warn!("[{}] {id} failed: {e}", self.key);
            }
            if let Some(entry) = table.remove(&id) {
                entry.resolve(result);
            }
        }
    }

    async fn teardown(&mut self) {
        let failed = self.session.state() == SessionState::Failed;
        // New submissions fail fast from here on
        self.commands.close();
        if let Err(e) = self.session.logout().await {
            debug!("[{}] Logout failed: {e}", self.key);
        }

        // Queued sends own pending entries, which the drain below fails
        let mut discarded = 0;
        while let Ok(command) = self.commands.try_recv() {
            if matches!(command, WorkerCommand::Send { .. }) {
                discarded += 1;
            }
        }
        if discarded > 0 {
            debug!("[{}] Discarded {discarded} queued sends", self.key);
        }

        let remaining = self.pending.lock().drain();
        if !remaining.is_empty() {
            info!(
                "[{}] Failing {} pending requests",
                self.key,
                remaining.len()
            );
        }
        for entry in remaining {
            let err = if failed {
                RequestError::transport(format!("Session {} failed", self.key))
            } else {
                RequestError::session_not_active(format!("Session {} closed", self.key))
            };
            entry.resolve(Err(err));
        }
        info!("[{}] Worker stopped", self.key);
    }
}

fn request_error(e: &SessionError) -> RequestError {
    match e {
        SessionError::Transport(t) => RequestError::transport(t.to_string()),
        other => RequestError::session_not_active(other.to_string()),
    }
}
