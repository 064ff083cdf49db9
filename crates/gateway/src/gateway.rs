//! Caller-facing facade
//!
//! [`Gateway`] ties configuration, the connector, the [`Supervisor`] and the
//! [`BookPublisher`] together behind five operations: connect, submit,
//! subscribe, unsubscribe and disconnect.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use fixgate_core::{ConnectionClass, Symbol};
use log::{debug, info, warn};
use tokio::task::JoinHandle;

use crate::codec::{DecodeOptions, Encoder};
use crate::config::GatewayConfig;
use crate::error::{ConnectError, GatewayError, RequestError, SubscribeError, TransportError};
use crate::market_data::{BookPublisher, OrderBookListener, SubscriptionId};
use crate::messages::OrderBookSnapshot;
use crate::session::{Credentials, SessionSettings};
use crate::transport::channel::ChannelSubscriber;
use crate::transport::{Connector, FramedTransport};
use crate::worker::{
    Request, RequestKind, ResponseData, Supervisor, WorkerConfig, WorkerHandle, WorkerKey,
    WorkerStatus,
};

/// Parameters of `connect`
#[derive(Debug, Clone)]
pub struct ConnectRequest {
    pub user_id: String,
    pub class: ConnectionClass,
    pub credentials: Credentials,
    /// Overrides the credentials' device id when set
    pub device_id: Option<String>,
}

impl ConnectRequest {
    pub fn new(user_id: impl Into<String>, class: ConnectionClass, credentials: Credentials) -> Self {
        Self {
            user_id: user_id.into(),
            class,
            credentials,
            device_id: None,
        }
    }

    pub fn with_device_id(mut self, device_id: impl Into<String>) -> Self {
        self.device_id = Some(device_id.into());
        self
    }
}

/// Opaque reference to a connected session
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionRef {
    key: WorkerKey,
}

impl SessionRef {
    pub fn user_id(&self) -> &str {
        &self.key.user_id
    }

    pub fn class(&self) -> ConnectionClass {
        self.key.class
    }

    pub fn key(&self) -> &WorkerKey {
        &self.key
    }
}

/// One order book registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionRef {
    id: SubscriptionId,
    symbol: Symbol,
    session: SessionRef,
}

impl SubscriptionRef {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn session(&self) -> &SessionRef {
        &self.session
    }
}

/// Venue-side market data subscription shared by local registrations
#[derive(Debug)]
struct MarketDataSubscription {
    md_req_id: String,
    depth: u32,
    registrations: Vec<SubscriptionId>,
}

type MarketDataKey = (WorkerKey, Symbol);

pub struct Gateway {
    config: GatewayConfig,
    connector: Connector,
    supervisor: Supervisor,
    publisher: Arc<BookPublisher>,
    market_data: DashMap<MarketDataKey, MarketDataSubscription>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let connector = Connector::from_config(&config.transport)?;
        Ok(Self::with_connector(config, connector))
    }

    /// Skip validation and use the given connector
    pub fn with_connector(config: GatewayConfig, connector: Connector) -> Self {
        let publisher = Arc::new(BookPublisher::new(config.market_data.channel_capacity));
        let supervisor = Supervisor::from_config(&config, Arc::clone(&publisher));
        info!(
            "Gateway ready ({} -> {}, tls: {})",
            config.protocol.sender_comp_id,
            config.protocol.target_comp_id,
            connector.uses_tls()
        );
        Self {
            config,
            connector,
            supervisor,
            publisher,
            market_data: DashMap::new(),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn publisher(&self) -> &Arc<BookPublisher> {
        &self.publisher
    }

    /// Open a session for `(user, class)` and log on. An existing session
    /// for the same pair is replaced.
    pub async fn connect(
        &self,
        request: ConnectRequest,
        timeout: Duration,
    ) -> Result<SessionRef, ConnectError> {
        let key = WorkerKey::new(request.user_id, request.class);
        let mut credentials = request.credentials;
        if let Some(device_id) = request.device_id {
            credentials.device_id = Some(device_id);
        }
        info!("[{key}] Connecting");

        match tokio::time::timeout(timeout, self.start_worker(key.clone(), credentials)).await {
            Ok(Ok(_)) => {
                info!("[{key}] Connected");
                Ok(SessionRef { key })
            }
            Ok(Err(e)) => {
                warn!("[{key}] Connect failed: {e}");
                Err(e)
            }
            Err(_) => {
                warn!("[{key}] Connect timed out after {timeout:?}");
                Err(ConnectError::Timeout(timeout))
            }
        }
    }

    async fn start_worker(
        &self,
        key: WorkerKey,
        credentials: Credentials,
    ) -> Result<WorkerHandle, ConnectError> {
        let endpoint = self.config.transport.endpoint(key.class)?;
        let worker_config = self.worker_config(key, credentials);

        let connector = self.connector.clone();
        let protocol = self.config.protocol.clone();
        let read_timeout = self.config.transport.read_timeout();
        let open = move || async move {
            let stream = connector.connect(&endpoint).await?;
            Ok::<_, TransportError>(FramedTransport::new(
                stream,
                Encoder::new(
                    protocol.begin_string.as_str(),
                    protocol.sender_comp_id.as_str(),
                    protocol.target_comp_id.as_str(),
                ),
                DecodeOptions::default().with_checksum_mode(protocol.checksum_mode),
                read_timeout,
                protocol.max_body_len,
            ))
        };
        self.supervisor.start(worker_config, open).await
    }

    fn worker_config(&self, key: WorkerKey, credentials: Credentials) -> WorkerConfig {
        let settings = SessionSettings {
            name: key.to_string(),
            heartbeat_interval: self.config.protocol.heartbeat_interval(),
            protocol_spec: self.config.protocol.protocol_spec.clone(),
            logout_timeout: self.config.timeouts.logout_ack(),
        };
        WorkerConfig {
            key,
            credentials,
            settings,
            logon_timeout: self.config.timeouts.logon(),
            timer_resolution: self.config.supervision.timer_resolution(),
            command_buffer: self.config.supervision.command_buffer,
            incremental_policy: self.config.market_data.incremental_policy,
        }
    }

    /// Live worker for a session, recreated from stored credentials when
    /// auto-reconnect is on
    async fn handle(&self, session: &SessionRef) -> Result<WorkerHandle, RequestError> {
        if let Some(handle) = self.supervisor.get(&session.key).filter(|h| h.is_alive()) {
            return Ok(handle);
        }
        if !self.config.supervision.auto_reconnect {
            return Err(RequestError::session_not_active(format!(
                "Session {} is not connected",
                session.key
            )));
        }
        let Some(credentials) = self.supervisor.credentials(&session.key) else {
            return Err(RequestError::session_not_active(format!(
                "Session {} is not connected",
                session.key
            )));
        };

        info!("[{}] Reconnecting", session.key);
        let handle = self
            .start_worker(session.key.clone(), credentials)
            .await
            .map_err(|e| {
                RequestError::session_not_active(format!(
                    "Reconnect of {} failed: {e}",
                    session.key
                ))
            })?;
        self.resubscribe(&handle).await;
        Ok(handle)
    }

    /// Renew the venue-side subscriptions of a recreated worker
    async fn resubscribe(&self, handle: &WorkerHandle) {
        let symbols: Vec<(Symbol, u32)> = self
            .market_data
            .iter()
            .filter(|e| &e.key().0 == handle.key())
            .map(|e| (e.key().1.clone(), e.depth))
            .collect();

        for (symbol, depth) in symbols {
            let request = Request::MarketDataSubscribe {
                symbol: symbol.clone(),
                depth,
            };
            let timeout = self.config.timeouts.for_kind(RequestKind::MarketData);
            match handle.submit(&request, timeout).await {
                Ok(ResponseData::Subscribed { md_req_id, .. }) => {
                    if let Some(mut entry) =
                        self.market_data.get_mut(&(handle.key().clone(), symbol.clone()))
                    {
                        entry.md_req_id = md_req_id;
                    }
                    debug!("[{}] Resubscribed {symbol}", handle.key());
                }
                Ok(other) => warn!("[{}] Unexpected resubscribe answer: {other:?}", handle.key()),
                Err(e) => warn!("[{}] Resubscribe of {symbol} failed: {e}", handle.key()),
            }
        }
    }

    /// Send a request on a session and wait for its outcome. `None` uses the
    /// configured timeout for the request's kind.
    pub async fn submit(
        &self,
        session: &SessionRef,
        request: &Request,
        timeout: Option<Duration>,
    ) -> Result<ResponseData, RequestError> {
        if let Some(class) = request.required_class() {
            if class != session.class() {
                return Err(RequestError::rejected(
                    format!(
                        "{:?} requests need a {class} session, {} is {}",
                        request.kind(),
                        session.key,
                        session.class()
                    ),
                    None,
                ));
            }
        }
        let timeout = timeout.unwrap_or_else(|| self.config.timeouts.for_kind(request.kind()));
        let handle = self.handle(session).await?;
        handle.submit(request, timeout).await
    }

    /// Send a heartbeat on a session now
    pub async fn heartbeat(&self, session: &SessionRef) -> Result<(), RequestError> {
        self.handle(session).await?.heartbeat().await
    }

    /// Register `listener` for `symbol`'s book updates
    pub async fn subscribe(
        &self,
        session: &SessionRef,
        symbol: &str,
        depth: Option<u32>,
        listener: Arc<dyn OrderBookListener>,
    ) -> Result<SubscriptionRef, SubscribeError> {
        let depth = self.check_subscription(session, symbol, depth)?;
        let id = self.publisher.add_listener(symbol, listener);
        self.attach(session, symbol, depth, id).await
    }

    /// Like [`Gateway::subscribe`], delivering books on a channel
    pub async fn subscribe_channel(
        &self,
        session: &SessionRef,
        symbol: &str,
        depth: Option<u32>,
    ) -> Result<(SubscriptionRef, ChannelSubscriber<OrderBookSnapshot>), SubscribeError> {
        let depth = self.check_subscription(session, symbol, depth)?;
        let (id, stream) = self.publisher.add_channel(symbol);
        let subscription = self.attach(session, symbol, depth, id).await?;
        Ok((subscription, stream))
    }

    fn check_subscription(
        &self,
        session: &SessionRef,
        symbol: &str,
        depth: Option<u32>,
    ) -> Result<u32, SubscribeError> {
        if symbol.trim().is_empty() {
            return Err(SubscribeError::Invalid("empty symbol".into()));
        }
        if session.class() != ConnectionClass::Feed {
            return Err(SubscribeError::Invalid(format!(
                "market data needs a feed session, {} is {}",
                session.key,
                session.class()
            )));
        }
        let depth = depth.unwrap_or(self.config.market_data.default_depth);
        if depth == 0 {
            return Err(SubscribeError::Invalid("depth must be at least 1".into()));
        }
        Ok(depth)
    }

    /// Make sure the venue streams `symbol` on this session, then record
    /// the registration. The registration is undone on failure.
    async fn attach(
        &self,
        session: &SessionRef,
        symbol: &str,
        depth: u32,
        id: SubscriptionId,
    ) -> Result<SubscriptionRef, SubscribeError> {
        let key = (session.key.clone(), symbol.to_string());
        let subscription = SubscriptionRef {
            id,
            symbol: symbol.to_string(),
            session: session.clone(),
        };

        if let Some(mut entry) = self.market_data.get_mut(&key) {
            entry.registrations.push(id);
            debug!("[{}] {symbol} already streaming, registration added", session.key);
            return Ok(subscription);
        }

        let request = Request::MarketDataSubscribe {
            symbol: symbol.to_string(),
            depth,
        };
        let outcome = match self.handle(session).await {
            Ok(handle) => {
                handle
                    .submit(&request, self.config.timeouts.for_kind(RequestKind::MarketData))
                    .await
            }
            Err(e) => Err(e),
        };
        let md_req_id = match outcome {
            Ok(ResponseData::Subscribed { md_req_id, .. }) => md_req_id,
            Ok(other) => {
                self.publisher.remove(symbol, id);
                return Err(SubscribeError::Invalid(format!(
                    "unexpected subscription answer: {other:?}"
                )));
            }
            Err(e) => {
                self.publisher.remove(symbol, id);
                warn!("[{}] Subscribe to {symbol} failed: {e}", session.key);
                return Err(e.into());
            }
        };

        info!("[{}] Subscribed to {symbol} ({md_req_id})", session.key);
        self.market_data
            .entry(key)
            .or_insert_with(|| MarketDataSubscription {
                md_req_id,
                depth,
                registrations: Vec::new(),
            })
            .registrations
            .push(id);
        Ok(subscription)
    }

    /// Drop a registration; the last one for a symbol also stops the venue
    /// stream. Unknown or repeated unsubscribes are no-ops.
    pub async fn unsubscribe(&self, subscription: SubscriptionRef) -> Result<(), GatewayError> {
        let SubscriptionRef {
            id,
            symbol,
            session,
        } = subscription;
        self.publisher.remove(&symbol, id);

        let key = (session.key.clone(), symbol.clone());
        let emptied = match self.market_data.get_mut(&key) {
            Some(mut entry) => {
                entry.registrations.retain(|r| *r != id);
                entry.registrations.is_empty()
            }
            None => return Ok(()),
        };
        if !emptied {
            return Ok(());
        }
        let Some((_, entry)) = self.market_data.remove_if(&key, |_, e| e.registrations.is_empty())
        else {
            return Ok(());
        };

        if let Some(handle) = self.supervisor.get(&session.key).filter(|h| h.is_alive()) {
            let request = Request::MarketDataUnsubscribe {
                symbol: symbol.clone(),
                md_req_id: entry.md_req_id,
            };
            let timeout = self.config.timeouts.for_kind(RequestKind::MarketData);
            if let Err(e) = handle.submit(&request, timeout).await {
                warn!("[{}] Unsubscribe of {symbol} not sent: {e}", session.key);
            }
            if let Err(e) = handle.drop_book(&symbol).await {
                debug!("[{}] Book for {symbol} not dropped: {e}", session.key);
            }
        }
        info!("[{}] Unsubscribed from {symbol}", session.key);
        Ok(())
    }

    /// Log out and forget the session. Idempotent.
    pub async fn disconnect(&self, session: &SessionRef) -> Result<(), GatewayError> {
        let stale: Vec<MarketDataKey> = self
            .market_data
            .iter()
            .filter(|e| e.key().0 == session.key)
            .map(|e| e.key().clone())
            .collect();
        for key in stale {
            if let Some((_, entry)) = self.market_data.remove(&key) {
                for id in entry.registrations {
                    self.publisher.remove(&key.1, id);
                }
            }
        }

        if self.supervisor.forget(&session.key).await {
            info!("[{}] Disconnected", session.key);
        } else {
            debug!("[{}] Disconnect of an unknown session", session.key);
        }
        Ok(())
    }

    pub fn is_healthy(&self, session: &SessionRef) -> bool {
        self.supervisor.is_healthy(&session.key)
    }

    pub fn health(&self) -> Vec<WorkerStatus> {
        self.supervisor.health()
    }

    /// Tear down unhealthy workers
    pub async fn sweep(&self) -> Vec<WorkerKey> {
        self.supervisor.sweep().await
    }

    /// Run [`Gateway::sweep`] every `every` until the gateway is dropped
    pub fn spawn_health_monitor(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let gateway = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(gateway) = gateway.upgrade() else {
                    break;
                };
                let removed = gateway.sweep().await;
                if !removed.is_empty() {
                    info!("Health sweep removed {} workers", removed.len());
                }
            }
        })
    }

    /// Live subscriptions per session, as `symbol -> registrations`
    pub fn subscriptions(&self, session: &SessionRef) -> HashMap<Symbol, usize> {
        self.market_data
            .iter()
            .filter(|e| e.key().0 == session.key)
            .map(|e| (e.key().1.clone(), e.registrations.len()))
            .collect()
    }

    /// Disconnect every session
    pub async fn shutdown(&self) {
        self.market_data.clear();
        self.supervisor.shutdown_all().await;
    }
}
