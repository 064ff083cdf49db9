//! Gateway configuration
//!
//! Loaded from JSON (every field has a default) and then overridden from
//! `FIX_*` environment variables:
//! - protocol: begin string, comp ids, heartbeat, checksum mode
//! - transport: TLS toggle, per-class endpoints, connect/read timeouts
//! - timeouts: per request class
//! - supervision: staleness window, auto-reconnect
//! - market data: default depth, incremental policy

use std::path::Path;
use std::time::Duration;

use fixgate_core::ConnectionClass;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::codec::ChecksumMode;
use crate::market_data::IncrementalPolicy;
use crate::worker::RequestKind;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Missing setting: {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Root configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub protocol: ProtocolConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub timeouts: TimeoutConfig,

    #[serde(default)]
    pub supervision: SupervisionConfig,

    #[serde(default)]
    pub market_data: MarketDataConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Value of tag 8
    #[serde(default = "default_begin_string")]
    pub begin_string: String,

    /// Sent on logon as tag 10064 when set
    #[serde(default = "default_protocol_spec")]
    pub protocol_spec: Option<String>,

    #[serde(default)]
    pub sender_comp_id: String,

    #[serde(default)]
    pub target_comp_id: String,

    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    #[serde(default)]
    pub checksum_mode: ChecksumMode,

    #[serde(default = "default_max_body_len")]
    pub max_body_len: usize,
}

fn default_begin_string() -> String {
    "FIX.4.4".to_string()
}

fn default_protocol_spec() -> Option<String> {
    Some("FIX44".to_string())
}

fn default_heartbeat_secs() -> u64 {
    30
}

fn default_max_body_len() -> usize {
    crate::transport::framer::DEFAULT_MAX_BODY_LEN
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            begin_string: default_begin_string(),
            protocol_spec: default_protocol_spec(),
            sender_comp_id: String::new(),
            target_comp_id: String::new(),
            heartbeat_secs: default_heartbeat_secs(),
            checksum_mode: ChecksumMode::default(),
            max_body_len: default_max_body_len(),
        }
    }
}

impl ProtocolConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }
}

/// Host and port of one venue endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_true")]
    pub use_tls: bool,

    /// The venue serves self-signed certificates
    #[serde(default)]
    pub verify_certificates: bool,

    #[serde(default)]
    pub ssl_host: Option<String>,
    #[serde(default)]
    pub ssl_port: Option<u16>,
    #[serde(default)]
    pub nonssl_host: Option<String>,
    #[serde(default)]
    pub nonssl_port: Option<u16>,

    /// Per-class port overrides
    #[serde(default)]
    pub feed_port: Option<u16>,
    #[serde(default)]
    pub trade_port: Option<u16>,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_read_timeout_ms() -> u64 {
    1_000
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            use_tls: true,
            verify_certificates: false,
            ssl_host: None,
            ssl_port: None,
            nonssl_host: None,
            nonssl_port: None,
            feed_port: None,
            trade_port: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    /// Endpoint for a connection class under the current TLS setting
    pub fn endpoint(&self, class: ConnectionClass) -> Result<Endpoint, ConfigError> {
        let (host, port, host_key) = if self.use_tls {
            (&self.ssl_host, self.ssl_port, "FIX_SSL_HOST")
        } else {
            (&self.nonssl_host, self.nonssl_port, "FIX_NONSSL_HOST")
        };
        let host = host.clone().ok_or(ConfigError::Missing(host_key))?;
        let class_port = match class {
            ConnectionClass::Feed => self.feed_port,
            ConnectionClass::Trade => self.trade_port,
        };
        let port = class_port.or(port).ok_or(ConfigError::Missing(if self.use_tls {
            "FIX_SSL_PORT"
        } else {
            "FIX_NONSSL_PORT"
        }))?;
        Ok(Endpoint { host, port })
    }
}

/// Per-class response deadlines, seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_request_secs")]
    pub default_request_secs: u64,
    #[serde(default = "default_short_secs")]
    pub order_secs: u64,
    #[serde(default = "default_short_secs")]
    pub account_secs: u64,
    #[serde(default = "default_short_secs")]
    pub security_list_secs: u64,
    #[serde(default = "default_request_secs")]
    pub history_secs: u64,
    #[serde(default = "default_market_data_secs")]
    pub market_data_secs: u64,
    #[serde(default = "default_market_data_secs")]
    pub test_request_secs: u64,
    #[serde(default = "default_request_secs")]
    pub logon_secs: u64,
    #[serde(default = "default_logout_ack_secs")]
    pub logout_ack_secs: u64,
    #[serde(default = "default_shutdown_secs")]
    pub shutdown_secs: u64,
}

fn default_request_secs() -> u64 {
    30
}

fn default_short_secs() -> u64 {
    15
}

fn default_market_data_secs() -> u64 {
    10
}

fn default_logout_ack_secs() -> u64 {
    2
}

fn default_shutdown_secs() -> u64 {
    5
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            default_request_secs: default_request_secs(),
            order_secs: default_short_secs(),
            account_secs: default_short_secs(),
            security_list_secs: default_short_secs(),
            history_secs: default_request_secs(),
            market_data_secs: default_market_data_secs(),
            test_request_secs: default_market_data_secs(),
            logon_secs: default_request_secs(),
            logout_ack_secs: default_logout_ack_secs(),
            shutdown_secs: default_shutdown_secs(),
        }
    }
}

impl TimeoutConfig {
    /// Default deadline for a request class
    pub fn for_kind(&self, kind: RequestKind) -> Duration {
        let secs = match kind {
            RequestKind::SecurityList => self.security_list_secs,
            RequestKind::MarketHistory => self.history_secs,
            RequestKind::NewOrder
            | RequestKind::CancelOrder
            | RequestKind::ReplaceOrder
            | RequestKind::MassStatus => self.order_secs,
            RequestKind::AccountInfo => self.account_secs,
            RequestKind::MarketData => self.market_data_secs,
            RequestKind::TestRequest => self.test_request_secs,
        };
        Duration::from_secs(secs)
    }

    pub fn logon(&self) -> Duration {
        Duration::from_secs(self.logon_secs)
    }

    pub fn logout_ack(&self) -> Duration {
        Duration::from_secs(self.logout_ack_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupervisionConfig {
    /// A worker with no traffic for this long is unhealthy
    #[serde(default = "default_staleness_secs")]
    pub staleness_secs: u64,

    #[serde(default = "default_command_buffer")]
    pub command_buffer: usize,

    /// Recreate a torn-down session on the next call
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,

    /// Heartbeat and deadline sweep cadence
    #[serde(default = "default_timer_ms")]
    pub timer_resolution_ms: u64,
}

fn default_staleness_secs() -> u64 {
    300
}

fn default_command_buffer() -> usize {
    256
}

fn default_timer_ms() -> u64 {
    1_000
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            staleness_secs: default_staleness_secs(),
            command_buffer: default_command_buffer(),
            auto_reconnect: true,
            timer_resolution_ms: default_timer_ms(),
        }
    }
}

impl SupervisionConfig {
    pub fn staleness(&self) -> Duration {
        Duration::from_secs(self.staleness_secs)
    }

    pub fn timer_resolution(&self) -> Duration {
        Duration::from_millis(self.timer_resolution_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketDataConfig {
    #[serde(default = "default_depth")]
    pub default_depth: u32,

    #[serde(default)]
    pub incremental_policy: IncrementalPolicy,

    /// Per-topic broadcast buffer
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

fn default_depth() -> u32 {
    5
}

fn default_channel_capacity() -> usize {
    1024
}

impl Default for MarketDataConfig {
    fn default() -> Self {
        Self {
            default_depth: default_depth(),
            incremental_policy: IncrementalPolicy::default(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Parse configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply `FIX_*` overrides from any key lookup
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FIX_PROTOCOL_SPEC") {
            self.protocol.protocol_spec = Some(v);
        }
        if let Some(v) = lookup("FIX_BEGIN_STRING") {
            self.protocol.begin_string = v;
        }
        if let Some(v) = lookup("FIX_SENDER_COMP_ID") {
            self.protocol.sender_comp_id = v;
        }
        if let Some(v) = lookup("FIX_TARGET_COMP_ID") {
            self.protocol.target_comp_id = v;
        }
        if let Some(v) = lookup("FIX_CHECKSUM_STRICT") {
            self.protocol.checksum_mode = if parse_bool("FIX_CHECKSUM_STRICT", &v)? {
                ChecksumMode::Strict
            } else {
                ChecksumMode::Tolerant
            };
        }
        if let Some(v) = lookup("FIX_USE_SSL") {
            self.transport.use_tls = parse_bool("FIX_USE_SSL", &v)?;
        }
        if let Some(v) = lookup("FIX_VERIFY_CERTS") {
            self.transport.verify_certificates = parse_bool("FIX_VERIFY_CERTS", &v)?;
        }
        if let Some(v) = lookup("FIX_SSL_HOST") {
            self.transport.ssl_host = Some(v);
        }
        if let Some(v) = lookup("FIX_NONSSL_HOST") {
            self.transport.nonssl_host = Some(v);
        }
        if let Some(v) = lookup("FIX_SSL_PORT") {
            self.transport.ssl_port = Some(parse_port("FIX_SSL_PORT", &v)?);
        }
        if let Some(v) = lookup("FIX_NONSSL_PORT") {
            self.transport.nonssl_port = Some(parse_port("FIX_NONSSL_PORT", &v)?);
        }
        if let Some(v) = lookup("FIX_FEED_PORT") {
            self.transport.feed_port = Some(parse_port("FIX_FEED_PORT", &v)?);
        }
        if let Some(v) = lookup("FIX_TRADE_PORT") {
            self.transport.trade_port = Some(parse_port("FIX_TRADE_PORT", &v)?);
        }
        Ok(())
    }

    /// Comp ids and endpoints for the chosen TLS mode must be present
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol.sender_comp_id.is_empty() {
            return Err(ConfigError::Missing("FIX_SENDER_COMP_ID"));
        }
        if self.protocol.target_comp_id.is_empty() {
            return Err(ConfigError::Missing("FIX_TARGET_COMP_ID"));
        }
        if self.protocol.heartbeat_secs == 0 {
            return Err(ConfigError::Invalid {
                key: "heartbeat_secs",
                value: "0".into(),
            });
        }
        self.transport.endpoint(ConnectionClass::Feed)?;
        self.transport.endpoint(ConnectionClass::Trade)?;
        Ok(())
    }

    pub fn with_comp_ids(mut self, sender: impl Into<String>, target: impl Into<String>) -> Self {
        self.protocol.sender_comp_id = sender.into();
        self.protocol.target_comp_id = target.into();
        self
    }

    /// Plain TCP to one host, same port for every class
    pub fn with_plain_endpoint(mut self, host: impl Into<String>, port: u16) -> Self {
        self.transport.use_tls = false;
        self.transport.nonssl_host = Some(host.into());
        self.transport.nonssl_port = Some(port);
        self
    }

    pub fn with_heartbeat_secs(mut self, secs: u64) -> Self {
        self.protocol.heartbeat_secs = secs;
        self
    }

    pub fn with_checksum_mode(mut self, mode: ChecksumMode) -> Self {
        self.protocol.checksum_mode = mode;
        self
    }

    pub fn with_incremental_policy(mut self, policy: IncrementalPolicy) -> Self {
        self.market_data.incremental_policy = policy;
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.supervision.auto_reconnect = enabled;
        self
    }

    pub fn with_staleness_secs(mut self, secs: u64) -> Self {
        self.supervision.staleness_secs = secs;
        self
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}

fn parse_port(key: &'static str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}
