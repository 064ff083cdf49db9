//! Fixgate Gateway
//!
//! Protocol engine in front of a venue that speaks a `tag=value` (FIX 4.4
//! dialect) session and application protocol. Provides:
//! - Wire codec with strict and tolerant checksum handling
//! - Framed transport over plain TCP or TLS
//! - Session state machine (logon, heartbeats, test requests, logout)
//! - One worker task per `(user, class)` with request/response correlation
//! - Order book normalization and per-symbol fan-out
//!
//! ## Architecture
//!
//! ```text
//!            Callers
//!               │ connect / submit / subscribe
//!          ┌────▼────┐
//!          │ Gateway │──── BookPublisher ──► listeners, orderbook.{symbol}
//!          └────┬────┘          ▲
//!               │ Supervisor    │ books
//!     ┌─────────┼─────────┐     │
//!  ┌──▼───┐  ┌──▼───┐  ┌──▼───┐ │
//!  │Worker│  │Worker│  │Worker│─┘   one task per (user, class)
//!  └──┬───┘  └──┬───┘  └──┬───┘
//!     │ Session │ Framed transport (TLS / TCP)
//!     ▼         ▼         ▼
//!              Venue
//! ```
//!
//! ## Transport
//!
//! Each worker owns its connection and sequence numbers; nothing about a
//! session is shared with another. Book updates reach consumers over tokio
//! channels or callbacks, within a single process.

pub mod codec;
pub mod config;
pub mod error;
pub mod gateway;
pub mod market_data;
pub mod messages;
pub mod session;
pub mod transport;
pub mod worker;

// Re-export commonly used types
pub use config::GatewayConfig;
pub use error::{
    CodecError, ConnectError, GatewayError, RequestError, RequestErrorKind, SubscribeError,
    TransportError,
};
pub use gateway::{ConnectRequest, Gateway, SessionRef, SubscriptionRef};
pub use market_data::{BookPublisher, IncrementalPolicy, OrderBookListener};
pub use messages::{OrderBookSnapshot, market_data::BookLevel};
pub use session::{Credentials, SessionState};
pub use transport::{
    Subscriber, Topics,
    channel::{ChannelPublisher, ChannelSubscriber},
};
pub use worker::{Request, RequestKind, ResponseData};
