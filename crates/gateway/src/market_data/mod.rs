//! Market data pipeline
//!
//! ```text
//!  W / X ──► BookNormalizer (per worker) ──► OrderBookSnapshot ──► BookPublisher
//!                                                               ├─► listeners
//!                                                               └─► orderbook.{symbol} stream
//! ```

pub mod normalizer;
pub mod publisher;

pub use normalizer::{BookNormalizer, IncrementalPolicy};
pub use publisher::{BookPublisher, OrderBookListener, SubscriptionId};
