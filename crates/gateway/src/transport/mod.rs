//! Transport layer
//!
//! Two halves:
//! - venue side: [`SessionTransport`] moves protocol messages over a framed
//!   byte stream (plain TCP or TLS, see [`connector`]);
//! - subscriber side: [`Publisher`]/[`Subscriber`] move normalized updates
//!   to consumers over tokio channels, named by [`Topics`].

pub mod channel;
pub mod connector;
pub mod framed;
pub mod framer;
pub mod topics;

pub use connector::{Connector, SessionStream};
pub use framed::FramedTransport;
pub use framer::{FrameDecoder, FramedReader, ReadOutcome};
pub use topics::Topics;

use crate::codec::{Field, ProtocolMessage};
use crate::error::TransportError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use tokio::time::Instant;

/// Subscriber - receives messages from one topic
#[async_trait]
pub trait Subscriber<M>: Send
where
    M: DeserializeOwned + Send,
{
    /// Wait for the next message
    async fn next(&mut self) -> Result<M, TransportError>;

    /// Try to receive without blocking (returns None if no message available)
    fn try_next(&mut self) -> Result<Option<M>, TransportError>;
}

/// Inbound result of a bounded read
#[derive(Debug)]
pub enum Received {
    Message(ProtocolMessage),
    /// Nothing arrived within the read timeout
    Idle,
    /// Peer closed the stream
    Closed,
}

/// Protocol message transport for one session
#[async_trait]
pub trait SessionTransport: Send {
    /// Encode and write one message; returns the sequence number it carried
    async fn send(&mut self, msg_type: &str, fields: &[Field]) -> Result<u64, TransportError>;

    /// Next decodable message, `None` once the peer closed.
    ///
    /// Must be cancellation safe.
    async fn next_message(&mut self) -> Result<Option<ProtocolMessage>, TransportError>;

    /// Bounded read. A passed `deadline` fails with [`TransportError::Timeout`].
    async fn recv(&mut self, deadline: Option<Instant>) -> Result<Received, TransportError>;

    /// Restart outbound numbering at 1
    fn reset_sequence(&mut self);

    fn next_seq_num(&self) -> u64;

    async fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ensure traits are object-safe
    fn _assert_subscriber_object_safe(_: &mut dyn Subscriber<String>) {}
    fn _assert_transport_object_safe(_: &mut dyn SessionTransport) {}
}
