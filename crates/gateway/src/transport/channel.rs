//! Tokio channel-based fan-out
//!
//! Broadcast channels give pub/sub semantics within a single process.
//! No serialization overhead - messages are passed directly.

use crate::error::TransportError;
use crate::transport::Subscriber;
use async_trait::async_trait;
use log::debug;
use serde::de::DeserializeOwned;
use tokio::sync::broadcast;

/// Channel-based publisher using broadcast
pub struct ChannelPublisher<M> {
    tx: broadcast::Sender<M>,
}

impl<M: Clone> ChannelPublisher<M> {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Get another subscriber for this publisher
    pub fn subscribe(&self) -> ChannelSubscriber<M> {
        ChannelSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver to current receivers; having none is not an error
    pub fn send(&self, msg: M) -> usize {
        self.tx.send(msg).unwrap_or(0)
    }
}

/// Channel-based subscriber using broadcast receiver.
///
/// Holds no sender: once the publishing side is dropped (the last
/// subscription for the topic went away) `next` reports
/// [`TransportError::ChannelClosed`].
pub struct ChannelSubscriber<M> {
    rx: broadcast::Receiver<M>,
}

#[async_trait]
impl<M> Subscriber<M> for ChannelSubscriber<M>
where
    M: DeserializeOwned + Clone + Send + 'static,
{
    async fn next(&mut self) -> Result<M, TransportError> {
        loop {
            match self.rx.recv().await {
                Ok(msg) => return Ok(msg),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    // Slow consumer: newer books supersede the skipped ones
                    debug!("Subscriber lagged, skipped {skipped} updates");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TransportError::ChannelClosed);
                }
            }
        }
    }

    fn try_next(&mut self) -> Result<Option<M>, TransportError> {
        loop {
            match self.rx.try_recv() {
                Ok(msg) => return Ok(Some(msg)),
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(TransportError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pubsub() {
        let publisher = ChannelPublisher::<String>::new(10);
        let mut subscriber = publisher.subscribe();

        assert_eq!(publisher.send("hello".to_string()), 1);

        let msg = subscriber.next().await.unwrap();
        assert_eq!(msg, "hello");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let publisher = ChannelPublisher::<i32>::new(10);
        let mut sub1 = publisher.subscribe();
        let mut sub2 = publisher.subscribe();
        assert_eq!(publisher.receiver_count(), 2);

        assert_eq!(publisher.send(42), 2);

        assert_eq!(sub1.next().await.unwrap(), 42);
        assert_eq!(sub2.next().await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_closed_when_publisher_dropped() {
        let publisher = ChannelPublisher::<i32>::new(4);
        let mut sub = publisher.subscribe();
        publisher.send(1);
        drop(publisher);

        assert_eq!(sub.next().await.unwrap(), 1);
        assert!(matches!(
            sub.next().await,
            Err(TransportError::ChannelClosed)
        ));
    }

    #[test]
    fn test_send_without_receivers() {
        let publisher = ChannelPublisher::<i32>::new(4);
        assert_eq!(publisher.send(7), 0);
        let mut sub = publisher.subscribe();
        assert_eq!(sub.try_next().unwrap(), None);
    }
}
