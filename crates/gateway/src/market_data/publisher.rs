//! Per-symbol fan-out of normalized books
//!
//! Each symbol with at least one subscriber has a topic holding callback
//! listeners and a broadcast channel for stream consumers. Workers publish
//! from their own task, so updates for one symbol arrive in the order the
//! venue sent them.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use fixgate_core::Symbol;
use log::{debug, error, info};

use crate::messages::OrderBookSnapshot;
use crate::transport::Topics;
use crate::transport::channel::{ChannelPublisher, ChannelSubscriber};

/// Callback invoked for every book update of a subscribed symbol
pub trait OrderBookListener: Send + Sync {
    fn on_order_book_update(&self, symbol: &str, snapshot: &OrderBookSnapshot);
}

impl<F> OrderBookListener for F
where
    F: Fn(&str, &OrderBookSnapshot) + Send + Sync,
{
    fn on_order_book_update(&self, symbol: &str, snapshot: &OrderBookSnapshot) {
        self(symbol, snapshot)
    }
}

/// Identifies one registration on a topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

struct Topic {
    name: String,
    listeners: Vec<(SubscriptionId, Arc<dyn OrderBookListener>)>,
    channel: ChannelPublisher<OrderBookSnapshot>,
    /// Registrations served through `channel`
    streams: Vec<SubscriptionId>,
}

impl Topic {
    fn new(symbol: &str, capacity: usize) -> Self {
        Self {
            name: Topics::order_book(symbol),
            listeners: Vec::new(),
            channel: ChannelPublisher::new(capacity),
            streams: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.streams.is_empty()
    }

    fn len(&self) -> usize {
        self.listeners.len() + self.streams.len()
    }
}

pub struct BookPublisher {
    topics: DashMap<Symbol, Topic>,
    next_id: AtomicU64,
    channel_capacity: usize,
}

impl BookPublisher {
    pub fn new(channel_capacity: usize) -> Self {
        Self {
            topics: DashMap::new(),
            next_id: AtomicU64::new(1),
            channel_capacity: channel_capacity.max(1),
        }
    }

    fn next_id(&self) -> SubscriptionId {
        SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Register a callback for `symbol`
    pub fn add_listener(&self, symbol: &str, listener: Arc<dyn OrderBookListener>) -> SubscriptionId {
        let id = self.next_id();
        let mut topic = self
            .topics
            .entry(symbol.to_string())
            .or_insert_with(|| Topic::new(symbol, self.channel_capacity));
        topic.listeners.push((id, listener));
        debug!("Listener {:?} added to {}", id, topic.name);
        id
    }

    /// Register a stream consumer for `symbol`
    pub fn add_channel(&self, symbol: &str) -> (SubscriptionId, ChannelSubscriber<OrderBookSnapshot>) {
        let id = self.next_id();
        let mut topic = self
            .topics
            .entry(symbol.to_string())
            .or_insert_with(|| Topic::new(symbol, self.channel_capacity));
        topic.streams.push(id);
        debug!("Stream {:?} added to {}", id, topic.name);
        (id, topic.channel.subscribe())
    }

    /// Drop a registration. Returns true when it was the topic's last one
    /// and the topic is gone.
    pub fn remove(&self, symbol: &str, id: SubscriptionId) -> bool {
        let emptied = match self.topics.get_mut(symbol) {
            Some(mut topic) => {
                topic.listeners.retain(|(sid, _)| *sid != id);
                topic.streams.retain(|sid| *sid != id);
                topic.is_empty()
            }
            None => return false,
        };
        if emptied {
            self.topics.remove_if(symbol, |_, topic| topic.is_empty());
            info!("Topic {} closed", Topics::order_book(symbol));
        }
        emptied
    }

    /// Deliver a book to the symbol's subscribers; returns how many got it
    pub fn publish(&self, snapshot: &OrderBookSnapshot) -> usize {
        let (listeners, streamed) = {
            let Some(topic) = self.topics.get(&snapshot.symbol) else {
                return 0;
            };
            let streamed = if topic.streams.is_empty() {
                0
            } else {
                topic.channel.send(snapshot.clone())
            };
            let listeners: Vec<Arc<dyn OrderBookListener>> =
                topic.listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
            (listeners, streamed)
        };

        // Callbacks run outside the map lock so they may unsubscribe
        let mut delivered = streamed;
        for listener in listeners {
            let result = catch_unwind(AssertUnwindSafe(|| {
                listener.on_order_book_update(&snapshot.symbol, snapshot)
            }));
            match result {
                Ok(()) => delivered += 1,
                Err(_) => error!("Order book listener for {} panicked", snapshot.symbol),
            }
        }
        delivered
    }

    pub fn has_topic(&self, symbol: &str) -> bool {
        self.topics.contains_key(symbol)
    }

    pub fn subscriber_count(&self, symbol: &str) -> usize {
        self.topics.get(symbol).map(|t| t.len()).unwrap_or(0)
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.name.clone()).collect()
    }
}

impl Default for BookPublisher {
    fn default() -> Self {
        Self::new(1024)
    }
}
