//! # Event Bus Implementation
//!
//! Broadcast-based publish/subscribe hub. Uses Tokio's broadcast channel so
//! that several observers (a log viewer, tests, the CLI) see the same events.
//!
//! Subscribers should drain their receiver promptly; a receiver that falls
//! more than `capacity` events behind gets [`EventError::Lagged`] and is
//! resubscribed at the head of the stream.

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{trace, warn};

/// Kinds of notifications carried on the bus.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum EventType {
    /// An entry was appended to the registry log.
    #[default]
    RegistryLog,
    /// A module record reached `loaded`.
    ComponentLoaded,
    /// A named event dispatched by a component instance.
    Instance(String),
}

impl EventType {
    /// Wire name of the event, as an external listener would subscribe to it.
    pub fn name(&self) -> String {
        match self {
            EventType::RegistryLog => "wb:registryLog".to_string(),
            EventType::ComponentLoaded => "wb:componentLoaded".to_string(),
            EventType::Instance(name) => name.clone(),
        }
    }
}

/// A notification and its JSON payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Event {
    pub event_type: EventType,
    pub parameters: Map<String, Value>,
}

impl Event {
    pub fn new(event_type: EventType, parameters: Map<String, Value>) -> Self {
        Self {
            event_type,
            parameters,
        }
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EventError {
    #[error("Failed to send event: {message}")]
    SendFailed { message: String },
    #[error("Failed to receive event: {message}")]
    RecieveFailed { message: String },
    #[error("Receiver lagged behind by {count} events")]
    Lagged { count: u64 },
}

pub type EventResult<T> = Result<T, EventError>;

pub struct EventBus {
    event_sender: broadcast::Sender<Event>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (event_sender, _) = broadcast::channel(capacity.max(1));
        Self { event_sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.event_sender.subscribe())
    }

    /// Subscribes as a `Stream`, for consumers built on `StreamExt`.
    pub fn stream(&self) -> BroadcastStream<Event> {
        BroadcastStream::new(self.event_sender.subscribe())
    }

    /// Publishes to every current subscriber and returns how many received it.
    pub fn publish(&self, event: Event) -> usize {
        trace!(event = %event.event_type.name(), "publishing");
        // send only errors when there are no receivers at all
        self.event_sender.send(event).unwrap_or(0)
    }

    pub fn subscribers_size(&self) -> usize {
        self.event_sender.receiver_count()
    }
}

pub struct EventReceiver {
    receiver: broadcast::Receiver<Event>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<Event>) -> Self {
        Self { receiver }
    }

    /// Receives the next event. On lag the receiver is resubscribed and the
    /// lag is reported once.
    pub async fn recv(&mut self) -> EventResult<Event> {
        match self.receiver.recv().await {
            Ok(event) => Ok(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                self.receiver = self.receiver.resubscribe();
                Err(EventError::Lagged { count: n })
            }
            Err(e) => Err(EventError::RecieveFailed {
                message: e.to_string(),
            }),
        }
    }

    /// Non-blocking receive, `None` when nothing is queued. Events lost to
    /// lag are skipped and the oldest retained one is returned.
    pub fn try_recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Event receiver lagged, skipped {} events", n);
                }
                Err(_) => return None,
            }
        }
    }

    /// Drains every queued event without waiting, continuing past lag.
    pub fn drain(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_basic_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        let delivered = bus.publish(Event {
            event_type: EventType::Instance("badgeReady".to_string()),
            ..Default::default()
        });
        assert_eq!(delivered, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(received.event_type.name(), "badgeReady");
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_dropped() {
        let bus = EventBus::new(4);
        assert_eq!(bus.publish(Event::default()), 0);
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut stream = bus.stream();

        bus.publish(Event {
            event_type: EventType::ComponentLoaded,
            ..Default::default()
        });

        assert_eq!(rx1.recv().await.unwrap().event_type, EventType::ComponentLoaded);
        let from_stream = stream.next().await.unwrap().unwrap();
        assert_eq!(from_stream.event_type.name(), "wb:componentLoaded");
    }

    #[tokio::test]
    async fn test_lagged_receiver_recovers() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for _ in 0..5 {
            bus.publish(Event::default());
        }
        assert!(matches!(rx.recv().await, Err(EventError::Lagged { .. })));
        bus.publish(Event {
            event_type: EventType::ComponentLoaded,
            ..Default::default()
        });
        assert_eq!(rx.recv().await.unwrap().event_type, EventType::ComponentLoaded);
    }

    #[tokio::test]
    async fn test_drain_continues_past_lag() {
        let bus = EventBus::new(2);
        let mut rx = bus.subscribe();
        for i in 0..5 {
            bus.publish(Event {
                event_type: EventType::Instance(format!("e{}", i)),
                ..Default::default()
            });
        }
        let names: Vec<String> = rx.drain().into_iter().map(|e| e.event_type.name()).collect();
        assert_eq!(names, vec!["e3".to_string(), "e4".to_string()]);
        assert!(rx.try_recv().is_none());
    }
}
