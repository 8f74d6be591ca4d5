//! Shared push channel.
//!
//! This module provides:
//! - [`ChannelConnector`], the transport seam (socket.io in production)
//! - [`ChannelManager`], which keeps at most one live subscription
//! - [`Subscription`], a cancellable handle tied to one focused session
//!
//! Each subscription runs a reader task that forwards one named event to a
//! handler. The task stops when the handler asks it to, when the transport
//! closes, when the idle timeout fires, or when the subscription is dropped.
//! Opening a new subscription supersedes the previous one: its reader stops
//! dispatching even if the old transport is still delivering.

mod socketio;

pub use socketio::*;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::ChannelResult;

/// A named event delivered by the transport.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    /// Event name.
    pub name: String,
    /// Event payload.
    pub payload: serde_json::Value,
}

impl ChannelEvent {
    /// Create a new event.
    pub fn new(name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            payload,
        }
    }
}

/// What a subscription handler is told.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// Payload of the subscribed event.
    Event(serde_json::Value),
    /// The transport ended.
    Closed,
    /// Nothing arrived within the idle timeout.
    IdleTimeout(Duration),
}

/// Subscription callback. Returning `Break` ends the subscription.
pub type ChannelHandler =
    Arc<dyn Fn(ChannelSignal) -> BoxFuture<'static, ControlFlow<()>> + Send + Sync>;

/// Transport that opens token-authenticated push connections.
///
/// Events arrive on the returned receiver until the connection ends, at
/// which point the receiver yields `None`. Dropping the receiver closes the
/// connection.
#[async_trait]
pub trait ChannelConnector: Send + Sync {
    /// Open a connection authenticated by `token`.
    async fn connect(&self, token: &str) -> ChannelResult<mpsc::Receiver<ChannelEvent>>;
}

/// Owner of the single push connection.
pub struct ChannelManager {
    connector: Arc<dyn ChannelConnector>,
    idle_timeout: Option<Duration>,
    generation: Arc<AtomicU64>,
}

impl ChannelManager {
    /// Create a new channel manager
    pub fn new(connector: Arc<dyn ChannelConnector>, idle_timeout: Option<Duration>) -> Self {
        Self {
            connector,
            idle_timeout,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Open a fresh connection for `token` and route `event_name` to `handler`.
    ///
    /// Any earlier subscription stops dispatching from this point on.
    pub async fn subscribe(
        &self,
        token: &str,
        event_name: &str,
        handler: ChannelHandler,
    ) -> ChannelResult<Subscription> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let events = self.connector.connect(token).await?;

        info!(generation, event = %event_name, "Channel subscription opened");

        let task = tokio::spawn(read_loop(
            events,
            event_name.to_string(),
            handler,
            self.idle_timeout,
            Arc::clone(&self.generation),
            generation,
        ));

        Ok(Subscription { generation, task })
    }

    /// Stop dispatching for every subscription opened so far.
    pub fn close_all(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Handle to a live subscription. Dropping it closes the connection.
#[derive(Debug)]
pub struct Subscription {
    generation: u64,
    task: JoinHandle<()>,
}

impl Subscription {
    /// Whether the reader task is still running.
    pub fn is_active(&self) -> bool {
        !self.task.is_finished()
    }

    /// Sequence number of this subscription within its manager.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Close the connection now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn read_loop(
    mut events: mpsc::Receiver<ChannelEvent>,
    event_name: String,
    handler: ChannelHandler,
    idle_timeout: Option<Duration>,
    current: Arc<AtomicU64>,
    generation: u64,
) {
    loop {
        let next = match idle_timeout {
            Some(limit) => match tokio::time::timeout(limit, events.recv()).await {
                Ok(next) => next,
                Err(_) => {
                    if current.load(Ordering::SeqCst) == generation {
                        warn!(generation, idle_ms = limit.as_millis(), "Channel idle timeout");
                        let _ = handler(ChannelSignal::IdleTimeout(limit)).await;
                    }
                    break;
                }
            },
            None => events.recv().await,
        };

        if current.load(Ordering::SeqCst) != generation {
            debug!(generation, "Subscription superseded, stopping reader");
            break;
        }

        match next {
            Some(event) if event.name == event_name => {
                if handler(ChannelSignal::Event(event.payload)).await.is_break() {
                    debug!(generation, "Handler ended subscription");
                    break;
                }
            }
            Some(event) => {
                debug!(generation, event = %event.name, "Ignoring unsubscribed event");
            }
            None => {
                info!(generation, "Channel transport closed");
                let _ = handler(ChannelSignal::Closed).await;
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use std::sync::Mutex;
    use tokio::sync::mpsc::Sender;

    /// Connector handing out channels whose sending half the test keeps.
    #[derive(Default)]
    struct FakeConnector {
        senders: Mutex<Vec<(String, Sender<ChannelEvent>)>>,
    }

    #[async_trait]
    impl ChannelConnector for FakeConnector {
        async fn connect(&self, token: &str) -> ChannelResult<mpsc::Receiver<ChannelEvent>> {
            let (tx, rx) = mpsc::channel(16);
            self.senders.lock().unwrap().push((token.to_string(), tx));
            Ok(rx)
        }
    }

    impl FakeConnector {
        fn sender(&self, index: usize) -> Sender<ChannelEvent> {
            self.senders.lock().unwrap()[index].1.clone()
        }

        fn take_sender(&self, index: usize) -> Sender<ChannelEvent> {
            let mut senders = self.senders.lock().unwrap();
            let (token, tx) = senders.remove(index);
            let (dead_tx, _) = mpsc::channel(1);
            senders.insert(index, (token, dead_tx));
            tx
        }
    }

    fn recording_handler(
        stop_after: usize,
    ) -> (ChannelHandler, mpsc::UnboundedReceiver<ChannelSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let seen = Arc::new(AtomicU64::new(0));
        let handler: ChannelHandler = Arc::new(move |signal| {
            let tx = tx.clone();
            let seen = Arc::clone(&seen);
            async move {
                let _ = tx.send(signal);
                if seen.fetch_add(1, Ordering::SeqCst) + 1 >= stop_after as u64 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            }
            .boxed()
        });
        (handler, rx)
    }

    #[tokio::test]
    async fn test_subscription_routes_named_event() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), None);
        let (handler, mut seen) = recording_handler(usize::MAX);

        let _sub = manager
            .subscribe("tok", "mining_status", handler)
            .await
            .unwrap();

        let tx = connector.sender(0);
        tx.send(ChannelEvent::new("other", serde_json::json!(1)))
            .await
            .unwrap();
        tx.send(ChannelEvent::new("mining_status", serde_json::json!({"status": "failed"})))
            .await
            .unwrap();

        let signal = seen.recv().await.unwrap();
        assert_eq!(
            signal,
            ChannelSignal::Event(serde_json::json!({"status": "failed"}))
        );
        assert_eq!(connector.senders.lock().unwrap()[0].0, "tok");
    }

    #[tokio::test]
    async fn test_handler_break_ends_subscription() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), None);
        let (handler, mut seen) = recording_handler(1);

        let sub = manager.subscribe("tok", "e", handler).await.unwrap();
        assert_eq!(sub.generation(), 1);
        connector
            .sender(0)
            .send(ChannelEvent::new("e", serde_json::Value::Null))
            .await
            .unwrap();

        assert!(seen.recv().await.is_some());
        // reader exits after Break and drops the handler
        assert!(seen.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_transport_close_is_signalled() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), None);
        let (handler, mut seen) = recording_handler(usize::MAX);

        let _sub = manager.subscribe("tok", "e", handler).await.unwrap();
        drop(connector.take_sender(0));

        assert_eq!(seen.recv().await, Some(ChannelSignal::Closed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_is_signalled() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), Some(Duration::from_secs(5)));
        let (handler, mut seen) = recording_handler(usize::MAX);

        let _sub = manager.subscribe("tok", "e", handler).await.unwrap();

        assert_eq!(
            seen.recv().await,
            Some(ChannelSignal::IdleTimeout(Duration::from_secs(5)))
        );
    }

    #[tokio::test]
    async fn test_new_subscription_supersedes_old() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), None);
        let (old_handler, mut old_seen) = recording_handler(usize::MAX);
        let (new_handler, mut new_seen) = recording_handler(usize::MAX);

        let _old = manager.subscribe("a", "e", old_handler).await.unwrap();
        let _new = manager.subscribe("b", "e", new_handler).await.unwrap();

        connector
            .sender(0)
            .send(ChannelEvent::new("e", serde_json::json!("stale")))
            .await
            .unwrap();
        connector
            .sender(1)
            .send(ChannelEvent::new("e", serde_json::json!("fresh")))
            .await
            .unwrap();

        assert_eq!(
            new_seen.recv().await,
            Some(ChannelSignal::Event(serde_json::json!("fresh")))
        );
        // old reader stopped without dispatching
        assert!(old_seen.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_drop_closes_connection() {
        let connector = Arc::new(FakeConnector::default());
        let manager = ChannelManager::new(connector.clone(), None);
        let (handler, _seen) = recording_handler(usize::MAX);

        let sub = manager.subscribe("tok", "e", handler).await.unwrap();
        let tx = connector.sender(0);
        sub.unsubscribe();

        // receiver dropped with the aborted reader task
        tokio::time::timeout(Duration::from_secs(1), tx.closed())
            .await
            .unwrap();
    }
}
