use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{RwLock, Semaphore};

type Handler =
    Arc<dyn Fn(Arc<serde_json::Value>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Default maximum concurrent detached handlers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 1024;

/// Handle returned by [`EventBus::subscribe`]; pass it to
/// [`EventBus::unsubscribe`] to remove the handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubscriptionToken {
    topic: String,
    id: u64,
}

impl SubscriptionToken {
    /// The topic this token subscribes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }
}

struct Subscription {
    id: u64,
    subscriber: String,
    handler: Handler,
}

/// In-process event bus with topic-keyed pub/sub.
///
/// Subscribers register a handler under a string topic together with a
/// subscriber name; every `publish()` of that topic invokes each handler
/// exactly once with an `Arc<serde_json::Value>` payload.
///
/// Delivery semantics:
/// - `publish()` snapshots the subscription list, spawns every handler and
///   waits for all of them before returning. Because a publisher blocks until
///   delivery completes, each subscriber observes one publisher's events in
///   publish order.
/// - A panicking handler is caught at task join, logged, and does not affect
///   the other subscribers.
/// - There is no persistence: events published before a subscription exists
///   are lost.
///
/// `publish_detached()` is the fire-and-forget variant; it enforces
/// backpressure via a semaphore that bounds concurrently running handlers.
///
/// `EventBus` is `Clone` and can be shared across threads.
#[derive(Clone)]
pub struct EventBus {
    topics: Arc<RwLock<HashMap<String, Vec<Subscription>>>>,
    next_id: Arc<AtomicU64>,
    semaphore: Option<Arc<Semaphore>>,
}

impl EventBus {
    /// Create a new `EventBus` with the default detached-concurrency limit.
    pub fn new() -> Self {
        Self::with_concurrency(DEFAULT_MAX_CONCURRENCY)
    }

    /// Create a new `EventBus` with a custom detached-concurrency limit.
    ///
    /// The limit bounds how many detached handlers may run at once across all
    /// topics. When it is reached, `publish_detached()` waits for a slot.
    pub fn with_concurrency(max_concurrent: usize) -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            semaphore: Some(Arc::new(Semaphore::new(max_concurrent))),
        }
    }

    /// Create a new `EventBus` without detached backpressure.
    ///
    /// WARNING: if detached events are published faster than handlers can
    /// process them, memory usage grows unbounded.
    pub fn unbounded() -> Self {
        Self {
            topics: Arc::new(RwLock::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            semaphore: None,
        }
    }

    /// Subscribe `subscriber` to `topic`.
    ///
    /// The handler receives the payload as `Arc<serde_json::Value>` and is
    /// called for every publish of the topic until the returned token is
    /// passed to [`unsubscribe`](Self::unsubscribe) or the subscriber is
    /// removed wholesale via [`unsubscribe_all`](Self::unsubscribe_all).
    pub async fn subscribe<F, Fut>(
        &self,
        topic: &str,
        subscriber: &str,
        handler: F,
    ) -> SubscriptionToken
    where
        F: Fn(Arc<serde_json::Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let handler: Handler = Arc::new(move |payload| Box::pin(handler(payload)));
        let mut topics = self.topics.write().await;
        topics.entry(topic.to_string()).or_default().push(Subscription {
            id,
            subscriber: subscriber.to_string(),
            handler,
        });
        SubscriptionToken {
            topic: topic.to_string(),
            id,
        }
    }

    /// Remove the subscription identified by `token`. Unknown tokens are a no-op.
    pub async fn unsubscribe(&self, token: &SubscriptionToken) {
        let mut topics = self.topics.write().await;
        if let Some(subs) = topics.get_mut(&token.topic) {
            subs.retain(|s| s.id != token.id);
            if subs.is_empty() {
                topics.remove(&token.topic);
            }
        }
    }

    /// Remove every subscription held by `subscriber` across all topics.
    ///
    /// The lifecycle orchestrator calls this when an extension transitions
    /// out of Ready, so callbacks never outlive their owner.
    pub async fn unsubscribe_all(&self, subscriber: &str) {
        let mut topics = self.topics.write().await;
        topics.retain(|_, subs| {
            subs.retain(|s| s.subscriber != subscriber);
            !subs.is_empty()
        });
    }

    /// Publish `payload` on `topic` and wait for every subscriber to finish.
    ///
    /// Handlers run as spawned tasks; a panic in one handler is logged and
    /// the remaining subscribers still receive the event.
    pub async fn publish(&self, topic: &str, payload: serde_json::Value) {
        let payload = Arc::new(payload);
        let snapshot = self.snapshot(topic).await;
        let mut tasks = Vec::with_capacity(snapshot.len());
        for (subscriber, handler) in snapshot {
            let p = payload.clone();
            tasks.push((subscriber, tokio::spawn(async move { handler(p).await })));
        }
        for (subscriber, task) in tasks {
            if let Err(err) = task.await {
                if err.is_panic() {
                    tracing::warn!(topic, subscriber = %subscriber, "event handler panicked");
                }
            }
        }
    }

    /// Publish `payload` on `topic` without waiting for handlers.
    ///
    /// When backpressure is enabled (default), this waits for a concurrency
    /// slot per handler before spawning it.
    pub async fn publish_detached(&self, topic: &str, payload: serde_json::Value) {
        let payload = Arc::new(payload);
        let snapshot = self.snapshot(topic).await;
        for (_subscriber, handler) in snapshot {
            let p = payload.clone();
            match &self.semaphore {
                Some(sem) => {
                    let permit = sem.clone().acquire_owned().await.expect("semaphore closed");
                    tokio::spawn(async move {
                        handler(p).await;
                        drop(permit);
                    });
                }
                None => {
                    tokio::spawn(async move {
                        handler(p).await;
                    });
                }
            }
        }
    }

    /// Number of live subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.topics.read().await.get(topic).map_or(0, Vec::len)
    }

    // Snapshot the handlers for a topic so publish never holds the lock while
    // handlers run. Subscription mutation during a publish affects only later
    // publishes.
    async fn snapshot(&self, topic: &str) -> Vec<(String, Handler)> {
        let topics = self.topics.read().await;
        topics
            .get(topic)
            .map(|subs| {
                subs.iter()
                    .map(|s| (s.subscriber.clone(), s.handler.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

pub mod prelude {
    //! Re-exports of the most commonly used event types.
    pub use crate::{EventBus, SubscriptionToken};
}
