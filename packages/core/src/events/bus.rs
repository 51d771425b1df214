//! In-process Event Bus
//!
//! Typed publish/subscribe between the managers.
//!
//! - Each subscriber runs on its own spawned task, so handlers may run
//!   concurrently with the publisher and with each other.
//! - A handler error or panic is logged and never reaches the publisher.
//! - `publish` returns a [`Dispatch`]; drop it for fire-and-forget, or await
//!   [`Dispatch::settled`] when later work depends on the handlers' effects.

use crate::events::{Event, EventKind};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, RwLock};
use tokio::task::JoinHandle;

type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

struct Subscriber {
    name: String,
    handler: EventHandler,
}

/// Publish/subscribe hub shared by the managers
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<HashMap<EventKind, Vec<Subscriber>>>,
}

/// Handle over the handler tasks started by one publish
pub struct Dispatch {
    handles: Vec<JoinHandle<()>>,
}

impl Dispatch {
    /// Number of handlers the event was delivered to
    pub fn handler_count(&self) -> usize {
        self.handles.len()
    }

    /// Wait until every handler has finished, successfully or not
    pub async fn settled(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!("Event handler task failed: {}", e);
            }
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`
    ///
    /// `name` identifies the subscriber in logs.
    pub fn subscribe<F, Fut>(&self, kind: EventKind, name: impl Into<String>, handler: F)
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let handler: EventHandler = Arc::new(move |event| handler(event).boxed());
        let mut subscribers = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.entry(kind).or_default().push(Subscriber {
            name: name.into(),
            handler,
        });
    }

    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let subscribers = match self.subscribers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        subscribers.get(&kind).map(Vec::len).unwrap_or(0)
    }

    /// Deliver `event` to every subscriber of its kind
    ///
    /// Must be called from within a tokio runtime.
    pub fn publish(&self, event: Event) -> Dispatch {
        let targets: Vec<(String, EventHandler)> = {
            let subscribers = match self.subscribers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            subscribers
                .get(&event.kind())
                .map(|list| {
                    list.iter()
                        .map(|s| (s.name.clone(), Arc::clone(&s.handler)))
                        .collect()
                })
                .unwrap_or_default()
        };

        tracing::debug!(
            "Publishing {} to {} subscriber(s)",
            event.event_type(),
            targets.len()
        );

        let handles = targets
            .into_iter()
            .map(|(name, handler)| {
                let event = event.clone();
                let event_type = event.event_type();
                tokio::spawn(async move {
                    let run = async move { handler(event).await };
                    match AssertUnwindSafe(run).catch_unwind().await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            tracing::error!("{} handler for {} failed: {:#}", name, event_type, e);
                        }
                        Err(_) => {
                            tracing::error!("{} handler for {} panicked", name, event_type);
                        }
                    }
                })
            })
            .collect();

        Dispatch { handles }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_event() -> Event {
        Event::NodeUpdated {
            mindmap_id: 1,
            node_id: 2,
        }
    }

    #[tokio::test]
    async fn test_publish_reaches_matching_subscribers_only() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        let counter = hits.clone();
        bus.subscribe(EventKind::NodeUpdated, "counter", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });
        let counter = hits.clone();
        bus.subscribe(EventKind::NodeDeleted, "other", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(100, Ordering::SeqCst);
                Ok(())
            }
        });

        let dispatch = bus.publish(sample_event());
        assert_eq!(dispatch.handler_count(), 1);
        dispatch.settled().await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failing_and_panicking_handlers_are_isolated() {
        let bus = EventBus::new();
        let hits = Arc::new(AtomicUsize::new(0));

        bus.subscribe(EventKind::NodeUpdated, "panics", |event| async move {
            if matches!(event, Event::NodeUpdated { .. }) {
                panic!("handler blew up");
            }
            Ok(())
        });
        bus.subscribe(EventKind::NodeUpdated, "fails", |_| async move {
            Err(anyhow::anyhow!("handler failed"))
        });
        let counter = hits.clone();
        bus.subscribe(EventKind::NodeUpdated, "counts", move |_| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        bus.publish(sample_event()).settled().await;
        bus.publish(sample_event()).settled().await;
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        let dispatch = bus.publish(sample_event());
        assert_eq!(dispatch.handler_count(), 0);
        dispatch.settled().await;
        assert_eq!(bus.subscriber_count(EventKind::NodeUpdated), 0);
    }
}
