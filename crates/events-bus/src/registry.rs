//! # Events Registry
//!
//! Owns every publisher and the subscriber of a process, keyed by opaque
//! handles. The composition root creates one registry and shares it; nothing
//! here is a language-level static.
//!
//! - At most one publisher per event source; asking again returns the same
//!   handle.
//! - At most one subscriber; asking again returns the existing handle and
//!   ignores the new options.

use crate::ports::{EventServiceConnector, Transport};
use crate::publisher::EventPublisher;
use crate::subscriber::{EventSubscriber, SubscriberOptions};
use events_types::{EventParams, EventReceiveOp, EventsConfig, EventsError};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Opaque reference to a publisher or the subscriber. Never zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle(u64);

impl EventHandle {
    /// Raw value for callers outside Rust.
    #[must_use]
    pub fn as_raw(self) -> u64 {
        self.0
    }

    /// Rebuild from a raw value; `0` is the null handle.
    #[must_use]
    pub fn from_raw(raw: u64) -> Option<Self> {
        (raw != 0).then_some(Self(raw))
    }
}

struct PublisherSlot {
    handle: EventHandle,
    publisher: Arc<Mutex<EventPublisher>>,
}

struct SubscriberSlot {
    handle: EventHandle,
    subscriber: Arc<Mutex<EventSubscriber>>,
}

/// Registry of live publishers and the process subscriber.
///
/// Call [`deinit_subscriber`](Self::deinit_subscriber) before dropping the
/// registry. Re-arming the cache needs `.await`, so a subscriber dropped
/// along with the registry leaves the cache unarmed and only logs a warning;
/// events published until the next subscriber starts are lost.
pub struct EventsRegistry {
    config: EventsConfig,
    transport: Arc<dyn Transport>,
    connector: Arc<dyn EventServiceConnector>,
    publishers: Mutex<HashMap<String, PublisherSlot>>,
    subscriber: Mutex<Option<SubscriberSlot>>,
    next_handle: AtomicU64,
}

impl EventsRegistry {
    /// Create a registry.
    ///
    /// # Errors
    ///
    /// `EventsError::Config` if an endpoint in `config` is invalid.
    pub fn new(
        config: EventsConfig,
        transport: Arc<dyn Transport>,
        connector: Arc<dyn EventServiceConnector>,
    ) -> Result<Self, EventsError> {
        config.validate()?;
        Ok(Self {
            config,
            transport,
            connector,
            publishers: Mutex::new(HashMap::new()),
            subscriber: Mutex::new(None),
            next_handle: AtomicU64::new(1),
        })
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &EventsConfig {
        &self.config
    }

    fn allocate_handle(&self) -> EventHandle {
        EventHandle(self.next_handle.fetch_add(1, Ordering::Relaxed))
    }

    // =========================================================================
    // PUBLISHERS
    // =========================================================================

    /// Publisher handle for `source`, creating it on first use.
    pub async fn init_publisher(&self, source: &str) -> Result<EventHandle, EventsError> {
        let mut publishers = self.publishers.lock().await;
        if let Some(slot) = publishers.get(source) {
            return Ok(slot.handle);
        }

        let publisher = EventPublisher::connect(
            source,
            &self.config,
            self.transport.as_ref(),
            self.connector.as_ref(),
        )
        .await?;

        let handle = self.allocate_handle();
        publishers.insert(
            source.to_string(),
            PublisherSlot {
                handle,
                publisher: Arc::new(Mutex::new(publisher)),
            },
        );
        debug!(source, handle = handle.as_raw(), "Publisher registered");
        Ok(handle)
    }

    /// Publish through the publisher behind `handle`.
    pub async fn publish(
        &self,
        handle: EventHandle,
        tag: &str,
        params: Option<&EventParams>,
    ) -> Result<(), EventsError> {
        let publisher = {
            let publishers = self.publishers.lock().await;
            publishers
                .values()
                .find(|slot| slot.handle == handle)
                .map(|slot| slot.publisher.clone())
                .ok_or(EventsError::InvalidHandle)?
        };
        let mut publisher = publisher.lock().await;
        publisher.publish(tag, params).await
    }

    /// Drop the publisher behind `handle`. `false` if there was none.
    ///
    /// Its runtime id is retired once any in-flight publish on it finishes.
    pub async fn deinit_publisher(&self, handle: EventHandle) -> bool {
        let mut publishers = self.publishers.lock().await;
        let source = publishers
            .iter()
            .find(|(_, slot)| slot.handle == handle)
            .map(|(source, _)| source.clone());

        match source {
            Some(source) => {
                publishers.remove(&source);
                info!(source = %source, "Publisher deinitialized");
                true
            }
            None => {
                warn!(handle = handle.as_raw(), "Deinit of unknown publisher handle");
                false
            }
        }
    }

    /// Number of live publishers.
    pub async fn publisher_count(&self) -> usize {
        self.publishers.lock().await.len()
    }

    // =========================================================================
    // SUBSCRIBER
    // =========================================================================

    /// The process subscriber, created with `options` on first use.
    pub async fn init_subscriber(
        &self,
        options: &SubscriberOptions,
    ) -> Result<EventHandle, EventsError> {
        let mut slot = self.subscriber.lock().await;
        if let Some(existing) = slot.as_ref() {
            debug!("Subscriber exists; options ignored");
            return Ok(existing.handle);
        }

        let subscriber = EventSubscriber::connect(
            options,
            &self.config,
            self.transport.as_ref(),
            self.connector.as_ref(),
        )
        .await?;

        let handle = self.allocate_handle();
        *slot = Some(SubscriberSlot {
            handle,
            subscriber: Arc::new(Mutex::new(subscriber)),
        });
        Ok(handle)
    }

    /// Receive through the subscriber behind `handle`.
    pub async fn receive(&self, handle: EventHandle) -> EventReceiveOp {
        let subscriber = {
            let slot = self.subscriber.lock().await;
            match slot.as_ref() {
                Some(s) if s.handle == handle => s.subscriber.clone(),
                _ => return EventReceiveOp::failed(&EventsError::InvalidHandle, 0),
            }
        };
        let mut subscriber = subscriber.lock().await;
        subscriber.event_receive().await
    }

    /// Shut down and drop the subscriber if `handle` matches.
    pub async fn deinit_subscriber(&self, handle: EventHandle) -> bool {
        let taken = {
            let mut slot = self.subscriber.lock().await;
            if slot.as_ref().is_some_and(|s| s.handle == handle) {
                slot.take()
            } else {
                None
            }
        };

        match taken {
            Some(slot) => {
                slot.subscriber.lock().await.shutdown().await;
                info!("Subscriber deinitialized");
                true
            }
            None => {
                warn!(handle = handle.as_raw(), "Deinit of unknown subscriber handle");
                false
            }
        }
    }

    /// Whether a subscriber is live.
    pub async fn has_subscriber(&self) -> bool {
        self.subscriber.lock().await.is_some()
    }
}
