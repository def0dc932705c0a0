//! # Event Subscriber
//!
//! The single consumer of a process. Merges events replayed from the cache
//! service with events read live from the proxy, counts losses per runtime
//! id, drops duplicates, and swallows control records.
//!
//! ## States
//!
//! ```text
//! connect ──cache was running──→ [CacheDraining] ──cache_read empty──→ [Live]
//!    │                                                                   ↑
//!    └────────────────────────── otherwise ──────────────────────────────┘
//! ```
//!
//! ## Loss accounting
//!
//! | Runtime id | Sequence | Missed |
//! |------------|----------|--------|
//! | known      | `s != 0` | `s - last - 1` |
//! | known      | `0`      | `SEQUENCE_MAX - last` (rollover) |
//! | unknown    | `s != 0` | `s - 1` |
//! | unknown    | `0`      | `0` |
//!
//! A negative result marks a duplicate, typically a record seen live and
//! then replayed from the cache.

use crate::ports::{EventServiceClient, EventServiceConnector, SubSocket, Transport};
use crate::track::RuntimeIdTracker;
use crate::{CACHE_DRAIN_WINDOW, ECHO_PAYLOAD, SUBSCRIBER_SERVICE_TIMEOUT};
use events_telemetry::{
    EVENTS_CACHE_REPLAYED, EVENTS_CONTROL, EVENTS_DUPLICATES, EVENTS_MISSED, EVENTS_RECEIVED,
};
use events_types::wire::now_epoch_secs;
use events_types::{
    EventReceiveOp, EventRecord, EventsConfig, EventsError, Sequence, SEQUENCE_MAX,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// How a subscriber is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberOptions {
    /// Resume from, and on shutdown re-arm, the event service cache.
    pub use_cache: bool,
    /// Receive timeout in milliseconds; `-1` blocks indefinitely.
    pub recv_timeout_ms: i32,
    /// Source prefixes to subscribe to; empty means everything.
    pub sources: Vec<String>,
}

impl Default for SubscriberOptions {
    fn default() -> Self {
        Self {
            use_cache: false,
            recv_timeout_ms: -1,
            sources: Vec::new(),
        }
    }
}

/// Where the next record comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberState {
    /// Serving records the cache service collected while nobody listened.
    CacheDraining,
    /// Serving the live socket.
    Live,
}

/// Running counters for one subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SubscriberStats {
    pub received: u64,
    pub missed: u64,
    pub duplicates: u64,
    pub controls: u64,
    pub cache_replayed: u64,
    pub malformed: u64,
}

/// Events lost between the last delivered sequence and `sequence`.
///
/// Negative means `sequence` was already delivered.
#[must_use]
pub fn missed_between(last: Option<Sequence>, sequence: Sequence) -> i64 {
    let seq = i64::from(sequence);
    match last {
        Some(last) if sequence != 0 => seq - i64::from(last) - 1,
        Some(last) => i64::from(SEQUENCE_MAX) - i64::from(last),
        None if sequence != 0 => seq - 1,
        // A rollover as the first message seen; the loss is not modelled.
        None => 0,
    }
}

/// The process's event consumer.
pub struct EventSubscriber {
    socket: Box<dyn SubSocket>,
    service: Option<Box<dyn EventServiceClient>>,
    recv_timeout: Option<Duration>,
    state: SubscriberState,
    from_cache: VecDeque<String>,
    track: RuntimeIdTracker,
    stats: SubscriberStats,
    shut_down: bool,
}

impl EventSubscriber {
    /// Connect, subscribe and, with `use_cache`, take over from a running
    /// cache.
    ///
    /// # Errors
    ///
    /// Fails on a bad receive timeout, a SUB connect failure, or when the
    /// service client cannot be created. An unreachable service is not an
    /// error: the subscriber just starts live.
    pub async fn connect(
        options: &SubscriberOptions,
        config: &EventsConfig,
        transport: &dyn Transport,
        connector: &dyn EventServiceConnector,
    ) -> Result<Self, EventsError> {
        let recv_timeout = match options.recv_timeout_ms {
            -1 => None,
            ms if ms >= 0 => Some(Duration::from_millis(ms as u64)),
            ms => return Err(EventsError::Config(format!("invalid receive timeout {ms}"))),
        };

        let socket = transport
            .connect_sub(&config.xpub_path, &options.sources)
            .map_err(|e| {
                warn!(endpoint = %config.xpub_path, error = %e, "Subscriber fails to connect");
                e
            })?;

        let mut state = SubscriberState::Live;
        let mut service = None;
        if options.use_cache {
            let mut client =
                connector.init_client(&config.req_rep_path, SUBSCRIBER_SERVICE_TIMEOUT)?;
            match client.cache_stop().await {
                Ok(true) => {
                    info!("Stopped a running cache; draining it first");
                    state = SubscriberState::CacheDraining;
                }
                Ok(false) => debug!("No cache was running"),
                Err(e) => warn!(error = %e, "Cache stop failed; continuing without cache"),
            }
            service = Some(client);
        }

        info!(
            sources = ?options.sources,
            use_cache = options.use_cache,
            recv_timeout_ms = options.recv_timeout_ms,
            "Subscriber created"
        );
        Ok(Self {
            socket,
            service,
            recv_timeout,
            state,
            from_cache: VecDeque::new(),
            track: RuntimeIdTracker::new(),
            stats: SubscriberStats::default(),
            shut_down: false,
        })
    }

    /// Replace the runtime-id tracker, e.g. to use a different bound.
    #[must_use]
    pub fn with_tracker(mut self, track: RuntimeIdTracker) -> Self {
        self.track = track;
        self
    }

    /// Receive the next application event.
    ///
    /// Blocks up to the receive timeout. Control records and duplicates are
    /// consumed without returning; malformed records are dropped.
    ///
    /// `missed_count` sums the positive gaps seen during this call, control
    /// records included. A duplicate's negative gap is not subtracted, so an
    /// earlier loss stays reported even when a replay follows it.
    pub async fn event_receive(&mut self) -> EventReceiveOp {
        let mut missed = 0;
        match self.next_event(&mut missed).await {
            Ok(record) => EventReceiveOp::delivered(record.data, missed, record.publish_epoch),
            Err(e) => {
                if !e.is_timeout() {
                    warn!(error = %e, "Failed to receive event");
                }
                EventReceiveOp::failed(&e, missed)
            }
        }
    }

    async fn next_event(&mut self, missed: &mut u64) -> Result<EventRecord, EventsError> {
        loop {
            let payload = self.next_payload().await?;
            let record = match EventRecord::decode(&payload) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "Dropping undecodable record");
                    self.stats.malformed += 1;
                    continue;
                }
            };

            let last = self.track.get(&record.runtime_id).map(|e| e.sequence);
            let this_missed = missed_between(last, record.sequence);
            if this_missed > 0 {
                let lost = this_missed as u64;
                *missed += lost;
                self.stats.missed += lost;
                EVENTS_MISSED.inc_by(lost);
                debug!(
                    runtime_id = %record.runtime_id,
                    sequence = record.sequence,
                    missed = lost,
                    "Sequence gap"
                );
            }

            if record.is_control() {
                self.stats.controls += 1;
                EVENTS_CONTROL.inc();
                if record.is_deinit() && self.track.remove(&record.runtime_id) {
                    debug!(runtime_id = %record.runtime_id, "Runtime id retired");
                }
                continue;
            }

            if this_missed < 0 {
                self.stats.duplicates += 1;
                EVENTS_DUPLICATES.inc();
                trace!(
                    runtime_id = %record.runtime_id,
                    sequence = record.sequence,
                    "Duplicate dropped"
                );
                continue;
            }

            self.track
                .record(&record.runtime_id, record.sequence, now_epoch_secs());
            self.stats.received += 1;
            EVENTS_RECEIVED.inc();
            return Ok(record);
        }
    }

    /// Next serialized record, from the cache while draining, else live.
    async fn next_payload(&mut self) -> Result<String, EventsError> {
        if self.state == SubscriberState::CacheDraining && self.from_cache.is_empty() {
            self.refill_from_cache().await;
        }

        if let Some(payload) = self.from_cache.pop_front() {
            self.stats.cache_replayed += 1;
            EVENTS_CACHE_REPLAYED.inc();
            return Ok(payload);
        }

        let message = match self.recv_timeout {
            Some(limit) => tokio::time::timeout(limit, self.socket.recv())
                .await
                .map_err(|_| EventsError::Timeout)??,
            None => self.socket.recv().await?,
        };
        Ok(message.payload)
    }

    async fn refill_from_cache(&mut self) {
        let batch = match self.service.as_mut() {
            Some(service) => service.cache_read().await,
            None => Ok(Vec::new()),
        };

        match batch {
            Ok(records) if !records.is_empty() => {
                debug!(count = records.len(), "Read batch from cache");
                self.from_cache.extend(records);
            }
            Ok(_) => {
                info!(replayed = self.stats.cache_replayed, "Cache drained; switching to live");
                self.state = SubscriberState::Live;
            }
            Err(e) => {
                warn!(error = %e, "Cache read failed; switching to live");
                self.state = SubscriberState::Live;
            }
        }
    }

    /// Hand over to the cache service before going away.
    ///
    /// Arms the cache, lets the request land with an echo, drains whatever
    /// the socket already holds for at most [`CACHE_DRAIN_WINDOW`], and
    /// starts the cache seeded with those records. Runs once; later calls
    /// do nothing.
    pub async fn shutdown(&mut self) {
        if self.shut_down {
            return;
        }
        self.shut_down = true;

        let Some(service) = self.service.as_mut() else {
            return;
        };
        if !service.is_active() {
            return;
        }

        match service.cache_init().await {
            Ok(()) => {
                if let Err(e) = service.echo(ECHO_PAYLOAD).await {
                    debug!(error = %e, "Echo after cache init failed");
                }

                let seed = drain_socket(self.socket.as_mut(), CACHE_DRAIN_WINDOW);
                let seeded = seed.len();
                match service.cache_start(seed).await {
                    Ok(()) => info!(seeded, "Cache re-armed"),
                    Err(e) => warn!(error = %e, "Failed to send cache start"),
                }
            }
            Err(e) => warn!(error = %e, "Failed to init the cache"),
        }
        service.close_service();
    }

    /// Where the next record will come from.
    #[must_use]
    pub fn state(&self) -> SubscriberState {
        self.state
    }

    /// Counters so far.
    #[must_use]
    pub fn stats(&self) -> SubscriberStats {
        self.stats
    }

    /// The runtime-id table.
    #[must_use]
    pub fn tracker(&self) -> &RuntimeIdTracker {
        &self.track
    }
}

impl Drop for EventSubscriber {
    fn drop(&mut self) {
        let active = self.service.as_ref().is_some_and(|s| s.is_active());
        if !self.shut_down && active {
            warn!("Subscriber dropped without shutdown; cache not re-armed");
        }
    }
}

/// Non-blocking read of everything queued, bounded by `window`.
fn drain_socket(socket: &mut dyn SubSocket, window: Duration) -> Vec<String> {
    let start = Instant::now();
    let mut drained = Vec::new();
    loop {
        match socket.try_recv() {
            Ok(Some(message)) => drained.push(message.payload),
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "Drain stopped");
                break;
            }
        }
        if start.elapsed() > window {
            break;
        }
    }
    drained
}
