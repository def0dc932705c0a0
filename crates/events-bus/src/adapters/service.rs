//! # In-Memory Event Service
//!
//! Stands in for the event daemon's request/reply side: an echo responder
//! and a cache that captures everything leaving the proxy while no
//! subscriber is around.
//!
//! ```text
//!            cache_init           cache_start(seed)         cache_stop
//!   [Idle] ─────────────→ [Armed] ─────────────────→ [Running] ────────→ [Stopped]
//!     ↑                                                                     │
//!     └──────────────────────── cache_read returns empty ───────────────────┘
//! ```

use super::proxy::{Capture, InMemoryProxy};
use crate::ports::{EventServiceClient, EventServiceConnector};
use async_trait::async_trait;
use events_types::{EventsConfig, EventsError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Records handed out per `cache_read`.
pub const DEFAULT_READ_BATCH: usize = 100;

enum CacheState {
    Idle,
    Armed(Capture),
    Running(Capture),
    Stopped(VecDeque<String>),
}

struct ServiceShared {
    endpoint: String,
    available: AtomicBool,
    state: Mutex<CacheState>,
    max_cached: usize,
    read_batch: usize,
    overflowed: Arc<AtomicU64>,
}

/// In-memory event service bound to the request/reply endpoint.
#[derive(Clone)]
pub struct InMemoryEventService {
    shared: Arc<ServiceShared>,
    proxy: InMemoryProxy,
}

impl InMemoryEventService {
    /// Bind to `config.req_rep_path`, capturing from `proxy`.
    #[must_use]
    pub fn new(proxy: InMemoryProxy, config: &EventsConfig) -> Self {
        Self::with_read_batch(proxy, config, DEFAULT_READ_BATCH)
    }

    /// Bind with a custom `cache_read` batch size.
    #[must_use]
    pub fn with_read_batch(proxy: InMemoryProxy, config: &EventsConfig, read_batch: usize) -> Self {
        Self {
            shared: Arc::new(ServiceShared {
                endpoint: config.req_rep_path.clone(),
                available: AtomicBool::new(true),
                state: Mutex::new(CacheState::Idle),
                max_cached: config.cache_max_cnt,
                read_batch: read_batch.max(1),
                overflowed: Arc::new(AtomicU64::new(0)),
            }),
            proxy,
        }
    }

    /// Simulate the service going down or coming back. Requests sent while
    /// down are never answered.
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    /// Whether a cache is currently capturing.
    #[must_use]
    pub fn is_caching(&self) -> bool {
        matches!(*self.shared.state.lock(), CacheState::Running(_))
    }

    /// Whether a cache has been armed but not started.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        matches!(*self.shared.state.lock(), CacheState::Armed(_))
    }

    /// Records dropped because the cache was full.
    #[must_use]
    pub fn overflowed(&self) -> u64 {
        self.shared.overflowed.load(Ordering::Relaxed)
    }
}

impl EventServiceConnector for InMemoryEventService {
    fn init_client(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Box<dyn EventServiceClient>, EventsError> {
        if endpoint != self.shared.endpoint {
            return Err(EventsError::Connect {
                endpoint: endpoint.to_string(),
                reason: "no event service bound there".to_string(),
            });
        }
        Ok(Box::new(InMemoryServiceClient {
            shared: self.shared.clone(),
            proxy: self.proxy.clone(),
            timeout,
            active: true,
            pending_echo: None,
        }))
    }
}

struct InMemoryServiceClient {
    shared: Arc<ServiceShared>,
    proxy: InMemoryProxy,
    timeout: Duration,
    active: bool,
    pending_echo: Option<String>,
}

impl InMemoryServiceClient {
    /// Gate every request that needs an answer.
    fn reachable(&self) -> Result<(), EventsError> {
        if !self.active {
            return Err(EventsError::Closed);
        }
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(EventsError::ServiceUnavailable(format!(
                "no reply within {:?}",
                self.timeout
            )));
        }
        Ok(())
    }

    fn capture(&self) -> Capture {
        self.proxy
            .capture(self.shared.max_cached, self.shared.overflowed.clone())
    }
}

#[async_trait]
impl EventServiceClient for InMemoryServiceClient {
    async fn echo_send(&mut self, payload: &str) -> Result<(), EventsError> {
        if !self.active {
            return Err(EventsError::Closed);
        }
        // Requests queue locally even if nobody is listening yet.
        self.pending_echo = Some(payload.to_string());
        Ok(())
    }

    async fn echo_receive(&mut self) -> Result<String, EventsError> {
        self.reachable()?;
        self.pending_echo
            .take()
            .ok_or_else(|| EventsError::Recv("no echo request outstanding".to_string()))
    }

    fn is_active(&self) -> bool {
        self.active
    }

    async fn cache_init(&mut self) -> Result<(), EventsError> {
        self.reachable()?;
        let capture = self.capture();
        *self.shared.state.lock() = CacheState::Armed(capture);
        debug!("Cache armed");
        Ok(())
    }

    async fn cache_start(&mut self, seed: Vec<String>) -> Result<(), EventsError> {
        self.reachable()?;
        let mut state = self.shared.state.lock();
        let previous = std::mem::replace(&mut *state, CacheState::Idle);
        let capture = match previous {
            CacheState::Armed(capture) | CacheState::Running(capture) => capture,
            CacheState::Stopped(leftover) => {
                let capture = self.capture();
                capture.prepend(leftover.into());
                capture
            }
            CacheState::Idle => self.capture(),
        };

        let seeded = seed.len();
        capture.prepend(seed);
        info!(seeded, cached = capture.len(), "Cache started");
        *state = CacheState::Running(capture);
        Ok(())
    }

    async fn cache_stop(&mut self) -> Result<bool, EventsError> {
        self.reachable()?;
        let mut state = self.shared.state.lock();
        let previous = std::mem::replace(&mut *state, CacheState::Idle);
        match previous {
            CacheState::Running(capture) => {
                let records = capture.take_all();
                info!(cached = records.len(), "Cache stopped");
                *state = CacheState::Stopped(records);
                Ok(true)
            }
            CacheState::Stopped(records) => {
                *state = CacheState::Stopped(records);
                Ok(false)
            }
            CacheState::Armed(_) | CacheState::Idle => Ok(false),
        }
    }

    async fn cache_read(&mut self) -> Result<Vec<String>, EventsError> {
        self.reachable()?;
        let mut state = self.shared.state.lock();
        let CacheState::Stopped(records) = &mut *state else {
            return Ok(Vec::new());
        };

        let take = records.len().min(self.shared.read_batch);
        let batch: Vec<String> = records.drain(..take).collect();
        if batch.is_empty() {
            *state = CacheState::Idle;
        }
        Ok(batch)
    }

    fn close_service(&mut self) {
        self.active = false;
        self.pending_echo = None;
    }
}
