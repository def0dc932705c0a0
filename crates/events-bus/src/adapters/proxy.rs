//! # In-Memory Proxy
//!
//! A fan-out proxy bound to an ingress/egress endpoint pair. PUB sockets
//! connect to the ingress, SUB sockets to the egress, and every message is
//! offered to every SUB socket whose topic prefixes match.
//!
//! Uses `tokio::sync::broadcast` for multi-producer, multi-consumer delivery.
//! A SUB socket that falls more than the channel capacity behind loses the
//! oldest messages, as a high-water mark would; the subscriber notices
//! through sequence gaps.
//!
//! Captures are separate from SUB sockets: each holds its own buffer, filled
//! on every send up to its own bound and keeping the oldest messages.

use crate::ports::{PubSocket, SubSocket, Transport};
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use events_types::{EventsConfig, EventsError, WireMessage};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, trace};

struct ProxyShared {
    ingress: String,
    egress: String,
    sender: broadcast::Sender<WireMessage>,
    captures: Mutex<Vec<Weak<CaptureBuffer>>>,
    accepting: AtomicBool,
    forwarded: AtomicU64,
}

struct CaptureBuffer {
    records: Mutex<VecDeque<String>>,
    max: usize,
    overflowed: Arc<AtomicU64>,
}

impl CaptureBuffer {
    fn push(&self, record: String) {
        let mut records = self.records.lock();
        if records.len() >= self.max {
            self.overflowed.fetch_add(1, Ordering::Relaxed);
            return;
        }
        records.push_back(record);
    }
}

/// Unfiltered copy of everything the proxy forwards, bounded to `max`
/// records. Detaches from the proxy when dropped.
pub(crate) struct Capture {
    buffer: Arc<CaptureBuffer>,
}

impl Capture {
    /// Put `seed` ahead of what was captured so far, then re-apply the bound.
    pub(crate) fn prepend(&self, seed: Vec<String>) {
        let mut records = self.buffer.records.lock();
        let captured = std::mem::take(&mut *records);
        let total = seed.len() + captured.len();
        records.extend(seed.into_iter().chain(captured).take(self.buffer.max));
        let dropped = total - records.len();
        if dropped > 0 {
            self.buffer
                .overflowed
                .fetch_add(dropped as u64, Ordering::Relaxed);
        }
    }

    /// Everything captured, oldest first.
    pub(crate) fn take_all(&self) -> VecDeque<String> {
        std::mem::take(&mut *self.buffer.records.lock())
    }

    pub(crate) fn len(&self) -> usize {
        self.buffer.records.lock().len()
    }
}

/// In-memory implementation of the fan-out proxy.
#[derive(Clone)]
pub struct InMemoryProxy {
    shared: Arc<ProxyShared>,
    capacity: usize,
}

impl InMemoryProxy {
    /// Bind to the endpoints in `config` with default capacity.
    #[must_use]
    pub fn new(config: &EventsConfig) -> Self {
        Self::with_capacity(config, DEFAULT_CHANNEL_CAPACITY)
    }

    /// Bind with a per-subscriber buffer of `capacity` messages.
    #[must_use]
    pub fn with_capacity(config: &EventsConfig, capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            shared: Arc::new(ProxyShared {
                ingress: config.xsub_path.clone(),
                egress: config.xpub_path.clone(),
                sender,
                captures: Mutex::new(Vec::new()),
                accepting: AtomicBool::new(true),
                forwarded: AtomicU64::new(0),
            }),
            capacity,
        }
    }

    /// Stop or resume accepting messages on the ingress. While stopped,
    /// every PUB send fails.
    pub fn set_accepting(&self, accepting: bool) {
        self.shared.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Number of SUB sockets currently attached.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.shared.sender.receiver_count()
    }

    /// Messages forwarded since creation.
    #[must_use]
    pub fn forwarded(&self) -> u64 {
        self.shared.forwarded.load(Ordering::Relaxed)
    }

    /// Per-subscriber buffer size.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Attach a capture holding at most `max` records. Records beyond the
    /// bound are dropped and counted in `overflowed`.
    pub(crate) fn capture(&self, max: usize, overflowed: Arc<AtomicU64>) -> Capture {
        let buffer = Arc::new(CaptureBuffer {
            records: Mutex::new(VecDeque::new()),
            max,
            overflowed,
        });
        self.shared.captures.lock().push(Arc::downgrade(&buffer));
        Capture { buffer }
    }
}

impl Transport for InMemoryProxy {
    fn connect_pub(&self, endpoint: &str) -> Result<Box<dyn PubSocket>, EventsError> {
        if endpoint != self.shared.ingress {
            return Err(EventsError::Connect {
                endpoint: endpoint.to_string(),
                reason: "no proxy ingress bound there".to_string(),
            });
        }
        debug!(endpoint, "PUB socket connected");
        Ok(Box::new(ProxyPubSocket {
            shared: self.shared.clone(),
        }))
    }

    fn connect_sub(
        &self,
        endpoint: &str,
        topics: &[String],
    ) -> Result<Box<dyn SubSocket>, EventsError> {
        if endpoint != self.shared.egress {
            return Err(EventsError::Connect {
                endpoint: endpoint.to_string(),
                reason: "no proxy egress bound there".to_string(),
            });
        }
        debug!(endpoint, topics = ?topics, "SUB socket connected");
        Ok(Box::new(ProxySubSocket {
            receiver: self.shared.sender.subscribe(),
            topics: topics.to_vec(),
        }))
    }
}

struct ProxyPubSocket {
    shared: Arc<ProxyShared>,
}

impl PubSocket for ProxyPubSocket {
    fn send(&self, message: WireMessage) -> Result<(), EventsError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(EventsError::Send("proxy ingress not accepting".to_string()));
        }
        self.shared.captures.lock().retain(|weak| match weak.upgrade() {
            Some(capture) => {
                capture.push(message.payload.clone());
                true
            }
            None => false,
        });
        // No attached subscriber is not an error: PUB sockets drop silently.
        if let Ok(receivers) = self.shared.sender.send(message) {
            trace!(receivers, "Message forwarded");
        }
        self.shared.forwarded.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

struct ProxySubSocket {
    receiver: broadcast::Receiver<WireMessage>,
    topics: Vec<String>,
}

impl ProxySubSocket {
    fn matches(&self, message: &WireMessage) -> bool {
        self.topics.is_empty() || self.topics.iter().any(|t| message.source.starts_with(t))
    }
}

#[async_trait]
impl SubSocket for ProxySubSocket {
    async fn recv(&mut self) -> Result<WireMessage, EventsError> {
        loop {
            let message = match self.receiver.recv().await {
                Ok(m) => m,
                Err(broadcast::error::RecvError::Closed) => return Err(EventsError::Closed),
                Err(broadcast::error::RecvError::Lagged(count)) => {
                    debug!(lagged = count, "SUB socket lagged, messages dropped");
                    continue;
                }
            };

            if self.matches(&message) {
                return Ok(message);
            }
        }
    }

    fn try_recv(&mut self) -> Result<Option<WireMessage>, EventsError> {
        loop {
            let message = match self.receiver.try_recv() {
                Ok(m) => m,
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Closed) => return Err(EventsError::Closed),
                Err(broadcast::error::TryRecvError::Lagged(count)) => {
                    debug!(lagged = count, "SUB socket lagged, messages dropped");
                    continue;
                }
            };

            if self.matches(&message) {
                return Ok(Some(message));
            }
        }
    }
}
