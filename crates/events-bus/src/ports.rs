//! # Ports
//!
//! The bus core talks to two external collaborators only through these
//! traits:
//!
//! - the pub/sub **transport**, a fan-out proxy with an ingress endpoint for
//!   PUB sockets and an egress endpoint for SUB sockets
//! - the **event service**, a request/reply peer offering an echo probe and
//!   cache control
//!
//! In-memory implementations live in [`crate::adapters`].

use async_trait::async_trait;
use events_types::{EventsError, WireMessage};
use std::time::Duration;

/// Publishing end of the transport.
pub trait PubSocket: Send + Sync {
    /// Queue a two-part message for delivery. Never blocks.
    fn send(&self, message: WireMessage) -> Result<(), EventsError>;
}

/// Subscribing end of the transport.
#[async_trait]
pub trait SubSocket: Send {
    /// Wait for the next message matching the socket's topic prefixes.
    async fn recv(&mut self) -> Result<WireMessage, EventsError>;

    /// Take the next message if one is already queued.
    fn try_recv(&mut self) -> Result<Option<WireMessage>, EventsError>;
}

/// Factory for transport sockets.
pub trait Transport: Send + Sync {
    /// Connect a PUB socket to the proxy ingress.
    fn connect_pub(&self, endpoint: &str) -> Result<Box<dyn PubSocket>, EventsError>;

    /// Connect a SUB socket to the proxy egress.
    ///
    /// `topics` are prefixes; an empty list subscribes to everything.
    fn connect_sub(&self, endpoint: &str, topics: &[String])
        -> Result<Box<dyn SubSocket>, EventsError>;
}

/// Client stub for the event service.
///
/// Every call is best-effort: callers log failures and carry on without the
/// handshake or the cache.
#[async_trait]
pub trait EventServiceClient: Send {
    /// Send an echo request without waiting for the reply.
    async fn echo_send(&mut self, payload: &str) -> Result<(), EventsError>;

    /// Collect the reply to the last echo request.
    async fn echo_receive(&mut self) -> Result<String, EventsError>;

    /// One full echo round trip.
    async fn echo(&mut self, payload: &str) -> Result<String, EventsError> {
        self.echo_send(payload).await?;
        self.echo_receive().await
    }

    /// Whether the channel is still open.
    fn is_active(&self) -> bool;

    /// Arm the cache: the service starts capturing from the proxy.
    async fn cache_init(&mut self) -> Result<(), EventsError>;

    /// Start caching, seeded with already-serialized records.
    async fn cache_start(&mut self, seed: Vec<String>) -> Result<(), EventsError>;

    /// Stop caching. `true` if a cache was running.
    async fn cache_stop(&mut self) -> Result<bool, EventsError>;

    /// Next batch of cached records; empty once the cache is exhausted.
    async fn cache_read(&mut self) -> Result<Vec<String>, EventsError>;

    /// Release the channel.
    fn close_service(&mut self);
}

/// Factory for event service clients.
pub trait EventServiceConnector: Send + Sync {
    /// Open a request/reply channel. Establishing does not wait for the
    /// peer; later calls are bounded by `timeout`.
    fn init_client(
        &self,
        endpoint: &str,
        timeout: Duration,
    ) -> Result<Box<dyn EventServiceClient>, EventsError>;
}
