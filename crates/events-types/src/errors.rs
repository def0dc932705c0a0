//! # Error Types
//!
//! Error taxonomy for the event bus. Every failure is expressed either as a
//! `Result` or, at the caller-facing boundary, as an integer return code.

use thiserror::Error;

/// Return code used by callers for "no event within the receive timeout".
pub const RC_TIMEOUT: i32 = 11;

/// Errors that can occur anywhere in the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventsError {
    /// A socket could not be connected to its endpoint.
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    /// Sending a message on the transport failed.
    #[error("Send failed: {0}")]
    Send(String),

    /// Receiving a message from the transport failed.
    #[error("Receive failed: {0}")]
    Recv(String),

    /// The receive timeout elapsed without a message.
    #[error("Timed out waiting for a message")]
    Timeout,

    /// The transport or service channel was closed.
    #[error("Channel closed")]
    Closed,

    /// The event service did not answer.
    #[error("Event service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A wire record could not be decoded.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// An event payload string does not have the `{"source:tag": {..}}` shape.
    #[error("Malformed event payload: {0}")]
    MalformedPayload(String),

    /// Bad endpoint or config file.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The handle does not refer to a live publisher or subscriber.
    #[error("Invalid handle")]
    InvalidHandle,
}

impl EventsError {
    /// Integer return code exposed to callers.
    ///
    /// Timeouts are positive so callers can tell them apart from hard errors.
    #[must_use]
    pub fn rc(&self) -> i32 {
        match self {
            Self::Timeout => RC_TIMEOUT,
            Self::Connect { .. } => -1,
            Self::Send(_) => -2,
            Self::Recv(_) => -3,
            Self::Closed => -4,
            Self::ServiceUnavailable(_) => -5,
            Self::MalformedRecord(_) => -6,
            Self::MalformedPayload(_) => -7,
            Self::Config(_) => -8,
            Self::InvalidHandle => -9,
        }
    }

    /// Whether the error is a timeout rather than a failure.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}
