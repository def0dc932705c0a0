//! # Event Publisher
//!
//! One publisher instance per event source. Each instance owns its PUB
//! socket, a runtime id generated on first publish, and a sequence counter.
//!
//! ## Startup pacing
//!
//! A PUB connect completes asynchronously and anything sent before it lands
//! is dropped. At construction an echo request goes to the event service;
//! the reply is collected on the first publish, by which time the PUB side
//! has had a round trip's worth of time to connect. The service channel is
//! closed right after: it has no other use on this side.

use crate::ports::{EventServiceClient, EventServiceConnector, PubSocket, Transport};
use crate::{ECHO_PAYLOAD, PUBLISHER_SERVICE_TIMEOUT};
use events_telemetry::{EVENTS_PUBLISHED, EVENTS_PUBLISH_FAILURES};
use events_types::payload::{encode_event, event_key, timestamp_now};
use events_types::{
    EventParams, EventRecord, EventsConfig, EventsError, Sequence, WireMessage, CONTROL_DEINIT,
    TIMESTAMP_PARAM,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A live publisher for one event source.
pub struct EventPublisher {
    source: String,
    socket: Box<dyn PubSocket>,
    service: Box<dyn EventServiceClient>,
    runtime_id: Option<String>,
    sequence: Sequence,
    published: u64,
    failures: u64,
}

impl EventPublisher {
    /// Connect a publisher for `source`.
    ///
    /// # Errors
    ///
    /// Fails if the PUB socket cannot connect, the service client cannot be
    /// created, or the pacing echo cannot be sent.
    pub async fn connect(
        source: &str,
        config: &EventsConfig,
        transport: &dyn Transport,
        connector: &dyn EventServiceConnector,
    ) -> Result<Self, EventsError> {
        let socket = transport.connect_pub(&config.xsub_path).map_err(|e| {
            warn!(source, endpoint = %config.xsub_path, error = %e, "Publisher fails to connect");
            e
        })?;

        let mut service = connector.init_client(&config.req_rep_path, PUBLISHER_SERVICE_TIMEOUT)?;

        // Reply is read on first publish.
        service.echo_send(ECHO_PAYLOAD).await.map_err(|e| {
            warn!(source, error = %e, "Failed to echo send in event service");
            e
        })?;

        info!(source, "Publisher created");
        Ok(Self {
            source: source.to_string(),
            socket,
            service,
            runtime_id: None,
            sequence: 0,
            published: 0,
            failures: 0,
        })
    }

    /// Publish `tag` with `params` under this publisher's source.
    ///
    /// A `timestamp` parameter is added when the caller did not supply one.
    /// Failures are not retried; the event is simply lost and the subscriber
    /// will see a sequence gap.
    pub async fn publish(
        &mut self,
        tag: &str,
        params: Option<&EventParams>,
    ) -> Result<(), EventsError> {
        if self.service.is_active() {
            // Bounded by the service timeout. A down service only means we
            // publish without confirmation that the PUB connect settled.
            if let Err(e) = self.service.echo_receive().await {
                debug!(source = %self.source, error = %e, "Echo reply not received");
            }
            self.service.close_service();
        }

        if self.runtime_id.is_none() {
            let id = Uuid::new_v4().to_string();
            debug!(source = %self.source, runtime_id = %id, "Runtime id assigned");
            self.runtime_id = Some(id);
        }

        let mut params = params.cloned().unwrap_or_default();
        params
            .entry(TIMESTAMP_PARAM.to_string())
            .or_insert_with(timestamp_now);

        let data = encode_event(&event_key(&self.source, tag), &params)?;
        self.send_event(&data).map_err(|e| {
            warn!(
                source = %self.source,
                size = data.len(),
                data = %truncate(&data, 20),
                error = %e,
                "Failed to send event"
            );
            e
        })?;

        info!(source = %self.source, data = %truncate(&data, 80), "EVENT_PUBLISHED");
        Ok(())
    }

    /// Stamp, sequence and send one record.
    fn send_event(&mut self, data: &str) -> Result<(), EventsError> {
        // 0 after wraparound tells receivers a rollover happened.
        self.sequence = self.sequence.wrapping_add(1);

        let runtime_id = self.runtime_id.clone().unwrap_or_default();
        let record = EventRecord::new(data, runtime_id, self.sequence);
        let message = WireMessage::frame(self.source.clone(), &record)?;

        match self.socket.send(message) {
            Ok(()) => {
                self.published += 1;
                EVENTS_PUBLISHED.with_label_values(&[self.source.as_str()]).inc();
                Ok(())
            }
            Err(e) => {
                self.failures += 1;
                EVENTS_PUBLISH_FAILURES.with_label_values(&[self.source.as_str()]).inc();
                Err(e)
            }
        }
    }

    /// The event source this publisher serves.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Runtime id, once the first publish has happened.
    #[must_use]
    pub fn runtime_id(&self) -> Option<&str> {
        self.runtime_id.as_deref()
    }

    /// Last sequence sent.
    #[must_use]
    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    /// Records accepted by the transport, including control records.
    #[must_use]
    pub fn published(&self) -> u64 {
        self.published
    }

    /// Records the transport refused.
    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures
    }

    #[cfg(test)]
    pub(crate) fn set_sequence(&mut self, sequence: Sequence) {
        self.sequence = sequence;
    }
}

impl Drop for EventPublisher {
    fn drop(&mut self) {
        // Retire the runtime id so the subscriber frees its track entry now.
        if self.runtime_id.is_some() {
            if let Err(e) = self.send_event(CONTROL_DEINIT) {
                warn!(source = %self.source, error = %e, "Failed to send deinit");
            }
        }
        self.service.close_service();
        debug!(source = %self.source, "Publisher dropped");
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
