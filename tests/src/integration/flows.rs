//! # Delivery Flows
//!
//! Publishers and a subscriber wired through the in-memory proxy:
//!
//! 1. Source filtering for a single daemon's events
//! 2. Several publishers into one subscriber, each gap-free
//! 3. Loss on the subscriber side reported once, on the next delivered event
//! 4. Duplicates dropped by sequence
//! 5. Publisher deinit retiring its runtime id
//! 6. Bounded runtime-id table under publisher churn

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::collections::HashSet;

    use events_bus::{
        EventPublisher, EventSubscriber, InMemoryEventService, InMemoryProxy, PubSocket,
        RuntimeIdTracker, SubSocket, SubscriberOptions, Transport,
    };
    use events_types::{
        EventParams, EventRecord, EventsConfig, EventsError, WireMessage, RC_TIMEOUT,
    };

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    struct Bus {
        config: EventsConfig,
        proxy: InMemoryProxy,
        service: InMemoryEventService,
    }

    impl Bus {
        fn new() -> Self {
            let config = EventsConfig::default();
            let proxy = InMemoryProxy::new(&config);
            let service = InMemoryEventService::new(proxy.clone(), &config);
            Self {
                config,
                proxy,
                service,
            }
        }

        async fn publisher(&self, source: &str) -> EventPublisher {
            EventPublisher::connect(source, &self.config, &self.proxy, &self.service)
                .await
                .unwrap()
        }

        async fn subscriber(&self, sources: &[&str]) -> EventSubscriber {
            let options = SubscriberOptions {
                recv_timeout_ms: 100,
                sources: sources.iter().map(|s| s.to_string()).collect(),
                ..SubscriberOptions::default()
            };
            EventSubscriber::connect(&options, &self.config, &self.proxy, &self.service)
                .await
                .unwrap()
        }

        fn raw_pub(&self) -> Box<dyn PubSocket> {
            self.proxy.connect_pub(&self.config.xsub_path).unwrap()
        }
    }

    fn params(pairs: &[(&str, &str)]) -> EventParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Transport whose SUB sockets silently lose the messages at the given
    /// positions, as a high-water mark overflow would.
    struct LossyTransport {
        inner: InMemoryProxy,
        lose: HashSet<usize>,
    }

    struct LossySubSocket {
        inner: Box<dyn SubSocket>,
        lose: HashSet<usize>,
        seen: usize,
    }

    impl LossySubSocket {
        fn keep(&mut self) -> bool {
            let index = self.seen;
            self.seen += 1;
            !self.lose.contains(&index)
        }
    }

    #[async_trait]
    impl SubSocket for LossySubSocket {
        async fn recv(&mut self) -> Result<WireMessage, EventsError> {
            loop {
                let message = self.inner.recv().await?;
                if self.keep() {
                    return Ok(message);
                }
            }
        }

        fn try_recv(&mut self) -> Result<Option<WireMessage>, EventsError> {
            while let Some(message) = self.inner.try_recv()? {
                if self.keep() {
                    return Ok(Some(message));
                }
            }
            Ok(None)
        }
    }

    impl Transport for LossyTransport {
        fn connect_pub(&self, endpoint: &str) -> Result<Box<dyn PubSocket>, EventsError> {
            self.inner.connect_pub(endpoint)
        }

        fn connect_sub(
            &self,
            endpoint: &str,
            topics: &[String],
        ) -> Result<Box<dyn SubSocket>, EventsError> {
            Ok(Box::new(LossySubSocket {
                inner: self.inner.connect_sub(endpoint, topics)?,
                lose: self.lose.clone(),
                seen: 0,
            }))
        }
    }

    // =============================================================================
    // SOURCE FILTERING
    // =============================================================================

    /// A subscriber filtered to orchagent sees its port event and nothing
    /// from bgp.
    #[tokio::test]
    async fn test_port_up_reaches_filtered_subscriber() {
        let bus = Bus::new();
        let mut sub = bus.subscriber(&["orchagent"]).await;
        let mut orchagent = bus.publisher("orchagent").await;
        let mut bgp = bus.publisher("bgp").await;

        bgp.publish("bgp-state", Some(&params(&[("ip", "10.0.0.1")])))
            .await
            .unwrap();
        orchagent
            .publish("port-up", Some(&params(&[("iface", "Ethernet0")])))
            .await
            .unwrap();

        let op = sub.event_receive().await;
        assert!(op.is_ok());
        assert_eq!(op.missed_count, 0);
        assert!(op.publish_epoch > 0);

        let (key, received) = op.parse_event().unwrap();
        assert_eq!(key, "orchagent:port-up");
        assert_eq!(received.get("iface").map(String::as_str), Some("Ethernet0"));
        assert!(received.contains_key("timestamp"));
        assert_eq!(received.len(), 2);

        assert_eq!(sub.event_receive().await.rc, RC_TIMEOUT);
    }

    // =============================================================================
    // FAN-IN
    // =============================================================================

    #[tokio::test]
    async fn test_two_publishers_each_gap_free() {
        let bus = Bus::new();
        let mut sub = bus.subscriber(&[]).await;
        let mut a = bus.publisher("sonic-events-swss").await;
        let mut b = bus.publisher("sonic-events-bgp").await;

        for i in 0..20 {
            let n = i.to_string();
            a.publish("tick", Some(&params(&[("n", &n)]))).await.unwrap();
            b.publish("tick", Some(&params(&[("n", &n)]))).await.unwrap();
        }

        let mut next_a = 0;
        let mut next_b = 0;
        for _ in 0..40 {
            let op = sub.event_receive().await;
            assert!(op.is_ok(), "rc {}", op.rc);
            assert_eq!(op.missed_count, 0);

            let (key, received) = op.parse_event().unwrap();
            let n: u32 = received["n"].parse().unwrap();
            if key.starts_with("sonic-events-swss") {
                assert_eq!(n, next_a);
                next_a += 1;
            } else {
                assert_eq!(n, next_b);
                next_b += 1;
            }
        }

        assert_eq!((next_a, next_b), (20, 20));
        assert_eq!(sub.tracker().len(), 2);
        assert_eq!(sub.stats().missed, 0);
    }

    // =============================================================================
    // LOSS AND DUPLICATES
    // =============================================================================

    /// Three messages lost in transit show up as `missed_count == 3` on the
    /// first event after the gap, and nowhere else.
    #[tokio::test]
    async fn test_lost_messages_are_counted() {
        let bus = Bus::new();
        let lossy = LossyTransport {
            inner: bus.proxy.clone(),
            lose: [3, 4, 5].into_iter().collect(),
        };
        let options = SubscriberOptions {
            recv_timeout_ms: 100,
            ..SubscriberOptions::default()
        };
        let mut sub = EventSubscriber::connect(&options, &bus.config, &lossy, &bus.service)
            .await
            .unwrap();
        let mut publisher = bus.publisher("sonic-events-swss").await;

        for _ in 0..10 {
            publisher.publish("tick", None).await.unwrap();
        }

        let mut missed = Vec::new();
        for _ in 0..7 {
            let op = sub.event_receive().await;
            assert!(op.is_ok());
            missed.push(op.missed_count);
        }
        assert_eq!(missed, vec![0, 0, 0, 3, 0, 0, 0]);
        assert_eq!(sub.stats().missed, 3);
        assert_eq!(sub.event_receive().await.rc, RC_TIMEOUT);
    }

    #[tokio::test]
    async fn test_duplicate_is_dropped() {
        let bus = Bus::new();
        let mut sub = bus.subscriber(&[]).await;
        let wire = bus.raw_pub();

        let first = EventRecord::new(r#"{"src:a":{}}"#, "rid", 1);
        let second = EventRecord::new(r#"{"src:b":{}}"#, "rid", 2);
        for record in [&first, &first, &second] {
            wire.send(WireMessage::frame("src", record).unwrap()).unwrap();
        }

        assert_eq!(sub.event_receive().await.event, first.data);
        let op = sub.event_receive().await;
        assert_eq!(op.event, second.data);
        assert_eq!(op.missed_count, 0);
        assert_eq!(sub.stats().duplicates, 1);
    }

    // =============================================================================
    // RUNTIME ID LIFECYCLE
    // =============================================================================

    /// Dropping a publisher sends a deinit control record; the subscriber
    /// swallows it and forgets the runtime id.
    #[tokio::test]
    async fn test_publisher_deinit_retires_runtime_id() {
        let bus = Bus::new();
        let mut sub = bus.subscriber(&[]).await;
        let mut publisher = bus.publisher("sonic-events-swss").await;

        publisher.publish("once", None).await.unwrap();
        drop(publisher);

        assert!(sub.event_receive().await.is_ok());
        assert_eq!(sub.event_receive().await.rc, RC_TIMEOUT);
        assert!(sub.tracker().is_empty());
        assert_eq!(sub.stats().controls, 1);

        // A fresh publisher for the same source starts over without loss.
        let mut publisher = bus.publisher("sonic-events-swss").await;
        publisher.publish("again", None).await.unwrap();
        let op = sub.event_receive().await;
        assert!(op.is_ok());
        assert_eq!(op.missed_count, 0);
    }

    #[tokio::test]
    async fn test_tracker_stays_bounded_under_churn() {
        let bus = Bus::new();
        let mut sub = bus
            .subscriber(&[])
            .await
            .with_tracker(RuntimeIdTracker::with_capacity(3, 1));
        let wire = bus.raw_pub();

        for i in 0..12 {
            let record = EventRecord::new(r#"{"src:t":{}}"#, format!("rid-{i}"), 1);
            wire.send(WireMessage::frame("src", &record).unwrap()).unwrap();
        }

        for _ in 0..12 {
            assert!(sub.event_receive().await.is_ok());
            assert!(sub.tracker().len() <= 4);
        }
        assert!(sub.tracker().len() >= 3);
        assert!(sub.tracker().get("rid-11").is_some());
    }
}
