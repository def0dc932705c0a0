//! # Cache Handoff
//!
//! A subscriber going away arms the event service cache; the next one
//! replays what was captured before reading live.
//!
//! ```text
//! Subscriber A ──deinit──→ cache running ──init──→ Subscriber B
//!      ↑                        ↑                      │
//!   live 0                  cache 3, 4        replay 1..4, then live 5
//! ```

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use events_bus::{
        EventsBridge, EventsRegistry, InMemoryEventService, InMemoryProxy, SubscriberOptions,
    };
    use events_types::{EventParams, EventReceiveOp, EventsConfig, RC_TIMEOUT};

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    fn setup() -> (Arc<EventsRegistry>, InMemoryEventService) {
        let config = EventsConfig::default();
        let proxy = InMemoryProxy::new(&config);
        let service = InMemoryEventService::new(proxy.clone(), &config);
        let registry =
            EventsRegistry::new(config, Arc::new(proxy), Arc::new(service.clone())).unwrap();
        (Arc::new(registry), service)
    }

    fn cached_options() -> SubscriberOptions {
        SubscriberOptions {
            use_cache: true,
            recv_timeout_ms: 100,
            ..SubscriberOptions::default()
        }
    }

    fn numbered(n: u32) -> EventParams {
        [("n".to_string(), n.to_string())].into_iter().collect()
    }

    fn number_of(op: &EventReceiveOp) -> u32 {
        let (_, params) = op.parse_event().unwrap();
        params["n"].parse().unwrap()
    }

    // =============================================================================
    // REGISTRY LEVEL
    // =============================================================================

    #[tokio::test]
    async fn test_restart_resumes_from_cache() {
        let (registry, service) = setup();
        let publisher = registry.init_publisher("sonic-events-swss").await.unwrap();

        let first = registry.init_subscriber(&cached_options()).await.unwrap();
        for n in 0..3 {
            registry
                .publish(publisher, "tick", Some(&numbered(n)))
                .await
                .unwrap();
        }
        let op = registry.receive(first).await;
        assert_eq!(number_of(&op), 0);

        // 1 and 2 are still queued on the socket; shutdown seeds the cache
        // with them.
        assert!(registry.deinit_subscriber(first).await);
        assert!(service.is_caching());

        for n in 3..5 {
            registry
                .publish(publisher, "tick", Some(&numbered(n)))
                .await
                .unwrap();
        }

        let second = registry.init_subscriber(&cached_options()).await.unwrap();
        assert_ne!(first, second);
        assert!(!service.is_caching());

        registry
            .publish(publisher, "tick", Some(&numbered(5)))
            .await
            .unwrap();

        let mut seen = Vec::new();
        let mut missed = Vec::new();
        for _ in 0..5 {
            let op = registry.receive(second).await;
            assert!(op.is_ok(), "rc {}", op.rc);
            seen.push(number_of(&op));
            missed.push(op.missed_count);
        }

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        // Event 0 went to the previous subscriber; this one never saw it.
        assert_eq!(missed, vec![1, 0, 0, 0, 0]);
        assert_eq!(registry.receive(second).await.rc, RC_TIMEOUT);
    }

    /// The cache holds more than one proxy channel's worth of events.
    #[tokio::test]
    async fn test_long_absence_replays_everything() {
        let (registry, service) = setup();
        let first = registry.init_subscriber(&cached_options()).await.unwrap();
        assert!(registry.deinit_subscriber(first).await);

        let publisher = registry.init_publisher("sonic-events-swss").await.unwrap();
        for n in 0..1500 {
            registry
                .publish(publisher, "tick", Some(&numbered(n)))
                .await
                .unwrap();
        }

        let second = registry.init_subscriber(&cached_options()).await.unwrap();
        for expected in 0..1500 {
            let op = registry.receive(second).await;
            assert!(op.is_ok(), "rc {} at {expected}", op.rc);
            assert_eq!(number_of(&op), expected);
            assert_eq!(op.missed_count, 0);
        }
        assert_eq!(registry.receive(second).await.rc, RC_TIMEOUT);
        assert_eq!(service.overflowed(), 0);
    }

    #[tokio::test]
    async fn test_no_cache_without_previous_subscriber() {
        let (registry, service) = setup();
        let publisher = registry.init_publisher("sonic-events-swss").await.unwrap();

        registry
            .publish(publisher, "early", Some(&numbered(0)))
            .await
            .unwrap();

        let sub = registry.init_subscriber(&cached_options()).await.unwrap();
        assert!(!service.is_caching());
        registry
            .publish(publisher, "late", Some(&numbered(1)))
            .await
            .unwrap();

        let op = registry.receive(sub).await;
        assert_eq!(number_of(&op), 1);
        assert_eq!(op.missed_count, 1);
        assert_eq!(registry.receive(sub).await.rc, RC_TIMEOUT);
    }

    #[tokio::test]
    async fn test_service_down_degrades_to_live() {
        let (registry, service) = setup();
        service.set_available(false);

        let sub = registry.init_subscriber(&cached_options()).await.unwrap();
        let publisher = registry.init_publisher("sonic-events-swss").await.unwrap();
        registry
            .publish(publisher, "tick", Some(&numbered(7)))
            .await
            .unwrap();

        let op = registry.receive(sub).await;
        assert!(op.is_ok());
        assert_eq!(number_of(&op), 7);

        assert!(registry.deinit_subscriber(sub).await);
        assert!(!service.is_caching());
    }

    // =============================================================================
    // BRIDGE LEVEL
    // =============================================================================

    #[tokio::test]
    async fn test_bridge_restart_replays_json() {
        let (registry, _service) = setup();
        let bridge = EventsBridge::new(registry);
        let args = r#"{"recv_timeout": 100}"#;

        let publisher = bridge
            .init_publisher_wrap(Some(r#"{"source": "sonic-events-bgp"}"#))
            .await;
        let first = bridge.init_subscriber_wrap(Some(args)).await;
        assert_ne!(first, 0);

        let rc = bridge
            .publish_wrap(publisher, Some(r#"{"tag": "state", "params": {"n": "0"}}"#))
            .await;
        assert_eq!(rc, 0);
        let (rc, _) = bridge.receive_wrap(first, 4096).await;
        assert!(rc > 0);
        bridge.deinit_subscriber_wrap(first).await;

        for n in 1..3 {
            let args = format!(r#"{{"tag": "state", "params": {{"n": "{n}"}}}}"#);
            assert_eq!(bridge.publish_wrap(publisher, Some(&args)).await, 0);
        }

        let second = bridge.init_subscriber_wrap(Some(args)).await;
        for expected in 1..3 {
            let (rc, json) = bridge.receive_wrap(second, 4096).await;
            assert_eq!(rc as usize, json.len());
            let op = EventReceiveOp::from_json(&json).unwrap();
            assert_eq!(number_of(&op), expected);
        }

        let (rc, json) = bridge.receive_wrap(second, 4096).await;
        assert_eq!(rc, 0);
        assert!(json.is_empty());

        bridge.deinit_subscriber_wrap(second).await;
        bridge.deinit_publisher_wrap(publisher).await;
    }
}
