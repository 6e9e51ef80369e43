//! # Integration Tests
//!
//! Cross-crate tests.
//!
//! Covers:
//! - contract smoke tests
//! - config -> simulated service -> dispatcher end-to-end runs (paused clock)
//! - a hand-written service implementing the contract directly

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_contracts_compile() {
        let _ = contracts::ConfigVersion::V1;
        assert!(contracts::ServiceError::Blocked.is_capacity_refusal());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{RelayBlueprint, ServiceError};
    use dispatcher::{CancellationToken, Chunk, Dispatcher, DispatcherConfig, MockService};
    use tokio::sync::mpsc;

    const PERIOD: Duration = Duration::from_secs(1);

    fn blueprint(extra_service: &str) -> RelayBlueprint {
        let toml = format!(
            "[service]\nlimit = 20\nperiod_ms = 1000\n{extra_service}\n\n[dispatcher]\nmode = \"parallel\"\n"
        );
        ConfigLoader::load_from_str(&toml, ConfigFormat::Toml).unwrap()
    }

    /// Simulated service built the same way the CLI builds it
    fn service_from(blueprint: &RelayBlueprint) -> MockService {
        let config = &blueprint.service;
        let mut service = MockService::new(config.limit, Duration::from_millis(config.period_ms))
            .with_latency(config.latency());
        for &index in &config.refuse_chunks {
            service = service.fail_chunk(index, ServiceError::Blocked);
        }
        for &index in &config.fail_chunks {
            service = service.fail_chunk(index, ServiceError::processing("scripted"));
        }
        service
    }

    fn dispatcher_for(blueprint: &RelayBlueprint) -> (Dispatcher<MockService>, MockService) {
        let service = service_from(blueprint);
        let dispatcher = Dispatcher::with_config(DispatcherConfig::from(&blueprint.dispatcher))
            .with_service(service.clone());
        (dispatcher, service)
    }

    fn items(n: u32) -> Vec<u32> {
        (0..n).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_large_batch() {
        let (dispatcher, service) = dispatcher_for(&blueprint(""));

        let sent = dispatcher
            .send(&CancellationToken::new(), &items(1325))
            .await
            .unwrap();

        assert_eq!(sent, 1325);
        assert_eq!(service.call_count(), 67);
        assert_eq!(service.received(), 1325);
        assert_eq!(service.chunk_sizes().last(), Some(&5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_small_batches_single_call() {
        for n in [5, 20] {
            let (dispatcher, service) = dispatcher_for(&blueprint(""));
            let started = tokio::time::Instant::now();

            let sent = dispatcher
                .send(&CancellationToken::new(), &items(n))
                .await
                .unwrap();

            assert_eq!(sent, n as usize);
            assert_eq!(service.chunk_sizes(), vec![n as usize]);
            assert!(started.elapsed() < PERIOD, "no pacing after the only chunk");
            assert_eq!(dispatcher.metrics_snapshot().pacing_sleeps, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_chunks_one_period_apart() {
        let (dispatcher, service) = dispatcher_for(&blueprint(""));

        let sent = dispatcher
            .send(&CancellationToken::new(), &items(40))
            .await
            .unwrap();

        assert_eq!(sent, 40);
        assert_eq!(service.chunk_sizes(), vec![20, 20]);
        let starts = service.start_times();
        assert!(starts[1] - starts[0] >= PERIOD);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_refusal_on_second_chunk() {
        let (dispatcher, service) = dispatcher_for(&blueprint("refuse_chunks = [1]"));

        let err = dispatcher
            .send(&CancellationToken::new(), &items(40))
            .await
            .unwrap_err();

        assert_eq!(err.sent(), 20);
        assert!(err.is_capacity_refusal());
        assert_eq!(err.service_error(), Some(&ServiceError::Blocked));
        assert_eq!(service.received(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_refusal_pairs_error_with_chunk() {
        let (dispatcher, service) = dispatcher_for(&blueprint("refuse_chunks = [1]"));
        let (error_tx, mut error_rx) = mpsc::channel(4);
        let (unsent_tx, mut unsent_rx) = mpsc::channel::<Chunk<u32>>(4);

        dispatcher
            .parallel_send(
                &CancellationToken::new(),
                Arc::<[u32]>::from(items(40)),
                error_tx,
                unsent_tx,
            )
            .await
            .unwrap();

        assert_eq!(error_rx.recv().await, Some(ServiceError::Blocked));
        let unsent = unsent_rx.recv().await.unwrap();
        assert_eq!(unsent.as_slice(), (20..40).collect::<Vec<_>>().as_slice());

        // Chunk 0 went through and nothing else was reported
        assert!(error_rx.recv().await.is_none());
        assert!(unsent_rx.recv().await.is_none());
        assert_eq!(service.received(), 20);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_collect_matches_chunk_count() {
        let (dispatcher, service) = dispatcher_for(&blueprint("fail_chunks = [0, 66]"));

        let unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), Arc::<[u32]>::from(items(1325)))
            .await
            .unwrap();

        let mut ranges: Vec<_> = unsent.iter().map(|u| u.chunk.range()).collect();
        ranges.sort_by_key(|r| r.start);
        assert_eq!(ranges, vec![0..20, 1320..1325]);
        assert_eq!(dispatcher.metrics_snapshot().chunks_submitted, 67);
        assert_eq!(service.received(), 1325 - 25);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_reaches_service() {
        let (dispatcher, _service) = dispatcher_for(&blueprint("latency_ms = 5000"));
        let ctx = CancellationToken::new();
        ctx.cancel();

        let err = dispatcher.send(&ctx, &items(40)).await.unwrap_err();
        assert_eq!(err.service_error(), Some(&ServiceError::Cancelled));
        assert_eq!(err.sent(), 0);
    }
}

#[cfg(test)]
mod custom_service_tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use contracts::{CancellationToken, RateLimitedService, RateLimits, ServiceError};
    use dispatcher::Dispatcher;

    /// Records every chunk it is handed
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<Vec<String>>>,
    }

    impl RateLimitedService<String> for Recorder {
        fn limits(&self) -> RateLimits {
            RateLimits::new(3, Duration::from_millis(100))
        }

        async fn process(
            &self,
            _ctx: &CancellationToken,
            chunk: &[String],
        ) -> Result<(), ServiceError> {
            self.seen.lock().unwrap().push(chunk.to_vec());
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_items_are_passed_through_in_order() {
        let batch: Vec<String> = ["a", "b", "c", "d", "e", "f", "g"]
            .into_iter()
            .map(String::from)
            .collect();
        let dispatcher = Dispatcher::new().with_service(Recorder::default());

        let sent = dispatcher
            .send(&CancellationToken::new(), &batch)
            .await
            .unwrap();
        assert_eq!(sent, 7);

        let recorder = dispatcher.service().unwrap();
        let seen = recorder.seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen.concat(), batch);
        assert_eq!(seen[2], vec!["g".to_string()]);
    }
}
