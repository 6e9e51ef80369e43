//! Concurrent fan-out: one task per chunk, launches paced to the rate window

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};

use contracts::{CancellationToken, RateLimitedService, ServiceError};
use observability::metrics::{
    record_chunk_outcome, record_dispatch_completed, record_in_flight, record_pacing_sleep,
};

use crate::chunk::{Chunk, UnsentChunk};
use crate::dispatcher::{resolve_limits, Dispatcher};
use crate::error::DispatcherError;
use crate::metrics::DispatchMetrics;
use crate::pacer::{self, Pacer};

const MODE: &str = "parallel";

/// Failure report channels, written as one error/chunk pair at a time
struct Reporter<T> {
    error_tx: mpsc::Sender<ServiceError>,
    unsent_tx: mpsc::Sender<Chunk<T>>,
}

impl<T> Reporter<T> {
    async fn report(&self, error: ServiceError, chunk: Chunk<T>) {
        let offset = chunk.offset();
        if self.error_tx.send(error).await.is_err() {
            warn!(offset, "Error receiver dropped, failure report lost");
        }
        if self.unsent_tx.send(chunk).await.is_err() {
            warn!(offset, "Unsent receiver dropped, chunk report lost");
        }
    }
}

/// Keeps the in-flight gauge honest even if the service panics
struct InFlight(Arc<DispatchMetrics>);

impl InFlight {
    fn enter(metrics: Arc<DispatchMetrics>) -> Self {
        metrics.task_started();
        record_in_flight(metrics.in_flight());
        Self(metrics)
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.task_finished();
        record_in_flight(self.0.in_flight());
    }
}

impl<S> Dispatcher<S> {
    /// Send a batch with one concurrent task per chunk
    ///
    /// Launches are paced at one per `period`; completions are not. A failing
    /// chunk never affects the others: its error goes to `error_tx` and its
    /// items to `unsent_tx`, written back to back so the n-th error received
    /// belongs to the n-th chunk received. Returns once every launched task
    /// has finished.
    ///
    /// Both channels must be drained while this runs. Reporting waits for
    /// channel capacity, so an undrained channel stalls its task and with it
    /// the final join. The senders are dropped on return: if the caller kept
    /// no clones, the receivers see the channels close when dispatch is done.
    ///
    /// # Errors
    /// Only setup failures, before any chunk is launched:
    /// [`DispatcherError::ServiceNotSet`] and [`DispatcherError::InvalidLimits`].
    #[instrument(name = "dispatcher_parallel_send", skip_all, fields(items = batch.len()))]
    pub async fn parallel_send<T>(
        &self,
        ctx: &CancellationToken,
        batch: Arc<[T]>,
        error_tx: mpsc::Sender<ServiceError>,
        unsent_tx: mpsc::Sender<Chunk<T>>,
    ) -> Result<(), DispatcherError>
    where
        S: RateLimitedService<T> + Sync + 'static,
        T: Send + Sync + 'static,
    {
        if batch.is_empty() {
            return Ok(());
        }

        let service = self.service.clone().ok_or(DispatcherError::ServiceNotSet)?;
        let (limits, chunk_size) = resolve_limits(service.limits())?;
        let chunk_count = pacer::chunk_count(batch.len(), chunk_size);
        let pool_size = self
            .config
            .max_in_flight
            .map_or(chunk_count, |cap| cap.clamp(1, chunk_count));

        debug!(
            limit = limits.limit,
            period_ms = limits.period.as_millis() as u64,
            chunks = chunk_count,
            pool_size,
            "Parallel dispatch started"
        );

        let started = Instant::now();
        let pool = Arc::new(Semaphore::new(pool_size));
        let reporter = Arc::new(Mutex::new(Reporter {
            error_tx,
            unsent_tx,
        }));
        let mut tasks = JoinSet::new();
        let mut pacer = Pacer::new(limits.period);

        for (chunk_index, range) in pacer::chunk_ranges(batch.len(), chunk_size).enumerate() {
            let permit = match Arc::clone(&pool).acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, chunk_index, "Worker pool closed, no further launches");
                    break;
                }
            };

            // Window opens at launch; time spent waiting for a permit does not count
            pacer.start_window();

            tasks.spawn(process_chunk(
                Arc::clone(&service),
                ctx.clone(),
                Chunk::new(Arc::clone(&batch), range),
                chunk_index,
                Arc::clone(&reporter),
                Arc::clone(&self.metrics),
                permit,
            ));

            if chunk_index + 1 < chunk_count {
                if let Some(slept) = pacer.pace().await {
                    self.metrics.record_pacing(slept);
                    record_pacing_sleep(MODE, slept);
                }
            }
        }

        // Tasks hold the remaining reporter handles
        drop(reporter);

        let launched = tasks.len();
        let mut completed = 0;
        while let Some(joined) = tasks.join_next().await {
            completed += 1;
            if let Err(e) = joined {
                self.metrics.record_task_panic();
                error!(error = %e, "Chunk task panicked");
            }
        }
        debug_assert_eq!(completed, launched);

        let elapsed = started.elapsed();
        record_dispatch_completed(MODE, launched, elapsed);
        info!(
            chunks = launched,
            elapsed_ms = elapsed.as_millis() as u64,
            "Parallel dispatch complete"
        );

        Ok(())
    }

    /// [`Dispatcher::parallel_send`] with the channels managed internally
    ///
    /// Drains the reports while dispatching and returns every failed chunk
    /// with its error, in completion order. An empty result means every
    /// chunk was accepted.
    ///
    /// # Errors
    /// Setup failures only, as for [`Dispatcher::parallel_send`].
    pub async fn parallel_send_collect<T>(
        &self,
        ctx: &CancellationToken,
        batch: Arc<[T]>,
    ) -> Result<Vec<UnsentChunk<T>>, DispatcherError>
    where
        S: RateLimitedService<T> + Sync + 'static,
        T: Send + Sync + 'static,
    {
        let capacity = self.config.report_capacity.max(1);
        let (error_tx, mut error_rx) = mpsc::channel(capacity);
        let (unsent_tx, mut unsent_rx) = mpsc::channel(capacity);

        let drain = async {
            let mut unsent = Vec::new();
            while let Some(error) = error_rx.recv().await {
                match unsent_rx.recv().await {
                    Some(chunk) => unsent.push(UnsentChunk { error, chunk }),
                    None => break,
                }
            }
            unsent
        };

        let (result, unsent) = tokio::join!(
            self.parallel_send(ctx, batch, error_tx, unsent_tx),
            drain
        );
        result?;
        Ok(unsent)
    }
}

#[instrument(
    name = "dispatcher_chunk_task",
    skip(service, ctx, chunk, reporter, metrics, _permit),
    fields(offset = chunk.offset(), size = chunk.len())
)]
async fn process_chunk<S, T>(
    service: Arc<S>,
    ctx: CancellationToken,
    chunk: Chunk<T>,
    chunk_index: usize,
    reporter: Arc<Mutex<Reporter<T>>>,
    metrics: Arc<DispatchMetrics>,
    _permit: OwnedSemaphorePermit,
) where
    S: RateLimitedService<T> + Sync,
    T: Send + Sync,
{
    let _in_flight = InFlight::enter(Arc::clone(&metrics));

    match service.process(&ctx, chunk.as_slice()).await {
        Ok(()) => {
            metrics.record_success(chunk.len());
            record_chunk_outcome(MODE, chunk.len(), true, false);
            debug!("Chunk accepted");
        }
        Err(error) => {
            let refused = error.is_capacity_refusal();
            metrics.record_failure(refused);
            record_chunk_outcome(MODE, chunk.len(), false, refused);
            warn!(error = %error, "Chunk rejected, reporting as unsent");
            reporter.lock().await.report(error, chunk).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::DispatcherConfig;
    use crate::mock::MockService;
    use contracts::RateLimits;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn batch(n: usize) -> Arc<[usize]> {
        (0..n).collect()
    }

    fn dispatcher(service: &MockService) -> Dispatcher<MockService> {
        Dispatcher::new().with_service(service.clone())
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_all_succeed() {
        for n in [1325, 5, 20, 40] {
            let service = MockService::new(20, Duration::from_millis(1));
            let dispatcher = dispatcher(&service);

            let unsent = dispatcher
                .parallel_send_collect(&CancellationToken::new(), batch(n))
                .await
                .unwrap();

            assert!(unsent.is_empty(), "n={n}");
            assert_eq!(service.received(), n);
            assert_eq!(service.call_count(), n.div_ceil(20));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_reports_refused_chunk() {
        let service = MockService::new(20, Duration::from_secs(1)).fail_chunk(1, ServiceError::Blocked);
        let dispatcher = dispatcher(&service);
        let (error_tx, mut error_rx) = mpsc::channel(1);
        let (unsent_tx, mut unsent_rx) = mpsc::channel(1);

        let ctx = CancellationToken::new();
        let send = dispatcher.parallel_send(&ctx, batch(40), error_tx, unsent_tx);
        let drain = async {
            let mut reports = Vec::new();
            while let Some(error) = error_rx.recv().await {
                let chunk = unsent_rx.recv().await.expect("chunk paired with error");
                reports.push((error, chunk.to_vec()));
            }
            reports
        };
        let (result, reports) = tokio::join!(send, drain);
        result.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].0, ServiceError::Blocked);
        assert_eq!(reports[0].1, (20..40).collect::<Vec<_>>());
        // First chunk unaffected
        assert_eq!(service.received(), 20);
        // Channels closed once dispatch returned
        assert!(unsent_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_failures_independent() {
        let service = MockService::new(10, Duration::from_millis(100))
            .fail_chunk(0, ServiceError::processing("corrupt"))
            .fail_chunk(2, ServiceError::Blocked);
        let dispatcher = dispatcher(&service);

        let mut unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(45))
            .await
            .unwrap();
        unsent.sort_by_key(|u| u.chunk.offset());

        assert_eq!(unsent.len(), 2);
        assert_eq!(unsent[0].error, ServiceError::processing("corrupt"));
        assert_eq!(unsent[0].chunk.to_vec(), (0..10).collect::<Vec<_>>());
        assert_eq!(unsent[1].error, ServiceError::Blocked);
        assert_eq!(unsent[1].chunk.to_vec(), (20..30).collect::<Vec<_>>());
        assert_eq!(service.received(), 25);
        assert_eq!(service.call_count(), 5);

        let snap = dispatcher.metrics_snapshot();
        assert_eq!(snap.chunk_failures, 2);
        assert_eq!(snap.capacity_refusals, 1);
        assert_eq!(snap.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_paces_launches_not_completions() {
        let period = Duration::from_millis(100);
        // Each chunk takes longer than a period; launches must still be one period apart
        let service = MockService::new(10, period).with_latency(Duration::from_millis(350));
        let dispatcher = dispatcher(&service);

        let started = Instant::now();
        let unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(40))
            .await
            .unwrap();
        let elapsed = started.elapsed();

        assert!(unsent.is_empty());
        let starts = service.start_times();
        assert_eq!(starts.len(), 4);
        for pair in starts.windows(2) {
            assert!(pair[1] - pair[0] >= period);
        }
        // Overlapping: far less than 4 sequential latencies
        assert!(elapsed < Duration::from_millis(4 * 350));
    }

    /// Per-call latency, a high-water mark of concurrent calls, and an
    /// optional call that panics
    struct Scripted {
        limits: RateLimits,
        latencies: Vec<Duration>,
        panic_on: Option<usize>,
        next: AtomicUsize,
        active: AtomicUsize,
        peak: AtomicUsize,
        starts: std::sync::Mutex<Vec<Instant>>,
    }

    impl Scripted {
        fn new(limit: u64, period: Duration, latencies: Vec<Duration>) -> Self {
            Self {
                limits: RateLimits::new(limit, period),
                latencies,
                panic_on: None,
                next: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                starts: std::sync::Mutex::new(Vec::new()),
            }
        }

        fn launch_gaps(&self) -> Vec<Duration> {
            let starts = self.starts.lock().unwrap();
            starts.windows(2).map(|w| w[1] - w[0]).collect()
        }
    }

    impl RateLimitedService<usize> for Scripted {
        fn limits(&self) -> RateLimits {
            self.limits
        }

        async fn process(&self, _ctx: &CancellationToken, _chunk: &[usize]) -> Result<(), ServiceError> {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            self.starts.lock().unwrap().push(Instant::now());
            if self.panic_on == Some(index) {
                panic!("call {index} blew up");
            }

            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(active, Ordering::SeqCst);
            let latency = self.latencies.get(index).copied().unwrap_or_default();
            tokio::time::sleep(latency).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn bounded(service: Scripted, max_in_flight: usize) -> Dispatcher<Scripted> {
        Dispatcher::with_config(DispatcherConfig {
            max_in_flight: Some(max_in_flight),
            ..Default::default()
        })
        .with_service(service)
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_bounded_pool() {
        let period = Duration::from_millis(100);
        let service = Scripted::new(10, period, vec![Duration::from_millis(250); 6]);
        let dispatcher = bounded(service, 2);

        let unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(60))
            .await
            .unwrap();
        assert!(unsent.is_empty());

        let service = dispatcher.service().unwrap();
        assert_eq!(service.peak.load(Ordering::SeqCst), 2);
        let gaps = service.launch_gaps();
        assert_eq!(gaps.len(), 5);
        assert!(gaps.iter().all(|&gap| gap >= period), "gaps: {gaps:?}");

        let snap = dispatcher.metrics_snapshot();
        assert_eq!(snap.items_sent, 60);
        assert_eq!(snap.in_flight, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_permit_wait_does_not_shorten_next_window() {
        let period = Duration::from_millis(100);
        // First chunk holds the only permit well past one period
        let latencies = vec![
            Duration::from_millis(190),
            Duration::from_millis(10),
            Duration::from_millis(10),
        ];
        let dispatcher = bounded(Scripted::new(10, period, latencies), 1);

        let unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(30))
            .await
            .unwrap();
        assert!(unsent.is_empty());

        let service = dispatcher.service().unwrap();
        assert_eq!(service.peak.load(Ordering::SeqCst), 1);
        let gaps = service.launch_gaps();
        assert_eq!(gaps.len(), 2);
        assert!(gaps[0] >= Duration::from_millis(190), "gaps: {gaps:?}");
        assert!(gaps[1] >= period, "gaps: {gaps:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_parallel_panicked_chunk_not_counted_as_sent() {
        let mut service = Scripted::new(10, Duration::from_millis(1), Vec::new());
        service.panic_on = Some(1);
        let dispatcher = Dispatcher::new().with_service(service);

        let unsent = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(30))
            .await
            .unwrap();

        // A panic is neither sent nor reported as unsent
        assert!(unsent.is_empty());
        let snap = dispatcher.metrics_snapshot();
        assert_eq!(snap.items_sent, 20);
        assert_eq!(snap.task_panics, 1);
        assert_eq!(snap.in_flight, 0);
    }

    #[tokio::test]
    async fn test_parallel_empty_batch_writes_nothing() {
        let service = MockService::new(20, Duration::from_millis(1));
        let dispatcher = dispatcher(&service);
        let (error_tx, mut error_rx) = mpsc::channel::<ServiceError>(1);
        let (unsent_tx, mut unsent_rx) = mpsc::channel::<Chunk<usize>>(1);

        dispatcher
            .parallel_send(&CancellationToken::new(), batch(0), error_tx, unsent_tx)
            .await
            .unwrap();

        assert!(error_rx.recv().await.is_none());
        assert!(unsent_rx.recv().await.is_none());
        assert_eq!(service.call_count(), 0);
    }

    #[tokio::test]
    async fn test_parallel_without_service() {
        let dispatcher: Dispatcher<MockService> = Dispatcher::new();
        let err = dispatcher
            .parallel_send_collect(&CancellationToken::new(), batch(3))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatcherError::ServiceNotSet));
    }
}
