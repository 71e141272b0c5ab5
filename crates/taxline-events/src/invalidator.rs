//! Event-driven cache invalidation.
//!
//! [`CacheInvalidator`] owns one background consume loop. Each message is decoded,
//! and when it names a business the business' cached data is refreshed. Every
//! per-message failure is logged and the loop moves on.

use std::sync::Arc;
use std::time::Duration;
use taxline_core::{RefreshOutcome, Refresher};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::decode::DecoderChain;
use crate::source::{EventSource, SourceError, SourceMessage};

/// Default wait per poll iteration.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);
/// Default bound on how long [`CacheInvalidator::stop`] waits for the loop.
pub const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of the consume loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvalidatorState {
    /// No loop is running.
    Stopped,
    /// The loop is consuming.
    Running,
    /// Cancellation was signalled and the loop is being joined.
    Stopping,
}

/// Result of [`CacheInvalidator::stop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing was running.
    NotRunning,
    /// The loop observed cancellation and exited in time.
    Stopped,
    /// The loop did not exit within the bound and was aborted.
    TimedOut,
}

struct Worker {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Background consumer that refreshes cache entries for changed businesses.
pub struct CacheInvalidator {
    refresher: Arc<dyn Refresher>,
    decoders: Arc<DecoderChain>,
    poll_timeout: Duration,
    stop_timeout: Duration,
    state: InvalidatorState,
    worker: Option<Worker>,
}

impl std::fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInvalidator")
            .field("decoders", &self.decoders)
            .field("poll_timeout", &self.poll_timeout)
            .field("stop_timeout", &self.stop_timeout)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl CacheInvalidator {
    /// Create a stopped invalidator.
    #[must_use]
    pub fn new(refresher: Arc<dyn Refresher>, decoders: DecoderChain) -> Self {
        Self {
            refresher,
            decoders: Arc::new(decoders),
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            state: InvalidatorState::Stopped,
            worker: None,
        }
    }

    /// Set the wait per poll iteration.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Set the bound used by [`CacheInvalidator::stop`].
    #[must_use]
    pub const fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    /// Current lifecycle state.
    ///
    /// A loop that exited on its own, because its source closed, reports
    /// [`InvalidatorState::Stopped`].
    #[must_use]
    pub fn state(&self) -> InvalidatorState {
        match &self.worker {
            Some(worker) if self.state == InvalidatorState::Running && worker.handle.is_finished() => {
                InvalidatorState::Stopped
            }
            _ => self.state,
        }
    }

    /// Returns true while a loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == InvalidatorState::Running
    }

    /// Spawn the consume loop over `source`. Returns false if already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S: EventSource>(&mut self, source: S) -> bool {
        let state = self.state();
        if state != InvalidatorState::Stopped {
            debug!(?state, "Invalidator already started");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(consume_loop(
            source,
            Arc::clone(&self.decoders),
            Arc::clone(&self.refresher),
            token.clone(),
            self.poll_timeout,
        ));

        self.worker = Some(Worker { token, handle });
        self.state = InvalidatorState::Running;
        info!("Cache invalidator started");
        true
    }

    /// Signal the loop to exit and wait for it, up to the stop timeout.
    ///
    /// The source is closed in every case: by the loop on a clean exit, or by
    /// dropping it when the task is aborted.
    pub async fn stop(&mut self) -> StopOutcome {
        let Some(Worker { token, mut handle }) = self.worker.take() else {
            return StopOutcome::NotRunning;
        };

        self.state = InvalidatorState::Stopping;
        token.cancel();

        let outcome = match tokio::time::timeout(self.stop_timeout, &mut handle).await {
            Ok(Ok(())) => StopOutcome::Stopped,
            Ok(Err(e)) => {
                error!(error = %e, "Invalidator task failed");
                StopOutcome::Stopped
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.stop_timeout.as_millis(),
                    "Invalidator did not stop in time; aborting"
                );
                handle.abort();
                StopOutcome::TimedOut
            }
        };

        self.state = InvalidatorState::Stopped;
        info!(?outcome, "Cache invalidator stopped");
        outcome
    }
}

#[instrument(skip_all, fields(source = %source.describe()))]
async fn consume_loop<S: EventSource>(
    mut source: S,
    decoders: Arc<DecoderChain>,
    refresher: Arc<dyn Refresher>,
    token: CancellationToken,
    poll_timeout: Duration,
) {
    info!("Consume loop started");

    loop {
        let polled = tokio::select! {
            () = token.cancelled() => break,
            polled = tokio::time::timeout(poll_timeout, source.recv()) => polled,
        };

        match polled {
            Err(_) => trace!("No message within poll timeout"),
            Ok(Ok(message)) => handle_message(&decoders, refresher.as_ref(), &message).await,
            Ok(Err(SourceError::EndOfPartition { partition })) => {
                debug!(partition, "Reached end of partition");
            }
            Ok(Err(SourceError::Transient(e))) => warn!(error = %e, "Source error"),
            Ok(Err(SourceError::Closed)) => {
                warn!("Source closed; consume loop exiting");
                break;
            }
        }
    }

    source.close().await;
    info!("Consume loop exited");
}

/// Processes one message. Never fails: every problem is logged.
async fn handle_message(decoders: &DecoderChain, refresher: &dyn Refresher, message: &SourceMessage) {
    let Some(payload) = message.payload.as_deref() else {
        warn!(
            partition = message.partition,
            offset = message.offset,
            "Message without payload; skipping"
        );
        return;
    };

    let event = match decoders.decode(payload).await {
        Ok(event) => event,
        Err(e) => {
            let head = &payload[..payload.len().min(50)];
            warn!(
                partition = message.partition,
                offset = message.offset,
                error = %e,
                raw = ?head,
                "Undecodable message dropped"
            );
            return;
        }
    };

    info!(
        business_id = ?event.business_id,
        action = ?event.action_type,
        rut = ?event.rut,
        "Business update received"
    );

    let Some(rut) = event.rut else {
        warn!(business_id = ?event.business_id, "Update without rut; skipping");
        return;
    };

    match refresher.refresh_outcome(&rut).await {
        RefreshOutcome::Stored => info!(rut = %rut, "Cache refreshed"),
        RefreshOutcome::SkippedNoData => warn!(rut = %rut, "No upstream data; cache untouched"),
        RefreshOutcome::Failed => warn!(rut = %rut, "Cache refresh failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::ChannelEventSource;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::Ordering;
    use taxline_core::Rut;
    use tokio::sync::mpsc;

    #[derive(Default)]
    struct RecordingRefresher {
        calls: Mutex<Vec<Rut>>,
        notify: tokio::sync::Notify,
    }

    impl RecordingRefresher {
        fn calls(&self) -> Vec<Rut> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Refresher for RecordingRefresher {
        async fn refresh_outcome(&self, rut: &Rut) -> RefreshOutcome {
            self.calls.lock().unwrap().push(rut.clone());
            self.notify.notify_one();
            if rut.as_str() == "bad" {
                RefreshOutcome::SkippedNoData
            } else {
                RefreshOutcome::Stored
            }
        }
    }

    async fn send(
        sender: &mpsc::Sender<Result<SourceMessage, SourceError>>,
        payload: &[u8],
    ) {
        sender
            .send(Ok(SourceMessage::with_payload("businesses.fct.update.0", payload.to_vec())))
            .await
            .unwrap();
    }

    async fn wait_for_calls(refresher: &RecordingRefresher, n: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while refresher.calls().len() < n {
                refresher.notify.notified().await;
            }
        })
        .await
        .unwrap();
    }

    fn invalidator(refresher: Arc<RecordingRefresher>) -> CacheInvalidator {
        CacheInvalidator::new(refresher, DecoderChain::standard().unwrap())
            .with_poll_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_malformed_messages_do_not_stop_the_loop() {
        let refresher = Arc::new(RecordingRefresher::default());
        let mut invalidator = invalidator(Arc::clone(&refresher));
        let (sender, source) = ChannelEventSource::channel(16);
        let closed = source.closed_flag();

        assert!(invalidator.start(source));
        assert_eq!(invalidator.state(), InvalidatorState::Running);

        send(&sender, b"\x00\x01not avro, not json").await;
        send(&sender, br#"{"businessId": 3}"#).await;
        sender
            .send(Err(SourceError::EndOfPartition { partition: 0 }))
            .await
            .unwrap();
        sender
            .send(Err(SourceError::Transient("broker down".into())))
            .await
            .unwrap();
        sender
            .send(Ok(SourceMessage {
                topic: "t".into(),
                partition: 0,
                offset: 9,
                payload: None,
            }))
            .await
            .unwrap();
        send(&sender, br#"{"businessId": 1, "rut": "76111111-1"}"#).await;
        send(&sender, br#"{"rut": "bad"}"#).await;
        send(&sender, br#"{"rut": "76222222-2"}"#).await;

        wait_for_calls(&refresher, 3).await;
        assert_eq!(
            refresher.calls(),
            vec![
                Rut::new("76111111-1"),
                Rut::new("bad"),
                Rut::new("76222222-2")
            ]
        );

        assert_eq!(invalidator.stop().await, StopOutcome::Stopped);
        assert_eq!(invalidator.state(), InvalidatorState::Stopped);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_one_refresh_per_message() {
        let refresher = Arc::new(RecordingRefresher::default());
        let mut invalidator = invalidator(Arc::clone(&refresher));
        let (sender, source) = ChannelEventSource::channel(4);
        invalidator.start(source);

        send(&sender, br#"{"rut": "76637851-k"}"#).await;
        wait_for_calls(&refresher, 1).await;
        invalidator.stop().await;

        assert_eq!(refresher.calls(), vec![Rut::new("76637851-k")]);
    }

    #[tokio::test]
    async fn test_closed_source_ends_running_state() {
        let refresher = Arc::new(RecordingRefresher::default());
        let mut invalidator = invalidator(refresher);
        let (sender, source) = ChannelEventSource::channel(1);
        let closed = source.closed_flag();

        assert!(invalidator.start(source));
        drop(sender);

        tokio::time::timeout(Duration::from_secs(5), async {
            while invalidator.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(invalidator.state(), InvalidatorState::Stopped);
        assert!(closed.load(Ordering::SeqCst));

        let (_sender, next) = ChannelEventSource::channel(1);
        assert!(invalidator.start(next));
        assert!(invalidator.is_running());
        assert_eq!(invalidator.stop().await, StopOutcome::Stopped);
    }

    /// Counts upstream fetches behind a real business data cache.
    #[derive(Debug, Default)]
    struct CountingProvider {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl taxline::DataProvider for CountingProvider {
        fn name(&self) -> &str {
            "counting"
        }

        fn description(&self) -> &str {
            "Counts upstream fetches"
        }
    }

    #[async_trait]
    impl taxline::MonthlyDataProvider for CountingProvider {
        async fn try_fetch_monthly_data(&self, _rut: &Rut) -> taxline::Result<Vec<taxline::MonthlyRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![taxline::MonthlyRecord {
                period: "2024-03".into(),
                total_sales: Some(2_000_000.0),
                ..Default::default()
            }])
        }
    }

    #[tokio::test]
    async fn test_event_writes_business_cache_once() {
        use taxline::{BusinessDataCache, CacheStore, InMemoryStore};

        let store = Arc::new(InMemoryStore::new());
        let provider = Arc::new(CountingProvider::default());
        let cache = Arc::new(BusinessDataCache::new(store.clone(), provider.clone()));

        let mut invalidator = CacheInvalidator::new(cache, DecoderChain::standard().unwrap())
            .with_poll_timeout(Duration::from_millis(20));
        let (sender, source) = ChannelEventSource::channel(4);
        invalidator.start(source);

        send(&sender, br#"{"businessId": 5, "rut": "76637851-k"}"#).await;

        let cached = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(value) = store.get("business_data:76637851-k").await.unwrap() {
                    return value;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        invalidator.stop().await;

        assert!(cached.contains("2024-03"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_start_twice_and_stop_when_stopped() {
        let refresher = Arc::new(RecordingRefresher::default());
        let mut invalidator = invalidator(refresher);

        assert_eq!(invalidator.stop().await, StopOutcome::NotRunning);

        let (_sender, source) = ChannelEventSource::channel(1);
        let (_sender2, second) = ChannelEventSource::channel(1);
        assert!(invalidator.start(source));
        assert!(!invalidator.start(second));

        assert_eq!(invalidator.stop().await, StopOutcome::Stopped);
        assert!(!invalidator.is_running());

        let (_sender3, third) = ChannelEventSource::channel(1);
        assert!(invalidator.start(third));
        assert_eq!(invalidator.stop().await, StopOutcome::Stopped);
    }

    struct StuckSource;

    #[async_trait]
    impl EventSource for StuckSource {
        async fn recv(&mut self) -> Result<SourceMessage, SourceError> {
            std::future::pending().await
        }

        async fn close(&mut self) {
            // Never completes, so the loop cannot finish after cancellation.
            std::future::pending::<()>().await;
        }

        fn describe(&self) -> String {
            "stuck".into()
        }
    }

    #[tokio::test]
    async fn test_stop_is_bounded() {
        let refresher = Arc::new(RecordingRefresher::default());
        let mut invalidator =
            invalidator(refresher).with_stop_timeout(Duration::from_millis(50));
        invalidator.start(StuckSource);

        assert_eq!(invalidator.stop().await, StopOutcome::TimedOut);
        assert_eq!(invalidator.state(), InvalidatorState::Stopped);
    }
}
