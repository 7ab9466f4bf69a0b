// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Periodic fetch loop
//!
//! One task pulls the full snapshot every interval and merges it into the
//! store. The first fetch happens one interval after start. A failed fetch
//! leaves the store untouched and is retried at the next interval, with no
//! extra backoff.
//!
//! Cancellation is only observed between fetches: a stop that arrives while
//! a request is in flight lets that request finish and merge, then halts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::store::{MergeOutcome, RingBufferStore};
use crate::transport::Transport;

/// Outcome of one fetch, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchEvent {
    Completed {
        appended: usize,
        skipped: usize,
        new_channels: usize,
    },
    Failed {
        error: TransportError,
    },
}

/// Fetch once and merge, bounded by `timeout`.
pub async fn fetch_once(
    transport: &dyn Transport,
    store: &RingBufferStore,
    timeout: Duration,
) -> Result<MergeOutcome, TransportError> {
    let readings = tokio::time::timeout(timeout, transport.fetch_all())
        .await
        .map_err(|_| TransportError::Timeout(timeout.as_millis() as u64))??;
    Ok(store.merge(readings))
}

/// Handle to a running fetch task.
pub struct FetchLoop {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    fetches: Arc<AtomicU64>,
}

impl FetchLoop {
    /// Spawn the loop. `events` receives one [`FetchEvent`] per fetch.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        store: Arc<RingBufferStore>,
        period: Duration,
        timeout: Duration,
        events: broadcast::Sender<FetchEvent>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let fetches = Arc::new(AtomicU64::new(0));
        let worker = Worker {
            transport,
            store,
            period: period.max(Duration::from_millis(1)),
            timeout,
            events,
            cancel: cancel.clone(),
            fetches: Arc::clone(&fetches),
        };
        let task = tokio::spawn(worker.run());
        Self {
            cancel,
            task: Some(task),
            fetches,
        }
    }

    /// Request a stop. Safe to call any number of times.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop and wait for an in-flight fetch to finish.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(error = %e, "Fetch task ended abnormally");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled() && self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Fetches attempted so far, successful or not.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl Drop for FetchLoop {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Worker {
    transport: Arc<dyn Transport>,
    store: Arc<RingBufferStore>,
    period: Duration,
    timeout: Duration,
    events: broadcast::Sender<FetchEvent>,
    cancel: CancellationToken,
    fetches: Arc<AtomicU64>,
}

impl Worker {
    async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(interval_ms = self.period.as_millis() as u64, "Fetch loop started");

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            let result = fetch_once(self.transport.as_ref(), &self.store, self.timeout).await;
            self.fetches.fetch_add(1, Ordering::Relaxed);

            let event = match result {
                Ok(outcome) => {
                    debug!(
                        appended = outcome.appended,
                        skipped = outcome.skipped,
                        "Fetch completed"
                    );
                    FetchEvent::Completed {
                        appended: outcome.appended,
                        skipped: outcome.skipped,
                        new_channels: outcome.new_channels,
                    }
                }
                Err(error) => {
                    warn!(error = %error, "Fetch failed, retrying next interval");
                    FetchEvent::Failed { error }
                }
            };
            // no subscribers is fine
            let _ = self.events.send(event);
        }

        info!(fetches = self.fetches.load(Ordering::Relaxed), "Fetch loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone, Utc};
    use std::sync::Mutex;
    use telesim::{ChannelKey, Reading, Value};

    /// Serves scripted responses, one per call, repeating the last.
    struct Scripted {
        responses: Mutex<Vec<Result<Vec<Reading>, TransportError>>>,
        delay: Duration,
        calls: AtomicU64,
    }

    impl Scripted {
        fn new(responses: Vec<Result<Vec<Reading>, TransportError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses),
                delay,
                calls: AtomicU64::new(0),
            })
        }

        fn calls(&self) -> u64 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Transport for Scripted {
        async fn fetch_all(&self) -> Result<Vec<Reading>, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let mut responses = self.responses.lock().unwrap();
            if responses.len() > 1 {
                responses.remove(0)
            } else {
                responses[0].clone()
            }
        }

        async fn fetch_device(&self, _device_id: &str) -> Result<Vec<Reading>, TransportError> {
            Ok(Vec::new())
        }

        async fn fetch_channel(&self, _key: &ChannelKey) -> Result<Option<Reading>, TransportError> {
            Ok(None)
        }
    }

    fn reading(secs: i64, value: f64) -> Reading {
        Reading {
            device_id: "dev".to_string(),
            data_name: "temp".to_string(),
            value: Value::Float(value),
            unit: "°C".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + ChronoDuration::seconds(secs),
        }
    }

    fn spawn(transport: Arc<Scripted>, store: &Arc<RingBufferStore>) -> (FetchLoop, broadcast::Receiver<FetchEvent>) {
        let (tx, rx) = broadcast::channel(16);
        let fetch = FetchLoop::spawn(
            transport,
            Arc::clone(store),
            Duration::from_millis(5000),
            Duration::from_millis(2000),
            tx,
        );
        (fetch, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_before_first_tick_fetches_nothing() {
        let transport = Scripted::new(vec![Ok(vec![reading(0, 1.0)])], Duration::ZERO);
        let store = Arc::new(RingBufferStore::default());
        let (mut fetch, _rx) = spawn(Arc::clone(&transport), &store);

        fetch.stop();
        fetch.shutdown().await;
        tokio::time::sleep(Duration::from_secs(20)).await;

        assert_eq!(fetch.fetch_count(), 0);
        assert_eq!(transport.calls(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetches_once_per_interval() {
        let transport = Scripted::new(
            vec![
                Ok(vec![reading(0, 1.0)]),
                Ok(vec![reading(0, 1.0)]),
                Ok(vec![reading(5, 2.0)]),
            ],
            Duration::ZERO,
        );
        let store = Arc::new(RingBufferStore::default());
        let (mut fetch, mut rx) = spawn(Arc::clone(&transport), &store);

        tokio::time::sleep(Duration::from_millis(4_900)).await;
        assert_eq!(transport.calls(), 0);

        tokio::time::sleep(Duration::from_millis(10_200)).await;
        fetch.shutdown().await;

        assert_eq!(fetch.fetch_count(), 3);
        assert_eq!(
            rx.recv().await.unwrap(),
            FetchEvent::Completed { appended: 1, skipped: 0, new_channels: 1 }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            FetchEvent::Completed { appended: 0, skipped: 1, new_channels: 0 }
        );
        assert_eq!(store.len(&ChannelKey::new("dev", "temp")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_leaves_store_untouched_and_retries() {
        let transport = Scripted::new(
            vec![
                Err(TransportError::Connection("refused".to_string())),
                Ok(vec![reading(0, 1.0)]),
            ],
            Duration::ZERO,
        );
        let store = Arc::new(RingBufferStore::default());
        let (mut fetch, mut rx) = spawn(Arc::clone(&transport), &store);

        tokio::time::sleep(Duration::from_millis(5_100)).await;
        assert!(store.is_empty());
        assert!(matches!(rx.recv().await.unwrap(), FetchEvent::Failed { .. }));
        assert!(fetch.is_running());

        tokio::time::sleep(Duration::from_millis(5_000)).await;
        fetch.shutdown().await;
        assert!(matches!(rx.recv().await.unwrap(), FetchEvent::Completed { appended: 1, .. }));
        assert_eq!(store.total_samples(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_response_times_out() {
        let transport = Scripted::new(vec![Ok(vec![reading(0, 1.0)])], Duration::from_secs(10));
        let store = Arc::new(RingBufferStore::default());
        let (mut fetch, mut rx) = spawn(Arc::clone(&transport), &store);

        tokio::time::sleep(Duration::from_millis(7_100)).await;
        fetch.shutdown().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            FetchEvent::Failed { error: TransportError::Timeout(2000) }
        );
        assert!(store.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_mid_fetch_lets_fetch_complete() {
        let transport = Scripted::new(vec![Ok(vec![reading(0, 1.0)])], Duration::from_millis(1_000));
        let store = Arc::new(RingBufferStore::default());
        let (mut fetch, _rx) = spawn(Arc::clone(&transport), &store);

        // first fetch starts at 5s and returns at 6s
        tokio::time::sleep(Duration::from_millis(5_500)).await;
        assert_eq!(transport.calls(), 1);
        fetch.stop();
        fetch.stop();
        fetch.shutdown().await;

        assert_eq!(fetch.fetch_count(), 1);
        assert_eq!(store.total_samples(), 1);
        assert!(!fetch.is_running());

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.calls(), 1);
    }
}
