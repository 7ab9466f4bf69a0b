// Telesim Emulator - Multi-device telemetry emulator
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Generation scheduler
//!
//! Every channel runs as its own tokio task with its own next-due time.
//! Within a task, ticks are strictly sequential: generate, publish, then
//! schedule the next tick. There is no shared global tick and no ordering
//! between channels.
//!
//! The elapsed time handed to the generator is measured, not nominal, so a
//! late tick accumulates exactly the drift it should. A generation fault
//! stops that channel only and is reported as a [`SchedulerEvent`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use telesim::{generate, ChannelConfig, ChannelKey, ChannelState, GenerationFault, Reading, RngNoise, Sample};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use xxhash_rust::xxh64::xxh64;

use crate::error::{EmulatorError, Result};
use crate::metrics;
use crate::stream_store::StreamStore;

/// Lifecycle of a channel task.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum ChannelStatus {
    Running,
    Stopped,
    Faulted { message: String },
}

impl ChannelStatus {
    pub fn is_running(&self) -> bool {
        matches!(self, ChannelStatus::Running)
    }
}

/// Notifications from channel tasks to the owning emulator.
#[derive(Debug, Clone, PartialEq)]
pub enum SchedulerEvent {
    /// Channel paused after a generation fault
    Faulted {
        key: ChannelKey,
        fault: GenerationFault,
        ticks: u64,
    },
    /// Channel stopped on request
    Stopped { key: ChannelKey, ticks: u64 },
}

struct ChannelHandle {
    cancel: CancellationToken,
    status: watch::Receiver<ChannelStatus>,
    task: Option<JoinHandle<()>>,
}

/// Runs one task per channel.
pub struct Scheduler {
    store: Arc<StreamStore>,
    seed: Option<u64>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    shutdown: CancellationToken,
    channels: HashMap<ChannelKey, ChannelHandle>,
}

impl Scheduler {
    /// Create a scheduler publishing into `store`.
    ///
    /// With a seed, each channel draws from its own generator seeded from
    /// the base seed and the channel key, so runs repeat.
    pub fn new(store: Arc<StreamStore>, seed: Option<u64>) -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            store,
            seed,
            events,
            shutdown: CancellationToken::new(),
            channels: HashMap::new(),
        };
        (scheduler, rx)
    }

    /// Start generating a channel with a fresh state.
    ///
    /// A stopped or faulted channel may be started again; a running one
    /// may not.
    pub fn start(&mut self, key: ChannelKey, config: ChannelConfig) -> Result<()> {
        if let Some(handle) = self.channels.get(&key) {
            if handle.status.borrow().is_running() {
                return Err(EmulatorError::ChannelRunning(key));
            }
        }

        let noise = match self.seed {
            Some(seed) => RngNoise::seeded(seed ^ key_seed(&key)),
            None => RngNoise::from_entropy(),
        };
        let cancel = self.shutdown.child_token();
        let (status_tx, status_rx) = watch::channel(ChannelStatus::Running);

        let task = ChannelTask {
            key: key.clone(),
            config,
            store: Arc::clone(&self.store),
            noise,
            cancel: cancel.clone(),
            status: status_tx,
            events: self.events.clone(),
        };
        metrics::RUNNING_CHANNELS.inc();
        let join = tokio::spawn(task.run());

        self.channels.insert(
            key,
            ChannelHandle {
                cancel,
                status: status_rx,
                task: Some(join),
            },
        );
        Ok(())
    }

    /// Stop a channel and wait for its task to finish.
    ///
    /// Stopping an already stopped channel is a no-op.
    pub async fn stop(&mut self, key: &ChannelKey) -> Result<()> {
        let handle = self
            .channels
            .get_mut(key)
            .ok_or_else(|| EmulatorError::ChannelNotFound(key.clone()))?;
        handle.cancel.cancel();
        if let Some(task) = handle.task.take() {
            if let Err(e) = task.await {
                error!(channel = %key, error = %e, "Channel task ended abnormally");
            }
        }
        Ok(())
    }

    /// Stop every channel.
    pub async fn stop_all(&mut self) {
        self.shutdown.cancel();
        for (key, handle) in self.channels.iter_mut() {
            if let Some(task) = handle.task.take() {
                if let Err(e) = task.await {
                    error!(channel = %key, error = %e, "Channel task ended abnormally");
                }
            }
        }
        // fresh token so channels can be started again
        self.shutdown = CancellationToken::new();
    }

    pub fn status(&self, key: &ChannelKey) -> Option<ChannelStatus> {
        self.channels.get(key).map(|h| h.status.borrow().clone())
    }

    /// Status of every known channel, ordered by key.
    pub fn statuses(&self) -> Vec<(ChannelKey, ChannelStatus)> {
        let mut out: Vec<_> = self
            .channels
            .iter()
            .map(|(k, h)| (k.clone(), h.status.borrow().clone()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    pub fn running_count(&self) -> usize {
        self.channels
            .values()
            .filter(|h| h.status.borrow().is_running())
            .count()
    }

    pub fn store(&self) -> Arc<StreamStore> {
        Arc::clone(&self.store)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        // child tokens stop every channel task
        self.shutdown.cancel();
    }
}

/// Stable per-channel seed component, identical across runs and platforms.
fn key_seed(key: &ChannelKey) -> u64 {
    xxh64(format!("{}/{}", key.device_id, key.data_name).as_bytes(), 0)
}

struct ChannelTask {
    key: ChannelKey,
    config: ChannelConfig,
    store: Arc<StreamStore>,
    noise: RngNoise,
    cancel: CancellationToken,
    status: watch::Sender<ChannelStatus>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
}

impl ChannelTask {
    async fn run(mut self) {
        let period = self.config.period();
        let origin_wall = Utc::now();
        let origin = Instant::now();

        let mut state = ChannelState::initial(&self.config);
        let mut last_tick = origin;
        let mut next_due = origin;
        let mut ticks: u64 = 0;

        info!(
            channel = %self.key,
            kind = %self.config.kind(),
            period_ms = period.as_millis() as u64,
            "Channel started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = sleep_until(next_due) => {}
            }

            let now = Instant::now();
            let dt = now.duration_since(last_tick).as_secs_f64();
            last_tick = now;

            match generate(&self.config, &state, dt, &mut self.noise) {
                Ok((value, next)) => {
                    let timestamp = tick_timestamp(origin_wall, now.duration_since(origin), state.last_tick);
                    let sample = Sample::new(self.key.clone(), timestamp, value);
                    self.store.publish(Reading::from_sample(&sample, self.config.unit()));
                    state = next.stamped(timestamp);
                    ticks += 1;
                    metrics::record_sample(&self.key);
                }
                Err(fault) => {
                    error!(channel = %self.key, error = %fault, ticks, "Channel faulted, pausing");
                    metrics::record_fault(&self.key);
                    metrics::RUNNING_CHANNELS.dec();
                    let _ = self.status.send(ChannelStatus::Faulted {
                        message: fault.to_string(),
                    });
                    let _ = self.events.send(SchedulerEvent::Faulted {
                        key: self.key,
                        fault,
                        ticks,
                    });
                    return;
                }
            }

            next_due += period;
            let now = Instant::now();
            if next_due < now {
                debug!(channel = %self.key, "Tick overran its period, skipping ahead");
                next_due = now + period;
            }
        }

        info!(channel = %self.key, ticks, "Channel stopped");
        metrics::RUNNING_CHANNELS.dec();
        let _ = self.status.send(ChannelStatus::Stopped);
        let _ = self.events.send(SchedulerEvent::Stopped { key: self.key, ticks });
    }
}

/// Wall-clock timestamp for a tick, strictly after the previous one.
fn tick_timestamp(
    origin: DateTime<Utc>,
    elapsed: std::time::Duration,
    previous: Option<DateTime<Utc>>,
) -> DateTime<Utc> {
    let offset = chrono::Duration::from_std(elapsed).unwrap_or_else(|_| chrono::Duration::zero());
    let ts = origin + offset;
    match previous {
        Some(prev) if ts <= prev => prev + chrono::Duration::microseconds(1),
        _ => ts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use telesim::{ChannelDefinition, Value};

    fn channel(def: ChannelDefinition) -> ChannelConfig {
        ChannelConfig::try_from(def).unwrap()
    }

    #[test]
    fn test_key_seed_stable() {
        let a = key_seed(&ChannelKey::new("dev", "temp"));
        assert_eq!(a, key_seed(&ChannelKey::new("dev", "temp")));
        assert_ne!(a, key_seed(&ChannelKey::new("dev", "hum")));
        assert_ne!(key_seed(&ChannelKey::new("ab", "c")), key_seed(&ChannelKey::new("a", "bc")));
        assert_eq!(a, xxh64(b"dev/temp", 0));
    }

    #[test]
    fn test_tick_timestamp_strictly_increasing() {
        let origin = Utc::now();
        let first = tick_timestamp(origin, Duration::ZERO, None);
        let second = tick_timestamp(origin, Duration::ZERO, Some(first));
        assert!(second > first);
        let later = tick_timestamp(origin, Duration::from_secs(2), Some(second));
        assert_eq!(later, origin + chrono::Duration::seconds(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_ticks_at_frequency() {
        let store = Arc::new(StreamStore::new(64));
        let (mut scheduler, _events) = Scheduler::new(Arc::clone(&store), Some(1));
        let key = ChannelKey::new("dev", "temp");
        scheduler
            .start(key.clone(), channel(ChannelDefinition::float("temp", 0.0, 10.0).with_frequency(2.0)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_250)).await;
        scheduler.stop(&key).await.unwrap();

        // ticks at 0, 0.5, 1.0, 1.5, 2.0
        let history = store.history(&key);
        assert_eq!(history.len(), 5);
        assert!(history.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert_eq!(scheduler.status(&key), Some(ChannelStatus::Stopped));
    }

    #[tokio::test(start_paused = true)]
    async fn test_channels_independent_frequencies() {
        let store = Arc::new(StreamStore::new(64));
        let (mut scheduler, _events) = Scheduler::new(Arc::clone(&store), Some(2));
        let fast = ChannelKey::new("dev", "fast");
        let slow = ChannelKey::new("dev", "slow");
        scheduler
            .start(fast.clone(), channel(ChannelDefinition::boolean("fast").with_frequency(4.0)))
            .unwrap();
        scheduler
            .start(slow.clone(), channel(ChannelDefinition::boolean("slow").with_frequency(1.0)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(2_100)).await;
        scheduler.stop_all().await;

        assert_eq!(store.history(&fast).len(), 9);
        assert_eq!(store.history(&slow).len(), 3);
        assert_eq!(scheduler.running_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_channel_cannot_start_twice() {
        let store = Arc::new(StreamStore::default());
        let (mut scheduler, _events) = Scheduler::new(store, None);
        let key = ChannelKey::new("dev", "door");
        let config = channel(ChannelDefinition::boolean("door"));
        scheduler.start(key.clone(), config.clone()).unwrap();
        assert!(matches!(
            scheduler.start(key.clone(), config.clone()),
            Err(EmulatorError::ChannelRunning(_))
        ));

        scheduler.stop(&key).await.unwrap();
        scheduler.stop(&key).await.unwrap();
        scheduler.start(key.clone(), config).unwrap();
        assert_eq!(scheduler.status(&key), Some(ChannelStatus::Running));
        scheduler.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_uses_fresh_state() {
        let store = Arc::new(StreamStore::new(8));
        let (mut scheduler, _events) = Scheduler::new(Arc::clone(&store), Some(3));
        let key = ChannelKey::new("dev", "level");
        let config = channel(
            ChannelDefinition::float("level", 0.0, 1000.0)
                .with_drift(10.0)
                .with_initial(0.0),
        );

        scheduler.start(key.clone(), config.clone()).unwrap();
        tokio::time::sleep(Duration::from_millis(5_100)).await;
        scheduler.stop(&key).await.unwrap();
        let before = store.latest(&key).unwrap().value.as_f64().unwrap();
        assert!(before > 40.0);

        scheduler.start(key.clone(), config).unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        scheduler.stop(&key).await.unwrap();
        assert_eq!(store.latest(&key).unwrap().value, Value::Float(0.0));
    }

    #[tokio::test]
    async fn test_stop_unknown_channel() {
        let (mut scheduler, _events) = Scheduler::new(Arc::new(StreamStore::default()), None);
        let err = scheduler.stop(&ChannelKey::new("x", "y")).await.unwrap_err();
        assert!(matches!(err, EmulatorError::ChannelNotFound(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stopped_event_reported() {
        let (mut scheduler, mut events) = Scheduler::new(Arc::new(StreamStore::default()), Some(4));
        let key = ChannelKey::new("dev", "door");
        scheduler.start(key.clone(), channel(ChannelDefinition::boolean("door"))).unwrap();
        tokio::time::sleep(Duration::from_millis(1_500)).await;
        scheduler.stop(&key).await.unwrap();

        match events.recv().await {
            Some(SchedulerEvent::Stopped { key: k, ticks }) => {
                assert_eq!(k, key);
                assert_eq!(ticks, 2);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_scheduler_stops_channels() {
        let store = Arc::new(StreamStore::new(128));
        let (mut scheduler, _events) = Scheduler::new(Arc::clone(&store), Some(5));
        let key = ChannelKey::new("dev", "fast");
        scheduler
            .start(key.clone(), channel(ChannelDefinition::boolean("fast").with_frequency(10.0)))
            .unwrap();

        tokio::time::sleep(Duration::from_millis(250)).await;
        drop(scheduler);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let after_drop = store.history(&key).len();
        assert!(after_drop >= 1);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.history(&key).len(), after_drop);
    }
}
