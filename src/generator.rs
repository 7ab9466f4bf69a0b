// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Value generation
//!
//! [`generate`] is a pure step function: it takes a channel's configuration,
//! its current [`ChannelState`] and the elapsed time, and returns the new
//! value together with the next state. All randomness comes from a
//! [`NoiseSource`], so a seeded source (or a scripted one in tests) makes
//! every run reproducible.
//!
//! Numeric channels keep a random-walk *base* that is clamped to the range,
//! and a separate drift accumulator that is never clamped. The emitted
//! value is `base + noise + drift`, clamped, so a saturated signal leaves
//! the boundary as soon as the drift reverses.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::config::{ChannelConfig, ChannelParams, StringSource};
use crate::error::GenerationFault;
use crate::value::Value;

/// Source of randomness for the generator.
pub trait NoiseSource {
    /// Uniform draw in `[-bound, bound]`.
    fn uniform_step(&mut self, bound: f64) -> f64;

    /// Zero-mean normal draw. Non-finite for an unusable deviation.
    fn gaussian(&mut self, std_dev: f64) -> f64;

    /// Uniform draw in `[0, 1)`.
    fn chance(&mut self) -> f64;

    /// Uniform index in `0..len`.
    fn index(&mut self, len: usize) -> usize;
}

/// [`NoiseSource`] backed by a `rand` generator.
#[derive(Debug, Clone)]
pub struct RngNoise<R = StdRng> {
    rng: R,
}

impl RngNoise<StdRng> {
    /// Deterministic source.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl<R: Rng> RngNoise<R> {
    pub fn new(rng: R) -> Self {
        Self { rng }
    }
}

impl<R: Rng> NoiseSource for RngNoise<R> {
    fn uniform_step(&mut self, bound: f64) -> f64 {
        // the sampled span is 2 * bound
        if !(bound * 2.0).is_finite() {
            return f64::NAN;
        }
        if bound <= 0.0 {
            return 0.0;
        }
        self.rng.gen_range(-bound..=bound)
    }

    fn gaussian(&mut self, std_dev: f64) -> f64 {
        match Normal::new(0.0, std_dev) {
            Ok(normal) => normal.sample(&mut self.rng),
            Err(_) => f64::NAN,
        }
    }

    fn chance(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}

/// Simulation state of one channel, threaded through [`generate`].
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    /// Last emitted value
    pub current: Value,
    /// Clamped random-walk position for numeric channels
    pub base: f64,
    /// Cumulative drift, unclamped
    pub drift_accumulator: f64,
    /// Timestamp of the last emitted sample
    pub last_tick: Option<DateTime<Utc>>,
}

impl ChannelState {
    /// Fresh state positioned on the configured initial value.
    pub fn initial(config: &ChannelConfig) -> Self {
        let current = config.initial_value().clone();
        let base = match config.params() {
            ChannelParams::Float { .. } | ChannelParams::Integer { .. } => {
                current.as_f64().unwrap_or(0.0)
            }
            _ => 0.0,
        };
        Self {
            current,
            base,
            drift_accumulator: 0.0,
            last_tick: None,
        }
    }

    /// Same state, stamped with the time its value was emitted.
    pub fn stamped(mut self, at: DateTime<Utc>) -> Self {
        self.last_tick = Some(at);
        self
    }
}

/// Advance a channel by one tick.
///
/// `dt_seconds` is the actual elapsed time since the previous tick. Negative
/// values are treated as zero; NaN or infinite values are a fault.
pub fn generate<N>(
    config: &ChannelConfig,
    state: &ChannelState,
    dt_seconds: f64,
    noise: &mut N,
) -> Result<(Value, ChannelState), GenerationFault>
where
    N: NoiseSource + ?Sized,
{
    if !dt_seconds.is_finite() {
        return Err(GenerationFault::InvalidElapsed {
            channel: config.name().to_string(),
            dt_seconds,
        });
    }
    let dt = dt_seconds.max(0.0);

    match config.params() {
        ChannelParams::Float { min, max } => step_numeric(config, state, dt, *min, *max, false, noise),
        ChannelParams::Integer { min, max } => step_numeric(config, state, dt, *min, *max, true, noise),
        ChannelParams::Boolean => {
            let current = state.current.as_bool().unwrap_or(false);
            let p = config.change_probability();
            let next = if p > 0.0 && noise.chance() < p {
                !current
            } else {
                current
            };
            Ok(advance(state, Value::Boolean(next)))
        }
        ChannelParams::String(source) => {
            let current = state.current.as_str().unwrap_or_default();
            let p = config.change_probability();
            if p <= 0.0 || noise.chance() >= p {
                return Ok(advance(state, Value::String(current.to_string())));
            }
            let next = match source {
                StringSource::States(states) => {
                    let others: Vec<&String> = states.iter().filter(|s| s.as_str() != current).collect();
                    if others.is_empty() {
                        current.to_string()
                    } else {
                        others[noise.index(others.len()).min(others.len() - 1)].clone()
                    }
                }
                StringSource::Token { length, alphabet } => (0..*length)
                    .map(|_| alphabet[noise.index(alphabet.len()).min(alphabet.len() - 1)])
                    .collect(),
            };
            Ok(advance(state, Value::String(next)))
        }
    }
}

fn advance(state: &ChannelState, value: Value) -> (Value, ChannelState) {
    let next = ChannelState {
        current: value.clone(),
        ..state.clone()
    };
    (value, next)
}

fn step_numeric<N>(
    config: &ChannelConfig,
    state: &ChannelState,
    dt: f64,
    min: f64,
    max: f64,
    integral: bool,
    noise: &mut N,
) -> Result<(Value, ChannelState), GenerationFault>
where
    N: NoiseSource + ?Sized,
{
    let emit = |v: f64| {
        if integral {
            Value::Integer(v.round() as i64)
        } else {
            Value::Float(v)
        }
    };

    if min == max {
        let value = emit(min);
        let next = ChannelState {
            current: value.clone(),
            base: min,
            ..state.clone()
        };
        return Ok((value, next));
    }

    let fault = |stage: &'static str| GenerationFault::NonFinite {
        channel: config.name().to_string(),
        stage,
    };

    let delta = if config.change_step() > 0.0 {
        noise.uniform_step(config.change_step())
    } else {
        0.0
    };
    if !delta.is_finite() {
        return Err(fault("step"));
    }

    let jitter = if config.noise_level() == 0.0 {
        0.0
    } else {
        noise.gaussian(config.noise_level() * (max - min))
    };
    if !jitter.is_finite() {
        return Err(fault("noise"));
    }

    let drift_accumulator = state.drift_accumulator + config.drift_rate() * dt;
    if !drift_accumulator.is_finite() {
        return Err(fault("drift"));
    }

    if !state.base.is_finite() {
        return Err(fault("base"));
    }
    let base = (state.base + delta).clamp(min, max);

    let candidate = base + jitter + drift_accumulator;
    if !candidate.is_finite() {
        return Err(fault("value"));
    }
    let value = emit(candidate.clamp(min, max));

    let next = ChannelState {
        current: value.clone(),
        base,
        drift_accumulator,
        last_tick: state.last_tick,
    };
    Ok((value, next))
}
