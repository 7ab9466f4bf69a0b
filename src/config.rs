// Telesim - Device telemetry simulation
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Channel configuration
//!
//! A [`ChannelDefinition`] is the raw, serializable form read from a
//! configuration document. It becomes a [`ChannelConfig`] only through
//! validation, so the generator never sees an inconsistent channel.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigError;
use crate::value::{DataKind, Value};

const DEFAULT_STRING_LENGTH: usize = 10;
const DEFAULT_STRING_CHARS: &str = "abcdefghijklmnopqrstuvwxyz0123456789";

fn default_frequency() -> f64 {
    1.0
}

fn default_string_length() -> usize {
    DEFAULT_STRING_LENGTH
}

fn default_string_chars() -> String {
    DEFAULT_STRING_CHARS.to_string()
}

/// Kind-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomParams {
    /// Enumerated states for String channels
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub possible_states: Option<Vec<String>>,

    /// Length of synthesized tokens when no states are declared
    #[serde(default = "default_string_length")]
    pub string_length: usize,

    /// Alphabet for synthesized tokens
    #[serde(default = "default_string_chars")]
    pub string_chars: String,
}

impl Default for CustomParams {
    fn default() -> Self {
        Self {
            possible_states: None,
            string_length: DEFAULT_STRING_LENGTH,
            string_chars: default_string_chars(),
        }
    }
}

/// Raw channel description as found in configuration documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    pub name: String,
    pub data_type: DataKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_value: Option<f64>,
    /// Samples per second
    #[serde(default = "default_frequency")]
    pub frequency: f64,
    /// Delta bound for numeric kinds, per-tick probability otherwise
    #[serde(default)]
    pub change_step: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_value: Option<Value>,
    #[serde(default)]
    pub noise_level: f64,
    /// Signed drift in units per second
    #[serde(default)]
    pub drift_rate: f64,
    #[serde(default)]
    pub custom_params: CustomParams,
}

impl ChannelDefinition {
    fn new(name: impl Into<String>, data_type: DataKind) -> Self {
        Self {
            name: name.into(),
            data_type,
            min_value: None,
            max_value: None,
            frequency: default_frequency(),
            change_step: 0.0,
            unit: String::new(),
            initial_value: None,
            noise_level: 0.0,
            drift_rate: 0.0,
            custom_params: CustomParams::default(),
        }
    }

    pub fn float(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            min_value: Some(min),
            max_value: Some(max),
            ..Self::new(name, DataKind::Float)
        }
    }

    pub fn integer(name: impl Into<String>, min: f64, max: f64) -> Self {
        Self {
            min_value: Some(min),
            max_value: Some(max),
            ..Self::new(name, DataKind::Integer)
        }
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, DataKind::Boolean)
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, DataKind::String)
    }

    pub fn with_frequency(mut self, hz: f64) -> Self {
        self.frequency = hz;
        self
    }

    pub fn with_change_step(mut self, step: f64) -> Self {
        self.change_step = step;
        self
    }

    pub fn with_noise(mut self, level: f64) -> Self {
        self.noise_level = level;
        self
    }

    pub fn with_drift(mut self, rate: f64) -> Self {
        self.drift_rate = rate;
        self
    }

    pub fn with_initial(mut self, value: impl Into<Value>) -> Self {
        self.initial_value = Some(value.into());
        self
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Declare enumerated states for a String channel.
    pub fn with_states<I, S>(mut self, states: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.custom_params.possible_states = Some(states.into_iter().map(Into::into).collect());
        self
    }

    /// Token shape for a String channel without states.
    pub fn with_token(mut self, length: usize, chars: impl Into<String>) -> Self {
        self.custom_params.string_length = length;
        self.custom_params.string_chars = chars.into();
        self
    }
}

/// How a String channel produces new values.
#[derive(Debug, Clone, PartialEq)]
pub enum StringSource {
    /// Pick among declared states
    States(Vec<String>),
    /// Synthesize a fixed-length token
    Token { length: usize, alphabet: Vec<char> },
}

/// Kind-specific validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelParams {
    Float { min: f64, max: f64 },
    Integer { min: f64, max: f64 },
    Boolean,
    String(StringSource),
}

impl ChannelParams {
    pub fn kind(&self) -> DataKind {
        match self {
            ChannelParams::Float { .. } => DataKind::Float,
            ChannelParams::Integer { .. } => DataKind::Integer,
            ChannelParams::Boolean => DataKind::Boolean,
            ChannelParams::String(_) => DataKind::String,
        }
    }

    /// `(min, max)` for numeric kinds.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            ChannelParams::Float { min, max } | ChannelParams::Integer { min, max } => {
                Some((*min, *max))
            }
            _ => None,
        }
    }
}

/// Validated, immutable channel configuration.
///
/// Serializes back to its [`ChannelDefinition`] form, and deserializing
/// runs the same validation as [`TryFrom`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ChannelDefinition", into = "ChannelDefinition")]
pub struct ChannelConfig {
    name: String,
    params: ChannelParams,
    frequency_hz: f64,
    period: Duration,
    change_step: f64,
    noise_level: f64,
    drift_rate: f64,
    unit: String,
    initial_value: Value,
}

impl ChannelConfig {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DataKind {
        self.params.kind()
    }

    pub fn params(&self) -> &ChannelParams {
        &self.params
    }

    pub fn frequency_hz(&self) -> f64 {
        self.frequency_hz
    }

    /// Nominal tick period, `1 / frequency`.
    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn change_step(&self) -> f64 {
        self.change_step
    }

    pub fn noise_level(&self) -> f64 {
        self.noise_level
    }

    pub fn drift_rate(&self) -> f64 {
        self.drift_rate
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Value used on the first tick.
    pub fn initial_value(&self) -> &Value {
        &self.initial_value
    }

    /// Probability used by Boolean and String channels.
    pub fn change_probability(&self) -> f64 {
        self.change_step.clamp(0.0, 1.0)
    }
}

impl TryFrom<ChannelDefinition> for ChannelConfig {
    type Error = ConfigError;

    fn try_from(def: ChannelDefinition) -> Result<Self, Self::Error> {
        if def.name.trim().is_empty() {
            return Err(ConfigError::EmptyName);
        }
        let channel = def.name.clone();

        let period = if def.frequency.is_finite() && def.frequency > 0.0 {
            Duration::try_from_secs_f64(1.0 / def.frequency)
                .ok()
                .filter(|p| !p.is_zero())
        } else {
            None
        };
        let period = period.ok_or(ConfigError::InvalidFrequency {
            channel: channel.clone(),
            frequency: def.frequency,
        })?;

        if !def.change_step.is_finite() || def.change_step < 0.0 {
            return Err(ConfigError::InvalidChangeStep {
                channel,
                step: def.change_step,
            });
        }
        if !(0.0..=1.0).contains(&def.noise_level) {
            return Err(ConfigError::InvalidNoiseLevel {
                channel,
                level: def.noise_level,
            });
        }
        if !def.drift_rate.is_finite() {
            return Err(ConfigError::InvalidDriftRate {
                channel,
                rate: def.drift_rate,
            });
        }

        let params = build_params(&def)?;
        let initial_value = resolve_initial(&def, &params)?;

        Ok(Self {
            name: def.name,
            params,
            frequency_hz: def.frequency,
            period,
            change_step: def.change_step,
            noise_level: def.noise_level,
            drift_rate: def.drift_rate,
            unit: def.unit,
            initial_value,
        })
    }
}

impl From<ChannelConfig> for ChannelDefinition {
    fn from(config: ChannelConfig) -> Self {
        let mut def = ChannelDefinition::new(config.name, config.params.kind());
        let mut custom = CustomParams::default();
        match config.params {
            ChannelParams::Float { min, max } | ChannelParams::Integer { min, max } => {
                def.min_value = Some(min);
                def.max_value = Some(max);
            }
            ChannelParams::Boolean => {}
            ChannelParams::String(StringSource::States(states)) => {
                custom.possible_states = Some(states);
            }
            ChannelParams::String(StringSource::Token { length, alphabet }) => {
                custom.string_length = length;
                custom.string_chars = alphabet.into_iter().collect();
            }
        }
        def.frequency = config.frequency_hz;
        def.change_step = config.change_step;
        def.noise_level = config.noise_level;
        def.drift_rate = config.drift_rate;
        def.unit = config.unit;
        def.initial_value = Some(config.initial_value);
        def.custom_params = custom;
        def
    }
}

fn build_params(def: &ChannelDefinition) -> Result<ChannelParams, ConfigError> {
    let channel = || def.name.clone();

    match def.data_type {
        DataKind::Float | DataKind::Integer => {
            let (min, max) = match (def.min_value, def.max_value) {
                (Some(min), Some(max)) => (min, max),
                _ => {
                    return Err(ConfigError::MissingBounds {
                        channel: channel(),
                        kind: def.data_type,
                    })
                }
            };
            // min == max is a constant channel
            if !min.is_finite() || !max.is_finite() || min > max {
                return Err(ConfigError::InvalidRange {
                    channel: channel(),
                    min,
                    max,
                });
            }
            if def.data_type == DataKind::Integer {
                if min.fract() != 0.0 || max.fract() != 0.0 {
                    return Err(ConfigError::NonIntegralBounds {
                        channel: channel(),
                        min,
                        max,
                    });
                }
                Ok(ChannelParams::Integer { min, max })
            } else {
                Ok(ChannelParams::Float { min, max })
            }
        }
        DataKind::Boolean => Ok(ChannelParams::Boolean),
        DataKind::String => match &def.custom_params.possible_states {
            Some(states) if states.is_empty() => Err(ConfigError::EmptyStates { channel: channel() }),
            Some(states) => Ok(ChannelParams::String(StringSource::States(states.clone()))),
            None => {
                let alphabet: Vec<char> = def.custom_params.string_chars.chars().collect();
                if alphabet.is_empty() || def.custom_params.string_length == 0 {
                    return Err(ConfigError::InvalidTokenSpec { channel: channel() });
                }
                Ok(ChannelParams::String(StringSource::Token {
                    length: def.custom_params.string_length,
                    alphabet,
                }))
            }
        },
    }
}

fn resolve_initial(def: &ChannelDefinition, params: &ChannelParams) -> Result<Value, ConfigError> {
    let kind_error = || ConfigError::InitialValueKind {
        channel: def.name.clone(),
        kind: def.data_type,
    };

    match params {
        ChannelParams::Float { min, max } | ChannelParams::Integer { min, max } => {
            let integral = matches!(params, ChannelParams::Integer { .. });
            let value = match &def.initial_value {
                None if integral => ((min + max) / 2.0).round(),
                None => (min + max) / 2.0,
                Some(Value::Float(v)) => *v,
                Some(Value::Integer(v)) => *v as f64,
                Some(_) => return Err(kind_error()),
            };
            if integral && value.fract() != 0.0 {
                return Err(kind_error());
            }
            if !value.is_finite() || value < *min || value > *max {
                return Err(ConfigError::InitialValueOutOfRange {
                    channel: def.name.clone(),
                    value,
                    min: *min,
                    max: *max,
                });
            }
            Ok(if integral {
                Value::Integer(value as i64)
            } else {
                Value::Float(value)
            })
        }
        ChannelParams::Boolean => match &def.initial_value {
            None => Ok(Value::Boolean(false)),
            Some(Value::Boolean(b)) => Ok(Value::Boolean(*b)),
            Some(_) => Err(kind_error()),
        },
        ChannelParams::String(source) => match (&def.initial_value, source) {
            (None, StringSource::States(states)) => {
                Ok(Value::String(states.first().cloned().unwrap_or_default()))
            }
            (None, StringSource::Token { .. }) => Ok(Value::String(String::new())),
            (Some(Value::String(s)), StringSource::States(states)) => {
                if states.contains(s) {
                    Ok(Value::String(s.clone()))
                } else {
                    Err(ConfigError::InitialStateUnknown {
                        channel: def.name.clone(),
                        state: s.clone(),
                    })
                }
            }
            (Some(Value::String(s)), StringSource::Token { .. }) => Ok(Value::String(s.clone())),
            (Some(_), _) => Err(kind_error()),
        },
    }
}
