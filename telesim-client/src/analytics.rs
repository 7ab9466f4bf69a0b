// Telesim Client - Telemetry collection and analytics
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Stream analytics
//!
//! Stateless functions over a [`StreamSnapshot`]. Every statistic is
//! computed twice: over the whole buffer and over the trailing window
//! ending at the caller's `now`.
//!
//! Float and Integer samples are used as-is, Booleans count as 0 and 1,
//! and String samples are left out of the numeric statistics.
//!
//! Statistics of an empty window are `None`. A single point has a standard
//! deviation of zero and no trend.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use telesim::ChannelKey;

use crate::store::StreamSnapshot;

fn default_window_secs() -> u64 {
    300
}

fn default_z_threshold() -> f64 {
    3.0
}

/// Analytics parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsConfig {
    /// Length of the trailing window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Deviations beyond this many standard deviations are anomalies
    #[serde(default = "default_z_threshold")]
    pub z_threshold: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            z_threshold: default_z_threshold(),
        }
    }
}

/// Statistics over one set of points.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub count: usize,
    pub average: Option<f64>,
    pub median: Option<f64>,
    /// Population standard deviation
    pub std_dev: Option<f64>,
    pub min_observed: Option<f64>,
    pub max_observed: Option<f64>,
    /// Least-squares slope in units per second
    pub trend_slope: Option<f64>,
    /// Positions in the analyzed buffer
    pub anomaly_indices: Vec<usize>,
}

/// Analytics for one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsSnapshot {
    pub key: ChannelKey,
    pub unit: String,
    pub computed_at: DateTime<Utc>,
    /// All retained points
    pub overall: WindowStats,
    /// Points inside the trailing window
    pub recent: WindowStats,
    /// Samples without a numeric view
    pub excluded: usize,
}

/// A numeric point with its position in the buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Point {
    index: usize,
    timestamp: DateTime<Utc>,
    value: f64,
}

/// Analyze one channel as of `now`.
pub fn analyze(snapshot: &StreamSnapshot, now: DateTime<Utc>, config: &AnalyticsConfig) -> AnalyticsSnapshot {
    let points: Vec<Point> = snapshot
        .points
        .iter()
        .enumerate()
        .filter_map(|(index, p)| {
            p.value.as_f64().map(|value| Point {
                index,
                timestamp: p.timestamp,
                value,
            })
        })
        .collect();
    let excluded = snapshot.points.len() - points.len();

    // a window reaching before the representable range covers everything
    let cutoff = i64::try_from(config.window_secs)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|window| now.checked_sub_signed(window));
    let recent: Vec<Point> = match cutoff {
        Some(cutoff) => points.iter().copied().filter(|p| p.timestamp >= cutoff).collect(),
        None => points.clone(),
    };

    AnalyticsSnapshot {
        key: snapshot.key.clone(),
        unit: snapshot.unit.clone(),
        computed_at: now,
        overall: window_stats(&points, config.z_threshold),
        recent: window_stats(&recent, config.z_threshold),
        excluded,
    }
}

/// Analyze several channels as of the same `now`.
pub fn analyze_all(snapshots: &[StreamSnapshot], now: DateTime<Utc>, config: &AnalyticsConfig) -> Vec<AnalyticsSnapshot> {
    snapshots.iter().map(|s| analyze(s, now, config)).collect()
}

fn window_stats(points: &[Point], z_threshold: f64) -> WindowStats {
    let values: Vec<f64> = points.iter().map(|p| p.value).collect();
    let average = mean(&values);
    let std_dev = population_std_dev(&values);

    let anomaly_indices = match (average, std_dev) {
        (Some(m), Some(s)) => flag_anomalies(points, m, s, z_threshold),
        _ => Vec::new(),
    };

    WindowStats {
        count: values.len(),
        average,
        median: median(&values),
        std_dev,
        min_observed: values.iter().copied().reduce(f64::min),
        max_observed: values.iter().copied().reduce(f64::max),
        trend_slope: trend(points),
        anomaly_indices,
    }
}

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

/// Population (not sample) standard deviation.
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.max(0.0).sqrt())
}

/// Ordinary least-squares slope of `y` against `x`.
///
/// `None` with fewer than two points or when every `x` is equal.
pub fn linear_slope(xs: &[f64], ys: &[f64]) -> Option<f64> {
    if xs.len() < 2 || xs.len() != ys.len() {
        return None;
    }
    let x_mean = mean(xs)?;
    let y_mean = mean(ys)?;
    let mut num = 0.0;
    let mut den = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        num += (x - x_mean) * (y - y_mean);
        den += (x - x_mean).powi(2);
    }
    if den == 0.0 {
        return None;
    }
    Some(num / den)
}

/// Slope against seconds elapsed since the first point.
fn trend(points: &[Point]) -> Option<f64> {
    let first = points.first()?.timestamp;
    let xs: Vec<f64> = points
        .iter()
        .map(|p| {
            let elapsed = p.timestamp - first;
            // microseconds unless the span overflows them
            elapsed
                .num_microseconds()
                .map_or(elapsed.num_milliseconds() as f64 / 1e3, |us| us as f64 / 1e6)
        })
        .collect();
    let ys: Vec<f64> = points.iter().map(|p| p.value).collect();
    linear_slope(&xs, &ys)
}

fn flag_anomalies(points: &[Point], mean: f64, std_dev: f64, z_threshold: f64) -> Vec<usize> {
    if std_dev == 0.0 {
        return Vec::new();
    }
    points
        .iter()
        .filter(|p| (p.value - mean).abs() > z_threshold * std_dev)
        .map(|p| p.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use telesim::{DataPoint, Value};

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn snapshot(points: Vec<DataPoint>) -> StreamSnapshot {
        StreamSnapshot {
            key: ChannelKey::new("dev", "temp"),
            unit: "°C".to_string(),
            points,
        }
    }

    fn series(values: &[f64], step_secs: i64) -> Vec<DataPoint> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| DataPoint::new(base() + Duration::seconds(i as i64 * step_secs), *v))
            .collect()
    }

    #[test]
    fn test_empty_buffer() {
        let result = analyze(&snapshot(Vec::new()), base(), &AnalyticsConfig::default());
        assert_eq!(result.overall, WindowStats::default());
        assert_eq!(result.recent.count, 0);
        assert!(result.overall.average.is_none());
        assert!(result.overall.trend_slope.is_none());
    }

    #[test]
    fn test_single_point() {
        let result = analyze(&snapshot(series(&[4.0], 1)), base(), &AnalyticsConfig::default());
        assert_eq!(result.overall.count, 1);
        assert_eq!(result.overall.std_dev, Some(0.0));
        assert_eq!(result.overall.median, Some(4.0));
        assert!(result.overall.trend_slope.is_none());
        assert!(result.overall.anomaly_indices.is_empty());
    }

    #[test]
    fn test_descriptive_statistics() {
        let result = analyze(
            &snapshot(series(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0], 1)),
            base() + Duration::seconds(10),
            &AnalyticsConfig::default(),
        );
        let stats = &result.overall;
        assert_relative_eq!(stats.average.unwrap(), 5.0);
        assert_relative_eq!(stats.std_dev.unwrap(), 2.0);
        assert_relative_eq!(stats.median.unwrap(), 4.5);
        assert_eq!(stats.min_observed, Some(2.0));
        assert_eq!(stats.max_observed, Some(9.0));
        assert_eq!(result.recent, result.overall);
    }

    #[test]
    fn test_linear_trend_recovered() {
        let values: Vec<f64> = (0..20).map(|t| 3.0 + 0.25 * (t as f64 * 2.0)).collect();
        let result = analyze(
            &snapshot(series(&values, 2)),
            base() + Duration::seconds(40),
            &AnalyticsConfig::default(),
        );
        assert_relative_eq!(result.overall.trend_slope.unwrap(), 0.25, epsilon = 1e-9);
    }

    #[test]
    fn test_sub_millisecond_spacing_keeps_trend() {
        let points: Vec<DataPoint> = (0..5)
            .map(|i| DataPoint::new(base() + Duration::microseconds(200 * i), i as f64))
            .collect();
        let result = analyze(&snapshot(points), base() + Duration::seconds(1), &AnalyticsConfig::default());
        assert_relative_eq!(result.overall.trend_slope.unwrap(), 5000.0, epsilon = 1e-6);
    }

    #[test]
    fn test_identical_timestamps_have_no_trend() {
        let points = vec![DataPoint::new(base(), 1.0), DataPoint::new(base(), 5.0)];
        let result = analyze(&snapshot(points), base(), &AnalyticsConfig::default());
        assert!(result.overall.trend_slope.is_none());
    }

    #[test]
    fn test_outlier_flagged_neighbours_not() {
        let mut values: Vec<f64> = (0..100).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }).collect();
        values.push(15.0);
        let result = analyze(
            &snapshot(series(&values, 1)),
            base() + Duration::seconds(100),
            &AnalyticsConfig::default(),
        );
        assert_eq!(result.overall.anomaly_indices, vec![100]);
    }

    #[test]
    fn test_constant_series_has_no_anomalies() {
        let result = analyze(
            &snapshot(series(&[3.0; 30], 1)),
            base() + Duration::seconds(30),
            &AnalyticsConfig::default(),
        );
        assert_eq!(result.overall.std_dev, Some(0.0));
        assert!(result.overall.anomaly_indices.is_empty());
    }

    #[test]
    fn test_recent_window_restricts_points() {
        // one point per minute for ten minutes
        let values: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let now = base() + Duration::minutes(9);
        let result = analyze(&snapshot(series(&values, 60)), now, &AnalyticsConfig::default());
        assert_eq!(result.overall.count, 10);
        assert_eq!(result.recent.count, 6);
        assert_eq!(result.recent.min_observed, Some(4.0));
        assert_relative_eq!(result.recent.trend_slope.unwrap(), 1.0 / 60.0, epsilon = 1e-12);
    }

    #[test]
    fn test_anomaly_indices_are_buffer_positions() {
        let mut points = Vec::new();
        for i in 0..40 {
            let ts = base() + Duration::seconds(i);
            if i == 5 {
                points.push(DataPoint::new(ts, Value::from("skip")));
            } else {
                points.push(DataPoint::new(ts, if i % 2 == 0 { 1.0 } else { 2.0 }));
            }
        }
        points.push(DataPoint::new(base() + Duration::seconds(40), 20.0));
        let result = analyze(&snapshot(points), base() + Duration::seconds(41), &AnalyticsConfig::default());
        assert_eq!(result.excluded, 1);
        assert_eq!(result.overall.count, 40);
        assert_eq!(result.overall.anomaly_indices, vec![40]);
    }

    #[test]
    fn test_booleans_count_as_zero_one() {
        let points = vec![
            DataPoint::new(base(), true),
            DataPoint::new(base() + Duration::seconds(1), false),
            DataPoint::new(base() + Duration::seconds(2), true),
            DataPoint::new(base() + Duration::seconds(3), true),
        ];
        let result = analyze(&snapshot(points), base() + Duration::seconds(3), &AnalyticsConfig::default());
        assert_relative_eq!(result.overall.average.unwrap(), 0.75);
    }

    #[test]
    fn test_config_defaults() {
        let config: AnalyticsConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.window_secs, 300);
        assert_eq!(config.z_threshold, 3.0);
    }
}
