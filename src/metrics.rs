//! Session metric extraction
//!
//! Turns the raw telemetry bag uploaded by the game client into a fixed-shape
//! [`SessionMetrics`] record. Parsing the bag is the only fallible step;
//! extraction itself is total and short-circuits empty or zero-denominator
//! inputs to 0.

use crate::config::IndicatorThresholds;
use crate::error::AnalyticsError;
use crate::types::{IndicatorFlags, RawSessionData, SessionMetrics};
use serde_json::{Map, Value};

impl RawSessionData {
    /// Parse the untyped key/value bag sent by the client.
    ///
    /// Absent or `null` fields default to empty/zero and unknown keys are
    /// ignored. Wrong shapes fail with [`AnalyticsError::MalformedInput`]
    /// naming the offending field.
    pub fn from_value(value: &Value) -> Result<Self, AnalyticsError> {
        let bag = value
            .as_object()
            .ok_or_else(|| AnalyticsError::malformed("session_data", "expected a JSON object"))?;

        let reaction_times = number_sequence(bag, "reaction_times")?;
        if let Some(i) = reaction_times.iter().position(|t| *t < 0.0) {
            return Err(AnalyticsError::malformed(
                format!("reaction_times[{}]", i),
                "reaction time cannot be negative",
            ));
        }

        Ok(Self {
            reaction_times,
            attention_scores: number_sequence(bag, "attention_scores")?,
            obstacles_avoided: count(bag, "obstacles_avoided")?,
            obstacles_hit: count(bag, "obstacles_hit")?,
            distractions_ignored: count(bag, "distractions_ignored")?,
            distractions_triggered: count(bag, "distractions_triggered")?,
        })
    }

    /// Parse a raw session JSON string
    pub fn from_json(json: &str) -> Result<Self, AnalyticsError> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(&value)
    }
}

fn number_sequence(bag: &Map<String, Value>, field: &str) -> Result<Vec<f64>, AnalyticsError> {
    match bag.get(field) {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_f64()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| {
                        AnalyticsError::malformed(
                            format!("{}[{}]", field, i),
                            format!("expected a number, got {}", item),
                        )
                    })
            })
            .collect(),
        Some(other) => Err(AnalyticsError::malformed(
            field,
            format!("expected an array of numbers, got {}", other),
        )),
    }
}

fn count(bag: &Map<String, Value>, field: &str) -> Result<u32, AnalyticsError> {
    match bag.get(field) {
        None | Some(Value::Null) => Ok(0),
        Some(value) => value
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| {
                AnalyticsError::malformed(
                    field,
                    format!("expected a non-negative integer, got {}", value),
                )
            }),
    }
}

/// Extractor for per-session metrics
#[derive(Debug, Clone, Default)]
pub struct MetricExtractor {
    thresholds: IndicatorThresholds,
}

impl MetricExtractor {
    pub fn new(thresholds: IndicatorThresholds) -> Self {
        Self { thresholds }
    }

    /// Derive session metrics from raw telemetry
    pub fn extract(&self, raw: &RawSessionData) -> SessionMetrics {
        let reactions = &raw.reaction_times;
        let attention = &raw.attention_scores;

        let reaction_mean = mean(reactions);
        let reaction_std = population_std(reactions);
        let reaction_min = reactions.iter().copied().reduce(f64::min).unwrap_or(0.0);
        let reaction_max = reactions.iter().copied().reduce(f64::max).unwrap_or(0.0);

        let attention_mean = mean(attention);
        let attention_std = population_std(attention);
        let attention_drops = count_attention_drops(attention, self.thresholds.attention_drop_points);

        let obstacle_avoidance_rate = percentage(raw.obstacles_avoided, raw.obstacles_hit);
        let distraction_resistance_rate =
            percentage(raw.distractions_ignored, raw.distractions_triggered);

        let indicators = IndicatorFlags {
            high_reaction_variability: reaction_std > self.thresholds.high_reaction_variability,
            attention_lapses: attention_drops > self.thresholds.attention_lapse_drops,
            distractibility: distraction_resistance_rate
                < self.thresholds.distractibility_resistance,
            inconsistent_performance: attention_std > self.thresholds.inconsistent_attention_std,
        };

        SessionMetrics {
            reaction_mean,
            reaction_std,
            reaction_min,
            reaction_max,
            attention_mean,
            attention_std,
            attention_drops,
            obstacles_avoided: raw.obstacles_avoided,
            obstacles_hit: raw.obstacles_hit,
            obstacle_avoidance_rate,
            distractions_ignored: raw.distractions_ignored,
            distractions_triggered: raw.distractions_triggered,
            distraction_resistance_rate,
            indicators,
        }
    }
}

/// Arithmetic mean, 0 for an empty slice
pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation, 0 with fewer than two samples
pub(crate) fn population_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Count adjacent pairs where attention falls by more than `drop_points`.
///
/// Single left-to-right pass; rises are never counted.
fn count_attention_drops(scores: &[f64], drop_points: f64) -> u32 {
    scores
        .windows(2)
        .filter(|pair| pair[1] < pair[0] - drop_points)
        .count() as u32
}

/// `part / (part + rest) * 100`, 0 when both are 0
fn percentage(part: u32, rest: u32) -> f64 {
    let total = part as u64 + rest as u64;
    if total == 0 {
        return 0.0;
    }
    part as f64 / total as f64 * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extract(raw: &RawSessionData) -> SessionMetrics {
        MetricExtractor::default().extract(raw)
    }

    #[test]
    fn test_empty_session_is_all_zero() {
        let metrics = extract(&RawSessionData::default());

        assert_eq!(metrics.reaction_mean, 0.0);
        assert_eq!(metrics.reaction_std, 0.0);
        assert_eq!(metrics.reaction_min, 0.0);
        assert_eq!(metrics.reaction_max, 0.0);
        assert_eq!(metrics.attention_mean, 0.0);
        assert_eq!(metrics.attention_drops, 0);
        assert_eq!(metrics.obstacle_avoidance_rate, 0.0);
        assert_eq!(metrics.distraction_resistance_rate, 0.0);
        // A zero resistance rate still reads as distractible
        assert!(metrics.indicators.distractibility);
        assert!(!metrics.indicators.high_reaction_variability);
    }

    #[test]
    fn test_single_sample_has_zero_std() {
        let raw = RawSessionData {
            reaction_times: vec![0.55],
            attention_scores: vec![72.0],
            ..Default::default()
        };
        let metrics = extract(&raw);

        assert_eq!(metrics.reaction_mean, 0.55);
        assert_eq!(metrics.reaction_std, 0.0);
        assert_eq!(metrics.reaction_min, 0.55);
        assert_eq!(metrics.reaction_max, 0.55);
        assert_eq!(metrics.attention_std, 0.0);
    }

    #[test]
    fn test_reaction_stats() {
        let raw = RawSessionData {
            reaction_times: vec![0.4, 0.6, 0.8, 1.0],
            ..Default::default()
        };
        let metrics = extract(&raw);

        assert!((metrics.reaction_mean - 0.7).abs() < 1e-9);
        // Population std of [0.4, 0.6, 0.8, 1.0] = sqrt(0.05)
        assert!((metrics.reaction_std - 0.05f64.sqrt()).abs() < 1e-9);
        assert_eq!(metrics.reaction_min, 0.4);
        assert_eq!(metrics.reaction_max, 1.0);
        assert!((metrics.reaction_range() - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_attention_drops_are_order_sensitive() {
        assert_eq!(count_attention_drops(&[80.0, 55.0, 90.0, 60.0], 20.0), 2);
        // Reversed sequence only rises across the big gaps
        assert_eq!(count_attention_drops(&[60.0, 90.0, 55.0, 80.0], 20.0), 1);
        // Exactly 20 points is not a drop
        assert_eq!(count_attention_drops(&[80.0, 60.0], 20.0), 0);
        assert_eq!(count_attention_drops(&[80.0], 20.0), 0);
        assert_eq!(count_attention_drops(&[], 20.0), 0);
    }

    #[test]
    fn test_rates() {
        let raw = RawSessionData {
            obstacles_avoided: 9,
            obstacles_hit: 1,
            distractions_ignored: 3,
            distractions_triggered: 1,
            ..Default::default()
        };
        let metrics = extract(&raw);

        assert!((metrics.obstacle_avoidance_rate - 90.0).abs() < 1e-9);
        assert!((metrics.distraction_resistance_rate - 75.0).abs() < 1e-9);
        assert!(!metrics.indicators.distractibility);
    }

    #[test]
    fn test_indicator_flags() {
        let raw = RawSessionData {
            reaction_times: vec![0.2, 1.2, 0.3, 1.5],
            attention_scores: vec![90.0, 60.0, 95.0, 50.0, 85.0, 40.0],
            obstacles_avoided: 5,
            obstacles_hit: 5,
            distractions_ignored: 1,
            distractions_triggered: 4,
        };
        let flags = extract(&raw).indicators;

        assert!(flags.high_reaction_variability);
        assert!(flags.attention_lapses);
        assert!(flags.distractibility);
        assert!(flags.inconsistent_performance);
        assert_eq!(flags.count(), 4);
    }

    #[test]
    fn test_parse_full_bag() {
        let value = json!({
            "reaction_times": [0.5, 0.7],
            "attention_scores": [70, 80.5],
            "obstacles_avoided": 8,
            "obstacles_hit": 2,
            "distractions_ignored": 4,
            "distractions_triggered": 1,
            "attention_score": 75,
            "level": "forest"
        });
        let raw = RawSessionData::from_value(&value).unwrap();

        assert_eq!(raw.reaction_times, vec![0.5, 0.7]);
        assert_eq!(raw.attention_scores, vec![70.0, 80.5]);
        assert_eq!(raw.obstacles_avoided, 8);
        assert_eq!(raw.distractions_triggered, 1);
    }

    #[test]
    fn test_parse_missing_and_null_fields_default() {
        let raw = RawSessionData::from_value(&json!({ "reaction_times": null })).unwrap();
        assert_eq!(raw, RawSessionData::default());
    }

    #[test]
    fn test_parse_rejects_non_numeric_sample() {
        let err =
            RawSessionData::from_value(&json!({ "reaction_times": [0.5, "fast"] })).unwrap_err();
        match err {
            AnalyticsError::MalformedInput { field, .. } => assert_eq!(field, "reaction_times[1]"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_rejects_wrong_shapes() {
        assert!(RawSessionData::from_value(&json!([1, 2, 3])).is_err());
        assert!(RawSessionData::from_value(&json!({ "attention_scores": 50 })).is_err());
        assert!(RawSessionData::from_value(&json!({ "obstacles_hit": -1 })).is_err());
        assert!(RawSessionData::from_value(&json!({ "obstacles_hit": 2.5 })).is_err());
        assert!(RawSessionData::from_value(&json!({ "reaction_times": [-0.1] })).is_err());
    }

    #[test]
    fn test_parse_invalid_json() {
        let err = RawSessionData::from_json("not json").unwrap_err();
        assert!(matches!(err, AnalyticsError::Json(_)));
    }
}
