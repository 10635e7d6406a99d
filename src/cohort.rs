//! Cohort analysis
//!
//! Batch report over many sessions: per-session features, outlier labels,
//! summary statistics, banded insight text, cohort-level indicator flags and
//! advice. The report is plain data; rendering it is left to the caller.

use crate::config::{AnalysisConfig, CohortBands};
use crate::error::AnalyticsError;
use crate::metrics::{mean, MetricExtractor};
use crate::outlier::{feature_vector, FeatureVector, OutlierScorer, ANOMALY, NORMAL};
use crate::trend::guarded_slope;
use crate::types::{GameSession, IndicatorFlags, RawSessionData, SessionMetrics};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const INSUFFICIENT_DATA_MESSAGE: &str = "Insufficient data for analysis";

const INSUFFICIENT_DATA_SUGGESTIONS: [&str; 2] = [
    "Play more NeuroSprint sessions to generate data",
    "Ensure gameplay data is being properly recorded",
];

/// One session submitted for cohort analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSession {
    #[serde(alias = "id")]
    pub session_id: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub duration_minutes: f64,
    #[serde(default)]
    pub session_data: Value,
}

impl From<&GameSession> for CohortSession {
    fn from(session: &GameSession) -> Self {
        Self {
            session_id: session.id.clone(),
            score: session.score,
            duration_minutes: session.duration_minutes.unwrap_or(0.0),
            session_data: session.session_data.clone(),
        }
    }
}

/// Outlier label of a session, relative to its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttentionPattern {
    Normal,
    Inconsistent,
}

/// Per-session row of the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortRow {
    pub session_id: String,
    pub score: i64,
    pub duration_minutes: f64,
    /// Features in [`crate::outlier::FEATURE_NAMES`] order
    pub features: FeatureVector,
    pub reaction_min: f64,
    pub reaction_max: f64,
    /// -1 anomalous, +1 normal
    pub anomaly_label: i8,
    pub attention_pattern: AttentionPattern,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortReport {
    /// `average_reaction_time`, `average_attention_score`,
    /// `attention_variability`, `anomaly_percentage`
    pub metrics: BTreeMap<String, f64>,
    pub sessions: Vec<CohortRow>,
    pub insights: Vec<String>,
    pub adhd_indicators: IndicatorFlags,
    pub recommendations: Vec<String>,
    /// Slope of per-session mean reaction time in submission order
    pub reaction_trend: f64,
    /// Slope of per-session mean attention in submission order
    pub attention_trend: f64,
    /// False when the batch was too small to score; nothing is flagged then
    pub anomaly_detection_applied: bool,
}

/// Outcome of a cohort analysis. Too little data is a normal result.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CohortOutcome {
    Report(CohortReport),
    InsufficientData {
        message: String,
        qualifying_sessions: usize,
        suggestions: Vec<String>,
    },
}

impl CohortOutcome {
    pub fn report(&self) -> Option<&CohortReport> {
        match self {
            CohortOutcome::Report(report) => Some(report),
            CohortOutcome::InsufficientData { .. } => None,
        }
    }
}

/// Batch analyzer over a caller-supplied set of sessions
#[derive(Debug, Clone)]
pub struct CohortAnalyzer {
    extractor: MetricExtractor,
    scorer: OutlierScorer,
    bands: CohortBands,
    min_trend_points: usize,
}

/// A session that passed the qualification filter
struct Qualified<'a> {
    session: &'a CohortSession,
    metrics: SessionMetrics,
}

impl Default for CohortAnalyzer {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl CohortAnalyzer {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            extractor: MetricExtractor::new(config.indicators.clone()),
            scorer: OutlierScorer::new(config.outlier.clone()),
            bands: config.cohort.clone(),
            min_trend_points: config.progress.min_trend_points,
        }
    }

    /// Analyze a batch of sessions.
    ///
    /// Sessions without reaction times are skipped silently and malformed
    /// ones with a warning. When nothing qualifies the result is
    /// [`CohortOutcome::InsufficientData`].
    pub fn analyze(&self, sessions: &[CohortSession]) -> CohortOutcome {
        let qualified: Vec<Qualified<'_>> = sessions
            .iter()
            .filter_map(|session| self.qualify(session))
            .collect();

        if qualified.is_empty() {
            return CohortOutcome::InsufficientData {
                message: INSUFFICIENT_DATA_MESSAGE.to_string(),
                qualifying_sessions: 0,
                suggestions: INSUFFICIENT_DATA_SUGGESTIONS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            };
        }

        let features: Vec<FeatureVector> =
            qualified.iter().map(|q| feature_vector(&q.metrics)).collect();
        let (labels, anomaly_detection_applied) = self.score(&features);

        let reaction_means: Vec<f64> = qualified.iter().map(|q| q.metrics.reaction_mean).collect();
        let attention_means: Vec<f64> =
            qualified.iter().map(|q| q.metrics.attention_mean).collect();
        let attention_stds: Vec<f64> = qualified.iter().map(|q| q.metrics.attention_std).collect();

        let avg_reaction = mean(&reaction_means);
        let avg_attention = mean(&attention_means);
        let attention_variability = mean(&attention_stds);
        let anomaly_count = labels.iter().filter(|l| **l == ANOMALY).count();
        let anomaly_percentage = anomaly_count as f64 / qualified.len() as f64 * 100.0;

        let mut metrics = BTreeMap::new();
        metrics.insert("average_reaction_time".to_string(), avg_reaction);
        metrics.insert("average_attention_score".to_string(), avg_attention);
        metrics.insert("attention_variability".to_string(), attention_variability);
        metrics.insert("anomaly_percentage".to_string(), anomaly_percentage);

        let insights = self.insights(
            avg_reaction,
            avg_attention,
            attention_variability,
            anomaly_percentage,
        );
        let adhd_indicators = self.indicators(&qualified);
        let recommendations =
            self.recommendations(&qualified, avg_reaction, avg_attention, attention_variability);

        let rows = qualified
            .iter()
            .zip(features)
            .zip(labels)
            .map(|((q, features), label)| CohortRow {
                session_id: q.session.session_id.clone(),
                score: q.session.score,
                duration_minutes: q.session.duration_minutes,
                features,
                reaction_min: q.metrics.reaction_min,
                reaction_max: q.metrics.reaction_max,
                anomaly_label: label,
                attention_pattern: if label == ANOMALY {
                    AttentionPattern::Inconsistent
                } else {
                    AttentionPattern::Normal
                },
            })
            .collect();

        tracing::debug!(
            submitted = sessions.len(),
            qualifying = qualified.len(),
            anomalies = anomaly_count,
            "cohort analyzed"
        );

        CohortOutcome::Report(CohortReport {
            metrics,
            sessions: rows,
            insights,
            adhd_indicators,
            recommendations,
            reaction_trend: guarded_slope(&reaction_means, self.min_trend_points),
            attention_trend: guarded_slope(&attention_means, self.min_trend_points),
            anomaly_detection_applied,
        })
    }

    fn qualify<'a>(&self, session: &'a CohortSession) -> Option<Qualified<'a>> {
        let empty = match &session.session_data {
            Value::Null => true,
            Value::Object(bag) => bag.is_empty(),
            _ => false,
        };
        if empty {
            return None;
        }

        let raw = match RawSessionData::from_value(&session.session_data) {
            Ok(raw) => raw,
            Err(err) => {
                tracing::warn!(session_id = %session.session_id, %err, "skipping malformed session");
                return None;
            }
        };
        if raw.reaction_times.is_empty() {
            return None;
        }

        Some(Qualified {
            session,
            metrics: self.extractor.extract(&raw),
        })
    }

    fn score(&self, features: &[FeatureVector]) -> (Vec<i8>, bool) {
        match self.scorer.fit_and_score(features) {
            Ok(labels) => (labels, true),
            Err(AnalyticsError::InsufficientData(reason)) => {
                tracing::warn!(%reason, "outlier scoring skipped");
                (vec![NORMAL; features.len()], false)
            }
            Err(err) => {
                tracing::warn!(%err, "outlier scoring failed");
                (vec![NORMAL; features.len()], false)
            }
        }
    }

    fn insights(
        &self,
        avg_reaction: f64,
        avg_attention: f64,
        attention_variability: f64,
        anomaly_percentage: f64,
    ) -> Vec<String> {
        let b = &self.bands;
        let mut insights = Vec::new();

        if avg_reaction > b.slow_reaction_secs {
            insights.push("Reaction times are slower than average, which may indicate attention challenges");
        } else if avg_reaction < b.fast_reaction_secs {
            insights.push("Reaction times are faster than average, showing good attentional alertness");
        }

        if avg_attention < b.low_attention {
            insights.push("Overall attention scores are low, suggesting difficulty maintaining focus");
        } else if avg_attention > b.high_attention {
            insights.push("Overall attention scores are high, indicating good sustained attention");
        }

        if attention_variability > b.high_variability {
            insights.push("High variability in attention suggests inconsistent focus, a common ADHD indicator");
        } else if attention_variability < b.low_variability {
            insights.push("Low variability in attention suggests consistent focus throughout gameplay");
        }

        if anomaly_percentage > b.high_anomaly_pct {
            insights.push("A high percentage of sessions show unusual attention patterns");
        } else if anomaly_percentage < b.low_anomaly_pct {
            insights.push("Attention patterns are mostly consistent across sessions");
        }

        insights.into_iter().map(String::from).collect()
    }

    fn indicators(&self, qualified: &[Qualified<'_>]) -> IndicatorFlags {
        let b = &self.bands;

        let reaction_stds: Vec<f64> = qualified.iter().map(|q| q.metrics.reaction_std).collect();
        let trigger_ratios: Vec<f64> = qualified
            .iter()
            .map(|q| q.metrics.distraction_trigger_ratio())
            .collect();
        let scores: Vec<f64> = qualified.iter().map(|q| q.session.score as f64).collect();

        let attention_lapses = qualified
            .windows(2)
            .any(|pair| pair[1].metrics.attention_mean - pair[0].metrics.attention_mean < -b.attention_drop_points);

        IndicatorFlags {
            high_reaction_variability: mean(&reaction_stds) > b.reaction_variability_secs,
            attention_lapses,
            distractibility: mean(&trigger_ratios) > b.distraction_ratio,
            inconsistent_performance: coefficient_of_variation(&scores) > b.score_variation,
        }
    }

    fn recommendations(
        &self,
        qualified: &[Qualified<'_>],
        avg_reaction: f64,
        avg_attention: f64,
        attention_variability: f64,
    ) -> Vec<String> {
        let b = &self.bands;
        let mut advice =
            vec!["Continue regular NeuroSprint sessions to track attention patterns over time"];

        if avg_reaction > b.advise_reaction_secs {
            advice.push("Try shorter, more frequent gameplay sessions to improve reaction time");
        }
        if avg_attention < b.advise_attention {
            advice.push("Practice mindfulness exercises to improve sustained attention");
        }
        if attention_variability > b.advise_variability {
            advice.push("Work on consistency by gradually increasing session duration");
        }

        let trigger_ratios: Vec<f64> = qualified
            .iter()
            .map(|q| q.metrics.distraction_trigger_ratio())
            .collect();
        if mean(&trigger_ratios) > b.advise_distraction_ratio {
            advice.push("Practice ignoring distractions in a controlled environment");
        }

        advice.into_iter().map(String::from).collect()
    }
}

/// Sample standard deviation over mean. NaN for fewer than two values, so
/// comparisons against it are false.
fn coefficient_of_variation(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return f64::NAN;
    }
    let m = mean(values);
    let variance =
        values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt() / m
}
