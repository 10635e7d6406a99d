//! Analysis configuration
//!
//! All decision thresholds live here as named constants and are grouped into
//! serde-friendly structs so deployments can override them from TOML. The
//! indicator, difficulty and recommendation threshold sets overlap in meaning
//! but not in value (slow reaction is 0.7s for difficulty scoring and 0.8s for
//! recommendations) and stay separate constants.
//!
//! ```toml
//! [difficulty]
//! promote_to_medium_score = 3
//!
//! [outlier]
//! min_batch_size = 20
//! ```

use crate::error::AnalyticsError;
use serde::{Deserialize, Serialize};
use std::path::Path;

// Session indicator flags
pub const HIGH_REACTION_VARIABILITY_SECS: f64 = 0.3;
pub const ATTENTION_LAPSE_MIN_DROPS: u32 = 2;
pub const ATTENTION_DROP_POINTS: f64 = 20.0;
pub const DISTRACTIBILITY_RESISTANCE_PCT: f64 = 60.0;
pub const INCONSISTENT_ATTENTION_STD: f64 = 15.0;

// Difficulty performance score
pub const DIFFICULTY_AVOIDANCE_PCT: f64 = 80.0;
pub const DIFFICULTY_RESISTANCE_PCT: f64 = 75.0;
pub const DIFFICULTY_ATTENTION_MEAN: f64 = 70.0;
pub const DIFFICULTY_FAST_REACTION_SECS: f64 = 0.7;

// Recommendation triggers
pub const RECOMMEND_LOW_ATTENTION_MEAN: f64 = 50.0;
pub const RECOMMEND_LOW_RESISTANCE_PCT: f64 = 60.0;
pub const RECOMMEND_SLOW_REACTION_SECS: f64 = 0.8;
pub const RECOMMEND_ATTENTION_STD: f64 = 20.0;

// Progress aggregation
pub const TREND_WINDOW_SESSIONS: usize = 5;
pub const MIN_TREND_POINTS: usize = 3;
pub const ADHD_POINTS_PER_INDICATOR: f64 = 25.0;
pub const CONSISTENCY_STD_SCALE: f64 = 5.0;

// Outlier scoring
pub const OUTLIER_TREES: usize = 100;
pub const OUTLIER_MAX_SAMPLES: usize = 256;
pub const OUTLIER_CONTAMINATION: f64 = 0.1;
pub const OUTLIER_SEED: u64 = 42;
pub const OUTLIER_MIN_BATCH: usize = 10;

/// Name of the game whose telemetry the built-in processor understands
pub const NEUROSPRINT_GAME: &str = "NeuroSprint";

/// Thresholds for the per-session indicator flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorThresholds {
    /// Reaction std (seconds) above which variability is flagged
    pub high_reaction_variability: f64,
    /// Attention drops above this count flag lapses
    pub attention_lapse_drops: u32,
    /// Minimum decrease between consecutive attention samples counted as a drop
    pub attention_drop_points: f64,
    /// Resistance rate (%) below which distractibility is flagged
    pub distractibility_resistance: f64,
    /// Attention std above which performance is flagged inconsistent
    pub inconsistent_attention_std: f64,
}

impl Default for IndicatorThresholds {
    fn default() -> Self {
        Self {
            high_reaction_variability: HIGH_REACTION_VARIABILITY_SECS,
            attention_lapse_drops: ATTENTION_LAPSE_MIN_DROPS,
            attention_drop_points: ATTENTION_DROP_POINTS,
            distractibility_resistance: DISTRACTIBILITY_RESISTANCE_PCT,
            inconsistent_attention_std: INCONSISTENT_ATTENTION_STD,
        }
    }
}

/// Thresholds for the adaptive difficulty performance score and tier table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DifficultyThresholds {
    pub avoidance_rate: f64,
    pub resistance_rate: f64,
    pub attention_mean: f64,
    pub fast_reaction_secs: f64,
    pub promote_to_medium_score: u8,
    pub promote_to_hard_score: u8,
    pub demote_to_easy_score: u8,
    pub demote_to_medium_score: u8,
}

impl Default for DifficultyThresholds {
    fn default() -> Self {
        Self {
            avoidance_rate: DIFFICULTY_AVOIDANCE_PCT,
            resistance_rate: DIFFICULTY_RESISTANCE_PCT,
            attention_mean: DIFFICULTY_ATTENTION_MEAN,
            fast_reaction_secs: DIFFICULTY_FAST_REACTION_SECS,
            promote_to_medium_score: 3,
            promote_to_hard_score: 4,
            demote_to_easy_score: 1,
            demote_to_medium_score: 2,
        }
    }
}

/// Thresholds for the recommendation rules
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecommendationThresholds {
    pub low_attention_mean: f64,
    pub low_resistance_rate: f64,
    pub slow_reaction_secs: f64,
    pub high_attention_std: f64,
}

impl Default for RecommendationThresholds {
    fn default() -> Self {
        Self {
            low_attention_mean: RECOMMEND_LOW_ATTENTION_MEAN,
            low_resistance_rate: RECOMMEND_LOW_RESISTANCE_PCT,
            slow_reaction_secs: RECOMMEND_SLOW_REACTION_SECS,
            high_attention_std: RECOMMEND_ATTENTION_STD,
        }
    }
}

/// Progress aggregation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProgressSettings {
    /// Number of most recent sessions used for trend fitting
    pub trend_window: usize,
    /// Minimum qualifying values before a trend is fitted
    pub min_trend_points: usize,
    pub adhd_points_per_indicator: f64,
    pub consistency_std_scale: f64,
}

impl Default for ProgressSettings {
    fn default() -> Self {
        Self {
            trend_window: TREND_WINDOW_SESSIONS,
            min_trend_points: MIN_TREND_POINTS,
            adhd_points_per_indicator: ADHD_POINTS_PER_INDICATOR,
            consistency_std_scale: CONSISTENCY_STD_SCALE,
        }
    }
}

/// Isolation forest settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierSettings {
    pub trees: usize,
    pub max_samples: usize,
    /// Expected share of anomalous vectors in a batch
    pub contamination: f64,
    pub seed: u64,
    /// Batches smaller than this are rejected as insufficient
    pub min_batch_size: usize,
}

impl Default for OutlierSettings {
    fn default() -> Self {
        Self {
            trees: OUTLIER_TREES,
            max_samples: OUTLIER_MAX_SAMPLES,
            contamination: OUTLIER_CONTAMINATION,
            seed: OUTLIER_SEED,
            min_batch_size: OUTLIER_MIN_BATCH,
        }
    }
}

/// Bands used by the cohort report for insights, indicators and advice
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CohortBands {
    pub slow_reaction_secs: f64,
    pub fast_reaction_secs: f64,
    pub low_attention: f64,
    pub high_attention: f64,
    pub high_variability: f64,
    pub low_variability: f64,
    pub high_anomaly_pct: f64,
    pub low_anomaly_pct: f64,
    pub reaction_variability_secs: f64,
    pub attention_drop_points: f64,
    pub distraction_ratio: f64,
    pub score_variation: f64,
    pub advise_reaction_secs: f64,
    pub advise_attention: f64,
    pub advise_variability: f64,
    pub advise_distraction_ratio: f64,
}

impl Default for CohortBands {
    fn default() -> Self {
        Self {
            slow_reaction_secs: 0.8,
            fast_reaction_secs: 0.4,
            low_attention: 50.0,
            high_attention: 80.0,
            high_variability: 20.0,
            low_variability: 10.0,
            high_anomaly_pct: 30.0,
            low_anomaly_pct: 10.0,
            reaction_variability_secs: 0.3,
            attention_drop_points: 20.0,
            distraction_ratio: 0.4,
            score_variation: 0.5,
            advise_reaction_secs: 0.7,
            advise_attention: 60.0,
            advise_variability: 15.0,
            advise_distraction_ratio: 0.3,
        }
    }
}

/// Session pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    /// Refetch-and-recompute attempts when the progress record moved underneath us
    pub max_update_retries: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            max_update_retries: 3,
        }
    }
}

/// Complete analysis configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub indicators: IndicatorThresholds,
    pub difficulty: DifficultyThresholds,
    pub recommendations: RecommendationThresholds,
    pub progress: ProgressSettings,
    pub outlier: OutlierSettings,
    pub cohort: CohortBands,
    pub pipeline: PipelineSettings,
}

impl AnalysisConfig {
    /// Parse a TOML document; missing tables and keys fall back to defaults
    pub fn from_toml_str(toml_str: &str) -> Result<Self, AnalyticsError> {
        let config: AnalysisConfig =
            toml::from_str(toml_str).map_err(|e| AnalyticsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, AnalyticsError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AnalyticsError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML
    pub fn to_toml_string(&self) -> Result<String, AnalyticsError> {
        toml::to_string_pretty(self).map_err(|e| AnalyticsError::Config(e.to_string()))
    }

    /// Reject settings that would make the analysis meaningless
    pub fn validate(&self) -> Result<(), AnalyticsError> {
        let contamination = self.outlier.contamination;
        if !(contamination > 0.0 && contamination < 0.5) {
            return Err(AnalyticsError::Config(format!(
                "outlier.contamination must be in (0, 0.5), got {}",
                self.outlier.contamination
            )));
        }
        if self.outlier.trees == 0 || self.outlier.max_samples < 2 {
            return Err(AnalyticsError::Config(
                "outlier.trees must be > 0 and outlier.max_samples >= 2".to_string(),
            ));
        }
        if self.progress.min_trend_points < 2 {
            return Err(AnalyticsError::Config(
                "progress.min_trend_points must be at least 2".to_string(),
            ));
        }
        if self.progress.trend_window < self.progress.min_trend_points {
            return Err(AnalyticsError::Config(
                "progress.trend_window must not be smaller than progress.min_trend_points"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reaction_threshold_sets_stay_distinct() {
        let config = AnalysisConfig::default();
        assert_eq!(config.difficulty.fast_reaction_secs, 0.7);
        assert_eq!(config.recommendations.slow_reaction_secs, 0.8);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let toml = r#"
            [difficulty]
            promote_to_medium_score = 2

            [outlier]
            min_batch_size = 20
        "#;
        let config = AnalysisConfig::from_toml_str(toml).unwrap();
        assert_eq!(config.difficulty.promote_to_medium_score, 2);
        assert_eq!(config.difficulty.promote_to_hard_score, 4);
        assert_eq!(config.outlier.min_batch_size, 20);
        assert_eq!(config.outlier.seed, OUTLIER_SEED);
        assert_eq!(config.indicators, IndicatorThresholds::default());
    }

    #[test]
    fn test_empty_toml_is_default() {
        let config = AnalysisConfig::from_toml_str("").unwrap();
        assert_eq!(config, AnalysisConfig::default());
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AnalysisConfig::default();
        let rendered = config.to_toml_string().unwrap();
        let parsed = AnalysisConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_invalid_contamination_rejected() {
        let err = AnalysisConfig::from_toml_str("[outlier]\ncontamination = 0.9").unwrap_err();
        assert!(matches!(err, AnalyticsError::Config(_)));
    }

    #[test]
    fn test_unparseable_toml_rejected() {
        let err = AnalysisConfig::from_toml_str("[difficulty\n").unwrap_err();
        assert!(matches!(err, AnalyticsError::Config(_)));
    }
}
