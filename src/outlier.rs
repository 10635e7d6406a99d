//! Batch outlier scoring
//!
//! Flags statistically unusual sessions within a batch. Each call standardizes
//! the feature columns over the batch and fits a fresh isolation forest; no
//! model survives between calls, so results are always relative to the batch.
//!
//! Pipeline: feature vectors → standardize → isolation forest → {-1, +1}

use crate::config::OutlierSettings;
use crate::error::AnalyticsError;
use crate::types::SessionMetrics;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_pcg::Mcg128Xsl64;

/// Number of feature columns per session
pub const FEATURE_COUNT: usize = 7;

/// Column names in feature order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "avg_reaction_time",
    "std_reaction_time",
    "reaction_time_range",
    "attention_score",
    "attention_consistency",
    "hit_ratio",
    "distraction_ratio",
];

/// One session's features, in [`FEATURE_NAMES`] order
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Label for a vector the forest considers anomalous
pub const ANOMALY: i8 = -1;
/// Label for a vector within the batch's normal range
pub const NORMAL: i8 = 1;

/// Build the fixed-order feature vector for a session
pub fn feature_vector(metrics: &SessionMetrics) -> FeatureVector {
    [
        metrics.reaction_mean,
        metrics.reaction_std,
        metrics.reaction_range(),
        metrics.attention_mean,
        metrics.attention_std,
        metrics.obstacle_hit_ratio(),
        metrics.distraction_trigger_ratio(),
    ]
}

/// Isolation-forest outlier scorer
#[derive(Debug, Clone, Default)]
pub struct OutlierScorer {
    settings: OutlierSettings,
}

impl OutlierScorer {
    pub fn new(settings: OutlierSettings) -> Self {
        Self { settings }
    }

    /// Smallest batch the scorer will fit
    pub fn min_batch_size(&self) -> usize {
        self.settings.min_batch_size.max(2)
    }

    /// Label every vector in the batch: -1 anomalous, +1 normal.
    ///
    /// Output is aligned with input order. Roughly `contamination` of the
    /// batch is flagged; identical vectors are never flagged.
    pub fn fit_and_score(&self, batch: &[FeatureVector]) -> Result<Vec<i8>, AnalyticsError> {
        let scores = self.anomaly_scores(batch)?;
        let threshold = percentile(&scores, 100.0 * (1.0 - self.settings.contamination));

        Ok(scores
            .iter()
            .map(|s| if *s > threshold { ANOMALY } else { NORMAL })
            .collect())
    }

    /// Raw isolation scores in (0, 1]; higher is more anomalous
    pub fn anomaly_scores(&self, batch: &[FeatureVector]) -> Result<Vec<f64>, AnalyticsError> {
        if batch.len() < self.min_batch_size() {
            return Err(AnalyticsError::InsufficientData(format!(
                "outlier scoring needs at least {} sessions, got {}",
                self.min_batch_size(),
                batch.len()
            )));
        }

        let cleaned: Vec<FeatureVector> = batch.iter().map(sanitize).collect();
        let scaler = StandardScaler::fit(&cleaned);
        let scaled: Vec<FeatureVector> = cleaned.iter().map(|v| scaler.transform(v)).collect();

        let forest = IsolationForest::fit(&scaled, &self.settings);
        Ok(scaled.iter().map(|v| forest.score(v)).collect())
    }
}

/// Replace missing/non-finite values with 0
fn sanitize(vector: &FeatureVector) -> FeatureVector {
    let mut out = *vector;
    for value in out.iter_mut() {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    out
}

/// Per-column zero mean, unit variance scaling fitted on one batch
struct StandardScaler {
    means: FeatureVector,
    scales: FeatureVector,
}

impl StandardScaler {
    fn fit(batch: &[FeatureVector]) -> Self {
        let n = batch.len() as f64;
        let mut means = [0.0; FEATURE_COUNT];
        let mut scales = [1.0; FEATURE_COUNT];

        for col in 0..FEATURE_COUNT {
            let mean = batch.iter().map(|v| v[col]).sum::<f64>() / n;
            let variance = batch.iter().map(|v| (v[col] - mean).powi(2)).sum::<f64>() / n;
            means[col] = mean;
            // Constant columns keep unit scale
            if variance > f64::EPSILON {
                scales[col] = variance.sqrt();
            }
        }

        Self { means, scales }
    }

    fn transform(&self, vector: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for col in 0..FEATURE_COUNT {
            out[col] = (vector[col] - self.means[col]) / self.scales[col];
        }
        out
    }
}

enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    fn fit(data: &[FeatureVector], settings: &OutlierSettings) -> Self {
        let mut rng = Mcg128Xsl64::seed_from_u64(settings.seed);
        let sample_size = settings.max_samples.min(data.len());
        let max_depth = (sample_size as f64).log2().ceil() as usize;

        let trees = (0..settings.trees)
            .map(|_| {
                let sample = index::sample(&mut rng, data.len(), sample_size).into_vec();
                grow(&mut rng, data, sample, 0, max_depth)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// `2^(-E[h(x)] / c(psi))`
    fn score(&self, vector: &FeatureVector) -> f64 {
        let total: f64 = self
            .trees
            .iter()
            .map(|tree| path_length(tree, vector, 0))
            .sum();
        let mean_path = total / self.trees.len() as f64;
        let normalizer = average_path_length(self.sample_size);
        if normalizer <= 0.0 {
            return 0.5;
        }
        2f64.powf(-mean_path / normalizer)
    }
}

fn grow(
    rng: &mut Mcg128Xsl64,
    data: &[FeatureVector],
    rows: Vec<usize>,
    depth: usize,
    max_depth: usize,
) -> Node {
    if depth >= max_depth || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only columns that still vary within this node can split it
    let mut candidates: Vec<(usize, f64, f64)> = Vec::with_capacity(FEATURE_COUNT);
    for col in 0..FEATURE_COUNT {
        let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            (lo.min(data[r][col]), hi.max(data[r][col]))
        });
        if hi > lo {
            candidates.push((col, lo, hi));
        }
    }
    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.gen_range(0..candidates.len())];
    let threshold = rng.gen_range(lo..hi);
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[r][feature] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(rng, data, left, depth + 1, max_depth)),
        right: Box::new(grow(rng, data, right, depth + 1, max_depth)),
    }
}

fn path_length(node: &Node, vector: &FeatureVector, depth: usize) -> f64 {
    match node {
        Node::Leaf { size } => depth as f64 + average_path_length(*size),
        Node::Split {
            feature,
            threshold,
            left,
            right,
        } => {
            if vector[*feature] <= *threshold {
                path_length(left, vector, depth + 1)
            } else {
                path_length(right, vector, depth + 1)
            }
        }
    }
}

/// Expected path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// Percentile with linear interpolation between closest ranks
fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let rank = (pct / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clustered_batch() -> Vec<FeatureVector> {
        (0..20)
            .map(|i| {
                [
                    0.5 + 0.01 * (i % 5) as f64,
                    0.1 + 0.005 * (i % 4) as f64,
                    0.3 + 0.01 * (i % 3) as f64,
                    70.0 + (i % 7) as f64,
                    8.0 + (i % 5) as f64,
                    0.1 + 0.01 * (i % 6) as f64,
                    0.2 + 0.01 * (i % 4) as f64,
                ]
            })
            .collect()
    }

    #[test]
    fn test_extreme_session_is_flagged() {
        let mut batch = clustered_batch();
        batch.insert(7, [2.5, 1.2, 3.0, 15.0, 40.0, 0.9, 0.95]);

        let labels = OutlierScorer::default().fit_and_score(&batch).unwrap();

        assert_eq!(labels.len(), batch.len());
        assert_eq!(labels[7], ANOMALY);
        let flagged = labels.iter().filter(|l| **l == ANOMALY).count();
        assert!((1..=3).contains(&flagged), "flagged {flagged}");
        assert!(labels.iter().all(|l| *l == ANOMALY || *l == NORMAL));
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let batch = clustered_batch();
        let scorer = OutlierScorer::default();
        assert_eq!(
            scorer.anomaly_scores(&batch).unwrap(),
            scorer.anomaly_scores(&batch).unwrap()
        );
    }

    #[test]
    fn test_identical_vectors_are_never_flagged() {
        let batch = vec![[0.6, 0.1, 0.3, 70.0, 10.0, 0.2, 0.3]; 12];
        let labels = OutlierScorer::default().fit_and_score(&batch).unwrap();
        assert!(labels.iter().all(|l| *l == NORMAL));
    }

    #[test]
    fn test_small_batch_is_insufficient() {
        let batch = clustered_batch()[..5].to_vec();
        let err = OutlierScorer::default().fit_and_score(&batch).unwrap_err();
        assert!(matches!(err, AnalyticsError::InsufficientData(_)));
    }

    #[test]
    fn test_non_finite_values_are_zeroed() {
        let mut batch = clustered_batch();
        batch[3][4] = f64::NAN;
        let scores = OutlierScorer::default().anomaly_scores(&batch).unwrap();
        assert!(scores.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_scaler_standardizes_columns() {
        let batch = vec![[1.0; FEATURE_COUNT], [3.0; FEATURE_COUNT]];
        let scaler = StandardScaler::fit(&batch);
        let scaled = scaler.transform(&batch[0]);
        assert!(scaled.iter().all(|v| (v + 1.0).abs() < 1e-9));

        let constant = vec![[5.0; FEATURE_COUNT]; 3];
        let scaler = StandardScaler::fit(&constant);
        assert!(scaler.transform(&constant[0]).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_average_path_length() {
        assert_eq!(average_path_length(1), 0.0);
        assert_eq!(average_path_length(2), 1.0);
        // c(256) ~ 10.24
        assert!((average_path_length(256) - 10.24).abs() < 0.05);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 50.0), 3.0);
        assert!((percentile(&values, 90.0) - 4.6).abs() < 1e-9);
        assert_eq!(percentile(&values, 100.0), 5.0);
    }

    #[test]
    fn test_feature_vector_order() {
        let metrics = SessionMetrics {
            reaction_mean: 0.6,
            reaction_std: 0.1,
            reaction_min: 0.4,
            reaction_max: 0.9,
            attention_mean: 72.0,
            attention_std: 9.0,
            obstacles_avoided: 3,
            obstacles_hit: 1,
            distractions_ignored: 2,
            distractions_triggered: 2,
            ..Default::default()
        };
        let v = feature_vector(&metrics);
        assert_eq!(v[0], 0.6);
        assert!((v[2] - 0.5).abs() < 1e-9);
        assert_eq!(v[3], 72.0);
        assert_eq!(v[4], 9.0);
        assert_eq!(v[5], 0.25);
        assert_eq!(v[6], 0.5);
    }
}
