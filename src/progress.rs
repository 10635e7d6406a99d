//! Player progress aggregation
//!
//! Folds a player's full processed session history into one
//! [`ProgressRecord`]. Cumulative fields are recomputed from the entire history
//! on every update rather than merged incrementally, so the result depends
//! only on the inputs and never drifts.

use crate::config::ProgressSettings;
use crate::trend::guarded_slope;
use crate::types::{ProgressRecord, SessionSummary};

/// Aggregator for rolling per-player progress
#[derive(Debug, Clone, Default)]
pub struct ProgressAggregator {
    settings: ProgressSettings,
}

impl ProgressAggregator {
    pub fn new(settings: ProgressSettings) -> Self {
        Self { settings }
    }

    /// Recompute a player's progress.
    ///
    /// `current` is the stored record, or [`ProgressRecord::new`] for a
    /// player's first session. `history` is the player's processed sessions
    /// ordered oldest first and is expected to include `newest`. The player
    /// id, difficulty state, transition history and store revision are
    /// carried over from `current`.
    pub fn update(
        &self,
        current: &ProgressRecord,
        history: &[SessionSummary],
        newest: &SessionSummary,
    ) -> ProgressRecord {
        let mut record = current.clone();

        record.total_sessions = history.len() as u32;
        record.total_playtime_minutes = history.iter().map(|s| s.duration_minutes).sum();
        record.highest_score = history.iter().map(|s| s.score).max().unwrap_or(0);

        record.avg_attention_score = nonzero_mean(history.iter().map(|s| s.metrics.attention_mean));
        record.avg_reaction_time = nonzero_mean(history.iter().map(|s| s.metrics.reaction_mean));

        let (avoided, hit, ignored, triggered) =
            history
                .iter()
                .fold((0u64, 0u64, 0u64, 0u64), |(a, h, i, t), s| {
                    (
                        a + s.metrics.obstacles_avoided as u64,
                        h + s.metrics.obstacles_hit as u64,
                        i + s.metrics.distractions_ignored as u64,
                        t + s.metrics.distractions_triggered as u64,
                    )
                });
        record.overall_obstacle_avoidance_rate = cumulative_rate(avoided, hit);
        record.overall_distraction_resistance_rate = cumulative_rate(ignored, triggered);

        let (attention_trend, reaction_trend) = self.recent_trends(history);
        record.attention_trend = attention_trend;
        record.reaction_time_trend = reaction_trend;

        let newest_metrics = &newest.metrics;
        record.adhd_likelihood_score = (newest_metrics.indicators.count() as f64
            * self.settings.adhd_points_per_indicator)
            .min(100.0);
        record.attention_consistency_score =
            100.0 - (newest_metrics.attention_std * self.settings.consistency_std_scale).min(100.0);

        record.last_session = Some(newest.session_id.clone());
        record
    }

    /// Slopes over the most recent sessions, newest first.
    ///
    /// Sessions with a zero mean carry no signal and are skipped; fewer than
    /// `min_trend_points` usable values yields 0.
    fn recent_trends(&self, history: &[SessionSummary]) -> (f64, f64) {
        if history.len() < self.settings.min_trend_points {
            return (0.0, 0.0);
        }

        let recent = history.iter().rev().take(self.settings.trend_window);
        let (attention, reaction): (Vec<f64>, Vec<f64>) = recent
            .map(|s| (s.metrics.attention_mean, s.metrics.reaction_mean))
            .unzip();
        let attention: Vec<f64> = attention.into_iter().filter(|v| *v != 0.0).collect();
        let reaction: Vec<f64> = reaction.into_iter().filter(|v| *v != 0.0).collect();

        (
            guarded_slope(&attention, self.settings.min_trend_points),
            guarded_slope(&reaction, self.settings.min_trend_points),
        )
    }
}

fn nonzero_mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values
        .filter(|v| *v != 0.0)
        .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

fn cumulative_rate(part: u64, rest: u64) -> f64 {
    let total = part + rest;
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64 * 100.0
    }
}
