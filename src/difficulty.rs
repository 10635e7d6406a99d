//! Adaptive difficulty state machine
//!
//! Scores a session on four performance criteria and moves the player at most
//! one tier along easy ↔ medium ↔ hard.

use crate::config::DifficultyThresholds;
use crate::types::{DifficultyLevel, SessionMetrics, TransitionRecord};
use chrono::{DateTime, Utc};

/// Rule-based difficulty state machine
#[derive(Debug, Clone, Default)]
pub struct DifficultyStateMachine {
    thresholds: DifficultyThresholds,
}

impl DifficultyStateMachine {
    pub fn new(thresholds: DifficultyThresholds) -> Self {
        Self { thresholds }
    }

    /// Count of performance criteria met by the session (0-4)
    pub fn performance_score(&self, metrics: &SessionMetrics) -> u8 {
        let t = &self.thresholds;
        [
            metrics.obstacle_avoidance_rate > t.avoidance_rate,
            metrics.distraction_resistance_rate > t.resistance_rate,
            metrics.attention_mean > t.attention_mean,
            metrics.reaction_mean < t.fast_reaction_secs,
        ]
        .iter()
        .filter(|met| **met)
        .count() as u8
    }

    /// Decide the next tier for a player.
    ///
    /// Rules are checked top to bottom and the first match wins:
    /// easy→medium, medium→hard, medium→easy, hard→medium. A change produces a
    /// [`TransitionRecord`] stamped with `at` and the triggering session.
    pub fn transition(
        &self,
        level: DifficultyLevel,
        metrics: &SessionMetrics,
        session_id: &str,
        at: DateTime<Utc>,
    ) -> (DifficultyLevel, Option<TransitionRecord>) {
        let score = self.performance_score(metrics);
        let t = &self.thresholds;

        let next = match level {
            DifficultyLevel::Easy if score >= t.promote_to_medium_score => DifficultyLevel::Medium,
            DifficultyLevel::Medium if score >= t.promote_to_hard_score => DifficultyLevel::Hard,
            DifficultyLevel::Medium if score <= t.demote_to_easy_score => DifficultyLevel::Easy,
            DifficultyLevel::Hard if score <= t.demote_to_medium_score => DifficultyLevel::Medium,
            unchanged => unchanged,
        };

        if next == level {
            return (level, None);
        }

        tracing::debug!(
            session_id,
            score,
            from = %level,
            to = %next,
            "difficulty transition"
        );

        let record = TransitionRecord {
            at,
            session_id: session_id.to_string(),
            from: level,
            to: next,
        };
        (next, Some(record))
    }
}
