//! Recommendation triggers
//!
//! Four independent threshold rules evaluated against one session's metrics.
//! Every rule that fires produces a recommendation; nothing is deduplicated
//! across sessions.

use crate::config::RecommendationThresholds;
use crate::types::{Recommendation, RecommendationCategory, SessionMetrics};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Static content of a triggered rule
struct Template {
    title: &'static str,
    description: &'static str,
    priority: i32,
    category: RecommendationCategory,
}

const SHORTER_SESSIONS: Template = Template {
    title: "Improve Focus with Shorter Sessions",
    description: "Your attention score is below average. Try playing shorter, more frequent sessions to build up your attention span gradually.",
    priority: 2,
    category: RecommendationCategory::Schedule,
};

const DISTRACTION_TRAINING: Template = Template {
    title: "Distraction Resistance Training",
    description: "You seem to be easily distracted during gameplay. Try practicing mindfulness exercises for 5 minutes before playing to improve your ability to ignore distractions.",
    priority: 3,
    category: RecommendationCategory::Exercise,
};

const REACTION_TRAINING: Template = Template {
    title: "Reaction Time Improvement",
    description: "Your reaction time is slower than average. Try the 'Quick Reactions' mini-game to improve your response speed.",
    priority: 2,
    category: RecommendationCategory::Gameplay,
};

const CONSISTENCY_TRAINING: Template = Template {
    title: "Consistency Training",
    description: "Your attention levels fluctuate significantly during gameplay. Focus on maintaining consistent attention rather than achieving high scores.",
    priority: 1,
    category: RecommendationCategory::Gameplay,
};

/// Rule engine producing recommendations for a processed session
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    thresholds: RecommendationThresholds,
}

impl RecommendationEngine {
    pub fn new(thresholds: RecommendationThresholds) -> Self {
        Self { thresholds }
    }

    /// Evaluate all rules in order and return one recommendation per rule
    /// that fires.
    pub fn evaluate(
        &self,
        player_id: &str,
        session_id: &str,
        metrics: &SessionMetrics,
        at: DateTime<Utc>,
    ) -> Vec<Recommendation> {
        let t = &self.thresholds;
        let rules = [
            (metrics.attention_mean < t.low_attention_mean, &SHORTER_SESSIONS),
            (
                metrics.distraction_resistance_rate < t.low_resistance_rate,
                &DISTRACTION_TRAINING,
            ),
            (metrics.reaction_mean > t.slow_reaction_secs, &REACTION_TRAINING),
            (metrics.attention_std > t.high_attention_std, &CONSISTENCY_TRAINING),
        ];

        rules
            .into_iter()
            .filter(|(fired, _)| *fired)
            .map(|(_, template)| Recommendation {
                id: Uuid::new_v4().to_string(),
                player_id: player_id.to_string(),
                title: template.title.to_string(),
                description: template.description.to_string(),
                priority: template.priority,
                category: template.category,
                triggering_session: Some(session_id.to_string()),
                created_at: at,
                implemented: false,
                implemented_at: None,
            })
            .collect()
    }
}
