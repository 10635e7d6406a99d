//! Session, progress and recommendation types
//!
//! These records flow between the metric extractor, the progress aggregator,
//! the difficulty state machine, the recommendation engine and the storage
//! collaborator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Raw per-session telemetry from the game client
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawSessionData {
    /// Reaction time samples in seconds, in play order
    pub reaction_times: Vec<f64>,
    /// Attention samples on a 0-100 scale, in play order
    pub attention_scores: Vec<f64>,
    pub obstacles_avoided: u32,
    pub obstacles_hit: u32,
    pub distractions_ignored: u32,
    pub distractions_triggered: u32,
}

/// Heuristic attentional markers for a single session. Not a diagnosis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorFlags {
    pub high_reaction_variability: bool,
    pub attention_lapses: bool,
    pub distractibility: bool,
    pub inconsistent_performance: bool,
}

impl IndicatorFlags {
    /// Number of flags that are set
    pub fn count(&self) -> u32 {
        [
            self.high_reaction_variability,
            self.attention_lapses,
            self.distractibility,
            self.inconsistent_performance,
        ]
        .iter()
        .filter(|flag| **flag)
        .count() as u32
    }
}

/// Metrics derived from one session's raw telemetry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionMetrics {
    // Reaction time (seconds)
    pub reaction_mean: f64,
    pub reaction_std: f64,
    pub reaction_min: f64,
    pub reaction_max: f64,

    // Attention (0-100)
    pub attention_mean: f64,
    pub attention_std: f64,
    /// Consecutive samples falling by more than the drop threshold
    pub attention_drops: u32,

    // Obstacles and distractions
    pub obstacles_avoided: u32,
    pub obstacles_hit: u32,
    /// Percentage of obstacles avoided (0-100)
    pub obstacle_avoidance_rate: f64,
    pub distractions_ignored: u32,
    pub distractions_triggered: u32,
    /// Percentage of distractions ignored (0-100)
    pub distraction_resistance_rate: f64,

    pub indicators: IndicatorFlags,
}

impl SessionMetrics {
    /// Spread between the slowest and fastest reaction
    pub fn reaction_range(&self) -> f64 {
        self.reaction_max - self.reaction_min
    }

    /// Share of obstacles that were hit (0-1)
    pub fn obstacle_hit_ratio(&self) -> f64 {
        ratio(self.obstacles_hit, self.obstacles_avoided + self.obstacles_hit)
    }

    /// Share of distractions that were triggered (0-1)
    pub fn distraction_trigger_ratio(&self) -> f64 {
        ratio(
            self.distractions_triggered,
            self.distractions_ignored + self.distractions_triggered,
        )
    }
}

fn ratio(part: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Game difficulty tier
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyLevel {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl DifficultyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            DifficultyLevel::Easy => "easy",
            DifficultyLevel::Medium => "medium",
            DifficultyLevel::Hard => "hard",
        }
    }

    /// Position on the easy-medium-hard ladder
    pub fn rank(&self) -> u8 {
        match self {
            DifficultyLevel::Easy => 0,
            DifficultyLevel::Medium => 1,
            DifficultyLevel::Hard => 2,
        }
    }
}

impl fmt::Display for DifficultyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DifficultyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(DifficultyLevel::Easy),
            "medium" => Ok(DifficultyLevel::Medium),
            "hard" => Ok(DifficultyLevel::Hard),
            other => Err(format!("unknown difficulty level: {}", other)),
        }
    }
}

/// A recorded difficulty change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub at: DateTime<Utc>,
    /// Session whose metrics triggered the change
    pub session_id: String,
    pub from: DifficultyLevel,
    pub to: DifficultyLevel,
}

/// Persisted session envelope, owned by the storage collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: String,
    pub player_id: String,
    pub game_name: String,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_minutes: Option<f64>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub completed: bool,
    #[serde(default = "default_session_difficulty")]
    pub difficulty: DifficultyLevel,
    /// Untyped telemetry bag as uploaded by the client
    #[serde(default = "empty_object")]
    pub session_data: serde_json::Value,
}

fn default_session_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}

/// One entry of a player's processed session history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub started_at: DateTime<Utc>,
    pub duration_minutes: f64,
    pub score: i64,
    pub metrics: SessionMetrics,
}

impl SessionSummary {
    pub fn new(session: &GameSession, metrics: SessionMetrics) -> Self {
        Self {
            session_id: session.id.clone(),
            started_at: session.started_at,
            duration_minutes: session.duration_minutes.unwrap_or(0.0),
            score: session.score,
            metrics,
        }
    }
}

/// Rolling per-player progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub player_id: String,

    pub total_sessions: u32,
    pub total_playtime_minutes: f64,
    pub highest_score: i64,

    pub avg_attention_score: f64,
    /// Least-squares slope of recent attention means
    pub attention_trend: f64,
    pub avg_reaction_time: f64,
    /// Least-squares slope of recent reaction means
    pub reaction_time_trend: f64,

    /// Avoidance percentage over cumulative counts
    pub overall_obstacle_avoidance_rate: f64,
    /// Resistance percentage over cumulative counts
    pub overall_distraction_resistance_rate: f64,

    pub current_difficulty: DifficultyLevel,
    pub difficulty_history: Vec<TransitionRecord>,

    /// Coarse 0-100 heuristic from the newest session's indicator flags.
    /// Not clinically validated.
    pub adhd_likelihood_score: f64,
    /// 0-100, higher means steadier attention in the newest session
    pub attention_consistency_score: f64,

    pub last_session: Option<String>,

    /// Store-managed revision used for compare-and-swap
    pub revision: u64,
}

impl ProgressRecord {
    /// Fresh record for a player with no processed sessions
    pub fn new(player_id: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            ..Default::default()
        }
    }
}

/// Recommendation category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationCategory {
    Gameplay,
    Difficulty,
    Exercise,
    Schedule,
    General,
}

/// A recommendation triggered by a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: String,
    pub player_id: String,
    pub title: String,
    pub description: String,
    /// Higher is more urgent
    pub priority: i32,
    pub category: RecommendationCategory,
    pub triggering_session: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub implemented: bool,
    #[serde(default)]
    pub implemented_at: Option<DateTime<Utc>>,
}

impl Recommendation {
    /// Mark the recommendation as applied by the player or a carer
    pub fn mark_implemented(&mut self, at: DateTime<Utc>) {
        self.implemented = true;
        self.implemented_at = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_difficulty_serialization() {
        let json = serde_json::to_string(&DifficultyLevel::Medium).unwrap();
        assert_eq!(json, "\"medium\"");

        let parsed: DifficultyLevel = serde_json::from_str("\"hard\"").unwrap();
        assert_eq!(parsed, DifficultyLevel::Hard);
        assert_eq!("Easy".parse::<DifficultyLevel>(), Ok(DifficultyLevel::Easy));
        assert!("expert".parse::<DifficultyLevel>().is_err());
    }

    #[test]
    fn test_indicator_count() {
        let flags = IndicatorFlags {
            high_reaction_variability: true,
            attention_lapses: false,
            distractibility: true,
            inconsistent_performance: true,
        };
        assert_eq!(flags.count(), 3);
        assert_eq!(IndicatorFlags::default().count(), 0);
    }

    #[test]
    fn test_ratios_guard_zero_totals() {
        let metrics = SessionMetrics::default();
        assert_eq!(metrics.obstacle_hit_ratio(), 0.0);
        assert_eq!(metrics.distraction_trigger_ratio(), 0.0);

        let metrics = SessionMetrics {
            obstacles_avoided: 3,
            obstacles_hit: 1,
            distractions_ignored: 1,
            distractions_triggered: 1,
            ..Default::default()
        };
        assert!((metrics.obstacle_hit_ratio() - 0.25).abs() < 1e-9);
        assert!((metrics.distraction_trigger_ratio() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_game_session_defaults() {
        let json = r#"{
            "id": "s-1",
            "player_id": "p-1",
            "game_name": "NeuroSprint",
            "started_at": "2024-03-01T10:00:00Z"
        }"#;

        let session: GameSession = serde_json::from_str(json).unwrap();
        assert_eq!(session.score, 0);
        assert_eq!(session.difficulty, DifficultyLevel::Medium);
        assert!(session.session_data.as_object().unwrap().is_empty());
        assert!(session.duration_minutes.is_none());
    }

    #[test]
    fn test_mark_implemented() {
        let mut rec = Recommendation {
            id: "r-1".to_string(),
            player_id: "p-1".to_string(),
            title: "t".to_string(),
            description: "d".to_string(),
            priority: 1,
            category: RecommendationCategory::General,
            triggering_session: None,
            created_at: Utc::now(),
            implemented: false,
            implemented_at: None,
        };
        let at = Utc::now();
        rec.mark_implemented(at);
        assert!(rec.implemented);
        assert_eq!(rec.implemented_at, Some(at));
    }
}
