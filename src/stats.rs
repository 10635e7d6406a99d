//! Player and per-game statistics
//!
//! Descriptive summaries over raw session envelopes. Unlike the session
//! pipeline these need no derived metrics and work for any game.

use crate::types::{DifficultyLevel, GameSession};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// Number of sessions listed under recent activity
pub const RECENT_ACTIVITY_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub game_name: String,
    pub started_at: DateTime<Utc>,
    pub score: i64,
    pub difficulty: DifficultyLevel,
}

/// Overview of a player's activity across every game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStats {
    pub total_sessions: usize,
    pub total_games_played: usize,
    pub total_playtime_minutes: f64,
    pub average_session_duration: f64,
    pub average_score: f64,
    pub highest_score: i64,
    pub games_completed: usize,
    /// Percentage of sessions marked completed (0-100)
    pub completion_rate: f64,
    /// Session count per game name
    pub game_distribution: BTreeMap<String, usize>,
    /// Newest first
    pub recent_activity: Vec<ActivityEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScorePoint {
    pub started_at: DateTime<Utc>,
    pub score: i64,
}

/// Performance summary for one game
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GamePerformance {
    pub game_name: String,
    pub total_sessions: usize,
    pub total_playtime_minutes: f64,
    pub average_session_duration: f64,
    pub average_score: f64,
    pub highest_score: i64,
    /// Oldest first
    pub score_progression: Vec<ScorePoint>,
    pub completion_rate: f64,
    pub difficulty_distribution: BTreeMap<DifficultyLevel, usize>,
}

/// Summarize a player's sessions. `None` when there are none.
pub fn player_stats(sessions: &[GameSession]) -> Option<PlayerStats> {
    if sessions.is_empty() {
        return None;
    }
    let totals = Totals::of(sessions);

    let mut game_distribution = BTreeMap::new();
    for session in sessions {
        *game_distribution
            .entry(session.game_name.clone())
            .or_insert(0) += 1;
    }

    let mut newest_first: Vec<&GameSession> = sessions.iter().collect();
    newest_first.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    let recent_activity = newest_first
        .into_iter()
        .take(RECENT_ACTIVITY_LIMIT)
        .map(|s| ActivityEntry {
            game_name: s.game_name.clone(),
            started_at: s.started_at,
            score: s.score,
            difficulty: s.difficulty,
        })
        .collect();

    Some(PlayerStats {
        total_sessions: sessions.len(),
        total_games_played: game_distribution.len(),
        total_playtime_minutes: totals.playtime,
        average_session_duration: totals.average_duration,
        average_score: totals.average_score,
        highest_score: totals.highest_score,
        games_completed: totals.completed,
        completion_rate: totals.completion_rate,
        game_distribution,
        recent_activity,
    })
}

/// Summarize the sessions of one game. Sessions of other games are ignored;
/// `None` when none remain.
pub fn game_performance(game_name: &str, sessions: &[GameSession]) -> Option<GamePerformance> {
    let sessions: Vec<GameSession> = sessions
        .iter()
        .filter(|s| s.game_name == game_name)
        .cloned()
        .collect();
    if sessions.is_empty() {
        return None;
    }
    let totals = Totals::of(&sessions);

    let mut score_progression: Vec<ScorePoint> = sessions
        .iter()
        .map(|s| ScorePoint {
            started_at: s.started_at,
            score: s.score,
        })
        .collect();
    score_progression.sort_by(|a, b| a.started_at.cmp(&b.started_at));

    let mut difficulty_distribution = BTreeMap::new();
    for session in &sessions {
        *difficulty_distribution.entry(session.difficulty).or_insert(0) += 1;
    }

    Some(GamePerformance {
        game_name: game_name.to_string(),
        total_sessions: sessions.len(),
        total_playtime_minutes: totals.playtime,
        average_session_duration: totals.average_duration,
        average_score: totals.average_score,
        highest_score: totals.highest_score,
        score_progression,
        completion_rate: totals.completion_rate,
        difficulty_distribution,
    })
}

struct Totals {
    playtime: f64,
    average_duration: f64,
    average_score: f64,
    highest_score: i64,
    completed: usize,
    completion_rate: f64,
}

impl Totals {
    /// `sessions` must be non-empty. Sessions without a duration are left out
    /// of the duration figures.
    fn of(sessions: &[GameSession]) -> Self {
        let durations: Vec<f64> = sessions.iter().filter_map(|s| s.duration_minutes).collect();
        let playtime: f64 = durations.iter().sum();
        let average_duration = if durations.is_empty() {
            0.0
        } else {
            playtime / durations.len() as f64
        };

        let n = sessions.len() as f64;
        let completed = sessions.iter().filter(|s| s.completed).count();

        Self {
            playtime,
            average_duration,
            average_score: sessions.iter().map(|s| s.score as f64).sum::<f64>() / n,
            highest_score: sessions.iter().map(|s| s.score).max().unwrap_or(0),
            completed,
            completion_rate: completed as f64 / n * 100.0,
        }
    }
}
