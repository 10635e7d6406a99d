//! End-to-end difficulty progression through the session pipeline

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use neuroplay_analytics::difficulty::DifficultyStateMachine;
use neuroplay_analytics::metrics::MetricExtractor;
use neuroplay_analytics::{
    DifficultyLevel, GameSession, InMemoryStore, RawSessionData, SessionOutcome, SessionPipeline,
    SessionStore,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Meets avoidance, resistance and attention but reacts slowly: score 3
fn three_criteria() -> Value {
    json!({
        "reaction_times": [0.9, 0.95, 0.85],
        "attention_scores": [74, 76, 75],
        "obstacles_avoided": 18,
        "obstacles_hit": 2,
        "distractions_ignored": 8,
        "distractions_triggered": 2
    })
}

/// Meets all four criteria: score 4
fn four_criteria() -> Value {
    json!({
        "reaction_times": [0.5, 0.55, 0.6],
        "attention_scores": [80, 82, 81],
        "obstacles_avoided": 19,
        "obstacles_hit": 1,
        "distractions_ignored": 9,
        "distractions_triggered": 1
    })
}

fn session(n: i64, data: Value) -> GameSession {
    GameSession {
        id: format!("s-{n}"),
        player_id: "player-1".to_string(),
        game_name: "NeuroSprint".to_string(),
        started_at: Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap() + Duration::days(n),
        ended_at: None,
        duration_minutes: Some(15.0),
        score: 1000 * n,
        completed: true,
        difficulty: DifficultyLevel::Medium,
        session_data: data,
    }
}

fn performance_score(data: &Value) -> u8 {
    let raw = RawSessionData::from_value(data).unwrap();
    let metrics = MetricExtractor::default().extract(&raw);
    DifficultyStateMachine::default().performance_score(&metrics)
}

#[test]
fn fixtures_have_expected_scores() {
    assert_eq!(performance_score(&three_criteria()), 3);
    assert_eq!(performance_score(&four_criteria()), 4);
}

#[test]
fn difficulty_progresses_one_tier_at_a_time() {
    let store = Arc::new(InMemoryStore::with_sessions(vec![
        session(1, three_criteria()),
        session(2, three_criteria()),
        session(3, four_criteria()),
    ]));
    let pipeline = SessionPipeline::new(store.clone());

    let mut levels = Vec::new();
    for id in ["s-1", "s-2", "s-3"] {
        match pipeline.process_session(id).unwrap() {
            SessionOutcome::Processed(processed) => {
                levels.push(processed.progress.current_difficulty)
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    assert_eq!(
        levels,
        vec![
            DifficultyLevel::Medium,
            DifficultyLevel::Medium,
            DifficultyLevel::Hard
        ]
    );

    let progress = store.get_progress("player-1").unwrap().unwrap();
    assert_eq!(progress.total_sessions, 3);
    assert_eq!(progress.total_playtime_minutes, 45.0);
    assert_eq!(progress.highest_score, 3000);
    assert_eq!(progress.last_session.as_deref(), Some("s-3"));
    assert_eq!(progress.revision, 3);

    let path: Vec<(DifficultyLevel, DifficultyLevel, String)> = progress
        .difficulty_history
        .iter()
        .map(|t| (t.from, t.to, t.session_id.clone()))
        .collect();
    assert_eq!(
        path,
        vec![
            (DifficultyLevel::Easy, DifficultyLevel::Medium, "s-1".to_string()),
            (DifficultyLevel::Medium, DifficultyLevel::Hard, "s-3".to_string()),
        ]
    );
    assert_eq!(store.transitions_for("player-1"), progress.difficulty_history);

    // Slow reactions trigger the reaction-time advice on the first two sessions only
    let recommendations = store.recommendations_for("player-1");
    assert_eq!(recommendations.len(), 2);
    assert!(recommendations
        .iter()
        .all(|r| r.title == "Reaction Time Improvement"));
}

#[test]
fn reprocessing_a_session_overwrites_its_metrics() {
    let store = Arc::new(InMemoryStore::with_sessions(vec![session(1, three_criteria())]));
    let pipeline = SessionPipeline::new(store.clone());

    pipeline.process_session("s-1").unwrap();
    pipeline.process_session("s-1").unwrap();

    let progress = store.get_progress("player-1").unwrap().unwrap();
    assert_eq!(progress.total_sessions, 1);
    assert_eq!(progress.revision, 2);
    assert_eq!(store.session_history("player-1", "NeuroSprint").unwrap().len(), 1);
}
