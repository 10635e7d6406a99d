//! Score a short NeuroSprint history and print the resulting progress

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use neuroplay_analytics::{
    DifficultyLevel, GameSession, InMemoryStore, SessionOutcome, SessionPipeline,
};
use serde_json::json;

fn main() {
    let start = Utc.with_ymd_and_hms(2024, 1, 15, 16, 0, 0).unwrap();
    let bags = [
        json!({
            "reaction_times": [0.62, 0.58, 0.66, 0.61],
            "attention_scores": [72, 75, 71, 74],
            "obstacles_avoided": 17, "obstacles_hit": 3,
            "distractions_ignored": 8, "distractions_triggered": 2
        }),
        json!({
            "reaction_times": [0.55, 0.52, 0.57],
            "attention_scores": [78, 80, 79],
            "obstacles_avoided": 19, "obstacles_hit": 1,
            "distractions_ignored": 9, "distractions_triggered": 1
        }),
    ];

    let sessions: Vec<GameSession> = bags
        .into_iter()
        .enumerate()
        .map(|(i, bag)| GameSession {
            id: format!("demo-{}", i + 1),
            player_id: "demo-player".to_string(),
            game_name: "NeuroSprint".to_string(),
            started_at: start + Duration::days(i as i64),
            ended_at: None,
            duration_minutes: Some(12.0),
            score: 1200 + 150 * i as i64,
            completed: true,
            difficulty: DifficultyLevel::Easy,
            session_data: bag,
        })
        .collect();
    let ids: Vec<String> = sessions.iter().map(|s| s.id.clone()).collect();

    let pipeline = SessionPipeline::new(Arc::new(InMemoryStore::with_sessions(sessions)));

    for id in ids {
        match pipeline.process_session(&id) {
            Ok(SessionOutcome::Processed(processed)) => {
                match serde_json::to_string_pretty(&processed.progress) {
                    Ok(json) => println!("{json}"),
                    Err(e) => eprintln!("Error: {e:?}"),
                }
            }
            Ok(other) => println!("{other:?}"),
            Err(e) => eprintln!("Error: {e:?}"),
        }
    }
}
