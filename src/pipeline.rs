//! Session pipeline orchestration
//!
//! Entry point for scoring a stored session. The pipeline looks up the
//! processor registered for the session's game and runs it under a
//! per-player lock; progress writes additionally go through the store's
//! compare-and-swap so that writers outside this process cannot lose updates.

use crate::config::{AnalysisConfig, NEUROSPRINT_GAME};
use crate::difficulty::DifficultyStateMachine;
use crate::error::AnalyticsError;
use crate::metrics::MetricExtractor;
use crate::progress::ProgressAggregator;
use crate::recommendation::RecommendationEngine;
use crate::store::{ProgressWrite, SessionStore};
use crate::types::{
    GameSession, ProgressRecord, RawSessionData, Recommendation, SessionMetrics, SessionSummary,
    TransitionRecord,
};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Everything produced by processing one session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedSession {
    pub session_id: String,
    pub player_id: String,
    pub metrics: SessionMetrics,
    pub progress: ProgressRecord,
    pub transition: Option<TransitionRecord>,
    pub recommendations: Vec<Recommendation>,
}

/// Result of submitting a session to the pipeline
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SessionOutcome {
    Processed(ProcessedSession),
    /// No processor is registered for the session's game
    Bypassed { session_id: String, game_name: String },
}

/// Per-game session processor
pub trait GameProcessor: Send + Sync {
    /// Game this processor handles, matched exactly against `GameSession::game_name`
    fn game_name(&self) -> &str;

    fn process(
        &self,
        session: &GameSession,
        store: &dyn SessionStore,
    ) -> Result<ProcessedSession, AnalyticsError>;
}

/// Game name → processor map
#[derive(Default, Clone)]
pub struct ProcessorRegistry {
    processors: HashMap<String, Arc<dyn GameProcessor>>,
}

impl ProcessorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in processor
    pub fn with_defaults(config: &AnalysisConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NeuroSprintProcessor::new(config)));
        registry
    }

    /// Register a processor, replacing any previous one for the same game
    pub fn register(&mut self, processor: Arc<dyn GameProcessor>) {
        self.processors
            .insert(processor.game_name().to_string(), processor);
    }

    pub fn get(&self, game_name: &str) -> Option<Arc<dyn GameProcessor>> {
        self.processors.get(game_name).cloned()
    }

    /// Registered game names, sorted
    pub fn games(&self) -> Vec<&str> {
        let mut games: Vec<&str> = self.processors.keys().map(String::as_str).collect();
        games.sort_unstable();
        games
    }
}

/// Processor for NeuroSprint sessions.
///
/// Stages:
/// 1. Parse the raw bag and extract metrics
/// 2. Persist metrics on the session
/// 3. Load the player's processed history
/// 4. Aggregate progress
/// 5. Run the difficulty transition
/// 6. Persist progress (compare-and-swap), the transition and recommendations
pub struct NeuroSprintProcessor {
    extractor: MetricExtractor,
    aggregator: ProgressAggregator,
    difficulty: DifficultyStateMachine,
    recommendations: RecommendationEngine,
    max_update_retries: u32,
}

impl Default for NeuroSprintProcessor {
    fn default() -> Self {
        Self::new(&AnalysisConfig::default())
    }
}

impl NeuroSprintProcessor {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            extractor: MetricExtractor::new(config.indicators.clone()),
            aggregator: ProgressAggregator::new(config.progress.clone()),
            difficulty: DifficultyStateMachine::new(config.difficulty.clone()),
            recommendations: RecommendationEngine::new(config.recommendations.clone()),
            max_update_retries: config.pipeline.max_update_retries,
        }
    }

    /// Stages 3-6, repeated from a fresh read whenever the progress write
    /// loses a compare-and-swap race.
    fn commit_progress(
        &self,
        session: &GameSession,
        metrics: &SessionMetrics,
        store: &dyn SessionStore,
    ) -> Result<(ProgressRecord, Option<TransitionRecord>), AnalyticsError> {
        let player_id = session.player_id.as_str();
        let newest = SessionSummary::new(session, metrics.clone());
        let attempts = self.max_update_retries + 1;

        for attempt in 1..=attempts {
            // Stage 3: Load history
            let history = store.session_history(player_id, &session.game_name)?;
            tracing::debug!(player_id, sessions = history.len(), "loaded history");

            // Stage 4: Aggregate progress
            let current = store
                .get_progress(player_id)?
                .unwrap_or_else(|| ProgressRecord::new(player_id));
            let mut progress = self.aggregator.update(&current, &history, &newest);

            // Stage 5: Difficulty transition
            let (level, transition) = self.difficulty.transition(
                current.current_difficulty,
                metrics,
                &session.id,
                Utc::now(),
            );
            if let Some(record) = &transition {
                progress.current_difficulty = level;
                progress.difficulty_history.push(record.clone());
            }

            // Stage 6: Persist
            match store.upsert_progress(&progress)? {
                ProgressWrite::Stored(revision) => {
                    progress.revision = revision;
                    if let Some(record) = &transition {
                        store.append_transition(player_id, record)?;
                        tracing::info!(
                            player_id,
                            session_id = %session.id,
                            from = %record.from,
                            to = %record.to,
                            "difficulty changed"
                        );
                    }
                    return Ok((progress, transition));
                }
                ProgressWrite::Conflict { current_revision } => {
                    tracing::warn!(
                        player_id,
                        attempt,
                        expected = progress.revision,
                        current_revision,
                        "progress write conflict, recomputing"
                    );
                }
            }
        }

        Err(AnalyticsError::ConcurrentUpdateConflict {
            player_id: player_id.to_string(),
            attempts,
        })
    }
}

impl GameProcessor for NeuroSprintProcessor {
    fn game_name(&self) -> &str {
        NEUROSPRINT_GAME
    }

    fn process(
        &self,
        session: &GameSession,
        store: &dyn SessionStore,
    ) -> Result<ProcessedSession, AnalyticsError> {
        // Stage 1: Parse and extract
        let raw = RawSessionData::from_value(&session.session_data)?;
        let metrics = self.extractor.extract(&raw);
        tracing::debug!(session_id = %session.id, "extracted metrics");

        // Stage 2: Persist metrics
        store.upsert_session_metrics(&session.id, &metrics)?;

        let (progress, transition) = self.commit_progress(session, &metrics, store)?;

        let recommendations =
            self.recommendations
                .evaluate(&session.player_id, &session.id, &metrics, Utc::now());
        for recommendation in &recommendations {
            store.append_recommendation(recommendation)?;
        }
        tracing::debug!(
            session_id = %session.id,
            count = recommendations.len(),
            "stored recommendations"
        );

        Ok(ProcessedSession {
            session_id: session.id.clone(),
            player_id: session.player_id.clone(),
            metrics,
            progress,
            transition,
            recommendations,
        })
    }
}

/// Shared session pipeline.
///
/// Work for one player is serialized; different players run in parallel.
pub struct SessionPipeline {
    store: Arc<dyn SessionStore>,
    registry: ProcessorRegistry,
    player_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SessionPipeline {
    /// Pipeline with the built-in processors and default thresholds
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self::with_config(store, &AnalysisConfig::default())
    }

    pub fn with_config(store: Arc<dyn SessionStore>, config: &AnalysisConfig) -> Self {
        Self::with_registry(store, ProcessorRegistry::with_defaults(config))
    }

    pub fn with_registry(store: Arc<dyn SessionStore>, registry: ProcessorRegistry) -> Self {
        Self {
            store,
            registry,
            player_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn registry(&self) -> &ProcessorRegistry {
        &self.registry
    }

    /// Score a stored session and update the player's derived state.
    ///
    /// Sessions for games without a registered processor are left untouched
    /// and reported as [`SessionOutcome::Bypassed`].
    pub fn process_session(&self, session_id: &str) -> Result<SessionOutcome, AnalyticsError> {
        let session = self.store.get_session(session_id)?;

        let Some(processor) = self.registry.get(&session.game_name) else {
            tracing::debug!(session_id, game = %session.game_name, "no processor, bypassing");
            return Ok(SessionOutcome::Bypassed {
                session_id: session.id,
                game_name: session.game_name,
            });
        };

        let lock = self.player_lock(&session.player_id);
        let result = {
            let _guard = lock.lock();
            processor.process(&session, self.store.as_ref())
        };
        self.release_player_lock(&session.player_id, lock);

        let processed = result?;
        tracing::info!(
            session_id,
            player_id = %processed.player_id,
            total_sessions = processed.progress.total_sessions,
            difficulty = %processed.progress.current_difficulty,
            "session processed"
        );
        Ok(SessionOutcome::Processed(processed))
    }

    fn player_lock(&self, player_id: &str) -> Arc<Mutex<()>> {
        self.player_locks
            .lock()
            .entry(player_id.to_string())
            .or_default()
            .clone()
    }

    /// Drop the player's lock entry unless another caller is waiting on it.
    fn release_player_lock(&self, player_id: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.player_locks.lock();
        // The map and `lock` hold the only references.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(player_id);
        }
    }
}
