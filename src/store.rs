//! Persistence collaborator
//!
//! The pipeline never touches a database directly. Everything it reads or
//! writes goes through [`SessionStore`], so a SQL backend, a remote service or
//! the bundled [`InMemoryStore`] can sit behind it.

use crate::error::AnalyticsError;
use crate::types::{
    GameSession, ProgressRecord, Recommendation, SessionMetrics, SessionSummary, TransitionRecord,
};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Result of a compare-and-swap progress write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressWrite {
    /// Stored; carries the new revision
    Stored(u64),
    /// Another writer got there first; the record was not stored
    Conflict { current_revision: u64 },
}

/// Storage interface used by the session pipeline.
///
/// Implementations must be Send + Sync; the pipeline is shared across threads.
pub trait SessionStore: Send + Sync {
    /// Fetch a persisted session envelope
    fn get_session(&self, session_id: &str) -> Result<GameSession, AnalyticsError>;

    /// Attach derived metrics to a session, replacing any earlier ones
    fn upsert_session_metrics(
        &self,
        session_id: &str,
        metrics: &SessionMetrics,
    ) -> Result<(), AnalyticsError>;

    /// A player's processed sessions for one game, oldest first by start time
    fn session_history(
        &self,
        player_id: &str,
        game_name: &str,
    ) -> Result<Vec<SessionSummary>, AnalyticsError>;

    fn get_progress(&self, player_id: &str) -> Result<Option<ProgressRecord>, AnalyticsError>;

    /// Store `record` only if the persisted revision still equals
    /// `record.revision`. A missing record has revision 0. On success the
    /// stored revision is bumped by one. A record without a player id is
    /// rejected with [`AnalyticsError::Storage`].
    fn upsert_progress(&self, record: &ProgressRecord) -> Result<ProgressWrite, AnalyticsError>;

    fn append_recommendation(&self, recommendation: &Recommendation) -> Result<(), AnalyticsError>;

    fn append_transition(
        &self,
        player_id: &str,
        transition: &TransitionRecord,
    ) -> Result<(), AnalyticsError>;
}

#[derive(Debug, Clone)]
struct StoredSession {
    session: GameSession,
    metrics: Option<SessionMetrics>,
}

#[derive(Debug, Default)]
struct Tables {
    sessions: HashMap<String, StoredSession>,
    progress: HashMap<String, ProgressRecord>,
    recommendations: Vec<Recommendation>,
    transitions: Vec<(String, TransitionRecord)>,
}

/// Process-local store backed by hash maps
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-loaded with session envelopes
    pub fn with_sessions(sessions: impl IntoIterator<Item = GameSession>) -> Self {
        let store = Self::new();
        for session in sessions {
            store.insert_session(session);
        }
        store
    }

    /// Insert or replace a session envelope. Replacing drops stored metrics.
    pub fn insert_session(&self, session: GameSession) {
        self.tables.write().sessions.insert(
            session.id.clone(),
            StoredSession {
                session,
                metrics: None,
            },
        );
    }

    /// All of a player's sessions, oldest first
    pub fn player_sessions(&self, player_id: &str) -> Vec<GameSession> {
        let tables = self.tables.read();
        let mut sessions: Vec<GameSession> = tables
            .sessions
            .values()
            .filter(|s| s.session.player_id == player_id)
            .map(|s| s.session.clone())
            .collect();
        sessions.sort_by(|a, b| a.started_at.cmp(&b.started_at).then(a.id.cmp(&b.id)));
        sessions
    }

    pub fn session_metrics(&self, session_id: &str) -> Option<SessionMetrics> {
        self.tables
            .read()
            .sessions
            .get(session_id)
            .and_then(|s| s.metrics.clone())
    }

    pub fn recommendations_for(&self, player_id: &str) -> Vec<Recommendation> {
        self.tables
            .read()
            .recommendations
            .iter()
            .filter(|r| r.player_id == player_id)
            .cloned()
            .collect()
    }

    pub fn transitions_for(&self, player_id: &str) -> Vec<TransitionRecord> {
        self.tables
            .read()
            .transitions
            .iter()
            .filter(|(player, _)| player == player_id)
            .map(|(_, t)| t.clone())
            .collect()
    }
}

impl SessionStore for InMemoryStore {
    fn get_session(&self, session_id: &str) -> Result<GameSession, AnalyticsError> {
        self.tables
            .read()
            .sessions
            .get(session_id)
            .map(|s| s.session.clone())
            .ok_or_else(|| AnalyticsError::not_found("session", session_id))
    }

    fn upsert_session_metrics(
        &self,
        session_id: &str,
        metrics: &SessionMetrics,
    ) -> Result<(), AnalyticsError> {
        let mut tables = self.tables.write();
        let stored = tables
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| AnalyticsError::not_found("session", session_id))?;
        stored.metrics = Some(metrics.clone());
        Ok(())
    }

    fn session_history(
        &self,
        player_id: &str,
        game_name: &str,
    ) -> Result<Vec<SessionSummary>, AnalyticsError> {
        let tables = self.tables.read();
        let mut history: Vec<SessionSummary> = tables
            .sessions
            .values()
            .filter(|s| s.session.player_id == player_id && s.session.game_name == game_name)
            .filter_map(|s| {
                s.metrics
                    .as_ref()
                    .map(|m| SessionSummary::new(&s.session, m.clone()))
            })
            .collect();
        history.sort_by(|a, b| {
            a.started_at
                .cmp(&b.started_at)
                .then_with(|| a.session_id.cmp(&b.session_id))
        });
        Ok(history)
    }

    fn get_progress(&self, player_id: &str) -> Result<Option<ProgressRecord>, AnalyticsError> {
        Ok(self.tables.read().progress.get(player_id).cloned())
    }

    fn upsert_progress(&self, record: &ProgressRecord) -> Result<ProgressWrite, AnalyticsError> {
        if record.player_id.is_empty() {
            return Err(AnalyticsError::Storage(
                "progress record has no player id".to_string(),
            ));
        }
        let mut tables = self.tables.write();
        let current_revision = tables
            .progress
            .get(&record.player_id)
            .map(|r| r.revision)
            .unwrap_or(0);

        if current_revision != record.revision {
            return Ok(ProgressWrite::Conflict { current_revision });
        }

        let mut stored = record.clone();
        stored.revision = current_revision + 1;
        let revision = stored.revision;
        tables.progress.insert(record.player_id.clone(), stored);
        Ok(ProgressWrite::Stored(revision))
    }

    fn append_recommendation(&self, recommendation: &Recommendation) -> Result<(), AnalyticsError> {
        self.tables
            .write()
            .recommendations
            .push(recommendation.clone());
        Ok(())
    }

    fn append_transition(
        &self,
        player_id: &str,
        transition: &TransitionRecord,
    ) -> Result<(), AnalyticsError> {
        self.tables
            .write()
            .transitions
            .push((player_id.to_string(), transition.clone()));
        Ok(())
    }
}
