//! NeuroPlay analytics - session scoring and adaptive difficulty for cognitive-training games
//!
//! Turns raw per-session gameplay telemetry into behavioral metrics, rolling
//! player progress, difficulty decisions and recommendations through a
//! deterministic pipeline: raw bag → metric extraction → progress aggregation
//! → difficulty transition → recommendation triggers.
//!
//! ## Modules
//!
//! - **Session Pipeline**: Score stored sessions and update per-player state
//! - **Cohort Analysis**: Batch reports with isolation-forest outlier flags
//! - **Player Stats**: Descriptive summaries across games

pub mod cohort;
pub mod config;
pub mod difficulty;
pub mod error;
pub mod metrics;
pub mod outlier;
pub mod pipeline;
pub mod progress;
pub mod recommendation;
pub mod stats;
pub mod store;
pub mod trend;
pub mod types;

// FFI bindings for C interop (always available for cdylib/staticlib builds)
pub mod ffi;

pub use cohort::{CohortAnalyzer, CohortOutcome, CohortReport, CohortSession};
pub use config::AnalysisConfig;
pub use difficulty::DifficultyStateMachine;
pub use error::AnalyticsError;
pub use metrics::MetricExtractor;
pub use outlier::OutlierScorer;
pub use pipeline::{
    GameProcessor, NeuroSprintProcessor, ProcessorRegistry, SessionOutcome, SessionPipeline,
};
pub use progress::ProgressAggregator;
pub use recommendation::RecommendationEngine;
pub use store::{InMemoryStore, SessionStore};
pub use types::{
    DifficultyLevel, GameSession, ProgressRecord, RawSessionData, Recommendation, SessionMetrics,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name stamped on exported reports
pub const PRODUCER_NAME: &str = "neuroplay-analytics";
