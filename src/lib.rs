//! Clinical EMG analysis core.
//!
//! ## Pipeline
//!
//! - **C3D Reader** ([`c3d`]): parses C3D motion-capture/biosignal files
//! - **Signal Conditioner** ([`signal`]): band-pass filter, rectify, envelope
//! - **Contraction Detector** ([`contraction`]): threshold regions, merge, refractory, classify
//! - **Channel Analytics** ([`analytics`]): RMS/MAV/MPF/MDF, fatigue index, temporal stats
//! - **MVC Estimator** ([`mvc`]): threshold resolution and backend calibration
//! - **Scoring Engine** ([`scoring`]): compliance, symmetry, effort, game, adherence
//! - **Session Orchestrator** ([`session`]): state machine wiring the pipeline end to end
//! - **Artifact Store** ([`store`]): Postgres persistence
//! - **Analytics Cache** ([`cache`]): in-process TTL-bounded hot store

pub mod analytics;
pub mod api;
pub mod c3d;
pub mod cache;
pub mod config;
pub mod contraction;
pub mod mvc;
pub mod scoring;
pub mod session;
pub mod signal;
pub mod store;
pub mod types;

pub use config::EmgConfig;

pub use types::{
    BfrMeasurementMethod, BfrMonitoring, ChannelAnalytics, MvcEstimationMethod,
    PerChannelContraction, PerformanceScores, ProcessingParameters, Rate01, Score0100, Session,
    SessionError, SessionSettings, SessionStatus,
};

pub use session::{Orchestrator, OrchestratorError};
pub use store::{ArtifactStore, StoreError};
pub use cache::AnalyticsCache;
