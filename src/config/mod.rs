//! Process-wide configuration surface.
//!
//! A single [`EmgConfig`] loaded once at process start and read
//! everywhere through [`get`], never threaded through every function
//! signature.

use std::sync::OnceLock;
use std::time::Duration;

static CONFIG: OnceLock<EmgConfig> = OnceLock::new();

/// Process-level constants controlling signal conditioning, contraction
/// detection, MVC resolution, and scoring defaults.
#[derive(Debug, Clone)]
pub struct EmgConfig {
    pub default_sampling_rate_hz: f64,
    pub default_threshold_factor: f64,
    pub activated_threshold_factor: f64,
    pub default_min_duration_ms: f64,
    pub default_smoothing_window_ms: f64,
    pub default_mvc_threshold_percentage: f64,
    pub default_duration_threshold_ms: f64,
    pub filter_low_cutoff_hz: f64,
    pub filter_high_cutoff_hz: f64,
    pub filter_order: u32,
    pub merge_threshold_ms: f64,
    pub refractory_period_ms: f64,
    /// BFR *scoring gate* window, distinct from the wider
    /// sensor safety window on [`crate::types::BfrMonitoring`].
    pub bfr_gate_range: (f64, f64),
    pub expected_contractions_per_muscle: u32,
    pub processing_version: String,
    pub webhook_secret: Option<String>,
    pub max_file_size_bytes: u64,
    pub ingest_bucket: String,
    pub object_storage_base_url: String,
    pub worker_count: usize,
    pub cache_ttl: Duration,
    pub min_clinical_duration_seconds: f64,
    pub min_temporal_windows_required: usize,
    pub database_url: String,
    pub bind_address: String,
}

impl Default for EmgConfig {
    fn default() -> Self {
        Self {
            default_sampling_rate_hz: 1000.0,
            default_threshold_factor: 0.10,
            activated_threshold_factor: 0.05,
            default_min_duration_ms: 100.0,
            default_smoothing_window_ms: 50.0,
            default_mvc_threshold_percentage: 75.0,
            default_duration_threshold_ms: 2000.0,
            filter_low_cutoff_hz: 20.0,
            filter_high_cutoff_hz: 500.0,
            filter_order: 4,
            merge_threshold_ms: 200.0,
            refractory_period_ms: 50.0,
            bfr_gate_range: (45.0, 55.0),
            expected_contractions_per_muscle: 12,
            processing_version: "1.0.0".to_string(),
            webhook_secret: None,
            max_file_size_bytes: 50 * 1024 * 1024,
            ingest_bucket: "c3d-examples".to_string(),
            object_storage_base_url: String::new(),
            worker_count: 4,
            cache_ttl: Duration::from_secs(3600),
            min_clinical_duration_seconds: 5.0,
            min_temporal_windows_required: 3,
            database_url: String::new(),
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

impl EmgConfig {
    /// Load from environment, falling back to [`EmgConfig::default`]
    /// for anything unset. Precedence is explicit arg > env var >
    /// default; the CLI-arg layer lives in the binary, not here.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("DATABASE_URL") {
            cfg.database_url = v;
        }
        if let Ok(v) = std::env::var("BIND_ADDRESS") {
            cfg.bind_address = v;
        }
        if let Ok(v) = std::env::var("WEBHOOK_SECRET") {
            if !v.is_empty() {
                cfg.webhook_secret = Some(v);
            }
        }
        if let Ok(v) = std::env::var("MAX_FILE_SIZE") {
            cfg.max_file_size_bytes = v.parse().unwrap_or(cfg.max_file_size_bytes);
        }
        if let Ok(v) = std::env::var("INGEST_BUCKET") {
            cfg.ingest_bucket = v;
        }
        if let Ok(v) = std::env::var("OBJECT_STORAGE_BASE_URL") {
            cfg.object_storage_base_url = v;
        }
        if let Ok(v) = std::env::var("WORKER_COUNT") {
            cfg.worker_count = v.parse().unwrap_or(cfg.worker_count);
        }

        if cfg!(not(debug_assertions)) && cfg.database_url.is_empty() {
            anyhow::bail!("DATABASE_URL must be set in release builds");
        }

        Ok(cfg)
    }
}

/// Initialize the global config. Calling this more than once is a
/// startup bug elsewhere, not a crash here — it just logs and keeps
/// the first value.
pub fn init(config: EmgConfig) {
    if CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

pub fn get() -> &'static EmgConfig {
    CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

pub fn is_initialized() -> bool {
    CONFIG.get().is_some()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_constants() {
        let cfg = EmgConfig::default();
        assert_eq!(cfg.default_threshold_factor, 0.10);
        assert_eq!(cfg.activated_threshold_factor, 0.05);
        assert_eq!(cfg.bfr_gate_range, (45.0, 55.0));
        assert_eq!(cfg.expected_contractions_per_muscle, 12);
    }
}
