use std::path::PathBuf;
use std::time::Duration;

use facegate_core::liveness::LivenessThresholds;
use facegate_core::{DetectorOptions, LivenessMode, SessionConfig};
use serde::Serialize;

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory containing the extractor's weight files.
    pub model_dir: PathBuf,
    /// Base URL of the verification backend (no trailing path).
    pub backend_url: String,
    /// Auth token sent with every verification request.
    pub auth_token: String,
    /// Location/address identifier sent with every verification request.
    pub address: String,
    /// Token the session's QR code must decode to.
    pub expected_qr: String,
    /// Maximum Euclidean descriptor distance for a positive identity match.
    pub match_threshold: f32,
    pub ear_close_threshold: f32,
    pub ear_open_threshold: f32,
    pub mar_open_threshold: f32,
    /// Liveness sliding window length, in frames.
    pub liveness_window_frames: usize,
    pub liveness_mode: LivenessMode,
    pub baseline_timeout_secs: u64,
    pub liveness_timeout_secs: u64,
    /// Failed dual-check attempts allowed before the session fails.
    pub dual_check_retries: u32,
    /// Upper bound on model loading before giving up with `ModelLoadFailure`.
    pub model_load_timeout_secs: u64,
    pub backend_timeout_secs: u64,
    pub detector_input_size: u32,
    pub detector_score_threshold: f32,
}

impl Default for Config {
    fn default() -> Self {
        let session = SessionConfig::default();
        Self {
            model_dir: default_model_dir(),
            backend_url: "http://127.0.0.1:8000".to_string(),
            auth_token: "demo_token".to_string(),
            address: "unknown".to_string(),
            expected_qr: session.expected_qr,
            match_threshold: session.match_threshold,
            ear_close_threshold: session.liveness.ear_close,
            ear_open_threshold: session.liveness.ear_open,
            mar_open_threshold: session.liveness.mar_open,
            liveness_window_frames: session.liveness.window_frames,
            liveness_mode: session.liveness_mode,
            baseline_timeout_secs: session.baseline_timeout_ms / 1000,
            liveness_timeout_secs: session.liveness_timeout_ms / 1000,
            dual_check_retries: session.dual_check_retries,
            model_load_timeout_secs: 5,
            backend_timeout_secs: 15,
            detector_input_size: session.detector.input_size,
            detector_score_threshold: session.detector.score_threshold,
        }
    }
}

impl Config {
    /// Load configuration from `FACEGATE_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            model_dir: std::env::var("FACEGATE_MODEL_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.model_dir),
            backend_url: env_string("FACEGATE_BACKEND_URL", d.backend_url),
            auth_token: env_string("FACEGATE_AUTH_TOKEN", d.auth_token),
            address: env_string("FACEGATE_ADDRESS", d.address),
            expected_qr: env_string("FACEGATE_EXPECTED_QR", d.expected_qr),
            match_threshold: env_parse("FACEGATE_MATCH_THRESHOLD", d.match_threshold),
            ear_close_threshold: env_parse("FACEGATE_EAR_CLOSE", d.ear_close_threshold),
            ear_open_threshold: env_parse("FACEGATE_EAR_OPEN", d.ear_open_threshold),
            mar_open_threshold: env_parse("FACEGATE_MAR_OPEN", d.mar_open_threshold),
            liveness_window_frames: env_parse(
                "FACEGATE_LIVENESS_WINDOW",
                d.liveness_window_frames,
            ),
            liveness_mode: env_parse("FACEGATE_LIVENESS_MODE", d.liveness_mode),
            baseline_timeout_secs: env_parse(
                "FACEGATE_BASELINE_TIMEOUT_SECS",
                d.baseline_timeout_secs,
            ),
            liveness_timeout_secs: env_parse(
                "FACEGATE_LIVENESS_TIMEOUT_SECS",
                d.liveness_timeout_secs,
            ),
            dual_check_retries: env_parse("FACEGATE_DUAL_CHECK_RETRIES", d.dual_check_retries),
            model_load_timeout_secs: env_parse(
                "FACEGATE_MODEL_LOAD_TIMEOUT_SECS",
                d.model_load_timeout_secs,
            ),
            backend_timeout_secs: env_parse(
                "FACEGATE_BACKEND_TIMEOUT_SECS",
                d.backend_timeout_secs,
            ),
            detector_input_size: env_parse("FACEGATE_DETECTOR_INPUT_SIZE", d.detector_input_size),
            detector_score_threshold: env_parse(
                "FACEGATE_DETECTOR_SCORE",
                d.detector_score_threshold,
            ),
        }
    }

    /// Session tuning derived from this configuration.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            expected_qr: self.expected_qr.clone(),
            match_threshold: self.match_threshold,
            liveness: LivenessThresholds {
                ear_close: self.ear_close_threshold,
                ear_open: self.ear_open_threshold,
                mar_open: self.mar_open_threshold,
                window_frames: self.liveness_window_frames,
            },
            liveness_mode: self.liveness_mode,
            baseline_timeout_ms: self.baseline_timeout_secs * 1000,
            liveness_timeout_ms: self.liveness_timeout_secs * 1000,
            dual_check_retries: self.dual_check_retries,
            detector: DetectorOptions {
                input_size: self.detector_input_size,
                score_threshold: self.detector_score_threshold,
            },
        }
    }

    pub fn model_load_timeout(&self) -> Duration {
        Duration::from_secs(self.model_load_timeout_secs)
    }

    pub fn backend_timeout(&self) -> Duration {
        Duration::from_secs(self.backend_timeout_secs)
    }

    /// Full URL of the verification endpoint.
    pub fn verify_url(&self) -> String {
        format!("{}/api/face/verify", self.backend_url.trim_end_matches('/'))
    }
}

/// `$XDG_DATA_HOME/facegate/models`, falling back to `~/.local/share`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facegate/models")
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key).unwrap_or(default)
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_override(key, std::env::var(key).ok(), default)
}

/// Parse an override, keeping `default` (with a warning) when it is malformed.
fn parse_override<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparsable override, using default");
            default
        }
    }
}
