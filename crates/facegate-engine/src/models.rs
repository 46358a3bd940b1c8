//! Model loading.
//!
//! The extractor is an injected dependency: callers supply an
//! [`ExtractorLoader`] and get back a ready extractor or
//! `ModelLoadFailure`. Nothing polls for readiness afterwards.

use std::path::Path;

use facegate_core::extractor::ExtractorError;
use facegate_core::{DetectorOptions, LandmarkExtractor, SessionError};

use crate::config::Config;

/// Builds a landmark extractor from the weight files in a model directory.
///
/// `load` may block (file I/O, graph construction); it runs on tokio's
/// blocking pool.
pub trait ExtractorLoader: Send + 'static {
    type Extractor: LandmarkExtractor + 'static;

    fn load(
        self,
        model_dir: &Path,
        options: &DetectorOptions,
    ) -> Result<Self::Extractor, ExtractorError>;
}

/// Verify the model directory, then load the extractor under the configured
/// timeout.
pub async fn load_extractor<L: ExtractorLoader>(
    loader: L,
    config: &Config,
) -> Result<L::Extractor, SessionError> {
    let model_dir = config.model_dir.clone();
    let options = config.session_config().detector;
    let timeout = config.model_load_timeout();

    tracing::info!(dir = %model_dir.display(), "loading face models");

    let task = tokio::task::spawn_blocking(move || {
        facegate_models::verify_models_dir(&model_dir)
            .map_err(|e| SessionError::ModelLoadFailure(e.to_string()))?;
        loader
            .load(&model_dir, &options)
            .map_err(|e| SessionError::ModelLoadFailure(e.to_string()))
    });

    let result = match tokio::time::timeout(timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(SessionError::ModelLoadFailure(format!(
            "loader task failed: {join}"
        ))),
        Err(_) => Err(SessionError::ModelLoadFailure(format!(
            "timed out after {}s",
            timeout.as_secs()
        ))),
    };

    match &result {
        Ok(_) => tracing::info!("face models loaded"),
        Err(e) => tracing::error!(error = %e, "face model load failed"),
    }
    result
}
