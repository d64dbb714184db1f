use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Result;
use capture::{
    screenshot::{CommandScreenshotter, ScreenshotStore},
    CaptureAdapter, DesktopCapture,
};
use analysis::ModelAnalyzer;
use config::TrackerConfig;
use normalization::{classifier::ModelClassifier, TopicNormalizer};
use sampling::SamplingLoop;
use storage::activity_log::CsvActivityLog;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{
    model::{openai::OpenAiCompatibleModel, LanguageModel},
    utils::{
        clock::{Clock, DefaultClock},
        dir::{ACTIVITY_LOG_FILE, SCREENSHOT_DIR},
    },
    window_api::{GenericWindowManager, NoWindowManager, WindowManager},
};

pub mod analysis;
pub mod args;
pub mod capture;
pub mod config;
pub mod normalization;
pub mod sampling;
pub mod shutdown;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_support;

/// Represents the starting point for the daemon
pub async fn start_daemon(dir: PathBuf, config: TrackerConfig) -> Result<()> {
    // The working directory is left, so relative paths have to be resolved first.
    let dir = dir.canonicalize()?;
    std::env::set_current_dir("/")?;

    let http_client = reqwest::Client::builder().build()?;
    let vision_model = Arc::new(OpenAiCompatibleModel::new(
        http_client.clone(),
        config.endpoint.clone(),
        config.vision_model.clone(),
    ));
    let text_model = Arc::new(OpenAiCompatibleModel::new(
        http_client,
        config.endpoint.clone(),
        config.text_model.clone(),
    ));

    let windows: Box<dyn WindowManager> = match GenericWindowManager::new() {
        Ok(manager) => Box::new(manager),
        Err(e) => {
            warn!("Window titles won't be recorded: {e:?}");
            Box::new(NoWindowManager)
        }
    };
    let screenshots = ScreenshotStore::new(dir.join(SCREENSHOT_DIR))?;
    let capture = DesktopCapture::new(
        windows,
        CommandScreenshotter::new(config.screenshot_command.clone(), screenshots),
        Box::new(DefaultClock),
    );

    let shutdown_token = CancellationToken::new();
    let sampler = create_sampler(
        &dir,
        &config,
        Box::new(capture),
        vision_model,
        text_model,
        &shutdown_token,
        DefaultClock,
    );

    info!("Tracking into {dir:?}");
    tokio::join!(shutdown::detect_shutdown(shutdown_token), sampler.run());

    Ok(())
}

fn create_sampler(
    dir: &Path,
    config: &TrackerConfig,
    capture: Box<dyn CaptureAdapter>,
    vision_model: Arc<dyn LanguageModel>,
    text_model: Arc<dyn LanguageModel>,
    shutdown_token: &CancellationToken,
    clock: impl Clock,
) -> SamplingLoop<CsvActivityLog> {
    let analyzer = ModelAnalyzer::new(vision_model, config.model_timeout);
    let normalizer = TopicNormalizer::new(
        Box::new(ModelClassifier::new(text_model, config.model_timeout)),
        config.topic_candidates,
        config.model_timeout,
    );
    SamplingLoop::new(
        capture,
        Box::new(analyzer),
        normalizer,
        CsvActivityLog::new(dir.join(ACTIVITY_LOG_FILE)),
        config.interval,
        Box::new(clock),
        shutdown_token.clone(),
    )
}
