//! Produces what a tick observes: a screenshot and the title of the focused window.

pub mod screenshot;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::{utils::clock::Clock, window_api::WindowManager};

use screenshot::CommandScreenshotter;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to run screenshot command {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },
    #[error("Screenshot command exited with {status}: {stderr}")]
    CommandFailed { status: String, stderr: String },
    #[error("Failed to read screenshot: {0}")]
    Read(std::io::Error),
    #[error("Screenshot command produced an empty file")]
    EmptyScreenshot,
}

/// Stored screenshot. `reference` is what the activity log keeps, `bytes` is what gets analyzed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub reference: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    pub screenshot: Screenshot,
    /// May be empty when the focused window couldn't be determined.
    pub window_title: String,
}

#[async_trait]
pub trait CaptureAdapter: Send {
    async fn capture(&mut self) -> Result<Capture, CaptureError>;
}

/// Captures the real desktop: window title from a [WindowManager], image from a screenshot
/// command.
pub struct DesktopCapture {
    windows: Box<dyn WindowManager>,
    screenshotter: CommandScreenshotter,
    clock: Box<dyn Clock>,
}

impl DesktopCapture {
    pub fn new(
        windows: Box<dyn WindowManager>,
        screenshotter: CommandScreenshotter,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            windows,
            screenshotter,
            clock,
        }
    }
}

#[async_trait]
impl CaptureAdapter for DesktopCapture {
    #[instrument(skip(self))]
    async fn capture(&mut self) -> Result<Capture, CaptureError> {
        // A missing title is still a usable sample, a missing screenshot isn't.
        let window_title = self.windows.get_active_window_title().unwrap_or_else(|e| {
            warn!("Failed to get active window {e:?}");
            String::new()
        });
        debug!("Active window: {window_title}");

        let screenshot = self.screenshotter.take(self.clock.time()).await?;
        Ok(Capture {
            screenshot,
            window_title,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use crate::{
        daemon::capture::{CaptureAdapter, CaptureError, DesktopCapture},
        utils::clock::DefaultClock,
        window_api::MockWindowManager,
    };

    use super::screenshot::{CommandScreenshotter, ScreenshotCommand, ScreenshotStore};

    fn screenshotter(command: &str, store: ScreenshotStore) -> CommandScreenshotter {
        CommandScreenshotter::new(command.parse::<ScreenshotCommand>().unwrap(), store)
    }

    #[tokio::test]
    async fn test_capture_combines_title_and_image() -> Result<()> {
        let dir = tempdir()?;
        let fixture = dir.path().join("fixture.png");
        std::fs::write(&fixture, b"not really a png")?;
        let store = ScreenshotStore::new(dir.path().join("screenshots"))?;

        let mut windows = MockWindowManager::new();
        windows
            .expect_get_active_window_title()
            .returning(|| Ok("main.rs - nvim".into()));

        let mut capture = DesktopCapture::new(
            Box::new(windows),
            screenshotter(&format!("cp {} {{path}}", fixture.display()), store.clone()),
            Box::new(DefaultClock),
        );

        let captured = capture.capture().await?;
        assert_eq!(captured.window_title, "main.rs - nvim");
        assert_eq!(captured.screenshot.bytes, b"not really a png");
        assert!(store.resolve(&captured.screenshot.reference).is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_title_failure_is_not_fatal() -> Result<()> {
        let dir = tempdir()?;
        let fixture = dir.path().join("fixture.png");
        std::fs::write(&fixture, b"png")?;
        let store = ScreenshotStore::new(dir.path().join("screenshots"))?;

        let mut windows = MockWindowManager::new();
        windows
            .expect_get_active_window_title()
            .returning(|| Err(anyhow::anyhow!("no display")));

        let mut capture = DesktopCapture::new(
            Box::new(windows),
            screenshotter(&format!("cp {} {{path}}", fixture.display()), store),
            Box::new(DefaultClock),
        );

        assert_eq!(capture.capture().await?.window_title, "");
        Ok(())
    }

    #[tokio::test]
    async fn test_failing_command_is_capture_error() -> Result<()> {
        let dir = tempdir()?;
        let store = ScreenshotStore::new(dir.path().join("screenshots"))?;

        let mut windows = MockWindowManager::new();
        windows
            .expect_get_active_window_title()
            .returning(|| Ok("title".into()));

        let mut capture =
            DesktopCapture::new(Box::new(windows), screenshotter("false", store), Box::new(DefaultClock));

        assert!(matches!(
            capture.capture().await,
            Err(CaptureError::CommandFailed { .. })
        ));
        Ok(())
    }
}
