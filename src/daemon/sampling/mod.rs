//! The periodic worker. Every tick captures the screen, asks the analyzer what is going on,
//! normalizes the proposed topic and appends one row to the activity log.
//!
//! Ticks are scheduled on boundaries `start + k * interval` of a monotonic clock, so slow ticks
//! don't shift later ones. A tick that runs past one or more boundaries makes the loop skip them
//! instead of catching up.
//!
//! Cancellation interrupts sleeping and the capture/analysis/normalization phase of a tick. Once
//! a row is being appended the append always runs to completion.

use std::{borrow::Cow, time::Duration};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::utils::clock::Clock;

use super::{
    analysis::{ActivityAnalyzer, AnalysisError},
    capture::{CaptureAdapter, CaptureError},
    normalization::{registry::TopicRegistry, TopicNormalizer},
    storage::{
        activity_log::{ActivityLog, StorageError},
        entities::ActivitySample,
    },
};

#[derive(Debug, Error)]
enum TickError {
    #[error("Capture failed: {0}")]
    Capture(#[from] CaptureError),
    #[error("Analysis failed: {0}")]
    Analysis(#[from] AnalysisError),
}

/// What a single tick ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Stored(ActivitySample),
    /// Capture or analysis failed, nothing was written.
    Skipped,
    /// The row couldn't be written even after a retry.
    StorageFailed,
    /// Shutdown was requested before the row was ready.
    Cancelled,
}

pub struct SamplingLoop<L: ActivityLog> {
    capture: Box<dyn CaptureAdapter>,
    analyzer: Box<dyn ActivityAnalyzer>,
    normalizer: TopicNormalizer,
    log: L,
    /// Topics already in the log. `None` until first needed and after a storage failure, in
    /// which case it is rebuilt from the log.
    registry: Option<TopicRegistry>,
    interval: Duration,
    clock: Box<dyn Clock>,
    shutdown: CancellationToken,
}

impl<L: ActivityLog> SamplingLoop<L> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        capture: Box<dyn CaptureAdapter>,
        analyzer: Box<dyn ActivityAnalyzer>,
        normalizer: TopicNormalizer,
        log: L,
        interval: Duration,
        clock: Box<dyn Clock>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            capture,
            analyzer,
            normalizer,
            log,
            registry: None,
            interval,
            clock,
            shutdown,
        }
    }

    /// Executes the sampling loop until shutdown is requested.
    pub async fn run(mut self) {
        info!("Sampling every {:?}", self.interval);
        let mut next_tick = self.clock.instant();
        loop {
            let span = info_span!("tick", at = %self.clock.time());
            if self.tick().instrument(span).await == TickOutcome::Cancelled {
                break;
            }

            next_tick += self.interval;
            let now = self.clock.instant();
            let mut skipped = 0;
            while next_tick < now {
                next_tick += self.interval;
                skipped += 1;
            }
            if skipped > 0 {
                warn!("Tick overran the interval, skipping {skipped} tick(s)");
            }

            select! {
                _ = self.shutdown.cancelled() => break,
                _ = self.clock.sleep_until(next_tick) => (),
            }
        }
        info!("Sampling loop stopped");
    }

    /// Runs one capture, analysis, normalization and append cycle.
    pub async fn tick(&mut self) -> TickOutcome {
        let timestamp = self.clock.time();
        let shutdown = self.shutdown.clone();

        let prepared = select! {
            _ = shutdown.cancelled() => return TickOutcome::Cancelled,
            prepared = self.prepare(timestamp) => prepared,
        };
        let sample = match prepared {
            Ok(v) => v,
            Err(e) => {
                warn!("Skipping tick: {e}");
                return TickOutcome::Skipped;
            }
        };

        match self.store(&sample).await {
            Ok(()) => {
                if let Some(registry) = self.registry.as_mut() {
                    registry.record(&sample.canonical_topic);
                }
                info!(
                    "Stored activity {:?} (proposed {:?})",
                    sample.canonical_topic, sample.raw_topic
                );
                TickOutcome::Stored(sample)
            }
            Err(e) => {
                error!("Failed to store activity sample, dropping it: {e}");
                self.registry = None;
                TickOutcome::StorageFailed
            }
        }
    }

    async fn prepare(&mut self, timestamp: DateTime<Utc>) -> Result<ActivitySample, TickError> {
        let capture = self.capture.capture().await?;
        let analysis = self
            .analyzer
            .analyze(&capture.screenshot, &capture.window_title)
            .await?;

        let known = known_topics(&self.log, &mut self.registry).await;
        let canonical_topic = self.normalizer.normalize(&analysis.topic, &known).await;

        Ok(ActivitySample {
            timestamp,
            app_name: capture.window_title,
            screenshot_ref: capture.screenshot.reference,
            description: analysis.description,
            raw_topic: analysis.topic,
            canonical_topic,
            summary: analysis.summary,
        })
    }

    /// Appends with a single immediate retry. A failed append leaves no row behind, so retrying
    /// can't duplicate it.
    async fn store(&self, sample: &ActivitySample) -> Result<(), StorageError> {
        match self.log.append(sample).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!("Append failed, retrying once: {e}");
                self.log.append(sample).await
            }
        }
    }
}

/// Registry of the log's topics, loaded on first use. When the log can't be read this tick
/// normalizes against nothing and the next tick tries again.
async fn known_topics<'a, L: ActivityLog>(
    log: &L,
    cache: &'a mut Option<TopicRegistry>,
) -> Cow<'a, TopicRegistry> {
    if cache.is_none() {
        match log.load_all().await {
            Ok(samples) => {
                let registry = TopicRegistry::from_samples(&samples);
                debug!("Loaded {} known topic(s)", registry.len());
                *cache = Some(registry);
            }
            Err(e) => {
                warn!("Failed to read known topics: {e}");
                return Cow::Owned(TopicRegistry::default());
            }
        }
    }
    match cache {
        Some(registry) => Cow::Borrowed(registry),
        None => Cow::Owned(TopicRegistry::default()),
    }
}
