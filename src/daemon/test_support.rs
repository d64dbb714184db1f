//! In-memory collaborators for driving the sampling loop in tests.

use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tokio::time::Instant;

use crate::{model::ModelError, utils::clock::Clock};

use super::{
    analysis::{ActivityAnalysis, ActivityAnalyzer, AnalysisError},
    capture::{Capture, CaptureAdapter, CaptureError, Screenshot},
    storage::{
        activity_log::{ActivityLog, StorageError},
        entities::ActivitySample,
    },
};

pub const TEST_START_DATE: NaiveDateTime =
    NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

/// Wall clock that follows tokio's (possibly paused) monotonic clock.
#[derive(Clone)]
pub struct TestClock {
    start_time: DateTime<Utc>,
    reference: Instant,
}

impl TestClock {
    pub fn new() -> Self {
        Self {
            start_time: Utc.from_utc_datetime(&TEST_START_DATE),
            reference: Instant::now(),
        }
    }
}

#[async_trait]
impl Clock for TestClock {
    fn time(&self) -> DateTime<Utc> {
        self.start_time + self.reference.elapsed()
    }

    fn instant(&self) -> Instant {
        Instant::now()
    }

    async fn sleep_until(&self, instant: Instant) {
        tokio::time::sleep_until(instant).await;
    }
}

/// Activity log kept in memory. The first `failures` appends fail without storing anything.
#[derive(Default)]
pub struct MemoryLog {
    rows: Mutex<Vec<ActivitySample>>,
    failures: AtomicUsize,
    appends: AtomicUsize,
}

impl MemoryLog {
    pub fn failing(failures: usize) -> Self {
        Self {
            failures: AtomicUsize::new(failures),
            ..Default::default()
        }
    }

    pub fn with_rows(rows: Vec<ActivitySample>) -> Self {
        Self {
            rows: Mutex::new(rows),
            ..Default::default()
        }
    }

    pub fn rows(&self) -> Vec<ActivitySample> {
        self.rows.lock().unwrap().clone()
    }

    /// Number of append attempts, failed ones included.
    pub fn appends(&self) -> usize {
        self.appends.load(Ordering::SeqCst)
    }
}

impl ActivityLog for MemoryLog {
    async fn append(&self, sample: &ActivitySample) -> Result<(), StorageError> {
        self.appends.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if failed {
            return Err(StorageError::Write(std::io::Error::other("disk full")));
        }
        self.rows.lock().unwrap().push(sample.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<ActivitySample>, StorageError> {
        Ok(self.rows())
    }
}

/// Capture that produces numbered screenshots. Fails on the ticks listed in `failing_ticks`.
#[derive(Default)]
pub struct FakeCapture {
    taken: usize,
    failing_ticks: Vec<usize>,
    pub window_title: String,
}

impl FakeCapture {
    pub fn new(window_title: &str) -> Self {
        Self {
            window_title: window_title.into(),
            ..Default::default()
        }
    }

    pub fn failing_on(mut self, ticks: &[usize]) -> Self {
        self.failing_ticks = ticks.to_vec();
        self
    }
}

#[async_trait]
impl CaptureAdapter for FakeCapture {
    async fn capture(&mut self) -> Result<Capture, CaptureError> {
        let tick = self.taken;
        self.taken += 1;
        if self.failing_ticks.contains(&tick) {
            return Err(CaptureError::EmptyScreenshot);
        }
        Ok(Capture {
            screenshot: Screenshot {
                reference: format!("screenshot_{tick}.png"),
                bytes: b"png".to_vec(),
            },
            window_title: self.window_title.clone(),
        })
    }
}

/// Analyzer answering with queued topics. Once the queue is empty the last topic repeats.
/// Calls listed in `failing_calls` fail without consuming a topic.
pub struct ScriptedAnalyzer {
    topics: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    delay: Option<Duration>,
    failing_calls: Vec<usize>,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedAnalyzer {
    pub fn new(topics: &[&str]) -> Self {
        Self {
            topics: Mutex::new(topics.iter().map(|v| v.to_string()).collect()),
            last: Mutex::new(String::new()),
            delay: None,
            failing_calls: vec![],
            calls: Arc::default(),
        }
    }

    pub fn failing_on(mut self, calls: &[usize]) -> Self {
        self.failing_calls = calls.to_vec();
        self
    }

    pub fn taking(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ActivityAnalyzer for ScriptedAnalyzer {
    async fn analyze(
        &self,
        screenshot: &Screenshot,
        _window_title: &str,
    ) -> Result<ActivityAnalysis, AnalysisError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_calls.contains(&call) {
            return Err(AnalysisError::Model(ModelError::Malformed {
                reason: "not json".into(),
            }));
        }
        let topic = {
            let mut last = self.last.lock().unwrap();
            if let Some(next) = self.topics.lock().unwrap().pop_front() {
                *last = next;
            }
            last.clone()
        };
        Ok(ActivityAnalysis {
            description: format!("Looking at {}", screenshot.reference),
            topic,
            summary: "The user works.".into(),
        })
    }
}
