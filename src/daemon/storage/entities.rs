use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column names of the activity log, in file order. Readers such as the topic report and the
/// registry rebuild look fields up by these names, so they must not change.
pub const COLUMNS: [&str; 7] = [
    "Timestamp",
    "AppName",
    "ScreenshotFile",
    "CrispDescription",
    "RawTopic",
    "MainTopic",
    "ShortDescription",
];

/// One observation of the user's activity, as stored in a single row of the activity log.
#[derive(PartialEq, Eq, Debug, Serialize, Deserialize, Clone)]
pub struct ActivitySample {
    /// Moment the tick started. Rows are ordered by it.
    #[serde(rename = "Timestamp")]
    pub timestamp: DateTime<Utc>,
    /// Title of the foreground window. Empty when it couldn't be read.
    #[serde(rename = "AppName")]
    pub app_name: String,
    /// File name of the screenshot inside the screenshot directory.
    #[serde(rename = "ScreenshotFile")]
    pub screenshot_ref: String,
    #[serde(rename = "CrispDescription")]
    pub description: String,
    /// Topic exactly as the analyzer proposed it.
    #[serde(rename = "RawTopic")]
    pub raw_topic: String,
    /// Topic after normalization. Everything that aggregates activity uses this one.
    #[serde(rename = "MainTopic")]
    pub canonical_topic: String,
    #[serde(rename = "ShortDescription")]
    pub summary: String,
}
