use std::path::Path;

use anyhow::Result;
use chrono::{Duration, Local};
use clap::Parser;

use crate::{
    daemon::{
        capture::screenshot::ScreenshotStore,
        storage::activity_log::{ActivityLog, CsvActivityLog},
    },
    utils::dir::{ACTIVITY_LOG_FILE, SCREENSHOT_DIR},
};

use super::{
    output::{filter_between, filter_topics},
    range::RangeArgs,
};

#[derive(Debug, Parser)]
pub struct LogCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short = 'n', long, default_value_t = 20, help = "Print at most this many of the latest samples")]
    limit: usize,
    #[arg(long, help = "Print the path of each screenshot")]
    screenshots: bool,
    #[arg(long = "topic", help = "Only include samples with this canonical topic. Can be repeated")]
    topics: Vec<String>,
}

/// Prints the latest samples of the activity log.
pub async fn process_log_command(app_dir: &Path, command: LogCommand) -> Result<()> {
    let (start, end) = command.range.resolve(Local::now(), Duration::days(1))?;

    let log = CsvActivityLog::new(app_dir.join(ACTIVITY_LOG_FILE));
    let samples = filter_between(log.load_all().await?, start.into(), end.into());
    let samples = filter_topics(samples, &command.topics);
    let screenshots = ScreenshotStore::open(app_dir.join(SCREENSHOT_DIR));

    let skip = samples.len().saturating_sub(command.limit);
    for sample in samples.into_iter().skip(skip) {
        let time = sample.timestamp.with_timezone(&Local);
        println!(
            "{}\t{}\t{}\t{}",
            time.format("%x %H:%M:%S"),
            sample.canonical_topic,
            sample.app_name,
            sample.summary
        );
        if command.screenshots {
            match screenshots.resolve(&sample.screenshot_ref) {
                Some(path) => println!("\t{}", path.display()),
                None => println!("\t{} (missing)", sample.screenshot_ref),
            }
        }
    }
    Ok(())
}
