use std::path::Path;

use anyhow::Result;
use chrono::{Duration, Local};
use clap::Parser;

use crate::{
    daemon::storage::activity_log::{ActivityLog, CsvActivityLog},
    utils::{
        dir::ACTIVITY_LOG_FILE,
        percentage::{duration_percentage, Percentage},
        time::format_duration,
    },
};

use super::{
    output::{analysis::analyze_topics, filter_between, filter_topics},
    range::RangeArgs,
};

#[derive(Debug, Parser)]
pub struct TopicsCommand {
    #[command(flatten)]
    range: RangeArgs,
    #[arg(short = 'p', long = "percentage", help = "Filter topics to have at least specified percentage", default_value_t = Percentage::new_opt(1.).unwrap_or(Percentage::ZERO))]
    min_percentage: Percentage,
    #[arg(long = "topic", help = "Only include samples with this canonical topic. Can be repeated")]
    topics: Vec<String>,
}

/// Prints how much time went into each canonical topic.
pub async fn process_topics_command(app_dir: &Path, command: TopicsCommand) -> Result<()> {
    let (start, end) = command.range.resolve(Local::now(), Duration::days(1))?;

    let log = CsvActivityLog::new(app_dir.join(ACTIVITY_LOG_FILE));
    let samples = filter_between(log.load_all().await?, start.into(), end.into());
    let samples = filter_topics(samples, &command.topics);
    if samples.is_empty() {
        println!("No activity recorded between {start} and {end}");
        return Ok(());
    }

    let (usages, total) = analyze_topics(&samples, command.min_percentage);
    for entry in usages {
        println!(
            "{}%\t{}\t{}\t{}",
            *duration_percentage(entry.duration, total) as i32,
            format_duration(entry.duration),
            entry.samples,
            entry.topic
        );
    }
    println!();
    println!("Total\t{}\t{}", format_duration(total), samples.len());
    Ok(())
}
