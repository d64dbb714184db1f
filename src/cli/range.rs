use std::fmt::Display;

use anyhow::Result;
use chrono::{DateTime, Duration, Local};
use chrono_english::parse_date_string;
use clap::{CommandFactory, ValueEnum};
use now::DateTimeNow;

use crate::utils::time::next_day_start;

use super::Args;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

/// Time range shared by the reading commands.
#[derive(Debug, Clone, clap::Args)]
pub struct RangeArgs {
    #[arg(
        long = "start",
        short,
        help = "Start of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    start_date: Option<String>,
    #[arg(
        long = "end",
        short,
        help = "End of the range. Examples are \"yesterday\", \"1 hour ago\", \"15/03/2025\", \"12:00 16/03/2025\", \"12 AM 16/03/2025\""
    )]
    end_date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "days",
        default_value_t = false,
        help = "Take inputs as whole days. For example if start and end are both 15/03/2025 this option allows to extract the whole day"
    )]
    treat_as_days: bool,
}

impl RangeArgs {
    /// Resolves the range relative to `now`. A missing start means `default_span` before the end.
    pub fn resolve(
        &self,
        now: DateTime<Local>,
        default_span: Duration,
    ) -> Result<(DateTime<Local>, DateTime<Local>)> {
        let dialect: chrono_english::Dialect = self.date_style.into();
        let mut end = match &self.end_date {
            Some(v) => parse(v, now, dialect, "end")?,
            None => now,
        };
        let mut start = match &self.start_date {
            Some(v) => parse(v, now, dialect, "start")?,
            None => end - default_span,
        };
        if self.treat_as_days {
            start = start.beginning_of_day();
            end = next_day_start(end);
        }
        if start > end {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Start {start} is after end {end}"),
                )
                .into());
        }
        Ok((start, end))
    }
}

fn parse(
    value: &str,
    now: DateTime<Local>,
    dialect: chrono_english::Dialect,
    name: &str,
) -> Result<DateTime<Local>> {
    match parse_date_string(value, now, dialect) {
        Ok(v) => Ok(v.with_timezone(&Local)),
        Err(e) => Err(Args::command()
            .error(
                clap::error::ErrorKind::ValueValidation,
                format!("Failed to validate {name} date {e}"),
            )
            .into()),
    }
}
