use std::path::PathBuf;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};

use crate::encode::OutputFormat;
use crate::error::{Error, Result};
use crate::log_fetcher::QueryRequest;

#[derive(Parser, Debug)]
#[command(name = "awsq", version, about = "Run CloudWatch Logs Insights queries from the shell")]
pub struct Cli {
    /// Log the resolved window, log group and poll progress.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Debug logging, including AWS SDK request traces.
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// AWS profile to load credentials from.
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// AWS region override.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Config file (default: ~/.config/awsq/config.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Query CloudWatch logs.
    Get(GetArgs),
    /// List log groups whose name contains FILTER.
    Groups(GroupsArgs),
}

#[derive(Args, Debug)]
pub struct GetArgs {
    /// Pattern for the log group; must match exactly one group.
    #[arg(short, long, default_value = "")]
    pub group: String,

    /// Start of the window, UTC (YYYY-MM-DD[ HH:MM[:SS]]).
    #[arg(short, long, value_parser = parse_timestamp)]
    pub start: Option<DateTime<Utc>>,

    /// End of the window, UTC. Defaults to now.
    #[arg(short, long, value_parser = parse_timestamp)]
    pub end: Option<DateTime<Utc>>,

    /// Window length when --start is absent (e.g. 15m, 1h30m, 2d).
    #[arg(short, long, value_parser = parse_relative)]
    pub relative: Option<ChronoDuration>,

    /// Query string.
    #[arg(short, long)]
    pub query: Option<String>,

    /// Output format.
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormat>,

    /// Print the cached result of the last query instead of running one.
    #[arg(short, long)]
    pub cached: bool,

    /// Disable colored output.
    #[arg(long)]
    pub no_color: bool,

    /// Serve synthetic results instead of calling AWS.
    #[arg(long)]
    pub fake: bool,
}

#[derive(Args, Debug)]
pub struct GroupsArgs {
    /// Substring to filter group names by.
    #[arg(default_value = "")]
    pub filter: String,

    /// Ignore the cached listing and ask AWS again.
    #[arg(long)]
    pub refresh: bool,

    /// Serve synthetic groups instead of calling AWS.
    #[arg(long)]
    pub fake: bool,
}

impl GetArgs {
    /// Builds the request for `now`; `default_relative` applies when neither
    /// `--start` nor `--relative` was given.
    pub fn to_request(&self, now: DateTime<Utc>, default_relative: ChronoDuration) -> Result<QueryRequest> {
        let query = self.query.as_deref().unwrap_or_default();
        if query.trim().is_empty() {
            return Err(Error::MissingQuery);
        }
        let end = self.end.unwrap_or(now);
        let start = self
            .start
            .unwrap_or_else(|| end - self.relative.unwrap_or(default_relative));
        QueryRequest::new(self.group.clone(), query, start.timestamp(), end.timestamp())
    }
}

pub fn parse_timestamp(input: &str) -> std::result::Result<DateTime<Utc>, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Time value is required".into());
    }

    NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M"))
        .or_else(|_| {
            NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
        })
        .map(|naive| naive.and_utc())
        .map_err(|_| "Use YYYY-MM-DD[ HH:MM[:SS]] format".to_string())
}

/// Accepts concatenated `<n><unit>` terms, units `s`, `m`, `h`, `d`.
pub fn parse_relative(input: &str) -> std::result::Result<ChronoDuration, String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err("Duration is required".into());
    }

    let mut total = ChronoDuration::zero();
    let mut digits = String::new();
    for ch in trimmed.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let amount: i64 = digits
            .parse()
            .map_err(|_| format!("Expected a number before {ch:?} in {trimmed:?}"))?;
        digits.clear();
        let term = match ch {
            's' => ChronoDuration::try_seconds(amount),
            'm' => ChronoDuration::try_minutes(amount),
            'h' => ChronoDuration::try_hours(amount),
            'd' => ChronoDuration::try_days(amount),
            other => return Err(format!("Unknown duration unit {other:?}")),
        }
        .ok_or_else(|| format!("Duration {trimmed:?} is too large"))?;
        total = total
            .checked_add(&term)
            .ok_or_else(|| format!("Duration {trimmed:?} is too large"))?;
    }
    if !digits.is_empty() {
        return Err(format!("Missing unit after {digits:?} (use s, m, h or d)"));
    }
    Ok(total)
}

pub fn relative_or_invalid(input: &str) -> Result<ChronoDuration> {
    parse_relative(input).map_err(Error::InvalidArgument)
}
