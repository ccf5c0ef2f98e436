use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use aws_config::BehaviorVersion;
use chrono::{DateTime, Utc};
use is_terminal::IsTerminal;
use tracing::{debug, info};

use crate::cache::{ResultCache, LOG_GROUPS_SLOT, QUERY_RESULT_SLOT};
use crate::cli::{relative_or_invalid, Cli, Command, GetArgs, GroupsArgs};
use crate::config::Config;
use crate::encode::{Encoder, OutputFormat};
use crate::error::{Error, Result};
use crate::executor::{Execution, Phase, QueryExecutor};
use crate::log_fetcher::{AwsLogFetcher, FakeLogFetcher, LogService, QueryRequest};
use crate::progress::{ProgressReporter, SilentProgress, TerminalProgress};
use crate::sink::{AnsiStripper, MultiSinkWriter};

pub async fn dispatch(cli: Cli, config: Config) -> Result<()> {
    let cache = ResultCache::new(config.cache_root());
    let profile = cli.profile.as_deref();
    let region = cli.region.as_deref();

    match &cli.command {
        Command::Get(args) => get(args, &config, &cache, profile, region).await,
        Command::Groups(args) => {
            let service = connect(args.fake, profile, region).await;
            let slot = groups_slot(profile);
            let stdout = io::stdout();
            list_groups(service.as_ref(), &cache, &slot, args, stdout.lock()).await
        }
    }
}

async fn connect(fake: bool, profile: Option<&str>, region: Option<&str>) -> Arc<dyn LogService> {
    if fake {
        debug!("using the built-in fake log service");
        Arc::new(FakeLogFetcher::new())
    } else {
        Arc::new(AwsLogFetcher::connect(BehaviorVersion::latest(), profile, region).await)
    }
}

async fn get(
    args: &GetArgs,
    config: &Config,
    cache: &ResultCache,
    profile: Option<&str>,
    region: Option<&str>,
) -> Result<()> {
    let stdout = io::stdout();
    if args.cached {
        return replay(cache, stdout.lock());
    }

    let format = match args.output {
        Some(format) => format,
        None => config.query.output.parse::<OutputFormat>()?,
    };
    let default_relative = relative_or_invalid(&config.query.relative)?;
    let request = args.to_request(Utc::now(), default_relative)?;
    info!(
        start = %epoch_label(request.start_epoch()),
        end = %epoch_label(request.end_epoch()),
        query = request.query(),
        "query window"
    );

    let color = config.display.color && !args.no_color && stdout.is_terminal();
    let encoder = Encoder::new(format, color);
    let executor = QueryExecutor::new(connect(args.fake, profile, region).await, config.backoff());

    let stderr = io::stderr();
    let mut progress: Box<dyn ProgressReporter> = if stderr.is_terminal() {
        Box::new(TerminalProgress::new(stderr))
    } else {
        Box::new(SilentProgress)
    };

    let execution =
        run_query(&executor, &request, &encoder, cache, progress.as_mut(), stdout.lock()).await?;
    info!(
        log_group = %execution.log_group,
        rows = execution.rows.len(),
        pending_polls = execution.trail.iter().filter(|phase| **phase == Phase::Polling).count(),
        "query finished"
    );
    Ok(())
}

/// Runs `request` and streams the encoded rows to `display` and the query
/// result slot at once. When the encoder colorizes, the slot keeps the plain
/// text; otherwise it gets exactly the bytes `display` gets.
pub async fn run_query<D: Write>(
    executor: &QueryExecutor,
    request: &QueryRequest,
    encoder: &Encoder,
    cache: &ResultCache,
    progress: &mut dyn ProgressReporter,
    display: D,
) -> Result<Execution> {
    executor
        .execute(request, encoder, progress, || {
            let file = BufWriter::new(cache.create(QUERY_RESULT_SLOT)?);
            let writer = MultiSinkWriter::new().with_sink(display);
            Ok(if encoder.colorizes() {
                writer.with_sink(AnsiStripper::new(file))
            } else {
                writer.with_sink(file)
            })
        })
        .await
}

/// Reproduces the last cached query result byte for byte.
pub fn replay<W: Write>(cache: &ResultCache, mut out: W) -> Result<()> {
    let data = cache.read(QUERY_RESULT_SLOT)?;
    out.write_all(&data)?;
    out.flush()?;
    Ok(())
}

fn groups_slot(profile: Option<&str>) -> String {
    match profile {
        Some(profile) => format!("{LOG_GROUPS_SLOT}_{profile}"),
        None => LOG_GROUPS_SLOT.to_string(),
    }
}

/// Prints the log groups containing the filter, one per line. The full
/// listing is served from `slot` unless it is missing or `--refresh` is set.
pub async fn list_groups<W: Write>(
    service: &dyn LogService,
    cache: &ResultCache,
    slot: &str,
    args: &GroupsArgs,
    mut out: W,
) -> Result<()> {
    let cached = if args.refresh {
        None
    } else {
        match cache.read(slot) {
            Ok(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
            Err(Error::CacheMiss { .. }) => None,
            Err(err) => return Err(err),
        }
    };

    let names: Vec<String> = match cached {
        Some(listing) => {
            debug!(slot, "serving log groups from cache");
            listing
                .lines()
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect()
        }
        None => {
            let names = service.resolve_log_group("").await?;
            let listing: String = names.iter().map(|name| format!("{name}\n")).collect();
            cache.write(slot, listing.as_bytes())?;
            names
        }
    };

    for name in names.iter().filter(|name| name.contains(args.filter.as_str())) {
        writeln!(out, "{name}")?;
    }
    out.flush()?;
    Ok(())
}

fn epoch_label(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| epoch.to_string())
}
