use std::io;
use std::process::ExitCode;

use clap::Parser;
use is_terminal::IsTerminal;
use tracing_subscriber::EnvFilter;

mod backoff;
mod cache;
mod cli;
mod commands;
mod config;
mod encode;
mod error;
mod executor;
mod flatten;
mod log_fetcher;
mod progress;
mod sink;

use cli::Cli;

fn init_tracing(cli: &Cli) {
    let default_directives = if cli.debug {
        "awsq=debug,aws_config=debug,aws_smithy_runtime=debug"
    } else if cli.verbose {
        "awsq=info"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_ansi(io::stderr().is_terminal())
        .with_target(cli.debug)
        .with_env_filter(filter)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = config::Config::load(cli.config.as_deref())?;
    commands::dispatch(cli, config).await?;
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("awsq: {err:#}");
            let code = err
                .downcast_ref::<error::Error>()
                .map(error::Error::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
