mod cli;
mod commands;
mod config;
mod error;
mod import;
mod jobs;
mod nimbusec;
mod pool;
mod ui;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command, PoolArgs};
use commands::infected::ResultsSink;
use commands::sync::SyncOptions;
use config::NimbusecConfig;
use error::AppError;
use jobs::BatchReport;
use nimbusec::NimbusecClient;
use ui::BatchProgress;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

// RUST_LOG wins; otherwise warnings only, or debug with --verbose.
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = NimbusecConfig::load_from(&cli.config)?;
    config.apply_cli(&cli);

    match cli.command {
        Command::AgentConfig {
            file,
            agent_key,
            agent_secret,
            tmpfile,
        } => {
            // Offline: needs no API credentials.
            let records = import::open(&file)?;
            let agent = commands::agent_config::AgentConfig::from_records(
                &records,
                &agent_key,
                &agent_secret,
                &tmpfile,
                &config.url,
            )?;
            agent.write_to(std::io::stdout().lock())?;
        }
        Command::Sync {
            file,
            delete,
            update,
            throttle,
            dry_run,
            pool,
        } => {
            let api = connect(&config)?;
            let records = import::open(&file)?;
            let rows = import::domain_rows(&records)?;
            let options = SyncOptions {
                update,
                delete,
                dry_run,
                workers: workers(&pool, &config),
                throttle: Duration::from_secs(throttle.unwrap_or(config.throttle_secs)),
            };
            let report = BatchReport::new(BatchProgress::start("syncing domains"), pool.fail_fast);
            let outcome = commands::sync::run(api, &rows, &options, report)
                .await
                .context("sync failed")?;
            outcome.conclude()?;
        }
        Command::Rm {
            file,
            dry_run,
            pool,
        } => {
            let api = connect(&config)?;
            let records = import::open(&file)?;
            let names = records
                .iter()
                .enumerate()
                .map(|(i, record)| import::name(record, i).map(str::to_string))
                .collect::<Result<Vec<_>, AppError>>()?;
            let report =
                BatchReport::new(BatchProgress::start("deleting domains"), pool.fail_fast);
            let outcome =
                commands::rm::run(api, &names, workers(&pool, &config), dry_run, report)
                    .await
                    .context("delete failed")?;
            outcome.conclude()?;
        }
        Command::Get => {
            let api = connect(&config)?;
            let count = commands::get::run(api.as_ref(), std::io::stdout().lock()).await?;
            tracing::info!(count, "listed domains");
        }
        Command::Infected {
            filter,
            domain,
            pool,
        } => {
            let api = connect(&config)?;
            let sink = ResultsSink::new(Box::new(std::io::stdout()), pool.fail_fast);
            let sink =
                commands::infected::run(api, &domain, &filter, workers(&pool, &config), sink)
                    .await
                    .context("listing infected resources failed")?;
            tracing::info!(domains = sink.domains, rows = sink.rows, "listed infected resources");
            sink.conclude()?;
        }
    }

    Ok(())
}

fn connect(config: &NimbusecConfig) -> Result<Arc<NimbusecClient>> {
    config.validate()?;
    let client = NimbusecClient::with_timeout(
        &config.url,
        &config.key,
        &config.secret,
        config.request_timeout(),
    )
    .context("failed to create API client")?;
    Ok(Arc::new(client))
}

fn workers(pool: &PoolArgs, config: &NimbusecConfig) -> usize {
    pool.workers.unwrap_or(config.workers)
}
