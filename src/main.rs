use std::{process::ExitCode, time::Duration};

use clap::Parser;
use odm_dl::{JobBuilder, RunOutcome, config::Config, error::OdmError};
use tracing::{error, info};
use tracing_indicatif::IndicatifLayer;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};
mod args;
use args::Args;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let indicatif_layer = IndicatifLayer::new();
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(indicatif_layer.get_stderr_writer()))
        .with(indicatif_layer)
        .init();
}

async fn run(args: Args) -> Result<(), OdmError> {
    let config = match args.config.clone().or_else(Config::default_path) {
        Some(path) => Config::load_from_path(path)?,
        None => Config::default(),
    };

    let mut builder = JobBuilder::default();
    builder
        .odm_path(args.odm_file.clone())
        .output_dir(args.output_dir.clone())
        .make_output_dir(args.make_output_dir || config.make_output_dir.unwrap_or(false))
        .dry_run(args.dry_run)
        .delete_source(!args.keep_source && config.delete_source.unwrap_or(true));

    if let Some(max_retries) = args.retry.or(config.max_retries) {
        builder.max_retries(max_retries);
    }
    if let Some(secs) = args.waitretry.or(config.wait_between_retries_secs) {
        builder.wait_between_retries(seconds(secs, "waitretry")?);
    }
    if let Some(secs) = config.max_wait_secs {
        builder.max_wait(seconds(secs, "max_wait_secs")?);
    }
    if let Some(secs) = config.connect_timeout_secs {
        builder.connect_timeout(Some(seconds(secs, "connect_timeout_secs")?));
    }

    let job = builder.build()?;
    match job.run().await? {
        RunOutcome::DryRun { .. } => info!("dry run finished"),
        RunOutcome::Completed(report) => info!(
            parts = report.parts.len(),
            directory = %report.output_dir.display(),
            "audiobook downloaded"
        ),
    }
    Ok(())
}

fn seconds(value: f64, name: &str) -> Result<Duration, OdmError> {
    Duration::try_from_secs_f64(value).map_err(|e| OdmError::CliError {
        message: format!("{name} must be a non-negative number of seconds: {e}"),
    })
}
