use anyhow::Result;
use merprep::{config::PipelineConfig, pipeline};
use std::{env, path::PathBuf, time::Instant};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,merprep=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
    info!("startup");

    // ─── 2) configuration: CLI arg, then MERPREP_CONFIG, then defaults ─
    let config_path = env::args()
        .nth(1)
        .or_else(|| env::var("MERPREP_CONFIG").ok())
        .map(PathBuf::from);
    let config = PipelineConfig::load(config_path.as_deref())?;
    info!(config = ?config, "configuration");

    // ─── 3) run the pipeline ─────────────────────────────────────────
    let start = Instant::now();
    let source = pipeline::source_for(&config)?;
    let outcome = pipeline::run(&config, source.as_ref())?;

    // ─── 4) optional export ──────────────────────────────────────────
    if let Some(path) = &config.output {
        pipeline::export(&outcome, &source.describe(), path)?;
    }

    info!(elapsed = ?start.elapsed(), "all done");
    Ok(())
}
