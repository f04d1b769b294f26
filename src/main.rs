use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use pitwatch::analytics::{spawn_analyzer, RunPaths};
use pitwatch::config::{Config, DEFAULT_CONFIG_PATH};

/// Logs crew activity per work zone from a fixed overhead pit stop video.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Video to analyze.
    #[arg(short, long)]
    input: PathBuf,

    /// TOML configuration; `config.toml` is used when present.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the JSON report here instead of stdout.
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Write an annotated copy of the video here.
    #[arg(short, long)]
    overlay: Option<PathBuf>,

    /// Frame rate to use when the container's is missing or wrong.
    #[arg(long)]
    fps: Option<f64>,
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, Box<dyn std::error::Error>> {
    match path {
        Some(path) => Ok(Config::load_from(path)?),
        None if std::path::Path::new(DEFAULT_CONFIG_PATH).exists() => Ok(Config::load()?),
        None => {
            tracing::info!("no config file found, using defaults");
            Ok(Config::default())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("pitwatch=debug".parse()?))
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_ref())?;
    tracing::info!(zones = config.zones.zone_names().len(), "configuration loaded");

    let shutdown = Arc::new(AtomicBool::new(false));
    let paths = RunPaths {
        input: args.input.clone(),
        overlay: args.overlay.clone(),
    };
    let mut handle = spawn_analyzer(config, paths, args.fps, Arc::clone(&shutdown));

    let result = tokio::select! {
        result = &mut handle => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            shutdown.store(true, Ordering::Relaxed);
            handle.await
        }
    };

    let report = result??;

    if report.lock.is_none() {
        tracing::warn!("vehicle never came to rest, no zones were analyzed");
    }
    for event in report.timeline() {
        tracing::info!(
            zone = %event.zone,
            start = format!("{:.2}", event.start),
            finish = format!("{:.2}", event.finish),
            duration = format!("{:.2}", event.duration),
            "activity"
        );
    }

    match &args.report {
        Some(path) => {
            report.write_json(path)?;
            tracing::info!(path = %path.display(), "report written");
        }
        None => println!("{}", report.to_json()?),
    }

    Ok(())
}
