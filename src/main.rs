// src/main.rs

use std::io::{BufRead, stdin};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use changepoint_annotator::config::{AnnotatorConfig, DistanceMetric};
use changepoint_annotator::console::{Command, Console, Flow, HELP};
use changepoint_annotator::session::Workspace;

/// Interactive changepoint contour annotator
#[derive(Parser, Debug)]
#[command(name = "annotator")]
#[command(about = "Annotate vocalization contours on spectrograms, file by file")]
#[command(version)]
struct Args {
    /// Directory of audio files (searched recursively). Defaults to the last one used.
    audio_dir: Option<PathBuf>,

    /// Where annotation JSON files live (default: <AUDIO_DIR>/annotations)
    #[arg(short, long, env = "ANNOTATOR_ANNOTATION_DIR")]
    annotations: Option<PathBuf>,

    /// Config file (default: ~/.changepoint_annotator.json)
    #[arg(long, env = "ANNOTATOR_CONFIG")]
    config: Option<PathBuf>,

    /// Removal threshold, in metric units
    #[arg(long)]
    threshold: Option<f64>,

    /// Removal metric: scaled or display
    #[arg(long, value_parser = parse_metric)]
    metric: Option<DistanceMetric>,

    /// How many Clear Previous steps to remember
    #[arg(long)]
    history_depth: Option<usize>,
}

fn parse_metric(name: &str) -> Result<DistanceMetric, String> {
    DistanceMetric::parse(name).ok_or_else(|| format!("unknown metric '{name}' (scaled|display)"))
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changepoint_annotator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let config_path = args.config.clone().or_else(AnnotatorConfig::default_path);
    let mut config = AnnotatorConfig::load_or_default(config_path.as_deref());
    if let Some(threshold) = args.threshold {
        config.removal.threshold = threshold;
    }
    if let Some(metric) = args.metric {
        config.removal.metric = metric;
    }
    if let Some(depth) = args.history_depth {
        config.history_depth = depth;
    }
    config.validate().context("Invalid settings")?;

    let audio_dir = match args.audio_dir.clone() {
        Some(dir) => dir,
        None => match config.last_directory() {
            Some(dir) => dir.to_path_buf(),
            None => bail!("No audio directory given and no previous directory remembered"),
        },
    };

    let workspace = Workspace::open(&audio_dir, args.annotations.as_deref(), &config)
        .with_context(|| format!("Failed to open {}", audio_dir.display()))?;
    info!(
        "Annotations: {}",
        workspace.annotation_dir().display()
    );

    config.remember_directory(&audio_dir);
    if let Some(path) = &config_path {
        if let Err(e) = config.save(path) {
            warn!("Could not save config: {e}");
        }
    }

    let mut console = Console::new(workspace);
    println!("{HELP}");
    console.render_status()?;

    for line in stdin().lock().lines() {
        let line = line.context("Failed to read input")?;
        if line.trim().is_empty() {
            console.render_status()?;
            continue;
        }
        match line.parse::<Command>() {
            Ok(command) => {
                if console.execute(command) == Flow::Quit {
                    println!("\n🛑 Exiting annotator.");
                    return Ok(());
                }
            }
            Err(e) => println!("⚠ {e}"),
        }
        console.render_status()?;
    }

    // stdin closed: save like a normal quit.
    if console.execute(Command::Quit) == Flow::Continue {
        bail!("Input closed before the active file could be saved");
    }
    println!("\n🛑 Exiting annotator.");
    Ok(())
}
