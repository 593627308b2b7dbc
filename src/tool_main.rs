// src/tool_main.rs

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use changepoint_annotator::config::AnnotatorConfig;
use changepoint_annotator::session::Workspace;
use changepoint_annotator::session::workspace::FileStatus;

/// Batch reporting over an annotated audio directory
#[derive(Parser, Debug)]
#[command(name = "annotation_tool")]
#[command(version)]
struct Args {
    /// Directory of audio files (searched recursively)
    audio_dir: PathBuf,

    /// Annotation directory (default: <AUDIO_DIR>/annotations)
    #[arg(short, long, env = "ANNOTATOR_ANNOTATION_DIR")]
    annotations: Option<PathBuf>,

    /// Config file (default: ~/.changepoint_annotator.json)
    #[arg(long, env = "ANNOTATOR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: ToolCommand,
}

#[derive(Subcommand, Debug)]
enum ToolCommand {
    /// Per-file contour counts and totals
    Stats,
    /// List files that still need annotation
    Unannotated,
    /// Copy *_annotations.json files from another directory
    Import { from: PathBuf },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "changepoint_annotator=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();
    let config_path = args.config.clone().or_else(AnnotatorConfig::default_path);
    let config = AnnotatorConfig::load_or_default(config_path.as_deref());

    let mut workspace = Workspace::open(&args.audio_dir, args.annotations.as_deref(), &config)
        .with_context(|| format!("Failed to open {}", args.audio_dir.display()))?;

    match args.command {
        ToolCommand::Stats => print_stats(&workspace),
        ToolCommand::Unannotated => {
            let statuses = workspace.statuses();
            let mut count = 0;
            for (path, status) in workspace.files().iter().zip(&statuses) {
                if status.needs_annotation() {
                    println!("{}", path.display());
                    count += 1;
                }
            }
            eprintln!("{count} of {} file(s) need annotation", workspace.len());
        }
        ToolCommand::Import { from } => {
            let n = workspace
                .import_annotations(&from)
                .with_context(|| format!("Failed to import from {}", from.display()))?;
            println!("✓ Imported {n} annotation file(s) into {}", workspace.annotation_dir().display());
        }
    }
    Ok(())
}

fn print_stats(workspace: &Workspace) {
    let statuses = workspace.statuses();
    for (i, (path, status)) in workspace.files().iter().zip(&statuses).enumerate() {
        let label = match status {
            FileStatus::Unannotated => "-".to_string(),
            FileStatus::Annotated { contours } => format!("{contours} contour(s)"),
            FileStatus::Unusable { contours, reason } => format!(
                "unusable ({}), {contours} contour(s)",
                reason.as_deref().unwrap_or("no reason")
            ),
            FileStatus::Unreadable => "unreadable".to_string(),
        };
        println!("{:>4}  {:<40}  {label}", i + 1, path.display());
    }
    println!(
        "\nTotal: {} file(s), {} syllable(s), {} unusable",
        workspace.len(),
        workspace.total_syllables(),
        workspace.unusable_count()
    );
}
