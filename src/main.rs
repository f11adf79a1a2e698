use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use inkcalc::detection::{DetectionEvent, EquationDetector};
use inkcalc::recognition::{HttpRecognizer, InkRasterizer, Recognizer};
use inkcalc::{ContextConfig, Database, RecognitionContext, RecognitionMode, SettingsStore, SnapshotStore, Stroke};

/// Detect and recognise handwritten equations from recorded ink.
#[derive(Parser)]
#[command(name = "inkcalc", version, about)]
struct Cli {
    /// Directory holding settings.json and the recognition database
    #[arg(long, global = true, default_value = ".inkcalc")]
    data_dir: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a JSON array of strokes through a detector and print detections
    Replay {
        strokes: PathBuf,

        /// Override the configured recognition mode for this run
        #[arg(long)]
        mode: Option<RecognitionMode>,
    },
    /// Query the configured recognition service
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let cli = Cli::parse();
    let settings = Arc::new(SettingsStore::new(cli.data_dir.join("settings.json"))?);

    match cli.command {
        Commands::Replay { strokes, mode } => replay(&cli.data_dir, settings, &strokes, mode).await,
        Commands::Health => health(&settings).await,
    }
}

async fn replay(
    data_dir: &Path,
    settings: Arc<SettingsStore>,
    path: &Path,
    mode: Option<RecognitionMode>,
) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mut strokes: Vec<Stroke> =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse strokes in {}", path.display()))?;
    strokes.sort_by_key(|s| s.created_at);
    let Some(last_created_at) = strokes.last().map(|s| s.created_at) else {
        log::warn!("{} contains no strokes", path.display());
        return Ok(());
    };

    let mut effective = settings.get();
    if let Some(mode) = mode {
        effective.mode = mode;
    }

    let remote: Option<Arc<dyn Recognizer>> = match effective.mode {
        RecognitionMode::Local => None,
        _ => Some(Arc::new(HttpRecognizer::from_settings(
            &effective,
            Arc::new(InkRasterizer::default()),
        )?)),
    };

    fs::create_dir_all(data_dir).with_context(|| format!("Failed to create {}", data_dir.display()))?;
    let store: Arc<dyn SnapshotStore> = Arc::new(Database::new(data_dir.join("inkcalc.db"))?);

    let config = ContextConfig::default();
    let debounce = config.detector.debounce;
    let context = RecognitionContext::new(settings, remote, Some(store), config.clone());
    context.init().await?;

    // Recorded timestamps are replayed as if the last stroke had just been lifted.
    let run_settings = effective.clone();
    let detector = EquationDetector::new("replay", Arc::clone(context.orchestrator()), config.detector)
        .with_settings(move || run_settings.clone())
        .with_clock(move || last_created_at + 1);
    let mut events = detector.subscribe();

    log::info!("replaying {} strokes in {} mode", strokes.len(), effective.mode);
    for stroke in strokes {
        detector.add_stroke(stroke).await;
    }

    let deadline = debounce + Duration::from_millis(effective.request_timeout_ms) * 4;
    let outcome = tokio::time::timeout(deadline, async {
        loop {
            match events.recv().await {
                Ok(DetectionEvent::Detected(payload)) => return Some(payload),
                Ok(DetectionEvent::Cleared { reason, .. }) => {
                    log::info!("no equation detected: {reason}");
                    return None;
                }
                Ok(DetectionEvent::Highlight { stroke_ids, confidence, .. }) => {
                    log::info!(
                        "equals sign found ({} strokes, confidence {:.2})",
                        stroke_ids.len(),
                        confidence
                    );
                }
                Err(RecvError::Lagged(skipped)) => log::warn!("skipped {skipped} detector events"),
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await;

    detector.dispose().await;
    context.dispose().await;

    let outcome = outcome.context("Timed out waiting for detection")?;

    if let Some(payload) = outcome {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    }
    Ok(())
}

async fn health(settings: &SettingsStore) -> Result<()> {
    let recognizer = HttpRecognizer::from_settings(&settings.get(), Arc::new(InkRasterizer::default()))?;
    let health = recognizer
        .health()
        .await
        .with_context(|| format!("Health check against {} failed", recognizer.endpoint()))?;
    println!("{}", serde_json::to_string_pretty(&health)?);
    Ok(())
}
