use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use openswing::carry::ClubType;
use openswing::remote::{ModelSyncClient, TrainingRecord};
use openswing::synthetic::SwingSimulator;
use openswing::{
    AnalysisError, AnalyzerConfig, CancelFlag, FfmpegFrameSource, ImageSequenceSource, MemoryFrameSource,
    ModelBundle, ModelStore, PoseTrack, Progress, SwingAnalysisResult, SwingAnalyzer, SwingLabel,
};

#[derive(Parser, Debug)]
#[command(name = "openswing-rs")]
#[command(about = "Golf swing analyzer (Rust)", long_about = None)]
struct Args {
    /// TOML config file (defaults for every missing key)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding model.json and normalization.json (built-in baseline if omitted)
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Analyze a recorded swing
    Analyze {
        /// Video file, or a directory of still frames
        input: PathBuf,

        /// JSON keypoint track produced by a pose detector
        #[arg(short, long)]
        poses: PathBuf,

        /// Analysis sample rate
        #[arg(long)]
        fps: Option<f64>,

        /// Frame rate of an image-sequence directory
        #[arg(long, default_value = "60.0")]
        sequence_fps: f64,

        /// Club used, for yardage estimates
        #[arg(long, value_enum)]
        club: Option<ClubType>,

        /// Write the full result as JSON to this file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print JSON instead of the summary
        #[arg(long)]
        json: bool,
    },

    /// Analyze simulated swings (for testing without a camera)
    Mock {
        /// Number of swings to simulate
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        #[arg(long)]
        json: bool,
    },

    /// Send an analysis result back as a training record
    Upload {
        /// Result JSON written by `analyze --output`
        result: PathBuf,

        /// Model service base URL
        #[arg(long)]
        server: String,

        /// Correct label, if the classifier got it wrong
        #[arg(long, value_enum)]
        correction: Option<SwingLabel>,

        #[arg(long, default_value = "10")]
        timeout_secs: u64,
    },

    /// Download a model version into the model directory
    FetchModel {
        version: String,

        #[arg(long)]
        server: String,

        #[arg(long, default_value = "30")]
        timeout_secs: u64,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };

    match args.command {
        Command::Analyze {
            input,
            poses,
            fps,
            sequence_fps,
            club,
            output,
            json,
        } => {
            if let Some(fps) = fps {
                config.target_fps = fps;
            }
            if let Some(club) = club {
                config.feedback.club = club;
            }
            let models = load_models(args.model_dir.as_deref())?;
            let track = PoseTrack::load(&poses)
                .with_context(|| format!("Failed to load pose track {}", poses.display()))?;
            let width = config.analysis_width;
            let analyzer = SwingAnalyzer::new(config, models, Arc::new(track));

            let cancel = cancel_on_ctrlc()?;
            let progress = |p: Progress| log::debug!("[PROGRESS] {:?} {:.0}%", p.stage, p.fraction * 100.0);
            let result = if input.is_dir() {
                analyzer.analyze(ImageSequenceSource::new(&input, sequence_fps, width), &cancel, &progress)
            } else {
                analyzer.analyze(FfmpegFrameSource::new(&input, width), &cancel, &progress)
            }
            .with_context(|| format!("Analysis of {} failed", input.display()))?;

            report(&result, json, output.as_deref())?;
        }

        Command::Mock { count, seed, json } => {
            print_banner("Simulation Mode");
            let models = load_models(args.model_dir.as_deref())?;
            let cancel = cancel_on_ctrlc()?;
            println!("Press Ctrl+C to stop");
            println!();

            let mut simulator = SwingSimulator::new(seed);
            for _ in 0..count {
                if cancel.is_cancelled() {
                    println!("Stopping...");
                    break;
                }
                let swing = simulator.next_swing();
                let analyzer = SwingAnalyzer::new(
                    config.clone(),
                    Arc::clone(&models),
                    Arc::new(swing.pose_track()),
                );
                let source = MemoryFrameSource::new(swing.frames, swing.fps);
                match analyzer.analyze(source, &cancel, &|_| {}) {
                    Ok(result) => report(&result, json, None)?,
                    Err(AnalysisError::Cancelled) => {
                        println!("Stopping...");
                        break;
                    }
                    Err(e) => log::warn!("[MOCK] Swing analysis failed: {}", e),
                }
            }
        }

        Command::Upload {
            result,
            server,
            correction,
            timeout_secs,
        } => {
            let text = std::fs::read_to_string(&result)
                .with_context(|| format!("Failed to read {}", result.display()))?;
            let analysis: SwingAnalysisResult =
                serde_json::from_str(&text).context("Result file is not a swing analysis")?;
            let record = TrainingRecord::from_result(&analysis, correction);

            let client = ModelSyncClient::new(server, Duration::from_secs(timeout_secs));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(client.upload_record(&record))?;
            println!("Uploaded training record ({})", record.label);
        }

        Command::FetchModel {
            version,
            server,
            timeout_secs,
        } => {
            let dir = args
                .model_dir
                .context("--model-dir is required to store a fetched model")?;
            let client = ModelSyncClient::new(server, Duration::from_secs(timeout_secs));
            let rt = tokio::runtime::Runtime::new()?;
            let model = rt.block_on(client.fetch_model(&version))?;

            let current = match ModelBundle::load_dir(&dir) {
                Ok(bundle) => bundle,
                Err(AnalysisError::ModelNotFound(_)) => ModelBundle::baseline(),
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to load model from {}", dir.display()))
                }
            };
            let store = ModelStore::new(current);
            let previous = store.snapshot().version().to_string();

            // Validated before anything on disk changes
            model.install_into(&store, Some(&dir))?;
            println!(
                "Model {} installed (was {}), saved to {}",
                store.snapshot().version(),
                previous,
                dir.display()
            );
        }
    }

    Ok(())
}

fn print_banner(mode: &str) {
    println!("{}", "=".repeat(50));
    println!("  OpenSwing - Golf Swing Analyzer (Rust)");
    println!("  {}", mode);
    println!("{}", "=".repeat(50));
    println!();
}

fn load_models(dir: Option<&Path>) -> Result<Arc<ModelStore>> {
    let bundle = match dir {
        Some(dir) => ModelBundle::load_dir(dir)
            .with_context(|| format!("Failed to load model from {}", dir.display()))?,
        None => {
            log::info!("[CLASSIFY] No model directory given, using built-in baseline");
            ModelBundle::baseline()
        }
    };
    Ok(Arc::new(ModelStore::new(bundle)))
}

fn cancel_on_ctrlc() -> Result<CancelFlag> {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    ctrlc::set_handler(move || flag.cancel())?;
    Ok(cancel)
}

fn report(result: &SwingAnalysisResult, json: bool, output: Option<&Path>) -> Result<()> {
    if let Some(path) = output {
        let text = serde_json::to_string_pretty(result)?;
        std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
        log::info!("[OUTPUT] Result written to {}", path.display());
    }
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
    } else {
        result.print_summary();
    }
    Ok(())
}
