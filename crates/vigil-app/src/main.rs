//! vigil: watch a screen region and record every stretch that matches a
//! description.
//!
//! Wiring: `ScreenCapture` -> `FrameSampler` -> `TriggerClassifier`
//! (`RemoteVisionOracle`) -> `RecordingController` -> `EpisodeFileWriter`,
//! driven by `MonitorLoop` until SIGINT/SIGTERM.

mod lifecycle;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use vigil_core::config::{AppConfig, OracleProvider};
use vigil_core::config_manager::ConfigManager;
use vigil_core::error::CoreError;
use vigil_core::models::region::Region;
use vigil_core::models::session::SessionSummary;
use vigil_core::models::verdict::TriggerDescription;
use vigil_core::ports::frame_source::FrameSource;
use vigil_core::ports::preview::PreviewSink;
use vigil_network::ai_vision_client::RemoteVisionOracle;
use vigil_network::classifier::{ClassifierPolicy, TriggerClassifier};
use vigil_network::secret::ApiKey;
use vigil_recorder::controller::RecordingController;
use vigil_recorder::monitor_loop::{LoopConfig, MonitorLoop};
use vigil_storage::episode_writer::{run_id_for, EpisodeFileWriter, WriterOptions};
use vigil_vision::capture::ScreenCapture;
use vigil_vision::preview::FilePreview;
use vigil_vision::sampler::{FrameSampler, SamplerConfig};

use crate::lifecycle::LifecycleManager;

/// Exit code for invalid configuration
const EXIT_CONFIG: u8 = 2;
/// Exit code for runtime failures
const EXIT_RUNTIME: u8 = 1;

/// Grace period for the preview task after the loop ends
const PREVIEW_STOP_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "vigil")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Region to monitor: x,y,width,height in monitor pixels
    #[arg(long, short = 'r')]
    region: Option<Region>,

    /// Output root; each run gets its own subdirectory
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,

    /// Keep <run dir>/preview.jpg updated with the latest frame
    #[arg(long, short = 'p')]
    preview: bool,

    /// Sampling interval (ms)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Seconds without a trigger before an episode ends (minimum 5)
    #[arg(long)]
    cooldown_secs: Option<u64>,

    /// Frames before the trigger to include in each episode
    #[arg(long)]
    lookback_frames: Option<usize>,

    /// What to look for; prompted on stdin when omitted
    #[arg(long, short = 'd')]
    description: Option<String>,

    /// Oracle provider (gemini, anthropic, openai)
    #[arg(long)]
    provider: Option<OracleProvider>,

    /// Model name (default depends on the provider)
    #[arg(long)]
    model: Option<String>,

    /// API endpoint (default depends on the provider)
    #[arg(long)]
    endpoint: Option<String>,

    /// JSON config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

impl Args {
    /// Applies command-line values on top of the loaded configuration.
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(region) = self.region {
            config.capture.region = Some(region);
        }
        if let Some(dir) = &self.output {
            config.output.dir = Some(dir.clone());
        }
        if self.preview {
            config.preview.enabled = true;
        }
        if let Some(ms) = self.interval_ms {
            config.capture.sampling_interval_ms = ms;
        }
        if let Some(secs) = self.cooldown_secs {
            config.recording.cooldown_secs = secs;
        }
        if let Some(n) = self.lookback_frames {
            config.recording.lookback_frames = n;
        }
        if let Some(provider) = self.provider {
            if provider != config.classifier.provider {
                // Provider-specific settings from the file no longer apply.
                config.classifier.endpoint = None;
                config.classifier.model = None;
                config.classifier.api_key_env = None;
            }
            config.classifier.provider = provider;
        }
        if let Some(model) = &self.model {
            config.classifier.model = Some(model.clone());
        }
        if let Some(endpoint) = &self.endpoint {
            config.classifier.endpoint = Some(endpoint.clone());
        }
    }
}

fn init_tracing(level: &str) {
    let log_filter = format!(
        "vigil={level},vigil_core={level},vigil_vision={level},vigil_network={level},vigil_storage={level},vigil_recorder={level}"
    );
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)),
        )
        .init();
}

async fn prompt_description() -> Result<String> {
    let line = tokio::task::spawn_blocking(|| -> io::Result<String> {
        print!("Describe what to record: ");
        io::stdout().flush()?;
        let mut line = String::new();
        io::stdin().read_line(&mut line)?;
        Ok(line)
    })
    .await??;
    Ok(line)
}

fn exit_code(e: &anyhow::Error) -> u8 {
    match e.chain().find_map(|cause| cause.downcast_ref::<CoreError>()) {
        Some(core) if core.is_config() => EXIT_CONFIG,
        _ => EXIT_RUNTIME,
    }
}

fn print_summary(summary: &SessionSummary, run_dir: &std::path::Path) {
    println!();
    println!("Session finished after {}s", summary.duration.as_secs());
    println!("  frames sampled : {}", summary.frames_sampled);
    println!("  triggers       : {}", summary.triggers);
    println!("  episodes saved : {}", summary.episodes_written);
    if summary.write_failures > 0 {
        println!("  write failures : {}", summary.write_failures);
    }
    println!("  output         : {}", run_dir.display());
}

async fn run(args: Args) -> Result<()> {
    let manager = ConfigManager::load(args.config.as_deref())
        .context("failed to load configuration")?;
    manager
        .update(|config| args.apply_to(config))
        .context("invalid command-line options")?;
    let config = manager.get();

    let region = config.capture.region.ok_or_else(|| {
        CoreError::validation("capture.region", "no region given; pass --region x,y,width,height")
    })?;

    let description = match &args.description {
        Some(text) => text.clone(),
        None => prompt_description().await?,
    };
    let description = TriggerDescription::new(description)?;

    // -- capture --
    let capture = Arc::new(ScreenCapture::new(config.capture.monitor_index));
    capture
        .validate_region(&region)
        .await
        .context("region does not fit the screen")?;

    // -- oracle --
    let key_env = config.classifier.resolved_api_key_env();
    let api_key = ApiKey::from_env(&key_env)?;
    let oracle = Arc::new(
        RemoteVisionOracle::new(&config.classifier, api_key)
            .context("failed to create oracle client")?,
    );

    // -- output --
    let output_root = config
        .output
        .dir
        .clone()
        .unwrap_or_else(ConfigManager::default_output_dir);
    let writer = Arc::new(
        EpisodeFileWriter::create(
            &output_root,
            run_id_for(Local::now()),
            WriterOptions::from_config(&config),
        )
        .await
        .context("failed to prepare output directory")?,
    );
    let run_dir = writer.run_dir().to_path_buf();

    let preview = config.preview.enabled.then(|| {
        let (preview, handle) = FilePreview::spawn(&run_dir, &config.preview);
        info!(path = %run_dir.join(vigil_vision::preview::PREVIEW_FILE_NAME).display(), "live preview enabled");
        (Arc::new(preview), handle)
    });

    // -- loop --
    let sampler = FrameSampler::new(capture, SamplerConfig::from_capture(&config.capture)?);
    let classifier = TriggerClassifier::new(oracle, ClassifierPolicy::from(&config.classifier));
    let controller = RecordingController::new(
        config.recording.cooldown(),
        config.recording.lookback_frames,
    );
    let mut monitor = MonitorLoop::new(
        sampler,
        classifier,
        controller,
        writer,
        description,
        LoopConfig::from_config(&config),
    );
    if let Some((sink, _)) = &preview {
        monitor = monitor.with_preview(sink.clone() as Arc<dyn PreviewSink>);
    }

    let lifecycle = Arc::new(LifecycleManager::new());
    let shutdown = lifecycle.subscribe();
    let signals = {
        let lifecycle = lifecycle.clone();
        tokio::spawn(async move { lifecycle.wait_for_signal().await })
    };

    println!("Monitoring {region} -> {}", run_dir.display());
    println!("Press Ctrl+C to stop.");

    let result = monitor.run(shutdown).await;
    signals.abort();

    if let Some((sink, handle)) = preview {
        drop(sink);
        if tokio::time::timeout(PREVIEW_STOP_TIMEOUT, handle).await.is_err() {
            warn!("preview task did not stop in time");
        }
    }

    let summary = result.context("monitoring stopped")?;
    print_summary(&summary, &run_dir);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "vigil starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            eprintln!("vigil: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
