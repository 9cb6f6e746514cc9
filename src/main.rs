use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use lc_stacker::{
    classifier::HostedClassifier,
    config::Config,
    pipeline::{BatchIngestor, JobSettings, RunnerOptions, StackJobRunner, WatchIngestor},
};

#[derive(Parser)]
#[command(
    name = "lc-stacker",
    version,
    about = "Keep only the target slices of multi-frame TIFF stacks",
    long_about = "LC-Stacker splits every stack in a folder into frames, classifies each frame, and reassembles the frames that match the target label into one grayscale stack per input. With --watch it keeps processing new stacks as they arrive."
)]
struct Cli {
    /// Folder of raw .tif/.tiff stacks
    #[arg(short = 'i', long = "in")]
    input: PathBuf,

    /// Destination folder for reassembled stacks
    #[arg(short, long)]
    out: PathBuf,

    /// Minimum confidence for a frame to be kept (default 0.90)
    #[arg(long)]
    conf: Option<f32>,

    /// Label whose frames are kept (default "lc")
    #[arg(long)]
    label: Option<String>,

    /// Keep watching the input folder and process new stacks automatically
    #[arg(short, long)]
    watch: bool,

    /// Quiet period before a newly created stack is processed, in milliseconds
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Stacks processed at the same time
    #[arg(long)]
    jobs: Option<usize>,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Classifier API key
    #[arg(long, env = "LC_STACKER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut Config) {
        if let Some(conf) = self.conf {
            config.pipeline.confidence_threshold = conf;
        }
        if let Some(label) = &self.label {
            config.pipeline.target_label = label.clone();
        }
        if let Some(settle_ms) = self.settle_ms {
            config.watch.settle_ms = settle_ms;
        }
        if let Some(jobs) = self.jobs {
            config.batch.max_concurrent_jobs = jobs;
        }
        if let Some(api_key) = &self.api_key {
            config.classifier.api_key = api_key.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging; RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting LC-Stacker v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path).map_err(|e| anyhow::anyhow!(e.user_message()))?
        }
        None => Config::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;

    info!("Input: {:?}", cli.input);
    info!("Output: {:?}", cli.out);
    info!("Keeping '{}' frames at confidence >= {:.2}",
          config.pipeline.target_label, config.pipeline.confidence_threshold);

    let classifier = Arc::new(
        HostedClassifier::new(&config.classifier).map_err(|e| anyhow::anyhow!(e.user_message()))?,
    );
    let runner = Arc::new(StackJobRunner::new(classifier, RunnerOptions::from(&config.pipeline)));
    let settings = Arc::new(JobSettings::from_config(&config.pipeline, &cli.out));

    // Subscribe before the initial batch so stacks landing during it are not missed
    let session = if cli.watch {
        let session = WatchIngestor::new(
            Arc::clone(&runner),
            Arc::clone(&settings),
            config.watch.settle_interval(),
            config.batch.max_concurrent_jobs,
        )
        .subscribe(&cli.input)
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        Some(session)
    } else {
        None
    };

    let report = BatchIngestor::new(Arc::clone(&runner), config.batch.max_concurrent_jobs)
        .run_batch(&cli.input, Arc::clone(&settings))
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    for failure in report.failures() {
        if let Some(e) = failure.error() {
            error!("{}: {}", failure.source.display(), e.user_message());
        }
    }
    info!("Batch done: {} saved, {} skipped, {} failed", report.saved(), report.skipped(), report.failed());

    let Some(session) = session else {
        return Ok(());
    };

    info!("Press Ctrl+C to stop");
    session
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Could not listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;
    Ok(())
}
