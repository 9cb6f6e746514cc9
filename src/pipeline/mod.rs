//! # Triage Pipeline
//!
//! Composes extraction, classification, filtering and reassembly into one job per stack,
//! and drives jobs from a folder either once ([`BatchIngestor`]) or continuously
//! ([`WatchIngestor`]).
//!
//! Failures are layered: a frame whose classification fails is simply not kept, a stack
//! that cannot be decoded or written fails only its own job, and only an unreadable input
//! folder or a watch that cannot be established stops a run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use lc_stacker::classifier::HostedClassifier;
//! use lc_stacker::config::Config;
//! use lc_stacker::pipeline::{BatchIngestor, JobSettings, RunnerOptions, StackJobRunner, WatchIngestor};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = Config::default();
//! let classifier = Arc::new(HostedClassifier::new(&config.classifier)?);
//! let runner = Arc::new(StackJobRunner::new(classifier, RunnerOptions::from(&config.pipeline)));
//! let settings = Arc::new(JobSettings::from_config(&config.pipeline, "outputs/"));
//!
//! let report = BatchIngestor::new(runner.clone(), 4)
//!     .run_batch("inputs/", settings.clone())
//!     .await?;
//! println!("{} saved, {} failed", report.saved(), report.failed());
//!
//! let session = WatchIngestor::new(runner, settings, Duration::from_secs(1), 4).subscribe("inputs/")?;
//! session.run(async { let _ = tokio::signal::ctrl_c().await; }).await;
//! # Ok(())
//! # }
//! ```

pub mod batch;
pub mod filter;
pub mod job;
pub mod runner;
pub mod watch;

pub use batch::{BatchIngestor, BatchReport};
pub use filter::{normalize_label, FrameFilter};
pub use job::{JobSettings, StackJob};
pub use runner::{JobReport, JobResult, RunnerOptions, StackJobRunner};
pub use watch::{DebounceTracker, WatchIngestor, WatchSession, WatchSummary};
