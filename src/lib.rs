//! # LC-Stacker
//!
//! Triage multi-frame image stacks: classify every frame, keep the frames that match a
//! target category with enough confidence, and write them back out, in their original
//! order, as one grayscale stack per input.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use lc_stacker::{
//!     classifier::HostedClassifier,
//!     config::Config,
//!     pipeline::{BatchIngestor, JobSettings, RunnerOptions, StackJobRunner},
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let mut config = Config::default();
//! config.classifier.api_key = "my-key".to_string();
//!
//! let classifier = Arc::new(HostedClassifier::new(&config.classifier)?);
//! let runner = Arc::new(StackJobRunner::new(classifier, RunnerOptions::from(&config.pipeline)));
//! let settings = Arc::new(JobSettings::from_config(&config.pipeline, "reassembled/"));
//!
//! let report = BatchIngestor::new(runner, config.batch.max_concurrent_jobs)
//!     .run_batch("inputs/", settings)
//!     .await?;
//! println!("{} stacks saved", report.saved());
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`stack`] - Multi-frame TIFF decoding and grayscale reassembly
//! - [`classifier`] - The frame classification capability and its hosted adapter
//! - [`pipeline`] - Per-stack jobs, retention policy, batch and watch ingestion
//! - [`config`] - Configuration management
//!
//! ## Plugging in another classifier
//!
//! Anything implementing [`Classifier`](classifier::Classifier) can be handed to
//! [`StackJobRunner`](pipeline::StackJobRunner); see the [`classifier`] module.

pub mod classifier;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod stack;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types for convenience
pub use crate::{
    classifier::{Classification, Classifier, HostedClassifier},
    config::Config,
    error::{Result, StackerError},
    pipeline::{BatchIngestor, JobSettings, StackJobRunner, WatchIngestor},
};
