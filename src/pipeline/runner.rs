use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use futures::FutureExt;
use tracing::{debug, error, info, warn};

use crate::classifier::{Classification, Classifier};
use crate::config::PipelineConfig;
use crate::error::{ClassificationError, Result, StackerError};
use crate::pipeline::filter::FrameFilter;
use crate::pipeline::job::StackJob;
use crate::stack::{Frame, FrameExtractor, KeptFrame, StackReassembler};

/// Classification fan-out and timeout for one job
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub max_concurrent_classifications: usize,
    pub classify_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for RunnerOptions {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            max_concurrent_classifications: config.max_concurrent_classifications,
            classify_timeout: config.classify_timeout(),
        }
    }
}

/// What a completed job produced
#[derive(Debug, Clone, PartialEq)]
pub struct JobResult {
    /// Frames in the source stack
    pub frame_count: usize,

    /// Frames that passed the retention policy
    pub kept_count: usize,

    /// Frames dropped because their classify call failed
    pub classification_failures: usize,

    /// Written stack, or `None` when nothing was kept
    pub output_path: Option<PathBuf>,
}

impl JobResult {
    /// No frames kept, so nothing was written
    pub fn is_skipped(&self) -> bool {
        self.output_path.is_none()
    }
}

/// Outcome of one job, successful or not, tagged with its source file
#[derive(Debug)]
pub struct JobReport {
    pub source: PathBuf,
    pub elapsed: Duration,
    pub outcome: Result<JobResult>,
}

impl JobReport {
    pub fn result(&self) -> Option<&JobResult> {
        self.outcome.as_ref().ok()
    }

    pub fn error(&self) -> Option<&StackerError> {
        self.outcome.as_ref().err()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_err()
    }
}

/// Runs the extract → classify → filter → reassemble pipeline for one stack
///
/// A failing frame never fails the job, and a failing job never escapes [`run`](Self::run).
pub struct StackJobRunner {
    classifier: Arc<dyn Classifier>,
    options: RunnerOptions,
}

impl StackJobRunner {
    pub fn new(classifier: Arc<dyn Classifier>, options: RunnerOptions) -> Self {
        Self { classifier, options }
    }

    pub fn classifier_name(&self) -> &str {
        self.classifier.name()
    }

    /// Process one stack, capturing every failure in the returned report
    pub async fn run(&self, job: &StackJob) -> JobReport {
        let name = job.file_name();
        let started = Instant::now();
        info!("→ Processing {}", name);

        let outcome = match AssertUnwindSafe(self.try_run(job)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => Err(StackerError::generic(format!("job for {} panicked", name))),
        };

        match &outcome {
            Ok(JobResult { output_path: Some(path), kept_count, frame_count, .. }) => {
                info!("   ✔ Saved {} of {} slices from {} → {}", kept_count, frame_count, name, path.display());
            }
            Ok(result) => {
                info!("   – No {} slices in {} ({} frames); skipping",
                      job.settings().output_tag(), name, result.frame_count);
            }
            Err(e) => {
                error!("   ✖ Error on {}: {}", name, e);
            }
        }

        JobReport {
            source: job.source().to_path_buf(),
            elapsed: started.elapsed(),
            outcome,
        }
    }

    /// Process one stack, returning the first job-level error
    pub async fn try_run(&self, job: &StackJob) -> Result<JobResult> {
        let frames = FrameExtractor::extract_async(job.source().to_path_buf()).await?;
        let frame_count = frames.len();
        debug!("{}: classifying {} frames with {}", job.file_name(), frame_count, self.classifier.name());

        let filter = FrameFilter::for_job(job.settings());
        let (kept, classification_failures) = self.classify_frames(frames, &filter, &job.file_name()).await;

        if kept.is_empty() {
            return Ok(JobResult {
                frame_count,
                kept_count: 0,
                classification_failures,
                output_path: None,
            });
        }

        let kept_count = kept.len();
        let output = StackReassembler::reassemble_async(kept, job.output_path()).await?;

        Ok(JobResult {
            frame_count,
            kept_count,
            classification_failures,
            output_path: Some(output),
        })
    }

    /// Classify all frames concurrently and return the survivors sorted by index
    async fn classify_frames(
        &self,
        frames: Vec<Frame>,
        filter: &FrameFilter,
        name: &str,
    ) -> (Vec<KeptFrame>, usize) {
        let limit = self.options.max_concurrent_classifications.max(1);

        // Completion order is arbitrary from here on
        let mut verdicts = stream::iter(frames)
            .map(|frame| async move {
                let verdict = self.classify_frame(&frame).await;
                (frame, verdict)
            })
            .buffer_unordered(limit);

        let mut kept = Vec::new();
        let mut failures = 0;

        while let Some((frame, verdict)) = verdicts.next().await {
            match verdict {
                Ok(predictions) => match filter.retained(&predictions) {
                    Some(top) => {
                        debug!("{}: frame {} kept ({} @ {:.3})", name, frame.index, top.label, top.confidence);
                        let top = top.clone();
                        kept.push(KeptFrame::new(frame, top));
                    }
                    None => {
                        debug!("{}: frame {} dropped ({})", name, frame.index, describe_top(&predictions));
                    }
                },
                Err(e) => {
                    failures += 1;
                    warn!("{}: frame {} not classified, dropping it: {}", name, frame.index, e);
                }
            }
        }

        kept.sort_by_key(|frame| frame.index);
        (kept, failures)
    }

    async fn classify_frame(&self, frame: &Frame) -> std::result::Result<Vec<Classification>, ClassificationError> {
        let timeout = self.options.classify_timeout;
        match tokio::time::timeout(timeout, self.classifier.classify(&frame.image)).await {
            Ok(result) => result,
            Err(_) => Err(ClassificationError::Timeout {
                after_ms: timeout.as_millis() as u64,
            }),
        }
    }
}

fn describe_top(predictions: &[Classification]) -> String {
    match predictions.first() {
        Some(top) => format!("{} @ {:.3}", top.label, top.confidence),
        None => "no prediction".to_string(),
    }
}
