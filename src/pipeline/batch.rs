use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::error::{IngestError, Result};
use crate::pipeline::job::{JobSettings, StackJob};
use crate::pipeline::runner::{JobReport, StackJobRunner};
use crate::stack::{is_hidden_file, is_stack_file};

/// Reports of every job in one batch run, sorted by source path
#[derive(Debug, Default)]
pub struct BatchReport {
    pub reports: Vec<JobReport>,
}

impl BatchReport {
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Jobs that wrote an output stack
    pub fn saved(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.result().map_or(false, |result| !result.is_skipped()))
            .count()
    }

    /// Jobs that finished but kept no frames
    pub fn skipped(&self) -> usize {
        self.reports
            .iter()
            .filter(|r| r.result().map_or(false, |result| result.is_skipped()))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.reports.iter().filter(|r| r.is_failure()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.reports.iter().filter(|r| r.is_failure())
    }
}

/// One-shot processing of every stack directly inside a folder
pub struct BatchIngestor {
    runner: Arc<StackJobRunner>,
    max_concurrent_jobs: usize,
}

impl BatchIngestor {
    pub fn new(runner: Arc<StackJobRunner>, max_concurrent_jobs: usize) -> Self {
        Self {
            runner,
            max_concurrent_jobs: max_concurrent_jobs.max(1),
        }
    }

    /// List the stacks in `input_dir` (non-recursive), sorted by path
    ///
    /// Hidden files and stacks this pipeline wrote itself are left out.
    pub fn discover<P: AsRef<Path>>(input_dir: P, settings: &JobSettings) -> Result<Vec<PathBuf>> {
        let input_dir = input_dir.as_ref();
        let dir_str = input_dir.display().to_string();

        if !input_dir.exists() {
            return Err(IngestError::DirectoryNotFound { path: dir_str }.into());
        }
        if !input_dir.is_dir() {
            return Err(IngestError::NotADirectory { path: dir_str }.into());
        }

        let entries = std::fs::read_dir(input_dir).map_err(|e| IngestError::EnumerationFailed {
            path: dir_str.clone(),
            reason: e.to_string(),
        })?;

        let mut stacks = Vec::new();
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir_str, e);
                    continue;
                }
            };

            if !path.is_file() || is_hidden_file(&path) || !is_stack_file(&path) {
                continue;
            }
            if settings.is_own_output(&path) {
                debug!("Skipping previous output {:?}", path);
                continue;
            }
            stacks.push(path);
        }

        stacks.sort();
        Ok(stacks)
    }

    /// Run every stack in `input_dir` through the pipeline
    ///
    /// Fails only when the folder cannot be enumerated; individual job failures are
    /// captured in the report.
    pub async fn run_batch<P: AsRef<Path>>(&self, input_dir: P, settings: Arc<JobSettings>) -> Result<BatchReport> {
        let input_dir = input_dir.as_ref();
        let sources = Self::discover(input_dir, &settings)?;

        if sources.is_empty() {
            warn!("No .tif/.tiff stacks in {}", input_dir.display());
            return Ok(BatchReport::default());
        }

        info!("Processing {} stack(s) from {} ({} at a time)",
              sources.len(), input_dir.display(), self.max_concurrent_jobs);

        let jobs: Vec<StackJob> = sources
            .into_iter()
            .filter_map(|source| StackJob::new(source, Arc::clone(&settings)))
            .collect();

        let mut reports: Vec<JobReport> = stream::iter(jobs.iter())
            .map(|job| self.runner.run(job))
            .buffer_unordered(self.max_concurrent_jobs)
            .collect()
            .await;
        reports.sort_by(|a, b| a.source.cmp(&b.source));

        let report = BatchReport { reports };
        info!("✓ Batch done: {} saved, {} without {} slices, {} failed",
              report.saved(), report.skipped(), settings.output_tag(), report.failed());
        Ok(report)
    }
}
