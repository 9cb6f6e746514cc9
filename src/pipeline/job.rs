use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::PipelineConfig;
use crate::pipeline::filter::normalize_label;

/// Run-wide settings shared by every job of a batch or watch session
#[derive(Debug, Clone)]
pub struct JobSettings {
    /// Category whose frames are kept
    pub target_label: String,

    /// Inclusive minimum confidence of the top prediction
    pub confidence_threshold: f32,

    /// Where reassembled stacks are written
    pub output_dir: PathBuf,
}

impl JobSettings {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(target_label: S, confidence_threshold: f32, output_dir: P) -> Self {
        Self {
            target_label: target_label.into(),
            confidence_threshold,
            output_dir: output_dir.into(),
        }
    }

    pub fn from_config<P: Into<PathBuf>>(config: &PipelineConfig, output_dir: P) -> Self {
        Self::new(config.target_label.clone(), config.confidence_threshold, output_dir)
    }

    /// Label as it appears in output names: `lc` becomes `LC`
    pub fn output_tag(&self) -> String {
        normalize_label(&self.target_label).replace('-', "_").to_uppercase()
    }

    /// Stem suffix of every output file, e.g. `_LC_only`
    pub fn output_suffix(&self) -> String {
        format!("_{}_only", self.output_tag())
    }

    /// Whether `path` looks like a stack this pipeline produced
    pub fn is_own_output<P: AsRef<Path>>(&self, path: P) -> bool {
        path.as_ref()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .map(|stem| stem.ends_with(&self.output_suffix()))
            .unwrap_or(false)
    }
}

/// One input stack to process
#[derive(Debug, Clone)]
pub struct StackJob {
    source: PathBuf,
    stem: String,
    settings: Arc<JobSettings>,
}

impl StackJob {
    /// Returns `None` when `source` has no file stem
    pub fn new<P: Into<PathBuf>>(source: P, settings: Arc<JobSettings>) -> Option<Self> {
        let source = source.into();
        let stem = source.file_stem()?.to_string_lossy().into_owned();
        Some(Self { source, stem, settings })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn settings(&self) -> &JobSettings {
        &self.settings
    }

    /// File name used in log lines
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.display().to_string())
    }

    /// `<output_dir>/<stem>_<TAG>_only.<input extension>`
    pub fn output_path(&self) -> PathBuf {
        let extension = self
            .source
            .extension()
            .map(|ext| ext.to_string_lossy().into_owned())
            .unwrap_or_else(|| "tif".to_string());

        self.settings.output_dir.join(format!(
            "{}{}.{}",
            self.stem,
            self.settings.output_suffix(),
            extension
        ))
    }
}
