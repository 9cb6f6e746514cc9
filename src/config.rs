use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

/// Main configuration for LC-Stacker
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Retention policy and per-job classification settings
    pub pipeline: PipelineConfig,

    /// One-shot folder processing settings
    pub batch: BatchConfig,

    /// Folder watching settings
    pub watch: WatchConfig,

    /// Hosted classifier connection
    pub classifier: ClassifierConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|_| ConfigError::FileNotFound { path: path.display().to_string() })?;

        let config: Config = toml::from_str(&content)
            .map_err(|_| ConfigError::ParseFailed { path: path.display().to_string() })?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::InvalidValue {
                key: "config".to_string(),
                value: e.to_string()
            })?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;
        self.batch.validate()?;
        self.classifier.validate()?;
        Ok(())
    }
}

/// Retention policy and classification fan-out
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Category whose frames are kept
    pub target_label: String,

    /// Minimum top-prediction confidence, inclusive (0.0-1.0)
    pub confidence_threshold: f32,

    /// Classifier calls allowed in flight for one stack
    pub max_concurrent_classifications: usize,

    /// Upper bound on a single classify call (milliseconds)
    pub classify_timeout_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_label: "lc".to_string(),
            confidence_threshold: 0.90,
            max_concurrent_classifications: 4,
            classify_timeout_ms: 30_000,
        }
    }
}

impl PipelineConfig {
    pub fn classify_timeout(&self) -> Duration {
        Duration::from_millis(self.classify_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.confidence_threshold".to_string(),
                value: self.confidence_threshold.to_string()
            }.into());
        }

        if self.target_label.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.target_label".to_string(),
                value: format!("{:?}", self.target_label)
            }.into());
        }

        if self.max_concurrent_classifications == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.max_concurrent_classifications".to_string(),
                value: self.max_concurrent_classifications.to_string()
            }.into());
        }

        if self.classify_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "pipeline.classify_timeout_ms".to_string(),
                value: self.classify_timeout_ms.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Batch processing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Stacks processed at the same time (also caps watch-mode jobs)
    pub max_concurrent_jobs: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            // Each job already fans out to the classifier; keep the total modest
            max_concurrent_jobs: num_cpus::get().clamp(1, 4),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "batch.max_concurrent_jobs".to_string(),
                value: self.max_concurrent_jobs.to_string()
            }.into());
        }

        Ok(())
    }
}

/// Folder watch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchConfig {
    /// Quiet period after the last write event before a new stack is processed (milliseconds)
    pub settle_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { settle_ms: 1_000 }
    }
}

impl WatchConfig {
    pub fn settle_interval(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Hosted classifier connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Base URL of the classification service
    pub endpoint: String,

    /// Model project name
    pub project: String,

    /// Model version
    pub version: String,

    /// API key; may also come from the command line or `LC_STACKER_API_KEY`
    pub api_key: String,

    /// JPEG quality used when uploading frames (1-100)
    pub jpeg_quality: u8,

    /// HTTP request timeout (milliseconds)
    pub request_timeout_ms: u64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://classify.roboflow.com".to_string(),
            project: "lc-stacker".to_string(),
            version: "2".to_string(),
            api_key: String::new(),
            jpeg_quality: 95,
            request_timeout_ms: 30_000,
        }
    }
}

impl ClassifierConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::InvalidValue {
                key: "classifier.jpeg_quality".to_string(),
                value: self.jpeg_quality.to_string()
            }.into());
        }

        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingKey {
                key: "classifier.endpoint".to_string(),
            }.into());
        }

        Ok(())
    }
}
