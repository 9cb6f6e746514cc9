use thiserror::Error;

/// Main error type for the LC-Stacker library
#[derive(Error, Debug)]
pub enum StackerError {
    #[error("Stack decoding error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    #[error("Stack reassembly error: {0}")]
    Reassembly(#[from] ReassemblyError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Generic(String),
}

/// Input stack could not be read as a multi-frame image
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to open stack file: {path} ({reason})")]
    OpenFailed { path: String, reason: String },

    #[error("Not a recognized stack format: {path} ({reason})")]
    UnrecognizedFormat { path: String, reason: String },

    #[error("Unsupported pixel layout in {path}: {layout}")]
    UnsupportedLayout { path: String, layout: String },

    #[error("Frame {index} of {path} is corrupt: {reason}")]
    CorruptFrame { path: String, index: usize, reason: String },
}

/// A single frame's classification call failed
///
/// Always frame-level: the runner drops the frame and moves on.
#[derive(Error, Debug)]
pub enum ClassificationError {
    #[error("Classifier request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Classifier returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("Classifier did not answer within {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("Malformed classifier response: {reason}")]
    MalformedResponse { reason: String },

    #[error("Could not encode frame for the classifier: {reason}")]
    EncodingFailed { reason: String },
}

/// Output stack could not be produced
#[derive(Error, Debug)]
pub enum ReassemblyError {
    #[error("No frames to reassemble into {path}")]
    NoFrames { path: String },

    #[error("Kept frames are not in ascending index order for {path}")]
    OutOfOrder { path: String },

    #[error("Could not create output directory {path}: {reason}")]
    OutputDirFailed { path: String, reason: String },

    #[error("Stack encoding failed for {path}: {reason}")]
    EncodingFailed { path: String, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: String, reason: String },
}

/// Failures that stop a batch or watch run before any job starts
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Input directory not found: {path}")]
    DirectoryNotFound { path: String },

    #[error("Input path is not a directory: {path}")]
    NotADirectory { path: String },

    #[error("Could not enumerate {path}: {reason}")]
    EnumerationFailed { path: String, reason: String },

    #[error("Could not watch {path}: {reason}")]
    SubscriptionFailed { path: String, reason: String },
}

/// Configuration-specific errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path}")]
    ParseFailed { path: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required configuration: {key}")]
    MissingKey { key: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Convenience type alias for Results using StackerError
pub type Result<T> = std::result::Result<T, StackerError>;

impl StackerError {
    /// Create a generic error with a custom message
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into())
    }

    /// Whether this error is confined to one stack job.
    ///
    /// Job-level errors are logged and the run moves on; everything else is fatal to the
    /// batch or watch run that raised it.
    pub fn is_job_level(&self) -> bool {
        match self {
            Self::Decode(_) | Self::Classification(_) | Self::Reassembly(_) | Self::Io(_) => true,
            Self::Ingest(_) | Self::Config(_) | Self::Generic(_) => false,
        }
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Ingest(IngestError::DirectoryNotFound { path }) => {
                format!("Input folder '{}' does not exist.", path)
            }
            Self::Ingest(IngestError::SubscriptionFailed { path, .. }) => {
                format!("Could not start watching '{}'. Check the folder exists and is readable.", path)
            }
            Self::Decode(DecodeError::UnrecognizedFormat { path, .. }) => {
                format!("'{}' is not a readable multi-frame TIFF stack.", path)
            }
            Self::Config(ConfigError::MissingKey { key }) => {
                format!("Missing required setting '{}'.", key)
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            _ => self.to_string(),
        }
    }
}
