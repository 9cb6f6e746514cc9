//! # Frame Classification
//!
//! The [`Classifier`] trait is the seam between the pipeline and whatever labels frames.
//! The pipeline receives it as an `Arc<dyn Classifier>` at construction time, so tests can
//! swap in a deterministic stub and production code uses [`HostedClassifier`].
//!
//! ## Implementing a classifier
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use image::RgbImage;
//! use lc_stacker::classifier::{Classification, Classifier};
//! use lc_stacker::error::ClassificationError;
//!
//! struct Brightness;
//!
//! #[async_trait]
//! impl Classifier for Brightness {
//!     fn name(&self) -> &str {
//!         "brightness"
//!     }
//!
//!     async fn classify(&self, frame: &RgbImage) -> Result<Vec<Classification>, ClassificationError> {
//!         let half = (frame.width() * frame.height()) as usize / 2;
//!         let bright = frame.pixels().filter(|p| p[0] > 128).count() > half;
//!         Ok(vec![Classification::new(if bright { "lc" } else { "other" }, 1.0)])
//!     }
//! }
//! ```

pub mod hosted;
pub mod traits;

pub use hosted::HostedClassifier;
pub use traits::{sort_by_confidence, Classification, Classifier};
