use async_trait::async_trait;
use image::RgbImage;
use serde::{Deserialize, Serialize};

use crate::error::ClassificationError;

/// Capability every frame classifier must provide
///
/// Implementations may sit behind a network call: they can be slow, and a single call can
/// fail without saying anything about the rest of the stack. They must be safe to call
/// concurrently.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Classify one RGB frame
    ///
    /// # Returns
    ///
    /// Predictions sorted by descending confidence (the top prediction first), or an empty
    /// list when the service has nothing above its own floor.
    async fn classify(&self, frame: &RgbImage) -> Result<Vec<Classification>, ClassificationError>;
}

/// One label/confidence pair produced by a classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
}

impl Classification {
    pub fn new<S: Into<String>>(label: S, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// Sort predictions so the most confident comes first
pub fn sort_by_confidence(predictions: &mut [Classification]) {
    predictions.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sort_by_confidence() {
        let mut predictions = vec![
            Classification::new("other", 0.2),
            Classification::new("lc", 0.7),
            Classification::new("noise", 0.1),
        ];
        sort_by_confidence(&mut predictions);

        let labels: Vec<&str> = predictions.iter().map(|p| p.label.as_str()).collect();
        assert_eq!(labels, vec!["lc", "other", "noise"]);
    }
}
