use crate::classifier::Classification;
use crate::pipeline::job::JobSettings;

/// Canonical form of a label for comparison
///
/// Lower-cases, trims, and collapses any run of whitespace, underscores or hyphens into a
/// single `-`: `" Lung_Cell "` and `"lung cell"` both become `"lung-cell"`.
pub fn normalize_label(label: &str) -> String {
    label
        .split(|c: char| c.is_whitespace() || c == '_' || c == '-')
        .filter(|part| !part.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("-")
}

/// Retention policy: the top prediction must match the target label at or above the threshold
#[derive(Debug, Clone)]
pub struct FrameFilter {
    target: String,
    threshold: f32,
}

impl FrameFilter {
    pub fn new(target_label: &str, threshold: f32) -> Self {
        Self {
            target: normalize_label(target_label),
            threshold,
        }
    }

    pub fn for_job(settings: &JobSettings) -> Self {
        Self::new(&settings.target_label, settings.confidence_threshold)
    }

    /// Whether a frame with these predictions survives
    pub fn keep(&self, classifications: &[Classification]) -> bool {
        self.retained(classifications).is_some()
    }

    /// The top prediction, if it satisfies the policy
    pub fn retained<'a>(&self, classifications: &'a [Classification]) -> Option<&'a Classification> {
        let top = classifications.first()?;
        (normalize_label(&top.label) == self.target && top.confidence >= self.threshold).then_some(top)
    }
}
