use std::path::Path;

use image::RgbImage;

use crate::classifier::Classification;

/// File extensions recognized as multi-frame stacks (compared case-insensitively)
pub const STACK_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// One image within a stack
///
/// `index` is the frame's 0-based position in the source stack and never changes,
/// however frames are later reordered or dropped.
#[derive(Clone, Debug)]
pub struct Frame {
    pub index: usize,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: usize, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// A frame that passed the retention policy, with the prediction that kept it
#[derive(Clone, Debug)]
pub struct KeptFrame {
    pub index: usize,
    pub image: RgbImage,
    pub classification: Classification,
}

impl KeptFrame {
    pub fn new(frame: Frame, classification: Classification) -> Self {
        Self {
            index: frame.index,
            image: frame.image,
            classification,
        }
    }
}

/// Check if a path has one of the recognized stack extensions
pub fn is_stack_file<P: AsRef<Path>>(path: P) -> bool {
    match path.as_ref().extension().and_then(|ext| ext.to_str()) {
        Some(ext) => {
            let ext = ext.to_lowercase();
            STACK_EXTENSIONS.contains(&ext.as_str())
        }
        None => false,
    }
}

pub fn is_hidden_file<P: AsRef<Path>>(path: P) -> bool {
    path.as_ref()
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
