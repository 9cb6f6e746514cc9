//! Shared fixtures for unit tests: synthetic stacks and a scripted classifier.

use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, Rgb, RgbImage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, TiffEncoder};

use crate::classifier::{Classification, Classifier};
use crate::error::ClassificationError;

pub const FRAME_WIDTH: u32 = 4;
pub const FRAME_HEIGHT: u32 = 3;

/// A frame whose every pixel is `(value, value, value)`
pub fn solid_rgb(value: u8) -> RgbImage {
    ImageBuffer::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([value, value, value]))
}

/// Write an RGB stack with one solid frame per entry of `values`
pub fn write_rgb_stack(path: &Path, values: &[u8]) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    for &value in values {
        let frame = solid_rgb(value);
        encoder
            .write_image::<colortype::RGB8>(FRAME_WIDTH, FRAME_HEIGHT, frame.as_raw())
            .unwrap();
    }
}

pub fn write_gray16_stack(path: &Path, values: &[u16]) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    for &value in values {
        let data = vec![value; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
        encoder
            .write_image::<colortype::Gray16>(FRAME_WIDTH, FRAME_HEIGHT, &data)
            .unwrap();
    }
}

/// Write a 32-bit float grayscale stack, as ImageJ saves them
pub fn write_gray32f_stack(path: &Path, values: &[f32]) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    for &value in values {
        let data = vec![value; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
        encoder
            .write_image::<colortype::Gray32Float>(FRAME_WIDTH, FRAME_HEIGHT, &data)
            .unwrap();
    }
}

pub fn write_gray32_stack(path: &Path, values: &[u32]) {
    let file = BufWriter::new(File::create(path).unwrap());
    let mut encoder = TiffEncoder::new(file).unwrap();
    for &value in values {
        let data = vec![value; (FRAME_WIDTH * FRAME_HEIGHT) as usize];
        encoder
            .write_image::<colortype::Gray32>(FRAME_WIDTH, FRAME_HEIGHT, &data)
            .unwrap();
    }
}

/// Read every page of an 8-bit grayscale stack
pub fn read_gray_stack(path: &Path) -> Vec<Vec<u8>> {
    let mut decoder = Decoder::new(File::open(path).unwrap()).unwrap();
    let mut pages = Vec::new();
    loop {
        assert_eq!(decoder.colortype().unwrap(), tiff::ColorType::Gray(8));
        match decoder.read_image().unwrap() {
            DecodingResult::U8(data) => pages.push(data),
            _ => panic!("expected 8-bit pages"),
        }
        if !decoder.more_images() {
            break;
        }
        decoder.next_image().unwrap();
    }
    pages
}

/// First value of every page, handy for checking page order
pub fn page_values(path: &Path) -> Vec<u8> {
    read_gray_stack(path).iter().map(|page| page[0]).collect()
}

#[derive(Clone)]
enum Reply {
    Predict(Vec<Classification>),
    Fail,
}

#[derive(Clone)]
struct Script {
    reply: Reply,
    delay: Duration,
}

/// Deterministic classifier keyed on a frame's first pixel value
///
/// Unscripted frames are classified as `other` with high confidence.
pub struct ScriptedClassifier {
    scripts: HashMap<u8, Script>,
    calls: AtomicUsize,
    completed: Mutex<Vec<u8>>,
}

impl ScriptedClassifier {
    pub fn new() -> Self {
        Self {
            scripts: HashMap::new(),
            calls: AtomicUsize::new(0),
            completed: Mutex::new(Vec::new()),
        }
    }

    pub fn predict(self, value: u8, label: &str, confidence: f32) -> Self {
        self.predict_after(value, label, confidence, Duration::ZERO)
    }

    pub fn predict_after(mut self, value: u8, label: &str, confidence: f32, delay: Duration) -> Self {
        self.scripts.insert(
            value,
            Script {
                reply: Reply::Predict(vec![
                    Classification::new(label, confidence),
                    Classification::new("runner-up", (1.0 - confidence).min(confidence)),
                ]),
                delay,
            },
        );
        self
    }

    pub fn empty(mut self, value: u8) -> Self {
        self.scripts.insert(value, Script { reply: Reply::Predict(Vec::new()), delay: Duration::ZERO });
        self
    }

    pub fn fail(mut self, value: u8) -> Self {
        self.scripts.insert(value, Script { reply: Reply::Fail, delay: Duration::ZERO });
        self
    }

    /// Answer only after `delay`, long enough to trip a short classify timeout
    pub fn stall(mut self, value: u8, delay: Duration) -> Self {
        self.scripts.insert(
            value,
            Script { reply: Reply::Predict(vec![Classification::new("lc", 1.0)]), delay },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Frame values in the order their classification finished
    pub fn completion_order(&self) -> Vec<u8> {
        self.completed.lock().unwrap().clone()
    }
}

#[async_trait]
impl Classifier for ScriptedClassifier {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn classify(&self, frame: &RgbImage) -> Result<Vec<Classification>, ClassificationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = frame.get_pixel(0, 0)[0];

        let script = self.scripts.get(&value).cloned().unwrap_or(Script {
            reply: Reply::Predict(vec![Classification::new("other", 0.99)]),
            delay: Duration::ZERO,
        });

        if !script.delay.is_zero() {
            tokio::time::sleep(script.delay).await;
        }
        self.completed.lock().unwrap().push(value);

        match script.reply {
            Reply::Predict(predictions) => Ok(predictions),
            Reply::Fail => Err(ClassificationError::RequestFailed {
                reason: format!("scripted failure for frame value {}", value),
            }),
        }
    }
}
