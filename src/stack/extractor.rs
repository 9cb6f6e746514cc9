use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::Tag;
use tiff::ColorType;
use tracing::debug;

use crate::error::{DecodeError, Result, StackerError};
use crate::stack::types::Frame;

/// Splits a multi-frame TIFF stack into ordered RGB frames
pub struct FrameExtractor;

impl FrameExtractor {
    /// Decode every frame of the stack at `path`
    ///
    /// Element `i` of the result always has `index == i`. A single-page file yields one frame.
    pub fn extract<P: AsRef<Path>>(path: P) -> std::result::Result<Vec<Frame>, DecodeError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();

        let file = File::open(path).map_err(|e| DecodeError::OpenFailed {
            path: path_str.clone(),
            reason: e.to_string(),
        })?;

        let mut decoder = Decoder::new(BufReader::new(file)).map_err(|e| {
            DecodeError::UnrecognizedFormat {
                path: path_str.clone(),
                reason: e.to_string(),
            }
        })?;

        let mut frames = Vec::new();
        loop {
            let index = frames.len();
            let image = Self::decode_current(&mut decoder, &path_str, index)?;
            frames.push(Frame::new(index, image));

            if !decoder.more_images() {
                break;
            }
            decoder.next_image().map_err(|e| DecodeError::CorruptFrame {
                path: path_str.clone(),
                index: index + 1,
                reason: e.to_string(),
            })?;
        }

        debug!("Extracted {} frames from {}", frames.len(), path_str);
        Ok(frames)
    }

    /// Decode off the async runtime
    pub async fn extract_async(path: PathBuf) -> Result<Vec<Frame>> {
        tokio::task::spawn_blocking(move || Self::extract(&path))
            .await
            .map_err(|e| StackerError::generic(format!("Frame extraction task failed: {}", e)))?
            .map_err(StackerError::from)
    }

    fn decode_current(
        decoder: &mut Decoder<BufReader<File>>,
        path: &str,
        index: usize,
    ) -> std::result::Result<RgbImage, DecodeError> {
        let corrupt = |reason: String| DecodeError::CorruptFrame {
            path: path.to_string(),
            index,
            reason,
        };

        let (width, height) = decoder.dimensions().map_err(|e| corrupt(e.to_string()))?;
        let color = decoder.colortype().map_err(|e| corrupt(e.to_string()))?;
        let data = decoder.read_image().map_err(|e| corrupt(e.to_string()))?;

        let image = match (color, data) {
            (ColorType::Gray(8), DecodingResult::U8(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma8)
            }
            (ColorType::Gray(16), DecodingResult::U16(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLuma16)
            }
            (ColorType::GrayA(8), DecodingResult::U8(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA8)
            }
            (ColorType::RGB(8), DecodingResult::U8(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
            }
            (ColorType::RGB(16), DecodingResult::U16(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgb16)
            }
            (ColorType::RGBA(8), DecodingResult::U8(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
            }
            (ColorType::RGBA(16), DecodingResult::U16(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageRgba16)
            }
            (ColorType::GrayA(16), DecodingResult::U16(buf)) => {
                ImageBuffer::from_raw(width, height, buf).map(DynamicImage::ImageLumaA16)
            }
            (ColorType::Gray(32), DecodingResult::F32(buf)) => {
                let samples: Vec<f64> = buf.into_iter().map(f64::from).collect();
                gray_from_wide(width, height, &samples).map(DynamicImage::ImageLuma8)
            }
            (ColorType::Gray(64), DecodingResult::F64(buf)) => {
                gray_from_wide(width, height, &buf).map(DynamicImage::ImageLuma8)
            }
            (ColorType::Gray(32), DecodingResult::U32(buf)) => {
                let samples: Vec<u8> = buf.into_iter().map(|v| v.min(255) as u8).collect();
                ImageBuffer::from_raw(width, height, samples).map(DynamicImage::ImageLuma8)
            }
            (ColorType::CMYK(8), DecodingResult::U8(buf)) => {
                rgb_from_cmyk(width, height, &buf).map(DynamicImage::ImageRgb8)
            }
            (ColorType::Palette(8), DecodingResult::U8(buf)) => {
                let colormap = decoder
                    .get_tag_u16_vec(Tag::ColorMap)
                    .map_err(|e| corrupt(format!("palette without color map: {}", e)))?;
                rgb_from_palette(width, height, &buf, &colormap).map(DynamicImage::ImageRgb8)
            }
            (other, _) => {
                return Err(DecodeError::UnsupportedLayout {
                    path: path.to_string(),
                    layout: format!("{:?}", other),
                })
            }
        };

        let image = image.ok_or_else(|| corrupt(format!("pixel data does not fill {}x{}", width, height)))?;

        // Classification works on RGB, whatever the source layout
        Ok(match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => other.to_rgb8(),
        })
    }
}

/// Wide grayscale samples to 8 bits
///
/// Samples already in `0.0..=1.0` are scaled up; anything else is taken as 8-bit intensity and
/// clamped. NaN maps to black.
fn gray_from_wide(width: u32, height: u32, samples: &[f64]) -> Option<GrayImage> {
    let unit = samples.iter().all(|v| v.is_nan() || (0.0..=1.0).contains(v));
    let scale = if unit { 255.0 } else { 1.0 };
    let pixels: Vec<u8> = samples
        .iter()
        .map(|v| if v.is_nan() { 0 } else { (v * scale).round().clamp(0.0, 255.0) as u8 })
        .collect();
    ImageBuffer::from_raw(width, height, pixels)
}

fn rgb_from_cmyk(width: u32, height: u32, samples: &[u8]) -> Option<RgbImage> {
    let pixels: Vec<u8> = samples
        .chunks_exact(4)
        .flat_map(|cmyk| {
            let white = 255 - u16::from(cmyk[3]);
            [0usize, 1, 2].map(|i| ((255 - u16::from(cmyk[i])) * white / 255) as u8)
        })
        .collect();
    ImageBuffer::from_raw(width, height, pixels)
}

/// Expand 8-bit palette indices through a TIFF color map
///
/// The map holds every red entry, then every green, then every blue, as 16-bit values.
fn rgb_from_palette(width: u32, height: u32, indices: &[u8], colormap: &[u16]) -> Option<RgbImage> {
    let entries = colormap.len() / 3;
    if entries == 0 {
        return None;
    }
    let channel = |offset: usize, index: usize| (colormap[offset * entries + index] >> 8) as u8;

    if indices.len() != width as usize * height as usize {
        return None;
    }
    let mut image = RgbImage::new(width, height);
    for (pixel, &index) in image.pixels_mut().zip(indices) {
        let index = usize::from(index);
        if index >= entries {
            return None;
        }
        *pixel = Rgb([channel(0, index), channel(1, index), channel(2, index)]);
    }
    Some(image)
}
