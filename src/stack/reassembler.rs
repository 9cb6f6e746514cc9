use std::ffi::OsString;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use image::GrayImage;
use rayon::prelude::*;
use tiff::encoder::{colortype, TiffEncoder};
use tracing::debug;

use crate::error::{ReassemblyError, Result, StackerError};
use crate::stack::types::KeptFrame;

/// Writes kept frames back out as one grayscale multi-page TIFF
pub struct StackReassembler;

impl StackReassembler {
    /// Encode `frames` into a stack at `output`
    ///
    /// Frames must be strictly ascending by `index`; they are written densely, one page
    /// each, in that order. The output directory is created if needed and the file appears
    /// atomically (written as `<name>.part`, then renamed).
    pub fn reassemble<P: AsRef<Path>>(
        frames: &[KeptFrame],
        output: P,
    ) -> std::result::Result<PathBuf, ReassemblyError> {
        let output = output.as_ref();
        let output_str = output.display().to_string();

        if frames.is_empty() {
            return Err(ReassemblyError::NoFrames { path: output_str });
        }
        if frames.windows(2).any(|pair| pair[0].index >= pair[1].index) {
            return Err(ReassemblyError::OutOfOrder { path: output_str });
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| ReassemblyError::OutputDirFailed {
                path: parent.display().to_string(),
                reason: e.to_string(),
            })?;
        }

        let bytes = Self::encode(frames).map_err(|reason| ReassemblyError::EncodingFailed {
            path: output_str.clone(),
            reason,
        })?;

        let partial = Self::partial_path(output).ok_or_else(|| ReassemblyError::WriteFailed {
            path: output_str.clone(),
            reason: "output path has no file name".to_string(),
        })?;

        if let Err(e) = std::fs::write(&partial, &bytes) {
            let _ = std::fs::remove_file(&partial);
            return Err(ReassemblyError::WriteFailed {
                path: partial.display().to_string(),
                reason: e.to_string(),
            });
        }

        if let Err(e) = std::fs::rename(&partial, output) {
            let _ = std::fs::remove_file(&partial);
            return Err(ReassemblyError::WriteFailed {
                path: output_str,
                reason: e.to_string(),
            });
        }

        debug!("Wrote {} frames ({} bytes) to {}", frames.len(), bytes.len(), output_str);
        Ok(output.to_path_buf())
    }

    /// Encode off the async runtime
    pub async fn reassemble_async(frames: Vec<KeptFrame>, output: PathBuf) -> Result<PathBuf> {
        tokio::task::spawn_blocking(move || Self::reassemble(&frames, &output))
            .await
            .map_err(|e| StackerError::generic(format!("Reassembly task failed: {}", e)))?
            .map_err(StackerError::from)
    }

    /// Grayscale-convert and encode frames as a multi-page TIFF in memory
    fn encode(frames: &[KeptFrame]) -> std::result::Result<Vec<u8>, String> {
        // Indexed collect keeps page order
        let pages: Vec<GrayImage> = frames
            .par_iter()
            .map(|frame| image::imageops::grayscale(&frame.image))
            .collect();

        let mut cursor = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut cursor).map_err(|e| e.to_string())?;
            for page in &pages {
                encoder
                    .write_image::<colortype::Gray8>(page.width(), page.height(), page.as_raw())
                    .map_err(|e| e.to_string())?;
            }
        }

        Ok(cursor.into_inner())
    }

    fn partial_path(output: &Path) -> Option<PathBuf> {
        let mut name: OsString = output.file_name()?.to_os_string();
        name.push(".part");
        Some(output.with_file_name(name))
    }
}
