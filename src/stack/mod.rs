//! # Stack I/O Module
//!
//! Splits multi-frame TIFF stacks into indexed RGB frames and writes kept frames back out
//! as dense grayscale stacks.
//!
//! ```rust,no_run
//! use lc_stacker::stack::{FrameExtractor, KeptFrame, StackReassembler};
//! use lc_stacker::classifier::Classification;
//!
//! # fn main() -> anyhow::Result<()> {
//! let frames = FrameExtractor::extract("inputs/sample.tif")?;
//! let kept: Vec<KeptFrame> = frames
//!     .into_iter()
//!     .filter(|frame| frame.index % 2 == 0)
//!     .map(|frame| KeptFrame::new(frame, Classification::new("lc", 1.0)))
//!     .collect();
//! StackReassembler::reassemble(&kept, "outputs/sample_LC_only.tif")?;
//! # Ok(())
//! # }
//! ```

pub mod extractor;
pub mod reassembler;
pub mod types;

pub use extractor::FrameExtractor;
pub use reassembler::StackReassembler;
pub use types::{is_hidden_file, is_stack_file, Frame, KeptFrame, STACK_EXTENSIONS};
