//! Streaming converter for [LAS](https://en.wikipedia.org/wiki/LAS_file_format) and laszip
//! compressed point clouds.
//!
//! The converter reads las/laz files — often hundreds of millions of points each — and emits one
//! of two binary layouts: `UCPC`, a single-file container, or `PCROOT`, a spatially tiled layout
//! keyed by a grid over xyz with a root index file. Files are processed by a bounded pool of
//! workers, each streaming points through a deterministic transform pipeline (offset, scale,
//! axis operations, color resolution) into a pooled writer.
//!
//! # Converting
//!
//! Everything is driven by an [ImportSettings] record and the [convert] entry point:
//!
//! ```no_run
//! use pcconvert::{CancelToken, ExportFormat, ImportSettings, convert};
//!
//! let mut settings = ImportSettings::default();
//! settings.input_files.push("tile_a.las".into());
//! settings.input_files.push("tile_b.laz".into());
//! settings.output = "cloud".into();
//! settings.export_format = ExportFormat::Pcroot;
//! settings.grid_size = 5.;
//! settings.max_threads = 4;
//!
//! let summary = convert(&settings, &CancelToken::new()).unwrap();
//! println!("{} points in, {} errors", summary.points_written, summary.errors);
//! ```
//!
//! # Cancelling
//!
//! A [CancelToken] is shared by the scheduler and all workers. Cancelling from another thread
//! stops the run within one cancellation quantum (a hundredth of the current file); partial
//! outputs are left on disk and no root index is written:
//!
//! ```no_run
//! use pcconvert::{CancelToken, ImportSettings, RunStatus, convert};
//!
//! let settings = ImportSettings::default();
//! let cancel = CancelToken::new();
//! let handle = {
//!     let cancel = cancel.clone();
//!     std::thread::spawn(move || {
//!         std::thread::sleep(std::time::Duration::from_millis(50));
//!         cancel.cancel();
//!     })
//! };
//! let summary = convert(&settings, &cancel).unwrap();
//! handle.join().unwrap();
//! assert_eq!(RunStatus::Cancelled, summary.status);
//! ```
//!
//! # Reading
//!
//! The pooled reader behind the conversion is exposed as the [PointSource] trait for hosts that
//! embed their own pipeline; [PointSink] is its writing counterpart.

#![forbid(unsafe_code)]
#![warn(missing_docs, unused_qualifications)]

mod bounds;
mod cancel;
mod color;
mod decimate;
mod error;
mod events;
mod metadata;
mod offset;
mod point;
mod pool;
mod progress;
pub mod reader;
mod scheduler;
mod settings;
mod transform;
mod vector;
mod worker;
pub mod writer;

pub use bounds::Bounds;
pub use cancel::CancelToken;
pub use color::Color;
pub use error::Error;
pub use metadata::FileMetadata;
pub use point::Point;
pub use progress::{ProgressInfo, ProgressSink};
pub use reader::PointSource;
pub use scheduler::{RunStatus, Summary, convert, convert_with_progress};
pub use settings::{ExportFormat, ImportFormat, ImportSettings, OffsetMode};
pub use transform::TransformPipeline;
pub use vector::Vector;
pub use writer::{FlushStats, PointSink};

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;
