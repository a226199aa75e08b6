//! Crate-specific errors.

use crate::reader::Version;
use std::path::PathBuf;
use thiserror::Error;

/// Crate-specific errors.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The conversion was cancelled through the shared [CancelToken](crate::CancelToken).
    #[error("the conversion was cancelled")]
    Cancelled,

    /// A reader or writer was used after [close](crate::PointSource::close) without reopening.
    #[error("the handle is closed")]
    Closed,

    /// The header of an input file is internally inconsistent.
    #[error("corrupt header: {0}")]
    CorruptHeader(String),

    /// The input file declares zero points.
    ///
    /// An empty file is an error, never an empty bounding box.
    #[error("file contains no points: {}", .0.display())]
    EmptyFile(PathBuf),

    /// The first four bytes of the file were not `LASF`.
    #[error("invalid file signature: {0:?}")]
    InvalidFileSignature([u8; 4]),

    /// The settings were rejected before the run started.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Wrapper around `std::io::Error`.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrapper around `serde_json::Error`.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Wrapper around `laz::LasZipError`.
    #[cfg(feature = "laz")]
    #[error("laszip error: {0}")]
    Laz(#[from] laz::LasZipError),

    /// The file is laszip-compressed but the `laz` feature is not enabled.
    #[error("laszip support is not enabled (enable the `laz` feature)")]
    LaszipNotEnabled,

    /// The file is laszip-compressed but carries no laszip vlr.
    #[error("laszip vlr not found")]
    LasZipVlrNotFound,

    /// The bounds pass could not open a single input file.
    #[error("no usable input files")]
    NoUsableInput,

    /// Unsupported point data record format.
    #[error("unsupported point format: {0}")]
    UnsupportedPointFormat(u8),

    /// Unsupported las version.
    #[error("unsupported las version: {0}")]
    UnsupportedVersion(Version),
}
