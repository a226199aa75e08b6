//! Write converted point clouds.
//!
//! A [PointSink] is the pooled, per-worker half of an output format: it takes transformed points
//! for one source file, and [save](PointSink::save) flushes that file's contribution. The
//! single-file container (`ucpc`) appends records to one stream; the tiled format (`pcroot`)
//! buckets points into grid cells and appends whole cell buffers to shared per-tile files.
//!
//! For the tiled format there is additionally one root writer, owned by the scheduler and never
//! touched by workers, which writes the root index when the run finishes.

pub(crate) mod pcroot;
pub(crate) mod ucpc;

use crate::settings::{ExportFormat, ImportSettings};
use crate::{Point, Result, Vector};
use std::sync::Arc;

/// Per-file flush statistics, reported with the file completion event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Points written to disk for this file.
    pub points_written: u64,

    /// Points whose cell-local fraction was clamped into `[0, 1)`.
    pub clamped: u64,

    /// Points dropped because a coordinate was not finite.
    pub dropped_non_finite: u64,

    /// Tiles this file contributed to that were flushed.
    pub tiles_kept: usize,

    /// Tile contributions discarded for being below the minimum point count.
    pub tiles_dropped: usize,

    /// Points lost with the discarded tile contributions.
    pub points_dropped: u64,
}

/// Accepts transformed points and buckets or appends them, one source file at a time.
pub trait PointSink: Send {
    /// Prepares the sink for the points of one file.
    ///
    /// `estimated_points` is the effective (post-decimation) count; formats that reserve a count
    /// up front patch the real value on close.
    fn init(&mut self, estimated_points: u64) -> Result<()>;

    /// Adds one transformed point. `index` is the running per-file point index.
    ///
    /// Never fails on malformed coordinates; those are clamped or dropped and counted. An error
    /// from this method is an I/O failure and is fatal for the file.
    fn add_point(&mut self, index: u64, point: &Point) -> Result<()>;

    /// Flushes this file's contribution to disk and returns what happened.
    fn save(&mut self, file_index: usize) -> Result<FlushStats>;

    /// Finishes the sink after all files, patching reserved header fields.
    ///
    /// Called once by the scheduler, not by workers. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Channels present in the output records.
///
/// The three rgb bytes are part of every record; `rgb` records whether they carry real color or
/// the intensity fallback. `intensity` and `time` switch their optional fields on.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Channels {
    pub rgb: bool,
    pub intensity: bool,
    pub time: bool,
}

impl Channels {
    pub fn from_settings(settings: &ImportSettings) -> Channels {
        Channels {
            rgb: settings.import_rgb,
            intensity: settings.import_intensity,
            time: settings.average_timestamp,
        }
    }
}

/// The per-slot sink factory.
///
/// For the tiled format all slots share one root state, created once by the pool.
pub(crate) enum SinkFactory {
    Ucpc(ImportSettings),
    Pcroot(Arc<pcroot::RootState>),
}

impl SinkFactory {
    pub fn new(
        settings: &ImportSettings,
        offset: Vector<f64>,
    ) -> Result<(SinkFactory, Option<pcroot::RootWriter>)> {
        if settings.metadata_only {
            // Metadata-only runs never acquire a sink; don't create output files or directories.
            return Ok((SinkFactory::Ucpc(settings.clone()), None));
        }
        match settings.export_format {
            ExportFormat::Ucpc => Ok((SinkFactory::Ucpc(settings.clone()), None)),
            ExportFormat::Pcroot => {
                let state = Arc::new(pcroot::RootState::create(settings, offset)?);
                let root = pcroot::RootWriter::new(Arc::clone(&state));
                Ok((SinkFactory::Pcroot(state), Some(root)))
            }
        }
    }

    pub fn new_sink(&self) -> Box<dyn PointSink> {
        match self {
            SinkFactory::Ucpc(settings) => Box::new(ucpc::UcpcWriter::new(settings)),
            SinkFactory::Pcroot(state) => Box::new(pcroot::PcrootWriter::new(Arc::clone(state))),
        }
    }
}
