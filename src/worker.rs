//! End-to-end processing of one input file.
//!
//! A worker borrows its slot's reader and writer from the pool, streams the file's points
//! through the transform pipeline into the writer, and keeps the shared progress, error, and
//! metadata state current. No failure here ever crosses the worker boundary: open and write
//! failures are logged and counted and the file is skipped; a mid-stream point error truncates
//! the file with a warning and what was read still counts as partial success.

use crate::cancel::CancelToken;
use crate::decimate::Decimator;
use crate::events::EventLog;
use crate::metadata::FileMetadata;
use crate::pool::ResourcePool;
use crate::progress::ProgressTable;
use crate::reader::PointSource;
use crate::settings::ImportSettings;
use crate::transform::TransformPipeline;
use crate::writer::{FlushStats, PointSink};
use log::{error, info, warn};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

/// Everything a worker needs, borrowed from the scheduler.
pub(crate) struct WorkerContext<'a> {
    pub slot: usize,
    pub settings: &'a ImportSettings,
    pub pipeline: TransformPipeline,
    pub pool: &'a ResourcePool,
    pub progress: &'a ProgressTable,
    pub cancel: &'a CancelToken,
    pub errors: &'a AtomicU64,
    pub metadata: &'a Mutex<Vec<FileMetadata>>,
    pub events: EventLog,
}

/// What happened to one file.
#[derive(Clone, Copy, Debug)]
pub(crate) enum FileOutcome {
    /// Points were flushed; carries the per-file statistics.
    Converted(FlushStats),
    /// Metadata was captured, nothing was written.
    MetadataOnly,
    /// The file was skipped after a counted error.
    Skipped,
    /// Cancellation was observed; the caller stops dispatching.
    Cancelled,
}

/// Processes one file on the given slot, releasing all pooled resources on every path.
pub(crate) fn process_file(ctx: &WorkerContext<'_>, file_index: usize, path: &Path) -> FileOutcome {
    let mut reader = ctx.pool.acquire_reader(ctx.slot);
    let mut writer = None;
    let outcome = convert_file(ctx, file_index, path, reader.as_mut(), &mut writer);
    reader.close();
    ctx.pool.release_reader(ctx.slot, reader);
    if let Some(writer) = writer {
        ctx.pool.release_writer(ctx.slot, writer);
    }
    outcome
}

fn convert_file(
    ctx: &WorkerContext<'_>,
    file_index: usize,
    path: &Path,
    reader: &mut dyn PointSource,
    writer_slot: &mut Option<Box<dyn PointSink>>,
) -> FileOutcome {
    if let Err(err) = reader.open(path) {
        report_error(ctx, path, format!("cannot open {}: {err}", path.display()));
        return FileOutcome::Skipped;
    }

    if ctx.settings.captures_metadata() {
        match reader.metadata() {
            Ok(header) => {
                let mut metadata = ctx
                    .metadata
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner);
                metadata.push(header);
            }
            Err(err) => {
                report_error(ctx, path, format!("cannot capture {}: {err}", path.display()));
            }
        }
    }
    if ctx.settings.metadata_only {
        return FileOutcome::MetadataOnly;
    }

    let total = reader.point_count();
    let effective = Decimator::effective_count(ctx.settings, total);
    ctx.events.file_started(file_index, path, effective);
    ctx.progress.start_file(ctx.slot, path.to_path_buf(), effective);

    let writer = writer_slot.insert(ctx.pool.acquire_writer(ctx.slot));
    if let Err(err) = writer.init(effective) {
        report_error(ctx, path, format!("cannot init writer for {}: {err}", path.display()));
        ctx.progress.finish_file(ctx.slot);
        return FileOutcome::Skipped;
    }

    let quantum = (total / 100).max(1);
    let mut decimator = Decimator::new(ctx.settings);
    let mut written: u64 = 0;
    let mut gps_sum = 0.;
    let mut gps_count: u64 = 0;
    let mut raw_index: u64 = 0;
    loop {
        if raw_index % quantum == 0 {
            if ctx.cancel.is_cancelled() {
                return FileOutcome::Cancelled;
            }
            ctx.progress.update(ctx.slot, written);
        }
        if decimator.is_done() {
            break;
        }
        match reader.read_point() {
            Ok(Some(point)) => {
                if decimator.admit(raw_index) {
                    let point = ctx.pipeline.apply(point);
                    if ctx.settings.average_timestamp {
                        if let Some(time) = point.gps_time {
                            gps_sum += time;
                            gps_count += 1;
                        }
                    }
                    if let Err(err) = writer.add_point(written, &point) {
                        report_error(
                            ctx,
                            path,
                            format!("write failed at point {written} of {}: {err}", path.display()),
                        );
                        ctx.progress.finish_file(ctx.slot);
                        return FileOutcome::Skipped;
                    }
                    written += 1;
                }
                raw_index += 1;
            }
            Ok(None) => break,
            Err(err) => {
                // Truncation, not failure: everything read so far is still written out.
                warn!(
                    "truncating {} at point {raw_index} of {total}: {err}",
                    path.display()
                );
                break;
            }
        }
    }

    match writer.save(file_index) {
        Ok(stats) => {
            ctx.progress.finish_file(ctx.slot);
            let average_gps_time = (gps_count > 0).then(|| gps_sum / gps_count as f64);
            ctx.events
                .file_completed(file_index, path, &stats, average_gps_time);
            info!(
                "{}: {} points written{}",
                path.display(),
                stats.points_written,
                if stats.clamped > 0 {
                    format!(", {} clamped", stats.clamped)
                } else {
                    String::new()
                }
            );
            FileOutcome::Converted(stats)
        }
        Err(err) => {
            report_error(ctx, path, format!("cannot save {}: {err}", path.display()));
            ctx.progress.finish_file(ctx.slot);
            FileOutcome::Skipped
        }
    }
}

fn report_error(ctx: &WorkerContext<'_>, path: &Path, message: String) {
    error!("{message}");
    let _ = ctx.errors.fetch_add(1, Ordering::Relaxed);
    ctx.events.error(&message, Some(path));
}
