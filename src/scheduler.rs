//! Bounded-parallel conversion of the whole input set.
//!
//! [convert] is the single entry point of the crate. The protocol:
//!
//! 1. validate the settings,
//! 2. enumerate the input files (shuffled when requested, capped by `max_files`),
//! 3. run the header-only bounds pass when the offset requires it,
//! 4. spin up one worker thread per slot, all draining one channel of file indices,
//! 5. finalize: close the pooled writers, write the root index (tiled format, non-cancelled
//!    runs only), write the metadata sidecar, stop the reporter, emit the `end` event.
//!
//! The fixed pool of worker threads is the counting semaphore: at most `max_threads` files are
//! in flight, and a worker only takes the next index once its slot's reader and writer are back
//! in the pool. Nothing a worker does can abort the run; only invalid settings, an unusable
//! input set, or cancellation end it early.

use crate::cancel::CancelToken;
use crate::events::EventLog;
use crate::metadata::{self, FileMetadata};
use crate::offset;
use crate::pool::ResourcePool;
use crate::progress::{EventSink, LogSink, ProgressSink, ProgressTable, Reporter};
use crate::reader;
use crate::settings::{ExportFormat, ImportSettings, OffsetMode};
use crate::transform::TransformPipeline;
use crate::worker::{self, FileOutcome, WorkerContext};
use crate::{Result, Vector};
use log::{error, info};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// How a run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// All dispatched files were processed.
    Completed,
    /// The cancellation token was set; outputs may be partial.
    Cancelled,
}

/// Totals of one conversion run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Summary {
    /// Whether the run completed or was cancelled.
    pub status: RunStatus,
    /// Files fully processed (converted, or captured in a metadata-only run).
    pub files_converted: usize,
    /// Points written across all files, before tile-threshold drops.
    pub points_written: u64,
    /// Counted per-file and per-pass errors; these do not abort a run.
    pub errors: u64,
}

/// Converts every input file according to the settings.
///
/// Per-file failures are logged, counted into [Summary::errors], and skipped. Fatal conditions
/// (invalid settings, no usable input for the bounds pass) return an error instead.
///
/// # Examples
///
/// ```no_run
/// use pcconvert::{CancelToken, ImportSettings, convert};
///
/// let mut settings = ImportSettings::default();
/// settings.input_files.push("cloud.las".into());
/// settings.output = "cloud.ucpc".into();
/// let summary = convert(&settings, &CancelToken::new()).unwrap();
/// println!("{} points", summary.points_written);
/// ```
pub fn convert(settings: &ImportSettings, cancel: &CancelToken) -> Result<Summary> {
    let events = EventLog::new(settings.json_events);
    let sink: Box<dyn ProgressSink> = if settings.json_events {
        Box::new(EventSink::new(events))
    } else {
        Box::new(LogSink)
    };
    convert_with_progress(settings, cancel, sink)
}

/// Like [convert], but with a caller-supplied progress sink.
///
/// The sink only affects what an operator sees; conversion is correct without one. A gui host
/// would pass a sink that drives its per-slot progress bars, headless runs use [convert].
pub fn convert_with_progress(
    settings: &ImportSettings,
    cancel: &CancelToken,
    sink: Box<dyn ProgressSink>,
) -> Result<Summary> {
    settings.validate()?;
    let start = Instant::now();
    let events = EventLog::new(settings.json_events);

    let files = enumerate_files(settings);
    let slots = worker_slots(settings, files.len());
    info!(
        "converting {} file(s) to {} on {} worker(s)",
        files.len(),
        settings.export_format,
        slots
    );

    let errors = AtomicU64::new(0);
    let collected: Mutex<Vec<FileMetadata>> = Mutex::new(Vec::new());

    let offset = resolve_offset(settings, &files, &errors)?;
    let pipeline = TransformPipeline::new(settings, offset);

    let (pool, root_writer) = ResourcePool::new(slots, settings, offset)?;
    let progress = Arc::new(ProgressTable::new(slots));
    let reporter = Reporter::spawn(Arc::clone(&progress), sink);

    let (sender, receiver) = crossbeam_channel::unbounded::<usize>();
    for file_index in 0..files.len() {
        let _ = sender.send(file_index);
    }
    drop(sender);

    let mut files_converted = 0;
    let mut points_written = 0;
    std::thread::scope(|scope| {
        let mut handles = Vec::with_capacity(slots);
        for slot in 0..slots {
            let receiver = receiver.clone();
            let files = &files;
            let pool = &pool;
            let progress = &progress;
            let errors = &errors;
            let collected = &collected;
            handles.push(scope.spawn(move || {
                let ctx = WorkerContext {
                    slot,
                    settings,
                    pipeline,
                    pool,
                    progress,
                    cancel,
                    errors,
                    metadata: collected,
                    events,
                };
                let mut converted = 0usize;
                let mut points = 0u64;
                while let Ok(file_index) = receiver.recv() {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let path = &files[file_index];
                    let outcome = catch_unwind(AssertUnwindSafe(|| {
                        worker::process_file(&ctx, file_index, path)
                    }));
                    match outcome {
                        Ok(FileOutcome::Converted(stats)) => {
                            converted += 1;
                            points += stats.points_written;
                        }
                        Ok(FileOutcome::MetadataOnly) => converted += 1,
                        Ok(FileOutcome::Skipped) => {}
                        Ok(FileOutcome::Cancelled) => break,
                        Err(_) => {
                            let message =
                                format!("worker {slot} panicked on {}", path.display());
                            error!("{message}");
                            let _ = errors.fetch_add(1, Ordering::Relaxed);
                            events.error(&message, Some(path));
                        }
                    }
                }
                (converted, points)
            }));
        }
        for handle in handles {
            if let Ok((converted, points)) = handle.join() {
                files_converted += converted;
                points_written += points;
            }
        }
    });

    let cancelled = cancel.is_cancelled();
    if let Err(err) = pool.close_writers() {
        error!("closing writers failed: {err}");
        let _ = errors.fetch_add(1, Ordering::Relaxed);
        events.error(&format!("closing writers failed: {err}"), None);
    }
    if !cancelled {
        if let Some(mut root) = root_writer {
            match root.close() {
                Ok(Some(summary)) => {
                    info!("root index: {} tiles, {} points", summary.tiles, summary.points);
                }
                Ok(None) => {}
                Err(err) => {
                    error!("writing root index failed: {err}");
                    let _ = errors.fetch_add(1, Ordering::Relaxed);
                    events.error(&format!("writing root index failed: {err}"), None);
                }
            }
        }
        if settings.captures_metadata() {
            let collected = collected.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(err) = metadata::write_sidecar(&settings.sidecar_path(), &collected) {
                error!("writing metadata sidecar failed: {err}");
                let _ = errors.fetch_add(1, Ordering::Relaxed);
                events.error(&format!("writing metadata sidecar failed: {err}"), None);
            }
        }
    }
    reporter.stop();

    let status = if cancelled {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    let summary = Summary {
        status,
        files_converted,
        points_written,
        errors: errors.load(Ordering::Relaxed),
    };
    events.end(
        summary.files_converted,
        summary.points_written,
        summary.errors,
        start.elapsed().as_millis(),
        match status {
            RunStatus::Completed => "completed",
            RunStatus::Cancelled => "cancelled",
        },
    );
    Ok(summary)
}

/// Applies the shuffle and the `max_files` cap to the input list.
fn enumerate_files(settings: &ImportSettings) -> Vec<PathBuf> {
    let mut files = settings.input_files.clone();
    if settings.randomize {
        let seed = settings.seed.unwrap_or_else(rand::random);
        info!("shuffling {} file(s) with seed {seed}", files.len());
        let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
        files.shuffle(&mut rng);
    }
    if settings.max_files > 0 && files.len() > settings.max_files {
        files.truncate(settings.max_files);
    }
    files
}

/// Clamps the requested parallelism to `[1, file count]`.
///
/// The single-file container is strictly sequential and always runs on one slot.
fn worker_slots(settings: &ImportSettings, file_count: usize) -> usize {
    if settings.export_format == ExportFormat::Ucpc {
        return 1;
    }
    settings.max_threads.clamp(1, file_count.max(1))
}

/// Resolves the offset the transform pipeline subtracts.
///
/// When a bounds pass is due it wins, even over a manual offset, because packed colors depend on
/// the coordinates being non-negative.
fn resolve_offset(
    settings: &ImportSettings,
    files: &[PathBuf],
    errors: &AtomicU64,
) -> Result<Vector<f64>> {
    if settings.needs_bounds_pass() {
        let mut source = reader::new_source(settings);
        let offset = offset::global_offset(files, source.as_mut(), errors)?;
        info!("global offset: {} {} {}", offset.x, offset.y, offset.z);
        Ok(offset)
    } else {
        match settings.offset {
            OffsetMode::Manual(offset) => Ok(offset),
            _ => Ok(Vector::default()),
        }
    }
}
