//! Structured log events.
//!
//! With `json` enabled, the converter emits one JSON object per line on stdout: `file` events at
//! per-file start and completion, periodic `progress` events, `error` events, and a final `end`
//! event carrying the run totals. Without it, the same information flows through the `log` crate
//! and whatever logger the host installed.

use crate::writer::FlushStats;
use serde_json::json;
use std::path::Path;

/// Emits newline-delimited json events to stdout when enabled.
#[derive(Clone, Copy, Debug)]
pub(crate) struct EventLog {
    enabled: bool,
}

impl EventLog {
    pub fn new(enabled: bool) -> EventLog {
        EventLog { enabled }
    }

    fn emit(&self, event: serde_json::Value) {
        if self.enabled {
            println!("{event}");
        }
    }

    pub fn file_started(&self, index: usize, path: &Path, points: u64) {
        self.emit(json!({
            "event": "file",
            "status": "start",
            "index": index,
            "file": path.display().to_string(),
            "points": points,
        }));
    }

    pub fn file_completed(
        &self,
        index: usize,
        path: &Path,
        stats: &FlushStats,
        average_gps_time: Option<f64>,
    ) {
        self.emit(json!({
            "event": "file",
            "status": "complete",
            "index": index,
            "file": path.display().to_string(),
            "points": stats.points_written,
            "clamped": stats.clamped,
            "droppedNonFinite": stats.dropped_non_finite,
            "tilesKept": stats.tiles_kept,
            "tilesDropped": stats.tiles_dropped,
            "pointsDropped": stats.points_dropped,
            "averageGpsTime": average_gps_time,
        }));
    }

    pub fn progress(&self, thread: usize, current: u64, total: u64, file: &Path) {
        let percentage = if total == 0 {
            100.
        } else {
            (current as f64 / total as f64 * 100.).round()
        };
        self.emit(json!({
            "event": "progress",
            "thread": thread,
            "currentPoint": current,
            "totalPoints": total,
            "percentage": percentage,
            "file": file.display().to_string(),
        }));
    }

    pub fn error(&self, message: &str, path: Option<&Path>) {
        self.emit(json!({
            "event": "error",
            "message": message,
            "file": path.map(|p| p.display().to_string()),
        }));
    }

    pub fn end(&self, files: usize, points: u64, errors: u64, elapsed_ms: u128, status: &str) {
        self.emit(json!({
            "event": "end",
            "files": files,
            "points": points,
            "errors": errors,
            "elapsedMs": elapsed_ms,
            "status": status,
        }));
    }
}
