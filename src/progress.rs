//! Per-worker progress tracking and the periodic reporter.
//!
//! Each worker slot owns one [ProgressInfo] entry; the worker stores into it at its cancellation
//! quantum and nobody else writes it, so within one file the current point is monotonically
//! non-decreasing until the next file resets it. A dedicated reporter thread wakes about once a
//! second, snapshots every slot under the shared locks, and pushes the values into an abstract
//! [ProgressSink] — json events for the cli, bar updates for a gui host, log lines otherwise.

use crate::events::EventLog;
use log::info;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::JoinHandle;
use std::time::Duration;

/// Progress of one worker slot.
#[derive(Clone, Debug, Default)]
pub struct ProgressInfo {
    /// The file the slot is working on, if any.
    pub file: Option<PathBuf>,

    /// Points processed of the current file.
    pub current_point: u64,

    /// Effective points of the current file.
    pub max_points: u64,
}

/// The slot-indexed progress table.
pub(crate) struct ProgressTable {
    slots: Vec<RwLock<ProgressInfo>>,
}

impl ProgressTable {
    pub fn new(slots: usize) -> ProgressTable {
        ProgressTable {
            slots: (0..slots).map(|_| RwLock::new(ProgressInfo::default())).collect(),
        }
    }

    fn write(&self, slot: usize, info: ProgressInfo) {
        let mut guard = self.slots[slot]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = info;
    }

    /// Resets the slot for a new file.
    pub fn start_file(&self, slot: usize, file: PathBuf, max_points: u64) {
        self.write(
            slot,
            ProgressInfo {
                file: Some(file),
                current_point: 0,
                max_points,
            },
        );
    }

    /// Stores the current point of the slot's file.
    pub fn update(&self, slot: usize, current_point: u64) {
        let mut guard = self.slots[slot]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.current_point = current_point;
    }

    /// Clears the slot when its file is done.
    pub fn finish_file(&self, slot: usize) {
        let mut guard = self.slots[slot]
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        guard.file = None;
        guard.current_point = guard.max_points;
    }

    pub fn snapshot(&self) -> Vec<ProgressInfo> {
        self.slots
            .iter()
            .map(|slot| slot.read().unwrap_or_else(PoisonError::into_inner).clone())
            .collect()
    }
}

/// Where periodic progress goes.
///
/// Conversion is correct without any sink; this only affects what an operator sees.
pub trait ProgressSink: Send {
    /// Called for every slot that has an active file, roughly once a second.
    fn report(&self, slot: usize, info: &ProgressInfo);
}

/// Sink that writes `progress` json events.
pub(crate) struct EventSink {
    events: EventLog,
}

impl EventSink {
    pub fn new(events: EventLog) -> EventSink {
        EventSink { events }
    }
}

impl ProgressSink for EventSink {
    fn report(&self, slot: usize, info: &ProgressInfo) {
        if let Some(file) = &info.file {
            self.events
                .progress(slot, info.current_point, info.max_points, file);
        }
    }
}

/// Sink that logs one line per active slot.
pub(crate) struct LogSink;

impl ProgressSink for LogSink {
    fn report(&self, slot: usize, info: &ProgressInfo) {
        if let Some(file) = &info.file {
            let percentage = if info.max_points == 0 {
                100.
            } else {
                info.current_point as f64 / info.max_points as f64 * 100.
            };
            info!(
                "slot {slot}: {}/{} ({percentage:.0}%) {}",
                info.current_point,
                info.max_points,
                file.display()
            );
        }
    }
}

/// The periodic reporter thread.
pub(crate) struct Reporter {
    stop: crossbeam_channel::Sender<()>,
    handle: JoinHandle<()>,
}

impl Reporter {
    /// Spawns the reporter over the shared table.
    pub fn spawn(table: Arc<ProgressTable>, sink: Box<dyn ProgressSink>) -> Reporter {
        let (stop, stopped) = crossbeam_channel::bounded::<()>(1);
        let handle = std::thread::spawn(move || {
            loop {
                let finished = !matches!(
                    stopped.recv_timeout(Duration::from_secs(1)),
                    Err(crossbeam_channel::RecvTimeoutError::Timeout)
                );
                for (slot, info) in table.snapshot().iter().enumerate() {
                    sink.report(slot, info);
                }
                if finished {
                    break;
                }
            }
        });
        Reporter { stop, handle }
    }

    /// Stops the reporter after one final tick.
    pub fn stop(self) {
        let _ = self.stop.send(());
        let _ = self.handle.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording(Arc<Mutex<Vec<(usize, u64)>>>);

    impl ProgressSink for Recording {
        fn report(&self, slot: usize, info: &ProgressInfo) {
            if info.file.is_some() {
                self.0
                    .lock()
                    .unwrap()
                    .push((slot, info.current_point));
            }
        }
    }

    #[test]
    fn slots_are_independent() {
        let table = ProgressTable::new(2);
        table.start_file(0, PathBuf::from("a.las"), 100);
        table.start_file(1, PathBuf::from("b.las"), 200);
        table.update(0, 10);
        table.update(1, 20);
        let snapshot = table.snapshot();
        assert_eq!(10, snapshot[0].current_point);
        assert_eq!(20, snapshot[1].current_point);
        assert_eq!(100, snapshot[0].max_points);
    }

    #[test]
    fn finish_pins_current_to_max() {
        let table = ProgressTable::new(1);
        table.start_file(0, PathBuf::from("a.las"), 100);
        table.update(0, 42);
        table.finish_file(0);
        let snapshot = table.snapshot();
        assert_eq!(100, snapshot[0].current_point);
        assert!(snapshot[0].file.is_none());
    }

    #[test]
    fn reporter_emits_final_tick_on_stop() {
        let table = Arc::new(ProgressTable::new(1));
        table.start_file(0, PathBuf::from("a.las"), 10);
        table.update(0, 5);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let reporter = Reporter::spawn(Arc::clone(&table), Box::new(Recording(Arc::clone(&seen))));
        reporter.stop();
        let seen = seen.lock().unwrap();
        assert!(!seen.is_empty());
        assert!(seen.iter().all(|&entry| entry == (0, 5)));
    }
}
