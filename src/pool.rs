//! The slot-keyed pool of readers and writers.
//!
//! One reader and one writer exist per worker slot, created lazily on first acquire and returned
//! after each file so the next file on the same slot reuses them. The pool is an indexed array,
//! not a map: slot ids are dense and fixed for the whole run. Exclusive use is guaranteed by the
//! scheduler's one-thread-per-slot dispatch; the take-and-put-back option slots make any
//! violation loud instead of subtly corrupting a handle.

use crate::reader::{self, PointSource};
use crate::settings::ImportSettings;
use crate::writer::pcroot::RootWriter;
use crate::writer::{PointSink, SinkFactory};
use crate::{Error, Result, Vector};
use std::sync::{Mutex, PoisonError};

/// Pooled readers and writers, one pair per worker slot.
pub(crate) struct ResourcePool {
    settings: ImportSettings,
    factory: SinkFactory,
    readers: Vec<Mutex<Option<Box<dyn PointSource>>>>,
    writers: Vec<Mutex<Option<Box<dyn PointSink>>>>,
}

impl ResourcePool {
    /// Builds the pool and, for the tiled format, the scheduler's root writer.
    pub fn new(
        slots: usize,
        settings: &ImportSettings,
        offset: Vector<f64>,
    ) -> Result<(ResourcePool, Option<RootWriter>)> {
        let (factory, root) = SinkFactory::new(settings, offset)?;
        let pool = ResourcePool {
            settings: settings.clone(),
            factory,
            readers: (0..slots).map(|_| Mutex::new(None)).collect(),
            writers: (0..slots).map(|_| Mutex::new(None)).collect(),
        };
        Ok((pool, root))
    }

    /// Takes the slot's reader, creating it on first use.
    pub fn acquire_reader(&self, slot: usize) -> Box<dyn PointSource> {
        let mut guard = self.readers[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take().unwrap_or_else(|| reader::new_source(&self.settings))
    }

    /// Returns the slot's reader to the pool.
    pub fn release_reader(&self, slot: usize, reader: Box<dyn PointSource>) {
        let mut guard = self.readers[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(reader);
    }

    /// Takes the slot's writer, creating it on first use.
    pub fn acquire_writer(&self, slot: usize) -> Box<dyn PointSink> {
        let mut guard = self.writers[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        guard.take().unwrap_or_else(|| self.factory.new_sink())
    }

    /// Returns the slot's writer to the pool.
    pub fn release_writer(&self, slot: usize, writer: Box<dyn PointSink>) {
        let mut guard = self.writers[slot]
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = Some(writer);
    }

    /// Closes every pooled writer after all workers are done.
    ///
    /// The single-file container patches its reserved header fields here. Errors are collected
    /// into the first failure so every writer still gets its close call.
    pub fn close_writers(&self) -> Result<()> {
        let mut first_failure: Option<Error> = None;
        for slot in &self.writers {
            let mut guard = slot.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(writer) = guard.as_mut() {
                if let Err(err) = writer.close() {
                    let _ = first_failure.get_or_insert(err);
                }
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reader_instances_are_reused() {
        let settings = ImportSettings::default();
        let (pool, root) = ResourcePool::new(2, &settings, Vector::default()).unwrap();
        assert!(root.is_none());
        let reader = pool.acquire_reader(0);
        pool.release_reader(0, reader);
        // Reacquiring must hand back the pooled instance, not create another.
        let _reader = pool.acquire_reader(0);
        let guard = pool.readers[0].lock().unwrap();
        assert!(guard.is_none());
    }
}
