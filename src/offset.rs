//! The global bounds pass.
//!
//! When the offset is automatic — or when packed colors need non-negative coordinates — the
//! scheduler runs this pass before any conversion: open every input, take the header bounds, and
//! reduce the minima element-wise. No point is read, so the pass is cheap even for inputs with
//! hundreds of millions of points, and it is a pure function of the input set.

use crate::reader::PointSource;
use crate::{Error, Result, Vector};
use log::{debug, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Reduces all input header minima to the global offset.
///
/// Files that fail to open are counted into `errors` and skipped; if no file opens the run
/// cannot proceed and [Error::NoUsableInput] is returned.
pub(crate) fn global_offset(
    files: &[PathBuf],
    source: &mut dyn PointSource,
    errors: &AtomicU64,
) -> Result<Vector<f64>> {
    let mut minimum: Option<Vector<f64>> = None;
    for path in files {
        match source.open(path) {
            Ok(bounds) => {
                debug!("bounds of {}: {:?}", path.display(), bounds);
                minimum = Some(match minimum {
                    Some(minimum) => minimum.component_min(bounds.min),
                    None => bounds.min,
                });
            }
            Err(err) => {
                warn!("skipping {} in bounds pass: {}", path.display(), err);
                let _ = errors.fetch_add(1, Ordering::Relaxed);
            }
        }
        source.close();
    }
    minimum.ok_or(Error::NoUsableInput)
}
