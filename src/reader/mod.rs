//! Read las and laz point clouds.
//!
//! A [PointSource] is a pooled, reusable handle: [open](PointSource::open) it on a path, drain it
//! with [read_point](PointSource::read_point), [close](PointSource::close) it, and open it again
//! on the next file. A source is single-threaded by contract; concurrency comes from pooling one
//! source per worker slot.
//!
//! Compression is sniffed from the header rather than the file name, so a pooled source handles
//! mixed las/laz input sets. Laszip support sits behind the default-on `laz` cargo feature.

pub(crate) mod header;
mod las;
#[cfg(feature = "laz")]
mod laz;
mod record;

pub use header::Version;

use crate::metadata::FileMetadata;
use crate::settings::ImportSettings;
use crate::{Bounds, Error, Point, Result};
use header::RawHeader;
use las::LasBackend;
use record::{CoordScale, RecordFormat, RecordReader};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

/// Random-access reader over one input file.
///
/// Implementations deliver points in file order and report end-of-stream as `Ok(None)`, which is
/// sticky. A failed record read is returned as an error without advancing the cursor; callers
/// that keep going get the error again, so they should treat it as truncation.
pub trait PointSource: Send {
    /// Opens the file and returns its header bounds.
    ///
    /// May be called repeatedly on one instance, provided [close](Self::close) was called in
    /// between. A file that declares zero points is an error, never an empty bounds.
    fn open(&mut self, path: &Path) -> Result<Bounds>;

    /// The number of points the open file declares.
    ///
    /// Matches the number of times [read_point](Self::read_point) can succeed. Zero when closed.
    fn point_count(&self) -> u64;

    /// Reads the next point, or `Ok(None)` at end-of-stream.
    fn read_point(&mut self) -> Result<Option<Point>>;

    /// Captures the per-file header metadata.
    fn metadata(&self) -> Result<FileMetadata>;

    /// Releases the underlying file. Idempotent.
    fn close(&mut self);
}

/// Creates a pooled source configured by the settings.
pub(crate) fn new_source(settings: &ImportSettings) -> Box<dyn PointSource> {
    Box::new(FileSource {
        custom_intensity_range: settings.custom_intensity_range,
        state: None,
    })
}

enum Backend {
    Las(LasBackend),
    #[cfg(feature = "laz")]
    Laz(laz::LazBackend),
}

impl Backend {
    fn read_record(&mut self, record: &mut RecordReader) -> Result<Point> {
        match self {
            Backend::Las(backend) => backend.read_record(record),
            #[cfg(feature = "laz")]
            Backend::Laz(backend) => backend.read_record(record),
        }
    }
}

struct OpenFile {
    path: PathBuf,
    header: RawHeader,
    record: RecordReader,
    backend: Backend,
    index: u64,
}

/// The one [PointSource] implementation: an openable, closeable las/laz reader.
struct FileSource {
    custom_intensity_range: bool,
    state: Option<OpenFile>,
}

impl PointSource for FileSource {
    fn open(&mut self, path: &Path) -> Result<Bounds> {
        self.close();
        let mut read = BufReader::new(File::open(path)?);
        let header = RawHeader::read_from(&mut read)?;
        if header.number_of_point_records == 0 {
            return Err(Error::EmptyFile(path.to_path_buf()));
        }
        if !header.bounds.is_valid() {
            return Err(Error::CorruptHeader(format!(
                "header bounds are inverted or unset: {:?}",
                header.bounds
            )));
        }
        let format = RecordFormat::new(header.format_id(), header.point_data_record_length)?;
        let record = RecordReader::new(
            format,
            CoordScale {
                scale: header.scale,
                offset: header.offset,
            },
            self.custom_intensity_range,
        );
        let backend = if header.is_compressed() {
            #[cfg(feature = "laz")]
            {
                Backend::Laz(laz::LazBackend::new(read, &header)?)
            }
            #[cfg(not(feature = "laz"))]
            {
                return Err(Error::LaszipNotEnabled);
            }
        } else {
            Backend::Las(LasBackend::new(read))
        };
        let bounds = header.bounds;
        self.state = Some(OpenFile {
            path: path.to_path_buf(),
            header,
            record,
            backend,
            index: 0,
        });
        Ok(bounds)
    }

    fn point_count(&self) -> u64 {
        self.state
            .as_ref()
            .map_or(0, |open| open.header.number_of_point_records)
    }

    fn read_point(&mut self) -> Result<Option<Point>> {
        let Some(open) = self.state.as_mut() else {
            return Err(Error::Closed);
        };
        if open.index < open.header.number_of_point_records {
            let point = open.backend.read_record(&mut open.record)?;
            open.index += 1;
            Ok(Some(point))
        } else {
            Ok(None)
        }
    }

    fn metadata(&self) -> Result<FileMetadata> {
        let open = self.state.as_ref().ok_or(Error::Closed)?;
        Ok(FileMetadata::from_header(&open.path, &open.header))
    }

    fn close(&mut self) {
        self.state = None;
    }
}
