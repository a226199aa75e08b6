//! Per-file header metadata and the json sidecar.
//!
//! When metadata capture is on, every successfully opened input contributes one [FileMetadata],
//! collected under a mutex in the scheduler and serialized once at the end of the run to
//! `<output stem>.json`.

use crate::reader::header::RawHeader;
use crate::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use uuid::Uuid;

/// Header metadata captured from one input file.
///
/// Everything here is available at reader init; no point scan is needed, which keeps
/// metadata-only runs header-cheap. The per-return counts double as the closest thing to a
/// classification summary the las public header offers.
#[derive(Clone, Debug, Serialize)]
pub struct FileMetadata {
    /// The source file.
    pub path: String,

    /// Declared number of point records.
    pub point_count: u64,

    /// The las version, e.g. `"1.4"`.
    pub version: String,

    /// The point data record format id.
    pub point_format: u8,

    /// The project guid.
    pub guid: Uuid,

    /// The file source id, often a flight line number.
    pub file_source_id: u16,

    /// The recording hardware or process.
    pub system_identifier: String,

    /// The software that wrote the file.
    pub generating_software: String,

    /// File creation date, when the header carries one.
    pub created: Option<NaiveDate>,

    /// The coordinate reference system as OGC WKT, if recorded.
    pub crs_wkt: Option<String>,

    /// Point counts per return number, trailing zeroes trimmed.
    pub points_by_return: Vec<u64>,

    /// Header bounds as `[minx, miny, minz, maxx, maxy, maxz]`.
    pub bounds: [f64; 6],
}

impl FileMetadata {
    pub(crate) fn from_header(path: &Path, header: &RawHeader) -> FileMetadata {
        let mut points_by_return = header.number_of_points_by_return.clone();
        while points_by_return.last() == Some(&0) {
            let _ = points_by_return.pop();
        }
        FileMetadata {
            path: path.display().to_string(),
            point_count: header.number_of_point_records,
            version: header.version.to_string(),
            point_format: header.format_id(),
            guid: Uuid::from_bytes(header.guid),
            file_source_id: header.file_source_id,
            system_identifier: header.system_identifier.clone(),
            generating_software: header.generating_software.clone(),
            created: NaiveDate::from_yo_opt(
                i32::from(header.file_creation_year),
                u32::from(header.file_creation_day_of_year),
            ),
            crs_wkt: header.wkt(),
            points_by_return,
            bounds: [
                header.bounds.min.x,
                header.bounds.min.y,
                header.bounds.min.z,
                header.bounds.max.x,
                header.bounds.max.y,
                header.bounds.max.z,
            ],
        }
    }
}

/// Writes the collected metadata as a json array, in processing-completion order.
pub(crate) fn write_sidecar(path: &Path, headers: &[FileMetadata]) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, headers)?;
    Ok(())
}
