//! Raw las file metadata.
//!
//! [RawHeader] maps onto the bytes of the las public header block, versions 1.0 through 1.4,
//! including the 1.4 large-file point counts. Variable length records are walked right after the
//! header; extended variable length records are fetched with a seek when the header announces
//! them. Only the fields this converter consumes are interpreted, the rest is skipped.

use crate::{Bounds, Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::fmt;
use std::io::{Read, Seek, SeekFrom};

/// The las file signature.
pub(crate) const LASF: [u8; 4] = *b"LASF";

/// The user id of coordinate reference system vlrs.
pub(crate) const PROJECTION_USER_ID: &str = "LASF_Projection";

/// The record id of the OGC WKT coordinate system vlr.
pub(crate) const WKT_RECORD_ID: u16 = 2112;

/// A las version.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    /// The major version, always 1 for supported files.
    pub major: u8,
    /// The minor version.
    pub minor: u8,
}

impl Version {
    /// Creates a new version.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcconvert::reader::Version;
    /// let version = Version::new(1, 4);
    /// assert_eq!(4, version.minor);
    /// ```
    pub fn new(major: u8, minor: u8) -> Version {
        Version { major, minor }
    }

    fn supports_waveforms(&self) -> bool {
        self.minor >= 3
    }

    fn supports_large_files(&self) -> bool {
        self.minor >= 4
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// A variable length record.
#[derive(Clone, Debug, Default)]
pub(crate) struct Vlr {
    pub user_id: String,
    pub record_id: u16,
    pub data: Vec<u8>,
}

impl Vlr {
    fn read_from<R: Read>(read: &mut R, extended: bool) -> Result<Vlr> {
        let _reserved = read.read_u16::<LittleEndian>()?;
        let mut user_id = [0u8; 16];
        read.read_exact(&mut user_id)?;
        let record_id = read.read_u16::<LittleEndian>()?;
        let record_length = if extended {
            read.read_u64::<LittleEndian>()?
        } else {
            u64::from(read.read_u16::<LittleEndian>()?)
        };
        let mut description = [0u8; 32];
        read.read_exact(&mut description)?;
        let length = usize::try_from(record_length)
            .map_err(|_| Error::CorruptHeader(format!("vlr length {record_length} overflows")))?;
        let mut data = vec![0; length];
        read.read_exact(&mut data)?;
        Ok(Vlr {
            user_id: from_las_str(&user_id),
            record_id,
            data,
        })
    }

    /// Returns the record data as a trimmed string, for text payloads such as WKT.
    pub fn data_as_string(&self) -> String {
        String::from_utf8_lossy(&self.data)
            .trim_end_matches('\0')
            .to_string()
    }
}

/// The las public header block, interpreted.
#[derive(Clone, Debug)]
pub(crate) struct RawHeader {
    pub file_source_id: u16,
    pub guid: [u8; 16],
    pub version: Version,
    pub system_identifier: String,
    pub generating_software: String,
    pub file_creation_day_of_year: u16,
    pub file_creation_year: u16,
    pub point_data_record_format: u8,
    pub point_data_record_length: u16,
    pub number_of_point_records: u64,
    pub number_of_points_by_return: Vec<u64>,
    pub scale: [f64; 3],
    pub offset: [f64; 3],
    pub bounds: Bounds,
    pub vlrs: Vec<Vlr>,
    pub evlrs: Vec<Vlr>,
}

impl RawHeader {
    /// Reads a header, its vlrs, and any announced evlrs.
    ///
    /// Leaves the reader positioned at the first point record.
    pub fn read_from<R: Read + Seek>(read: &mut R) -> Result<RawHeader> {
        let mut file_signature = [0u8; 4];
        read.read_exact(&mut file_signature)?;
        if file_signature != LASF {
            return Err(Error::InvalidFileSignature(file_signature));
        }
        let file_source_id = read.read_u16::<LittleEndian>()?;
        let _global_encoding = read.read_u16::<LittleEndian>()?;
        let mut guid = [0u8; 16];
        read.read_exact(&mut guid)?;
        let version = Version::new(read.read_u8()?, read.read_u8()?);
        if version.major != 1 || version.minor > 4 {
            return Err(Error::UnsupportedVersion(version));
        }
        let mut system_identifier = [0u8; 32];
        read.read_exact(&mut system_identifier)?;
        let mut generating_software = [0u8; 32];
        read.read_exact(&mut generating_software)?;
        let file_creation_day_of_year = read.read_u16::<LittleEndian>()?;
        let file_creation_year = read.read_u16::<LittleEndian>()?;
        let header_size = read.read_u16::<LittleEndian>()?;
        let offset_to_point_data = read.read_u32::<LittleEndian>()?;
        let number_of_variable_length_records = read.read_u32::<LittleEndian>()?;
        let point_data_record_format = read.read_u8()?;
        let point_data_record_length = read.read_u16::<LittleEndian>()?;
        let legacy_number_of_point_records = read.read_u32::<LittleEndian>()?;
        let mut legacy_number_of_points_by_return = [0u32; 5];
        for n in &mut legacy_number_of_points_by_return {
            *n = read.read_u32::<LittleEndian>()?;
        }
        let mut scale = [0f64; 3];
        for s in &mut scale {
            *s = read.read_f64::<LittleEndian>()?;
        }
        let mut offset = [0f64; 3];
        for o in &mut offset {
            *o = read.read_f64::<LittleEndian>()?;
        }
        let max_x = read.read_f64::<LittleEndian>()?;
        let min_x = read.read_f64::<LittleEndian>()?;
        let max_y = read.read_f64::<LittleEndian>()?;
        let min_y = read.read_f64::<LittleEndian>()?;
        let max_z = read.read_f64::<LittleEndian>()?;
        let min_z = read.read_f64::<LittleEndian>()?;

        if version.supports_waveforms() {
            let _start_of_waveform_data_packet_record = read.read_u64::<LittleEndian>()?;
        }
        let mut evlr_location = None;
        let mut number_of_point_records = u64::from(legacy_number_of_point_records);
        let mut number_of_points_by_return: Vec<u64> = legacy_number_of_points_by_return
            .iter()
            .map(|&n| u64::from(n))
            .collect();
        if version.supports_large_files() {
            let start_of_first_evlr = read.read_u64::<LittleEndian>()?;
            let number_of_evlrs = read.read_u32::<LittleEndian>()?;
            if number_of_evlrs > 0 {
                evlr_location = Some((start_of_first_evlr, number_of_evlrs));
            }
            let large_count = read.read_u64::<LittleEndian>()?;
            let mut large_by_return = vec![0u64; 15];
            for n in &mut large_by_return {
                *n = read.read_u64::<LittleEndian>()?;
            }
            if large_count > 0 {
                number_of_point_records = large_count;
                number_of_points_by_return = large_by_return;
            }
        }

        let expected = expected_header_size(version);
        if header_size < expected {
            return Err(Error::CorruptHeader(format!(
                "header size {header_size} is below the las {version} minimum of {expected}"
            )));
        }
        // Vendor extensions may pad the header; the vlrs start right after it.
        read.seek(SeekFrom::Start(u64::from(header_size)))?;
        let mut vlrs = Vec::with_capacity(number_of_variable_length_records as usize);
        for _ in 0..number_of_variable_length_records {
            vlrs.push(Vlr::read_from(read, false)?);
        }

        let mut evlrs = Vec::new();
        if let Some((start, count)) = evlr_location {
            read.seek(SeekFrom::Start(start))?;
            for _ in 0..count {
                evlrs.push(Vlr::read_from(read, true)?);
            }
        }
        read.seek(SeekFrom::Start(u64::from(offset_to_point_data)))?;

        Ok(RawHeader {
            file_source_id,
            guid,
            version,
            system_identifier: from_las_str(&system_identifier),
            generating_software: from_las_str(&generating_software),
            file_creation_day_of_year,
            file_creation_year,
            point_data_record_format,
            point_data_record_length,
            number_of_point_records,
            number_of_points_by_return,
            scale,
            offset,
            bounds: Bounds::new(min_x, min_y, min_z, max_x, max_y, max_z),
            vlrs,
            evlrs,
        })
    }

    /// Returns true if the point records are laszip-compressed.
    ///
    /// Compression is announced by the high bits of the point data record format.
    pub fn is_compressed(&self) -> bool {
        self.point_data_record_format & 0x80 != 0
    }

    /// The point data record format with the compression bits masked off.
    pub fn format_id(&self) -> u8 {
        self.point_data_record_format & 0x3f
    }

    /// Returns the WKT coordinate reference system, if one is recorded.
    pub fn wkt(&self) -> Option<String> {
        self.vlrs
            .iter()
            .chain(&self.evlrs)
            .find(|vlr| vlr.user_id == PROJECTION_USER_ID && vlr.record_id == WKT_RECORD_ID)
            .map(Vlr::data_as_string)
    }
}

fn expected_header_size(version: Version) -> u16 {
    match version.minor {
        3 => 235,
        4 => 375,
        _ => 227,
    }
}

fn from_las_str(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches('\0')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use std::io::{Cursor, Write};

    fn write_minimal_header(point_count: u32) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.write_all(b"LASF").unwrap();
        bytes.write_u16::<LittleEndian>(1).unwrap(); // file source id
        bytes.write_u16::<LittleEndian>(0).unwrap(); // global encoding
        bytes.write_all(&[0u8; 16]).unwrap(); // guid
        bytes.write_u8(1).unwrap();
        bytes.write_u8(2).unwrap();
        bytes.write_all(&[0u8; 32]).unwrap(); // system identifier
        bytes.write_all(&[0u8; 32]).unwrap(); // generating software
        bytes.write_u16::<LittleEndian>(1).unwrap(); // day
        bytes.write_u16::<LittleEndian>(2024).unwrap(); // year
        bytes.write_u16::<LittleEndian>(227).unwrap(); // header size
        bytes.write_u32::<LittleEndian>(227).unwrap(); // offset to point data
        bytes.write_u32::<LittleEndian>(0).unwrap(); // number of vlrs
        bytes.write_u8(2).unwrap(); // point format
        bytes.write_u16::<LittleEndian>(26).unwrap(); // record length
        bytes.write_u32::<LittleEndian>(point_count).unwrap();
        for _ in 0..5 {
            bytes.write_u32::<LittleEndian>(0).unwrap();
        }
        for _ in 0..3 {
            bytes.write_f64::<LittleEndian>(0.01).unwrap(); // scale
        }
        for _ in 0..3 {
            bytes.write_f64::<LittleEndian>(0.).unwrap(); // offset
        }
        for (max, min) in [(10., 1.), (20., 2.), (30., 3.)] {
            bytes.write_f64::<LittleEndian>(max).unwrap();
            bytes.write_f64::<LittleEndian>(min).unwrap();
        }
        bytes
    }

    #[test]
    fn parse_minimal() {
        let bytes = write_minimal_header(42);
        let header = RawHeader::read_from(&mut Cursor::new(bytes)).unwrap();
        assert_eq!(Version::new(1, 2), header.version);
        assert_eq!(42, header.number_of_point_records);
        assert_eq!(2, header.format_id());
        assert!(!header.is_compressed());
        assert_eq!(Bounds::new(1., 2., 3., 10., 20., 30.), header.bounds);
        assert_eq!([0.01; 3], header.scale);
    }

    #[test]
    fn rejects_bad_signature() {
        let mut bytes = write_minimal_header(1);
        bytes[0] = b'X';
        match RawHeader::read_from(&mut Cursor::new(bytes)) {
            Err(Error::InvalidFileSignature(_)) => {}
            other => panic!("expected invalid signature, got {other:?}"),
        }
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut bytes = write_minimal_header(1);
        bytes[25] = 5; // minor
        match RawHeader::read_from(&mut Cursor::new(bytes)) {
            Err(Error::UnsupportedVersion(version)) => {
                assert_eq!(Version::new(1, 5), version);
            }
            other => panic!("expected unsupported version, got {other:?}"),
        }
    }

    #[test]
    fn compression_bit() {
        let mut bytes = write_minimal_header(1);
        bytes[104] |= 0x80; // point data record format
        let header = RawHeader::read_from(&mut Cursor::new(bytes)).unwrap();
        assert!(header.is_compressed());
        assert_eq!(2, header.format_id());
    }
}
