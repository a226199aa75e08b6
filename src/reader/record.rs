//! Point record formats and record decoding.
//!
//! Las defines record formats 0 through 10. This converter only consumes coordinates, intensity,
//! rgb, and gps time; everything else in a record (flags, classification, waveform packets, extra
//! bytes) is read and discarded so the cursor always lands on the next record.

use crate::{Color, Error, Point, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use std::io::Read;

const WAVEFORM_LEN: u16 = 29;

/// The layout of one point data record.
#[derive(Clone, Copy, Debug)]
pub(crate) struct RecordFormat {
    pub has_gps_time: bool,
    pub has_color: bool,
    pub has_nir: bool,
    pub has_waveform: bool,
    pub is_extended: bool,
    /// Record length from the header; at least the format minimum, the rest is extra bytes.
    pub record_length: u16,
}

impl RecordFormat {
    /// Builds the format table entry for the given format id.
    pub fn new(id: u8, record_length: u16) -> Result<RecordFormat> {
        let mut format = match id {
            0 => RecordFormat::base(false, false),
            1 => RecordFormat::base(true, false),
            2 => RecordFormat::base(false, true),
            3 => RecordFormat::base(true, true),
            4 => RecordFormat {
                has_waveform: true,
                ..RecordFormat::base(true, false)
            },
            5 => RecordFormat {
                has_waveform: true,
                ..RecordFormat::base(true, true)
            },
            6 => RecordFormat::extended(false, false),
            7 => RecordFormat::extended(true, false),
            8 => RecordFormat::extended(true, true),
            9 => RecordFormat {
                has_waveform: true,
                ..RecordFormat::extended(false, false)
            },
            10 => RecordFormat {
                has_waveform: true,
                ..RecordFormat::extended(true, true)
            },
            _ => return Err(Error::UnsupportedPointFormat(id)),
        };
        if record_length < format.minimum_length() {
            return Err(Error::CorruptHeader(format!(
                "record length {record_length} is below the format {id} minimum of {}",
                format.minimum_length()
            )));
        }
        format.record_length = record_length;
        Ok(format)
    }

    fn base(has_gps_time: bool, has_color: bool) -> RecordFormat {
        RecordFormat {
            has_gps_time,
            has_color,
            has_nir: false,
            has_waveform: false,
            is_extended: false,
            record_length: 0,
        }
    }

    fn extended(has_color: bool, has_nir: bool) -> RecordFormat {
        RecordFormat {
            has_gps_time: true,
            has_color,
            has_nir,
            has_waveform: false,
            is_extended: true,
            record_length: 0,
        }
    }

    /// The length of the fields the format defines, without extra bytes.
    pub fn minimum_length(&self) -> u16 {
        let mut len = if self.is_extended { 30 } else { 20 };
        if self.has_gps_time && !self.is_extended {
            len += 8;
        }
        if self.has_color {
            len += 6;
        }
        if self.has_nir {
            len += 2;
        }
        if self.has_waveform {
            len += WAVEFORM_LEN;
        }
        len
    }

    /// User-defined bytes trailing each record.
    pub fn extra_bytes(&self) -> u16 {
        self.record_length - self.minimum_length()
    }
}

/// The scale and offset a las header applies to its integer coordinates.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CoordScale {
    pub scale: [f64; 3],
    pub offset: [f64; 3],
}

impl CoordScale {
    fn direct(&self, axis: usize, n: i32) -> f64 {
        self.scale[axis] * f64::from(n) + self.offset[axis]
    }
}

/// Decodes point records into [Point]s.
#[derive(Debug)]
pub(crate) struct RecordReader {
    format: RecordFormat,
    coords: CoordScale,
    custom_intensity_range: bool,
    skip_buf: Vec<u8>,
}

impl RecordReader {
    pub fn new(format: RecordFormat, coords: CoordScale, custom_intensity_range: bool) -> RecordReader {
        let skipped = usize::from(format.extra_bytes())
            + if format.has_waveform {
                usize::from(WAVEFORM_LEN)
            } else {
                0
            };
        RecordReader {
            format,
            coords,
            custom_intensity_range,
            skip_buf: vec![0; skipped],
        }
    }

    /// Reads one record and widens it into a [Point].
    pub fn read_from<R: Read>(&mut self, read: &mut R) -> Result<Point> {
        let x = read.read_i32::<LittleEndian>()?;
        let y = read.read_i32::<LittleEndian>()?;
        let z = read.read_i32::<LittleEndian>()?;
        let intensity = read.read_u16::<LittleEndian>()?;
        if self.format.is_extended {
            // two flag bytes, classification, user data, scan angle (i16)
            let mut tail = [0u8; 6];
            read.read_exact(&mut tail)?;
        } else {
            // flags, classification, scan angle rank, user data
            let mut tail = [0u8; 4];
            read.read_exact(&mut tail)?;
        }
        let _point_source_id = read.read_u16::<LittleEndian>()?;
        let gps_time = if self.format.has_gps_time {
            Some(read.read_f64::<LittleEndian>()?)
        } else {
            None
        };
        let color = if self.format.has_color {
            let red = read.read_u16::<LittleEndian>()?;
            let green = read.read_u16::<LittleEndian>()?;
            let blue = read.read_u16::<LittleEndian>()?;
            Some(Color::new(red, green, blue))
        } else {
            None
        };
        if self.format.has_nir {
            let _nir = read.read_u16::<LittleEndian>()?;
        }
        if !self.skip_buf.is_empty() {
            read.read_exact(&mut self.skip_buf)?;
        }
        Ok(Point {
            x: self.coords.direct(0, x),
            y: self.coords.direct(1, y),
            z: self.coords.direct(2, z),
            intensity: self.widen_intensity(intensity),
            color,
            gps_time,
        })
    }

    fn widen_intensity(&self, intensity: u16) -> u16 {
        if self.custom_intensity_range {
            // 0-255 sources: same widening as 8 bit color channels.
            (intensity.min(255) << 8) | intensity.min(255)
        } else {
            intensity
        }
    }
}
