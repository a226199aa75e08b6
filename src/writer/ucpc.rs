//! The single-file container (V2, `.ucpc`).
//!
//! Layout: a 44 byte header `{magic "UCPC", version u32, point count u64, bounds 6xf32
//! (min xyz then max xyz), flags u32}` followed by packed records `{x f32, y f32, z f32, r u8,
//! g u8, b u8, [intensity u16], [time f64]}`, everything little-endian. Flags: bit 0 rgb, bit 1
//! intensity, bit 2 time.
//!
//! The point count and bounds are reserved at init and patched on close, the way a las writer
//! rewrites its header once the real counts are known. The container is strictly sequential, so
//! the scheduler runs UCPC exports on a single worker slot.

use crate::settings::ImportSettings;
use crate::writer::{Channels, FlushStats, PointSink};
use crate::{Bounds, Color, Point, Result};
use byteorder::{LittleEndian, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;

pub(crate) const MAGIC: [u8; 4] = *b"UCPC";
pub(crate) const VERSION: u32 = 2;

const FLAG_RGB: u32 = 1;
const FLAG_INTENSITY: u32 = 1 << 1;
const FLAG_TIME: u32 = 1 << 2;

pub(crate) struct UcpcWriter {
    path: PathBuf,
    channels: Channels,
    out: Option<BufWriter<File>>,
    start: u64,
    count: u64,
    file_count: u64,
    dropped_non_finite: u64,
    bounds: Bounds,
    closed: bool,
}

impl UcpcWriter {
    pub fn new(settings: &ImportSettings) -> UcpcWriter {
        UcpcWriter {
            path: settings.ucpc_path(),
            channels: Channels::from_settings(settings),
            out: None,
            start: 0,
            count: 0,
            file_count: 0,
            dropped_non_finite: 0,
            bounds: Bounds::default(),
            closed: false,
        }
    }

    fn flags(&self) -> u32 {
        let mut flags = 0;
        if self.channels.rgb {
            flags |= FLAG_RGB;
        }
        if self.channels.intensity {
            flags |= FLAG_INTENSITY;
        }
        if self.channels.time {
            flags |= FLAG_TIME;
        }
        flags
    }

    fn write_header(out: &mut BufWriter<File>, count: u64, bounds: &Bounds, flags: u32) -> Result<()> {
        out.write_all(&MAGIC)?;
        out.write_u32::<LittleEndian>(VERSION)?;
        out.write_u64::<LittleEndian>(count)?;
        for value in [
            bounds.min.x,
            bounds.min.y,
            bounds.min.z,
            bounds.max.x,
            bounds.max.y,
            bounds.max.z,
        ] {
            out.write_f32::<LittleEndian>(value as f32)?;
        }
        out.write_u32::<LittleEndian>(flags)?;
        Ok(())
    }
}

impl PointSink for UcpcWriter {
    /// Creates the container on first use; later files append to the same stream.
    fn init(&mut self, _estimated_points: u64) -> Result<()> {
        if self.closed {
            return Err(crate::Error::Closed);
        }
        if self.out.is_none() {
            let mut out = BufWriter::new(File::create(&self.path)?);
            self.start = out.stream_position()?;
            // Reserved; the real count and bounds land here on close.
            Self::write_header(&mut out, 0, &Bounds::default(), self.flags())?;
            self.out = Some(out);
        }
        self.file_count = 0;
        self.dropped_non_finite = 0;
        Ok(())
    }

    fn add_point(&mut self, _index: u64, point: &Point) -> Result<()> {
        let out = self.out.as_mut().ok_or(crate::Error::Closed)?;
        if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
            self.dropped_non_finite += 1;
            return Ok(());
        }
        out.write_f32::<LittleEndian>(point.x as f32)?;
        out.write_f32::<LittleEndian>(point.y as f32)?;
        out.write_f32::<LittleEndian>(point.z as f32)?;
        let (r, g, b) = point.color.unwrap_or_else(Color::default).to_u8();
        out.write_u8(r)?;
        out.write_u8(g)?;
        out.write_u8(b)?;
        if self.channels.intensity {
            out.write_u16::<LittleEndian>(point.intensity)?;
        }
        if self.channels.time {
            out.write_f64::<LittleEndian>(point.gps_time.unwrap_or(0.))?;
        }
        self.bounds.grow(point);
        self.count += 1;
        self.file_count += 1;
        Ok(())
    }

    fn save(&mut self, _file_index: usize) -> Result<FlushStats> {
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        Ok(FlushStats {
            points_written: self.file_count,
            dropped_non_finite: self.dropped_non_finite,
            ..Default::default()
        })
    }

    /// Patches the reserved point count and bounds.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Some(mut out) = self.out.take() {
            out.seek(SeekFrom::Start(self.start))?;
            let bounds = if self.bounds.is_valid() {
                self.bounds
            } else {
                // No point made it to disk; write a degenerate zero box instead of infinities.
                Bounds::new(0., 0., 0., 0., 0., 0.)
            };
            Self::write_header(&mut out, self.count, &bounds, self.flags())?;
            out.flush()?;
        }
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ReadBytesExt;
    use std::io::Read;

    fn read_header(path: &std::path::Path) -> (u64, [f32; 6], u32) {
        let mut file = File::open(path).unwrap();
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).unwrap();
        assert_eq!(MAGIC, magic);
        assert_eq!(VERSION, file.read_u32::<LittleEndian>().unwrap());
        let count = file.read_u64::<LittleEndian>().unwrap();
        let mut bounds = [0f32; 6];
        for value in &mut bounds {
            *value = file.read_f32::<LittleEndian>().unwrap();
        }
        let flags = file.read_u32::<LittleEndian>().unwrap();
        (count, bounds, flags)
    }

    fn settings(dir: &tempfile::TempDir) -> ImportSettings {
        ImportSettings {
            output: dir.path().join("out.ucpc"),
            ..Default::default()
        }
    }

    #[test]
    fn patches_count_and_bounds_on_close() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut writer = UcpcWriter::new(&settings);
        writer.init(2).unwrap();
        for (i, (x, y, z)) in [(1., 2., 3.), (-1., 5., 0.)].iter().enumerate() {
            let point = Point {
                x: *x,
                y: *y,
                z: *z,
                color: Some(Color::new(0xffff, 0, 0)),
                ..Default::default()
            };
            writer.add_point(i as u64, &point).unwrap();
        }
        let stats = writer.save(0).unwrap();
        assert_eq!(2, stats.points_written);
        writer.close().unwrap();

        let (count, bounds, flags) = read_header(&settings.ucpc_path());
        assert_eq!(2, count);
        assert_eq!([-1., 2., 0., 1., 5., 3.], bounds);
        assert_eq!(FLAG_RGB, flags);
    }

    #[test]
    fn drops_non_finite_points() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut writer = UcpcWriter::new(&settings);
        writer.init(1).unwrap();
        let point = Point {
            x: f64::NAN,
            ..Default::default()
        };
        writer.add_point(0, &point).unwrap();
        let stats = writer.save(0).unwrap();
        assert_eq!(0, stats.points_written);
        assert_eq!(1, stats.dropped_non_finite);
    }

    #[test]
    fn appends_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut writer = UcpcWriter::new(&settings);
        for file_index in 0..3usize {
            writer.init(1).unwrap();
            let point = Point {
                x: file_index as f64,
                ..Default::default()
            };
            writer.add_point(0, &point).unwrap();
            assert_eq!(1, writer.save(file_index).unwrap().points_written);
        }
        writer.close().unwrap();
        let (count, _, _) = read_header(&settings.ucpc_path());
        assert_eq!(3, count);
    }

    #[test]
    fn close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir);
        let mut writer = UcpcWriter::new(&settings);
        writer.init(0).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }
}
