//! Shared helpers: synthesize real las files and parse the converter's outputs back.
#![allow(dead_code)] // each test binary uses its own slice of these helpers

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

const SCALE: f64 = 0.001;

/// A source point for synthesized las files (point format 3).
#[derive(Clone, Copy, Debug)]
pub struct SourcePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub intensity: u16,
    pub color: (u16, u16, u16),
    pub gps_time: f64,
}

impl SourcePoint {
    pub fn xyz(x: f64, y: f64, z: f64) -> SourcePoint {
        SourcePoint {
            x,
            y,
            z,
            intensity: 100,
            color: (0x1000, 0x2000, 0x3000),
            gps_time: 1.0,
        }
    }
}

/// Evenly spread points for count-oriented scenarios.
pub fn grid_points(n: usize) -> Vec<SourcePoint> {
    (0..n)
        .map(|i| {
            let f = i as f64;
            SourcePoint {
                x: f * 0.01,
                y: 100. + (f % 97.),
                z: -50. + (f % 13.),
                intensity: (i % 65536) as u16,
                color: ((i % 65536) as u16, 0x8000, 0xffff),
                gps_time: 300_000. + f,
            }
        })
        .collect()
}

/// Writes a las 1.2 file, point format 3, with bounds computed from the points.
pub fn write_las(path: &Path, points: &[SourcePoint]) {
    let mut bounds = [f64::INFINITY, f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY];
    for p in points {
        bounds[0] = bounds[0].min(p.x);
        bounds[1] = bounds[1].min(p.y);
        bounds[2] = bounds[2].min(p.z);
        bounds[3] = bounds[3].max(p.x);
        bounds[4] = bounds[4].max(p.y);
        bounds[5] = bounds[5].max(p.z);
    }
    if points.is_empty() {
        bounds = [0.; 6];
    }

    let mut out = BufWriter::new(File::create(path).unwrap());
    out.write_all(b"LASF").unwrap();
    out.write_u16::<LittleEndian>(0).unwrap(); // file source id
    out.write_u16::<LittleEndian>(0).unwrap(); // global encoding
    out.write_all(&[0u8; 16]).unwrap(); // guid
    out.write_u8(1).unwrap(); // major
    out.write_u8(2).unwrap(); // minor
    let mut system_identifier = [0u8; 32];
    system_identifier[..4].copy_from_slice(b"test");
    out.write_all(&system_identifier).unwrap();
    out.write_all(&[0u8; 32]).unwrap(); // generating software
    out.write_u16::<LittleEndian>(40).unwrap(); // day
    out.write_u16::<LittleEndian>(2024).unwrap(); // year
    out.write_u16::<LittleEndian>(227).unwrap(); // header size
    out.write_u32::<LittleEndian>(227).unwrap(); // offset to point data
    out.write_u32::<LittleEndian>(0).unwrap(); // number of vlrs
    out.write_u8(3).unwrap(); // point format
    out.write_u16::<LittleEndian>(34).unwrap(); // record length
    out.write_u32::<LittleEndian>(points.len() as u32).unwrap();
    for _ in 0..5 {
        out.write_u32::<LittleEndian>(0).unwrap(); // by return
    }
    for _ in 0..3 {
        out.write_f64::<LittleEndian>(SCALE).unwrap();
    }
    for _ in 0..3 {
        out.write_f64::<LittleEndian>(0.).unwrap(); // las offset
    }
    for (max, min) in [(bounds[3], bounds[0]), (bounds[4], bounds[1]), (bounds[5], bounds[2])] {
        out.write_f64::<LittleEndian>(max).unwrap();
        out.write_f64::<LittleEndian>(min).unwrap();
    }

    for p in points {
        out.write_i32::<LittleEndian>((p.x / SCALE).round() as i32).unwrap();
        out.write_i32::<LittleEndian>((p.y / SCALE).round() as i32).unwrap();
        out.write_i32::<LittleEndian>((p.z / SCALE).round() as i32).unwrap();
        out.write_u16::<LittleEndian>(p.intensity).unwrap();
        out.write_u8(0x09).unwrap(); // return 1 of 1
        out.write_u8(2).unwrap(); // classification: ground
        out.write_i8(0).unwrap(); // scan angle
        out.write_u8(0).unwrap(); // user data
        out.write_u16::<LittleEndian>(0).unwrap(); // point source id
        out.write_f64::<LittleEndian>(p.gps_time).unwrap();
        out.write_u16::<LittleEndian>(p.color.0).unwrap();
        out.write_u16::<LittleEndian>(p.color.1).unwrap();
        out.write_u16::<LittleEndian>(p.color.2).unwrap();
    }
    out.flush().unwrap();
}

/// One record read back from a ucpc container.
#[derive(Clone, Copy, Debug)]
pub struct UcpcRecord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub rgb: (u8, u8, u8),
    pub intensity: Option<u16>,
    pub time: Option<f64>,
}

/// A parsed ucpc container.
#[derive(Clone, Debug)]
pub struct UcpcFile {
    pub count: u64,
    pub bounds: [f32; 6],
    pub flags: u32,
    pub records: Vec<UcpcRecord>,
}

pub fn read_ucpc(path: &Path) -> UcpcFile {
    let mut file = File::open(path).unwrap();
    let mut magic = [0u8; 4];
    file.read_exact(&mut magic).unwrap();
    assert_eq!(b"UCPC", &magic);
    assert_eq!(2, file.read_u32::<LittleEndian>().unwrap());
    let count = file.read_u64::<LittleEndian>().unwrap();
    let mut bounds = [0f32; 6];
    for b in &mut bounds {
        *b = file.read_f32::<LittleEndian>().unwrap();
    }
    let flags = file.read_u32::<LittleEndian>().unwrap();
    let has_intensity = flags & 0b10 != 0;
    let has_time = flags & 0b100 != 0;
    let mut records = Vec::new();
    for _ in 0..count {
        records.push(UcpcRecord {
            x: file.read_f32::<LittleEndian>().unwrap(),
            y: file.read_f32::<LittleEndian>().unwrap(),
            z: file.read_f32::<LittleEndian>().unwrap(),
            rgb: (
                file.read_u8().unwrap(),
                file.read_u8().unwrap(),
                file.read_u8().unwrap(),
            ),
            intensity: has_intensity.then(|| file.read_u16::<LittleEndian>().unwrap()),
            time: has_time.then(|| file.read_f64::<LittleEndian>().unwrap()),
        });
    }
    let mut rest = Vec::new();
    file.read_to_end(&mut rest).unwrap();
    assert!(rest.is_empty(), "trailing bytes in container");
    UcpcFile {
        count,
        bounds,
        flags,
        records,
    }
}

/// One tile line of a parsed root index.
#[derive(Clone, Debug)]
pub struct TileInfo {
    pub name: String,
    pub count: u64,
    pub bounds: [f64; 6],
}

/// A parsed `.pcroot` index.
#[derive(Clone, Debug)]
pub struct RootFile {
    pub grid_size: f64,
    pub offset: [f64; 3],
    pub packed: bool,
    pub pack_magic: u32,
    pub intensity: bool,
    pub time: bool,
    pub bounds: [f64; 6],
    pub points: u64,
    pub tiles: Vec<TileInfo>,
}

pub fn read_pcroot(path: &Path) -> RootFile {
    let text = std::fs::read_to_string(path).unwrap();
    let mut lines = text.lines();
    assert_eq!(Some("version 3"), lines.next());
    let grid_size = field(lines.next(), "gridsize")[0];
    let offset_fields = field(lines.next(), "offset");
    let pack_fields = field(lines.next(), "pack");
    let channels_line = lines.next().unwrap();
    assert!(channels_line.starts_with("channels "));
    let bounds_fields = field(lines.next(), "bounds");
    let points = field(lines.next(), "points")[0] as u64;
    let tile_count = field(lines.next(), "tiles")[0] as usize;
    let mut tiles = Vec::with_capacity(tile_count);
    for line in lines {
        let mut parts = line.split_whitespace();
        let name = parts.next().unwrap().to_string();
        let numbers: Vec<f64> = parts.map(|p| p.parse().unwrap()).collect();
        assert_eq!(7, numbers.len(), "bad tile line: {line}");
        tiles.push(TileInfo {
            name,
            count: numbers[0] as u64,
            bounds: numbers[1..7].try_into().unwrap(),
        });
    }
    assert_eq!(tile_count, tiles.len());
    RootFile {
        grid_size,
        offset: offset_fields.try_into().unwrap(),
        packed: pack_fields[0] == 1.,
        pack_magic: pack_fields[1] as u32,
        intensity: channels_line.contains("intensity=1"),
        time: channels_line.contains("time=1"),
        bounds: bounds_fields.try_into().unwrap(),
        points,
        tiles,
    }
}

fn field(line: Option<&str>, name: &str) -> Vec<f64> {
    let line = line.unwrap();
    let mut parts = line.split_whitespace();
    assert_eq!(Some(name), parts.next(), "expected `{name}` line, got `{line}`");
    parts.map(|p| p.parse().unwrap()).collect()
}

/// A coordinate read back from a tile, either packed or as cell-local floats.
#[derive(Clone, Copy, Debug)]
pub struct TileRecord {
    /// Reconstructed absolute coordinate: `offset + (cell + fraction) * grid`.
    pub position: [f64; 3],
    pub rgb: (u8, u8, u8),
}

/// Reads a tile file back into reconstructed absolute coordinates.
pub fn read_tile(root: &RootFile, dir: &Path, tile: &TileInfo) -> Vec<TileRecord> {
    let cell: Vec<i32> = tile
        .name
        .trim_end_matches(".pct")
        .split('_')
        .map(|part| part.parse().unwrap())
        .collect();
    let mut file = File::open(dir.join(&tile.name)).unwrap();
    let mut records = Vec::new();
    loop {
        let fractions = if root.packed {
            let packed = match file.read_u32::<LittleEndian>() {
                Ok(value) => value,
                Err(_) => break,
            };
            let magic = root.pack_magic;
            let (qx, qy, qz) = (packed / (magic * magic), packed / magic % magic, packed % magic);
            [qx, qy, qz].map(|q| (f64::from(q) + 0.5) / f64::from(magic) * root.grid_size)
        } else {
            let x = match file.read_f32::<LittleEndian>() {
                Ok(value) => f64::from(value),
                Err(_) => break,
            };
            let y = f64::from(file.read_f32::<LittleEndian>().unwrap());
            let z = f64::from(file.read_f32::<LittleEndian>().unwrap());
            [x, y, z]
        };
        let rgb = (
            file.read_u8().unwrap(),
            file.read_u8().unwrap(),
            file.read_u8().unwrap(),
        );
        if root.intensity {
            let _ = file.read_u16::<LittleEndian>().unwrap();
        }
        if root.time {
            let _ = file.read_f64::<LittleEndian>().unwrap();
        }
        let mut position = [0f64; 3];
        for axis in 0..3 {
            position[axis] =
                root.offset[axis] + f64::from(cell[axis]) * root.grid_size + fractions[axis];
        }
        records.push(TileRecord { position, rgb });
    }
    records
}

/// Collects `n` las files of `points_each` points under `dir`.
pub fn write_las_set(dir: &Path, n: usize, points_each: usize) -> Vec<PathBuf> {
    (0..n)
        .map(|i| {
            let path = dir.join(format!("{i}.las"));
            let points: Vec<SourcePoint> = grid_points(points_each)
                .into_iter()
                .map(|mut p| {
                    p.x += i as f64 * 1000.;
                    p
                })
                .collect();
            write_las(&path, &points);
            path
        })
        .collect()
}
