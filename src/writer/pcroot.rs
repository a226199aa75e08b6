//! The tiled format (V3): per-tile `.pct` files plus a `.pcroot` index.
//!
//! The output option names a stem: tile files land in the directory `<stem>/`, named
//! `<ix>_<iy>_<iz>.pct` after their grid cell, and the root index is written to `<stem>.pcroot`.
//!
//! Coordinates arriving here have already been through the transform pipeline, so the configured
//! offset is subtracted; cells are `floor(coord / grid_size)` and the root index records the
//! offset so consumers reconstruct `offset + (cell + fraction) · grid_size`. Tile records are
//! `{coord u32, r u8, g u8, b u8, [intensity u16], [time f64]}` when packing is enabled, with the
//! three cell-local fractions quantized to `pack_magic` steps per axis and packed as
//! `(qx · magic + qy) · magic + qz`; without packing the coordinate is three little-endian f32
//! cell-local offsets in source units.
//!
//! Every worker slot owns a [PcrootWriter] that buffers one source file's cells in memory;
//! [save](PointSink::save) appends the buffers to the shared tile files and merges the counts
//! into the shared in-memory root index. Contributions below the minimum tile point count are
//! discarded at that moment and never reach the index. The scheduler's [RootWriter] writes the
//! index file once, atomically, at the end of a run that was not cancelled.

use crate::settings::ImportSettings;
use crate::writer::{Channels, FlushStats, PointSink};
use crate::{Bounds, Point, Result, Vector};
use byteorder::{LittleEndian, WriteBytesExt};
use log::warn;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The file extension of tile files.
pub(crate) const TILE_EXTENSION: &str = "pct";

type CellKey = (i32, i32, i32);

/// One tile's entry in the in-memory root index.
#[derive(Clone, Copy, Debug)]
struct TileEntry {
    count: u64,
    bounds: Bounds,
    last_file: usize,
    overlap: bool,
}

/// State shared by every tiled writer of a run: grid parameters and the root index.
pub(crate) struct RootState {
    tile_dir: PathBuf,
    root_path: PathBuf,
    grid_size: f64,
    offset: Vector<f64>,
    pack_magic: Option<u32>,
    channels: Channels,
    min_points_per_tile: u64,
    check_overlap: bool,
    index: Mutex<HashMap<CellKey, TileEntry>>,
}

impl RootState {
    /// Computes the grid parameters and creates the tile directory.
    pub fn create(settings: &ImportSettings, offset: Vector<f64>) -> Result<RootState> {
        let tile_dir = settings.root_stem();
        fs::create_dir_all(&tile_dir)?;
        Ok(RootState {
            tile_dir,
            root_path: settings.pcroot_path(),
            grid_size: settings.grid_size,
            offset,
            pack_magic: settings.pack_colors.then_some(settings.pack_magic),
            channels: Channels::from_settings(settings),
            min_points_per_tile: settings.min_points_per_tile,
            check_overlap: settings.check_overlap,
            index: Mutex::new(HashMap::new()),
        })
    }

    fn lock_index(&self) -> MutexGuard<'_, HashMap<CellKey, TileEntry>> {
        self.index.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tile_name(key: CellKey) -> String {
        format!("{}_{}_{}.{}", key.0, key.1, key.2, TILE_EXTENSION)
    }
}

#[derive(Debug)]
struct CellBuffer {
    bytes: Vec<u8>,
    count: u64,
    bounds: Bounds,
}

impl CellBuffer {
    fn new() -> CellBuffer {
        CellBuffer {
            bytes: Vec::new(),
            count: 0,
            bounds: Bounds::default(),
        }
    }
}

/// The per-slot tiled sink.
pub(crate) struct PcrootWriter {
    state: Arc<RootState>,
    cells: HashMap<CellKey, CellBuffer>,
    clamped: u64,
    dropped_non_finite: u64,
}

impl PcrootWriter {
    pub fn new(state: Arc<RootState>) -> PcrootWriter {
        PcrootWriter {
            state,
            cells: HashMap::new(),
            clamped: 0,
            dropped_non_finite: 0,
        }
    }

    /// Splits one coordinate into its cell index and in-cell fraction.
    ///
    /// The fraction of a finite coordinate is mathematically in `[0, 1)`, but the subtraction
    /// can round up to exactly 1 for large magnitudes; such values are clamped just below 1 and
    /// reported through the per-file clamp counter.
    fn split(&self, coord: f64) -> Option<(i32, f64, bool)> {
        let scaled = coord / self.state.grid_size;
        let cell = scaled.floor();
        if !(f64::from(i32::MIN) <= cell && cell <= f64::from(i32::MAX)) {
            return None;
        }
        let mut fraction = scaled - cell;
        let mut clamped = false;
        if !(0. ..1.).contains(&fraction) {
            fraction = fraction.clamp(0., 1. - f64::EPSILON);
            clamped = true;
        }
        Some((cell as i32, fraction, clamped))
    }

    fn quantize(fraction: f64, magic: u32) -> u32 {
        ((fraction * f64::from(magic)) as u32).min(magic - 1)
    }
}

impl PointSink for PcrootWriter {
    fn init(&mut self, _estimated_points: u64) -> Result<()> {
        self.cells.clear();
        self.clamped = 0;
        self.dropped_non_finite = 0;
        Ok(())
    }

    fn add_point(&mut self, _index: u64, point: &Point) -> Result<()> {
        if !(point.x.is_finite() && point.y.is_finite() && point.z.is_finite()) {
            self.dropped_non_finite += 1;
            return Ok(());
        }
        let (Some((ix, fx, cx)), Some((iy, fy, cy)), Some((iz, fz, cz))) =
            (self.split(point.x), self.split(point.y), self.split(point.z))
        else {
            // So far out that the cell index overflows; treated like a non-finite point.
            self.dropped_non_finite += 1;
            return Ok(());
        };
        if cx || cy || cz {
            self.clamped += 1;
        }

        let state = &self.state;
        let cell = self.cells.entry((ix, iy, iz)).or_insert_with(CellBuffer::new);
        let out = &mut cell.bytes;
        // Locals as a consumer reconstructs them, so the tile bounds exactly bound the records.
        let (lx, ly, lz) = if let Some(magic) = state.pack_magic {
            let (qx, qy, qz) = (
                Self::quantize(fx, magic),
                Self::quantize(fy, magic),
                Self::quantize(fz, magic),
            );
            out.write_u32::<LittleEndian>((qx * magic + qy) * magic + qz)?;
            let dequantize = |q: u32| (f64::from(q) + 0.5) / f64::from(magic) * state.grid_size;
            (dequantize(qx), dequantize(qy), dequantize(qz))
        } else {
            let (lx, ly, lz) = (
                (fx * state.grid_size) as f32,
                (fy * state.grid_size) as f32,
                (fz * state.grid_size) as f32,
            );
            out.write_f32::<LittleEndian>(lx)?;
            out.write_f32::<LittleEndian>(ly)?;
            out.write_f32::<LittleEndian>(lz)?;
            (f64::from(lx), f64::from(ly), f64::from(lz))
        };
        let (r, g, b) = point.color.unwrap_or_default().to_u8();
        out.write_u8(r)?;
        out.write_u8(g)?;
        out.write_u8(b)?;
        if state.channels.intensity {
            out.write_u16::<LittleEndian>(point.intensity)?;
        }
        if state.channels.time {
            out.write_f64::<LittleEndian>(point.gps_time.unwrap_or(0.))?;
        }

        cell.bounds.grow_xyz(
            state.offset.x + f64::from(ix) * state.grid_size + lx,
            state.offset.y + f64::from(iy) * state.grid_size + ly,
            state.offset.z + f64::from(iz) * state.grid_size + lz,
        );
        cell.count += 1;
        Ok(())
    }

    /// Flushes this file's cell buffers into the shared tile files and the root index.
    ///
    /// The index lock is held across the appends, which serializes concurrent saves and keeps
    /// tile files free of interleaved records.
    fn save(&mut self, file_index: usize) -> Result<FlushStats> {
        let mut stats = FlushStats {
            clamped: self.clamped,
            dropped_non_finite: self.dropped_non_finite,
            ..Default::default()
        };
        self.clamped = 0;
        self.dropped_non_finite = 0;

        let state = Arc::clone(&self.state);
        let mut index = state.lock_index();
        for (key, cell) in self.cells.drain() {
            if cell.count < state.min_points_per_tile {
                stats.tiles_dropped += 1;
                stats.points_dropped += cell.count;
                continue;
            }
            let path = state.tile_dir.join(RootState::tile_name(key));
            let mut file = OpenOptions::new().create(true).append(true).open(path)?;
            file.write_all(&cell.bytes)?;
            stats.tiles_kept += 1;
            stats.points_written += cell.count;
            index
                .entry(key)
                .and_modify(|entry| {
                    entry.count += cell.count;
                    entry.bounds.union(&cell.bounds);
                    if entry.last_file != file_index {
                        entry.overlap = true;
                        entry.last_file = file_index;
                    }
                })
                .or_insert(TileEntry {
                    count: cell.count,
                    bounds: cell.bounds,
                    last_file: file_index,
                    overlap: false,
                });
        }
        Ok(stats)
    }

    fn close(&mut self) -> Result<()> {
        // Unsaved buffers belong to a file that failed mid-way; they are dropped with the writer.
        self.cells.clear();
        Ok(())
    }
}

/// Totals of a written root index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RootSummary {
    /// Tiles listed in the root index.
    pub tiles: usize,
    /// Points across all listed tiles.
    pub points: u64,
}

/// The scheduler-owned finalizer for the tiled format.
///
/// Distinct from the pooled per-slot writers; workers never touch it.
pub(crate) struct RootWriter {
    state: Arc<RootState>,
    closed: bool,
}

impl RootWriter {
    pub fn new(state: Arc<RootState>) -> RootWriter {
        RootWriter {
            state,
            closed: false,
        }
    }

    /// Writes the root index, write-then-rename, and returns its totals.
    ///
    /// Returns `None` without creating the file when no tile survived the minimum-point
    /// threshold. Must not be called for a cancelled run; the scheduler guarantees that.
    pub fn close(&mut self) -> Result<Option<RootSummary>> {
        if self.closed {
            return Err(crate::Error::Closed);
        }
        self.closed = true;

        let state = &self.state;
        let index = state.lock_index();
        if index.is_empty() {
            warn!("no tiles survived, not writing {}", state.root_path.display());
            return Ok(None);
        }
        let mut tiles: Vec<(CellKey, TileEntry)> =
            index.iter().map(|(&key, &entry)| (key, entry)).collect();
        drop(index);
        tiles.sort_by_key(|&(key, _)| key);

        let mut bounds = Bounds::default();
        let mut points = 0;
        for (_, entry) in &tiles {
            bounds.union(&entry.bounds);
            points += entry.count;
        }

        let tmp = state.root_path.with_extension("pcroot.tmp");
        {
            let mut out = BufWriter::new(File::create(&tmp)?);
            writeln!(out, "version 3")?;
            writeln!(out, "gridsize {}", state.grid_size)?;
            writeln!(
                out,
                "offset {} {} {}",
                state.offset.x, state.offset.y, state.offset.z
            )?;
            match state.pack_magic {
                Some(magic) => writeln!(out, "pack 1 {magic}")?,
                None => writeln!(out, "pack 0 0")?,
            }
            writeln!(
                out,
                "channels rgb={} intensity={} time={}",
                u8::from(state.channels.rgb),
                u8::from(state.channels.intensity),
                u8::from(state.channels.time)
            )?;
            writeln!(
                out,
                "bounds {} {} {} {} {} {}",
                bounds.min.x, bounds.min.y, bounds.min.z, bounds.max.x, bounds.max.y, bounds.max.z
            )?;
            writeln!(out, "points {points}")?;
            writeln!(out, "tiles {}", tiles.len())?;
            for (key, entry) in &tiles {
                let b = entry.bounds;
                writeln!(
                    out,
                    "{} {} {} {} {} {} {} {}",
                    RootState::tile_name(*key),
                    entry.count,
                    b.min.x,
                    b.min.y,
                    b.min.z,
                    b.max.x,
                    b.max.y,
                    b.max.z
                )?;
            }
            out.flush()?;
        }
        fs::rename(&tmp, &state.root_path)?;

        if state.check_overlap {
            for (key, entry) in &tiles {
                if entry.overlap {
                    warn!(
                        "tile {} received points from more than one source file",
                        RootState::tile_name(*key)
                    );
                }
            }
        }

        Ok(Some(RootSummary {
            tiles: tiles.len(),
            points,
        }))
    }
}
