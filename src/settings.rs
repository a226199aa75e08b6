//! Conversion settings.
//!
//! [ImportSettings] is the single input to [convert](crate::convert). It is produced by an
//! external argument parser (the bundled CLI, or any other frontend) and is immutable for the
//! duration of a run. [ImportSettings::validate] is called once at scheduler start; a violation
//! aborts the run before any file is touched.

use crate::{Error, Result, Vector};
use std::fmt;
use std::path::{Path, PathBuf};

/// The file extension of the single-file container.
pub const UCPC_EXTENSION: &str = "ucpc";

/// The file extension of the tiled root index.
pub const PCROOT_EXTENSION: &str = "pcroot";

/// Input formats accepted by the readers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImportFormat {
    /// Uncompressed las.
    Las,
    /// Laszip-compressed las.
    Laz,
}

impl ImportFormat {
    /// Returns true if a file with this extension matches the format.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcconvert::ImportFormat;
    /// assert!(ImportFormat::Las.matches_extension("LAS"));
    /// assert!(!ImportFormat::Las.matches_extension("laz"));
    /// ```
    pub fn matches_extension(&self, extension: &str) -> bool {
        match self {
            ImportFormat::Las => extension.eq_ignore_ascii_case("las"),
            ImportFormat::Laz => extension.eq_ignore_ascii_case("laz"),
        }
    }
}

/// Output formats produced by the writers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    /// V2, a single-file binary container (`.ucpc`).
    Ucpc,
    /// V3, a tiled layout with a root index (`.pcroot` plus `.pct` tiles).
    Pcroot,
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportFormat::Ucpc => "UCPC".fmt(f),
            ExportFormat::Pcroot => "PCROOT".fmt(f),
        }
    }
}

/// How the coordinate offset is determined.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum OffsetMode {
    /// No offset is subtracted.
    #[default]
    None,
    /// The offset is the element-wise minimum of all input header bounds, computed by a
    /// sequential header-only pass before conversion starts.
    Auto,
    /// A fixed offset.
    Manual(Vector<f64>),
}

/// Immutable configuration for one conversion run.
#[derive(Clone, Debug)]
pub struct ImportSettings {
    /// The input files, in the order they were enumerated.
    pub input_files: Vec<PathBuf>,

    /// The output file (V2) or output stem (V3).
    pub output: PathBuf,

    /// Restricts inputs to one format. `None` accepts both las and laz.
    pub import_format: Option<ImportFormat>,

    /// The output format.
    pub export_format: ExportFormat,

    /// Offset handling, see [OffsetMode].
    pub offset: OffsetMode,

    /// Include the rgb channels.
    pub import_rgb: bool,

    /// Include the intensity channel.
    pub import_intensity: bool,

    /// V3 cell size in source units.
    pub grid_size: f64,

    /// V3 tiles with fewer points than this are discarded at flush time.
    pub min_points_per_tile: u64,

    /// Multiplicative geometric scale, applied after the offset subtraction.
    pub scale: Option<f64>,

    /// Swap the y and z axes.
    pub swap_yz: bool,

    /// Negate x, applied last.
    pub invert_x: bool,

    /// Negate z, applied after the swap.
    pub invert_z: bool,

    /// V3 fixed-point coordinate packing.
    pub pack_colors: bool,

    /// Quantization steps per axis when packing. Must satisfy `magic³ ≤ 2³²`.
    pub pack_magic: u32,

    /// Cap on points taken from each file.
    pub limit: Option<u64>,

    /// Drop every n-th point. Values below two disable skipping.
    pub skip_every: u64,

    /// Keep every n-th of the surviving points. Values below two disable it.
    pub keep_every: u64,

    /// Cap on the number of files processed. Zero means all.
    pub max_files: usize,

    /// Shuffle the input file order.
    pub randomize: bool,

    /// Seed for the shuffle; a random seed is drawn when absent.
    pub seed: Option<u64>,

    /// Emit structured json events instead of log lines.
    pub json_events: bool,

    /// Capture per-file header metadata and write the json sidecar.
    pub import_metadata: bool,

    /// Only capture metadata; no points are read or written.
    pub metadata_only: bool,

    /// Include the gps time channel in the output records.
    pub average_timestamp: bool,

    /// Warn when a tile receives points from more than one source file.
    pub check_overlap: bool,

    /// Requested worker parallelism, clamped to `[1, file count]` by the scheduler.
    pub max_threads: usize,

    /// Treat input intensities as 8 bit (0-255) and widen them to 16 bits.
    pub custom_intensity_range: bool,
}

impl ImportSettings {
    /// Checks cross-field rules.
    ///
    /// Called once by the scheduler before anything else; any violation is fatal.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcconvert::ImportSettings;
    /// let mut settings = ImportSettings::default();
    /// settings.input_files.push("cloud.las".into());
    /// assert!(settings.validate().is_ok());
    /// settings.import_rgb = false;
    /// settings.import_intensity = false;
    /// assert!(settings.validate().is_err());
    /// ```
    pub fn validate(&self) -> Result<()> {
        if self.input_files.is_empty() {
            return Err(Error::InvalidSettings("no input files".to_string()));
        }
        if self.output.as_os_str().is_empty() {
            return Err(Error::InvalidSettings("no output path".to_string()));
        }
        if !self.import_rgb && !self.import_intensity {
            return Err(Error::InvalidSettings(
                "at least one of rgb and intensity must be enabled".to_string(),
            ));
        }
        if let Some(scale) = self.scale {
            if !scale.is_finite() || scale == 0. {
                return Err(Error::InvalidSettings(format!("invalid scale: {scale}")));
            }
        }
        if let OffsetMode::Manual(offset) = self.offset {
            if !(offset.x.is_finite() && offset.y.is_finite() && offset.z.is_finite()) {
                return Err(Error::InvalidSettings("manual offset is not finite".to_string()));
            }
        }
        if self.export_format == ExportFormat::Pcroot {
            if !self.grid_size.is_finite() || self.grid_size <= 0. {
                return Err(Error::InvalidSettings(format!(
                    "grid size must be positive: {}",
                    self.grid_size
                )));
            }
            if self.pack_colors {
                let magic = u64::from(self.pack_magic);
                if magic < 2 || magic.pow(3) > 1u64 << 32 {
                    return Err(Error::InvalidSettings(format!(
                        "pack magic must be in [2, 1625]: {}",
                        self.pack_magic
                    )));
                }
            }
        }
        if self.limit == Some(0) {
            return Err(Error::InvalidSettings("limit must be positive".to_string()));
        }
        Ok(())
    }

    /// Returns true if a header-only bounds pass must run before conversion.
    ///
    /// The pass runs when the offset is automatic, and also when packed colors combine rgb and
    /// intensity, because the packed fixed-point encoding needs non-negative coordinates.
    pub fn needs_bounds_pass(&self) -> bool {
        if self.metadata_only {
            return false;
        }
        self.offset == OffsetMode::Auto
            || (self.import_rgb && self.import_intensity && self.pack_colors)
    }

    /// Returns true if metadata capture is active, either alone or beside conversion.
    pub fn captures_metadata(&self) -> bool {
        self.import_metadata || self.metadata_only
    }

    /// The V2 container path: the output path, with the `ucpc` extension enforced.
    pub fn ucpc_path(&self) -> PathBuf {
        self.output.with_extension(UCPC_EXTENSION)
    }

    /// The V3 stem: the output path with any extension removed.
    ///
    /// Tiles live in the directory named by the stem, the root index beside it.
    pub fn root_stem(&self) -> PathBuf {
        self.output.with_extension("")
    }

    /// The root index path, `<stem>.pcroot`.
    pub fn pcroot_path(&self) -> PathBuf {
        self.root_stem().with_extension(PCROOT_EXTENSION)
    }

    /// The metadata sidecar path, `<stem>.json`.
    pub fn sidecar_path(&self) -> PathBuf {
        self.output.with_extension("json")
    }

    /// Returns true if the path has an extension this run accepts.
    pub fn accepts_path(&self, path: &Path) -> bool {
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        match self.import_format {
            Some(format) => format.matches_extension(extension),
            None => {
                extension.eq_ignore_ascii_case("las") || extension.eq_ignore_ascii_case("laz")
            }
        }
    }
}

impl Default for ImportSettings {
    fn default() -> ImportSettings {
        ImportSettings {
            input_files: Vec::new(),
            output: PathBuf::from("cloud"),
            import_format: None,
            export_format: ExportFormat::Ucpc,
            offset: OffsetMode::None,
            import_rgb: true,
            import_intensity: false,
            grid_size: 5.,
            min_points_per_tile: 0,
            scale: None,
            swap_yz: false,
            invert_x: false,
            invert_z: false,
            pack_colors: false,
            pack_magic: 1024,
            limit: None,
            skip_every: 0,
            keep_every: 0,
            max_files: 0,
            randomize: false,
            seed: None,
            json_events: false,
            import_metadata: false,
            metadata_only: false,
            average_timestamp: false,
            check_overlap: false,
            max_threads: 1,
            custom_intensity_range: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> ImportSettings {
        ImportSettings {
            input_files: vec![PathBuf::from("a.las")],
            ..Default::default()
        }
    }

    #[test]
    fn rejects_empty_input() {
        assert!(ImportSettings::default().validate().is_err());
    }

    #[test]
    fn rejects_no_channels() {
        let mut settings = settings();
        settings.import_rgb = false;
        settings.import_intensity = false;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_bad_grid_size() {
        let mut settings = settings();
        settings.export_format = ExportFormat::Pcroot;
        settings.grid_size = 0.;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn rejects_pack_magic_overflow() {
        let mut settings = settings();
        settings.export_format = ExportFormat::Pcroot;
        settings.pack_colors = true;
        settings.pack_magic = 1626;
        assert!(settings.validate().is_err());
        settings.pack_magic = 1625;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn bounds_pass_triggers() {
        let mut settings = settings();
        assert!(!settings.needs_bounds_pass());
        settings.offset = OffsetMode::Auto;
        assert!(settings.needs_bounds_pass());
        settings.metadata_only = true;
        assert!(!settings.needs_bounds_pass());

        let mut settings = self::settings();
        settings.import_intensity = true;
        settings.pack_colors = true;
        assert!(settings.needs_bounds_pass());
    }

    #[test]
    fn output_paths() {
        let mut settings = settings();
        settings.output = PathBuf::from("out/cloud.ucpc");
        assert_eq!(PathBuf::from("out/cloud.ucpc"), settings.ucpc_path());
        assert_eq!(PathBuf::from("out/cloud"), settings.root_stem());
        assert_eq!(PathBuf::from("out/cloud.pcroot"), settings.pcroot_path());
        assert_eq!(PathBuf::from("out/cloud.json"), settings.sidecar_path());
    }
}
