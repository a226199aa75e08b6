//! Command line frontend: turns arguments into an [ImportSettings] and runs the conversion.

use clap::{Parser, ValueEnum};
use log::error;
use pcconvert::{
    CancelToken, ExportFormat, ImportFormat, ImportSettings, OffsetMode, RunStatus, Summary,
    Vector, convert,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ImportFormatArg {
    #[value(name = "LAS", alias = "las")]
    Las,
    #[value(name = "LAZ", alias = "laz")]
    Laz,
}

impl From<ImportFormatArg> for ImportFormat {
    fn from(arg: ImportFormatArg) -> ImportFormat {
        match arg {
            ImportFormatArg::Las => ImportFormat::Las,
            ImportFormatArg::Laz => ImportFormat::Laz,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ExportFormatArg {
    #[value(name = "UCPC", alias = "ucpc")]
    Ucpc,
    #[value(name = "PCROOT", alias = "pcroot")]
    Pcroot,
}

impl From<ExportFormatArg> for ExportFormat {
    fn from(arg: ExportFormatArg) -> ExportFormat {
        match arg {
            ExportFormatArg::Ucpc => ExportFormat::Ucpc,
            ExportFormatArg::Pcroot => ExportFormat::Pcroot,
        }
    }
}

/// `--offset auto` enables the global bounds pass, `--offset x,y,z` sets a fixed offset.
fn parse_offset(value: &str) -> Result<OffsetMode, String> {
    match value {
        "auto" | "true" => Ok(OffsetMode::Auto),
        "false" | "none" => Ok(OffsetMode::None),
        _ => {
            let parts: Vec<&str> = value.split(',').collect();
            if parts.len() != 3 {
                return Err(format!(
                    "expected `auto` or three comma-separated floats, got `{value}`"
                ));
            }
            let mut floats = [0f64; 3];
            for (float, part) in floats.iter_mut().zip(&parts) {
                *float = part
                    .trim()
                    .parse()
                    .map_err(|err| format!("bad offset component `{part}`: {err}"))?;
            }
            Ok(OffsetMode::Manual(Vector::new(floats[0], floats[1], floats[2])))
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "pcconvert",
    version,
    about = "Converts las/laz point clouds into the UCPC container or the PCROOT tiled format"
)]
struct Cli {
    /// Input las/laz file, or a directory of them
    #[arg(long)]
    input: PathBuf,

    /// Output file (UCPC) or output stem (PCROOT)
    #[arg(long)]
    output: PathBuf,

    /// Only accept inputs of this format
    #[arg(long = "importformat", value_enum)]
    importformat: Option<ImportFormatArg>,

    /// Output format
    #[arg(long = "exportformat", value_enum, default_value = "UCPC")]
    exportformat: ExportFormatArg,

    /// `auto` for a global bounds pass, or `x,y,z` for a manual offset
    #[arg(long, value_parser = parse_offset)]
    offset: Option<OffsetMode>,

    /// Include the rgb channels [default: true]
    #[arg(
        long,
        default_value_t = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    rgb: bool,

    /// Include the intensity channel
    #[arg(
        long,
        default_value_t = false,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    intensity: bool,

    /// PCROOT cell size in source units
    #[arg(long, default_value_t = 5.)]
    gridsize: f64,

    /// Drop tiles with fewer points than this
    #[arg(long, default_value_t = 0)]
    minpoints: u64,

    /// Multiplicative geometric scale
    #[arg(long)]
    scale: Option<f64>,

    /// Swap the y and z axes
    #[arg(long)]
    swap: bool,

    /// Negate the x axis
    #[arg(long)]
    invertx: bool,

    /// Negate the z axis
    #[arg(long)]
    invertz: bool,

    /// Pack cell-local coordinates into a fixed-point u32 (PCROOT)
    #[arg(long)]
    pack: bool,

    /// Quantization steps per axis when packing
    #[arg(long, default_value_t = 1024)]
    packmagic: u32,

    /// Cap points taken per file
    #[arg(long)]
    limit: Option<u64>,

    /// Drop every n-th point
    #[arg(long, default_value_t = 0)]
    skip: u64,

    /// Keep every n-th surviving point
    #[arg(long, default_value_t = 0)]
    keep: u64,

    /// Cap the number of files processed (0 = all)
    #[arg(long, default_value_t = 0)]
    maxfiles: usize,

    /// Shuffle the input file order
    #[arg(long)]
    randomize: bool,

    /// Seed for the shuffle
    #[arg(long)]
    seed: Option<u64>,

    /// Emit one json event per line on stdout
    #[arg(long)]
    json: bool,

    /// Capture per-file header metadata into `<output stem>.json`
    #[arg(long)]
    metadata: bool,

    /// Only capture metadata, convert nothing
    #[arg(long)]
    metadataonly: bool,

    /// Include the gps time channel and report per-file averages
    #[arg(long)]
    averagetimestamp: bool,

    /// Warn when a tile receives points from more than one file
    #[arg(long)]
    checkoverlap: bool,

    /// Worker parallelism (clamped to the file count)
    #[arg(long, default_value_t = 1)]
    maxthreads: usize,

    /// Treat input intensity as 8 bit (0-255)
    #[arg(long)]
    customintensityrange: bool,
}

impl Cli {
    fn into_settings(self) -> pcconvert::Result<ImportSettings> {
        let mut settings = ImportSettings {
            output: self.output,
            import_format: self.importformat.map(ImportFormat::from),
            export_format: self.exportformat.into(),
            offset: self.offset.unwrap_or_default(),
            import_rgb: self.rgb,
            import_intensity: self.intensity,
            grid_size: self.gridsize,
            min_points_per_tile: self.minpoints,
            scale: self.scale,
            swap_yz: self.swap,
            invert_x: self.invertx,
            invert_z: self.invertz,
            pack_colors: self.pack,
            pack_magic: self.packmagic,
            limit: self.limit,
            skip_every: self.skip,
            keep_every: self.keep,
            max_files: self.maxfiles,
            randomize: self.randomize,
            seed: self.seed,
            json_events: self.json,
            import_metadata: self.metadata || self.metadataonly,
            metadata_only: self.metadataonly,
            average_timestamp: self.averagetimestamp,
            check_overlap: self.checkoverlap,
            max_threads: self.maxthreads,
            custom_intensity_range: self.customintensityrange,
            input_files: Vec::new(),
        };
        settings.input_files = collect_inputs(&self.input, &settings)?;
        Ok(settings)
    }
}

/// Expands a directory input into its las/laz files, sorted by name.
fn collect_inputs(input: &Path, settings: &ImportSettings) -> pcconvert::Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input)? {
        let path = entry?.path();
        if path.is_file() && settings.accepts_path(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn run() -> pcconvert::Result<Summary> {
    let cli = Cli::parse();
    let settings = cli.into_settings()?;
    convert(&settings, &CancelToken::new())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    match run() {
        Ok(summary) => match summary.status {
            RunStatus::Cancelled => ExitCode::from(2),
            RunStatus::Completed => {
                if summary.errors > 0 && summary.files_converted == 0 {
                    ExitCode::from(1)
                } else {
                    ExitCode::SUCCESS
                }
            }
        },
        Err(err) => {
            error!("{err}");
            ExitCode::from(1)
        }
    }
}
