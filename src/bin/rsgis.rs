//! rsgis command line tools

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;

use rsgis::clump::{Connectivity, TiledClumper};
use rsgis::config::ProcessingConfig;
use rsgis::progress::LogProgress;
use rsgis::timeseries::{
    screen_image_series, tmask_image_series, DatedImage, OutlierScreen, ResidualLimit, TmaskBands,
    TmaskScreen,
};
use rsgis::{Result, RsgisError};

#[derive(Parser, Debug)]
#[command(name = "rsgis")]
#[command(version, about = "Tiled clumping and time-series screening of raster images")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct Tiling {
    /// Tile width in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = 512)]
    tile_width: usize,

    /// Tile height in pixels
    #[arg(long, value_name = "PIXELS", default_value_t = 512)]
    tile_height: usize,

    /// Pixel connectivity, 4 or 8
    #[arg(short, long, value_name = "N", default_value_t = 8)]
    connectivity: u8,

    /// Number of worker threads (default: all available)
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// Output format, e.g. GTiff or KEA
    #[arg(short, long, default_value = "GTiff")]
    format: String,
}

impl Tiling {
    fn config(&self) -> Result<ProcessingConfig> {
        let mut config = ProcessingConfig::default()
            .with_tile_size(self.tile_width, self.tile_height)
            .with_connectivity(Connectivity::try_from(self.connectivity)?)
            .with_progress(Arc::new(LogProgress::default()));
        if let Some(workers) = self.workers {
            config = config.with_workers(workers);
        }
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Label connected regions of a raster band
    Clump {
        /// Input raster
        input: PathBuf,
        /// Output clump raster (UInt32, 0 = background)
        output: PathBuf,
        /// Band to clump
        #[arg(short, long, default_value_t = 1)]
        band: usize,
        #[command(flatten)]
        tiling: Tiling,
    },
    /// Label connected regions of the union of two rasters
    ClumpUnion {
        input_a: PathBuf,
        input_b: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        tiling: Tiling,
    },
    /// Flag seasonal outliers in a dated image series
    Outliers {
        /// Dated input as DATE=PATH, e.g. 2015-06-01=scene.tif
        #[arg(
            short,
            long = "image",
            value_name = "DATE=PATH",
            required = true,
            value_parser = parse_dated_image
        )]
        images: Vec<DatedImage>,
        /// Flag raster per input, in the same order
        #[arg(short, long = "output", value_name = "FILE", required = true)]
        outputs: Vec<PathBuf>,
        /// Residual threshold as a multiple of the fit RMSE
        #[arg(short, long, default_value_t = 3.0)]
        threshold: f64,
        /// Bands to screen (default: all)
        #[arg(short, long, value_delimiter = ',')]
        bands: Vec<usize>,
        #[command(flatten)]
        tiling: Tiling,
    },
    /// Flag clouds and shadows in a dated image series
    Tmask {
        #[arg(
            short,
            long = "image",
            value_name = "DATE=PATH",
            required = true,
            value_parser = parse_dated_image
        )]
        images: Vec<DatedImage>,
        #[arg(short, long = "output", value_name = "FILE", required = true)]
        outputs: Vec<PathBuf>,
        /// Residual threshold in data units
        #[arg(short, long, default_value_t = 40.0)]
        threshold: f64,
        /// Read the threshold as a multiple of each fit's RMSE
        #[arg(long)]
        rmse_multiple: bool,
        #[arg(long, default_value_t = 2)]
        green: usize,
        #[arg(long, default_value_t = 4)]
        nir: usize,
        #[arg(long, default_value_t = 5)]
        swir: usize,
        #[command(flatten)]
        tiling: Tiling,
    },
}

fn parse_dated_image(arg: &str) -> std::result::Result<DatedImage, String> {
    let (date, path) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected DATE=PATH, got '{arg}'"))?;
    let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map_err(|e| format!("invalid date '{date}': {e}"))?;
    Ok(DatedImage::new(date, path))
}

fn run(command: Command) -> Result<()> {
    match command {
        Command::Clump {
            input,
            output,
            band,
            tiling,
        } => {
            let clumper = TiledClumper::new(tiling.config()?)?;
            let summary = clumper.clump_raster(&input, band, &output, &tiling.format)?;
            info!(
                "Wrote {} clump(s) from {} tile(s) to '{}'",
                summary.clump_count,
                summary.tile_count,
                output.display()
            );
        }
        Command::ClumpUnion {
            input_a,
            input_b,
            output,
            tiling,
        } => {
            let clumper = TiledClumper::new(tiling.config()?)?;
            let summary = clumper.clump_union(&input_a, &input_b, &output, &tiling.format)?;
            info!(
                "Wrote {} clump(s) to '{}'",
                summary.clump_count,
                output.display()
            );
        }
        Command::Outliers {
            images,
            outputs,
            threshold,
            bands,
            tiling,
        } => {
            if threshold <= 0.0 {
                return Err(RsgisError::InvalidParameter {
                    name: "threshold",
                    value: threshold.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
            let screen = OutlierScreen::new(threshold);
            screen_image_series(
                &images,
                &bands,
                &outputs,
                &tiling.format,
                &screen,
                &tiling.config()?,
            )?;
        }
        Command::Tmask {
            images,
            outputs,
            threshold,
            rmse_multiple,
            green,
            nir,
            swir,
            tiling,
        } => {
            let limit = if rmse_multiple {
                ResidualLimit::RmseMultiple
            } else {
                ResidualLimit::Absolute
            };
            let screen = TmaskScreen::new(TmaskBands { green, nir, swir })
                .with_threshold(threshold)
                .with_limit(limit);
            tmask_image_series(&images, &outputs, &tiling.format, &screen, &tiling.config()?)?;
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("rsgis: {e}");
            ExitCode::FAILURE
        }
    }
}
