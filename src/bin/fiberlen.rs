//! fiberlen: measure cotton fiber lengths in a microscope image.

use std::fs;
use std::path::PathBuf;

use ab_glyph::FontVec;
use clap::{Parser, ValueEnum};
use cottonfiber::{annotate, annotate_with_text, FiberConfig, FiberMode, FiberPipeline, FiberReport};
use log::info;

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "fiberlen")]
#[command(about = "Estimate cotton fiber lengths from a microscope image")]
#[command(version)]
struct Cli {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Measurement mode.
    #[arg(long, value_enum, default_value_t = ModeArg::PerFiber)]
    mode: ModeArg,

    /// Millimetres per pixel, applied to aggregate lengths.
    #[arg(long, default_value = "1.0")]
    calibration: f64,

    /// JSON file overriding any subset of the default tunables.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the annotated clustering image here (aggregate mode).
    #[arg(long)]
    annotated: Option<PathBuf>,

    /// TrueType font for the length readout on the annotated image.
    #[arg(long)]
    font: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    PerFiber,
    Aggregate,
    Branches,
}

impl ModeArg {
    fn to_core(self) -> FiberMode {
        match self {
            Self::PerFiber => FiberMode::PerFiber,
            Self::Aggregate => FiberMode::Aggregate,
            Self::Branches => FiberMode::Branches,
        }
    }
}

fn load_config(path: &Option<PathBuf>) -> CliResult<FiberConfig> {
    match path {
        Some(path) => {
            let text = fs::read_to_string(path).map_err(|e| -> CliError {
                format!("Failed to read config {}: {}", path.display(), e).into()
            })?;
            Ok(serde_json::from_str(&text)?)
        }
        None => Ok(FiberConfig::default()),
    }
}

fn main() -> CliResult<()> {
    env_logger::init();

    let cli = Cli::parse();

    info!("Loading image: {}", cli.image.display());
    let raster = image::open(&cli.image).map_err(|e| -> CliError {
        format!("Failed to open image {}: {}", cli.image.display(), e).into()
    })?;
    info!("Image size: {}x{}", raster.width(), raster.height());

    let pipeline = FiberPipeline::new(load_config(&cli.config)?)?;
    let report = pipeline.run(&raster, cli.calibration, cli.mode.to_core())?;

    if let (FiberReport::Aggregate(estimate), Some(out)) = (&report, &cli.annotated) {
        let canvas = match &cli.font {
            Some(font_path) => {
                let font = FontVec::try_from_vec(fs::read(font_path)?).map_err(|e| -> CliError {
                    format!("Failed to load font {}: {}", font_path.display(), e).into()
                })?;
                annotate_with_text(&raster, estimate, &font)
            }
            None => annotate(&raster, estimate),
        };
        canvas.save(out)?;
        info!("Annotated image written to {}", out.display());
    }

    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
