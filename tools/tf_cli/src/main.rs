//! `terraforge` command line entry point.
//!
//! Takes a terrain config (TOML) and produces the `.ter`, road `.dae` and
//! debug heightmap in the output directory. Exit codes: 0 success,
//! 2 validation error, 3 I/O error, 4 unsupported format.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use terraforge_pipeline::{CancelToken, PipelineConfig, PipelineError, PipelineReport};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "terraforge",
    version,
    about = "Generate BeamNG terrain and road meshes from heightmaps and road networks"
)]
struct Cli {
    /// Terrain configuration file (TOML).
    config: PathBuf,

    /// Output directory; overrides `output_dir` from the config.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Log filter, e.g. `info` or `terraforge_roads=debug`.
    #[arg(long, default_value = "info")]
    log: String,
}

fn init_tracing(filter: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_new(filter).context("invalid log filter")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
    Ok(())
}

fn print_report(report: &PipelineReport) {
    println!(
        "processed {} splines, {} cross sections, {} junctions ({} terrain pixels modified)",
        report.splines, report.cross_sections, report.junctions, report.modified_pixels
    );
    for (material, color) in &report.material_colors {
        println!("material {material}: dominant color {color}");
    }
    for (material, roughness) in &report.material_roughness {
        println!("material {material}: dominant roughness {roughness}");
    }
    for path in &report.outputs {
        println!("wrote {}", path.display());
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(&cli.log) {
        eprintln!("error: {e:#}");
        return ExitCode::from(2);
    }

    let config = match PipelineConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => return fail(e),
    };
    let output_dir = cli
        .output
        .or_else(|| config.output_dir.clone())
        .unwrap_or_else(|| PathBuf::from("."));

    let cancel = CancelToken::new();
    match terraforge_pipeline::run(&config, &output_dir, &cancel) {
        Ok(report) => {
            print_report(&report);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn fail(error: PipelineError) -> ExitCode {
    eprintln!("error: {error}");
    ExitCode::from(error.exit_code() as u8)
}
