use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing::error;

use sfm_pipeline::config::PipelineConfig;
use sfm_pipeline::pipeline::SfmPipeline;
use sfm_pipeline::sfm::ColmapBackend;

/// Configuration-driven Structure-from-Motion mapping pipeline.
#[derive(Debug, Parser)]
#[command(name = "sfm-pipeline")]
#[command(about = "Build a sparse 3D reconstruction from a folder of images")]
#[command(version)]
struct Args {
    /// Path to the YAML pipeline configuration file.
    #[arg(long)]
    config_file: PathBuf,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(err) = try_main() {
        error!("pipeline failed: {err:#}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::from_yaml_file(&args.config_file)?;
    let pipeline = SfmPipeline::new(config, ColmapBackend::new());
    pipeline.run()?;
    Ok(())
}
