//! Pipeline orchestration.
//!
//! Runs the four SfM stages in strict order, threading artifact paths from
//! one stage into the next: retrieval extraction, pair generation, feature
//! extraction, matching, reconstruction. Every stage blocks until it
//! completes or fails; failures propagate unhandled. The only defensive
//! step is the optional pre-run output wipe.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::output;
use crate::sfm::{Reconstruction, SfmBackend, pairs};
use crate::viz::RerunVisualizer;

/// Largest reference count exhaustive pairing handles without an advisory.
/// Above this the pair count (quadratic) starts to hurt matching time.
pub const MAX_QUIET_EXHAUSTIVE: usize = 16;

/// Failures of the orchestrator's own logic, as opposed to toolkit errors
/// passed through from the stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("only exhaustive pairing is implemented; set use_exhaustive: true")]
    UnsupportedPairing,
}

/// Enumerate image references: every entry of `image_dir`, as a path
/// relative to it, sorted by name so runs are reproducible.
pub fn list_image_references(image_dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(image_dir)
        .with_context(|| format!("failed to list image directory {}", image_dir.display()))?;

    let mut references = Vec::new();
    for entry in entries {
        let entry = entry
            .with_context(|| format!("failed to list image directory {}", image_dir.display()))?;
        references.push(entry.file_name().to_string_lossy().into_owned());
    }
    references.sort();
    Ok(references)
}

/// The four-stage mapping pipeline over a validated configuration and an
/// SfM backend.
pub struct SfmPipeline<B> {
    config: PipelineConfig,
    backend: B,
}

impl<B: SfmBackend> SfmPipeline<B> {
    pub fn new(config: PipelineConfig, backend: B) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Execute the pipeline to completion and return the reconstruction.
    ///
    /// The model is also persisted under `<base_output_dir>/model/`, and
    /// streamed to the visualizer when the configuration asks for it.
    pub fn run(&self) -> Result<Reconstruction> {
        let config = &self.config;
        let image_dir = &config.image_dir;
        let output_dir = &config.base_output_dir;

        let references = list_image_references(image_dir)?;
        info!("found {} image references in {}", references.len(), image_dir.display());

        if config.force_overwrite {
            output::clear_tree(output_dir)?;
        }

        let sfm_dir = output_dir.join("sfm");
        output::ensure_dir(&sfm_dir)?;
        let pairs_path = sfm_dir.join("pairs.txt");

        // Retrieval descriptors are computed up front for retrieval-based
        // pairing. The exhaustive path never reads them; they are kept as
        // precomputation rather than silently dropped.
        let retrieval_path = self
            .backend
            .extract_features(&config.retrieval_conf, image_dir, output_dir)
            .context("retrieval feature extraction failed")?;
        debug!(
            "retrieval descriptors at {} (not consumed by exhaustive pairing)",
            retrieval_path.display()
        );

        if config.use_exhaustive {
            if references.len() > MAX_QUIET_EXHAUSTIVE {
                warn!(
                    "using {} images with exhaustive matching might take a while",
                    references.len()
                );
            }
            let pair_count = pairs::write_exhaustive(&pairs_path, &references)?;
            info!("generated {pair_count} exhaustive pairs");
        } else {
            return Err(PipelineError::UnsupportedPairing.into());
        }

        let features_path = self
            .backend
            .extract_features(&config.feature_conf, image_dir, output_dir)
            .context("feature extraction failed")?;

        let matches_path = self
            .backend
            .match_features(
                &config.matcher_conf,
                &pairs_path,
                &config.feature_conf.output,
                output_dir,
            )
            .context("feature matching failed")?;

        let model = self
            .backend
            .reconstruct(
                &sfm_dir,
                image_dir,
                &pairs_path,
                &features_path,
                &matches_path,
                &references,
            )
            .context("reconstruction failed")?;
        info!(
            "reconstructed {} registered images, {} points",
            model.num_registered_images(),
            model.num_points()
        );

        let model_dir = output_dir.join("model");
        output::ensure_dir(&model_dir)?;
        model
            .write(&model_dir)
            .with_context(|| format!("failed to persist model to {}", model_dir.display()))?;
        info!("persisted model to {}", model_dir.display());

        if config.visualize {
            RerunVisualizer::spawn("sfm-pipeline")?.log_reconstruction(&model);
        }

        Ok(model)
    }
}
