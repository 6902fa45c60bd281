//! COLMAP-backed implementation of the toolkit boundary.
//!
//! Drives the `colmap` executable through four of its subcommands:
//! `feature_extractor` (SIFT descriptors into a database),
//! `matches_importer` (match the pairs list, verified geometrically),
//! `mapper` (incremental reconstruction), and `model_converter` (binary
//! model to the text format [`Reconstruction`] reads).
//!
//! Stage configurations are passed through as CLI options. Only the SIFT
//! model family is available in COLMAP; presets selecting learned models
//! (netvlad, superpoint, lightglue, ...) fail at stage time with a
//! descriptive error, which the pipeline propagates unhandled like any
//! other toolkit fault.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde_yaml::Value;
use tracing::{debug, info, warn};

use crate::config::StageConfig;
use crate::output;

use super::{Reconstruction, SfmBackend};

pub struct ColmapBackend {
    binary: PathBuf,
}

impl ColmapBackend {
    /// Use the `colmap` executable found on `$PATH`.
    pub fn new() -> Self {
        Self::with_binary("colmap")
    }

    /// Use an explicit toolkit binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, subcommand: &str, args: &[(String, String)]) -> Result<()> {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(subcommand);
        for (key, value) in args {
            cmd.arg(format!("--{key}")).arg(value);
        }

        debug!("running {} {subcommand}", self.binary.display());
        let status = cmd.status().with_context(|| {
            format!("failed to launch {} {subcommand}", self.binary.display())
        })?;
        if !status.success() {
            bail!("colmap {subcommand} exited with {status}");
        }
        Ok(())
    }
}

impl Default for ColmapBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SfmBackend for ColmapBackend {
    fn extract_features(
        &self,
        conf: &StageConfig,
        image_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        require_sift(&conf.model.name, "extraction")?;
        if let Some(preprocessing) = &conf.preprocessing {
            // COLMAP does its own image loading; resize/grayscale hints from
            // the shared preset records have no CLI counterpart.
            debug!("preprocessing options ignored by the COLMAP backend: {preprocessing:?}");
        }

        output::ensure_dir(output_dir)?;
        let database = output_dir.join(format!("{}.db", conf.output));

        let mut args = vec![
            ("database_path".to_string(), path_arg(&database)),
            ("image_path".to_string(), path_arg(image_dir)),
        ];
        args.extend(prefixed_options("SiftExtraction", &conf.model.options));
        self.run("feature_extractor", &args)?;

        info!("extracted {} into {}", conf.output, database.display());
        Ok(database)
    }

    fn match_features(
        &self,
        conf: &StageConfig,
        pairs_path: &Path,
        feature_key: &str,
        output_dir: &Path,
    ) -> Result<PathBuf> {
        require_sift(&conf.model.name, "matching")?;

        // Matches land in the database the extraction stage created for
        // this feature key.
        let database = output_dir.join(format!("{feature_key}.db"));
        if !database.exists() {
            bail!(
                "feature database {} not found; was extraction run for {feature_key}?",
                database.display()
            );
        }

        let mut args = vec![
            ("database_path".to_string(), path_arg(&database)),
            ("match_list_path".to_string(), path_arg(pairs_path)),
            ("match_type".to_string(), "pairs".to_string()),
        ];
        args.extend(prefixed_options("SiftMatching", &conf.model.options));
        self.run("matches_importer", &args)?;

        info!("imported {} into {}", conf.output, database.display());
        Ok(database)
    }

    fn reconstruct(
        &self,
        sfm_dir: &Path,
        image_dir: &Path,
        pairs_path: &Path,
        features_path: &Path,
        matches_path: &Path,
        image_list: &[String],
    ) -> Result<Reconstruction> {
        debug!(
            "reconstructing from pairs {} / features {} / matches {}",
            pairs_path.display(),
            features_path.display(),
            matches_path.display()
        );

        // The mapper has no image-list option; registration is already
        // constrained to the listed images through the pairs file. The list
        // is persisted alongside the model for audit.
        fs::write(sfm_dir.join("image-list.txt"), image_list.join("\n"))
            .with_context(|| format!("failed to write image list in {}", sfm_dir.display()))?;

        let sparse_dir = sfm_dir.join("sparse");
        output::ensure_dir(&sparse_dir)?;
        self.run(
            "mapper",
            &[
                ("database_path".to_string(), path_arg(matches_path)),
                ("image_path".to_string(), path_arg(image_dir)),
                ("output_path".to_string(), path_arg(&sparse_dir)),
            ],
        )?;

        // The mapper numbers disconnected models 0, 1, ...; the first is the
        // largest and the one this pipeline keeps.
        let model_dir = sparse_dir.join("0");
        if !model_dir.is_dir() {
            bail!("mapper produced no model under {}", sparse_dir.display());
        }
        if sparse_dir.join("1").is_dir() {
            warn!("mapper produced multiple disconnected models; keeping model 0");
        }

        self.run(
            "model_converter",
            &[
                ("input_path".to_string(), path_arg(&model_dir)),
                ("output_path".to_string(), path_arg(&model_dir)),
                ("output_type".to_string(), "TXT".to_string()),
            ],
        )?;

        Reconstruction::read_text_model(&model_dir)
    }
}

fn require_sift(model_name: &str, stage: &str) -> Result<()> {
    if model_name != "sift" {
        bail!(
            "the COLMAP backend only implements SIFT-family {stage}; \
             model {model_name:?} requires a different toolkit"
        );
    }
    Ok(())
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Flatten free-form stage options into `--Section.key value` CLI pairs.
/// COLMAP expects booleans as 0/1. Nested values have no CLI form and are
/// skipped with a warning.
fn prefixed_options(section: &str, options: &BTreeMap<String, Value>) -> Vec<(String, String)> {
    let mut args = Vec::new();
    for (key, value) in options {
        let rendered = match value {
            Value::Bool(b) => Some(if *b { "1".to_string() } else { "0".to_string() }),
            Value::Number(n) => Some(n.to_string()),
            Value::String(s) => Some(s.clone()),
            _ => None,
        };
        match rendered {
            Some(rendered) => args.push((format!("{section}.{key}"), rendered)),
            None => warn!("option {key} has no CLI representation, skipping"),
        }
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::presets;

    #[test]
    fn test_learned_models_are_rejected_before_any_launch() {
        let backend = ColmapBackend::with_binary("/nonexistent/colmap");
        let conf = presets::extraction_conf("netvlad").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = backend
            .extract_features(&conf, dir.path(), &dir.path().join("out"))
            .unwrap_err();
        assert!(err.to_string().contains("netvlad"));
        // Rejected before touching the filesystem.
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_matching_requires_the_feature_database() {
        let backend = ColmapBackend::with_binary("/nonexistent/colmap");
        let conf = presets::matcher_conf("sift-nn").unwrap();
        let dir = tempfile::tempdir().unwrap();

        let err = backend
            .match_features(&conf, &dir.path().join("pairs.txt"), "feats-sift", dir.path())
            .unwrap_err();
        assert!(err.to_string().contains("feats-sift"));
    }

    #[test]
    fn test_prefixed_options_render_scalars() {
        let conf = presets::matcher_conf("sift-nn").unwrap();
        let args = prefixed_options("SiftMatching", &conf.model.options);
        assert!(args.contains(&("SiftMatching.cross_check".to_string(), "1".to_string())));
        assert!(args.contains(&("SiftMatching.max_ratio".to_string(), "0.8".to_string())));
    }

    #[test]
    fn test_prefixed_options_skip_nested_values() {
        let mut options = BTreeMap::new();
        options.insert("weights".to_string(), Value::Sequence(vec![Value::from(1)]));
        options.insert("octaves".to_string(), Value::from(4));
        let args = prefixed_options("SiftExtraction", &options);
        assert_eq!(args, vec![("SiftExtraction.octaves".to_string(), "4".to_string())]);
    }
}
