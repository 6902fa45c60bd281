//! Pipeline configuration: YAML settings file, typed records, preset resolution.
//!
//! The configuration file carries the image/output locations, the pipeline
//! switches, and three stage presets (retrieval, feature extraction,
//! matching). A preset is either a name looked up in the tables in
//! [`presets`] or an inline record passed through unchanged. Resolution
//! happens exactly once, here; the rest of the crate only ever sees concrete
//! [`StageConfig`] records.

pub mod presets;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yaml::Value;
use thiserror::Error;
use tracing::info;

/// Errors raised while loading the pipeline configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse configuration file {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("unknown {field} preset {name:?}")]
    UnknownPreset { field: &'static str, name: String },
}

/// Model selection for a stage: a model name plus free-form options the
/// backend interprets (keypoint budgets, ratio thresholds, ...).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    #[serde(flatten)]
    pub options: BTreeMap<String, Value>,
}

/// A fully-specified configuration record for one pipeline stage.
///
/// `output` doubles as the artifact stem and, for feature extraction, as the
/// feature key the matcher refers back to.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StageConfig {
    pub output: String,
    pub model: ModelConfig,
    #[serde(default)]
    pub preprocessing: Option<BTreeMap<String, Value>>,
}

/// A preset as written in the configuration file: either the name of a
/// table entry or a complete inline record.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Preset {
    Named(String),
    Inline(StageConfig),
}

impl Preset {
    fn resolve(
        self,
        field: &'static str,
        table: fn(&str) -> Option<StageConfig>,
    ) -> Result<StageConfig, ConfigError> {
        match self {
            Preset::Named(name) => {
                table(&name).ok_or(ConfigError::UnknownPreset { field, name })
            }
            Preset::Inline(conf) => Ok(conf),
        }
    }
}

/// On-disk shape of the configuration file. Presets are still unresolved.
#[derive(Debug, Deserialize)]
struct RawConfig {
    image_dir: PathBuf,
    /// All pipeline outputs are stored under this root.
    base_output_dir: PathBuf,
    use_exhaustive: bool,
    visualize: bool,
    force_overwrite: bool,
    retrieval_conf: Preset,
    feature_conf: Preset,
    matcher_conf: Preset,
}

/// Validated, immutable pipeline settings. Every preset is concrete.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub image_dir: PathBuf,
    pub base_output_dir: PathBuf,
    pub use_exhaustive: bool,
    pub visualize: bool,
    pub force_overwrite: bool,
    pub retrieval_conf: StageConfig,
    pub feature_conf: StageConfig,
    pub matcher_conf: StageConfig,
}

impl PipelineConfig {
    /// Load and validate a configuration file, resolving named presets.
    pub fn from_yaml_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let raw: RawConfig = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        let config = Self {
            image_dir: raw.image_dir,
            base_output_dir: raw.base_output_dir,
            use_exhaustive: raw.use_exhaustive,
            visualize: raw.visualize,
            force_overwrite: raw.force_overwrite,
            // Retrieval and feature extraction share one table, matching has
            // its own.
            retrieval_conf: raw
                .retrieval_conf
                .resolve("retrieval_conf", presets::extraction_conf)?,
            feature_conf: raw
                .feature_conf
                .resolve("feature_conf", presets::extraction_conf)?,
            matcher_conf: raw.matcher_conf.resolve("matcher_conf", presets::matcher_conf)?,
        };

        // Audit log of what the run will actually use.
        info!("resolved pipeline configuration:\n{config:#?}");

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn write_config(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    const BASE: &str = "\
image_dir: /data/images
base_output_dir: /data/out
use_exhaustive: true
visualize: false
force_overwrite: false
";

    #[test]
    fn test_named_presets_resolve_to_table_records() {
        let file = write_config(&format!(
            "{BASE}retrieval_conf: netvlad\nfeature_conf: superpoint-aachen\nmatcher_conf: nn-ratio\n"
        ));
        let config = PipelineConfig::from_yaml_file(file.path()).unwrap();

        assert_eq!(
            config.retrieval_conf,
            presets::extraction_conf("netvlad").unwrap()
        );
        assert_eq!(
            config.feature_conf,
            presets::extraction_conf("superpoint-aachen").unwrap()
        );
        assert_eq!(config.matcher_conf, presets::matcher_conf("nn-ratio").unwrap());
    }

    #[test]
    fn test_inline_preset_passes_through_unchanged() {
        let file = write_config(&format!(
            "{BASE}retrieval_conf: netvlad
feature_conf:
  output: feats-custom
  model:
    name: superpoint
    max_keypoints: 1024
  preprocessing:
    grayscale: true
matcher_conf: nn-ratio
"
        ));
        let config = PipelineConfig::from_yaml_file(file.path()).unwrap();

        assert_eq!(config.feature_conf.output, "feats-custom");
        assert_eq!(config.feature_conf.model.name, "superpoint");
        assert_eq!(
            config.feature_conf.model.options.get("max_keypoints"),
            Some(&Value::from(1024))
        );
        let pre = config.feature_conf.preprocessing.as_ref().unwrap();
        assert_eq!(pre.get("grayscale"), Some(&Value::from(true)));
    }

    #[test]
    fn test_unknown_preset_name_fails() {
        let file = write_config(&format!(
            "{BASE}retrieval_conf: netvlad\nfeature_conf: r2d2\nmatcher_conf: nn-ratio\n"
        ));
        let err = PipelineConfig::from_yaml_file(file.path()).unwrap_err();
        match err {
            ConfigError::UnknownPreset { field, name } => {
                assert_eq!(field, "feature_conf");
                assert_eq!(name, "r2d2");
            }
            other => panic!("expected UnknownPreset, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_fails_with_io() {
        let err =
            PipelineConfig::from_yaml_file(Path::new("/nonexistent/pipeline.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_missing_required_field_fails_with_parse() {
        // No matcher_conf.
        let file = write_config(&format!("{BASE}retrieval_conf: netvlad\nfeature_conf: sift\n"));
        let err = PipelineConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_malformed_yaml_fails_with_parse() {
        let file = write_config("image_dir: [unclosed\n");
        let err = PipelineConfig::from_yaml_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
