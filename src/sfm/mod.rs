//! Boundary to the external SfM toolkit.
//!
//! Everything computationally hard (feature detection, descriptor matching,
//! geometric verification, bundle adjustment) lives behind [`SfmBackend`].
//! The pipeline only sequences these calls and threads artifact paths
//! between them. [`ColmapBackend`] is the real implementation, driving the
//! COLMAP executable; tests substitute their own.

pub mod colmap;
pub mod model;
pub mod pairs;

use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::config::StageConfig;

pub use colmap::ColmapBackend;
pub use model::Reconstruction;

/// The stage capabilities the external toolkit must provide.
pub trait SfmBackend {
    /// Extract descriptors for every image in `image_dir`, storing the
    /// artifact under `output_dir`. Returns the artifact path.
    fn extract_features(
        &self,
        conf: &StageConfig,
        image_dir: &Path,
        output_dir: &Path,
    ) -> Result<PathBuf>;

    /// Match features across the pairs listed in `pairs_path`, referring to
    /// the extraction artifact by its `feature_key`. Returns the match
    /// artifact path.
    fn match_features(
        &self,
        conf: &StageConfig,
        pairs_path: &Path,
        feature_key: &str,
        output_dir: &Path,
    ) -> Result<PathBuf>;

    /// Run incremental reconstruction and return the model in memory.
    #[allow(clippy::too_many_arguments)]
    fn reconstruct(
        &self,
        sfm_dir: &Path,
        image_dir: &Path,
        pairs_path: &Path,
        features_path: &Path,
        matches_path: &Path,
        image_list: &[String],
    ) -> Result<Reconstruction>;
}
