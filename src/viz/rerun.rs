//! Rerun-based visualization for the reconstructed scene.
//!
//! Entity hierarchy:
//!     status                  - One-line reconstruction summary
//!     world/
//!         points              - Sparse 3D point cloud (per-point RGB)
//!         cameras/<image id>  - Registered camera pose
//!         cameras/<image id>/frustum - Pinhole frustum for that pose

use anyhow::{Context, Result};
use rerun::{RecordingStream, external::glam};

use crate::sfm::Reconstruction;
use crate::sfm::model::ImagePose;

/// Radius used for every logged 3D point.
const POINT_RADIUS: f32 = 0.01;

pub struct RerunVisualizer {
    rec: RecordingStream,
}

impl RerunVisualizer {
    /// Spawn a Rerun viewer in a separate process and connect to it.
    pub fn spawn(app_name: &str) -> Result<Self> {
        let rec = rerun::RecordingStreamBuilder::new(app_name)
            .spawn()
            .context("failed to spawn rerun viewer")?;

        // Reconstructions come out of the toolkit in a right-handed,
        // camera-style frame (X right, Y down, Z forward).
        rec.log_static("world", &rerun::ViewCoordinates::RDF()).ok();

        Ok(Self { rec })
    }

    /// Stream the whole reconstruction: point cloud, then one frustum per
    /// registered image. Side-effect only; a viewer that went away must not
    /// fail a completed pipeline run, so log errors are dropped.
    pub fn log_reconstruction(&self, model: &Reconstruction) {
        let status = format!(
            "Registered images: {} | 3D points: {}",
            model.num_registered_images(),
            model.num_points()
        );
        self.rec
            .log("status", &rerun::TextDocument::new(status))
            .ok();

        self.log_points(model);
        for image in &model.images {
            self.log_camera(model, image);
        }
    }

    fn log_points(&self, model: &Reconstruction) {
        if model.points.is_empty() {
            return;
        }
        let positions: Vec<[f32; 3]> = model
            .points
            .iter()
            .map(|p| {
                [
                    p.position.x as f32,
                    p.position.y as f32,
                    p.position.z as f32,
                ]
            })
            .collect();
        let colors: Vec<[u8; 3]> = model.points.iter().map(|p| p.color).collect();

        self.rec
            .log(
                "world/points",
                &rerun::Points3D::new(positions)
                    .with_colors(colors)
                    .with_radii([POINT_RADIUS]),
            )
            .ok();
    }

    fn log_camera(&self, model: &Reconstruction, image: &ImagePose) {
        let (rotation, center) = image.world_from_camera();
        let translation = glam::Vec3::new(center.x as f32, center.y as f32, center.z as f32);
        let q = rotation.quaternion();
        let rotation = glam::Quat::from_xyzw(
            q.coords.x as f32,
            q.coords.y as f32,
            q.coords.z as f32,
            q.coords.w as f32,
        );

        let path = format!("world/cameras/{}", image.id);
        self.rec
            .log(
                path.as_str(),
                &rerun::Transform3D::from_translation_rotation(translation, rotation),
            )
            .ok();

        // The frustum needs intrinsics; an image referring to an unknown
        // camera is simply logged without one.
        if let Some(camera) = model.camera(image.camera_id) {
            let (fx, fy) = camera.focal();
            let frustum_path = format!("world/cameras/{}/frustum", image.id);
            self.rec
                .log(
                    frustum_path.as_str(),
                    &rerun::Pinhole::from_focal_length_and_resolution(
                        [fx as f32, fy as f32],
                        [camera.width as f32, camera.height as f32],
                    ),
                )
                .ok();
        }
    }
}
