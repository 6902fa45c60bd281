//! In-memory reconstruction model.
//!
//! The toolkit persists sparse models in the COLMAP text format: three files
//! (`cameras.txt`, `images.txt`, `points3D.txt`) with `#`-prefixed comment
//! headers. This module reads that format into typed records and writes it
//! back out, which is all the pipeline needs for "persist to directory" and
//! visualization.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result, bail};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// Intrinsic calibration of one physical camera.
#[derive(Debug, Clone)]
pub struct Camera {
    pub id: u32,
    /// COLMAP camera model name (SIMPLE_PINHOLE, PINHOLE, SIMPLE_RADIAL, ...).
    pub model: String,
    pub width: u32,
    pub height: u32,
    pub params: Vec<f64>,
}

impl Camera {
    /// Focal lengths in pixels. Single-focal models report (f, f).
    pub fn focal(&self) -> (f64, f64) {
        match self.model.as_str() {
            "PINHOLE" | "OPENCV" | "OPENCV_FISHEYE" | "FULL_OPENCV" => {
                (self.params[0], self.params[1])
            }
            // SIMPLE_PINHOLE, SIMPLE_RADIAL, RADIAL, FOV, ... : f, cx, cy, [...]
            _ => (self.params[0], self.params[0]),
        }
    }
}

/// Pose and observations of one registered image.
///
/// Rotation and translation are stored as the toolkit writes them: the
/// world-to-camera transform.
#[derive(Debug, Clone)]
pub struct ImagePose {
    pub id: u32,
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
    pub camera_id: u32,
    pub name: String,
    /// 2D keypoints with the id of the 3D point they observe (-1 if none).
    pub points2d: Vec<(f64, f64, i64)>,
}

impl ImagePose {
    /// Camera center and orientation in world coordinates.
    pub fn world_from_camera(&self) -> (UnitQuaternion<f64>, Vector3<f64>) {
        let rotation = self.rotation.inverse();
        let center = -(rotation * self.translation);
        (rotation, center)
    }
}

/// One triangulated 3D point with its color and track.
#[derive(Debug, Clone)]
pub struct Point3D {
    pub id: u64,
    pub position: Vector3<f64>,
    pub color: [u8; 3],
    pub error: f64,
    /// (image id, 2D point index) observations backing this point.
    pub track: Vec<(u32, u32)>,
}

/// The result of incremental reconstruction: camera poses, 3D points, and
/// per-image observations.
#[derive(Debug, Clone, Default)]
pub struct Reconstruction {
    pub cameras: Vec<Camera>,
    pub images: Vec<ImagePose>,
    pub points: Vec<Point3D>,
}

impl Reconstruction {
    /// Read a COLMAP text model from `dir`.
    pub fn read_text_model(dir: &Path) -> Result<Self> {
        Ok(Self {
            cameras: read_cameras(&dir.join("cameras.txt"))?,
            images: read_images(&dir.join("images.txt"))?,
            points: read_points(&dir.join("points3D.txt"))?,
        })
    }

    /// Persist the model to `dir` in the COLMAP text format.
    pub fn write(&self, dir: &Path) -> Result<()> {
        write_cameras(&dir.join("cameras.txt"), &self.cameras)?;
        write_images(&dir.join("images.txt"), &self.images)?;
        write_points(&dir.join("points3D.txt"), &self.points)?;
        Ok(())
    }

    pub fn camera(&self, id: u32) -> Option<&Camera> {
        self.cameras.iter().find(|c| c.id == id)
    }

    pub fn num_registered_images(&self) -> usize {
        self.images.len()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }
}

fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

fn read_cameras(path: &Path) -> Result<Vec<Camera>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut cameras = Vec::new();
    for line in data_lines(&text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 5 {
            bail!("malformed camera record {line:?} in {}", path.display());
        }
        cameras.push(Camera {
            id: fields[0].parse()?,
            model: fields[1].to_string(),
            width: fields[2].parse()?,
            height: fields[3].parse()?,
            params: fields[4..]
                .iter()
                .map(|f| f.parse::<f64>())
                .collect::<Result<_, _>>()?,
        });
    }
    Ok(cameras)
}

fn read_images(path: &Path) -> Result<Vec<ImagePose>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    // Registered images come in line pairs: pose line, then the 2D points
    // line, which is empty for images without observations. Blank lines are
    // therefore only skipped while waiting for the next pose line.
    let mut images = Vec::new();
    let mut pending: Option<ImagePose> = None;

    for line in text.lines().map(str::trim).filter(|l| !l.starts_with('#')) {
        match pending.take() {
            None => {
                if line.is_empty() {
                    continue;
                }
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 10 {
                    bail!("malformed image record {line:?} in {}", path.display());
                }
                let rotation = UnitQuaternion::from_quaternion(Quaternion::new(
                    fields[1].parse()?,
                    fields[2].parse()?,
                    fields[3].parse()?,
                    fields[4].parse()?,
                ));
                let translation = Vector3::new(
                    fields[5].parse()?,
                    fields[6].parse()?,
                    fields[7].parse()?,
                );
                pending = Some(ImagePose {
                    id: fields[0].parse()?,
                    rotation,
                    translation,
                    camera_id: fields[8].parse()?,
                    name: fields[9..].join(" "),
                    points2d: Vec::new(),
                });
            }
            Some(mut image) => {
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() % 3 != 0 {
                    bail!(
                        "malformed 2D point record for image {} in {}",
                        image.id,
                        path.display()
                    );
                }
                for triple in fields.chunks(3) {
                    image
                        .points2d
                        .push((triple[0].parse()?, triple[1].parse()?, triple[2].parse()?));
                }
                images.push(image);
            }
        }
    }
    if let Some(image) = pending {
        images.push(image);
    }
    Ok(images)
}

fn read_points(path: &Path) -> Result<Vec<Point3D>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;

    let mut points = Vec::new();
    for line in data_lines(&text) {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 8 || fields.len() % 2 != 0 {
            bail!("malformed 3D point record {line:?} in {}", path.display());
        }
        let mut track = Vec::new();
        for pair in fields[8..].chunks(2) {
            track.push((pair[0].parse()?, pair[1].parse()?));
        }
        points.push(Point3D {
            id: fields[0].parse()?,
            position: Vector3::new(fields[1].parse()?, fields[2].parse()?, fields[3].parse()?),
            color: [fields[4].parse()?, fields[5].parse()?, fields[6].parse()?],
            error: fields[7].parse()?,
            track,
        });
    }
    Ok(points)
}

fn create_writer(path: &Path) -> Result<BufWriter<File>> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn write_cameras(path: &Path, cameras: &[Camera]) -> Result<()> {
    let mut w = create_writer(path)?;
    writeln!(w, "# Camera list with one line of data per camera:")?;
    writeln!(w, "#   CAMERA_ID, MODEL, WIDTH, HEIGHT, PARAMS[]")?;
    for cam in cameras {
        write!(w, "{} {} {} {}", cam.id, cam.model, cam.width, cam.height)?;
        for p in &cam.params {
            write!(w, " {p}")?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

fn write_images(path: &Path, images: &[ImagePose]) -> Result<()> {
    let mut w = create_writer(path)?;
    writeln!(w, "# Image list with two lines of data per image:")?;
    writeln!(w, "#   IMAGE_ID, QW, QX, QY, QZ, TX, TY, TZ, CAMERA_ID, NAME")?;
    writeln!(w, "#   POINTS2D[] as (X, Y, POINT3D_ID)")?;
    for img in images {
        let q = img.rotation.quaternion();
        writeln!(
            w,
            "{} {} {} {} {} {} {} {} {} {}",
            img.id,
            q.w,
            q.i,
            q.j,
            q.k,
            img.translation.x,
            img.translation.y,
            img.translation.z,
            img.camera_id,
            img.name
        )?;
        let mut first = true;
        for (x, y, point3d_id) in &img.points2d {
            if !first {
                write!(w, " ")?;
            }
            write!(w, "{x} {y} {point3d_id}")?;
            first = false;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}

fn write_points(path: &Path, points: &[Point3D]) -> Result<()> {
    let mut w = create_writer(path)?;
    writeln!(w, "# 3D point list with one line of data per point:")?;
    writeln!(
        w,
        "#   POINT3D_ID, X, Y, Z, R, G, B, ERROR, TRACK[] as (IMAGE_ID, POINT2D_IDX)"
    )?;
    for pt in points {
        write!(
            w,
            "{} {} {} {} {} {} {} {}",
            pt.id,
            pt.position.x,
            pt.position.y,
            pt.position.z,
            pt.color[0],
            pt.color[1],
            pt.color[2],
            pt.error
        )?;
        for (image_id, point2d_idx) in &pt.track {
            write!(w, " {image_id} {point2d_idx}")?;
        }
        writeln!(w)?;
    }
    w.flush()?;
    Ok(())
}
