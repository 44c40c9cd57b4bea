//! Spatial primitives exchanged between the pipeline and the motion drivers.
//!
//! Everything is expressed in millimetres in the world frame unless a type says
//! otherwise. Points are plain [`nalgebra::Point3<f64>`] values.

use nalgebra::{Isometry3, Point3};
use serde::{Deserialize, Serialize};

/// An orientation vector: the direction the tool points plus a rotation about it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrientationVector {
    pub ox: f64,
    pub oy: f64,
    pub oz: f64,
    /// Rotation about the pointing axis, in degrees.
    pub theta: f64,
}

impl OrientationVector {
    /// Tool pointing straight down with the given rotation.
    pub fn downward(theta: f64) -> Self {
        Self {
            ox: 0.0,
            oy: 0.0,
            oz: -1.0,
            theta,
        }
    }
}

impl Default for OrientationVector {
    fn default() -> Self {
        Self::downward(0.0)
    }
}

/// A position plus orientation used for every motion request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point3<f64>,
    pub orientation: OrientationVector,
}

impl Pose {
    pub fn new(position: Point3<f64>, orientation: OrientationVector) -> Self {
        Self {
            position,
            orientation,
        }
    }
}

/// Pinhole camera model plus the camera's placement in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraGeometry {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    /// Maps camera-frame points (z = depth away from the lens) into the world frame.
    pub camera_to_world: Isometry3<f64>,
}

impl CameraGeometry {
    /// Projects a camera-frame point to pixel coordinates.
    ///
    /// Points at or behind the image plane have no projection.
    pub fn project(&self, p: &Point3<f64>) -> Option<(f64, f64)> {
        if p.z <= 0.0 {
            return None;
        }
        Some((self.fx * p.x / p.z + self.cx, self.fy * p.y / p.z + self.cy))
    }

    pub fn to_world(&self, p: &Point3<f64>) -> Point3<f64> {
        self.camera_to_world * p
    }
}

/// Centroid of a set of points, `None` when the set is empty.
pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(nalgebra::Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f64))
}

/// The point with the greatest world z.
pub fn highest(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    points.iter().copied().max_by(|a, b| a.z.total_cmp(&b.z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn project_skips_points_behind_camera() {
        let cam = CameraGeometry {
            fx: 100.0,
            fy: 100.0,
            cx: 50.0,
            cy: 40.0,
            camera_to_world: Isometry3::identity(),
        };
        assert_eq!(cam.project(&Point3::new(1.0, 1.0, 0.0)), None);
        assert_eq!(cam.project(&Point3::new(10.0, -20.0, 100.0)), Some((60.0, 20.0)));
    }

    #[test]
    fn centroid_and_highest() {
        let pts = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 4.0, 10.0),
            Point3::new(4.0, 2.0, 5.0),
        ];
        assert_eq!(centroid(&pts), Some(Point3::new(2.0, 2.0, 5.0)));
        assert_eq!(highest(&pts), Some(Point3::new(2.0, 4.0, 10.0)));
        assert_eq!(centroid(&[]), None);
    }
}
