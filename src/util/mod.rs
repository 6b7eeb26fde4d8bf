//! Error statistics for checking a camera's projection functions against
//! each other.

use crate::camera::{Camera, CameraModelError};
use log::debug;
use nalgebra::{Matrix2xX, Matrix3xX};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(thiserror::Error, Debug)]
pub enum UtilError {
    #[error("Zero projection points")]
    ZeroProjectionPoints,
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    Camera(#[from] CameraModelError),
}

/// Summary of a set of pixel errors.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectionError {
    pub rmse: f64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub stddev: f64,
    pub median: f64,
    /// Points that contributed to the statistics.
    pub num_points: usize,
    /// Points dropped because unprojection or projection failed.
    pub num_failed: usize,
}

impl fmt::Debug for ProjectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Projection Error [ rmse: {}, min: {}, max: {}, mean: {}, stddev: {}, median: {}, points: {}, failed: {} ]",
            self.rmse,
            self.min,
            self.max,
            self.mean,
            self.stddev,
            self.median,
            self.num_points,
            self.num_failed
        )
    }
}

impl ProjectionError {
    /// Builds the statistics from individual errors.
    pub fn from_errors(errors: &[f64], num_failed: usize) -> Result<Self, UtilError> {
        if errors.is_empty() {
            return Err(UtilError::ZeroProjectionPoints);
        }

        let n = errors.len() as f64;
        let mean = errors.iter().sum::<f64>() / n;
        let variance = errors.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n;
        let rmse = (errors.iter().map(|x| x.powi(2)).sum::<f64>() / n).sqrt();
        let min = errors.iter().fold(f64::INFINITY, |a, &b| a.min(b));
        let max = errors.iter().fold(f64::NEG_INFINITY, |a, &b| a.max(b));

        let mut sorted = errors.to_vec();
        sorted.sort_by(f64::total_cmp);
        let mid = sorted.len() / 2;
        let median = if sorted.len() % 2 == 0 {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        } else {
            sorted[mid]
        };

        Ok(ProjectionError {
            rmse,
            min,
            max,
            mean,
            stddev: variance.sqrt(),
            median,
            num_points: errors.len(),
            num_failed,
        })
    }
}

/// Unprojects every pixel in `points_2d`, projects the ray back and measures
/// how far it lands from where it started.
///
/// Pixels that fail to unproject, or whose ray does not project back into
/// the image, are counted in [`ProjectionError::num_failed`].
pub fn compute_round_trip_error(
    camera: &Camera,
    points_2d: &Matrix2xX<f64>,
) -> Result<ProjectionError, UtilError> {
    let mut errors = Vec::with_capacity(points_2d.ncols());
    let mut num_failed = 0;

    for pixel in points_2d.column_iter() {
        let pixel = pixel.into_owned();
        let Ok(ray) = camera.unproject(&pixel) else {
            num_failed += 1;
            continue;
        };
        let (reprojected, result) = camera.project(&ray);
        if result.is_keypoint_visible() {
            errors.push((reprojected - pixel).norm());
        } else {
            num_failed += 1;
        }
    }

    debug!(
        "Camera {}: {} round trips, {} failed",
        camera.id(),
        errors.len(),
        num_failed
    );
    ProjectionError::from_errors(&errors, num_failed)
}

/// Projects `points_3d` and compares against the matching columns of `points_2d`.
pub fn compute_reprojection_error(
    camera: &Camera,
    points_3d: &Matrix3xX<f64>,
    points_2d: &Matrix2xX<f64>,
) -> Result<ProjectionError, UtilError> {
    if points_3d.ncols() != points_2d.ncols() {
        return Err(UtilError::InvalidParams(format!(
            "Got {} 3D points but {} 2D points",
            points_3d.ncols(),
            points_2d.ncols()
        )));
    }

    let mut errors = Vec::with_capacity(points_3d.ncols());
    let mut num_failed = 0;
    for (point_3d, point_2d) in points_3d.column_iter().zip(points_2d.column_iter()) {
        let (projected, result) = camera.project(&point_3d.into_owned());
        if result.is_keypoint_visible() {
            errors.push((projected - point_2d).norm());
        } else {
            num_failed += 1;
        }
    }
    ProjectionError::from_errors(&errors, num_failed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::sample_points;
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn euroc_camera() -> Camera {
        Camera::load_from_yaml("samples/rad_tan.yaml").unwrap()
    }

    #[test]
    fn test_statistics() {
        let stats = ProjectionError::from_errors(&[1.0, 3.0, 2.0, 4.0], 2).unwrap();
        assert_relative_eq!(stats.mean, 2.5);
        assert_relative_eq!(stats.median, 2.5);
        assert_relative_eq!(stats.min, 1.0);
        assert_relative_eq!(stats.max, 4.0);
        assert_relative_eq!(stats.rmse, 7.5_f64.sqrt());
        assert_relative_eq!(stats.stddev, 1.25_f64.sqrt());
        assert_eq!(stats.num_points, 4);
        assert_eq!(stats.num_failed, 2);

        assert!(matches!(
            ProjectionError::from_errors(&[], 3),
            Err(UtilError::ZeroProjectionPoints)
        ));
    }

    #[test]
    fn test_round_trip_error_is_small() {
        let camera = euroc_camera();
        let pixels = sample_points(camera.resolution(), 200);

        let stats = compute_round_trip_error(&camera, &pixels).unwrap();
        assert!(stats.num_points > 0);
        assert_eq!(stats.num_points + stats.num_failed, pixels.ncols());
        assert!(stats.max < 1e-6, "{:?}", stats);
    }

    #[test]
    fn test_reprojection_error() {
        let camera = euroc_camera();
        let points_3d = Matrix3xX::from_columns(&[
            Vector3::new(0.0, 0.0, 1.0),
            Vector3::new(0.1, -0.05, 1.0),
            Vector3::new(0.0, 0.0, -1.0),
        ]);
        let mut points_2d = Matrix2xX::zeros(3);
        for i in 0..3 {
            let (pixel, _) = camera.project(&points_3d.column(i).into_owned());
            points_2d.set_column(i, &pixel);
        }
        points_2d[(0, 1)] += 3.0;

        let stats = compute_reprojection_error(&camera, &points_3d, &points_2d).unwrap();
        assert_eq!(stats.num_points, 2);
        assert_eq!(stats.num_failed, 1);
        assert_relative_eq!(stats.max, 3.0, epsilon = 1e-9);
        assert_relative_eq!(stats.min, 0.0, epsilon = 1e-9);

        assert!(matches!(
            compute_reprojection_error(&camera, &points_3d, &Matrix2xX::zeros(2)),
            Err(UtilError::InvalidParams(_))
        ));
    }
}
