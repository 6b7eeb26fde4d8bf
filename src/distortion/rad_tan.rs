//! Implements the Radial-Tangential (RadTan) distortion model.
//!
//! This is the four-coefficient variant of the Brown-Conrady model used by most
//! pinhole camera calibrations: two radial coefficients `k1`, `k2` and two
//! tangential coefficients `p1`, `p2`, stored in the order `[k1, k2, p1, p2]`.
//!
//! With `r² = x² + y²` the model reads
//!
//! ```text
//! x' = x (1 + k1 r² + k2 r⁴) + 2 p1 x y + p2 (r² + 2 x²)
//! y' = y (1 + k1 r² + k2 r⁴) + p1 (r² + 2 y²) + 2 p2 x y
//! ```
//!
//! The inverse has no closed form and is computed iteratively by
//! [`undistort_iteratively`](crate::distortion::undistort_iteratively).

use crate::distortion::{check_parameter_count, Distortion, DistortionError};
use nalgebra::{Matrix2, Matrix2xX, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Radial-tangential lens distortion with coefficients `[k1, k2, p1, p2]`.
///
/// # Examples
///
/// ```rust
/// use nalgebra::Vector2;
/// use camera_rig_tools::distortion::{Distortion, RadTanDistortion};
///
/// let distortion = RadTanDistortion::new(&[-0.28, 0.07, 0.0002, 0.00002]).unwrap();
/// let point = Vector2::new(0.2, -0.1);
///
/// let (distorted, _) = distortion.distort(&point, false).unwrap();
/// let recovered = distortion.undistort(&distorted).unwrap();
/// assert!((recovered - point).norm() < 1e-10);
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct RadTanDistortion {
    parameters: [f64; 4],
}

impl RadTanDistortion {
    /// Number of coefficients of this model.
    pub const NUM_PARAMETERS: usize = 4;

    /// Largest accepted magnitude of any single coefficient.
    pub const MAX_COEFFICIENT_MAGNITUDE: f64 = 10.0;

    /// Creates the model from `[k1, k2, p1, p2]`.
    ///
    /// # Errors
    ///
    /// * [`DistortionError::InvalidParameterCount`] if `parameters` does not hold 4 values.
    /// * [`DistortionError::InvalidParameters`] if a value is not finite or exceeds
    ///   [`Self::MAX_COEFFICIENT_MAGNITUDE`].
    pub fn new(parameters: &[f64]) -> Result<Self, DistortionError> {
        let mut model = RadTanDistortion {
            parameters: [0.0; 4],
        };
        model.set_parameters(parameters)?;
        Ok(model)
    }

    pub fn k1(&self) -> f64 {
        self.parameters[0]
    }

    pub fn k2(&self) -> f64 {
        self.parameters[1]
    }

    pub fn p1(&self) -> f64 {
        self.parameters[2]
    }

    pub fn p2(&self) -> f64 {
        self.parameters[3]
    }
}

impl fmt::Debug for RadTanDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RadTanDistortion [k1: {} k2: {} p1: {} p2: {}]",
            self.parameters[0], self.parameters[1], self.parameters[2], self.parameters[3],
        )
    }
}

impl TryFrom<Vec<f64>> for RadTanDistortion {
    type Error = DistortionError;

    fn try_from(parameters: Vec<f64>) -> Result<Self, Self::Error> {
        RadTanDistortion::new(&parameters)
    }
}

impl From<RadTanDistortion> for Vec<f64> {
    fn from(model: RadTanDistortion) -> Self {
        model.parameters.to_vec()
    }
}

impl Distortion for RadTanDistortion {
    fn parameter_count(&self) -> usize {
        Self::NUM_PARAMETERS
    }

    fn parameters(&self) -> &[f64] {
        &self.parameters
    }

    fn parameters_valid(&self, coefficients: &[f64]) -> bool {
        coefficients.len() == Self::NUM_PARAMETERS
            && coefficients
                .iter()
                .all(|c| c.is_finite() && c.abs() <= Self::MAX_COEFFICIENT_MAGNITUDE)
    }

    fn set_parameters(&mut self, coefficients: &[f64]) -> Result<(), DistortionError> {
        check_parameter_count(Self::NUM_PARAMETERS, coefficients)?;
        if !self.parameters_valid(coefficients) {
            return Err(DistortionError::InvalidParameters(format!(
                "RadTan coefficients must be finite with magnitude <= {}, got {:?}",
                Self::MAX_COEFFICIENT_MAGNITUDE,
                coefficients
            )));
        }
        self.parameters.copy_from_slice(coefficients);
        Ok(())
    }

    fn distort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
        compute_jacobian: bool,
    ) -> Result<(Vector2<f64>, Option<Matrix2<f64>>), DistortionError> {
        check_parameter_count(Self::NUM_PARAMETERS, coefficients)?;

        let k1 = coefficients[0];
        let k2 = coefficients[1];
        let p1 = coefficients[2];
        let p2 = coefficients[3];

        let x = point.x;
        let y = point.y;
        let xx = x * x;
        let yy = y * y;
        let xy = x * y;
        let r2 = xx + yy;

        let radial = 1.0 + r2 * (k1 + k2 * r2);

        let distorted = Vector2::new(
            x * radial + 2.0 * p1 * xy + p2 * (r2 + 2.0 * xx),
            y * radial + p1 * (r2 + 2.0 * yy) + 2.0 * p2 * xy,
        );

        if !compute_jacobian {
            return Ok((distorted, None));
        }

        // d(radial)/dx = 2 x (k1 + 2 k2 r²), likewise for y.
        let d_radial = 2.0 * (k1 + 2.0 * k2 * r2);

        let dxd_dx = radial + xx * d_radial + 2.0 * p1 * y + 6.0 * p2 * x;
        let dxd_dy = xy * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
        let dyd_dx = xy * d_radial + 2.0 * p1 * x + 2.0 * p2 * y;
        let dyd_dy = radial + yy * d_radial + 6.0 * p1 * y + 2.0 * p2 * x;

        let jacobian = Matrix2::new(dxd_dx, dxd_dy, dyd_dx, dyd_dy);

        Ok((distorted, Some(jacobian)))
    }

    fn distort_parameter_jacobian(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Matrix2xX<f64>, DistortionError> {
        check_parameter_count(Self::NUM_PARAMETERS, coefficients)?;

        let x = point.x;
        let y = point.y;
        let xy = x * y;
        let r2 = x * x + y * y;
        let r4 = r2 * r2;

        #[rustfmt::skip]
        let jacobian = Matrix2xX::from_row_slice(&[
            x * r2, x * r4, 2.0 * xy,          r2 + 2.0 * x * x,
            y * r2, y * r4, r2 + 2.0 * y * y,  2.0 * xy,
        ]);

        Ok(jacobian)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distortion::test_support::{grid, numeric_parameter_jacobian, numeric_point_jacobian};
    use approx::assert_abs_diff_eq;

    fn euroc_distortion() -> RadTanDistortion {
        RadTanDistortion::new(&[-0.28340811, 0.07395907, 0.00019359, 1.76187114e-05]).unwrap()
    }

    #[test]
    fn test_new_rejects_wrong_length() {
        assert!(matches!(
            RadTanDistortion::new(&[0.1, 0.2, 0.3]),
            Err(DistortionError::InvalidParameterCount { expected: 4, found: 3 })
        ));
        assert!(RadTanDistortion::new(&[0.0; 5]).is_err());
    }

    #[test]
    fn test_parameters_valid() {
        let model = euroc_distortion();
        assert!(model.parameters_valid(&[0.1, 0.0, 0.0, 0.0]));
        assert!(!model.parameters_valid(&[0.1, 0.0, 0.0]));
        assert!(!model.parameters_valid(&[f64::INFINITY, 0.0, 0.0, 0.0]));
        assert!(!model.parameters_valid(&[0.0, 0.0, 11.0, 0.0]));
        assert!(RadTanDistortion::new(&[0.0, f64::NAN, 0.0, 0.0]).is_err());
    }

    #[test]
    fn test_optical_center_is_fixed_point() {
        let center = Vector2::zeros();
        for coefficients in [[-0.3, 0.1, 0.001, -0.002], [5.0, -5.0, 1.0, 1.0]] {
            let model = RadTanDistortion::new(&coefficients).unwrap();
            let (distorted, _) = model.distort(&center, false).unwrap();
            assert_eq!(distorted, center);
        }
    }

    #[test]
    fn test_distort_matches_closed_form() {
        let model = RadTanDistortion::new(&[0.1, 0.01, 0.002, 0.003]).unwrap();
        let (distorted, _) = model.distort(&Vector2::new(0.5, 0.0), false).unwrap();
        // r² = 0.25: x' = 0.5 (1 + 0.025 + 0.000625) + 0.003 * 0.75, y' = 0.002 * 0.25
        assert_abs_diff_eq!(distorted.x, 0.5128125 + 0.00225, epsilon = 1e-15);
        assert_abs_diff_eq!(distorted.y, 0.0005, epsilon = 1e-15);
    }

    #[test]
    fn test_round_trip_undistort_distort() {
        let model = euroc_distortion();
        for point in grid(0.6, 13) {
            let (distorted, _) = model.distort(&point, false).unwrap();
            let recovered = model.undistort(&distorted).unwrap();
            assert_abs_diff_eq!(recovered, point, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_round_trip_distort_undistort() {
        let model = euroc_distortion();
        for point in grid(0.5, 11) {
            let undistorted = model.undistort(&point).unwrap();
            let (redistorted, _) = model.distort(&undistorted, false).unwrap();
            assert_abs_diff_eq!(redistorted, point, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_point_jacobian_matches_finite_differences() {
        let model = RadTanDistortion::new(&[-0.3, 0.12, 0.004, -0.003]).unwrap();
        for point in grid(0.8, 9) {
            let (_, jacobian) = model.distort(&point, true).unwrap();
            let numeric = numeric_point_jacobian(&model, &point);
            assert_abs_diff_eq!(jacobian.unwrap(), numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_parameter_jacobian_matches_finite_differences() {
        let model = RadTanDistortion::new(&[-0.3, 0.12, 0.004, -0.003]).unwrap();
        for point in grid(0.8, 9) {
            let jacobian = model
                .distort_parameter_jacobian(model.parameters(), &point)
                .unwrap();
            assert_eq!(jacobian.ncols(), 4);
            let numeric = numeric_parameter_jacobian(&model, &point);
            assert_abs_diff_eq!(jacobian, numeric, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_undistort_reports_non_convergence() {
        let _ = env_logger::builder().is_test(true).try_init();

        // With only p1 = 1 the distorted y is y + x² + 3y² >= -1/12, so a target
        // at y = -1 has no preimage.
        let model = RadTanDistortion::new(&[0.0, 0.0, 1.0, 0.0]).unwrap();
        let result = model.undistort(&Vector2::new(0.0, -1.0));
        assert!(matches!(
            result,
            Err(DistortionError::DidNotConverge { .. })
        ));
    }

    #[test]
    fn test_external_coefficients_are_checked() {
        let model = euroc_distortion();
        let point = Vector2::new(0.1, 0.1);
        assert!(model.distort_using_coefficients(&[0.1], &point, false).is_err());
        assert!(model.distort_parameter_jacobian(&[0.1; 6], &point).is_err());
        assert!(model.undistort_using_coefficients(&[], &point).is_err());
    }
}
