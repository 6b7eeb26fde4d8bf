//! Lens distortion models operating on the normalized image plane.
//!
//! A distortion model maps an ideal (undistorted) point on the normalized image
//! plane, i.e. `(X / Z, Y / Z)`, to the point where the real lens images it.
//! The [`Distortion`] trait captures the capability set every model provides:
//!
//! * forward distortion with an optional analytic 2x2 point Jacobian,
//! * the Jacobian of the distorted point with respect to the distortion
//!   coefficients, used by calibration back-ends,
//! * the inverse mapping (undistortion), which in general has no closed form
//!   and is solved by the bounded Gauss-Newton loop in [`undistort_iteratively`],
//! * a validity predicate for coefficient vectors.
//!
//! Concrete models live in the submodules. [`DistortionModel`] is the tagged
//! variant used by [`Camera`](crate::camera::Camera) so that new lens models can
//! be added without touching the camera or rig code.

use log::warn;
use nalgebra::{Matrix2, Matrix2xX, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub mod equidistant;
pub mod rad_tan;

pub use equidistant::EquidistantDistortion;
pub use rad_tan::RadTanDistortion;

/// Maximum number of Gauss-Newton iterations spent on a single undistortion.
pub const UNDISTORT_MAX_ITERATIONS: usize = 50;

/// Residual norm (normalized image plane units) below which undistortion has converged.
pub const UNDISTORT_TOLERANCE: f64 = 1e-13;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DistortionError {
    #[error("Expected {expected} distortion parameters, found {found}")]
    InvalidParameterCount { expected: usize, found: usize },
    #[error("Invalid distortion parameters: {0}")]
    InvalidParameters(String),
    #[error("Undistortion did not converge after {iterations} iterations (residual {residual:e})")]
    DidNotConverge { iterations: usize, residual: f64 },
    #[error("Unknown distortion model: {0}")]
    UnknownModel(String),
}

/// Capability set shared by all lens distortion models.
///
/// Methods with a `_using_coefficients` suffix ignore the stored parameters and
/// evaluate the model with the coefficients passed in, which is what an
/// optimizer needs while it perturbs the parameters.
pub trait Distortion {
    /// Number of coefficients of this model.
    fn parameter_count(&self) -> usize;

    /// The stored coefficients.
    fn parameters(&self) -> &[f64];

    /// Structural and numeric sanity check of a coefficient vector.
    fn parameters_valid(&self, coefficients: &[f64]) -> bool;

    /// Replaces the stored coefficients after validating them.
    fn set_parameters(&mut self, coefficients: &[f64]) -> Result<(), DistortionError>;

    /// Distorts `point` with the given coefficients.
    ///
    /// When `compute_jacobian` is `true` the second tuple element holds the
    /// analytic derivative of the distorted point with respect to `point`.
    fn distort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
        compute_jacobian: bool,
    ) -> Result<(Vector2<f64>, Option<Matrix2<f64>>), DistortionError>;

    /// Derivative of the distorted point with respect to the coefficients,
    /// evaluated at the undistorted `point`. The result is `2 x parameter_count()`.
    fn distort_parameter_jacobian(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Matrix2xX<f64>, DistortionError>;

    /// Recovers the undistorted point that distorts to `point`.
    fn undistort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Vector2<f64>, DistortionError> {
        undistort_iteratively(self, coefficients, point)
    }

    /// Distorts `point` with the stored coefficients.
    fn distort(
        &self,
        point: &Vector2<f64>,
        compute_jacobian: bool,
    ) -> Result<(Vector2<f64>, Option<Matrix2<f64>>), DistortionError> {
        self.distort_using_coefficients(self.parameters(), point, compute_jacobian)
    }

    /// Undistorts `point` with the stored coefficients.
    fn undistort(&self, point: &Vector2<f64>) -> Result<Vector2<f64>, DistortionError> {
        self.undistort_using_coefficients(self.parameters(), point)
    }
}

/// Inverts `model.distort_using_coefficients` with Gauss-Newton iterations.
///
/// The distorted point itself is the initial guess. Iteration stops as soon as
/// the residual `point - distort(estimate)` is below [`UNDISTORT_TOLERANCE`].
/// Reaching [`UNDISTORT_MAX_ITERATIONS`], hitting a singular Jacobian or
/// producing a non-finite estimate all yield [`DistortionError::DidNotConverge`].
pub fn undistort_iteratively<D: Distortion + ?Sized>(
    model: &D,
    coefficients: &[f64],
    point: &Vector2<f64>,
) -> Result<Vector2<f64>, DistortionError> {
    let target = *point;
    let mut estimate = target;
    let mut residual_norm = f64::INFINITY;
    let mut iterations = 0;

    while iterations < UNDISTORT_MAX_ITERATIONS {
        let (distorted, jacobian) =
            model.distort_using_coefficients(coefficients, &estimate, true)?;
        let jacobian = jacobian.ok_or_else(|| {
            DistortionError::InvalidParameters("model did not provide a point Jacobian".to_string())
        })?;

        let residual = target - distorted;
        residual_norm = residual.norm();
        if !residual_norm.is_finite() {
            break;
        }
        if residual_norm < UNDISTORT_TOLERANCE {
            return Ok(estimate);
        }

        // The system is square, so the Gauss-Newton step is J^-1 * r.
        let Some(inv_jacobian) = jacobian.try_inverse() else {
            break;
        };
        estimate += inv_jacobian * residual;
        iterations += 1;

        if !(estimate.x.is_finite() && estimate.y.is_finite()) {
            residual_norm = f64::INFINITY;
            break;
        }
    }

    warn!(
        "Undistortion of ({}, {}) did not converge after {} iterations, residual {:e}",
        point.x, point.y, iterations, residual_norm
    );
    Err(DistortionError::DidNotConverge {
        iterations,
        residual: residual_norm,
    })
}

/// Returns an error unless `coefficients` has exactly `expected` entries.
pub(crate) fn check_parameter_count(
    expected: usize,
    coefficients: &[f64],
) -> Result<(), DistortionError> {
    if coefficients.len() != expected {
        return Err(DistortionError::InvalidParameterCount {
            expected,
            found: coefficients.len(),
        });
    }
    Ok(())
}

/// The identity model, for cameras without lens distortion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NullDistortion;

impl Distortion for NullDistortion {
    fn parameter_count(&self) -> usize {
        0
    }

    fn parameters(&self) -> &[f64] {
        &[]
    }

    fn parameters_valid(&self, coefficients: &[f64]) -> bool {
        coefficients.is_empty()
    }

    fn set_parameters(&mut self, coefficients: &[f64]) -> Result<(), DistortionError> {
        check_parameter_count(0, coefficients)
    }

    fn distort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
        compute_jacobian: bool,
    ) -> Result<(Vector2<f64>, Option<Matrix2<f64>>), DistortionError> {
        check_parameter_count(0, coefficients)?;
        Ok((*point, compute_jacobian.then(Matrix2::identity)))
    }

    fn distort_parameter_jacobian(
        &self,
        coefficients: &[f64],
        _point: &Vector2<f64>,
    ) -> Result<Matrix2xX<f64>, DistortionError> {
        check_parameter_count(0, coefficients)?;
        Ok(Matrix2xX::zeros(0))
    }

    fn undistort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Vector2<f64>, DistortionError> {
        check_parameter_count(0, coefficients)?;
        Ok(*point)
    }
}

/// Names of the supported distortion models, as written in camera YAML files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistortionType {
    None,
    RadTan,
    Equidistant,
}

impl DistortionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DistortionType::None => "none",
            DistortionType::RadTan => "radtan",
            DistortionType::Equidistant => "equidistant",
        }
    }
}

impl fmt::Display for DistortionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistortionType {
    type Err = DistortionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(DistortionType::None),
            "radtan" | "rad_tan" | "plumb_bob" => Ok(DistortionType::RadTan),
            "equidistant" | "equi" => Ok(DistortionType::Equidistant),
            other => Err(DistortionError::UnknownModel(other.to_string())),
        }
    }
}

/// Tagged variant over the concrete distortion models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "parameters", rename_all = "snake_case")]
pub enum DistortionModel {
    None(NullDistortion),
    RadTan(RadTanDistortion),
    Equidistant(EquidistantDistortion),
}

impl Default for DistortionModel {
    fn default() -> Self {
        DistortionModel::None(NullDistortion)
    }
}

impl DistortionModel {
    /// Builds a model of the given type from its coefficients.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use camera_rig_tools::distortion::{Distortion, DistortionModel, DistortionType};
    ///
    /// let model = DistortionModel::from_type(DistortionType::RadTan, &[-0.28, 0.07, 2e-4, 2e-5])
    ///     .unwrap();
    /// assert_eq!(model.parameter_count(), 4);
    /// assert!(DistortionModel::from_type(DistortionType::RadTan, &[0.1]).is_err());
    /// ```
    pub fn from_type(
        distortion_type: DistortionType,
        coefficients: &[f64],
    ) -> Result<Self, DistortionError> {
        match distortion_type {
            DistortionType::None => {
                check_parameter_count(0, coefficients)?;
                Ok(DistortionModel::None(NullDistortion))
            }
            DistortionType::RadTan => Ok(DistortionModel::RadTan(RadTanDistortion::new(
                coefficients,
            )?)),
            DistortionType::Equidistant => Ok(DistortionModel::Equidistant(
                EquidistantDistortion::new(coefficients)?,
            )),
        }
    }

    pub fn distortion_type(&self) -> DistortionType {
        match self {
            DistortionModel::None(_) => DistortionType::None,
            DistortionModel::RadTan(_) => DistortionType::RadTan,
            DistortionModel::Equidistant(_) => DistortionType::Equidistant,
        }
    }

    fn inner(&self) -> &dyn Distortion {
        match self {
            DistortionModel::None(model) => model,
            DistortionModel::RadTan(model) => model,
            DistortionModel::Equidistant(model) => model,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn Distortion {
        match self {
            DistortionModel::None(model) => model,
            DistortionModel::RadTan(model) => model,
            DistortionModel::Equidistant(model) => model,
        }
    }
}

impl From<RadTanDistortion> for DistortionModel {
    fn from(model: RadTanDistortion) -> Self {
        DistortionModel::RadTan(model)
    }
}

impl From<EquidistantDistortion> for DistortionModel {
    fn from(model: EquidistantDistortion) -> Self {
        DistortionModel::Equidistant(model)
    }
}

impl From<NullDistortion> for DistortionModel {
    fn from(model: NullDistortion) -> Self {
        DistortionModel::None(model)
    }
}

impl Distortion for DistortionModel {
    fn parameter_count(&self) -> usize {
        self.inner().parameter_count()
    }

    fn parameters(&self) -> &[f64] {
        self.inner().parameters()
    }

    fn parameters_valid(&self, coefficients: &[f64]) -> bool {
        self.inner().parameters_valid(coefficients)
    }

    fn set_parameters(&mut self, coefficients: &[f64]) -> Result<(), DistortionError> {
        self.inner_mut().set_parameters(coefficients)
    }

    fn distort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
        compute_jacobian: bool,
    ) -> Result<(Vector2<f64>, Option<Matrix2<f64>>), DistortionError> {
        self.inner()
            .distort_using_coefficients(coefficients, point, compute_jacobian)
    }

    fn distort_parameter_jacobian(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Matrix2xX<f64>, DistortionError> {
        self.inner().distort_parameter_jacobian(coefficients, point)
    }

    fn undistort_using_coefficients(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Vector2<f64>, DistortionError> {
        self.inner().undistort_using_coefficients(coefficients, point)
    }
}

/// Finite-difference helpers shared by the model tests.
#[cfg(test)]
pub(crate) mod test_support {
    use super::Distortion;
    use nalgebra::{Matrix2, Matrix2xX, Vector2};

    const STEP: f64 = 1e-7;

    pub fn numeric_point_jacobian<D: Distortion>(model: &D, point: &Vector2<f64>) -> Matrix2<f64> {
        let mut jacobian = Matrix2::zeros();
        for axis in 0..2 {
            let mut plus = *point;
            let mut minus = *point;
            plus[axis] += STEP;
            minus[axis] -= STEP;
            let (p, _) = model.distort(&plus, false).unwrap();
            let (m, _) = model.distort(&minus, false).unwrap();
            jacobian.set_column(axis, &((p - m) / (2.0 * STEP)));
        }
        jacobian
    }

    pub fn numeric_parameter_jacobian<D: Distortion>(
        model: &D,
        point: &Vector2<f64>,
    ) -> Matrix2xX<f64> {
        let base = model.parameters().to_vec();
        let mut jacobian = Matrix2xX::zeros(base.len());
        for i in 0..base.len() {
            let mut plus = base.clone();
            let mut minus = base.clone();
            plus[i] += STEP;
            minus[i] -= STEP;
            let (p, _) = model.distort_using_coefficients(&plus, point, false).unwrap();
            let (m, _) = model.distort_using_coefficients(&minus, point, false).unwrap();
            jacobian.set_column(i, &((p - m) / (2.0 * STEP)));
        }
        jacobian
    }

    /// Normalized-plane points covering a square of half-width `extent`.
    pub fn grid(extent: f64, steps: usize) -> Vec<Vector2<f64>> {
        let mut points = Vec::with_capacity(steps * steps);
        for i in 0..steps {
            for j in 0..steps {
                let x = -extent + 2.0 * extent * i as f64 / (steps - 1) as f64;
                let y = -extent + 2.0 * extent * j as f64 / (steps - 1) as f64;
                points.push(Vector2::new(x, y));
            }
        }
        points
    }
}
