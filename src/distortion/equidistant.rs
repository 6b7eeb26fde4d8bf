//! Equidistant (Kannala-Brandt) distortion on the normalized image plane.
//!
//! A normalized point at radius `r` corresponds to the incidence angle
//! `θ = atan(r)`. The model replaces the radius by the polynomial
//!
//! ```text
//! θd = θ (1 + k1 θ² + k2 θ⁴ + k3 θ⁶ + k4 θ⁸)
//! ```
//!
//! so the distorted point is `(x, y) * θd / r`.

use crate::distortion::{check_parameter_count, Distortion, DistortionError};
use nalgebra::{Matrix2, Matrix2xX, Vector2};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Below this squared radius the model is treated as the identity.
const CENTER_RADIUS_SQUARED: f64 = f64::EPSILON;

/// Equidistant fisheye distortion with coefficients `[k1, k2, k3, k4]`.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<f64>", into = "Vec<f64>")]
pub struct EquidistantDistortion {
    parameters: [f64; 4],
}

impl EquidistantDistortion {
    pub const NUM_PARAMETERS: usize = 4;

    /// Largest accepted magnitude of any single coefficient.
    pub const MAX_COEFFICIENT_MAGNITUDE: f64 = 10.0;

    pub fn new(parameters: &[f64]) -> Result<Self, DistortionError> {
        let mut model = EquidistantDistortion {
            parameters: [0.0; 4],
        };
        model.set_parameters(parameters)?;
        Ok(model)
    }
}

impl fmt::Debug for EquidistantDistortion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EquidistantDistortion [k1: {} k2: {} k3: {} k4: {}]",
            self.parameters[0], self.parameters[1], self.parameters[2], self.parameters[3],
        )
    }
}

impl TryFrom<Vec<f64>> for EquidistantDistortion {
    type Error = DistortionError;

    fn try_from(parameters: Vec<f64>) -> Result<Self, Self::Error> {
        EquidistantDistortion::new(&parameters)
    }
}

impl From<EquidistantDistortion> for Vec<f64> {
    fn from(model: EquidistantDistortion) -> Self {
        model.parameters.to_vec()
    }
}

impl Distortion for EquidistantDistortion {
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
                "Equidistant coefficients must be finite with magnitude <= {}, got {:?}",
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

        let x = point.x;
        let y = point.y;
        let r2 = x * x + y * y;

        if r2 < CENTER_RADIUS_SQUARED {
            return Ok((*point, compute_jacobian.then(Matrix2::identity)));
        }

        let (k1, k2, k3, k4) = (
            coefficients[0],
            coefficients[1],
            coefficients[2],
            coefficients[3],
        );

        let r = r2.sqrt();
        let theta = r.atan();
        let theta2 = theta * theta;
        let theta_d = theta * (1.0 + theta2 * (k1 + theta2 * (k2 + theta2 * (k3 + theta2 * k4))));
        let scaling = theta_d / r;

        let distorted = point * scaling;

        if !compute_jacobian {
            return Ok((distorted, None));
        }

        let d_theta_d_d_theta =
            1.0 + theta2 * (3.0 * k1 + theta2 * (5.0 * k2 + theta2 * (7.0 * k3 + 9.0 * k4 * theta2)));
        let d_theta_d_d_r = d_theta_d_d_theta / (1.0 + r2);
        // d(scaling)/dr divided by r, multiplies the outer product of the point.
        let d_scaling = (d_theta_d_d_r * r - theta_d) / (r2 * r);

        let jacobian = Matrix2::new(
            scaling + d_scaling * x * x,
            d_scaling * x * y,
            d_scaling * x * y,
            scaling + d_scaling * y * y,
        );

        Ok((distorted, Some(jacobian)))
    }

    fn distort_parameter_jacobian(
        &self,
        coefficients: &[f64],
        point: &Vector2<f64>,
    ) -> Result<Matrix2xX<f64>, DistortionError> {
        check_parameter_count(Self::NUM_PARAMETERS, coefficients)?;

        let r2 = point.x * point.x + point.y * point.y;
        let mut jacobian = Matrix2xX::zeros(Self::NUM_PARAMETERS);
        if r2 < CENTER_RADIUS_SQUARED {
            return Ok(jacobian);
        }

        let r = r2.sqrt();
        let theta = r.atan();
        let theta2 = theta * theta;
        let direction = point / r;

        let mut theta_power = theta * theta2;
        for i in 0..Self::NUM_PARAMETERS {
            jacobian.set_column(i, &(direction * theta_power));
            theta_power *= theta2;
        }

        Ok(jacobian)
    }
}
