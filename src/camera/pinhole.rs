//! Implements the pinhole camera with a pluggable lens distortion model.
//!
//! A [`Camera`] maps a 3D point `(X, Y, Z)` in its own frame to pixels by
//! normalizing `(X / Z, Y / Z)`, applying the lens distortion on the normalized
//! image plane and finally the pinhole intrinsics:
//!
//! ```text
//! u = fx * x_distorted + cx
//! v = fy * y_distorted + cy
//! ```
//!
//! Cameras are meant to be shared: rigs and frames hold them through
//! `Arc<Camera>`. The identity of a camera is fixed at construction.

use crate::camera::{validation, CameraModelError, Intrinsics, ProjectionResult, Resolution};
use crate::distortion::{Distortion, DistortionModel, DistortionType};
use crate::id::CameraId;
use log::debug;
use nalgebra::{Matrix2, Matrix2x3, Vector2, Vector3};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use yaml_rust::{Yaml, YamlLoader};

/// A calibrated camera: identity, pinhole intrinsics, resolution and lens distortion.
///
/// # Examples
///
/// ```rust
/// use nalgebra::Vector3;
/// use camera_rig_tools::camera::{Camera, Intrinsics, Resolution};
/// use camera_rig_tools::distortion::{DistortionModel, RadTanDistortion};
/// use camera_rig_tools::id::CameraId;
///
/// let camera = Camera::new(
///     CameraId::random(),
///     Intrinsics { fx: 460.0, fy: 460.0, cx: 376.0, cy: 240.0 },
///     Resolution { width: 752, height: 480 },
///     DistortionModel::from(RadTanDistortion::new(&[-0.28, 0.07, 0.0002, 0.00002]).unwrap()),
/// )
/// .unwrap();
///
/// let (pixel, result) = camera.project(&Vector3::new(0.1, -0.2, 2.0));
/// assert!(result.is_keypoint_visible());
///
/// let ray = camera.unproject(&pixel).unwrap();
/// assert!((ray - Vector3::new(0.1, -0.2, 2.0).normalize()).norm() < 1e-9);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    id: CameraId,
    intrinsics: Intrinsics,
    resolution: Resolution,
    distortion: DistortionModel,
}

impl Camera {
    /// Creates a camera after validating every parameter.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::FocalLengthMustBePositive`] / [`CameraModelError::PrincipalPointMustBeFinite`]
    ///   for bad intrinsics.
    /// * [`CameraModelError::InvalidParams`] for a zero resolution.
    /// * [`CameraModelError::Distortion`] if the distortion coefficients fail their validity check.
    pub fn new(
        id: CameraId,
        intrinsics: Intrinsics,
        resolution: Resolution,
        distortion: DistortionModel,
    ) -> Result<Self, CameraModelError> {
        let camera = Camera {
            id,
            intrinsics,
            resolution,
            distortion,
        };
        camera.validate_params()?;
        Ok(camera)
    }

    pub fn id(&self) -> CameraId {
        self.id
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    pub fn set_intrinsics(&mut self, intrinsics: Intrinsics) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&intrinsics)?;
        self.intrinsics = intrinsics;
        Ok(())
    }

    pub fn resolution(&self) -> &Resolution {
        &self.resolution
    }

    pub fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CameraModelError> {
        validation::validate_resolution(&resolution)?;
        self.resolution = resolution;
        Ok(())
    }

    pub fn distortion(&self) -> &DistortionModel {
        &self.distortion
    }

    /// Mutable access to the distortion; coefficient updates go through
    /// [`Distortion::set_parameters`] and are validated there.
    pub fn distortion_mut(&mut self) -> &mut DistortionModel {
        &mut self.distortion
    }

    pub fn set_distortion(&mut self, distortion: DistortionModel) -> Result<(), CameraModelError> {
        validate_distortion(&distortion)?;
        self.distortion = distortion;
        Ok(())
    }

    pub fn validate_params(&self) -> Result<(), CameraModelError> {
        validation::validate_intrinsics(&self.intrinsics)?;
        validation::validate_resolution(&self.resolution)?;
        validate_distortion(&self.distortion)
    }

    /// `true` if `pixel` lies inside the image box `[0, width) x [0, height)`.
    pub fn is_keypoint_visible(&self, pixel: &Vector2<f64>) -> bool {
        pixel.x >= 0.0
            && pixel.x < self.resolution.width as f64
            && pixel.y >= 0.0
            && pixel.y < self.resolution.height as f64
    }

    /// Projects a 3D point in the camera frame to pixel coordinates.
    ///
    /// The pixel is returned together with a [`ProjectionResult`]; only
    /// [`ProjectionResult::KeypointVisible`] marks a usable observation. For
    /// [`ProjectionResult::ProjectionInvalid`] the returned pixel is zero and
    /// carries no meaning.
    pub fn project(&self, point_3d: &Vector3<f64>) -> (Vector2<f64>, ProjectionResult) {
        let (pixel, _, result) = self.project_impl(point_3d, false);
        (pixel, result)
    }

    /// Like [`Camera::project`], additionally returning the 2x3 Jacobian of the
    /// pixel with respect to the 3D point.
    pub fn project_with_jacobian(
        &self,
        point_3d: &Vector3<f64>,
    ) -> (Vector2<f64>, Matrix2x3<f64>, ProjectionResult) {
        let (pixel, jacobian, result) = self.project_impl(point_3d, true);
        (pixel, jacobian.unwrap_or_else(Matrix2x3::zeros), result)
    }

    fn project_impl(
        &self,
        point_3d: &Vector3<f64>,
        compute_jacobian: bool,
    ) -> (Vector2<f64>, Option<Matrix2x3<f64>>, ProjectionResult) {
        let z = point_3d.z;
        if z.abs() < f64::EPSILON.sqrt() {
            return (Vector2::zeros(), None, ProjectionResult::ProjectionInvalid);
        }

        let inv_z = 1.0 / z;
        let normalized = Vector2::new(point_3d.x * inv_z, point_3d.y * inv_z);

        let (distorted, distortion_jacobian) =
            match self.distortion.distort(&normalized, compute_jacobian) {
                Ok(result) => result,
                Err(e) => {
                    debug!("Camera {} failed to distort {:?}: {}", self.id, normalized, e);
                    return (Vector2::zeros(), None, ProjectionResult::ProjectionInvalid);
                }
            };

        let pixel = Vector2::new(
            self.intrinsics.fx * distorted.x + self.intrinsics.cx,
            self.intrinsics.fy * distorted.y + self.intrinsics.cy,
        );

        let jacobian = distortion_jacobian.map(|d_distorted_d_normalized| {
            let d_pixel_d_distorted = Matrix2::new(self.intrinsics.fx, 0.0, 0.0, self.intrinsics.fy);
            let d_normalized_d_point = Matrix2x3::new(
                inv_z,
                0.0,
                -point_3d.x * inv_z * inv_z,
                0.0,
                inv_z,
                -point_3d.y * inv_z * inv_z,
            );
            d_pixel_d_distorted * d_distorted_d_normalized * d_normalized_d_point
        });

        let result = if z < 0.0 {
            ProjectionResult::PointBehindCamera
        } else if !self.is_keypoint_visible(&pixel) {
            ProjectionResult::KeypointOutsideImageBox
        } else {
            ProjectionResult::KeypointVisible
        };

        (pixel, jacobian, result)
    }

    /// Back-projects a pixel to a unit-length bearing vector in the camera frame.
    ///
    /// # Errors
    ///
    /// * [`CameraModelError::PointIsOutSideImage`]: if `point_2d` is outside the image box.
    /// * [`CameraModelError::Distortion`]: if the iterative undistortion does not converge.
    pub fn unproject(&self, point_2d: &Vector2<f64>) -> Result<Vector3<f64>, CameraModelError> {
        if !self.is_keypoint_visible(point_2d) {
            return Err(CameraModelError::PointIsOutSideImage);
        }

        let distorted = Vector2::new(
            (point_2d.x - self.intrinsics.cx) / self.intrinsics.fx,
            (point_2d.y - self.intrinsics.cy) / self.intrinsics.fy,
        );
        let normalized = self.distortion.undistort(&distorted)?;

        Ok(Vector3::new(normalized.x, normalized.y, 1.0).normalize())
    }

    /// Loads the `cam0` entry of a camera YAML file.
    ///
    /// See [`Camera::from_yaml_str`] for the expected layout.
    pub fn load_from_yaml(path: &str) -> Result<Self, CameraModelError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml_str(&contents, "cam0")
    }

    /// Parses the camera stored under `key` in a YAML document.
    ///
    /// ```yaml
    /// cam0:
    ///   camera_id: 0000000000000000000000000000002a   # optional, random if absent
    ///   camera_model: pinhole
    ///   intrinsics: [461.629, 460.152, 362.680, 246.049]
    ///   distortion_model: radtan                       # radtan | equidistant | none
    ///   distortion: [-0.2834, 0.0739, 0.00019, 1.7e-05]
    ///   resolution: [752, 480]
    /// ```
    ///
    /// The Kalibr key `distortion_coeffs` is accepted in place of `distortion`.
    pub fn from_yaml_str(contents: &str, key: &str) -> Result<Self, CameraModelError> {
        let docs = YamlLoader::load_from_str(contents)?;
        let doc = docs
            .first()
            .ok_or_else(|| CameraModelError::InvalidParams("Empty YAML document".to_string()))?;
        let node = &doc[key];
        if node.is_badvalue() {
            return Err(CameraModelError::InvalidParams(format!(
                "Missing camera entry '{}'",
                key
            )));
        }

        if let Some(model) = node["camera_model"].as_str() {
            if model != "pinhole" {
                return Err(CameraModelError::InvalidParams(format!(
                    "Unsupported camera model '{}'",
                    model
                )));
            }
        }

        let id = match node["camera_id"].as_str() {
            Some(hex) => hex
                .parse::<CameraId>()
                .map_err(|e| CameraModelError::InvalidParams(e.to_string()))?,
            None => CameraId::random(),
        };

        let intrinsics_yaml = node["intrinsics"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid intrinsics".to_string()))?;
        if intrinsics_yaml.len() != 4 {
            return Err(CameraModelError::InvalidParams(format!(
                "Expected 4 intrinsic parameters, found {}",
                intrinsics_yaml.len()
            )));
        }
        let intrinsics = Intrinsics {
            fx: yaml_f64(&intrinsics_yaml[0], "fx")?,
            fy: yaml_f64(&intrinsics_yaml[1], "fy")?,
            cx: yaml_f64(&intrinsics_yaml[2], "cx")?,
            cy: yaml_f64(&intrinsics_yaml[3], "cy")?,
        };

        let resolution_yaml = node["resolution"]
            .as_vec()
            .ok_or_else(|| CameraModelError::InvalidParams("Invalid resolution".to_string()))?;
        if resolution_yaml.len() != 2 {
            return Err(CameraModelError::InvalidParams(
                "Resolution must hold [width, height]".to_string(),
            ));
        }
        let resolution = Resolution {
            width: yaml_u32(&resolution_yaml[0], "width")?,
            height: yaml_u32(&resolution_yaml[1], "height")?,
        };

        let distortion_type = match node["distortion_model"].as_str() {
            Some(name) => name.parse::<DistortionType>()?,
            None => DistortionType::RadTan,
        };
        let distortion_node = if node["distortion"].is_badvalue() {
            &node["distortion_coeffs"]
        } else {
            &node["distortion"]
        };
        let coefficients = match distortion_node {
            Yaml::BadValue if distortion_type == DistortionType::None => Vec::new(),
            _ => distortion_node
                .as_vec()
                .ok_or_else(|| {
                    CameraModelError::InvalidParams("Missing distortion parameters".to_string())
                })?
                .iter()
                .enumerate()
                .map(|(i, value)| yaml_f64(value, &format!("distortion parameter at index {}", i)))
                .collect::<Result<Vec<f64>, _>>()?,
        };
        let distortion = DistortionModel::from_type(distortion_type, &coefficients)?;

        let camera = Camera::new(id, intrinsics, resolution, distortion)?;
        debug!("Loaded camera {} from YAML entry '{}'", camera.id, key);
        Ok(camera)
    }

    /// Serializes the camera under the `cam0` key in the layout read by
    /// [`Camera::from_yaml_str`].
    pub fn to_yaml_string(&self) -> Result<String, CameraModelError> {
        let entry = CameraYaml {
            camera_id: self.id.to_string(),
            camera_model: "pinhole",
            intrinsics: [
                self.intrinsics.fx,
                self.intrinsics.fy,
                self.intrinsics.cx,
                self.intrinsics.cy,
            ],
            distortion_model: self.distortion.distortion_type().as_str(),
            distortion: self.distortion.parameters().to_vec(),
            resolution: [self.resolution.width, self.resolution.height],
        };
        let document = BTreeMap::from([("cam0", entry)]);
        serde_yaml::to_string(&document).map_err(|e| CameraModelError::YamlError(e.to_string()))
    }

    pub fn save_to_yaml(&self, path: &str) -> Result<(), CameraModelError> {
        let yaml_string = self.to_yaml_string()?;
        fs::write(path, yaml_string)?;
        Ok(())
    }
}

#[derive(Serialize)]
struct CameraYaml {
    camera_id: String,
    camera_model: &'static str,
    intrinsics: [f64; 4],
    distortion_model: &'static str,
    distortion: Vec<f64>,
    resolution: [u32; 2],
}

fn validate_distortion(distortion: &DistortionModel) -> Result<(), CameraModelError> {
    if !distortion.parameters_valid(distortion.parameters()) {
        return Err(CameraModelError::InvalidParams(format!(
            "Invalid distortion parameters {:?}",
            distortion
        )));
    }
    Ok(())
}

/// Reads a number that YAML may have typed as either a float or an integer.
fn yaml_f64(node: &Yaml, name: &str) -> Result<f64, CameraModelError> {
    node.as_f64()
        .or_else(|| node.as_i64().map(|v| v as f64))
        .ok_or_else(|| CameraModelError::InvalidParams(format!("Invalid {}", name)))
}

fn yaml_u32(node: &Yaml, name: &str) -> Result<u32, CameraModelError> {
    node.as_i64()
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| CameraModelError::InvalidParams(format!("Invalid {}", name)))
}
