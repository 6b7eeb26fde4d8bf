//! Implements the [`NCameras`] rig.
//!
//! The rig keeps three pieces of state in lockstep:
//!
//! * the camera list, index `0..N`,
//! * the parallel list of body-to-camera transforms `T_C_B`,
//! * a map from [`CameraId`] to index, derived from the camera list.
//!
//! The map is never edited on its own. Every operation that changes the camera
//! list rebuilds it, so a lookup miss always means the camera is absent.

use crate::camera::Camera;
use crate::id::{CameraId, NCamerasId};
use crate::rig::RigError;
use log::{debug, warn};
use nalgebra::Isometry3;
use std::collections::HashMap;
use std::sync::Arc;
use yaml_rust::Yaml;

/// A rig of cameras sharing one body frame.
///
/// A default-constructed rig is uninitialized: it has no cameras and an invalid
/// id. [`NCameras::new`] produces an initialized rig.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use nalgebra::Isometry3;
/// use camera_rig_tools::camera::{Camera, Intrinsics, Resolution};
/// use camera_rig_tools::distortion::DistortionModel;
/// use camera_rig_tools::id::{CameraId, NCamerasId};
/// use camera_rig_tools::rig::NCameras;
///
/// let camera = Arc::new(
///     Camera::new(
///         CameraId::random(),
///         Intrinsics { fx: 400.0, fy: 400.0, cx: 320.0, cy: 240.0 },
///         Resolution { width: 640, height: 480 },
///         DistortionModel::default(),
///     )
///     .unwrap(),
/// );
/// let rig = NCameras::new(
///     NCamerasId::random(),
///     vec![Isometry3::identity()],
///     vec![camera.clone()],
///     "mono",
/// )
/// .unwrap();
///
/// assert_eq!(rig.get_camera_index(&camera.id()), Some(0));
/// assert!(!rig.has_camera_with_id(&CameraId::random()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct NCameras {
    id: NCamerasId,
    label: String,
    cameras: Vec<Arc<Camera>>,
    t_c_b: Vec<Isometry3<f64>>,
    id_to_index: HashMap<CameraId, usize>,
}

impl NCameras {
    /// Builds a rig from parallel lists of transforms and cameras.
    ///
    /// # Errors
    ///
    /// [`RigError::InvalidArgument`] if the lists differ in length or two
    /// cameras share an id.
    pub fn new(
        id: NCamerasId,
        t_c_b: Vec<Isometry3<f64>>,
        cameras: Vec<Arc<Camera>>,
        label: impl Into<String>,
    ) -> Result<Self, RigError> {
        if cameras.len() != t_c_b.len() {
            return Err(RigError::InvalidArgument(format!(
                "Got {} cameras but {} transformations",
                cameras.len(),
                t_c_b.len()
            )));
        }

        let mut rig = NCameras {
            id,
            label: label.into(),
            cameras,
            t_c_b,
            id_to_index: HashMap::new(),
        };
        rig.rebuild_index()?;

        debug!(
            "Built rig '{}' ({}) with {} cameras",
            rig.label,
            rig.id,
            rig.cameras.len()
        );
        Ok(rig)
    }

    /// Construction from a configuration tree is not supported.
    pub fn from_property_tree(_tree: &Yaml) -> Result<Self, RigError> {
        warn!("Attempted to build an NCameras rig from a property tree");
        Err(RigError::Unimplemented(
            "constructing NCameras from a property tree",
        ))
    }

    fn rebuild_index(&mut self) -> Result<(), RigError> {
        let mut id_to_index = HashMap::with_capacity(self.cameras.len());
        for (index, camera) in self.cameras.iter().enumerate() {
            if let Some(previous) = id_to_index.insert(camera.id(), index) {
                return Err(RigError::InvalidArgument(format!(
                    "Camera id {} is used at index {} and {}",
                    camera.id(),
                    previous,
                    index
                )));
            }
        }
        self.id_to_index = id_to_index;
        Ok(())
    }

    fn check_index(&self, index: usize) -> Result<(), RigError> {
        if index >= self.cameras.len() {
            return Err(RigError::IndexOutOfRange {
                index,
                len: self.cameras.len(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> NCamerasId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn num_cameras(&self) -> usize {
        self.cameras.len()
    }

    /// `false` for a default-constructed rig.
    pub fn is_initialized(&self) -> bool {
        self.id.is_valid()
    }

    pub fn get_camera(&self, index: usize) -> Result<&Camera, RigError> {
        self.check_index(index)?;
        Ok(&self.cameras[index])
    }

    /// The shared handle of camera `index`.
    pub fn get_camera_arc(&self, index: usize) -> Result<Arc<Camera>, RigError> {
        self.check_index(index)?;
        Ok(Arc::clone(&self.cameras[index]))
    }

    /// Mutable access to camera `index`.
    ///
    /// This is copy-on-write: if the camera is also held by frames or other
    /// rigs, the rig gets its own copy first and the other holders keep the
    /// previous values. The camera id cannot change through this reference, so
    /// the id map stays valid.
    pub fn get_camera_mut(&mut self, index: usize) -> Result<&mut Camera, RigError> {
        self.check_index(index)?;
        Ok(Arc::make_mut(&mut self.cameras[index]))
    }

    /// Replaces camera `index` and re-derives the id map.
    ///
    /// # Errors
    ///
    /// [`RigError::InvalidArgument`] if another index already holds a camera
    /// with the same id; the rig is left unchanged.
    pub fn set_camera(&mut self, index: usize, camera: Arc<Camera>) -> Result<(), RigError> {
        self.check_index(index)?;
        if let Some(&other) = self.id_to_index.get(&camera.id()) {
            if other != index {
                return Err(RigError::InvalidArgument(format!(
                    "Camera id {} is already used at index {}",
                    camera.id(),
                    other
                )));
            }
        }
        self.cameras[index] = camera;
        self.rebuild_index()
    }

    pub fn get_camera_id(&self, index: usize) -> Result<CameraId, RigError> {
        self.check_index(index)?;
        Ok(self.cameras[index].id())
    }

    pub fn cameras(&self) -> &[Arc<Camera>] {
        &self.cameras
    }

    /// The transform taking points from the body frame into camera `index`.
    pub fn get_t_c_b(&self, index: usize) -> Result<&Isometry3<f64>, RigError> {
        self.check_index(index)?;
        Ok(&self.t_c_b[index])
    }

    pub fn get_t_c_b_mut(&mut self, index: usize) -> Result<&mut Isometry3<f64>, RigError> {
        self.check_index(index)?;
        Ok(&mut self.t_c_b[index])
    }

    pub fn set_t_c_b(&mut self, index: usize, t_c_b: Isometry3<f64>) -> Result<(), RigError> {
        self.check_index(index)?;
        self.t_c_b[index] = t_c_b;
        Ok(())
    }

    pub fn transformations(&self) -> &[Isometry3<f64>] {
        &self.t_c_b
    }

    pub fn has_camera_with_id(&self, id: &CameraId) -> bool {
        self.id_to_index.contains_key(id)
    }

    /// Index of the camera with `id`, or `None` if the rig does not hold it.
    pub fn get_camera_index(&self, id: &CameraId) -> Option<usize> {
        self.id_to_index.get(id).copied()
    }

    pub fn get_camera_by_id(&self, id: &CameraId) -> Option<&Arc<Camera>> {
        self.get_camera_index(id).map(|index| &self.cameras[index])
    }
}

impl PartialEq for NCameras {
    fn eq(&self, other: &Self) -> bool {
        if self.num_cameras() != other.num_cameras()
            || self.label != other.label
            || self.id != other.id
        {
            return false;
        }
        self.cameras
            .iter()
            .zip(&other.cameras)
            .all(|(a, b)| Arc::ptr_eq(a, b) || a == b)
            && self.t_c_b == other.t_c_b
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Intrinsics, Resolution};
    use crate::distortion::{Distortion, DistortionModel, RadTanDistortion};
    use nalgebra::{Translation3, UnitQuaternion, Vector3};

    fn make_camera(fx: f64) -> Arc<Camera> {
        Arc::new(
            Camera::new(
                CameraId::random(),
                Intrinsics {
                    fx,
                    fy: fx,
                    cx: 376.0,
                    cy: 240.0,
                },
                Resolution {
                    width: 752,
                    height: 480,
                },
                DistortionModel::from(
                    RadTanDistortion::new(&[-0.28, 0.07, 0.0002, 0.00002]).unwrap(),
                ),
            )
            .unwrap(),
        )
    }

    fn make_transform(x: f64) -> Isometry3<f64> {
        Isometry3::from_parts(
            Translation3::new(x, 0.0, 0.0),
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.1 * x),
        )
    }

    fn make_rig(n: usize) -> NCameras {
        let cameras = (0..n).map(|i| make_camera(450.0 + i as f64)).collect();
        let transforms = (0..n).map(|i| make_transform(i as f64)).collect();
        NCameras::new(NCamerasId::random(), transforms, cameras, "stereo").unwrap()
    }

    fn rebuild(rig: &NCameras) -> NCameras {
        NCameras::new(
            rig.id(),
            rig.transformations().to_vec(),
            rig.cameras().to_vec(),
            rig.label(),
        )
        .unwrap()
    }

    #[test]
    fn test_camera_index_lookup() {
        let rig = make_rig(4);
        assert!(rig.is_initialized());
        for i in 0..rig.num_cameras() {
            let id = rig.get_camera(i).unwrap().id();
            assert_eq!(rig.get_camera_index(&id), Some(i));
            assert!(rig.has_camera_with_id(&id));
            assert_eq!(rig.get_camera_id(i).unwrap(), id);
            assert_eq!(rig.get_camera_by_id(&id).unwrap().id(), id);
        }
        let unknown = CameraId::random();
        assert!(!rig.has_camera_with_id(&unknown));
        assert_eq!(rig.get_camera_index(&unknown), None);
    }

    #[test]
    fn test_mismatched_lengths_are_rejected() {
        let result = NCameras::new(
            NCamerasId::random(),
            vec![make_transform(0.0)],
            vec![make_camera(450.0), make_camera(451.0)],
            "broken",
        );
        assert!(matches!(result, Err(RigError::InvalidArgument(_))));
    }

    #[test]
    fn test_duplicate_camera_ids_are_rejected() {
        let camera = make_camera(450.0);
        let result = NCameras::new(
            NCamerasId::random(),
            vec![make_transform(0.0), make_transform(1.0)],
            vec![camera.clone(), camera],
            "duplicate",
        );
        assert!(matches!(result, Err(RigError::InvalidArgument(_))));
    }

    #[test]
    fn test_out_of_range_access() {
        let mut rig = make_rig(2);
        assert_eq!(
            rig.get_camera(2).unwrap_err(),
            RigError::IndexOutOfRange { index: 2, len: 2 }
        );
        assert!(rig.get_t_c_b(5).is_err());
        assert!(rig.get_t_c_b_mut(2).is_err());
        assert!(rig.set_t_c_b(2, Isometry3::identity()).is_err());
        assert!(rig.set_camera(2, make_camera(400.0)).is_err());
        assert!(rig.get_camera_mut(3).is_err());
        assert!(rig.get_camera_id(2).is_err());
    }

    #[test]
    fn test_set_camera_updates_index() {
        let mut rig = make_rig(3);
        let old_id = rig.get_camera_id(1).unwrap();
        let replacement = make_camera(500.0);

        rig.set_camera(1, replacement.clone()).unwrap();
        assert!(!rig.has_camera_with_id(&old_id));
        assert_eq!(rig.get_camera_index(&replacement.id()), Some(1));

        // Re-inserting at its own index is allowed.
        rig.set_camera(1, replacement.clone()).unwrap();

        let taken = rig.get_camera_arc(0).unwrap();
        assert!(matches!(
            rig.set_camera(2, taken),
            Err(RigError::InvalidArgument(_))
        ));
        assert_eq!(rig.get_camera_index(&replacement.id()), Some(1));
    }

    #[test]
    fn test_get_camera_mut_is_copy_on_write() {
        let mut rig = make_rig(2);
        let shared = rig.get_camera_arc(0).unwrap();

        rig.get_camera_mut(0)
            .unwrap()
            .distortion_mut()
            .set_parameters(&[0.0; 4])
            .unwrap();

        assert_ne!(*shared, *rig.get_camera(0).unwrap());
        assert_eq!(rig.get_camera_index(&shared.id()), Some(0));
    }

    #[test]
    fn test_transform_accessors() {
        let mut rig = make_rig(2);
        let t = make_transform(7.0);
        rig.set_t_c_b(1, t).unwrap();
        assert_eq!(rig.get_t_c_b(1).unwrap(), &t);

        rig.get_t_c_b_mut(0).unwrap().translation.vector.y = 2.0;
        assert_eq!(rig.transformations()[0].translation.vector.y, 2.0);
    }

    #[test]
    fn test_equality() {
        let rig = make_rig(3);
        assert_eq!(rig, rebuild(&rig));

        // Equal by value even when the cameras are distinct allocations.
        let deep = NCameras::new(
            rig.id(),
            rig.transformations().to_vec(),
            rig.cameras()
                .iter()
                .map(|c| Arc::new(Camera::clone(c)))
                .collect(),
            rig.label(),
        )
        .unwrap();
        assert_eq!(rig, deep);

        let mut changed_camera = rebuild(&rig);
        changed_camera.set_camera(2, make_camera(300.0)).unwrap();
        assert_ne!(rig, changed_camera);

        let mut changed_transform = rebuild(&rig);
        changed_transform.set_t_c_b(0, make_transform(9.0)).unwrap();
        assert_ne!(rig, changed_transform);

        let relabeled = NCameras::new(
            rig.id(),
            rig.transformations().to_vec(),
            rig.cameras().to_vec(),
            "other",
        )
        .unwrap();
        assert_ne!(rig, relabeled);

        let new_id = NCameras::new(
            NCamerasId::random(),
            rig.transformations().to_vec(),
            rig.cameras().to_vec(),
            rig.label(),
        )
        .unwrap();
        assert_ne!(rig, new_id);

        assert_ne!(rig, make_rig(2));
    }

    #[test]
    fn test_default_rig_is_uninitialized() {
        let rig = NCameras::default();
        assert!(!rig.is_initialized());
        assert_eq!(rig.num_cameras(), 0);
        assert!(rig.get_camera(0).is_err());
    }

    #[test]
    fn test_property_tree_construction_fails() {
        assert!(matches!(
            NCameras::from_property_tree(&Yaml::Null),
            Err(RigError::Unimplemented(_))
        ));
    }
}
