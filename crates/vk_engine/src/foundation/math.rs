//! Math utilities and types
//!
//! Thin aliases over `nalgebra` plus the transform and projection helpers the
//! renderer uses.

pub use nalgebra::{Matrix4, Quaternion, Unit, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// 3D point type
pub type Point3 = nalgebra::Point3<f32>;

/// Quaternion type for rotations
pub type Quat = Unit<Quaternion<f32>>;

/// Transform representing position, rotation, and scale
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Position in 3D space
    pub position: Vec3,

    /// Rotation quaternion
    pub rotation: Quat,

    /// Scale factors
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }
}

impl Transform {
    /// Create a new identity transform
    pub fn identity() -> Self {
        Self::default()
    }

    /// Create a transform with only position
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Uniformly scaled transform at `position`
    pub fn from_position_scale(position: Vec3, scale: f32) -> Self {
        Self {
            position,
            scale: Vec3::new(scale, scale, scale),
            ..Default::default()
        }
    }

    /// Convert to a transformation matrix
    pub fn to_matrix(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
            * self.rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&self.scale)
    }
}

/// Right-handed perspective projection for Vulkan clip space
///
/// Depth is reversed (near plane maps to 1, far plane to 0) and Y points
/// down, so the matrix can be used without a flipped viewport.
pub fn perspective_reversed_z(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    let focal = 1.0 / (fov_y * 0.5).tan();
    let depth = far - near;

    let mut proj = Mat4::zeros();
    proj[(0, 0)] = focal / aspect;
    proj[(1, 1)] = -focal;
    proj[(2, 2)] = near / depth;
    proj[(2, 3)] = near * far / depth;
    proj[(3, 2)] = -1.0;
    proj
}

/// Column-major array form for GPU upload
pub fn to_cols_array(matrix: &Mat4) -> [[f32; 4]; 4] {
    (*matrix).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn project_depth(proj: &Mat4, z: f32) -> f32 {
        let clip = proj * Vec4::new(0.0, 0.0, z, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn test_transform_to_matrix_applies_scale_then_translation() {
        let transform = Transform::from_position_scale(Vec3::new(1.0, 2.0, 3.0), 2.0);
        let moved = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));

        assert_relative_eq!(moved, Point3::new(3.0, 2.0, 3.0));
    }

    #[test]
    fn test_transform_from_position_only_translates() {
        let transform = Transform::from_position(Vec3::new(0.0, 1.5, 0.0));
        let moved = transform.to_matrix().transform_point(&Point3::new(1.0, 0.0, 0.0));

        assert_relative_eq!(moved, Point3::new(1.0, 1.5, 0.0));
    }

    #[test]
    fn test_perspective_reverses_depth() {
        let proj = perspective_reversed_z(70f32.to_radians(), 1.5, 0.1, 10_000.0);

        assert_relative_eq!(project_depth(&proj, -0.1), 1.0, epsilon = 1e-5);
        assert_relative_eq!(project_depth(&proj, -10_000.0), 0.0, epsilon = 1e-5);
        assert!(project_depth(&proj, -1.0) > project_depth(&proj, -100.0));
    }

    #[test]
    fn test_perspective_flips_y() {
        let proj = perspective_reversed_z(90f32.to_radians(), 1.0, 0.1, 100.0);
        let clip = proj * Vec4::new(0.0, 1.0, -1.0, 1.0);

        assert!(clip.y / clip.w < 0.0);
    }

    #[test]
    fn test_to_cols_array_is_column_major() {
        let matrix = Mat4::new_translation(&Vec3::new(4.0, 5.0, 6.0));
        let cols = to_cols_array(&matrix);

        assert_eq!(cols[3], [4.0, 5.0, 6.0, 1.0]);
        assert_eq!(cols[0], [1.0, 0.0, 0.0, 0.0]);
    }
}
