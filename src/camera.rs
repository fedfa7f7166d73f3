//! Perspective camera math.

use glam::{Mat4, Quat, Vec3};

/// Perspective camera for the demo scene.
///
/// `aspect` must be kept in sync with the output surface: every resize goes
/// through [`Camera::set_aspect`] before the next render.
pub struct Camera {
    pub position: Vec3,
    pub orientation: Quat,
    /// Vertical field of view (radians)
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            orientation: Quat::IDENTITY,
            fov_y,
            aspect,
            near,
            far,
        }
    }

    pub fn set_aspect(&mut self, width: u32, height: u32) {
        self.aspect = width.max(1) as f32 / height.max(1) as f32;
    }

    /// View matrix (world to camera).
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.orientation, self.position).inverse()
    }

    /// Projection matrix (0..1 depth range, as wgpu expects).
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov_y, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }
}

/// Camera uniform buffer data for the GPU.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub position: [f32; 3],
    pub _pad0: f32,
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            position: camera.position.to_array(),
            _pad0: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_aspect_tracks_viewport() {
        let mut camera = Camera::new(70.0_f32.to_radians(), 1.0, 0.01, 40.0);

        camera.set_aspect(1920, 1080);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < 1e-6);

        // degenerate sizes must not divide by zero
        camera.set_aspect(800, 0);
        assert!(camera.aspect.is_finite());
    }

    #[test]
    fn uniform_packs_view_projection_and_position() {
        let mut camera = Camera::new(70.0_f32.to_radians(), 16.0 / 9.0, 0.01, 40.0);
        camera.position = Vec3::new(0.0, 1.0, 0.5);

        let uniform = CameraUniform::from_camera(&camera);
        assert_eq!(
            Mat4::from_cols_array_2d(&uniform.view_proj),
            camera.view_projection_matrix()
        );
        assert_eq!(uniform.position, camera.position.to_array());
    }

    #[test]
    fn view_matrix_inverts_camera_transform() {
        let mut camera = Camera::new(70.0_f32.to_radians(), 16.0 / 9.0, 0.01, 40.0);
        camera.position = Vec3::new(0.0, 0.0, 0.5);

        // a point at the camera's position maps to the view-space origin
        let p = camera.view_matrix().transform_point3(camera.position);
        assert!(p.length() < 1e-6);

        // a point one unit in front of the camera lands on -Z
        let ahead = camera.position + Vec3::NEG_Z;
        let v = camera.view_matrix().transform_point3(ahead);
        assert!((v - Vec3::NEG_Z).length() < 1e-6);
    }
}
