//! Orbit/fly camera with pointer-ray picking against the water plane.

use glam::{Mat3, Mat4, Vec3, Vec4};

use crate::params::{CameraConfig, RenderConfig};

/// Free camera: yaw/pitch rotation plus a position moved within the rotated
/// frame. The mouse wheel zooms by scaling the near-plane frustum extent in
/// discrete power-of-two notches.
pub struct Camera {
    pub position: Vec3,
    /// Pitch (radians)
    pub rot_x: f32,
    /// Yaw (radians)
    pub rot_y: f32,
    move_step: f32,
    base_fov_scale: f32,
    wheel_notches: i32,
}

impl Camera {
    pub fn new(config: &CameraConfig, render: &RenderConfig) -> Self {
        Self {
            position: Vec3::from_array(config.position),
            rot_x: config.rot_x,
            rot_y: config.rot_y,
            move_step: config.move_step_m,
            base_fov_scale: render.fov_scale,
            wheel_notches: 0,
        }
    }

    /// Camera-to-world rotation.
    fn rotation(&self) -> Mat3 {
        Mat3::from_rotation_y(self.rot_y) * Mat3::from_rotation_x(self.rot_x)
    }

    /// World-to-camera view matrix. The camera looks down its local -Z.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(-self.rot_x)
            * Mat4::from_rotation_y(-self.rot_y)
            * Mat4::from_translation(-self.position)
    }

    /// Frustum half-extent at the near plane, after wheel zoom.
    pub fn fov_scale(&self) -> f32 {
        self.base_fov_scale * 2f32.powf(self.wheel_notches as f32 / 32.0)
    }

    pub fn projection(&self, aspect: f32, render: &RenderConfig) -> Mat4 {
        let fov_y = 2.0 * (self.fov_scale() / render.near_plane_m).atan();
        Mat4::perspective_rh(fov_y, aspect, render.near_plane_m, render.far_plane_m)
    }

    /// Move by `steps` of the configured step length per axis, within the
    /// camera's rotated frame (local -Z is forward).
    pub fn fly(&mut self, local_steps: Vec3) {
        self.position += self.rotation() * (local_steps * self.move_step);
    }

    /// Wheel zoom: scrolling down widens the frustum by one notch.
    pub fn wheel(&mut self, delta: f32) {
        if delta < 0.0 {
            self.wheel_notches += 1;
        } else if delta > 0.0 {
            self.wheel_notches -= 1;
        }
    }

    /// Cast a ray through a device pixel and intersect the horizontal plane
    /// `y = plane_y`. Returns the world-space (x, z) of the hit, or `None`
    /// when the ray misses the plane (parallel or pointing away).
    pub fn pick_plane(
        &self,
        pixel_x: f32,
        pixel_y: f32,
        width: f32,
        height: f32,
        plane_y: f32,
        proj: &Mat4,
    ) -> Option<(f32, f32)> {
        let ndc_x = pixel_x / width * 2.0 - 1.0;
        let ndc_y = (height - pixel_y) / height * 2.0 - 1.0;

        // Undo the projection scaling to get a camera-space direction.
        let ray_cam = Vec3::new(ndc_x / proj.x_axis.x, ndc_y / proj.y_axis.y, -1.0);
        let ray_world = (self.view_matrix().inverse() * Vec4::from((ray_cam, 0.0))).truncate();

        if ray_world.y.abs() < 1e-6 {
            return None;
        }
        let t = (plane_y - self.position.y) / ray_world.y;
        if t < 0.0 {
            return None;
        }
        let hit = self.position + ray_world * t;
        Some((hit.x, hit.z))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera() -> Camera {
        Camera::new(&CameraConfig::default(), &RenderConfig::default())
    }

    #[test]
    fn test_view_projection_is_finite_and_nontrivial() {
        let cam = camera();
        let render = RenderConfig::default();
        let vp = cam.projection(14.0 / 9.0, &render) * cam.view_matrix();
        assert_ne!(vp, Mat4::IDENTITY);
        assert!(vp.to_cols_array().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_wheel_widens_and_narrows_frustum() {
        let mut cam = camera();
        let base = cam.fov_scale();
        cam.wheel(-1.0);
        assert!(cam.fov_scale() > base);
        cam.wheel(1.0);
        cam.wheel(1.0);
        assert!(cam.fov_scale() < base);
    }

    #[test]
    fn test_fly_moves_in_rotated_frame() {
        let mut cam = camera();
        cam.position = Vec3::ZERO;
        cam.rot_x = 0.0;
        cam.rot_y = std::f32::consts::FRAC_PI_2;

        // Local -Z (forward) with a 90-degree yaw moves along world -X.
        cam.fly(Vec3::new(0.0, 0.0, -1.0));
        assert!((cam.position.x + cam.move_step).abs() < 1e-6);
        assert!(cam.position.z.abs() < 1e-6);
    }

    #[test]
    fn test_pick_plane_straight_down() {
        let mut cam = camera();
        cam.position = Vec3::new(1.0, 5.0, 2.0);
        cam.rot_x = -std::f32::consts::FRAC_PI_2;
        cam.rot_y = 0.0;

        let render = RenderConfig::default();
        let proj = cam.projection(1.0, &render);
        let (x, z) = cam
            .pick_plane(400.0, 300.0, 800.0, 600.0, 0.0, &proj)
            .expect("center ray must hit the plane below");
        assert!((x - 1.0).abs() < 1e-3);
        assert!((z - 2.0).abs() < 1e-3);
    }

    #[test]
    fn test_pick_plane_misses_when_looking_up() {
        let mut cam = camera();
        cam.position = Vec3::new(0.0, 5.0, 0.0);
        cam.rot_x = std::f32::consts::FRAC_PI_2;

        let render = RenderConfig::default();
        let proj = cam.projection(1.0, &render);
        assert!(cam
            .pick_plane(400.0, 300.0, 800.0, 600.0, 0.0, &proj)
            .is_none());
    }
}
