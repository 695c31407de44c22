use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Pitch stops short of straight up or down, where yaw is undefined.
const MAX_PITCH: f32 = FRAC_PI_2 - 1e-3;

/// Perspective camera with cached view and projection matrices.
///
/// The matrices are only rebuilt by the explicit mutators below. Changing
/// `fov_y`, `near_plane` or `far_plane` directly requires a follow-up call to
/// [`Camera::update_projection`] before the camera is rendered with.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub near_plane: f32,
    pub far_plane: f32,
    pub fov_y: f32,
    aspect_ratio: f32,
    view: Mat4,
    proj: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::looking_at(Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO)
    }
}

impl Camera {
    pub const DEFAULT_NEAR: f32 = 2.0;
    pub const DEFAULT_FAR: f32 = 50.0;
    pub const DEFAULT_FOV_Y: f32 = FRAC_PI_2 * 0.75;

    /// Creates a camera at `position` aimed at `target` with a square aspect.
    pub fn looking_at(position: Vec3, target: Vec3) -> Self {
        Self::with_lens(
            position,
            target,
            Self::DEFAULT_FOV_Y,
            Self::DEFAULT_NEAR,
            Self::DEFAULT_FAR,
            1.0,
        )
    }

    pub fn with_lens(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        near_plane: f32,
        far_plane: f32,
        aspect_ratio: f32,
    ) -> Self {
        let mut camera = Self {
            position,
            yaw: 0.0,
            pitch: 0.0,
            near_plane,
            far_plane,
            fov_y,
            aspect_ratio,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        };
        camera.set_look_at(position, target, Vec3::Y);
        camera.update_projection(aspect_ratio);
        camera
    }

    pub fn view(&self) -> Mat4 {
        self.view
    }

    pub fn proj(&self) -> Mat4 {
        self.proj
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.aspect_ratio
    }

    /// Aims the camera with a right-handed look-at matrix.
    ///
    /// Yaw and pitch are recovered from the resulting forward vector so that
    /// later incremental rotation continues from this orientation.
    pub fn set_look_at(&mut self, position: Vec3, target: Vec3, up: Vec3) {
        self.view = Mat4::look_at_rh(position, target, up);
        self.position = position;
        let forward = self.forward();
        self.pitch = forward.y.clamp(-1.0, 1.0).asin();
        // Yaw zero faces -Z, which is where atan2 of the forward vector reads pi.
        self.yaw = forward.x.atan2(forward.z) + PI;
    }

    /// Moves the camera by a displacement expressed in camera-local axes and
    /// turns it by `angular_delta` (x = yaw, y = pitch), in radians.
    ///
    /// Only yaw rotates the displacement, so walking stays level whatever the
    /// pitch.
    pub fn apply_movement(&mut self, local_displacement: Vec3, angular_delta: Vec2) {
        let local_to_world = Mat4::from_rotation_y(self.yaw);
        self.position += local_to_world.transform_vector3(local_displacement);
        self.yaw += angular_delta.x;
        self.pitch = (self.pitch + angular_delta.y).clamp(-MAX_PITCH, MAX_PITCH);
        self.rebuild_view();
    }

    /// Rebuilds the projection for a new aspect ratio.
    pub fn update_projection(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio;
        self.proj = Mat4::perspective_rh(self.fov_y, aspect_ratio, self.near_plane, self.far_plane);
    }

    /// Width of the view frustum at the near plane.
    pub fn frustum_width(&self) -> f32 {
        2.0 * (self.fov_y / 2.0).tan() * self.near_plane
    }

    pub fn forward(&self) -> Vec3 {
        -Vec3::new(self.view.x_axis.z, self.view.y_axis.z, self.view.z_axis.z)
    }

    /// Moves the camera along a circular path around the world origin while
    /// keeping it aimed at the origin.
    pub fn animate(&mut self, delta_seconds: f32) {
        const PACE: f32 = 0.3;
        const MAGNITUDE: f32 = 3.0;
        const HEIGHT: f32 = 20.0;

        let angle = self.position.z.atan2(self.position.x);
        let radius = self.position.x.hypot(self.position.z);
        let next = angle + delta_seconds * PACE;
        let position = Vec3::new(
            next.cos() * radius,
            HEIGHT + (angle * 3.0).cos() * MAGNITUDE,
            next.sin() * radius,
        );
        self.set_look_at(position, Vec3::ZERO, Vec3::Y);
    }

    fn rebuild_view(&mut self) {
        self.view = Mat4::from_rotation_x(-self.pitch)
            * Mat4::from_rotation_y(-self.yaw)
            * Mat4::from_translation(-self.position);
    }
}

/// Named camera roles; the active one receives user input and is rendered from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CameraRole {
    #[default]
    Viewer,
    Light,
}

impl CameraRole {
    pub fn toggled(self) -> Self {
        match self {
            Self::Viewer => Self::Light,
            Self::Light => Self::Viewer,
        }
    }
}

/// The viewer and the light camera, plus which one is active.
#[derive(Debug, Clone)]
pub struct CameraRig {
    pub viewer: Camera,
    pub light: Camera,
    pub active: CameraRole,
}

impl CameraRig {
    pub fn new(viewer: Camera, light: Camera) -> Self {
        Self {
            viewer,
            light,
            active: CameraRole::Viewer,
        }
    }

    pub fn get(&self, role: CameraRole) -> &Camera {
        match role {
            CameraRole::Viewer => &self.viewer,
            CameraRole::Light => &self.light,
        }
    }

    pub fn get_mut(&mut self, role: CameraRole) -> &mut Camera {
        match role {
            CameraRole::Viewer => &mut self.viewer,
            CameraRole::Light => &mut self.light,
        }
    }

    pub fn active(&self) -> &Camera {
        self.get(self.active)
    }

    pub fn active_mut(&mut self) -> &mut Camera {
        self.get_mut(self.active)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::*;

    fn assert_mat_close(a: Mat4, b: Mat4) {
        for (x, y) in a.to_cols_array().iter().zip(b.to_cols_array().iter()) {
            assert!((x - y).abs() < 1e-4, "{a:?} != {b:?}");
        }
    }

    fn ndc_depth(camera: &Camera, distance: f32) -> f32 {
        let clip = camera.proj() * Vec4::new(0.0, 0.0, -distance, 1.0);
        clip.z / clip.w
    }

    #[test]
    fn projection_depth_is_monotonic_between_planes() {
        for (near, far, fov) in [(0.1, 100.0, 1.0), (2.0, 50.0, 1.2), (5.0, 25.0, 3.0)] {
            let mut camera = Camera::looking_at(Vec3::Z, Vec3::ZERO);
            camera.near_plane = near;
            camera.far_plane = far;
            camera.fov_y = fov;
            camera.update_projection(1.5);

            let steps = 64;
            let mut previous = ndc_depth(&camera, near);
            assert!(previous.abs() < 1e-5);
            for i in 1..=steps {
                let d = near + (far - near) * i as f32 / steps as f32;
                let depth = ndc_depth(&camera, d);
                assert!(depth > previous, "depth not increasing at {d}");
                previous = depth;
            }
            assert!((previous - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn frustum_width_is_positive_and_linear_in_near() {
        let mut camera = Camera::default();
        camera.near_plane = 1.0;
        let base = camera.frustum_width();
        assert!(base > 0.0);
        camera.near_plane = 3.0;
        assert!((camera.frustum_width() - 3.0 * base).abs() < 1e-5);
    }

    #[test]
    fn look_at_round_trips_through_yaw_and_pitch() {
        let targets = [
            (Vec3::new(5.0, 5.0, 5.0), Vec3::ZERO),
            (Vec3::new(-1.5, 0.4, -4.2), Vec3::new(0.0, -10.0, 0.0)),
            (Vec3::new(0.0, 13.0, -7.0), Vec3::ZERO),
            (Vec3::new(3.0, 1.0, 0.0), Vec3::new(-2.0, 1.0, 0.5)),
        ];
        for (position, target) in targets {
            let mut camera = Camera::looking_at(position, target);
            let expected = camera.view();
            camera.apply_movement(Vec3::ZERO, Vec2::ZERO);
            assert_mat_close(camera.view(), expected);
        }
    }

    #[test]
    fn movement_stays_level_regardless_of_pitch() {
        let mut camera = Camera::looking_at(Vec3::new(0.0, 10.0, 0.0), Vec3::new(0.0, 0.0, -1.0));
        assert!(camera.pitch < -1.0);
        camera.apply_movement(Vec3::new(0.0, 0.0, -1.0), Vec2::ZERO);
        assert!((camera.position.y - 10.0).abs() < 1e-5);
        assert!(camera.position.z < -0.99);
    }

    #[test]
    fn pitch_stops_short_of_the_poles() {
        let mut camera = Camera::default();
        camera.apply_movement(Vec3::ZERO, Vec2::new(0.0, 10.0));
        assert!(camera.pitch < FRAC_PI_2);
        assert!(camera.forward().cross(Vec3::Y).length() > 1e-4);
        assert!(camera.view().is_finite());
        camera.apply_movement(Vec3::ZERO, Vec2::new(0.0, -20.0));
        assert_eq!(camera.pitch, -MAX_PITCH);
    }

    #[test]
    fn explicit_update_is_needed_for_lens_changes() {
        let mut camera = Camera::default();
        let before = camera.proj();
        camera.fov_y = 0.5;
        assert_eq!(camera.proj(), before);
        camera.update_projection(camera.aspect_ratio());
        assert_ne!(camera.proj(), before);
    }

    #[test]
    fn animation_keeps_camera_aimed_at_origin() {
        let mut camera = Camera::looking_at(Vec3::new(0.0, 13.0, -7.0), Vec3::ZERO);
        camera.animate(0.5);
        let to_origin = (-camera.position).normalize();
        assert!(camera.forward().dot(to_origin) > 0.999);
        assert!((camera.position.y - 20.0).abs() <= 3.0 + 1e-4);
    }

    #[test]
    fn rig_routes_input_to_active_role() {
        let mut rig = CameraRig::new(Camera::default(), Camera::looking_at(Vec3::Y * 10.0, Vec3::X));
        rig.active = rig.active.toggled();
        rig.active_mut().position = Vec3::ONE;
        assert_eq!(rig.light.position, Vec3::ONE);
        assert_ne!(rig.viewer.position, Vec3::ONE);
    }
}
