use glam::{Mat4, Quat, Vec2, Vec3};

#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    pub position: Vec3,
    pub target: Vec3,
    pub up: Vec3,

    pub fov: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(70.0, 16.0 / 9.0, 0.01, 20.0)
    }
}

impl Camera {
    pub fn perspective(fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            position: Vec3::new(0.0, 0.0, 1.0),
            target: Vec3::ZERO,
            up: Vec3::Y,
            fov: fov_degrees.to_radians(),
            aspect,
            near,
            far,
        }
    }

    pub fn front(&self) -> Vec3 {
        (self.target - self.position).try_normalize().unwrap_or(Vec3::NEG_Z)
    }

    pub fn right(&self) -> Vec3 {
        self.front().cross(self.up).try_normalize().unwrap_or(Vec3::X)
    }

    pub fn distance(&self) -> f32 {
        self.position.distance(self.target)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.target, self.up)
    }

    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective_rh(self.fov, self.aspect, self.near, self.far)
    }

    pub fn view_projection_matrix(&self) -> Mat4 {
        self.projection_matrix() * self.view_matrix()
    }

    /// Both sides are clamped to 1 so a collapsed viewport keeps a finite projection.
    pub fn set_aspect(&mut self, width: f32, height: f32) {
        self.aspect = width.max(1.0) / height.max(1.0);
    }

    /// Places the camera at a device-supplied pose.
    pub fn set_pose(&mut self, position: Vec3, orientation: Quat) {
        self.position = position;
        self.target = position + orientation * Vec3::NEG_Z;
        self.up = orientation * Vec3::Y;
    }

    /// Normalized device coordinates of a world point, `None` when behind the camera.
    pub fn project(&self, point: Vec3) -> Option<Vec2> {
        let clip = self.view_projection_matrix() * point.extend(1.0);
        if clip.w <= 0.0 {
            return None;
        }
        Some(Vec2::new(clip.x / clip.w, clip.y / clip.w))
    }
}

#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
}

impl CameraUniform {
    pub fn from_camera(camera: &Camera) -> Self {
        Self {
            view_proj: camera.view_projection_matrix().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn zero_height_aspect_falls_back_to_one() {
        let mut camera = Camera::default();
        camera.set_aspect(640.0, 0.0);
        assert_eq!(camera.aspect, 640.0);
        assert!(camera.projection_matrix().is_finite());
    }

    #[test]
    fn collapsed_width_keeps_the_projection_finite() {
        let mut camera = Camera::default();
        camera.set_aspect(0.0, 480.0);
        assert_relative_eq!(camera.aspect, 1.0 / 480.0);
        assert!(camera.projection_matrix().is_finite());

        camera.set_aspect(0.0, 0.0);
        assert_eq!(camera.aspect, 1.0);
    }

    #[test]
    fn target_projects_to_screen_centre() {
        let mut camera = Camera::perspective(75.0, 1.5, 0.1, 1000.0);
        camera.position = Vec3::splat(25.0);
        let ndc = camera.project(Vec3::ZERO).unwrap();
        assert_relative_eq!(ndc.x, 0.0, epsilon = 1e-5);
        assert_relative_eq!(ndc.y, 0.0, epsilon = 1e-5);
        assert!(camera.project(Vec3::splat(50.0)).is_none());
    }

    #[test]
    fn identity_pose_looks_down_negative_z() {
        let mut camera = Camera::default();
        camera.set_pose(Vec3::new(0.0, 1.6, 0.0), Quat::IDENTITY);
        assert_eq!(camera.front(), Vec3::NEG_Z);
        assert_eq!(camera.target, Vec3::new(0.0, 1.6, -1.0));
    }
}
