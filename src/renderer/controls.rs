//! Damped orbit controller around a target point.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

use crate::renderer::camera::Camera;
use crate::renderer::input::KeyboardAxisState;

pub const DAMPING_FACTOR: f32 = 0.05;
const POLAR_EPS: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct CameraRig {
    pub damping_factor: f32,
    pub enable_damping: bool,
    pub rotate_speed: f32,
    pub zoom_speed: f32,
    pub pan_speed: f32,
    pub enable_pan: bool,
    pub min_distance: f32,
    pub max_distance: f32,

    spherical_delta: Vec2,
    scale: f32,
    pan_offset: Vec3,
}

impl Default for CameraRig {
    fn default() -> Self {
        Self {
            damping_factor: DAMPING_FACTOR,
            enable_damping: true,
            rotate_speed: 1.0,
            zoom_speed: 1.0,
            pan_speed: 1.0,
            enable_pan: true,
            min_distance: 0.0,
            max_distance: f32::INFINITY,

            spherical_delta: Vec2::ZERO,
            scale: 1.0,
            pan_offset: Vec3::ZERO,
        }
    }
}

impl CameraRig {
    pub fn with_distance_clamp(min_distance: f32, max_distance: f32) -> Self {
        Self {
            min_distance,
            max_distance,
            ..Self::default()
        }
    }

    /// Pointer drag in pixels; a full viewport height of travel is one turn.
    pub fn rotate(&mut self, delta: Vec2, viewport_height: f32) {
        let height = viewport_height.max(1.0);
        self.spherical_delta.x -= TAU * delta.x / height * self.rotate_speed;
        self.spherical_delta.y -= TAU * delta.y / height * self.rotate_speed;
    }

    /// Positive wheel delta moves towards the target.
    pub fn dolly(&mut self, wheel_delta: f32) {
        let zoom_scale = 0.95_f32.powf(self.zoom_speed);
        if wheel_delta > 0.0 {
            self.scale *= zoom_scale;
        } else if wheel_delta < 0.0 {
            self.scale /= zoom_scale;
        }
    }

    pub fn pan(&mut self, delta: Vec2, viewport_height: f32, camera: &Camera) {
        if !self.enable_pan {
            return;
        }
        let height = viewport_height.max(1.0);
        let target_distance = camera.distance() * (camera.fov / 2.0).tan();
        let right = camera.right();
        let up = right.cross(camera.front());

        self.pan_offset -= right * (2.0 * delta.x * target_distance / height) * self.pan_speed;
        self.pan_offset += up * (2.0 * delta.y * target_distance / height) * self.pan_speed;
    }

    /// Moves camera and target together along world axes, keeping the view direction.
    pub fn integrate(&self, axes: &KeyboardAxisState, speed: f32, camera: &mut Camera) {
        let step = axes.direction() * speed;
        camera.position += step;
        camera.target += step;
    }

    /// Applies one frame of pending motion and clamps the resulting distance.
    pub fn update(&mut self, camera: &mut Camera) {
        let offset = camera.position - camera.target;
        let radius = offset.length();
        let (mut theta, mut phi) = if radius > 0.0 {
            (offset.x.atan2(offset.z), (offset.y / radius).clamp(-1.0, 1.0).acos())
        } else {
            (0.0, 0.0)
        };

        let factor = if self.enable_damping {
            self.damping_factor
        } else {
            1.0
        };

        theta += self.spherical_delta.x * factor;
        phi += self.spherical_delta.y * factor;
        phi = phi.clamp(POLAR_EPS, PI - POLAR_EPS);

        let radius = (radius * self.scale).clamp(self.min_distance, self.max_distance);

        camera.target += self.pan_offset * factor;

        let sin_phi = phi.sin();
        let offset = Vec3::new(
            radius * sin_phi * theta.sin(),
            radius * phi.cos(),
            radius * sin_phi * theta.cos(),
        );
        camera.position = camera.target + offset;

        if self.enable_damping {
            self.spherical_delta *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.spherical_delta = Vec2::ZERO;
            self.pan_offset = Vec3::ZERO;
        }
        self.scale = 1.0;
    }

    pub fn is_settled(&self) -> bool {
        self.spherical_delta.length() < 1e-5 && self.pan_offset.length() < 1e-5 && self.scale == 1.0
    }
}
