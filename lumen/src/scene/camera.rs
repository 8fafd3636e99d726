use crate::input::{Event, Key};

use glam::{Mat4, Quat, Vec3, Vec4};
use std::f32::consts::FRAC_PI_2;

const SENSITIVITY: f32 = 400.0;
const SPEED: f32 = 0.2;

pub const FOV_Y_DEGREES: f32 = 70.0;
pub const NEAR_PLANE: f32 = 10000.0;
pub const FAR_PLANE: f32 = 0.1;

/// Free-fly camera driven by WASD and relative pointer motion.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Camera {
    pub velocity: Vec3,
    pub position: Vec3,
    pub pitch: f32,
    pub yaw: f32,
}

impl Camera {
    pub fn new(position: Vec3) -> Self {
        Self { position, ..Default::default() }
    }

    pub fn update(&mut self) {
        let rotation = self.rotation_matrix();
        self.position += (rotation * Vec4::from((self.velocity * SPEED, 0.0))).truncate();
    }

    pub fn process_event(&mut self, event: &Event) {
        match *event {
            Event::KeyDown(key) => self.key_input(key, true),
            Event::KeyUp(key) => self.key_input(key, false),
            Event::PointerMotion { dx, dy } => {
                self.yaw += (dx as f32 / SENSITIVITY).clamp(-FRAC_PI_2, FRAC_PI_2);
                self.pitch -= dy as f32 / SENSITIVITY;
            }
            _ => {}
        }
    }

    fn key_input(&mut self, key: Key, pressed: bool) {
        let amount = |value: f32| if pressed { value } else { 0.0 };
        match key {
            Key::W => self.velocity.z = amount(-1.0),
            Key::S => self.velocity.z = amount(1.0),
            Key::A => self.velocity.x = amount(-1.0),
            Key::D => self.velocity.x = amount(1.0),
            _ => {}
        }
    }

    pub fn view_matrix(&self) -> Mat4 {
        (Mat4::from_translation(self.position) * self.rotation_matrix()).inverse()
    }

    pub fn rotation_matrix(&self) -> Mat4 {
        let pitch = Quat::from_axis_angle(Vec3::X, self.pitch);
        let yaw = Quat::from_axis_angle(Vec3::NEG_Y, self.yaw);
        Mat4::from_quat(yaw) * Mat4::from_quat(pitch)
    }
}

/// Reversed-Z perspective with Y flipped for Vulkan clip space.
pub fn projection(aspect_ratio: f32) -> Mat4 {
    let mut proj = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect_ratio, NEAR_PLANE, FAR_PLANE);
    proj.y_axis.y *= -1.0;
    proj
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_key_moves_along_negative_z() {
        let mut camera = Camera::new(Vec3::new(0.0, 0.0, 5.0));
        camera.process_event(&Event::KeyDown(Key::W));
        camera.update();
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 4.8), 1e-6));

        camera.process_event(&Event::KeyUp(Key::W));
        camera.update();
        assert!(camera.position.abs_diff_eq(Vec3::new(0.0, 0.0, 4.8), 1e-6));
    }

    #[test]
    fn yaw_step_is_clamped() {
        let mut camera = Camera::default();
        camera.process_event(&Event::PointerMotion { dx: 1.0e6, dy: 400.0 });
        assert_eq!(camera.yaw, FRAC_PI_2);
        assert_eq!(camera.pitch, -1.0);
    }

    #[test]
    fn view_inverts_camera_placement() {
        let mut camera = Camera::new(Vec3::new(3.0, -2.0, 7.0));
        camera.yaw = 0.4;
        camera.pitch = -0.2;

        let eye = camera.view_matrix().transform_point3(camera.position);
        assert!(eye.abs_diff_eq(Vec3::ZERO, 1e-5));
    }

    #[test]
    fn projection_is_reversed_z() {
        let proj = projection(1.0);
        let close = proj * Vec4::new(0.0, 0.0, -FAR_PLANE, 1.0);
        let distant = proj * Vec4::new(0.0, 0.0, -NEAR_PLANE, 1.0);
        assert!((close.z / close.w - 1.0).abs() < 1e-4);
        assert!((distant.z / distant.w).abs() < 1e-4);
    }
}
