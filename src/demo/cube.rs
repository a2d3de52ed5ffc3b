//! Cube geometry and pose
//!
//! ```text
//!      7*-----------*5
//!      /|          /|
//!     / |         / |
//!   1*===========*3 |
//!    I  |        I  |
//!    I 6*--------I--*4
//!    I /         I /
//!    I/          I/
//!   0*===========*2
//! ```

use std::f32::consts::TAU;
use crate::config::ControlConfig;
use crate::input::{Buttons, ControllerState};
use crate::pvr::{Color, Vec2, Vec3};

pub const CUBE_EXTENT: f32 = 1.0;
pub const CUBE_FACES: usize = 6;

pub const CUBE_VERTICES: [Vec3; 8] = [
    Vec3::new(-CUBE_EXTENT, -CUBE_EXTENT, CUBE_EXTENT),
    Vec3::new(-CUBE_EXTENT, CUBE_EXTENT, CUBE_EXTENT),
    Vec3::new(CUBE_EXTENT, -CUBE_EXTENT, CUBE_EXTENT),
    Vec3::new(CUBE_EXTENT, CUBE_EXTENT, CUBE_EXTENT),
    Vec3::new(CUBE_EXTENT, -CUBE_EXTENT, -CUBE_EXTENT),
    Vec3::new(CUBE_EXTENT, CUBE_EXTENT, -CUBE_EXTENT),
    Vec3::new(-CUBE_EXTENT, -CUBE_EXTENT, -CUBE_EXTENT),
    Vec3::new(-CUBE_EXTENT, CUBE_EXTENT, -CUBE_EXTENT),
];

/// Per face, vertex indices in strip order: (0 1 2) then (2 1 3)
pub const CUBE_SIDE_STRIPS: [[usize; 4]; CUBE_FACES] = [
    [0, 1, 2, 3], // front
    [4, 5, 6, 7], // back
    [6, 7, 0, 1], // left
    [2, 3, 4, 5], // right
    [1, 7, 3, 5], // top
    [6, 0, 4, 2], // bottom
];

/// Per-face offset colors (ARGB)
pub const CUBE_SIDE_COLORS: [u32; CUBE_FACES] = [
    0x7FF0_0000, // red
    0x7F00_7F00, // green
    0x7F00_007F, // blue
    0x7F7F_7F00, // yellow
    0x7F7F_007F, // magenta
    0x7F00_7F7F, // cyan
];

/// Texture coordinates by strip position
pub const CUBE_TEX_COORDS: [Vec2; 4] = [
    Vec2::new(0.0, 0.0),
    Vec2::new(0.0, 1.0),
    Vec2::new(1.0, 0.0),
    Vec2::new(1.0, 1.0),
];

/// Texture coordinates by strip position with the image upright once the
/// face is on screen
pub const UPRIGHT_TEX_COORDS: [Vec2; 4] = [
    Vec2::new(0.0, 1.0),
    Vec2::new(0.0, 0.0),
    Vec2::new(1.0, 1.0),
    Vec2::new(1.0, 0.0),
];

/// Base color of the single-texture cube
pub const CUBE_BASE_ARGB: u32 = 0xCFFF_FFFF;

pub fn side_color(face: usize) -> Color {
    Color::from_argb(CUBE_SIDE_COLORS[face])
}

/// Gather one face's strip from already transformed vertices
pub fn face_strip<T: Copy>(transformed: &[T], face: usize) -> [T; 4] {
    CUBE_SIDE_STRIPS[face].map(|i| transformed[i])
}

/// How stick and trigger input moves the cube
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoseSpace {
    /// World units in front of a perspective camera
    Perspective,
    /// Screen pixels, with z only feeding the zoom scale
    Direct,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CubeState {
    pub pos: Vec3,
    pub rot_x: f32,
    pub rot_y: f32,
    pub speed_x: f32,
    pub speed_y: f32,
}

impl CubeState {
    /// Centred in the zoom range, turned slightly so three faces show
    pub fn start(zoom_range: (f32, f32)) -> Self {
        Self {
            pos: Vec3::new(0.0, 0.0, (zoom_range.0 + zoom_range.1) / 2.0),
            rot_x: 0.5,
            rot_y: 0.5,
            speed_x: 0.0,
            speed_y: 0.0,
        }
    }

    /// Stick translates, triggers zoom, face buttons change spin speed
    pub fn apply_input(&mut self, pad: &ControllerState, controls: &ControlConfig, space: PoseSpace) {
        let deadzone = controls.stick_deadzone;
        if pad.joy_x.abs() > deadzone {
            self.pos.x += pad.joy_x as f32 / 32768.0 * controls.stick_sensitivity(space);
        }
        if pad.joy_y.abs() > deadzone {
            let dy = pad.joy_y as f32 / 32768.0 * controls.stick_sensitivity(space);
            match space {
                PoseSpace::Perspective => self.pos.y += dy,
                PoseSpace::Direct => self.pos.y -= dy,
            }
        }
        self.apply_zoom(pad, controls, space);

        if pad.held(Buttons::X) {
            self.speed_x += controls.spin_step;
        }
        if pad.held(Buttons::Y) {
            self.speed_x -= controls.spin_step;
        }
        if pad.held(Buttons::A) {
            self.speed_y += controls.spin_step;
        }
        if pad.held(Buttons::B) {
            self.speed_y -= controls.spin_step;
        }
    }

    /// Triggers move along z, clamped to the space's zoom range
    pub fn apply_zoom(&mut self, pad: &ControllerState, controls: &ControlConfig, space: PoseSpace) {
        let (speed, (min, max)) = match space {
            PoseSpace::Perspective => (controls.zoom_speed, controls.zoom_range),
            PoseSpace::Direct => (controls.direct_zoom_speed, controls.direct_zoom_range),
        };
        if pad.ltrig > controls.stick_deadzone {
            self.pos.z -= pad.ltrig as f32 / 255.0 * speed;
        }
        if pad.rtrig > controls.stick_deadzone {
            self.pos.z += pad.rtrig as f32 / 255.0 * speed;
        }
        self.pos.z = self.pos.z.clamp(min, max);
    }

    /// Stick turns the cube directly; angles wrap at a full turn
    pub fn rotate_with_stick(&mut self, pad: &ControllerState, controls: &ControlConfig) {
        let deadzone = controls.stick_deadzone;
        if pad.joy_x.abs() > deadzone || pad.joy_y.abs() > deadzone {
            self.rot_x = wrap_angle(self.rot_x + pad.joy_y as f32 / 128.0 * controls.stick_rotation);
            self.rot_y = wrap_angle(self.rot_y + pad.joy_x as f32 / 128.0 * controls.stick_rotation);
        }
    }

    /// Advance rotation by the spin speed, then apply friction
    pub fn spin(&mut self, controls: &ControlConfig) {
        self.rot_x += self.speed_x;
        self.rot_y += self.speed_y;
        self.speed_x *= controls.friction;
        self.speed_y *= controls.friction;
        if self.speed_x.abs() < controls.spin_epsilon {
            self.speed_x = 0.0;
        }
        if self.speed_y.abs() < controls.spin_epsilon {
            self.speed_y = 0.0;
        }
    }

    /// Model scale of the direct demos; z is always negative there
    pub fn zoom_scale(&self, numerator: f32) -> f32 {
        numerator / -self.pos.z
    }
}

fn wrap_angle(a: f32) -> f32 {
    if a > TAU || a < -TAU {
        a % TAU
    } else {
        a
    }
}

impl ControlConfig {
    pub fn stick_sensitivity(&self, space: PoseSpace) -> f32 {
        match space {
            PoseSpace::Perspective => self.stick_sensitivity,
            PoseSpace::Direct => self.direct_stick_sensitivity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triggers(ltrig: i32, rtrig: i32) -> ControllerState {
        ControllerState { ltrig, rtrig, ..ControllerState::default() }
    }

    #[test]
    fn test_zoom_clamps_to_range() {
        let controls = ControlConfig::default();
        let mut cube = CubeState::start(controls.zoom_range);
        cube.pos.z = 14.9;
        for _ in 0..10 {
            cube.apply_input(&triggers(0, 255), &controls, PoseSpace::Perspective);
        }
        assert_eq!(cube.pos.z, 15.0);
        for _ in 0..200 {
            cube.apply_input(&triggers(255, 0), &controls, PoseSpace::Perspective);
        }
        assert_eq!(cube.pos.z, -10.0);
    }

    #[test]
    fn test_direct_zoom_never_reaches_zero() {
        let controls = ControlConfig::default();
        let mut cube = CubeState::start(controls.direct_zoom_range);
        for _ in 0..200 {
            cube.apply_zoom(&triggers(0, 255), &controls, PoseSpace::Direct);
        }
        assert_eq!(cube.pos.z, -0.5);
        assert_eq!(cube.zoom_scale(100.0), 200.0);
    }

    #[test]
    fn test_small_triggers_are_ignored() {
        let controls = ControlConfig::default();
        let mut cube = CubeState::start(controls.zoom_range);
        let z = cube.pos.z;
        cube.apply_input(&triggers(10, 10), &controls, PoseSpace::Perspective);
        assert_eq!(cube.pos.z, z);
    }

    #[test]
    fn test_spin_decays_to_rest() {
        let controls = ControlConfig::default();
        let mut cube = CubeState::start(controls.zoom_range);
        let pad = ControllerState { buttons: Buttons::X | Buttons::B, ..ControllerState::default() };
        for _ in 0..10 {
            cube.apply_input(&pad, &controls, PoseSpace::Perspective);
        }
        assert!(cube.speed_x > 0.0);
        assert!(cube.speed_y < 0.0);
        for _ in 0..2000 {
            cube.spin(&controls);
        }
        assert_eq!(cube.speed_x, 0.0);
        assert_eq!(cube.speed_y, 0.0);
    }

    #[test]
    fn test_face_strips_cover_every_vertex_three_times() {
        let mut uses = [0; 8];
        for strip in CUBE_SIDE_STRIPS {
            for i in strip {
                uses[i] += 1;
            }
        }
        assert_eq!(uses, [3; 8]);
    }
}
