//! Procedural value-noise textures
//!
//! A hashed lattice smoothed over its 3x3 neighbourhood, summed over
//! octaves (fBm) and mapped onto a colour ramp. Used to regenerate a small
//! RGB565 texture every frame.

use serde::{Serialize, Deserialize};
use crate::input::{Buttons, ControllerState};
use crate::pvr::{Color, Texture};

/// Edge length of the generated texture
pub const NOISE_TEXTURE_SIZE: usize = 16;

/// Frames before the colour mode can be cycled again
const MODE_COOLDOWN: u32 = 15;
const STICK_DEADZONE: i32 = 16;
const RESET_TRIGGER: i32 = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorMode {
    #[default]
    Fire,
    Smoke,
    Metallic,
}

impl ColorMode {
    pub fn next(self) -> ColorMode {
        match self {
            ColorMode::Fire => ColorMode::Smoke,
            ColorMode::Smoke => ColorMode::Metallic,
            ColorMode::Metallic => ColorMode::Fire,
        }
    }
}

/// How a lattice sample is turned into a continuous value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Sampling {
    /// Weighted 3x3 average at the truncated coordinate (blocky)
    #[default]
    Smooth,
    /// Bicubic interpolation over the surrounding 4x4 lattice
    Bicubic,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub scale: f32,
    /// Amplitude gain per octave
    pub persistence: f32,
    /// Frequency gain per octave
    pub lacunarity: f32,
    pub octaves: u32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub color_mode: ColorMode,
    pub metallic_hue: f32,
    pub sampling: Sampling,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            scale: 32.0,
            persistence: 0.5,
            lacunarity: 2.0,
            octaves: 4,
            offset_x: 0.0,
            offset_y: 0.0,
            color_mode: ColorMode::Fire,
            metallic_hue: 0.0,
            sampling: Sampling::Smooth,
        }
    }
}

/// Pseudo-random value in (-1, 1] for a lattice point
pub fn hash(x: i32, y: i32) -> f32 {
    let n = x.wrapping_add(y.wrapping_mul(1471));
    let n = n.wrapping_shl(13) ^ n;
    let m = n
        .wrapping_mul(n.wrapping_mul(n).wrapping_mul(15731).wrapping_add(789_221))
        .wrapping_add(1_376_312_589)
        & 0x7fff_ffff;
    1.0 - m as f32 / 1_073_741_824.0
}

/// Center weight 4, edges 2, corners 1
pub fn smooth(x: i32, y: i32) -> f32 {
    let corners = hash(x - 1, y - 1) + hash(x + 1, y - 1) + hash(x - 1, y + 1) + hash(x + 1, y + 1);
    let edges = hash(x - 1, y) + hash(x + 1, y) + hash(x, y - 1) + hash(x, y + 1);
    (corners + edges * 2.0 + hash(x, y) * 4.0) / 16.0
}

fn cubic(v0: f32, v1: f32, v2: f32, v3: f32, t: f32) -> f32 {
    let p = (v3 - v2) - (v0 - v1);
    let q = (v0 - v1) - p;
    let r = v2 - v0;
    v1 + r * t + q * t * t + p * t * t * t
}

/// Bicubic interpolation of the raw lattice
pub fn bicubic(x: f32, y: f32) -> f32 {
    let (ix, iy) = (x as i32, y as i32);
    let (fx, fy) = (x - ix as f32, y - iy as f32);
    let column = |i: i32| {
        cubic(
            hash(ix + i - 1, iy - 1),
            hash(ix + i - 1, iy),
            hash(ix + i - 1, iy + 1),
            hash(ix + i - 1, iy + 2),
            fy,
        )
    };
    cubic(column(0), column(1), column(2), column(3), fx)
}

/// Fractal sum over `octaves`, frequency multiplied by `lacunarity` and
/// amplitude by `gain` each step
pub fn fbm(x: f32, y: f32, octaves: u32, lacunarity: f32, gain: f32, sampling: Sampling) -> f32 {
    let mut result = 0.0;
    let mut amplitude = 1.0;
    let mut frequency = 1.0;
    for _ in 0..octaves {
        let (sx, sy) = (x * frequency, y * frequency);
        let v = match sampling {
            Sampling::Smooth => smooth(sx as i32, sy as i32),
            Sampling::Bicubic => bicubic(sx, sy),
        };
        result += v * amplitude;
        frequency *= lacunarity;
        amplitude *= gain;
    }
    result
}

/// RGB565 components
#[derive(Debug, Clone, Copy, PartialEq)]
struct Rgb565(f32, f32, f32);

impl Rgb565 {
    fn blend(self, other: Rgb565, t: f32) -> Rgb565 {
        let l = |a: f32, b: f32| (a + (b - a) * t).floor();
        Rgb565(l(self.0, other.0), l(self.1, other.1), l(self.2, other.2))
    }

    fn to_color(self) -> Color {
        let expand = |c: f32, max: f32| (c.clamp(0.0, max) * 255.0 / max + 0.5) as u8;
        Color::new(expand(self.0, 31.0), expand(self.1, 63.0), expand(self.2, 31.0))
    }
}

const FIRE: [Rgb565; 4] = [
    Rgb565(31.0, 0.0, 0.0),
    Rgb565(31.0, 15.0, 0.0),
    Rgb565(31.0, 31.0, 0.0),
    Rgb565(31.0, 25.0, 20.0),
];

const SMOKE: [Rgb565; 4] = [
    Rgb565(8.0, 8.0, 8.0),
    Rgb565(16.0, 16.0, 16.0),
    Rgb565(24.0, 24.0, 24.0),
    Rgb565(28.0, 28.0, 28.0),
];

fn ramp(colors: &[Rgb565; 4], n: f32) -> Color {
    let c = if n < 0.25 {
        colors[0].blend(colors[1], n / 0.25)
    } else if n < 0.5 {
        colors[1].blend(colors[2], (n - 0.25) / 0.25)
    } else if n < 0.75 {
        colors[2].blend(colors[3], (n - 0.5) / 0.25)
    } else {
        colors[3]
    };
    c.to_color()
}

/// HSV (all components in [0, 1]) to RGB
pub fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Color {
    let i = (h * 6.0) as i32;
    let f = h * 6.0 - i as f32;
    let p = v * (1.0 - s);
    let q = v * (1.0 - f * s);
    let t = v * (1.0 - (1.0 - f) * s);
    let (r, g, b) = match i.rem_euclid(6) {
        0 => (v, t, p),
        1 => (q, v, p),
        2 => (p, v, t),
        3 => (p, q, v),
        4 => (t, p, v),
        _ => (v, p, q),
    };
    Color::from_f32(1.0, r, g, b)
}

impl NoiseParams {
    /// Noise remapped to [0, 1] (before clamping) at texel `(x, y)`
    pub fn sample(&self, x: usize, y: usize) -> f32 {
        let sx = (x as f32 + self.offset_x) / self.scale;
        let sy = (y as f32 + self.offset_y) / self.scale;
        let n = fbm(sx, sy, self.octaves, self.lacunarity, self.persistence, self.sampling);
        (n + 1.0) * 0.5
    }

    pub fn color_at(&self, x: usize, y: usize) -> Color {
        let n = self.sample(x, y);
        match self.color_mode {
            ColorMode::Fire => ramp(&FIRE, n),
            ColorMode::Smoke => ramp(&SMOKE, n),
            ColorMode::Metallic => {
                let hue = (self.metallic_hue + n * 0.5).rem_euclid(1.0);
                hsv_to_rgb(hue, 0.2 + n * 0.3, (0.5 + n * 0.5).min(1.0))
            }
        }
    }

    pub fn reset(&mut self) {
        let sampling = self.sampling;
        *self = Self { sampling, ..Self::default() };
    }
}

/// Render a `size` x `size` noise texture
pub fn generate_texture(params: &NoiseParams, size: usize) -> Texture {
    let mut texture = Texture::new(size, size);
    for y in 0..size {
        for x in 0..size {
            texture.pixels[y * size + x] = params.color_at(x, y);
        }
    }
    texture.name = "noise".to_string();
    texture
}

/// Pad bindings that tweak noise parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseControls {
    cooldown: u32,
    prev: Buttons,
    /// Let the stick pan the noise; off when the stick drives something else
    pub stick_pans: bool,
}

impl NoiseControls {
    pub fn new(stick_pans: bool) -> Self {
        Self { stick_pans, ..Self::default() }
    }

    /// Apply one poll; returns whether anything changed
    pub fn apply(&mut self, params: &mut NoiseParams, pad: &ControllerState) -> bool {
        let before = *params;
        let ab = Buttons::A | Buttons::B;

        if pad.held(ab) && !self.prev.intersects(ab) && self.cooldown == 0 {
            params.color_mode = params.color_mode.next();
            self.cooldown = MODE_COOLDOWN;
            log::debug!("noise colour mode: {:?}", params.color_mode);
        }

        if params.color_mode == ColorMode::Metallic {
            if pad.held(Buttons::X) {
                params.metallic_hue = (params.metallic_hue + 0.02).rem_euclid(1.0);
            }
            if pad.held(Buttons::Y) {
                params.metallic_hue = (params.metallic_hue - 0.02).rem_euclid(1.0);
            }
        }

        if pad.held(Buttons::DPAD_UP) {
            params.scale *= 1.1;
        }
        if pad.held(Buttons::DPAD_DOWN) {
            params.scale *= 0.9;
        }
        if pad.held(Buttons::DPAD_LEFT) {
            params.persistence = (params.persistence - 0.05).max(0.1);
        }
        if pad.held(Buttons::DPAD_RIGHT) {
            params.persistence = (params.persistence + 0.05).min(1.0);
        }

        if pad.held(Buttons::A | Buttons::X) {
            params.lacunarity = (params.lacunarity * 1.1).min(4.0);
        }
        if pad.held(Buttons::A | Buttons::Y) {
            params.lacunarity = (params.lacunarity * 0.9).max(1.0);
        }
        if pad.held(Buttons::B | Buttons::X) {
            params.octaves = (params.octaves + 1).min(8);
        }
        if pad.held(Buttons::B | Buttons::Y) {
            params.octaves = params.octaves.saturating_sub(1).max(1);
        }

        if self.stick_pans && (pad.joy_x.abs() > STICK_DEADZONE || pad.joy_y.abs() > STICK_DEADZONE) {
            params.offset_x += pad.joy_x as f32 / 100.0;
            params.offset_y -= pad.joy_y as f32 / 100.0;
        }

        if pad.ltrig > RESET_TRIGGER && pad.rtrig > RESET_TRIGGER {
            params.reset();
        }

        self.prev = pad.buttons;
        self.cooldown = self.cooldown.saturating_sub(1);
        *params != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(buttons: Buttons) -> ControllerState {
        ControllerState { buttons, ..ControllerState::default() }
    }

    #[test]
    fn test_hash_is_deterministic_and_bounded() {
        for x in -50..50 {
            for y in -50..50 {
                let h = hash(x, y);
                assert_eq!(h, hash(x, y));
                assert!((-1.0..=1.0).contains(&h), "hash({}, {}) = {}", x, y, h);
            }
        }
        assert_ne!(hash(0, 0), hash(1, 0));
    }

    #[test]
    fn test_hash_survives_extreme_inputs() {
        assert!(hash(i32::MAX, i32::MAX).is_finite());
        assert!(hash(i32::MIN, 7).is_finite());
    }

    #[test]
    fn test_generated_texture_is_deterministic() {
        let params = NoiseParams::default();
        let a = generate_texture(&params, NOISE_TEXTURE_SIZE);
        let b = generate_texture(&params, NOISE_TEXTURE_SIZE);
        assert_eq!(a.width, NOISE_TEXTURE_SIZE);
        assert_eq!(a.pixels, b.pixels);

        let moved = NoiseParams { offset_x: 500.0, ..params };
        assert_ne!(generate_texture(&moved, NOISE_TEXTURE_SIZE).pixels, a.pixels);
    }

    #[test]
    fn test_smoke_ramp_is_grey() {
        let params = NoiseParams { color_mode: ColorMode::Smoke, ..NoiseParams::default() };
        let tex = generate_texture(&params, 8);
        for c in &tex.pixels {
            assert!(c.r.abs_diff(c.b) <= 8, "{:?}", c);
        }
    }

    #[test]
    fn test_fire_ramp_keeps_full_red() {
        let tex = generate_texture(&NoiseParams::default(), 8);
        assert!(tex.pixels.iter().all(|c| c.r == 255));
    }

    #[test]
    fn test_hsv_primaries() {
        assert_eq!(hsv_to_rgb(0.0, 1.0, 1.0), Color::new(255, 0, 0));
        assert_eq!(hsv_to_rgb(1.0 / 3.0, 1.0, 1.0), Color::new(0, 255, 0));
        assert_eq!(hsv_to_rgb(0.5, 0.0, 1.0), Color::WHITE);
    }

    #[test]
    fn test_controls_clamp() {
        let mut params = NoiseParams::default();
        let mut controls = NoiseControls::new(true);
        for _ in 0..100 {
            controls.apply(&mut params, &pad(Buttons::DPAD_LEFT | Buttons::A | Buttons::Y));
        }
        assert_eq!(params.persistence, 0.1);
        assert_eq!(params.lacunarity, 1.0);

        for _ in 0..100 {
            controls.apply(&mut params, &pad(Buttons::DPAD_RIGHT | Buttons::B | Buttons::X));
        }
        assert_eq!(params.persistence, 1.0);
        assert_eq!(params.octaves, 8);

        for _ in 0..100 {
            controls.apply(&mut params, &pad(Buttons::B | Buttons::Y));
        }
        assert_eq!(params.octaves, 1);
    }

    #[test]
    fn test_mode_cycles_on_press_edge_with_cooldown() {
        let mut params = NoiseParams::default();
        let mut controls = NoiseControls::new(false);
        let ab = pad(Buttons::A | Buttons::B);
        controls.apply(&mut params, &ab);
        assert_eq!(params.color_mode, ColorMode::Smoke);
        // Held: no repeat
        controls.apply(&mut params, &ab);
        assert_eq!(params.color_mode, ColorMode::Smoke);
        // Released and pressed again inside the cooldown
        controls.apply(&mut params, &pad(Buttons::empty()));
        controls.apply(&mut params, &ab);
        assert_eq!(params.color_mode, ColorMode::Smoke);
        for _ in 0..MODE_COOLDOWN {
            controls.apply(&mut params, &pad(Buttons::empty()));
        }
        controls.apply(&mut params, &ab);
        assert_eq!(params.color_mode, ColorMode::Metallic);
    }

    #[test]
    fn test_both_triggers_reset() {
        let mut params = NoiseParams { scale: 3.0, octaves: 7, offset_x: 12.0, ..NoiseParams::default() };
        let mut controls = NoiseControls::new(true);
        let state = ControllerState { ltrig: 255, rtrig: 255, ..ControllerState::default() };
        assert!(controls.apply(&mut params, &state));
        assert_eq!(params, NoiseParams::default());
    }
}
