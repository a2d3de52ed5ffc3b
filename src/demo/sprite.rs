//! Sprite-mode cube: each face is a single two-burst quad, or a wire
//! outline plus grid built from thin sprite lines

use crate::config::{Config, ControlConfig};
use crate::input::{Buttons, ControllerState};
use crate::pvr::{
    Color, Culling, Device, DrState, EmitError, FrameError, ListKind, SpriteContext, SpriteEmitter, SpriteQuadBuilder,
    SpriteStrategy, TransformContext, Vec3,
};
use super::cube::*;
use super::strip::PerspectiveView;
use super::{in_list, DemoTextures};

/// Sprite line thickness in pixels
pub const LINE_WIDTH: f32 = 1.0;
/// Lines per direction in each wire grid
pub const WIRE_GRID_LINES: usize = 16;
/// Base color of the textured sprite faces
pub const SPRITE_BASE_ARGB: u32 = 0x7FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpriteMode {
    #[default]
    Textured,
    Wireframe,
}

impl SpriteMode {
    pub fn toggled(self) -> SpriteMode {
        match self {
            SpriteMode::Textured => SpriteMode::Wireframe,
            SpriteMode::Wireframe => SpriteMode::Textured,
        }
    }
}

/// One grid across a cube side: lines along both directions between two
/// opposite corners, plus the diagonal
#[derive(Debug, Clone, Copy)]
struct WireGrid {
    min: usize,
    max: usize,
    dir1: Vec3,
    dir2: Vec3,
    face: usize,
}

const X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
const Y: Vec3 = Vec3::new(0.0, 1.0, 0.0);
const Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

const WIRE_GRIDS: [WireGrid; CUBE_FACES] = [
    WireGrid { min: 0, max: 3, dir1: X, dir2: Y, face: 0 },
    WireGrid { min: 4, max: 7, dir1: X, dir2: Y, face: 1 },
    WireGrid { min: 0, max: 4, dir1: X, dir2: Z, face: 5 },
    WireGrid { min: 1, max: 5, dir1: X, dir2: Z, face: 4 },
    WireGrid { min: 4, max: 3, dir1: Z, dir2: Y, face: 3 },
    WireGrid { min: 6, max: 1, dir1: Z, dir2: Y, face: 2 },
];

/// Model-space endpoints of grid line `i` (1-based) along `dir`
fn grid_line(min: Vec3, max: Vec3, dir: Vec3, step: Vec3, i: usize) -> (Vec3, Vec3) {
    let t = i as f32;
    let along = |lo: f32, hi: f32, s: f32, d: f32| -> (f32, f32) {
        let p = lo + t * s * d;
        (p, if d == 0.0 { hi } else { p })
    };
    let (fx, tx) = along(min.x, max.x, step.x, dir.x);
    let (fy, ty) = along(min.y, max.y, step.y, dir.y);
    let (fz, tz) = along(min.z, max.z, step.z, dir.z);
    (Vec3::new(fx, fy, fz), Vec3::new(tx, ty, tz))
}

/// Every segment of a grid in model space
fn grid_segments(min: Vec3, max: Vec3, dir1: Vec3, dir2: Vec3, lines: usize) -> Vec<(Vec3, Vec3)> {
    let step = (max - min) * (1.0 / (lines + 1) as f32);
    let mut segments = Vec::with_capacity(lines * 2 + 1);
    for i in 1..=lines {
        segments.push(grid_line(min, max, dir1, step, i));
        segments.push(grid_line(min, max, dir2, step, i));
    }
    segments.push((min, max));
    segments
}

/// A screen-space line as a thin quad. Endpoints are ordered left to
/// right and the quad extends `LINE_WIDTH` to the side of the line.
pub fn line_quad(from: Vec3, to: Vec3, z_bias: f32) -> SpriteQuadBuilder {
    let (from, to) = if from.x > to.x { (to, from) } else { (from, to) };
    let dx = to.x - from.x;
    let dy = to.y - from.y;
    let len = (dx * dx + dy * dy).sqrt();
    let (nx, ny) = if len == 0.0 { (0.0, 0.0) } else { (dx / len, dy / len) };
    let side = Vec3::new(LINE_WIDTH * ny, -LINE_WIDTH * nx, 0.0);

    let a = Vec3::new(from.x, from.y, from.z + z_bias);
    let b = Vec3::new(to.x, to.y, to.z + z_bias);
    SpriteQuadBuilder::new(a, b, b + side, a + side)
}

/// Alternating textured and wireframe sprite cube
pub struct SpriteCube {
    view: PerspectiveView,
    controls: ControlConfig,
    strategy: SpriteStrategy,
    pub state: CubeState,
    pub mode: SpriteMode,
    ctx: TransformContext,
}

impl SpriteCube {
    pub fn new(config: &Config) -> Self {
        Self {
            view: PerspectiveView::new(config.camera, config.device.width, config.device.height),
            controls: config.controls,
            strategy: config.sprite_strategy,
            state: CubeState::start(config.controls.zoom_range),
            mode: SpriteMode::default(),
            ctx: TransformContext::new(),
        }
    }

    /// `pressed` holds the buttons that went down this frame
    pub fn update(&mut self, pad: &ControllerState, pressed: Buttons) {
        self.view.steer(&mut self.state, pad, &self.controls);
        if pressed.contains(Buttons::DPAD_RIGHT) {
            self.mode = self.mode.toggled();
            log::info!("sprite cube: {:?}", self.mode);
        }
    }

    pub fn render(&mut self, dev: &mut Device, textures: &DemoTextures) -> Result<(), FrameError> {
        self.view.model(&mut self.ctx, &self.state, self.controls.model_scale);
        dev.set_clear_depth(self.view.depth().clear_value());

        let Some(screen) = self.view.project(&self.ctx, &CUBE_VERTICES) else {
            log::trace!("cube behind the eye, nothing drawn");
            return Ok(());
        };
        match self.mode {
            SpriteMode::Textured => {
                let ctx = SpriteContext::textured(ListKind::Translucent, textures.binding(&textures.cube))
                    .with_culling(Culling::None);
                let strategy = self.strategy;
                in_list(dev, ListKind::Translucent, |dr| textured_faces(dr, strategy, &ctx, &screen))
            }
            SpriteMode::Wireframe => {
                let strategy = self.strategy;
                let view = &self.view;
                let ctx = &self.ctx;
                in_list(dev, ListKind::Opaque, |dr| wire_cube(dr, strategy, view, ctx, &screen))
            }
        }
    }
}

fn textured_faces(
    dr: &mut DrState<'_>,
    strategy: SpriteStrategy,
    ctx: &SpriteContext,
    screen: &[Vec3],
) -> Result<(), EmitError> {
    let mut em = SpriteEmitter::new(dr, strategy);
    let base = Color::from_argb(SPRITE_BASE_ARGB);
    for face in 0..CUBE_FACES {
        em.begin_face(&ctx.with_colors(base, side_color(face)))?;
        em.commit_quad(&SpriteQuadBuilder::from_strip(face_strip(screen, face)))?;
    }
    Ok(())
}

fn wire_context(face: usize) -> SpriteContext {
    SpriteContext::colored(ListKind::Opaque, side_color(face)).with_culling(Culling::Small)
}

fn wire_cube(
    dr: &mut DrState<'_>,
    strategy: SpriteStrategy,
    view: &PerspectiveView,
    model: &TransformContext,
    screen: &[Vec3],
) -> Result<(), EmitError> {
    let mut em = SpriteEmitter::new(dr, strategy);

    for face in 0..CUBE_FACES {
        em.begin_face(&wire_context(face))?;
        let [a, d, b, c] = face_strip(screen, face);
        let center_z = (a.z + b.z + c.z + d.z) / 4.0;
        let bias = center_z * 0.1;
        for (from, to) in [(a, d), (b, c), (d, c), (a, b)] {
            em.commit_quad(&line_quad(from, to, bias))?;
        }
    }

    for grid in WIRE_GRIDS {
        em.begin_face(&wire_context(grid.face))?;
        let min = CUBE_VERTICES[grid.min];
        let max = CUBE_VERTICES[grid.max];
        for (from, to) in grid_segments(min, max, grid.dir1, grid.dir2, WIRE_GRID_LINES) {
            // Inside the cube's hull, so on screen whenever the corners are
            if let Some(ends) = view.project(model, &[from, to]) {
                em.commit_quad(&line_quad(ends[0], ends[1], 0.0))?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::{CommandBuffer, InitParams, RenderState, SpriteCorners, StripFlag, Vertex, BURST_BYTES};

    fn run_frame(cube: &mut SpriteCube, config: &Config) -> usize {
        let mut dev = Device::init(config.device.clone()).unwrap();
        let textures = DemoTextures::upload(dev.vram(), &config.textures, &config.noise).unwrap();
        dev.wait_ready().unwrap();
        dev.scene_begin().unwrap();
        cube.render(&mut dev, &textures).unwrap();
        dev.scene_finish().unwrap();
        dev.wait_idle().unwrap();
        let used = dev.stats().vertex_bytes_used;
        textures.release(dev.vram());
        dev.shutdown();
        used
    }

    fn small_config(strategy: SpriteStrategy) -> Config {
        let mut config = Config::default();
        config.device = InitParams { width: 64, height: 48, vram_bytes: 1024 * 1024, ..InitParams::default() };
        config.sprite_strategy = strategy;
        config
    }

    #[test]
    fn test_line_quad_is_ordered_and_offset() {
        let q = line_quad(Vec3::new(10.0, 0.0, 1.0), Vec3::new(0.0, 0.0, 1.0), 0.5);
        let [a, b, c, d] = q.corners;
        assert_eq!(a, Vec3::new(0.0, 0.0, 1.5));
        assert_eq!(b, Vec3::new(10.0, 0.0, 1.5));
        assert_eq!(c, Vec3::new(10.0, -1.0, 1.5));
        assert_eq!(d, Vec3::new(0.0, -1.0, 1.5));
    }

    #[test]
    fn test_point_line_does_not_blow_up() {
        let p = Vec3::new(3.0, 4.0, 1.0);
        let q = line_quad(p, p, 0.0);
        assert!(q.corners.iter().all(|c| c.is_finite()));
    }

    #[test]
    fn test_grid_lines_span_the_side() {
        let min = CUBE_VERTICES[0];
        let max = CUBE_VERTICES[3];
        let segments = grid_segments(min, max, X, Y, 3);
        assert_eq!(segments.len(), 7);
        // Step is 0.5 with three lines across [-1, 1]
        assert_eq!(segments[0], (Vec3::new(-0.5, -1.0, 1.0), Vec3::new(-0.5, 1.0, 1.0)));
        assert_eq!(segments[1], (Vec3::new(-1.0, -0.5, 1.0), Vec3::new(1.0, -0.5, 1.0)));
        assert_eq!(segments[6], (min, max));
    }

    #[test]
    fn test_grid_through_depth_uses_the_z_step() {
        let min = CUBE_VERTICES[4];
        let max = CUBE_VERTICES[3];
        let segments = grid_segments(min, max, Z, Y, 1);
        assert_eq!(segments[0], (Vec3::new(1.0, -1.0, 0.0), Vec3::new(1.0, 1.0, 0.0)));
    }

    #[test]
    fn test_mode_toggles_on_press_only() {
        let mut cube = SpriteCube::new(&Config::default());
        let pad = ControllerState { buttons: Buttons::DPAD_RIGHT, ..ControllerState::default() };
        cube.update(&pad, Buttons::DPAD_RIGHT);
        assert_eq!(cube.mode, SpriteMode::Wireframe);
        cube.update(&pad, Buttons::empty());
        assert_eq!(cube.mode, SpriteMode::Wireframe);
        cube.update(&pad, Buttons::DPAD_RIGHT);
        assert_eq!(cube.mode, SpriteMode::Textured);
    }

    fn projected_cube(config: &Config) -> Vec<Vec3> {
        let mut cube = SpriteCube::new(config);
        cube.view.model(&mut cube.ctx, &cube.state, config.controls.model_scale);
        cube.view.project(&cube.ctx, &CUBE_VERTICES).unwrap()
    }

    fn emit_textured(strategy: SpriteStrategy, screen: &[Vec3]) -> CommandBuffer {
        let ctx = SpriteContext::colored(ListKind::Translucent, Color::WHITE).with_culling(Culling::None);
        let mut buf = CommandBuffer::new(8192);
        {
            let mut dr = DrState::new(&mut buf, ListKind::Translucent);
            textured_faces(&mut dr, strategy, &ctx, screen).unwrap();
        }
        buf
    }

    #[test]
    fn test_sprite_corners_follow_the_strip_table() {
        let screen = projected_cube(&Config::default());
        let buf = emit_textured(SpriteStrategy::BurstPair, &screen);
        let records = buf.list(ListKind::Translucent);
        assert_eq!(records.len(), CUBE_FACES * 3);

        for (face, records) in records.chunks(3).enumerate() {
            assert!(RenderState::decode(&records[0]).is_some_and(|s| s.sprite));
            let [s0, s1, s2, s3] = face_strip(&screen, face);
            let corners = SpriteCorners::decode(&records[1], &records[2]);
            let [a, b, c, d] = corners.pos;
            assert_eq!(a, s0, "face {}", face);
            assert_eq!(b, s2, "face {}", face);
            assert_eq!(c, s3, "face {}", face);
            // D's depth is implied by A, B and C
            assert_eq!((d.x, d.y), (s1.x, s1.y), "face {}", face);
        }
    }

    #[test]
    fn test_triangle_fallback_keeps_strip_order() {
        let screen = projected_cube(&Config::default());
        let buf = emit_textured(SpriteStrategy::Triangles, &screen);
        let records = buf.list(ListKind::Translucent);
        assert_eq!(records.len(), CUBE_FACES * 5);

        for (face, records) in records.chunks(5).enumerate() {
            let strip = face_strip(&screen, face);
            for k in 0..4 {
                let (v, flag) = Vertex::decode(&records[k + 1]);
                assert_eq!((v.pos.x, v.pos.y), (strip[k].x, strip[k].y), "face {} vertex {}", face, k);
                assert_eq!(flag == StripFlag::EndOfStrip, k == 3);
            }
        }
    }

    #[test]
    fn test_textured_faces_are_header_plus_two_bursts() {
        let config = small_config(SpriteStrategy::BurstPair);
        let mut cube = SpriteCube::new(&config);
        assert_eq!(run_frame(&mut cube, &config), CUBE_FACES * 3 * BURST_BYTES);
    }

    #[test]
    fn test_wireframe_record_count() {
        let quads_per_grid = WIRE_GRID_LINES * 2 + 1;

        let config = small_config(SpriteStrategy::BurstPair);
        let mut cube = SpriteCube::new(&config);
        cube.mode = SpriteMode::Wireframe;
        let records = CUBE_FACES * (1 + 4 * 2) + CUBE_FACES * (1 + quads_per_grid * 2);
        assert_eq!(run_frame(&mut cube, &config), records * BURST_BYTES);

        let config = small_config(SpriteStrategy::Triangles);
        let mut cube = SpriteCube::new(&config);
        cube.mode = SpriteMode::Wireframe;
        let records = (CUBE_FACES * 4 + CUBE_FACES * quads_per_grid) * 5;
        assert_eq!(run_frame(&mut cube, &config), records * BURST_BYTES);
    }
}
