//! Strip-mode cubes: one header plus a 4-vertex strip per face

use std::sync::PoisonError;
use crate::config::{CameraConfig, Config, ControlConfig, DirectConfig};
use crate::input::{Buttons, ControllerState};
use crate::noise::{generate_texture, NoiseControls, NoiseParams, NOISE_TEXTURE_SIZE};
use crate::pvr::{
    BlendFactor, Camera, Color, Culling, DepthMapping, Device, DrState, EmitError, FrameError, ListKind, PolyContext,
    ProjectionMode, StripEmitter, TransformContext, Vec3, Vertex, VertexMapper,
};
use super::cube::*;
use super::{in_list, DemoTextures, NOISE_SLOTS};

pub const MIN_FOV: f32 = 1.0;
pub const MAX_FOV: f32 = 179.0;

/// Perspective camera plus the homogeneous mapper that goes with it
pub struct PerspectiveView {
    config: CameraConfig,
    width: usize,
    height: usize,
    camera: Camera,
    mapper: VertexMapper,
}

impl PerspectiveView {
    pub fn new(config: CameraConfig, width: usize, height: usize) -> Self {
        Self {
            config,
            width,
            height,
            camera: Camera::build(config.params(width, height)),
            mapper: VertexMapper::new(ProjectionMode::Homogeneous, config.depth),
        }
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn depth(&self) -> DepthMapping {
        self.mapper.depth
    }

    pub fn fov(&self) -> f32 {
        self.camera.params().fov_y_degrees
    }

    /// Rebuild the camera with the field of view moved by `delta` degrees
    pub fn adjust_fov(&mut self, delta: f32) {
        let fov = (self.fov() + delta).clamp(MIN_FOV, MAX_FOV);
        if fov != self.fov() {
            self.camera = self.camera.with_fov(fov);
            log::debug!("fov = {:.1}", fov);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.config, self.width, self.height);
    }

    /// Transform and map `points`. `None` when any of them ends up at or
    /// behind the eye, where the divide is meaningless.
    pub fn project(&self, ctx: &TransformContext, points: &[Vec3]) -> Option<Vec<Vec3>> {
        let clip = ctx.transform(points);
        if clip.iter().any(|p| p.w <= 0.0) {
            return None;
        }
        Some(clip.into_iter().map(|p| self.mapper.map(p)).collect())
    }

    /// Move and spin the cube from the pad. D-pad left resets pose and
    /// camera, up/down widen or narrow the field of view.
    pub fn steer(&mut self, state: &mut CubeState, pad: &ControllerState, controls: &ControlConfig) {
        state.apply_input(pad, controls, PoseSpace::Perspective);
        if pad.held(Buttons::DPAD_LEFT) {
            self.reset();
            *state = CubeState::start(controls.zoom_range);
        }
        if pad.held(Buttons::DPAD_DOWN) {
            self.adjust_fov(-1.0);
        }
        if pad.held(Buttons::DPAD_UP) {
            self.adjust_fov(1.0);
        }
        state.spin(controls);
    }

    /// Load the camera and compose the cube's model transform
    pub fn model(&self, ctx: &mut TransformContext, state: &CubeState, scale: f32) {
        ctx.load(&self.camera);
        ctx.translate(state.pos.x, state.pos.y, state.pos.z);
        ctx.scale(scale, scale, scale);
        ctx.rotate_x(state.rot_x);
        ctx.rotate_y(state.rot_y);
    }
}

/// Screen-space projection: the model transform yields pixels directly
pub struct DirectView {
    mapper: VertexMapper,
}

impl DirectView {
    pub fn new(config: &DirectConfig) -> Self {
        Self {
            mapper: VertexMapper::new(
                ProjectionMode::Direct { offset_x: config.offset_x, offset_y: config.offset_y },
                config.depth,
            ),
        }
    }

    pub fn depth(&self) -> DepthMapping {
        self.mapper.depth
    }

    /// Compose translate, rotate, then the zoom scale. Y is flipped so the
    /// model's up points up the screen.
    pub fn model(&self, ctx: &mut TransformContext, state: &CubeState, zoom_scale: f32) {
        ctx.identity();
        ctx.translate(state.pos.x, state.pos.y, state.pos.z);
        ctx.rotate_x(state.rot_x);
        ctx.rotate_y(state.rot_y);
        ctx.scale(zoom_scale, -zoom_scale, zoom_scale);
    }

    pub fn project(&self, ctx: &TransformContext, points: &[Vec3]) -> Vec<Vec3> {
        self.mapper.transform(ctx, points)
    }
}

/// Single shared texture, recoloured per face through the offset color
pub struct TexturedCube {
    view: PerspectiveView,
    controls: ControlConfig,
    pub state: CubeState,
    ctx: TransformContext,
}

impl TexturedCube {
    pub fn new(config: &Config) -> Self {
        Self {
            view: PerspectiveView::new(config.camera, config.device.width, config.device.height),
            controls: config.controls,
            state: CubeState::start(config.controls.zoom_range),
            ctx: TransformContext::new(),
        }
    }

    pub fn view(&self) -> &PerspectiveView {
        &self.view
    }

    pub fn update(&mut self, pad: &ControllerState) {
        self.view.steer(&mut self.state, pad, &self.controls);
    }

    pub fn render(&mut self, dev: &mut Device, textures: &DemoTextures) -> Result<(), FrameError> {
        self.view.model(&mut self.ctx, &self.state, self.controls.model_scale);
        let depth = self.view.depth();
        dev.set_clear_depth(depth.clear_value());

        let Some(screen) = self.view.project(&self.ctx, &CUBE_VERTICES) else {
            log::trace!("cube behind the eye, nothing drawn");
            return Ok(());
        };
        let poly = PolyContext::textured(ListKind::Translucent, textures.binding(&textures.cube))
            .with_culling(Culling::None)
            .with_specular(true)
            .with_depth(depth.compare(), true);
        let base = Color::from_argb(CUBE_BASE_ARGB);

        in_list(dev, ListKind::Translucent, |dr| {
            let mut em = StripEmitter::new(dr);
            for face in 0..CUBE_FACES {
                let strip = face_strip(&screen, face);
                let vertices: [Vertex; 4] = std::array::from_fn(|j| {
                    Vertex::new(strip[j], CUBE_TEX_COORDS[j], base, side_color(face))
                });
                em.emit_face(&poly, &vertices)?;
            }
            em.finish()
        })
    }
}

/// Emit the cube with a separate texture on every face
fn emit_faces(
    dev: &mut Device,
    list: ListKind,
    screen: &[Vec3],
    contexts: &[PolyContext; CUBE_FACES],
    argb: Color,
) -> Result<(), FrameError> {
    in_list(dev, list, |dr| strip_faces(dr, screen, contexts, argb))
}

/// One header and one strip per face, vertices gathered through
/// `CUBE_SIDE_STRIPS`
fn strip_faces(
    dr: &mut DrState<'_>,
    screen: &[Vec3],
    contexts: &[PolyContext; CUBE_FACES],
    argb: Color,
) -> Result<(), EmitError> {
    let mut em = StripEmitter::new(dr);
    for (face, poly) in contexts.iter().enumerate() {
        let strip = face_strip(screen, face);
        let vertices: [Vertex; 4] = std::array::from_fn(|j| {
            Vertex::new(strip[j], UPRIGHT_TEX_COORDS[j], argb, Color::TRANSPARENT)
        });
        em.emit_face(poly, &vertices)?;
    }
    em.finish()
}

fn face_contexts(textures: &DemoTextures, list: ListKind, depth: DepthMapping) -> [PolyContext; CUBE_FACES] {
    std::array::from_fn(|face| {
        PolyContext::textured(list, textures.binding(&textures.faces[face]))
            .with_culling(Culling::Ccw)
            .with_depth(depth.compare(), true)
    })
}

/// Screen-space cube with one texture per face, opaque, back faces culled
pub struct SixTextureCube {
    view: DirectView,
    controls: ControlConfig,
    zoom_numerator: f32,
    pub state: CubeState,
    ctx: TransformContext,
}

impl SixTextureCube {
    pub fn new(config: &Config) -> Self {
        Self {
            view: DirectView::new(&config.direct),
            controls: config.controls,
            zoom_numerator: config.direct.zoom_numerator,
            state: CubeState::start(config.controls.direct_zoom_range),
            ctx: TransformContext::new(),
        }
    }

    pub fn update(&mut self, pad: &ControllerState) {
        self.state.spin(&self.controls);
        self.state.apply_input(pad, &self.controls, PoseSpace::Direct);
        if pad.held(Buttons::DPAD_LEFT) {
            self.state = CubeState::start(self.controls.direct_zoom_range);
        }
    }

    pub fn render(&mut self, dev: &mut Device, textures: &DemoTextures) -> Result<(), FrameError> {
        let zoom = self.state.zoom_scale(self.zoom_numerator);
        self.view.model(&mut self.ctx, &self.state, zoom);
        let screen = self.view.project(&self.ctx, &CUBE_VERTICES);
        let depth = self.view.depth();
        dev.set_clear_depth(depth.clear_value());

        let contexts = face_contexts(textures, ListKind::Opaque, depth);
        emit_faces(dev, ListKind::Opaque, &screen, &contexts, Color::WHITE)
    }
}

/// Opaque six-texture cube under a translucent cube whose noise texture
/// is regenerated every frame. The regenerated texels go to the slot the
/// previous frame did not bind, so the frame still being drawn keeps its
/// own noise.
pub struct NoiseCube {
    view: DirectView,
    controls: ControlConfig,
    zoom_numerator: f32,
    pub state: CubeState,
    pub noise: NoiseParams,
    noise_controls: NoiseControls,
    /// Noise texture slot bound by the last rendered frame
    noise_slot: usize,
    ctx: TransformContext,
}

impl NoiseCube {
    /// Noise drift per frame
    const DRIFT: f32 = 0.01;

    pub fn new(config: &Config) -> Self {
        Self {
            view: DirectView::new(&config.direct),
            controls: config.controls,
            zoom_numerator: config.direct.noise_zoom_numerator,
            state: CubeState::start(config.controls.direct_zoom_range),
            noise: config.noise,
            noise_controls: NoiseControls::new(false),
            noise_slot: 0,
            ctx: TransformContext::new(),
        }
    }

    pub fn update(&mut self, pad: &ControllerState) {
        self.state.rotate_with_stick(pad, &self.controls);
        self.state.apply_zoom(pad, &self.controls, PoseSpace::Direct);
        if self.noise_controls.apply(&mut self.noise, pad) {
            log::debug!("noise parameters: {:?}", self.noise);
        }
        self.noise.offset_y += Self::DRIFT;
    }

    pub fn render(&mut self, dev: &mut Device, textures: &DemoTextures) -> Result<(), FrameError> {
        self.noise_slot = (self.noise_slot + 1) % NOISE_SLOTS;
        let noise_texture = &textures.noise[self.noise_slot];
        let texels = generate_texture(&self.noise, NOISE_TEXTURE_SIZE);
        {
            let mut vram = dev.vram().write().unwrap_or_else(PoisonError::into_inner);
            if !vram.update(noise_texture, &texels) {
                log::warn!("noise texture is no longer resident");
            }
        }

        let zoom = self.state.zoom_scale(self.zoom_numerator);
        self.view.model(&mut self.ctx, &self.state, zoom);
        let screen = self.view.project(&self.ctx, &CUBE_VERTICES);
        let depth = self.view.depth();
        dev.set_clear_depth(depth.clear_value());

        let opaque = face_contexts(textures, ListKind::Opaque, depth);
        emit_faces(dev, ListKind::Opaque, &screen, &opaque, Color::WHITE)?;

        let overlay = PolyContext::textured(ListKind::Translucent, textures.binding(noise_texture))
            .with_culling(Culling::Ccw)
            .with_blend(BlendFactor::SrcAlpha, BlendFactor::OtherColor)
            .with_depth(depth.compare(), true);
        let translucent = [overlay; CUBE_FACES];
        emit_faces(dev, ListKind::Translucent, &screen, &translucent, Color::from_f32(0.5, 1.0, 1.0, 1.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::{signed_area, CommandBuffer, InitParams, RenderState, StripFlag};

    fn small_config() -> Config {
        let mut config = Config::default();
        config.device = InitParams {
            width: 64,
            height: 48,
            vertex_buffer_bytes: 16 * 1024,
            vram_bytes: 1024 * 1024,
            ..InitParams::default()
        };
        config
    }

    fn frame<F>(dev: &mut Device, f: F)
    where
        F: FnOnce(&mut Device) -> Result<(), FrameError>,
    {
        dev.wait_ready().unwrap();
        dev.scene_begin().unwrap();
        f(dev).unwrap();
        dev.scene_finish().unwrap();
        dev.wait_idle().unwrap();
    }

    #[test]
    fn test_front_face_is_clockwise_in_both_views() {
        let config = Config::default();
        let unturned = CubeState { rot_x: 0.0, rot_y: 0.0, ..CubeState::start(config.controls.zoom_range) };
        let mut ctx = TransformContext::new();

        let perspective = PerspectiveView::new(config.camera, 640, 480);
        perspective.model(&mut ctx, &unturned, 3.0);
        let screen = perspective.project(&ctx, &CUBE_VERTICES).unwrap();
        let [a, b, c, _] = face_strip(&screen, 0);
        assert!(signed_area(a, b, c) > 0.0);

        let direct = DirectView::new(&config.direct);
        let unturned = CubeState { rot_x: 0.0, rot_y: 0.0, ..CubeState::start(config.controls.direct_zoom_range) };
        direct.model(&mut ctx, &unturned, 20.0);
        let screen = direct.project(&ctx, &CUBE_VERTICES);
        let [a, b, c, _] = face_strip(&screen, 0);
        assert!(signed_area(a, b, c) > 0.0);
        let [a, b, c, _] = face_strip(&screen, 1);
        assert!(signed_area(a, b, c) < 0.0);
    }

    #[test]
    fn test_behind_the_eye_is_not_projected() {
        let config = Config::default();
        let view = PerspectiveView::new(config.camera, 640, 480);
        let mut ctx = TransformContext::new();
        let state = CubeState { pos: Vec3::new(0.0, 0.0, 30.0), ..CubeState::start(config.controls.zoom_range) };
        view.model(&mut ctx, &state, 3.0);
        assert!(view.project(&ctx, &CUBE_VERTICES).is_none());
    }

    #[test]
    fn test_fov_stays_in_range() {
        let mut view = PerspectiveView::new(CameraConfig::default(), 640, 480);
        for _ in 0..500 {
            view.adjust_fov(1.0);
        }
        assert_eq!(view.fov(), MAX_FOV);
        view.reset();
        assert_eq!(view.fov(), 45.0);
    }

    #[test]
    fn test_face_vertices_follow_the_strip_table() {
        let config = Config::default();
        let mut cube = SixTextureCube::new(&config);
        let zoom = cube.state.zoom_scale(cube.zoom_numerator);
        cube.view.model(&mut cube.ctx, &cube.state, zoom);
        let screen = cube.view.project(&cube.ctx, &CUBE_VERTICES);
        let contexts = [PolyContext::colored(ListKind::Opaque).with_culling(Culling::Ccw); CUBE_FACES];

        let mut buf = CommandBuffer::new(4096);
        {
            let mut dr = DrState::new(&mut buf, ListKind::Opaque);
            strip_faces(&mut dr, &screen, &contexts, Color::WHITE).unwrap();
        }
        let records = buf.list(ListKind::Opaque);
        assert_eq!(records.len(), CUBE_FACES * 5);

        for (face, records) in records.chunks(5).enumerate() {
            assert!(RenderState::decode(&records[0]).is_some());
            for k in 0..4 {
                let (v, flag) = Vertex::decode(&records[k + 1]);
                let model = CUBE_VERTICES[CUBE_SIDE_STRIPS[face][k]];
                assert_eq!(v.pos, cube.view.mapper.map(cube.ctx.transform_point(model)), "face {} vertex {}", face, k);
                assert_eq!(flag == StripFlag::EndOfStrip, k == 3, "face {} vertex {}", face, k);
            }
        }
    }

    #[test]
    fn test_noise_slots_alternate_between_frames() {
        let config = small_config();
        let mut dev = Device::init(config.device.clone()).unwrap();
        let textures = DemoTextures::upload(dev.vram(), &config.textures, &config.noise).unwrap();
        let stored = |dev: &Device, slot: usize| {
            let vram = dev.vram().read().unwrap();
            let pixels = vram.texture(textures.noise[slot].addr()).unwrap().pixels.clone();
            pixels
        };

        let mut noise = NoiseCube::new(&config);
        noise.noise.offset_y = 5.0;
        frame(&mut dev, |dev| noise.render(dev, &textures));
        let first_slot = noise.noise_slot;
        let first = stored(&dev, first_slot);

        noise.noise.offset_y = 50.0;
        frame(&mut dev, |dev| noise.render(dev, &textures));
        assert_ne!(noise.noise_slot, first_slot);
        // The previous frame's texels are left alone
        assert_eq!(stored(&dev, first_slot), first);
        assert_ne!(stored(&dev, noise.noise_slot), first);

        textures.release(dev.vram());
        dev.shutdown();
    }

    #[test]
    fn test_demos_build_complete_frames() {
        let config = small_config();
        let mut dev = Device::init(config.device.clone()).unwrap();
        let textures = DemoTextures::upload(dev.vram(), &config.textures, &config.noise).unwrap();

        let mut textured = TexturedCube::new(&config);
        frame(&mut dev, |dev| textured.render(dev, &textures));
        // Header + 4 vertices per face
        assert_eq!(dev.stats().vertex_bytes_used, CUBE_FACES * 5 * 32);

        let mut six = SixTextureCube::new(&config);
        frame(&mut dev, |dev| six.render(dev, &textures));
        assert_eq!(dev.stats().vertex_bytes_used, CUBE_FACES * 5 * 32);

        let mut noise = NoiseCube::new(&config);
        noise.update(&ControllerState::default());
        frame(&mut dev, |dev| noise.render(dev, &textures));
        assert_eq!(dev.stats().vertex_bytes_used, 2 * CUBE_FACES * 5 * 32);
        assert_eq!(dev.stats().frame_count, 3);

        textures.release(dev.vram());
        dev.shutdown();
    }
}
