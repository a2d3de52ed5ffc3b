//! Application state and demo management
//!
//! Fixed set of demos, each with its own persistent state.
//! Cycle between them with Tab - every demo keeps its pose in the background.

use crate::config::Config;
use crate::demo::{DemoKind, DemoTextures, NoiseCube, SixTextureCube, SpriteCube, TexturedCube, ZoomBackground};
use crate::input::{Buttons, ButtonLatch, ControllerState};
use crate::pvr::{Device, FrameError, SharedVram};

/// Main application state containing all demo states
pub struct AppState {
    /// Currently shown demo
    pub active: DemoKind,

    pub textured_cube: TexturedCube,
    pub six_texture_cube: SixTextureCube,
    pub sprite_cube: SpriteCube,
    pub noise_cube: NoiseCube,
    pub zoom_background: ZoomBackground,

    /// Textures every demo draws from
    pub textures: DemoTextures,

    latch: ButtonLatch,
}

impl AppState {
    pub fn new(config: &Config, textures: DemoTextures) -> Self {
        Self {
            active: config.start_demo,
            textured_cube: TexturedCube::new(config),
            six_texture_cube: SixTextureCube::new(config),
            sprite_cube: SpriteCube::new(config),
            noise_cube: NoiseCube::new(config),
            zoom_background: ZoomBackground::new(),
            textures,
            latch: ButtonLatch::new(),
        }
    }

    pub fn set_active(&mut self, kind: DemoKind) {
        if kind == self.active {
            return;
        }
        self.active = kind;
        if kind == DemoKind::ZoomBackground {
            self.zoom_background.restart();
        }
        log::info!("demo: {}", kind.label());
    }

    pub fn next_demo(&mut self) {
        self.set_active(self.active.next());
    }

    /// Feed one frame of pad state to the active demo. Returns false once
    /// Start is pressed.
    pub fn update(&mut self, pad: &ControllerState) -> bool {
        let pressed = self.latch.update(pad);
        if pad.held(Buttons::START) {
            log::info!("start pressed, exiting");
            return false;
        }
        match self.active {
            DemoKind::TexturedCube => self.textured_cube.update(pad),
            DemoKind::SixTextureCube => self.six_texture_cube.update(pad),
            DemoKind::SpriteCube => self.sprite_cube.update(pad, pressed),
            DemoKind::NoiseCube => self.noise_cube.update(pad),
            DemoKind::ZoomBackground => self.zoom_background.update(pad),
        }
        true
    }

    /// Build one scene for the active demo and hand it to the device. A
    /// failed scene is aborted so the next frame starts clean.
    pub fn render_frame(&mut self, dev: &mut Device) -> Result<(), FrameError> {
        dev.wait_ready()?;
        dev.scene_begin()?;
        let result = self.render_scene(dev).and_then(|()| dev.scene_finish().map_err(FrameError::from));
        if let Err(e) = &result {
            log::error!("{}: {}", self.active.label(), e);
            dev.abort_scene();
        }
        result
    }

    fn render_scene(&mut self, dev: &mut Device) -> Result<(), FrameError> {
        let textures = &self.textures;
        match self.active {
            DemoKind::TexturedCube => self.textured_cube.render(dev, textures),
            DemoKind::SixTextureCube => self.six_texture_cube.render(dev, textures),
            DemoKind::SpriteCube => self.sprite_cube.render(dev, textures),
            DemoKind::NoiseCube => self.noise_cube.render(dev, textures),
            DemoKind::ZoomBackground => self.zoom_background.render(dev, textures),
        }
    }

    /// Hand the demo textures back to device memory
    pub fn release(self, vram: &SharedVram) {
        self.textures.release(vram);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::InitParams;

    fn setup() -> (Device, AppState) {
        let mut config = Config::default();
        config.device = InitParams { width: 64, height: 48, vram_bytes: 1024 * 1024, ..InitParams::default() };
        let dev = Device::init(config.device.clone()).unwrap();
        let textures = DemoTextures::upload(dev.vram(), &config.textures, &config.noise).unwrap();
        (dev, AppState::new(&config, textures))
    }

    #[test]
    fn test_start_exits() {
        let (dev, mut app) = setup();
        assert!(app.update(&ControllerState::default()));
        let start = ControllerState { buttons: Buttons::START, ..ControllerState::default() };
        assert!(!app.update(&start));
        app.release(dev.vram());
        dev.shutdown();
    }

    #[test]
    fn test_every_demo_renders_a_frame() {
        let (mut dev, mut app) = setup();
        let idle = ControllerState::default();
        for kind in DemoKind::ALL {
            app.set_active(kind);
            assert!(app.update(&idle));
            app.render_frame(&mut dev).unwrap();
        }
        dev.wait_idle().unwrap();
        assert_eq!(dev.stats().frame_count, DemoKind::ALL.len() as u64);
        app.release(dev.vram());
        dev.shutdown();
    }

    #[test]
    fn test_demo_cycle_restarts_zoom_intro() {
        let (dev, mut app) = setup();
        app.zoom_background.zoom = 0.5;
        while app.active != DemoKind::ZoomBackground {
            app.next_demo();
        }
        assert_eq!(app.zoom_background.zoom, crate::demo::INTRO_ZOOM);
        app.release(dev.vram());
        dev.shutdown();
    }
}
