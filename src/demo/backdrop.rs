//! Full-screen textured quad that zooms between two background images

use crate::input::{Buttons, ControllerState};
use crate::pvr::{
    Color, Device, FrameError, ListKind, PolyContext, StripEmitter, Vec2, Vec3, Vertex, SCREEN_HEIGHT, SCREEN_WIDTH,
};
use super::{in_list, DemoTextures};

pub const INTRO_ZOOM: f32 = 2.0;
pub const ZOOM_STEP: f32 = 0.1;
pub const MIN_ZOOM: f32 = 0.0;
pub const MAX_ZOOM: f32 = 1.1;
/// Above this the zoomed image is shown
pub const ZOOMED_TEXTURE_THRESHOLD: f32 = 1.0;
/// Frames the intro rests at 1.0 before sweeping
pub const HOLD_FRAMES: u32 = 60;
/// Steps from `INTRO_ZOOM` down to 1.0
const SETTLE_STEPS: u32 = 10;

/// Scripted intro, then the pad takes over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomPhase {
    /// From `INTRO_ZOOM` down to 1.0, counting the steps left
    Settle(u32),
    Hold(u32),
    /// Down to `MIN_ZOOM`, as if A were held
    SweepOut,
    /// Up to `MAX_ZOOM`, as if B were held
    SweepIn,
    Interactive,
}

pub struct ZoomBackground {
    pub zoom: f32,
    pub phase: ZoomPhase,
    /// Which image is bound; only changes on zoom steps
    pub zoomed_texture: bool,
}

impl Default for ZoomBackground {
    fn default() -> Self {
        Self::new()
    }
}

impl ZoomBackground {
    pub fn new() -> Self {
        Self { zoom: INTRO_ZOOM, phase: ZoomPhase::Settle(SETTLE_STEPS), zoomed_texture: false }
    }

    pub fn restart(&mut self) {
        *self = Self::new();
    }

    /// A zooms out, B zooms in; A wins when both are held
    fn step(&mut self, buttons: Buttons) {
        if buttons.contains(Buttons::A) {
            self.zoom = (self.zoom - ZOOM_STEP).max(MIN_ZOOM);
        } else if buttons.contains(Buttons::B) {
            self.zoom = (self.zoom + ZOOM_STEP).min(MAX_ZOOM);
        }
        self.zoomed_texture = self.zoom > ZOOMED_TEXTURE_THRESHOLD;
    }

    pub fn update(&mut self, pad: &ControllerState) {
        self.phase = match self.phase {
            ZoomPhase::Settle(n) => {
                let left = n.saturating_sub(1);
                self.zoom = 1.0 + ZOOM_STEP * left as f32;
                if left == 0 { ZoomPhase::Hold(HOLD_FRAMES) } else { ZoomPhase::Settle(left) }
            }
            ZoomPhase::Hold(0) => ZoomPhase::SweepOut,
            ZoomPhase::Hold(n) => ZoomPhase::Hold(n - 1),
            ZoomPhase::SweepOut => {
                self.step(Buttons::A);
                if self.zoom <= MIN_ZOOM { ZoomPhase::SweepIn } else { ZoomPhase::SweepOut }
            }
            ZoomPhase::SweepIn => {
                self.step(Buttons::B);
                if self.zoom >= MAX_ZOOM {
                    log::debug!("zoom background: intro done");
                    ZoomPhase::Interactive
                } else {
                    ZoomPhase::SweepIn
                }
            }
            ZoomPhase::Interactive => {
                self.step(pad.buttons);
                ZoomPhase::Interactive
            }
        };
    }

    /// Quad corners in strip order: top-left, top-right, bottom-left,
    /// bottom-right
    pub fn corners(&self) -> [Vec3; 4] {
        let cx = SCREEN_WIDTH as f32 / 2.0;
        let cy = SCREEN_HEIGHT as f32 / 2.0;
        let hw = SCREEN_WIDTH as f32 * self.zoom / 2.0;
        let hh = SCREEN_HEIGHT as f32 * self.zoom / 2.0;
        [
            Vec3::new(cx - hw, cy - hh, 1.0),
            Vec3::new(cx + hw, cy - hh, 1.0),
            Vec3::new(cx - hw, cy + hh, 1.0),
            Vec3::new(cx + hw, cy + hh, 1.0),
        ]
    }

    pub fn render(&self, dev: &mut Device, textures: &DemoTextures) -> Result<(), FrameError> {
        const UVS: [Vec2; 4] = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.0, 1.0), Vec2::new(1.0, 1.0)];

        let texture = if self.zoomed_texture { &textures.background_zoomed } else { &textures.background_normal };
        let poly = PolyContext::textured(ListKind::Translucent, textures.binding(texture));
        let corners = self.corners();
        let vertices: [Vertex; 4] =
            std::array::from_fn(|i| Vertex::new(corners[i], UVS[i], Color::WHITE, Color::TRANSPARENT));
        // z = 1 against the default greater-or-equal test
        dev.set_clear_depth(0.0);

        in_list(dev, ListKind::Translucent, |dr| {
            let mut em = StripEmitter::new(dr);
            em.emit_face(&poly, &vertices)?;
            em.finish()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::signed_area;

    fn press(buttons: Buttons) -> ControllerState {
        ControllerState { buttons, ..ControllerState::default() }
    }

    fn interactive() -> ZoomBackground {
        let mut bg = ZoomBackground::new();
        let idle = ControllerState::default();
        for _ in 0..1000 {
            if bg.phase == ZoomPhase::Interactive {
                break;
            }
            bg.update(&idle);
        }
        bg
    }

    #[test]
    fn test_intro_runs_through_every_phase() {
        let mut bg = ZoomBackground::new();
        let idle = ControllerState::default();
        let mut seen = vec![ZoomPhase::Settle(0)];
        while bg.phase != ZoomPhase::Interactive {
            bg.update(&idle);
            let kind = match bg.phase {
                ZoomPhase::Settle(_) => ZoomPhase::Settle(0),
                ZoomPhase::Hold(_) => ZoomPhase::Hold(0),
                p => p,
            };
            if seen.last() != Some(&kind) {
                seen.push(kind);
            }
        }
        assert_eq!(
            seen,
            vec![ZoomPhase::Settle(0), ZoomPhase::Hold(0), ZoomPhase::SweepOut, ZoomPhase::SweepIn, ZoomPhase::Interactive]
        );
        assert_eq!(bg.zoom, MAX_ZOOM);
        assert!(bg.zoomed_texture);
    }

    #[test]
    fn test_settle_stops_at_one() {
        let mut bg = ZoomBackground::new();
        for _ in 0..10 {
            bg.update(&ControllerState::default());
        }
        assert_eq!(bg.zoom, 1.0);
        assert_eq!(bg.phase, ZoomPhase::Hold(HOLD_FRAMES));
        assert!(!bg.zoomed_texture);
    }

    #[test]
    fn test_interactive_zoom_clamps() {
        let mut bg = interactive();
        for _ in 0..30 {
            bg.update(&press(Buttons::A));
        }
        assert_eq!(bg.zoom, MIN_ZOOM);
        assert!(!bg.zoomed_texture);
        for _ in 0..30 {
            bg.update(&press(Buttons::B));
        }
        assert_eq!(bg.zoom, MAX_ZOOM);
        assert!(bg.zoomed_texture);
    }

    #[test]
    fn test_a_wins_over_b() {
        let mut bg = interactive();
        let before = bg.zoom;
        bg.update(&press(Buttons::A | Buttons::B));
        assert!(bg.zoom < before);
    }

    #[test]
    fn test_quad_covers_screen_at_unit_zoom() {
        let mut bg = ZoomBackground::new();
        bg.zoom = 1.0;
        let [tl, tr, bl, br] = bg.corners();
        assert_eq!((tl.x, tl.y), (0.0, 0.0));
        assert_eq!((br.x, br.y), (640.0, 480.0));
        assert_eq!((tr.x, bl.y), (640.0, 480.0));
        // Clockwise, so the default culling keeps it
        assert!(signed_area(tl, tr, bl) > 0.0);
    }
}
