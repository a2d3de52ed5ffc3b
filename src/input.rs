//! Controller polling
//!
//! The demos read a single virtual pad once per frame. On the desktop the
//! pad is driven from the keyboard:
//!
//! | Pad          | Key          |
//! |--------------|--------------|
//! | Stick        | W A S D      |
//! | L / R trigger| Q / E        |
//! | A B X Y      | J K U I      |
//! | D-pad        | arrow keys   |
//! | Start        | Escape       |

use bitflags::bitflags;
use macroquad::prelude::*;

/// Full stick deflection
pub const STICK_MAX: i32 = 127;
/// Fully pulled trigger
pub const TRIGGER_MAX: i32 = 255;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Buttons: u32 {
        const A = 1 << 0;
        const B = 1 << 1;
        const X = 1 << 2;
        const Y = 1 << 3;
        const START = 1 << 4;
        const DPAD_UP = 1 << 5;
        const DPAD_DOWN = 1 << 6;
        const DPAD_LEFT = 1 << 7;
        const DPAD_RIGHT = 1 << 8;
    }
}

/// One poll of the pad. Stick axes are in `-128..=127` (positive is right
/// and down), triggers in `0..=255`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerState {
    pub buttons: Buttons,
    pub joy_x: i32,
    pub joy_y: i32,
    pub ltrig: i32,
    pub rtrig: i32,
}

impl ControllerState {
    /// True when every button in `b` is held
    pub fn held(&self, b: Buttons) -> bool {
        self.buttons.contains(b)
    }
}

/// Sample the keyboard as a pad
pub fn poll_devices() -> ControllerState {
    let mut buttons = Buttons::empty();
    let bindings = [
        (KeyCode::J, Buttons::A),
        (KeyCode::K, Buttons::B),
        (KeyCode::U, Buttons::X),
        (KeyCode::I, Buttons::Y),
        (KeyCode::Escape, Buttons::START),
        (KeyCode::Up, Buttons::DPAD_UP),
        (KeyCode::Down, Buttons::DPAD_DOWN),
        (KeyCode::Left, Buttons::DPAD_LEFT),
        (KeyCode::Right, Buttons::DPAD_RIGHT),
    ];
    for (key, button) in bindings {
        if is_key_down(key) {
            buttons |= button;
        }
    }

    let axis = |neg: KeyCode, pos: KeyCode| -> i32 {
        let mut v = 0;
        if is_key_down(neg) {
            v -= STICK_MAX;
        }
        if is_key_down(pos) {
            v += STICK_MAX;
        }
        v
    };
    let trigger = |key: KeyCode| if is_key_down(key) { TRIGGER_MAX } else { 0 };

    ControllerState {
        buttons,
        joy_x: axis(KeyCode::A, KeyCode::D),
        joy_y: axis(KeyCode::W, KeyCode::S),
        ltrig: trigger(KeyCode::Q),
        rtrig: trigger(KeyCode::E),
    }
}

/// Edge detection across polls
#[derive(Debug, Clone, Copy, Default)]
pub struct ButtonLatch {
    prev: Buttons,
}

impl ButtonLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buttons that went down since the last update
    pub fn update(&mut self, state: &ControllerState) -> Buttons {
        let pressed = state.buttons & !self.prev;
        self.prev = state.buttons;
        pressed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pad(buttons: Buttons) -> ControllerState {
        ControllerState { buttons, ..ControllerState::default() }
    }

    #[test]
    fn test_latch_reports_only_new_presses() {
        let mut latch = ButtonLatch::new();
        assert_eq!(latch.update(&pad(Buttons::A)), Buttons::A);
        assert_eq!(latch.update(&pad(Buttons::A)), Buttons::empty());
        assert_eq!(latch.update(&pad(Buttons::A | Buttons::DPAD_RIGHT)), Buttons::DPAD_RIGHT);
        assert_eq!(latch.update(&pad(Buttons::empty())), Buttons::empty());
        assert_eq!(latch.update(&pad(Buttons::A)), Buttons::A);
    }

    #[test]
    fn test_held_requires_all_buttons() {
        let state = pad(Buttons::A | Buttons::X);
        assert!(state.held(Buttons::A | Buttons::X));
        assert!(!state.held(Buttons::A | Buttons::B));
    }
}
