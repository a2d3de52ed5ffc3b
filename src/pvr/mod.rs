//! Immediate-mode polygon submission for a tile-based deferred renderer
//!
//! Pipeline:
//! - `camera`: perspective + look-at into one matrix
//! - `transform`: the active matrix, model composition, clip-space mapping
//! - `emit`: header + 4-vertex strip faces and two-burst sprites
//! - `device`: scene/list sequencing over double-buffered command lists
//!
//! The hardware side (`render`, `vram`) is emulated in software so the
//! command stream can be inspected and displayed.

mod math;
mod camera;
mod transform;
mod types;
mod header;
mod command;
mod emit;
mod vram;
mod render;
mod device;

pub use math::*;
pub use camera::*;
pub use transform::*;
pub use types::*;
pub use header::*;
pub use command::*;
pub use emit::*;
pub use vram::*;
pub use render::*;
pub use device::*;

/// Display resolution
pub const SCREEN_WIDTH: usize = 640;
pub const SCREEN_HEIGHT: usize = 480;
