//! Model transform stage and clip-space mapping
//!
//! `TransformContext` holds the single active matrix that model vertices
//! are pushed through. A frame loads the camera into it, composes the
//! model transform on the right, and maps the results to screen space
//! with a `VertexMapper`.

use serde::{Serialize, Deserialize};
use super::camera::Camera;
use super::header::DepthCompare;
use super::math::{Mat4, Vec3, Vec4};

/// Saved copy of the active matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snapshot(Mat4);

/// The active transform. Every composing operation right-multiplies, so
/// calls read in the order the model is built: `translate` then `scale`
/// scales the model first and moves it second.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    active: Mat4,
}

impl TransformContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identity(&mut self) {
        self.active = Mat4::IDENTITY;
    }

    /// Replace the active matrix with the camera's
    pub fn load(&mut self, camera: &Camera) {
        self.active = *camera.matrix();
    }

    pub fn load_matrix(&mut self, m: &Mat4) {
        self.active = *m;
    }

    pub fn apply(&mut self, m: &Mat4) {
        self.active = self.active * *m;
    }

    pub fn translate(&mut self, x: f32, y: f32, z: f32) {
        self.apply(&Mat4::translation(x, y, z));
    }

    pub fn scale(&mut self, x: f32, y: f32, z: f32) {
        self.apply(&Mat4::scaling(x, y, z));
    }

    pub fn rotate_x(&mut self, angle: f32) {
        self.apply(&Mat4::rotation_x(angle));
    }

    pub fn rotate_y(&mut self, angle: f32) {
        self.apply(&Mat4::rotation_y(angle));
    }

    pub fn rotate_z(&mut self, angle: f32) {
        self.apply(&Mat4::rotation_z(angle));
    }

    pub fn store(&self) -> Snapshot {
        Snapshot(self.active)
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        self.active = snapshot.0;
    }

    pub fn active(&self) -> &Mat4 {
        &self.active
    }

    pub fn transform_point(&self, p: Vec3) -> Vec4 {
        self.active.transform_point(p)
    }

    /// Push a batch of model vertices through the active matrix, in order
    pub fn transform(&self, points: &[Vec3]) -> Vec<Vec4> {
        points.iter().map(|&p| self.active.transform_point(p)).collect()
    }
}

/// How transformed points become screen coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ProjectionMode {
    /// The active matrix already yields pixels; only a screen offset is added
    Direct { offset_x: f32, offset_y: f32 },
    /// Divide by w
    Homogeneous,
}

/// What gets written as a vertex's depth value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum DepthMapping {
    /// `1 / w`, larger is nearer
    InverseW,
    /// `z / w`, smaller is nearer
    Ndc,
    /// `clamp((z + bias) / span * 65535, 0, 65535)`, larger is nearer
    Fixed16 { bias: f32, span: f32 },
}

impl DepthMapping {
    pub const FIXED16_MAX: f32 = 65535.0;

    /// Map a transformed point's depth; `z` is already divided by w in
    /// homogeneous mode
    pub fn map(self, z: f32, w: f32) -> f32 {
        match self {
            DepthMapping::InverseW => 1.0 / w,
            DepthMapping::Ndc => z,
            DepthMapping::Fixed16 { bias, span } => ((z + bias) / span * Self::FIXED16_MAX).clamp(0.0, Self::FIXED16_MAX),
        }
    }

    /// Compare function under which nearer fragments win
    pub fn compare(self) -> DepthCompare {
        match self {
            DepthMapping::InverseW | DepthMapping::Fixed16 { .. } => DepthCompare::GreaterEqual,
            DepthMapping::Ndc => DepthCompare::LessEqual,
        }
    }

    /// Depth buffer clear value that every visible fragment passes against
    pub fn clear_value(self) -> f32 {
        match self {
            DepthMapping::InverseW | DepthMapping::Fixed16 { .. } => 0.0,
            DepthMapping::Ndc => f32::MAX,
        }
    }
}

/// Post-transform mapping to the screen-space triples written into vertices
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VertexMapper {
    pub projection: ProjectionMode,
    pub depth: DepthMapping,
}

impl VertexMapper {
    pub fn new(projection: ProjectionMode, depth: DepthMapping) -> Self {
        Self { projection, depth }
    }

    /// Panics on a homogeneous point with `w == 0`
    pub fn map(&self, p: Vec4) -> Vec3 {
        match self.projection {
            ProjectionMode::Direct { offset_x, offset_y } => {
                Vec3::new(p.x + offset_x, p.y + offset_y, self.depth.map(p.z, p.w))
            }
            ProjectionMode::Homogeneous => {
                assert!(p.w != 0.0, "homogeneous divide by w == 0 at ({}, {}, {})", p.x, p.y, p.z);
                let inv = 1.0 / p.w;
                Vec3::new(p.x * inv, p.y * inv, self.depth.map(p.z * inv, p.w))
            }
        }
    }

    /// Transform and map model vertices in one pass
    pub fn transform(&self, ctx: &TransformContext, points: &[Vec3]) -> Vec<Vec3> {
        points.iter().map(|&p| self.map(ctx.transform_point(p))).collect()
    }
}
