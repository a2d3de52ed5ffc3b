//! Face emitters
//!
//! Every face is a header followed by exactly four vertices. Strip faces
//! commit one record per vertex, the last flagged end-of-strip. Sprite
//! faces pack their four corners into a two-burst record where the fourth
//! corner's depth and UV are implied.

use serde::{Serialize, Deserialize};
use thiserror::Error;
use super::command::{pack_uv16, BurstWindow, DrState, SpriteWord, CMD_VERTEX_EOL};
use super::header::{PolyContext, PolyHeader, SpriteContext, SpriteHeader};
use super::math::{Vec2, Vec3};
use super::types::{Color, ListKind, StripFlag, Vertex};

/// Vertices per face
pub const STRIP_LEN: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("vertex committed before any face header")]
    NoFace,
    #[error("face already has {} vertices", STRIP_LEN)]
    StripOverflow,
    #[error("end-of-strip flag misplaced on vertex {index} (must be set on vertex {} only)", STRIP_LEN - 1)]
    MisplacedEndOfStrip { index: usize },
    #[error("face closed after {committed} of {} vertices", STRIP_LEN)]
    StripIncomplete { committed: usize },
    #[error("header built for the {header} list but the {open} list is open")]
    ListMismatch { header: &'static str, open: &'static str },
    #[error("vertex buffer full ({capacity_bytes} bytes)")]
    VertexBufferFull { capacity_bytes: usize },
    #[error("commit without a targeted store queue")]
    NothingTargeted,
}

fn check_list(header: ListKind, open: ListKind) -> Result<(), EmitError> {
    if header == open {
        Ok(())
    } else {
        Err(EmitError::ListMismatch { header: header.label(), open: open.label() })
    }
}

/// Emits header + 4-vertex strips into the open list
pub struct StripEmitter<'e, 'a> {
    dr: &'e mut DrState<'a>,
    /// Vertices committed to the current face, `None` before the first header
    face: Option<usize>,
}

impl<'e, 'a> StripEmitter<'e, 'a> {
    pub fn new(dr: &'e mut DrState<'a>) -> Self {
        Self { dr, face: None }
    }

    /// Compile and commit a header, opening a new face.
    /// The header is committed for every face, even when unchanged.
    pub fn begin_face(&mut self, ctx: &PolyContext) -> Result<PolyHeader, EmitError> {
        self.check_face_closed()?;
        check_list(ctx.list, self.dr.list())?;
        let header = ctx.compile();
        self.dr.submit(&header.0)?;
        self.face = Some(0);
        Ok(header)
    }

    /// Commit the next vertex of the open face. `last` must be true for the
    /// fourth vertex and false for the others.
    pub fn commit_vertex(&mut self, v: &Vertex, last: bool) -> Result<(), EmitError> {
        let committed = self.face.ok_or(EmitError::NoFace)?;
        if committed >= STRIP_LEN {
            return Err(EmitError::StripOverflow);
        }
        if last != (committed + 1 == STRIP_LEN) {
            return Err(EmitError::MisplacedEndOfStrip { index: committed });
        }
        let flag = if last { StripFlag::EndOfStrip } else { StripFlag::Normal };
        self.dr.submit(&v.encode(flag))?;
        self.face = Some(committed + 1);
        Ok(())
    }

    /// Header plus all four vertices in strip order
    pub fn emit_face(&mut self, ctx: &PolyContext, vertices: &[Vertex; STRIP_LEN]) -> Result<PolyHeader, EmitError> {
        let header = self.begin_face(ctx)?;
        for (i, v) in vertices.iter().enumerate() {
            self.commit_vertex(v, i == STRIP_LEN - 1)?;
        }
        Ok(header)
    }

    /// Verify the last face was completed
    pub fn finish(self) -> Result<(), EmitError> {
        self.check_face_closed()
    }

    fn check_face_closed(&self) -> Result<(), EmitError> {
        match self.face {
            Some(committed) if committed < STRIP_LEN => Err(EmitError::StripIncomplete { committed }),
            _ => Ok(()),
        }
    }
}

/// How sprite faces reach the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpriteStrategy {
    /// Two-burst sprite record with implicit D depth/UV
    #[default]
    BurstPair,
    /// Polygon header plus a 4-vertex strip, for targets without the
    /// overlapping second-burst write
    Triangles,
}

/// One sprite quad. Corners run A, B, C, D around the perimeter; only A, B
/// and C carry texture coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteQuadBuilder {
    pub corners: [Vec3; 4],
    pub uvs: [Vec2; 3],
}

impl SpriteQuadBuilder {
    pub fn new(a: Vec3, b: Vec3, c: Vec3, d: Vec3) -> Self {
        Self {
            corners: [a, b, c, d],
            uvs: [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)],
        }
    }

    /// Build from four vertices in strip order: A = s0, B = s2, C = s3, D = s1
    pub fn from_strip(strip: [Vec3; 4]) -> Self {
        Self::new(strip[0], strip[2], strip[3], strip[1])
    }

    pub fn with_uvs(mut self, a: Vec2, b: Vec2, c: Vec2) -> Self {
        self.uvs = [a, b, c];
        self
    }

    /// D's texture coordinate as the hardware infers it
    pub fn implied_d_uv(&self) -> Vec2 {
        self.uvs[0] + self.uvs[2] - self.uvs[1]
    }

    /// D's depth as the hardware infers it
    pub fn implied_d_z(&self) -> f32 {
        let [a, b, c, _] = self.corners;
        a.z + c.z - b.z
    }

    /// Write the quad as two bursts. The second burst is filled through a
    /// window positioned one burst before the newly targeted queue.
    pub fn flush(&self, dr: &mut DrState<'_>) -> Result<(), EmitError> {
        let [a, b, c, d] = self.corners;
        let [auv, buv, cuv] = self.uvs;

        let mut first = BurstWindow::first(dr.target());
        first.put(SpriteWord::Flags, CMD_VERTEX_EOL);
        first.put_f32(SpriteWord::Ax, a.x);
        first.put_f32(SpriteWord::Ay, a.y);
        first.put_f32(SpriteWord::Az, a.z);
        first.put_f32(SpriteWord::Bx, b.x);
        first.put_f32(SpriteWord::By, b.y);
        first.put_f32(SpriteWord::Bz, b.z);
        first.put_f32(SpriteWord::Cx, c.x);
        dr.commit()?;

        let mut second = BurstWindow::second(dr.target());
        second.put_f32(SpriteWord::Cy, c.y);
        second.put_f32(SpriteWord::Cz, c.z);
        second.put_f32(SpriteWord::Dx, d.x);
        second.put_f32(SpriteWord::Dy, d.y);
        second.put(SpriteWord::AUv, pack_uv16(auv.x, auv.y));
        second.put(SpriteWord::BUv, pack_uv16(buv.x, buv.y));
        second.put(SpriteWord::CUv, pack_uv16(cuv.x, cuv.y));
        dr.commit()
    }

    /// The same quad as a strip in A, D, B, C order, which keeps the
    /// winding of the strip it was built from
    pub fn strip_vertices(&self, base: Color, offset: Color) -> [Vertex; 4] {
        let [a, b, c, d] = self.corners;
        let [auv, buv, cuv] = self.uvs;
        let d = Vec3::new(d.x, d.y, self.implied_d_z());
        [
            Vertex::new(a, auv, base, offset),
            Vertex::new(d, self.implied_d_uv(), base, offset),
            Vertex::new(b, buv, base, offset),
            Vertex::new(c, cuv, base, offset),
        ]
    }
}

/// Emits sprite faces (header + quads) into the open list
pub struct SpriteEmitter<'e, 'a> {
    dr: &'e mut DrState<'a>,
    strategy: SpriteStrategy,
    current: Option<SpriteContext>,
}

impl<'e, 'a> SpriteEmitter<'e, 'a> {
    pub fn new(dr: &'e mut DrState<'a>, strategy: SpriteStrategy) -> Self {
        Self { dr, strategy, current: None }
    }

    /// Commit a sprite header. Under the triangle strategy the header is
    /// committed per quad instead, since each strip needs its own.
    pub fn begin_face(&mut self, ctx: &SpriteContext) -> Result<SpriteHeader, EmitError> {
        check_list(ctx.list, self.dr.list())?;
        let header = ctx.compile();
        if self.strategy == SpriteStrategy::BurstPair {
            self.dr.submit(&header.0)?;
        }
        self.current = Some(*ctx);
        Ok(header)
    }

    pub fn commit_quad(&mut self, quad: &SpriteQuadBuilder) -> Result<(), EmitError> {
        let ctx = self.current.ok_or(EmitError::NoFace)?;
        match self.strategy {
            SpriteStrategy::BurstPair => quad.flush(&mut *self.dr),
            SpriteStrategy::Triangles => {
                let vertices = quad.strip_vertices(ctx.base, ctx.offset);
                StripEmitter::new(&mut *self.dr).emit_face(&ctx.as_poly(), &vertices)?;
                Ok(())
            }
        }
    }
}
