//! Software rasterizer consuming the command stream
//!
//! Walks each display list in hardware order, decoding headers, strip
//! vertices and sprite record pairs, and draws the resulting triangles
//! into a framebuffer with the depth test, culling and blending the
//! headers ask for.

use serde::{Serialize, Deserialize};
use super::command::{CommandBuffer, Record, SpriteCorners, PARA_MASK, PARA_VERTEX};
use super::header::{BlendFactor, Culling, RenderState, Shading};
use super::math::{barycentric, signed_area, Vec2, Vec3};
use super::types::{Color, ListKind, StripFlag, Texture, Vertex};
use super::vram::Vram;

/// Triangles with less screen area than this are dropped by `Culling::Small`
const SMALL_AREA: f32 = 0.01;

/// Framebuffer for software rendering
pub struct Framebuffer {
    pub pixels: Vec<u8>,    // RGBA, 4 bytes per pixel
    pub zbuffer: Vec<f32>,  // Depth buffer
    pub width: usize,
    pub height: usize,
}

impl Framebuffer {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            pixels: vec![0; width * height * 4],
            zbuffer: vec![0.0; width * height],
            width,
            height,
        }
    }

    pub fn clear(&mut self, color: Color, depth: f32) {
        let bytes = color.to_bytes();
        for px in self.pixels.chunks_exact_mut(4) {
            px.copy_from_slice(&bytes);
        }
        self.zbuffer.fill(depth);
    }

    pub fn get_pixel(&self, x: usize, y: usize) -> Color {
        if x < self.width && y < self.height {
            let idx = (y * self.width + x) * 4;
            Color::with_alpha(self.pixels[idx], self.pixels[idx + 1], self.pixels[idx + 2], self.pixels[idx + 3])
        } else {
            Color::TRANSPARENT
        }
    }

    pub fn set_pixel(&mut self, x: usize, y: usize, color: Color) {
        if x < self.width && y < self.height {
            let idx = (y * self.width + x) * 4;
            self.pixels[idx..idx + 4].copy_from_slice(&color.to_bytes());
        }
    }

    pub fn depth(&self, x: usize, y: usize) -> f32 {
        self.zbuffer[y * self.width + x]
    }

    /// Copy into `dst`, averaging horizontal pixel pairs when this buffer is
    /// twice as wide
    pub fn resolve_into(&self, dst: &mut Framebuffer) {
        if self.width == dst.width && self.height == dst.height {
            dst.pixels.copy_from_slice(&self.pixels);
            return;
        }
        debug_assert_eq!(self.width, dst.width * 2);
        debug_assert_eq!(self.height, dst.height);
        for y in 0..dst.height {
            for x in 0..dst.width {
                let l = self.get_pixel(x * 2, y);
                let r = self.get_pixel(x * 2 + 1, y);
                dst.set_pixel(x, y, l.lerp(r, 0.5));
            }
        }
    }
}

/// Rasterizer settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RasterSettings {
    /// Correct UVs for perspective, treating vertex depth as 1/w
    pub perspective_correct: bool,
    /// Punch-through fragments with alpha below this are discarded
    pub alpha_threshold: u8,
    /// Horizontal scale applied to incoming X (2.0 when supersampling)
    pub x_scale: f32,
}

impl Default for RasterSettings {
    fn default() -> Self {
        Self {
            perspective_correct: false,
            alpha_threshold: 128,
            x_scale: 1.0,
        }
    }
}

/// Screen-space vertex ready for rasterization
#[derive(Debug, Clone, Copy)]
struct Corner {
    pos: Vec3,
    uv: Vec2,
    base: Color,
    offset: Color,
}

/// Render a frame's lists in hardware order: opaque, punch-through, translucent
pub fn render_frame(fb: &mut Framebuffer, buffer: &CommandBuffer, vram: &Vram, settings: &RasterSettings) {
    for kind in ListKind::ALL {
        render_list(fb, buffer.list(kind), kind, vram, settings);
    }
}

/// Decode and draw one display list
pub fn render_list(fb: &mut Framebuffer, records: &[Record], kind: ListKind, vram: &Vram, settings: &RasterSettings) {
    let mut state: Option<RenderState> = None;
    let mut strip: Vec<Corner> = Vec::with_capacity(8);
    let mut sprite_first: Option<&Record> = None;

    for rec in records {
        // The second half of a sprite has no command word of its own
        if let (Some(first), Some(st)) = (sprite_first.take(), state.as_ref()) {
            let texture = st.texture.and_then(|t| vram.texture(t.addr));
            draw_sprite(fb, &SpriteCorners::decode(first, rec), st, kind, texture, settings);
            continue;
        }

        if let Some(header) = RenderState::decode(rec) {
            if header.list != kind {
                log::warn!("{} header found in the {} list", header.list.label(), kind.label());
            }
            state = Some(header);
            strip.clear();
            continue;
        }

        if rec[0] & PARA_MASK != PARA_VERTEX {
            log::warn!("skipping unknown record {:#010x} in the {} list", rec[0], kind.label());
            continue;
        }
        let Some(st) = state.as_ref() else {
            log::warn!("vertex before any header in the {} list", kind.label());
            continue;
        };

        if st.sprite {
            sprite_first = Some(rec);
            continue;
        }

        let (v, flag) = Vertex::decode(rec);
        strip.push(Corner {
            pos: Vec3::new(v.pos.x * settings.x_scale, v.pos.y, v.pos.z),
            uv: v.uv,
            base: v.argb,
            offset: v.oargb,
        });

        let n = strip.len();
        if n >= 3 {
            // every other strip triangle is reversed so all share one winding
            let tri = if (n - 3) % 2 == 0 {
                [strip[n - 3], strip[n - 2], strip[n - 1]]
            } else {
                [strip[n - 2], strip[n - 3], strip[n - 1]]
            };
            let texture = st.texture.and_then(|t| vram.texture(t.addr));
            draw_triangle(fb, &tri, st, kind, texture, settings);
        }

        if flag == StripFlag::EndOfStrip {
            strip.clear();
        }
    }
}

/// Sprites are drawn as the strip they stand for (A, D, B, C), so they
/// cull with the same winding as the equivalent strip face
fn draw_sprite(
    fb: &mut Framebuffer,
    corners: &SpriteCorners,
    state: &RenderState,
    kind: ListKind,
    texture: Option<&Texture>,
    settings: &RasterSettings,
) {
    let corner = |i: usize| Corner {
        pos: Vec3::new(corners.pos[i].x * settings.x_scale, corners.pos[i].y, corners.pos[i].z),
        uv: corners.uv[i],
        base: state.base,
        offset: state.offset,
    };
    let (a, b, c, d) = (corner(0), corner(1), corner(2), corner(3));
    draw_triangle(fb, &[a, d, b], state, kind, texture, settings);
    draw_triangle(fb, &[b, d, c], state, kind, texture, settings);
}

fn culled(culling: Culling, area: f32) -> bool {
    match culling {
        Culling::None => false,
        Culling::Small => area.abs() < SMALL_AREA,
        Culling::Ccw => area < 0.0 || area.abs() < SMALL_AREA,
        Culling::Cw => area > 0.0 || area.abs() < SMALL_AREA,
    }
}

/// Rasterize a single triangle
fn draw_triangle(
    fb: &mut Framebuffer,
    tri: &[Corner; 3],
    state: &RenderState,
    kind: ListKind,
    texture: Option<&Texture>,
    settings: &RasterSettings,
) {
    let [v1, v2, v3] = tri;
    if culled(state.culling, signed_area(v1.pos, v2.pos, v3.pos)) {
        return;
    }

    // Bounding box
    let min_x = v1.pos.x.min(v2.pos.x).min(v3.pos.x).max(0.0) as usize;
    let max_x = (v1.pos.x.max(v2.pos.x).max(v3.pos.x) + 1.0).clamp(0.0, fb.width as f32) as usize;
    let min_y = v1.pos.y.min(v2.pos.y).min(v3.pos.y).max(0.0) as usize;
    let max_y = (v1.pos.y.max(v2.pos.y).max(v3.pos.y) + 1.0).clamp(0.0, fb.height as f32) as usize;

    let filter = state.texture.map(|t| t.filter).unwrap_or_default();

    for y in min_y..max_y {
        for x in min_x..max_x {
            let p = Vec3::new(x as f32 + 0.5, y as f32 + 0.5, 0.0);
            let bc = barycentric(p, v1.pos, v2.pos, v3.pos);

            const ERR: f32 = -0.0001;
            if bc.x < ERR || bc.y < ERR || bc.z < ERR {
                continue;
            }

            let z = bc.x * v1.pos.z + bc.y * v2.pos.z + bc.z * v3.pos.z;
            let idx = y * fb.width + x;
            if !state.depth_compare.passes(z, fb.zbuffer[idx]) {
                continue;
            }

            let texel = texture.map(|tex| {
                let (u, v) = if settings.perspective_correct && v1.pos.z > 0.0 && v2.pos.z > 0.0 && v3.pos.z > 0.0 {
                    // depth is 1/w, so weighting by it undoes the projection
                    let (w1, w2, w3) = (bc.x * v1.pos.z, bc.y * v2.pos.z, bc.z * v3.pos.z);
                    let sum = w1 + w2 + w3;
                    (
                        (w1 * v1.uv.x + w2 * v2.uv.x + w3 * v3.uv.x) / sum,
                        (w1 * v1.uv.y + w2 * v2.uv.y + w3 * v3.uv.y) / sum,
                    )
                } else {
                    (
                        bc.x * v1.uv.x + bc.y * v2.uv.x + bc.z * v3.uv.x,
                        bc.x * v1.uv.y + bc.y * v2.uv.y + bc.z * v3.uv.y,
                    )
                };
                tex.sample(u, v, filter)
            });

            let (base, offset) = match state.shading {
                Shading::Flat => (v3.base, v3.offset),
                Shading::Gouraud => (
                    interpolate(bc, v1.base, v2.base, v3.base),
                    interpolate(bc, v1.offset, v2.offset, v3.offset),
                ),
            };
            let mut color = Color::tint(texel, base, offset, state.specular);
            if !state.use_alpha {
                color.a = 255;
            }

            let out = match kind {
                ListKind::Opaque => color,
                ListKind::PunchThrough => {
                    if color.a < settings.alpha_threshold {
                        continue;
                    }
                    Color { a: 255, ..color }
                }
                ListKind::Translucent => blend(color, fb.get_pixel(x, y), state.blend.src, state.blend.dst),
            };

            if state.depth_write {
                fb.zbuffer[idx] = z;
            }
            fb.set_pixel(x, y, out);
        }
    }
}

fn interpolate(bc: Vec3, a: Color, b: Color, c: Color) -> Color {
    let mix = |a: u8, b: u8, c: u8| (bc.x * a as f32 + bc.y * b as f32 + bc.z * c as f32).clamp(0.0, 255.0).round() as u8;
    Color {
        r: mix(a.r, b.r, c.r),
        g: mix(a.g, b.g, c.g),
        b: mix(a.b, b.b, c.b),
        a: mix(a.a, b.a, c.a),
    }
}

fn to_unit(c: Color) -> [f32; 4] {
    [c.r as f32 / 255.0, c.g as f32 / 255.0, c.b as f32 / 255.0, c.a as f32 / 255.0]
}

/// `src * src_factor + dst * dst_factor`, clamped
fn blend(src: Color, dst: Color, src_factor: BlendFactor, dst_factor: BlendFactor) -> Color {
    let s = to_unit(src);
    let d = to_unit(dst);
    let ws = src_factor.weight(s, d, d);
    let wd = dst_factor.weight(s, d, s);
    let ch = |i: usize| ((s[i] * ws[i] + d[i] * wd[i]).clamp(0.0, 1.0) * 255.0).round() as u8;
    Color { r: ch(0), g: ch(1), b: ch(2), a: ch(3) }
}
