//! Material state and the header records it compiles into
//!
//! A header precedes every face in a display list and fixes the render
//! state (list, texture, culling, blending, depth test) for the vertices
//! that follow it. `PolyContext`/`SpriteContext` are the caller-side
//! description; `RenderState` is what the rasterizer decodes back out.

use serde::{Serialize, Deserialize};
use super::command::{Record, PARA_MASK, PARA_POLY_HEADER, PARA_SPRITE_HEADER};
use super::types::{Color, ListKind, PixelFormat, TextureFilter, TextureFlags};
use super::vram::TextureInfo;

// cmd word
const CMD_LIST_SHIFT: u32 = 24;
const CMD_TEXTURED: u32 = 1 << 3;
const CMD_SPECULAR: u32 = 1 << 2;
const CMD_GOURAUD: u32 = 1 << 1;
const CMD_UV16: u32 = 1 << 0;
// fixed bits the hardware expects in a polygon header
const CMD_POLY_BASE: u32 = PARA_POLY_HEADER | 0x0084_0000;

// mode1
const M1_DEPTH_SHIFT: u32 = 29;
const M1_CULL_SHIFT: u32 = 27;
const M1_DEPTH_WRITE_DISABLE: u32 = 1 << 26;

// mode2
const M2_SRC_SHIFT: u32 = 29;
const M2_DST_SHIFT: u32 = 26;
const M2_USE_ALPHA: u32 = 1 << 20;
const M2_FILTER_SHIFT: u32 = 13;
const M2_USIZE_SHIFT: u32 = 3;

// mode3
const M3_MIPMAP: u32 = 1 << 31;
const M3_VQ: u32 = 1 << 30;
const M3_FORMAT_SHIFT: u32 = 27;
const M3_NONTWIDDLED: u32 = 1 << 26;
const M3_ADDR_MASK: u32 = 0x001F_FFFF;

/// Largest texture memory a header's 8-byte-unit address can reach
pub const MAX_TEXTURE_MEMORY: usize = (M3_ADDR_MASK as usize + 1) << 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Culling {
    None,
    /// Drop triangles smaller than a fraction of a pixel
    Small,
    /// Drop counter-clockwise (on screen) triangles
    Ccw,
    /// Drop clockwise (on screen) triangles
    Cw,
}

impl Culling {
    const ALL: [Culling; 4] = [Culling::None, Culling::Small, Culling::Ccw, Culling::Cw];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthCompare {
    Never,
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl DepthCompare {
    const ALL: [DepthCompare; 8] = [
        DepthCompare::Never,
        DepthCompare::Less,
        DepthCompare::Equal,
        DepthCompare::LessEqual,
        DepthCompare::Greater,
        DepthCompare::NotEqual,
        DepthCompare::GreaterEqual,
        DepthCompare::Always,
    ];

    /// Does an incoming fragment at `incoming` pass against the `stored` depth?
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            DepthCompare::Never => false,
            DepthCompare::Less => incoming < stored,
            DepthCompare::Equal => incoming == stored,
            DepthCompare::LessEqual => incoming <= stored,
            DepthCompare::Greater => incoming > stored,
            DepthCompare::NotEqual => incoming != stored,
            DepthCompare::GreaterEqual => incoming >= stored,
            DepthCompare::Always => true,
        }
    }
}

/// Blend weights. `OtherColor` is the destination color when used as the
/// source factor and the source color when used as the destination factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlendFactor {
    Zero,
    One,
    OtherColor,
    InvOtherColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
}

impl BlendFactor {
    const ALL: [BlendFactor; 8] = [
        BlendFactor::Zero,
        BlendFactor::One,
        BlendFactor::OtherColor,
        BlendFactor::InvOtherColor,
        BlendFactor::SrcAlpha,
        BlendFactor::InvSrcAlpha,
        BlendFactor::DestAlpha,
        BlendFactor::InvDestAlpha,
    ];

    /// Per-channel weight, channels normalized to [0, 1] in RGBA order
    pub fn weight(self, src: [f32; 4], dst: [f32; 4], other: [f32; 4]) -> [f32; 4] {
        match self {
            BlendFactor::Zero => [0.0; 4],
            BlendFactor::One => [1.0; 4],
            BlendFactor::OtherColor => other,
            BlendFactor::InvOtherColor => other.map(|c| 1.0 - c),
            BlendFactor::SrcAlpha => [src[3]; 4],
            BlendFactor::InvSrcAlpha => [1.0 - src[3]; 4],
            BlendFactor::DestAlpha => [dst[3]; 4],
            BlendFactor::InvDestAlpha => [1.0 - dst[3]; 4],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blend {
    pub src: BlendFactor,
    pub dst: BlendFactor,
}

impl Blend {
    pub const REPLACE: Blend = Blend { src: BlendFactor::One, dst: BlendFactor::Zero };
    pub const ALPHA: Blend = Blend { src: BlendFactor::SrcAlpha, dst: BlendFactor::InvSrcAlpha };

    fn default_for(list: ListKind) -> Blend {
        match list {
            ListKind::Translucent => Blend::ALPHA,
            ListKind::Opaque | ListKind::PunchThrough => Blend::REPLACE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Shading {
    /// Whole triangle takes the color of its last vertex
    Flat,
    Gouraud,
}

/// Where a texture lives in device memory and how to address it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureBinding {
    pub addr: u32,
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub filter: TextureFilter,
    pub flags: TextureFlags,
}

impl TextureBinding {
    pub fn new(info: &TextureInfo, filter: TextureFilter) -> Self {
        Self {
            addr: info.addr(),
            width: info.width,
            height: info.height,
            format: info.format,
            filter,
            flags: info.flags,
        }
    }
}

/// Material description for a polygon (strip) face
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolyContext {
    pub list: ListKind,
    pub texture: Option<TextureBinding>,
    pub culling: Culling,
    pub specular: bool,
    pub shading: Shading,
    pub blend: Blend,
    pub depth_compare: DepthCompare,
    pub depth_write: bool,
    pub use_alpha: bool,
}

impl PolyContext {
    pub fn colored(list: ListKind) -> Self {
        Self {
            list,
            texture: None,
            culling: Culling::Ccw,
            specular: false,
            shading: Shading::Gouraud,
            blend: Blend::default_for(list),
            depth_compare: DepthCompare::GreaterEqual,
            depth_write: true,
            use_alpha: list != ListKind::Opaque,
        }
    }

    pub fn textured(list: ListKind, texture: TextureBinding) -> Self {
        Self { texture: Some(texture), ..Self::colored(list) }
    }

    pub fn with_culling(mut self, culling: Culling) -> Self {
        self.culling = culling;
        self
    }

    pub fn with_specular(mut self, specular: bool) -> Self {
        self.specular = specular;
        self
    }

    pub fn with_blend(mut self, src: BlendFactor, dst: BlendFactor) -> Self {
        self.blend = Blend { src, dst };
        self
    }

    pub fn with_depth(mut self, compare: DepthCompare, write: bool) -> Self {
        self.depth_compare = compare;
        self.depth_write = write;
        self
    }

    /// Compile into the 32-byte header record
    pub fn compile(&self) -> PolyHeader {
        let mut cmd = CMD_POLY_BASE | list_bits(self.list) << CMD_LIST_SHIFT;
        if self.specular {
            cmd |= CMD_SPECULAR;
        }
        if self.shading == Shading::Gouraud {
            cmd |= CMD_GOURAUD;
        }
        let (mode2, mode3) = encode_texture(self.texture.as_ref(), self.blend, self.use_alpha);
        if self.texture.is_some() {
            cmd |= CMD_TEXTURED;
        }
        let mode1 = encode_mode1(self.depth_compare, self.culling, self.depth_write);
        PolyHeader([cmd, mode1, mode2, mode3, 0, 0, 0, 0])
    }
}

/// Material description for sprite faces. Sprites carry no per-vertex
/// color, so the base and offset colors live in the header.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteContext {
    pub list: ListKind,
    pub texture: Option<TextureBinding>,
    pub culling: Culling,
    pub specular: bool,
    pub blend: Blend,
    pub depth_compare: DepthCompare,
    pub depth_write: bool,
    pub use_alpha: bool,
    pub base: Color,
    pub offset: Color,
}

impl SpriteContext {
    pub fn colored(list: ListKind, base: Color) -> Self {
        Self {
            list,
            texture: None,
            culling: Culling::Ccw,
            specular: false,
            blend: Blend::default_for(list),
            depth_compare: DepthCompare::GreaterEqual,
            depth_write: true,
            use_alpha: list != ListKind::Opaque,
            base,
            offset: Color::TRANSPARENT,
        }
    }

    pub fn textured(list: ListKind, texture: TextureBinding) -> Self {
        Self { texture: Some(texture), ..Self::colored(list, Color::WHITE) }
    }

    /// Set base and offset colors; a non-transparent offset turns specular on
    pub fn with_colors(mut self, base: Color, offset: Color) -> Self {
        self.base = base;
        self.offset = offset;
        self.specular = offset.to_argb() != 0;
        self
    }

    pub fn with_culling(mut self, culling: Culling) -> Self {
        self.culling = culling;
        self
    }

    pub fn compile(&self) -> SpriteHeader {
        let mut cmd = PARA_SPRITE_HEADER | list_bits(self.list) << CMD_LIST_SHIFT | CMD_UV16;
        if self.specular {
            cmd |= CMD_SPECULAR;
        }
        if self.texture.is_some() {
            cmd |= CMD_TEXTURED;
        }
        let (mode2, mode3) = encode_texture(self.texture.as_ref(), self.blend, self.use_alpha);
        let mode1 = encode_mode1(self.depth_compare, self.culling, self.depth_write);
        SpriteHeader([cmd, mode1, mode2, mode3, self.base.to_argb(), self.offset.to_argb(), 0, 0])
    }

    /// Equivalent strip material, used when sprites are drawn as triangles
    pub fn as_poly(&self) -> PolyContext {
        PolyContext {
            list: self.list,
            texture: self.texture,
            culling: self.culling,
            specular: self.specular,
            shading: Shading::Flat,
            blend: self.blend,
            depth_compare: self.depth_compare,
            depth_write: self.depth_write,
            use_alpha: self.use_alpha,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PolyHeader(pub Record);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpriteHeader(pub Record);

/// Render state decoded from a header record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub list: ListKind,
    pub sprite: bool,
    pub texture: Option<TextureBinding>,
    pub culling: Culling,
    pub specular: bool,
    pub shading: Shading,
    pub blend: Blend,
    pub depth_compare: DepthCompare,
    pub depth_write: bool,
    pub use_alpha: bool,
    /// Header colors, only meaningful for sprites
    pub base: Color,
    pub offset: Color,
}

impl RenderState {
    /// Decode a header record; `None` if the record is not a header
    pub fn decode(rec: &Record) -> Option<RenderState> {
        let cmd = rec[0];
        let sprite = match cmd & PARA_MASK {
            PARA_POLY_HEADER => false,
            PARA_SPRITE_HEADER => true,
            _ => return None,
        };
        let (mode1, mode2, mode3) = (rec[1], rec[2], rec[3]);

        let texture = if cmd & CMD_TEXTURED != 0 {
            let mut flags = TextureFlags::empty();
            if mode3 & M3_NONTWIDDLED != 0 {
                flags |= TextureFlags::STRIDED;
            } else {
                flags |= TextureFlags::TWIDDLED;
            }
            if mode3 & M3_MIPMAP != 0 {
                flags |= TextureFlags::MIPMAPPED;
            }
            if mode3 & M3_VQ != 0 {
                flags |= TextureFlags::COMPRESSED;
            }
            Some(TextureBinding {
                addr: (mode3 & M3_ADDR_MASK) << 3,
                width: 8 << ((mode2 >> M2_USIZE_SHIFT) & 0x7),
                height: 8 << (mode2 & 0x7),
                format: PixelFormat::from_bits((mode3 >> M3_FORMAT_SHIFT) & 0x7),
                filter: if (mode2 >> M2_FILTER_SHIFT) & 0x3 == 0 {
                    TextureFilter::Nearest
                } else {
                    TextureFilter::Bilinear
                },
                flags,
            })
        } else {
            None
        };

        let (base, offset) = if sprite {
            (Color::from_argb(rec[4]), Color::from_argb(rec[5]))
        } else {
            (Color::WHITE, Color::TRANSPARENT)
        };

        Some(RenderState {
            list: list_from_bits((cmd >> CMD_LIST_SHIFT) & 0x7),
            sprite,
            texture,
            culling: Culling::ALL[((mode1 >> M1_CULL_SHIFT) & 0x3) as usize],
            specular: cmd & CMD_SPECULAR != 0,
            shading: if cmd & CMD_GOURAUD != 0 { Shading::Gouraud } else { Shading::Flat },
            blend: Blend {
                src: BlendFactor::ALL[((mode2 >> M2_SRC_SHIFT) & 0x7) as usize],
                dst: BlendFactor::ALL[((mode2 >> M2_DST_SHIFT) & 0x7) as usize],
            },
            depth_compare: DepthCompare::ALL[((mode1 >> M1_DEPTH_SHIFT) & 0x7) as usize],
            depth_write: mode1 & M1_DEPTH_WRITE_DISABLE == 0,
            use_alpha: mode2 & M2_USE_ALPHA != 0,
            base,
            offset,
        })
    }
}

fn list_bits(list: ListKind) -> u32 {
    match list {
        ListKind::Opaque => 0,
        ListKind::Translucent => 2,
        ListKind::PunchThrough => 4,
    }
}

fn list_from_bits(bits: u32) -> ListKind {
    match bits {
        2 => ListKind::Translucent,
        4 => ListKind::PunchThrough,
        _ => ListKind::Opaque,
    }
}

fn encode_mode1(depth: DepthCompare, culling: Culling, depth_write: bool) -> u32 {
    let mut mode1 = (depth as u32) << M1_DEPTH_SHIFT | (culling as u32) << M1_CULL_SHIFT;
    if !depth_write {
        mode1 |= M1_DEPTH_WRITE_DISABLE;
    }
    mode1
}

fn encode_texture(texture: Option<&TextureBinding>, blend: Blend, use_alpha: bool) -> (u32, u32) {
    let mut mode2 = (blend.src as u32) << M2_SRC_SHIFT | (blend.dst as u32) << M2_DST_SHIFT;
    if use_alpha {
        mode2 |= M2_USE_ALPHA;
    }
    let Some(tex) = texture else {
        return (mode2, 0);
    };

    mode2 |= size_bits(tex.width) << M2_USIZE_SHIFT | size_bits(tex.height);
    if tex.filter == TextureFilter::Bilinear {
        mode2 |= 1 << M2_FILTER_SHIFT;
    }

    let mut mode3 = tex.format.to_bits() << M3_FORMAT_SHIFT | ((tex.addr >> 3) & M3_ADDR_MASK);
    if !tex.flags.contains(TextureFlags::TWIDDLED) {
        mode3 |= M3_NONTWIDDLED;
    }
    if tex.flags.contains(TextureFlags::MIPMAPPED) {
        mode3 |= M3_MIPMAP;
    }
    if tex.flags.contains(TextureFlags::COMPRESSED) {
        mode3 |= M3_VQ;
    }
    (mode2, mode3)
}

/// log2(size) - 3 for the power-of-two sizes 8..=1024
fn size_bits(size: u16) -> u32 {
    debug_assert!(size.is_power_of_two() && (8..=1024).contains(&size));
    (size.max(8).trailing_zeros() - 3).min(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding() -> TextureBinding {
        TextureBinding {
            addr: 0x0001_2340,
            width: 256,
            height: 64,
            format: PixelFormat::Argb4444,
            filter: TextureFilter::Bilinear,
            flags: TextureFlags::TWIDDLED,
        }
    }

    #[test]
    fn test_poly_header_decodes_back() {
        let ctx = PolyContext::textured(ListKind::Translucent, binding())
            .with_culling(Culling::Cw)
            .with_specular(true)
            .with_blend(BlendFactor::SrcAlpha, BlendFactor::OtherColor)
            .with_depth(DepthCompare::Greater, false);
        let state = RenderState::decode(&ctx.compile().0).unwrap();
        assert_eq!(state.list, ListKind::Translucent);
        assert!(!state.sprite);
        assert_eq!(state.texture, Some(binding()));
        assert_eq!(state.culling, Culling::Cw);
        assert!(state.specular);
        assert_eq!(state.blend, Blend { src: BlendFactor::SrcAlpha, dst: BlendFactor::OtherColor });
        assert_eq!(state.depth_compare, DepthCompare::Greater);
        assert!(!state.depth_write);
    }

    #[test]
    fn test_poly_header_command_word() {
        let header = PolyContext::colored(ListKind::Opaque).compile();
        assert_eq!(header.0[0] & PARA_MASK, PARA_POLY_HEADER);
        assert_eq!(header.0[0] & CMD_TEXTURED, 0);
    }

    #[test]
    fn test_sprite_header_carries_colors() {
        let ctx = SpriteContext::textured(ListKind::Translucent, binding())
            .with_colors(Color::from_argb(0xCFFFFFFF), Color::from_argb(0x7F7F007F));
        let header = ctx.compile();
        assert_eq!(header.0[4], 0xCFFFFFFF);
        assert_eq!(header.0[5], 0x7F7F007F);
        let state = RenderState::decode(&header.0).unwrap();
        assert!(state.sprite);
        assert!(state.specular);
        assert_eq!(state.base, Color::from_argb(0xCFFFFFFF));
    }

    #[test]
    fn test_vertex_record_is_not_a_header() {
        let rec: Record = [0xE000_0000, 0, 0, 0, 0, 0, 0, 0];
        assert!(RenderState::decode(&rec).is_none());
    }

    #[test]
    fn test_depth_compare_functions() {
        assert!(DepthCompare::GreaterEqual.passes(0.5, 0.5));
        assert!(!DepthCompare::Greater.passes(0.5, 0.5));
        assert!(DepthCompare::Less.passes(0.1, 0.5));
        assert!(!DepthCompare::Never.passes(0.0, 1.0));
    }
}
