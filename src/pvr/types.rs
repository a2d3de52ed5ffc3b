//! Core types shared by the emitters, the texture memory and the rasterizer

use bitflags::bitflags;
use serde::{Serialize, Deserialize};
use super::math::{Vec2, Vec3};

/// RGBA color (0-255 per channel). Packed to and from the hardware's
/// 32-bit ARGB layout at the record boundary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0, a: 255 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255, a: 255 };
    pub const TRANSPARENT: Color = Color { r: 0, g: 0, b: 0, a: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Unpack `0xAARRGGBB`
    pub const fn from_argb(argb: u32) -> Self {
        Self {
            a: (argb >> 24) as u8,
            r: (argb >> 16) as u8,
            g: (argb >> 8) as u8,
            b: argb as u8,
        }
    }

    /// Pack to `0xAARRGGBB`
    pub const fn to_argb(self) -> u32 {
        ((self.a as u32) << 24) | ((self.r as u32) << 16) | ((self.g as u32) << 8) | (self.b as u32)
    }

    /// Build from normalized channels, each clamped to [0, 1]
    pub fn from_f32(a: f32, r: f32, g: f32, b: f32) -> Self {
        let q = |c: f32| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
        Self { r: q(r), g: q(g), b: q(b), a: q(a) }
    }

    /// Convert to [u8; 4] for framebuffer
    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Per-channel product, 255 acting as 1.0
    pub fn modulate(self, other: Color) -> Color {
        let m = |a: u8, b: u8| ((a as u32 * b as u32 + 127) / 255) as u8;
        Color {
            r: m(self.r, other.r),
            g: m(self.g, other.g),
            b: m(self.b, other.b),
            a: m(self.a, other.a),
        }
    }

    /// Saturating add of the RGB channels; alpha is kept from `self`
    pub fn add_rgb(self, other: Color) -> Color {
        Color {
            r: self.r.saturating_add(other.r),
            g: self.g.saturating_add(other.g),
            b: self.b.saturating_add(other.b),
            a: self.a,
        }
    }

    /// Linear blend between two colors, `t` in [0, 1]
    pub fn lerp(self, other: Color, t: f32) -> Color {
        let t = t.clamp(0.0, 1.0);
        let l = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t + 0.5) as u8;
        Color {
            r: l(self.r, other.r),
            g: l(self.g, other.g),
            b: l(self.b, other.b),
            a: l(self.a, other.a),
        }
    }

    /// Combine texel, base and offset colors.
    ///
    /// Textured: `rgb = texel * base (+ offset)`, `a = texel.a * base.a`.
    /// Untextured: `rgb = base (+ offset)`, `a = base.a`.
    /// The offset only contributes when specular is enabled; its alpha is ignored.
    pub fn tint(texel: Option<Color>, base: Color, offset: Color, specular: bool) -> Color {
        let lit = match texel {
            Some(t) => t.modulate(base),
            None => base,
        };
        if specular {
            lit.add_rgb(offset)
        } else {
            lit
        }
    }
}

/// Position of a vertex within its strip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripFlag {
    Normal,
    EndOfStrip,
}

/// A vertex as handed to the strip emitter, already in screen space.
/// Untextured geometry leaves `uv` at zero; `oargb` only matters when the
/// material enables specular.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vertex {
    pub pos: Vec3,
    pub uv: Vec2,
    pub argb: Color,
    pub oargb: Color,
}

impl Vertex {
    pub fn new(pos: Vec3, uv: Vec2, argb: Color, oargb: Color) -> Self {
        Self { pos, uv, argb, oargb }
    }

    pub fn colored(pos: Vec3, argb: Color) -> Self {
        Self { pos, uv: Vec2::default(), argb, oargb: Color::TRANSPARENT }
    }
}

/// The display lists the hardware sorts primitives into.
/// Lists are rendered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListKind {
    Opaque,
    PunchThrough,
    Translucent,
}

impl ListKind {
    pub const COUNT: usize = 3;
    pub const ALL: [ListKind; 3] = [ListKind::Opaque, ListKind::PunchThrough, ListKind::Translucent];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<ListKind> {
        ListKind::ALL.get(i).copied()
    }

    pub fn label(self) -> &'static str {
        match self {
            ListKind::Opaque => "opaque",
            ListKind::PunchThrough => "punch-through",
            ListKind::Translucent => "translucent",
        }
    }
}

/// Texel storage formats understood by the texture unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Argb1555,
    Rgb565,
    Argb4444,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        2
    }

    /// Reduce a color to the precision this format stores, expanded back to 8 bits
    pub fn quantize(self, c: Color) -> Color {
        fn q(v: u8, bits: u32) -> u8 {
            let max = (1u32 << bits) - 1;
            let stored = (v as u32 * max + 127) / 255;
            ((stored * 255 + max / 2) / max) as u8
        }
        match self {
            PixelFormat::Argb1555 => Color {
                r: q(c.r, 5),
                g: q(c.g, 5),
                b: q(c.b, 5),
                a: if c.a >= 128 { 255 } else { 0 },
            },
            PixelFormat::Rgb565 => Color { r: q(c.r, 5), g: q(c.g, 6), b: q(c.b, 5), a: 255 },
            PixelFormat::Argb4444 => Color { r: q(c.r, 4), g: q(c.g, 4), b: q(c.b, 4), a: q(c.a, 4) },
        }
    }

    pub(crate) fn to_bits(self) -> u32 {
        match self {
            PixelFormat::Argb1555 => 0,
            PixelFormat::Rgb565 => 1,
            PixelFormat::Argb4444 => 2,
        }
    }

    pub(crate) fn from_bits(bits: u32) -> PixelFormat {
        match bits {
            1 => PixelFormat::Rgb565,
            2 => PixelFormat::Argb4444,
            _ => PixelFormat::Argb1555,
        }
    }
}

bitflags! {
    /// Storage attributes of an uploaded texture
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct TextureFlags: u32 {
        const TWIDDLED = 1 << 0;
        const STRIDED = 1 << 1;
        const MIPMAPPED = 1 << 2;
        const COMPRESSED = 1 << 3;
        const PALETTISED = 1 << 4;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TextureFilter {
    #[default]
    Nearest,
    Bilinear,
}

/// Decoded texel grid
#[derive(Debug, Clone)]
pub struct Texture {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Color>,
    pub name: String,
}

impl Texture {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            pixels: vec![Color::WHITE; width * height],
            name: String::new(),
        }
    }

    /// Load texture from an image file
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self, image::ImageError> {
        let path = path.as_ref();
        let img = image::open(path)?;
        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::from_image(img, name))
    }

    /// Load texture from raw encoded bytes
    pub fn from_bytes(bytes: &[u8], name: String) -> Result<Self, image::ImageError> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_image(img, name))
    }

    fn from_image(img: image::DynamicImage, name: String) -> Self {
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        let pixels: Vec<Color> = rgba
            .pixels()
            .map(|p| Color::with_alpha(p[0], p[1], p[2], p[3]))
            .collect();
        Self {
            width: width as usize,
            height: height as usize,
            pixels,
            name,
        }
    }

    /// Create a checkerboard texture with `cell`-pixel squares
    pub fn checkerboard(width: usize, height: usize, cell: usize, color1: Color, color2: Color) -> Self {
        let cell = cell.max(1);
        let mut pixels = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                let checker = ((x / cell) + (y / cell)) % 2 == 0;
                pixels.push(if checker { color1 } else { color2 });
            }
        }
        Self { width, height, pixels, name: "checkerboard".to_string() }
    }

    /// Sample with wrap-around addressing
    pub fn sample(&self, u: f32, v: f32, filter: TextureFilter) -> Color {
        match filter {
            TextureFilter::Nearest => {
                let tx = (u * self.width as f32).floor() as i64;
                let ty = (v * self.height as f32).floor() as i64;
                self.get_wrapped(tx, ty)
            }
            TextureFilter::Bilinear => {
                let fx = u * self.width as f32 - 0.5;
                let fy = v * self.height as f32 - 0.5;
                let x0 = fx.floor();
                let y0 = fy.floor();
                let tx = fx - x0;
                let ty = fy - y0;
                let (x0, y0) = (x0 as i64, y0 as i64);
                let top = self.get_wrapped(x0, y0).lerp(self.get_wrapped(x0 + 1, y0), tx);
                let bottom = self.get_wrapped(x0, y0 + 1).lerp(self.get_wrapped(x0 + 1, y0 + 1), tx);
                top.lerp(bottom, ty)
            }
        }
    }

    fn get_wrapped(&self, x: i64, y: i64) -> Color {
        if self.width == 0 || self.height == 0 {
            return Color::BLACK;
        }
        let x = x.rem_euclid(self.width as i64) as usize;
        let y = y.rem_euclid(self.height as i64) as usize;
        self.pixels[y * self.width + x]
    }

    /// Get pixel at x,y coordinates
    pub fn get_pixel(&self, x: usize, y: usize) -> Color {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x]
        } else {
            Color::BLACK
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argb_round_trip_layout() {
        let c = Color::from_argb(0x7FF00000);
        assert_eq!(c, Color::with_alpha(0xF0, 0, 0, 0x7F));
        assert_eq!(c.to_argb(), 0x7FF00000);
    }

    #[test]
    fn test_tint_white_texel_with_black_offset_is_base() {
        let base = Color::from_argb(0xCF336699);
        let out = Color::tint(Some(Color::WHITE), base, Color::BLACK, true);
        assert_eq!(out, base);
    }

    #[test]
    fn test_tint_black_texel_with_offset_is_offset_rgb() {
        let base = Color::from_argb(0xCFFFFFFF);
        let offset = Color::from_argb(0x7F007F7F);
        let out = Color::tint(Some(Color::BLACK), base, offset, true);
        assert_eq!((out.r, out.g, out.b), (offset.r, offset.g, offset.b));
    }

    #[test]
    fn test_tint_ignores_offset_without_specular() {
        let base = Color::new(10, 20, 30);
        let out = Color::tint(None, base, Color::WHITE, false);
        assert_eq!(out, base);
    }

    #[test]
    fn test_tint_saturates() {
        let out = Color::tint(Some(Color::WHITE), Color::WHITE, Color::new(200, 200, 200), true);
        assert_eq!((out.r, out.g, out.b), (255, 255, 255));
    }

    #[test]
    fn test_quantize_keeps_extremes() {
        for fmt in [PixelFormat::Argb1555, PixelFormat::Rgb565, PixelFormat::Argb4444] {
            assert_eq!(fmt.quantize(Color::WHITE), Color::WHITE);
            assert_eq!(fmt.quantize(Color::BLACK), Color::BLACK);
        }
        assert_eq!(PixelFormat::Rgb565.quantize(Color::TRANSPARENT).a, 255);
    }

    #[test]
    fn test_decode_png_bytes() {
        let mut img = image::RgbaImage::new(8, 8);
        img.put_pixel(1, 0, image::Rgba([255, 0, 0, 128]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let tex = Texture::from_bytes(&bytes, "red".to_string()).unwrap();
        assert_eq!((tex.width, tex.height), (8, 8));
        assert_eq!(tex.get_pixel(1, 0), Color::with_alpha(255, 0, 0, 128));
        assert!(Texture::from_bytes(&bytes[..16], "cut".to_string()).is_err());
    }

    #[test]
    fn test_nearest_sample_wraps() {
        let tex = Texture::checkerboard(8, 8, 4, Color::WHITE, Color::BLACK);
        assert_eq!(tex.sample(0.0, 0.0, TextureFilter::Nearest), Color::WHITE);
        assert_eq!(tex.sample(0.5, 0.0, TextureFilter::Nearest), Color::BLACK);
        assert_eq!(tex.sample(1.0, 0.0, TextureFilter::Nearest), Color::WHITE);
        assert_eq!(tex.sample(-0.5, 0.0, TextureFilter::Nearest), Color::BLACK);
    }
}
