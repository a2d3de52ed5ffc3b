//! Device texture memory
//!
//! A fixed-size region addressed by byte offset. Textures are allocated
//! first-fit on 32-byte boundaries, quantised to their storage format on
//! upload and looked up by address when a header references them.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;
use super::types::{PixelFormat, Texture, TextureFlags};

pub const VRAM_ALIGN: usize = 32;
pub const MIN_TEXTURE_SIZE: usize = 8;
pub const MAX_TEXTURE_SIZE: usize = 1024;

/// Shared between the submitting thread (uploads) and the render worker (reads)
pub type SharedVram = Arc<RwLock<Vram>>;

#[derive(Debug, Error)]
pub enum TextureError {
    #[error("texture not found: {0}")]
    NotFound(String),
    #[error("failed to decode texture {name}: {reason}")]
    DecodeFailed { name: String, reason: String },
    #[error("out of device memory: requested {requested} bytes, {available} available")]
    OutOfDeviceMemory { requested: usize, available: usize },
}

/// Handle to an uploaded texture. Not `Clone`: passing it to
/// [`Vram::unload`] consumes it, so a texture is freed exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct TextureInfo {
    addr: u32,
    pub width: u16,
    pub height: u16,
    pub format: PixelFormat,
    pub flags: TextureFlags,
}

impl TextureInfo {
    pub fn addr(&self) -> u32 {
        self.addr
    }

    pub fn size_bytes(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

struct Block {
    size: usize,
    texels: Option<Texture>,
}

pub struct Vram {
    capacity: usize,
    blocks: BTreeMap<u32, Block>,
}

impl Vram {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            blocks: BTreeMap::new(),
        }
    }

    pub fn shared(capacity: usize) -> SharedVram {
        Arc::new(RwLock::new(Self::new(capacity)))
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn used(&self) -> usize {
        self.blocks.values().map(|b| b.size).sum()
    }

    pub fn available(&self) -> usize {
        self.capacity - self.used()
    }

    /// Reserve `bytes` (rounded up to the alignment), first fit
    pub fn alloc(&mut self, bytes: usize) -> Result<u32, TextureError> {
        let size = bytes.div_ceil(VRAM_ALIGN) * VRAM_ALIGN;
        let mut cursor = 0usize;
        for (&addr, block) in &self.blocks {
            if addr as usize - cursor >= size {
                break;
            }
            cursor = addr as usize + block.size;
        }
        if cursor + size > self.capacity {
            return Err(TextureError::OutOfDeviceMemory {
                requested: size,
                available: self.available(),
            });
        }
        let addr = cursor as u32;
        self.blocks.insert(addr, Block { size, texels: None });
        log::trace!("vram: allocated {} bytes at {:#08x}", size, addr);
        Ok(addr)
    }

    /// Release a block; false if nothing was allocated at `addr`
    pub fn free(&mut self, addr: u32) -> bool {
        self.blocks.remove(&addr).is_some()
    }

    /// Allocate, quantise and store a texture
    pub fn upload(&mut self, texture: &Texture, format: PixelFormat) -> Result<TextureInfo, TextureError> {
        check_dimensions(texture)?;
        let info = TextureInfo {
            addr: 0,
            width: texture.width as u16,
            height: texture.height as u16,
            format,
            flags: TextureFlags::TWIDDLED,
        };
        let addr = self.alloc(info.size_bytes())?;

        let mut stored = texture.clone();
        for px in &mut stored.pixels {
            *px = format.quantize(*px);
        }
        if let Some(block) = self.blocks.get_mut(&addr) {
            block.texels = Some(stored);
        }

        log::debug!(
            "vram: uploaded '{}' {}x{} {:?} at {:#08x}",
            texture.name, texture.width, texture.height, format, addr
        );
        Ok(TextureInfo { addr, ..info })
    }

    /// Replace the texels of an already uploaded texture of the same size
    pub fn update(&mut self, info: &TextureInfo, texture: &Texture) -> bool {
        if texture.width != info.width as usize || texture.height != info.height as usize {
            return false;
        }
        let Some(block) = self.blocks.get_mut(&info.addr) else {
            return false;
        };
        let mut stored = texture.clone();
        for px in &mut stored.pixels {
            *px = info.format.quantize(*px);
        }
        block.texels = Some(stored);
        true
    }

    pub fn unload(&mut self, info: TextureInfo) {
        if !self.free(info.addr) {
            log::warn!("vram: unload of unknown texture at {:#08x}", info.addr);
        }
    }

    pub fn texture(&self, addr: u32) -> Option<&Texture> {
        self.blocks.get(&addr).and_then(|b| b.texels.as_ref())
    }
}

fn check_dimensions(texture: &Texture) -> Result<(), TextureError> {
    let ok = |s: usize| s.is_power_of_two() && (MIN_TEXTURE_SIZE..=MAX_TEXTURE_SIZE).contains(&s);
    if ok(texture.width) && ok(texture.height) {
        Ok(())
    } else {
        Err(TextureError::DecodeFailed {
            name: texture.name.clone(),
            reason: format!(
                "{}x{} is not a power of two between {} and {}",
                texture.width, texture.height, MIN_TEXTURE_SIZE, MAX_TEXTURE_SIZE
            ),
        })
    }
}

/// Decode an image file into texels
pub fn decode_texture_file<P: AsRef<Path>>(path: P) -> Result<Texture, TextureError> {
    let path = path.as_ref();
    Texture::from_file(path).map_err(|e| match e {
        image::ImageError::IoError(ref io) if io.kind() == std::io::ErrorKind::NotFound => {
            TextureError::NotFound(path.display().to_string())
        }
        other => TextureError::DecodeFailed {
            name: path.display().to_string(),
            reason: other.to_string(),
        },
    })
}

/// Decode an image file and upload it
pub fn load_texture_file<P: AsRef<Path>>(
    vram: &mut Vram,
    path: P,
    format: PixelFormat,
) -> Result<TextureInfo, TextureError> {
    let texture = decode_texture_file(path)?;
    vram.upload(&texture, format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::Color;

    #[test]
    fn test_alloc_is_aligned_and_first_fit() {
        let mut vram = Vram::new(1024);
        let a = vram.alloc(10).unwrap();
        let b = vram.alloc(64).unwrap();
        assert_eq!(a, 0);
        assert_eq!(b, 32);
        assert!(vram.free(a));
        // fits in the hole left by `a`
        assert_eq!(vram.alloc(32).unwrap(), 0);
        assert_eq!(vram.used(), 96);
    }

    #[test]
    fn test_exhaustion_reports_out_of_memory() {
        let mut vram = Vram::new(128);
        vram.alloc(96).unwrap();
        match vram.alloc(64) {
            Err(TextureError::OutOfDeviceMemory { requested, available }) => {
                assert_eq!(requested, 64);
                assert_eq!(available, 32);
            }
            other => panic!("expected OutOfDeviceMemory, got {:?}", other),
        }
    }

    #[test]
    fn test_upload_quantises_and_unload_frees() {
        let mut vram = Vram::new(64 * 1024);
        let tex = Texture::checkerboard(16, 16, 4, Color::new(0x12, 0x34, 0x56), Color::WHITE);
        let info = vram.upload(&tex, PixelFormat::Rgb565).unwrap();
        assert_eq!(info.size_bytes(), 16 * 16 * 2);
        let stored = vram.texture(info.addr()).unwrap();
        assert_eq!(stored.pixels[0], PixelFormat::Rgb565.quantize(Color::new(0x12, 0x34, 0x56)));
        vram.unload(info);
        assert_eq!(vram.used(), 0);
    }

    #[test]
    fn test_non_power_of_two_is_rejected() {
        let mut vram = Vram::new(64 * 1024);
        let tex = Texture::new(24, 16);
        assert!(matches!(vram.upload(&tex, PixelFormat::Rgb565), Err(TextureError::DecodeFailed { .. })));
    }

    #[test]
    fn test_missing_file_is_not_found() {
        let mut vram = Vram::new(64 * 1024);
        let result = load_texture_file(&mut vram, "does/not/exist.png", PixelFormat::Rgb565);
        assert!(matches!(result, Err(TextureError::NotFound(_))));
    }
}
