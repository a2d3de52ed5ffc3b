//! Demo scenes driving the direct-render pipeline
//!
//! Each demo owns its pose and mode, reads the pad in `update` and builds
//! its lists in `render`. Scene begin/finish belong to the caller.

mod cube;
mod strip;
mod sprite;
mod backdrop;

pub use cube::*;
pub use strip::*;
pub use sprite::*;
pub use backdrop::*;

use std::sync::PoisonError;
use serde::{Serialize, Deserialize};
use crate::config::{TextureConfig, TextureSource};
use crate::noise::{generate_texture, NoiseParams, NOISE_TEXTURE_SIZE};
use crate::pvr::{
    Device, DrState, EmitError, FrameError, ListKind, PixelFormat, SharedVram, TextureBinding, TextureError,
    TextureFilter, TextureInfo, Vram,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DemoKind {
    #[default]
    TexturedCube,
    SixTextureCube,
    SpriteCube,
    NoiseCube,
    ZoomBackground,
}

impl DemoKind {
    pub const ALL: [DemoKind; 5] = [
        DemoKind::TexturedCube,
        DemoKind::SixTextureCube,
        DemoKind::SpriteCube,
        DemoKind::NoiseCube,
        DemoKind::ZoomBackground,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            DemoKind::TexturedCube => "Textured Cube",
            DemoKind::SixTextureCube => "Six Texture Cube",
            DemoKind::SpriteCube => "Sprite Cube",
            DemoKind::NoiseCube => "Noise Cube",
            DemoKind::ZoomBackground => "Zoom Background",
        }
    }

    pub fn from_index(i: usize) -> Option<DemoKind> {
        DemoKind::ALL.get(i).copied()
    }

    pub fn index(&self) -> usize {
        DemoKind::ALL.iter().position(|k| k == self).unwrap_or(0)
    }

    /// The following demo, wrapping around
    pub fn next(&self) -> DemoKind {
        DemoKind::ALL[(self.index() + 1) % DemoKind::ALL.len()]
    }
}

/// Open `kind`, hand its cursor to `f`, then close it
pub fn in_list<F>(dev: &mut Device, kind: ListKind, f: F) -> Result<(), FrameError>
where
    F: FnOnce(&mut DrState<'_>) -> Result<(), EmitError>,
{
    dev.list_begin(kind)?;
    {
        let mut dr = dev.direct_render()?;
        f(&mut dr)?;
    }
    dev.list_finish()?;
    Ok(())
}

/// Noise textures in rotation
pub const NOISE_SLOTS: usize = 2;

/// Every texture the demos draw with, resident in device memory
pub struct DemoTextures {
    pub filter: TextureFilter,
    pub cube: TextureInfo,
    pub faces: Vec<TextureInfo>,
    /// Two copies, alternated per frame so the one being drawn is never
    /// rewritten
    pub noise: [TextureInfo; NOISE_SLOTS],
    pub background_normal: TextureInfo,
    pub background_zoomed: TextureInfo,
}

impl DemoTextures {
    /// Upload every demo texture. On failure the ones already resident
    /// are freed again before the error is returned.
    pub fn upload(vram: &SharedVram, config: &TextureConfig, noise: &NoiseParams) -> Result<Self, TextureError> {
        let mut vram = vram.write().unwrap_or_else(PoisonError::into_inner);
        let mut uploaded = Vec::new();
        let result = Self::upload_into(&mut vram, config, noise, &mut uploaded);
        if result.is_err() {
            for addr in uploaded {
                vram.free(addr);
            }
            log::warn!("texture upload failed, {} bytes still in use", vram.used());
        }
        result
    }

    /// `uploaded` collects the address of each texture as it lands
    fn upload_into(
        vram: &mut Vram,
        config: &TextureConfig,
        noise: &NoiseParams,
        uploaded: &mut Vec<u32>,
    ) -> Result<Self, TextureError> {
        let mut load = |source: &TextureSource| -> Result<TextureInfo, TextureError> {
            let texture = source.load()?;
            let info = vram.upload(&texture, config.format)?;
            uploaded.push(info.addr());
            log::info!(
                "uploaded texture '{}' ({}x{}, {} bytes)",
                texture.name,
                info.width,
                info.height,
                info.size_bytes()
            );
            Ok(info)
        };

        let cube = load(&config.cube)?;
        let faces = if config.faces.len() == CUBE_FACES {
            config.faces.iter().map(&mut load).collect::<Result<Vec<_>, _>>()?
        } else {
            log::warn!(
                "expected {} face textures, got {}; using the cube texture on every face",
                CUBE_FACES,
                config.faces.len()
            );
            (0..CUBE_FACES).map(|_| load(&config.cube)).collect::<Result<Vec<_>, _>>()?
        };
        let background_normal = load(&config.background_normal)?;
        let background_zoomed = load(&config.background_zoomed)?;
        drop(load);

        let texels = generate_texture(noise, NOISE_TEXTURE_SIZE);
        let first = vram.upload(&texels, PixelFormat::Rgb565)?;
        uploaded.push(first.addr());
        let second = vram.upload(&texels, PixelFormat::Rgb565)?;
        uploaded.push(second.addr());
        let noise = [first, second];
        log::debug!("texture memory: {} of {} bytes used", vram.used(), vram.capacity());

        Ok(Self {
            filter: config.filter,
            cube,
            faces,
            noise,
            background_normal,
            background_zoomed,
        })
    }

    pub fn binding(&self, info: &TextureInfo) -> TextureBinding {
        TextureBinding::new(info, self.filter)
    }

    /// Return every texture to device memory
    pub fn release(self, vram: &SharedVram) {
        let mut vram = vram.write().unwrap_or_else(PoisonError::into_inner);
        vram.unload(self.cube);
        for face in self.faces {
            vram.unload(face);
        }
        for slot in self.noise {
            vram.unload(slot);
        }
        vram.unload(self.background_normal);
        vram.unload(self.background_zoomed);
        log::info!("textures released, {} bytes still in use", vram.used());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_demo_cycle_wraps() {
        let mut kind = DemoKind::TexturedCube;
        for _ in 0..DemoKind::ALL.len() {
            kind = kind.next();
        }
        assert_eq!(kind, DemoKind::TexturedCube);
        assert_eq!(DemoKind::from_index(3), Some(DemoKind::NoiseCube));
        assert_eq!(DemoKind::ZoomBackground.next(), DemoKind::TexturedCube);
    }

    #[test]
    fn test_textures_upload_and_release() {
        let vram = Vram::shared(4 * 1024 * 1024);
        let textures = DemoTextures::upload(&vram, &TextureConfig::default(), &NoiseParams::default()).unwrap();
        assert_eq!(textures.faces.len(), CUBE_FACES);
        assert_eq!(textures.noise[0].width as usize, NOISE_TEXTURE_SIZE);
        assert_ne!(textures.noise[0].addr(), textures.noise[1].addr());
        assert!(vram.read().unwrap().used() > 0);
        textures.release(&vram);
        assert_eq!(vram.read().unwrap().used(), 0);
    }

    #[test]
    fn test_texture_memory_exhaustion_is_reported() {
        let vram = Vram::shared(16 * 1024);
        let result = DemoTextures::upload(&vram, &TextureConfig::default(), &NoiseParams::default());
        assert!(matches!(result, Err(TextureError::OutOfDeviceMemory { .. })));
        assert_eq!(vram.read().unwrap().used(), 0);
    }
}
