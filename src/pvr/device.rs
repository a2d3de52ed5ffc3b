//! Device bring-up and the frame/scene sequencer
//!
//! A frame goes: `wait_ready` -> `scene_begin` -> (`list_begin` ->
//! `direct_render` ... -> `list_finish`)* -> `scene_finish`. Two command
//! buffers alternate between the submitting thread and a render worker
//! thread, so one frame can be built while the previous one is drawn.
//! `wait_ready` is the only call that blocks.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use serde::{Serialize, Deserialize};
use thiserror::Error;
use super::command::{CommandBuffer, DrState};
use super::header::MAX_TEXTURE_MEMORY;
use super::emit::EmitError;
use super::render::{render_frame, Framebuffer, RasterSettings};
use super::types::{Color, ListKind};
use super::vram::{SharedVram, Vram};

/// Command buffers in flight
const BUFFER_COUNT: usize = 2;

/// Per-list tile bin size; `Zero` disables the list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinSize {
    Zero,
    Eight,
    Sixteen,
    ThirtyTwo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InitParams {
    /// Indexed by `ListKind::index()`
    pub bin_sizes: [BinSize; ListKind::COUNT],
    pub vertex_buffer_bytes: usize,
    pub vram_bytes: usize,
    pub width: usize,
    pub height: usize,
    /// Render at twice the width and average down
    pub horizontal_supersample: bool,
    pub background: Color,
    pub raster: RasterSettings,
}

impl Default for InitParams {
    fn default() -> Self {
        Self {
            bin_sizes: [BinSize::Sixteen, BinSize::Zero, BinSize::Sixteen],
            vertex_buffer_bytes: 512 * 1024,
            vram_bytes: 8 * 1024 * 1024,
            width: 640,
            height: 480,
            horizontal_supersample: false,
            background: Color::BLACK,
            raster: RasterSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SequenceError {
    #[error("a scene is already in progress")]
    SceneInProgress,
    #[error("no scene has been begun")]
    NoScene,
    #[error("the {0} list is already open")]
    ListAlreadyOpen(&'static str),
    #[error("the {0} list was already submitted this frame")]
    ListAlreadySubmitted(&'static str),
    #[error("the {0} list is disabled (zero bin size)")]
    ListDisabled(&'static str),
    #[error("no list is open")]
    NoListOpen,
    #[error("the {0} list is still open")]
    ListStillOpen(&'static str),
    #[error("render worker is gone")]
    HardwareLost,
}

/// Any error that aborts building a frame
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error(transparent)]
    Sequence(#[from] SequenceError),
    #[error(transparent)]
    Emit(#[from] EmitError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameStats {
    pub frame_count: u64,
    pub vertex_bytes_used: usize,
    pub vertex_bytes_used_max: usize,
    pub last_render_time: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SceneState {
    Idle,
    Ready,
    InScene,
}

struct Submission {
    buffer: CommandBuffer,
    clear_depth: f32,
    frame: u64,
}

/// Framebuffer the worker publishes finished frames into
pub type FrontBuffer = Arc<Mutex<Framebuffer>>;

pub struct Device {
    params: InitParams,
    state: SceneState,
    open_list: Option<ListKind>,
    submitted: [bool; ListKind::COUNT],
    current: Option<CommandBuffer>,
    free: Vec<CommandBuffer>,
    frame: u64,
    vram: SharedVram,
    front: FrontBuffer,
    stats: Arc<Mutex<FrameStats>>,
    clear_depth: f32,
    submit_tx: Option<Sender<Submission>>,
    returned_rx: Receiver<CommandBuffer>,
    worker: Option<JoinHandle<()>>,
}

impl Device {
    /// Allocate buffers and texture memory and start the render worker
    pub fn init(mut params: InitParams) -> std::io::Result<Self> {
        if params.vram_bytes > MAX_TEXTURE_MEMORY {
            log::warn!(
                "texture memory of {} KiB is beyond what headers can address, using {} KiB",
                params.vram_bytes / 1024,
                MAX_TEXTURE_MEMORY / 1024
            );
            params.vram_bytes = MAX_TEXTURE_MEMORY;
        }
        let vram = Vram::shared(params.vram_bytes);
        let front = Arc::new(Mutex::new(Framebuffer::new(params.width, params.height)));
        let stats = Arc::new(Mutex::new(FrameStats::default()));
        let (submit_tx, submit_rx) = mpsc::channel::<Submission>();
        let (returned_tx, returned_rx) = mpsc::channel::<CommandBuffer>();

        let worker = Worker {
            params: params.clone(),
            vram: Arc::clone(&vram),
            front: Arc::clone(&front),
            stats: Arc::clone(&stats),
        };
        let handle = std::thread::Builder::new()
            .name("pvr-render".to_string())
            .spawn(move || worker.run(submit_rx, returned_tx))?;

        let free = (0..BUFFER_COUNT)
            .map(|_| CommandBuffer::new(params.vertex_buffer_bytes))
            .collect();

        log::info!(
            "device: {}x{}{}, vertex buffer {} KiB x{}, texture memory {} KiB",
            params.width,
            params.height,
            if params.horizontal_supersample { " (2x horizontal supersample)" } else { "" },
            params.vertex_buffer_bytes / 1024,
            BUFFER_COUNT,
            params.vram_bytes / 1024,
        );

        Ok(Self {
            params,
            state: SceneState::Idle,
            open_list: None,
            submitted: [false; ListKind::COUNT],
            current: None,
            free,
            frame: 0,
            vram,
            front,
            stats,
            clear_depth: 0.0,
            submit_tx: Some(submit_tx),
            returned_rx,
            worker: Some(handle),
        })
    }

    pub fn params(&self) -> &InitParams {
        &self.params
    }

    pub fn vram(&self) -> &SharedVram {
        &self.vram
    }

    pub fn front_buffer(&self) -> &FrontBuffer {
        &self.front
    }

    pub fn stats(&self) -> FrameStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Depth the worker clears to before drawing frames submitted from now on
    pub fn set_clear_depth(&mut self, depth: f32) {
        self.clear_depth = depth;
    }

    /// Block until a command buffer is free for the next frame
    pub fn wait_ready(&mut self) -> Result<(), SequenceError> {
        match self.state {
            SceneState::InScene => Err(SequenceError::SceneInProgress),
            SceneState::Ready => Ok(()),
            SceneState::Idle => {
                let buffer = self.acquire()?;
                self.current = Some(buffer);
                self.state = SceneState::Ready;
                Ok(())
            }
        }
    }

    pub fn scene_begin(&mut self) -> Result<(), SequenceError> {
        if self.state == SceneState::InScene {
            return Err(SequenceError::SceneInProgress);
        }
        self.wait_ready()?;
        self.state = SceneState::InScene;
        self.submitted = [false; ListKind::COUNT];
        log::trace!("frame {}: scene begin", self.frame);
        Ok(())
    }

    pub fn list_begin(&mut self, kind: ListKind) -> Result<(), SequenceError> {
        if self.state != SceneState::InScene {
            return Err(SequenceError::NoScene);
        }
        if let Some(open) = self.open_list {
            return Err(SequenceError::ListAlreadyOpen(open.label()));
        }
        if self.params.bin_sizes[kind.index()] == BinSize::Zero {
            return Err(SequenceError::ListDisabled(kind.label()));
        }
        if self.submitted[kind.index()] {
            return Err(SequenceError::ListAlreadySubmitted(kind.label()));
        }
        self.open_list = Some(kind);
        Ok(())
    }

    /// Cursor onto the open list
    pub fn direct_render(&mut self) -> Result<DrState<'_>, SequenceError> {
        let kind = self.open_list.ok_or(SequenceError::NoListOpen)?;
        let buffer = self.current.as_mut().ok_or(SequenceError::NoScene)?;
        Ok(DrState::new(buffer, kind))
    }

    pub fn list_finish(&mut self) -> Result<(), SequenceError> {
        let kind = self.open_list.take().ok_or(SequenceError::NoListOpen)?;
        self.submitted[kind.index()] = true;
        Ok(())
    }

    /// Hand the frame to the render worker
    pub fn scene_finish(&mut self) -> Result<(), SequenceError> {
        if self.state != SceneState::InScene {
            return Err(SequenceError::NoScene);
        }
        if let Some(open) = self.open_list {
            return Err(SequenceError::ListStillOpen(open.label()));
        }
        let buffer = self.current.take().ok_or(SequenceError::NoScene)?;
        let tx = self.submit_tx.as_ref().ok_or(SequenceError::HardwareLost)?;
        tx.send(Submission { buffer, clear_depth: self.clear_depth, frame: self.frame })
            .map_err(|_| SequenceError::HardwareLost)?;
        self.frame += 1;
        self.state = SceneState::Idle;
        Ok(())
    }

    /// Throw away the frame being built; nothing of it reaches the display
    pub fn abort_scene(&mut self) {
        if let Some(mut buffer) = self.current.take() {
            buffer.reset();
            self.free.push(buffer);
        }
        self.open_list = None;
        self.state = SceneState::Idle;
        log::warn!("frame {}: scene aborted", self.frame);
    }

    /// Block until every submitted frame has been drawn
    pub fn wait_idle(&mut self) -> Result<(), SequenceError> {
        while self.free.len() + usize::from(self.current.is_some()) < BUFFER_COUNT {
            let buffer = self.returned_rx.recv().map_err(|_| SequenceError::HardwareLost)?;
            self.free.push(buffer);
        }
        Ok(())
    }

    /// Drain in-flight frames and stop the worker
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        if self.worker.is_none() {
            return;
        }
        if let Err(e) = self.wait_idle() {
            log::warn!("device: {} while draining", e);
        }
        self.submit_tx = None;
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                log::error!("device: render worker panicked");
            }
        }
        let stats = self.stats();
        log::info!(
            "device: shut down after {} frames (peak vertex buffer use {} bytes)",
            stats.frame_count,
            stats.vertex_bytes_used_max
        );
    }

    fn acquire(&mut self) -> Result<CommandBuffer, SequenceError> {
        while let Ok(buffer) = self.returned_rx.try_recv() {
            self.free.push(buffer);
        }
        match self.free.pop() {
            Some(buffer) => Ok(buffer),
            None => self.returned_rx.recv().map_err(|_| SequenceError::HardwareLost),
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    params: InitParams,
    vram: SharedVram,
    front: FrontBuffer,
    stats: Arc<Mutex<FrameStats>>,
}

impl Worker {
    fn run(self, submissions: Receiver<Submission>, returned: Sender<CommandBuffer>) {
        let mut settings = self.params.raster;
        let width = if self.params.horizontal_supersample {
            settings.x_scale = 2.0;
            self.params.width * 2
        } else {
            self.params.width
        };
        let mut back = Framebuffer::new(width, self.params.height);

        for Submission { mut buffer, clear_depth, frame } in submissions {
            let start = Instant::now();
            back.clear(self.params.background, clear_depth);
            {
                let vram = self.vram.read().unwrap_or_else(PoisonError::into_inner);
                render_frame(&mut back, &buffer, &vram, &settings);
            }
            {
                let mut front = self.front.lock().unwrap_or_else(PoisonError::into_inner);
                back.resolve_into(&mut front);
            }

            let used = buffer.used_bytes();
            {
                let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
                stats.frame_count += 1;
                stats.vertex_bytes_used = used;
                stats.vertex_bytes_used_max = stats.vertex_bytes_used_max.max(used);
                stats.last_render_time = start.elapsed();
            }
            log::trace!("frame {}: drew {} bytes of records in {:?}", frame, used, start.elapsed());

            buffer.reset();
            if returned.send(buffer).is_err() {
                break;
            }
        }
        log::debug!("render worker exiting");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pvr::emit::StripEmitter;
    use crate::pvr::header::PolyContext;
    use crate::pvr::math::Vec3;
    use crate::pvr::types::Vertex;

    fn small_device() -> Device {
        Device::init(InitParams {
            width: 16,
            height: 16,
            vertex_buffer_bytes: 4096,
            vram_bytes: 4096,
            ..InitParams::default()
        })
        .unwrap()
    }

    #[test]
    fn test_well_formed_frame_is_accepted() {
        let mut dev = small_device();
        dev.wait_ready().unwrap();
        dev.scene_begin().unwrap();
        dev.list_begin(ListKind::Opaque).unwrap();
        {
            let mut dr = dev.direct_render().unwrap();
            let mut em = StripEmitter::new(&mut dr);
            let white = Color::WHITE;
            em.emit_face(
                &PolyContext::colored(ListKind::Opaque),
                &[
                    Vertex::colored(Vec3::new(0.0, 16.0, 1.0), white),
                    Vertex::colored(Vec3::new(0.0, 0.0, 1.0), white),
                    Vertex::colored(Vec3::new(16.0, 16.0, 1.0), white),
                    Vertex::colored(Vec3::new(16.0, 0.0, 1.0), white),
                ],
            )
            .unwrap();
        }
        dev.list_finish().unwrap();
        dev.list_begin(ListKind::Translucent).unwrap();
        dev.list_finish().unwrap();
        dev.scene_finish().unwrap();
        dev.wait_idle().unwrap();

        let stats = dev.stats();
        assert_eq!(stats.frame_count, 1);
        assert_eq!(stats.vertex_bytes_used, 5 * 32);
        let front = dev.front_buffer().lock().unwrap();
        assert_eq!(front.get_pixel(8, 8), Color::WHITE);
    }

    #[test]
    fn test_list_without_scene_is_rejected() {
        let mut dev = small_device();
        assert_eq!(dev.list_begin(ListKind::Opaque), Err(SequenceError::NoScene));
        assert!(dev.direct_render().is_err());
    }

    #[test]
    fn test_ordering_violations_are_rejected() {
        let mut dev = small_device();
        dev.scene_begin().unwrap();
        assert_eq!(dev.wait_ready(), Err(SequenceError::SceneInProgress));
        assert_eq!(dev.scene_begin(), Err(SequenceError::SceneInProgress));
        assert_eq!(dev.list_finish(), Err(SequenceError::NoListOpen));
        dev.list_begin(ListKind::Opaque).unwrap();
        assert_eq!(dev.list_begin(ListKind::Translucent), Err(SequenceError::ListAlreadyOpen("opaque")));
        assert_eq!(dev.scene_finish(), Err(SequenceError::ListStillOpen("opaque")));
        dev.list_finish().unwrap();
        assert_eq!(dev.list_begin(ListKind::Opaque), Err(SequenceError::ListAlreadySubmitted("opaque")));
        assert_eq!(dev.list_begin(ListKind::PunchThrough), Err(SequenceError::ListDisabled("punch-through")));
        dev.scene_finish().unwrap();
        assert_eq!(dev.scene_finish(), Err(SequenceError::NoScene));
    }

    #[test]
    fn test_aborted_scene_releases_its_buffer() {
        let mut dev = small_device();
        for _ in 0..4 {
            dev.scene_begin().unwrap();
            dev.list_begin(ListKind::Opaque).unwrap();
            dev.abort_scene();
        }
        dev.wait_idle().unwrap();
        assert_eq!(dev.stats().frame_count, 0);
    }

    #[test]
    fn test_texture_memory_is_capped_to_the_header_address_range() {
        let dev = Device::init(InitParams {
            width: 16,
            height: 16,
            vertex_buffer_bytes: 4096,
            vram_bytes: 32 * 1024 * 1024,
            ..InitParams::default()
        })
        .unwrap();
        assert_eq!(dev.params().vram_bytes, MAX_TEXTURE_MEMORY);
        assert_eq!(dev.vram().read().unwrap().capacity(), 16 * 1024 * 1024);
        dev.shutdown();
    }

    #[test]
    fn test_many_frames_cycle_both_buffers() {
        let mut dev = small_device();
        for _ in 0..6 {
            dev.wait_ready().unwrap();
            dev.scene_begin().unwrap();
            dev.list_begin(ListKind::Opaque).unwrap();
            dev.list_finish().unwrap();
            dev.scene_finish().unwrap();
        }
        dev.wait_idle().unwrap();
        assert_eq!(dev.stats().frame_count, 6);
        dev.shutdown();
    }
}
