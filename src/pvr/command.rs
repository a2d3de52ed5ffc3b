//! 32-byte command records and the direct-render cursor
//!
//! Everything submitted to the hardware is a burst of eight 32-bit words.
//! `DrState` mimics the pair of store queues the CPU writes through: the
//! caller targets a queue, fills it and commits it, and the queues
//! alternate so one can be filled while the other drains.

use super::emit::EmitError;
use super::math::{Vec2, Vec3};
use super::types::{Color, ListKind, StripFlag, Vertex};

pub const BURST_WORDS: usize = 8;
pub const BURST_BYTES: usize = BURST_WORDS * 4;

pub type Record = [u32; BURST_WORDS];

pub const PARA_MASK: u32 = 0xE000_0000;
pub const PARA_POLY_HEADER: u32 = 0x8000_0000;
pub const PARA_SPRITE_HEADER: u32 = 0xA000_0000;
pub const PARA_VERTEX: u32 = 0xE000_0000;
pub const END_OF_STRIP: u32 = 0x1000_0000;

pub const CMD_VERTEX: u32 = PARA_VERTEX;
pub const CMD_VERTEX_EOL: u32 = PARA_VERTEX | END_OF_STRIP;

/// Pack two floats into one word by keeping the upper 16 bits of each
pub fn pack_uv16(u: f32, v: f32) -> u32 {
    (u.to_bits() & 0xFFFF_0000) | (v.to_bits() >> 16)
}

pub fn unpack_uv16(word: u32) -> Vec2 {
    Vec2::new(f32::from_bits(word & 0xFFFF_0000), f32::from_bits(word << 16))
}

impl Vertex {
    /// Record layout: flags, x, y, z, u, v, argb, oargb
    pub fn encode(&self, flag: StripFlag) -> Record {
        let cmd = match flag {
            StripFlag::Normal => CMD_VERTEX,
            StripFlag::EndOfStrip => CMD_VERTEX_EOL,
        };
        [
            cmd,
            self.pos.x.to_bits(),
            self.pos.y.to_bits(),
            self.pos.z.to_bits(),
            self.uv.x.to_bits(),
            self.uv.y.to_bits(),
            self.argb.to_argb(),
            self.oargb.to_argb(),
        ]
    }

    pub fn decode(rec: &Record) -> (Vertex, StripFlag) {
        let flag = if rec[0] & END_OF_STRIP != 0 {
            StripFlag::EndOfStrip
        } else {
            StripFlag::Normal
        };
        let f = |i: usize| f32::from_bits(rec[i]);
        let v = Vertex {
            pos: Vec3::new(f(1), f(2), f(3)),
            uv: Vec2::new(f(4), f(5)),
            argb: Color::from_argb(rec[6]),
            oargb: Color::from_argb(rec[7]),
        };
        (v, flag)
    }
}

/// Word positions of a sprite record, which spans two bursts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpriteWord {
    Flags = 0,
    Ax = 1,
    Ay = 2,
    Az = 3,
    Bx = 4,
    By = 5,
    Bz = 6,
    Cx = 7,
    Cy = 8,
    Cz = 9,
    Dx = 10,
    Dy = 11,
    Reserved = 12,
    AUv = 13,
    BUv = 14,
    CUv = 15,
}

/// Window onto a store queue slot through which a sprite record is written.
///
/// `base` is the word offset of the sprite record's start relative to the
/// slot: 0 for the first burst, `-8` for the second, where the record
/// pointer sits one burst before the slot so that words 8..16 land in it.
pub struct BurstWindow<'r> {
    slot: &'r mut Record,
    base: isize,
}

impl<'r> BurstWindow<'r> {
    pub fn first(slot: &'r mut Record) -> Self {
        Self { slot, base: 0 }
    }

    pub fn second(slot: &'r mut Record) -> Self {
        Self { slot, base: -(BURST_WORDS as isize) }
    }

    /// Write one word of the sprite record. Words outside this burst are a
    /// programming error.
    pub fn put(&mut self, word: SpriteWord, bits: u32) {
        let idx = word as isize + self.base;
        assert!(
            (0..BURST_WORDS as isize).contains(&idx),
            "sprite word {:?} is not in this burst",
            word
        );
        self.slot[idx as usize] = bits;
    }

    pub fn put_f32(&mut self, word: SpriteWord, value: f32) {
        self.put(word, value.to_bits());
    }
}

/// Corners and texture coordinates recovered from a sprite record pair.
/// D's depth and UV are implicit in the record and are completed here so
/// that A, B, C, D form a parallelogram.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpriteCorners {
    pub pos: [Vec3; 4],
    pub uv: [Vec2; 4],
}

impl SpriteCorners {
    pub fn decode(first: &Record, second: &Record) -> Self {
        let mut words = [0u32; 2 * BURST_WORDS];
        words[..BURST_WORDS].copy_from_slice(first);
        words[BURST_WORDS..].copy_from_slice(second);
        let f = |w: SpriteWord| f32::from_bits(words[w as usize]);

        let a = Vec3::new(f(SpriteWord::Ax), f(SpriteWord::Ay), f(SpriteWord::Az));
        let b = Vec3::new(f(SpriteWord::Bx), f(SpriteWord::By), f(SpriteWord::Bz));
        let c = Vec3::new(f(SpriteWord::Cx), f(SpriteWord::Cy), f(SpriteWord::Cz));
        let d = Vec3::new(f(SpriteWord::Dx), f(SpriteWord::Dy), a.z + c.z - b.z);

        let auv = unpack_uv16(words[SpriteWord::AUv as usize]);
        let buv = unpack_uv16(words[SpriteWord::BUv as usize]);
        let cuv = unpack_uv16(words[SpriteWord::CUv as usize]);
        let duv = auv + cuv - buv;

        Self { pos: [a, b, c, d], uv: [auv, buv, cuv, duv] }
    }
}

/// Per-list record storage for one frame, bounded by the vertex buffer size
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    lists: [Vec<Record>; ListKind::COUNT],
    capacity_records: usize,
}

impl CommandBuffer {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            lists: Default::default(),
            capacity_records: capacity_bytes / BURST_BYTES,
        }
    }

    pub fn list(&self, kind: ListKind) -> &[Record] {
        &self.lists[kind.index()]
    }

    pub fn used_records(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    pub fn used_bytes(&self) -> usize {
        self.used_records() * BURST_BYTES
    }

    pub fn capacity_bytes(&self) -> usize {
        self.capacity_records * BURST_BYTES
    }

    pub fn reset(&mut self) {
        for list in &mut self.lists {
            list.clear();
        }
    }

    fn push(&mut self, kind: ListKind, rec: Record) -> Result<(), EmitError> {
        if self.used_records() >= self.capacity_records {
            return Err(EmitError::VertexBufferFull { capacity_bytes: self.capacity_bytes() });
        }
        self.lists[kind.index()].push(rec);
        Ok(())
    }
}

/// Direct-render cursor bound to the currently open list.
/// Write-only and strictly sequential: records land in commit order.
pub struct DrState<'a> {
    buffer: &'a mut CommandBuffer,
    list: ListKind,
    queues: [Record; 2],
    active: usize,
    pending: bool,
}

impl<'a> DrState<'a> {
    pub(crate) fn new(buffer: &'a mut CommandBuffer, list: ListKind) -> Self {
        Self {
            buffer,
            list,
            queues: [[0; BURST_WORDS]; 2],
            active: 1,
            pending: false,
        }
    }

    pub fn list(&self) -> ListKind {
        self.list
    }

    /// Next free store queue, cleared. Retargeting without a commit
    /// abandons the previous queue's contents.
    pub fn target(&mut self) -> &mut Record {
        self.active ^= 1;
        self.pending = true;
        let slot = &mut self.queues[self.active];
        *slot = [0; BURST_WORDS];
        slot
    }

    /// Submit the most recently targeted queue to the open list
    pub fn commit(&mut self) -> Result<(), EmitError> {
        if !self.pending {
            return Err(EmitError::NothingTargeted);
        }
        self.pending = false;
        self.buffer.push(self.list, self.queues[self.active])
    }

    /// Target, fill and commit a whole record
    pub fn submit(&mut self, rec: &Record) -> Result<(), EmitError> {
        *self.target() = *rec;
        self.commit()
    }

    /// Records committed so far to the open list
    pub fn committed(&self) -> usize {
        self.buffer.list(self.list).len()
    }
}
