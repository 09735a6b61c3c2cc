//! Channels and drive buffers.

use crate::chain::{SectorBuf, TrackSector};
use crate::dos::DirSlot;

/// Number of logical channels (0-15 plus two internal ones).
pub const MAX_CHANNELS: usize = 18;
/// The command/error channel.
pub const COMMAND_CHANNEL: usize = 15;
/// Number of shared sector buffers.
pub const NUM_BUFFERS: usize = 4;

/// State of a logical channel.
#[derive(Debug, Default)]
pub enum Channel {
    #[default]
    Free,
    /// Command/error channel (always channel 15)
    Command,
    /// Synthesized `$` listing
    Directory(Listing),
    /// Sequential file access through a drive buffer
    File(FileChannel),
    /// `#` direct buffer access
    Direct(DirectChannel),
}

impl Channel {
    /// Drive buffer held by this channel.
    pub fn buffer(&self) -> Option<usize> {
        match self {
            Channel::File(file) => Some(file.buffer),
            Channel::Direct(direct) => Some(direct.buffer),
            _ => None,
        }
    }

    pub fn is_free(&self) -> bool {
        matches!(self, Channel::Free)
    }
}

/// Listing program being streamed.
#[derive(Debug)]
pub struct Listing {
    pub data: Vec<u8>,
    pub pos: usize,
}

/// Open sequential file.
#[derive(Debug)]
pub struct FileChannel {
    /// Drive buffer holding the current block
    pub buffer: usize,
    /// Next byte in the buffer
    pub pos: usize,
    /// Bytes left in the buffer (reading)
    pub remaining: usize,
    pub writing: bool,
    /// Block currently in the buffer (writing)
    pub block: TrackSector,
    /// Blocks written so far
    pub num_blocks: u16,
    /// Directory entry of the file (writing)
    pub slot: Option<DirSlot>,
}

/// Direct access buffer.
#[derive(Debug)]
pub struct DirectChannel {
    pub buffer: usize,
    pub pos: usize,
    pub len: usize,
}

/// The four 256-byte drive buffers, pages $0300-$06FF of drive RAM.
pub struct BufferPool {
    free: u8,
    pages: Box<[SectorBuf; NUM_BUFFERS]>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            free: (1 << NUM_BUFFERS) - 1,
            pages: Box::new([[0; 256]; NUM_BUFFERS]),
        }
    }

    /// Claim a buffer. `None` picks any, scanning from the highest number.
    pub fn alloc(&mut self, want: Option<usize>) -> Option<usize> {
        let found = match want {
            None => (0..NUM_BUFFERS).rev().find(|&n| self.is_free(n)),
            Some(n) if n < NUM_BUFFERS && self.is_free(n) => Some(n),
            Some(_) => None,
        }?;
        self.free &= !(1 << found);
        Some(found)
    }

    /// Return a buffer to the pool.
    pub fn free(&mut self, n: usize) {
        if n < NUM_BUFFERS {
            self.free |= 1 << n;
        }
    }

    pub fn is_free(&self, n: usize) -> bool {
        n < NUM_BUFFERS && self.free & (1 << n) != 0
    }

    /// Number of buffers not in use.
    pub fn available(&self) -> usize {
        self.free.count_ones() as usize
    }

    pub fn page(&self, n: usize) -> &SectorBuf {
        &self.pages[n]
    }

    pub fn page_mut(&mut self, n: usize) -> &mut SectorBuf {
        &mut self.pages[n]
    }

    /// Free every buffer and clear its contents.
    pub fn reset(&mut self) {
        self.free = (1 << NUM_BUFFERS) - 1;
        for page in self.pages.iter_mut() {
            page.fill(0);
        }
    }
}
