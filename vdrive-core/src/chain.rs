//! Sector chains.
//!
//! Every file and the directory are stored as singly-linked chains of
//! 256-byte sectors. Bytes 0/1 of each sector hold the track/sector of the
//! next block; track 0 ends the chain, in which case byte 1 is the offset of
//! the last used byte in the block.

use serde::Serialize;

use crate::image::{Disk, HostFile};
use crate::status::DosResult;

/// One 256-byte sector.
pub type SectorBuf = [u8; 256];

/// Address of a block on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TrackSector {
    pub track: u8,
    pub sector: u8,
}

impl TrackSector {
    pub const fn new(track: u8, sector: u8) -> Self {
        Self { track, sector }
    }
}

/// Link to the next block, `None` at the end of the chain.
pub fn link(block: &SectorBuf) -> Option<TrackSector> {
    match block[0] {
        0 => None,
        track => Some(TrackSector::new(track, block[1])),
    }
}

/// Set the link bytes of a block.
pub fn set_link(block: &mut SectorBuf, track: u8, sector: u8) {
    block[0] = track;
    block[1] = sector;
}

/// Walks a sector chain one block at a time.
///
/// A cursor visits at most `limit` blocks, so a corrupt (cyclic) chain
/// cannot hang the drive.
#[derive(Debug, Clone)]
pub struct ChainCursor {
    next: Option<TrackSector>,
    remaining: usize,
}

impl ChainCursor {
    pub fn new(start: TrackSector, limit: usize) -> Self {
        Self {
            next: Some(start),
            remaining: limit,
        }
    }

    /// Read the next block of the chain into `buf`.
    ///
    /// Returns the address of the block just read, or `None` once the chain
    /// ended or the limit was reached.
    pub fn next_block<F: HostFile>(
        &mut self,
        disk: &mut Disk<F>,
        buf: &mut SectorBuf,
    ) -> DosResult<Option<TrackSector>> {
        let Some(at) = self.next else {
            return Ok(None);
        };
        if self.remaining == 0 {
            return Ok(None);
        }

        disk.read_sector(at.track, at.sector, buf)?;
        self.remaining -= 1;
        self.next = link(buf);
        Ok(Some(at))
    }

    /// Whether blocks were left unvisited because the limit was hit.
    pub fn truncated(&self) -> bool {
        self.next.is_some() && self.remaining == 0
    }
}
