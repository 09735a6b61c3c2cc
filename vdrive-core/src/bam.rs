//! Block Availability Map.
//!
//! The BAM keeps, per track, a free-block counter followed by a bitmap with
//! one bit per sector (set = free). The in-memory copy is the source of truth
//! while an image is mounted; it is written back lazily when marked dirty.
//!
//! Layout:
//! - D64/X64: one sector (18/0), 4-byte entries from offset 4, tracks 1-35
//! - D81: two sectors (40/1 for tracks 1-40, 40/2 for tracks 41-80),
//!   6-byte entries from offset 16

use crate::chain::{SectorBuf, TrackSector};
use crate::image::{ImageType, D81_DIR_TRACK, DIR_TRACK};
use crate::status::{DosFault, DosResult, ErrorCode};

/// Offset of the D64 disk name inside the BAM sector.
pub const D64_DISK_NAME: usize = 0x90;

const D64_ENTRY_START: usize = 4;
const D64_ENTRY_SIZE: usize = 4;
const D81_ENTRY_START: usize = 16;
const D81_ENTRY_SIZE: usize = 6;

/// In-memory BAM mirror. On a real 1541 this lives at $0700 in drive RAM.
#[derive(Debug, Clone)]
pub struct Bam {
    kind: ImageType,
    sectors: [SectorBuf; 2],
    dirty: [bool; 2],
}

impl Bam {
    pub fn new(kind: ImageType) -> Self {
        Self {
            kind,
            sectors: [[0; 256]; 2],
            dirty: [false; 2],
        }
    }

    /// On-disk location of each BAM sector held by this map.
    pub fn locations(&self) -> &'static [TrackSector] {
        const D64: [TrackSector; 1] = [TrackSector::new(DIR_TRACK, 0)];
        const D81: [TrackSector; 2] = [
            TrackSector::new(D81_DIR_TRACK, 1),
            TrackSector::new(D81_DIR_TRACK, 2),
        ];
        if self.kind.is_d81() {
            &D81
        } else {
            &D64
        }
    }

    /// Raw BAM sector.
    pub fn sector(&self, index: usize) -> &SectorBuf {
        &self.sectors[index]
    }

    /// Mutable raw BAM sector. The caller is responsible for marking it
    /// dirty or reloading it afterwards.
    pub fn sector_mut(&mut self, index: usize) -> &mut SectorBuf {
        &mut self.sectors[index]
    }

    pub fn is_dirty(&self, index: usize) -> bool {
        self.dirty[index]
    }

    pub fn set_clean(&mut self, index: usize) {
        self.dirty[index] = false;
    }

    /// D64 disk name, ID and DOS type as stored in the BAM (23 bytes).
    pub fn disk_label(&self) -> &[u8] {
        &self.sectors[0][D64_DISK_NAME..D64_DISK_NAME + 23]
    }

    /// Locate the entry of a track: (BAM sector index, byte offset).
    fn entry(&self, track: u8) -> Option<(usize, usize)> {
        if track == 0 || track > self.kind.max_track() {
            return None;
        }
        if self.kind.is_d81() {
            let (index, t) = if track <= 40 { (0, track) } else { (1, track - 40) };
            Some((index, D81_ENTRY_START + (t as usize - 1) * D81_ENTRY_SIZE))
        } else {
            Some((0, D64_ENTRY_START + (track as usize - 1) * D64_ENTRY_SIZE))
        }
    }

    /// Location of a sector bit: (BAM sector index, counter offset, bitmap
    /// byte offset, mask). `None` for an illegal address.
    fn bit(&self, track: u8, sector: u8) -> Option<(usize, usize, usize, u8)> {
        if sector >= self.kind.sectors_on(track) {
            return None;
        }
        let (index, offset) = self.entry(track)?;
        Some((index, offset, offset + sector as usize / 8 + 1, 1 << (sector & 7)))
    }

    /// Whether a block is marked free. Illegal addresses are never free.
    pub fn is_free(&self, track: u8, sector: u8) -> bool {
        self.bit(track, sector)
            .is_some_and(|(index, _, byte, mask)| self.sectors[index][byte] & mask != 0)
    }

    /// Free-block counter of a track.
    pub fn free_count(&self, track: u8) -> u8 {
        self.entry(track)
            .map_or(0, |(index, offset)| self.sectors[index][offset])
    }

    /// Number of free bits in the bitmap of a track.
    pub fn bitmap_free(&self, track: u8) -> u8 {
        (0..self.kind.sectors_on(track))
            .filter(|&s| self.is_free(track, s))
            .count() as u8
    }

    /// Mark a block as used.
    pub fn alloc(&mut self, track: u8, sector: u8) -> DosResult<()> {
        let (index, count, byte, mask) = self
            .bit(track, sector)
            .ok_or(DosFault::at(ErrorCode::IllegalTs, track, sector))?;

        let bam = &mut self.sectors[index];
        if bam[byte] & mask == 0 {
            return Err(DosFault::at(ErrorCode::NoBlock, track, sector));
        }
        bam[byte] &= !mask;
        bam[count] = bam[count].wrapping_sub(1);
        self.dirty[index] = true;
        Ok(())
    }

    /// Mark a block as free. Freeing an already free block is a no-op.
    pub fn free(&mut self, track: u8, sector: u8) -> DosResult<()> {
        let (index, count, byte, mask) = self
            .bit(track, sector)
            .ok_or(DosFault::at(ErrorCode::IllegalTs, track, sector))?;

        let bam = &mut self.sectors[index];
        if bam[byte] & mask == 0 {
            bam[byte] |= mask;
            bam[count] = bam[count].wrapping_add(1);
            self.dirty[index] = true;
        }
        Ok(())
    }

    /// Total free blocks, excluding the directory track.
    pub fn blocks_free(&self) -> u16 {
        let dir_track = self.kind.dir_track();
        (1..=self.kind.max_track())
            .filter(|&t| t != dir_track)
            .map(|t| self.free_count(t) as u16)
            .sum()
    }

    /// Allocate the block following `from` at the given interleave.
    pub fn alloc_next(&mut self, from: TrackSector, interleave: u8) -> DosResult<TrackSector> {
        self.place(from.track, from.sector as i16, interleave)
    }

    /// Allocate the first data block of a new file. The search starts just
    /// below the directory track.
    pub fn alloc_first(&mut self, interleave: u8) -> DosResult<TrackSector> {
        self.place(self.kind.dir_track() - 1, -(interleave as i16), interleave)
    }

    /// Block placement. Walks away from the directory track until a track
    /// with free blocks is found, switching sides at most once, then probes
    /// forward from `sector + interleave`.
    fn place(&mut self, track: u8, sector: i16, interleave: u8) -> DosResult<TrackSector> {
        let dir_track = self.kind.dir_track();
        let max_track = self.kind.max_track();
        let mut side_changed = false;
        let mut t = track;
        let mut s = sector;

        while self.free_count(t) == 0 {
            if t == dir_track {
                // The directory does not grow onto other tracks
                return Err(ErrorCode::DiskFull.into());
            } else if t > dir_track {
                t += 1;
                if t > max_track {
                    if side_changed {
                        return Err(ErrorCode::DiskFull.into());
                    }
                    side_changed = true;
                    t = dir_track - 1;
                    s = 0;
                }
            } else {
                t = t.saturating_sub(1);
                if t == 0 {
                    if side_changed {
                        return Err(ErrorCode::DiskFull.into());
                    }
                    side_changed = true;
                    t = dir_track + 1;
                    s = 0;
                }
            }
        }

        let num = self.kind.sectors_on(t) as i16;
        s += interleave as i16;
        if s >= num {
            s -= num;
            if s > 0 {
                s -= 1;
            }
        }
        let mut s = s.clamp(0, num - 1) as u8;

        let mut count = 0;
        while !self.is_free(t, s) && count < num {
            s += 1;
            if s as i16 >= num {
                s = 0;
            }
            count += 1;
        }
        if count >= num {
            // Counter says free, bitmap disagrees
            return Err(DosFault::at(ErrorCode::DirError, t, s));
        }

        self.alloc(t, s)?;
        Ok(TrackSector::new(t, s))
    }
}
