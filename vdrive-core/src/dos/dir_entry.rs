//! Directory entry implementation.
//!
//! A directory block holds a 2-byte link followed by eight 32-byte entries.
//! The first two bytes of each entry after the first overlap the unused
//! tail of the previous one, so entry `i` starts at `2 + i * 32` and the
//! last entry is only 30 bytes long.
//!
//! Layout:
//! - Byte 0: File type (bits 0-2), locked (bit 6), closed (bit 7)
//! - Bytes 1-2: Track/sector of the first data block
//! - Bytes 3-18: Name (padded with $A0)
//! - Bytes 19-20: Side sector track/sector (REL files)
//! - Byte 21: Record length (REL files)
//! - Bytes 26-27: Replacement track/sector while saving with `@`
//! - Bytes 28-29: Size in blocks (little-endian)

use std::convert::TryFrom;

use crate::chain::{SectorBuf, TrackSector};

/// Entries per directory block.
pub const ENTRIES_PER_BLOCK: usize = 8;
/// Distance between entries.
pub const ENTRY_SIZE: usize = 32;
/// Length of a file name.
pub const NAME_LENGTH: usize = 16;
/// Name padding character.
pub const PAD: u8 = 0xA0;

/// Byte offsets within an entry.
pub mod offset {
    pub const TYPE: usize = 0;
    pub const TRACK: usize = 1;
    pub const SECTOR: usize = 2;
    pub const NAME: usize = 3;
    pub const SIDE_TRACK: usize = 19;
    pub const SIDE_SECTOR: usize = 20;
    pub const RECORD_LENGTH: usize = 21;
    pub const OVR_TRACK: usize = 26;
    pub const OVR_SECTOR: usize = 27;
    pub const BLOCKS_LO: usize = 28;
    pub const BLOCKS_HI: usize = 29;
}

/// Type byte flags.
pub const CLOSED: u8 = 0x80;
pub const LOCKED: u8 = 0x40;

/// CBM file types (low three bits of the type byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Deleted; as a requested type it means "unspecified"
    Del = 0,
    Seq = 1,
    Prg = 2,
    Usr = 3,
    Rel = 4,
}

impl TryFrom<u8> for FileType {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value & 0x07 {
            0 => Ok(FileType::Del),
            1 => Ok(FileType::Seq),
            2 => Ok(FileType::Prg),
            3 => Ok(FileType::Usr),
            4 => Ok(FileType::Rel),
            other => Err(other),
        }
    }
}

/// Three-letter listing name of a type byte. Types 5-7 are invalid and show
/// the same garbage a real drive does.
pub fn type_name(type_byte: u8) -> &'static [u8; 3] {
    const NAMES: [&[u8; 3]; 8] = [b"DEL", b"SEQ", b"PRG", b"USR", b"REL", b"EL?", b"EQ?", b"RG?"];
    NAMES[(type_byte & 0x07) as usize]
}

/// CBM wildcard match of a pattern against a padded 16-byte name.
///
/// `*` matches the remainder unconditionally, `?` matches any single
/// character. Patterns longer than 16 characters are truncated.
pub fn matches(pattern: &[u8], name: &[u8]) -> bool {
    let pattern = &pattern[..pattern.len().min(NAME_LENGTH)];
    for (i, &p) in pattern.iter().enumerate() {
        if p == b'*' {
            return true;
        }
        let n = name.get(i).copied().unwrap_or(PAD);
        if p != n && p != b'?' {
            return false;
        }
    }
    pattern.len() == NAME_LENGTH || name.get(pattern.len()).copied().unwrap_or(PAD) == PAD
}

/// Directory entry - view into a directory block.
pub struct DirEntry<'a> {
    mem: &'a mut [u8],
}

impl<'a> DirEntry<'a> {
    /// View entry `index` (0-7) of a directory block.
    pub fn new(block: &'a mut SectorBuf, index: usize) -> Self {
        debug_assert!(index < ENTRIES_PER_BLOCK);
        let start = 2 + index * ENTRY_SIZE;
        let end = (start + ENTRY_SIZE).min(block.len());
        Self {
            mem: &mut block[start..end],
        }
    }

    /// Raw type byte including flags.
    pub fn type_byte(&self) -> u8 {
        self.mem[offset::TYPE]
    }

    pub fn set_type_byte(&mut self, value: u8) {
        self.mem[offset::TYPE] = value;
    }

    /// File type without flags.
    pub fn file_type(&self) -> u8 {
        self.mem[offset::TYPE] & 0x07
    }

    /// Whether the slot holds a file (deleted slots have type 0).
    pub fn is_used(&self) -> bool {
        self.mem[offset::TYPE] & 0x3F != 0
    }

    /// Whether the file was closed properly.
    pub fn is_closed(&self) -> bool {
        self.mem[offset::TYPE] & CLOSED != 0
    }

    pub fn is_locked(&self) -> bool {
        self.mem[offset::TYPE] & LOCKED != 0
    }

    /// First data block.
    pub fn start(&self) -> TrackSector {
        TrackSector::new(self.mem[offset::TRACK], self.mem[offset::SECTOR])
    }

    pub fn set_start(&mut self, at: TrackSector) {
        self.mem[offset::TRACK] = at.track;
        self.mem[offset::SECTOR] = at.sector;
    }

    /// Side sector chain of a REL file.
    pub fn side_sector(&self) -> TrackSector {
        TrackSector::new(self.mem[offset::SIDE_TRACK], self.mem[offset::SIDE_SECTOR])
    }

    /// Replacement chain staged by a save-with-replace, `None` if unset.
    pub fn replacement(&self) -> Option<TrackSector> {
        match self.mem[offset::OVR_TRACK] {
            0 => None,
            track => Some(TrackSector::new(track, self.mem[offset::OVR_SECTOR])),
        }
    }

    pub fn set_replacement(&mut self, at: Option<TrackSector>) {
        let at = at.unwrap_or(TrackSector::new(0, 0));
        self.mem[offset::OVR_TRACK] = at.track;
        self.mem[offset::OVR_SECTOR] = at.sector;
    }

    /// Raw 16-byte name including padding.
    pub fn raw_name(&self) -> &[u8] {
        &self.mem[offset::NAME..offset::NAME + NAME_LENGTH]
    }

    /// Name without padding.
    pub fn name(&self) -> &[u8] {
        let raw = self.raw_name();
        let len = raw.iter().position(|&b| b == PAD).unwrap_or(NAME_LENGTH);
        &raw[..len]
    }

    /// Store a name, truncated to 16 characters and padded with $A0.
    pub fn set_name(&mut self, name: &[u8]) {
        let field = &mut self.mem[offset::NAME..offset::NAME + NAME_LENGTH];
        field.fill(PAD);
        let len = name.len().min(NAME_LENGTH);
        field[..len].copy_from_slice(&name[..len]);
    }

    /// Size in blocks.
    pub fn blocks(&self) -> u16 {
        u16::from_le_bytes([self.mem[offset::BLOCKS_LO], self.mem[offset::BLOCKS_HI]])
    }

    pub fn set_blocks(&mut self, blocks: u16) {
        let [lo, hi] = blocks.to_le_bytes();
        self.mem[offset::BLOCKS_LO] = lo;
        self.mem[offset::BLOCKS_HI] = hi;
    }

    /// Whether the name matches a CBM pattern.
    pub fn matches(&self, pattern: &[u8]) -> bool {
        matches(pattern, self.raw_name())
    }

    /// Clear the whole entry.
    pub fn clear(&mut self) {
        self.mem.fill(0);
    }
}
