//! Directory search and slot allocation.

use log::trace;

use super::dir_entry::{DirEntry, ENTRIES_PER_BLOCK, ENTRY_SIZE};
use crate::chain::{set_link, ChainCursor, TrackSector};
use crate::image::{Disk, HostFile};
use crate::status::{DosFault, DosResult, ErrorCode};

/// Position of an entry: directory block and index within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirSlot {
    pub block: TrackSector,
    pub entry: usize,
}

/// Incremental pattern search over the directory chain.
///
/// The block holding the last match stays in the disk's directory buffer,
/// so the caller can modify the entry and write the block back before
/// asking for the next match.
pub struct DirSearch<'p> {
    pattern: &'p [u8],
    cursor: ChainCursor,
    current: Option<DirSlot>,
}

impl<'p> DirSearch<'p> {
    pub fn new<F: HostFile>(disk: &Disk<F>, pattern: &'p [u8]) -> Self {
        let kind = disk.kind();
        let first = TrackSector::new(kind.dir_track(), kind.first_dir_sector());
        Self {
            pattern,
            cursor: ChainCursor::new(first, kind.max_dir_blocks()),
            current: None,
        }
    }

    /// Find the next used entry matching the pattern.
    pub fn next_match<F: HostFile>(&mut self, disk: &mut Disk<F>) -> DosResult<Option<DirSlot>> {
        loop {
            let slot = match self.current {
                Some(slot) if slot.entry + 1 < ENTRIES_PER_BLOCK => DirSlot {
                    block: slot.block,
                    entry: slot.entry + 1,
                },
                _ => {
                    let mut buf = [0u8; 256];
                    match self.cursor.next_block(disk, &mut buf)? {
                        Some(block) => {
                            disk.dir = buf;
                            DirSlot { block, entry: 0 }
                        }
                        None => return Ok(None),
                    }
                }
            };
            self.current = Some(slot);

            let entry = DirEntry::new(&mut disk.dir, slot.entry);
            if entry.is_used() && entry.matches(self.pattern) {
                return Ok(Some(slot));
            }
        }
    }
}

impl<F: HostFile> Disk<F> {
    /// Entry of the directory block currently in the buffer.
    pub fn dir_entry(&mut self, index: usize) -> DirEntry<'_> {
        DirEntry::new(&mut self.dir, index)
    }

    /// Read a directory block into the directory buffer.
    pub fn load_dir_block(&mut self, block: TrackSector) -> DosResult<()> {
        let mut buf = [0u8; 256];
        self.read_sector(block.track, block.sector, &mut buf)?;
        self.dir = buf;
        Ok(())
    }

    /// Write the directory buffer back to its block.
    pub fn store_dir_block(&mut self, block: TrackSector) -> DosResult<()> {
        let buf = self.dir;
        self.write_sector(block.track, block.sector, &buf)
    }

    /// First entry matching a pattern.
    pub fn find_file(&mut self, pattern: &[u8]) -> DosResult<Option<DirSlot>> {
        DirSearch::new(self, pattern).next_match(self)
    }

    /// Find an empty directory slot, extending the directory by one block
    /// if every existing slot is taken. The block holding the slot is left
    /// in the directory buffer.
    pub fn alloc_dir_entry(&mut self) -> DosResult<DirSlot> {
        let kind = self.kind();
        let first = TrackSector::new(kind.dir_track(), kind.first_dir_sector());
        let mut cursor = ChainCursor::new(first, kind.max_dir_blocks());
        let mut last = first;

        let mut buf = [0u8; 256];
        while let Some(block) = cursor.next_block(self, &mut buf)? {
            self.dir = buf;
            last = block;
            let free = (0..ENTRIES_PER_BLOCK).find(|&i| self.dir[2 + i * ENTRY_SIZE] == 0);
            if let Some(entry) = free {
                return Ok(DirSlot { block, entry });
            }
        }
        if cursor.truncated() {
            return Err(DosFault::at(ErrorCode::DirError, last.track, last.sector));
        }

        let block = self.alloc_next(last, kind.dir_interleave())?;
        trace!("Directory extended to {}/{}", block.track, block.sector);

        // Link the new block from the old tail, then initialize it
        set_link(&mut self.dir, block.track, block.sector);
        self.store_dir_block(last)?;

        self.dir = [0; 256];
        set_link(&mut self.dir, 0, 0xFF);
        self.store_dir_block(block)?;

        Ok(DirSlot { block, entry: 0 })
    }

    /// Number of blocks in the directory chain.
    pub fn dir_blocks(&mut self) -> DosResult<usize> {
        let kind = self.kind();
        let first = TrackSector::new(kind.dir_track(), kind.first_dir_sector());
        let mut cursor = ChainCursor::new(first, kind.max_dir_blocks());
        let mut buf = [0u8; 256];
        let mut count = 0;
        while cursor.next_block(self, &mut buf)?.is_some() {
            count += 1;
        }
        Ok(count)
    }
}
