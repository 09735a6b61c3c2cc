//! Opening, streaming and closing files.

use log::{debug, trace};

use super::channel::{Channel, DirectChannel, FileChannel, Listing};
use super::{BusByte, Drive};
use crate::chain::{set_link, ChainCursor, TrackSector};
use crate::dos::{
    build_listing, listing_pattern, DirSlot, FileMode, FileSpec, FileType, CLOSED,
};
use crate::image::HostFile;
use crate::status::{st, DosFault, DosResult, ErrorCode};

/// Written into an otherwise empty last block.
const CR: u8 = 0x0D;

impl<F: HostFile> Drive<F> {
    /// `$` on channel 0: synthesize the listing program.
    pub(super) fn open_directory(&mut self, args: &[u8]) -> DosResult<()> {
        let disk = self.disk_or_not_ready()?;
        let data = build_listing(disk, listing_pattern(args))?;
        debug!("Directory listing: {} bytes", data.len());
        self.channels[0] = Channel::Directory(Listing { data, pos: 0 });
        Ok(())
    }

    /// `$` on any other channel: read the directory track as a file.
    pub(super) fn open_raw_directory(&mut self, channel: usize) -> DosResult<()> {
        let dir_track = self.disk_or_not_ready()?.kind().dir_track();
        self.open_chain(channel, TrackSector::new(dir_track, 0))
    }

    /// `#` or `#n`: claim a drive buffer for direct access.
    pub(super) fn open_direct(&mut self, channel: usize, name: &[u8]) -> DosResult<()> {
        let want = match name {
            [_] => None,
            [_, n @ b'0'..=b'3'] => Some((n - b'0') as usize),
            _ => return Err(ErrorCode::NoChannel.into()),
        };
        let buffer = self
            .buffers
            .alloc(want)
            .ok_or(DosFault::new(ErrorCode::NoChannel))?;

        // The buffer number can be read back as the first byte
        self.buffers.page_mut(buffer)[1] = b'0' + buffer as u8;
        self.channels[channel] = Channel::Direct(DirectChannel {
            buffer,
            pos: 1,
            len: 1,
        });
        Ok(())
    }

    /// Open a chain for reading, starting at `start`.
    fn open_chain(&mut self, channel: usize, start: TrackSector) -> DosResult<()> {
        let buffer = self
            .buffers
            .alloc(None)
            .ok_or(DosFault::new(ErrorCode::NoChannel))?;

        // First read follows this link
        let page = self.buffers.page_mut(buffer);
        set_link(page, start.track, start.sector);

        self.channels[channel] = Channel::File(FileChannel {
            buffer,
            pos: 0,
            remaining: 0,
            writing: false,
            block: start,
            num_blocks: 0,
            slot: None,
        });
        Ok(())
    }

    /// Open a named file.
    pub(super) fn open_file(&mut self, channel: usize, name: &[u8]) -> DosResult<()> {
        let mut spec = FileSpec::parse(name);

        // Channel 0 is LOAD, channel 1 is SAVE
        if channel <= 1 {
            spec.mode = if channel == 1 {
                FileMode::Write
            } else {
                FileMode::Read
            };
            if spec.file_type == FileType::Del {
                spec.file_type = FileType::Prg;
            }
        }
        let mode = spec.mode;
        let mut file_type = spec.file_type as u8;
        let writing = spec.is_writing();

        if writing && spec.has_wildcards() {
            return Err(ErrorCode::Syntax33.into());
        }
        let disk = self.disk_or_not_ready()?;
        if writing && disk.is_write_protected() {
            return Err(ErrorCode::WriteProtect.into());
        }
        if file_type == FileType::Rel as u8 {
            return Err(ErrorCode::Unimplemented.into());
        }

        let Some(slot) = disk.find_file(&spec.name)? else {
            if file_type == FileType::Del as u8 {
                file_type = FileType::Seq as u8;
            }
            return match mode {
                FileMode::Write => self.create_file(channel, &spec.name, file_type, None),
                _ => Err(ErrorCode::FileNotFound.into()),
            };
        };

        let entry = disk.dir_entry(slot.entry);
        let existing_type = entry.file_type();
        let closed = entry.is_closed();
        let start = entry.start();
        if file_type == FileType::Del as u8 {
            file_type = existing_type;
        }
        if existing_type != file_type {
            return Err(ErrorCode::FileType.into());
        }

        match mode {
            FileMode::Write if spec.replace => {
                self.create_file(channel, &spec.name, file_type, Some(slot))
            }
            FileMode::Write => Err(ErrorCode::FileExists.into()),
            FileMode::Append => self.open_append(channel, slot, start),
            FileMode::M => self.open_chain(channel, start),
            FileMode::Read if closed => self.open_chain(channel, start),
            FileMode::Read => Err(ErrorCode::WriteFileOpen.into()),
        }
    }

    /// Create a file for writing. With `replace`, the new chain is staged
    /// in the replacement fields of the existing entry until close.
    fn create_file(
        &mut self,
        channel: usize,
        name: &[u8],
        file_type: u8,
        replace: Option<DirSlot>,
    ) -> DosResult<()> {
        let buffer = self
            .buffers
            .alloc(None)
            .ok_or(DosFault::new(ErrorCode::NoChannel))?;

        match self.stage_entry(name, file_type, replace) {
            Ok((slot, first)) => {
                debug!(
                    "Created {:?} at {}/{}",
                    String::from_utf8_lossy(name),
                    first.track,
                    first.sector
                );
                self.channels[channel] = Channel::File(FileChannel {
                    buffer,
                    pos: 2,
                    remaining: 0,
                    writing: true,
                    block: first,
                    num_blocks: 1,
                    slot: Some(slot),
                });
                Ok(())
            }
            Err(fault) => {
                self.buffers.free(buffer);
                Err(fault)
            }
        }
    }

    /// Allocate the directory slot and first block of a new file and write
    /// the provisional (unclosed) entry.
    fn stage_entry(
        &mut self,
        name: &[u8],
        file_type: u8,
        replace: Option<DirSlot>,
    ) -> DosResult<(DirSlot, TrackSector)> {
        let disk = self.disk_or_not_ready()?;
        let slot = match replace {
            Some(slot) => slot,
            None => disk.alloc_dir_entry()?,
        };

        let interleave = disk.kind().data_interleave();
        let first = disk.bam.alloc_first(interleave)?;

        // The slot allocation or search may have read other blocks
        disk.load_dir_block(slot.block)?;
        let mut entry = disk.dir_entry(slot.entry);
        if replace.is_some() {
            entry.set_type_byte(file_type);
            entry.set_replacement(Some(first));
        } else {
            entry.clear();
            entry.set_type_byte(file_type);
            entry.set_start(first);
            entry.set_name(name);
        }
        disk.store_dir_block(slot.block)?;
        Ok((slot, first))
    }

    /// Open an existing file and position after its last byte.
    fn open_append(&mut self, channel: usize, slot: DirSlot, start: TrackSector) -> DosResult<()> {
        let buffer = self
            .buffers
            .alloc(None)
            .ok_or(DosFault::new(ErrorCode::NoChannel))?;

        match self.seek_end(buffer, start) {
            Ok((last, num_blocks)) => {
                let pos = self.buffers.page(buffer)[1] as usize + 1;
                trace!("Append at {}/{} offset {}", last.track, last.sector, pos);
                self.channels[channel] = Channel::File(FileChannel {
                    buffer,
                    pos,
                    remaining: 0,
                    writing: true,
                    block: last,
                    num_blocks,
                    slot: Some(slot),
                });
                Ok(())
            }
            Err(fault) => {
                self.buffers.free(buffer);
                Err(fault)
            }
        }
    }

    /// Walk a chain into `buffer`, leaving its last block there.
    fn seek_end(&mut self, buffer: usize, start: TrackSector) -> DosResult<(TrackSector, u16)> {
        let disk = self.disk_or_not_ready()?;
        let mut cursor = ChainCursor::new(start, disk.desc().num_sectors());
        let mut block = [0u8; 256];
        let mut last = None;
        let mut num_blocks = 0u16;
        while let Some(at) = cursor.next_block(disk, &mut block)? {
            last = Some(at);
            num_blocks += 1;
        }
        let last = last.ok_or(DosFault::at(ErrorCode::IllegalTs, start.track, start.sector))?;
        *self.buffers.page_mut(buffer) = block;
        Ok((last, num_blocks))
    }

    /// Read the next byte of a file channel.
    pub(super) fn read_file(&mut self, channel: usize) -> BusByte {
        let Channel::File(file) = &mut self.channels[channel] else {
            return BusByte::timeout(st::READ_TIMEOUT);
        };
        if file.writing || self.error.code != ErrorCode::Ok {
            return BusByte::timeout(st::READ_TIMEOUT);
        }

        let page = self.buffers.page_mut(file.buffer);
        if file.remaining == 0 && page[0] != 0 {
            let Some(disk) = self.disk.as_mut() else {
                self.latch(ErrorCode::NotReady.into());
                return BusByte::timeout(st::READ_TIMEOUT);
            };
            let next = TrackSector::new(page[0], page[1]);
            if let Err(fault) = disk.read_sector(next.track, next.sector, page) {
                self.latch(fault);
                return BusByte::timeout(st::READ_TIMEOUT);
            }
            file.block = next;
            file.pos = 2;
            file.remaining = if page[0] != 0 {
                254
            } else {
                (page[1] as usize).saturating_sub(1)
            };
        }

        if file.remaining == 0 {
            return BusByte::timeout(st::READ_TIMEOUT);
        }
        let value = page[file.pos];
        file.pos += 1;
        file.remaining -= 1;
        let status = if file.remaining == 0 && page[0] == 0 {
            st::EOF
        } else {
            st::OK
        };
        BusByte::new(value, status)
    }

    /// Append a byte to a file channel, moving to a new block when the
    /// buffer is full.
    pub(super) fn write_file(&mut self, channel: usize, byte: u8) -> u8 {
        let Channel::File(file) = &mut self.channels[channel] else {
            return st::TIMEOUT;
        };
        if !file.writing || self.error.code != ErrorCode::Ok {
            return st::TIMEOUT;
        }

        let page = self.buffers.page_mut(file.buffer);
        if file.pos >= 256 {
            let Some(disk) = self.disk.as_mut() else {
                self.latch(ErrorCode::NotReady.into());
                return st::TIMEOUT;
            };
            let interleave = disk.kind().data_interleave();
            let next = match disk.alloc_next(file.block, interleave) {
                Ok(next) => next,
                Err(fault) => {
                    self.latch(fault);
                    return st::TIMEOUT;
                }
            };
            file.num_blocks += 1;

            set_link(page, next.track, next.sector);
            if let Err(fault) = disk.write_sector(file.block.track, file.block.sector, page) {
                self.latch(fault);
                return st::TIMEOUT;
            }
            file.pos = 2;
            file.block = next;
        }

        page[file.pos] = byte;
        file.pos += 1;
        st::OK
    }

    /// Flush the last block of a written file and close its directory
    /// entry. A replaced file's old chain is freed here.
    pub(super) fn finish_write(&mut self, mut file: FileChannel) -> DosResult<()> {
        let Some(disk) = self.disk.as_mut() else {
            return Err(ErrorCode::NotReady.into());
        };
        let page = self.buffers.page_mut(file.buffer);

        if file.pos == 2 {
            page[2] = CR;
            file.pos = 3;
        }
        set_link(page, 0, (file.pos - 1) as u8);
        disk.write_sector(file.block.track, file.block.sector, page)?;

        let Some(slot) = file.slot else {
            return Ok(());
        };
        disk.load_dir_block(slot.block)?;
        let mut entry = disk.dir_entry(slot.entry);
        entry.set_type_byte(entry.type_byte() | CLOSED);
        entry.set_blocks(file.num_blocks);
        if let Some(replacement) = entry.replacement() {
            let old = entry.start();
            entry.set_start(replacement);
            entry.set_replacement(None);
            disk.free_chain(old)?;
        }
        disk.store_dir_block(slot.block)?;

        trace!(
            "Closed file: {} blocks, last block {}/{}",
            file.num_blocks,
            file.block.track,
            file.block.sector
        );
        Ok(())
    }
}
