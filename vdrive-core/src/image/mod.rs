//! Disk image backing store.
//!
//! This module provides the layered image architecture:
//! - `HostFile`: Random-access byte store holding an image
//! - `MemoryImage`: In-memory implementation
//! - `ImageDesc`: Format detection and sector addressing
//! - `Disk`: A mounted image with its BAM and directory buffer

mod disk;
mod format;
mod memory;

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};

pub use disk::Disk;
pub use format::{
    sectors_per_track, ImageDesc, ImageType, DIR_TRACK, D64_SIZE_35, D64_SIZE_35_ERR, D64_SIZE_40,
    D64_SIZE_40_ERR, D81_DIR_TRACK, D81_SIZE, D81_SIZE_ERR, SECTOR_SIZE, X64_HEADER_SIZE,
    X64_SIGNATURE,
};
pub use memory::MemoryImage;

/// Random-access storage for a disk image.
pub trait HostFile {
    /// Read into `buf` starting at `offset`. Returns the number of bytes read,
    /// which is short at end of file.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize>;

    /// Write `buf` at `offset`. Returns the number of bytes written.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize>;

    /// Current size in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Push buffered writes to the underlying store.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl HostFile for File {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..]) {
                Ok(0) => break,
                Ok(n) => total += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(total)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        self.write_all(buf)?;
        Ok(buf.len())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Write::flush(self)
    }
}
