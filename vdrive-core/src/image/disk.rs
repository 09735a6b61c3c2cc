//! A mounted disk image.

use log::{debug, warn};

use super::format::SECTOR_SIZE;
use super::{HostFile, ImageDesc, ImageType};
use crate::bam::Bam;
use crate::chain::{SectorBuf, TrackSector};
use crate::error::{VdriveError, VdriveResult};
use crate::status::{DosFault, DosResult, ErrorCode};

/// A mounted image: host file, geometry, BAM mirror and directory buffer.
pub struct Disk<F: HostFile> {
    file: F,
    desc: ImageDesc,
    write_protected: bool,
    /// BAM mirror, written back when dirty
    pub bam: Bam,
    /// Current directory block
    pub(crate) dir: SectorBuf,
}

impl<F: HostFile> Disk<F> {
    /// Detect the image format and load the BAM.
    pub fn open(mut file: F, write_protected: bool) -> VdriveResult<Self> {
        let desc = ImageDesc::parse(&mut file)?;
        let mut disk = Self {
            file,
            bam: Bam::new(desc.kind),
            desc,
            write_protected,
            dir: [0; SECTOR_SIZE],
        };

        for (index, at) in disk.bam.locations().iter().enumerate() {
            let mut block = [0u8; SECTOR_SIZE];
            disk.read_sector(at.track, at.sector, &mut block)
                .map_err(|_| VdriveError::UnreadableBam(at.track, at.sector))?;
            *disk.bam.sector_mut(index) = block;
        }

        debug!(
            "Opened {:?} image: {} tracks, error info: {}, write protected: {}",
            disk.desc.kind,
            disk.desc.num_tracks,
            disk.desc.has_error_info(),
            write_protected
        );
        Ok(disk)
    }

    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    pub fn kind(&self) -> ImageType {
        self.desc.kind
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }

    /// Read one sector. Short host reads become READ ERROR 22; sectors
    /// flagged in the error info block fail with their recorded error.
    pub fn read_sector(&mut self, track: u8, sector: u8, buf: &mut SectorBuf) -> DosResult<()> {
        let offset = self
            .desc
            .offset(track, sector)
            .ok_or(DosFault::at(ErrorCode::IllegalTs, track, sector))?;

        match self.file.read_at(offset, buf) {
            Ok(n) if n == SECTOR_SIZE => {}
            Ok(n) => {
                warn!("Short read at {}/{}: {} bytes", track, sector, n);
                return Err(DosFault::at(ErrorCode::Read22, track, sector));
            }
            Err(e) => {
                warn!("Read failed at {}/{}: {}", track, sector, e);
                return Err(DosFault::at(ErrorCode::Read22, track, sector));
            }
        }

        match self.desc.sector_error(track, sector) {
            ErrorCode::Ok => Ok(()),
            code => Err(DosFault::at(code, track, sector)),
        }
    }

    /// Write one sector. Host failures become WRITE ERROR 25.
    pub fn write_sector(&mut self, track: u8, sector: u8, buf: &SectorBuf) -> DosResult<()> {
        if self.write_protected {
            return Err(DosFault::at(ErrorCode::WriteProtect, track, sector));
        }
        let offset = self
            .desc
            .offset(track, sector)
            .ok_or(DosFault::at(ErrorCode::IllegalTs, track, sector))?;

        match self.file.write_at(offset, buf) {
            Ok(n) if n == SECTOR_SIZE => Ok(()),
            Ok(n) => {
                warn!("Short write at {}/{}: {} bytes", track, sector, n);
                Err(DosFault::at(ErrorCode::Write25, track, sector))
            }
            Err(e) => {
                warn!("Write failed at {}/{}: {}", track, sector, e);
                Err(DosFault::at(ErrorCode::Write25, track, sector))
            }
        }
    }

    /// Write dirty BAM sectors back to the image.
    pub fn flush_bam(&mut self) -> DosResult<()> {
        for (index, at) in self.bam.locations().iter().enumerate() {
            if self.bam.is_dirty(index) {
                let block = *self.bam.sector(index);
                self.write_sector(at.track, at.sector, &block)?;
                self.bam.set_clean(index);
            }
        }
        if let Err(e) = self.file.flush() {
            warn!("Flush failed: {}", e);
        }
        Ok(())
    }

    /// Re-read the BAM from the image, discarding the in-memory copy.
    pub fn reload_bam(&mut self) -> DosResult<()> {
        for (index, at) in self.bam.locations().iter().enumerate() {
            let mut block = [0u8; SECTOR_SIZE];
            self.read_sector(at.track, at.sector, &mut block)?;
            *self.bam.sector_mut(index) = block;
            self.bam.set_clean(index);
        }
        Ok(())
    }

    /// Free every block of a chain. Stops at the end marker (track 0) or at
    /// the first illegal link.
    pub fn free_chain(&mut self, start: TrackSector) -> DosResult<()> {
        let mut at = start;
        let mut buf = [0u8; SECTOR_SIZE];
        // Bounded by the number of sectors in case the chain loops
        for _ in 0..self.desc.num_sectors() {
            if self.bam.free(at.track, at.sector).is_err() {
                break;
            }
            self.read_sector(at.track, at.sector, &mut buf)?;
            at = TrackSector::new(buf[0], buf[1]);
        }
        Ok(())
    }

    /// Allocate the next block of a chain.
    pub fn alloc_next(&mut self, from: TrackSector, interleave: u8) -> DosResult<TrackSector> {
        self.bam.alloc_next(from, interleave)
    }

    /// Flush the BAM and release the host file.
    pub fn close(mut self) -> F {
        if let Err(fault) = self.flush_bam() {
            warn!("BAM write-back failed: {:?}", fault);
        }
        self.file
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::{MemoryImage, D64_SIZE_35, D64_SIZE_35_ERR};

    fn blank() -> Disk<MemoryImage> {
        Disk::open(
            MemoryImage::blank(ImageType::D64, "DISK", "01").unwrap(),
            false,
        )
        .unwrap()
    }

    #[test]
    fn test_open_loads_bam() {
        let disk = blank();
        assert_eq!(disk.kind(), ImageType::D64);
        assert_eq!(disk.bam.blocks_free(), 664);
        assert_eq!(&disk.bam.disk_label()[..4], b"DISK");
    }

    #[test]
    fn test_sector_round_trip() {
        let mut disk = blank();
        let block = [0x5A; 256];
        disk.write_sector(1, 0, &block).unwrap();
        let mut buf = [0; 256];
        disk.read_sector(1, 0, &mut buf).unwrap();
        assert_eq!(buf, block);
    }

    #[test]
    fn test_illegal_sector() {
        let mut disk = blank();
        let mut buf = [0; 256];
        let fault = disk.read_sector(18, 19, &mut buf).unwrap_err();
        assert_eq!(fault, DosFault::at(ErrorCode::IllegalTs, 18, 19));
    }

    #[test]
    fn test_write_protected() {
        let mut disk = Disk::open(
            MemoryImage::blank(ImageType::D64, "DISK", "01").unwrap(),
            true,
        )
        .unwrap();
        let fault = disk.write_sector(1, 0, &[0; 256]).unwrap_err();
        assert_eq!(fault.code, ErrorCode::WriteProtect);
    }

    #[test]
    fn test_error_info_fails_read() {
        let mut data = MemoryImage::blank(ImageType::D64, "DISK", "01")
            .unwrap()
            .into_inner();
        data.resize(D64_SIZE_35_ERR as usize, 1);
        // Track 1 sector 0: 23 READ ERROR
        data[D64_SIZE_35 as usize] = 5;
        let mut disk = Disk::open(MemoryImage::new(data), false).unwrap();
        let mut buf = [0; 256];
        let fault = disk.read_sector(1, 0, &mut buf).unwrap_err();
        assert_eq!(fault, DosFault::at(ErrorCode::Read23, 1, 0));
        assert!(disk.read_sector(1, 1, &mut buf).is_ok());
    }

    #[test]
    fn test_unreadable_bam() {
        let mut data = MemoryImage::blank(ImageType::D64, "DISK", "01")
            .unwrap()
            .into_inner();
        data.resize(D64_SIZE_35_ERR as usize, 1);
        // BAM sector 18/0 flagged as 20 READ ERROR
        data[D64_SIZE_35 as usize + 357] = 2;
        assert!(matches!(
            Disk::open(MemoryImage::new(data), false),
            Err(VdriveError::UnreadableBam(18, 0))
        ));
    }

    #[test]
    fn test_bam_flush_and_reload() {
        let mut disk = blank();
        disk.bam.alloc(1, 0).unwrap();
        disk.flush_bam().unwrap();
        disk.bam.free(1, 0).unwrap();
        disk.reload_bam().unwrap();
        assert!(!disk.bam.is_free(1, 0));

        let image = disk.close();
        let mut disk = Disk::open(image, false).unwrap();
        assert!(!disk.bam.is_free(1, 0));
        disk.reload_bam().unwrap();
        assert_eq!(disk.bam.blocks_free(), 663);
    }

    #[test]
    fn test_free_chain() {
        let mut disk = blank();
        let first = disk.bam.alloc_first(10).unwrap();
        let second = disk.alloc_next(first, 10).unwrap();

        let mut block = [0u8; 256];
        block[0] = second.track;
        block[1] = second.sector;
        disk.write_sector(first.track, first.sector, &block).unwrap();
        block[0] = 0;
        block[1] = 10;
        disk.write_sector(second.track, second.sector, &block).unwrap();

        assert_eq!(disk.bam.blocks_free(), 662);
        disk.free_chain(first).unwrap();
        assert_eq!(disk.bam.blocks_free(), 664);
        assert!(disk.bam.is_free(first.track, first.sector));
        assert!(disk.bam.is_free(second.track, second.sector));
    }
}
