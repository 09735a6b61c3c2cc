//! In-memory disk image.

use std::io;

use super::format::{
    ImageType, D64_SIZE_35, D81_DIR_TRACK, D81_NUM_TRACKS, D81_SECTORS_PER_TRACK, D81_SIZE,
    DIR_TRACK, SECTOR_SIZE,
};
use super::{HostFile, ImageDesc};
use crate::error::{VdriveError, VdriveResult};

/// Disk image held in a byte vector.
#[derive(Debug, Default, Clone)]
pub struct MemoryImage {
    data: Vec<u8>,
}

impl MemoryImage {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }

    /// Create a freshly formatted 35-track D64 or 80-track D81. X64 images
    /// cannot be created.
    ///
    /// `name` is at most 16 characters, `id` at most 2. Both are stored as
    /// given; callers convert to PETSCII beforehand if needed.
    pub fn blank(kind: ImageType, name: &str, id: &str) -> VdriveResult<Self> {
        if name.len() > 16 {
            return Err(VdriveError::NameTooLong(name.to_string()));
        }
        if id.len() > 2 {
            return Err(VdriveError::NameTooLong(id.to_string()));
        }

        let mut padded_id = [0xA0u8; 2];
        padded_id[..id.len()].copy_from_slice(id.as_bytes());

        match kind {
            ImageType::D64 => {
                let mut image = Self::new(vec![0; D64_SIZE_35 as usize]);
                image.format_d64(name.as_bytes(), padded_id);
                Ok(image)
            }
            ImageType::D81 => {
                let mut image = Self::new(vec![0; D81_SIZE as usize]);
                image.format_d81(name.as_bytes(), padded_id);
                Ok(image)
            }
            ImageType::X64 => Err(VdriveError::UnsupportedImage(kind)),
        }
    }

    /// Raw image bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }

    fn sector_mut(&mut self, desc: &ImageDesc, track: u8, sector: u8) -> &mut [u8] {
        let offset = desc.offset(track, sector).unwrap_or(0) as usize;
        &mut self.data[offset..offset + SECTOR_SIZE]
    }

    fn format_d64(&mut self, name: &[u8], id: [u8; 2]) {
        let desc = ImageDesc::new(ImageType::D64, 35);

        let bam = self.sector_mut(&desc, DIR_TRACK, 0);
        bam[0] = DIR_TRACK;
        bam[1] = 1;
        bam[2] = b'A';
        for track in 1..=35u8 {
            let sectors = super::sectors_per_track(track);
            let entry = &mut bam[4 + (track as usize - 1) * 4..][..4];
            fill_bitmap(entry, sectors);
            if track == DIR_TRACK {
                // BAM and first directory block
                entry[0] -= 2;
                entry[1] &= !0x03;
            }
        }
        bam[0x90..0xAB].fill(0xA0);
        bam[0x90..0x90 + name.len()].copy_from_slice(name);
        bam[0xA2..0xA4].copy_from_slice(&id);
        bam[0xA5] = b'2';
        bam[0xA6] = b'A';

        let dir = self.sector_mut(&desc, DIR_TRACK, 1);
        dir[1] = 0xFF;
    }

    fn format_d81(&mut self, name: &[u8], id: [u8; 2]) {
        let desc = ImageDesc::new(ImageType::D81, D81_NUM_TRACKS);

        let header = self.sector_mut(&desc, D81_DIR_TRACK, 0);
        header[0] = D81_DIR_TRACK;
        header[1] = 3;
        header[2] = b'D';
        header[4..29].fill(0xA0);
        header[4..4 + name.len()].copy_from_slice(name);
        header[22..24].copy_from_slice(&id);
        header[25] = b'3';
        header[26] = b'D';

        for side in 0..2u8 {
            let bam = self.sector_mut(&desc, D81_DIR_TRACK, 1 + side);
            if side == 0 {
                bam[0] = D81_DIR_TRACK;
                bam[1] = 2;
            } else {
                bam[1] = 0xFF;
            }
            bam[2] = b'D';
            bam[3] = 0xBB;
            bam[4..6].copy_from_slice(&id);
            bam[6] = 0xC0;
            for i in 0..40u8 {
                let track = side * 40 + i + 1;
                let entry = &mut bam[16 + i as usize * 6..][..6];
                fill_bitmap(entry, D81_SECTORS_PER_TRACK);
                if track == D81_DIR_TRACK {
                    // Header, both BAM sectors and first directory block
                    entry[0] -= 4;
                    entry[1] &= !0x0F;
                }
            }
        }

        let dir = self.sector_mut(&desc, D81_DIR_TRACK, 3);
        dir[1] = 0xFF;
    }
}

/// Mark `sectors` blocks free in a BAM entry (count byte then bitmap).
fn fill_bitmap(entry: &mut [u8], sectors: u8) {
    entry[0] = sectors;
    for s in 0..sectors as usize {
        entry[1 + s / 8] |= 1 << (s & 7);
    }
}

impl HostFile for MemoryImage {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let start = (offset as usize).min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        Ok(n)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<usize> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_write() {
        let mut image = MemoryImage::new(vec![0; 8]);
        assert_eq!(image.write_at(2, &[1, 2, 3]).unwrap(), 3);
        let mut buf = [0u8; 4];
        assert_eq!(image.read_at(1, &mut buf).unwrap(), 4);
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn test_short_read_at_end() {
        let mut image = MemoryImage::new(vec![7; 4]);
        let mut buf = [0u8; 8];
        assert_eq!(image.read_at(2, &mut buf).unwrap(), 2);
        assert_eq!(image.read_at(10, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_blank_d64_bam() {
        let image = MemoryImage::blank(ImageType::D64, "DISK", "01").unwrap();
        let data = image.as_bytes();
        assert_eq!(data.len(), 174_848);

        let bam = &data[357 * 256..358 * 256];
        assert_eq!(&bam[0..3], &[18, 1, b'A']);
        // Track 1 fully free
        assert_eq!(&bam[4..8], &[21, 0xFF, 0xFF, 0x1F]);
        // Track 18 minus two blocks
        let t18 = 4 + 17 * 4;
        assert_eq!(bam[t18], 17);
        assert_eq!(bam[t18 + 1], 0xFC);
        assert_eq!(&bam[0x90..0x94], b"DISK");
        assert_eq!(bam[0x94], 0xA0);
        assert_eq!(&bam[0xA2..0xA4], b"01");

        let dir = &data[358 * 256..359 * 256];
        assert_eq!(&dir[0..2], &[0, 0xFF]);
    }

    #[test]
    fn test_blank_d81_bam() {
        let image = MemoryImage::blank(ImageType::D81, "DISK", "01").unwrap();
        let data = image.as_bytes();
        assert_eq!(data.len(), 819_200);

        let header = 39 * 40 * 256;
        assert_eq!(&data[header + 4..header + 8], b"DISK");
        let bam1 = header + 256;
        // Track 40 lives in the first BAM sector at entry 39
        let t40 = bam1 + 16 + 39 * 6;
        assert_eq!(data[t40], 36);
        assert_eq!(data[t40 + 1], 0xF0);
        let bam2 = header + 512;
        assert_eq!(data[bam2 + 16], 40);
    }

    #[test]
    fn test_blank_x64_rejected() {
        assert!(matches!(
            MemoryImage::blank(ImageType::X64, "DISK", "01"),
            Err(VdriveError::UnsupportedImage(ImageType::X64))
        ));
    }

    #[test]
    fn test_blank_name_too_long() {
        assert!(MemoryImage::blank(ImageType::D64, "A VERY LONG DISK NAME", "01").is_err());
    }
}
