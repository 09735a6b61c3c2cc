//! Disk image formats and geometry.
//!
//! Supported layouts:
//! - D64: 35 or 40 tracks of 17-21 sectors, optional trailing error info
//! - X64: a D64 behind a 64-byte header (`C\x15\x41\x64\x01\x02`, track count
//!   at offset 7), never with error info
//! - D81: 80 tracks of 40 sectors, optional trailing error info

use serde::Serialize;

use super::HostFile;
use crate::error::{VdriveError, VdriveResult};
use crate::status::ErrorCode;

/// Bytes per sector.
pub const SECTOR_SIZE: usize = 256;

/// Sectors in a 35-track image.
pub const NUM_SECTORS_35: usize = 683;
/// Sectors in a 40-track image.
pub const NUM_SECTORS_40: usize = 768;
/// Sectors in a D81 image.
pub const NUM_SECTORS_D81: usize = 3200;

pub const D64_SIZE_35: u64 = (NUM_SECTORS_35 * SECTOR_SIZE) as u64;
pub const D64_SIZE_35_ERR: u64 = (NUM_SECTORS_35 * (SECTOR_SIZE + 1)) as u64;
pub const D64_SIZE_40: u64 = (NUM_SECTORS_40 * SECTOR_SIZE) as u64;
pub const D64_SIZE_40_ERR: u64 = (NUM_SECTORS_40 * (SECTOR_SIZE + 1)) as u64;
pub const D81_SIZE: u64 = (NUM_SECTORS_D81 * SECTOR_SIZE) as u64;
pub const D81_SIZE_ERR: u64 = (NUM_SECTORS_D81 * (SECTOR_SIZE + 1)) as u64;

/// X64 file signature.
pub const X64_SIGNATURE: &[u8; 6] = b"C\x15\x41\x64\x01\x02";
/// X64 header length.
pub const X64_HEADER_SIZE: u64 = 64;

/// D64 directory track.
pub const DIR_TRACK: u8 = 18;
/// D81 directory track.
pub const D81_DIR_TRACK: u8 = 40;
pub const D81_NUM_TRACKS: u8 = 80;
pub const D81_SECTORS_PER_TRACK: u8 = 40;

/// Offset of the disk ID in the D64 BAM sector.
const D64_ID_OFFSET: usize = 162;
/// Offset of the disk ID in the D81 header sector.
const D81_ID_OFFSET: usize = 22;

/// Sectors per track, D64 zone layout (index 0 unused).
const NUM_SECTORS: [u8; 41] = [
    0, //
    21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, 21, // 1-17
    19, 19, 19, 19, 19, 19, 19, // 18-24
    18, 18, 18, 18, 18, 18, // 25-30
    17, 17, 17, 17, 17, // 31-35
    17, 17, 17, 17, 17, // 36-40
];

/// Sectors preceding each track, D64 zone layout.
const ACCUM_NUM_SECTORS: [u16; 41] = [
    0, //
    0, 21, 42, 63, 84, 105, 126, 147, 168, 189, 210, 231, 252, 273, 294, 315, 336, //
    357, 376, 395, 414, 433, 452, 471, //
    490, 508, 526, 544, 562, 580, //
    598, 615, 632, 649, 666, //
    683, 700, 717, 734, 751,
];

/// D64 sectors on a track, 0 when the track does not exist.
pub fn sectors_per_track(track: u8) -> u8 {
    NUM_SECTORS.get(track as usize).copied().unwrap_or(0)
}

/// Disk image layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageType {
    D64,
    X64,
    D81,
}

impl ImageType {
    pub fn is_d81(self) -> bool {
        self == ImageType::D81
    }

    /// Track holding BAM and directory.
    pub fn dir_track(self) -> u8 {
        if self.is_d81() {
            D81_DIR_TRACK
        } else {
            DIR_TRACK
        }
    }

    /// Sector of the first directory block.
    pub fn first_dir_sector(self) -> u8 {
        if self.is_d81() {
            3
        } else {
            1
        }
    }

    /// Highest track the allocator hands out.
    pub fn max_track(self) -> u8 {
        if self.is_d81() {
            D81_NUM_TRACKS
        } else {
            35
        }
    }

    /// Sectors on a track of this layout, 0 for a track the allocator does
    /// not manage.
    pub fn sectors_on(self, track: u8) -> u8 {
        if track == 0 || track > self.max_track() {
            0
        } else if self.is_d81() {
            D81_SECTORS_PER_TRACK
        } else {
            sectors_per_track(track)
        }
    }

    /// Interleave between directory blocks.
    pub fn dir_interleave(self) -> u8 {
        if self.is_d81() {
            1
        } else {
            3
        }
    }

    /// Interleave between data blocks of a file.
    pub fn data_interleave(self) -> u8 {
        if self.is_d81() {
            1
        } else {
            10
        }
    }

    /// Upper bound on the length of the directory chain.
    pub fn max_dir_blocks(self) -> usize {
        if self.is_d81() {
            D81_SECTORS_PER_TRACK as usize
        } else {
            sectors_per_track(DIR_TRACK) as usize
        }
    }
}

/// Parsed description of a mounted image.
#[derive(Debug, Clone)]
pub struct ImageDesc {
    pub kind: ImageType,
    /// Bytes before track 1 sector 0
    pub header_size: u64,
    pub num_tracks: u8,
    /// Disk ID from the BAM/header sector
    pub id: [u8; 2],
    /// One job code per sector, when the image carries them
    error_info: Option<Vec<u8>>,
}

impl ImageDesc {
    /// Describe an image without error info.
    pub fn new(kind: ImageType, num_tracks: u8) -> Self {
        Self {
            kind,
            header_size: if kind == ImageType::X64 {
                X64_HEADER_SIZE
            } else {
                0
            },
            num_tracks,
            id: [0; 2],
            error_info: None,
        }
    }

    /// Detect the format of a host file by header signature or size.
    pub fn parse<F: HostFile>(file: &mut F) -> VdriveResult<Self> {
        let size = file.size()?;

        let mut header = [0u8; X64_HEADER_SIZE as usize];
        if file.read_at(0, &mut header)? < header.len() {
            return Err(VdriveError::TruncatedHeader);
        }

        let mut desc = if &header[..X64_SIGNATURE.len()] == X64_SIGNATURE {
            let num_tracks = header[7];
            if !(35..=40).contains(&num_tracks) {
                return Err(VdriveError::InvalidTrackCount(num_tracks));
            }
            Self::new(ImageType::X64, num_tracks)
        } else {
            let (kind, num_tracks, data_size, sectors) = match size {
                D81_SIZE | D81_SIZE_ERR => {
                    (ImageType::D81, D81_NUM_TRACKS, D81_SIZE, NUM_SECTORS_D81)
                }
                D64_SIZE_35 | D64_SIZE_35_ERR => (ImageType::D64, 35, D64_SIZE_35, NUM_SECTORS_35),
                D64_SIZE_40 | D64_SIZE_40_ERR => (ImageType::D64, 40, D64_SIZE_40, NUM_SECTORS_40),
                _ => return Err(VdriveError::UnknownFormat(size)),
            };

            let mut desc = Self::new(kind, num_tracks);
            if size > data_size {
                let mut info = vec![0u8; sectors];
                if file.read_at(data_size, &mut info)? < sectors {
                    return Err(VdriveError::TruncatedErrorInfo);
                }
                desc.error_info = Some(info);
            }
            desc
        };

        // A short or failed read leaves the ID zeroed
        let mut bam = [0u8; SECTOR_SIZE];
        if let Some(offset) = desc.offset(desc.kind.dir_track(), 0) {
            if matches!(file.read_at(offset, &mut bam), Ok(n) if n == SECTOR_SIZE) {
                let at = if desc.kind.is_d81() {
                    D81_ID_OFFSET
                } else {
                    D64_ID_OFFSET
                };
                desc.id = [bam[at], bam[at + 1]];
            }
        }

        Ok(desc)
    }

    /// Whether per-sector error info is present.
    pub fn has_error_info(&self) -> bool {
        self.error_info.is_some()
    }

    /// Total number of sectors in the image.
    pub fn num_sectors(&self) -> usize {
        if self.kind.is_d81() {
            NUM_SECTORS_D81
        } else {
            let last = self.num_tracks as usize;
            ACCUM_NUM_SECTORS[last] as usize + NUM_SECTORS[last] as usize
        }
    }

    /// Linear sector number, `None` when track/sector is out of range.
    pub fn sector_index(&self, track: u8, sector: u8) -> Option<usize> {
        if self.kind.is_d81() {
            if track < 1 || track > D81_NUM_TRACKS || sector >= D81_SECTORS_PER_TRACK {
                return None;
            }
            return Some((track as usize - 1) * D81_SECTORS_PER_TRACK as usize + sector as usize);
        }

        if track < 1 || track > self.num_tracks || sector >= sectors_per_track(track) {
            return None;
        }
        Some(ACCUM_NUM_SECTORS[track as usize] as usize + sector as usize)
    }

    /// Byte offset of a sector in the host file, `None` when invalid.
    pub fn offset(&self, track: u8, sector: u8) -> Option<u64> {
        self.sector_index(track, sector)
            .map(|index| ((index * SECTOR_SIZE) as u64) + self.header_size)
    }

    /// Error recorded for a sector in the error info block.
    pub fn sector_error(&self, track: u8, sector: u8) -> ErrorCode {
        match (&self.error_info, self.sector_index(track, sector)) {
            (Some(info), Some(index)) => info
                .get(index)
                .map_or(ErrorCode::Ok, |&code| ErrorCode::from_job_code(code)),
            _ => ErrorCode::Ok,
        }
    }
}
