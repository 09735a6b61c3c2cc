//! Virtual 1541/1581 Disk Drive Core
//!
//! This crate emulates a Commodore disk drive at the DOS level:
//! - Disk images (D64, X64, D81) as a sector store
//! - Block allocation (BAM), file chains and the directory
//! - Channels, drive buffers and the error channel
//! - DOS commands (`I`, `U`, `S`, ...)
//! - The IEC bus state machine and a KERNAL trap bridge
//!
//! # Architecture
//!
//! The drive uses a layered design:
//! - `HostFile` trait: Random-access storage holding an image
//! - `Disk`: A mounted image with its BAM and directory buffer
//! - `Drive`: Channels, buffers and error state on top of a `Disk`
//! - `IecBus`: LISTEN/TALK framing in front of a `Drive`
//! - `KernalTraps`: Maps 6510 KERNAL entry points to `IecBus` calls

pub mod bam;
pub mod bus;
pub mod chain;
pub mod config;
pub mod dos;
pub mod drive;
pub mod error;
pub mod image;
pub mod petscii;
pub mod status;
pub mod trap;

pub use bam::Bam;
pub use bus::IecBus;
pub use chain::{ChainCursor, SectorBuf, TrackSector};
pub use config::DriveConfig;
pub use dos::{build_listing, decode_listing, FileSpec, FileType, ListingLine};
pub use drive::{BusByte, Channel, Drive};
pub use error::{VdriveError, VdriveResult};
pub use image::{Disk, HostFile, ImageDesc, ImageType, MemoryImage};
pub use petscii::{from_petscii, to_petscii};
pub use status::{st, DosFault, DosResult, ErrorCode, Led};
pub use trap::{KernalRoutine, KernalTraps, Registers};
