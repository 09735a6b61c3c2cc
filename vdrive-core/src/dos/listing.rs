//! `$` directory listing.
//!
//! The listing is synthesized as a tokenized BASIC program loaded at $0401:
//! a reverse-video title line with disk name and ID, one line per matching
//! file (line number = block count) and a final "BLOCKS FREE." line.

use log::warn;
use serde::Serialize;

use super::dir_entry::{type_name, DirEntry, ENTRIES_PER_BLOCK, NAME_LENGTH, PAD};
use crate::chain::{ChainCursor, TrackSector};
use crate::image::{Disk, HostFile, D81_DIR_TRACK};
use crate::status::DosResult;

/// Reverse video on.
const RVS_ON: u8 = 0x12;
/// Dummy BASIC line link.
const LINE_LINK: [u8; 2] = [0x01, 0x01];
/// Length of disk name, ID and DOS type in the header.
const LABEL_LENGTH: usize = 23;
/// Offset of the disk name in the D81 header sector.
const D81_DISK_NAME: usize = 4;

/// Pattern of a `$` open: everything after `:`, else `*`. A bare `$0`
/// lists drive 0.
pub fn listing_pattern(args: &[u8]) -> &[u8] {
    let args = if args == b"0" { &args[1..] } else { args };
    match args.iter().position(|&b| b == b':') {
        Some(colon) => &args[colon + 1..],
        None => b"*",
    }
}

/// Build the listing program for all entries matching `pattern`.
pub fn build_listing<F: HostFile>(disk: &mut Disk<F>, pattern: &[u8]) -> DosResult<Vec<u8>> {
    let mut out = vec![0x01, 0x04];
    out.extend_from_slice(&LINE_LINK);
    out.extend_from_slice(&[0, 0, RVS_ON, b'"']);

    let mut label = [0u8; 256];
    if disk.kind().is_d81() {
        disk.read_sector(D81_DIR_TRACK, 0, &mut label)?;
        label.copy_within(D81_DISK_NAME..D81_DISK_NAME + LABEL_LENGTH, 0);
    } else {
        label[..LABEL_LENGTH].copy_from_slice(disk.bam.disk_label());
    }
    let title = out.len();
    out.extend(
        label[..LABEL_LENGTH]
            .iter()
            .map(|&c| if c == PAD { b' ' } else { c }),
    );
    // Closing quote after the 16-character name
    out[title + NAME_LENGTH] = b'"';
    out.push(0);

    let kind = disk.kind();
    let first = TrackSector::new(kind.dir_track(), kind.first_dir_sector());
    let mut cursor = ChainCursor::new(first, kind.max_dir_blocks());
    let mut block = [0u8; 256];
    loop {
        match cursor.next_block(disk, &mut block) {
            Ok(Some(_)) => {}
            Ok(None) => break,
            Err(fault) => {
                // A listing is still produced from the blocks read so far
                warn!("Directory listing truncated: {:?}", fault);
                break;
            }
        }
        for index in 0..ENTRIES_PER_BLOCK {
            let entry = DirEntry::new(&mut block, index);
            if entry.type_byte() != 0 && entry.matches(pattern) {
                push_entry(&mut out, &entry);
            }
        }
    }

    out.extend_from_slice(&LINE_LINK);
    out.extend_from_slice(&disk.bam.blocks_free().to_le_bytes());
    out.extend_from_slice(b"BLOCKS FREE.");
    out.extend_from_slice(&[b' '; 13]);
    out.extend_from_slice(&[0, 0, 0]);
    Ok(out)
}

fn push_entry(out: &mut Vec<u8>, entry: &DirEntry<'_>) {
    let blocks = entry.blocks();
    out.extend_from_slice(&LINE_LINK);
    out.extend_from_slice(&blocks.to_le_bytes());

    out.push(b' ');
    if blocks < 10 {
        out.push(b' ');
    }
    if blocks < 100 {
        out.push(b' ');
    }

    out.push(b'"');
    let mut quoted = false;
    for &c in entry.raw_name() {
        if c != PAD {
            out.push(c);
        } else if quoted {
            out.push(b' ');
        } else {
            out.push(b'"');
            quoted = true;
        }
    }
    out.push(if quoted { b' ' } else { b'"' });

    out.push(if entry.is_closed() { b' ' } else { b'*' });
    out.extend_from_slice(type_name(entry.type_byte()));
    out.push(if entry.is_locked() { b'<' } else { b' ' });

    out.push(b' ');
    if blocks >= 10 {
        out.push(b' ');
    }
    if blocks >= 100 {
        out.push(b' ');
    }
    out.push(0);
}

/// One decoded line of a listing program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListingLine {
    /// BASIC line number (block count, or drive number for the title)
    pub blocks: u16,
    /// Line text as raw PETSCII
    #[serde(skip)]
    pub raw: Vec<u8>,
    /// Line text with control characters removed
    pub text: String,
}

/// Split a listing program into its lines.
pub fn decode_listing(program: &[u8]) -> Vec<ListingLine> {
    let mut lines = Vec::new();
    let mut pos = 2;
    // A line starts with a 2-byte link; a zero link ends the program
    while pos + 4 <= program.len() && (program[pos] != 0 || program[pos + 1] != 0) {
        let blocks = u16::from_le_bytes([program[pos + 2], program[pos + 3]]);
        let start = pos + 4;
        let end = program[start..]
            .iter()
            .position(|&b| b == 0)
            .map_or(program.len(), |n| start + n);
        let raw = program[start..end].to_vec();
        let text = crate::petscii::from_petscii(
            &raw.iter().copied().filter(|&b| b >= 0x20).collect::<Vec<_>>(),
        );
        lines.push(ListingLine { blocks, raw, text });
        pos = end + 1;
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dos::dir_entry::{CLOSED, LOCKED};
    use crate::image::{ImageType, MemoryImage};

    fn disk_with(files: &[(&[u8], u8, u16)]) -> Disk<MemoryImage> {
        let image = MemoryImage::blank(ImageType::D64, "TESTDISK", "01").unwrap();
        let mut disk = Disk::open(image, false).unwrap();
        for &(name, type_byte, blocks) in files {
            let slot = disk.alloc_dir_entry().unwrap();
            let mut entry = disk.dir_entry(slot.entry);
            entry.set_type_byte(type_byte);
            entry.set_name(name);
            entry.set_blocks(blocks);
            disk.store_dir_block(slot.block).unwrap();
        }
        disk
    }

    #[test]
    fn test_pattern() {
        assert_eq!(listing_pattern(b""), b"*");
        assert_eq!(listing_pattern(b"0"), b"*");
        assert_eq!(listing_pattern(b"0:H*"), b"H*");
        assert_eq!(listing_pattern(b":X"), b"X");
    }

    #[test]
    fn test_title_line() {
        let mut disk = disk_with(&[]);
        let listing = build_listing(&mut disk, b"*").unwrap();
        assert_eq!(&listing[..8], &[0x01, 0x04, 0x01, 0x01, 0, 0, 0x12, b'"']);
        assert_eq!(&listing[8..32], b"TESTDISK        \" 01 2A\0");
    }

    #[test]
    fn test_entry_line() {
        let mut disk = disk_with(&[(b"HELLO", CLOSED | 2, 3)]);
        let listing = build_listing(&mut disk, b"*").unwrap();
        let lines = decode_listing(&listing);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].blocks, 3);
        assert_eq!(lines[1].raw, b"   \"HELLO\"            PRG  ".to_vec());
        assert_eq!(lines[2].blocks, 664);
        assert_eq!(lines[2].raw, b"BLOCKS FREE.             ".to_vec());
    }

    #[test]
    fn test_open_and_locked_markers() {
        let mut disk = disk_with(&[(b"OPEN", 1, 120), (b"LOCK", CLOSED | LOCKED | 2, 12)]);
        let listing = build_listing(&mut disk, b"*").unwrap();
        let lines = decode_listing(&listing);
        assert_eq!(lines[1].raw, b" \"OPEN\"            *SEQ    ".to_vec());
        assert_eq!(lines[2].raw, b"  \"LOCK\"             PRG<  ".to_vec());
    }

    #[test]
    fn test_pattern_filters_entries() {
        let mut disk = disk_with(&[(b"ALPHA", CLOSED | 2, 1), (b"BETA", CLOSED | 2, 1)]);
        let listing = build_listing(&mut disk, b"B*").unwrap();
        let lines = decode_listing(&listing);
        assert_eq!(lines.len(), 3);
        assert!(lines[1].text.contains("beta"));
    }

    #[test]
    fn test_full_length_name() {
        let mut disk = disk_with(&[(b"ABCDEFGHIJKLMNOP", CLOSED | 2, 1)]);
        let listing = build_listing(&mut disk, b"*").unwrap();
        let lines = decode_listing(&listing);
        assert_eq!(lines[1].raw, b"   \"ABCDEFGHIJKLMNOP\" PRG  ".to_vec());
    }

    #[test]
    fn test_d81_title() {
        let image = MemoryImage::blank(ImageType::D81, "BIGDISK", "81").unwrap();
        let mut disk = Disk::open(image, false).unwrap();
        let listing = build_listing(&mut disk, b"*").unwrap();
        assert_eq!(&listing[8..32], b"BIGDISK         \" 81 3D\0");
        let lines = decode_listing(&listing);
        assert_eq!(lines.last().unwrap().blocks, 3160);
    }
}
