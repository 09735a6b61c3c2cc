//! File name parsing.
//!
//! Syntax: `[@][drive:]name[,type][,mode]`
//! - type: `S`eq, `P`rg, `U`sr, `D`el, `L`,<record length> (relative)
//! - mode: `R`ead, `W`rite, `A`ppend, `M` (open even if not closed)

use super::dir_entry::{FileType, NAME_LENGTH};

/// Access mode requested when opening a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileMode {
    #[default]
    Read,
    Write,
    Append,
    /// Read a file that was never closed
    M,
}

/// Parsed OPEN file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSpec {
    /// Plain name (at most 16 characters, may contain wildcards)
    pub name: Vec<u8>,
    pub mode: FileMode,
    /// `Del` when no type was given
    pub file_type: FileType,
    pub record_length: u8,
    /// Save-with-replace (`@` prefix)
    pub replace: bool,
}

impl FileSpec {
    /// Parse a raw OPEN name.
    pub fn parse(raw: &[u8]) -> Self {
        let replace = raw.first() == Some(&b'@');

        let body = match raw.iter().position(|&b| b == b':') {
            Some(colon) => &raw[colon + 1..],
            None if replace => &raw[1..],
            None => raw,
        };

        let mut parts = body.split(|&b| b == b',');
        let mut name = parts.next().unwrap_or_default().to_vec();
        while name.last() == Some(&b'\r') {
            name.pop();
        }
        name.truncate(NAME_LENGTH);

        let mut spec = Self {
            name,
            mode: FileMode::Read,
            file_type: FileType::Del,
            record_length: 0,
            replace,
        };

        while let Some(param) = parts.next() {
            match param.first() {
                Some(b'D') => spec.file_type = FileType::Del,
                Some(b'S') => spec.file_type = FileType::Seq,
                Some(b'P') => spec.file_type = FileType::Prg,
                Some(b'U') => spec.file_type = FileType::Usr,
                Some(b'L') => {
                    spec.file_type = FileType::Rel;
                    // Record length is the first byte of the next parameter
                    spec.record_length = parts
                        .next()
                        .and_then(|p| p.first().copied())
                        .unwrap_or(0);
                }
                Some(b'R') => spec.mode = FileMode::Read,
                Some(b'W') => spec.mode = FileMode::Write,
                Some(b'A') => spec.mode = FileMode::Append,
                Some(b'M') => spec.mode = FileMode::M,
                _ => {}
            }
        }

        spec
    }

    /// Whether the name contains wildcards.
    pub fn has_wildcards(&self) -> bool {
        self.name.iter().any(|&b| b == b'*' || b == b'?')
    }

    /// Whether the mode writes to the file.
    pub fn is_writing(&self) -> bool {
        matches!(self.mode, FileMode::Write | FileMode::Append)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_name() {
        let spec = FileSpec::parse(b"HELLO");
        assert_eq!(spec.name, b"HELLO");
        assert_eq!(spec.mode, FileMode::Read);
        assert_eq!(spec.file_type, FileType::Del);
        assert!(!spec.replace);
    }

    #[test]
    fn test_drive_prefix_and_params() {
        let spec = FileSpec::parse(b"0:DATA,S,W");
        assert_eq!(spec.name, b"DATA");
        assert_eq!(spec.file_type, FileType::Seq);
        assert_eq!(spec.mode, FileMode::Write);
    }

    #[test]
    fn test_replace() {
        let spec = FileSpec::parse(b"@0:PROG,P,W");
        assert!(spec.replace);
        assert_eq!(spec.name, b"PROG");

        let spec = FileSpec::parse(b"@PROG");
        assert!(spec.replace);
        assert_eq!(spec.name, b"PROG");
    }

    #[test]
    fn test_trailing_cr_stripped() {
        let spec = FileSpec::parse(b"NAME\r\r");
        assert_eq!(spec.name, b"NAME");
    }

    #[test]
    fn test_relative_record_length() {
        let spec = FileSpec::parse(b"REL,L,\x40");
        assert_eq!(spec.file_type, FileType::Rel);
        assert_eq!(spec.record_length, 0x40);
        assert_eq!(spec.mode, FileMode::Read);
    }

    #[test]
    fn test_long_name_truncated() {
        let spec = FileSpec::parse(b"THIS NAME IS FAR TOO LONG");
        assert_eq!(spec.name.len(), 16);
    }

    #[test]
    fn test_wildcards() {
        assert!(FileSpec::parse(b"H*").has_wildcards());
        assert!(FileSpec::parse(b"H?LLO").has_wildcards());
        assert!(!FileSpec::parse(b"HELLO").has_wildcards());
    }

    #[test]
    fn test_append_and_m_modes() {
        assert!(FileSpec::parse(b"LOG,S,A").is_writing());
        assert_eq!(FileSpec::parse(b"LOG,M").mode, FileMode::M);
    }
}
