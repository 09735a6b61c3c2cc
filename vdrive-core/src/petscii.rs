//! ASCII/PETSCII conversion.
//!
//! Only letters are remapped: PETSCII swaps the case ranges relative to ASCII
//! and uses $C1-$DA as a second upper-case range.

/// Convert an ASCII character to PETSCII.
pub fn ascii_to_petscii(c: u8) -> u8 {
    if c.is_ascii_alphabetic() {
        c ^ 0x20
    } else {
        c
    }
}

/// Convert a PETSCII character to ASCII.
pub fn petscii_to_ascii(c: u8) -> u8 {
    if c.is_ascii_alphabetic() {
        c ^ 0x20
    } else if (0xC1..=0xDA).contains(&c) {
        c ^ 0x80
    } else {
        c
    }
}

/// Convert an ASCII string to PETSCII bytes.
pub fn to_petscii(s: &str) -> Vec<u8> {
    s.bytes().map(ascii_to_petscii).collect()
}

/// Convert PETSCII bytes to an ASCII string. Bytes outside 7-bit range are
/// replaced with `?`.
pub fn from_petscii(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|&b| petscii_to_ascii(b))
        .map(|b| if b.is_ascii() { b as char } else { '?' })
        .collect()
}
