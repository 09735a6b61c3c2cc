//! DOS error codes, KERNAL status bits and drive LED state.

use std::fmt;

/// KERNAL serial status bits (the ST variable at $90).
pub mod st {
    /// No error
    pub const OK: u8 = 0x00;
    /// Timeout while reading from a talker
    pub const READ_TIMEOUT: u8 = 0x02;
    /// Timeout (write side, or nothing to transfer)
    pub const TIMEOUT: u8 = 0x03;
    /// End of file / EOI
    pub const EOF: u8 = 0x40;
    /// Device not present
    pub const NOT_PRESENT: u8 = 0x80;
}

/// 1541 DOS error codes as reported on the command channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// 00
    Ok,
    /// 01, track field carries the number of files
    Scratched,
    /// 03
    Unimplemented,
    /// 20: block header not found
    Read20,
    /// 21: no sync character
    Read21,
    /// 22: data block not present
    Read22,
    /// 23: checksum error in data block
    Read23,
    /// 24: byte decoding error
    Read24,
    /// 25: write-verify error
    Write25,
    /// 26
    WriteProtect,
    /// 27: checksum error in header
    Read27,
    /// 28: long data block
    Write28,
    /// 29
    DiskId,
    /// 30: general syntax
    Syntax30,
    /// 31: invalid command
    Syntax31,
    /// 32: command too long
    Syntax32,
    /// 33: wildcards on writing
    Syntax33,
    /// 34: missing file name
    Syntax34,
    /// 60
    WriteFileOpen,
    /// 61
    FileNotOpen,
    /// 62
    FileNotFound,
    /// 63
    FileExists,
    /// 64
    FileType,
    /// 65
    NoBlock,
    /// 66
    IllegalTs,
    /// 70
    NoChannel,
    /// 71
    DirError,
    /// 72
    DiskFull,
    /// 73: power-up message
    Startup,
    /// 74
    NotReady,
}

impl ErrorCode {
    /// Two-digit CBM error number.
    pub fn number(self) -> u8 {
        use ErrorCode::*;
        match self {
            Ok => 0,
            Scratched => 1,
            Unimplemented => 3,
            Read20 => 20,
            Read21 => 21,
            Read22 => 22,
            Read23 => 23,
            Read24 => 24,
            Write25 => 25,
            WriteProtect => 26,
            Read27 => 27,
            Write28 => 28,
            DiskId => 29,
            Syntax30 => 30,
            Syntax31 => 31,
            Syntax32 => 32,
            Syntax33 => 33,
            Syntax34 => 34,
            WriteFileOpen => 60,
            FileNotOpen => 61,
            FileNotFound => 62,
            FileExists => 63,
            FileType => 64,
            NoBlock => 65,
            IllegalTs => 66,
            NoChannel => 70,
            DirError => 71,
            DiskFull => 72,
            Startup => 73,
            NotReady => 74,
        }
    }

    /// Message text. The startup banner is configurable and is supplied by
    /// the drive, so `Startup` has no fixed text here.
    pub fn message(self) -> &'static str {
        use ErrorCode::*;
        match self {
            Ok => "OK",
            Scratched => "FILES SCRATCHED",
            Unimplemented => "UNIMPLEMENTED",
            Read20 | Read21 | Read22 | Read23 | Read24 | Read27 => "READ ERROR",
            Write25 | Write28 => "WRITE ERROR",
            WriteProtect => "WRITE PROTECT ON",
            DiskId => "DISK ID MISMATCH",
            Syntax30 | Syntax31 | Syntax32 | Syntax33 | Syntax34 => "SYNTAX ERROR",
            WriteFileOpen => "WRITE FILE OPEN",
            FileNotOpen => "FILE NOT OPEN",
            FileNotFound => "FILE NOT FOUND",
            FileExists => "FILE EXISTS",
            FileType => "FILE TYPE MISMATCH",
            NoBlock => "NO BLOCK",
            IllegalTs => "ILLEGAL TRACK OR SECTOR",
            NoChannel => "NO CHANNEL",
            DirError => "DIR ERROR",
            DiskFull => "DISK FULL",
            Startup => "",
            NotReady => "DRIVE NOT READY",
        }
    }

    /// Convert a per-sector error info byte (D64 job code) to an error code.
    pub fn from_job_code(code: u8) -> Self {
        use ErrorCode::*;
        match code & 0x0F {
            2 => Read20,
            3 => Read21,
            4 => Read22,
            5 => Read23,
            6 => Read24,
            7 => Write25,
            8 => WriteProtect,
            9 => Read27,
            10 => Write28,
            11 => DiskId,
            15 => NotReady,
            _ => Ok,
        }
    }

    /// Whether this code leaves the drive in a non-error state.
    pub fn is_ok(self) -> bool {
        matches!(self, ErrorCode::Ok | ErrorCode::Scratched)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02},{}", self.number(), self.message())
    }
}

/// A DOS error together with its track/sector context.
///
/// For `Scratched` the track field holds the number of files removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosFault {
    pub code: ErrorCode,
    pub track: u16,
    pub sector: u16,
}

impl DosFault {
    /// Fault without track/sector context.
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            track: 0,
            sector: 0,
        }
    }

    /// Fault at a specific block.
    pub fn at(code: ErrorCode, track: u8, sector: u8) -> Self {
        Self {
            code,
            track: track.into(),
            sector: sector.into(),
        }
    }
}

impl From<ErrorCode> for DosFault {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// Result type for operations inside the emulated DOS.
pub type DosResult<T> = Result<T, DosFault>;

/// Drive activity LED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Led {
    /// Inactive, LED off
    #[default]
    Off,
    /// Active, LED on
    On,
    /// Error, flashing
    ErrorFlash,
}

/// Format a command channel message: `"NN,MESSAGE,TT,SS\r"`.
pub fn format_message(fault: DosFault, banner: &str) -> String {
    let text = match fault.code {
        ErrorCode::Startup => banner,
        code => code.message(),
    };
    format!(
        "{:02},{},{:02},{:02}\r",
        fault.code.number(),
        text,
        fault.track,
        fault.sector
    )
}
