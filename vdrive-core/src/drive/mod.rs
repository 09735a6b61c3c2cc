//! The virtual 1541/1581 drive.
//!
//! `Drive` owns the mounted image, the channel table, the four drive
//! buffers and the error channel state. Every DOS-level failure is latched
//! into the error channel (as on a real drive) and reported through KERNAL
//! status bits; only host-side setup (mounting) returns Rust errors.

mod channel;
mod command;
mod file;

use std::fs::{File, OpenOptions};
use std::path::Path;

use log::{debug, warn};

pub use channel::{
    BufferPool, Channel, DirectChannel, FileChannel, Listing, COMMAND_CHANNEL, MAX_CHANNELS,
    NUM_BUFFERS,
};

use crate::config::DriveConfig;
use crate::error::VdriveResult;
use crate::image::{Disk, HostFile};
use crate::status::{format_message, st, DosFault, DosResult, ErrorCode, Led};

/// The command buffer holds at most this many bytes.
pub const COMMAND_BUFFER_SIZE: usize = 59;

/// A byte transferred from a talker together with its status bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusByte {
    pub value: u8,
    pub status: u8,
}

impl BusByte {
    pub fn new(value: u8, status: u8) -> Self {
        Self { value, status }
    }

    /// No byte available.
    pub fn timeout(status: u8) -> Self {
        Self { value: 0, status }
    }

    /// Whether this was the last byte of the stream.
    pub fn is_eof(&self) -> bool {
        self.status & st::EOF != 0
    }
}

/// Virtual disk drive.
pub struct Drive<F: HostFile> {
    config: DriveConfig,
    disk: Option<Disk<F>>,
    channels: [Channel; MAX_CHANNELS],
    buffers: BufferPool,
    /// Latched error
    error: DosFault,
    /// Formatted error message and read position
    error_msg: Vec<u8>,
    error_pos: usize,
    cmd_buf: Vec<u8>,
    led: Led,
}

impl<F: HostFile> Drive<F> {
    /// Create a drive with no disk inserted.
    pub fn new(config: &DriveConfig) -> Self {
        let mut drive = Self {
            config: config.clone(),
            disk: None,
            channels: std::array::from_fn(|_| Channel::Free),
            buffers: BufferPool::new(),
            error: DosFault::new(ErrorCode::Ok),
            error_msg: Vec::new(),
            error_pos: 0,
            cmd_buf: Vec::with_capacity(COMMAND_BUFFER_SIZE),
            led: Led::Off,
        };
        drive.channels[COMMAND_CHANNEL] = Channel::Command;
        drive.set_error(ErrorCode::Startup, 0, 0);
        drive
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Insert a disk image. Any previously mounted image is unmounted first.
    pub fn mount(&mut self, file: F, write_protected: bool) -> VdriveResult<()> {
        self.unmount();

        let disk = Disk::open(file, write_protected || self.config.write_protect)?;
        debug!("Mounted {:?} image", disk.kind());
        self.disk = Some(disk);
        self.set_error(ErrorCode::Ok, 0, 0);
        Ok(())
    }

    /// Remove the disk image, writing back the BAM. Returns the host file.
    pub fn unmount(&mut self) -> Option<F> {
        let file = if self.disk.is_some() {
            self.close_all_channels();
            self.disk.take().map(Disk::close)
        } else {
            None
        };
        if file.is_some() {
            debug!("Unmounted image");
        }
        self.set_error(ErrorCode::NotReady, 0, 0);
        file
    }

    /// Whether a disk is inserted.
    pub fn is_mounted(&self) -> bool {
        self.disk.is_some()
    }

    pub fn disk(&self) -> Option<&Disk<F>> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut Disk<F>> {
        self.disk.as_mut()
    }

    /// Power-on reset: closes all channels, writes back and re-reads the
    /// BAM and reports the startup message.
    pub fn reset(&mut self) {
        debug!("Drive reset");
        self.close_all_channels();
        self.buffers.reset();

        if let Some(disk) = self.disk.as_mut() {
            if let Err(fault) = disk.flush_bam().and_then(|_| disk.reload_bam()) {
                warn!("BAM refresh on reset failed: {:?}", fault);
            }
        }

        self.set_error(ErrorCode::Startup, 0, 0);
    }

    /// Current drive LED state.
    pub fn led(&self) -> Led {
        self.led
    }

    pub(crate) fn set_led(&mut self, led: Led) {
        self.led = led;
    }

    /// Latched error.
    pub fn error(&self) -> DosFault {
        self.error
    }

    /// Full error channel message, e.g. `"00,OK,00,00"`, without the CR.
    pub fn error_message(&self) -> String {
        let text = String::from_utf8_lossy(&self.error_msg);
        text.trim_end_matches('\r').to_string()
    }

    /// State of a channel.
    pub fn channel(&self, channel: usize) -> Option<&Channel> {
        self.channels.get(channel)
    }

    /// Latch an error into the error channel and update the LED.
    pub fn set_error(&mut self, code: ErrorCode, track: u16, sector: u16) {
        self.latch(DosFault {
            code,
            track,
            sector,
        });
    }

    fn latch(&mut self, fault: DosFault) {
        if fault.code != ErrorCode::Ok {
            debug!("DOS error {:?} at {}/{}", fault.code, fault.track, fault.sector);
        }
        self.error = fault;
        self.error_msg = format_message(fault, &self.config.banner).into_bytes();
        self.error_pos = 0;

        if !fault.code.is_ok() {
            self.led = if fault.code == ErrorCode::Startup {
                Led::Off
            } else {
                Led::ErrorFlash
            };
        } else if self.led == Led::ErrorFlash {
            self.led = Led::Off;
        }
    }

    /// Latch the error of a failed operation, if any.
    fn report(&mut self, result: DosResult<()>) {
        if let Err(fault) = result {
            self.latch(fault);
        }
    }

    /// Whether an error is pending, blocking file transfers.
    fn error_pending(&self) -> bool {
        self.error.code != ErrorCode::Ok
    }

    /// The mounted disk, or DRIVE NOT READY.
    fn disk_or_not_ready(&mut self) -> DosResult<&mut Disk<F>> {
        self.disk
            .as_mut()
            .ok_or(DosFault::new(ErrorCode::NotReady))
    }

    /// Open a channel. Channel 15 executes the name as a DOS command.
    pub fn open(&mut self, channel: usize, name: &[u8]) -> u8 {
        debug!(
            "Open channel {}: {:?}",
            channel,
            String::from_utf8_lossy(name)
        );
        self.set_error(ErrorCode::Ok, 0, 0);

        if channel == COMMAND_CHANNEL {
            self.execute_command(name);
            return st::OK;
        }

        if !self.channels.get(channel).is_some_and(Channel::is_free) {
            self.set_error(ErrorCode::NoChannel, 0, 0);
            return st::OK;
        }

        let result = match name.first() {
            Some(b'$') if channel == 0 => self.open_directory(&name[1..]),
            Some(b'$') => self.open_raw_directory(channel),
            Some(b'#') => self.open_direct(channel, name),
            _ => self.open_file(channel, name),
        };
        self.report(result);
        st::OK
    }

    /// Close a channel. Closing the command channel closes all others.
    pub fn close(&mut self, channel: usize) -> u8 {
        let Some(slot) = self.channels.get_mut(channel) else {
            return st::OK;
        };

        let closed = std::mem::take(slot);
        let buffer = closed.buffer();
        match closed {
            Channel::Free | Channel::Direct(_) => {}
            Channel::Command => {
                self.channels[COMMAND_CHANNEL] = Channel::Command;
                self.close_all_channels();
            }
            Channel::Directory(_) => {
                debug!("Closed directory channel {}", channel);
            }
            Channel::File(file) => {
                if file.writing {
                    let result = self.finish_write(file);
                    self.report(result);
                }
                debug!("Closed file channel {}", channel);
            }
        }
        if let Some(buffer) = buffer {
            self.buffers.free(buffer);
        }
        st::OK
    }

    /// Close every channel except the command channel.
    pub fn close_all_channels(&mut self) {
        for channel in (0..MAX_CHANNELS).filter(|&c| c != COMMAND_CHANNEL) {
            self.close(channel);
        }
        self.cmd_buf.clear();
    }

    /// Read one byte from a channel.
    pub fn read(&mut self, channel: usize) -> BusByte {
        let Some(slot) = self.channels.get_mut(channel) else {
            return BusByte::timeout(st::READ_TIMEOUT);
        };

        match slot {
            Channel::Free => {
                if !self.error_pending() {
                    self.set_error(ErrorCode::FileNotOpen, 0, 0);
                }
                BusByte::timeout(st::READ_TIMEOUT)
            }
            Channel::Command => self.read_error_channel(),
            Channel::Directory(listing) => match listing.data.get(listing.pos) {
                Some(&value) => {
                    listing.pos += 1;
                    let status = if listing.pos < listing.data.len() {
                        st::OK
                    } else {
                        st::EOF
                    };
                    BusByte::new(value, status)
                }
                None => BusByte::timeout(st::READ_TIMEOUT),
            },
            Channel::Direct(direct) => {
                if direct.len == 0 || direct.pos >= 256 {
                    return BusByte::timeout(st::READ_TIMEOUT);
                }
                let value = self.buffers.page(direct.buffer)[direct.pos];
                direct.pos += 1;
                direct.len -= 1;
                let status = if direct.len > 0 { st::OK } else { st::EOF };
                BusByte::new(value, status)
            }
            Channel::File(_) => self.read_file(channel),
        }
    }

    fn read_error_channel(&mut self) -> BusByte {
        let Some(&value) = self.error_msg.get(self.error_pos) else {
            return BusByte::timeout(st::READ_TIMEOUT);
        };
        self.error_pos += 1;
        if self.error_pos < self.error_msg.len() {
            BusByte::new(value, st::OK)
        } else {
            self.set_error(ErrorCode::Ok, 0, 0);
            BusByte::new(value, st::EOF)
        }
    }

    /// Write one byte to a channel. `eoi` marks the last byte of the
    /// transfer.
    pub fn write(&mut self, channel: usize, byte: u8, eoi: bool) -> u8 {
        let Some(slot) = self.channels.get_mut(channel) else {
            return st::TIMEOUT;
        };

        match slot {
            Channel::Free => {
                if !self.error_pending() {
                    self.set_error(ErrorCode::FileNotOpen, 0, 0);
                }
                st::TIMEOUT
            }
            Channel::Command => {
                if self.cmd_buf.len() >= COMMAND_BUFFER_SIZE {
                    self.set_error(ErrorCode::Syntax32, 0, 0);
                    return st::TIMEOUT;
                }
                self.cmd_buf.push(byte);
                if eoi {
                    let cmd = std::mem::take(&mut self.cmd_buf);
                    self.execute_command(&cmd);
                    self.cmd_buf = cmd;
                    self.cmd_buf.clear();
                }
                st::OK
            }
            Channel::Directory(_) => {
                self.set_error(ErrorCode::WriteFileOpen, 0, 0);
                st::TIMEOUT
            }
            Channel::Direct(direct) => {
                if direct.len >= 256 || direct.pos >= 256 {
                    return st::TIMEOUT;
                }
                self.buffers.page_mut(direct.buffer)[direct.pos] = byte;
                direct.pos += 1;
                direct.len += 1;
                st::OK
            }
            Channel::File(_) => self.write_file(channel, byte),
        }
    }
}

impl Drive<File> {
    /// Mount an image file, read/write if possible, else read-only.
    pub fn mount_path(&mut self, path: impl AsRef<Path>) -> VdriveResult<()> {
        let path = path.as_ref();
        let (file, write_protected) = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => (file, false),
            Err(e) => {
                debug!("{} not writable ({}), mounting read-only", path.display(), e);
                (File::open(path)?, true)
            }
        };
        self.mount(file, write_protected)?;
        debug!("Mounted {}", path.display());
        Ok(())
    }
}

impl<F: HostFile> Drop for Drive<F> {
    fn drop(&mut self) {
        if self.disk.is_some() {
            self.unmount();
        }
    }
}
