//! IEC bus controller.
//!
//! The host is always the bus controller; the single drive is either a
//! listener or a talker. The byte after LISTEN/TALK is a secondary address
//! carrying a command (`OPEN`, `CLOSE`, `DATA`) in its high nibble and the
//! channel in its low nibble.
//!
//! EOI is sent *before* the last byte: `out(byte, true)` means `byte` is the
//! final byte of the transfer.

use log::{debug, trace};

use crate::drive::{BusByte, Drive, COMMAND_CHANNEL};
use crate::image::HostFile;
use crate::status::{st, Led};

/// Commands in the high nibble of a secondary address.
pub mod cmd {
    pub const DATA: u8 = 0x60;
    pub const CLOSE: u8 = 0xE0;
    pub const OPEN: u8 = 0xF0;
}

/// ATN bytes (high nibble, device in the low bits).
pub mod atn {
    pub const LISTEN: u8 = 0x20;
    pub const UNLISTEN: u8 = 0x30;
    pub const TALK: u8 = 0x40;
    pub const UNTALK: u8 = 0x50;
}

/// Longest file name accepted during OPEN.
pub const NAME_BUFFER_SIZE: usize = 256;

/// Bus state plus the drive attached to it.
pub struct IecBus<F: HostFile> {
    drive: Drive<F>,
    /// ATN phase: listen (true) or talk
    listening: bool,
    listener_active: bool,
    talker_active: bool,
    /// Command and channel of the last secondary address
    command: u8,
    channel: u8,
    /// File name being received by an OPEN
    name: Vec<u8>,
}

impl<F: HostFile> IecBus<F> {
    pub fn new(drive: Drive<F>) -> Self {
        Self {
            drive,
            listening: false,
            listener_active: false,
            talker_active: false,
            command: 0,
            channel: 0,
            name: Vec::with_capacity(NAME_BUFFER_SIZE),
        }
    }

    pub fn drive(&self) -> &Drive<F> {
        &self.drive
    }

    pub fn drive_mut(&mut self) -> &mut Drive<F> {
        &mut self.drive
    }

    /// Reset the bus and, if a disk is inserted, the drive.
    pub fn reset(&mut self) {
        if self.drive.is_mounted() {
            self.drive.reset();
        }
        self.listening = false;
        self.listener_active = false;
        self.talker_active = false;
        self.name.clear();
    }

    /// Whether `device` answers on the bus.
    fn present(&self, device: u8) -> bool {
        device == self.drive.config().device && self.drive.is_mounted()
    }

    /// Address a device as listener.
    pub fn listen(&mut self, device: u8) -> u8 {
        self.listener_active = self.present(device);
        if self.listener_active {
            st::OK
        } else {
            st::NOT_PRESENT
        }
    }

    /// Address a device as talker.
    pub fn talk(&mut self, device: u8) -> u8 {
        self.talker_active = self.present(device);
        if self.talker_active {
            st::OK
        } else {
            st::NOT_PRESENT
        }
    }

    /// Release the listener. An OPEN whose name never saw EOI is carried
    /// out now.
    pub fn unlisten(&mut self) -> u8 {
        let mut status = st::OK;
        if self.listener_active && self.command == cmd::OPEN && !self.name.is_empty() {
            status = self.open_pending();
        }
        self.listener_active = false;
        status
    }

    pub fn untalk(&mut self) -> u8 {
        self.talker_active = false;
        st::OK
    }

    /// Send a byte under ATN.
    pub fn out_atn(&mut self, byte: u8) -> u8 {
        trace!("ATN {:#04x}", byte);
        match byte & 0xF0 {
            atn::LISTEN => {
                self.set_secondary(0, 0);
                self.listening = true;
                self.listen(byte & 0x0F)
            }
            atn::UNLISTEN => {
                // Needs the pending command, so runs before the state is cleared
                let status = self.unlisten();
                self.set_secondary(0, 0);
                self.listening = false;
                status
            }
            atn::TALK => {
                self.set_secondary(0, 0);
                self.listening = false;
                self.talk(byte & 0x0F)
            }
            atn::UNTALK => {
                self.set_secondary(0, 0);
                self.listening = false;
                self.untalk()
            }
            _ => st::TIMEOUT,
        }
    }

    /// Send a secondary address.
    pub fn out_sec(&mut self, byte: u8) -> u8 {
        trace!("Secondary {:#04x}", byte);
        if self.listening {
            if !self.listener_active {
                return st::TIMEOUT;
            }
            self.set_secondary(byte & 0xF0, byte & 0x0F);
            match self.command {
                cmd::OPEN => {
                    self.name.clear();
                    st::OK
                }
                cmd::CLOSE => {
                    if self.drive.led() != Led::ErrorFlash {
                        self.drive.set_led(Led::Off);
                    }
                    self.drive.close(self.channel as usize)
                }
                _ => st::OK,
            }
        } else {
            if !self.talker_active {
                return st::TIMEOUT;
            }
            // A talker always sends data
            self.set_secondary(cmd::DATA, byte & 0x0F);
            st::OK
        }
    }

    /// Send a byte to the listener. `eoi` marks it as the last one.
    pub fn out(&mut self, byte: u8, eoi: bool) -> u8 {
        if !self.listener_active {
            return st::TIMEOUT;
        }
        match self.command {
            cmd::OPEN => {
                if self.name.len() < NAME_BUFFER_SIZE {
                    self.name.push(byte);
                }
                if eoi {
                    self.open_pending()
                } else {
                    st::OK
                }
            }
            cmd::DATA => self.drive.write(self.channel as usize, byte, eoi),
            _ => st::TIMEOUT,
        }
    }

    /// Receive a byte from the talker.
    pub fn in_byte(&mut self) -> BusByte {
        if self.talker_active && self.command == cmd::DATA {
            self.drive.read(self.channel as usize)
        } else {
            BusByte::timeout(st::TIMEOUT)
        }
    }

    fn set_secondary(&mut self, command: u8, channel: u8) {
        self.command = command;
        self.channel = channel;
    }

    fn open_pending(&mut self) -> u8 {
        let name = std::mem::take(&mut self.name);
        self.drive.set_led(Led::On);
        let status = self.drive.open(self.channel as usize, &name);
        self.name = name;
        self.name.clear();
        status
    }
}

/// Host-side KERNAL sequences: the same ATN framing the C64 ROM performs
/// for OPEN/CLOSE/CHKIN/CHKOUT, driven directly against the bus.
impl<F: HostFile> IecBus<F> {
    fn device(&self) -> u8 {
        self.drive.config().device
    }

    /// Open `channel` with a file name (OPEN lfn,dev,sa,"name").
    pub fn open_channel(&mut self, channel: u8, name: &[u8]) -> u8 {
        let mut status = self.out_atn(atn::LISTEN | self.device());
        status |= self.out_sec(cmd::OPEN | channel);
        for (i, &b) in name.iter().enumerate() {
            status |= self.out(b, i + 1 == name.len());
        }
        status | self.out_atn(atn::UNLISTEN | 0x0F)
    }

    /// Close `channel`.
    pub fn close_channel(&mut self, channel: u8) -> u8 {
        let status = self.out_atn(atn::LISTEN | self.device()) | self.out_sec(cmd::CLOSE | channel);
        status | self.out_atn(atn::UNLISTEN | 0x0F)
    }

    /// Send data to an open channel, EOI on the last byte.
    pub fn send(&mut self, channel: u8, data: &[u8]) -> u8 {
        let mut status = self.out_atn(atn::LISTEN | self.device());
        status |= self.out_sec(cmd::DATA | channel);
        for (i, &b) in data.iter().enumerate() {
            status |= self.out(b, i + 1 == data.len());
            if status & st::TIMEOUT != 0 {
                break;
            }
        }
        status | self.out_atn(atn::UNLISTEN | 0x0F)
    }

    /// Read from an open channel until EOF or a timeout. Returns the data
    /// and the accumulated status.
    pub fn receive(&mut self, channel: u8) -> (Vec<u8>, u8) {
        let mut status = self.out_atn(atn::TALK | self.device());
        status |= self.out_sec(cmd::DATA | channel);
        let mut data = Vec::new();
        if status & st::NOT_PRESENT == 0 {
            loop {
                let byte = self.in_byte();
                if byte.status & st::TIMEOUT != 0 {
                    status |= byte.status;
                    break;
                }
                data.push(byte.value);
                if byte.is_eof() {
                    status |= st::EOF;
                    break;
                }
            }
        }
        (data, status | self.out_atn(atn::UNTALK | 0x0F))
    }

    /// LOAD a file over channel 0.
    pub fn load(&mut self, name: &[u8]) -> (Vec<u8>, u8) {
        let mut status = self.open_channel(0, name);
        if status & st::NOT_PRESENT != 0 {
            return (Vec::new(), status);
        }
        let (data, read_status) = self.receive(0);
        status |= read_status;
        status |= self.close_channel(0);
        debug!("Loaded {} bytes, status {:#04x}", data.len(), status);
        (data, status)
    }

    /// SAVE a file over channel 1.
    pub fn save(&mut self, name: &[u8], data: &[u8]) -> u8 {
        self.write_file(1, name, data)
    }

    /// Open `channel` for writing, send `data` and close it.
    pub fn write_file(&mut self, channel: u8, name: &[u8], data: &[u8]) -> u8 {
        let mut status = self.open_channel(channel, name);
        if status & st::NOT_PRESENT != 0 {
            return status;
        }
        if !data.is_empty() {
            status |= self.send(channel, data);
        }
        status | self.close_channel(channel)
    }

    /// Send a DOS command on the command channel.
    pub fn command(&mut self, command: &[u8]) -> u8 {
        self.send(COMMAND_CHANNEL as u8, command)
    }

    /// Read the error channel, without the trailing CR.
    pub fn read_status(&mut self) -> String {
        let (data, _) = self.receive(COMMAND_CHANNEL as u8);
        String::from_utf8_lossy(&data)
            .trim_end_matches('\r')
            .to_string()
    }
}
