//! KERNAL trap bridge.
//!
//! A 6510 emulator calls [`KernalTraps::check`] with the program counter
//! before each instruction. On a hit, [`KernalTraps::process`] performs the
//! IEC routine against the bus, updates the KERNAL status byte and returns
//! the address to continue at, as if the ROM routine had run and executed
//! `RTS`.

use log::{trace, warn};

use crate::bus::{atn, IecBus};
use crate::config::DriveConfig;
use crate::image::HostFile;
use crate::status::st;

/// Entry points of the trapped KERNAL routines.
pub mod addr {
    pub const TALK: u16 = 0xED09;
    pub const LISTEN: u16 = 0xED0C;
    pub const SECOND: u16 = 0xEDB9;
    pub const TKSA: u16 = 0xEDC7;
    pub const CIOUT: u16 = 0xEDDD;
    pub const UNTLK: u16 = 0xEDEF;
    pub const UNLSN: u16 = 0xEDFE;
    pub const ACPTR: u16 = 0xEE13;
}

/// Zero page locations used by the KERNAL serial routines.
pub mod zp {
    /// I/O status word (ST)
    pub const STATUS: usize = 0x90;
    /// Serial session flags: bit 7 listening, bit 6 talking
    pub const SESSION_FLAGS: usize = 0x97;
    /// Deferred character flag; bit 7 set means the next byte carries EOI
    pub const EOI_FLAG: usize = 0xA3;
    /// Current secondary address
    pub const SA: usize = 0xB9;
    /// Current device number
    pub const FA: usize = 0xBA;
}

/// Smallest RAM image a trap can run against: zero page plus the stack.
pub const MIN_RAM: usize = 0x200;

const LISTENING: u8 = 0x80;
const TALKING: u8 = 0x40;
/// Carry flag in the 6510 status register.
const CARRY: u8 = 0x01;

/// KERNAL serial routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernalRoutine {
    Talk,
    Listen,
    Second,
    Tksa,
    Ciout,
    Untlk,
    Unlsn,
    Acptr,
}

impl TryFrom<u16> for KernalRoutine {
    type Error = u16;

    fn try_from(pc: u16) -> Result<Self, Self::Error> {
        Ok(match pc {
            addr::TALK => KernalRoutine::Talk,
            addr::LISTEN => KernalRoutine::Listen,
            addr::SECOND => KernalRoutine::Second,
            addr::TKSA => KernalRoutine::Tksa,
            addr::CIOUT => KernalRoutine::Ciout,
            addr::UNTLK => KernalRoutine::Untlk,
            addr::UNLSN => KernalRoutine::Unlsn,
            addr::ACPTR => KernalRoutine::Acptr,
            other => return Err(other),
        })
    }
}

/// 6510 registers visible to a trap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Registers {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    /// Stack pointer (page 1)
    pub sp: u8,
    /// Processor status
    pub p: u8,
}

/// Trap dispatcher.
#[derive(Debug, Clone)]
pub struct KernalTraps {
    enabled: bool,
}

impl Default for KernalTraps {
    fn default() -> Self {
        Self::new(true)
    }
}

impl KernalTraps {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// Traps as configured by `trapsEnabled`.
    pub fn from_config(config: &DriveConfig) -> Self {
        Self::new(config.traps_enabled)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Whether `pc` is a trapped routine entry point.
    pub fn check(&self, pc: u16) -> bool {
        self.enabled && KernalRoutine::try_from(pc).is_ok()
    }

    /// Run the routine at `pc` against the bus. Returns the new program
    /// counter; an address that is not trapped is returned unchanged.
    ///
    /// `ram` must cover zero page and the stack page ([`MIN_RAM`] bytes);
    /// with less, nothing runs and `pc` is returned unchanged.
    pub fn process<F: HostFile>(
        &self,
        pc: u16,
        regs: &mut Registers,
        ram: &mut [u8],
        bus: &mut IecBus<F>,
    ) -> u16 {
        let Ok(routine) = KernalRoutine::try_from(pc) else {
            return pc;
        };
        if ram.len() < MIN_RAM {
            warn!("Trap {:?} skipped, RAM is only {} bytes", routine, ram.len());
            return pc;
        }
        trace!("Trap {:?} at ${:04X}, A={:#04x}", routine, pc, regs.a);

        let status = match routine {
            KernalRoutine::Listen => {
                ram[zp::FA] = regs.a;
                let status = bus.out_atn(atn::LISTEN | (regs.a & 0x1F));
                ram[zp::SESSION_FLAGS] |= LISTENING;
                status
            }
            KernalRoutine::Talk => {
                ram[zp::FA] = regs.a;
                let status = bus.out_atn(atn::TALK | (regs.a & 0x1F));
                ram[zp::SESSION_FLAGS] |= TALKING;
                status
            }
            KernalRoutine::Second | KernalRoutine::Tksa => {
                ram[zp::SA] = regs.a & 0x0F;
                bus.out_sec(regs.a)
            }
            KernalRoutine::Ciout => {
                let eoi = ram[zp::EOI_FLAG] & 0x80 != 0;
                bus.out(regs.a, eoi)
            }
            KernalRoutine::Untlk => {
                bus.out_atn(atn::UNTALK | 0x0F);
                ram[zp::SESSION_FLAGS] &= !TALKING;
                st::OK
            }
            KernalRoutine::Unlsn => {
                bus.out_atn(atn::UNLISTEN | 0x0F);
                ram[zp::SESSION_FLAGS] &= !LISTENING;
                st::OK
            }
            KernalRoutine::Acptr => {
                let byte = bus.in_byte();
                regs.a = byte.value;
                if byte.status & (st::TIMEOUT | st::NOT_PRESENT) != 0 {
                    regs.p |= CARRY;
                } else {
                    regs.p &= !CARRY;
                }
                byte.status
            }
        };

        ram[zp::STATUS] |= status;
        pop_return(regs, ram)
    }
}

/// Simulate `RTS`: pull the return address and step past it.
fn pop_return(regs: &mut Registers, ram: &[u8]) -> u16 {
    regs.sp = regs.sp.wrapping_add(1);
    let lo = ram[0x100 + regs.sp as usize];
    regs.sp = regs.sp.wrapping_add(1);
    let hi = ram[0x100 + regs.sp as usize];
    u16::from_le_bytes([lo, hi]).wrapping_add(1)
}
