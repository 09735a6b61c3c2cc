//! DOS commands sent over the command channel.

use log::{debug, info};

use super::Drive;
use crate::dos::DirSearch;
use crate::image::HostFile;
use crate::status::{DosFault, DosResult, ErrorCode};

impl<F: HostFile> Drive<F> {
    /// Execute a command string. The result is left in the error channel.
    pub fn execute_command(&mut self, cmd: &[u8]) {
        let mut cmd = cmd;
        while let [rest @ .., b'\r'] = cmd {
            cmd = rest;
        }
        debug!("Command {:?}", String::from_utf8_lossy(cmd));
        self.set_error(ErrorCode::Ok, 0, 0);

        let result = match cmd.first() {
            Some(b'I') => self.initialize(),
            Some(b'U') => self.user(cmd),
            Some(b'B') if cmd.contains(&b'-') => Err(ErrorCode::Unimplemented.into()),
            Some(b'M' | b'V' | b'N' | b'R' | b'C') => Err(ErrorCode::Unimplemented.into()),
            Some(b'S') => self.scratch(cmd),
            _ => Err(ErrorCode::Syntax31.into()),
        };
        self.report(result);
    }

    /// `I`: re-read the BAM.
    fn initialize(&mut self) -> DosResult<()> {
        self.close_all_channels();
        let disk = self.disk_or_not_ready()?;
        disk.flush_bam()?;
        disk.reload_bam()
    }

    /// `U0`, `UI`/`UJ` (`U9`/`U:`) reset.
    fn user(&mut self, cmd: &[u8]) -> DosResult<()> {
        match cmd.get(1) {
            Some(b'0') => Ok(()),
            Some(&c) if matches!(c & 0x0F, 9 | 10) => {
                self.reset();
                Ok(())
            }
            _ => Err(ErrorCode::Unimplemented.into()),
        }
    }

    /// `S:pattern[,pattern...]`: delete matching unlocked files. Reports
    /// FILES SCRATCHED with the count in the track field.
    fn scratch(&mut self, cmd: &[u8]) -> DosResult<()> {
        let colon = cmd
            .iter()
            .position(|&b| b == b':')
            .ok_or(DosFault::new(ErrorCode::Syntax34))?;
        let disk = self.disk_or_not_ready()?;
        if disk.is_write_protected() {
            return Err(ErrorCode::WriteProtect.into());
        }

        let mut count: u16 = 0;
        for pattern in cmd[colon + 1..].split(|&b| b == b',') {
            let mut search = DirSearch::new(disk, pattern);
            while let Some(slot) = search.next_match(disk)? {
                let mut entry = disk.dir_entry(slot.entry);
                if entry.is_locked() {
                    continue;
                }
                let start = entry.start();
                let side = entry.side_sector();
                entry.set_type_byte(0);
                disk.store_dir_block(slot.block)?;

                disk.free_chain(start)?;
                disk.free_chain(side)?;
                count += 1;
            }
        }

        info!("Scratched {} file(s)", count);
        Err(DosFault {
            code: ErrorCode::Scratched,
            track: count,
            sector: 0,
        })
    }
}
