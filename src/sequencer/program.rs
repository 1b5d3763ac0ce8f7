//! Blank check, dump, verify, erase and program for ROM, FRAM and Flash.
//!
//! One address holds one image byte. Flash writes go through the JEDEC
//! software command set and are confirmed by DQ7 polling; a device that never
//! finishes counts as a failed byte, not as a tester fault.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::{BusSet, TestSequencer};
use crate::error::{Result, TesterError};
use crate::media::{read_image, ByteStream, StreamMode};
use crate::pin::GpioPort;
use crate::profile::{ChipKind, ChipType, FlashCommands};
use crate::timing::Timebase;

/// Erased state of every supported non-volatile family.
pub const BLANK: u8 = 0xFF;

const CHUNK: usize = 256;

/// Summary of a media operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaReport {
    /// Addresses visited.
    pub bytes: u32,
    pub failures: u32,
    pub first_failure: Option<u32>,
}

impl MediaReport {
    pub fn is_clean(&self) -> bool {
        self.failures == 0
    }

    fn record(&mut self, address: u32, ok: bool) {
        self.bytes += 1;
        if !ok {
            self.failures += 1;
            self.first_failure.get_or_insert(address);
        }
    }
}

impl<'a, P: GpioPort, T: Timebase> TestSequencer<'a, P, T> {
    fn require(&self, allowed: &[ChipType], operation: &str) -> Result<()> {
        if allowed.contains(&self.profile.chip_type())
            && matches!(self.wiring.buses, BusSet::Static { .. })
        {
            Ok(())
        } else {
            Err(TesterError::Unsupported {
                family: self.profile.name.to_string(),
                operation: operation.to_string(),
            })
        }
    }

    fn byte_mask(&self) -> u8 {
        (self.data_mask() & 0xFF) as u8
    }

    /// Checks that every address reads back erased.
    pub fn blank_check(&mut self) -> Result<MediaReport> {
        self.require(&[ChipType::Rom, ChipType::Fram, ChipType::Flash], "blank check")?;
        let blank = BLANK & self.byte_mask();
        let mut report = MediaReport::default();
        for address in 0..self.profile.capacity() {
            let value = self.read(address)? as u8;
            report.record(address, value == blank);
        }
        info!(
            "{}: blank check {} of {} bytes dirty",
            self.profile.name, report.failures, report.bytes
        );
        Ok(report)
    }

    /// Copies the whole chip to `out`.
    pub fn dump(&mut self, out: &mut dyn ByteStream) -> Result<MediaReport> {
        self.require(
            &[ChipType::Rom, ChipType::Sram, ChipType::Fram, ChipType::Flash],
            "dump",
        )?;
        out.open(StreamMode::Write)?;
        let mut report = MediaReport::default();
        let mut chunk = Vec::with_capacity(CHUNK);
        for address in 0..self.profile.capacity() {
            chunk.push(self.read(address)? as u8);
            report.record(address, true);
            if chunk.len() == CHUNK {
                out.write(&chunk)?;
                chunk.clear();
            }
        }
        out.write(&chunk)?;
        out.close()?;
        info!("{}: dumped {} bytes", self.profile.name, report.bytes);
        Ok(report)
    }

    /// Compares the chip against an image, address 0 first.
    pub fn verify(&mut self, image: &mut dyn ByteStream) -> Result<MediaReport> {
        self.require(
            &[ChipType::Rom, ChipType::Sram, ChipType::Fram, ChipType::Flash],
            "verify",
        )?;
        let bytes = self.load_image(image)?;
        let mask = self.byte_mask();
        let mut report = MediaReport::default();
        for (address, &byte) in (0u32..).zip(bytes.iter()) {
            let value = self.read(address)? as u8;
            report.record(address, value == byte & mask);
        }
        info!(
            "{}: verify {} of {} bytes differ",
            self.profile.name, report.failures, report.bytes
        );
        Ok(report)
    }

    /// Returns the chip to its erased state and blank-checks it.
    pub fn erase(&mut self) -> Result<MediaReport> {
        self.require(&[ChipType::Fram, ChipType::Flash], "erase")?;
        if let Some(commands) = self.flash_commands() {
            self.flash_command(&commands, &[(commands.unlock1, 0x80)])?;
            self.flash_command(&commands, &[(commands.unlock1, 0x10)])?;
            let timeout_us = commands.erase_timeout_ms as u64 * 1_000;
            if !self.poll_dq7(0, BLANK, timeout_us)? {
                warn!("{}: chip erase did not complete", self.profile.name);
            }
        } else {
            let blank = BLANK as u32;
            for address in 0..self.profile.capacity() {
                self.write(address, blank)?;
            }
        }
        self.blank_check()
    }

    /// Writes an image and reads every byte back.
    pub fn program(&mut self, image: &mut dyn ByteStream) -> Result<MediaReport> {
        self.require(&[ChipType::Fram, ChipType::Flash], "program")?;
        let bytes = self.load_image(image)?;
        let commands = self.flash_commands();
        let mask = self.byte_mask();
        let mut report = MediaReport::default();

        for (address, &byte) in (0u32..).zip(bytes.iter()) {
            let byte = byte & mask;
            let ok = match &commands {
                Some(commands) => {
                    // Erased cells already read back as all ones.
                    if byte != BLANK {
                        self.flash_command(
                            commands,
                            &[(commands.unlock1, 0xA0), (address, byte)],
                        )?;
                        self.poll_dq7(address, byte, commands.program_timeout_us as u64)?;
                    }
                    self.read(address)? as u8 == byte
                }
                None => {
                    self.write(address, byte as u32)?;
                    self.read(address)? as u8 == byte
                }
            };
            report.record(address, ok);
        }
        info!(
            "{}: programmed {} bytes, {} failed",
            self.profile.name, report.bytes, report.failures
        );
        Ok(report)
    }

    /// Manufacturer and device code from the software ID mode.
    pub fn flash_id(&mut self) -> Result<(u8, u8)> {
        let commands = self.flash_commands().ok_or_else(|| TesterError::Unsupported {
            family: self.profile.name.to_string(),
            operation: "software ID".to_string(),
        })?;
        self.flash_command(&commands, &[(commands.unlock1, 0x90)])?;
        let manufacturer = self.read(0)? as u8;
        let device = self.read(1)? as u8;
        self.write(0, 0xF0)?;
        debug!(
            "{}: software ID {:02X}/{:02X}",
            self.profile.name, manufacturer, device
        );
        Ok((manufacturer, device))
    }

    fn flash_commands(&self) -> Option<FlashCommands> {
        match &self.profile.layout {
            ChipKind::Flash(flash) => Some(flash.commands),
            _ => None,
        }
    }

    /// Unlock sequence followed by `tail`.
    fn flash_command(&mut self, commands: &FlashCommands, tail: &[(u32, u8)]) -> Result<()> {
        self.write(commands.unlock1, 0xAA)?;
        self.write(commands.unlock2, 0x55)?;
        for &(address, value) in tail {
            self.write(address, value as u32)?;
        }
        Ok(())
    }

    /// Waits until DQ7 shows the true data bit again.
    fn poll_dq7(&mut self, address: u32, expected: u8, timeout_us: u64) -> Result<bool> {
        let started = self.timebase.now_us();
        loop {
            let value = self.read(address)? as u8;
            if value & 0x80 == expected & 0x80 {
                return Ok(true);
            }
            if self.timebase.now_us() - started > timeout_us {
                return Ok(false);
            }
        }
    }

    fn load_image(&mut self, image: &mut dyn ByteStream) -> Result<Vec<u8>> {
        image.open(StreamMode::Read)?;
        let bytes = read_image(image, self.profile.capacity() as usize);
        image.close()?;
        bytes
    }
}
