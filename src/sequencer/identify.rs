//! Identification by elimination.
//!
//! Every candidate of the right pin count is wired up in turn and given a
//! short probe; the ones whose probe reads back its own pattern survive.
//! More than one survivor is reported as ambiguous, never narrowed by guess.

use log::{debug, info, warn};

use super::{Access, RefreshScheduler, TestSequencer};
use crate::database::{ChipDatabase, FamilyId, Identification};
use crate::error::{Result, TesterError};
use crate::pin::GpioPort;
use crate::profile::{ChipKind, ChipType};
use crate::socket::SocketMap;
use crate::timing::Timebase;

impl<'a, P: GpioPort, T: Timebase> TestSequencer<'a, P, T> {
    /// Short family-specific check; the chip must be powered.
    pub fn probe(&mut self) -> Result<bool> {
        match self.profile.chip_type() {
            ChipType::Logic => self.probe_vectors(),
            ChipType::Flash => self.probe_software_id(),
            ChipType::Dram | ChipType::Sram | ChipType::Fram => self.probe_address_lines(),
            ChipType::Rom => Err(TesterError::Unsupported {
                family: self.profile.name.to_string(),
                operation: "identification probe".to_string(),
            }),
        }
    }

    /// Walks a one through every address line with both data polarities, so
    /// aliased or missing address lines and dead strobes show up.
    fn probe_address_lines(&mut self) -> Result<bool> {
        let mask = self.data_mask();
        let bits = self.profile.capacity().trailing_zeros();
        for bit in 0..bits {
            let high = 1u32 << bit;
            for (low_value, high_value) in [(0, mask), (mask, 0)] {
                self.write(0, low_value)?;
                self.write(high, high_value)?;
                if self.read(0)? != low_value || self.read(high)? != high_value {
                    debug!("{}: address line {} fails", self.profile.name, bit);
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }

    fn probe_vectors(&mut self) -> Result<bool> {
        for index in 0..self.profile.capacity() {
            if self.cycle(index, Access::Vector)?.mismatch != 0 {
                debug!("{}: vector {} fails", self.profile.name, index);
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn probe_software_id(&mut self) -> Result<bool> {
        let ChipKind::Flash(flash) = &self.profile.layout else {
            return Ok(false);
        };
        let wanted = (flash.commands.manufacturer_id, flash.commands.device_id);
        Ok(self.flash_id()? == wanted)
    }
}

/// Probes every candidate and reports which families the chip answers as.
///
/// Candidates that cannot be probed (ROMs, packages too large for the
/// socket) are skipped. Only a refresh deadline aborts the search; the
/// socket is released after every candidate either way.
pub fn identify_by_elimination<P: GpioPort, T: Timebase>(
    socket: &mut SocketMap<P>,
    timebase: &mut T,
    database: &ChipDatabase,
    candidates: &[FamilyId],
    refresh_margin_percent: u8,
) -> Result<Identification> {
    let mut survivors = Vec::new();
    for &id in candidates {
        let Some(profile) = database.get(id) else {
            continue;
        };
        if profile.chip_type() == ChipType::Rom {
            continue;
        }
        let mut refresh = RefreshScheduler::for_profile(profile, refresh_margin_percent);
        let mut sequencer = match TestSequencer::new(socket, timebase, profile, &mut refresh) {
            Ok(sequencer) => sequencer,
            Err(e) => {
                debug!("Skipping {}: {}", profile.name, e);
                continue;
            }
        };
        let outcome = sequencer.power_up().and_then(|_| sequencer.probe());
        sequencer.safe_state();
        match outcome {
            Ok(true) => {
                debug!("{} answers the probe", profile.name);
                survivors.push(id);
            }
            Ok(false) => {}
            Err(e) if e.is_internal_fault() => {
                warn!("Identification aborted on {}: {}", profile.name, e);
                return Err(e);
            }
            Err(e) => debug!("{} cannot be probed: {}", profile.name, e),
        }
    }

    let identification = Identification::from_candidates(survivors);
    match &identification {
        Identification::Unique(id) => info!("Identified {}", database[*id].name),
        Identification::NoMatch => info!("No match found"),
        Identification::Ambiguous(ids) => {
            info!("No unique match: {}", database.names(ids).join(", "))
        }
    }
    Ok(identification)
}
