//! Data-only descriptions of chip families.
//!
//! Everything here is expressed in the chip's own datasheet pin numbers
//! (1-based). Socket positions only appear once a profile is resolved against
//! an [`Alignment`](crate::socket::Alignment).

use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::bus::{BusLayout, BusRole};
use crate::error::{Result, TesterError};
use crate::pin::PinValue;

/// Locations are counted in a `u32`.
const MAX_ADDRESS_BITS: u32 = 32;

/// Device families the tester knows how to drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChipType {
    Logic,
    Dram,
    Sram,
    Rom,
    Fram,
    Flash,
}

impl ChipType {
    pub fn name(&self) -> &'static str {
        match self {
            ChipType::Logic => "logic",
            ChipType::Dram => "DRAM",
            ChipType::Sram => "SRAM",
            ChipType::Rom => "ROM",
            ChipType::Fram => "FRAM",
            ChipType::Flash => "Flash",
        }
    }
}

impl std::fmt::Display for ChipType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Named control and power signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    ChipSelect,
    Ras,
    Cas,
    WriteEnable,
    OutputEnable,
    Gnd,
    Vcc,
}

impl Signal {
    pub const ALL: [Signal; 7] = [
        Signal::ChipSelect,
        Signal::Ras,
        Signal::Cas,
        Signal::WriteEnable,
        Signal::OutputEnable,
        Signal::Gnd,
        Signal::Vcc,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::ChipSelect => "/CS",
            Signal::Ras => "/RAS",
            Signal::Cas => "/CAS",
            Signal::WriteEnable => "/WE",
            Signal::OutputEnable => "/OE",
            Signal::Gnd => "GND",
            Signal::Vcc => "VCC",
        }
    }
}

/// A signal's chip pin and the level that asserts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPin {
    pub pin: u8,
    #[serde(default = "active_low")]
    pub active: PinValue,
}

fn active_low() -> PinValue {
    PinValue::Low
}

impl SignalPin {
    pub const fn low(pin: u8) -> Option<SignalPin> {
        Some(SignalPin {
            pin,
            active: PinValue::Low,
        })
    }

    pub const fn high(pin: u8) -> Option<SignalPin> {
        Some(SignalPin {
            pin,
            active: PinValue::High,
        })
    }

    pub fn inactive(&self) -> PinValue {
        self.active.inverted()
    }
}

/// Signal name to chip pin; `None` when the family lacks the pin.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalMap {
    pub chip_select: Option<SignalPin>,
    pub ras: Option<SignalPin>,
    pub cas: Option<SignalPin>,
    pub write_enable: Option<SignalPin>,
    pub output_enable: Option<SignalPin>,
    pub gnd: Option<SignalPin>,
    pub vcc: Option<SignalPin>,
    /// Pins held high for the whole run (programming voltage, /PGM, spare enables).
    pub tie_high: Cow<'static, [u8]>,
}

impl SignalMap {
    pub const EMPTY: SignalMap = SignalMap {
        chip_select: None,
        ras: None,
        cas: None,
        write_enable: None,
        output_enable: None,
        gnd: None,
        vcc: None,
        tie_high: Cow::Borrowed(&[]),
    };

    pub fn get(&self, signal: Signal) -> Option<SignalPin> {
        match signal {
            Signal::ChipSelect => self.chip_select,
            Signal::Ras => self.ras,
            Signal::Cas => self.cas,
            Signal::WriteEnable => self.write_enable,
            Signal::OutputEnable => self.output_enable,
            Signal::Gnd => self.gnd,
            Signal::Vcc => self.vcc,
        }
    }

    pub fn present(&self) -> impl Iterator<Item = (Signal, SignalPin)> + '_ {
        Signal::ALL
            .iter()
            .filter_map(move |&s| self.get(s).map(|pin| (s, pin)))
    }
}

/// Busy-wait figures for multiplexed-address DRAM, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DramTiming {
    pub address_setup_ns: u32,
    pub row_hold_ns: u32,
    pub access_ns: u32,
    pub ras_pulse_ns: u32,
    pub precharge_ns: u32,
    /// Every refresh row must be strobed within this interval.
    pub refresh_ms: u32,
    pub refresh_rows: u32,
    /// Keep /RAS asserted until the column cycle ends.
    pub ras_through_cas: bool,
}

impl DramTiming {
    pub const fn standard(refresh_ms: u32, refresh_rows: u32) -> Self {
        DramTiming {
            address_setup_ns: 20,
            row_hold_ns: 30,
            access_ns: 200,
            ras_pulse_ns: 150,
            precharge_ns: 120,
            refresh_ms,
            refresh_rows,
            ras_through_cas: true,
        }
    }

    pub fn refresh_budget_us(&self) -> u64 {
        self.refresh_ms as u64 * 1_000
    }
}

/// Busy-wait figures for static (non-multiplexed) parts, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticTiming {
    pub address_setup_ns: u32,
    pub access_ns: u32,
    pub write_pulse_ns: u32,
    pub recovery_ns: u32,
}

impl StaticTiming {
    pub const fn with_access(access_ns: u32) -> Self {
        StaticTiming {
            address_setup_ns: 20,
            access_ns,
            write_pulse_ns: access_ns,
            recovery_ns: 50,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DramLayout {
    pub row: BusLayout,
    pub column: BusLayout,
    pub data_in: BusLayout,
    pub data_out: BusLayout,
    pub timing: DramTiming,
}

impl DramLayout {
    pub fn row_bits(&self) -> u8 {
        self.row.width()
    }

    pub fn column_bits(&self) -> u8 {
        self.column.width()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticLayout {
    pub address: BusLayout,
    /// Bidirectional data bus.
    pub data: BusLayout,
    pub timing: StaticTiming,
}

/// JEDEC-style software command set of 5 V parallel flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashCommands {
    pub unlock1: u32,
    pub unlock2: u32,
    pub manufacturer_id: u8,
    pub device_id: u8,
    pub program_timeout_us: u32,
    pub erase_timeout_ms: u32,
}

impl FlashCommands {
    pub const fn jedec(manufacturer_id: u8, device_id: u8) -> Self {
        FlashCommands {
            unlock1: 0x5555,
            unlock2: 0x2AAA,
            manufacturer_id,
            device_id,
            program_timeout_us: 100,
            erase_timeout_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlashLayout {
    #[serde(flatten)]
    pub layout: StaticLayout,
    pub commands: FlashCommands,
}

/// Truth table of a logic family, one string per vector.
///
/// Each character describes one chip pin, pin 1 first:
/// `0`/`1` drive an input, `L`/`H` expect an output, `G` ground, `V` supply,
/// `X` leave floating and ignore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicTable {
    pub vectors: Cow<'static, [Cow<'static, str>]>,
}

impl LogicTable {
    /// Chip pins checked by at least one vector, ascending.
    pub fn output_pins(&self) -> Vec<u8> {
        let mut pins: Vec<u8> = self
            .vectors
            .iter()
            .flat_map(|v| {
                v.chars()
                    .enumerate()
                    .filter(|(_, c)| matches!(c, 'L' | 'H'))
                    .map(|(i, _)| i as u8 + 1)
            })
            .collect();
        pins.sort_unstable();
        pins.dedup();
        pins
    }
}

/// Family-specific part of a profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChipKind {
    Logic(LogicTable),
    Dram(DramLayout),
    Sram(StaticLayout),
    Rom(StaticLayout),
    Fram(StaticLayout),
    Flash(FlashLayout),
}

impl ChipKind {
    pub fn chip_type(&self) -> ChipType {
        match self {
            ChipKind::Logic(_) => ChipType::Logic,
            ChipKind::Dram(_) => ChipType::Dram,
            ChipKind::Sram(_) => ChipType::Sram,
            ChipKind::Rom(_) => ChipType::Rom,
            ChipKind::Fram(_) => ChipType::Fram,
            ChipKind::Flash(_) => ChipType::Flash,
        }
    }

    /// Static layout shared by SRAM, ROM, FRAM and Flash.
    pub fn static_layout(&self) -> Option<&StaticLayout> {
        match self {
            ChipKind::Sram(l) | ChipKind::Rom(l) | ChipKind::Fram(l) => Some(l),
            ChipKind::Flash(f) => Some(&f.layout),
            _ => None,
        }
    }

    pub fn buses(&self) -> Vec<(BusRole, &BusLayout)> {
        match self {
            ChipKind::Logic(_) => Vec::new(),
            ChipKind::Dram(d) => vec![
                (BusRole::Row, &d.row),
                (BusRole::Column, &d.column),
                (BusRole::DataIn, &d.data_in),
                (BusRole::DataOut, &d.data_out),
            ],
            other => other
                .static_layout()
                .map(|l| vec![(BusRole::Address, &l.address), (BusRole::DataIn, &l.data)])
                .unwrap_or_default(),
        }
    }
}

/// One chip family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipProfile {
    pub name: Cow<'static, str>,
    #[serde(default)]
    pub description: Cow<'static, str>,
    pub pin_count: u8,
    /// Numeric part codes, second sources included.
    pub codes: Cow<'static, [u32]>,
    #[serde(default)]
    pub signals: SignalMap,
    pub layout: ChipKind,
}

impl ChipProfile {
    pub fn chip_type(&self) -> ChipType {
        self.layout.chip_type()
    }

    /// Number of addressable locations (vectors for logic families).
    pub fn capacity(&self) -> u32 {
        match &self.layout {
            ChipKind::Logic(t) => t.vectors.len() as u32,
            _ => 1u32.checked_shl(self.address_bits()).unwrap_or(0),
        }
    }

    /// Address bits of one location; zero for logic families.
    pub fn address_bits(&self) -> u32 {
        match &self.layout {
            ChipKind::Logic(_) => 0,
            ChipKind::Dram(d) => d.row_bits() as u32 + d.column_bits() as u32,
            other => other
                .static_layout()
                .map_or(0, |l| l.address.width() as u32),
        }
    }

    pub fn data_width(&self) -> u8 {
        match &self.layout {
            ChipKind::Logic(t) => t.output_pins().len() as u8,
            ChipKind::Dram(d) => d.data_in.width(),
            other => other.static_layout().map(|l| l.data.width()).unwrap_or(0),
        }
    }

    pub fn matches_code(&self, code: u32) -> bool {
        self.codes.contains(&code)
    }

    /// Checks that the family fits a socket and that its pins do not collide.
    ///
    /// Two buses may share pins only when one declares `alias_of` the other.
    pub fn validate(&self, socket_pins: u8) -> Result<()> {
        if self.pin_count == 0 || self.pin_count % 2 != 0 {
            return Err(self.invalid(format!("odd pin count {}", self.pin_count)));
        }
        if self.pin_count > socket_pins {
            return Err(TesterError::PackageTooLarge {
                pins: self.pin_count,
                socket: socket_pins,
            });
        }

        let mut owners: HashMap<u8, String> = HashMap::new();
        let mut claim = |pin: u8, owner: String| -> Result<()> {
            if pin == 0 || pin > self.pin_count {
                return Err(TesterError::PinOutOfRange {
                    family: self.name.to_string(),
                    pin,
                    pin_count: self.pin_count,
                });
            }
            if let Some(first) = owners.insert(pin, owner.clone()) {
                return Err(TesterError::PinConflict {
                    family: self.name.to_string(),
                    pin,
                    first,
                    second: owner,
                });
            }
            Ok(())
        };

        for (signal, pin) in self.signals.present() {
            claim(pin.pin, signal.name().to_string())?;
        }
        for &pin in self.signals.tie_high.iter() {
            claim(pin, "tie-high".to_string())?;
        }

        let buses = self.layout.buses();
        for (role, layout) in &buses {
            if layout.pins.is_empty() {
                return Err(self.invalid(format!("{} bus is empty", role)));
            }
            match layout.alias_of {
                None => {
                    for (bit, &pin) in layout.pins.iter().enumerate() {
                        claim(pin, format!("{}{}", role, bit))?;
                    }
                }
                Some(target) => {
                    let Some((_, base)) = buses.iter().find(|(r, _)| *r == target) else {
                        return Err(
                            self.invalid(format!("{} aliases missing {} bus", role, target))
                        );
                    };
                    if let Some(&stray) = layout.pins.iter().find(|p| !base.pins.contains(p)) {
                        return Err(self.invalid(format!(
                            "{} bus pin {} is not part of aliased {} bus",
                            role, stray, target
                        )));
                    }
                }
            }
        }

        if self.address_bits() >= MAX_ADDRESS_BITS {
            return Err(self.invalid(format!(
                "{} address bits, at most {} supported",
                self.address_bits(),
                MAX_ADDRESS_BITS - 1
            )));
        }
        if let ChipKind::Logic(table) = &self.layout {
            self.validate_vectors(table)?;
        }
        Ok(())
    }

    fn validate_vectors(&self, table: &LogicTable) -> Result<()> {
        if table.vectors.is_empty() {
            return Err(self.invalid("no test vectors".to_string()));
        }
        for (index, vector) in table.vectors.iter().enumerate() {
            if vector.chars().count() != self.pin_count as usize {
                return Err(self.invalid(format!(
                    "vector {} has {} pins",
                    index,
                    vector.chars().count()
                )));
            }
            for (i, c) in vector.chars().enumerate() {
                let pin = i as u8 + 1;
                let expected_power = match c {
                    '0' | '1' | 'L' | 'H' | 'X' => None,
                    'G' => Some(Signal::Gnd),
                    'V' => Some(Signal::Vcc),
                    other => {
                        return Err(self.invalid(format!(
                            "vector {} pin {}: unknown symbol {:?}",
                            index, pin, other
                        )))
                    }
                };
                if let Some(signal) = expected_power {
                    if self.signals.get(signal).map(|s| s.pin) != Some(pin) {
                        return Err(self.invalid(format!(
                            "vector {} puts {} on pin {}",
                            index,
                            signal.name(),
                            pin
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn invalid(&self, reason: String) -> TesterError {
        TesterError::InvalidProfile {
            family: self.name.to_string(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiny_dram() -> ChipProfile {
        ChipProfile {
            name: Cow::Borrowed("tiny"),
            description: Cow::Borrowed(""),
            pin_count: 8,
            codes: Cow::Borrowed(&[1]),
            signals: SignalMap {
                ras: SignalPin::low(1),
                cas: SignalPin::low(2),
                write_enable: SignalPin::low(3),
                gnd: SignalPin::low(4),
                vcc: SignalPin::high(8),
                ..SignalMap::EMPTY
            },
            layout: ChipKind::Dram(DramLayout {
                row: BusLayout::new(&[5, 6]),
                column: BusLayout::aliasing(&[5, 6], BusRole::Row),
                data_in: BusLayout::new(&[7]),
                data_out: BusLayout::aliasing(&[7], BusRole::DataIn),
                timing: DramTiming::standard(2, 4),
            }),
        }
    }

    #[test]
    fn test_declared_aliases_validate() {
        let profile = tiny_dram();
        assert!(profile.validate(20).is_ok());
        assert_eq!(profile.capacity(), 16);
        assert_eq!(profile.data_width(), 1);
    }

    #[test]
    fn test_undeclared_sharing_is_a_conflict() {
        let mut profile = tiny_dram();
        if let ChipKind::Dram(d) = &mut profile.layout {
            d.column = BusLayout::new(&[5, 6]);
        }
        assert!(matches!(
            profile.validate(20),
            Err(TesterError::PinConflict { pin: 5, .. })
        ));
    }

    #[test]
    fn test_signal_outside_package() {
        let mut profile = tiny_dram();
        profile.signals.vcc = SignalPin::high(9);
        assert!(matches!(
            profile.validate(20),
            Err(TesterError::PinOutOfRange { pin: 9, .. })
        ));
    }

    #[test]
    fn test_alias_must_stay_inside_target() {
        let mut profile = tiny_dram();
        if let ChipKind::Dram(d) = &mut profile.layout {
            d.column = BusLayout::aliasing(&[5, 7], BusRole::Row);
        }
        assert!(matches!(
            profile.validate(20),
            Err(TesterError::InvalidProfile { .. })
        ));
    }

    #[test]
    fn test_address_space_must_fit_a_u32() {
        static WIDE: [u8; 16] = [5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20];
        let mut profile = tiny_dram();
        profile.pin_count = 40;
        profile.signals.vcc = SignalPin::high(40);
        if let ChipKind::Dram(d) = &mut profile.layout {
            d.row = BusLayout::new(&WIDE);
            d.column = BusLayout::aliasing(&WIDE, BusRole::Row);
            d.data_in = BusLayout::new(&[21]);
            d.data_out = BusLayout::aliasing(&[21], BusRole::DataIn);
        }
        assert_eq!(profile.address_bits(), 32);
        assert_eq!(profile.capacity(), 0);
        assert!(matches!(
            profile.validate(40),
            Err(TesterError::InvalidProfile { .. })
        ));

        if let ChipKind::Dram(d) = &mut profile.layout {
            d.column = BusLayout::aliasing(&WIDE[..15], BusRole::Row);
        }
        assert!(profile.validate(40).is_ok());
        assert_eq!(profile.capacity(), 1 << 31);
    }

    #[test]
    fn test_profile_round_trips_through_json() {
        let profile = tiny_dram();
        let json = serde_json::to_string(&profile).unwrap();
        let back: ChipProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_logic_output_pins() {
        let table = LogicTable {
            vectors: Cow::Borrowed(&[Cow::Borrowed("0HGV"), Cow::Borrowed("1LGV")]),
        };
        assert_eq!(table.output_pins(), vec![2]);
    }
}
