//! Device models that sit in the simulated socket.
//!
//! A component only ever sees its own package pins: the bench translates
//! socket positions into chip pins, hands the component the levels it sees and
//! collects what it drives back.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pin::PinValue;
use crate::profile::{ChipProfile, SignalPin};

pub trait Component {
    fn name(&self) -> &str;

    fn pin_count(&self) -> u8;

    /// Ground and supply pin; the model only runs while both are powered.
    fn power_pins(&self) -> (u8, u8);

    /// Reacts to the levels on the package. `levels[i]` is chip pin `i + 1`;
    /// the model sets `drive[i]` for every pin it drives and leaves the rest
    /// `None`.
    fn update(&mut self, now_ns: u64, levels: &[PinValue], drive: &mut [Option<PinValue>]);

    /// Supply removed.
    fn power_down(&mut self) {}

    /// Data-path faults; pin faults are handled by the bench.
    fn inject(&mut self, _fault: Fault) {}

    /// Preloads non-volatile contents. False when the model has none.
    fn load(&mut self, _image: &[u8]) -> bool {
        false
    }

    fn refresh_stats(&self) -> Option<RefreshStats> {
        None
    }
}

/// What a DRAM model saw of its refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Longest time any refresh row went unstrobed.
    pub max_gap_ns: u64,
    /// Rows that lost their contents.
    pub decayed_rows: u64,
    pub budget_ns: u64,
}

/// Common data of every model.
#[derive(Debug, Clone)]
pub struct BaseComponent {
    pub name: String,
    pub pin_count: u8,
    pub gnd: u8,
    pub vcc: u8,
}

impl BaseComponent {
    pub fn new(profile: &ChipProfile) -> Self {
        BaseComponent {
            name: profile.name.to_string(),
            pin_count: profile.pin_count,
            gnd: profile.signals.gnd.map_or(0, |s| s.pin),
            vcc: profile.signals.vcc.map_or(0, |s| s.pin),
        }
    }

    pub fn level(levels: &[PinValue], pin: u8) -> PinValue {
        levels
            .get(pin as usize - 1)
            .copied()
            .unwrap_or(PinValue::Low)
    }

    /// True when the signal is asserted; absent signals count as `absent`.
    pub fn active(levels: &[PinValue], signal: Option<SignalPin>, absent: bool) -> bool {
        signal.map_or(absent, |s| Self::level(levels, s.pin) == s.active)
    }

    /// Bus value from chip pins, bit 0 first.
    pub fn read_bus(levels: &[PinValue], pins: &[u8]) -> u32 {
        pins.iter().enumerate().fold(0, |acc, (bit, &pin)| {
            if Self::level(levels, pin).to_bool() {
                acc | 1 << bit
            } else {
                acc
            }
        })
    }

    pub fn drive_bus(drive: &mut [Option<PinValue>], pins: &[u8], value: u32) {
        for (bit, &pin) in pins.iter().enumerate() {
            if let Some(slot) = drive.get_mut(pin as usize - 1) {
                *slot = Some(PinValue::from_bool(value >> bit & 1 == 1));
            }
        }
    }
}

/// Injected defects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fault {
    /// The chip pin sits at a fixed level whatever the tester drives.
    StuckPin { pin: u8, level: PinValue },
    /// A data lane (data bit or logic output) always reads low.
    DeadLane { lane: u8 },
    /// A data lane reads inverted on every `period`-th read.
    FlakyLane { lane: u8, period: u32 },
}

impl FromStr for Fault {
    type Err = String;

    /// `stuck:<pin>:<high|low>`, `dead:<lane>` or `flaky:<lane>:<period>`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        let number = |text: &str| {
            text.parse::<u32>()
                .map_err(|e| format!("bad number {:?} in fault {:?}: {}", text, s, e))
        };
        match parts.as_slice() {
            ["stuck", pin, level] => Ok(Fault::StuckPin {
                pin: number(*pin)? as u8,
                level: match level.to_ascii_lowercase().as_str() {
                    "high" | "h" | "1" => PinValue::High,
                    "low" | "l" | "0" => PinValue::Low,
                    other => return Err(format!("bad level {:?} in fault {:?}", other, s)),
                },
            }),
            ["dead", lane] => Ok(Fault::DeadLane {
                lane: number(*lane)? as u8,
            }),
            ["flaky", lane, period] => Ok(Fault::FlakyLane {
                lane: number(*lane)? as u8,
                period: number(*period)?.max(1),
            }),
            _ => Err(format!(
                "unknown fault {:?}, expected stuck:<pin>:<level>, dead:<lane> or flaky:<lane>:<period>",
                s
            )),
        }
    }
}

/// Data-lane faults applied to every value a model puts on its outputs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaneFaults {
    dead: u32,
    flaky: Option<(u8, u32)>,
    reads: u64,
}

impl LaneFaults {
    pub fn inject(&mut self, fault: Fault) {
        match fault {
            Fault::DeadLane { lane } => self.dead |= 1 << lane,
            Fault::FlakyLane { lane, period } => self.flaky = Some((lane, period.max(1))),
            Fault::StuckPin { .. } => {}
        }
    }

    /// Applies the faults to one read; call once per read access.
    pub fn apply(&mut self, value: u32) -> u32 {
        self.reads += 1;
        let mut value = value & !self.dead;
        if let Some((lane, period)) = self.flaky {
            if self.reads % period as u64 == 0 {
                value ^= 1 << lane;
            }
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_parsing() {
        assert_eq!(
            "stuck:4:high".parse::<Fault>(),
            Ok(Fault::StuckPin {
                pin: 4,
                level: PinValue::High
            })
        );
        assert_eq!("dead:2".parse::<Fault>(), Ok(Fault::DeadLane { lane: 2 }));
        assert_eq!(
            "flaky:0:1000".parse::<Fault>(),
            Ok(Fault::FlakyLane {
                lane: 0,
                period: 1000
            })
        );
        assert!("melted".parse::<Fault>().is_err());
        assert!("stuck:x:high".parse::<Fault>().is_err());
    }

    #[test]
    fn test_lane_faults() {
        let mut faults = LaneFaults::default();
        faults.inject(Fault::DeadLane { lane: 1 });
        faults.inject(Fault::FlakyLane { lane: 0, period: 3 });
        assert_eq!(faults.apply(0b11), 0b01);
        assert_eq!(faults.apply(0b11), 0b01);
        assert_eq!(faults.apply(0b11), 0b00);
    }

    #[test]
    fn test_bus_helpers() {
        let levels = [PinValue::High, PinValue::Low, PinValue::High];
        assert_eq!(BaseComponent::read_bus(&levels, &[3, 2, 1]), 0b101);
        let mut drive = [None; 3];
        BaseComponent::drive_bus(&mut drive, &[2, 3], 0b01);
        assert_eq!(drive, [None, Some(PinValue::High), Some(PinValue::Low)]);
    }
}
