//! Simulated tester hardware: a ZIF socket of AVR-style GPIO lines with one
//! device model mounted in it.
//!
//! Every register access costs a fixed slice of virtual time and lets the
//! mounted device react, so a sequencer driving the bench sees the same
//! timing a real controller would.

use log::{debug, trace, warn};

use crate::component::{Component, Fault};
use crate::error::Result;
use crate::pin::{GpioPort, PinMode, PinValue};
use crate::socket::{Alignment, ZifGeneration};
use crate::timing::VirtualClock;

/// Virtual time one GPIO register access takes.
pub const GPIO_OP_NS: u64 = 125;

/// Level change on a chip pin, as seen from the package.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub at_ns: u64,
    pub chip_pin: u8,
    pub level: PinValue,
}

struct Mounted {
    device: Box<dyn Component>,
    alignment: Alignment,
    /// Chip-side level of every package pin.
    levels: Vec<PinValue>,
    drive: Vec<Option<PinValue>>,
    /// Pins where tester and chip currently fight.
    fighting: Vec<bool>,
    powered: bool,
}

pub struct Bench {
    generation: ZifGeneration,
    clock: VirtualClock,
    op_cost_ns: u64,
    modes: Vec<PinMode>,
    latches: Vec<PinValue>,
    mounted: Option<Mounted>,
    stuck: Vec<(u8, PinValue)>,
    contention: u64,
    trace: Option<Vec<Edge>>,
}

impl Bench {
    pub fn new(generation: ZifGeneration, clock: VirtualClock) -> Self {
        let lines = generation.pin_count() as usize;
        Bench {
            generation,
            clock,
            op_cost_ns: GPIO_OP_NS,
            modes: vec![PinMode::Input; lines],
            latches: vec![PinValue::Low; lines],
            mounted: None,
            stuck: Vec::new(),
            contention: 0,
            trace: None,
        }
    }

    pub fn with_op_cost(mut self, ns: u64) -> Self {
        self.op_cost_ns = ns;
        self
    }

    /// Drops a device into the socket, centered like a real package.
    pub fn mount(&mut self, device: Box<dyn Component>) -> Result<()> {
        let alignment = Alignment::centered(device.pin_count(), self.generation.pin_count())?;
        let pins = device.pin_count() as usize;
        debug!(
            "Mounting {} ({} pins) in the {}-pin socket",
            device.name(),
            pins,
            self.generation.pin_count()
        );
        self.mounted = Some(Mounted {
            device,
            alignment,
            levels: vec![PinValue::Low; pins],
            drive: vec![None; pins],
            fighting: vec![false; pins],
            powered: false,
        });
        self.stuck.clear();
        self.settle();
        Ok(())
    }

    pub fn unmount(&mut self) -> Option<Box<dyn Component>> {
        self.stuck.clear();
        self.mounted.take().map(|m| m.device)
    }

    /// Pin faults stay with the bench; everything else goes to the device.
    pub fn inject(&mut self, fault: Fault) {
        match fault {
            Fault::StuckPin { pin, level } => {
                debug!("Chip pin {} stuck {}", pin, level);
                self.stuck.retain(|&(p, _)| p != pin);
                self.stuck.push((pin, level));
            }
            other => {
                if let Some(mounted) = &mut self.mounted {
                    mounted.device.inject(other);
                }
            }
        }
        self.settle();
    }

    pub fn clock(&self) -> &VirtualClock {
        &self.clock
    }

    /// Times a tester output fought a chip output.
    pub fn contention(&self) -> u64 {
        self.contention
    }

    /// Starts recording chip-side level changes.
    pub fn enable_trace(&mut self) {
        self.trace = Some(Vec::new());
    }

    pub fn trace(&self) -> &[Edge] {
        self.trace.as_deref().unwrap_or(&[])
    }

    pub fn take_trace(&mut self) -> Vec<Edge> {
        self.trace.as_mut().map(std::mem::take).unwrap_or_default()
    }

    pub fn device(&self) -> Option<&dyn Component> {
        self.mounted.as_ref().map(|m| m.device.as_ref())
    }

    pub fn device_mut(&mut self) -> Option<&mut (dyn Component + 'static)> {
        self.mounted.as_mut().map(|m| m.device.as_mut())
    }

    pub fn is_powered(&self) -> bool {
        self.mounted.as_ref().map_or(false, |m| m.powered)
    }

    fn index(&self, controller_pin: u8) -> Option<usize> {
        self.generation
            .position_of(controller_pin)
            .map(|position| position as usize - 1)
    }

    /// Level the tester side puts on a position, ignoring the chip.
    fn tester_level(&self, index: usize) -> Option<PinValue> {
        match self.modes[index] {
            PinMode::Output => Some(self.latches[index]),
            PinMode::InputPullUp | PinMode::Input => None,
        }
    }

    fn chip_level(&self, mounted: &Mounted, chip_pin: u8, index: usize) -> PinValue {
        if let Some(&(_, level)) = self.stuck.iter().find(|&&(p, _)| p == chip_pin) {
            return level;
        }
        if let Some(level) = self.tester_level(index) {
            return level;
        }
        if let Some(level) = mounted.drive[chip_pin as usize - 1] {
            return level;
        }
        match self.modes[index] {
            PinMode::InputPullUp => PinValue::High,
            _ => PinValue::Low,
        }
    }

    fn compute_levels(&self, mounted: &Mounted) -> Vec<PinValue> {
        (1..=mounted.alignment.package_pins())
            .map(|pin| match mounted.alignment.position(pin) {
                Some(position) => self.chip_level(mounted, pin, position as usize - 1),
                None => PinValue::Low,
            })
            .collect()
    }

    /// Lets the device react to the current tester state.
    fn settle(&mut self) {
        let Some(mut mounted) = self.mounted.take() else {
            return;
        };
        let now = self.clock.now_ns();
        let levels = self.compute_levels(&mounted);

        let (gnd, vcc) = mounted.device.power_pins();
        let powered = [(gnd, PinValue::Low), (vcc, PinValue::High)]
            .iter()
            .all(|&(pin, level)| {
                mounted
                    .alignment
                    .position(pin)
                    .map(|position| position as usize - 1)
                    .map_or(false, |index| self.tester_level(index) == Some(level))
                    && !self.stuck.iter().any(|&(p, l)| p == pin && l != level)
            });

        mounted.drive.fill(None);
        if powered {
            if !mounted.powered {
                debug!("{} powered at {} ns", mounted.device.name(), now);
                mounted.powered = true;
            }
            let Mounted { device, drive, .. } = &mut mounted;
            device.update(now, &levels, drive);
        } else if mounted.powered {
            debug!("{} lost power at {} ns", mounted.device.name(), now);
            mounted.powered = false;
            mounted.device.power_down();
        }

        let settled = self.compute_levels(&mounted);
        for (i, (&before, &after)) in mounted.levels.iter().zip(&settled).enumerate() {
            if before != after {
                if let Some(trace) = &mut self.trace {
                    trace.push(Edge {
                        at_ns: now,
                        chip_pin: i as u8 + 1,
                        level: after,
                    });
                }
            }
        }
        mounted.levels = settled;

        for pin in 1..=mounted.alignment.package_pins() {
            let i = pin as usize - 1;
            let fighting = match (
                mounted.alignment.position(pin),
                mounted.drive[i],
            ) {
                (Some(position), Some(chip)) => self
                    .tester_level(position as usize - 1)
                    .map_or(false, |tester| tester != chip),
                _ => false,
            };
            if fighting && !mounted.fighting[i] {
                self.contention += 1;
                warn!("Bus contention on chip pin {} at {} ns", pin, now);
            }
            mounted.fighting[i] = fighting;
        }

        self.mounted = Some(mounted);
    }

    fn tick(&mut self) {
        self.clock.advance_ns(self.op_cost_ns);
        self.settle();
    }
}

impl GpioPort for Bench {
    fn set_mode(&mut self, pin: u8, mode: PinMode) {
        let Some(index) = self.index(pin) else {
            return;
        };
        self.modes[index] = mode;
        match mode {
            PinMode::InputPullUp => self.latches[index] = PinValue::High,
            PinMode::Input => self.latches[index] = PinValue::Low,
            PinMode::Output => {}
        }
        trace!("GPIO {} -> {:?}", pin, mode);
        self.tick();
    }

    fn write(&mut self, pin: u8, level: PinValue) {
        let Some(index) = self.index(pin) else {
            return;
        };
        self.latches[index] = level;
        self.tick();
    }

    fn read(&mut self, pin: u8) -> PinValue {
        self.tick();
        let Some(index) = self.index(pin) else {
            return PinValue::Low;
        };
        let position = index as u8 + 1;
        if let Some(mounted) = &self.mounted {
            if let Some(chip_pin) = mounted.alignment.chip_pin(position) {
                return mounted.levels[chip_pin as usize - 1];
            }
        }
        match self.modes[index] {
            PinMode::Output => self.latches[index],
            PinMode::InputPullUp => PinValue::High,
            PinMode::Input => PinValue::Low,
        }
    }
}
