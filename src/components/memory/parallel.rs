use crate::component::{BaseComponent, Component, Fault, LaneFaults};
use crate::pin::PinValue;
use crate::profile::{ChipKind, ChipProfile, ChipType, FlashCommands, SignalMap};

/// Time an SST-style part stays busy after a byte program.
const PROGRAM_BUSY_NS: u64 = 20_000;
/// Time it stays busy after a chip erase.
const ERASE_BUSY_NS: u64 = 20_000_000;
/// Command addresses only decode the low 15 address bits.
const COMMAND_MASK: u32 = 0x7FFF;

/// JEDEC software command decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlashState {
    Read,
    Unlocked1,
    Unlocked2,
    Program,
    EraseSetup,
    EraseUnlocked1,
    EraseUnlocked2,
    SoftwareId,
}

#[derive(Debug, Clone, Copy)]
struct Busy {
    until_ns: u64,
    /// Data being written; DQ7 reads inverted until done.
    target: u8,
}

/// Non-multiplexed memory behind /CS, /WE and /OE: SRAM, mask ROM or EPROM,
/// FRAM and JEDEC flash.
///
/// A write is latched when /WE and /CS stop being asserted together.
pub struct ParallelMemory {
    base: BaseComponent,
    chip_type: ChipType,
    signals: SignalMap,
    address_pins: Vec<u8>,
    data_pins: Vec<u8>,
    data_mask: u8,
    cells: Vec<u8>,
    commands: Option<FlashCommands>,
    state: FlashState,
    busy: Option<Busy>,
    faults: LaneFaults,
    writing: bool,
    output: Option<u32>,
}

impl ParallelMemory {
    /// Builds the model for a static profile; `None` for DRAM and logic.
    pub fn new(profile: &ChipProfile) -> Option<Self> {
        let layout = profile.layout.static_layout()?;
        let commands = match &profile.layout {
            ChipKind::Flash(flash) => Some(flash.commands),
            _ => None,
        };
        let chip_type = profile.chip_type();
        let erased = match chip_type {
            ChipType::Sram => 0x00,
            _ => 0xFF,
        };
        let data_mask = layout.data.high_mask() as u8;
        Some(ParallelMemory {
            base: BaseComponent::new(profile),
            chip_type,
            signals: profile.signals.clone(),
            address_pins: layout.address.pins.to_vec(),
            data_pins: layout.data.pins.to_vec(),
            data_mask,
            cells: vec![erased & data_mask; 1 << layout.address.width()],
            commands,
            state: FlashState::Read,
            busy: None,
            faults: LaneFaults::default(),
            writing: false,
            output: None,
        })
    }

    pub fn cells(&self) -> &[u8] {
        &self.cells
    }

    fn write_cycle(&mut self, now_ns: u64, address: u32, data: u8) {
        match self.chip_type {
            ChipType::Sram | ChipType::Fram => self.cells[address as usize] = data,
            ChipType::Flash => self.flash_write(now_ns, address, data),
            _ => {}
        }
    }

    fn flash_write(&mut self, now_ns: u64, address: u32, data: u8) {
        let Some(commands) = self.commands else {
            return;
        };
        if self.busy.is_some() {
            return;
        }
        let command = address & COMMAND_MASK;
        let unlock1 = commands.unlock1 & COMMAND_MASK;
        let unlock2 = commands.unlock2 & COMMAND_MASK;
        self.state = match (self.state, command, data) {
            (FlashState::Program, _, _) => {
                // Programming can only clear bits.
                let cell = &mut self.cells[address as usize];
                *cell &= data;
                self.busy = Some(Busy {
                    until_ns: now_ns + PROGRAM_BUSY_NS,
                    target: data,
                });
                FlashState::Read
            }
            (_, _, 0xF0) => FlashState::Read,
            (FlashState::Read | FlashState::SoftwareId, a, 0xAA) if a == unlock1 => {
                FlashState::Unlocked1
            }
            (FlashState::Unlocked1, a, 0x55) if a == unlock2 => FlashState::Unlocked2,
            (FlashState::Unlocked2, a, 0xA0) if a == unlock1 => FlashState::Program,
            (FlashState::Unlocked2, a, 0x80) if a == unlock1 => FlashState::EraseSetup,
            (FlashState::Unlocked2, a, 0x90) if a == unlock1 => FlashState::SoftwareId,
            (FlashState::EraseSetup, a, 0xAA) if a == unlock1 => FlashState::EraseUnlocked1,
            (FlashState::EraseUnlocked1, a, 0x55) if a == unlock2 => FlashState::EraseUnlocked2,
            (FlashState::EraseUnlocked2, a, 0x10) if a == unlock1 => {
                self.cells.fill(0xFF & self.data_mask);
                self.busy = Some(Busy {
                    until_ns: now_ns + ERASE_BUSY_NS,
                    target: 0xFF,
                });
                FlashState::Read
            }
            (FlashState::SoftwareId, _, _) => FlashState::SoftwareId,
            _ => FlashState::Read,
        };
    }

    fn read_value(&mut self, now_ns: u64, address: u32) -> u8 {
        if let Some(busy) = self.busy {
            if now_ns < busy.until_ns {
                return !busy.target & 0x80;
            }
            self.busy = None;
        }
        if self.state == FlashState::SoftwareId {
            if let Some(commands) = self.commands {
                return match address & 1 {
                    0 => commands.manufacturer_id,
                    _ => commands.device_id,
                };
            }
        }
        self.cells[address as usize]
    }
}

impl Component for ParallelMemory {
    fn name(&self) -> &str {
        &self.base.name
    }

    fn pin_count(&self) -> u8 {
        self.base.pin_count
    }

    fn power_pins(&self) -> (u8, u8) {
        (self.base.gnd, self.base.vcc)
    }

    fn update(&mut self, now_ns: u64, levels: &[PinValue], drive: &mut [Option<PinValue>]) {
        let cs = BaseComponent::active(levels, self.signals.chip_select, true);
        let we = BaseComponent::active(levels, self.signals.write_enable, false);
        let oe = BaseComponent::active(levels, self.signals.output_enable, true);
        let address = BaseComponent::read_bus(levels, &self.address_pins);

        // Whichever of /CS and /WE rises first ends the write.
        let writing = cs && we;
        if self.writing && !writing {
            let data = BaseComponent::read_bus(levels, &self.data_pins) as u8 & self.data_mask;
            self.write_cycle(now_ns, address, data);
        }
        self.writing = writing;

        if cs && oe && !we {
            let value = match self.output {
                Some(value) => value,
                None => {
                    let value = self.read_value(now_ns, address) as u32;
                    let value = self.faults.apply(value);
                    self.output = Some(value);
                    value
                }
            };
            BaseComponent::drive_bus(drive, &self.data_pins, value);
        } else {
            self.output = None;
        }
    }

    fn power_down(&mut self) {
        if self.chip_type == ChipType::Sram {
            self.cells.fill(0);
        }
        self.state = FlashState::Read;
        self.busy = None;
        self.writing = false;
        self.output = None;
    }

    fn inject(&mut self, fault: Fault) {
        self.faults.inject(fault);
    }

    fn load(&mut self, image: &[u8]) -> bool {
        if self.chip_type == ChipType::Sram {
            return false;
        }
        for (cell, &byte) in self.cells.iter_mut().zip(image) {
            *cell = byte & self.data_mask;
        }
        true
    }
}
