use crate::component::{BaseComponent, Component, Fault, LaneFaults, RefreshStats};
use crate::pin::PinValue;
use crate::profile::{ChipKind, ChipProfile, SignalMap};

/// Multiplexed-address DRAM with late write and per-row decay.
///
/// A row keeps its contents only while it is strobed (read, written or
/// RAS-only refreshed) at least once per refresh interval; a row that went
/// longer loses everything the next time it is opened.
pub struct Dram {
    base: BaseComponent,
    signals: SignalMap,
    row_pins: Vec<u8>,
    column_pins: Vec<u8>,
    d_pins: Vec<u8>,
    q_pins: Vec<u8>,
    row_bits: u8,
    column_bits: u8,
    cells: Vec<u32>,
    refresh_rows: u32,
    last_refresh: Vec<Option<u64>>,
    stats: RefreshStats,
    faults: LaneFaults,
    powered: bool,
    ras: bool,
    cas: bool,
    we: bool,
    row: u32,
    column: u32,
    wrote: bool,
    output: Option<u32>,
}

impl Dram {
    /// Builds the model for a DRAM profile; `None` for any other kind.
    pub fn new(profile: &ChipProfile) -> Option<Self> {
        let ChipKind::Dram(layout) = &profile.layout else {
            return None;
        };
        let row_bits = layout.row_bits();
        let column_bits = layout.column_bits();
        let refresh_rows = layout.timing.refresh_rows.max(1).next_power_of_two();
        Some(Dram {
            base: BaseComponent::new(profile),
            signals: profile.signals.clone(),
            row_pins: layout.row.pins.to_vec(),
            column_pins: layout.column.pins.to_vec(),
            d_pins: layout.data_in.pins.to_vec(),
            q_pins: layout.data_out.pins.to_vec(),
            row_bits,
            column_bits,
            cells: vec![0; 1 << (row_bits + column_bits)],
            refresh_rows,
            last_refresh: vec![None; refresh_rows as usize],
            stats: RefreshStats {
                budget_ns: layout.timing.refresh_ms as u64 * 1_000_000,
                ..RefreshStats::default()
            },
            faults: LaneFaults::default(),
            powered: false,
            ras: false,
            cas: false,
            we: false,
            row: 0,
            column: 0,
            wrote: false,
            output: None,
        })
    }

    fn cell_index(&self) -> usize {
        (self.row | self.column << self.row_bits) as usize
    }

    fn open_row(&mut self, now_ns: u64) {
        let refresh_row = (self.row & (self.refresh_rows - 1)) as usize;
        if let Some(last) = self.last_refresh[refresh_row] {
            let gap = now_ns - last;
            self.stats.max_gap_ns = self.stats.max_gap_ns.max(gap);
            if gap > self.stats.budget_ns {
                self.stats.decayed_rows += 1;
                self.decay(refresh_row as u32);
            }
        }
        self.last_refresh[refresh_row] = Some(now_ns);
    }

    fn decay(&mut self, refresh_row: u32) {
        let rows = 1u32 << self.row_bits;
        for row in (refresh_row..rows).step_by(self.refresh_rows as usize) {
            for column in 0..1u32 << self.column_bits {
                self.cells[(row | column << self.row_bits) as usize] = 0;
            }
        }
    }

    fn store(&mut self, levels: &[PinValue]) {
        let index = self.cell_index();
        self.cells[index] = BaseComponent::read_bus(levels, &self.d_pins);
        self.wrote = true;
        self.output = None;
    }
}

impl Component for Dram {
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
        let ras = BaseComponent::active(levels, self.signals.ras, false);
        let cas = BaseComponent::active(levels, self.signals.cas, false);
        let we = BaseComponent::active(levels, self.signals.write_enable, false);
        let oe = BaseComponent::active(levels, self.signals.output_enable, true);

        if !self.powered {
            // Cells start decaying from the moment supply arrives.
            self.powered = true;
            self.last_refresh.fill(Some(now_ns));
            self.ras = ras;
            self.cas = cas;
            self.we = we;
            return;
        }

        if ras && !self.ras {
            self.row = BaseComponent::read_bus(levels, &self.row_pins);
            self.open_row(now_ns);
        }
        if cas && !self.cas && ras {
            self.column = BaseComponent::read_bus(levels, &self.column_pins);
            self.wrote = false;
            self.output = None;
            if we {
                self.store(levels);
            }
        } else if we && !self.we && ras && cas {
            self.store(levels);
        }
        if !ras || !cas {
            self.wrote = false;
            self.output = None;
        }
        self.ras = ras;
        self.cas = cas;
        self.we = we;

        if ras && cas && !we && !self.wrote && oe {
            let value = match self.output {
                Some(value) => value,
                None => {
                    let value = self.faults.apply(self.cells[self.cell_index()]);
                    self.output = Some(value);
                    value
                }
            };
            BaseComponent::drive_bus(drive, &self.q_pins, value);
        }
    }

    fn power_down(&mut self) {
        self.powered = false;
        self.cells.fill(0);
        self.last_refresh.fill(None);
        self.output = None;
    }

    fn inject(&mut self, fault: Fault) {
        self.faults.inject(fault);
    }

    fn refresh_stats(&self) -> Option<RefreshStats> {
        Some(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChipDatabase;

    fn levels_for(pins: &[(u8, PinValue)], pin_count: usize) -> Vec<PinValue> {
        let mut levels = vec![PinValue::High; pin_count];
        for &(pin, level) in pins {
            levels[pin as usize - 1] = level;
        }
        levels
    }

    #[test]
    fn test_late_write_then_read() {
        let db = ChipDatabase::builtin();
        let mut dram = Dram::new(&db[db.by_name("4164").unwrap()]).unwrap();
        let mut drive = vec![None; 16];
        // Address pins low, D high, RAS 4, CAS 15, WE 3.
        let idle = levels_for(&[(5, PinValue::Low), (2, PinValue::High)], 16);
        dram.update(0, &idle, &mut drive);

        let mut ras = idle.clone();
        ras[3] = PinValue::Low;
        dram.update(100, &ras, &mut drive);
        let mut cas = ras.clone();
        cas[14] = PinValue::Low;
        dram.update(200, &cas, &mut drive);
        let mut we = cas.clone();
        we[2] = PinValue::Low;
        dram.update(300, &we, &mut drive);
        dram.update(400, &idle, &mut drive);

        drive.fill(None);
        dram.update(500, &ras, &mut drive);
        dram.update(600, &cas, &mut drive);
        assert_eq!(drive[13], Some(PinValue::High));
    }

    #[test]
    fn test_unrefreshed_row_decays() {
        let db = ChipDatabase::builtin();
        let mut dram = Dram::new(&db[db.by_name("4164").unwrap()]).unwrap();
        let mut drive = vec![None; 16];
        let idle = levels_for(&[], 16);
        dram.update(0, &idle, &mut drive);
        let mut ras = idle.clone();
        ras[3] = PinValue::Low;
        dram.update(3_000_000, &ras, &mut drive);
        let stats = dram.refresh_stats().unwrap();
        assert_eq!(stats.decayed_rows, 1);
        assert_eq!(stats.max_gap_ns, 3_000_000);
    }
}
