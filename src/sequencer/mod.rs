//! # Test sequencer
//!
//! Drives the buses of the active family through datasheet timing. Every bus
//! access is one cycle of an explicit state machine:
//!
//! ```text
//! Idle -> AddressSetup -> RowStrobe -> ColumnStrobe -> DataTransfer -> Compare -> RefreshCheck -> Idle
//! ```
//!
//! Static parts skip the column phase and use chip select as their row strobe;
//! logic families apply a truth-table vector in `AddressSetup` and sample the
//! outputs in `DataTransfer`. Delays are busy-waits on the [`Timebase`].
//!
//! A sequencer borrows the socket for as long as it lives and keeps no state
//! of its own beyond the current cycle, so a run can build a fresh one on every
//! poll. Multi-pass bookkeeping lives in [`PlanCursor`] and
//! [`RefreshScheduler`].

pub mod identify;
mod logic;
pub mod program;
mod refresh;
mod wiring;

use std::str::FromStr;

use log::{debug, trace};
use serde::{Deserialize, Serialize};

pub use refresh::RefreshScheduler;
pub use wiring::{BusSet, Control, Controls, Wiring};

use crate::classifier::{PassStats, VectorMismatch};
use crate::error::{Result, TesterError};
use crate::pin::{GpioPort, PinMode};
use crate::profile::{ChipProfile, ChipType, Signal};
use crate::socket::SocketMap;
use crate::timing::Timebase;

/// Settle time after power is applied.
pub const POWER_SETTLE_NS: u32 = 200_000;
/// Propagation allowance for logic families.
pub const LOGIC_SETTLE_NS: u32 = 1_000;

/// What a run does with the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPattern {
    AllZeros,
    AllOnes,
    Alternating,
    /// All fills one after another.
    March,
    /// Identification by elimination only.
    Identify,
}

impl TestPattern {
    pub const ALL: [TestPattern; 5] = [
        TestPattern::AllZeros,
        TestPattern::AllOnes,
        TestPattern::Alternating,
        TestPattern::March,
        TestPattern::Identify,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TestPattern::AllZeros => "zeros",
            TestPattern::AllOnes => "ones",
            TestPattern::Alternating => "alternating",
            TestPattern::March => "march",
            TestPattern::Identify => "identify",
        }
    }

    pub fn fills(&self) -> &'static [Fill] {
        match self {
            TestPattern::AllZeros => &[Fill::Zeros],
            TestPattern::AllOnes => &[Fill::Ones],
            TestPattern::Alternating => &[Fill::Alternating],
            TestPattern::March => &[
                Fill::Zeros,
                Fill::Ones,
                Fill::Alternating,
                Fill::InverseAlternating,
            ],
            TestPattern::Identify => &[],
        }
    }
}

impl std::fmt::Display for TestPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TestPattern {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        TestPattern::ALL
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<&str> = TestPattern::ALL.iter().map(|p| p.name()).collect();
                format!("unknown pattern {:?}, expected one of {}", s, names.join(", "))
            })
    }
}

/// Data written by one fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    Zeros,
    Ones,
    /// 0101... on even addresses, 1010... on odd ones.
    Alternating,
    InverseAlternating,
}

impl Fill {
    pub fn value(&self, address: u32, mask: u32) -> u32 {
        let even = address & 1 == 0;
        let pattern = match self {
            Fill::Zeros => 0,
            Fill::Ones => u32::MAX,
            Fill::Alternating if even => 0x5555_5555,
            Fill::Alternating => 0xAAAA_AAAA,
            Fill::InverseAlternating if even => 0xAAAA_AAAA,
            Fill::InverseAlternating => 0x5555_5555,
        };
        pattern & mask
    }
}

/// Order in which a fill visits the address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressOrder {
    #[default]
    Sequential,
    /// Odd-multiplier permutation of the address space, offset by a seed.
    PseudoRandom(u32),
}

impl AddressOrder {
    /// Address visited at step `index`; a bijection over `0..=mask`.
    pub fn address(&self, index: u32, mask: u32) -> u32 {
        match self {
            AddressOrder::Sequential => index & mask,
            AddressOrder::PseudoRandom(seed) => {
                index.wrapping_mul(0x9E37_79B1).wrapping_add(*seed) & mask
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    AddressSetup,
    RowStrobe,
    ColumnStrobe,
    DataTransfer,
    Compare,
    RefreshCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Write(u32),
    /// Read and compare against the expected value.
    Read(u32),
    /// Read without comparing.
    Sample,
    /// Apply a truth-table vector; the address selects it.
    Vector,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleResult {
    pub observed: u32,
    pub expected: u32,
    /// One bit per failing lane.
    pub mismatch: u32,
}

/// One executed step of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    pub address: u32,
    pub compared: bool,
    pub result: CycleResult,
}

/// Position inside a test plan, kept between polls.
///
/// Memory plans write every address of a fill and then verify it; logic plans
/// apply each vector once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanCursor {
    fills: Vec<Fill>,
    fill: usize,
    verifying: bool,
    index: u32,
    capacity: u32,
    order: AddressOrder,
    logic: bool,
}

impl PlanCursor {
    pub fn new(profile: &ChipProfile, pattern: TestPattern, order: AddressOrder) -> Result<Self> {
        let unsupported = || TesterError::Unsupported {
            family: profile.name.to_string(),
            operation: format!("{} test", pattern),
        };
        let capacity = profile.capacity();
        match profile.chip_type() {
            ChipType::Logic => Ok(PlanCursor {
                fills: Vec::new(),
                fill: 0,
                verifying: true,
                index: 0,
                capacity,
                order: AddressOrder::Sequential,
                logic: true,
            }),
            ChipType::Dram | ChipType::Sram | ChipType::Fram => {
                if pattern.fills().is_empty() {
                    return Err(unsupported());
                }
                Ok(PlanCursor {
                    fills: pattern.fills().to_vec(),
                    fill: 0,
                    verifying: false,
                    index: 0,
                    capacity,
                    order,
                    logic: false,
                })
            }
            ChipType::Rom | ChipType::Flash => Err(unsupported()),
        }
    }

    /// Bus cycles in one pass, writes included.
    pub fn cycles_per_pass(&self) -> u64 {
        if self.logic {
            self.capacity as u64
        } else {
            self.fills.len() as u64 * 2 * self.capacity as u64
        }
    }

    /// Compare cycles in one pass.
    pub fn compares_per_pass(&self) -> u64 {
        if self.logic {
            self.capacity as u64
        } else {
            self.fills.len() as u64 * self.capacity as u64
        }
    }

    pub fn is_done(&self) -> bool {
        if self.logic {
            self.index >= self.capacity
        } else {
            self.fill >= self.fills.len()
        }
    }

    /// Back to the start for another pass.
    pub fn rewind(&mut self) {
        self.fill = 0;
        self.index = 0;
        self.verifying = self.logic;
    }

    /// Next cycle as (compare key, address, access), advancing the cursor.
    fn advance(&mut self, data_mask: u32) -> Option<(u64, u32, Access)> {
        if self.is_done() {
            return None;
        }
        if self.logic {
            let index = self.index;
            self.index += 1;
            return Some((index as u64, index, Access::Vector));
        }

        let fill = self.fills[self.fill];
        let address = self.order.address(self.index, self.capacity - 1);
        let value = fill.value(address, data_mask);
        let key = (self.fill as u64) << 32 | address as u64;
        let access = if self.verifying {
            Access::Read(value)
        } else {
            Access::Write(value)
        };

        self.index += 1;
        if self.index >= self.capacity {
            self.index = 0;
            if self.verifying {
                self.fill += 1;
            }
            self.verifying = !self.verifying;
        }
        Some((key, address, access))
    }
}

pub struct TestSequencer<'a, P: GpioPort, T: Timebase> {
    socket: &'a mut SocketMap<P>,
    timebase: &'a mut T,
    profile: &'a ChipProfile,
    wiring: Wiring<'a>,
    refresh: &'a mut RefreshScheduler,
    state: CycleState,
    cycles: u64,
}

impl<'a, P: GpioPort, T: Timebase> TestSequencer<'a, P, T> {
    /// Resolves the family against the socket. No line moves until
    /// [`power_up`](Self::power_up).
    pub fn new(
        socket: &'a mut SocketMap<P>,
        timebase: &'a mut T,
        profile: &'a ChipProfile,
        refresh: &'a mut RefreshScheduler,
    ) -> Result<Self> {
        let wiring = Wiring::resolve(profile, socket.pin_count())?;
        Ok(TestSequencer {
            socket,
            timebase,
            profile,
            wiring,
            refresh,
            state: CycleState::Idle,
            cycles: 0,
        })
    }

    pub fn profile(&self) -> &ChipProfile {
        self.profile
    }

    pub fn wiring(&self) -> &Wiring<'a> {
        &self.wiring
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Cycles run by this sequencer, refresh sweeps excluded.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    pub fn lanes(&self) -> usize {
        self.wiring.buses.lanes()
    }

    pub fn data_mask(&self) -> u32 {
        self.wiring.buses.data_mask()
    }

    pub fn now_us(&self) -> u64 {
        self.timebase.now_us()
    }

    /// Drives control lines inactive, applies power and sets bus directions.
    /// DRAM gets its wake-up refresh sweep here.
    pub fn power_up(&mut self) -> Result<()> {
        debug!(
            "Powering {} ({} pins, {} in socket)",
            self.profile.name,
            self.profile.pin_count,
            self.socket.pin_count()
        );
        self.wiring.controls.power_up(self.socket);
        self.wiring.buses.power_up(self.socket);
        self.timebase.delay_ns(POWER_SETTLE_NS);
        if self.refresh.is_enabled() {
            self.refresh.reset();
            self.refresh_sweep();
        }
        Ok(())
    }

    /// Every line back to high impedance; the chip loses power.
    pub fn safe_state(&mut self) {
        self.socket.release_all();
        self.state = CycleState::Idle;
        debug!("{}: socket released", self.profile.name);
    }

    /// Between cycles: fails on a missed deadline, sweeps when one is due.
    pub fn idle(&mut self) -> Result<()> {
        let now = self.timebase.now_us();
        self.refresh.check_deadline(now)?;
        if self.refresh.due(now) {
            self.refresh_sweep();
        }
        Ok(())
    }

    /// RAS-only refresh of every refresh row.
    pub fn refresh_sweep(&mut self) {
        let BusSet::Dram { row, timing, .. } = &mut self.wiring.buses else {
            return;
        };
        let started = self.timebase.now_us();
        for r in 0..self.refresh.rows() {
            row.write(self.socket, r);
            self.timebase.delay_ns(timing.address_setup_ns);
            self.wiring.controls.assert(self.socket, Signal::Ras);
            self.timebase.delay_ns(timing.ras_pulse_ns);
            self.wiring.controls.release(self.socket, Signal::Ras);
            self.timebase.delay_ns(timing.precharge_ns);
        }
        self.refresh.record_sweep(started);
        trace!(
            "{}: refresh sweep of {} rows at {} us",
            self.profile.name,
            self.refresh.rows(),
            started
        );
    }

    pub fn write(&mut self, address: u32, value: u32) -> Result<()> {
        self.cycle(address, Access::Write(value)).map(|_| ())
    }

    pub fn read(&mut self, address: u32) -> Result<u32> {
        self.cycle(address, Access::Sample).map(|r| r.observed)
    }

    /// Runs one full bus cycle.
    pub fn cycle(&mut self, address: u32, access: Access) -> Result<CycleResult> {
        self.check_access(access)?;
        self.idle()?;

        let started = self.timebase.now_us();
        let mut result = CycleResult::default();
        let mut state = CycleState::AddressSetup;
        while state != CycleState::Idle {
            self.state = state;
            trace!("{} {:#x}: {:?}", self.profile.name, address, state);
            state = match state {
                CycleState::AddressSetup => {
                    self.address_setup(address);
                    CycleState::RowStrobe
                }
                CycleState::RowStrobe => {
                    self.row_strobe();
                    CycleState::ColumnStrobe
                }
                CycleState::ColumnStrobe => {
                    self.column_strobe(address);
                    CycleState::DataTransfer
                }
                CycleState::DataTransfer => {
                    result.observed = self.data_transfer(access);
                    CycleState::Compare
                }
                CycleState::Compare => {
                    result = self.compare(address, access, result.observed);
                    CycleState::RefreshCheck
                }
                CycleState::RefreshCheck => {
                    let now = self.timebase.now_us();
                    self.refresh.record_cycle(now - started);
                    self.refresh.check_deadline(now)?;
                    if self.refresh.due(now) {
                        self.refresh_sweep();
                    }
                    CycleState::Idle
                }
                CycleState::Idle => CycleState::Idle,
            };
        }
        self.state = CycleState::Idle;
        self.cycles += 1;
        Ok(result)
    }

    /// Runs the next cycle of a plan and tallies its comparison.
    pub fn step(&mut self, cursor: &mut PlanCursor, stats: &mut PassStats) -> Result<Option<Step>> {
        let Some((key, address, access)) = cursor.advance(self.data_mask()) else {
            return Ok(None);
        };
        let result = self.cycle(address, access)?;
        let compared = matches!(access, Access::Read(_) | Access::Vector);
        if compared {
            stats.record(key, result.mismatch);
        }
        Ok(Some(Step {
            address,
            compared,
            result,
        }))
    }

    /// Failing outputs of a logic step, by chip pin.
    pub fn vector_mismatches(&self, step: &Step) -> Vec<VectorMismatch> {
        match &self.wiring.buses {
            BusSet::Logic { table, outputs } => table
                .vectors
                .get(step.address as usize)
                .map(|v| {
                    logic::vector_mismatches(
                        step.address as usize,
                        v,
                        outputs,
                        step.result.observed,
                    )
                })
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn check_access(&self, access: Access) -> Result<()> {
        let logic = matches!(self.wiring.buses, BusSet::Logic { .. });
        let supported = match access {
            Access::Vector => logic,
            Access::Write(_) => !logic && self.wiring.controls.has(Signal::WriteEnable),
            Access::Read(_) | Access::Sample => !logic,
        };
        if supported {
            Ok(())
        } else {
            Err(TesterError::Unsupported {
                family: self.profile.name.to_string(),
                operation: match access {
                    Access::Write(_) => "write cycles",
                    Access::Vector => "truth-table vectors",
                    _ => "read cycles",
                }
                .to_string(),
            })
        }
    }

    fn address_setup(&mut self, address: u32) {
        match &mut self.wiring.buses {
            BusSet::Logic { table, .. } => {
                if let Some(vector) = table.vectors.get(address as usize) {
                    logic::apply_inputs(self.socket, &self.wiring.alignment, vector);
                }
            }
            BusSet::Dram { row, timing, .. } => {
                row.write(self.socket, address);
                self.timebase.delay_ns(timing.address_setup_ns);
            }
            BusSet::Static {
                address: bus,
                timing,
                ..
            } => {
                bus.write(self.socket, address);
                self.timebase.delay_ns(timing.address_setup_ns);
            }
        }
    }

    fn row_strobe(&mut self) {
        match &self.wiring.buses {
            BusSet::Logic { .. } => {}
            BusSet::Dram { timing, .. } => {
                self.wiring.controls.assert(self.socket, Signal::Ras);
                self.timebase.delay_ns(timing.row_hold_ns);
            }
            BusSet::Static { .. } => {
                self.wiring.controls.assert(self.socket, Signal::ChipSelect);
            }
        }
    }

    fn column_strobe(&mut self, address: u32) {
        if let BusSet::Dram {
            row,
            column,
            timing,
            ..
        } = &mut self.wiring.buses
        {
            column.write(self.socket, address >> row.width());
            self.timebase.delay_ns(timing.address_setup_ns);
            self.wiring.controls.assert(self.socket, Signal::Cas);
            if !timing.ras_through_cas {
                self.wiring.controls.release(self.socket, Signal::Ras);
            }
        }
    }

    /// Moves the data and closes the cycle; returns what was sampled.
    fn data_transfer(&mut self, access: Access) -> u32 {
        let controls = &self.wiring.controls;
        let socket = &mut *self.socket;
        match &mut self.wiring.buses {
            BusSet::Logic { outputs, .. } => {
                self.timebase.delay_ns(LOGIC_SETTLE_NS);
                logic::sample(socket, outputs)
            }
            BusSet::Dram {
                data_in,
                data_out,
                common_io,
                timing,
                ..
            } => {
                let mut observed = 0;
                if let Access::Write(value) = access {
                    if *common_io {
                        data_in.set_mode(socket, PinMode::Output);
                    }
                    data_in.write(socket, value);
                    controls.assert(socket, Signal::WriteEnable);
                    self.timebase.delay_ns(timing.access_ns);
                    controls.release(socket, Signal::WriteEnable);
                    if *common_io {
                        data_in.set_mode(socket, PinMode::Input);
                    }
                } else {
                    controls.assert(socket, Signal::OutputEnable);
                    self.timebase.delay_ns(timing.access_ns);
                    observed = data_out.read(socket);
                    controls.release(socket, Signal::OutputEnable);
                }
                controls.release(socket, Signal::Cas);
                controls.release(socket, Signal::Ras);
                self.timebase.delay_ns(timing.precharge_ns);
                observed
            }
            BusSet::Static { data, timing, .. } => {
                let mut observed = 0;
                if let Access::Write(value) = access {
                    controls.assert(socket, Signal::WriteEnable);
                    data.set_mode(socket, PinMode::Output);
                    data.write(socket, value);
                    self.timebase.delay_ns(timing.write_pulse_ns);
                    controls.release(socket, Signal::WriteEnable);
                    controls.release(socket, Signal::ChipSelect);
                    data.set_mode(socket, PinMode::Input);
                } else {
                    controls.assert(socket, Signal::OutputEnable);
                    self.timebase.delay_ns(timing.access_ns);
                    observed = data.read(socket);
                    controls.release(socket, Signal::OutputEnable);
                    controls.release(socket, Signal::ChipSelect);
                }
                self.timebase.delay_ns(timing.recovery_ns);
                observed
            }
        }
    }

    fn compare(&self, address: u32, access: Access, observed: u32) -> CycleResult {
        let mask = self.data_mask();
        match access {
            Access::Read(expected) => CycleResult {
                observed,
                expected,
                mismatch: (observed ^ expected) & mask,
            },
            Access::Vector => {
                let (expected, care) = match &self.wiring.buses {
                    BusSet::Logic { table, outputs } => table
                        .vectors
                        .get(address as usize)
                        .map(|v| logic::expected(v, outputs))
                        .unwrap_or((0, 0)),
                    _ => (0, 0),
                };
                CycleResult {
                    observed,
                    expected,
                    mismatch: (observed ^ expected) & care,
                }
            }
            Access::Write(_) | Access::Sample => CycleResult {
                observed,
                expected: observed,
                mismatch: 0,
            },
        }
    }
}
