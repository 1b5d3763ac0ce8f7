//! Shared fixtures for the integration tests.
//!
//! `bench_tester` mounts a simulated family in a fresh bench and hands back
//! the tester together with a second handle on its virtual clock, so tests
//! can stall time between polls. `LoopbackPort` is a bare GPIO block with
//! nothing in the socket.

#![allow(dead_code)]

use std::collections::HashMap;

use rusty_ict::{
    Bench, DeviceFactory, Fault, GpioPort, PinMode, PinValue, RunHandle, TestOutcome, Tester,
    TesterConfig, VirtualClock, ZifGeneration,
};

pub type BenchTester = Tester<Bench, VirtualClock>;

pub fn config(socket: ZifGeneration) -> TesterConfig {
    TesterConfig {
        socket,
        ..TesterConfig::default()
    }
}

/// Tester over a bench holding `family`, faults already injected.
pub fn bench_tester(
    family: &str,
    config: TesterConfig,
    faults: &[Fault],
) -> (BenchTester, VirtualClock) {
    let clock = VirtualClock::new();
    let bench = Bench::new(config.socket, clock.clone());
    let mut tester = Tester::new(bench, clock.clone(), config).unwrap();

    let id = tester
        .database()
        .by_name(family)
        .unwrap_or_else(|| panic!("no family {}", family));
    let device = DeviceFactory::new().create(&tester.database()[id]).unwrap();
    let bench = tester.socket_mut().port_mut();
    bench.mount(device).unwrap();
    for &fault in faults {
        bench.inject(fault);
    }
    (tester, clock)
}

/// Polls until the run reports its outcome.
pub fn run_to_end(tester: &mut BenchTester, handle: &mut RunHandle) -> TestOutcome {
    loop {
        let progress = tester.poll_progress(handle).unwrap();
        if let Some(outcome) = progress.outcome {
            return outcome;
        }
    }
}

/// GPIO block with an empty socket: outputs read back their latch, pull-ups
/// read high and plain inputs read low.
#[derive(Debug, Default)]
pub struct LoopbackPort {
    pub modes: HashMap<u8, PinMode>,
    pub latches: HashMap<u8, PinValue>,
    pub writes: usize,
    pub reads: usize,
}

impl LoopbackPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self, pin: u8) -> PinMode {
        self.modes.get(&pin).copied().unwrap_or(PinMode::Input)
    }
}

impl GpioPort for LoopbackPort {
    fn set_mode(&mut self, pin: u8, mode: PinMode) {
        self.modes.insert(pin, mode);
        match mode {
            PinMode::InputPullUp => {
                self.latches.insert(pin, PinValue::High);
            }
            PinMode::Input => {
                self.latches.insert(pin, PinValue::Low);
            }
            PinMode::Output => {}
        }
    }

    fn write(&mut self, pin: u8, level: PinValue) {
        self.writes += 1;
        self.latches.insert(pin, level);
    }

    fn read(&mut self, pin: u8) -> PinValue {
        self.reads += 1;
        match self.mode(pin) {
            PinMode::Input => PinValue::Low,
            _ => self.latches.get(&pin).copied().unwrap_or(PinValue::Low),
        }
    }
}
