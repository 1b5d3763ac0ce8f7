//! Time keeping for the sequencer.
//!
//! The hot path never sleeps or yields: hold and settle times are met with
//! busy-waits, and refresh bookkeeping reads a free-running microsecond
//! counter.

use std::cell::Cell;
use std::rc::Rc;
use std::time::{Duration, Instant};

pub trait Timebase {
    /// Microseconds since an arbitrary origin; monotonic.
    fn now_us(&self) -> u64;

    /// Busy-waits at least `ns` nanoseconds.
    fn delay_ns(&mut self, ns: u32);
}

impl<T: Timebase + ?Sized> Timebase for &mut T {
    fn now_us(&self) -> u64 {
        (**self).now_us()
    }

    fn delay_ns(&mut self, ns: u32) {
        (**self).delay_ns(ns)
    }
}

/// Wall-clock timebase that spins on `Instant`.
pub struct SpinTimebase {
    origin: Instant,
}

impl SpinTimebase {
    pub fn new() -> Self {
        SpinTimebase {
            origin: Instant::now(),
        }
    }
}

impl Default for SpinTimebase {
    fn default() -> Self {
        Self::new()
    }
}

impl Timebase for SpinTimebase {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }

    fn delay_ns(&mut self, ns: u32) {
        let start = Instant::now();
        let wait = Duration::from_nanos(ns as u64);
        while start.elapsed() < wait {
            std::hint::spin_loop();
        }
    }
}

/// Simulated time in nanoseconds, shared between the bench and the sequencer.
///
/// Cloning yields another handle on the same counter.
#[derive(Debug, Clone, Default)]
pub struct VirtualClock {
    ns: Rc<Cell<u64>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ns(&self) -> u64 {
        self.ns.get()
    }

    pub fn advance_ns(&self, ns: u64) {
        self.ns.set(self.ns.get() + ns);
    }

    pub fn advance(&self, duration: Duration) {
        self.advance_ns(duration.as_nanos() as u64);
    }
}

impl Timebase for VirtualClock {
    fn now_us(&self) -> u64 {
        self.ns.get() / 1_000
    }

    fn delay_ns(&mut self, ns: u32) {
        self.advance_ns(ns as u64);
    }
}
