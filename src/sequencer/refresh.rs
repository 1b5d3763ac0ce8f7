//! Refresh bookkeeping for multiplexed DRAM.
//!
//! Refresh is done in bursts: a RAS-only sweep over every refresh row. A sweep
//! is due once the next data cycle could push the oldest row past the budget,
//! less a safety margin. Missing the budget is a fault of the tester, never of
//! the chip.

use crate::error::{Result, TesterError};
use crate::profile::{ChipKind, ChipProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshScheduler {
    budget_us: u64,
    margin_percent: u8,
    rows: u32,
    last_sweep_us: Option<u64>,
    longest_cycle_us: u64,
    sweeps: u64,
}

impl RefreshScheduler {
    /// For families that keep their contents without help.
    pub fn disabled() -> Self {
        RefreshScheduler {
            budget_us: 0,
            margin_percent: 0,
            rows: 0,
            last_sweep_us: None,
            longest_cycle_us: 0,
            sweeps: 0,
        }
    }

    pub fn for_profile(profile: &ChipProfile, margin_percent: u8) -> Self {
        match &profile.layout {
            ChipKind::Dram(d) => RefreshScheduler {
                budget_us: d.timing.refresh_budget_us(),
                margin_percent: margin_percent.min(90),
                rows: d.timing.refresh_rows,
                ..Self::disabled()
            },
            _ => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.budget_us > 0
    }

    pub fn rows(&self) -> u32 {
        self.rows
    }

    pub fn budget_us(&self) -> u64 {
        self.budget_us
    }

    pub fn sweeps(&self) -> u64 {
        self.sweeps
    }

    pub fn last_sweep_us(&self) -> Option<u64> {
        self.last_sweep_us
    }

    /// Sweep start times must stay this far apart at most.
    fn threshold_us(&self) -> u64 {
        self.budget_us * (100 - self.margin_percent as u64) / 100
    }

    /// True when a sweep has to run before the next data cycle.
    pub fn due(&self, now_us: u64) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match self.last_sweep_us {
            None => true,
            Some(last) => (now_us + self.longest_cycle_us).saturating_sub(last) > self.threshold_us(),
        }
    }

    /// Fails once the budget has already been exceeded.
    pub fn check_deadline(&self, now_us: u64) -> Result<()> {
        match self.last_sweep_us {
            Some(last) if self.is_enabled() && now_us.saturating_sub(last) > self.budget_us => {
                Err(TesterError::RefreshDeadline {
                    elapsed_us: now_us - last,
                    budget_us: self.budget_us,
                })
            }
            _ => Ok(()),
        }
    }

    pub fn record_sweep(&mut self, started_us: u64) {
        self.last_sweep_us = Some(started_us);
        self.sweeps += 1;
    }

    pub fn record_cycle(&mut self, duration_us: u64) {
        self.longest_cycle_us = self.longest_cycle_us.max(duration_us);
    }

    /// Forgets the last sweep; the next cycle starts with a fresh one.
    pub fn reset(&mut self) {
        self.last_sweep_us = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ChipDatabase;

    fn scheduler() -> RefreshScheduler {
        let db = ChipDatabase::builtin();
        RefreshScheduler::for_profile(&db[db.by_name("4164").unwrap()], 10)
    }

    #[test]
    fn test_first_cycle_needs_a_sweep() {
        let s = scheduler();
        assert!(s.is_enabled());
        assert_eq!(s.rows(), 128);
        assert!(s.due(0));
    }

    #[test]
    fn test_sweep_due_before_margin_runs_out() {
        let mut s = scheduler();
        s.record_sweep(1_000);
        s.record_cycle(5);
        assert!(!s.due(2_700));
        // 2_796 + 5 - 1_000 > 1_800
        assert!(s.due(2_796));
        assert!(s.check_deadline(3_000).is_ok());
    }

    #[test]
    fn test_deadline_missed() {
        let mut s = scheduler();
        s.record_sweep(0);
        assert!(matches!(
            s.check_deadline(2_001),
            Err(TesterError::RefreshDeadline {
                elapsed_us: 2_001,
                budget_us: 2_000
            })
        ));
    }

    #[test]
    fn test_static_parts_never_refresh() {
        let db = ChipDatabase::builtin();
        let s = RefreshScheduler::for_profile(&db[db.by_name("6116").unwrap()], 10);
        assert!(!s.due(1_000_000));
        assert!(s.check_deadline(1_000_000).is_ok());
    }
}
