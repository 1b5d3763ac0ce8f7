//! Turns per-cycle comparison results into a verdict.
//!
//! Everything here is pure: the sequencer feeds mismatch masks into
//! [`PassStats`] and asks the [`ResultClassifier`] what they mean.

use serde::{Deserialize, Serialize};

use crate::pin::PinValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    Good,
    Bad,
    Unreliable,
    /// Bad, but only on some of the data lanes.
    Mixed,
    Skipped,
}

impl Verdict {
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Good => "Good",
            Verdict::Bad => "Bad",
            Verdict::Unreliable => "Unreliable",
            Verdict::Mixed => "Mixed",
            Verdict::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Tallies of one full pass over a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassStats {
    pub cycles: u64,
    pub failed_cycles: u64,
    /// Failure count per data lane: data bus bit, or gate output.
    pub lane_failures: Vec<u64>,
    /// Order-independent fingerprint of which cycles failed on which lanes.
    pub signature: u64,
}

impl PassStats {
    pub fn new(lanes: usize) -> Self {
        PassStats {
            lane_failures: vec![0; lanes],
            ..Default::default()
        }
    }

    /// Records one compare cycle. `key` identifies the cycle within the plan,
    /// `mismatch` has a bit set for every failing lane.
    pub fn record(&mut self, key: u64, mismatch: u32) {
        self.cycles += 1;
        if mismatch == 0 {
            return;
        }
        self.failed_cycles += 1;
        for (lane, count) in self.lane_failures.iter_mut().enumerate() {
            if mismatch >> lane & 1 == 1 {
                *count += 1;
            }
        }
        self.signature = self
            .signature
            .wrapping_add(mix(key ^ (mismatch as u64) << 40));
    }

    pub fn percent_passed(&self) -> f64 {
        percent(self.cycles, self.failed_cycles)
    }

    pub fn is_clean(&self) -> bool {
        self.failed_cycles == 0
    }
}

fn percent(cycles: u64, failed: u64) -> f64 {
    if cycles == 0 {
        return 100.0;
    }
    (cycles - failed) as f64 * 100.0 / cycles as f64
}

fn mix(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// What to do after the first pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstPass {
    Final(Verdict),
    NeedsSecondPass,
}

/// One failing logic output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorMismatch {
    pub vector: usize,
    /// Chip pin, 1-based.
    pub pin: u8,
    pub expected: PinValue,
    pub observed: PinValue,
}

/// Final report of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub family: String,
    pub verdict: Verdict,
    pub percent_passed: f64,
    /// Compare cycles of one pass; bus cycles done so far when Skipped.
    pub cycles: u64,
    pub passes: u8,
    pub mismatches: Vec<VectorMismatch>,
}

impl TestOutcome {
    /// Outcome of a run cancelled after `cycles_done` bus cycles.
    pub fn skipped(family: &str, cycles_done: u64) -> Self {
        TestOutcome {
            family: family.to_string(),
            verdict: Verdict::Skipped,
            percent_passed: 0.0,
            cycles: cycles_done,
            passes: 0,
            mismatches: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultClassifier {
    /// A pass failing on at least this share of cycles is Bad outright.
    pub bad_threshold_percent: u8,
    pub second_pass: bool,
}

impl Default for ResultClassifier {
    fn default() -> Self {
        ResultClassifier {
            bad_threshold_percent: 90,
            second_pass: true,
        }
    }
}

impl ResultClassifier {
    pub fn new(bad_threshold_percent: u8, second_pass: bool) -> Self {
        ResultClassifier {
            bad_threshold_percent: bad_threshold_percent.min(100),
            second_pass,
        }
    }

    pub fn first_pass(&self, first: &PassStats) -> FirstPass {
        if first.is_clean() {
            return FirstPass::Final(Verdict::Good);
        }
        if self.nearly_all_failed(first) || !self.second_pass {
            return FirstPass::Final(lane_split(Verdict::Bad, &[first]));
        }
        FirstPass::NeedsSecondPass
    }

    /// Consistent failures are Bad, anything else Unreliable.
    pub fn combine(&self, first: &PassStats, second: &PassStats) -> Verdict {
        if first.failed_cycles == second.failed_cycles && first.signature == second.signature {
            lane_split(Verdict::Bad, &[first, second])
        } else {
            Verdict::Unreliable
        }
    }

    /// Verdict for the passes run so far.
    pub fn classify(&self, passes: &[PassStats]) -> Verdict {
        match passes {
            [] => Verdict::Skipped,
            [first] => match self.first_pass(first) {
                FirstPass::Final(verdict) => verdict,
                FirstPass::NeedsSecondPass => Verdict::Bad,
            },
            [first, second, ..] => match (first.is_clean(), second.is_clean()) {
                (true, true) => Verdict::Good,
                (true, false) | (false, true) => Verdict::Unreliable,
                (false, false) => self.combine(first, second),
            },
        }
    }

    /// Pass rate across every pass.
    pub fn percent_passed(passes: &[PassStats]) -> f64 {
        let cycles = passes.iter().map(|p| p.cycles).sum();
        let failed = passes.iter().map(|p| p.failed_cycles).sum();
        percent(cycles, failed)
    }

    fn nearly_all_failed(&self, stats: &PassStats) -> bool {
        stats.failed_cycles * 100 >= stats.cycles * self.bad_threshold_percent as u64
    }
}

/// Bad becomes Mixed when some lanes never failed.
fn lane_split(verdict: Verdict, passes: &[&PassStats]) -> Verdict {
    let lanes = passes.iter().map(|p| p.lane_failures.len()).max().unwrap_or(0);
    if lanes < 2 {
        return verdict;
    }
    let clean = (0..lanes)
        .filter(|&lane| {
            passes
                .iter()
                .all(|p| p.lane_failures.get(lane).copied().unwrap_or(0) == 0)
        })
        .count();
    if clean > 0 {
        Verdict::Mixed
    } else {
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(lanes: usize, cycles: u64, failures: &[(u64, u32)]) -> PassStats {
        let mut stats = PassStats::new(lanes);
        for key in 0..cycles {
            let mismatch = failures
                .iter()
                .find(|(k, _)| *k == key)
                .map(|(_, m)| *m)
                .unwrap_or(0);
            stats.record(key, mismatch);
        }
        stats
    }

    #[test]
    fn test_clean_pass_is_good() {
        let classifier = ResultClassifier::default();
        assert_eq!(
            classifier.first_pass(&stats(1, 100, &[])),
            FirstPass::Final(Verdict::Good)
        );
    }

    #[test]
    fn test_everything_failing_is_bad_without_second_pass() {
        let classifier = ResultClassifier::default();
        let all: Vec<(u64, u32)> = (0..10).map(|k| (k, 1)).collect();
        assert_eq!(
            classifier.first_pass(&stats(1, 10, &all)),
            FirstPass::Final(Verdict::Bad)
        );
    }

    #[test]
    fn test_repeatable_failures_are_bad() {
        let classifier = ResultClassifier::default();
        let first = stats(1, 100, &[(3, 1), (40, 1)]);
        let second = stats(1, 100, &[(3, 1), (40, 1)]);
        assert_eq!(classifier.first_pass(&first), FirstPass::NeedsSecondPass);
        assert_eq!(classifier.combine(&first, &second), Verdict::Bad);
    }

    #[test]
    fn test_wandering_failures_are_unreliable() {
        let classifier = ResultClassifier::default();
        let first = stats(1, 100, &[(3, 1)]);
        let second = stats(1, 100, &[(4, 1)]);
        assert_eq!(classifier.combine(&first, &second), Verdict::Unreliable);
        let clean = stats(1, 100, &[]);
        assert_eq!(classifier.classify(&[first, clean]), Verdict::Unreliable);
    }

    #[test]
    fn test_one_dead_lane_is_mixed() {
        let classifier = ResultClassifier::default();
        let all: Vec<(u64, u32)> = (0..10).map(|k| (k, 0b0100)).collect();
        assert_eq!(classifier.classify(&[stats(4, 10, &all)]), Verdict::Mixed);
    }

    #[test]
    fn test_percent_passed() {
        let first = stats(1, 200, &[(0, 1)]);
        let second = stats(1, 200, &[(0, 1)]);
        assert_eq!(first.percent_passed(), 99.5);
        assert_eq!(ResultClassifier::percent_passed(&[first, second]), 99.5);
        assert_eq!(ResultClassifier::percent_passed(&[]), 100.0);
    }
}
