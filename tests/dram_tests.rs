//! DRAM runs against the simulated bench: verdicts, refresh and strobes.

mod mocks;

use mocks::{bench_tester, config, run_to_end};
use rusty_ict::{
    ChipType, Fault, IcRecord, Identification, PinValue, TestPattern, TesterError, Verdict,
    ZifGeneration,
};

fn dram(code: &str) -> IcRecord {
    IcRecord::from_code(code)
}

#[cfg(test)]
mod verdicts {
    use super::*;

    #[test]
    fn test_good_4164_keeps_every_row_refreshed() {
        let (mut tester, _) = bench_tester("4164", config(ZifGeneration::Zif20), &[]);
        let mut handle = tester
            .start_test(&dram("TMS4164-15NL"), TestPattern::Alternating)
            .unwrap();
        let outcome = run_to_end(&mut tester, &mut handle);

        assert_eq!(outcome.family, "4164");
        assert_eq!(outcome.verdict, Verdict::Good);
        assert_eq!(outcome.cycles, 65536);
        assert_eq!(outcome.passes, 1);
        assert_eq!(outcome.percent_passed, 100.0);
        assert!(tester.socket().is_released());
        assert!(!tester.is_busy());

        let stats = tester
            .socket()
            .port()
            .device()
            .and_then(|device| device.refresh_stats())
            .unwrap();
        assert_eq!(stats.decayed_rows, 0);
        assert!(stats.max_gap_ns > 0);
        assert!(
            stats.max_gap_ns <= stats.budget_ns,
            "gap {} ns over budget {} ns",
            stats.max_gap_ns,
            stats.budget_ns
        );
    }

    #[test]
    fn test_dead_lane_on_a_single_bit_part_is_bad() {
        let (mut tester, _) = bench_tester(
            "4164",
            config(ZifGeneration::Zif20),
            &[Fault::DeadLane { lane: 0 }],
        );
        let mut handle = tester.start_test(&dram("4164"), TestPattern::Alternating).unwrap();
        let outcome = run_to_end(&mut tester, &mut handle);

        assert_eq!(outcome.verdict, Verdict::Bad);
        assert_eq!(outcome.passes, 2);
        assert_eq!(outcome.percent_passed, 50.0);
    }

    #[test]
    fn test_dead_lane_on_a_nibble_part_is_mixed() {
        let (mut tester, _) = bench_tester(
            "4416",
            config(ZifGeneration::Zif20),
            &[Fault::DeadLane { lane: 0 }],
        );
        let mut handle = tester.start_test(&dram("4416"), TestPattern::Alternating).unwrap();
        let outcome = run_to_end(&mut tester, &mut handle);

        assert_eq!(outcome.family, "4416");
        assert_eq!(outcome.verdict, Verdict::Mixed);
        assert_eq!(outcome.cycles, 16384);
        assert!(outcome.percent_passed > 0.0 && outcome.percent_passed < 100.0);
    }

    #[test]
    fn test_flaky_lane_is_unreliable() {
        let (mut tester, _) = bench_tester(
            "4164",
            config(ZifGeneration::Zif20),
            &[Fault::FlakyLane {
                lane: 0,
                period: 1000,
            }],
        );
        let mut handle = tester.start_test(&dram("4164"), TestPattern::Alternating).unwrap();
        let outcome = run_to_end(&mut tester, &mut handle);

        assert_eq!(outcome.verdict, Verdict::Unreliable);
        assert_eq!(outcome.passes, 2);
    }
}

#[cfg(test)]
mod refresh {
    use super::*;

    #[test]
    fn test_stalled_clock_misses_the_deadline() {
        let (mut tester, clock) = bench_tester("4164", config(ZifGeneration::Zif20), &[]);
        let mut handle = tester.start_test(&dram("4164"), TestPattern::AllOnes).unwrap();
        let progress = tester.poll_progress(&mut handle).unwrap();
        assert!(progress.outcome.is_none());
        assert_eq!(progress.cycles_done, 4096);

        clock.advance_ns(5_000_000);
        let result = tester.poll_progress(&mut handle);
        assert!(matches!(result, Err(TesterError::RefreshDeadline { .. })));
        assert!(result.unwrap_err().is_internal_fault());
        assert!(tester.socket().is_released());
        assert!(!tester.is_busy());
        assert!(!tester.socket().port().is_powered());
    }

    #[test]
    fn test_idle_between_polls_keeps_the_run_alive() {
        let (mut tester, clock) = bench_tester("4164", config(ZifGeneration::Zif20), &[]);
        let mut handle = tester.start_test(&dram("4164"), TestPattern::AllZeros).unwrap();
        tester.poll_progress(&mut handle).unwrap();

        // Host busy elsewhere, but calling idle well inside the budget.
        for _ in 0..50 {
            clock.advance_ns(100_000);
            tester.idle().unwrap();
        }
        let outcome = run_to_end(&mut tester, &mut handle);
        assert_eq!(outcome.verdict, Verdict::Good);
    }
}

#[cfg(test)]
mod identification {
    use super::*;

    #[test]
    fn test_smaller_part_answers_as_itself() {
        let (mut tester, _) = bench_tester("4164", config(ZifGeneration::Zif20), &[]);
        let found = tester
            .identify(&IcRecord::unknown(Some(ChipType::Dram), 16))
            .unwrap();
        let id = tester.database().by_name("4164").unwrap();
        assert_eq!(found, Identification::Unique(id));
        assert!(tester.socket().is_released());
    }

    #[test]
    fn test_larger_part_answering_both_probes_is_ambiguous() {
        let (mut tester, _) = bench_tester("41256", config(ZifGeneration::Zif20), &[]);
        let found = tester
            .identify(&IcRecord::unknown(Some(ChipType::Dram), 16))
            .unwrap();
        let db = tester.database();
        let expected = vec![db.by_name("4164").unwrap(), db.by_name("41256").unwrap()];
        assert_eq!(found, Identification::Ambiguous(expected));
        assert!(tester.socket().is_released());
    }

    #[test]
    fn test_stuck_strobe_matches_nothing() {
        let (mut tester, _) = bench_tester(
            "4164",
            config(ZifGeneration::Zif20),
            &[Fault::StuckPin {
                pin: 4,
                level: PinValue::High,
            }],
        );
        let found = tester
            .identify(&IcRecord::unknown(Some(ChipType::Dram), 16))
            .unwrap();
        assert_eq!(found, Identification::NoMatch);

        let mut record = IcRecord::unknown(Some(ChipType::Dram), 16);
        record.code = "unlabelled".to_string();
        assert!(matches!(
            tester.start_test(&record, TestPattern::Identify),
            Err(TesterError::NoMatch(_))
        ));
    }

    #[test]
    fn test_identify_pattern_reports_the_family() {
        let (mut tester, _) = bench_tester("4416", config(ZifGeneration::Zif20), &[]);
        let mut handle = tester
            .start_test(&IcRecord::unknown(None, 18), TestPattern::Identify)
            .unwrap();
        assert!(handle.is_finished());
        let progress = tester.poll_progress(&mut handle).unwrap();
        let outcome = progress.outcome.unwrap();
        assert_eq!(outcome.family, "4416");
        assert_eq!(outcome.verdict, Verdict::Good);
    }
}

#[cfg(test)]
mod strobes {
    use super::*;
    use rusty_ict::components::Edge;

    const RAS: u8 = 4;
    const CAS: u8 = 15;
    const WE: u8 = 3;

    fn edge(trace: &[Edge], pin: u8, level: PinValue) -> u64 {
        trace
            .iter()
            .find(|e| e.chip_pin == pin && e.level == level)
            .map(|e| e.at_ns)
            .unwrap_or_else(|| panic!("no {} edge on pin {}", level, pin))
    }

    #[test]
    fn test_write_cycle_is_a_late_write() {
        let config = rusty_ict::TesterConfig {
            cycles_per_poll: 1,
            ..config(ZifGeneration::Zif20)
        };
        let (mut tester, _) = bench_tester("4164", config, &[]);
        let mut handle = tester.start_test(&dram("4164"), TestPattern::AllOnes).unwrap();
        tester.socket_mut().port_mut().enable_trace();
        tester.poll_progress(&mut handle).unwrap();
        let trace = tester.socket_mut().port_mut().take_trace();

        let ras_fall = edge(&trace, RAS, PinValue::Low);
        let cas_fall = edge(&trace, CAS, PinValue::Low);
        let we_fall = edge(&trace, WE, PinValue::Low);
        let we_rise = edge(&trace, WE, PinValue::High);
        let cas_rise = edge(&trace, CAS, PinValue::High);
        let ras_rise = edge(&trace, RAS, PinValue::High);
        assert!(ras_fall < cas_fall);
        assert!(cas_fall < we_fall);
        assert!(we_fall < we_rise);
        assert!(we_rise < cas_rise);
        assert!(cas_rise < ras_rise);
        assert_eq!(tester.socket().port().contention(), 0);

        tester.cancel(&handle);
        let outcome = run_to_end(&mut tester, &mut handle);
        assert_eq!(outcome.verdict, Verdict::Skipped);
    }
}
