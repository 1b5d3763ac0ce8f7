//! Run lifecycle: progress, cancellation, handles and lookup errors.

mod mocks;

use mocks::{bench_tester, config, run_to_end, LoopbackPort};
use rusty_ict::sequencer::AddressOrder;
use rusty_ict::{
    ChipDatabase, Fault, IcRecord, MemoryStream, TestPattern, Tester, TesterConfig, TesterError,
    Verdict, VirtualClock, ZifGeneration,
};

fn small_polls(socket: ZifGeneration) -> TesterConfig {
    TesterConfig {
        cycles_per_poll: 256,
        ..config(socket)
    }
}

#[test]
fn test_progress_counts_up_to_the_outcome() {
    let (mut tester, _) = bench_tester("2114", small_polls(ZifGeneration::Zif20), &[]);
    let mut handle = tester
        .start_test(&IcRecord::from_code("2114"), TestPattern::March)
        .unwrap();
    assert!(tester.is_busy());

    let first = tester.poll_progress(&mut handle).unwrap();
    assert_eq!(first.cycles_done, 256);
    assert_eq!(first.cycles_total, 4 * 2 * 1024);
    assert_eq!(first.verdict_so_far, Verdict::Good);
    assert!(first.outcome.is_none());

    let mut last = first.cycles_done;
    let outcome = loop {
        let progress = tester.poll_progress(&mut handle).unwrap();
        assert!(progress.cycles_done >= last);
        last = progress.cycles_done;
        if let Some(outcome) = progress.outcome {
            break outcome;
        }
    };
    assert_eq!(outcome.verdict, Verdict::Good);
    assert_eq!(outcome.cycles, 4 * 1024);
    assert_eq!(last, 4 * 2 * 1024);
    assert!(!tester.is_busy());

    // A finished handle keeps answering with its outcome.
    let again = tester.poll_progress(&mut handle).unwrap();
    assert_eq!(again.outcome, Some(outcome));
    assert_eq!(again.cycles_done, last);
}

#[test]
fn test_pseudo_random_order_finds_the_same_verdict() {
    let config = TesterConfig {
        address_order: AddressOrder::PseudoRandom(0x5EED),
        ..config(ZifGeneration::Zif20)
    };
    let (mut tester, _) = bench_tester("2114", config, &[]);
    let mut handle = tester
        .start_test(&IcRecord::from_code("2114"), TestPattern::Alternating)
        .unwrap();
    assert_eq!(run_to_end(&mut tester, &mut handle).verdict, Verdict::Good);
}

#[test]
fn test_cancel_before_first_poll() {
    let (mut tester, _) = bench_tester("2114", small_polls(ZifGeneration::Zif20), &[]);
    let mut handle = tester
        .start_test(&IcRecord::from_code("2114"), TestPattern::March)
        .unwrap();
    tester.cancel(&handle);

    let progress = tester.poll_progress(&mut handle).unwrap();
    let outcome = progress.outcome.unwrap();
    assert_eq!(outcome.verdict, Verdict::Skipped);
    assert_eq!(outcome.family, "2114");
    assert_eq!(progress.cycles_done, 0);
    assert_eq!(outcome.cycles, 0);
    assert!(tester.socket().is_released());
    assert!(!tester.is_busy());
}

#[test]
fn test_cancel_from_a_cloned_handle() {
    let (mut tester, _) = bench_tester("2114", small_polls(ZifGeneration::Zif20), &[]);
    let mut handle = tester
        .start_test(&IcRecord::from_code("2114"), TestPattern::March)
        .unwrap();
    tester.poll_progress(&mut handle).unwrap();

    let remote = handle.clone();
    std::thread::spawn(move || remote.cancel()).join().unwrap();
    let outcome = run_to_end(&mut tester, &mut handle);
    assert_eq!(outcome.verdict, Verdict::Skipped);
    assert_eq!(outcome.cycles, 256);
}

#[test]
fn test_one_run_at_a_time() {
    let (mut tester, _) = bench_tester("2114", small_polls(ZifGeneration::Zif20), &[]);
    let ic = IcRecord::from_code("2114");
    let mut handle = tester.start_test(&ic, TestPattern::AllOnes).unwrap();

    assert!(matches!(
        tester.start_test(&ic, TestPattern::AllZeros),
        Err(TesterError::SocketBusy)
    ));
    assert!(matches!(tester.identify(&ic), Err(TesterError::SocketBusy)));
    assert!(matches!(
        tester.dump(&ic, &mut MemoryStream::new()),
        Err(TesterError::SocketBusy)
    ));

    run_to_end(&mut tester, &mut handle);
    assert!(tester.start_test(&ic, TestPattern::AllZeros).is_ok());
}

#[test]
fn test_handle_of_an_older_run_is_stale() {
    let (mut tester, _) = bench_tester("2114", small_polls(ZifGeneration::Zif20), &[]);
    let ic = IcRecord::from_code("2114");
    let mut first = tester.start_test(&ic, TestPattern::AllOnes).unwrap();
    let mut old = first.clone();
    tester.cancel(&first);
    run_to_end(&mut tester, &mut first);

    let mut second = tester.start_test(&ic, TestPattern::AllOnes).unwrap();
    assert_ne!(first.id(), second.id());
    assert!(matches!(
        tester.poll_progress(&mut old),
        Err(TesterError::StaleHandle)
    ));
    assert!(tester.is_busy());
    assert_eq!(run_to_end(&mut tester, &mut second).verdict, Verdict::Good);
}

#[test]
fn test_single_pass_failure_is_final() {
    let config = TesterConfig {
        second_pass: false,
        ..config(ZifGeneration::Zif20)
    };
    let (mut tester, _) = bench_tester("2114", config, &[Fault::DeadLane { lane: 2 }]);
    let mut handle = tester
        .start_test(&IcRecord::from_code("2114"), TestPattern::AllOnes)
        .unwrap();
    let outcome = run_to_end(&mut tester, &mut handle);
    assert_eq!(outcome.passes, 1);
    assert_eq!(outcome.verdict, Verdict::Mixed);
}

#[test]
fn test_unknown_part_is_no_match() {
    let (mut tester, _) = bench_tester("2114", config(ZifGeneration::Zif20), &[]);
    assert!(matches!(
        tester.start_test(&IcRecord::from_code("MYSTERY"), TestPattern::March),
        Err(TesterError::NoMatch(_))
    ));
    assert!(!tester.is_busy());
}

#[test]
fn test_shared_code_is_reported_as_ambiguous() {
    let db = ChipDatabase::builtin();
    let mut clone = db[db.by_name("4164").unwrap()].clone();
    clone.name = "4164-ALT".into();
    let config = TesterConfig {
        families: vec![clone],
        ..config(ZifGeneration::Zif20)
    };
    let mut tester = Tester::new(LoopbackPort::new(), VirtualClock::new(), config).unwrap();

    match tester.start_test(&IcRecord::from_code("TMS4164-15"), TestPattern::March) {
        Err(TesterError::Ambiguous { families, .. }) => {
            assert_eq!(families, vec!["4164".to_string(), "4164-ALT".to_string()]);
        }
        other => panic!("expected ambiguity, got {:?}", other.map(|h| h.id())),
    }
}

#[test]
fn test_package_larger_than_the_socket() {
    let mut tester =
        Tester::new(LoopbackPort::new(), VirtualClock::new(), config(ZifGeneration::Zif20))
            .unwrap();
    assert!(matches!(
        tester.start_test(&IcRecord::from_code("6116"), TestPattern::March),
        Err(TesterError::PackageTooLarge { pins: 24, socket: 20 })
    ));
    assert!(matches!(
        tester.identify(&IcRecord::unknown(None, 28)),
        Err(TesterError::PackageTooLarge { pins: 28, socket: 20 })
    ));
    assert!(tester.socket().is_released());
}

#[test]
fn test_stuck_chip_select_matches_nothing() {
    let (mut tester, _) = bench_tester(
        "2114",
        config(ZifGeneration::Zif20),
        &[Fault::StuckPin {
            pin: 8,
            level: rusty_ict::PinValue::High,
        }],
    );
    let found = tester.identify(&IcRecord::unknown(None, 18)).unwrap();
    assert_eq!(found, rusty_ict::Identification::NoMatch);
    assert!(tester.socket().is_released());
}
