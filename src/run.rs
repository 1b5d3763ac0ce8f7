//! # Runs
//!
//! [`Tester`] owns the socket for the life of the process and lends it to at
//! most one run at a time. A run is started with [`Tester::start_test`] and
//! advanced cooperatively: every [`Tester::poll_progress`] call executes a
//! bounded slice of bus cycles and returns, so the caller keeps its UI alive.
//! Cancellation is checked between whole cycles.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::{
    FirstPass, PassStats, ResultClassifier, TestOutcome, Verdict, VectorMismatch,
};
use crate::config::TesterConfig;
use crate::database::{ChipDatabase, FamilyId, Identification};
use crate::error::{Result, TesterError};
use crate::media::ByteStream;
use crate::pin::GpioPort;
use crate::profile::ChipType;
use crate::sequencer::identify::identify_by_elimination;
use crate::sequencer::program::MediaReport;
use crate::sequencer::{PlanCursor, RefreshScheduler, TestPattern, TestSequencer};
use crate::socket::{SocketMap, ZifGeneration};
use crate::timing::Timebase;

/// What the operator says is in the socket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IcRecord {
    pub chip_type: Option<ChipType>,
    /// 0 when unknown.
    pub pin_count: u8,
    /// Part marking or family name, free text.
    pub code: String,
    #[serde(default)]
    pub description: String,
}

impl IcRecord {
    pub fn from_code(code: &str) -> Self {
        IcRecord {
            code: code.to_string(),
            ..Self::default()
        }
    }

    pub fn unknown(chip_type: Option<ChipType>, pin_count: u8) -> Self {
        IcRecord {
            chip_type,
            pin_count,
            ..Self::default()
        }
    }
}

/// Caller's token for an active or finished run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    id: u64,
    cancel: Arc<AtomicBool>,
    finished: Option<TestOutcome>,
    cycles_done: u64,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests cancellation; takes effect at the next poll.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    pub fn outcome(&self) -> Option<&TestOutcome> {
        self.finished.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    /// Bus cycles executed so far, writes included.
    pub cycles_done: u64,
    /// Bus cycles of the passes planned so far.
    pub cycles_total: u64,
    pub verdict_so_far: Verdict,
    /// Set once the run is over.
    pub outcome: Option<TestOutcome>,
}

impl Progress {
    fn finished(outcome: &TestOutcome, cycles_done: u64) -> Self {
        Progress {
            cycles_done,
            cycles_total: cycles_done,
            verdict_so_far: outcome.verdict,
            outcome: Some(outcome.clone()),
        }
    }
}

struct ActiveRun {
    id: u64,
    family: FamilyId,
    cursor: PlanCursor,
    refresh: RefreshScheduler,
    passes: Vec<PassStats>,
    current: PassStats,
    cycles_done: u64,
    mismatches: Vec<VectorMismatch>,
    cancel: Arc<AtomicBool>,
}

impl ActiveRun {
    fn planned_passes(&self) -> u64 {
        self.passes.len() as u64 + 1
    }

    fn verdict_so_far(&self, classifier: &ResultClassifier) -> Verdict {
        if self.passes.is_empty() {
            classifier.classify(std::slice::from_ref(&self.current))
        } else {
            classifier.classify(&self.passes)
        }
    }
}

/// The tester: socket, timebase, catalogue and the one active run.
pub struct Tester<P: GpioPort, T: Timebase> {
    socket: SocketMap<P>,
    timebase: T,
    database: ChipDatabase,
    config: TesterConfig,
    classifier: ResultClassifier,
    active: Option<ActiveRun>,
    next_run: u64,
}

impl<P: GpioPort, T: Timebase> Tester<P, T> {
    /// Wires the socket and loads the catalogue, configured families included.
    pub fn new(port: P, timebase: T, config: TesterConfig) -> Result<Self> {
        let socket = SocketMap::new(port, config.socket);
        // The catalogue is shared by both board generations; families too
        // large for this socket are refused when a run resolves them.
        let largest = ZifGeneration::Zif40.pin_count();
        let mut database = ChipDatabase::builtin();
        for profile in &config.families {
            let id = database.add(profile.clone(), largest)?;
            debug!("Added family {} as {:?}", profile.name, id);
        }
        database.validate(largest)?;
        info!(
            "Tester ready: {}-pin socket, {} families",
            socket.pin_count(),
            database.len()
        );
        Ok(Tester {
            socket,
            timebase,
            database,
            classifier: config.classifier(),
            config,
            active: None,
            next_run: 1,
        })
    }

    pub fn socket(&self) -> &SocketMap<P> {
        &self.socket
    }

    pub fn socket_mut(&mut self) -> &mut SocketMap<P> {
        &mut self.socket
    }

    pub fn timebase(&self) -> &T {
        &self.timebase
    }

    pub fn database(&self) -> &ChipDatabase {
        &self.database
    }

    pub fn config(&self) -> &TesterConfig {
        &self.config
    }

    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    /// Resolves the chip and powers it up for a test pattern.
    ///
    /// `TestPattern::Identify` runs identification by elimination and hands
    /// back an already finished run naming the family found.
    pub fn start_test(&mut self, ic: &IcRecord, pattern: TestPattern) -> Result<RunHandle> {
        if self.active.is_some() {
            return Err(TesterError::SocketBusy);
        }
        let id = self.next_run;
        self.next_run += 1;
        let cancel = Arc::new(AtomicBool::new(false));

        if pattern == TestPattern::Identify {
            let family = self.identify_unique(ic)?;
            let outcome = TestOutcome {
                family: self.database[family].name.to_string(),
                verdict: Verdict::Good,
                percent_passed: 100.0,
                cycles: 0,
                passes: 1,
                mismatches: Vec::new(),
            };
            info!("Run {}: identified {}", id, outcome.family);
            return Ok(RunHandle {
                id,
                cancel,
                finished: Some(outcome),
                cycles_done: 0,
            });
        }

        let family = self.select_family(ic)?;
        let profile = &self.database[family];
        let cursor = PlanCursor::new(profile, pattern, self.config.address_order)?;
        let mut refresh = RefreshScheduler::for_profile(profile, self.config.refresh_margin_percent);

        let mut sequencer =
            TestSequencer::new(&mut self.socket, &mut self.timebase, profile, &mut refresh)?;
        if let Err(e) = sequencer.power_up() {
            sequencer.safe_state();
            return Err(e);
        }
        let lanes = sequencer.lanes();

        info!(
            "Run {}: {} {} test, {} cycles per pass",
            id,
            profile.name,
            pattern,
            cursor.cycles_per_pass()
        );
        self.active = Some(ActiveRun {
            id,
            family,
            cursor,
            refresh,
            passes: Vec::new(),
            current: PassStats::new(lanes),
            cycles_done: 0,
            mismatches: Vec::new(),
            cancel: Arc::clone(&cancel),
        });
        Ok(RunHandle {
            id,
            cancel,
            finished: None,
            cycles_done: 0,
        })
    }

    /// Runs the next slice of cycles.
    ///
    /// A missed refresh deadline ends the run with an error after the current
    /// cycle; the socket is released either way.
    pub fn poll_progress(&mut self, handle: &mut RunHandle) -> Result<Progress> {
        if let Some(outcome) = &handle.finished {
            return Ok(Progress::finished(outcome, handle.cycles_done));
        }
        let mut run = match self.active.take() {
            Some(run) if run.id == handle.id => run,
            other => {
                self.active = other;
                return Err(TesterError::StaleHandle);
            }
        };

        match self.advance(&mut run) {
            Ok(Some(outcome)) => {
                self.socket.release_all();
                info!(
                    "Run {}: {} {} ({:.2}% passed)",
                    run.id, outcome.family, outcome.verdict, outcome.percent_passed
                );
                let progress = Progress::finished(&outcome, run.cycles_done);
                handle.finished = Some(outcome);
                handle.cycles_done = run.cycles_done;
                Ok(progress)
            }
            Ok(None) => {
                let progress = Progress {
                    cycles_done: run.cycles_done,
                    cycles_total: run.cursor.cycles_per_pass() * run.planned_passes(),
                    verdict_so_far: run.verdict_so_far(&self.classifier),
                    outcome: None,
                };
                self.active = Some(run);
                Ok(progress)
            }
            Err(e) => {
                self.socket.release_all();
                warn!("Run {} aborted: {}", run.id, e);
                Err(e)
            }
        }
    }

    /// Cancels the run behind `handle`; the next poll reports Skipped.
    pub fn cancel(&mut self, handle: &RunHandle) {
        if self.active.as_ref().map_or(false, |run| run.id == handle.id) {
            debug!("Run {} cancel requested", handle.id);
            handle.cancel();
        }
    }

    /// Keeps a paused DRAM run refreshed between polls.
    pub fn idle(&mut self) -> Result<()> {
        let Some(mut run) = self.active.take() else {
            return Ok(());
        };
        let profile = &self.database[run.family];
        let result = TestSequencer::new(
            &mut self.socket,
            &mut self.timebase,
            profile,
            &mut run.refresh,
        )
        .and_then(|mut sequencer| sequencer.idle());
        match result {
            Ok(()) => {
                self.active = Some(run);
                Ok(())
            }
            Err(e) => {
                self.socket.release_all();
                warn!("Run {} aborted while idle: {}", run.id, e);
                Err(e)
            }
        }
    }

    /// Identification by elimination over every family of the record's pin
    /// count (and type, when given).
    pub fn identify(&mut self, ic: &IcRecord) -> Result<Identification> {
        if self.active.is_some() {
            return Err(TesterError::SocketBusy);
        }
        let (chip_type, pin_count) = match self.lookup(ic) {
            Identification::Unique(id) if ic.pin_count == 0 => {
                let profile = &self.database[id];
                (ic.chip_type, profile.pin_count)
            }
            _ => (ic.chip_type, ic.pin_count),
        };
        if pin_count > self.socket.pin_count() {
            return Err(TesterError::PackageTooLarge {
                pins: pin_count,
                socket: self.socket.pin_count(),
            });
        }
        let candidates = self.database.candidates(chip_type, pin_count);
        debug!(
            "Eliminating over {} candidates of {} pins",
            candidates.len(),
            pin_count
        );
        identify_by_elimination(
            &mut self.socket,
            &mut self.timebase,
            &self.database,
            &candidates,
            self.config.refresh_margin_percent,
        )
    }

    pub fn blank_check(&mut self, ic: &IcRecord) -> Result<MediaReport> {
        self.with_chip(ic, |s| s.blank_check())
    }

    pub fn dump(&mut self, ic: &IcRecord, out: &mut dyn ByteStream) -> Result<MediaReport> {
        self.with_chip(ic, |s| s.dump(out))
    }

    pub fn verify(&mut self, ic: &IcRecord, image: &mut dyn ByteStream) -> Result<MediaReport> {
        self.with_chip(ic, |s| s.verify(image))
    }

    pub fn erase(&mut self, ic: &IcRecord) -> Result<MediaReport> {
        self.with_chip(ic, |s| s.erase())
    }

    pub fn program(&mut self, ic: &IcRecord, image: &mut dyn ByteStream) -> Result<MediaReport> {
        self.with_chip(ic, |s| s.program(image))
    }

    /// Manufacturer and device code of a flash part.
    pub fn flash_id(&mut self, ic: &IcRecord) -> Result<(u8, u8)> {
        self.with_chip(ic, |s| s.flash_id())
    }

    /// Powers the chip for one media operation and always releases it after.
    fn with_chip<R>(
        &mut self,
        ic: &IcRecord,
        operation: impl FnOnce(&mut TestSequencer<'_, P, T>) -> Result<R>,
    ) -> Result<R> {
        if self.active.is_some() {
            return Err(TesterError::SocketBusy);
        }
        let family = self.select_family(ic)?;
        let profile = &self.database[family];
        let mut refresh = RefreshScheduler::for_profile(profile, self.config.refresh_margin_percent);
        let mut sequencer =
            TestSequencer::new(&mut self.socket, &mut self.timebase, profile, &mut refresh)?;
        let result = sequencer.power_up().and_then(|_| operation(&mut sequencer));
        sequencer.safe_state();
        result
    }

    fn advance(&mut self, run: &mut ActiveRun) -> Result<Option<TestOutcome>> {
        let profile = &self.database[run.family];
        let classifier = self.classifier;
        let max_mismatches = self.config.max_reported_mismatches;
        let mut sequencer = TestSequencer::new(
            &mut self.socket,
            &mut self.timebase,
            profile,
            &mut run.refresh,
        )?;
        sequencer.idle()?;

        for _ in 0..self.config.cycles_per_poll.max(1) {
            if run.cancel.load(Ordering::Relaxed) {
                sequencer.safe_state();
                info!("Run {} cancelled after {} cycles", run.id, run.cycles_done);
                return Ok(Some(TestOutcome::skipped(&profile.name, run.cycles_done)));
            }

            match sequencer.step(&mut run.cursor, &mut run.current)? {
                Some(step) => {
                    run.cycles_done += 1;
                    let first_pass = run.passes.is_empty();
                    if step.compared
                        && step.result.mismatch != 0
                        && first_pass
                        && run.mismatches.len() < max_mismatches
                    {
                        let room = max_mismatches - run.mismatches.len();
                        run.mismatches
                            .extend(sequencer.vector_mismatches(&step).into_iter().take(room));
                    }
                }
                None => {
                    let lanes = sequencer.lanes();
                    let stats = mem::replace(&mut run.current, PassStats::new(lanes));
                    debug!(
                        "Run {}: pass {} done, {} of {} compares failed",
                        run.id,
                        run.passes.len() + 1,
                        stats.failed_cycles,
                        stats.cycles
                    );
                    run.passes.push(stats);
                    let verdict = match classifier.first_pass(&run.passes[0]) {
                        FirstPass::Final(verdict) => Some(verdict),
                        FirstPass::NeedsSecondPass if run.passes.len() < 2 => None,
                        FirstPass::NeedsSecondPass => Some(classifier.classify(&run.passes)),
                    };
                    match verdict {
                        Some(verdict) => {
                            sequencer.safe_state();
                            return Ok(Some(TestOutcome {
                                family: profile.name.to_string(),
                                verdict,
                                percent_passed: ResultClassifier::percent_passed(&run.passes),
                                cycles: run.cursor.compares_per_pass(),
                                passes: run.passes.len() as u8,
                                mismatches: mem::take(&mut run.mismatches),
                            }));
                        }
                        None => {
                            debug!("Run {}: inconclusive, starting second pass", run.id);
                            run.cursor.rewind();
                        }
                    }
                }
            }
        }
        Ok(None)
    }

    /// Catalogue lookup from the record's text, narrowed by type and pins.
    fn lookup(&self, ic: &IcRecord) -> Identification {
        match self.database.identify_part(&ic.code) {
            Identification::Ambiguous(ids) => Identification::from_candidates(
                ids.into_iter()
                    .filter(|&id| {
                        let profile = &self.database[id];
                        ic.chip_type.map_or(true, |t| profile.chip_type() == t)
                            && (ic.pin_count == 0 || profile.pin_count == ic.pin_count)
                    })
                    .collect(),
            ),
            other => other,
        }
    }

    /// The family to run: by catalogue lookup, falling back to elimination.
    fn select_family(&mut self, ic: &IcRecord) -> Result<FamilyId> {
        match self.lookup(ic) {
            Identification::Unique(id) => Ok(id),
            Identification::Ambiguous(ids) => Err(TesterError::Ambiguous {
                code: ic.code.clone(),
                families: self.database.names(&ids),
            }),
            Identification::NoMatch if ic.pin_count == 0 => {
                Err(TesterError::NoMatch(ic.code.clone()))
            }
            Identification::NoMatch => {
                debug!("No catalogue match for {:?}, eliminating", ic.code);
                self.eliminated(ic)
            }
        }
    }

    fn identify_unique(&mut self, ic: &IcRecord) -> Result<FamilyId> {
        if ic.pin_count == 0 && matches!(self.lookup(ic), Identification::NoMatch) {
            return Err(TesterError::NoMatch(ic.code.clone()));
        }
        self.eliminated(ic)
    }

    fn eliminated(&mut self, ic: &IcRecord) -> Result<FamilyId> {
        match self.identify(ic)? {
            Identification::Unique(id) => Ok(id),
            Identification::NoMatch => Err(TesterError::NoMatch(describe(ic))),
            Identification::Ambiguous(ids) => Err(TesterError::Ambiguous {
                code: describe(ic),
                families: self.database.names(&ids),
            }),
        }
    }
}

fn describe(ic: &IcRecord) -> String {
    if ic.code.is_empty() {
        format!("unmarked {}-pin chip", ic.pin_count)
    } else {
        ic.code.clone()
    }
}
