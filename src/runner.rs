//! Sequential test runner.
//!
//! A [`Suite`] moves through `Idle → Registering → Running(i) → Reporting →
//! Done`. Tests run strictly in registration order. Before each one the runner
//! zeroes mock/stub counts, allocation figures and the capture stack, so no
//! test can observe what an earlier one did.

use crate::capture::{Capture, Captured, Escape};
use crate::config::{Config, Verbosity};
use crate::error::{HarnessError, Table};
use crate::registry::Registry;
use crate::report::{Diagnostics, Kind, ReportLine, Reporter};
use log::{debug, info};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::rc::Rc;

#[cfg(feature = "alloc-tracking")]
use crate::alloc_track::{AllocStats, TrackingAllocator};
#[cfg(not(feature = "alloc-tracking"))]
use crate::capability::SystemAllocator;

/// Allocator handed to tests by [`TestCase::allocator`].
#[cfg(feature = "alloc-tracking")]
pub type HarnessAllocator = TrackingAllocator;
/// Allocator handed to tests by [`TestCase::allocator`].
#[cfg(not(feature = "alloc-tracking"))]
pub type HarnessAllocator = SystemAllocator;

/// A test procedure.
pub type TestFn = fn(&mut TestCase<'_>);

const RUNNER_ORIGIN: &str = "runner";

/// State shared by the runner and every test case.
#[derive(Debug)]
pub(crate) struct Harness {
    pub(crate) config: Config,
    pub(crate) registry: Registry,
    pub(crate) capture: Capture,
    #[cfg(feature = "alloc-tracking")]
    pub(crate) tracker: TrackingAllocator,
    pub(crate) reporter: Rc<RefCell<Reporter>>,
    /// Configuration misuse, process-wide and never reset.
    pub(crate) errors: Cell<u32>,
}

impl Harness {
    fn new(config: Config, reporter: Reporter) -> Self {
        let reporter = Rc::new(RefCell::new(reporter));
        let diagnostics = Diagnostics::new(reporter.clone(), config.suite_name.clone());
        Self {
            registry: Registry::new(config.max_mocks, config.max_stubs)
                .with_diagnostics(diagnostics.clone()),
            capture: Capture::new(),
            #[cfg(feature = "alloc-tracking")]
            tracker: TrackingAllocator::new().with_diagnostics(diagnostics),
            reporter,
            errors: Cell::new(0),
            config,
        }
    }

    fn reset_per_test(&self) {
        self.registry.reset_counts();
        #[cfg(feature = "alloc-tracking")]
        self.tracker.reset();
        self.capture.reset();
    }

    fn verbosity(&self) -> Verbosity {
        self.reporter.borrow().verbosity()
    }

    fn lifecycle(&self, text: &str) {
        info!("{}: {}", self.config.suite_name, text);
        self.reporter.borrow_mut().message(
            Verbosity::LIFECYCLE.0,
            ReportLine {
                origin: RUNNER_ORIGIN,
                line: line!(),
                kind: Kind::Msg,
                suite: &self.config.suite_name,
                message: text,
            },
        );
    }
}

/// The running test's view of the harness. Assertions are methods on this
/// type; see [`crate::assert`].
pub struct TestCase<'h> {
    name: &'static str,
    index: usize,
    /// Passed assertions so far.
    pub pass: u32,
    /// Failed assertions so far.
    pub fail: u32,
    harness: &'h Harness,
}

impl<'h> TestCase<'h> {
    fn new(name: &'static str, index: usize, harness: &'h Harness) -> Self {
        Self {
            name,
            index,
            pass: 0,
            fail: 0,
            harness,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Zero-based position in registration order.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn suite_name(&self) -> &str {
        &self.harness.config.suite_name
    }

    /// Handle to the mock and stub counters, for doubles to record into.
    pub fn registry(&self) -> Registry {
        self.harness.registry.clone()
    }

    /// Handle to the capture stack, for doubles that raise.
    pub fn capture_handle(&self) -> Capture {
        self.harness.capture.clone()
    }

    /// The allocator whose figures the memory assertions inspect.
    #[cfg(feature = "alloc-tracking")]
    pub fn allocator(&self) -> HarnessAllocator {
        self.harness.tracker.clone()
    }

    /// The allocator whose figures the memory assertions inspect.
    #[cfg(not(feature = "alloc-tracking"))]
    pub fn allocator(&self) -> HarnessAllocator {
        SystemAllocator
    }

    #[cfg(feature = "alloc-tracking")]
    pub(crate) fn alloc_stats(&self) -> AllocStats {
        self.harness.tracker.stats()
    }

    /// Track a mock from inside a test. A full table is reported as an error.
    #[track_caller]
    pub fn track_mock(&mut self, name: &str) {
        if let Err(err) = self.harness.registry.track_mock(name) {
            self.error(format_args!("cannot track mock \"{}\": {}", name, err));
        }
    }

    /// Track a stub from inside a test. A full table is reported as an error.
    #[track_caller]
    pub fn track_stub(&mut self, name: &str) {
        if let Err(err) = self.harness.registry.track_stub(name) {
            self.error(format_args!("cannot track stub \"{}\": {}", name, err));
        }
    }

    /// Run `body` with a capture point armed.
    #[cfg(feature = "capture")]
    pub fn capture<T>(&mut self, body: impl FnOnce() -> T) -> Captured<T> {
        self.harness.capture.run(body)
    }

    /// Capture is compiled out: report the misuse and run `body` unguarded.
    #[cfg(not(feature = "capture"))]
    #[track_caller]
    pub fn capture<T>(&mut self, body: impl FnOnce() -> T) -> Captured<T> {
        self.error(format_args!("Must enable the `capture` feature to use capture."));
        Captured::Completed(body())
    }

    /// Print a `MSG` line when verbosity is at least `level`.
    #[track_caller]
    pub fn msg(&mut self, level: u8, text: impl fmt::Display) {
        let message = text.to_string();
        debug!("{}: {}", self.name, message);
        self.harness.reporter.borrow_mut().message(
            level,
            ReportLine {
                origin: self.name,
                line: Location::caller().line(),
                kind: Kind::Msg,
                suite: &self.harness.config.suite_name,
                message: &message,
            },
        );
    }

    /// Record a configuration error. Always printed, never reset.
    #[track_caller]
    pub fn error(&mut self, text: impl fmt::Display) {
        self.error_at(Location::caller().line(), &text.to_string());
    }

    fn error_at(&mut self, line: u32, message: &str) {
        self.harness.errors.set(self.harness.errors.get() + 1);
        log::error!("{}: {}", self.name, message);
        self.emit(Kind::Error, line, message);
    }

    /// Tally one assertion and report it.
    #[track_caller]
    pub(crate) fn check(&mut self, ok: bool, pass: fmt::Arguments<'_>, fail: fmt::Arguments<'_>) {
        let line = Location::caller().line();
        if ok {
            self.pass += 1;
            if self.harness.verbosity().permits(Kind::Pass.threshold()) {
                self.emit(Kind::Pass, line, &pass.to_string());
            }
        } else {
            self.fail += 1;
            self.emit(Kind::Fail, line, &fail.to_string());
        }
    }

    fn emit(&self, kind: Kind, line: u32, message: &str) {
        self.harness.reporter.borrow_mut().outcome(ReportLine {
            origin: self.name,
            line,
            kind,
            suite: &self.harness.config.suite_name,
            message,
        });
    }

    fn escaped(&mut self, escape: Escape) {
        match escape {
            Escape::Unarmed(message) => self.error_at(
                0,
                &format!("raise with no capture point armed: {}", message),
            ),
            Escape::Disabled(message) => self.error_at(0, &message),
            Escape::Panic(message) => {
                self.error_at(0, &format!("test procedure panicked: {}", message))
            }
        }
    }
}

impl fmt::Debug for TestCase<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("index", &self.index)
            .field("pass", &self.pass)
            .field("fail", &self.fail)
            .finish()
    }
}

#[derive(Clone, Copy)]
struct TestEntry {
    name: &'static str,
    procedure: TestFn,
}

/// Where a suite is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Registering,
    /// Executing the test at this zero-based index.
    Running(usize),
    Reporting,
    Done,
}

/// Tallies of one finished test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestOutcome {
    pub name: &'static str,
    pub pass: u32,
    pub fail: u32,
    /// Configuration errors raised while this test ran.
    pub errors: u32,
}

/// Run-wide totals, accumulated across tests and never reset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub tests_run: usize,
    pub pass: u32,
    pub fail: u32,
    pub errors: u32,
    /// Sum of every test's allocated bytes.
    pub bytes_allocated: u64,
    /// Sum of the bytes each test left outstanding.
    pub bytes_outstanding: i64,
}

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub suite: String,
    pub totals: RunTotals,
    pub outcomes: Vec<TestOutcome>,
    pub mocks: usize,
    pub stubs: usize,
}

impl RunSummary {
    /// Process exit status: failures plus configuration errors, capped at 255
    /// so a large count never wraps to success.
    pub fn exit_code(&self) -> i32 {
        let bad = u64::from(self.totals.fail) + u64::from(self.totals.errors);
        bad.min(255) as i32
    }

    pub fn all_passed(&self) -> bool {
        self.exit_code() == 0
    }
}

/// A named collection of tests, run sequentially in one process.
pub struct Suite {
    harness: Harness,
    tests: Vec<TestEntry>,
    outcomes: Vec<TestOutcome>,
    totals: RunTotals,
    state: RunState,
}

impl Suite {
    /// A suite that prints its report to stdout.
    pub fn new(config: Config) -> Self {
        let reporter = Reporter::stdout(config.verbosity);
        Self::with_reporter(config, reporter)
    }

    pub fn with_reporter(config: Config, reporter: Reporter) -> Self {
        Self {
            harness: Harness::new(config, reporter),
            tests: Vec::new(),
            outcomes: Vec::new(),
            totals: RunTotals::default(),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn config(&self) -> &Config {
        &self.harness.config
    }

    pub fn registry(&self) -> Registry {
        self.harness.registry.clone()
    }

    pub fn totals(&self) -> RunTotals {
        self.totals
    }

    pub fn test_count(&self) -> usize {
        self.tests.len()
    }

    pub fn track_mock(&mut self, name: &str) -> Result<(), HarnessError> {
        self.open_registration()?;
        self.harness.registry.track_mock(name)
    }

    pub fn track_stub(&mut self, name: &str) -> Result<(), HarnessError> {
        self.open_registration()?;
        self.harness.registry.track_stub(name)
    }

    /// Append a test. Tests run in the order they were added.
    pub fn add_test(&mut self, name: &'static str, procedure: TestFn) -> Result<(), HarnessError> {
        self.open_registration()?;
        if let Some(capacity) = self.harness.config.max_tests {
            if self.tests.len() >= capacity {
                log::warn!("cannot add test \"{}\": tests table is full", name);
                return Err(HarnessError::CapacityExceeded {
                    table: Table::Tests,
                    capacity,
                });
            }
        }
        if self.tests.iter().any(|t| t.name == name) {
            return Err(HarnessError::DuplicateTest(name.to_string()));
        }
        debug!("add test name = \"{}\"", name);
        self.tests.push(TestEntry { name, procedure });
        Ok(())
    }

    fn open_registration(&mut self) -> Result<(), HarnessError> {
        match self.state {
            RunState::Idle => {
                self.state = RunState::Registering;
                Ok(())
            }
            RunState::Registering => Ok(()),
            _ => Err(HarnessError::RegistrationClosed),
        }
    }

    /// Run every registered test, then print the summary.
    pub fn run(&mut self) -> Result<RunSummary, HarnessError> {
        if !matches!(self.state, RunState::Idle | RunState::Registering) {
            return Err(HarnessError::AlreadyRun);
        }
        self.harness.lifecycle("start suite");
        for index in 0..self.tests.len() {
            self.run_one(index);
        }
        self.state = RunState::Reporting;
        self.print_summary();
        self.state = RunState::Done;
        Ok(self.summary())
    }

    /// Run the suite and exit the process with [`RunSummary::exit_code`].
    pub fn run_and_exit(mut self) -> Result<(), HarnessError> {
        let summary = self.run()?;
        self.harness.reporter.borrow_mut().flush();
        std::process::exit(summary.exit_code())
    }

    fn run_one(&mut self, index: usize) {
        self.state = RunState::Running(index);
        let entry = self.tests[index];
        self.harness.reset_per_test();
        self.harness.lifecycle(&format!("start test {}", entry.name));

        let errors_before = self.harness.errors.get();
        let mut case = TestCase::new(entry.name, index, &self.harness);
        let result = panic::catch_unwind(AssertUnwindSafe(|| (entry.procedure)(&mut case)));
        if let Err(payload) = result {
            case.escaped(Escape::classify(payload));
        }
        let (pass, fail) = (case.pass, case.fail);
        let errors = self.harness.errors.get() - errors_before;

        self.totals.tests_run += 1;
        self.totals.pass += pass;
        self.totals.fail += fail;
        self.totals.errors += errors;
        #[cfg(feature = "alloc-tracking")]
        {
            let stats = self.harness.tracker.stats();
            self.totals.bytes_allocated += stats.total;
            self.totals.bytes_outstanding += stats.pool;
        }
        self.outcomes.push(TestOutcome {
            name: entry.name,
            pass,
            fail,
            errors,
        });

        if self.harness.verbosity().permits(Verbosity::FAILURES.0) {
            self.harness.reporter.borrow_mut().line(format_args!(
                "{}. {}: pass: {}, fail: {}",
                index + 1,
                entry.name,
                pass,
                fail
            ));
        }
        self.harness.lifecycle(&format!("end test {}", entry.name));
    }

    fn print_summary(&self) {
        let totals = self.totals;
        let mut reporter = self.harness.reporter.borrow_mut();
        reporter.line("");
        reporter.line(format_args!(
            "{}: test funcs: {}, pass: {}, fail: {}, errors: {}",
            self.harness.config.suite_name,
            totals.tests_run,
            totals.pass,
            totals.fail,
            totals.errors
        ));
        reporter.line(format_args!(
            "     tests: {}, stubs: {}, mocks: {}",
            self.tests.len(),
            self.harness.registry.stub_len(),
            self.harness.registry.mock_len()
        ));
        #[cfg(feature = "alloc-tracking")]
        reporter.line(format_args!(
            "     memory allocated: {}, memory still in use: {}",
            totals.bytes_allocated, totals.bytes_outstanding
        ));
        if reporter.verbosity() > Verbosity::LIFECYCLE {
            let (mocks, stubs) = self.harness.registry.snapshot();
            reporter.line("");
            reporter.line("Mocks:");
            for mock in mocks {
                reporter.line(format_args!("   {}: {}", mock.name, mock.count));
            }
            reporter.line("Stubs:");
            for stub in stubs {
                reporter.line(format_args!("   {}: {}", stub.name, stub.count));
            }
        }
        reporter.flush();
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            suite: self.harness.config.suite_name.clone(),
            totals: self.totals,
            outcomes: self.outcomes.clone(),
            mocks: self.harness.registry.mock_len(),
            stubs: self.harness.registry.stub_len(),
        }
    }
}

impl Drop for Suite {
    // A run interrupted mid-way still reports what it got through.
    fn drop(&mut self) {
        if let RunState::Running(_) = self.state {
            self.state = RunState::Reporting;
            self.print_summary();
            self.state = RunState::Done;
        }
    }
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("suite", &self.harness.config.suite_name)
            .field("tests", &self.tests.len())
            .field("state", &self.state)
            .field("totals", &self.totals)
            .finish()
    }
}

/// Register test functions under their own names, in order.
///
/// ```ignore
/// register_tests!(suite; create_and_destroy, items_are_returned_in_order)?;
/// ```
#[macro_export]
macro_rules! register_tests {
    ($suite:expr; $($test:ident),+ $(,)?) => {
        (|| -> ::std::result::Result<(), $crate::HarnessError> {
            $( $suite.add_test(stringify!($test), $test)?; )+
            Ok(())
        })()
    };
}
