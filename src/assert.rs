//! Assertion library.
//!
//! Assertions are methods on [`TestCase`]. Each one tallies a pass or a fail
//! on the running test and reports it; none of them stops the test body.
//! Using a memory assertion with `alloc-tracking` compiled out records a
//! configuration error instead.

use crate::alloc_track::Primitive;
use crate::capture::Captured;
use crate::runner::TestCase;
use std::fmt::Debug;

/// `memcmp`-style comparison of the first `len` bytes: zero when equal,
/// otherwise the difference of the first mismatching pair.
fn compare_prefix(expected: &[u8], got: &[u8], len: usize) -> Option<i32> {
    let (a, b) = (expected.get(..len)?, got.get(..len)?);
    Some(
        a.iter()
            .zip(b)
            .find(|(x, y)| x != y)
            .map_or(0, |(x, y)| i32::from(*x) - i32::from(*y)),
    )
}

impl TestCase<'_> {
    #[track_caller]
    pub fn assert_equal<T: PartialEq + Debug>(&mut self, expected: T, got: T) {
        self.check(
            expected == got,
            format_args!("assert equal"),
            format_args!("assert equal expected {:?} but got {:?}", expected, got),
        );
    }

    #[track_caller]
    pub fn assert_not_equal<T: PartialEq + Debug>(&mut self, expected: T, got: T) {
        self.check(
            expected != got,
            format_args!("assert not equal"),
            format_args!("assert not equal expected {:?} but got {:?}", expected, got),
        );
    }

    /// Passes when `got` is within `precision` of `expected`.
    #[track_caller]
    pub fn assert_float_equal(&mut self, expected: f64, got: f64, precision: f64) {
        let within = !(expected < got - precision || expected > got + precision);
        self.check(
            within,
            format_args!("assert float equal"),
            format_args!("assert float equal expected {:.6} but got {:.6}", expected, got),
        );
    }

    #[track_caller]
    pub fn assert_float_not_equal(&mut self, expected: f64, got: f64, precision: f64) {
        let within = expected > got - precision && expected < got + precision;
        self.check(
            !within,
            format_args!("assert float not equal"),
            format_args!(
                "assert float not equal expected {:.6} but got {:.6}",
                expected, got
            ),
        );
    }

    #[track_caller]
    pub fn assert_str_equal(&mut self, expected: &str, got: &str) {
        self.check(
            expected == got,
            format_args!("assert string equal"),
            format_args!(
                "assert string equal expected \"{}\" but got \"{}\"",
                expected, got
            ),
        );
    }

    #[track_caller]
    pub fn assert_str_not_equal(&mut self, expected: &str, got: &str) {
        self.check(
            expected != got,
            format_args!("assert string not equal"),
            format_args!(
                "assert string not equal expected \"{}\" but got \"{}\"",
                expected, got
            ),
        );
    }

    #[track_caller]
    pub fn assert_none<T>(&mut self, value: &Option<T>) {
        self.check(
            value.is_none(),
            format_args!("assert value is none"),
            format_args!("assert value is none"),
        );
    }

    #[track_caller]
    pub fn assert_some<T>(&mut self, value: &Option<T>) {
        self.check(
            value.is_some(),
            format_args!("assert value is some"),
            format_args!("assert value is some"),
        );
    }

    /// Compare the first `len` bytes. A buffer shorter than `len` fails.
    #[track_caller]
    pub fn assert_buffer_equal(&mut self, expected: &[u8], got: &[u8], len: usize) {
        match compare_prefix(expected, got, len) {
            Some(val) => self.check(
                val == 0,
                format_args!("assert buffer equal returns {}", val),
                format_args!("assert buffer equal returns {}", val),
            ),
            None => self.check(
                false,
                format_args!(""),
                format_args!("assert buffer equal: buffer shorter than {} bytes", len),
            ),
        }
    }

    #[track_caller]
    pub fn assert_buffer_not_equal(&mut self, expected: &[u8], got: &[u8], len: usize) {
        match compare_prefix(expected, got, len) {
            Some(val) => self.check(
                val != 0,
                format_args!("assert buffer not equal returns {}", val),
                format_args!("assert buffer not equal returns {}", val),
            ),
            None => self.check(
                false,
                format_args!(""),
                format_args!("assert buffer not equal: buffer shorter than {} bytes", len),
            ),
        }
    }

    /// Passes when the block was left through a raise.
    #[track_caller]
    pub fn assert_raised<T>(&mut self, outcome: &Captured<T>) {
        self.check(
            outcome.is_raised(),
            format_args!("assert capture raised"),
            format_args!("assert capture raised but the block completed"),
        );
    }

    /// Passes when the block fell through without a raise.
    #[track_caller]
    pub fn assert_completed<T>(&mut self, outcome: &Captured<T>) {
        let message = outcome.raised().map(|r| r.message.clone()).unwrap_or_default();
        self.check(
            outcome.is_completed(),
            format_args!("assert capture completed"),
            format_args!("assert capture completed but it raised \"{}\"", message),
        );
    }

    #[track_caller]
    pub fn assert_mock_entered(&mut self, name: &str) {
        let count = self.registry().mock_count(name);
        self.check(
            count != 0,
            format_args!("assert mock entered \"{}\"", name),
            format_args!("assert mock entered \"{}\"", name),
        );
    }

    #[track_caller]
    pub fn assert_mock_not_entered(&mut self, name: &str) {
        let count = self.registry().mock_count(name);
        self.check(
            count == 0,
            format_args!("assert mock not entered \"{}\"", name),
            format_args!("assert mock not entered \"{}\" but got {}", name, count),
        );
    }

    #[track_caller]
    pub fn assert_mock_entered_count(&mut self, expected: u32, name: &str) {
        let count = self.registry().mock_count(name);
        self.check(
            count == expected,
            format_args!("assert mock entered count \"{}\"", name),
            format_args!(
                "assert mock entered count \"{}\" expected {} but got {}",
                name, expected, count
            ),
        );
    }

    #[track_caller]
    pub fn assert_stub_entered(&mut self, name: &str) {
        let count = self.registry().stub_count(name);
        self.check(
            count != 0,
            format_args!("assert stub entered \"{}\"", name),
            format_args!("assert stub entered \"{}\"", name),
        );
    }

    #[track_caller]
    pub fn assert_stub_not_entered(&mut self, name: &str) {
        let count = self.registry().stub_count(name);
        self.check(
            count == 0,
            format_args!("assert stub not entered \"{}\"", name),
            format_args!("assert stub not entered \"{}\" but got {}", name, count),
        );
    }

    #[track_caller]
    pub fn assert_stub_entered_count(&mut self, expected: u32, name: &str) {
        let count = self.registry().stub_count(name);
        self.check(
            count == expected,
            format_args!("assert stub entered count \"{}\"", name),
            format_args!(
                "assert stub entered count \"{}\" expected {} but got {}",
                name, expected, count
            ),
        );
    }
}

#[cfg(feature = "alloc-tracking")]
impl TestCase<'_> {
    /// Bytes outstanding in the current test.
    #[track_caller]
    pub fn assert_pool_size(&mut self, expected: i64) {
        let pool = self.alloc_stats().pool;
        self.check(
            pool == expected,
            format_args!("assert memory pool size"),
            format_args!("assert memory pool size expected {} but got {}", expected, pool),
        );
    }

    #[track_caller]
    pub fn assert_pool_zero(&mut self) {
        let pool = self.alloc_stats().pool;
        self.check(
            pool == 0,
            format_args!("assert memory pool is zero"),
            format_args!("assert memory pool is zero but got {}", pool),
        );
    }

    #[track_caller]
    pub fn assert_pool_not_zero(&mut self) {
        let pool = self.alloc_stats().pool;
        self.check(
            pool != 0,
            format_args!("assert memory pool not zero"),
            format_args!("assert memory pool not zero"),
        );
    }

    /// Bytes allocated so far in the current test.
    #[track_caller]
    pub fn assert_total_size(&mut self, expected: u64) {
        let total = self.alloc_stats().total;
        self.check(
            total == expected,
            format_args!("assert memory total size"),
            format_args!("assert memory total size expected {} but got {}", expected, total),
        );
    }

    #[track_caller]
    pub fn assert_total_zero(&mut self) {
        let total = self.alloc_stats().total;
        self.check(
            total == 0,
            format_args!("assert memory total is zero"),
            format_args!("assert memory total is zero but got {}", total),
        );
    }

    #[track_caller]
    pub fn assert_total_not_zero(&mut self) {
        let total = self.alloc_stats().total;
        self.check(
            total != 0,
            format_args!("assert memory total is not zero"),
            format_args!("assert memory total is not zero"),
        );
    }

    #[track_caller]
    pub fn assert_entered(&mut self, primitive: Primitive) {
        let count = self.alloc_stats().count(primitive);
        self.check(
            count != 0,
            format_args!("assert {} entered", primitive),
            format_args!("assert {} entered", primitive),
        );
    }

    #[track_caller]
    pub fn assert_not_entered(&mut self, primitive: Primitive) {
        let count = self.alloc_stats().count(primitive);
        self.check(
            count == 0,
            format_args!("assert {} not entered", primitive),
            format_args!("assert {} not entered but got {}", primitive, count),
        );
    }

    #[track_caller]
    pub fn assert_entered_count(&mut self, primitive: Primitive, expected: u32) {
        let count = self.alloc_stats().count(primitive);
        self.check(
            count == expected,
            format_args!("assert {} entered count", primitive),
            format_args!(
                "assert {} entered count expected {} but got {}",
                primitive, expected, count
            ),
        );
    }
}

#[cfg(not(feature = "alloc-tracking"))]
const ALLOC_TRACKING_REQUIRED: &str = "Must enable the `alloc-tracking` feature to use memory assertions.";

#[cfg(not(feature = "alloc-tracking"))]
impl TestCase<'_> {
    #[track_caller]
    pub fn assert_pool_size(&mut self, _expected: i64) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_pool_zero(&mut self) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_pool_not_zero(&mut self) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_total_size(&mut self, _expected: u64) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_total_zero(&mut self) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_total_not_zero(&mut self) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_entered(&mut self, _primitive: Primitive) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_not_entered(&mut self, _primitive: Primitive) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }

    #[track_caller]
    pub fn assert_entered_count(&mut self, _primitive: Primitive, _expected: u32) {
        self.error(ALLOC_TRACKING_REQUIRED);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::report::{Reporter, SharedBuffer};
    use crate::runner::{RunSummary, Suite, TestFn};

    fn run_single(verbosity: u8, name: &'static str, test: TestFn) -> (RunSummary, SharedBuffer) {
        let buffer = SharedBuffer::new();
        let config = Config::new("assert tests").with_verbosity(verbosity);
        let reporter = Reporter::with_sink(config.verbosity, buffer.clone());
        let mut suite = Suite::with_reporter(config, reporter);
        suite.track_mock("fatal_error").unwrap();
        suite.track_stub("mark").unwrap();
        suite.add_test(name, test).unwrap();
        (suite.run().unwrap(), buffer)
    }

    #[test]
    fn prefix_compare_is_memcmp_like() {
        assert_eq!(compare_prefix(b"abc", b"abc", 3), Some(0));
        assert_eq!(compare_prefix(b"abc", b"abd", 2), Some(0));
        assert!(compare_prefix(b"abc", b"abd", 3).unwrap() < 0);
        assert_eq!(compare_prefix(b"ab", b"abc", 3), None);
    }

    fn value_assertions(t: &mut TestCase<'_>) {
        t.assert_equal(123, 123);
        t.assert_not_equal(1u32, 2u32);
        t.assert_float_equal(1.0, 1.05, 0.1);
        t.assert_float_not_equal(1.0, 1.5, 0.1);
        t.assert_str_equal("cannot allocate", "cannot allocate");
        t.assert_str_not_equal("a", "b");
        t.assert_none(&None::<u8>);
        t.assert_some(&Some(1));
        t.assert_buffer_equal(&[1, 2, 3], &[1, 2, 4], 2);
        t.assert_buffer_not_equal(&[1, 2, 3], &[1, 2, 4], 3);
    }

    #[test]
    fn value_assertions_pass() {
        let (summary, _) = run_single(0, "value_assertions", value_assertions);
        assert_eq!(summary.totals.pass, 10);
        assert_eq!(summary.totals.fail, 0);
    }

    fn failing_assertions(t: &mut TestCase<'_>) {
        t.assert_equal(1, 2);
        t.assert_float_equal(1.0, 2.0, 0.5);
        t.assert_str_equal("a", "b");
        t.assert_some(&None::<u8>);
        t.assert_buffer_equal(&[1], &[1, 2], 2);
        // the body keeps running after failures
        t.assert_equal(5, 5);
    }

    #[test]
    fn failures_are_tallied_not_thrown() {
        let (summary, buffer) = run_single(1, "failing_assertions", failing_assertions);
        assert_eq!(summary.totals.fail, 5);
        assert_eq!(summary.totals.pass, 1);
        let out = buffer.contents();
        assert!(out.contains("FAIL: assert tests: assert equal expected 1 but got 2"));
        assert!(out.contains("assert string equal expected \"a\" but got \"b\""));
        assert!(out.contains("buffer shorter than 2 bytes"));
    }

    fn registry_assertions(t: &mut TestCase<'_>) {
        let registry = t.registry();
        t.assert_mock_not_entered("fatal_error");
        registry.mock_entered("fatal_error");
        registry.mock_entered("fatal_error");
        t.assert_mock_entered("fatal_error");
        t.assert_mock_entered_count(2, "fatal_error");
        // never tracked, so never observed
        registry.mock_entered("malloc");
        t.assert_mock_not_entered("malloc");

        t.assert_stub_not_entered("mark");
        registry.stub_entered("mark");
        t.assert_stub_entered("mark");
        t.assert_stub_entered_count(1, "mark");
    }

    #[test]
    fn registry_assertions_pass() {
        let (summary, _) = run_single(0, "registry_assertions", registry_assertions);
        assert_eq!(summary.totals.pass, 7);
        assert_eq!(summary.totals.fail, 0);
    }

    thread_local! {
        static ASSERT_LINE: std::cell::Cell<u32> = std::cell::Cell::new(0);
    }

    fn pass_lines(t: &mut TestCase<'_>) {
        let line = line!() + 1;
        t.assert_equal(true, true);
        ASSERT_LINE.with(|l| l.set(line));
    }

    #[test]
    fn pass_lines_carry_source_line() {
        let (_, buffer) = run_single(2, "pass_lines", pass_lines);
        let line = buffer
            .lines()
            .into_iter()
            .find(|l| l.contains(": PASS: "))
            .unwrap();
        let expected_line = ASSERT_LINE.with(|l| l.get());
        assert_eq!(
            line,
            format!("pass_lines: {}: PASS: assert tests: assert equal", expected_line)
        );
    }

    #[cfg(feature = "alloc-tracking")]
    fn memory_assertions(t: &mut TestCase<'_>) {
        use crate::capability::Allocator;
        let alloc = t.allocator();
        t.assert_pool_zero();
        t.assert_total_zero();
        t.assert_not_entered(Primitive::Allocate);

        let block = alloc.allocate(16).unwrap();
        let name = alloc.duplicate_string("fifo").unwrap();
        t.assert_pool_size(21);
        t.assert_total_size(21);
        t.assert_pool_not_zero();
        t.assert_total_not_zero();
        t.assert_entered(Primitive::Allocate);
        t.assert_entered_count(Primitive::DuplicateString, 1);

        alloc.release(block);
        alloc.release(name);
        t.assert_pool_zero();
        t.assert_total_size(21);
        t.assert_entered_count(Primitive::Release, 2);
    }

    #[cfg(feature = "alloc-tracking")]
    #[test]
    fn memory_assertions_pass() {
        let (summary, _) = run_single(0, "memory_assertions", memory_assertions);
        assert_eq!(summary.totals.pass, 12);
        assert_eq!(summary.totals.fail, 0);
        assert_eq!(summary.totals.bytes_allocated, 21);
        assert_eq!(summary.totals.bytes_outstanding, 0);
    }

    #[cfg(not(feature = "alloc-tracking"))]
    fn memory_assertions_without_tracking(t: &mut TestCase<'_>) {
        t.assert_pool_zero();
        t.assert_entered_count(Primitive::Allocate, 0);
    }

    #[cfg(not(feature = "alloc-tracking"))]
    #[test]
    fn memory_assertions_are_errors_when_compiled_out() {
        let (summary, buffer) = run_single(
            0,
            "memory_assertions_without_tracking",
            memory_assertions_without_tracking,
        );
        assert_eq!(summary.totals.errors, 2);
        assert_eq!(summary.totals.pass, 0);
        assert_eq!(summary.exit_code(), 2);
        assert!(buffer
            .contents()
            .contains("ERROR: assert tests: Must enable the `alloc-tracking` feature"));
    }
}
