//! Harness configuration.
//!
//! Allocation tracking and capture are Cargo features (`alloc-tracking`,
//! `capture`). Everything else lives in [`Config`], which a suite receives at
//! construction time.

use lazy_static::lazy_static;

/// Environment variable that overrides the configured verbosity.
pub const VERBOSE_ENV: &str = "UNIT_HARNESS_VERBOSE";

lazy_static! {
    static ref ENV_VERBOSITY: Option<Verbosity> = std::env::var(VERBOSE_ENV)
        .ok()
        .and_then(|v| v.trim().parse::<u8>().ok())
        .map(Verbosity);
}

/// How much of the report is printed.
///
/// Errors are always printed regardless of level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Verbosity(pub u8);

impl Verbosity {
    /// Run summary only.
    pub const SUMMARY: Verbosity = Verbosity(0);
    /// Failures and per-test lines.
    pub const FAILURES: Verbosity = Verbosity(1);
    /// Pass and fail lines.
    pub const RESULTS: Verbosity = Verbosity(2);
    /// Suite start/end and per-test lifecycle messages.
    pub const LIFECYCLE: Verbosity = Verbosity(3);
    /// Internal diagnostics; higher values enable deeper levels.
    pub const DIAGNOSTIC: Verbosity = Verbosity(4);

    /// True if a message at `level` should be printed.
    pub fn permits(self, level: u8) -> bool {
        self.0 >= level
    }
}

impl Default for Verbosity {
    fn default() -> Self {
        Verbosity::FAILURES
    }
}

/// Suite-wide settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Display name of the suite; appears on every report line.
    pub suite_name: String,
    pub verbosity: Verbosity,
    /// Upper bound on registered tests. `None` means unbounded.
    pub max_tests: Option<usize>,
    /// Upper bound on distinct tracked mocks. `None` means unbounded.
    pub max_mocks: Option<usize>,
    /// Upper bound on distinct tracked stubs. `None` means unbounded.
    pub max_stubs: Option<usize>,
}

impl Config {
    /// Default settings for a suite called `suite_name`.
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            verbosity: Verbosity::default(),
            max_tests: None,
            max_mocks: None,
            max_stubs: None,
        }
    }

    pub fn with_verbosity(mut self, level: u8) -> Self {
        self.verbosity = Verbosity(level);
        self
    }

    pub fn with_max_tests(mut self, capacity: usize) -> Self {
        self.max_tests = Some(capacity);
        self
    }

    pub fn with_max_mocks(mut self, capacity: usize) -> Self {
        self.max_mocks = Some(capacity);
        self
    }

    pub fn with_max_stubs(mut self, capacity: usize) -> Self {
        self.max_stubs = Some(capacity);
        self
    }

    /// Apply `UNIT_HARNESS_VERBOSE` if it is set to a number.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(level) = *ENV_VERBOSITY {
            self.verbosity = level;
        }
        self
    }

    /// Whether allocation tracking was compiled in.
    pub const fn alloc_tracking_enabled() -> bool {
        cfg!(feature = "alloc-tracking")
    }

    /// Whether the capture mechanism was compiled in.
    pub const fn capture_enabled() -> bool {
        cfg!(feature = "capture")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new("unit tests")
    }
}
