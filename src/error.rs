//! Errors surfaced by harness setup and lifecycle calls.

use thiserror::Error;

/// Which fixed-capacity table a registration targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Table {
    /// Tracked mocks.
    Mocks,
    /// Tracked stubs.
    Stubs,
    /// Registered test procedures.
    Tests,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Table::Mocks => write!(f, "mocks"),
            Table::Stubs => write!(f, "stubs"),
            Table::Tests => write!(f, "tests"),
        }
    }
}

/// Harness configuration errors.
///
/// Assertion failures are not represented here; they are tallied on the
/// running test case instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HarnessError {
    /// A registration would grow a bounded table past its configured capacity.
    #[error("{table} table is full (capacity {capacity})")]
    CapacityExceeded {
        /// The table that overflowed.
        table: Table,
        /// The configured capacity.
        capacity: usize,
    },
    /// Tests can only be registered before the run starts.
    #[error("cannot register tests once the suite has started running")]
    RegistrationClosed,
    /// A suite runs at most once.
    #[error("suite has already been run")]
    AlreadyRun,
    /// Two test procedures were registered under the same name.
    #[error("test \"{0}\" is already registered")]
    DuplicateTest(String),
}
