pub mod alloc_track;
pub mod assert;
pub mod capability;
pub mod capture;
pub mod config;
pub mod error;
pub mod fifo;
pub mod mock;
pub mod registry;
pub mod report;
pub mod runner;

pub use alloc_track::{AllocStats, Primitive};
#[cfg(feature = "alloc-tracking")]
pub use alloc_track::TrackingAllocator;
pub use capability::{
    Allocator, Block, BlockId, ExitOnFatal, Fatal, LogTrace, SystemAllocator, Trace,
};
pub use capture::{Capture, Captured, Raised};
pub use config::{Config, Verbosity};
pub use error::{HarnessError, Table};
pub use mock::{Behavior, MockAllocator, MockFatal, MockTrace};
pub use registry::{NamedCounter, Registry};
pub use report::{Diagnostics, Kind, ReportLine, Reporter, SharedBuffer};
pub use runner::{
    HarnessAllocator, RunState, RunSummary, RunTotals, Suite, TestCase, TestFn, TestOutcome,
};
