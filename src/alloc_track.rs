//! Allocation instrumentation.
//!
//! [`TrackingAllocator`] wraps another [`Allocator`] and counts every call per
//! primitive. It also keeps two byte figures for the current test:
//!
//! - `pool`: bytes outstanding. Allocation adds the requested size, release
//!   subtracts the size recorded when the block was handed out, resize adds
//!   the difference.
//! - `total`: bytes handed out by allocation and string duplication. Never
//!   decremented.
//!
//! Sizes are remembered in a side table keyed by [`BlockId`], so the accounting
//! does not depend on buffer layout.

#[cfg(feature = "alloc-tracking")]
use crate::capability::{Allocator, Block, BlockId, SystemAllocator};
#[cfg(feature = "alloc-tracking")]
use crate::report::Diagnostics;
#[cfg(feature = "alloc-tracking")]
use log::{trace, warn};
#[cfg(feature = "alloc-tracking")]
use std::{cell::RefCell, collections::HashMap, rc::Rc};

/// One of the five heap primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Allocate,
    AllocateZeroed,
    Resize,
    Release,
    DuplicateString,
}

impl Primitive {
    pub const ALL: [Primitive; 5] = [
        Primitive::Allocate,
        Primitive::AllocateZeroed,
        Primitive::Resize,
        Primitive::Release,
        Primitive::DuplicateString,
    ];

    /// Name used in report lines and as the registry key for mocked primitives.
    pub fn name(self) -> &'static str {
        match self {
            Primitive::Allocate => "allocate",
            Primitive::AllocateZeroed => "allocate_zeroed",
            Primitive::Resize => "resize",
            Primitive::Release => "release",
            Primitive::DuplicateString => "duplicate_string",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl std::fmt::Display for Primitive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-test allocation figures.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllocStats {
    counts: [u32; 5],
    /// Bytes outstanding. Signed: a test may release blocks it did not allocate.
    pub pool: i64,
    /// Bytes allocated, monotonic within a test.
    pub total: u64,
}

impl AllocStats {
    /// Invocations of `primitive` since the last reset.
    pub fn count(&self, primitive: Primitive) -> u32 {
        self.counts[primitive.index()]
    }

    #[cfg(feature = "alloc-tracking")]
    fn hit(&mut self, primitive: Primitive) {
        self.counts[primitive.index()] += 1;
    }

    #[cfg(feature = "alloc-tracking")]
    fn grow(&mut self, size: usize) {
        self.pool += size as i64;
        self.total += size as u64;
    }
}

#[cfg(feature = "alloc-tracking")]
#[derive(Debug, Default)]
struct TrackerState {
    stats: AllocStats,
    live: HashMap<BlockId, usize>,
}

/// Counting wrapper around an inner allocator.
///
/// Clones share one set of figures, so the harness keeps a clone to inspect
/// while the unit under test allocates through another.
#[cfg(feature = "alloc-tracking")]
#[derive(Debug, Clone)]
pub struct TrackingAllocator<A: Allocator = SystemAllocator> {
    inner: A,
    state: Rc<RefCell<TrackerState>>,
    diagnostics: Diagnostics,
}

#[cfg(feature = "alloc-tracking")]
const ALLOC_ORIGIN: &str = "alloc";

#[cfg(feature = "alloc-tracking")]
impl TrackingAllocator<SystemAllocator> {
    pub fn new() -> Self {
        Self::wrap(SystemAllocator)
    }
}

#[cfg(feature = "alloc-tracking")]
impl Default for TrackingAllocator<SystemAllocator> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "alloc-tracking")]
impl<A: Allocator> TrackingAllocator<A> {
    /// Track every call made through `inner`.
    pub fn wrap(inner: A) -> Self {
        Self {
            inner,
            state: Rc::new(RefCell::new(TrackerState::default())),
            diagnostics: Diagnostics::detached(),
        }
    }

    /// Echo every primitive's enter and leave into `diagnostics`.
    pub fn with_diagnostics(mut self, diagnostics: Diagnostics) -> Self {
        self.diagnostics = diagnostics;
        self
    }

    pub fn stats(&self) -> AllocStats {
        self.state.borrow().stats.clone()
    }

    pub fn pool(&self) -> i64 {
        self.state.borrow().stats.pool
    }

    pub fn total(&self) -> u64 {
        self.state.borrow().stats.total
    }

    pub fn count(&self, primitive: Primitive) -> u32 {
        self.state.borrow().stats.count(primitive)
    }

    /// Blocks handed out and not yet released, across resets.
    pub fn live_blocks(&self) -> usize {
        self.state.borrow().live.len()
    }

    /// Zero counts, pool and total. Blocks still live keep their recorded
    /// sizes so a later release is accounted correctly.
    pub fn reset(&self) {
        self.state.borrow_mut().stats = AllocStats::default();
    }

    fn record_new(&self, primitive: Primitive, block: Option<Block>) -> Option<Block> {
        {
            let mut state = self.state.borrow_mut();
            state.stats.hit(primitive);
            if let Some(block) = &block {
                state.stats.grow(block.len());
                state.live.insert(block.id(), block.len());
            }
        }
        match &block {
            Some(block) => {
                trace!("leave {}: {:?} ({} bytes)", primitive, block.id(), block.len());
                self.diagnostics.emit(
                    ALLOC_ORIGIN,
                    format_args!("leave {}: {} bytes", primitive, block.len()),
                );
            }
            None => {
                trace!("leave {}: out of memory", primitive);
                self.diagnostics
                    .emit(ALLOC_ORIGIN, format_args!("leave {}: out of memory", primitive));
            }
        }
        block
    }
}

#[cfg(feature = "alloc-tracking")]
impl<A: Allocator> Allocator for TrackingAllocator<A> {
    fn allocate(&self, size: usize) -> Option<Block> {
        trace!("enter allocate: size = {}", size);
        self.diagnostics
            .emit(ALLOC_ORIGIN, format_args!("enter allocate: size = {}", size));
        let block = self.inner.allocate(size);
        self.record_new(Primitive::Allocate, block)
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
        trace!("enter allocate_zeroed: count = {}, size = {}", count, size);
        self.diagnostics.emit(
            ALLOC_ORIGIN,
            format_args!("enter allocate_zeroed: count = {}, size = {}", count, size),
        );
        let block = self.inner.allocate_zeroed(count, size);
        self.record_new(Primitive::AllocateZeroed, block)
    }

    fn resize(&self, block: Block, new_size: usize) -> Result<Block, Block> {
        trace!("enter resize: {:?}, size = {}", block.id(), new_size);
        self.diagnostics.emit(
            ALLOC_ORIGIN,
            format_args!("enter resize: {} to {} bytes", block.len(), new_size),
        );
        let old_id = block.id();
        let result = self.inner.resize(block, new_size);
        let mut state = self.state.borrow_mut();
        state.stats.hit(Primitive::Resize);
        if let Ok(resized) = &result {
            let old_size = state.live.remove(&old_id).unwrap_or_else(|| {
                warn!("resize of untracked block {:?}", old_id);
                0
            });
            state.live.insert(resized.id(), resized.len());
            state.stats.pool += resized.len() as i64 - old_size as i64;
        }
        drop(state);
        match &result {
            Ok(resized) => self
                .diagnostics
                .emit(ALLOC_ORIGIN, format_args!("leave resize: {} bytes", resized.len())),
            Err(_) => self
                .diagnostics
                .emit(ALLOC_ORIGIN, format_args!("leave resize: out of memory")),
        }
        result
    }

    fn release(&self, block: Block) {
        trace!("enter release: {:?}", block.id());
        let released = {
            let mut state = self.state.borrow_mut();
            state.stats.hit(Primitive::Release);
            let released = state.live.remove(&block.id());
            match released {
                Some(size) => state.stats.pool -= size as i64,
                None => warn!("release of untracked block {:?}", block.id()),
            }
            released
        };
        match released {
            Some(size) => self
                .diagnostics
                .emit(ALLOC_ORIGIN, format_args!("release: {} bytes", size)),
            None => self
                .diagnostics
                .emit(ALLOC_ORIGIN, format_args!("release: untracked block")),
        }
        self.inner.release(block);
    }

    fn duplicate_string(&self, s: &str) -> Option<Block> {
        trace!("enter duplicate_string: {} bytes", s.len());
        self.diagnostics.emit(
            ALLOC_ORIGIN,
            format_args!("enter duplicate_string: {} bytes", s.len()),
        );
        let block = self.inner.duplicate_string(s);
        self.record_new(Primitive::DuplicateString, block)
    }
}

#[cfg(all(test, feature = "alloc-tracking"))]
mod tests {
    use super::*;

    #[test]
    fn allocate_and_release_balance_the_pool() {
        let alloc = TrackingAllocator::new();
        let a = alloc.allocate(10).unwrap();
        let b = alloc.allocate_zeroed(2, 3).unwrap();
        assert_eq!(alloc.pool(), 16);
        assert_eq!(alloc.total(), 16);

        alloc.release(a);
        assert_eq!(alloc.pool(), 6);
        alloc.release(b);
        assert_eq!(alloc.pool(), 0);
        assert_eq!(alloc.total(), 16);
        assert_eq!(alloc.count(Primitive::Allocate), 1);
        assert_eq!(alloc.count(Primitive::AllocateZeroed), 1);
        assert_eq!(alloc.count(Primitive::Release), 2);
    }

    #[test]
    fn resize_adds_the_difference() {
        let alloc = TrackingAllocator::new();
        let block = alloc.allocate(8).unwrap();
        let block = alloc.resize(block, 20).unwrap();
        assert_eq!(alloc.pool(), 20);
        let block = alloc.resize(block, 4).unwrap();
        assert_eq!(alloc.pool(), 4);
        // resize never contributes to the running total
        assert_eq!(alloc.total(), 8);
        alloc.release(block);
        assert_eq!(alloc.pool(), 0);
        assert_eq!(alloc.count(Primitive::Resize), 2);
    }

    #[test]
    fn duplicate_string_counts_terminator() {
        let alloc = TrackingAllocator::new();
        let s = alloc.duplicate_string("abc").unwrap();
        assert_eq!(alloc.pool(), 4);
        assert_eq!(alloc.total(), 4);
        alloc.release(s);
        assert_eq!(alloc.pool(), 0);
        assert_eq!(alloc.count(Primitive::DuplicateString), 1);
    }

    #[test]
    fn zero_length_allocations_are_freeable() {
        let alloc = TrackingAllocator::new();
        let a = alloc.allocate(0).unwrap();
        let b = alloc.allocate(0).unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(alloc.live_blocks(), 2);
        alloc.release(a);
        alloc.release(b);
        assert_eq!(alloc.live_blocks(), 0);
        assert_eq!(alloc.pool(), 0);
        assert_eq!(alloc.count(Primitive::Release), 2);
    }

    #[test]
    fn reset_keeps_live_sizes() {
        let alloc = TrackingAllocator::new();
        let block = alloc.allocate(12).unwrap();
        alloc.reset();
        assert_eq!(alloc.stats(), AllocStats::default());
        alloc.release(block);
        assert_eq!(alloc.pool(), -12);
    }

    #[test]
    fn diagnostics_follow_enter_and_leave() {
        use crate::config::Verbosity;
        use crate::report::{Reporter, SharedBuffer};

        let buffer = SharedBuffer::new();
        let reporter = Rc::new(RefCell::new(Reporter::with_sink(
            Verbosity::DIAGNOSTIC,
            buffer.clone(),
        )));
        let alloc = TrackingAllocator::new().with_diagnostics(Diagnostics::new(reporter, "alloc"));
        let block = alloc.allocate(6).unwrap();
        alloc.release(block);

        let lines = buffer.lines();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("MSG: alloc: enter allocate: size = 6"));
        assert!(lines[1].ends_with("MSG: alloc: leave allocate: 6 bytes"));
        assert!(lines[2].ends_with("MSG: alloc: release: 6 bytes"));
    }

    #[test]
    fn clones_share_figures() {
        let alloc = TrackingAllocator::new();
        let handle = alloc.clone();
        let block = handle.allocate(5).unwrap();
        assert_eq!(alloc.pool(), 5);
        handle.release(block);
        assert_eq!(alloc.pool(), 0);
    }
}
