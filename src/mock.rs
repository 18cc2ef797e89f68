//! Recording doubles for the capability traits.
//!
//! Each double records every call into the [`Registry`] under a fixed name.
//! Calls are only observed for names the suite tracked, so a test that does
//! not care about a double pays nothing for it.

use crate::alloc_track::Primitive;
use crate::capability::{Allocator, Block, Fatal, SystemAllocator, Trace};
use crate::capture::Capture;
use crate::registry::Registry;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};

/// Registry name [`MockFatal`] records under.
pub const FATAL_ERROR: &str = "fatal_error";
/// Registry name [`MockTrace`] records under, as a stub.
pub const MARK: &str = "mark";

/// What a mocked primitive does when called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    /// Delegate to the wrapped allocator.
    Succeed,
    /// Report out of memory.
    Fail,
}

#[derive(Debug)]
struct Plan {
    defaults: HashMap<Primitive, Behavior>,
    queued: HashMap<Primitive, VecDeque<Behavior>>,
}

impl Plan {
    fn new(default: Behavior) -> Self {
        Self {
            defaults: Primitive::ALL.iter().map(|&p| (p, default)).collect(),
            queued: HashMap::new(),
        }
    }

    fn next(&mut self, primitive: Primitive) -> Behavior {
        self.queued
            .get_mut(&primitive)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| self.defaults[&primitive])
    }
}

/// Scripted allocator. Every call is recorded as a mock hit named after the
/// primitive; whether it succeeds follows the script.
///
/// Successful calls go to the wrapped allocator, so wrapping the harness's
/// tracking allocator keeps byte accounting live.
#[derive(Debug)]
pub struct MockAllocator<A: Allocator = SystemAllocator> {
    registry: Registry,
    inner: A,
    plan: RefCell<Plan>,
}

impl MockAllocator<SystemAllocator> {
    /// Every primitive reports out of memory.
    pub fn failing(registry: Registry) -> Self {
        Self::over(registry, SystemAllocator, Behavior::Fail)
    }

    /// Every primitive succeeds.
    pub fn succeeding(registry: Registry) -> Self {
        Self::over(registry, SystemAllocator, Behavior::Succeed)
    }
}

impl<A: Allocator> MockAllocator<A> {
    pub fn over(registry: Registry, inner: A, default: Behavior) -> Self {
        Self {
            registry,
            inner,
            plan: RefCell::new(Plan::new(default)),
        }
    }

    /// Change what `primitive` does once its queued behaviors run out.
    pub fn set_default(&self, primitive: Primitive, behavior: Behavior) {
        self.plan.borrow_mut().defaults.insert(primitive, behavior);
    }

    /// Queue `behavior` for the next `times` calls of `primitive`.
    pub fn queue(&self, primitive: Primitive, behavior: Behavior, times: usize) {
        let mut plan = self.plan.borrow_mut();
        let queue = plan.queued.entry(primitive).or_default();
        queue.extend(std::iter::repeat(behavior).take(times));
    }

    pub fn succeed_next(&self, primitive: Primitive, times: usize) {
        self.queue(primitive, Behavior::Succeed, times);
    }

    pub fn fail_next(&self, primitive: Primitive, times: usize) {
        self.queue(primitive, Behavior::Fail, times);
    }

    fn enter(&self, primitive: Primitive) -> Behavior {
        self.registry.mock_entered(primitive.name());
        self.plan.borrow_mut().next(primitive)
    }
}

impl<A: Allocator> Allocator for MockAllocator<A> {
    fn allocate(&self, size: usize) -> Option<Block> {
        match self.enter(Primitive::Allocate) {
            Behavior::Succeed => self.inner.allocate(size),
            Behavior::Fail => None,
        }
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
        match self.enter(Primitive::AllocateZeroed) {
            Behavior::Succeed => self.inner.allocate_zeroed(count, size),
            Behavior::Fail => None,
        }
    }

    fn resize(&self, block: Block, new_size: usize) -> Result<Block, Block> {
        match self.enter(Primitive::Resize) {
            Behavior::Succeed => self.inner.resize(block, new_size),
            Behavior::Fail => Err(block),
        }
    }

    fn release(&self, block: Block) {
        // release cannot fail; the script only decides whether it is forwarded
        match self.enter(Primitive::Release) {
            Behavior::Succeed => self.inner.release(block),
            Behavior::Fail => drop(block),
        }
    }

    fn duplicate_string(&self, s: &str) -> Option<Block> {
        match self.enter(Primitive::DuplicateString) {
            Behavior::Succeed => self.inner.duplicate_string(s),
            Behavior::Fail => None,
        }
    }
}

/// Fatal-error double: records the call, keeps the message and raises to the
/// innermost capture block instead of ending the process.
#[derive(Debug)]
pub struct MockFatal {
    registry: Registry,
    capture: Capture,
    last_message: RefCell<Option<String>>,
}

impl MockFatal {
    pub fn new(registry: Registry, capture: Capture) -> Self {
        Self {
            registry,
            capture,
            last_message: RefCell::new(None),
        }
    }

    /// Message passed to the most recent call.
    pub fn last_message(&self) -> Option<String> {
        self.last_message.borrow().clone()
    }
}

impl Fatal for MockFatal {
    fn fatal_error(&self, message: &str) -> ! {
        self.registry.mock_entered(FATAL_ERROR);
        *self.last_message.borrow_mut() = Some(message.to_string());
        self.capture.raise(message)
    }
}

/// Trace double: counts marks as a stub and remembers where they came from.
#[derive(Debug)]
pub struct MockTrace {
    registry: Registry,
    marks: RefCell<Vec<&'static str>>,
}

impl MockTrace {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            marks: RefCell::new(Vec::new()),
        }
    }

    pub fn marks(&self) -> Vec<&'static str> {
        self.marks.borrow().clone()
    }
}

impl Trace for MockTrace {
    fn mark(&self, location: &'static str) {
        self.registry.stub_entered(MARK);
        self.marks.borrow_mut().push(location);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracked() -> Registry {
        let registry = Registry::default();
        for primitive in Primitive::ALL {
            registry.track_mock(primitive.name()).unwrap();
        }
        registry.track_mock(FATAL_ERROR).unwrap();
        registry.track_stub(MARK).unwrap();
        registry
    }

    #[test]
    fn failing_allocator_records_and_fails() {
        let registry = tracked();
        let alloc = MockAllocator::failing(registry.clone());
        assert!(alloc.allocate(4).is_none());
        assert!(alloc.allocate_zeroed(1, 4).is_none());
        assert!(alloc.duplicate_string("x").is_none());
        let block = Block::zeroed(2);
        let block = alloc.resize(block, 8).unwrap_err();
        assert_eq!(block.len(), 2);
        assert_eq!(registry.mock_count("allocate"), 1);
        assert_eq!(registry.mock_count("allocate_zeroed"), 1);
        assert_eq!(registry.mock_count("resize"), 1);
        assert_eq!(registry.mock_count("duplicate_string"), 1);
    }

    #[test]
    fn queued_behaviors_run_before_default() {
        let registry = tracked();
        let alloc = MockAllocator::failing(registry.clone());
        alloc.succeed_next(Primitive::AllocateZeroed, 1);
        assert!(alloc.allocate_zeroed(1, 32).is_some());
        assert!(alloc.allocate_zeroed(1, 32).is_none());
        assert_eq!(registry.mock_count("allocate_zeroed"), 2);

        alloc.set_default(Primitive::Allocate, Behavior::Succeed);
        alloc.fail_next(Primitive::Allocate, 1);
        assert!(alloc.allocate(1).is_none());
        assert!(alloc.allocate(1).is_some());
    }

    #[cfg(feature = "alloc-tracking")]
    #[test]
    fn wrapping_tracker_keeps_accounting() {
        use crate::alloc_track::TrackingAllocator;
        let registry = tracked();
        let tracker = TrackingAllocator::new();
        let alloc = MockAllocator::over(registry.clone(), tracker.clone(), Behavior::Succeed);
        let block = alloc.allocate(10).unwrap();
        assert_eq!(tracker.pool(), 10);
        alloc.release(block);
        assert_eq!(tracker.pool(), 0);
        assert_eq!(registry.mock_count("release"), 1);
    }

    #[cfg(feature = "capture")]
    #[test]
    fn fatal_double_raises_into_capture() {
        let registry = tracked();
        let capture = Capture::new();
        let fatal = MockFatal::new(registry.clone(), capture.clone());
        let out = capture.run(|| -> () { fatal.fatal_error("attempt to add to an invalid FIFO") });
        assert!(out.is_raised());
        assert_eq!(registry.mock_count(FATAL_ERROR), 1);
        assert_eq!(
            fatal.last_message().as_deref(),
            Some("attempt to add to an invalid FIFO")
        );
    }

    #[test]
    fn trace_double_counts_marks() {
        let registry = tracked();
        let trace = MockTrace::new(registry.clone());
        trace.mark("fifo_create");
        trace.mark("fifo_add");
        assert_eq!(registry.stub_count(MARK), 2);
        assert_eq!(trace.marks(), vec!["fifo_create", "fifo_add"]);
    }
}
