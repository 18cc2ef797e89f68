//! Capability traits the unit under test receives instead of calling the heap,
//! the fatal-error routine and the trace hook directly.
//!
//! Production code passes [`SystemAllocator`], [`ExitOnFatal`] and
//! [`LogTrace`]. Tests pass the tracking or recording doubles from
//! [`crate::alloc_track`] and [`crate::mock`].

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BLOCK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a heap block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u64);

/// An owned heap buffer handed out by an [`Allocator`].
///
/// Every block has its own id, including zero-length ones, so two blocks
/// never alias and each can be released exactly once.
#[derive(Debug, PartialEq, Eq)]
pub struct Block {
    id: BlockId,
    bytes: Vec<u8>,
}

impl Block {
    /// Wrap `bytes` in a block with a fresh id.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            id: BlockId(NEXT_BLOCK_ID.fetch_add(1, Ordering::Relaxed)),
            bytes,
        }
    }

    pub fn zeroed(len: usize) -> Self {
        Self::new(vec![0; len])
    }

    pub fn id(&self) -> BlockId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Grow or shrink in place, keeping the id. New bytes are zero.
    pub(crate) fn set_len(&mut self, new_len: usize) {
        self.bytes.resize(new_len, 0);
    }
}

/// The five heap primitives.
pub trait Allocator {
    /// A block of `size` bytes, or `None` when out of memory.
    fn allocate(&self, size: usize) -> Option<Block>;

    /// A zero-filled block of `count * size` bytes.
    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block>;

    /// Resize `block` to `new_size`. On failure the original block is handed
    /// back unchanged.
    fn resize(&self, block: Block, new_size: usize) -> Result<Block, Block>;

    /// Return `block` to the heap.
    fn release(&self, block: Block);

    /// Copy `s` into a new block, terminator included.
    fn duplicate_string(&self, s: &str) -> Option<Block>;
}

/// Unrecoverable error reporting. Never returns.
pub trait Fatal {
    fn fatal_error(&self, message: &str) -> !;
}

/// Entry-point trace hook.
pub trait Trace {
    fn mark(&self, location: &'static str);
}

/// Plain heap allocation; never fails short of the process aborting.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAllocator;

impl Allocator for SystemAllocator {
    fn allocate(&self, size: usize) -> Option<Block> {
        Some(Block::zeroed(size))
    }

    fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
        count.checked_mul(size).map(Block::zeroed)
    }

    fn resize(&self, mut block: Block, new_size: usize) -> Result<Block, Block> {
        block.set_len(new_size);
        Ok(block)
    }

    fn release(&self, block: Block) {
        drop(block);
    }

    fn duplicate_string(&self, s: &str) -> Option<Block> {
        let mut bytes = Vec::with_capacity(s.len() + 1);
        bytes.extend_from_slice(s.as_bytes());
        bytes.push(0);
        Some(Block::new(bytes))
    }
}

/// Logs the message and terminates the process with status 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExitOnFatal;

impl Fatal for ExitOnFatal {
    fn fatal_error(&self, message: &str) -> ! {
        log::error!("fatal: {}", message);
        eprintln!("FATAL: {}", message);
        std::process::exit(1)
    }
}

/// Sends entry marks to the `log` facade at trace level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogTrace;

impl Trace for LogTrace {
    fn mark(&self, location: &'static str) {
        log::trace!("enter {}", location);
    }
}
