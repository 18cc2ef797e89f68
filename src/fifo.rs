//! Example unit under test: a replayable FIFO of byte payloads.
//!
//! Every heap block the queue owns comes from the injected [`Allocator`], so a
//! test can count and size them exactly. Allocation failure goes to the
//! injected [`Fatal`], which in production ends the process.
//!
//! `get` walks a cursor and never frees anything; `reset` rewinds the cursor
//! and `destroy` releases every block.

use crate::capability::{Allocator, Block, Fatal, Trace};
use std::fmt;
use std::mem::size_of;

/// Bytes accounted for the queue record (first, last, cursor, count).
pub const QUEUE_RECORD_SIZE: usize = 4 * size_of::<usize>();
/// Bytes accounted for each element record (payload, size, next).
pub const ELEMENT_RECORD_SIZE: usize = 3 * size_of::<usize>();

pub const STRUCT_ALLOC_FAILED: &str = "cannot allocate memory for FIFO struct";
pub const ELEMENT_ALLOC_FAILED: &str = "cannot allocate memory for FIFO element";
pub const DATA_ALLOC_FAILED: &str = "cannot allocate memory for FIFO element data";
pub const INVALID_FIFO: &str = "attempt to add to an invalid FIFO";

/// The capabilities the queue calls out to.
#[derive(Clone, Copy)]
pub struct FifoEnv<'a> {
    pub alloc: &'a dyn Allocator,
    pub fatal: &'a dyn Fatal,
    pub trace: &'a dyn Trace,
}

impl<'a> FifoEnv<'a> {
    pub fn new(alloc: &'a dyn Allocator, fatal: &'a dyn Fatal, trace: &'a dyn Trace) -> Self {
        Self {
            alloc,
            fatal,
            trace,
        }
    }
}

impl fmt::Debug for FifoEnv<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FifoEnv").finish_non_exhaustive()
    }
}

struct Element {
    record: Block,
    data: Block,
}

pub struct Fifo<'a> {
    env: FifoEnv<'a>,
    record: Block,
    elements: Vec<Element>,
    cursor: usize,
}

impl<'a> Fifo<'a> {
    pub fn create(env: FifoEnv<'a>) -> Self {
        env.trace.mark("fifo_create");
        let Some(record) = env.alloc.allocate_zeroed(1, QUEUE_RECORD_SIZE) else {
            env.fatal.fatal_error(STRUCT_ALLOC_FAILED)
        };
        Self {
            env,
            record,
            elements: Vec::new(),
            cursor: 0,
        }
    }

    /// Append a copy of `data`. Costs two blocks: the element record and the
    /// payload copy.
    pub fn add(&mut self, data: &[u8]) {
        self.env.trace.mark("fifo_add");
        let Some(record) = self.env.alloc.allocate_zeroed(1, ELEMENT_RECORD_SIZE) else {
            self.env.fatal.fatal_error(ELEMENT_ALLOC_FAILED)
        };
        // a zero-length payload still gets its own block
        let Some(mut copy) = self.env.alloc.allocate(data.len()) else {
            self.env.alloc.release(record);
            self.env.fatal.fatal_error(DATA_ALLOC_FAILED)
        };
        // an injected allocator may hand back a block of another length
        let n = copy.len().min(data.len());
        copy.as_mut_slice()[..n].copy_from_slice(&data[..n]);
        self.elements.push(Element { record, data: copy });
    }

    /// Copy the element under the cursor into `out` and advance.
    ///
    /// Returns `false` at the end of the queue. With `out` absent the cursor
    /// still advances. At most `out.len()` bytes are copied.
    pub fn get(&mut self, out: Option<&mut [u8]>) -> bool {
        self.env.trace.mark("fifo_get");
        let Some(element) = self.elements.get(self.cursor) else {
            return false;
        };
        if let Some(out) = out {
            let n = out.len().min(element.data.len());
            out[..n].copy_from_slice(&element.data.as_slice()[..n]);
        }
        self.cursor += 1;
        true
    }

    /// Rewind the cursor to the first element.
    pub fn reset(&mut self) {
        self.env.trace.mark("fifo_reset");
        self.cursor = 0;
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Release every payload, every element record and the queue record.
    pub fn destroy(self) {
        self.env.trace.mark("fifo_destroy");
        let alloc = self.env.alloc;
        for element in self.elements {
            alloc.release(element.data);
            alloc.release(element.record);
        }
        alloc.release(self.record);
    }
}

impl fmt::Debug for Fifo<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fifo")
            .field("len", &self.elements.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

// Entry points for callers that hold a handle which may be missing.

/// Adding to a missing queue is fatal.
pub fn add(env: FifoEnv<'_>, fifo: Option<&mut Fifo<'_>>, data: &[u8]) {
    match fifo {
        Some(fifo) => fifo.add(data),
        None => {
            env.trace.mark("fifo_add");
            env.fatal.fatal_error(INVALID_FIFO)
        }
    }
}

/// A missing queue has no elements.
pub fn get(env: FifoEnv<'_>, fifo: Option<&mut Fifo<'_>>, out: Option<&mut [u8]>) -> bool {
    match fifo {
        Some(fifo) => fifo.get(out),
        None => {
            env.trace.mark("fifo_get");
            false
        }
    }
}

/// Returns `false` for a missing queue.
pub fn reset(env: FifoEnv<'_>, fifo: Option<&mut Fifo<'_>>) -> bool {
    match fifo {
        Some(fifo) => {
            fifo.reset();
            true
        }
        None => {
            env.trace.mark("fifo_reset");
            false
        }
    }
}

/// Destroying a missing queue releases nothing.
pub fn destroy(env: FifoEnv<'_>, fifo: Option<Fifo<'_>>) {
    match fifo {
        Some(fifo) => fifo.destroy(),
        None => env.trace.mark("fifo_destroy"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{LogTrace, SystemAllocator};

    struct Unreachable;

    impl Fatal for Unreachable {
        fn fatal_error(&self, message: &str) -> ! {
            panic!("unexpected fatal error: {}", message)
        }
    }

    #[test]
    fn replays_after_reset() {
        let env = FifoEnv::new(&SystemAllocator, &Unreachable, &LogTrace);
        let mut fifo = Fifo::create(env);
        for value in [1u8, 2, 3] {
            fifo.add(&[value]);
        }
        let mut seen = Vec::new();
        let mut out = [0u8; 1];
        while fifo.get(Some(&mut out)) {
            seen.push(out[0]);
        }
        fifo.reset();
        while fifo.get(Some(&mut out)) {
            seen.push(out[0]);
        }
        assert_eq!(seen, vec![1, 2, 3, 1, 2, 3]);
        fifo.destroy();
    }

    #[test]
    fn get_without_buffer_still_advances() {
        let env = FifoEnv::new(&SystemAllocator, &Unreachable, &LogTrace);
        let mut fifo = Fifo::create(env);
        fifo.add(&[7]);
        fifo.add(&[8]);
        assert!(fifo.get(None));
        let mut out = [0u8; 1];
        assert!(fifo.get(Some(&mut out)));
        assert_eq!(out[0], 8);
        assert!(!fifo.get(Some(&mut out)));
        fifo.destroy();
    }

    #[test]
    fn short_buffer_copies_prefix() {
        let env = FifoEnv::new(&SystemAllocator, &Unreachable, &LogTrace);
        let mut fifo = Fifo::create(env);
        fifo.add(&[1, 2, 3, 4]);
        let mut out = [0u8; 2];
        assert!(fifo.get(Some(&mut out)));
        assert_eq!(out, [1, 2]);
        fifo.destroy();
    }

    /// Hands out blocks one byte shorter than asked for.
    struct ShortAllocator;

    impl Allocator for ShortAllocator {
        fn allocate(&self, size: usize) -> Option<Block> {
            Some(Block::zeroed(size.saturating_sub(1)))
        }

        fn allocate_zeroed(&self, count: usize, size: usize) -> Option<Block> {
            SystemAllocator.allocate_zeroed(count, size)
        }

        fn resize(&self, block: Block, new_size: usize) -> Result<Block, Block> {
            SystemAllocator.resize(block, new_size)
        }

        fn release(&self, block: Block) {
            SystemAllocator.release(block)
        }

        fn duplicate_string(&self, s: &str) -> Option<Block> {
            SystemAllocator.duplicate_string(s)
        }
    }

    #[test]
    fn short_payload_block_keeps_what_fits() {
        let env = FifoEnv::new(&ShortAllocator, &Unreachable, &LogTrace);
        let mut fifo = Fifo::create(env);
        fifo.add(&[1, 2, 3]);
        let mut out = [9u8; 3];
        assert!(fifo.get(Some(&mut out)));
        assert_eq!(out, [1, 2, 9]);
        fifo.destroy();
    }

    #[test]
    fn missing_handle_paths() {
        let env = FifoEnv::new(&SystemAllocator, &Unreachable, &LogTrace);
        assert!(!get(env, None, None));
        assert!(!reset(env, None));
        destroy(env, None);
    }
}
