#![cfg(feature = "alloc-tracking")]

use proptest::prelude::*;
use unit_harness::{Allocator, Primitive, TrackingAllocator};

#[derive(Debug, Clone)]
enum Op {
    Allocate(usize),
    AllocateZeroed(usize, usize),
    Duplicate(String),
    Resize(usize, usize),
    Release(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0usize..256).prop_map(Op::Allocate),
        (0usize..8, 0usize..64).prop_map(|(c, s)| Op::AllocateZeroed(c, s)),
        "[a-z]{0,16}".prop_map(Op::Duplicate),
        (any::<usize>(), 0usize..256).prop_map(|(i, s)| Op::Resize(i, s)),
        any::<usize>().prop_map(Op::Release),
    ]
}

proptest! {
    #[test]
    fn pool_is_live_bytes(ops in prop::collection::vec(op(), 0..64)) {
        let alloc = TrackingAllocator::new();
        let mut live = Vec::new();
        let mut total = 0u64;
        for op in ops {
            match op {
                Op::Allocate(size) => {
                    live.push(alloc.allocate(size).unwrap());
                    total += size as u64;
                }
                Op::AllocateZeroed(count, size) => {
                    live.push(alloc.allocate_zeroed(count, size).unwrap());
                    total += (count * size) as u64;
                }
                Op::Duplicate(s) => {
                    live.push(alloc.duplicate_string(&s).unwrap());
                    total += s.len() as u64 + 1;
                }
                Op::Resize(i, size) if !live.is_empty() => {
                    let block = live.swap_remove(i % live.len());
                    live.push(alloc.resize(block, size).unwrap());
                }
                Op::Release(i) if !live.is_empty() => {
                    let block = live.swap_remove(i % live.len());
                    alloc.release(block);
                }
                _ => {}
            }
            let outstanding: usize = live.iter().map(|b| b.len()).sum();
            prop_assert_eq!(alloc.pool(), outstanding as i64);
            prop_assert_eq!(alloc.total(), total);
        }
        for block in live.drain(..) {
            alloc.release(block);
        }
        prop_assert_eq!(alloc.pool(), 0);
        prop_assert_eq!(alloc.live_blocks(), 0);
    }

    #[test]
    fn reset_zeroes_figures_but_keeps_sizes(sizes in prop::collection::vec(1usize..128, 1..16)) {
        let alloc = TrackingAllocator::new();
        let blocks: Vec<_> = sizes.iter().map(|&s| alloc.allocate(s).unwrap()).collect();
        alloc.reset();
        prop_assert_eq!(alloc.pool(), 0);
        prop_assert_eq!(alloc.total(), 0);
        prop_assert_eq!(alloc.count(Primitive::Allocate), 0);

        let released: usize = sizes.iter().sum();
        for block in blocks {
            alloc.release(block);
        }
        prop_assert_eq!(alloc.pool(), -(released as i64));
        prop_assert_eq!(alloc.count(Primitive::Release), sizes.len() as u32);
    }
}
