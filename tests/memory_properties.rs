//! Property tests for the memory manager and interpreter arithmetic.
//!
//! The memory properties drive a random sequence of allocate/deallocate
//! operations against a model of which pids currently hold memory, then
//! check the structural invariants: totals partition the configured
//! memory, frame ownership matches the allocation records exactly, and
//! flat block lists stay contiguous with no adjacent free pairs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;

use csopesy::logsink::MemLog;
use csopesy::mem::{AllocKind, FitStrategy, MemoryConfig, MemoryManager};
use csopesy::process::{Pid, Process};

#[derive(Clone, Debug)]
enum Op {
    Alloc { pid: u8, size_kb: u64 },
    Dealloc { pid: u8 },
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u8..12, 1u64..200).prop_map(|(pid, size_kb)| Op::Alloc { pid, size_kb }),
        (0u8..12).prop_map(|pid| Op::Dealloc { pid }),
    ]
}

fn paging_manager(dir: &std::path::Path) -> MemoryManager {
    MemoryManager::new(MemoryConfig {
        max_overall_mem: 512,
        mem_per_frame: 16,
        min_mem_per_proc: 16,
        max_mem_per_proc: 128,
        kind: AllocKind::Paging,
        strategy: FitStrategy::FirstFit,
        backing_store_path: dir.join("store.txt"),
    })
}

fn flat_manager(dir: &std::path::Path, strategy: FitStrategy) -> MemoryManager {
    MemoryManager::new(MemoryConfig {
        max_overall_mem: 512,
        mem_per_frame: 16,
        min_mem_per_proc: 1,
        max_mem_per_proc: 512,
        kind: AllocKind::Flat,
        strategy,
        backing_store_path: dir.join("store.txt"),
    })
}

proptest! {
    #[test]
    fn paging_invariants_hold_under_any_op_sequence(ops in prop::collection::vec(op_strategy(), 1..60)) {
        let dir = tempfile::tempdir().unwrap();
        let mem = paging_manager(dir.path());
        let mut held: BTreeSet<Pid> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Alloc { pid, size_kb } => {
                    let pid = Pid(u32::from(pid));
                    if mem.allocate(pid, "p", size_kb).is_ok() {
                        prop_assert!(held.insert(pid), "double allocation accepted");
                    }
                }
                Op::Dealloc { pid } => {
                    let pid = Pid(u32::from(pid));
                    let released = mem.deallocate(pid);
                    prop_assert_eq!(released, held.remove(&pid));
                }
            }

            // Totals partition the configured memory.
            prop_assert_eq!(mem.used_memory() + mem.free_memory(), 512);

            // Allocated sum across records equals the used total.
            let record_sum: u64 = held
                .iter()
                .map(|pid| mem.record(*pid).unwrap().allocated_kb)
                .sum();
            prop_assert_eq!(record_sum, mem.used_memory());

            // Frame ownership is exactly the expansion of the records.
            let mut from_frames: BTreeMap<Pid, BTreeSet<usize>> = BTreeMap::new();
            for frame in mem.frames_snapshot() {
                if let Some(owner) = frame.owner {
                    prop_assert!(!frame.free);
                    from_frames.entry(owner).or_default().insert(frame.index);
                }
            }
            let mut from_records: BTreeMap<Pid, BTreeSet<usize>> = BTreeMap::new();
            for pid in &held {
                let record = mem.record(*pid).unwrap();
                from_records.insert(*pid, record.frames.iter().copied().collect());
            }
            prop_assert_eq!(from_frames, from_records);
        }
    }

    #[test]
    fn flat_invariants_hold_under_any_op_sequence(
        ops in prop::collection::vec(op_strategy(), 1..60),
        strategy in prop_oneof![
            Just(FitStrategy::FirstFit),
            Just(FitStrategy::BestFit),
            Just(FitStrategy::WorstFit),
        ],
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mem = flat_manager(dir.path(), strategy);
        let mut held: BTreeSet<Pid> = BTreeSet::new();

        for op in ops {
            match op {
                Op::Alloc { pid, size_kb } => {
                    let pid = Pid(u32::from(pid));
                    if mem.allocate(pid, "p", size_kb).is_ok() {
                        held.insert(pid);
                    }
                }
                Op::Dealloc { pid } => {
                    let pid = Pid(u32::from(pid));
                    held.remove(&pid);
                    mem.deallocate(pid);
                }
            }

            let blocks = mem.blocks_snapshot();

            // Blocks partition [0, 512) contiguously.
            let mut cursor = 0;
            for b in &blocks {
                prop_assert_eq!(b.start, cursor);
                prop_assert!(b.size > 0);
                cursor += b.size;
            }
            prop_assert_eq!(cursor, 512);

            // Post-merge: no two adjacent free blocks.
            for pair in blocks.windows(2) {
                prop_assert!(!(pair[0].free && pair[1].free));
            }

            // Free block sum matches the free total.
            let free_sum: u64 = blocks.iter().filter(|b| b.free).map(|b| b.size).sum();
            prop_assert_eq!(free_sum, mem.free_memory());
        }
    }

    #[test]
    fn arithmetic_saturates_into_u16(a in any::<u16>(), b in any::<u16>()) {
        let program = [
            format!("DECLARE a {a}"),
            format!("DECLARE b {b}"),
            "ADD sum a b".to_string(),
            "SUBTRACT diff a b".to_string(),
        ];
        let mut p = Process::new_custom(
            Pid(1),
            "arith",
            program.iter().map(String::as_str),
            "arrival",
            Arc::new(MemLog::new()),
        );
        for _ in 0..4 {
            p.step();
        }

        let expected_sum = (u32::from(a) + u32::from(b)).min(65535) as u16;
        let expected_diff = a.saturating_sub(b);
        prop_assert_eq!(p.var("sum"), Some(expected_sum));
        prop_assert_eq!(p.var("diff"), Some(expected_diff));
    }

    #[test]
    fn frame_boundary_requests_never_leave_internal_fragmentation(
        frames in 1u64..8,
    ) {
        let dir = tempfile::tempdir().unwrap();
        let mem = paging_manager(dir.path());
        let size = frames * 16;
        if mem.allocate(Pid(1), "exact", size).is_ok() {
            prop_assert_eq!(mem.internal_fragmentation(), 0);
            let record = mem.record(Pid(1)).unwrap();
            prop_assert_eq!(record.pages as u64, frames);
            prop_assert_eq!(record.allocated_kb, size);
        }
    }
}
