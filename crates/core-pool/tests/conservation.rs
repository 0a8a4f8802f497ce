use core_pool::{PoolBlock, PoolConfig, PoolError, TextPool};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Op {
    Allocate { size: usize, align_shift: u32 },
    Release(usize),
    Collect,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        4 => (0usize..600, 0u32..8).prop_map(|(size, align_shift)| Op::Allocate { size, align_shift }),
        3 => any::<usize>().prop_map(Op::Release),
        1 => Just(Op::Collect),
    ]
}

fn assert_conserved(pool: &TextPool) {
    let stats = pool.stats();
    assert_eq!(stats.free + stats.live, stats.capacity);
    pool.check().unwrap();
}

proptest! {
    #[test]
    fn free_plus_live_equals_capacity(ops in proptest::collection::vec(op(), 1..200)) {
        let mut pool = TextPool::new(PoolConfig { arena_size: 512, max_arenas: Some(4) });
        let mut held: Vec<PoolBlock> = Vec::new();
        for op in ops {
            match op {
                Op::Allocate { size, align_shift } => {
                    match pool.allocate(size, 1 << align_shift) {
                        Ok(block) => {
                            prop_assert!(block.size() >= size);
                            prop_assert_eq!(block.offset() % (1usize << align_shift).max(16), 0);
                            held.push(block);
                        }
                        Err(PoolError::Exhausted { .. }) => {}
                        Err(e) => prop_assert!(false, "unexpected error {e}"),
                    }
                }
                Op::Release(pick) => {
                    if !held.is_empty() {
                        let block = held.swap_remove(pick % held.len());
                        pool.release(block);
                    }
                }
                Op::Collect => pool.garbage_collect(),
            }
            assert_conserved(&pool);
            let live: usize = held.iter().map(PoolBlock::size).sum();
            prop_assert_eq!(pool.stats().live, live);
        }
    }
}

#[test]
fn exhausted_pool_collects_then_reports_no_storage() {
    let mut pool = TextPool::new(PoolConfig {
        arena_size: 1024,
        max_arenas: Some(1),
    });
    let mut held = Vec::new();
    loop {
        match pool.allocate(64, 16) {
            Ok(block) => held.push(block),
            Err(err) => {
                assert_eq!(err, PoolError::Exhausted { requested: 64 });
                break;
            }
        }
    }
    assert_eq!(held.len(), 16);
    let collections = pool.stats().collections;
    assert_eq!(
        pool.allocate(64, 16),
        Err(PoolError::Exhausted { requested: 64 })
    );
    assert_eq!(pool.stats().collections, collections + 1);
    assert_conserved(&pool);

    let freed = held.pop().unwrap();
    pool.release(freed);
    let block = pool.allocate(64, 16).unwrap();
    assert_eq!(block.size(), 64);
    assert_conserved(&pool);
}

#[test]
fn fragmented_pool_recovers_after_collection() {
    let mut pool = TextPool::new(PoolConfig {
        arena_size: 1024,
        max_arenas: Some(1),
    });
    let held: Vec<_> = (0..16).map(|_| pool.allocate(64, 16).unwrap()).collect();
    // Free every block: sixteen adjacent 64-byte ranges, none big enough alone.
    for block in held {
        pool.release(block);
    }
    assert_eq!(pool.largest_free(), 64);
    let block = pool.allocate(512, 16).unwrap();
    assert_eq!(block.size(), 512);
    assert_eq!(pool.stats().arenas, 1);
    assert_conserved(&pool);
}
