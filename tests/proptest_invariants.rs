//! Property-based tests for merge, cache and queue invariants.
//!
//! Run with: `cargo test --test proptest_invariants`

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;

use offline_sync::cache::{CacheStore, EvictionStrategy, Priority, SetOptions};
use offline_sync::clock::ManualClock;
use offline_sync::config::CacheConfig;
use offline_sync::model::{Achievement, LearningProgress, UserProfile, VocabularyProgress};
use offline_sync::sync::merge::{merge_profiles, merge_progress};
use offline_sync::sync::{SyncPayload, SyncQueue, SyncQueueItem, UserContent};

// =============================================================================
// Strategies
// =============================================================================

fn achievements_strategy() -> impl Strategy<Value = Vec<Achievement>> {
    prop::collection::vec(("[a-f]", 0i64..50), 0..6).prop_map(|pairs| {
        pairs
            .into_iter()
            .map(|(id, at)| Achievement {
                title: format!("Title {}", id),
                id,
                unlocked_at: at,
            })
            .collect()
    })
}

fn profile_strategy() -> impl Strategy<Value = UserProfile> {
    (achievements_strategy(), 0i64..100).prop_map(|(achievements, updated)| {
        let mut profile = UserProfile::new("learner");
        for a in achievements {
            profile.unlock(a);
        }
        profile.last_updated = updated;
        profile
    })
}

fn word_strategy() -> impl Strategy<Value = VocabularyProgress> {
    (
        "[a-d]",
        0u32..60,
        1.3f64..3.0,
        0u32..20,
        0i64..1_000_000,
        0.0f64..1.0,
    )
        .prop_map(|(word, interval, ease, reps, next, mastery)| {
            let mut p = VocabularyProgress::new(word);
            p.interval_days = interval;
            p.ease_factor = ease;
            p.repetitions = reps;
            p.next_review = next;
            p.mastery_level = mastery;
            p
        })
}

fn progress_strategy() -> impl Strategy<Value = LearningProgress> {
    prop::collection::vec(word_strategy(), 0..6).prop_map(|words| {
        let mut progress = LearningProgress::new("learner");
        for w in words {
            progress.upsert_word(w);
        }
        progress
    })
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: u8, len: usize, priority: u8 },
    Get { key: u8 },
    Delete { key: u8 },
    Advance { ms: u64 },
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (0u8..12, 0usize..400, 0u8..4)
            .prop_map(|(key, len, priority)| CacheOp::Set { key, len, priority }),
        2 => (0u8..12).prop_map(|key| CacheOp::Get { key }),
        1 => (0u8..12).prop_map(|key| CacheOp::Delete { key }),
        1 => (0u64..2_000).prop_map(|ms| CacheOp::Advance { ms }),
    ]
}

fn strategy_strategy() -> impl Strategy<Value = EvictionStrategy> {
    prop_oneof![
        Just(EvictionStrategy::Lru),
        Just(EvictionStrategy::Lfu),
        Just(EvictionStrategy::Fifo),
        Just(EvictionStrategy::Priority),
        Just(EvictionStrategy::Smart),
    ]
}

fn priority_of(n: u8) -> Priority {
    match n {
        0 => Priority::Low,
        1 => Priority::Medium,
        2 => Priority::High,
        _ => Priority::Critical,
    }
}

// =============================================================================
// Merge properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(128))]

    #[test]
    fn prop_achievement_merge_is_commutative_union(a in profile_strategy(), b in profile_strategy()) {
        let ab = merge_profiles(&a, &b);
        let ba = merge_profiles(&b, &a);
        prop_assert_eq!(&ab.achievements, &ba.achievements);

        let expected: BTreeSet<&str> = a
            .achievement_ids()
            .into_iter()
            .chain(b.achievement_ids())
            .collect();
        let merged: BTreeSet<&str> = ab.achievement_ids().into_iter().collect();
        prop_assert_eq!(merged, expected);
    }

    #[test]
    fn prop_profile_merge_is_idempotent(a in profile_strategy(), b in profile_strategy()) {
        let once = merge_profiles(&a, &b);
        let twice = merge_profiles(&once, &b);
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn prop_srs_state_never_regresses(a in progress_strategy(), b in progress_strategy()) {
        let merged = merge_progress(&a, &b);
        for side in [&a, &b] {
            for (word, ours) in &side.vocabulary {
                let m = &merged.vocabulary[word];
                prop_assert!(m.interval_days >= ours.interval_days);
                prop_assert!(m.repetitions >= ours.repetitions);
                prop_assert!(m.ease_factor >= ours.ease_factor);
                prop_assert!(m.next_review >= ours.next_review);
                prop_assert!(m.mastery_level >= ours.mastery_level);
            }
        }
        prop_assert_eq!(merge_progress(&b, &a), merged);
    }
}

// =============================================================================
// Cache and queue properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_cache_stays_within_budget(
        strategy in strategy_strategy(),
        ops in prop::collection::vec(cache_op_strategy(), 1..80),
    ) {
        let clock = Arc::new(ManualClock::new(0));
        let config = CacheConfig {
            max_items: 5,
            max_size_bytes: 1_000,
            default_ttl_ms: 60_000,
            strategy,
            ..Default::default()
        };
        let store: CacheStore<String> = CacheStore::new("prop", config, clock.clone());

        for op in ops {
            match op {
                CacheOp::Set { key, len, priority } => {
                    store.set(
                        &format!("k{}", key),
                        "x".repeat(len),
                        SetOptions::default().priority(priority_of(priority)),
                    );
                }
                CacheOp::Get { key } => {
                    store.get(&format!("k{}", key));
                }
                CacheOp::Delete { key } => {
                    store.delete(&format!("k{}", key));
                }
                CacheOp::Advance { ms } => clock.advance(Duration::from_millis(ms)),
            }
            let stats = store.stats();
            prop_assert!(stats.total_items <= 5);
            prop_assert!(stats.total_size_bytes <= 1_000);
            prop_assert_eq!(stats.total_items, store.len());
        }
    }

    #[test]
    fn prop_entries_expire_after_ttl(ttl_ms in 1u64..10_000, extra in 1u64..10_000) {
        let clock = Arc::new(ManualClock::new(1_000));
        let store: CacheStore<u32> = CacheStore::new("ttl", CacheConfig::default(), clock.clone());
        store.set("k", 7, SetOptions::default().ttl(Duration::from_millis(ttl_ms)));

        clock.advance(Duration::from_millis(ttl_ms - 1));
        prop_assert_eq!(store.get("k"), Some(7));

        clock.advance(Duration::from_millis(extra + 1));
        prop_assert_eq!(store.get("k"), None);
        prop_assert!(!store.has("k"));
    }

    #[test]
    fn prop_queue_order_and_bound(
        entries in prop::collection::vec((0u32..5, 0i64..1_000), 1..40),
        max_size in 1usize..20,
    ) {
        let queue = SyncQueue::new(max_size);
        for (i, (priority, created_at)) in entries.iter().enumerate() {
            let item = SyncQueueItem::new(
                SyncPayload::UserContent(UserContent {
                    content_id: format!("c{}", i),
                    content_type: "note".into(),
                    body: format!("body {}", i),
                    updated_at: *created_at,
                }),
                *priority,
                *created_at,
            )
            .unwrap();
            queue.enqueue(item);
        }

        let items = queue.items();
        prop_assert!(items.len() <= max_size);
        for pair in items.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            prop_assert!(
                a.priority > b.priority
                    || (a.priority == b.priority && a.created_at <= b.created_at)
            );
        }
    }
}
