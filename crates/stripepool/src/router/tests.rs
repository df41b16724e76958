use crate::{KeyRouter, RoundRobinCursor, RoundRobinRouter, Router, RoutingKey};
use core::num::NonZeroUsize;
use std::collections::HashSet;
use std::thread;

fn n(value: usize) -> NonZeroUsize {
    NonZeroUsize::new(value).unwrap()
}

#[test]
fn key_seven_over_four_stripes_is_three() {
    let router = KeyRouter::new(n(4));
    assert!(router.is_masked());
    for _ in 0..10 {
        assert_eq!(router.route(7), 3);
    }
}

#[test]
fn non_power_of_two_uses_modulo() {
    let router = KeyRouter::new(n(3));
    assert!(!router.is_masked());

    let hits: Vec<usize> = (0..6).map(|key| router.route(key)).collect();
    assert_eq!(hits, vec![0, 1, 2, 0, 1, 2]);
    assert_eq!(router.route(u64::MAX), (u64::MAX % 3) as usize);
}

#[test]
fn key_routing_is_pure() {
    let a = KeyRouter::new(n(5));
    let b = KeyRouter::new(n(5));
    for key in [0_u64, 1, 4, 5, 99, 1 << 40, u64::MAX] {
        assert_eq!(a.route(key), a.route(key));
        assert_eq!(a.route(key), b.route(key));
        assert!(a.route(key) < 5);
    }
}

#[test]
fn key_router_refuses_unkeyed() {
    assert_eq!(KeyRouter::new(n(2)).route_unkeyed(), None);
}

#[test]
fn single_stripe_routes_everything_to_zero() {
    let key = KeyRouter::new(n(1));
    let rr = RoundRobinRouter::new(n(1));
    for k in 0..8 {
        assert_eq!(key.route(k), 0);
        assert_eq!(rr.route(k), 0);
    }
}

#[test]
fn fresh_cursor_visits_each_index_once() {
    let router = RoundRobinRouter::new(n(5));
    let first: Vec<usize> = (0..5).map(|_| router.route_unkeyed().unwrap()).collect();
    assert_eq!(first, vec![0, 1, 2, 3, 4]);

    // Then wraps around.
    assert_eq!(router.next(), 0);
}

#[test]
fn round_robin_ignores_key() {
    let router = RoundRobinRouter::new(n(3));
    assert_eq!(router.route(7), 0);
    assert_eq!(router.route(7), 1);
    assert_eq!(router.route(7), 2);
}

#[test]
fn cursor_stays_in_range_and_fair_under_contention() {
    const THREADS: usize = 8;
    const CALLS: usize = 3_000;
    const STRIPES: usize = 6;

    let cursor = RoundRobinCursor::new(n(STRIPES));
    let counts: Vec<Vec<usize>> = thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                s.spawn(|| {
                    let mut counts = vec![0; STRIPES];
                    for _ in 0..CALLS {
                        let index = cursor.next();
                        assert!(index < STRIPES);
                        counts[index] += 1;
                    }
                    counts
                })
            })
            .collect();
        workers.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let mut totals = vec![0; STRIPES];
    for worker in &counts {
        for (total, count) in totals.iter_mut().zip(worker) {
            *total += count;
        }
    }

    // Every call advanced the cursor exactly once, so the grand total is an
    // exact multiple of the stripe count and splits evenly.
    assert_eq!(totals.iter().sum::<usize>(), THREADS * CALLS);
    let expected = THREADS * CALLS / STRIPES;
    assert!(totals.iter().all(|&total| total == expected), "{totals:?}");
}

#[test]
fn signed_and_string_keys_are_stable() {
    assert_eq!((-1_i64).routing_key(), u64::MAX);
    assert_eq!(7_i32.routing_key(), 7);
    assert_eq!("order-42".routing_key(), String::from("order-42").routing_key());
    assert_eq!((&&"order-42").routing_key(), "order-42".routing_key());

    // FNV-1a of the empty input is the offset basis.
    assert_eq!("".routing_key(), 0xcbf2_9ce4_8422_2325);

    let spread: HashSet<usize> = (0..64)
        .map(|i| KeyRouter::new(n(4)).route(format!("user-{i}").routing_key()))
        .collect();
    assert_eq!(spread.len(), 4);
}
