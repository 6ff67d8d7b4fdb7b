//! Serial Bitonic Network
//!
//! Replays the lane network's schedule over an indexable slice, one element per
//! lane position. Every step performs the same comparisons the lanes perform,
//! so equal keys end up in exactly the same positions as on a lane group.
//! This makes it both a test oracle for the lane implementation and a
//! single-threaded baseline for benchmarks.
//!
//! Complexity: `n/2 * log2(n) * (log2(n) + 1) / 2` compare-exchanges

use std::cmp::Ordering;

use crate::bitonic::active_steps;
use crate::lane::is_supported_width;

/// Work done by one run of the network.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetworkStats {
    /// Synchronized rounds (schedule steps) executed.
    pub rounds: usize,
    /// Pairwise compare-exchange operations executed.
    pub compare_exchanges: usize,
}

/// Sort a slice in-place using the lane network's schedule.
///
/// # Arguments
/// * `data` - One element per lane position; the length must be a supported
///   group width (power of 2, at most `MAX_WIDTH`)
/// * `less` - Strict weak ordering
pub fn sort_by<T, F>(data: &mut [T], less: F) -> NetworkStats
where
    F: Fn(&T, &T) -> bool,
{
    run_network(data.len(), |i, partner, take_greater| {
        if should_swap(&data[i], &data[partner], take_greater, &less) {
            data.swap(i, partner);
        }
    })
}

/// Sort keys and values in-place, swapping each value along with its key.
///
/// # Panics
/// If `keys` and `values` differ in length.
pub fn sort_pairs_by<K, V, F>(keys: &mut [K], values: &mut [V], less: F) -> NetworkStats
where
    F: Fn(&K, &K) -> bool,
{
    assert_eq!(
        keys.len(),
        values.len(),
        "Keys and values must have the same length"
    );
    run_network(keys.len(), |i, partner, take_greater| {
        if should_swap(&keys[i], &keys[partner], take_greater, &less) {
            keys.swap(i, partner);
            values.swap(i, partner);
        }
    })
}

fn run_network<C>(width: usize, mut compare_exchange: C) -> NetworkStats
where
    C: FnMut(usize, usize, bool),
{
    check_width(width);
    let mut stats = NetworkStats::default();

    for step in active_steps(width) {
        for i in 0..width {
            let partner = i ^ step.mask;
            // Each pair is visited once, from its lower index.
            if partner > i {
                compare_exchange(i, partner, step.take_greater(i));
                stats.compare_exchanges += 1;
            }
        }
        stats.rounds += 1;
    }
    stats
}

/// Lane `i` holding `own` swaps with its partner holding `other` exactly when
/// the lane program would adopt the partner's register.
#[inline]
fn should_swap<T, F>(own: &T, other: &T, take_greater: bool, less: &F) -> bool
where
    F: Fn(&T, &T) -> bool,
{
    if take_greater {
        less(own, other)
    } else {
        less(other, own)
    }
}

fn check_width(width: usize) {
    assert!(
        is_supported_width(width),
        "Lane network requires a power of 2 length up to MAX_WIDTH, got {}",
        width
    );
}

/// Adapt a `less` predicate to an [`Ordering`] comparator.
#[inline]
pub fn ordering_from_less<T, F>(less: &F) -> impl Fn(&T, &T) -> Ordering + '_
where
    F: Fn(&T, &T) -> bool,
{
    move |a: &T, b: &T| {
        if less(a, b) {
            Ordering::Less
        } else if less(b, a) {
            Ordering::Greater
        } else {
            Ordering::Equal
        }
    }
}
