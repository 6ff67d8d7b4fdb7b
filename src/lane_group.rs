//! Lockstep Lane Group on CPU Threads
//!
//! [`LaneGroup`] hosts `W` lanes as the `W` worker threads of a dedicated rayon
//! pool. A lane program is broadcast to every worker, so each lane runs the same
//! code with its own private locals, just like the lanes of a GPU warp.
//!
//! ## Interconnect
//!
//! Each lane owns one slot in the interconnect. An exchange round is:
//!
//! 1. publish a copy of the register into the lane's own slot
//! 2. wait on the group barrier
//! 3. read the partner's slot
//! 4. wait on the group barrier again, so no slot is overwritten before every
//!    lane has read it
//!
//! Every lane clears its own slot once the round is over, so no register
//! outlives the round it was sent in.
//!
//! A lane program that panics poisons the barrier. Lanes waiting on it, and
//! lanes that reach it later, panic as well, and `run` re-raises the panic on
//! the calling thread. A lane that returns while the others are still
//! exchanging poisons the barrier the same way. The next `run` starts from a
//! clean barrier.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, trace, warn};
use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::error::{LaneError, Result};
use crate::lane::{is_supported_width, LaneExchange, Register};
use crate::warp_sort::{self, Payload};

type Slot = Mutex<Option<Box<dyn Any + Send>>>;

const POISONED: &str = "lane group poisoned: another lane panicked or left before its peers";

#[derive(Default)]
struct BarrierState {
    arrived: usize,
    departed: usize,
    generation: u64,
    poisoned: bool,
}

/// Generation barrier that a failing lane can poison.
struct LaneBarrier {
    width: usize,
    state: Mutex<BarrierState>,
    condvar: Condvar,
}

impl LaneBarrier {
    fn new(width: usize) -> Self {
        LaneBarrier {
            width,
            state: Mutex::new(BarrierState::default()),
            condvar: Condvar::new(),
        }
    }

    /// Block until every lane has arrived. Returns `true` on exactly one lane.
    ///
    /// Panics if the barrier is or becomes poisoned.
    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        if state.poisoned || state.departed > 0 {
            state.poisoned = true;
            self.condvar.notify_all();
            drop(state);
            panic!("{}", POISONED);
        }

        let generation = state.generation;
        state.arrived += 1;
        if state.arrived == self.width {
            state.arrived = 0;
            state.generation = generation.wrapping_add(1);
            self.condvar.notify_all();
            return true;
        }

        while state.generation == generation && !state.poisoned {
            self.condvar.wait(&mut state);
        }
        if state.generation == generation {
            drop(state);
            panic!("{}", POISONED);
        }
        false
    }

    /// Record that a lane program returned. Lanes still waiting can never be
    /// released, so they are woken into a panic.
    fn depart(&self) {
        let mut state = self.state.lock();
        state.departed += 1;
        if state.arrived > 0 {
            state.poisoned = true;
            self.condvar.notify_all();
        }
    }

    fn poison(&self) {
        let mut state = self.state.lock();
        state.poisoned = true;
        self.condvar.notify_all();
    }

    fn is_poisoned(&self) -> bool {
        self.state.lock().poisoned
    }

    fn reset(&self) {
        let mut state = self.state.lock();
        state.arrived = 0;
        state.departed = 0;
        state.poisoned = false;
    }
}

struct Interconnect {
    slots: Vec<Slot>,
    barrier: LaneBarrier,
    rounds: AtomicU64,
}

impl Interconnect {
    fn new(width: usize) -> Self {
        Interconnect {
            slots: (0..width).map(|_| Mutex::new(None)).collect(),
            barrier: LaneBarrier::new(width),
            rounds: AtomicU64::new(0),
        }
    }

    fn reset(&self) {
        self.barrier.reset();
        for slot in &self.slots {
            slot.lock().take();
        }
    }
}

/// A group of `W` lanes executing lane programs in lockstep.
pub struct LaneGroup<const W: usize> {
    pool: ThreadPool,
    interconnect: Interconnect,
    run_lock: Mutex<()>,
}

impl<const W: usize> LaneGroup<W> {
    const WIDTH_CHECK: () = assert!(
        is_supported_width(W),
        "lane group width must be a power of two no larger than MAX_WIDTH"
    );

    /// Start the lane threads.
    pub fn new() -> Result<Self> {
        #[allow(clippy::let_unit_value)]
        let () = Self::WIDTH_CHECK;

        let pool = ThreadPoolBuilder::new()
            .num_threads(W)
            .thread_name(|index| format!("lane-{}", index))
            .build()?;
        debug!("Started lane group with {} lanes", W);

        Ok(LaneGroup {
            pool,
            interconnect: Interconnect::new(W),
            run_lock: Mutex::new(()),
        })
    }

    /// Number of lanes in the group.
    pub const fn width(&self) -> usize {
        W
    }

    /// Run `program` once on every lane and collect the results in lane order.
    ///
    /// Calls from different threads are serialized; rounds of two programs
    /// never interleave.
    ///
    /// # Panics
    ///
    /// If any lane panics, every lane stops at its next exchange and the panic
    /// is propagated to the caller once all lanes have unwound. The group can
    /// run again afterwards.
    pub fn run<R, F>(&self, program: F) -> Vec<R>
    where
        F: Fn(&Lane<'_, W>) -> R + Sync,
        R: Send,
    {
        let _running = self.run_lock.lock();
        trace!("Broadcasting lane program to {} lanes", W);

        let interconnect = &self.interconnect;
        interconnect.reset();
        self.pool.broadcast(|ctx| {
            let lane = Lane {
                id: ctx.index(),
                interconnect,
            };
            match panic::catch_unwind(AssertUnwindSafe(|| program(&lane))) {
                Ok(result) => {
                    interconnect.barrier.depart();
                    result
                }
                Err(payload) => {
                    if !interconnect.barrier.is_poisoned() {
                        warn!("Lane {} of {} panicked, poisoning the group", lane.id, W);
                    }
                    interconnect.barrier.poison();
                    panic::resume_unwind(payload)
                }
            }
        })
    }

    /// Synchronized exchange rounds completed since creation or the last reset.
    pub fn exchange_rounds(&self) -> u64 {
        self.interconnect.rounds.load(Ordering::Relaxed)
    }

    pub fn reset_rounds(&self) {
        self.interconnect.rounds.store(0, Ordering::Relaxed);
    }

    /// Sort one key per lane; `keys[i]` is the register of lane `i`.
    pub fn sort_keys<K, F>(&self, keys: &mut [K; W], less: F)
    where
        K: Register + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        let input = &*keys;
        let sorted = self.run(|lane| {
            let mut key = input[lane.lane_id()].clone();
            warp_sort::sort_keys(lane, &mut key, &less);
            key
        });
        for (slot, key) in keys.iter_mut().zip(sorted) {
            *slot = key;
        }
    }

    /// Sort one key/value pair per lane, choosing the exchange strategy from
    /// the payload size.
    pub fn sort_pairs<K, V, F>(&self, keys: &mut [K; W], values: &mut [V; W], less: F)
    where
        K: Register + Sync,
        V: Payload + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        self.sort_pairs_with(keys, values, |lane, key, value| {
            warp_sort::sort_pairs(lane, key, value, &less)
        });
    }

    /// Like [`sort_pairs`](Self::sort_pairs), always exchanging the values themselves.
    pub fn sort_pairs_direct<K, V, F>(&self, keys: &mut [K; W], values: &mut [V; W], less: F)
    where
        K: Register + Sync,
        V: Register + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        self.sort_pairs_with(keys, values, |lane, key, value| {
            warp_sort::sort_pairs_direct(lane, key, value, &less)
        });
    }

    /// Like [`sort_pairs`](Self::sort_pairs), always sorting lane indices and
    /// gathering the values at the end.
    pub fn sort_pairs_gathered<K, V, F>(&self, keys: &mut [K; W], values: &mut [V; W], less: F)
    where
        K: Register + Sync,
        V: Register + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        self.sort_pairs_with(keys, values, |lane, key, value| {
            warp_sort::sort_pairs_gathered(lane, key, value, &less)
        });
    }

    fn sort_pairs_with<K, V, S>(&self, keys: &mut [K; W], values: &mut [V; W], sort: S)
    where
        K: Register + Sync,
        V: Register + Sync,
        S: Fn(&Lane<'_, W>, &mut K, &mut V) + Sync,
    {
        let (key_input, value_input) = (&*keys, &*values);
        let sorted = self.run(|lane| {
            let id = lane.lane_id();
            let mut key = key_input[id].clone();
            let mut value = value_input[id].clone();
            sort(lane, &mut key, &mut value);
            (key, value)
        });
        for ((key_slot, value_slot), (key, value)) in
            keys.iter_mut().zip(values.iter_mut()).zip(sorted)
        {
            *key_slot = key;
            *value_slot = value;
        }
    }

    /// Slice form of [`sort_keys`](Self::sort_keys). The slice must hold
    /// exactly one key per lane.
    pub fn sort_keys_slice<K, F>(&self, keys: &mut [K], less: F) -> Result<()>
    where
        K: Register + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        let keys = lanes_mut::<K, W>(keys)?;
        self.sort_keys(keys, less);
        Ok(())
    }

    /// Slice form of [`sort_pairs`](Self::sort_pairs).
    pub fn sort_pairs_slice<K, V, F>(&self, keys: &mut [K], values: &mut [V], less: F) -> Result<()>
    where
        K: Register + Sync,
        V: Payload + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        let keys = lanes_mut::<K, W>(keys)?;
        let values = lanes_mut::<V, W>(values)?;
        self.sort_pairs(keys, values, less);
        Ok(())
    }

    /// Sort every aligned segment of `S` lanes independently.
    ///
    /// All `W` lanes still take part in every round; segment lanes only ever
    /// exchange with lanes of their own segment.
    pub fn sort_segments<const S: usize, K, F>(&self, keys: &mut [K; W], less: F)
    where
        K: Register + Sync,
        F: Fn(&K, &K) -> bool + Sync,
    {
        let input = &*keys;
        let sorted = self.run(|lane| {
            let mut key = input[lane.lane_id()].clone();
            warp_sort::sort_keys(&lane.segment::<S>(), &mut key, &less);
            key
        });
        for (slot, key) in keys.iter_mut().zip(sorted) {
            *slot = key;
        }
    }
}

impl<const W: usize> fmt::Debug for LaneGroup<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LaneGroup")
            .field("width", &W)
            .field("exchange_rounds", &self.exchange_rounds())
            .finish()
    }
}

fn lanes_mut<T, const W: usize>(items: &mut [T]) -> Result<&mut [T; W]> {
    let actual = items.len();
    items.try_into().map_err(|_| LaneError::LengthMismatch {
        expected: W,
        actual,
    })
}

/// The view a lane program has of its own lane.
#[derive(Clone, Copy)]
pub struct Lane<'g, const W: usize> {
    id: usize,
    interconnect: &'g Interconnect,
}

impl<'g, const W: usize> Lane<'g, W> {
    /// View this lane as a member of its aligned segment of `S` lanes.
    pub fn segment<const S: usize>(&self) -> Segment<'g, W, S> {
        #[allow(clippy::let_unit_value)]
        let () = Segment::<'g, W, S>::SEGMENT_CHECK;
        Segment { lane: *self }
    }

    fn exchange<T: Register>(&self, value: &T, src_lane: usize) -> T {
        let interconnect = self.interconnect;

        *interconnect.slots[self.id].lock() = Some(Box::new(value.clone()));
        interconnect.barrier.wait();

        let received = {
            let slot = interconnect.slots[src_lane].lock();
            match slot.as_ref().and_then(|boxed| (**boxed).downcast_ref::<T>()) {
                Some(register) => register.clone(),
                None => panic!(
                    "lane {} read a register of another type from lane {} in the same round",
                    self.id, src_lane
                ),
            }
        };

        if interconnect.barrier.wait() {
            interconnect.rounds.fetch_add(1, Ordering::Relaxed);
        }
        interconnect.slots[self.id].lock().take();
        received
    }
}

impl<const W: usize> LaneExchange for Lane<'_, W> {
    const WIDTH: usize = W;

    #[inline]
    fn lane_id(&self) -> usize {
        self.id
    }

    #[inline]
    fn shuffle_xor<T: Register>(&self, value: &T, mask: usize) -> T {
        self.exchange(value, self.id ^ mask)
    }

    #[inline]
    fn shuffle<T: Register>(&self, value: &T, src_lane: usize) -> T {
        self.exchange(value, src_lane)
    }
}

/// A lane seen as part of a logical group of `S` lanes inside a group of `W`.
///
/// Lane ids and indexed shuffles are relative to the segment.
#[derive(Clone, Copy)]
pub struct Segment<'g, const W: usize, const S: usize> {
    lane: Lane<'g, W>,
}

impl<const W: usize, const S: usize> Segment<'_, W, S> {
    const SEGMENT_CHECK: () = assert!(
        S.is_power_of_two() && S <= W,
        "segment width must be a power of two no larger than the group"
    );

    #[inline]
    fn base(&self) -> usize {
        self.lane.id & !(S - 1)
    }
}

impl<const W: usize, const S: usize> LaneExchange for Segment<'_, W, S> {
    const WIDTH: usize = S;

    #[inline]
    fn lane_id(&self) -> usize {
        self.lane.id & (S - 1)
    }

    #[inline]
    fn shuffle_xor<T: Register>(&self, value: &T, mask: usize) -> T {
        self.lane.shuffle_xor(value, mask & (S - 1))
    }

    #[inline]
    fn shuffle<T: Register>(&self, value: &T, src_lane: usize) -> T {
        self.lane.exchange(value, self.base() + (src_lane & (S - 1)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use std::sync::Arc;

    #[test]
    fn test_run_collects_in_lane_order() {
        let group = LaneGroup::<8>::new().unwrap();
        let ids = group.run(|lane| lane.lane_id());
        assert_eq!(ids, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_shuffle_xor_reads_partner() {
        let group = LaneGroup::<8>::new().unwrap();
        let received = group.run(|lane| lane.shuffle_xor(&(lane.lane_id() * 10), 3));
        let expected: Vec<usize> = (0..8).map(|id| (id ^ 3) * 10).collect();
        assert_eq!(received, expected);
    }

    #[test]
    fn test_shuffle_reads_indexed_lane() {
        let group = LaneGroup::<4>::new().unwrap();
        let received = group.run(|lane| {
            let value = format!("lane {}", lane.lane_id());
            lane.shuffle(&value, 3 - lane.lane_id())
        });
        assert_eq!(received, vec!["lane 3", "lane 2", "lane 1", "lane 0"]);
    }

    #[test]
    fn test_consecutive_rounds_do_not_mix() {
        let group = LaneGroup::<16>::new().unwrap();
        group.reset_rounds();
        let received = group.run(|lane| {
            let mut value = lane.lane_id() as u64;
            for mask in [1, 2, 4, 8] {
                value = lane.shuffle_xor(&value, mask);
            }
            value
        });
        // Four shuffles with masks 1, 2, 4, 8 read lane id ^ 15.
        let expected: Vec<u64> = (0..16).map(|id| id ^ 15).collect();
        assert_eq!(received, expected);
        assert_eq!(group.exchange_rounds(), 4);
    }

    #[test]
    fn test_reset_rounds() {
        let group = LaneGroup::<2>::new().unwrap();
        group.run(|lane| lane.shuffle_xor(&1u8, 1));
        assert_eq!(group.exchange_rounds(), 1);
        group.reset_rounds();
        assert_eq!(group.exchange_rounds(), 0);
    }

    #[test]
    fn test_single_lane_group() {
        let group = LaneGroup::<1>::new().unwrap();
        let mut keys = [42u32];
        group.sort_keys(&mut keys, |a, b| a < b);
        assert_eq!(keys, [42]);
        assert_eq!(group.exchange_rounds(), 0);
    }

    #[test]
    fn test_segment_ids_and_shuffles() {
        let group = LaneGroup::<8>::new().unwrap();
        let seen = group.run(|lane| {
            let segment = lane.segment::<4>();
            let own = lane.lane_id();
            let from_first = segment.shuffle(&own, 0);
            (segment.lane_id(), from_first)
        });
        assert_eq!(
            seen,
            vec![(0, 0), (1, 0), (2, 0), (3, 0), (0, 4), (1, 4), (2, 4), (3, 4)]
        );
    }

    #[test]
    fn test_sort_segments() {
        let group = LaneGroup::<16>::new().unwrap();
        let mut rng = rand::thread_rng();
        let mut keys: [u32; 16] = std::array::from_fn(|i| i as u32);
        keys.shuffle(&mut rng);
        let mut expected = keys;
        for segment in expected.chunks_mut(4) {
            segment.sort_unstable();
        }

        group.sort_segments::<4, _, _>(&mut keys, |a, b| a < b);
        assert_eq!(keys, expected);
    }

    #[test]
    fn test_sort_keys_slice_length_mismatch() {
        let group = LaneGroup::<4>::new().unwrap();
        let mut keys = vec![3u32, 1, 2];
        let err = group.sort_keys_slice(&mut keys, |a, b| a < b).unwrap_err();
        assert!(matches!(
            err,
            LaneError::LengthMismatch {
                expected: 4,
                actual: 3
            }
        ));
        assert_eq!(keys, vec![3, 1, 2]);
    }

    #[test]
    fn test_sort_pairs_slice_checks_values() {
        let group = LaneGroup::<4>::new().unwrap();
        let mut keys = vec![3u32, 1, 2, 0];
        let mut values = vec![0u8; 5];
        let err = group
            .sort_pairs_slice(&mut keys, &mut values, |a, b| a < b)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "expected one element per lane (4 lanes), got 5"
        );
    }

    #[test]
    fn test_sort_keys_slice() {
        let group = LaneGroup::<8>::new().unwrap();
        let mut keys: Vec<i64> = vec![5, -3, 8, 0, -9, 2, 7, 1];
        group.sort_keys_slice(&mut keys, |a, b| a < b).unwrap();
        assert_eq!(keys, vec![-9, -3, 0, 1, 2, 5, 7, 8]);
    }

    #[test]
    fn test_concurrent_runs_are_serialized() {
        let group = LaneGroup::<8>::new().unwrap();
        std::thread::scope(|scope| {
            for offset in 0..4u32 {
                let group = &group;
                scope.spawn(move || {
                    for _ in 0..20 {
                        let mut keys: [u32; 8] =
                            std::array::from_fn(|i| (7 - i as u32) * 4 + offset);
                        group.sort_keys(&mut keys, |a, b| a < b);
                        let expected: [u32; 8] = std::array::from_fn(|i| i as u32 * 4 + offset);
                        assert_eq!(keys, expected);
                    }
                });
            }
        });
    }

    #[test]
    #[should_panic]
    fn test_mismatched_register_types_panic() {
        let group = LaneGroup::<4>::new().unwrap();
        group.run(|lane| {
            if lane.lane_id() == 0 {
                lane.shuffle_xor(&1u32, 1);
            } else {
                lane.shuffle_xor(&1u64, 1);
            }
        });
    }

    #[test]
    fn test_panicking_comparator_releases_the_group() {
        let group = LaneGroup::<4>::new().unwrap();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            let mut keys = [f64::NAN, 1.0, 2.0, 3.0];
            group.sort_keys(&mut keys, |a, b| {
                a.partial_cmp(b).unwrap() == std::cmp::Ordering::Less
            });
        }));
        assert!(outcome.is_err());

        let mut keys = [3.0, 1.0, 4.0, 2.0];
        group.sort_keys(&mut keys, |a: &f64, b: &f64| a < b);
        assert_eq!(keys, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_lane_returning_early_poisons_the_round() {
        let group = LaneGroup::<4>::new().unwrap();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            group.run(|lane| {
                if lane.lane_id() != 3 {
                    lane.shuffle_xor(&lane.lane_id(), 1);
                }
            })
        }));
        assert!(outcome.is_err());

        let received = group.run(|lane| lane.shuffle_xor(&lane.lane_id(), 2));
        assert_eq!(received, vec![2, 3, 0, 1]);
    }

    #[test]
    fn test_slots_released_after_run() {
        let group = LaneGroup::<8>::new().unwrap();
        let mut keys = [5u8, 3, 7, 1, 0, 6, 2, 4];
        let mut values: [Arc<String>; 8] =
            std::array::from_fn(|i| Arc::new(format!("value-{}", i)));
        group.sort_pairs_direct(&mut keys, &mut values, |a, b| a < b);

        assert_eq!(keys, [0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(*values[0], "value-4");
        assert!(values.iter().all(|value| Arc::strong_count(value) == 1));
        assert!(group
            .interconnect
            .slots
            .iter()
            .all(|slot| slot.lock().is_none()));
    }

    #[test]
    fn test_debug_format() {
        let group = LaneGroup::<2>::new().unwrap();
        let text = format!("{:?}", group);
        assert!(text.contains("width: 2"));
    }
}
