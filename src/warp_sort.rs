//! Per-Lane Sort Entry Points
//!
//! These functions are lane programs: every lane of a group calls the same
//! function in lockstep, passing its own key (and value). When all lanes
//! return, reading the keys in lane order gives the sequence ordered by `less`.
//!
//! ## Payload strategies
//!
//! - **Direct**: the value rides along with its key through every round.
//!   Used when the value fits the native exchange width.
//! - **Gathered**: the network carries the source lane index instead of the
//!   value, and a single indexed shuffle at the end fetches each lane's value
//!   from where it started. Many cheap exchanges plus one expensive one beat
//!   many expensive ones for large values.
//!
//! ## Preconditions
//!
//! - Every lane of the group makes the same call.
//! - `less` is a strict weak ordering. Equal keys end up in an unspecified
//!   order; the sort is not stable.

use std::mem;

use crate::bitonic::bitonic_sort;
use crate::compare_exchange::{KeyRegister, PairRegister};
use crate::lane::{is_supported_width, LaneExchange, Register};

/// Largest value size exchanged directly, in bytes.
pub const NATIVE_EXCHANGE_BYTES: usize = mem::size_of::<u32>();

/// Values a pair sort can carry, with the strategy picked for them.
pub trait Payload: Register {
    /// Whether the value is exchanged directly rather than gathered by index.
    const INLINE: bool = mem::size_of::<Self>() <= NATIVE_EXCHANGE_BYTES;
}

impl<T: Register> Payload for T {}

/// Scratch storage handle. This sort needs none; the handle exists so callers
/// can treat it like the sorts that do.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EmptyStorage;

/// Sort keys across the group.
pub fn sort_keys<L, K, F>(lane: &L, key: &mut K, less: F)
where
    L: LaneExchange,
    K: Register,
    F: Fn(&K, &K) -> bool,
{
    const {
        assert!(
            is_supported_width(L::WIDTH),
            "group width must be a power of two no larger than MAX_WIDTH"
        )
    };

    let mut regs = KeyRegister(key.clone());
    bitonic_sort(lane, &mut regs, &less);
    *key = regs.0;
}

/// [`sort_keys`] taking a scratch storage handle, which is ignored.
pub fn sort_keys_with_storage<L, K, F>(lane: &L, key: &mut K, _storage: &mut EmptyStorage, less: F)
where
    L: LaneExchange,
    K: Register,
    F: Fn(&K, &K) -> bool,
{
    sort_keys(lane, key, less);
}

/// Sort key/value pairs across the group, exchanging values directly when
/// they are small and gathering them by index otherwise.
pub fn sort_pairs<L, K, V, F>(lane: &L, key: &mut K, value: &mut V, less: F)
where
    L: LaneExchange,
    K: Register,
    V: Payload,
    F: Fn(&K, &K) -> bool,
{
    if V::INLINE {
        sort_pairs_direct(lane, key, value, less);
    } else {
        sort_pairs_gathered(lane, key, value, less);
    }
}

/// [`sort_pairs`] taking a scratch storage handle, which is ignored.
pub fn sort_pairs_with_storage<L, K, V, F>(
    lane: &L,
    key: &mut K,
    value: &mut V,
    _storage: &mut EmptyStorage,
    less: F,
) where
    L: LaneExchange,
    K: Register,
    V: Payload,
    F: Fn(&K, &K) -> bool,
{
    sort_pairs(lane, key, value, less);
}

/// Sort pairs moving each value along with its key in every round.
pub fn sort_pairs_direct<L, K, V, F>(lane: &L, key: &mut K, value: &mut V, less: F)
where
    L: LaneExchange,
    K: Register,
    V: Register,
    F: Fn(&K, &K) -> bool,
{
    const {
        assert!(
            is_supported_width(L::WIDTH),
            "group width must be a power of two no larger than MAX_WIDTH"
        )
    };

    let mut regs = PairRegister {
        key: key.clone(),
        payload: value.clone(),
    };
    bitonic_sort(lane, &mut regs, &less);
    *key = regs.key;
    *value = regs.payload;
}

/// Sort pairs by carrying source lane indices, then gather the values.
///
/// Costs one more round than [`sort_pairs_direct`].
pub fn sort_pairs_gathered<L, K, V, F>(lane: &L, key: &mut K, value: &mut V, less: F)
where
    L: LaneExchange,
    K: Register,
    V: Register,
    F: Fn(&K, &K) -> bool,
{
    const {
        assert!(
            is_supported_width(L::WIDTH),
            "group width must be a power of two no larger than MAX_WIDTH"
        )
    };

    let mut regs = PairRegister {
        key: key.clone(),
        payload: lane.lane_id() as u32,
    };
    bitonic_sort(lane, &mut regs, &less);
    *key = regs.key;
    *value = lane.shuffle(value, regs.payload as usize);
}
