//! Lane Exchange Boundary
//!
//! The sorting network never touches another lane's storage directly. Everything
//! it learns about the rest of the group comes through the [`LaneExchange`] trait,
//! which mirrors the warp intrinsics a GPU execution environment provides:
//!
//! - `lane_id`: logical id of the calling lane within the group
//! - `shuffle_xor`: read the register of the lane at `id ^ mask`
//! - `shuffle`: read the register of an explicitly indexed lane
//!
//! Both shuffles are collective operations. Every lane of the group must issue
//! the same call, with matching parameters, in the same round. A lane that skips
//! a round breaks the contract for the whole group.

/// Largest group width the compiled network schedule covers.
pub const MAX_WIDTH: usize = 64;

/// Values that can travel between lanes.
///
/// A register is copied into the interconnect when it is exchanged, so the
/// sending lane keeps its own copy.
pub trait Register: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Register for T {}

/// One lane of a lockstep group of `WIDTH` lanes.
///
/// # Contract
///
/// Implementations may assume that every lane of the group calls the same
/// exchange method with the same `mask` (or a valid `src_lane`) in the same
/// round. Callers must uphold that; violating it yields unspecified results.
/// [`LaneGroup`](crate::LaneGroup) panics instead where it can tell, for
/// instance when a lane returns while its peers are still exchanging.
pub trait LaneExchange {
    /// Number of lanes in the group. Must be a power of two.
    const WIDTH: usize;

    /// Logical id of this lane, in `0..WIDTH`.
    fn lane_id(&self) -> usize;

    /// Returns the value lane `lane_id() ^ mask` passed to this same round.
    ///
    /// `mask` must be below `WIDTH`.
    fn shuffle_xor<T: Register>(&self, value: &T, mask: usize) -> T;

    /// Returns the value lane `src_lane` passed to this same round.
    ///
    /// `src_lane` must be below `WIDTH`.
    fn shuffle<T: Register>(&self, value: &T, src_lane: usize) -> T;
}

/// Extract bit `bit` of `x` (0 or 1).
#[inline]
pub const fn get_bit(x: usize, bit: u32) -> usize {
    (x >> bit) & 1
}

/// Whether `width` is a group width the network supports.
#[inline]
pub const fn is_supported_width(width: usize) -> bool {
    width.is_power_of_two() && width <= MAX_WIDTH
}
