//! Compare-Exchange Step
//!
//! A single synchronized round of the network: every lane exchanges its
//! registers with the lane `mask` away and keeps either the smaller or the
//! larger of the two keys. The two lanes of a pair always compute opposite
//! `take_greater` flags, so between them they keep both keys without a
//! second round.

use crate::lane::{LaneExchange, Register};

/// The per-lane registers moved through the network in one exchange.
pub(crate) trait SortRegisters: Register {
    type Key;

    fn key(&self) -> &Self::Key;
}

/// Key-only registers.
#[derive(Debug, Clone)]
pub(crate) struct KeyRegister<K>(pub K);

impl<K: Register> SortRegisters for KeyRegister<K> {
    type Key = K;

    #[inline]
    fn key(&self) -> &K {
        &self.0
    }
}

/// Key plus a payload that follows it through every exchange. The payload is
/// either the caller's value or a lane index standing in for it.
#[derive(Debug, Clone)]
pub(crate) struct PairRegister<K, P> {
    pub key: K,
    pub payload: P,
}

impl<K: Register, P: Register> SortRegisters for PairRegister<K, P> {
    type Key = K;

    #[inline]
    fn key(&self) -> &K {
        &self.key
    }
}

/// Run one compare-exchange round.
///
/// The step only takes part in the network when `stage < L::WIDTH`; both
/// operands are constants, so for a fixed width the check folds away and an
/// out-of-range step costs nothing. That lets one schedule serve every width.
///
/// # Arguments
/// * `lane` - The calling lane
/// * `regs` - The lane's registers, overwritten with the partner's on a swap
/// * `stage` - Network stage the step belongs to
/// * `mask` - Partner distance, the partner is `lane_id ^ mask`
/// * `take_greater` - Keep the larger key of the pair instead of the smaller
/// * `less` - Strict weak ordering on keys
#[inline]
pub(crate) fn compare_exchange<L, R, F>(
    lane: &L,
    regs: &mut R,
    stage: usize,
    mask: usize,
    take_greater: bool,
    less: &F,
) where
    L: LaneExchange,
    R: SortRegisters,
    F: Fn(&R::Key, &R::Key) -> bool,
{
    if stage >= L::WIDTH {
        return;
    }

    let other = lane.shuffle_xor(regs, mask);
    let swap = if take_greater {
        less(regs.key(), other.key())
    } else {
        less(other.key(), regs.key())
    };
    if swap {
        *regs = other;
    }
}
