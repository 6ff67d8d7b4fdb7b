//! Bitonic Sorting Network
//!
//! The network is a fixed table of compare-exchange steps covering every width
//! up to [`MAX_WIDTH`]. Narrower groups run the same table; steps whose stage is
//! not below the group width are skipped.
//!
//! ## Schedule
//!
//! For each run length `L = 2, 4, ..., MAX_WIDTH / 2` the network merges pairs of
//! sorted runs of length `L / 2` into sorted runs of length `L`, with masks
//! `L / 2` down to `1`. Adjacent runs are sorted in opposite directions so that
//! every pair of runs forms a bitonic sequence for the next length. The
//! direction of a lane flips with bit `log2(L)` of its id.
//!
//! Once a single bitonic run spans the group, a final pass with masks
//! `MAX_WIDTH / 2` down to `1` sorts it in the comparator's order.
//!
//! Width `W` costs `log2(W) * (log2(W) + 1) / 2` synchronized rounds.

use crate::compare_exchange::{compare_exchange, SortRegisters};
use crate::lane::{get_bit, LaneExchange, MAX_WIDTH};

const LOG2_MAX_WIDTH: usize = MAX_WIDTH.trailing_zeros() as usize;

/// Number of steps in the full schedule.
pub const SCHEDULE_LEN: usize = LOG2_MAX_WIDTH * (LOG2_MAX_WIDTH + 1) / 2;

/// How a lane decides whether it keeps the larger key of its pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Run-building step: runs alternate direction with bit `run_bit` of the id.
    Alternating { run_bit: u32 },
    /// Final merge: every pair is ordered the same way.
    Uniform,
}

/// One compare-exchange step of the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// The step runs only for widths strictly greater than `stage`.
    pub stage: usize,
    /// Partner distance.
    pub mask: usize,
    pub direction: Direction,
}

impl Step {
    /// Whether the step takes part in the network for a group of `width` lanes.
    #[inline]
    pub const fn is_active(&self, width: usize) -> bool {
        self.stage < width
    }

    /// Whether lane `id` keeps the larger key of its pair in this step.
    #[inline]
    pub const fn take_greater(&self, id: usize) -> bool {
        let mask_bit = self.mask.trailing_zeros();
        match self.direction {
            Direction::Alternating { run_bit } => get_bit(id, run_bit) != get_bit(id, mask_bit),
            Direction::Uniform => get_bit(id, mask_bit) != 0,
        }
    }
}

/// The full network schedule, in execution order.
pub const SCHEDULE: [Step; SCHEDULE_LEN] = build_schedule();

const fn build_schedule() -> [Step; SCHEDULE_LEN] {
    let mut steps = [Step {
        stage: 0,
        mask: 0,
        direction: Direction::Uniform,
    }; SCHEDULE_LEN];
    let mut n = 0;

    let mut run = 2;
    while run < MAX_WIDTH {
        let mut mask = run / 2;
        while mask > 0 {
            steps[n] = Step {
                stage: run,
                mask,
                direction: Direction::Alternating {
                    run_bit: run.trailing_zeros(),
                },
            };
            n += 1;
            mask /= 2;
        }
        run *= 2;
    }

    let mut mask = MAX_WIDTH / 2;
    while mask > 0 {
        steps[n] = Step {
            stage: mask,
            mask,
            direction: Direction::Uniform,
        };
        n += 1;
        mask /= 2;
    }

    steps
}

/// Steps of the schedule that run for a group of `width` lanes.
pub fn active_steps(width: usize) -> impl Iterator<Item = &'static Step> {
    SCHEDULE.iter().filter(move |step| step.is_active(width))
}

/// Synchronized rounds the network needs for `width` lanes.
pub fn rounds_for_width(width: usize) -> usize {
    active_steps(width).count()
}

/// Total pairwise compare-exchanges the network performs for `width` lanes.
pub fn compare_exchanges_for_width(width: usize) -> usize {
    width / 2 * rounds_for_width(width)
}

/// Run the whole network on the calling lane's registers.
#[inline]
pub(crate) fn bitonic_sort<L, R, F>(lane: &L, regs: &mut R, less: &F)
where
    L: LaneExchange,
    R: SortRegisters,
    F: Fn(&R::Key, &R::Key) -> bool,
{
    let id = lane.lane_id();
    for step in SCHEDULE.iter() {
        compare_exchange(lane, regs, step.stage, step.mask, step.take_greater(id), less);
    }
}
