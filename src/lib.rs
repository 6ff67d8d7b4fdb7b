//! Lane Sort
//!
//! Sorts one key (or key/value pair) per lane across a lockstep group of `W`
//! lanes, `W` a power of two up to 64. The lanes never share a buffer: the sort
//! is a bitonic network built entirely from pairwise register exchanges, the
//! way a GPU warp sorts with shuffles.
//!
//! - [`warp_sort`]: the per-lane entry points, generic over any [`LaneExchange`]
//! - [`LaneGroup`]: a CPU-hosted lockstep group, one thread per lane
//! - [`cpu_bitonic_sort`]: the same network replayed serially over a slice
//!
//! ```
//! use lane_sort::LaneGroup;
//!
//! let group = LaneGroup::<4>::new().unwrap();
//! let mut keys = [3u32, 1, 4, 2];
//! let mut values = ["c", "a", "d", "b"];
//! group.sort_pairs(&mut keys, &mut values, |a, b| a < b);
//! assert_eq!(keys, [1, 2, 3, 4]);
//! assert_eq!(values, ["a", "b", "c", "d"]);
//! ```

pub mod bitonic;
mod compare_exchange;
pub mod cpu_bitonic_sort;
pub mod cpu_sort;
pub mod error;
pub mod lane;
pub mod lane_group;
pub mod warp_sort;

pub use error::{LaneError, Result};
pub use lane::{LaneExchange, Register, MAX_WIDTH};
pub use lane_group::{Lane, LaneGroup, Segment};
pub use warp_sort::{EmptyStorage, Payload};
