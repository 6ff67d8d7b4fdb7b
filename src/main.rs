//! Lane Sort Benchmark
//!
//! Runs the lane network on a CPU-hosted lockstep group and compares it with
//! the same network replayed serially. Every trial sorts freshly generated
//! random data and is verified against the standard library sort.
//!
//! Modes:
//! - **keys**: key-only sort of `u32` keys
//! - **pairs-small**: `u32` keys with `u16` values, exchanged directly
//! - **pairs-large**: `u32` keys with 32-byte values, gathered by lane index
//!
//! Usage:
//!   lane-sort --width 32 --trials 1000
//!   lane-sort --benchmark

use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};
use log::{info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use lane_sort::warp_sort::Payload;
use lane_sort::{cpu_bitonic_sort, cpu_sort, LaneGroup, MAX_WIDTH};

/// Default lanes per group, the width of an NVIDIA warp
const DEFAULT_WIDTH: usize = 32;
const DEFAULT_TRIALS: usize = 1000;
const DEFAULT_WARMUP: usize = 5;

/// Widths covered by `--benchmark`
const BENCHMARK_WIDTHS: [usize; 6] = [2, 4, 8, 16, 32, 64];

#[derive(Debug, Parser)]
#[command(name = "lane-sort", version, about = "Benchmark the lockstep lane bitonic sort")]
struct Args {
    /// Lanes per group (power of two, at most 64)
    #[arg(short, long, default_value_t = DEFAULT_WIDTH)]
    width: usize,

    /// Timed sorts per mode
    #[arg(short, long, default_value_t = DEFAULT_TRIALS)]
    trials: usize,

    /// Untimed sorts per mode before timing starts
    #[arg(long, default_value_t = DEFAULT_WARMUP)]
    warmup: usize,

    /// Which sorts to run
    #[arg(short, long, value_enum, default_value_t = Mode::All)]
    mode: Mode,

    /// Seed for the random input generator
    #[arg(long)]
    seed: Option<u64>,

    /// Run every supported width instead of `--width`
    #[arg(long)]
    benchmark: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    Keys,
    PairsSmall,
    PairsLarge,
    All,
}

impl Mode {
    fn includes(self, other: Mode) -> bool {
        self == Mode::All || self == other
    }
}

/// Timing and verification of one mode at one width
struct ModeResult {
    width: usize,
    mode: &'static str,
    lane_us: f64,
    serial_us: f64,
    rounds_per_sort: f64,
    verified: bool,
}

impl ModeResult {
    fn print(&self) {
        println!(
            "{:>6} | {:>12} | {:>12.2} | {:>12.2} | {:>8.1} | {:>8}",
            self.width,
            self.mode,
            self.lane_us,
            self.serial_us,
            self.rounds_per_sort,
            if self.verified { "OK" } else { "FAILED" }
        );
    }
}

/// Accumulates timings over the timed trials of one mode
#[derive(Default)]
struct Timings {
    lane: Duration,
    serial: Duration,
    sorts: usize,
    verified: bool,
}

impl Timings {
    fn new() -> Self {
        Timings {
            verified: true,
            ..Default::default()
        }
    }

    fn finish<const W: usize>(
        self,
        group: &LaneGroup<W>,
        mode: &'static str,
        runs: usize,
    ) -> ModeResult {
        let per_sort = |total: Duration| {
            if self.sorts == 0 {
                0.0
            } else {
                total.as_secs_f64() * 1_000_000.0 / self.sorts as f64
            }
        };
        ModeResult {
            width: W,
            mode,
            lane_us: per_sort(self.lane),
            serial_us: per_sort(self.serial),
            rounds_per_sort: if runs == 0 {
                0.0
            } else {
                group.exchange_rounds() as f64 / runs as f64
            },
            verified: self.verified,
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    info!("Using seed {}", seed);
    let mut rng = StdRng::seed_from_u64(seed);

    let widths: Vec<usize> = if args.benchmark {
        BENCHMARK_WIDTHS.to_vec()
    } else {
        vec![args.width]
    };

    println!("Lane Sort Benchmark");
    println!("===================\n");
    println!(
        "{:>6} | {:>12} | {:>12} | {:>12} | {:>8} | {:>8}",
        "Width", "Mode", "Lanes (us)", "Serial (us)", "Rounds", "Verified"
    );
    println!(
        "{:-<6}-+-{:-<12}-+-{:-<12}-+-{:-<12}-+-{:-<8}-+-{:-<8}",
        "", "", "", "", "", ""
    );

    let mut results = Vec::new();
    for width in widths {
        let width_results = dispatch_width(width, &args, &mut rng)?;
        for result in &width_results {
            result.print();
        }
        results.extend(width_results);
    }

    println!("\nLanes: one thread per lane, every exchange a barrier round");
    println!("Serial: the same network replayed over a slice");

    let failed = results.iter().filter(|r| !r.verified).count();
    if failed > 0 {
        bail!("{} benchmark configuration(s) failed verification", failed);
    }
    Ok(())
}

fn dispatch_width(width: usize, args: &Args, rng: &mut StdRng) -> anyhow::Result<Vec<ModeResult>> {
    match width {
        1 => run_width::<1>(args, rng),
        2 => run_width::<2>(args, rng),
        4 => run_width::<4>(args, rng),
        8 => run_width::<8>(args, rng),
        16 => run_width::<16>(args, rng),
        32 => run_width::<32>(args, rng),
        64 => run_width::<64>(args, rng),
        other => bail!(
            "unsupported width {}: expected a power of two no larger than {}",
            other,
            MAX_WIDTH
        ),
    }
}

fn run_width<const W: usize>(args: &Args, rng: &mut StdRng) -> anyhow::Result<Vec<ModeResult>> {
    let group = LaneGroup::<W>::new().with_context(|| format!("starting a group of {} lanes", W))?;
    info!("Running {} trials ({} warmup) at width {}", args.trials, args.warmup, W);

    let mut results = Vec::new();
    if args.mode.includes(Mode::Keys) {
        results.push(bench_keys(&group, args, rng));
    }
    if args.mode.includes(Mode::PairsSmall) {
        results.push(bench_pairs(&group, args, rng, "pairs-small", |i| i as u16));
    }
    if args.mode.includes(Mode::PairsLarge) {
        results.push(bench_pairs(&group, args, rng, "pairs-large", |i| {
            let i = i as u64;
            [i, i * i, !i, i.rotate_left(17)]
        }));
    }
    Ok(results)
}

fn bench_keys<const W: usize>(group: &LaneGroup<W>, args: &Args, rng: &mut StdRng) -> ModeResult {
    let less = |a: &u32, b: &u32| a < b;
    let runs = args.warmup + args.trials;
    let mut timings = Timings::new();
    group.reset_rounds();

    for trial in 0..runs {
        let input: [u32; W] = std::array::from_fn(|_| rng.gen());

        let mut lane_keys = input;
        let start = Instant::now();
        group.sort_keys(&mut lane_keys, less);
        let lane_elapsed = start.elapsed();

        let mut serial_keys = input;
        let start = Instant::now();
        cpu_bitonic_sort::sort_by(&mut serial_keys, less);
        let serial_elapsed = start.elapsed();

        if !cpu_sort::is_sorted_permutation_of(&input, &lane_keys, less)
            || lane_keys != serial_keys
        {
            warn!("Key sort mismatch at width {}: input {:?}, got {:?}", W, input, lane_keys);
            timings.verified = false;
        }
        if trial >= args.warmup {
            timings.lane += lane_elapsed;
            timings.serial += serial_elapsed;
            timings.sorts += 1;
        }
    }
    timings.finish(group, "keys", runs)
}

fn bench_pairs<const W: usize, V, M>(
    group: &LaneGroup<W>,
    args: &Args,
    rng: &mut StdRng,
    mode: &'static str,
    make_value: M,
) -> ModeResult
where
    V: Payload + Sync + PartialEq + std::fmt::Debug,
    M: Fn(usize) -> V,
{
    let less = |a: &u32, b: &u32| a < b;
    let runs = args.warmup + args.trials;
    let mut timings = Timings::new();
    group.reset_rounds();

    for trial in 0..runs {
        // A narrow key range makes duplicate keys common.
        let keys: [u32; W] = std::array::from_fn(|_| rng.gen_range(0..W as u32));
        let values: [V; W] = std::array::from_fn(&make_value);

        let (mut lane_keys, mut lane_values) = (keys, values.clone());
        let start = Instant::now();
        group.sort_pairs(&mut lane_keys, &mut lane_values, less);
        let lane_elapsed = start.elapsed();

        let (mut serial_keys, mut serial_values) = (keys, values);
        let start = Instant::now();
        cpu_bitonic_sort::sort_pairs_by(&mut serial_keys, &mut serial_values, less);
        let serial_elapsed = start.elapsed();

        if !cpu_sort::is_sorted_permutation_of(&keys, &lane_keys, less)
            || lane_keys != serial_keys
            || lane_values != serial_values
        {
            warn!(
                "Pair sort mismatch at width {} ({}): keys {:?}, got {:?} / {:?}",
                W, mode, keys, lane_keys, lane_values
            );
            timings.verified = false;
        }
        if trial >= args.warmup {
            timings.lane += lane_elapsed;
            timings.serial += serial_elapsed;
            timings.sorts += 1;
        }
    }
    timings.finish(group, mode, runs)
}
