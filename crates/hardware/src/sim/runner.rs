//! Program execution.
//!
//! `run_program` installs an image, writes the guest arguments to the
//! argument block (successive words at `ARG_BASE`, with `a1` holding the
//! base address), then ticks the processor until EXIT commits. The cycle
//! count includes the committing tick.

use tracing::debug;

use crate::common::constants::ARG_BASE;
use crate::common::SimError;
use crate::core::processor::Processor;
use crate::isa::abi::REG_A1;
use crate::sim::loader::ProgramImage;
use crate::stats::MemStats;

/// Outcome of a completed run.
#[derive(Clone, Copy, Debug)]
pub struct RunReport {
    /// Global ticks until (and including) the EXIT commit.
    pub cycles: u64,
    /// Commit-time cache counters (all zero without a cache).
    pub mem: MemStats,
}

impl RunReport {
    /// Cache hit fraction in [0, 1].
    pub fn hit_rate(&self) -> f64 {
        self.mem.hit_rate()
    }
}

/// Runs `image` on `processor` with the given guest arguments.
///
/// `max_cycles` bounds the run: exceeding it returns
/// `SimError::CycleLimit`, which is how a guest hang (for example a load
/// outside the data region, which stalls the pipeline forever) surfaces to
/// the harness. `None` runs without a bound.
pub fn run_program(
    processor: &mut Processor,
    image: &ProgramImage,
    args: &[u32],
    max_cycles: Option<u64>,
) -> Result<RunReport, SimError> {
    processor.load_program(&image.text, &image.data, image.entry);
    processor.write_reg(REG_A1, ARG_BASE);
    for (i, &arg) in args.iter().enumerate() {
        processor.write_mem(ARG_BASE + (i as u32) * 4, arg);
    }

    let mut cycles: u64 = 0;
    loop {
        let finished = processor.step();
        cycles += 1;
        if finished {
            break;
        }
        if cycles % 50_000 == 0 {
            debug!(cycles, "still running");
        }
        if max_cycles.is_some_and(|limit| cycles >= limit) {
            return Err(SimError::CycleLimit(cycles));
        }
    }

    Ok(RunReport {
        cycles,
        mem: processor.stats(),
    })
}
