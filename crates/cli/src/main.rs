//! Out-of-order RISC-V simulator CLI.
//!
//! Two modes over the core library:
//! 1. **run:** execute a guest ELF with a configurable memory latency and
//!    data-cache geometry; print cycles and cache hit rate.
//! 2. **check:** execute and compare the final register/memory state
//!    against a JSON expectation file; nonzero exit on mismatch.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use tomasim_core::config::ReplacePolicy;
use tomasim_core::isa::abi::XREG_NAMES;
use tomasim_core::sim::loader;
use tomasim_core::sim::runner::{run_program, RunReport};
use tomasim_core::{Processor, SimConfig};

#[derive(Parser, Debug)]
#[command(
    name = "tomasim",
    author,
    version,
    about = "Cycle-driven Tomasulo-style out-of-order RV32IM simulator",
    long_about = "Run a RISC-V rv32im guest ELF on a microarchitecturally \
                  parametrized out-of-order core.\n\nExamples:\n  \
                  tomasim run guest.elf --mem-latency 5\n  \
                  tomasim run guest.elf --cache --ways 2 --policy lru --arg 16\n  \
                  tomasim check guest.elf --expect expected.json"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a guest ELF and report cycles (and hit rate with --cache).
    Run {
        /// Guest ELF path.
        elf: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Guest argument word; repeat for more (placed at 0x807fff00,
        /// base address in a1).
        #[arg(long = "arg", value_name = "WORD")]
        args: Vec<u32>,

        /// Abort if the guest has not exited after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,
    },

    /// Run a guest ELF and diff final state against an expectation file.
    Check {
        /// Guest ELF path.
        elf: PathBuf,

        /// JSON file: {"regs": {"x3": 12}, "mem": {"0x80400000": 7}}.
        #[arg(long)]
        expect: PathBuf,

        #[command(flatten)]
        config: ConfigArgs,

        /// Guest argument word; repeat for more.
        #[arg(long = "arg", value_name = "WORD")]
        args: Vec<u32>,

        /// Abort if the guest has not exited after this many cycles.
        #[arg(long)]
        max_cycles: Option<u64>,
    },
}

/// Configuration flags; `--config` supplies a JSON `SimConfig` document and
/// the individual flags override its fields.
#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON configuration file (SimConfig document).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Main memory latency in cycles.
    #[arg(long)]
    mem_latency: Option<u32>,

    /// Memory jitter seed.
    #[arg(long)]
    seed: Option<u64>,

    /// Enable the L1 data cache.
    #[arg(long)]
    cache: bool,

    /// Cache size in bytes.
    #[arg(long)]
    cache_size: Option<usize>,

    /// Cache block size in bytes.
    #[arg(long)]
    block_size: Option<usize>,

    /// Cache associativity.
    #[arg(long)]
    ways: Option<usize>,

    /// Use write-through instead of write-back.
    #[arg(long)]
    write_through: bool,

    /// Replacement policy: lru, fifo, or random.
    #[arg(long, value_parser = parse_policy)]
    policy: Option<ReplacePolicy>,

    /// Attach the branch target buffer predictor.
    #[arg(long)]
    predictor: bool,
}

fn parse_policy(s: &str) -> Result<ReplacePolicy, String> {
    match s.to_ascii_lowercase().as_str() {
        "lru" => Ok(ReplacePolicy::Lru),
        "fifo" => Ok(ReplacePolicy::Fifo),
        "random" => Ok(ReplacePolicy::Random),
        other => Err(format!("unknown policy '{other}' (lru|fifo|random)")),
    }
}

impl ConfigArgs {
    fn build(&self) -> SimConfig {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
                    eprintln!("error: cannot read config {}: {e}", path.display());
                    process::exit(1);
                });
                serde_json::from_str(&text).unwrap_or_else(|e| {
                    eprintln!("error: bad config {}: {e}", path.display());
                    process::exit(1);
                })
            }
            None => SimConfig::default(),
        };

        if let Some(latency) = self.mem_latency {
            config.memory.latency = latency;
        }
        if let Some(seed) = self.seed {
            config.memory.seed = seed;
        }
        if self.cache {
            config.cache.enabled = true;
        }
        if let Some(size) = self.cache_size {
            config.cache.size_bytes = size;
        }
        if let Some(block) = self.block_size {
            config.cache.block_bytes = block;
        }
        if let Some(ways) = self.ways {
            config.cache.ways = ways;
        }
        if self.write_through {
            config.cache.write_through = true;
        }
        if let Some(policy) = self.policy {
            config.cache.policy = policy;
        }
        if self.predictor {
            config.frontend.predictor = true;
        }

        if let Err(e) = config.validate() {
            eprintln!("error: {e}");
            process::exit(1);
        }
        config
    }
}

/// Expected final state for `check`.
#[derive(Debug, Deserialize)]
struct Expectation {
    /// Register name ("x5" or ABI like "a0") to expected value.
    #[serde(default)]
    regs: BTreeMap<String, u32>,
    /// Data-memory address (hex string or decimal) to expected word.
    #[serde(default)]
    mem: BTreeMap<String, u32>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            elf,
            config,
            args,
            max_cycles,
        } => {
            let config = config.build();
            let report = execute(&elf, &config, &args, max_cycles);
            println!("cycles: {}", report.cycles);
            if config.cache.enabled {
                println!(
                    "cache: {}/{} hits ({:.4})",
                    report.mem.hits,
                    report.mem.accesses,
                    report.hit_rate()
                );
            }
        }
        Commands::Check {
            elf,
            expect,
            config,
            args,
            max_cycles,
        } => {
            let expectation = read_expectation(&expect);
            let config = config.build();
            let mut processor = Processor::new(&config);
            let image = load_image(&elf);
            let report = run_on(&mut processor, &image, &args, max_cycles);
            println!("cycles: {}", report.cycles);

            let mismatches = diff_state(&processor, &expectation);
            if mismatches == 0 {
                println!("check passed");
            } else {
                eprintln!("check failed: {mismatches} mismatch(es)");
                process::exit(1);
            }
        }
    }
}

fn load_image(elf: &PathBuf) -> loader::ProgramImage {
    loader::load_elf(elf).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    })
}

fn execute(elf: &PathBuf, config: &SimConfig, args: &[u32], max_cycles: Option<u64>) -> RunReport {
    let mut processor = Processor::new(config);
    let image = load_image(elf);
    run_on(&mut processor, &image, args, max_cycles)
}

fn run_on(
    processor: &mut Processor,
    image: &loader::ProgramImage,
    args: &[u32],
    max_cycles: Option<u64>,
) -> RunReport {
    run_program(processor, image, args, max_cycles).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        process::exit(1);
    })
}

fn read_expectation(path: &PathBuf) -> Expectation {
    let text = std::fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("error: cannot read expectation {}: {e}", path.display());
        process::exit(1);
    });
    serde_json::from_str(&text).unwrap_or_else(|e| {
        eprintln!("error: bad expectation file: {e}");
        process::exit(1);
    })
}

fn diff_state(processor: &Processor, expectation: &Expectation) -> usize {
    let mut mismatches = 0;
    for (name, &expected) in &expectation.regs {
        let Some(index) = reg_index(name) else {
            eprintln!("unknown register '{name}'");
            mismatches += 1;
            continue;
        };
        let actual = processor.read_reg(index);
        if actual != expected {
            eprintln!("reg {name}: expected {expected:#x}, got {actual:#x}");
            mismatches += 1;
        }
    }
    for (addr_text, &expected) in &expectation.mem {
        let Some(addr) = parse_word(addr_text) else {
            eprintln!("bad address '{addr_text}'");
            mismatches += 1;
            continue;
        };
        let actual = processor.read_mem(addr);
        if actual != expected {
            eprintln!("mem {addr_text}: expected {expected:#x}, got {actual:#x}");
            mismatches += 1;
        }
    }
    mismatches
}

/// Accepts "x<N>" or an ABI name.
fn reg_index(name: &str) -> Option<usize> {
    if let Some(n) = name.strip_prefix('x') {
        if let Ok(index) = n.parse::<usize>() {
            return (index < 32).then_some(index);
        }
    }
    XREG_NAMES.iter().position(|&abi| abi == name)
}

/// Accepts "0x"-prefixed hex or decimal.
fn parse_word(text: &str) -> Option<u32> {
    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        text.parse().ok()
    }
}
