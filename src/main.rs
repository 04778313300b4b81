//! csr-dma: register interface compiler and streaming DMA test driver

use std::env;
use std::path::PathBuf;

use anyhow::{bail, Context};

use csr_dma::config::CompiledModule;
use csr_dma::csr::BindingKind;
use csr_dma::dma::{ControlState, DmaMode, DmaParams, DmaTestSystem, BLOCK_WORDS};
use csr_dma::sim::{ClockDomain, StreamConsumer, StreamProducer};
use csr_dma::Config;

/// Upper bound on ticks for one phase of one block.
const PHASE_TIMEOUT: usize = 10_000;

/// Source of the loopback; the destination starts at half of memory.
const SRC_BASE: u64 = 0;

struct Args {
    config: Option<PathBuf>,
    words: usize,
    sample_config: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        words: 32,
        sample_config: false,
    };

    let mut iter = env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                let path = iter.next().context("--config needs a path")?;
                args.config = Some(PathBuf::from(path));
            }
            "--words" | "-n" => {
                let n = iter.next().context("--words needs a count")?;
                args.words = n.parse().with_context(|| format!("invalid word count '{}'", n))?;
            }
            "--sample-config" => args.sample_config = true,
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            other => bail!("unknown argument '{}' (try --help)", other),
        }
    }
    Ok(args)
}

fn print_usage() {
    println!("Usage: csr-dma [--config PATH] [--words N] [--sample-config]");
    println!();
    println!("  --config PATH    Load configuration from PATH (over user config)");
    println!("  --words N        Words to move through the DMA core (default 32)");
    println!("  --sample-config  Print a sample configuration and exit");
    println!();
    if let Some(path) = Config::user_config_path() {
        println!("User config: {}", path.display());
    }
}

fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::init();

    let args = parse_args()?;

    if args.sample_config {
        print!("{}", Config::sample_config());
        return Ok(());
    }

    let config = match &args.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let mut config = Config::load();
            config.merge(Config::from_toml_str(&text)?);
            config.apply_env_overrides();
            config
        }
        None => Config::load(),
    };

    let clock = config.clock.to_domain();
    println!("Clock domain: {}", clock);

    for module in &config.modules {
        let compiled = module
            .compile(&clock)
            .with_context(|| format!("compiling module '{}'", module.instance_name))?;
        print_module(&compiled);
    }

    let params = config.dma.validate()?;
    run_loopback(&params, &clock, args.words)
}

fn print_module(compiled: &CompiledModule) {
    println!();
    match compiled {
        CompiledModule::External(set) => {
            println!("Top-level registers: {}", set.instance_name());
        }
        CompiledModule::Instance(inst) => {
            println!("Instance: {}", inst);
        }
    }
    for port in compiled.registers().ports() {
        let binding = &port.binding;
        let kind = match binding.kind {
            BindingKind::Combinational => "comb",
            BindingKind::Registered => "sync",
            BindingKind::Clock => "clk",
            BindingKind::Reset => "rst",
        };
        println!(
            "  {:<16} {:?} {:>2} bit(s)  {} <-> {} [{}]",
            binding.register,
            port.register.kind(),
            port.register.width(),
            binding.connector,
            binding.external.name,
            kind
        );
    }
}

/// Run the host-side test sequence for enough blocks to cover `words`.
fn run_loopback(params: &DmaParams, clock: &ClockDomain, words: usize) -> anyhow::Result<()> {
    let block_bytes = params.block_bytes();
    let blocks = words.div_ceil(BLOCK_WORDS as usize).max(1);
    let total = blocks * block_bytes;
    let dst_base = (params.memory_size / 2) as u64;
    if total > params.memory_size / 2 {
        bail!(
            "{} block(s) of {} bytes do not fit in half of {} bytes of memory",
            blocks,
            block_bytes,
            params.memory_size
        );
    }

    let mut sys = DmaTestSystem::new(params, clock)?;
    let pattern: Vec<u8> = (0..total).map(|i| (i as u8).wrapping_mul(7).wrapping_add(3)).collect();
    sys.memory_mut().load(SRC_BASE, &pattern);
    sys.events_mut().set_enable(u64::MAX);

    let data_bytes = (params.data_width / 8) as usize;
    let expected: Vec<u64> = (0..total / data_bytes)
        .map(|i| sys.memory().read_word(SRC_BASE + (i * data_bytes) as u64, data_bytes))
        .collect();

    let mut producer = StreamProducer::from_words(expected.iter().copied());
    let mut consumer = StreamConsumer::new();
    let mut events_seen = 0;

    println!();
    println!("DMA test: mode {}, {} block(s) of {} byte(s)", params.mode, blocks, block_bytes);

    for block in 0..blocks {
        let offset = (block * block_bytes) as u64;
        program_block(&mut sys, SRC_BASE + offset, dst_base + offset, block_bytes as u64);

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, |s| {
            s.core().state() == ControlState::Wait
        })
        .with_context(|| format!("block {}: write phase", block))?;

        sys.core_mut().write_start();
        run_until(&mut sys, &mut producer, &mut consumer, |s| {
            s.core().state() == ControlState::ReadDone
                && s.x2mem().map_or(true, |leg| leg.writer().done())
        })
        .with_context(|| format!("block {}: read phase", block))?;

        // Let the last interrupt pulse reach the event manager
        for _ in 0..2 {
            sys.step(&mut producer, &mut consumer);
        }
        let pending = sys.events().pending();
        events_seen += pending.count_ones();
        sys.events_mut().clear_pending(pending);
    }

    let core = sys.core();
    println!("  cycles:      {}", sys.cycles());
    println!("  wr_done:     {}", core.wr_done());
    println!("  rd_done:     {}", core.rd_done());
    println!("  state code:  {}", core.status_code());
    println!("  events:      {}", events_seen);

    let ok = match params.mode {
        DmaMode::Write => consumer.words() == expected,
        DmaMode::Read | DmaMode::ReadWrite => {
            sys.memory().slice(dst_base, total) == Some(&pattern[..])
        }
    };
    println!("  round trip:  {}", if ok { "OK" } else { "MISMATCH" });

    if !ok {
        bail!("data mismatch after DMA round trip");
    }
    Ok(())
}

/// Rewind both endpoints, then program them for one block.
fn program_block(sys: &mut DmaTestSystem, src: u64, dst: u64, len: u64) {
    if let Some(leg) = sys.mem2x_mut() {
        leg.reader_mut().write_enable(false);
    }
    if let Some(leg) = sys.x2mem_mut() {
        leg.writer_mut().write_enable(false);
    }
    let mut idle_producer = StreamProducer::new();
    let mut idle_consumer = StreamConsumer::with_ready_pattern(Vec::new());
    for _ in 0..2 {
        sys.step(&mut idle_producer, &mut idle_consumer);
    }

    if let Some(leg) = sys.mem2x_mut() {
        let reader = leg.reader_mut();
        reader.write_base(src);
        reader.write_length(len);
        reader.write_enable(true);
    }
    if let Some(leg) = sys.x2mem_mut() {
        let writer = leg.writer_mut();
        writer.write_base(dst);
        writer.write_length(len);
        writer.write_enable(true);
    }
}

fn run_until(
    sys: &mut DmaTestSystem,
    producer: &mut StreamProducer,
    consumer: &mut StreamConsumer,
    done: impl Fn(&DmaTestSystem) -> bool,
) -> anyhow::Result<()> {
    for _ in 0..PHASE_TIMEOUT {
        if done(sys) {
            return Ok(());
        }
        sys.step(producer, consumer);
    }
    bail!(
        "timed out after {} ticks in state {}",
        PHASE_TIMEOUT,
        sys.core().state()
    )
}
