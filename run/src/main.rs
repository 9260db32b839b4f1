//! dyna-run: run a raw big-endian VR4300 image on the dynarec.
//!
//! The image is copied into RDRAM at `--load` and executed from
//! `--entry` until the guest stores to the halt register or the
//! dispatch limit is reached.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::Parser;
use dyna_core::addr::{is_unmapped, SEGMENT_MASK};
use dyna_exec::DynarecConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "dyna-run", about = "Run a raw VR4300 image on the dynarec")]
struct Args {
    /// Raw big-endian program image
    image: PathBuf,

    /// Virtual address (KSEG0/KSEG1) to load the image at
    #[arg(long, value_name = "ADDR", default_value = "0x80001000", value_parser = parse_addr)]
    load: u32,

    /// Entry point (defaults to the load address)
    #[arg(long, value_name = "ADDR", value_parser = parse_addr)]
    entry: Option<u32>,

    /// Cartridge ROM image mapped at physical 0x10000000
    #[arg(long, value_name = "PATH")]
    rom: Option<PathBuf>,

    /// Code cache size in MiB
    #[arg(long, value_name = "MIB", default_value_t = 16)]
    cache_mb: usize,

    /// Guest instructions per compiled function at most
    #[arg(long, value_name = "N", default_value_t = dyna_exec::DEFAULT_MAX_FUNCTION_INSNS)]
    max_insns: u32,

    /// Timer period in Count units
    #[arg(long, value_name = "TICKS", default_value_t = dyna_frontend::vr4300::exceptions::DEFAULT_TIMER_PERIOD)]
    timer: u32,

    /// Do not poll for interrupts between functions
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_interrupts: bool,

    /// Stop after this many dispatches
    #[arg(long, value_name = "N")]
    max_dispatches: Option<u64>,

    /// Print execution statistics on exit
    #[arg(long, action = clap::ArgAction::SetTrue)]
    stats: bool,

    /// Log filter, e.g. `dyna_exec=debug` (overrides RUST_LOG)
    #[arg(long, value_name = "FILTER")]
    log: Option<String>,
}

fn parse_addr(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(&hex.replace('_', ""), 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid address {s:?}: {e}"))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = match &args.log {
        Some(directives) => EnvFilter::try_new(directives).context("invalid --log filter")?,
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
    if !is_unmapped(args.load) {
        bail!("load address {:#010x} is not in KSEG0/KSEG1", args.load);
    }
    let image = fs::read(&args.image)
        .with_context(|| format!("failed to read image {}", args.image.display()))?;
    let rom = match &args.rom {
        Some(path) => Some(fs::read(path).with_context(|| format!("failed to read ROM {}", path.display()))?),
        None => None,
    };

    let config = DynarecConfig {
        code_cache_size: args.cache_mb.max(1) * 1024 * 1024,
        max_function_insns: args.max_insns,
        interrupt_polling: !args.no_interrupts,
        dispatch_limit: args.max_dispatches,
    };
    run(&args, config, &image, rom)
}

#[cfg(target_arch = "x86_64")]
fn run(args: &Args, config: DynarecConfig, image: &[u8], rom: Option<Vec<u8>>) -> anyhow::Result<()> {
    use dyna_backend::X86_64Abi;
    use dyna_exec::Dynarec;
    use dyna_frontend::vr4300::{FlatMachine, ThreadedTranslator, Vr4300Exceptions, Vr4300Interpreter};

    let mut machine = FlatMachine::new(Vr4300Exceptions::new(args.timer));
    if !machine.load(args.load & SEGMENT_MASK, image) {
        bail!("image of {} bytes does not fit in RDRAM at {:#010x}", image.len(), args.load);
    }
    if let Some(rom) = rom {
        machine.set_rom(rom);
    }

    let translator = ThreadedTranslator::new().context("failed to allocate translator scratch")?;
    let mut dynarec = Dynarec::new(machine, Vr4300Interpreter, translator, X86_64Abi::new(), config)
        .context("failed to allocate code cache")?;
    let timer = dynarec.machine().exceptions().clone();
    timer.arm(dynarec.cpu_mut());

    let entry = args.entry.unwrap_or(args.load);
    info!(entry = format_args!("{:#010x}", entry), "starting");
    let result = dynarec.run(entry);

    if args.stats {
        eprintln!("{}", dynarec.stats());
    }
    let cpu = dynarec.cpu();
    let pc = result.with_context(|| format!("guest stopped at {:#010x}", cpu.pc))?;
    println!("pc = {pc:#010x}  count = {:#010x}  stopped = {}", cpu.count(), cpu.stop);
    for (i, chunk) in cpu.gpr.chunks(4).enumerate() {
        let line: Vec<String> = chunk
            .iter()
            .enumerate()
            .map(|(j, v)| format!("r{:<2} = {:#018x}", i * 4 + j, v))
            .collect();
        println!("{}", line.join("  "));
    }
    Ok(())
}

#[cfg(not(target_arch = "x86_64"))]
fn run(_args: &Args, _config: DynarecConfig, _image: &[u8], _rom: Option<Vec<u8>>) -> anyhow::Result<()> {
    bail!("no code generator for this host architecture")
}
