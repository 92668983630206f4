//! LC-3 Emulator - CLI Entry Point
//!
//! Commands:
//! - `lc3-emu run <image>` - Run a program image until it halts
//! - `lc3-emu inspect <image>` - Show where an image loads

use clap::{Parser, Subcommand};
use lc3::{Console, Cpu, CpuError, StreamConsole};
use std::io;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Exit code after a fatal machine error.
const EXIT_FATAL: u8 = 1;

/// Exit code when no program could be loaded.
const EXIT_LOAD: u8 = 2;

#[derive(Parser)]
#[command(name = "lc3-emu")]
#[command(version)]
#[command(about = "An emulator for the LC-3 16-bit educational computer")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a program until it halts
    Run {
        /// Path to the program image (.obj)
        image: String,
        /// Stop after this many instructions
        #[arg(short, long)]
        max_cycles: Option<u64>,
        /// Start address, in hex (default: 3000)
        #[arg(short, long, value_parser = parse_hex)]
        entry: Option<u16>,
        /// Log every executed instruction to stderr
        #[arg(short, long)]
        trace: bool,
        /// Print the final machine state as JSON
        #[arg(long)]
        json: bool,
        /// Read stdin as a plain stream even on a terminal
        #[arg(long)]
        no_raw: bool,
    },
    /// Show the origin and size of a program image
    Inspect {
        /// Path to the program image (.obj)
        image: String,
    },
}

struct RunOptions {
    max_cycles: Option<u64>,
    entry: Option<u16>,
    json: bool,
    no_raw: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { image, max_cycles, entry, trace, json, no_raw } => {
            init_logging(trace);
            run_program(&image, RunOptions { max_cycles, entry, json, no_raw })
        }
        Commands::Inspect { image } => {
            init_logging(false);
            inspect_image(&image)
        }
    }
}

fn init_logging(trace: bool) {
    let filter = if trace {
        EnvFilter::new("lc3=trace")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn parse_hex(s: &str) -> Result<u16, String> {
    let digits = s
        .trim_start_matches("0x")
        .trim_start_matches("0X")
        .trim_start_matches('x');
    u16::from_str_radix(digits, 16).map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn run_program(path: &str, opts: RunOptions) -> ExitCode {
    let image = match lc3::load_image(path) {
        Ok(image) => image,
        Err(e) => {
            eprintln!("Failed to load image: {}", e);
            return ExitCode::from(EXIT_LOAD);
        }
    };

    let mut cpu = Cpu::new();
    if let Err(e) = cpu.load_image(&image) {
        eprintln!("Failed to load program: {}", e);
        return ExitCode::from(EXIT_LOAD);
    }
    cpu.reset();
    if let Some(entry) = opts.entry {
        cpu.regs.pc = entry;
    }

    let result = with_console(opts.no_raw, |console| match opts.max_cycles {
        Some(max) => cpu.run_limited(console, max),
        None => cpu.run(console),
    });

    let code = match result {
        Ok(_) if cpu.is_running() => {
            eprintln!();
            eprintln!("Reached max cycles limit ({}).", opts.max_cycles.unwrap_or_default());
            ExitCode::SUCCESS
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(CpuError::MissingProgram) => {
            eprintln!("No program loaded");
            return ExitCode::from(EXIT_LOAD);
        }
        Err(e) => {
            eprintln!();
            eprintln!("CPU error at PC={:#06x}: {}", cpu.regs.pc, e);
            ExitCode::from(EXIT_FATAL)
        }
    };

    print_report(&cpu, opts.json);
    code
}

/// Run `f` against the terminal when stdin is one, otherwise against plain
/// stdin/stdout.
fn with_console<T>(no_raw: bool, f: impl FnOnce(&mut dyn Console) -> Result<T, CpuError>) -> Result<T, CpuError> {
    #[cfg(feature = "term")]
    {
        use std::io::IsTerminal;

        if !no_raw && io::stdin().is_terminal() {
            let mut console = lc3::TerminalConsole::new()?;
            return f(&mut console);
        }
    }
    #[cfg(not(feature = "term"))]
    let _ = no_raw;

    let mut console = StreamConsole::new(io::stdin().lock(), io::stdout().lock());
    f(&mut console)
}

fn print_report(cpu: &Cpu, json: bool) {
    let report = cpu.report();

    if json {
        match serde_json::to_string_pretty(&report) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("Failed to serialize report: {}", e),
        }
        return;
    }

    eprintln!();
    eprintln!("--- Result ---");
    eprintln!("Cycles: {}", report.cycles);
    eprintln!("State:  {:?}", report.state);
    eprintln!("PC:     {:#06x}", report.pc);
    eprintln!("COND:   {}", report.condition);
    for (i, value) in report.registers.iter().enumerate() {
        eprintln!("R{}:     {:#06x} ({})", i, value, *value as i16);
    }
}

fn inspect_image(path: &str) -> ExitCode {
    match lc3::load_image(path) {
        Ok(image) => {
            println!("Origin: {:#06x}", image.origin);
            println!("Words:  {}", image.len());
            println!("End:    {:#06x}", image.end());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to load image: {}", e);
            ExitCode::from(EXIT_LOAD)
        }
    }
}
