use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{IntoDiagnostic, Result};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use micmac::output::{self, ListingFormat};
use micmac::{env, Machine, MachineError, Program, MEMORY_SIZE};

/// Micmac is an assembler and emulator for the Mac-1 teaching machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.mac` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble and run a source file, then show the final registers
    Run {
        /// Source file to run, or `-` for stdin
        name: PathBuf,
        /// Print every source line as it is executed
        #[arg(short, long)]
        echo: bool,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
        /// Abort after this many instructions
        #[arg(short, long)]
        limit: Option<u64>,
        /// Show a memory cell once the program stops; decimal or `0x` hex
        #[arg(short, long, value_parser = parse_address)]
        dump: Vec<usize>,
    },
    /// Check a source file without running it
    Check {
        /// File to check, or `-` for stdin
        name: PathBuf,
    },
    /// Print the assembled program
    List {
        /// File to list, or `-` for stdin
        name: PathBuf,
        /// Listing layout
        #[arg(short, long, value_enum, default_value_t)]
        format: ListingFormat,
    },
}

fn main() -> Result<()> {
    use MsgColor::*;
    let args = Args::parse();

    let filter = EnvFilter::try_from_env(env::LOG_VAR).unwrap_or_else(|_| EnvFilter::new("warn"));
    let stderr_format = tracing_subscriber::fmt::layer().with_writer(io::stderr);
    tracing_subscriber::registry()
        .with(stderr_format)
        .with(filter)
        .init();
    env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(0)
                .build(),
        )
    }))?;

    match args.command {
        Some(Command::Run {
            name,
            echo,
            minimal,
            limit,
            dump,
        }) => run(
            &name,
            RunOptions {
                echo,
                minimal,
                limit: limit.or_else(env::step_limit),
                dump,
            },
        ),
        Some(Command::Check { name }) => {
            file_message(Green, "Checking", &name);
            let _ = assemble(&name)?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Some(Command::List { name, format }) => {
            let program = assemble(&name)?;
            print!("{}", output::listing(&program, format));
            Ok(())
        }
        None => match args.path {
            Some(path) => run(
                &path,
                RunOptions {
                    limit: env::step_limit(),
                    ..Default::default()
                },
            ),
            None => {
                println!("\n~ micmac v{VERSION} ~");
                println!("{SHORT_INFO}");
                Ok(())
            }
        },
    }
}

#[derive(Default)]
struct RunOptions {
    echo: bool,
    minimal: bool,
    limit: Option<u64>,
    dump: Vec<usize>,
}

enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = if is_stdin(right) {
        "target stdin".to_string()
    } else {
        format!("target {}", right.display())
    };
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn run(name: &Path, opts: RunOptions) -> Result<()> {
    file_message(MsgColor::Green, "Assembling", name);
    let program = assemble(name)?;

    message(MsgColor::Green, "Running", "assembled program");
    let mut machine = Machine::new(&program)?;
    let result = if opts.echo {
        run_echo(&mut machine, &program, opts.limit)
    } else {
        match opts.limit {
            Some(limit) => machine.run_limited(limit),
            None => machine.run(),
        }
    };

    print!("{}", output::registers(&machine, opts.minimal));
    for addr in opts.dump {
        match machine.peek(addr) {
            Ok(value) => println!("{}", output::cell(addr, value, opts.minimal)),
            Err(err) => tracing::warn!(addr, %err, "cannot dump memory cell"),
        }
    }

    if let Err(err) = result {
        message(MsgColor::Red, "Failed", "execution stopped");
        let report = miette::Report::new(err);
        return Err(match program.line_for_address(machine.pc() as usize) {
            Some(line) => report.wrap_err(format!("on line {}: {}", line.number(), line.text().trim())),
            None => report,
        });
    }

    message(
        MsgColor::Green,
        "Completed",
        &format!("halted after {} steps", machine.steps()),
    );
    Ok(())
}

/// Step through the program, printing each line before it executes.
fn run_echo(
    machine: &mut Machine<&Program>,
    program: &Program,
    limit: Option<u64>,
) -> std::result::Result<(), MachineError> {
    while !machine.ended() {
        if let Some(limit) = limit.filter(|&limit| machine.steps() >= limit) {
            return Err(MachineError::StepLimit { limit });
        }
        if let Some(line) = program.line_for_address(machine.pc() as usize) {
            println!("{}", output::numbered(line));
            if let Some(directive) = line.directive() {
                message(MsgColor::Cyan, "dbg", directive);
            }
        }
        machine.step()?;
    }
    Ok(())
}

/// Return the assembled program for a source file
fn assemble(name: &Path) -> Result<Program> {
    let contents = read_source(name)?;
    Ok(micmac::assemble(&contents)?)
}

fn read_source(name: &Path) -> Result<String> {
    if is_stdin(name) {
        let mut contents = String::new();
        io::stdin()
            .read_to_string(&mut contents)
            .into_diagnostic()?;
        return Ok(contents);
    }
    fs::read_to_string(name).into_diagnostic()
}

fn is_stdin(name: &Path) -> bool {
    name.as_os_str() == "-"
}

fn parse_address(arg: &str) -> std::result::Result<usize, String> {
    let parsed = match arg.strip_prefix("0x").or_else(|| arg.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16),
        None => arg.parse(),
    };
    let addr = parsed.map_err(|err| format!("invalid address `{arg}`: {err}"))?;
    if addr >= MEMORY_SIZE {
        return Err(format!(
            "address `{arg}` is outside memory (0 to {})",
            MEMORY_SIZE - 1
        ));
    }
    Ok(addr)
}

const SHORT_INFO: &str = r"
Welcome to micmac, an assembler and emulator for the Mac-1 machine.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
