use std::path::PathBuf;
use std::process;

use clap::Parser;
use cinder_utils::logging::{self, LoggingConfig};
use cinder_utils::{LogFormat, LogLevel};

#[cfg_attr(not(all(target_os = "linux", target_arch = "x86_64")), allow(dead_code))]
mod commands;

/// A minimal ptrace debugger: software breakpoints, continue and single-step.
#[derive(Parser, Debug)]
#[command(name = "cinder")]
#[command(version)]
#[command(about = "A minimal ptrace debugger: software breakpoints, continue and single-step", long_about = None)]
struct Cli
{
    /// Log level (error, warn, info, debug, trace); overrides RUST_LOG
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<LogLevel>,
    /// Log format (pretty, json); overrides CINDER_LOG_FORMAT
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
    /// Do not load DWARF symbols from the program
    #[arg(long, default_value_t = false)]
    no_symbols: bool,
    /// Path to the executable to launch
    program: PathBuf,
    /// Arguments to pass to the program
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main()
{
    let cli = Cli::parse();

    let config = LoggingConfig::from_env()
        .with_level(cli.log_level)
        .with_format(cli.log_format);
    if let Err(e) = logging::init(&config) {
        eprintln!("Failed to initialize logging: {e}");
        process::exit(1);
    }

    match run(&cli) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    }
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn run(cli: &Cli) -> Result<i32, Box<dyn std::error::Error>>
{
    use std::io::{self, BufRead, Write};

    use cinder_core::{launch, DebugSession, DwarfResolver, PtraceProcess, StopEvent, Tracee};
    use cinder_utils::{info, warn};
    use commands::{execute, Command, Flow};

    fn load_symbols(process: &PtraceProcess) -> cinder_core::Result<DwarfResolver>
    {
        DwarfResolver::load(process.executable_path()?, process.load_address()?)
    }

    let process = launch(&cli.program, &cli.args)?;
    println!("Launched {} (pid {})", cli.program.display(), process.pid());

    let mut session = DebugSession::new(process);
    if !cli.no_symbols {
        match load_symbols(session.tracee()) {
            Ok(resolver) => {
                info!(path = %resolver.path().display(), debug_info = resolver.has_debug_info(), "symbols loaded");
                if !resolver.has_debug_info() {
                    println!("No debug info in {}; symbol lookups will fail", resolver.path().display());
                }
                println!("Entry point: {}", resolver.entry_point());
                session = session.with_symbols(Box::new(resolver));
            }
            Err(err) => warn!(error = %err, "continuing without symbols"),
        }
    }

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut stdout = io::stdout().lock();
    let mut line = String::new();
    loop {
        write!(stdout, "(cinder) ")?;
        stdout.flush()?;
        line.clear();
        if input.read_line(&mut line)? == 0 {
            writeln!(stdout)?;
            break;
        }

        let command = match Command::parse(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                eprintln!("error: {err}");
                continue;
            }
        };
        match execute(&mut session, &command, &mut stdout) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(err) => eprintln!("error: {err}"),
        }
    }

    // The process is killed when the session drops, unless it already exited.
    let code = match session.last_stop() {
        Some(StopEvent::Exited { status }) => status,
        _ => 0,
    };
    Ok(code)
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn run(_cli: &Cli) -> Result<i32, Box<dyn std::error::Error>>
{
    Err("cinder only runs on Linux x86-64".into())
}

#[cfg(test)]
mod tests
{
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid()
    {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_program_arguments_are_passed_through()
    {
        let cli = Cli::try_parse_from(["cinder", "--log-level", "debug", "./app", "-v", "--flag", "x"]).unwrap();
        assert_eq!(cli.log_level, Some(LogLevel::Debug));
        assert_eq!(cli.program, PathBuf::from("./app"));
        assert_eq!(cli.args, ["-v", "--flag", "x"]);
        assert!(!cli.no_symbols);
    }

    #[test]
    fn test_rejects_unknown_log_format()
    {
        assert!(Cli::try_parse_from(["cinder", "--log-format", "xml", "./app"]).is_err());
    }
}
