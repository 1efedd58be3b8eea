//! # Commands
//!
//! The interactive command language.
//!
//! Each line is one command. Command words match on prefix, checked in table
//! order, so `b` is `break`, `d` is `delete`, `s` is `stepi`, and longer
//! prefixes (`bre`..`breakp`, `dis`, `sy`) reach the rest. Numbers are `0x`
//! hex or decimal, with optional `_` separators.
//!
//! | command                          | session operation                 |
//! |----------------------------------|-----------------------------------|
//! | `break <addr>`                   | `set_breakpoint_at`               |
//! | `delete <addr>`                  | `remove_breakpoint`               |
//! | `enable <addr>` / `disable <addr>` | `enable_breakpoint` / `disable_breakpoint` |
//! | `breakpoints`                    | `breakpoints`                     |
//! | `continue`                       | `continue_execution`              |
//! | `stepi`                          | `step_instruction`                |
//! | `register dump`                  | `dump_registers`                  |
//! | `register read <name>`           | `read_register_by_name`           |
//! | `register write <name> <value>`  | `write_register_by_name`          |
//! | `memory read <addr>`             | `read_memory`                     |
//! | `memory write <addr> <value>`    | `write_memory`                    |
//! | `symbol [addr]`                  | `resolve_function` (default: pc)  |

use std::io::{self, Write};

use cinder_core::{Address, DebugSession, DebuggerError, FunctionDescriptor, StopEvent, Tracee};

pub const HELP: &str = "\
Commands (any unambiguous prefix works, numbers are 0x-hex or decimal):
  break <addr>                   set a breakpoint
  delete <addr>                  remove a breakpoint
  enable <addr>                  re-arm a breakpoint
  disable <addr>                 disarm a breakpoint, keeping it listed
  breakpoints                    list breakpoints
  continue                       resume until the next stop
  stepi                          execute one instruction
  register dump                  show all registers
  register read <name>           show one register
  register write <name> <value>  set one register
  memory read <addr>             show the 8-byte word at addr
  memory write <addr> <value>    store an 8-byte word at addr
  symbol [addr]                  function containing addr (default: pc)
  help                           this text
  quit                           kill the debuggee and exit";

/// Command parsing or execution error
#[derive(Debug, thiserror::Error)]
pub enum CommandError
{
    #[error("Unknown command: {0} (try 'help')")]
    UnknownCommand(String),

    #[error("Unknown {command} subcommand: {word}")]
    UnknownSubcommand
    {
        command: &'static str,
        word: String,
    },

    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),

    #[error("Unexpected argument: {0}")]
    UnexpectedArgument(String),

    #[error("Invalid number: {0}")]
    InvalidNumber(String),

    #[error(transparent)]
    Debugger(#[from] DebuggerError),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// One parsed command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command
{
    Break(Address),
    Delete(Address),
    Enable(Address),
    Disable(Address),
    Breakpoints,
    Continue,
    StepInstruction,
    RegisterDump,
    RegisterRead(String),
    RegisterWrite(String, u64),
    MemoryRead(Address),
    MemoryWrite(Address, u64),
    /// `None` means the current program counter
    Symbol(Option<Address>),
    Help,
    Quit,
}

/// What the command loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow
{
    Continue,
    Quit,
}

#[derive(Debug, Clone, Copy)]
enum Verb
{
    Break,
    Breakpoints,
    Continue,
    Delete,
    Disable,
    Enable,
    StepInstruction,
    Register,
    Memory,
    Symbol,
    Help,
    Quit,
}

// Order decides which verb a short prefix selects.
const VERBS: &[(&str, Verb)] = &[
    ("break", Verb::Break),
    ("breakpoints", Verb::Breakpoints),
    ("continue", Verb::Continue),
    ("delete", Verb::Delete),
    ("disable", Verb::Disable),
    ("enable", Verb::Enable),
    ("stepi", Verb::StepInstruction),
    ("register", Verb::Register),
    ("memory", Verb::Memory),
    ("symbol", Verb::Symbol),
    ("help", Verb::Help),
    ("quit", Verb::Quit),
];

/// First entry of `table` that `word` is a prefix of. An exact match always
/// wins, so `break` never becomes `breakpoints`.
fn lookup<T: Copy>(table: &[(&str, T)], word: &str) -> Option<T>
{
    if word.is_empty() {
        return None;
    }
    table
        .iter()
        .find(|(name, _)| *name == word)
        .or_else(|| table.iter().find(|(name, _)| name.starts_with(word)))
        .map(|(_, value)| *value)
}

/// `0x`-prefixed hex or decimal.
///
/// # Errors
///
/// `InvalidNumber` for anything else.
pub fn parse_number(text: &str) -> Result<u64, CommandError>
{
    let cleaned = text.replace('_', "");
    let parsed = match cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => cleaned.parse::<u64>(),
    };
    parsed.map_err(|_| CommandError::InvalidNumber(text.to_string()))
}

struct Args<'a>
{
    words: std::str::SplitWhitespace<'a>,
}

impl<'a> Args<'a>
{
    fn next_word(&mut self, what: &'static str) -> Result<&'a str, CommandError>
    {
        self.words.next().ok_or(CommandError::MissingArgument(what))
    }

    fn address(&mut self) -> Result<Address, CommandError>
    {
        Ok(Address::new(parse_number(self.next_word("address")?)?))
    }

    fn value(&mut self) -> Result<u64, CommandError>
    {
        parse_number(self.next_word("value")?)
    }

    fn finish<T>(mut self, command: T) -> Result<T, CommandError>
    {
        match self.words.next() {
            Some(extra) => Err(CommandError::UnexpectedArgument(extra.to_string())),
            None => Ok(command),
        }
    }
}

impl Command
{
    /// Parse one input line. A blank line is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Unknown words, missing or extra arguments, malformed numbers.
    pub fn parse(line: &str) -> Result<Option<Self>, CommandError>
    {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            return Ok(None);
        };
        let verb = lookup(VERBS, first).ok_or_else(|| CommandError::UnknownCommand(first.to_string()))?;
        let mut args = Args { words };

        let command = match verb {
            Verb::Break => Command::Break(args.address()?),
            Verb::Delete => Command::Delete(args.address()?),
            Verb::Enable => Command::Enable(args.address()?),
            Verb::Disable => Command::Disable(args.address()?),
            Verb::Breakpoints => Command::Breakpoints,
            Verb::Continue => Command::Continue,
            Verb::StepInstruction => Command::StepInstruction,
            Verb::Register => Self::parse_register(&mut args)?,
            Verb::Memory => Self::parse_memory(&mut args)?,
            Verb::Symbol => match args.words.next() {
                Some(word) => Command::Symbol(Some(Address::new(parse_number(word)?))),
                None => Command::Symbol(None),
            },
            Verb::Help => Command::Help,
            Verb::Quit => Command::Quit,
        };
        args.finish(command).map(Some)
    }

    fn parse_register(args: &mut Args<'_>) -> Result<Self, CommandError>
    {
        #[derive(Clone, Copy)]
        enum Sub
        {
            Dump,
            Read,
            Write,
        }
        let word = args.next_word("register subcommand (dump, read, write)")?;
        let sub = lookup(&[("dump", Sub::Dump), ("read", Sub::Read), ("write", Sub::Write)], word).ok_or_else(
            || CommandError::UnknownSubcommand {
                command: "register",
                word: word.to_string(),
            },
        )?;
        Ok(match sub {
            Sub::Dump => Command::RegisterDump,
            Sub::Read => Command::RegisterRead(args.next_word("register name")?.to_string()),
            Sub::Write => {
                let name = args.next_word("register name")?.to_string();
                Command::RegisterWrite(name, args.value()?)
            }
        })
    }

    fn parse_memory(args: &mut Args<'_>) -> Result<Self, CommandError>
    {
        let word = args.next_word("memory subcommand (read, write)")?;
        match lookup(&[("read", false), ("write", true)], word) {
            Some(false) => Ok(Command::MemoryRead(args.address()?)),
            Some(true) => {
                let address = args.address()?;
                Ok(Command::MemoryWrite(address, args.value()?))
            }
            None => Err(CommandError::UnknownSubcommand {
                command: "memory",
                word: word.to_string(),
            }),
        }
    }
}

/// Run `command` against `session`, writing its report to `out`.
///
/// # Errors
///
/// Session errors pass through as `CommandError::Debugger`; the session is
/// still usable afterwards.
pub fn execute<T: Tracee>(
    session: &mut DebugSession<T>,
    command: &Command,
    out: &mut impl Write,
) -> Result<Flow, CommandError>
{
    match command {
        Command::Break(address) => {
            session.set_breakpoint_at(*address)?;
            writeln!(out, "Breakpoint set at {address}{}", location(session, *address))?;
        }
        Command::Delete(address) => {
            session.remove_breakpoint(*address)?;
            writeln!(out, "Breakpoint at {address} removed")?;
        }
        Command::Enable(address) => {
            session.enable_breakpoint(*address)?;
            writeln!(out, "Breakpoint at {address} enabled")?;
        }
        Command::Disable(address) => {
            session.disable_breakpoint(*address)?;
            writeln!(out, "Breakpoint at {address} disabled")?;
        }
        Command::Breakpoints => {
            let breakpoints = session.breakpoints();
            if breakpoints.is_empty() {
                writeln!(out, "No breakpoints.")?;
            }
            for info in breakpoints {
                writeln!(out, "{info}{}", location(session, info.address))?;
            }
        }
        Command::Continue => {
            let event = session.continue_execution()?;
            report_stop(session, event, out)?;
        }
        Command::StepInstruction => {
            let event = session.step_instruction()?;
            report_stop(session, event, out)?;
        }
        Command::RegisterDump => {
            for register in session.dump_registers()? {
                writeln!(out, "{register}")?;
            }
        }
        Command::RegisterRead(name) => {
            let value = session.read_register_by_name(name)?;
            writeln!(out, "{name} = 0x{value:016x}")?;
        }
        Command::RegisterWrite(name, value) => {
            session.write_register_by_name(name, *value)?;
            writeln!(out, "{name} = 0x{value:016x}")?;
        }
        Command::MemoryRead(address) => {
            let word = session.read_memory(*address)?;
            writeln!(out, "{address}: 0x{word:016x}")?;
        }
        Command::MemoryWrite(address, word) => {
            session.write_memory(*address, *word)?;
            writeln!(out, "{address}: 0x{word:016x}")?;
        }
        Command::Symbol(address) => {
            let address = match address {
                Some(address) => *address,
                None => session.program_counter()?,
            };
            let function = session.resolve_function(address)?;
            writeln!(out, "{address} is in {function}")?;
        }
        Command::Help => writeln!(out, "{HELP}")?,
        Command::Quit => return Ok(Flow::Quit),
    }
    Ok(Flow::Continue)
}

fn report_stop<T: Tracee>(session: &DebugSession<T>, event: StopEvent, out: &mut impl Write) -> Result<(), CommandError>
{
    writeln!(out, "{event}")?;
    if !event.is_exit() {
        let pc = session.program_counter()?;
        writeln!(out, "pc = {pc}{}", location(session, pc))?;
    }
    Ok(())
}

/// ` <function+offset>` for an address with a known function, else empty.
fn location<T: Tracee>(session: &DebugSession<T>, address: Address) -> String
{
    session
        .resolve_function(address)
        .map(|function| format_location(&function, address))
        .unwrap_or_default()
}

fn format_location(function: &FunctionDescriptor, address: Address) -> String
{
    match function.offset_of(address) {
        Some(0) => format!(" <{}>", function.name),
        Some(offset) => format!(" <{}+{offset:#x}>", function.name),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests
{
    use cinder_core::types::{SymbolLanguage, SymbolName};

    use super::*;

    fn parse(line: &str) -> Command
    {
        Command::parse(line).unwrap().unwrap()
    }

    #[test]
    fn test_blank_line_is_no_command()
    {
        assert_eq!(Command::parse("").unwrap(), None);
        assert_eq!(Command::parse("   \t ").unwrap(), None);
    }

    #[test]
    fn test_short_prefixes()
    {
        assert_eq!(parse("b 0x401000"), Command::Break(Address::new(0x401000)));
        assert_eq!(parse("c"), Command::Continue);
        assert_eq!(parse("d 16"), Command::Delete(Address::new(16)));
        assert_eq!(parse("s"), Command::StepInstruction);
        assert_eq!(parse("reg dump"), Command::RegisterDump);
        assert_eq!(parse("mem r 0x10"), Command::MemoryRead(Address::new(0x10)));
        assert_eq!(parse("q"), Command::Quit);
    }

    #[test]
    fn test_longer_prefixes_reach_later_verbs()
    {
        assert_eq!(parse("breakp"), Command::Breakpoints);
        assert_eq!(parse("dis 0x10"), Command::Disable(Address::new(0x10)));
        assert_eq!(parse("en 0x10"), Command::Enable(Address::new(0x10)));
        assert_eq!(parse("sy"), Command::Symbol(None));
        assert_eq!(parse("h"), Command::Help);
    }

    #[test]
    fn test_exact_word_beats_longer_verb()
    {
        assert_eq!(parse("break 0x10"), Command::Break(Address::new(0x10)));
        assert_eq!(parse("breakpoints"), Command::Breakpoints);
    }

    #[test]
    fn test_register_commands()
    {
        assert_eq!(parse("register read rip"), Command::RegisterRead("rip".to_string()));
        assert_eq!(
            parse("register write rax 0xdead_beef"),
            Command::RegisterWrite("rax".to_string(), 0xdead_beef)
        );
        assert!(matches!(
            Command::parse("register poke rax"),
            Err(CommandError::UnknownSubcommand { command: "register", .. })
        ));
        assert!(matches!(
            Command::parse("register write rax"),
            Err(CommandError::MissingArgument("value"))
        ));
    }

    #[test]
    fn test_memory_commands()
    {
        assert_eq!(
            parse("memory write 0x7ffc0000 42"),
            Command::MemoryWrite(Address::new(0x7ffc_0000), 42)
        );
        assert!(matches!(
            Command::parse("memory read"),
            Err(CommandError::MissingArgument("address"))
        ));
    }

    #[test]
    fn test_symbol_with_address()
    {
        assert_eq!(parse("symbol 0x401136"), Command::Symbol(Some(Address::new(0x401136))));
    }

    #[test]
    fn test_rejects_bad_input()
    {
        assert!(matches!(Command::parse("frobnicate"), Err(CommandError::UnknownCommand(_))));
        assert!(matches!(Command::parse("break xyz"), Err(CommandError::InvalidNumber(_))));
        assert!(matches!(Command::parse("break"), Err(CommandError::MissingArgument("address"))));
        assert!(matches!(
            Command::parse("continue now"),
            Err(CommandError::UnexpectedArgument(word)) if word == "now"
        ));
    }

    #[test]
    fn test_parse_number()
    {
        assert_eq!(parse_number("0x10").unwrap(), 16);
        assert_eq!(parse_number("0XFF").unwrap(), 255);
        assert_eq!(parse_number("1_000").unwrap(), 1000);
        assert_eq!(parse_number("0xffffffffffffffff").unwrap(), u64::MAX);
        assert!(parse_number("0x").is_err());
        assert!(parse_number("-1").is_err());
        assert!(parse_number("0x1_0000_0000_0000_0000").is_err());
    }

    #[test]
    fn test_format_location()
    {
        let function = FunctionDescriptor {
            name: SymbolName::new("main".to_string(), None, SymbolLanguage::C),
            low_pc: Address::new(0x1000),
            high_pc: Address::new(0x1040),
            compilation_unit: None,
        };
        assert_eq!(format_location(&function, Address::new(0x1000)), " <main>");
        assert_eq!(format_location(&function, Address::new(0x1004)), " <main+0x4>");
        assert_eq!(format_location(&function, Address::new(0x1040)), "");
    }

    #[test]
    fn test_help_lists_every_verb()
    {
        for (name, _) in VERBS {
            assert!(HELP.contains(name), "help is missing {name}");
        }
    }
}
