//! Tests for error handling

use cinder_core::error::{DebuggerError, ErrorKind, Result};
use cinder_core::types::Address;
use nix::errno::Errno;

#[test]
fn test_ptrace_error_message()
{
    let error = DebuggerError::ptrace("PEEKDATA", Errno::EIO);
    let message = error.to_string();
    assert!(message.contains("PEEKDATA"));
    assert_eq!(error.kind(), ErrorKind::Os);
}

#[test]
fn test_ptrace_error_source()
{
    use std::error::Error;

    let error = DebuggerError::ptrace("GETREGS", Errno::ESRCH);
    let source = error.source().expect("ptrace errors carry the errno");
    assert_eq!(source.to_string(), Errno::ESRCH.to_string());
}

#[test]
fn test_not_found_errors()
{
    let errors = [
        DebuggerError::UnknownRegister("xmm0".to_string()),
        DebuggerError::UnknownDwarfRegister(99),
        DebuggerError::SymbolNotFound(Address::new(0x10)),
        DebuggerError::NoBreakpoint(Address::new(0x10)),
    ];
    for error in &errors {
        assert_eq!(error.kind(), ErrorKind::NotFound, "{error}");
        assert!(error.is_not_found());
    }
}

#[test]
fn test_protocol_errors()
{
    assert_eq!(DebuggerError::NotStopped.kind(), ErrorKind::Protocol);
    assert_eq!(DebuggerError::ProcessExited.kind(), ErrorKind::Protocol);
    assert_eq!(DebuggerError::DuplicateBreakpoint(Address::new(1)).kind(), ErrorKind::Protocol);
    assert!(!DebuggerError::NotStopped.is_not_found());
}

#[test]
fn test_error_messages_include_address()
{
    let error = DebuggerError::NoBreakpoint(Address::new(0x401000));
    assert!(error.to_string().contains("0x0000000000401000"));
}

#[test]
fn test_io_error_conversion()
{
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
    let error: DebuggerError = io.into();
    assert!(matches!(error, DebuggerError::Io(_)));
    assert_eq!(error.kind(), ErrorKind::Os);
}

#[test]
fn test_result_alias()
{
    fn lookup(found: bool) -> Result<u64>
    {
        if found {
            Ok(1)
        } else {
            Err(DebuggerError::DebugInfo("no .debug_info".to_string()))
        }
    }

    assert_eq!(lookup(true).unwrap(), 1);
    assert_eq!(lookup(false).unwrap_err().kind(), ErrorKind::Symbols);
}
