//! Integration tests against real traced processes
//!
//! These tests require:
//! - Linux on x86-64
//! - ptrace permitted for child processes (blocked in some containers)
//! - `/bin/true` on the host
//!
//! Tests are skipped (they pass with a note on stderr) when a tracee cannot
//! be launched.

#![cfg(all(target_os = "linux", target_arch = "x86_64"))]

use std::path::Path;

use cinder_core::breakpoints::INT3;
use cinder_core::{launch, DebugSession, DebuggerError, DwarfResolver, PtraceProcess, RegisterId, SessionState, StopEvent};

const TRUE: &str = "/bin/true";

fn launch_or_skip(program: &str) -> Option<PtraceProcess>
{
    if !Path::new(program).exists() {
        eprintln!("skipping: {program} not found");
        return None;
    }
    match launch(program, &[]) {
        Ok(process) => Some(process),
        Err(err) => {
            eprintln!("skipping: cannot trace {program}: {err}");
            None
        }
    }
}

fn entry_point(process: &PtraceProcess) -> cinder_core::Address
{
    let path = process.executable_path().unwrap();
    let load_address = process.load_address().unwrap();
    DwarfResolver::load(path, load_address).unwrap().entry_point()
}

#[test]
fn test_launch_starts_loaded()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let session = DebugSession::new(process);
    assert_eq!(session.state(), SessionState::Loaded);
    assert!(session.pid().raw() > 0);
    assert!(session.program_counter().unwrap().value() != 0);
}

#[test]
fn test_launch_missing_program_fails()
{
    let result = launch("/nonexistent/cinder-test-binary", &[]);
    assert!(matches!(result, Err(DebuggerError::LaunchFailed(_))));
}

#[test]
fn test_run_to_exit()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let mut session = DebugSession::new(process);
    let event = session.continue_execution().unwrap();
    assert_eq!(event, StopEvent::Exited { status: 0 });
    assert_eq!(session.state(), SessionState::Exited);
    assert!(matches!(session.continue_execution(), Err(DebuggerError::ProcessExited)));
}

#[test]
fn test_breakpoint_at_entry()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let entry = entry_point(&process);
    let mut session = DebugSession::new(process);

    let original = session.read_memory(entry).unwrap();
    session.set_breakpoint_at(entry).unwrap();
    assert_eq!(session.read_memory(entry).unwrap() & 0xff, u64::from(INT3));
    assert_eq!(session.read_memory(entry).unwrap() & !0xff, original & !0xff);

    // hit: pc sits one byte past the trap
    let event = session.continue_execution().unwrap();
    assert!(event.is_trap());
    assert_eq!(session.state(), SessionState::Stopped);
    assert_eq!(session.program_counter().unwrap(), entry + 1);
    assert_eq!(session.breakpoints()[0].hit_count, 1);

    // step over: original instruction runs, trap is re-armed
    let step = session.step_over_breakpoint_if_present().unwrap();
    assert!(step.is_some_and(|event| event.is_single_step()));
    let pc = session.program_counter().unwrap();
    assert_ne!(pc, entry);
    assert_ne!(pc, entry + 1);
    assert_eq!(session.read_memory(entry).unwrap() & 0xff, u64::from(INT3));

    let event = session.continue_execution().unwrap();
    assert_eq!(event, StopEvent::Exited { status: 0 });
}

#[test]
fn test_remove_breakpoint_restores_memory()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let entry = entry_point(&process);
    let mut session = DebugSession::new(process);

    let original = session.read_memory(entry).unwrap();
    session.set_breakpoint_at(entry).unwrap();
    session.remove_breakpoint(entry).unwrap();
    assert_eq!(session.read_memory(entry).unwrap(), original);

    assert_eq!(session.continue_execution().unwrap(), StopEvent::Exited { status: 0 });
}

#[test]
fn test_stack_memory_round_trip()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let mut session = DebugSession::new(process);

    let rsp = session.read_register(RegisterId::Rsp).unwrap();
    let slot = cinder_core::Address::new(rsp - 256);
    let word = 0xdead_beef_cafe_f00d;
    session.write_memory(slot, word).unwrap();
    assert_eq!(session.read_memory(slot).unwrap(), word);

    // unrelated memory writes leave registers alone
    assert_eq!(session.read_register(RegisterId::Rsp).unwrap(), rsp);
}

#[test]
fn test_register_round_trip()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let mut session = DebugSession::new(process);

    for (index, name) in ["rax", "rbx", "r12", "r15"].into_iter().enumerate() {
        let value = 0x1111_2222_3333_0000 + index as u64;
        session.write_register_by_name(name, value).unwrap();
        assert_eq!(session.read_register_by_name(name).unwrap(), value, "{name}");
    }

    let dump = session.dump_registers().unwrap();
    let rip = dump.iter().find(|reg| reg.id == RegisterId::Rip).unwrap();
    assert_eq!(rip.value, session.program_counter().unwrap().value());

    assert!(matches!(session.read_register_by_name("nope"), Err(DebuggerError::UnknownRegister(_))));
}

#[test]
fn test_unresolved_symbol_is_not_found()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let session = DebugSession::new(process);
    let err = session.resolve_function(cinder_core::Address::new(0x10)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_kill_ends_session()
{
    let Some(process) = launch_or_skip(TRUE) else {
        return;
    };
    let mut session = DebugSession::new(process);
    session.kill().unwrap();
    assert_eq!(session.state(), SessionState::Exited);
    assert!(matches!(session.read_memory(cinder_core::Address::new(0)), Err(DebuggerError::ProcessExited)));
}
