//! End-to-end session scenarios driven through a scripted port

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use common::ScriptedPort;
use proptest::prelude::*;
use syswatch::config::DecodeConfig;
use syswatch::error::{AttachError, PortError, SessionError};
use syswatch::filter::SyscallFilter;
use syswatch::record::{EventType, Level, RenderedEvent};
use syswatch::session::{SessionState, Termination, TraceSession};
use syswatch::sink::MemorySink;

const PID: i32 = 4242;

fn plain() -> DecodeConfig {
    DecodeConfig {
        include_types: false,
        include_addresses: false,
        include_argument_names: false,
        ..Default::default()
    }
}

fn traced(port: ScriptedPort, decode: DecodeConfig) -> (TraceSession<ScriptedPort>, MemorySink) {
    traced_with_cancel(port, decode, Arc::default())
}

fn traced_with_cancel(
    port: ScriptedPort,
    decode: DecodeConfig,
    cancel: Arc<AtomicBool>,
) -> (TraceSession<ScriptedPort>, MemorySink) {
    let sink = MemorySink::new();
    let mut session = TraceSession::new(port, decode, cancel);
    session.add_sink(Box::new(sink.clone()));
    (session, sink)
}

fn messages(events: &[RenderedEvent]) -> Vec<String> {
    events.iter().map(|e| e.human.message.clone()).collect()
}

fn types(events: &[RenderedEvent]) -> Vec<EventType> {
    events.iter().map(|e| e.structured.event_type).collect()
}

#[test]
fn test_write_then_exit() {
    let port = ScriptedPort::new()
        .map(0x1000, b"hi\0")
        .enter(1, &[1, 0x1000, 2])
        .exit(1, 2)
        .enter(231, &[0])
        .process_exit(0);
    let (mut session, sink) = traced(port, plain());

    session.attach(PID).unwrap();
    let summary = session.run().unwrap();

    assert_eq!(summary.termination, Termination::Exited(0));
    assert_eq!(summary.records_emitted, 4);
    let events = sink.events();
    assert_eq!(
        messages(&events),
        vec![
            "ENTER: PID=4242 | write(1, \"hi\", 2)",
            "EXIT: write = 2",
            "ENTER: PID=4242 | exit_group(0)",
            "EXIT_PROCESS: PID=4242 | code=0",
        ]
    );
    assert_eq!(
        types(&events),
        vec![
            EventType::Enter,
            EventType::Exit,
            EventType::Enter,
            EventType::ExitProcess
        ]
    );
    assert_eq!(session.port().detaches, 1);
    assert_eq!(session.state(), SessionState::Terminated);
}

#[test]
fn test_structured_record_carries_arguments() {
    let port = ScriptedPort::new()
        .map(0x1000, b"hi\0")
        .enter(1, &[1, 0x1000, 2])
        .exit(1, 2)
        .process_exit(0);
    let (mut session, sink) = traced(port, DecodeConfig::default());
    session.attach(PID).unwrap();
    session.run().unwrap();

    let events = sink.events();
    let enter = &events[0].structured;
    assert_eq!(enter.syscall_name.as_deref(), Some("write"));
    assert_eq!(enter.syscall_id, Some(1));
    let args = enter.arguments.as_ref().unwrap();
    assert_eq!(args.len(), 3);
    assert_eq!(args[1].raw_value, 0x1000);
    assert_eq!(args[1].decoded_text, "0x1000 \"hi\"");
    assert_eq!(args[1].name.as_deref(), Some("buf"));
    assert_eq!(
        events[0].human.message,
        "ENTER: PID=4242 | write(int fd=1, const void *buf=0x1000 \"hi\", size_t count=2)"
    );

    let exit = &events[1].structured;
    assert_eq!(exit.result_code, Some(2));
    assert_eq!(exit.result_text.as_deref(), Some("2"));
    assert!(exit.arguments.is_none());
}

#[test]
fn test_each_pointer_argument_is_read_once() {
    let port = ScriptedPort::new()
        .map(0x1000, b"hi\0")
        .map(0x2000, b"/etc/hosts\0")
        .enter(1, &[1, 0x1000, 2])
        .exit(1, 2)
        .enter(2, &[0x2000, 0, 0])
        .exit(2, 3)
        .process_exit(0);
    let (mut session, sink) = traced(port, DecodeConfig::default());
    session.attach(PID).unwrap();
    session.run().unwrap();

    assert_eq!(session.port().memory_reads.get(), 2);
    let events = sink.events();
    let args = events[2].structured.arguments.as_ref().unwrap();
    assert_eq!(args[0].decoded_text, "0x2000 \"/etc/hosts\"");
    assert!(events[2].human.message.contains(&args[0].decoded_text));
}

#[test]
fn test_write_buffer_shows_only_counted_bytes() {
    let port = ScriptedPort::new()
        .map(0x1000, b"hi there, secret\0")
        .map(0x3000, b"a\0bc")
        .enter(1, &[1, 0x1000, 2])
        .exit(1, 2)
        .enter(1, &[1, 0x3000, 4])
        .exit(1, 4)
        .process_exit(0);
    let (mut session, sink) = traced(port, plain());
    session.attach(PID).unwrap();
    session.run().unwrap();

    let events = sink.events();
    assert_eq!(events[0].human.message, "ENTER: PID=4242 | write(1, \"hi\", 2)");
    assert_eq!(
        events[2].human.message,
        "ENTER: PID=4242 | write(1, \"a\\x00bc\", 4)"
    );
}

#[test]
fn test_attach_to_missing_process_emits_nothing() {
    let mut port = ScriptedPort::new();
    port.attach_error = Some(AttachError::NotFound { pid: 999999 });
    let (mut session, sink) = traced(port, plain());

    let err = session.attach(999999).unwrap_err();
    assert_eq!(err, AttachError::NotFound { pid: 999999 });
    assert!(matches!(session.run(), Err(SessionError::NotAttached)));
    assert!(sink.events().is_empty());
    assert_eq!(session.port().waits, 0);
    assert_eq!(session.port().detaches, 0);
}

#[test]
fn test_long_path_is_truncated_at_limit() {
    let mut path = vec![b'a'; 300];
    path.push(0);
    let port = ScriptedPort::new()
        .map(0x2000, &path)
        .enter(2, &[0x2000, 0, 0])
        .exit(2, -2)
        .process_exit(0);
    let decode = DecodeConfig {
        string_max_length: 256,
        ..plain()
    };
    let (mut session, sink) = traced(port, decode);
    session.attach(PID).unwrap();
    session.run().unwrap();

    let events = sink.events();
    let expected = format!("ENTER: PID=4242 | open(\"{}\"..., 0, 0)", "a".repeat(256));
    assert_eq!(events[0].human.message, expected);
    assert_eq!(
        events[1].human.message,
        "EXIT: open = -1 ENOENT (No such file or directory)"
    );
    assert_eq!(events[1].structured.result_code, Some(-2));
}

#[test]
fn test_cancellation_detaches_once_without_waiting_again() {
    let cancel = Arc::new(AtomicBool::new(false));
    let port = ScriptedPort::new()
        .enter(39, &[])
        .exit(39, 77)
        .enter(39, &[])
        .exit(39, 77)
        .process_exit(0)
        .cancel_on_wait(1, Arc::clone(&cancel));
    let (mut session, sink) = traced_with_cancel(port, plain(), cancel);

    session.attach(PID).unwrap();
    let summary = session.run().unwrap();

    assert_eq!(summary.termination, Termination::Cancelled);
    // The event returned by the cancelling wait is still processed
    assert_eq!(messages(&sink.events()), vec!["ENTER: PID=4242 | getpid()", "EXIT: getpid = 77"]);
    assert_eq!(session.port().waits, 2);
    assert_eq!(session.port().detaches, 1);

    session.detach().unwrap();
    assert_eq!(session.port().detaches, 1);
}

#[test]
fn test_cancel_before_first_wait() {
    let cancel = Arc::new(AtomicBool::new(true));
    let port = ScriptedPort::new().enter(39, &[]).process_exit(0);
    let (mut session, sink) = traced_with_cancel(port, plain(), cancel);

    session.attach(PID).unwrap();
    assert_eq!(session.run().unwrap().termination, Termination::Cancelled);
    assert!(sink.events().is_empty());
    assert_eq!(session.port().waits, 0);
    assert_eq!(session.port().detaches, 1);
}

#[test]
fn test_unknown_syscall_number() {
    let port = ScriptedPort::new()
        .enter(9999, &[1, 2, 3, 4, 5, 6])
        .exit(9999, -38)
        .process_exit(0);
    let (mut session, sink) = traced(port, DecodeConfig::default());
    session.attach(PID).unwrap();
    session.run().unwrap();

    let events = sink.events();
    assert_eq!(events[0].structured.syscall_name.as_deref(), Some("syscall_9999"));
    assert_eq!(events[0].structured.syscall_id, Some(9999));
    assert_eq!(
        events[0].human.message,
        "ENTER: PID=4242 | syscall_9999(0x1, 0x2, 0x3, 0x4, 0x5, 0x6)"
    );
    assert!(events[0].structured.arguments.as_ref().unwrap().iter().all(|a| a.name.is_none()));
    assert_eq!(events[1].structured.syscall_name.as_deref(), Some("syscall_9999"));
    // No return semantics are known, so the raw value is shown
    assert_eq!(events[1].human.message, "EXIT: syscall_9999 = -38");
    assert_eq!(events[1].structured.result_code, Some(-38));
}

#[test]
fn test_signal_between_enter_and_exit_keeps_pairing() {
    let port = ScriptedPort::new()
        .enter(0, &[0, 0x3000, 16])
        .signal(2)
        .exit(0, -4)
        .enter(0, &[0, 0x3000, 16])
        .exit(0, 5)
        .process_exit(130);
    let (mut session, sink) = traced(port, plain());
    session.attach(PID).unwrap();
    let summary = session.run().unwrap();

    let events = sink.events();
    assert_eq!(
        types(&events),
        vec![
            EventType::Enter,
            EventType::Signal,
            EventType::Exit,
            EventType::Enter,
            EventType::Exit,
            EventType::ExitProcess,
        ]
    );
    assert_eq!(events[1].human.message, "SIGNAL: PID=4242 | SIGINT (2)");
    assert_eq!(events[1].human.level, Level::Warning);
    assert!(events[2].human.message.starts_with("EXIT: read = -1 EINTR"));
    assert_eq!(summary.termination, Termination::Exited(130));
    // Every event except the process exit is followed by a resume
    assert_eq!(session.port().resumes, 5);
}

#[test]
fn test_unreadable_pointer_does_not_stop_tracing() {
    let port = ScriptedPort::new()
        .enter(2, &[0xdead_0000, 0, 0])
        .exit(2, -14)
        .process_exit(0);
    let (mut session, sink) = traced(port, DecodeConfig::default());
    session.attach(PID).unwrap();
    session.run().unwrap();

    let events = sink.events();
    assert!(events[0].human.message.contains("filename=0xdead0000 <unreadable>"));
    assert_eq!(events.len(), 3);
}

#[test]
fn test_filtered_syscalls_are_tracked_but_not_emitted() {
    let port = ScriptedPort::new()
        .enter(39, &[])
        .exit(39, 1)
        .enter(3, &[4])
        .exit(3, 0)
        .process_exit(0);
    let filter = SyscallFilter::from_expr("trace=close").unwrap();
    let sink = MemorySink::new();
    let mut session = TraceSession::new(port, plain(), Arc::default()).with_filter(filter);
    session.add_sink(Box::new(sink.clone()));
    session.attach(PID).unwrap();
    session.run().unwrap();

    assert_eq!(
        messages(&sink.events()),
        vec![
            "ENTER: PID=4242 | close(4)",
            "EXIT: close = 0",
            "EXIT_PROCESS: PID=4242 | code=0",
        ]
    );
    assert!(session.stats().get("getpid").is_none());
    assert_eq!(session.stats().get("close").unwrap().count, 1);
}

#[test]
fn test_port_failure_mid_trace_still_detaches() {
    let mut port = ScriptedPort::new()
        .enter(39, &[])
        .port_error("ECHILD");
    port.detach_error = Some(PortError::Detach("ESRCH".into()));
    let (mut session, sink) = traced(port, plain());
    session.attach(PID).unwrap();

    let err = session.run().unwrap_err();
    // A failing detach never replaces the original error
    assert!(matches!(err, SessionError::Port(PortError::Wait(ref m)) if m == "ECHILD"));
    assert_eq!(session.port().detaches, 1);
    assert_eq!(sink.events().len(), 1);
}

#[test]
fn test_dropping_attached_session_detaches() {
    let port = ScriptedPort::new();
    let detach_log = Arc::clone(&port.detach_log);
    let mut session = TraceSession::new(port, plain(), Arc::default());
    session.attach(PID).unwrap();
    drop(session);
    assert_eq!(detach_log.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_after_run_does_not_detach_twice() {
    let port = ScriptedPort::new().process_exit(0);
    let detach_log = Arc::clone(&port.detach_log);
    let (mut session, _) = traced(port, plain());
    session.attach(PID).unwrap();
    session.run().unwrap();
    drop(session);
    assert_eq!(detach_log.load(Ordering::SeqCst), 1);
}

#[test]
fn test_summary_counts_completed_calls() {
    let port = ScriptedPort::new()
        .enter(39, &[])
        .exit(39, 1)
        .enter(39, &[])
        .exit(39, 1)
        .enter(2, &[0, 0, 0])
        .exit(2, -13)
        .process_exit(0);
    let (mut session, _) = traced(port, plain());
    session.attach(PID).unwrap();
    session.run().unwrap();

    let stats = session.stats();
    assert_eq!(stats.get("getpid").unwrap().count, 2);
    assert_eq!(stats.get("open").unwrap().errors, 1);
    assert_eq!(stats.totals().total_calls, 3);
}

proptest! {
    #[test]
    fn prop_phases_alternate_for_any_script(numbers in prop::collection::vec(0i64..400, 0..40)) {
        let mut port = ScriptedPort::new();
        for &n in &numbers {
            port = port.enter(n, &[0, 0, 0, 0, 0, 0]).exit(n, 0);
        }
        port = port.process_exit(0);
        let (mut session, sink) = traced(port, plain());
        session.attach(PID).unwrap();
        session.run().unwrap();

        let events = sink.events();
        prop_assert_eq!(events.len(), numbers.len() * 2 + 1);
        for (i, pair) in events[..events.len() - 1].chunks(2).enumerate() {
            prop_assert_eq!(pair[0].structured.event_type, EventType::Enter);
            prop_assert_eq!(pair[1].structured.event_type, EventType::Exit);
            prop_assert_eq!(&pair[0].structured.syscall_name, &pair[1].structured.syscall_name);
            prop_assert_eq!(pair[0].structured.syscall_id, Some(numbers[i]));
        }
        prop_assert_eq!(session.port().detaches, 1);
    }
}
