//! Integration tests for the pty execution engine
//!
//! These spawn real shells on real pseudo-terminals, so they run serially.

use std::io::{self, Cursor, Read};
use std::sync::mpsc;
use std::time::{Duration, Instant};

use bashhub::{ExecError, ExecOptions, Executor, Substitutions, substitute};
use serial_test::serial;

async fn run(script: &str) -> (String, bashhub::ExitOutcome) {
    let mut output = String::new();
    let outcome = Executor::default()
        .execute(script, io::empty(), |chunk| output.push_str(chunk))
        .await
        .expect("execution should succeed");
    (output, outcome)
}

// =============================================================================
// Exit status and output
// =============================================================================

#[tokio::test]
#[serial]
async fn test_echo_streams_output_and_succeeds() {
    let (output, outcome) = run("echo hello").await;

    assert!(output.contains("hello"), "output was {:?}", output);
    assert_eq!(outcome.exit_code, 0);
    assert!(outcome.success);
    assert!(outcome.read_error.is_none());
}

#[tokio::test]
#[serial]
async fn test_exit_code_is_reported() {
    let (_, outcome) = run("exit 7").await;

    assert_eq!(outcome.exit_code, 7);
    assert!(!outcome.success);
    assert!(outcome.read_error.is_none());
}

#[tokio::test]
#[serial]
async fn test_unknown_command_is_a_normal_exit() {
    let (output, outcome) = run("definitely-not-a-command-bh").await;

    assert_eq!(outcome.exit_code, 127);
    assert!(output.contains("not found"), "output was {:?}", output);
}

#[tokio::test]
#[serial]
async fn test_stderr_shares_the_terminal() {
    let (output, outcome) = run("echo to-stderr >&2").await;

    assert!(outcome.success);
    assert!(output.contains("to-stderr"));
}

#[tokio::test]
#[serial]
async fn test_output_arrives_in_order() {
    let (output, outcome) = run("seq 1 500").await;

    assert!(outcome.success);
    let numbers: Vec<u32> = output.split_whitespace().map(|n| n.parse().unwrap()).collect();
    assert_eq!(numbers, (1..=500).collect::<Vec<u32>>());
}

#[tokio::test]
#[serial]
async fn test_multibyte_output_is_decoded() {
    let (output, _) = run("printf 'héllo ✓\\n'").await;

    assert!(output.contains("héllo ✓"), "output was {:?}", output);
    assert!(!output.contains('\u{fffd}'));
}

#[tokio::test]
#[serial]
async fn test_child_sees_a_terminal() {
    let (output, outcome) = run("if [ -t 0 ] && [ -t 1 ]; then echo is-tty; else echo no-tty; fi").await;

    assert!(outcome.success);
    assert!(output.contains("is-tty"), "output was {:?}", output);
}

#[tokio::test]
#[serial]
async fn test_pty_uses_requested_size() {
    let executor = Executor::new(ExecOptions {
        rows: 33,
        cols: 101,
        ..ExecOptions::default()
    });
    let mut output = String::new();
    let outcome = executor
        .execute("stty size", io::empty(), |chunk| output.push_str(chunk))
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(output.contains("33 101"), "output was {:?}", output);
}

// =============================================================================
// Input forwarding
// =============================================================================

#[tokio::test]
#[serial]
async fn test_input_is_forwarded_to_the_script() {
    let mut output = String::new();
    let outcome = Executor::default()
        .execute(
            "read -r line; echo \"got:$line\"",
            Cursor::new(b"hello\n".to_vec()),
            |chunk| output.push_str(chunk),
        )
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(output.contains("got:hello"), "output was {:?}", output);
}

#[tokio::test]
#[serial]
async fn test_placeholders_then_execute() {
    let values: Substitutions = [("greeting".to_string(), "hi there".to_string())].into_iter().collect();
    let script = substitute("echo '{{ greeting }}'; exit {{code}}", &values);
    assert_eq!(script, "echo 'hi there'; exit {{code}}");

    // bash rejects the unresolved token as an exit status
    let (output, outcome) = run(&script).await;
    assert!(output.contains("hi there"));
    assert!(!outcome.success);
}

#[tokio::test]
#[serial]
async fn test_unread_input_does_not_stall_the_run() {
    // Far more than a pty input queue holds, and the script never reads it
    let input = Cursor::new(b"aaaaaaaaaaaaaaa\n".repeat(65536));

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        Executor::default().execute("sleep 0.5; exit 3", input, |_| {}),
    )
    .await
    .expect("run should finish while the input pump is stuck writing")
    .unwrap();

    assert_eq!(outcome.exit_code, 3);
}

/// Input source whose reads block until the test drops the sender
struct HeldInput(mpsc::Receiver<()>);

impl Read for HeldInput {
    fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
        let _ = self.0.recv();
        Ok(0)
    }
}

#[tokio::test]
#[serial]
async fn test_input_that_never_ends_does_not_hold_the_run() {
    let (hold, held) = mpsc::channel();
    let started = Instant::now();

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        Executor::default().execute("echo done", HeldInput(held), |_| {}),
    )
    .await
    .expect("run should return while the input read is still blocked")
    .unwrap();

    assert!(outcome.success);
    assert!(started.elapsed() < Duration::from_secs(5), "took {:?}", started.elapsed());
    drop(hold);
}

// =============================================================================
// Output after exit
// =============================================================================

#[tokio::test]
#[serial]
async fn test_background_job_does_not_hold_the_run() {
    let executor = Executor::new(ExecOptions {
        drain_timeout: Duration::from_millis(200),
        ..ExecOptions::default()
    });
    let started = Instant::now();
    let mut output = String::new();

    let outcome = executor
        .execute("sleep 3 & echo hi", io::empty(), |chunk| output.push_str(chunk))
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "drain should give up before the background job exits, took {:?}",
        started.elapsed()
    );
    // Closing the writer may echo a bare newline after the script's output
    assert!(output.trim_end().ends_with("hi"), "output was {:?}", output);
}

// =============================================================================
// Failures and termination
// =============================================================================

#[tokio::test]
#[serial]
async fn test_missing_shell_is_start_failure() {
    let executor = Executor::new(ExecOptions {
        shell: "/nonexistent/bh-test-shell".to_string(),
        ..ExecOptions::default()
    });

    let result = executor.execute("echo never", io::empty(), |_| {}).await;

    match result {
        Err(ExecError::ProcessStartFailed { shell, .. }) => assert_eq!(shell, "/nonexistent/bh-test-shell"),
        other => panic!("expected ProcessStartFailed, got {:?}", other),
    }
}

#[tokio::test]
#[serial]
async fn test_terminate_ends_a_long_run() {
    let session = Executor::default().spawn("sleep 30", io::empty()).unwrap();
    assert!(session.pid().is_some());

    let terminator = session.terminator();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        terminator.terminate().unwrap();
    });

    let outcome = tokio::time::timeout(Duration::from_secs(10), session.finish(|_| {}))
        .await
        .expect("terminated session should finish promptly")
        .unwrap();

    assert!(!outcome.success);
    assert!(outcome.duration < Duration::from_secs(10));
}

#[tokio::test]
#[serial]
async fn test_terminate_after_finish_is_a_no_op() {
    let session = Executor::default().spawn("exit 0", io::empty()).unwrap();
    let terminator = session.terminator();

    let outcome = session.finish(|_| {}).await.unwrap();
    assert!(outcome.success);

    // The pid has been reaped; nothing may be signalled
    terminator.terminate().unwrap();
    terminator.terminate().unwrap();
}

#[tokio::test]
#[serial]
async fn test_default_execute_uses_defaults() {
    let mut output = String::new();
    let outcome = bashhub::execute("echo via-default", |chunk| output.push_str(chunk))
        .await
        .unwrap();

    assert!(outcome.success);
    assert!(output.contains("via-default"));
}

// =============================================================================
// Resource cleanup
// =============================================================================

#[cfg(target_os = "linux")]
fn open_fd_count() -> usize {
    std::fs::read_dir("/proc/self/fd").unwrap().count()
}

#[cfg(target_os = "linux")]
#[tokio::test]
#[serial]
async fn test_sequential_runs_do_not_leak_descriptors() {
    // Warm up lazily opened handles (runtime, logging, /dev/ptmx probing)
    run("true").await;
    let before = open_fd_count();

    for i in 0..25 {
        let (_, outcome) = run(&format!("echo run-{}", i)).await;
        assert!(outcome.success);
    }
    for _ in 0..5 {
        let _ = run("exit 3").await;
    }

    let after = open_fd_count();
    assert!(after <= before + 2, "descriptor count grew from {} to {}", before, after);
}
