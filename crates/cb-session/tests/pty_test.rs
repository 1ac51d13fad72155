use std::time::{Duration, Instant};

use cb_core::session_name::SessionPrefix;
use cb_session::pty::{PtyCommand, PtyHandle, PtyIo, TermSize, TmuxAttacher};

/// Drain output until `needle` shows up, the stream closes, or `timeout`.
fn read_until(handle: &PtyHandle, needle: &str, timeout: Duration) -> String {
    let rx = handle.output();
    let deadline = Instant::now() + timeout;
    let mut out = Vec::new();
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(chunk) => {
                out.extend_from_slice(&chunk);
                if String::from_utf8_lossy(&out).contains(needle) {
                    break;
                }
            }
            Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => break,
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[test]
fn spawn_reads_process_output() {
    let handle = PtyHandle::spawn(&PtyCommand::new("/bin/echo").args(["hello", "world"]))
        .expect("failed to spawn echo");

    let text = read_until(&handle, "hello world", Duration::from_secs(5));
    assert!(text.contains("hello world"), "got: {text:?}");
}

#[test]
fn output_disconnects_after_exit() {
    let handle = PtyHandle::spawn(&PtyCommand::new("/bin/sh").args(["-c", "echo done"]))
        .expect("failed to spawn sh");
    let rx = handle.output();

    let deadline = Instant::now() + Duration::from_secs(5);
    let mut disconnected = false;
    while Instant::now() < deadline {
        match rx.recv_timeout(Duration::from_millis(50)) {
            Ok(_) | Err(flume::RecvTimeoutError::Timeout) => continue,
            Err(flume::RecvTimeoutError::Disconnected) => {
                disconnected = true;
                break;
            }
        }
    }
    assert!(disconnected, "output channel stayed open after child exit");
}

#[test]
fn input_is_echoed_by_cat() {
    let handle = PtyHandle::spawn(&PtyCommand::new("/bin/cat")).expect("failed to spawn cat");

    handle.input().send(b"ping\n".to_vec()).unwrap();
    let text = read_until(&handle, "ping", Duration::from_secs(5));
    assert!(text.contains("ping"), "got: {text:?}");

    handle.kill().unwrap();
}

#[test]
fn spawn_uses_requested_size_and_resizes() {
    let handle = PtyHandle::spawn(&PtyCommand::new("/bin/cat").size(TermSize::new(200, 50)))
        .expect("failed to spawn cat");
    assert_eq!(handle.size().unwrap(), TermSize::new(200, 50));

    handle.resize(TermSize::new(120, 40)).unwrap();
    assert_eq!(handle.size().unwrap(), TermSize::new(120, 40));

    handle.kill().unwrap();
}

#[test]
fn kill_stops_the_child() {
    let handle = PtyHandle::spawn(&PtyCommand::new("/bin/cat")).expect("failed to spawn cat");
    assert!(handle.is_alive());

    handle.kill().unwrap();
    let deadline = Instant::now() + Duration::from_secs(5);
    while handle.is_alive() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!handle.is_alive());

    // Killing an exited child is a no-op.
    handle.kill().unwrap();
}

#[test]
fn spawn_missing_program_fails() {
    let result = PtyHandle::spawn(&PtyCommand::new("/nonexistent/definitely-not-here"));
    assert!(result.is_err());
}

#[test]
fn tmux_attacher_builds_attach_command() {
    let name = SessionPrefix::default().parse("mf-watch").unwrap();
    let cmd = TmuxAttacher::new("tmux")
        .with_cwd("/tmp")
        .command(&name, TermSize::new(200, 50));

    assert_eq!(cmd.program, "tmux");
    assert_eq!(cmd.args, ["attach-session", "-t", "=mf-watch"]);
    assert_eq!(cmd.cwd.as_deref(), Some(std::path::Path::new("/tmp")));
    assert!(cmd.env.contains(&("TERM".to_string(), "xterm-256color".to_string())));
    assert_eq!(cmd.size, TermSize::new(200, 50));
}
