//! Running child processes with a timeout and bounded output capture.

use std::io::{Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, instrument, warn};
use wait_timeout::ChildExt;

/// One captured output stream, bounded in memory.
#[derive(Debug, Default)]
pub struct Captured {
    pub bytes: Vec<u8>,
    /// Bytes read from the pipe but not kept.
    pub dropped: usize,
}

impl Captured {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

/// Result of a finished (or killed) child process.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub stdout: Captured,
    pub stderr: Captured,
    pub timed_out: bool,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.success()
    }

    pub fn stdout_text(&self) -> String {
        self.stdout.text()
    }

    /// Trimmed stderr, noting how much was cut off.
    pub fn stderr_text(&self) -> String {
        let mut text = self.stderr.text().trim().to_string();
        if self.stderr.dropped > 0 {
            text.push_str(&format!(" [stderr truncated {} bytes]", self.stderr.dropped));
        }
        text
    }
}

/// Run `cmd` to completion or until `timeout`, whichever comes first.
///
/// Both pipes are drained on their own threads while the child runs; at most
/// `capture_limit` bytes of each are kept. A child that outlives `timeout` is
/// killed and reported with `timed_out` set rather than as an error.
#[instrument(skip_all, fields(timeout_secs = timeout.as_secs(), capture_limit = capture_limit))]
pub fn run_command_with_timeout(
    mut cmd: Command,
    stdin: Option<&[u8]>,
    timeout: Duration,
    capture_limit: usize,
) -> Result<CommandOutput> {
    cmd.stdin(if stdin.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped());

    let mut child = cmd.spawn().context("spawn command")?;
    debug!(pid = child.id(), "child spawned");

    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input).context("write stdin")?;
    }

    let stdout = drain(child.stdout.take(), capture_limit).context("stdout was not piped")?;
    let stderr = drain(child.stderr.take(), capture_limit).context("stderr was not piped")?;

    let (status, timed_out) = wait_or_kill(&mut child, timeout)?;
    let stdout = collect(stdout).context("collect stdout")?;
    let stderr = collect(stderr).context("collect stderr")?;

    if stdout.dropped > 0 || stderr.dropped > 0 {
        warn!(
            stdout_dropped = stdout.dropped,
            stderr_dropped = stderr.dropped,
            "command output exceeded capture limit"
        );
    }
    debug!(exit_code = ?status.code(), timed_out, "command finished");

    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        timed_out,
    })
}

type Drain = thread::JoinHandle<Result<Captured>>;

fn drain<R: Read + Send + 'static>(pipe: Option<R>, limit: usize) -> Option<Drain> {
    pipe.map(|pipe| thread::spawn(move || capture(pipe, limit)))
}

fn collect(handle: Drain) -> Result<Captured> {
    handle
        .join()
        .map_err(|_| anyhow!("output reader thread panicked"))?
}

fn wait_or_kill(child: &mut Child, timeout: Duration) -> Result<(ExitStatus, bool)> {
    if let Some(status) = child.wait_timeout(timeout).context("wait for command")? {
        return Ok((status, false));
    }
    warn!(timeout_secs = timeout.as_secs(), "command timed out, killing");
    child.kill().context("kill command")?;
    let status = child.wait().context("wait for killed command")?;
    Ok((status, true))
}

/// Read `pipe` to EOF, keeping the first `limit` bytes.
fn capture(mut pipe: impl Read, limit: usize) -> Result<Captured> {
    let mut captured = Captured::default();
    let mut chunk = [0u8; 8192];
    loop {
        let n = pipe.read(&mut chunk).context("read output")?;
        if n == 0 {
            return Ok(captured);
        }
        let keep = n.min(limit.saturating_sub(captured.bytes.len()));
        captured.bytes.extend_from_slice(&chunk[..keep]);
        captured.dropped += n - keep;
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn captures_stdout_and_stderr() {
        let out = run_command_with_timeout(
            sh("echo out; echo err 1>&2"),
            None,
            Duration::from_secs(10),
            1024,
        )
        .expect("run");
        assert!(out.success());
        assert_eq!(out.stdout_text(), "out\n");
        assert_eq!(out.stderr_text(), "err");
    }

    #[test]
    fn truncates_beyond_limit() {
        let out = run_command_with_timeout(sh("printf 0123456789"), None, Duration::from_secs(10), 4)
            .expect("run");
        assert_eq!(out.stdout.bytes, b"0123");
        assert_eq!(out.stdout.dropped, 6);
    }

    #[test]
    fn kills_on_timeout() {
        let out = run_command_with_timeout(sh("sleep 5"), None, Duration::from_millis(100), 1024)
            .expect("run");
        assert!(out.timed_out);
        assert!(!out.success());
    }

    #[test]
    fn stderr_text_notes_truncation() {
        let out = run_command_with_timeout(
            sh("printf abcdef 1>&2; exit 3"),
            None,
            Duration::from_secs(10),
            2,
        )
        .expect("run");
        assert!(!out.success());
        assert_eq!(out.status.code(), Some(3));
        assert_eq!(out.stderr_text(), "ab [stderr truncated 4 bytes]");
    }

    #[test]
    fn feeds_stdin() {
        let out = run_command_with_timeout(sh("cat"), Some(b"hello"), Duration::from_secs(10), 1024)
            .expect("run");
        assert_eq!(out.stdout_text(), "hello");
    }
}
