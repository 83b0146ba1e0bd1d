//! Running a converter as a child process with a hard deadline.
//!
//! stdout and stderr are piped and drained on separate tasks while we wait,
//! so a chatty converter cannot deadlock on a full pipe buffer.
//!
//! On Unix the child leads its own process group. Office suites in
//! particular fork helper processes; when the deadline passes, or the
//! awaiting future is dropped, the whole group gets `SIGKILL`, not only the
//! direct child.

use crate::error::ConvertError;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How long to wait for stdout/stderr to reach EOF after the child is gone.
const PIPE_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Largest diagnostic excerpt kept from stderr/stdout.
const MAX_DIAGNOSTIC_BYTES: usize = 4096;

/// Outcome of one converter run.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit status; `None` when killed by a signal (including our timeout kill).
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// `true` if the deadline passed and the process group was killed.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ExecResult {
    /// Exited on its own with status 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == Some(0)
    }

    /// Captured stderr, or stdout when stderr is empty, trimmed and capped.
    pub fn diagnostic(&self) -> String {
        let raw = if self.stderr.iter().any(|b| !b.is_ascii_whitespace()) {
            &self.stderr
        } else {
            &self.stdout
        };
        let text = String::from_utf8_lossy(raw);
        let text = text.trim();
        if text.len() <= MAX_DIAGNOSTIC_BYTES {
            return text.to_string();
        }
        let mut end = MAX_DIAGNOSTIC_BYTES;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}\u{2026}", &text[..end])
    }
}

/// Spawn `argv` and wait at most `timeout` for it to finish.
///
/// Returns `Ok` for every outcome where the process actually ran, including
/// non-zero exits and timeouts; classification is the caller's job. `Err` is
/// reserved for "could not run at all".
pub async fn run(argv: &[String], timeout: Duration) -> Result<ExecResult, ConvertError> {
    let Some((program, args)) = argv.split_first() else {
        return Err(ConvertError::Internal(
            "refusing to spawn an empty command".into(),
        ));
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    debug!("exec {:?} timeout={:?}", argv, timeout);
    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| ConvertError::ToolSpawnFailed {
        program: program.clone(),
        source: e,
    })?;
    let mut group = GroupGuard::new(child.id());

    let mut stdout_task = tokio::spawn(drain(child.stdout.take()));
    let mut stderr_task = tokio::spawn(drain(child.stderr.take()));

    let (exit_code, timed_out) = match tokio::time::timeout(timeout, child.wait()).await {
        Ok(Ok(status)) => (status.code(), false),
        Ok(Err(e)) => {
            group.kill();
            return Err(ConvertError::Internal(format!(
                "waiting for '{program}' failed: {e}"
            )));
        }
        Err(_) => {
            warn!("'{}' exceeded {:?}; killing process group", program, timeout);
            group.kill();
            if let Err(e) = child.kill().await {
                debug!("kill after timeout: {}", e);
            }
            (None, true)
        }
    };

    let stdout = collect(&mut stdout_task, &mut group).await;
    let stderr = collect(&mut stderr_task, &mut group).await;
    group.disarm();

    let elapsed = start.elapsed();
    debug!(
        "'{}' finished: code={:?} timed_out={} in {}ms",
        program,
        exit_code,
        timed_out,
        elapsed.as_millis()
    );

    Ok(ExecResult {
        exit_code,
        stdout,
        stderr,
        timed_out,
        elapsed,
    })
}

async fn drain<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut p) = pipe {
        if let Err(e) = p.read_to_end(&mut buf).await {
            debug!("pipe read error: {}", e);
        }
    }
    buf
}

/// Wait for a drain task; if a straggler still holds the pipe open past the
/// grace period, kill the group and keep whatever was read so far.
async fn collect(task: &mut JoinHandle<Vec<u8>>, group: &mut GroupGuard) -> Vec<u8> {
    match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut *task).await {
        Ok(Ok(buf)) => buf,
        Ok(Err(e)) => {
            warn!("pipe drain task failed: {}", e);
            Vec::new()
        }
        Err(_) => {
            warn!("converter left processes holding its output pipes; killing group");
            group.kill();
            match tokio::time::timeout(PIPE_DRAIN_GRACE, &mut *task).await {
                Ok(Ok(buf)) => buf,
                _ => {
                    task.abort();
                    Vec::new()
                }
            }
        }
    }
}

/// Kills the child's process group when dropped while armed, so a cancelled
/// request never leaves a converter running.
struct GroupGuard {
    pgid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    fn new(pgid: Option<u32>) -> Self {
        Self { pgid, armed: true }
    }

    fn kill(&mut self) {
        if let Some(pgid) = self.pgid {
            kill_process_group(pgid);
        }
    }

    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if self.armed {
            self.kill();
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pgid: u32) {
    let Ok(pgid) = libc::pid_t::try_from(pgid) else {
        return;
    };
    // SAFETY: killpg has no memory-safety preconditions; a stale or empty
    // group only yields ESRCH.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        debug!(
            "killpg({}) failed: {}",
            pgid,
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(unix))]
fn kill_process_group(_pgid: u32) {}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".into(), "-c".into(), script.into()]
    }

    #[tokio::test]
    async fn captures_exit_code_and_streams() {
        let r = run(&sh("echo out; echo err >&2; exit 3"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(r.exit_code, Some(3));
        assert!(!r.timed_out);
        assert!(!r.success());
        assert_eq!(String::from_utf8_lossy(&r.stdout).trim(), "out");
        assert_eq!(String::from_utf8_lossy(&r.stderr).trim(), "err");
        assert_eq!(r.diagnostic(), "err");
    }

    #[tokio::test]
    async fn diagnostic_falls_back_to_stdout() {
        let r = run(&sh("echo only-stdout; exit 1"), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(r.diagnostic(), "only-stdout");
    }

    #[tokio::test]
    async fn stderr_on_success_is_not_failure() {
        let r = run(&sh("echo 'warning: font substituted' >&2"), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(r.success());
    }

    #[tokio::test]
    async fn timeout_kills_child() {
        let start = Instant::now();
        let r = run(&sh("sleep 30"), Duration::from_millis(300))
            .await
            .unwrap();
        assert!(r.timed_out);
        assert!(!r.success());
        assert_eq!(r.exit_code, None);
        assert!(start.elapsed() < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn large_output_does_not_deadlock() {
        // ~1 MiB on stdout, well beyond a pipe buffer.
        let r = run(
            &sh("head -c 1048576 /dev/zero | tr '\\0' 'a'"),
            Duration::from_secs(20),
        )
        .await
        .unwrap();
        assert!(r.success());
        assert_eq!(r.stdout.len(), 1_048_576);
    }

    #[tokio::test]
    async fn missing_program_is_spawn_failure() {
        let err = run(
            &["/definitely/not/a/converter".to_string()],
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ConvertError::ToolSpawnFailed { .. }));
    }

    #[tokio::test]
    async fn empty_argv_is_rejected() {
        let err = run(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, ConvertError::Internal(_)));
    }

    #[test]
    fn diagnostic_is_capped() {
        let r = ExecResult {
            exit_code: Some(1),
            stdout: Vec::new(),
            stderr: vec![b'x'; MAX_DIAGNOSTIC_BYTES * 2],
            timed_out: false,
            elapsed: Duration::ZERO,
        };
        let d = r.diagnostic();
        assert!(d.ends_with('\u{2026}'));
        assert!(d.len() <= MAX_DIAGNOSTIC_BYTES + 3);
    }
}
