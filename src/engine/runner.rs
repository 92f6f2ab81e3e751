use super::{EngineCommand, LockFile};
use crate::error::{io_error, MillError};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Grace window between group SIGTERM and force kill.
const TERM_GRACE: Duration = Duration::from_secs(5);
/// Bound on pipe draining after a kill; an orphan still holding the
/// inherited pipe must not stall the caller.
const DRAIN_GRACE: Duration = Duration::from_secs(2);
const STDERR_DETAIL_LIMIT: usize = 2048;

#[derive(Debug)]
pub struct EngineOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Drives one engine invocation to completion. The child runs headless in
/// its own process group; on timeout the whole group gets SIGTERM, a grace
/// wait, then a group SIGKILL and a reap, and the caller always sees
/// `Timeout` rather than the child's own status. A non-zero exit becomes
/// `ExecutionFailed` carrying captured stderr.
///
/// When `exclusive_target` is set, its filesystem lock is held for the
/// entire lifetime including the termination ladder. Lock wait and process
/// wait share one deadline derived from `timeout`.
pub async fn run_engine(
    command: &EngineCommand,
    working_dir: &Path,
    timeout: Duration,
    exclusive_target: Option<&Path>,
) -> Result<EngineOutput, MillError> {
    let deadline = tokio::time::Instant::now() + timeout;
    let _lock = match exclusive_target {
        Some(target) => Some(LockFile::acquire(target, timeout).await?),
        None => None,
    };

    let mut spawn = Command::new(&command.binary);
    spawn
        .args(&command.args)
        .current_dir(working_dir)
        // headless regardless of host environment
        .env("DISPLAY", "")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    spawn.process_group(0);

    let mut child = spawn
        .spawn()
        .map_err(|err| io_error(Path::new(&command.binary), err))?;
    let pid = child.id();
    tracing::debug!(op = "engine.spawn", pid, command = %command.display_form(), "spawned engine process");

    // Drain pipes concurrently with the wait; a full pipe buffer would
    // otherwise deadlock a chatty child against our timeout.
    let stdout_reader = drain(child.stdout.take());
    let stderr_reader = drain(child.stderr.take());

    let status = match tokio::time::timeout_at(deadline, child.wait()).await {
        Ok(Ok(status)) => status,
        Ok(Err(err)) => {
            let _ = stdout_reader.await;
            let _ = stderr_reader.await;
            return Err(io_error(Path::new(&command.binary), err));
        }
        Err(_) => {
            tracing::warn!(op = "engine.timeout", pid, timeout_s = timeout.as_secs(), "engine timed out; terminating process group");
            signal_group(pid, "TERM");
            if tokio::time::timeout(TERM_GRACE, child.wait()).await.is_err() {
                tracing::warn!(op = "engine.force_kill", pid, "engine ignored SIGTERM; killing the group");
                signal_group(pid, "KILL");
                let _ = child.kill().await;
            }
            finish_drain(stdout_reader).await;
            finish_drain(stderr_reader).await;
            return Err(MillError::Timeout {
                timeout_s: timeout.as_secs(),
            });
        }
    };

    let stdout = stdout_reader.await.unwrap_or_default();
    let stderr = stderr_reader.await.unwrap_or_default();
    let exit_code = status.code().unwrap_or(-1);

    if !status.success() {
        return Err(MillError::ExecutionFailed {
            detail: format!(
                "engine exited with code {exit_code}: {}",
                truncate(&stderr, STDERR_DETAIL_LIMIT)
            ),
        });
    }

    Ok(EngineOutput {
        exit_code,
        stdout,
        stderr,
    })
}

fn drain<R>(handle: Option<R>) -> JoinHandle<String>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut reader) = handle {
            let _ = reader.read_to_end(&mut buf).await;
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

/// Awaits a drain reader, but never past `DRAIN_GRACE`.
async fn finish_drain(mut reader: JoinHandle<String>) {
    if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
        reader.abort();
    }
}

/// Signals the whole process group; the child was spawned with
/// `process_group(0)`, so its pgid equals its pid. The `--` separator keeps
/// the negative pgid from being parsed as an option.
#[cfg(unix)]
fn signal_group(pid: Option<u32>, signal: &str) {
    let Some(pid) = pid else { return };
    let _ = std::process::Command::new("kill")
        .arg(format!("-{signal}"))
        .arg("--")
        .arg(format!("-{pid}"))
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();
}

#[cfg(not(unix))]
fn signal_group(_pid: Option<u32>, _signal: &str) {}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        return text.trim_end().to_string();
    }
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated, total {} bytes]", &text[..end], text.len())
}
