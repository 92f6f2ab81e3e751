use crate::error::{io_error, MillError};
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;

const RETRY_INTERVAL: Duration = Duration::from_millis(50);

/// Filesystem-visible exclusive lock keyed by a target file path. The marker
/// is `<target>.lock`, created with `create_new` so acquisition is atomic
/// across processes; the holder's pid is written into it so a waiter can
/// tell a live holder from a dead one. Released on drop.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
}

impl LockFile {
    /// Waits up to `timeout` for the marker to be free. The wait is bounded:
    /// a live holder that never releases surfaces as `Timeout` here rather
    /// than a hung request. A marker whose recorded pid is dead is reclaimed
    /// and retried immediately.
    pub async fn acquire(target: &Path, timeout: Duration) -> Result<Self, MillError> {
        let path = lock_path(target);
        let deadline = Instant::now() + timeout;
        loop {
            match fs::OpenOptions::new()
                .create_new(true)
                .write(true)
                .open(&path)
            {
                Ok(mut file) => {
                    let _ = file.write_all(std::process::id().to_string().as_bytes());
                    return Ok(Self { path });
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                    if !holder_alive(&path) {
                        tracing::warn!(op = "lock.reclaim", path = %path.display(), "removing lock left by a dead holder");
                        let _ = fs::remove_file(&path);
                        continue;
                    }
                    if Instant::now() >= deadline {
                        return Err(MillError::Timeout {
                            timeout_s: timeout.as_secs(),
                        });
                    }
                    tokio::time::sleep(RETRY_INTERVAL).await;
                }
                Err(err) => return Err(io_error(&path, err)),
            }
        }
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

pub fn lock_path(target: &Path) -> PathBuf {
    let mut name = OsString::from(target.as_os_str());
    name.push(".lock");
    PathBuf::from(name)
}

/// A marker that vanished mid-read counts as free; one whose content is not
/// a pid yet (the holder is between create and write) counts as held.
fn holder_alive(path: &Path) -> bool {
    let Ok(raw) = fs::read_to_string(path) else {
        return false;
    };
    match raw.trim().parse::<u32>() {
        Ok(pid) => is_process_alive(pid),
        Err(_) => true,
    }
}

#[cfg(unix)]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .arg("-0")
        .arg(pid.to_string())
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
