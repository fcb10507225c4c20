use crate::error::SessionError;
use crate::storage::ActiveSession;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Single-file lease that marks the one recording session allowed at a time.
pub struct SessionStateStore {
    path: PathBuf,
}

impl SessionStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[cfg(test)]
    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Current lease, if any. A missing or unreadable file counts as no lease.
    pub fn load(&self) -> Option<ActiveSession> {
        let content = fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(err) => {
                warn!(path = %self.path.display(), %err, "ignoring unparsable session state");
                None
            }
        }
    }

    /// Rewrite the whole state file.
    pub fn save(&self, session: &ActiveSession) -> io::Result<()> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(session)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        debug!(pid = session.process_id, path = %self.path.display(), "session state saved");
        Ok(())
    }

    /// Remove the state file. A file that is already gone is fine.
    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Take the lease for `session`, or fail with `Conflict` without touching
    /// the existing record. A record whose process is gone is stale and gets
    /// replaced.
    pub fn acquire(&self, session: &ActiveSession) -> Result<(), SessionError> {
        if let Some(existing) = self.load() {
            if process_alive(existing.process_id) {
                return Err(SessionError::Conflict {
                    pid: existing.process_id,
                    log_file: existing.log_file_path,
                });
            }
            warn!(pid = existing.process_id, "replacing stale session left by a dead recorder");
        }

        self.save(session)?;
        info!(pid = session.process_id, log = %session.log_file_path.display(), "session lease acquired");
        Ok(())
    }

    /// Drop the lease if it still belongs to `pid`.
    pub fn release(&self, pid: u32) -> io::Result<()> {
        match self.load() {
            Some(existing) if existing.process_id != pid => {
                debug!(owner = existing.process_id, pid, "lease held by another recorder, leaving it");
                Ok(())
            }
            _ => self.clear(),
        }
    }

    /// Ask the recording process to terminate and clear the lease.
    ///
    /// The lease is cleared even when the signal cannot be delivered, so a
    /// dead recorder never blocks the next `start`.
    pub fn stop(&self) -> Result<ActiveSession, SessionError> {
        let session = self
            .load()
            .ok_or_else(|| SessionError::NotFound("no active session".to_string()))?;

        let signalled = send_terminate(session.process_id);
        self.clear()?;

        match signalled {
            Ok(()) => {
                info!(pid = session.process_id, "termination signal sent");
                Ok(session)
            }
            Err(reason) => {
                warn!(pid = session.process_id, %reason, "termination signal failed");
                Err(SessionError::SignalFailed { pid: session.process_id, reason })
            }
        }
    }
}

#[cfg(unix)]
fn to_pid(pid: u32) -> Option<libc::pid_t> {
    libc::pid_t::try_from(pid).ok().filter(|p| *p > 1)
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };
    // SAFETY: signal 0 only performs the existence and permission check.
    let rc = unsafe { libc::kill(pid, 0) };
    rc == 0 || io::Error::last_os_error().raw_os_error() == Some(libc::EPERM)
}

#[cfg(not(unix))]
pub fn process_alive(_pid: u32) -> bool {
    true
}

#[cfg(unix)]
fn send_terminate(pid: u32) -> Result<(), String> {
    let target = to_pid(pid).ok_or_else(|| format!("refusing to signal pid {}", pid))?;
    // SAFETY: plain kill(2) on a single positive pid.
    let rc = unsafe { libc::kill(target, libc::SIGTERM) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error().to_string())
    }
}

#[cfg(not(unix))]
fn send_terminate(_pid: u32) -> Result<(), String> {
    Err("signals are not supported on this platform".to_string())
}
