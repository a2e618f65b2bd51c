//! VCS state probe - best-effort git revision and dirty flag

use std::io::Read;
use std::path::Path;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use crate::sync::CancelFlag;
use crate::{Error, Result};

/// How often a running git command is checked for exit or cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Revision and working-tree state at sync time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VcsState {
    /// Commit id of `HEAD`, empty when unknown
    pub revision: String,
    pub dirty: bool,
}

/// Ask git for the current revision and whether the working tree has changes.
///
/// Outside a repository, without git installed, or on any other git failure
/// this returns an empty revision and a clean tree. The only error is
/// [`Error::Cancelled`]: a raised `cancel` kills the running git command.
pub fn probe(root: &Path, cancel: &CancelFlag) -> Result<VcsState> {
    let revision = match git(root, &["rev-parse", "HEAD"], cancel)? {
        Some(out) => out.trim().to_string(),
        None => return Ok(VcsState::default()),
    };

    let dirty = match git(root, &["status", "--porcelain"], cancel)? {
        Some(out) => !out.trim().is_empty(),
        None => return Ok(VcsState::default()),
    };

    Ok(VcsState { revision, dirty })
}

fn git(root: &Path, args: &[&str], cancel: &CancelFlag) -> Result<Option<String>> {
    cancel.check()?;

    let mut child = match Command::new("git")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!("git {} failed to start: {}", args.join(" "), e);
            return Ok(None);
        }
    };

    // Drained on its own thread so a large `status` cannot fill the pipe
    // while we poll.
    let stdout = child.stdout.take().map(|mut out| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            out.read_to_end(&mut buf).map(|_| buf)
        })
    });

    let Some(status) = wait(&mut child, args, cancel)? else {
        return Ok(None);
    };

    if !status.success() {
        tracing::debug!("git {} exited with {}", args.join(" "), status);
        return Ok(None);
    }

    Ok(Some(String::from_utf8_lossy(&collect_output(stdout)).into_owned()))
}

/// Poll `child` until it exits, killing it if `cancel` is raised.
fn wait(child: &mut Child, args: &[&str], cancel: &CancelFlag) -> Result<Option<ExitStatus>> {
    loop {
        if cancel.is_cancelled() {
            tracing::debug!("Cancelling git {}", args.join(" "));
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Cancelled);
        }

        match child.try_wait() {
            Ok(Some(status)) => return Ok(Some(status)),
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                tracing::warn!("waiting for git {} failed: {}", args.join(" "), e);
                let _ = child.kill();
                let _ = child.wait();
                return Ok(None);
            }
        }
    }
}

fn collect_output(reader: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> Vec<u8> {
    match reader.map(JoinHandle::join) {
        Some(Ok(Ok(buf))) => buf,
        Some(Ok(Err(e))) => {
            tracing::warn!("reading git output failed: {}", e);
            Vec::new()
        }
        Some(Err(_)) => {
            tracing::warn!("git output reader panicked");
            Vec::new()
        }
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_outside_repository_is_clean() {
        let dir = TempDir::new().unwrap();
        // Only meaningful when the temp dir is not itself inside a work tree.
        let state = probe(dir.path(), &CancelFlag::new()).unwrap();
        if state.revision.is_empty() {
            assert!(!state.dirty);
        }
    }

    #[test]
    fn test_missing_directory_is_clean() {
        let state = probe(Path::new("/nonexistent/repograph/probe"), &CancelFlag::new()).unwrap();
        assert_eq!(state, VcsState::default());
    }

    #[test]
    fn test_cancelled_probe_runs_no_git() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        cancel.cancel();

        let err = probe(dir.path(), &cancel).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_cancel_kills_running_command() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelFlag::new();
        let mut child = Command::new("sleep")
            .arg("30")
            .current_dir(dir.path())
            .spawn()
            .unwrap();

        let raiser = cancel.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            raiser.cancel();
        });

        let started = std::time::Instant::now();
        let err = wait(&mut child, &["sleep"], &cancel).unwrap_err();
        handle.join().unwrap();

        assert!(matches!(err, Error::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(10));
        assert!(child.try_wait().unwrap().is_some());
    }
}
