use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use portable_pty::{Child, CommandBuilder, MasterPty, PtySize, native_pty_system};
use tracing::{debug, error, info};

use crate::errors::DaemonError;

/// What to run in a new PTY.
#[derive(Debug, Clone)]
pub struct SpawnSpec {
    /// `None` runs the user's login shell.
    pub command: Option<String>,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env_vars: Vec<(String, String)>,
    pub rows: u16,
    pub cols: u16,
}

/// One PTY child owned by the daemon.
pub struct ManagedPty {
    master: Box<dyn MasterPty + Send>,
    child: Box<dyn Child + Send + Sync>,
    /// portable-pty hands out the writer only once.
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
    size: PtySize,
}

impl std::fmt::Debug for ManagedPty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManagedPty")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

impl ManagedPty {
    pub fn size(&self) -> PtySize {
        self.size
    }

    pub fn try_clone_reader(&self) -> Result<Box<dyn std::io::Read + Send>, DaemonError> {
        self.master
            .try_clone_reader()
            .map_err(|e| DaemonError::PtyError(format!("clone reader: {}", e)))
    }

    pub fn write_stdin(&self, data: &[u8]) -> Result<(), DaemonError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| DaemonError::PtyError(format!("lock writer: {}", e)))?;
        writer
            .write_all(data)
            .and_then(|()| writer.flush())
            .map_err(|e| DaemonError::PtyError(format!("write stdin: {}", e)))
    }

    pub fn resize(&mut self, rows: u16, cols: u16) -> Result<(), DaemonError> {
        let new_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        self.master
            .resize(new_size)
            .map_err(|e| DaemonError::PtyError(format!("resize: {}", e)))?;
        self.size = new_size;
        debug!(event = "daemon.pty.resize_completed", rows = rows, cols = cols);
        Ok(())
    }

    pub fn child_process_id(&self) -> Option<u32> {
        self.child.process_id()
    }

    /// Blocks until the child exits.
    pub fn wait(&mut self) -> Result<portable_pty::ExitStatus, DaemonError> {
        self.child
            .wait()
            .map_err(|e| DaemonError::PtyError(format!("wait: {}", e)))
    }

    pub fn kill(&mut self) -> Result<(), DaemonError> {
        self.child
            .kill()
            .map_err(|e| DaemonError::PtyError(format!("kill: {}", e)))
    }
}

/// Every PTY the daemon owns, keyed by session id.
#[derive(Default)]
pub struct PtyManager {
    ptys: HashMap<String, ManagedPty>,
}

impl PtyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a PTY and spawn `spec` in it.
    pub fn create(&mut self, session_id: &str, spec: &SpawnSpec) -> Result<&ManagedPty, DaemonError> {
        if self.ptys.contains_key(session_id) {
            return Err(DaemonError::SessionAlreadyExists(session_id.to_string()));
        }

        let size = PtySize {
            rows: spec.rows,
            cols: spec.cols,
            pixel_width: 0,
            pixel_height: 0,
        };
        let pair = native_pty_system()
            .openpty(size)
            .map_err(|e| DaemonError::PtyError(format!("openpty: {}", e)))?;

        let mut cmd = match &spec.command {
            Some(command) => {
                let mut c = CommandBuilder::new(command);
                c.args(&spec.args);
                c
            }
            // new_default_prog() panics if .arg() is called on it.
            None => CommandBuilder::new_default_prog(),
        };
        cmd.cwd(&spec.working_dir);
        for (key, value) in &spec.env_vars {
            cmd.env(key, value);
        }

        info!(
            event = "daemon.pty.create_started",
            session_id = session_id,
            command = spec.command.as_deref().unwrap_or("<login shell>"),
            rows = spec.rows,
            cols = spec.cols,
        );

        let mut child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| DaemonError::PtyError(format!("spawn: {}", e)))?;
        let pid = child.process_id();

        let writer = match pair.master.take_writer() {
            Ok(w) => w,
            Err(e) => {
                if let Err(kill_err) = child.kill() {
                    error!(
                        event = "daemon.pty.create_cleanup_failed",
                        session_id = session_id,
                        error = %kill_err,
                    );
                }
                return Err(DaemonError::PtyError(format!("take writer: {}", e)));
            }
        };

        self.ptys.insert(
            session_id.to_string(),
            ManagedPty {
                master: pair.master,
                child,
                writer: Arc::new(Mutex::new(writer)),
                size,
            },
        );

        info!(
            event = "daemon.pty.create_completed",
            session_id = session_id,
            pid = ?pid,
        );

        self.ptys.get(session_id).ok_or_else(|| {
            DaemonError::PtyError("just-inserted PTY missing".to_string())
        })
    }

    pub fn get(&self, session_id: &str) -> Option<&ManagedPty> {
        self.ptys.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut ManagedPty> {
        self.ptys.get_mut(session_id)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<ManagedPty> {
        let pty = self.ptys.remove(session_id);
        if pty.is_some() {
            debug!(event = "daemon.pty.remove_completed", session_id = session_id);
        }
        pty
    }

    /// Kill the child and forget the PTY.
    pub fn destroy(&mut self, session_id: &str) -> Result<(), DaemonError> {
        let mut pty = self
            .ptys
            .remove(session_id)
            .ok_or_else(|| DaemonError::SessionNotFound(session_id.to_string()))?;
        pty.kill()?;
        info!(event = "daemon.pty.destroy_completed", session_id = session_id);
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.ptys.len()
    }

    pub fn session_ids(&self) -> Vec<String> {
        self.ptys.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(dir: &std::path::Path, command: Option<&str>, args: &[&str]) -> SpawnSpec {
        SpawnSpec {
            command: command.map(String::from),
            args: args.iter().map(|s| s.to_string()).collect(),
            working_dir: dir.to_path_buf(),
            env_vars: vec![("TERMHIVE_SESSION_ID".to_string(), "s1".to_string())],
            rows: 24,
            cols: 80,
        }
    }

    #[test]
    fn test_create_with_nonexistent_command_returns_error() {
        let mut mgr = PtyManager::new();
        let tmpdir = tempfile::tempdir().unwrap();
        let result = mgr.create(
            "s1",
            &spec(tmpdir.path(), Some("/nonexistent/binary/that/does/not/exist"), &[]),
        );
        match result {
            Err(DaemonError::PtyError(msg)) => {
                assert!(msg.contains("spawn"), "expected spawn error, got: {}", msg)
            }
            Err(other) => panic!("expected PtyError, got: {:?}", other),
            Ok(_) => panic!("expected error, got Ok"),
        }
        assert_eq!(mgr.count(), 0);
        assert!(mgr.get("s1").is_none());
    }

    #[test]
    fn test_create_with_duplicate_session_id_fails() {
        let mut mgr = PtyManager::new();
        let tmpdir = tempfile::tempdir().unwrap();
        let sleeper = spec(tmpdir.path(), Some("sleep"), &["10"]);

        mgr.create("s1", &sleeper).unwrap();
        match mgr.create("s1", &sleeper) {
            Err(DaemonError::SessionAlreadyExists(id)) => assert_eq!(id, "s1"),
            Err(other) => panic!("expected SessionAlreadyExists, got: {:?}", other),
            Ok(_) => panic!("expected error, got Ok"),
        }
        assert_eq!(mgr.count(), 1);

        let _ = mgr.destroy("s1");
    }

    #[test]
    fn test_create_and_destroy_lifecycle() {
        let mut mgr = PtyManager::new();
        let tmpdir = tempfile::tempdir().unwrap();

        let pid = mgr
            .create("s1", &spec(tmpdir.path(), Some("sleep"), &["10"]))
            .unwrap()
            .child_process_id();
        assert!(pid.is_some());
        assert_eq!(mgr.session_ids(), vec!["s1".to_string()]);

        mgr.destroy("s1").unwrap();
        assert_eq!(mgr.count(), 0);
    }

    #[test]
    fn test_login_shell_when_no_command() {
        let mut mgr = PtyManager::new();
        let tmpdir = tempfile::tempdir().unwrap();
        assert!(mgr.create("s1", &spec(tmpdir.path(), None, &[])).is_ok());
        mgr.destroy("s1").unwrap();
    }

    #[test]
    fn test_resize_updates_size() {
        let mut mgr = PtyManager::new();
        let tmpdir = tempfile::tempdir().unwrap();
        mgr.create("s1", &spec(tmpdir.path(), Some("sleep"), &["10"]))
            .unwrap();

        mgr.get_mut("s1").unwrap().resize(40, 120).unwrap();
        let size = mgr.get("s1").unwrap().size();
        assert_eq!((size.rows, size.cols), (40, 120));

        mgr.destroy("s1").unwrap();
    }

    #[test]
    fn test_destroy_nonexistent_returns_error() {
        let mut mgr = PtyManager::new();
        match mgr.destroy("nonexistent") {
            Err(DaemonError::SessionNotFound(id)) => assert_eq!(id, "nonexistent"),
            other => panic!("expected SessionNotFound, got: {:?}", other),
        }
    }
}
