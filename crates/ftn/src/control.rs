//! Daemon control: signals, pid file, runtime log level.
//!
//! Signal handlers never run application logic; each delivery becomes
//! one [`ControlEvent`] on a channel the daemon loop consumes at its
//! next iteration. SIGPIPE stays at its default (ignored by the Rust
//! runtime).

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::{Error, Result};

/// One decoded control signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlEvent {
    /// TERM/INT: finish in-flight work, then exit.
    Shutdown,
    /// HUP: reload configuration, atomically swapping the old one.
    Reload,
    /// USR1: log current statistics.
    Stats,
    /// USR2: toggle debug logging.
    ToggleDebug,
}

/// The daemon-side receiver of control events.
pub struct ControlChannel {
    rx: mpsc::UnboundedReceiver<ControlEvent>,
}

impl ControlChannel {
    /// Installs signal handlers and returns the channel. Must run
    /// inside a tokio runtime.
    #[cfg(unix)]
    pub fn install() -> Result<ControlChannel> {
        use tokio::signal::unix::{signal, SignalKind};

        let (tx, rx) = mpsc::unbounded_channel();
        let mut term = signal(SignalKind::terminate()).map_err(Error::Io)?;
        let mut int = signal(SignalKind::interrupt()).map_err(Error::Io)?;
        let mut hup = signal(SignalKind::hangup()).map_err(Error::Io)?;
        let mut usr1 = signal(SignalKind::user_defined1()).map_err(Error::Io)?;
        let mut usr2 = signal(SignalKind::user_defined2()).map_err(Error::Io)?;

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = term.recv() => ControlEvent::Shutdown,
                    _ = int.recv() => ControlEvent::Shutdown,
                    _ = hup.recv() => ControlEvent::Reload,
                    _ = usr1.recv() => ControlEvent::Stats,
                    _ = usr2.recv() => ControlEvent::ToggleDebug,
                };
                if tx.send(event).is_err() {
                    break;
                }
            }
        });
        Ok(ControlChannel { rx })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<ControlChannel> {
        // No POSIX signals; the channel simply never fires.
        let (_tx, rx) = mpsc::unbounded_channel();
        std::mem::forget(_tx);
        Ok(ControlChannel { rx })
    }

    /// A channel driven by the caller instead of signals.
    pub fn manual() -> (mpsc::UnboundedSender<ControlEvent>, ControlChannel) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, ControlChannel { rx })
    }

    /// The next control event; pends forever once all senders are gone.
    pub async fn recv(&mut self) -> ControlEvent {
        match self.rx.recv().await {
            Some(event) => event,
            None => std::future::pending().await,
        }
    }
}

static DEBUG_TOGGLED: AtomicBool = AtomicBool::new(false);

/// Flips the global log level between the configured maximum and
/// `debug`; returns the level now in force.
pub fn toggle_debug(configured: log::LevelFilter) -> log::LevelFilter {
    let debugging = !DEBUG_TOGGLED.fetch_xor(true, Ordering::SeqCst);
    let level = if debugging {
        log::LevelFilter::Debug.max(configured)
    } else {
        configured
    };
    log::set_max_level(level);
    level
}

/// A pid file created at daemon start and removed on drop. An existing
/// file is fatal; stale files must be cleaned up by the operator.
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(path: impl Into<PathBuf>) -> Result<PidFile> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        match std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                use std::io::Write;
                writeln!(file, "{}", std::process::id())?;
                Ok(PidFile { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Err(Error::config(
                format!("pid file {} already exists", path.display()),
            )),
            Err(e) => Err(e.into()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn manual_channel_delivers_events() {
        let (tx, mut channel) = ControlChannel::manual();
        tx.send(ControlEvent::Stats).unwrap();
        tx.send(ControlEvent::Shutdown).unwrap();
        assert_eq!(channel.recv().await, ControlEvent::Stats);
        assert_eq!(channel.recv().await, ControlEvent::Shutdown);
    }

    #[test]
    fn pid_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pid");
        {
            let pid_file = PidFile::create(&path).unwrap();
            assert!(pid_file.path().exists());
            let content = std::fs::read_to_string(&path).unwrap();
            assert_eq!(content.trim(), std::process::id().to_string());
            // A second daemon cannot start over the same pid file.
            assert!(matches!(PidFile::create(&path), Err(Error::Config(_))));
        }
        assert!(!path.exists());
    }
}
