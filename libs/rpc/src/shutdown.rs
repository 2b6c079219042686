//! Quit signals and the per-server quit channel.
//!
//! Each server owns its own channel. OS signal listeners and [`QuitHandle`]s
//! feed it; the serve loop polls it between batches. Nothing here is global,
//! so several servers can run in one process without stepping on each other.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Process signal that asks a server to stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuitSignal {
    #[serde(rename = "SIGINT")]
    Interrupt,
    #[serde(rename = "SIGHUP")]
    Hangup,
    #[serde(rename = "SIGTERM")]
    Terminate,
    #[serde(rename = "SIGQUIT")]
    Quit,
}

impl QuitSignal {
    /// Signals a server usually listens on
    pub const DEFAULTS: [QuitSignal; 3] = [
        QuitSignal::Interrupt,
        QuitSignal::Hangup,
        QuitSignal::Terminate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Interrupt => "SIGINT",
            Self::Hangup => "SIGHUP",
            Self::Terminate => "SIGTERM",
            Self::Quit => "SIGQUIT",
        }
    }
}

impl fmt::Display for QuitSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Why a serve loop stopped receiving
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuitReason {
    Signal(QuitSignal),
    Requested,
}

impl fmt::Display for QuitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Signal(signal) => write!(f, "got signal {signal}"),
            Self::Requested => f.write_str("quit requested"),
        }
    }
}

/// Cloneable trigger for stopping a server from code
#[derive(Debug, Clone)]
pub struct QuitHandle {
    tx: mpsc::Sender<QuitReason>,
}

impl QuitHandle {
    /// Ask the server to stop after the batch in progress
    pub fn quit(&self) {
        // A full channel already holds a pending quit.
        let _ = self.tx.try_send(QuitReason::Requested);
    }
}

pub(crate) struct QuitChannel {
    tx: mpsc::Sender<QuitReason>,
    rx: mpsc::Receiver<QuitReason>,
    listeners: Vec<JoinHandle<()>>,
    closed: bool,
}

impl QuitChannel {
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel(1);
        Self {
            tx,
            rx,
            listeners: Vec::new(),
            closed: false,
        }
    }

    pub(crate) fn handle(&self) -> QuitHandle {
        QuitHandle {
            tx: self.tx.clone(),
        }
    }

    /// Start forwarding `signals` into the channel
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn listen(&mut self, signals: &[QuitSignal]) -> Result<()> {
        for &signal in signals {
            let listener = spawn_listener(signal, self.tx.clone())?;
            tracing::debug!(%signal, "listening for quit signal");
            self.listeners.push(listener);
        }
        Ok(())
    }

    /// Non-blocking check for a pending quit request
    pub(crate) fn try_recv(&mut self) -> Option<QuitReason> {
        self.rx.try_recv().ok()
    }

    /// Stop all listeners and release the channel
    pub(crate) fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.rx.close();
        for listener in self.listeners.drain(..) {
            listener.abort();
        }
    }
}

impl Drop for QuitChannel {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(unix)]
fn spawn_listener(signal: QuitSignal, tx: mpsc::Sender<QuitReason>) -> Result<JoinHandle<()>> {
    use tokio::signal::unix::{self, SignalKind};

    let kind = match signal {
        QuitSignal::Interrupt => SignalKind::interrupt(),
        QuitSignal::Hangup => SignalKind::hangup(),
        QuitSignal::Terminate => SignalKind::terminate(),
        QuitSignal::Quit => SignalKind::quit(),
    };
    let mut stream = unix::signal(kind).map_err(|source| Error::Signal { signal, source })?;

    Ok(tokio::spawn(async move {
        if stream.recv().await.is_some() {
            let _ = tx.try_send(QuitReason::Signal(signal));
        }
    }))
}

#[cfg(not(unix))]
fn spawn_listener(signal: QuitSignal, tx: mpsc::Sender<QuitReason>) -> Result<JoinHandle<()>> {
    // Only Ctrl-C exists here; every quit signal maps onto it.
    Ok(tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = tx.try_send(QuitReason::Signal(signal));
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quit_signals_use_conventional_names() {
        let signals: Vec<QuitSignal> =
            serde_json::from_str(r#"["SIGINT", "SIGHUP", "SIGTERM", "SIGQUIT"]"#).unwrap();

        assert_eq!(&signals[..3], &QuitSignal::DEFAULTS);
        assert_eq!(signals[3], QuitSignal::Quit);
        assert_eq!(QuitSignal::Terminate.to_string(), "SIGTERM");
    }

    #[tokio::test]
    async fn handle_quit_is_seen_once() {
        let mut channel = QuitChannel::new();
        let handle = channel.handle();

        handle.quit();
        handle.quit();

        assert_eq!(channel.try_recv(), Some(QuitReason::Requested));
        assert_eq!(channel.try_recv(), None);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_drops_later_requests() {
        let mut channel = QuitChannel::new();
        let handle = channel.handle();

        channel.close();
        channel.close();
        handle.quit();

        assert_eq!(channel.try_recv(), None);
    }
}
