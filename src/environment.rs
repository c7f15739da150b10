//! Environment-aware reconnection triggers.
//!
//! The host application reports visibility and network changes through an
//! [`EnvironmentNotifier`]; the matching [`EnvironmentSource`] is handed to
//! the client builder and observed by the connection supervisor until
//! `disconnect()`.
//!
//! - `Visible` / `Online`: reconnect right away when the link is down and no
//!   retry is already scheduled.
//! - `Offline`: drop the link and cancel retries until the network is back.
//! - `Hidden`: informational only.

use std::fmt;

use tokio::sync::mpsc;

/// A change in the host environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvironmentSignal {
    /// The application became visible / returned to the foreground.
    Visible,
    Hidden,
    /// Network connectivity was restored.
    Online,
    /// Network connectivity was lost.
    Offline,
}

impl EnvironmentSignal {
    /// Signals that should bring a dropped link back.
    pub fn wants_reconnect(&self) -> bool {
        matches!(self, EnvironmentSignal::Visible | EnvironmentSignal::Online)
    }
}

impl fmt::Display for EnvironmentSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvironmentSignal::Visible => write!(f, "visible"),
            EnvironmentSignal::Hidden => write!(f, "hidden"),
            EnvironmentSignal::Online => write!(f, "online"),
            EnvironmentSignal::Offline => write!(f, "offline"),
        }
    }
}

/// Sending half, kept by whatever observes the host environment.
#[derive(Debug, Clone)]
pub struct EnvironmentNotifier {
    tx: mpsc::UnboundedSender<EnvironmentSignal>,
}

impl EnvironmentNotifier {
    /// Report a signal. Returns `false` once the client was dropped.
    ///
    /// Signals sent between `disconnect()` and the next `connect()` are
    /// accepted but ignored.
    pub fn notify(&self, signal: EnvironmentSignal) -> bool {
        self.tx.send(signal).is_ok()
    }

    pub fn visible(&self) -> bool {
        self.notify(EnvironmentSignal::Visible)
    }

    pub fn hidden(&self) -> bool {
        self.notify(EnvironmentSignal::Hidden)
    }

    pub fn online(&self) -> bool {
        self.notify(EnvironmentSignal::Online)
    }

    pub fn offline(&self) -> bool {
        self.notify(EnvironmentSignal::Offline)
    }

    /// Whether the client is still alive. Stays `true` after `disconnect()`.
    pub fn is_attached(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Receiving half, installed on the client builder.
#[derive(Debug)]
pub struct EnvironmentSource {
    rx: mpsc::UnboundedReceiver<EnvironmentSignal>,
}

impl EnvironmentSource {
    pub(crate) fn into_receiver(self) -> mpsc::UnboundedReceiver<EnvironmentSignal> {
        self.rx
    }
}

/// Create a connected notifier/source pair.
pub fn channel() -> (EnvironmentNotifier, EnvironmentSource) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EnvironmentNotifier { tx }, EnvironmentSource { rx })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_classification() {
        assert!(EnvironmentSignal::Visible.wants_reconnect());
        assert!(EnvironmentSignal::Online.wants_reconnect());
        assert!(!EnvironmentSignal::Hidden.wants_reconnect());
        assert!(!EnvironmentSignal::Offline.wants_reconnect());
    }

    #[test]
    fn test_notifier_detaches_when_source_dropped() {
        let (notifier, source) = channel();
        assert!(notifier.online());
        assert!(notifier.is_attached());

        let mut rx = source.into_receiver();
        assert_eq!(rx.try_recv().ok(), Some(EnvironmentSignal::Online));

        drop(rx);
        assert!(!notifier.offline());
        assert!(!notifier.is_attached());
    }
}
