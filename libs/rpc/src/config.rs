use serde::{Deserialize, Serialize};

use crate::shutdown::QuitSignal;

/// What the serve loop does when a message in a batch fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    /// Finish the batch, then stop serving and return the first error
    #[default]
    AbortLoop,
    /// Log the failure and keep serving; the message is left for redelivery
    IsolatePerMessage,
}

/// Server settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub failure_policy: FailurePolicy,
    /// Signals that stop the serve loop; none by default
    ///
    /// Once a signal has been listened for, its handler stays installed for
    /// the rest of the process: after `serve` returns that signal no longer
    /// terminates the process and is silently ignored.
    pub quit_signals: Vec<QuitSignal>,
}

impl ServerConfig {
    /// Also stop on SIGINT, SIGHUP and SIGTERM
    pub fn with_default_quit_signals(mut self) -> Self {
        self.quit_signals = QuitSignal::DEFAULTS.to_vec();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_abort_loop_without_signals() {
        let config = ServerConfig::default();

        assert_eq!(config.failure_policy, FailurePolicy::AbortLoop);
        assert!(config.quit_signals.is_empty());
    }

    #[test]
    fn deserializes_policy_and_signals() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"failure_policy": "isolate-per-message", "quit_signals": ["SIGTERM"]}"#,
        )
        .unwrap();

        assert_eq!(config.failure_policy, FailurePolicy::IsolatePerMessage);
        assert_eq!(config.quit_signals, vec![QuitSignal::Terminate]);
    }

    #[test]
    fn default_quit_signals_are_int_hup_term() {
        let config = ServerConfig::default().with_default_quit_signals();

        assert_eq!(config.quit_signals, QuitSignal::DEFAULTS.to_vec());
    }
}
