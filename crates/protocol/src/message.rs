use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CONTROL_PORT, DEFAULT_READY_TIMEOUT_S};

/// Condition the agent must observe before it reports the container as ready.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum WaitCondition {
    /// A TCP connection to this container port succeeds.
    #[serde(rename = "Port")]
    PortReachable(u16),
    /// A line of the entrypoint's stdout contains this text.
    #[serde(rename = "Stdout")]
    StdoutMatches(String),
    /// The command exits successfully. With `interval_msec == 0` the command
    /// runs once; otherwise it is retried at that period until it succeeds.
    #[serde(rename = "Command")]
    CommandSucceeds { argv: Vec<String>, interval_msec: u64 },
}

/// Everything the agent needs to prepare the container and judge readiness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupMessage {
    /// Control port the agent listens on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Conditions that must all hold before the agent reports ready.
    #[serde(default)]
    pub wait_for: Vec<WaitCondition>,

    /// Seconds the agent allows for the wait conditions.
    #[serde(default = "default_ready_timeout")]
    pub ready_timeout_s: u64,

    /// `(path, base64 content)` pairs written before the entrypoint starts.
    #[serde(default)]
    pub files: Vec<(String, String)>,
}

fn default_port() -> u16 {
    DEFAULT_CONTROL_PORT
}

fn default_ready_timeout() -> u64 {
    DEFAULT_READY_TIMEOUT_S
}

impl Default for SetupMessage {
    fn default() -> Self {
        Self {
            port: DEFAULT_CONTROL_PORT,
            wait_for: Vec::new(),
            ready_timeout_s: DEFAULT_READY_TIMEOUT_S,
            files: Vec::new(),
        }
    }
}

impl SetupMessage {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }
}

/// Readiness outcome reported by the agent, once per container lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data")]
pub enum Event {
    Ready,
    /// The entrypoint exited; `None` when no exit code is available.
    Exited(Option<i32>),
    FailedToPrepare(String),
    FailedToStartEntrypoint(String),
    FailedTimeout,
}

impl Event {
    pub fn is_ready(&self) -> bool {
        matches!(self, Event::Ready)
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn setup_message_defaults_apply_to_missing_fields() {
        let msg = SetupMessage::from_json("{}").unwrap();
        assert_eq!(msg, SetupMessage::default());
        assert_eq!(msg.port, 4);
        assert_eq!(msg.ready_timeout_s, 15);
    }

    #[test]
    fn unknown_event_kind_is_rejected() {
        assert!(Event::from_json(br#"{"kind":"Started"}"#).is_err());
    }

    #[test]
    fn unknown_wait_condition_kind_is_rejected() {
        let result = serde_json::from_str::<WaitCondition>(r#"{"kind":"File","data":"/tmp/x"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn only_ready_counts_as_ready() {
        assert!(Event::Ready.is_ready());
        assert!(!Event::FailedTimeout.is_ready());
        assert!(!Event::Exited(Some(0)).is_ready());
    }
}
