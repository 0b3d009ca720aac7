//! Lifecycle events that command hooks bind to.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Trigger points for command hooks: before/after each of the five
/// session-level actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CommandEvent {
    PreSpawn,
    PostSpawn,
    PreSend,
    PostSend,
    PreAdd,
    PostAdd,
    PreCreate,
    PostCreate,
    PreShutdown,
    PostShutdown,
}

impl CommandEvent {
    /// Every recognized event, in pre/post pairs.
    pub const fn all() -> [CommandEvent; 10] {
        [
            CommandEvent::PreSpawn,
            CommandEvent::PostSpawn,
            CommandEvent::PreSend,
            CommandEvent::PostSend,
            CommandEvent::PreAdd,
            CommandEvent::PostAdd,
            CommandEvent::PreCreate,
            CommandEvent::PostCreate,
            CommandEvent::PreShutdown,
            CommandEvent::PostShutdown,
        ]
    }

    /// The name used in `hooks.toml` and in `NZM_HOOK_EVENT`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandEvent::PreSpawn => "pre-spawn",
            CommandEvent::PostSpawn => "post-spawn",
            CommandEvent::PreSend => "pre-send",
            CommandEvent::PostSend => "post-send",
            CommandEvent::PreAdd => "pre-add",
            CommandEvent::PostAdd => "post-add",
            CommandEvent::PreCreate => "pre-create",
            CommandEvent::PostCreate => "post-create",
            CommandEvent::PreShutdown => "pre-shutdown",
            CommandEvent::PostShutdown => "post-shutdown",
        }
    }

    pub fn is_pre(&self) -> bool {
        self.as_str().starts_with("pre-")
    }
}

impl fmt::Display for CommandEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CommandEvent {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CommandEvent::all()
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| ValidationError::InvalidEvent(s.to_string()))
    }
}

impl TryFrom<String> for CommandEvent {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CommandEvent> for String {
    fn from(event: CommandEvent) -> Self {
        event.as_str().to_string()
    }
}

/// Comma-separated list of valid event names, for error messages.
pub(crate) fn valid_event_names() -> String {
    CommandEvent::all()
        .iter()
        .map(CommandEvent::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_roundtrip_through_str() {
        for event in CommandEvent::all() {
            assert_eq!(event.as_str().parse::<CommandEvent>().unwrap(), event);
        }
    }

    #[test]
    fn test_exactly_ten_distinct_events() {
        let names: std::collections::HashSet<_> =
            CommandEvent::all().iter().map(|e| e.as_str()).collect();
        assert_eq!(names.len(), 10);
    }

    #[test]
    fn test_invalid_event_rejected() {
        let err = "pre-launch".parse::<CommandEvent>().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("pre-launch"), "got: {msg}");
        assert!(msg.contains("pre-spawn"), "valid list should be shown: {msg}");

        // Case matters: config keys are lowercase.
        assert!("PRE-SPAWN".parse::<CommandEvent>().is_err());
        assert!("".parse::<CommandEvent>().is_err());
    }

    #[test]
    fn test_is_pre() {
        assert!(CommandEvent::PreSend.is_pre());
        assert!(!CommandEvent::PostShutdown.is_pre());
    }

    #[test]
    fn test_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            event: CommandEvent,
        }

        let w: Wrapper = toml::from_str(r#"event = "post-create""#).unwrap();
        assert_eq!(w.event, CommandEvent::PostCreate);

        let err = toml::from_str::<Wrapper>(r#"event = "during-spawn""#)
            .err()
            .unwrap();
        assert!(err.to_string().contains("invalid hook event"));
    }
}
