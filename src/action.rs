//! Management actions on a server instance.
//!
//! Actions arrive from the management surface as a kind string plus an
//! optional target. They are validated once here into a closed union, so
//! the registry and [`ManagedServer`](crate::server::ManagedServer) only
//! ever see well-formed requests.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Player-administration verbs that map to console commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PlayerVerb {
    Ban,
    BanIp,
    Pardon,
    PardonIp,
    Kick,
    Op,
}

impl PlayerVerb {
    /// The console command word written to the server's stdin.
    pub fn command(&self) -> &'static str {
        match self {
            PlayerVerb::Ban => "ban",
            PlayerVerb::BanIp => "ban-ip",
            PlayerVerb::Pardon => "pardon",
            PlayerVerb::PardonIp => "pardon-ip",
            PlayerVerb::Kick => "kick",
            PlayerVerb::Op => "op",
        }
    }

    fn from_kind(kind: &str) -> Option<Self> {
        match kind {
            "ban" => Some(PlayerVerb::Ban),
            "ban-ip" => Some(PlayerVerb::BanIp),
            "pardon" => Some(PlayerVerb::Pardon),
            "pardon-ip" => Some(PlayerVerb::PardonIp),
            "kick" => Some(PlayerVerb::Kick),
            "op" => Some(PlayerVerb::Op),
            _ => None,
        }
    }
}

impl fmt::Display for PlayerVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// A validated management action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Launch the server process.
    Start,
    /// Ask the server to shut down gracefully.
    Stop,
    /// Run a player-administration console command.
    Player { verb: PlayerVerb, target: String },
}

impl Action {
    /// Validates a raw action payload into a closed [`Action`].
    ///
    /// `target` is required for every player verb and ignored for
    /// `start`/`stop`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] for an unknown kind or a player verb
    /// with a missing or empty target.
    pub fn parse(kind: &str, target: Option<&str>) -> Result<Self> {
        match kind {
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            other => {
                let verb = PlayerVerb::from_kind(other).ok_or_else(|| {
                    Error::Validation(format!("Unknown action '{}'", other))
                })?;
                let target = target
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .ok_or_else(|| {
                        Error::Validation(format!("Action '{}' requires a target", other))
                    })?;
                Ok(Action::Player {
                    verb,
                    target: target.to_string(),
                })
            }
        }
    }
}

/// Definite result of an action, always carrying a human-readable reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub message: String,
}

impl ActionOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lifecycle_actions() {
        assert_eq!(Action::parse("start", None).unwrap(), Action::Start);
        assert_eq!(Action::parse("stop", None).unwrap(), Action::Stop);
        // A target on a lifecycle action is ignored, not rejected.
        assert_eq!(Action::parse("start", Some("Steve")).unwrap(), Action::Start);
    }

    #[test]
    fn test_parse_player_actions() {
        for (kind, verb) in [
            ("ban", PlayerVerb::Ban),
            ("ban-ip", PlayerVerb::BanIp),
            ("pardon", PlayerVerb::Pardon),
            ("pardon-ip", PlayerVerb::PardonIp),
            ("kick", PlayerVerb::Kick),
            ("op", PlayerVerb::Op),
        ] {
            let action = Action::parse(kind, Some("Steve")).unwrap();
            assert_eq!(
                action,
                Action::Player {
                    verb,
                    target: "Steve".to_string()
                }
            );
        }
    }

    #[test]
    fn test_parse_rejects_unknown_kind() {
        assert!(matches!(
            Action::parse("restart", None),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_player_action_requires_target() {
        assert!(matches!(
            Action::parse("ban", None),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            Action::parse("kick", Some("   ")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_verb_command_words() {
        assert_eq!(PlayerVerb::BanIp.command(), "ban-ip");
        assert_eq!(PlayerVerb::PardonIp.command(), "pardon-ip");
        assert_eq!(PlayerVerb::Op.to_string(), "op");
    }
}
