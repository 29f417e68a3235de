//! Chat platform contract and action events.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use beacon_store::LabelSet;
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};

/// Reaction added to a message after an acknowledgement.
pub const ACKNOWLEDGE_REACTION: &str = "male-firefighter";

/// Reaction added to a message after a silence.
pub const SILENCE_REACTION: &str = "silent-bell";

/// Comment attached to silences created from chat.
pub const SILENCE_COMMENT: &str = "silenced via chat";

/// A chat user as resolved by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatUser {
    /// Platform user ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// E-mail address, used for paging.
    pub email: String,
}

/// Client of the chat platform.
#[async_trait]
pub trait ChatClient: Send + Sync + fmt::Debug {
    /// Returns the IDs of users allowed to act on alerts.
    async fn list_authorized_users(&self) -> Result<Vec<String>>;

    /// Resolves a user ID.
    async fn resolve_user(&self, user_id: &str) -> Result<ChatUser>;

    /// Posts `text` to `channel`, threaded under `thread_ref`.
    async fn post_message(&self, channel: &str, text: &str, thread_ref: &str) -> Result<()>;

    /// Adds `emoji` to the message `message_ref` in `channel`.
    async fn add_reaction(&self, channel: &str, message_ref: &str, emoji: &str) -> Result<()>;
}

/// An action a user can trigger on an alert message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    /// Acknowledge the alert.
    Acknowledge,
    /// Silence until next Monday.
    SilenceUntilMonday,
    /// Silence for one day.
    #[serde(rename = "silence1Day")]
    Silence1Day,
    /// Silence for 31 days.
    #[serde(rename = "silence1Month")]
    Silence1Month,
}

impl Action {
    /// Returns the wire name of the action.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledge => "acknowledge",
            Self::SilenceUntilMonday => "silenceUntilMonday",
            Self::Silence1Day => "silence1Day",
            Self::Silence1Month => "silence1Month",
        }
    }

    /// Returns true for the silence actions.
    #[must_use]
    pub const fn is_silence(self) -> bool {
        !matches!(self, Self::Acknowledge)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "acknowledge" => Ok(Self::Acknowledge),
            "silenceUntilMonday" => Ok(Self::SilenceUntilMonday),
            "silence1Day" => Ok(Self::Silence1Day),
            "silence1Month" => Ok(Self::Silence1Month),
            other => Err(RelayError::UnknownAction(other.to_string())),
        }
    }
}

/// A user pressed one or more action buttons on an alert message.
///
/// The labels are whatever could be extracted from the message; they need
/// not be the full label set of the alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Acting user.
    pub user_id: String,
    /// Channel of the alert message.
    pub channel: String,
    /// Reference of the alert message, used for threading and reactions.
    pub message_ref: String,
    /// Labels identifying the alert.
    pub labels: LabelSet,
    /// Requested actions, handled in order.
    pub actions: Vec<Action>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Action::Acknowledge, "acknowledge")]
    #[test_case(Action::SilenceUntilMonday, "silenceUntilMonday")]
    #[test_case(Action::Silence1Day, "silence1Day")]
    #[test_case(Action::Silence1Month, "silence1Month")]
    fn action_names(action: Action, name: &str) {
        assert_eq!(action.to_string(), name);
        assert_eq!(name.parse::<Action>().unwrap(), action);
        assert_eq!(serde_json::to_value(action).unwrap(), name);
    }

    #[test]
    fn unknown_action() {
        assert!(matches!(
            "reboot".parse::<Action>(),
            Err(RelayError::UnknownAction(name)) if name == "reboot"
        ));
    }

    #[test]
    fn silence_actions() {
        assert!(!Action::Acknowledge.is_silence());
        assert!(Action::Silence1Day.is_silence());
        assert!(Action::SilenceUntilMonday.is_silence());
    }
}
