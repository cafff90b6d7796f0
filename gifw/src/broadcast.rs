//! Messages broadcast by the administrators to connected clients.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::alert::{Alert, AlertKind, Severity};
use crate::error::GifwError;

/// Target of messages sent to every version.
pub const ALL_VERSIONS: &str = "all";

/// How a broadcast message is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BroadcastType {
    /// Short notice.
    Toast,
    /// Dialog closed by the user.
    Popup,
}

/// Message received on the broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastMessage {
    /// Presentation.
    pub message_type: BroadcastType,
    /// Severity.
    pub severity: Severity,
    /// Text of the message.
    pub message: String,
    /// Slug of the version the message is meant for, or [`ALL_VERSIONS`].
    pub target_version: String,
}

impl BroadcastMessage {
    /// Parses a message received on the channel.
    pub fn from_json(payload: &str) -> Result<Self, GifwError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Returns true if the message is meant for the version.
    pub fn targets(&self, version: &str) -> bool {
        self.target_version.eq_ignore_ascii_case(ALL_VERSIONS)
            || self.target_version.eq_ignore_ascii_case(version)
    }

    /// Alert showing the message.
    pub fn to_alert(&self) -> Alert {
        match self.message_type {
            BroadcastType::Toast => Alert::toast(self.severity, &self.message),
            BroadcastType::Popup => Alert::new(
                AlertKind::Popup,
                self.severity,
                "Message from the administrator",
                &self.message,
            ),
        }
    }
}

/// Alert for the payload if it is meant for `version`.
pub fn receive(payload: &str, version: &str) -> Result<Option<Alert>, GifwError> {
    let message = BroadcastMessage::from_json(payload)?;
    if !message.targets(version) {
        debug!(
            "Ignoring broadcast for version {}",
            message.target_version
        );
        return Ok(None);
    }

    Ok(Some(message.to_alert()))
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn filters_by_version() {
        let payload = |target: &str| {
            format!(
                r#"{{"messageType": "Popup", "severity": "warning", "message": "Maintenance at 6pm", "targetVersion": "{target}"}}"#
            )
        };

        let alert = receive(&payload("all"), "demo").unwrap().unwrap();
        assert_eq!(alert.kind, AlertKind::Popup);
        assert_eq!(alert.message, "Maintenance at 6pm");

        assert!(receive(&payload("Demo"), "demo").unwrap().is_some());
        assert_eq!(receive(&payload("other"), "demo").unwrap(), None);
        assert_matches!(receive("not json", "demo"), Err(GifwError::Decoding(_)));
    }
}
