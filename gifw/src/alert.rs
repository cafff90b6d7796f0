//! Messages shown to the user.

use serde::{Deserialize, Serialize};

/// How an alert is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlertKind {
    /// Short notice that disappears by itself.
    Toast,
    /// Dialog closed by the user.
    Popup,
    /// Dialog that stops the feature from being used.
    Blocking,
    /// "Something went wrong" dialog for unexpected errors.
    GenericError,
}

/// Severity of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Neutral information.
    Info,
    /// Completed action.
    Success,
    /// Something needs attention.
    Warning,
    /// Something failed.
    Danger,
}

/// Alert queued by the engine for the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    /// Presentation.
    pub kind: AlertKind,
    /// Severity.
    pub severity: Severity,
    /// Title.
    pub title: String,
    /// Message.
    pub message: String,
}

impl Alert {
    /// Creates a new alert.
    pub fn new(
        kind: AlertKind,
        severity: Severity,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            severity,
            title: title.into(),
            message: message.into(),
        }
    }

    /// Short notice.
    pub fn toast(severity: Severity, message: impl Into<String>) -> Self {
        Self::new(AlertKind::Toast, severity, "", message)
    }

    /// Alert for a feature whose configuration could not be loaded.
    pub fn feature_unavailable(feature: &str) -> Self {
        Self::new(
            AlertKind::Blocking,
            Severity::Danger,
            format!("{feature} unavailable"),
            format!(
                "There was a problem loading the {} configuration. Please try again later.",
                feature.to_lowercase()
            ),
        )
    }

    /// Alert for an extent outside of the current basemap or projection.
    pub fn extent_unavailable() -> Self {
        Self::new(
            AlertKind::Popup,
            Severity::Warning,
            "Location not available",
            "This location is outside the area covered by the current background map. Choose a \
             different background map to see it.",
        )
    }

    /// Alert for unexpected errors.
    pub fn generic_error() -> Self {
        Self::new(
            AlertKind::GenericError,
            Severity::Danger,
            "Something went wrong",
            "Something went wrong. Please refresh the page and try again.",
        )
    }
}
