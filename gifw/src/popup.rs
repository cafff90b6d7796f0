//! Popup shown over the map for a feature, with typed actions.

use gifw_types::cartesian::Point2d;
use serde::{Deserialize, Serialize};

use crate::layer::FeatureId;

/// Command executed when a popup action is chosen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopupCommand {
    /// Remove one feature from its layer.
    RemoveFeature {
        /// Layer containing the feature.
        layer_id: String,
        /// Feature to remove.
        feature_id: FeatureId,
    },
    /// Remove every feature of the layer.
    RemoveAllFeatures {
        /// Layer to clear.
        layer_id: String,
    },
    /// Fit the map to the feature.
    ZoomToFeature {
        /// Layer containing the feature.
        layer_id: String,
        /// Feature to zoom to.
        feature_id: FeatureId,
    },
    /// Select the feature for modification.
    EditFeature {
        /// Layer containing the feature.
        layer_id: String,
        /// Feature to edit.
        feature_id: FeatureId,
    },
}

/// Action button of a popup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupAction {
    /// Button label.
    pub label: String,
    /// Command run by the button.
    pub command: PopupCommand,
    /// Whether the popup is closed after the command runs.
    pub closes_popup: bool,
    /// Whether the user must confirm the command first.
    pub requires_confirmation: bool,
}

impl PopupAction {
    /// Creates an action that keeps the popup open and needs no confirmation.
    pub fn new(label: impl Into<String>, command: PopupCommand) -> Self {
        Self {
            label: label.into(),
            command,
            closes_popup: false,
            requires_confirmation: false,
        }
    }

    /// Sets whether the popup is closed after the command runs.
    pub fn with_closes_popup(mut self, closes: bool) -> Self {
        self.closes_popup = closes;
        self
    }

    /// Sets whether the user must confirm the command first.
    pub fn with_confirmation(mut self, required: bool) -> Self {
        self.requires_confirmation = required;
        self
    }
}

/// Contents of a popup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupOptions {
    /// Popup title.
    pub title: String,
    /// Text or HTML body.
    pub content: String,
    /// Action buttons.
    pub actions: Vec<PopupAction>,
}

impl PopupOptions {
    /// Creates popup options without actions.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            actions: vec![],
        }
    }

    /// Adds an action.
    pub fn with_action(mut self, action: PopupAction) -> Self {
        self.actions.push(action);
        self
    }
}

/// Result of choosing a popup action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    /// Confirmation is needed before the command runs. Call [`Popup::confirm`].
    NeedsConfirmation(String),
    /// The command should run now.
    Execute {
        /// Command to run.
        command: PopupCommand,
        /// Whether to close the popup afterwards.
        closes_popup: bool,
    },
}

#[derive(Debug, Clone)]
struct OpenPopup {
    options: PopupOptions,
    anchor: Point2d,
}

/// Popup state of the map. At most one popup is open.
#[derive(Debug, Clone, Default)]
pub struct Popup {
    open: Option<OpenPopup>,
    pending_confirmation: Option<usize>,
}

impl Popup {
    /// Opens the popup anchored at the map point, replacing the open one.
    pub fn open(&mut self, options: PopupOptions, anchor: Point2d) {
        self.open = Some(OpenPopup { options, anchor });
        self.pending_confirmation = None;
    }

    /// Closes the popup.
    pub fn close(&mut self) {
        self.open = None;
        self.pending_confirmation = None;
    }

    /// Returns true if a popup is open.
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// Options of the open popup.
    pub fn options(&self) -> Option<&PopupOptions> {
        self.open.as_ref().map(|p| &p.options)
    }

    /// Map point the open popup points to.
    pub fn anchor(&self) -> Option<Point2d> {
        self.open.as_ref().map(|p| p.anchor)
    }

    /// Returns true if an action waits for confirmation.
    pub fn is_awaiting_confirmation(&self) -> bool {
        self.pending_confirmation.is_some()
    }

    /// Chooses the action with the given index. Returns `None` if there is no such action.
    pub fn request_action(&mut self, index: usize) -> Option<ActionRequest> {
        let action = self.open.as_ref()?.options.actions.get(index)?;
        if action.requires_confirmation {
            self.pending_confirmation = Some(index);
            return Some(ActionRequest::NeedsConfirmation(format!(
                "Are you sure you want to {}?",
                action.label.to_lowercase()
            )));
        }

        Some(ActionRequest::Execute {
            command: action.command.clone(),
            closes_popup: action.closes_popup,
        })
    }

    /// Confirms the action waiting for confirmation.
    pub fn confirm(&mut self) -> Option<ActionRequest> {
        let index = self.pending_confirmation.take()?;
        let action = self.open.as_ref()?.options.actions.get(index)?;
        Some(ActionRequest::Execute {
            command: action.command.clone(),
            closes_popup: action.closes_popup,
        })
    }

    /// Drops the action waiting for confirmation.
    pub fn cancel_confirmation(&mut self) {
        self.pending_confirmation = None;
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn options() -> PopupOptions {
        let feature_id = FeatureId::new();
        PopupOptions::new("Point", "")
            .with_action(PopupAction::new(
                "Zoom to",
                PopupCommand::ZoomToFeature {
                    layer_id: "a".into(),
                    feature_id,
                },
            ))
            .with_action(
                PopupAction::new(
                    "Remove",
                    PopupCommand::RemoveFeature {
                        layer_id: "a".into(),
                        feature_id,
                    },
                )
                .with_closes_popup(true)
                .with_confirmation(true),
            )
    }

    #[test]
    fn action_without_confirmation_runs_immediately() {
        let mut popup = Popup::default();
        popup.open(options(), Point2d::origin());
        assert_matches!(
            popup.request_action(0),
            Some(ActionRequest::Execute {
                command: PopupCommand::ZoomToFeature { .. },
                closes_popup: false
            })
        );
        assert!(popup.request_action(5).is_none());
    }

    #[test]
    fn confirmation_step() {
        let mut popup = Popup::default();
        popup.open(options(), Point2d::origin());

        assert_matches!(
            popup.request_action(1),
            Some(ActionRequest::NeedsConfirmation(_))
        );
        assert!(popup.is_awaiting_confirmation());
        assert_matches!(
            popup.confirm(),
            Some(ActionRequest::Execute {
                command: PopupCommand::RemoveFeature { .. },
                closes_popup: true
            })
        );
        assert!(popup.confirm().is_none());

        popup.request_action(1);
        popup.cancel_confirmation();
        assert!(popup.confirm().is_none());
    }
}
