use futures::future::AbortHandle;
use log::{debug, info, warn};

use crate::control::{EventPropagation, UserEvent, UserEventHandler};
use crate::engine::{Cursor, Session};
use crate::error::{GifwError, ValidationIssue};
use crate::event_bus::MapEvent;
use crate::filter::{cql, validate, FilterGroup, FilterProperty};
use crate::interaction::{
    begin_activation, end_activation, InteractionMode, ModeController, ModeKind,
};

/// Controller of the layer filter panel.
///
/// On activation the filter of the layer is parsed into an editable draft. A default filter the
/// user may not edit is kept out of the draft and shown read-only; it is combined with the
/// draft when the filter is applied.
#[derive(Debug, Default)]
pub struct LayerFilterController {
    active: bool,
    layer_id: Option<String>,
    properties: Vec<FilterProperty>,
    locked_default: Option<String>,
    draft: FilterGroup,
    issues: Vec<ValidationIssue>,
    parse_error: Option<String>,
    keyboard: Option<AbortHandle>,
}

impl LayerFilterController {
    /// Id of the filtered layer.
    pub fn layer_id(&self) -> Option<&str> {
        self.layer_id.as_deref()
    }

    /// Properties that can be used in conditions.
    pub fn properties(&self) -> &[FilterProperty] {
        &self.properties
    }

    /// Default filter shown read-only above the draft.
    pub fn read_only_default(&self) -> Option<&str> {
        self.locked_default.as_deref()
    }

    /// Filter being edited.
    pub fn draft(&self) -> &FilterGroup {
        &self.draft
    }

    /// Mutable filter being edited. Validation messages are cleared.
    pub fn draft_mut(&mut self) -> &mut FilterGroup {
        self.issues.clear();
        &mut self.draft
    }

    /// Message shown if the current filter of the layer could not be loaded into the draft.
    pub fn parse_error(&self) -> Option<&str> {
        self.parse_error.as_deref()
    }

    /// Messages of the last validation.
    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    /// Validates the draft. Returns true if it can be applied.
    pub fn validate(&mut self) -> bool {
        self.issues = validate(&self.draft);
        self.issues.is_empty()
    }

    /// CQL of the draft.
    pub fn preview(&self) -> Option<String> {
        self.draft.to_cql()
    }

    /// Validates the draft and sets it as the user filter of the layer.
    pub fn apply(&mut self, session: &mut Session) -> Result<(), GifwError> {
        if !self.validate() {
            return Err(GifwError::Validation(self.issues.clone()));
        }

        let filter = self.draft.to_cql();
        self.set_layer_filter(filter, session)
    }

    /// Empties the draft and removes the user filter of the layer.
    pub fn clear(&mut self, session: &mut Session) -> Result<(), GifwError> {
        self.draft = FilterGroup::default();
        self.issues.clear();
        self.set_layer_filter(None, session)
    }

    fn set_layer_filter(
        &mut self,
        filter: Option<String>,
        session: &mut Session,
    ) -> Result<(), GifwError> {
        let layer_id = self
            .layer_id
            .clone()
            .ok_or_else(|| GifwError::Generic("no layer is being filtered".into()))?;
        let layer = session
            .map_mut()
            .layer_mut(&layer_id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {layer_id}")))?;

        info!("Setting filter of layer {layer_id} to {filter:?}");
        layer.set_user_filter(filter);

        session
            .bus_mut()
            .publish(MapEvent::LayerFilterChanged { layer_id });
        session.request_permalink_update();
        Ok(())
    }
}

impl UserEventHandler for LayerFilterController {
    fn handle(&mut self, _event: &UserEvent, _session: &mut Session) -> EventPropagation {
        EventPropagation::Propagate
    }
}

impl ModeController for LayerFilterController {
    fn kind(&self) -> ModeKind {
        ModeKind::LayerFilter
    }

    fn is_active(&self) -> bool {
        self.active
    }

    fn activate(&mut self, mode: &InteractionMode, session: &mut Session) -> Result<(), GifwError> {
        let InteractionMode::FilteringLayer(layer_id) = mode else {
            return Err(GifwError::Generic(format!(
                "layer filter controller cannot run {mode:?}"
            )));
        };

        let layer = session
            .map()
            .layer(layer_id)
            .ok_or_else(|| GifwError::NotFound(format!("layer {layer_id}")))?;
        if !layer.is_filterable() {
            return Err(GifwError::Validation(vec![ValidationIssue::new(
                "layer",
                format!("Layer {} cannot be filtered", layer.name()),
            )]));
        }

        let (locked_default, current) = if layer.is_default_filter_editable() {
            (None, layer.effective_filter())
        } else {
            let default = layer.default_filter().map(str::to_string);
            let current = layer.effective_filter().and_then(|combined| {
                cql::strip_default_filter(&combined, default.as_deref())
            });
            (default, current)
        };
        let properties = layer.filter_properties().to_vec();

        self.parse_error = None;
        self.draft = match current.as_deref().map(|f| cql::parse_cql(f, &properties)) {
            Some(Ok(draft)) => draft,
            Some(Err(err)) => {
                warn!("Filter of layer {layer_id} cannot be edited: {err}");
                self.parse_error = Some(err.to_string());
                FilterGroup::default()
            }
            None => FilterGroup::default(),
        };
        self.properties = properties;
        self.locked_default = locked_default;
        self.issues.clear();
        self.layer_id = Some(layer_id.clone());

        if !self.active {
            self.keyboard = Some(begin_activation(
                session,
                ModeKind::LayerFilter,
                None,
                Cursor::Default,
            ));
            self.active = true;
        }
        session.ui_mut().context_menu_enabled = true;
        session.ui_mut().active_button = Some(format!("filter-{layer_id}"));

        debug!("Editing filter of layer {layer_id}");
        Ok(())
    }

    fn deactivate(&mut self, session: &mut Session) {
        self.active = false;
        self.layer_id = None;
        self.draft = FilterGroup::default();
        self.issues.clear();
        self.parse_error = None;
        end_activation(session, self.keyboard.take());
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::filter::{Condition, FilterNode, Operator, PropertyType};
    use crate::layer::wms::WmsSource;
    use crate::layer::{Layer, LayerSource};
    use crate::map::GroupType;

    fn session_with_layer(default: &str, editable: bool) -> Session {
        let mut session = Session::default();
        let layer = Layer::new(
            "roads",
            "Roads",
            LayerSource::Wms(WmsSource::new("https://example.com/wms", "roads")),
        )
        .with_filterable(true)
        .with_default_filter(Some(default.to_string()), editable)
        .with_filter_properties(vec![
            FilterProperty::new("name", PropertyType::String),
            FilterProperty::new("lanes", PropertyType::Int),
        ]);
        session
            .map_mut()
            .ensure_group(GroupType::Overlay, "Overlays")
            .add_layer(layer, true);
        session
    }

    #[test]
    fn locked_default_stays_out_of_draft() {
        let mut session = session_with_layer("lanes > 1", false);
        session
            .map_mut()
            .layer_mut("roads")
            .unwrap()
            .set_user_filter(Some("name = 'A38'".into()));

        let mut controller = LayerFilterController::default();
        controller
            .activate(&InteractionMode::FilteringLayer("roads".into()), &mut session)
            .unwrap();
        assert_eq!(controller.read_only_default(), Some("lanes > 1"));
        assert_eq!(controller.preview().as_deref(), Some("name = 'A38'"));

        controller.clear(&mut session).unwrap();
        let layer = session.map().layer("roads").unwrap();
        assert_eq!(layer.effective_filter().as_deref(), Some("lanes > 1"));
        assert_eq!(layer.permalink_filter(), None);
    }

    #[test]
    fn invalid_draft_is_not_applied() {
        let mut session = session_with_layer("lanes > 1", true);
        let mut controller = LayerFilterController::default();
        controller
            .activate(&InteractionMode::FilteringLayer("roads".into()), &mut session)
            .unwrap();
        assert_eq!(controller.read_only_default(), None);
        assert_eq!(controller.preview().as_deref(), Some("lanes > 1"));

        let name = FilterProperty::new("name", PropertyType::String);
        controller
            .draft_mut()
            .children
            .push(FilterNode::Condition(Condition::new(&name, Operator::Equals)));
        assert_matches!(controller.apply(&mut session), Err(GifwError::Validation(_)));
        assert!(!controller.issues().is_empty());
        assert_eq!(
            session.map().layer("roads").unwrap().user_filter(),
            None
        );
    }
}
