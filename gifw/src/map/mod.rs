use std::time::Duration;

use gifw_types::cartesian::Size;
use web_time::Instant;

use crate::layer::Layer;
use crate::view::MapView;

mod layer_collection;
mod layer_group;

pub use layer_collection::LayerCollection;
pub use layer_group::{GroupType, LayerGroup};

const FRAME_DURATION: Duration = Duration::from_millis(16);

/// Map specifies the layer groups and the view the client shows.
#[derive(Debug, Clone, Default)]
pub struct Map {
    view: MapView,
    groups: Vec<LayerGroup>,
    animation: Option<AnimationParameters>,
}

#[derive(Debug, Clone)]
struct AnimationParameters {
    start_view: MapView,
    end_view: MapView,
    start_time: Instant,
    duration: Duration,
}

impl Map {
    /// Creates a new map without layer groups.
    pub fn new(view: MapView) -> Self {
        Self {
            view,
            groups: vec![],
            animation: None,
        }
    }

    /// Current view of the map.
    pub fn view(&self) -> &MapView {
        &self.view
    }

    /// Changes the view of the map to the given one, stopping any animation.
    pub fn set_view(&mut self, view: MapView) {
        self.animation = None;
        self.view = view;
    }

    /// Update the view of the map in case [`Map::animate_to`] was called. Returns true while the
    /// animation runs.
    pub fn animate(&mut self, now: Instant) -> bool {
        let Some(animation) = &self.animation else {
            return false;
        };

        let k = now
            .saturating_duration_since(animation.start_time)
            .as_secs_f64()
            / animation.duration.as_secs_f64().max(f64::EPSILON);

        if k >= 1.0 {
            if let Some(animation) = self.animation.take() {
                self.view = animation.end_view;
            }
            false
        } else {
            self.view = animation.start_view.interpolate(&animation.end_view, k);
            true
        }
    }

    /// Stops the animation, keeping the current intermediate view.
    pub fn stop_animation(&mut self) {
        self.animation = None;
    }

    /// Returns true if an animation is in progress.
    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    /// Target view of the current animation.
    pub fn target_view(&self) -> &MapView {
        self.animation
            .as_ref()
            .map(|v| &v.end_view)
            .unwrap_or(&self.view)
    }

    /// Request a gradual change of the map view to the specified view.
    pub fn animate_to(&mut self, target: MapView, duration: Duration, now: Instant) {
        self.animation = Some(AnimationParameters {
            start_view: self.view.clone(),
            end_view: target,
            start_time: now.checked_sub(FRAME_DURATION).unwrap_or(now),
            duration,
        });
    }

    /// Set the size of the map.
    pub fn set_size(&mut self, new_size: Size) {
        self.view = self.view.with_size(new_size);
    }

    /// Layer groups in drawing order.
    pub fn groups(&self) -> &[LayerGroup] {
        &self.groups
    }

    /// Group of the given type.
    pub fn group(&self, group_type: GroupType) -> Option<&LayerGroup> {
        self.groups.iter().find(|g| g.group_type() == group_type)
    }

    /// Mutable group of the given type.
    pub fn group_mut(&mut self, group_type: GroupType) -> Option<&mut LayerGroup> {
        self.groups.iter_mut().find(|g| g.group_type() == group_type)
    }

    /// Group of the given type, created with the given name if absent.
    pub fn ensure_group(&mut self, group_type: GroupType, name: &str) -> &mut LayerGroup {
        let index = match self.groups.iter().position(|g| g.group_type() == group_type) {
            Some(index) => index,
            None => {
                self.groups.push(LayerGroup::new(name, group_type));
                self.groups.sort_by_key(LayerGroup::group_type);
                self.groups
                    .iter()
                    .position(|g| g.group_type() == group_type)
                    .unwrap_or(self.groups.len() - 1)
            }
        };

        &mut self.groups[index]
    }

    /// Layer with the given id from any group.
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.groups.iter().find_map(|g| g.layer(id))
    }

    /// Mutable layer with the given id from any group.
    pub fn layer_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.groups.iter_mut().find_map(|g| g.layer_mut(id))
    }

    /// Type of the group holding the layer.
    pub fn layer_group_type(&self, id: &str) -> Option<GroupType> {
        self.groups
            .iter()
            .find(|g| g.contains(id))
            .map(LayerGroup::group_type)
    }

    /// Returns true if the layer is in a group and visible.
    pub fn is_layer_visible(&self, id: &str) -> bool {
        self.groups.iter().any(|g| g.is_visible(id))
    }

    /// Changes the visibility of the layer. Returns false if no group contains it.
    pub fn set_layer_visible(&mut self, id: &str, visible: bool) -> bool {
        self.groups
            .iter_mut()
            .find(|g| g.contains(id))
            .is_some_and(|g| g.set_visible(id, visible))
    }

    /// Removes the layer from the first group containing it.
    pub fn remove_layer(&mut self, id: &str) -> Option<(GroupType, Layer)> {
        self.groups
            .iter_mut()
            .find_map(|g| g.remove_layer(id).map(|layer| (g.group_type(), layer)))
    }

    /// The visible basemap.
    pub fn active_basemap(&self) -> Option<&Layer> {
        self.group(GroupType::Basemap)?.active_layer()
    }

    /// All layers with their visibility in drawing order.
    pub fn layers(&self) -> impl Iterator<Item = (&Layer, bool)> + '_ {
        self.groups
            .iter()
            .flat_map(|g| g.layers().iter_with_visibility())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use gifw_types::cartesian::Point2d;

    use super::*;
    use crate::layer::{FeatureStore, LayerSource};

    fn layer(id: &str) -> Layer {
        Layer::new(id, id, LayerSource::Vector(FeatureStore::default()))
    }

    #[test]
    fn groups_are_kept_in_type_order() {
        let mut map = Map::default();
        map.ensure_group(GroupType::SystemNative, "System")
            .add_layer(layer("s"), true);
        map.ensure_group(GroupType::Basemap, "Basemaps")
            .add_layer(layer("b"), true);
        map.ensure_group(GroupType::Basemap, "Ignored")
            .add_layer(layer("b2"), false);

        let types: Vec<_> = map.groups().iter().map(LayerGroup::group_type).collect();
        assert_eq!(types, vec![GroupType::Basemap, GroupType::SystemNative]);
        assert_eq!(map.group(GroupType::Basemap).map(LayerGroup::name), Some("Basemaps"));
        assert_eq!(map.active_basemap().map(Layer::id), Some("b"));
        assert_eq!(map.layer_group_type("s"), Some(GroupType::SystemNative));
    }

    #[test]
    fn remove_layer_from_owning_group() {
        let mut map = Map::default();
        map.ensure_group(GroupType::Overlay, "Overlays")
            .add_layer(layer("a"), true);

        assert!(map.is_layer_visible("a"));
        let (group_type, removed) = map.remove_layer("a").unwrap();
        assert_eq!(group_type, GroupType::Overlay);
        assert_eq!(removed.id(), "a");
        assert!(map.remove_layer("a").is_none());
    }

    #[test]
    fn animation_reaches_target() {
        let start = Instant::now();
        let mut map = Map::new(MapView::default().with_size(Size::new(100.0, 100.0)));
        let target = map.view().with_center(Point2d::new(1000.0, 0.0));

        map.animate_to(target.clone(), Duration::from_millis(1000), start);
        assert!(map.animate(start + Duration::from_millis(484)));
        assert_relative_eq!(map.view().center().x, 500.0, epsilon = 1e-6);
        assert_eq!(map.target_view(), &target);

        assert!(!map.animate(start + Duration::from_millis(1000)));
        assert!(!map.is_animating());
        assert_eq!(map.view(), &target);
    }
}
