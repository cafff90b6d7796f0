use log::warn;
use serde::{Deserialize, Serialize};

use crate::layer::Layer;
use crate::map::LayerCollection;

/// Kind of layers a group holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GroupType {
    /// Background maps. Exactly one is visible.
    Basemap,
    /// Configured WMS/WFS overlays.
    Overlay,
    /// Layers added by the user: uploads and web layer services.
    UserNative,
    /// Annotations, measurements, geolocation and search results.
    SystemNative,
}

/// Named collection of layers of one [`GroupType`].
#[derive(Debug, Clone)]
pub struct LayerGroup {
    name: String,
    group_type: GroupType,
    layers: LayerCollection,
}

impl LayerGroup {
    /// Creates an empty group.
    pub fn new(name: impl Into<String>, group_type: GroupType) -> Self {
        Self {
            name: name.into(),
            group_type,
            layers: LayerCollection::default(),
        }
    }

    /// Group name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Group type.
    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    /// Layers of the group.
    pub fn layers(&self) -> &LayerCollection {
        &self.layers
    }

    /// Adds a layer at its z-index.
    ///
    /// A visible basemap hides the other basemaps. The first basemap of the group is always
    /// visible.
    pub fn add_layer(&mut self, layer: Layer, visible: bool) {
        let id = layer.id().to_string();
        self.layers.insert(layer, visible);

        if self.group_type == GroupType::Basemap {
            if visible {
                self.layers.show_only(&id);
            }
            self.layers.ensure_one_visible();
        }
    }

    /// Layer with the given id, added from `create` if the group does not contain it yet. The flag
    /// is true if the layer was added.
    ///
    /// Used for system layers. The basemap visibility rules of [`LayerGroup::add_layer`] are not
    /// applied.
    pub fn get_or_add_layer(
        &mut self,
        id: &str,
        visible: bool,
        create: impl FnOnce() -> Layer,
    ) -> (&mut Layer, bool) {
        self.layers.get_or_insert_with(id, visible, create)
    }

    /// Removes the layer with the given id.
    pub fn remove_layer(&mut self, id: &str) -> Option<Layer> {
        let removed = self.layers.remove(id)?;
        if self.group_type == GroupType::Basemap {
            self.layers.ensure_one_visible();
        }

        Some(removed)
    }

    /// Layer with the given id.
    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.find(id)
    }

    /// Mutable layer with the given id.
    pub fn layer_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.layers.find_mut(id)
    }

    /// Returns true if the group contains the layer.
    pub fn contains(&self, id: &str) -> bool {
        self.layers.find(id).is_some()
    }

    /// Returns true if the layer is in the group and visible.
    pub fn is_visible(&self, id: &str) -> bool {
        self.layers.visibility(id).unwrap_or(false)
    }

    /// Changes the visibility of the layer. Returns false if the group does not contain it.
    ///
    /// Showing a basemap hides the current one. The visible basemap cannot be hidden directly.
    pub fn set_visible(&mut self, id: &str, visible: bool) -> bool {
        if !self.contains(id) {
            return false;
        }

        match (self.group_type, visible) {
            (GroupType::Basemap, true) => self.layers.show_only(id),
            (GroupType::Basemap, false) => {
                warn!("Basemap {id} cannot be hidden, choose another basemap instead");
            }
            (_, visible) => {
                self.layers.set_visible(id, visible);
            }
        }

        true
    }

    /// Visible layers of the group.
    pub fn visible_layers(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.layers.iter_visible()
    }

    /// The visible layer of a basemap group.
    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.iter_visible().next()
    }
}
