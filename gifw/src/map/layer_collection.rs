use crate::layer::Layer;

/// Layers of a group in drawing order, addressed by layer id.
///
/// Layers are ordered by z-index, and layers with the same z-index keep the order they were added
/// in. Hiding a layer keeps it in the collection.
#[derive(Debug, Default, Clone)]
pub struct LayerCollection {
    entries: Vec<Entry>,
}

#[derive(Debug, Clone)]
struct Entry {
    layer: Layer,
    visible: bool,
}

impl LayerCollection {
    /// Adds the layer above every layer with a lower or equal z-index.
    pub fn insert(&mut self, layer: Layer, visible: bool) {
        self.insert_at_z_index(layer, visible);
    }

    fn insert_at_z_index(&mut self, layer: Layer, visible: bool) -> usize {
        let index = self
            .entries
            .partition_point(|entry| entry.layer.z_index() <= layer.z_index());
        self.entries.insert(index, Entry { layer, visible });
        index
    }

    /// Layer with the given id, inserted from `create` if missing. The flag is true if the layer
    /// was inserted.
    pub fn get_or_insert_with(
        &mut self,
        id: &str,
        visible: bool,
        create: impl FnOnce() -> Layer,
    ) -> (&mut Layer, bool) {
        let (index, inserted) = match self.position(id) {
            Some(index) => (index, false),
            None => (self.insert_at_z_index(create(), visible), true),
        };
        (&mut self.entries[index].layer, inserted)
    }

    /// Removes the layer with the given id.
    pub fn remove(&mut self, id: &str) -> Option<Layer> {
        let index = self.position(id)?;
        Some(self.entries.remove(index).layer)
    }

    /// Number of layers, hidden ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the collection has no layers.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|entry| entry.layer.id() == id)
    }

    /// Layer with the given id.
    pub fn find(&self, id: &str) -> Option<&Layer> {
        self.entries
            .iter()
            .find(|entry| entry.layer.id() == id)
            .map(|entry| &entry.layer)
    }

    /// Mutable layer with the given id.
    pub fn find_mut(&mut self, id: &str) -> Option<&mut Layer> {
        self.entries
            .iter_mut()
            .find(|entry| entry.layer.id() == id)
            .map(|entry| &mut entry.layer)
    }

    /// Visibility of the layer, `None` if the collection does not contain it.
    pub fn visibility(&self, id: &str) -> Option<bool> {
        self.position(id).map(|index| self.entries[index].visible)
    }

    /// Sets the visibility of the layer. Returns false if the collection does not contain it.
    pub fn set_visible(&mut self, id: &str, visible: bool) -> bool {
        match self.entries.iter_mut().find(|entry| entry.layer.id() == id) {
            Some(entry) => {
                entry.visible = visible;
                true
            }
            None => false,
        }
    }

    /// Shows the layer with the given id and hides all others.
    pub fn show_only(&mut self, id: &str) {
        for entry in &mut self.entries {
            entry.visible = entry.layer.id() == id;
        }
    }

    /// Shows the bottom layer if no layer is visible.
    pub fn ensure_one_visible(&mut self) {
        if !self.entries.iter().any(|entry| entry.visible) {
            if let Some(first) = self.entries.first_mut() {
                first.visible = true;
            }
        }
    }

    /// All layers from bottom to top.
    pub fn iter(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.entries.iter().map(|entry| &entry.layer)
    }

    /// All layers from bottom to top with their visibility.
    pub fn iter_with_visibility(&self) -> impl Iterator<Item = (&Layer, bool)> + '_ {
        self.entries.iter().map(|entry| (&entry.layer, entry.visible))
    }

    /// Visible layers from bottom to top.
    pub fn iter_visible(&self) -> impl Iterator<Item = &Layer> + '_ {
        self.iter_with_visibility()
            .filter(|(_, visible)| *visible)
            .map(|(layer, _)| layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layer::{FeatureStore, LayerSource};

    fn layer(id: &str, z_index: i32) -> Layer {
        Layer::new(id, id, LayerSource::Vector(FeatureStore::default())).with_z_index(z_index)
    }

    fn ids(collection: &LayerCollection) -> Vec<&str> {
        collection.iter().map(Layer::id).collect()
    }

    #[test]
    fn layers_are_ordered_by_z_index() {
        let mut collection = LayerCollection::default();
        collection.insert(layer("annotations", 1000), true);
        collection.insert(layer("listed", 0), true);
        collection.insert(layer("parishes", 0), true);
        collection.insert(layer("uploads", 10), true);

        assert_eq!(ids(&collection), vec!["listed", "parishes", "uploads", "annotations"]);
    }

    #[test]
    fn hidden_layers_stay_in_place() {
        let mut collection = LayerCollection::default();
        collection.insert(layer("a", 0), true);
        collection.insert(layer("b", 0), true);
        collection.insert(layer("c", 0), true);

        assert!(collection.set_visible("b", false));
        let visible: Vec<_> = collection.iter_visible().map(Layer::id).collect();
        assert_eq!(visible, vec!["a", "c"]);
        assert_eq!(collection.visibility("b"), Some(false));

        collection.set_visible("b", true);
        assert_eq!(ids(&collection), vec!["a", "b", "c"]);
        assert!(!collection.set_visible("missing", true));
        assert_eq!(collection.visibility("missing"), None);
    }

    #[test]
    fn get_or_insert_does_not_duplicate() {
        let mut collection = LayerCollection::default();
        let (_, inserted) = collection.get_or_insert_with("pins", true, || layer("pins", 1003));
        assert!(inserted);
        let (existing, inserted) = collection.get_or_insert_with("pins", true, || layer("x", 0));
        assert!(!inserted);
        assert_eq!(existing.z_index(), 1003);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn remove_and_keep_one_visible() {
        let mut collection = LayerCollection::default();
        collection.insert(layer("streets", 0), false);
        collection.insert(layer("aerial", 0), false);
        collection.show_only("aerial");
        assert_eq!(collection.visibility("streets"), Some(false));

        assert_eq!(collection.remove("aerial").map(|l| l.id().to_string()), Some("aerial".into()));
        assert!(collection.remove("aerial").is_none());
        collection.ensure_one_visible();
        assert_eq!(collection.visibility("streets"), Some(true));
        assert_eq!(collection.len(), 1);
    }
}
