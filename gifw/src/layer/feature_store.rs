use gifw_types::cartesian::{Point2d, Rect};

use crate::layer::feature::{Feature, FeatureId};

/// Feature storage of a vector layer.
///
/// Any feature can be temporarily hidden with [`FeatureStore::hide`]. Hidden features keep their
/// place in the store, but are skipped by hit testing and export.
#[derive(Debug, Default, Clone)]
pub struct FeatureStore {
    features: Vec<FeatureEntry>,
}

#[derive(Debug, Clone)]
struct FeatureEntry {
    feature: Feature,
    is_hidden: bool,
}

impl From<Vec<Feature>> for FeatureStore {
    fn from(features: Vec<Feature>) -> Self {
        Self {
            features: features
                .into_iter()
                .map(|feature| FeatureEntry {
                    feature,
                    is_hidden: false,
                })
                .collect(),
        }
    }
}

impl FeatureStore {
    /// Adds the feature to the end of the store and returns its id.
    pub fn add(&mut self, feature: Feature) -> FeatureId {
        let id = feature.id();
        self.features.push(FeatureEntry {
            feature,
            is_hidden: false,
        });

        id
    }

    /// Removes the feature with the given id.
    pub fn remove(&mut self, id: FeatureId) -> Option<Feature> {
        let index = self.index_of(id)?;
        Some(self.features.remove(index).feature)
    }

    /// Removes all features.
    pub fn clear(&mut self) {
        self.features.clear();
    }

    /// Number of features, hidden included.
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns true if the store has no features.
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    fn index_of(&self, id: FeatureId) -> Option<usize> {
        self.features.iter().position(|e| e.feature.id() == id)
    }

    /// Feature with the given id.
    pub fn get(&self, id: FeatureId) -> Option<&Feature> {
        self.features
            .iter()
            .find(|e| e.feature.id() == id)
            .map(|e| &e.feature)
    }

    /// Mutable feature with the given id.
    pub fn get_mut(&mut self, id: FeatureId) -> Option<&mut Feature> {
        self.features
            .iter_mut()
            .find(|e| e.feature.id() == id)
            .map(|e| &mut e.feature)
    }

    /// Iterates over all features.
    pub fn iter(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.features.iter().map(|e| &e.feature)
    }

    /// Iterates mutably over all features.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Feature> + '_ {
        self.features.iter_mut().map(|e| &mut e.feature)
    }

    /// Iterates over features that are not hidden.
    pub fn iter_visible(&self) -> impl Iterator<Item = &Feature> + '_ {
        self.features
            .iter()
            .filter(|e| !e.is_hidden)
            .map(|e| &e.feature)
    }

    /// Hides the feature. Returns false if there is no such feature.
    pub fn hide(&mut self, id: FeatureId) -> bool {
        self.set_hidden(id, true)
    }

    /// Shows a previously hidden feature. Returns false if there is no such feature.
    pub fn show(&mut self, id: FeatureId) -> bool {
        self.set_hidden(id, false)
    }

    fn set_hidden(&mut self, id: FeatureId, is_hidden: bool) -> bool {
        match self.features.iter_mut().find(|e| e.feature.id() == id) {
            Some(entry) => {
                entry.is_hidden = is_hidden;
                true
            }
            None => false,
        }
    }

    /// Returns true if the feature exists and is hidden.
    pub fn is_hidden(&self, id: FeatureId) -> bool {
        self.features
            .iter()
            .any(|e| e.feature.id() == id && e.is_hidden)
    }

    /// Bounding box of all features.
    pub fn extent(&self) -> Option<Rect> {
        self.iter()
            .filter_map(|f| f.geometry().extent())
            .reduce(|acc, extent| acc.merge(extent))
    }

    /// Visible features within `tolerance` map units of the point, nearest first.
    ///
    /// Polygons count as hits when the point is inside them, unless `outline_only` is set.
    pub fn features_at(
        &self,
        point: &Point2d,
        tolerance: f64,
        outline_only: bool,
    ) -> Vec<&Feature> {
        let mut hits: Vec<(f64, &Feature)> = self
            .iter_visible()
            .filter_map(|feature| {
                let distance = if outline_only {
                    feature.geometry().distance_to_outline(point)
                } else {
                    feature.geometry().distance_to_point(point)
                };
                (distance <= tolerance).then_some((distance, feature))
            })
            .collect();
        hits.sort_by(|a, b| a.0.total_cmp(&b.0));

        hits.into_iter().map(|(_, f)| f).collect()
    }
}

#[cfg(test)]
mod tests {
    use gifw_types::geometry::{Geom, Polygon};

    use super::*;

    #[test]
    fn hidden_features_are_skipped() {
        let mut store = FeatureStore::default();
        let a = store.add(Feature::new(Geom::Point(Point2d::new(0.0, 0.0))));
        let b = store.add(Feature::new(Geom::Point(Point2d::new(1.0, 0.0))));

        assert_eq!(store.features_at(&Point2d::new(0.2, 0.0), 2.0, false).len(), 2);
        assert!(store.hide(a));
        let hits = store.features_at(&Point2d::new(0.2, 0.0), 2.0, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), b);

        assert!(store.remove(b).is_some());
        assert!(store.remove(b).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn hits_are_ordered_by_distance() {
        let mut store = FeatureStore::default();
        let far = store.add(Feature::new(Geom::Point(Point2d::new(5.0, 0.0))));
        let near = store.add(Feature::new(Geom::Point(Point2d::new(1.0, 0.0))));

        let hits = store.features_at(&Point2d::origin(), 10.0, false);
        assert_eq!(hits[0].id(), near);
        assert_eq!(hits[1].id(), far);
    }

    #[test]
    fn second_part_of_multi_polygon_is_hit() {
        let square = |x: f64| {
            Polygon::new(
                vec![
                    Point2d::new(x, 0.0),
                    Point2d::new(x + 10.0, 0.0),
                    Point2d::new(x + 10.0, 10.0),
                    Point2d::new(x, 10.0),
                ],
                vec![],
            )
        };
        let mut store = FeatureStore::default();
        let id = store.add(Feature::new(Geom::MultiPolygon(vec![square(0.0), square(100.0)])));

        let hits = store.features_at(&Point2d::new(105.0, 5.0), 1.0, false);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id(), id);
        assert!(store.features_at(&Point2d::new(50.0, 5.0), 1.0, false).is_empty());
        assert!(store.features_at(&Point2d::new(105.0, 5.0), 1.0, true).is_empty());
    }
}
