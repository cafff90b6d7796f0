use gifw_types::cartesian::Point2d;

use crate::layer::{Feature, FeatureId, FeatureStore, FeatureStyle};

/// Extra distance in pixels around rendered features that still counts as a hit.
pub const HIT_TOLERANCE_PX: f64 = 3.0;

/// Feature found under the pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pick {
    /// Id of the feature.
    pub feature_id: FeatureId,
    /// True if the feature was found by coordinates because nothing is rendered at the pointer.
    pub synthetic: bool,
}

/// Picks the topmost feature rendered under the pointer.
///
/// A feature is hit where it is drawn: its outline or marker, plus the inside of polygons with a
/// visible fill. If nothing is drawn under the pointer, polygons with a transparent fill that
/// contain the point are picked by coordinates.
pub fn pick_feature(store: &FeatureStore, point: &Point2d, resolution: f64) -> Option<Pick> {
    let default_style = FeatureStyle::default();
    let mut topmost_first: Vec<(&Feature, &FeatureStyle)> = store
        .iter_visible()
        .map(|f| (f, f.style().map(|s| s.as_ref()).unwrap_or(&default_style)))
        .collect();
    topmost_first.reverse();

    let pixel_hit = topmost_first.iter().find(|(feature, style)| {
        let tolerance = (style.half_width_px() + HIT_TOLERANCE_PX) * resolution;
        if style.has_transparent_fill() {
            feature.geometry().distance_to_outline(point) <= tolerance
        } else {
            feature.geometry().distance_to_point(point) <= tolerance
        }
    });

    if let Some((feature, _)) = pixel_hit {
        return Some(Pick {
            feature_id: feature.id(),
            synthetic: false,
        });
    }

    topmost_first
        .iter()
        .find(|(feature, style)| {
            style.has_transparent_fill() && feature.geometry().contains_point(point)
        })
        .map(|(feature, _)| Pick {
            feature_id: feature.id(),
            synthetic: true,
        })
}
