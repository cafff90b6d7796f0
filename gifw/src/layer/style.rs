use serde::{Deserialize, Serialize};

use crate::color::Color;

/// Symbol drawn for point features.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PointShape {
    /// Disc.
    #[default]
    Circle,
    /// Axis aligned square.
    Square,
    /// Triangle pointing up.
    Triangle,
    /// Five pointed star.
    Star,
    /// Diagonal cross.
    Cross,
}

impl PointShape {
    /// Name used in the style configurator.
    pub fn name(&self) -> &'static str {
        match self {
            PointShape::Circle => "circle",
            PointShape::Square => "square",
            PointShape::Triangle => "triangle",
            PointShape::Star => "star",
            PointShape::Cross => "cross",
        }
    }

    /// Number of corners of the symbol, `None` for the circle.
    pub fn corners(&self) -> Option<usize> {
        match self {
            PointShape::Circle => None,
            PointShape::Square | PointShape::Cross => Some(4),
            PointShape::Triangle => Some(3),
            PointShape::Star => Some(10),
        }
    }
}

/// Visual style of a vector feature.
///
/// Styles are immutable values. Features hold them in an `Arc`, so every edit produces a new
/// style that is assigned to the edited features only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeatureStyle {
    /// Fill of polygons and point markers, and the color of label text.
    pub fill: Color,
    /// Outline color.
    pub stroke: Color,
    /// Outline width in pixels.
    pub stroke_width: f64,
    /// Lengths of alternating dashes and gaps of the outline in pixels. Empty for a solid line.
    pub line_dash: Vec<f64>,
    /// Radius of point markers in pixels.
    pub point_radius: f64,
    /// Symbol of point markers.
    pub point_shape: PointShape,
    /// Text drawn at the feature position.
    pub label: Option<String>,
    /// Font size of the label in pixels.
    pub font_size: f64,
    /// CSS font family of the label.
    pub font_family: String,
    /// Color of the halo drawn around label text.
    pub label_halo: Color,
    /// Width of the label halo in pixels, zero for no halo.
    pub label_halo_width: f64,
}

const DEFAULT_FONT_FAMILY: &str = "sans-serif";

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            fill: Color::ACCENT.with_opacity(20),
            stroke: Color::ACCENT,
            stroke_width: 3.0,
            line_dash: vec![],
            point_radius: 6.0,
            point_shape: PointShape::Circle,
            label: None,
            font_size: 14.0,
            font_family: DEFAULT_FONT_FAMILY.to_string(),
            label_halo: Color::WHITE,
            label_halo_width: 2.0,
        }
    }
}

impl FeatureStyle {
    /// Distance in pixels the rendered symbol reaches beyond the geometry: half of the outline or
    /// the point marker radius, whichever is larger.
    pub fn half_width_px(&self) -> f64 {
        (self.stroke_width / 2.0).max(self.point_radius)
    }

    /// Returns true if the fill cannot be seen, so pixel picking misses the inside of polygons.
    pub fn has_transparent_fill(&self) -> bool {
        self.fill.is_transparent()
    }

    /// Returns true if the outline is drawn dashed.
    pub fn is_dashed(&self) -> bool {
        self.line_dash.iter().any(|&length| length > 0.0)
    }

    /// CSS font shorthand of the label, e.g. `14px sans-serif`.
    pub fn font(&self) -> String {
        format!("{}px {}", self.font_size, self.font_family)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn point_radius_widens_the_symbol() {
        let style = FeatureStyle {
            stroke_width: 2.0,
            point_radius: 12.0,
            ..Default::default()
        };
        assert_eq!(style.half_width_px(), 12.0);

        let thick = FeatureStyle {
            stroke_width: 30.0,
            point_radius: 4.0,
            ..Default::default()
        };
        assert_eq!(thick.half_width_px(), 15.0);
    }

    #[test]
    fn dash_and_font() {
        let mut style = FeatureStyle::default();
        assert!(!style.is_dashed());
        style.line_dash = vec![0.0, 0.0];
        assert!(!style.is_dashed());
        style.line_dash = vec![9.0, 6.0];
        assert!(style.is_dashed());

        style.font_family = "Georgia, serif".into();
        assert_eq!(style.font(), "14px Georgia, serif");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let style: FeatureStyle =
            serde_json::from_str(r##"{"stroke": "#FF0000", "pointShape": "star"}"##).unwrap();
        assert_eq!(style.stroke, Color::RED);
        assert_eq!(style.point_shape, PointShape::Star);
        assert_eq!(style.point_shape.corners(), Some(10));
        assert_eq!(style.font_family, "sans-serif");
        assert!(style.line_dash.is_empty());
    }
}
