use std::fmt::{Display, Formatter};
use std::sync::Arc;

use gifw_types::geometry::GeometryType;
use gifw_types::units::DistanceUnit;
use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::layer::{BufferSpec, FeatureStyle, PointShape};

/// Drawing tool of the annotate mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationTool {
    /// Point marker.
    Point,
    /// Line.
    Line,
    /// Polygon.
    Polygon,
    /// Text label placed at a point.
    Text,
    /// Circle of a given radius around a point.
    Buffer,
}

impl AnnotationTool {
    /// Geometry drawn with the tool.
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            AnnotationTool::Point | AnnotationTool::Text | AnnotationTool::Buffer => {
                GeometryType::Point
            }
            AnnotationTool::Line => GeometryType::LineString,
            AnnotationTool::Polygon => GeometryType::Polygon,
        }
    }

    /// Tool name stored in feature metadata.
    pub fn name(&self) -> &'static str {
        match self {
            AnnotationTool::Point => "point",
            AnnotationTool::Line => "line",
            AnnotationTool::Polygon => "polygon",
            AnnotationTool::Text => "text",
            AnnotationTool::Buffer => "buffer",
        }
    }

    /// Tool with the given [`AnnotationTool::name`].
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "point" => AnnotationTool::Point,
            "line" => AnnotationTool::Line,
            "polygon" => AnnotationTool::Polygon,
            "text" => AnnotationTool::Text,
            "buffer" => AnnotationTool::Buffer,
            _ => return None,
        })
    }

    /// Title of the popup of features drawn with the tool.
    pub fn title(&self) -> &'static str {
        match self {
            AnnotationTool::Point => "Point",
            AnnotationTool::Line => "Line",
            AnnotationTool::Polygon => "Polygon",
            AnnotationTool::Text => "Text",
            AnnotationTool::Buffer => "Buffer",
        }
    }
}

impl Display for AnnotationTool {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Dash pattern of annotation outlines.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineDash {
    /// Continuous line.
    #[default]
    Solid,
    /// Long dashes.
    Dashed,
    /// Dots.
    Dotted,
    /// Alternating dashes and dots.
    DashDot,
}

impl LineDash {
    /// Dash and gap lengths in pixels for a line of the given width.
    pub fn pattern(&self, stroke_width: f64) -> Vec<f64> {
        let unit = stroke_width.max(1.0);
        match self {
            LineDash::Solid => vec![],
            LineDash::Dashed => vec![3.0 * unit, 2.0 * unit],
            LineDash::Dotted => vec![0.5 * unit, 1.5 * unit],
            LineDash::DashDot => vec![3.0 * unit, 1.5 * unit, 0.5 * unit, 1.5 * unit],
        }
    }
}

/// Values of the annotation style configurator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationStyle {
    /// Fill color of polygons and point markers, and the text color of text annotations.
    pub fill_color: Color,
    /// Fill opacity, 0-100. Does not apply to text.
    pub fill_opacity: u8,
    /// Outline color.
    pub stroke_color: Color,
    /// Stroke width in pixels.
    pub stroke_width: f64,
    /// Dash pattern of lines and outlines.
    pub line_dash: LineDash,
    /// Symbol of point annotations.
    pub point_shape: PointShape,
    /// Radius of point markers in pixels.
    pub point_radius: f64,
    /// Font size of text annotations in pixels.
    pub font_size: f64,
    /// CSS font family of text annotations.
    pub font_family: String,
    /// Border color around the letters of text annotations.
    pub text_border_color: Color,
    /// Border width of text annotations in pixels, zero for no border.
    pub text_border_width: f64,
    /// Text of text annotations.
    pub label: String,
    /// Radius of buffer annotations.
    pub buffer_radius: f64,
    /// Unit of `buffer_radius`.
    pub buffer_unit: DistanceUnit,
}

impl Default for AnnotationStyle {
    fn default() -> Self {
        let defaults = FeatureStyle::default();
        Self {
            fill_color: Color::ACCENT,
            fill_opacity: 20,
            stroke_color: Color::ACCENT,
            stroke_width: 3.0,
            line_dash: LineDash::Solid,
            point_shape: PointShape::Circle,
            point_radius: 6.0,
            font_size: 14.0,
            font_family: defaults.font_family,
            text_border_color: Color::WHITE,
            text_border_width: 2.0,
            label: String::new(),
            buffer_radius: 100.0,
            buffer_unit: DistanceUnit::Metres,
        }
    }
}

impl AnnotationStyle {
    /// Builds a new feature style for the tool from the configurator values.
    pub fn feature_style(&self, tool: AnnotationTool) -> Arc<FeatureStyle> {
        let style = match tool {
            AnnotationTool::Text => FeatureStyle {
                fill: self.fill_color,
                stroke: Color::TRANSPARENT,
                stroke_width: 0.0,
                line_dash: vec![],
                point_radius: 0.0,
                point_shape: PointShape::Circle,
                label: Some(self.label.clone()).filter(|l| !l.trim().is_empty()),
                font_size: self.font_size,
                font_family: self.font_family.clone(),
                label_halo: self.text_border_color,
                label_halo_width: self.text_border_width,
            },
            _ => FeatureStyle {
                fill: self.fill_color.with_opacity(self.fill_opacity),
                stroke: self.stroke_color,
                stroke_width: self.stroke_width,
                line_dash: self.line_dash.pattern(self.stroke_width),
                point_radius: self.point_radius,
                point_shape: self.point_shape,
                label: None,
                font_size: self.font_size,
                font_family: self.font_family.clone(),
                label_halo: self.text_border_color,
                label_halo_width: self.text_border_width,
            },
        };

        Arc::new(style)
    }

    /// Buffer parameters of buffer annotations.
    pub fn buffer(&self) -> BufferSpec {
        BufferSpec {
            radius: self.buffer_radius,
            unit: self.buffer_unit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_style_has_label() {
        let mut style = AnnotationStyle::default();
        assert_eq!(style.feature_style(AnnotationTool::Text).label, None);

        style.label = "Car park".into();
        let text = style.feature_style(AnnotationTool::Text);
        assert_eq!(text.label.as_deref(), Some("Car park"));
        assert_eq!(style.feature_style(AnnotationTool::Polygon).label, None);
    }

    #[test]
    fn fill_uses_opacity() {
        let style = AnnotationStyle {
            fill_opacity: 0,
            ..Default::default()
        };
        assert!(style.feature_style(AnnotationTool::Polygon).has_transparent_fill());
    }

    #[test]
    fn fill_and_stroke_colors_are_separate() {
        let style = AnnotationStyle {
            fill_color: Color::WHITE,
            fill_opacity: 50,
            stroke_color: Color::RED,
            ..Default::default()
        };
        let polygon = style.feature_style(AnnotationTool::Polygon);
        assert_eq!(polygon.fill, Color::WHITE.with_opacity(50));
        assert_eq!(polygon.stroke, Color::RED);
    }

    #[test]
    fn dash_scales_with_width() {
        let style = AnnotationStyle {
            stroke_width: 4.0,
            line_dash: LineDash::Dashed,
            ..Default::default()
        };
        assert_eq!(style.feature_style(AnnotationTool::Line).line_dash, vec![12.0, 8.0]);
        assert!(!AnnotationStyle::default()
            .feature_style(AnnotationTool::Line)
            .is_dashed());
        assert_eq!(LineDash::Dotted.pattern(0.0), vec![0.5, 1.5]);
    }

    #[test]
    fn point_shape_is_applied() {
        let style = AnnotationStyle {
            point_shape: PointShape::Triangle,
            point_radius: 9.0,
            ..Default::default()
        };
        let point = style.feature_style(AnnotationTool::Point);
        assert_eq!(point.point_shape, PointShape::Triangle);
        assert_eq!(point.half_width_px(), 9.0);
    }

    #[test]
    fn text_border_and_font() {
        let style = AnnotationStyle {
            label: "Harbour".into(),
            fill_color: Color::RED,
            font_family: "Georgia, serif".into(),
            font_size: 18.0,
            text_border_color: Color::ACCENT,
            text_border_width: 3.0,
            ..Default::default()
        };
        let text = style.feature_style(AnnotationTool::Text);
        assert_eq!(text.fill, Color::RED);
        assert_eq!(text.font(), "18px Georgia, serif");
        assert_eq!(text.label_halo, Color::ACCENT);
        assert_eq!(text.label_halo_width, 3.0);
        assert!(text.stroke.is_transparent());
    }

    #[test]
    fn configurator_values_deserialize() {
        let style: AnnotationStyle = serde_json::from_str(
            r##"{
                "fillColor": "#FFFFFF", "fillOpacity": 40, "strokeColor": "rgb(255, 0, 0)",
                "strokeWidth": 2, "lineDash": "dashdot", "pointShape": "square", "pointRadius": 5,
                "fontSize": 12, "fontFamily": "monospace", "textBorderColor": "#000",
                "textBorderWidth": 1, "label": "", "bufferRadius": 2, "bufferUnit": "km"
            }"##,
        )
        .unwrap();
        assert_eq!(style.line_dash, LineDash::DashDot);
        assert_eq!(style.point_shape, PointShape::Square);
        assert_eq!(style.stroke_color, Color::RED);
        assert_eq!(style.text_border_color, Color::rgba(0, 0, 0, 255));
    }
}
