//! Export of user drawn features into GeoJSON, GPX and KML files.

use std::fmt::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use gifw_types::cartesian::Point2d;
use gifw_types::geo::Crs;
use gifw_types::geometry::{Geom, GeometryType};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::GifwError;
use crate::layer::{Feature, FeatureStyle};

/// Creator written into GPX and KML files.
const CREATOR: &str = "GIFW";

/// File format of a vector export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// GeoJSON feature collection.
    GeoJson,
    /// GPS exchange format. Polygons are written as closed tracks.
    Gpx,
    /// Keyhole markup language with the feature styles.
    Kml,
}

impl ExportFormat {
    /// File extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "geojson",
            ExportFormat::Gpx => "gpx",
            ExportFormat::Kml => "kml",
        }
    }

    /// MIME type of the file.
    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::GeoJson => "application/geo+json",
            ExportFormat::Gpx => "application/gpx+xml",
            ExportFormat::Kml => "application/vnd.google-earth.kml+xml",
        }
    }
}

/// File produced by an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFile {
    /// Suggested file name.
    pub file_name: String,
    /// MIME type.
    pub mime_type: &'static str,
    /// File contents.
    pub contents: String,
}

/// Name of the feature in the exported file: its label, popup title or `name` property.
fn feature_name(feature: &Feature) -> Option<String> {
    feature
        .style()
        .and_then(|s| s.label.clone())
        .or_else(|| feature.meta().popup.as_ref().map(|p| p.title.clone()))
        .or_else(|| feature.property_str("name").map(str::to_string))
        .filter(|name| !name.trim().is_empty())
}

fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Exports the features given in `crs` into a file named `name`.
pub fn export_features<'a>(
    features: impl IntoIterator<Item = &'a Feature>,
    crs: &Crs,
    format: ExportFormat,
    name: &str,
    created: DateTime<Utc>,
) -> Result<ExportedFile, GifwError> {
    let features: Vec<&Feature> = features.into_iter().collect();
    if features.is_empty() {
        return Err(GifwError::Generic("there are no features to export".into()));
    }

    let contents = match format {
        ExportFormat::GeoJson => to_geojson(&features, crs)?,
        ExportFormat::Gpx => to_gpx(&features, crs, name, created)?,
        ExportFormat::Kml => to_kml(&features, crs, name)?,
    };
    debug!(
        "Exported {} features as {}",
        features.len(),
        format.extension()
    );

    Ok(ExportedFile {
        file_name: format!("{name}.{}", format.extension()),
        mime_type: format.mime_type(),
        contents,
    })
}

fn to_geojson(features: &[&Feature], crs: &Crs) -> Result<String, GifwError> {
    let collection = geojson::FeatureCollection {
        bbox: None,
        features: features
            .iter()
            .map(|f| f.to_geojson(crs))
            .collect::<Result<_, _>>()?,
        foreign_members: None,
    };

    Ok(collection.to_string())
}

fn geographic(feature: &Feature, crs: &Crs) -> Result<Geom, GifwError> {
    Ok(feature.geometry().transform(crs, &Crs::EPSG4326)?)
}

fn write_gpx_waypoint(out: &mut String, p: &Point2d, name: &str) {
    let _ = writeln!(out, "  <wpt lat=\"{:.6}\" lon=\"{:.6}\">{name}</wpt>", p.y, p.x);
}

fn write_gpx_points(out: &mut String, tag: &str, points: &[Point2d]) {
    for p in points {
        let _ = writeln!(out, "      <{tag} lat=\"{:.6}\" lon=\"{:.6}\"/>", p.y, p.x);
    }
}

fn to_gpx(
    features: &[&Feature],
    crs: &Crs,
    name: &str,
    created: DateTime<Utc>,
) -> Result<String, GifwError> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = writeln!(
        out,
        "<gpx version=\"1.1\" creator=\"{CREATOR}\" xmlns=\"http://www.topografix.com/GPX/1/1\">"
    );
    let _ = writeln!(
        out,
        "  <metadata><name>{}</name><time>{}</time></metadata>",
        escape_xml(name),
        created.to_rfc3339_opts(SecondsFormat::Secs, true)
    );

    let mut tracks = String::new();
    for feature in features {
        let name = feature_name(feature)
            .map(|n| format!("<name>{}</name>", escape_xml(&n)))
            .unwrap_or_default();
        let geometry = geographic(feature, crs)?;
        match &geometry {
            Geom::Point(p) => write_gpx_waypoint(&mut out, p, &name),
            Geom::MultiPoint(points) => {
                for p in points {
                    write_gpx_waypoint(&mut out, p, &name);
                }
            }
            _ => {
                let _ = writeln!(tracks, "  <trk>{name}");
                let segments = match geometry.geometry_type() {
                    GeometryType::Polygon => geometry
                        .polygons()
                        .iter()
                        .map(|polygon| polygon.exterior())
                        .collect(),
                    _ => geometry.lines(),
                };
                for segment in segments {
                    tracks.push_str("    <trkseg>\n");
                    write_gpx_points(&mut tracks, "trkpt", segment);
                    tracks.push_str("    </trkseg>\n");
                }
                tracks.push_str("  </trk>\n");
            }
        }
    }

    out.push_str(&tracks);
    out.push_str("</gpx>\n");
    Ok(out)
}

fn kml_coordinates(points: &[Point2d]) -> String {
    points
        .iter()
        .map(|p| format!("{:.6},{:.6}", p.x, p.y))
        .collect::<Vec<_>>()
        .join(" ")
}

fn to_kml(features: &[&Feature], crs: &Crs, name: &str) -> Result<String, GifwError> {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<kml xmlns=\"http://www.opengis.net/kml/2.2\">\n<Document>\n");
    let _ = writeln!(out, "  <name>{}</name>", escape_xml(name));

    for feature in features {
        out.push_str("  <Placemark>\n");
        if let Some(name) = feature_name(feature) {
            let _ = writeln!(out, "    <name>{}</name>", escape_xml(&name));
        }
        if let Some(style) = feature.style() {
            write_kml_style(&mut out, style);
        }

        write_kml_geometry(&mut out, &geographic(feature, crs)?, "    ");
        out.push_str("  </Placemark>\n");
    }

    out.push_str("</Document>\n</kml>\n");
    Ok(out)
}

/// Font size KML renders labels with at scale 1.
const KML_LABEL_FONT_SIZE: f64 = 14.0;

fn write_kml_style(out: &mut String, style: &FeatureStyle) {
    let _ = write!(
        out,
        "    <Style><IconStyle><color>{}</color><scale>{:.2}</scale></IconStyle>",
        style.fill.to_kml(),
        style.point_radius / FeatureStyle::default().point_radius
    );
    if style.label.is_some() {
        let _ = write!(
            out,
            "<LabelStyle><color>{}</color><scale>{:.2}</scale></LabelStyle>",
            style.fill.with_opacity(100).to_kml(),
            style.font_size / KML_LABEL_FONT_SIZE
        );
    }
    let _ = writeln!(
        out,
        "<LineStyle><color>{}</color><width>{}</width></LineStyle><PolyStyle><color>{}</color></PolyStyle></Style>",
        style.stroke.to_kml(),
        style.stroke_width,
        style.fill.to_kml()
    );
}

fn write_kml_geometry(out: &mut String, geometry: &Geom, indent: &str) {
    match geometry {
        Geom::Point(p) => {
            let _ = writeln!(
                out,
                "{indent}<Point><coordinates>{}</coordinates></Point>",
                kml_coordinates(std::slice::from_ref(p))
            );
        }
        Geom::LineString(points) => {
            let _ = writeln!(
                out,
                "{indent}<LineString><coordinates>{}</coordinates></LineString>",
                kml_coordinates(points)
            );
        }
        Geom::Polygon(polygon) => {
            let _ = writeln!(out, "{indent}<Polygon>");
            let _ = writeln!(
                out,
                "{indent}  <outerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></outerBoundaryIs>",
                kml_coordinates(polygon.exterior())
            );
            for ring in polygon.interiors() {
                let _ = writeln!(
                    out,
                    "{indent}  <innerBoundaryIs><LinearRing><coordinates>{}</coordinates></LinearRing></innerBoundaryIs>",
                    kml_coordinates(ring)
                );
            }
            let _ = writeln!(out, "{indent}</Polygon>");
        }
        multi => {
            let _ = writeln!(out, "{indent}<MultiGeometry>");
            let inner = format!("{indent}  ");
            for part in multi.parts() {
                write_kml_geometry(out, &part, &inner);
            }
            let _ = writeln!(out, "{indent}</MultiGeometry>");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use gifw_types::geometry::Polygon;
    use insta::assert_snapshot;

    use super::*;

    fn created() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn features() -> Vec<Feature> {
        vec![
            Feature::new(Geom::Point(Point2d::new(-4.1, 50.4))).with_property("name", "Pier & steps"),
            Feature::new(Geom::LineString(vec![
                Point2d::new(-4.1, 50.4),
                Point2d::new(-4.2, 50.5),
            ])),
        ]
    }

    #[test]
    fn gpx_has_waypoints_and_tracks() {
        let features = features();
        let file = export_features(&features, &Crs::EPSG4326, ExportFormat::Gpx, "walk", created())
            .unwrap();

        assert_eq!(file.file_name, "walk.gpx");
        assert_snapshot!(file.contents.trim_end(), @r#"
        <?xml version="1.0" encoding="UTF-8"?>
        <gpx version="1.1" creator="GIFW" xmlns="http://www.topografix.com/GPX/1/1">
          <metadata><name>walk</name><time>2024-05-01T12:00:00Z</time></metadata>
          <wpt lat="50.400000" lon="-4.100000"><name>Pier &amp; steps</name></wpt>
          <trk>
            <trkseg>
              <trkpt lat="50.400000" lon="-4.100000"/>
              <trkpt lat="50.500000" lon="-4.200000"/>
            </trkseg>
          </trk>
        </gpx>
        "#);
    }

    #[test]
    fn kml_carries_styles_and_rings() {
        let style = Arc::new(FeatureStyle {
            label: Some("Park".into()),
            ..FeatureStyle::default()
        });
        let polygon = Feature::new(Geom::Polygon(Polygon::new(
            vec![
                Point2d::new(0.0, 0.0),
                Point2d::new(1.0, 0.0),
                Point2d::new(1.0, 1.0),
            ],
            vec![],
        )))
        .with_style(style);

        let file = export_features([&polygon], &Crs::EPSG4326, ExportFormat::Kml, "areas", created())
            .unwrap();
        assert!(file.contents.contains("<name>Park</name>"));
        assert!(file.contents.contains("<color>ffff8833</color>"));
        assert!(file.contents.contains(
            "<coordinates>0.000000,0.000000 1.000000,0.000000 1.000000,1.000000 0.000000,0.000000</coordinates>"
        ));
    }

    #[test]
    fn multi_part_geometries_are_kept() {
        let square = |x: f64| {
            Polygon::new(
                vec![
                    Point2d::new(x, 0.0),
                    Point2d::new(x + 1.0, 0.0),
                    Point2d::new(x + 1.0, 1.0),
                    Point2d::new(x, 1.0),
                ],
                vec![],
            )
        };
        let fields = Feature::new(Geom::MultiPolygon(vec![square(0.0), square(5.0)]))
            .with_property("name", "Fields");

        let kml = export_features([&fields], &Crs::EPSG4326, ExportFormat::Kml, "fields", created())
            .unwrap();
        assert_eq!(kml.contents.matches("<MultiGeometry>").count(), 1);
        assert_eq!(kml.contents.matches("<Polygon>").count(), 2);

        let gpx = export_features([&fields], &Crs::EPSG4326, ExportFormat::Gpx, "fields", created())
            .unwrap();
        assert_eq!(gpx.contents.matches("<trk>").count(), 1);
        assert_eq!(gpx.contents.matches("<trkseg>").count(), 2);
        assert!(gpx.contents.contains("<trkpt lat=\"0.000000\" lon=\"5.000000\"/>"));

        let stops = Feature::new(Geom::MultiPoint(vec![Point2d::new(1.0, 2.0), Point2d::new(3.0, 4.0)]));
        let gpx = export_features([&stops], &Crs::EPSG4326, ExportFormat::Gpx, "stops", created())
            .unwrap();
        assert_eq!(gpx.contents.matches("<wpt ").count(), 2);
    }

    #[test]
    fn kml_label_and_icon_styles() {
        let style = Arc::new(FeatureStyle {
            label: Some("Quay".into()),
            font_size: 21.0,
            point_radius: 12.0,
            ..FeatureStyle::default()
        });
        let point = Feature::new(Geom::Point(Point2d::new(-5.05, 50.15))).with_style(style);

        let file = export_features([&point], &Crs::EPSG4326, ExportFormat::Kml, "quay", created())
            .unwrap();
        assert!(file
            .contents
            .contains("<IconStyle><color>33ff8833</color><scale>2.00</scale></IconStyle>"));
        assert!(file
            .contents
            .contains("<LabelStyle><color>ffff8833</color><scale>1.50</scale></LabelStyle>"));
    }

    #[test]
    fn geojson_is_geographic() {
        let feature = Feature::new(Geom::Point(Point2d::new(0.0, 0.0)));
        let file = export_features([&feature], &Crs::EPSG3857, ExportFormat::GeoJson, "points", created())
            .unwrap();
        let document: geojson::GeoJson = file.contents.parse().unwrap();
        let collection = geojson::FeatureCollection::try_from(document).unwrap();
        assert_eq!(collection.features.len(), 1);
        assert_eq!(file.mime_type, "application/geo+json");
    }

    #[test]
    fn nothing_to_export() {
        assert_matches!(
            export_features([], &Crs::EPSG4326, ExportFormat::Kml, "empty", created()),
            Err(GifwError::Generic(_))
        );
    }
}
