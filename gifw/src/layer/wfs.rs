use gifw_types::geo::Crs;

use crate::error::GifwError;
use crate::layer::feature::Feature;
use crate::layer::feature_store::FeatureStore;
use crate::layer::wms::{build_url, proxy_url};

/// Vector source loaded from a WFS server as GeoJSON.
#[derive(Debug, Clone)]
pub struct WfsSource {
    url: String,
    type_name: String,
    proxy_requests: bool,
    features: FeatureStore,
    is_loaded: bool,
}

impl WfsSource {
    /// Creates an empty source for the feature type.
    pub fn new(url: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            type_name: type_name.into(),
            proxy_requests: false,
            features: FeatureStore::default(),
            is_loaded: false,
        }
    }

    /// Sets whether requests go through the proxy.
    pub fn with_proxy_requests(mut self, proxy: bool) -> Self {
        self.proxy_requests = proxy;
        self
    }

    /// Name of the feature type.
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Loaded features.
    pub fn features(&self) -> &FeatureStore {
        &self.features
    }

    /// Mutable loaded features.
    pub fn features_mut(&mut self) -> &mut FeatureStore {
        &mut self.features
    }

    /// Returns true once features were loaded.
    pub fn is_loaded(&self) -> bool {
        self.is_loaded
    }

    /// Url of the GetFeature request returning GeoJSON in `crs`.
    pub fn get_feature_url(
        &self,
        crs: &Crs,
        cql_filter: Option<&str>,
        proxy: Option<&str>,
    ) -> Result<String, GifwError> {
        let mut params = vec![
            ("service".to_string(), "WFS".to_string()),
            ("version".to_string(), "2.0.0".to_string()),
            ("request".to_string(), "GetFeature".to_string()),
            ("typeNames".to_string(), self.type_name.clone()),
            ("outputFormat".to_string(), "application/json".to_string()),
            ("srsName".to_string(), crs.code()),
        ];
        if let Some(filter) = cql_filter {
            params.push(("cql_filter".to_string(), filter.to_string()));
        }

        let url = build_url(&self.url, &params)?;
        match proxy {
            Some(proxy) if self.proxy_requests => proxy_url(proxy, &url),
            _ => Ok(url),
        }
    }

    /// Replaces the features with the contents of a GeoJSON document.
    ///
    /// GeoJSON coordinates are geographic, features are projected into `crs`. Features that cannot
    /// be converted are skipped with a warning.
    pub fn load_geojson(&mut self, document: &str, crs: &Crs) -> Result<usize, GifwError> {
        let features = parse_feature_collection(document, crs)?;
        let count = features.len();
        self.features = features.into();
        self.is_loaded = true;

        Ok(count)
    }
}

/// Parses a GeoJSON document into features projected into `crs`.
pub fn parse_feature_collection(document: &str, crs: &Crs) -> Result<Vec<Feature>, GifwError> {
    let geojson: geojson::GeoJson = document
        .parse()
        .map_err(|err: geojson::Error| GifwError::Decoding(err.to_string()))?;

    let features = match geojson {
        geojson::GeoJson::FeatureCollection(collection) => collection.features,
        geojson::GeoJson::Feature(feature) => vec![feature],
        geojson::GeoJson::Geometry(geometry) => vec![geojson::Feature {
            geometry: Some(geometry),
            ..Default::default()
        }],
    };

    Ok(features
        .iter()
        .filter_map(|feature| match Feature::from_geojson(feature, crs) {
            Ok(feature) => Some(feature),
            Err(err) => {
                log::warn!("Skipping GeoJSON feature: {err}");
                None
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use gifw_types::geometry::GeometryType;

    use super::*;

    const DOCUMENT: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {"type": "Feature", "properties": {"name": "A"}, "geometry": {"type": "Point", "coordinates": [-2.0, 52.0]}},
            {"type": "Feature", "properties": {}, "geometry": {"type": "LineString", "coordinates": [[-2.0, 52.0], [-2.1, 52.1]]}},
            {"type": "Feature", "properties": {}, "geometry": null}
        ]
    }"#;

    #[test]
    fn features_are_projected() {
        let mut source = WfsSource::new("https://maps.example.com/wfs", "ns:points");
        let count = source.load_geojson(DOCUMENT, &Crs::EPSG3857).unwrap();
        assert_eq!(count, 2);
        assert!(source.is_loaded());

        let first = source.features().iter().next().unwrap();
        assert_eq!(first.property_str("name"), Some("A"));
        assert_eq!(first.geometry().geometry_type(), GeometryType::Point);
        assert!(first.geometry().vertices()[0].x < -200_000.0);
    }

    #[test]
    fn multi_part_features_are_kept() {
        let document = r#"{
            "type": "FeatureCollection",
            "features": [
                {"type": "Feature", "properties": {"name": "Isles"}, "geometry": {"type": "MultiPolygon", "coordinates": [
                    [[[-6.4, 49.9], [-6.2, 49.9], [-6.2, 50.0], [-6.4, 49.9]]],
                    [[[-5.0, 50.0], [-4.9, 50.0], [-4.9, 50.1], [-5.0, 50.0]]]
                ]}},
                {"type": "Feature", "properties": {}, "geometry": {"type": "MultiLineString", "coordinates": [
                    [[-5.0, 50.0], [-5.1, 50.1]],
                    [[-5.2, 50.2], [-5.3, 50.3]]
                ]}}
            ]
        }"#;

        let features = parse_feature_collection(document, &Crs::EPSG3857).unwrap();
        assert_eq!(features.len(), 2);

        let isles = features[0].geometry();
        assert!(isles.is_multi());
        assert_eq!(isles.polygons().len(), 2);
        let inside = Crs::EPSG3857
            .project(&gifw_types::GeoPoint2d::lonlat(-4.92, 50.02))
            .unwrap();
        assert!(isles.contains_point(&inside));

        let lines = features[1].geometry();
        assert_eq!(lines.geometry_type(), GeometryType::LineString);
        assert_eq!(lines.lines().len(), 2);

        let back = features[0].to_geojson(&Crs::EPSG3857).unwrap();
        assert_matches::assert_matches!(
            back.geometry.map(|g| g.value),
            Some(geojson::Value::MultiPolygon(parts)) if parts.len() == 2
        );
    }

    #[test]
    fn get_feature_url_carries_filter() {
        let source = WfsSource::new("https://maps.example.com/wfs", "ns:points");
        let url = source
            .get_feature_url(&Crs::EPSG3857, Some("a = 1"), None)
            .unwrap();
        assert!(url.contains("cql_filter=a+%3D+1"));
        assert!(url.contains("srsName=EPSG%3A3857"));
    }
}
