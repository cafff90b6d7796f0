use std::fmt::{Display, Formatter};
use std::sync::Arc;

use gifw_types::cartesian::Point2d;
use gifw_types::geo::Crs;
use gifw_types::geometry::Geom;
use gifw_types::units::DistanceUnit;
use serde::{Deserialize, Serialize};
use serde_json::{Map as JsonMap, Value};
use uuid::Uuid;

use crate::error::GifwError;
use crate::layer::style::FeatureStyle;
use crate::popup::PopupOptions;

/// Unique id of a feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FeatureId(Uuid);

impl FeatureId {
    /// Generates a new random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FeatureId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for FeatureId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Radius used to build a buffer annotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BufferSpec {
    /// Radius in `unit`.
    pub radius: f64,
    /// Unit of the radius.
    pub unit: DistanceUnit,
}

impl BufferSpec {
    /// Radius in metres.
    pub fn radius_metres(&self) -> f64 {
        self.unit.to_metres(self.radius)
    }
}

/// Transient data attached to annotation and measurement features.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMeta {
    /// Popup shown when the feature is clicked.
    pub popup: Option<PopupOptions>,
    /// Name of the tool that drew the feature.
    pub tool: Option<String>,
    /// Buffer parameters of buffer annotations.
    pub buffer: Option<BufferSpec>,
}

/// Vector feature: geometry with a property bag.
#[derive(Debug, Clone)]
pub struct Feature {
    id: FeatureId,
    geometry: Geom,
    properties: JsonMap<String, Value>,
    style: Option<Arc<FeatureStyle>>,
    meta: FeatureMeta,
}

impl Feature {
    /// Creates a new feature with a random id.
    pub fn new(geometry: Geom) -> Self {
        Self {
            id: FeatureId::new(),
            geometry,
            properties: JsonMap::new(),
            style: None,
            meta: FeatureMeta::default(),
        }
    }

    /// Sets the feature properties.
    pub fn with_properties(mut self, properties: JsonMap<String, Value>) -> Self {
        self.properties = properties;
        self
    }

    /// Sets one property.
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Sets the style of the feature.
    pub fn with_style(mut self, style: Arc<FeatureStyle>) -> Self {
        self.style = Some(style);
        self
    }

    /// Sets the metadata of the feature.
    pub fn with_meta(mut self, meta: FeatureMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Feature id.
    pub fn id(&self) -> FeatureId {
        self.id
    }

    /// Geometry of the feature in the layer CRS.
    pub fn geometry(&self) -> &Geom {
        &self.geometry
    }

    /// Replaces the geometry.
    pub fn set_geometry(&mut self, geometry: Geom) {
        self.geometry = geometry;
    }

    /// Mutable access to the geometry.
    pub fn geometry_mut(&mut self) -> &mut Geom {
        &mut self.geometry
    }

    /// Property bag.
    pub fn properties(&self) -> &JsonMap<String, Value> {
        &self.properties
    }

    /// Mutable property bag.
    pub fn properties_mut(&mut self) -> &mut JsonMap<String, Value> {
        &mut self.properties
    }

    /// String value of a property.
    pub fn property_str(&self, key: &str) -> Option<&str> {
        self.properties.get(key).and_then(Value::as_str)
    }

    /// Feature style, if set.
    pub fn style(&self) -> Option<&Arc<FeatureStyle>> {
        self.style.as_ref()
    }

    /// Replaces the style.
    pub fn set_style(&mut self, style: Arc<FeatureStyle>) {
        self.style = Some(style);
    }

    /// Transient metadata.
    pub fn meta(&self) -> &FeatureMeta {
        &self.meta
    }

    /// Mutable transient metadata.
    pub fn meta_mut(&mut self) -> &mut FeatureMeta {
        &mut self.meta
    }

    /// Converts the feature into a GeoJSON feature with geographic coordinates.
    pub fn to_geojson(&self, crs: &Crs) -> Result<geojson::Feature, GifwError> {
        let geographic = self.geometry.transform(crs, &Crs::EPSG4326)?;
        let geometry = geojson::Geometry::new(geojson::Value::from(&geographic.to_geo()));

        Ok(geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: Some(geojson::feature::Id::String(self.id.to_string())),
            properties: Some(self.properties.clone()),
            foreign_members: None,
        })
    }

    /// Creates a feature from a GeoJSON feature with geographic coordinates, projecting it into
    /// `crs`.
    pub fn from_geojson(feature: &geojson::Feature, crs: &Crs) -> Result<Self, GifwError> {
        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| GifwError::Decoding("feature has no geometry".into()))?;
        let geo_geometry = geo::Geometry::<f64>::try_from(geometry.value.clone())
            .map_err(|err| GifwError::Decoding(err.to_string()))?;
        let geometry = Geom::from_geo(&geo_geometry)?.transform(&Crs::EPSG4326, crs)?;

        Ok(Self::new(geometry).with_properties(feature.properties.clone().unwrap_or_default()))
    }

    /// Returns the geometry center, used to anchor popups.
    pub fn anchor(&self) -> Option<Point2d> {
        self.geometry.centroid()
    }
}
