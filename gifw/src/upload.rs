//! Vector files uploaded by the user.

use std::path::Path;

use gifw_types::cartesian::Rect;
use gifw_types::geo::Crs;
use log::{info, warn};

use crate::alert::{Alert, AlertKind, Severity};
use crate::error::GifwError;
use crate::layer::{parse_feature_collection, FeatureStore};

/// Largest accepted file.
pub const MAX_UPLOAD_SIZE: usize = 10 * 1024 * 1024;

/// Extensions of the accepted files.
pub const ACCEPTED_EXTENSIONS: [&str; 2] = ["geojson", "json"];

/// File chosen by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name with extension.
    pub name: String,
    /// File contents.
    pub contents: Vec<u8>,
}

impl UploadFile {
    /// Creates a file.
    pub fn new(name: impl Into<String>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            contents: contents.into(),
        }
    }

    fn layer_name(&self) -> String {
        Path::new(&self.name)
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or(&self.name)
            .to_string()
    }
}

/// Features read from one file.
#[derive(Debug, Clone)]
pub struct UploadedLayer {
    /// Name of the file.
    pub file_name: String,
    /// Name of the layer created for the file.
    pub layer_name: String,
    /// Features in the map projection.
    pub features: FeatureStore,
}

/// File that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    /// Name of the file.
    pub file_name: String,
    /// Reason shown to the user.
    pub message: String,
}

/// Outcome of reading every chosen file.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Files that were read.
    pub layers: Vec<UploadedLayer>,
    /// Files that failed.
    pub failures: Vec<UploadFailure>,
}

impl UploadReport {
    /// Combined extent of the uploaded features.
    pub fn extent(&self) -> Option<Rect> {
        self.layers
            .iter()
            .filter_map(|layer| layer.features.extent())
            .reduce(|a, b| a.merge(b))
    }

    /// One alert summarising the upload. `None` if every file was added.
    pub fn summary_alert(&self) -> Option<Alert> {
        if self.failures.is_empty() {
            return None;
        }

        let total = self.layers.len() + self.failures.len();
        let details: Vec<String> = self
            .failures
            .iter()
            .map(|f| format!("{}: {}", f.file_name, f.message))
            .collect();
        let severity = if self.layers.is_empty() {
            Severity::Danger
        } else {
            Severity::Warning
        };

        Some(Alert::new(
            AlertKind::Popup,
            severity,
            format!("{} of {total} files could not be added", self.failures.len()),
            details.join("\n"),
        ))
    }
}

fn read_file(file: &UploadFile, crs: &Crs) -> Result<UploadedLayer, GifwError> {
    let extension = Path::new(&file.name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !ACCEPTED_EXTENSIONS.contains(&extension.as_str()) {
        return Err(GifwError::Decoding("unsupported file type".into()));
    }
    if file.contents.len() > MAX_UPLOAD_SIZE {
        return Err(GifwError::Decoding("file is too large".into()));
    }

    let document = std::str::from_utf8(&file.contents)
        .map_err(|err| GifwError::Decoding(err.to_string()))?;
    let features = parse_feature_collection(document, crs)?;
    if features.is_empty() {
        return Err(GifwError::Decoding("file contains no features".into()));
    }

    let mut store = FeatureStore::default();
    for feature in features {
        store.add(feature);
    }

    Ok(UploadedLayer {
        file_name: file.name.clone(),
        layer_name: file.layer_name(),
        features: store,
    })
}

/// Reads all files into the map projection. Every file is tried; failures are collected into
/// the report.
pub fn read_uploads(files: &[UploadFile], crs: &Crs) -> UploadReport {
    let mut report = UploadReport::default();
    for file in files {
        match read_file(file, crs) {
            Ok(layer) => {
                info!(
                    "Read {} features from {}",
                    layer.features.len(),
                    layer.file_name
                );
                report.layers.push(layer);
            }
            Err(err) => {
                warn!("Upload of {} failed: {err}", file.name);
                report.failures.push(UploadFailure {
                    file_name: file.name.clone(),
                    message: err.to_string(),
                });
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const POINTS: &str = r#"{"type": "FeatureCollection", "features": [
        {"type": "Feature", "properties": {"name": "a"}, "geometry": {"type": "Point", "coordinates": [1.0, 2.0]}},
        {"type": "Feature", "properties": {"name": "b"}, "geometry": {"type": "Point", "coordinates": [3.0, 4.0]}}
    ]}"#;

    #[test]
    fn every_file_is_tried() {
        let files = vec![
            UploadFile::new("stops.geojson", POINTS),
            UploadFile::new("notes.txt", "hello"),
            UploadFile::new("broken.json", "{"),
        ];

        let report = read_uploads(&files, &Crs::EPSG4326);
        assert_eq!(report.layers.len(), 1);
        assert_eq!(report.layers[0].layer_name, "stops");
        assert_eq!(report.layers[0].features.len(), 2);
        assert_eq!(report.extent(), Some(Rect::new(1.0, 2.0, 3.0, 4.0)));

        assert_eq!(report.failures.len(), 2);
        let alert = report.summary_alert().unwrap();
        assert_eq!(alert.title, "2 of 3 files could not be added");
        assert_eq!(alert.severity, Severity::Warning);
    }
}
