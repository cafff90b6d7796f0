//! Bookmarks of map extents stored by the backend.

use gifw_types::cartesian::Rect;
use gifw_types::geo::Crs;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::auth::AuthManager;
use crate::error::{GifwError, ValidationIssue};
use crate::platform::{fetch_json, send_checked, HttpRequest, HttpService, Method};

/// Maximum length of a bookmark name.
pub const MAX_NAME_LENGTH: usize = 50;

/// Saved map extent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    /// Id assigned by the backend.
    #[serde(default)]
    pub id: Option<i64>,
    /// Name chosen by the user.
    pub name: String,
    /// Western edge.
    pub x_min: f64,
    /// Southern edge.
    pub y_min: f64,
    /// Eastern edge.
    pub x_max: f64,
    /// Northern edge.
    pub y_max: f64,
    /// EPSG code of the coordinates.
    #[serde(default = "default_epsg")]
    pub epsg: u32,
}

fn default_epsg() -> u32 {
    3857
}

impl Bookmark {
    /// Creates an unsaved bookmark of the extent given in `crs`.
    pub fn new(name: impl Into<String>, extent: &Rect, crs: &Crs) -> Self {
        Self {
            id: None,
            name: name.into(),
            x_min: extent.x_min,
            y_min: extent.y_min,
            x_max: extent.x_max,
            y_max: extent.y_max,
            epsg: crs.epsg(),
        }
    }

    /// Extent of the bookmark in `crs`.
    pub fn extent(&self, crs: &Crs) -> Result<Rect, GifwError> {
        let extent = Rect::new(self.x_min, self.y_min, self.x_max, self.y_max);
        Ok(Crs::from_epsg(self.epsg).transform_rect(crs, &extent)?)
    }
}

/// Checks the name of a new bookmark against the saved ones.
pub fn validate_name(name: &str, existing: &[Bookmark]) -> Vec<ValidationIssue> {
    let name = name.trim();
    let mut issues = vec![];
    if name.is_empty() {
        issues.push(ValidationIssue::new("name", "A name is required"));
    } else if name.chars().count() > MAX_NAME_LENGTH {
        issues.push(ValidationIssue::new(
            "name",
            format!("The name must be {MAX_NAME_LENGTH} characters or fewer"),
        ));
    }

    if !name.is_empty()
        && existing
            .iter()
            .any(|b| b.name.trim().eq_ignore_ascii_case(name))
    {
        issues.push(ValidationIssue::new(
            "name",
            "A bookmark with this name already exists",
        ));
    }

    issues
}

/// Client of the bookmark REST collection.
#[derive(Debug, Clone)]
pub struct BookmarkClient {
    endpoint: String,
    auth: AuthManager,
}

impl BookmarkClient {
    /// Creates a client of the collection at `endpoint`.
    pub fn new(endpoint: impl Into<String>, auth: AuthManager) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// Bookmarks of the user.
    pub async fn list(&self, http: &dyn HttpService) -> Result<Vec<Bookmark>, GifwError> {
        let request = self.auth.authorize(HttpRequest::get(&self.endpoint));
        fetch_json(http, request).await
    }

    /// Validates and saves a new bookmark. Returns the saved bookmark with its id.
    pub async fn create(
        &self,
        http: &dyn HttpService,
        bookmark: Bookmark,
        existing: &[Bookmark],
    ) -> Result<Bookmark, GifwError> {
        let issues = validate_name(&bookmark.name, existing);
        if !issues.is_empty() {
            return Err(GifwError::Validation(issues));
        }

        let bookmark = Bookmark {
            name: bookmark.name.trim().to_string(),
            ..bookmark
        };
        let request = self.auth.authorize(HttpRequest::json(
            Method::Post,
            &self.endpoint,
            &bookmark,
        )?);
        let saved: Bookmark = fetch_json(http, request).await?;
        info!("Saved bookmark {:?}", saved.id);
        Ok(saved)
    }

    /// Deletes the bookmark with the id.
    pub async fn delete(&self, http: &dyn HttpService, id: i64) -> Result<(), GifwError> {
        let request = self
            .auth
            .authorize(HttpRequest::delete(format!("{}/{id}", self.endpoint)));
        send_checked(http, request).await?;
        debug!("Deleted bookmark {id}");
        Ok(())
    }
}
