//! Searching for places through the backend search endpoint.

use std::time::Duration;

use futures::future::{AbortHandle, AbortRegistration};
use gifw_types::cartesian::{Point2d, Rect};
use gifw_types::geo::Crs;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::async_runtime::with_deadline;
use crate::auth::AuthManager;
use crate::error::{GifwError, ValidationIssue};
use crate::permalink::SearchPin;
use crate::platform::{fetch_json, HttpRequest, HttpService, Method};

/// Time after which a search is given up.
pub const SEARCH_TIMEOUT: Duration = Duration::from_secs(25);

/// Search offered in the search box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDefinition {
    /// Id sent to the backend.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Whether the search is run by default.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Position in the result list.
    #[serde(default)]
    pub order: i32,
    /// Maximum number of results.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Zoom level for point results.
    #[serde(default)]
    pub zoom_level: Option<f64>,
}

fn enabled() -> bool {
    true
}

fn default_max_results() -> u32 {
    10
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQuery<'a> {
    query: &'a str,
    searches: Vec<SearchQueryDefinition<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchQueryDefinition<'a> {
    id: &'a str,
    max_results: u32,
}

/// Place found by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    /// Title shown in the list and the pin popup.
    pub title: String,
    /// Extra text shown in the pin popup.
    #[serde(default)]
    pub display_text: Option<String>,
    /// X coordinate of a point result.
    #[serde(default)]
    pub x: Option<f64>,
    /// Y coordinate of a point result.
    #[serde(default)]
    pub y: Option<f64>,
    /// `[x_min, y_min, x_max, y_max]` of an area result.
    #[serde(default)]
    pub bbox: Option<[f64; 4]>,
    /// EPSG code of the coordinates.
    #[serde(default = "default_epsg")]
    pub epsg: u32,
    /// Zoom level to show a point result at.
    #[serde(default)]
    pub zoom: Option<f64>,
}

fn default_epsg() -> u32 {
    4326
}

/// Results of one search definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultCategory {
    /// Name of the category.
    pub category_name: String,
    /// Position in the result list.
    #[serde(default)]
    pub ordering: i32,
    /// Results in relevance order.
    #[serde(default)]
    pub results: Vec<SearchResult>,
}

/// Where the map goes to show a result, in the map projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SearchTarget {
    /// Center on the point.
    Point(Point2d),
    /// Fit the extent.
    Extent(Rect),
}

impl SearchResult {
    /// Location of the result in `map_crs`. `None` if the result has no coordinates.
    pub fn target(&self, map_crs: &Crs) -> Result<Option<SearchTarget>, GifwError> {
        let crs = Crs::from_epsg(self.epsg);
        if let Some([x_min, y_min, x_max, y_max]) = self.bbox {
            let extent = crs.transform_rect(map_crs, &Rect::new(x_min, y_min, x_max, y_max))?;
            return Ok(Some(SearchTarget::Extent(extent)));
        }

        match (self.x, self.y) {
            (Some(x), Some(y)) => Ok(Some(SearchTarget::Point(
                crs.transform_point(map_crs, &Point2d::new(x, y))?,
            ))),
            _ => Ok(None),
        }
    }

    /// Pin stored in the permalink for the result. The pin sits at the point of the result, or
    /// the center of its box.
    pub fn pin(&self) -> Option<SearchPin> {
        let (x, y) = match (self.x, self.y, self.bbox) {
            (Some(x), Some(y), _) => (x, y),
            (_, _, Some([x_min, y_min, x_max, y_max])) => {
                ((x_min + x_max) / 2.0, (y_min + y_max) / 2.0)
            }
            _ => return None,
        };

        Some(SearchPin {
            x,
            y,
            epsg: self.epsg,
            title: self.title.clone(),
            content: self.display_text.clone().unwrap_or_default(),
        })
    }
}

/// Search request ready to run.
///
/// The request is aborted through [`SearchTask::abort_handle`] and gives up after
/// [`SEARCH_TIMEOUT`]. The engine numbers its searches, so a result can be matched with the
/// search that produced it through [`SearchTask::id`].
#[derive(Debug)]
pub struct SearchTask {
    id: u64,
    request: HttpRequest,
    handle: AbortHandle,
    registration: AbortRegistration,
    timeout: Duration,
}

impl SearchTask {
    /// Number of the search, increasing with every search started by the engine.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn with_id(mut self, id: u64) -> Self {
        self.id = id;
        self
    }

    /// Handle cancelling the search.
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.clone()
    }

    /// The request sent by the task.
    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Sets the time after which the search is given up.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sends the request. Categories without results are dropped and the rest are sorted by
    /// their ordering.
    pub async fn run(self, http: &dyn HttpService) -> Result<Vec<SearchResultCategory>, GifwError> {
        let mut categories: Vec<SearchResultCategory> = with_deadline(
            fetch_json(http, self.request),
            self.registration,
            self.timeout,
        )
        .await?;

        categories.retain(|c| !c.results.is_empty());
        categories.sort_by_key(|c| c.ordering);
        debug!("Search returned {} categories", categories.len());
        Ok(categories)
    }
}

/// Builds the search of `query` with the enabled definitions.
pub fn search_task(
    endpoint: &str,
    query: &str,
    definitions: &[SearchDefinition],
    auth: &AuthManager,
) -> Result<SearchTask, GifwError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(GifwError::Validation(vec![ValidationIssue::new(
            "query",
            "Enter something to search for",
        )]));
    }

    let mut enabled: Vec<&SearchDefinition> = definitions.iter().filter(|d| d.enabled).collect();
    if enabled.is_empty() {
        return Err(GifwError::Validation(vec![ValidationIssue::new(
            "searches",
            "Choose at least one search",
        )]));
    }
    enabled.sort_by_key(|d| d.order);

    let body = SearchQuery {
        query,
        searches: enabled
            .iter()
            .map(|d| SearchQueryDefinition {
                id: &d.id,
                max_results: d.max_results,
            })
            .collect(),
    };
    let request = auth.authorize(HttpRequest::json(Method::Post, endpoint, &body)?);
    let (handle, registration) = AbortHandle::new_pair();

    Ok(SearchTask {
        id: 0,
        request,
        handle,
        registration,
        timeout: SEARCH_TIMEOUT,
    })
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use insta::assert_snapshot;

    use super::*;
    use crate::platform::testing::ScriptedHttp;

    fn definitions() -> Vec<SearchDefinition> {
        serde_json::from_str(
            r#"[{"id": "streets", "name": "Streets", "order": 2},
                {"id": "places", "name": "Places", "order": 1, "maxResults": 5},
                {"id": "uprn", "name": "Addresses", "enabled": false}]"#,
        )
        .unwrap()
    }

    #[test]
    fn request_lists_enabled_searches_in_order() {
        let task = search_task(
            "https://app.example.com/search",
            " plym ",
            &definitions(),
            &AuthManager::default(),
        )
        .unwrap();

        let body = String::from_utf8(task.request().body.clone().unwrap().to_vec()).unwrap();
        assert_snapshot!(
            body,
            @r#"{"query":"plym","searches":[{"id":"places","maxResults":5},{"id":"streets","maxResults":10}]}"#
        );
    }

    #[test]
    fn empty_query_is_rejected() {
        assert_matches!(
            search_task("https://app.example.com/search", "  ", &definitions(), &AuthManager::default()),
            Err(GifwError::Validation(_))
        );
    }

    #[test]
    fn results_are_sorted_and_located() {
        let http = ScriptedHttp::default().with_route(
            "search",
            200,
            r#"[{"categoryName": "Streets", "ordering": 2, "results": [{"title": "Armada Way", "x": -4.14, "y": 50.37}]},
                {"categoryName": "Empty", "ordering": 0, "results": []},
                {"categoryName": "Places", "ordering": 1, "results": [{"title": "Plymouth", "bbox": [-4.2, 50.3, -4.0, 50.4]}]}]"#,
        );
        let task = search_task(
            "https://app.example.com/search",
            "plym",
            &definitions(),
            &AuthManager::default(),
        )
        .unwrap();

        let categories = tokio_test::block_on(task.run(&http)).unwrap();
        assert_eq!(categories.len(), 2);
        assert_eq!(categories[0].category_name, "Places");

        let place = &categories[0].results[0];
        assert_matches!(place.target(&Crs::EPSG4326), Ok(Some(SearchTarget::Extent(_))));
        let pin = place.pin().unwrap();
        assert!((pin.x + 4.1).abs() < 1e-9);
        assert_eq!(pin.epsg, 4326);
    }

    #[tokio::test]
    async fn aborted_search_fails() {
        let http = ScriptedHttp::default().with_route("search", 200, "[]");
        let task = search_task(
            "https://app.example.com/search",
            "plym",
            &definitions(),
            &AuthManager::default(),
        )
        .unwrap();
        task.abort_handle().abort();

        assert_matches!(task.run(&http).await, Err(GifwError::Aborted));
        assert!(http.requests().is_empty());
    }
}
