use log::debug;
use serde::Deserialize;

use crate::error::GifwError;
use crate::layer::wms::build_url;
use crate::platform::{fetch_json, HttpRequest, HttpService};

/// WPS process returning distinct values of a property.
pub const PAGED_UNIQUE_PROCESS: &str = "gs:PagedUnique";

/// Parameters of an autosuggestion query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuggestionRequest {
    /// Url of the WPS endpoint.
    pub wps_url: String,
    /// Feature type of the layer.
    pub type_name: String,
    /// Property to suggest values for.
    pub property: String,
    /// Typed text. Suggestions start with it, ignoring case.
    pub prefix: String,
    /// Maximum number of values.
    pub limit: u32,
}

#[derive(Debug, Deserialize)]
struct PagedUniqueResponse {
    #[serde(default)]
    values: Vec<serde_json::Value>,
}

/// Returns distinct values of the property starting with the typed prefix.
///
/// The server must advertise the `gs:PagedUnique` process in `capabilities`, otherwise no request
/// is made and the list is empty.
pub async fn suggest_values(
    http: &dyn HttpService,
    capabilities: &[String],
    request: &SuggestionRequest,
    headers: Vec<(String, String)>,
) -> Result<Vec<String>, GifwError> {
    if !capabilities.iter().any(|c| c == PAGED_UNIQUE_PROCESS) {
        debug!("Server has no {PAGED_UNIQUE_PROCESS} process, no suggestions");
        return Ok(vec![]);
    }

    let data_inputs = format!(
        "features=@href=http://geoserver/wfs?service=WFS&request=GetFeature&typeName={}@mimetype=text/xml;\
         fieldName={};maxFeatures={};startIndex=0",
        request.type_name, request.property, request.limit
    );
    let url = build_url(
        &request.wps_url,
        &[
            ("service".into(), "WPS".into()),
            ("version".into(), "1.0.0".into()),
            ("request".into(), "Execute".into()),
            ("identifier".into(), PAGED_UNIQUE_PROCESS.into()),
            ("DataInputs".into(), data_inputs),
            ("RawDataOutput".into(), "result=@mimetype=application/json".into()),
        ],
    )?;

    let response: PagedUniqueResponse =
        fetch_json(http, HttpRequest::get(url).with_headers(headers)).await?;
    let prefix = request.prefix.to_lowercase();

    Ok(response
        .values
        .into_iter()
        .filter_map(|value| match value {
            serde_json::Value::String(s) => Some(s),
            serde_json::Value::Null => None,
            other => Some(other.to_string()),
        })
        .filter(|value| value.to_lowercase().starts_with(&prefix))
        .take(request.limit as usize)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::testing::ScriptedHttp;

    fn request(prefix: &str) -> SuggestionRequest {
        SuggestionRequest {
            wps_url: "https://maps.example.com/geoserver/wps".into(),
            type_name: "ns:roads".into(),
            property: "name".into(),
            prefix: prefix.into(),
            limit: 10,
        }
    }

    #[test]
    fn no_capability_no_request() {
        let http = ScriptedHttp::default();
        let values =
            tokio_test::block_on(suggest_values(&http, &[], &request("a"), vec![])).unwrap();

        assert!(values.is_empty());
        assert!(http.requests().is_empty());
    }

    #[test]
    fn values_are_filtered_by_prefix() {
        let http = ScriptedHttp::default().with_route(
            "/wps",
            200,
            r#"{"values": ["Abbey Road", "acacia avenue", "Baker Street", null, 42]}"#,
        );
        let capabilities = vec![PAGED_UNIQUE_PROCESS.to_string()];
        let values = tokio_test::block_on(suggest_values(
            &http,
            &capabilities,
            &request("a"),
            vec![("Authorization".into(), "Bearer t".into())],
        ))
        .unwrap();

        assert_eq!(values, vec!["Abbey Road", "acacia avenue"]);
        let sent = &http.requests()[0];
        assert!(sent.url.contains("identifier=gs%3APagedUnique"));
        assert_eq!(sent.header("Authorization"), Some("Bearer t"));
    }
}
