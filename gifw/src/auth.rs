//! Bearer token handling for requests to protected services.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use parking_lot::RwLock;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::GifwError;
use crate::platform::{send_checked, HttpRequest, HttpService};

/// Interval between token refreshes.
pub const TOKEN_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Authorization applied to urls matching a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorizationType {
    /// Requests are sent as is.
    None,
    /// `Authorization: Bearer {token}` is added.
    Bearer,
}

/// Rule as listed in the configuration document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRuleConfig {
    /// Rule name.
    pub name: String,
    /// Regular expression matched against request urls.
    pub url_regex: String,
    /// Rules are evaluated in ascending priority.
    pub priority: i32,
    /// Authorization applied on match.
    pub authorization_type: AuthorizationType,
}

#[derive(Debug, Clone)]
struct AuthRule {
    pattern: Regex,
    priority: i32,
    authorization_type: AuthorizationType,
}

/// Applies auth headers to urls and keeps the bearer token fresh.
///
/// Clones share the token.
#[derive(Debug, Clone, Default)]
pub struct AuthManager {
    rules: Vec<AuthRule>,
    token: Arc<RwLock<Option<String>>>,
}

impl AuthManager {
    /// Compiles the rules. Fails if any regex is invalid.
    pub fn new(rules: &[AuthRuleConfig]) -> Result<Self, GifwError> {
        let mut compiled = rules
            .iter()
            .map(|rule| {
                Regex::new(&rule.url_regex)
                    .map(|pattern| AuthRule {
                        pattern,
                        priority: rule.priority,
                        authorization_type: rule.authorization_type,
                    })
                    .map_err(|err| {
                        GifwError::Configuration(format!("auth rule {}: {err}", rule.name))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        compiled.sort_by_key(|rule| rule.priority);

        Ok(Self {
            rules: compiled,
            token: Arc::default(),
        })
    }

    /// Current token.
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Replaces the token.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token;
    }

    /// Authorization of the first rule matching the url.
    pub fn authorization_for(&self, url: &str) -> AuthorizationType {
        self.rules
            .iter()
            .find(|rule| rule.pattern.is_match(url))
            .map(|rule| rule.authorization_type)
            .unwrap_or(AuthorizationType::None)
    }

    /// Headers to send with a request to the url.
    pub fn headers_for(&self, url: &str) -> Vec<(String, String)> {
        match self.authorization_for(url) {
            AuthorizationType::Bearer => match self.token.read().as_deref() {
                Some(token) => vec![("Authorization".into(), format!("Bearer {token}"))],
                None => {
                    debug!("No token available for {url}");
                    vec![]
                }
            },
            AuthorizationType::None => vec![],
        }
    }

    /// Adds the auth headers for the request url.
    pub fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let headers = self.headers_for(&request.url);
        request.with_headers(headers)
    }

    /// Fetches a new token from the endpoint returning the bearer text.
    pub async fn refresh(&self, http: &dyn HttpService, token_url: &str) -> Result<(), GifwError> {
        let response = send_checked(http, HttpRequest::get(token_url)).await?;
        let token = response.text()?.trim().to_string();
        self.set_token((!token.is_empty()).then_some(token));
        Ok(())
    }

    /// Refreshes the token forever, every `interval`. Failed refreshes keep the old token.
    pub async fn refresh_loop(
        self,
        http: Arc<dyn HttpService>,
        token_url: String,
        interval: Duration,
    ) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = self.refresh(http.as_ref(), &token_url).await {
                warn!("Failed to refresh access token: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str, regex: &str, priority: i32, t: AuthorizationType) -> AuthRuleConfig {
        AuthRuleConfig {
            name: name.into(),
            url_regex: regex.into(),
            priority,
            authorization_type: t,
        }
    }

    #[test]
    fn first_rule_by_priority_wins() {
        let auth = AuthManager::new(&[
            rule("all", "^https://maps\\.example\\.com/", 10, AuthorizationType::Bearer),
            rule("public", "/public/", 1, AuthorizationType::None),
        ])
        .unwrap();
        auth.set_token(Some("abc".into()));

        assert_eq!(auth.headers_for("https://maps.example.com/public/wms"), vec![]);
        assert_eq!(
            auth.headers_for("https://maps.example.com/private/wms"),
            vec![("Authorization".to_string(), "Bearer abc".to_string())]
        );
        assert_eq!(auth.headers_for("https://other.example.com/"), vec![]);
    }

    #[test]
    fn invalid_regex_is_a_configuration_error() {
        let result = AuthManager::new(&[rule("bad", "(", 1, AuthorizationType::Bearer)]);
        assert!(matches!(result, Err(GifwError::Configuration(_))));
    }

    #[test]
    fn clones_share_token() {
        let auth = AuthManager::new(&[]).unwrap();
        let clone = auth.clone();
        auth.set_token(Some("t".into()));
        assert_eq!(clone.token().as_deref(), Some("t"));
    }
}
