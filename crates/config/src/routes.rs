//! Path fragments used to classify requests into tiers.

use serde::Deserialize;

/// Route shapes of the protected API.
///
/// Resource names are single path segments below `api_prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RouteConfig {
    /// Prefix shared by every API path.
    pub api_prefix: String,
    /// Resource accepting anonymous thought submissions with `POST`. Its collection
    /// path doubles as the main listing endpoint.
    pub thought_path: String,
    /// Dedicated search resources.
    pub search_paths: Vec<String>,
    /// Query parameter turning a listing into a search.
    pub search_param: String,
    /// Primary content resources.
    pub content_resources: Vec<String>,
    /// Notification management resources.
    pub notification_resources: Vec<String>,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api".to_string(),
            thought_path: "thoughts".to_string(),
            search_paths: vec!["search".to_string()],
            search_param: "searchTerm".to_string(),
            content_resources: ["letters", "threads", "posts", "thoughts", "users"]
                .into_iter()
                .map(String::from)
                .collect(),
            notification_resources: vec!["notifications".to_string()],
        }
    }
}
