//! Request classification: a pure mapping from request shape to a routing
//! category.
//!
//! Classification is recomputed per request against the configured rules and
//! never consults the network or a cache, so it can be tested against a
//! plain table of URL fixtures.

use serde::Deserialize;
use url::Url;

use crate::http::RequestDescriptor;

/// Routing category of a request. First matching rule wins, evaluated in
/// the order static, api, page, other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
  /// Static asset: matched a static path prefix or a known file extension.
  Static,
  /// API call: path starts with an API or auth prefix.
  Api,
  /// Navigable page: GET request that declares it accepts HTML.
  Page,
  /// Everything else.
  Other,
}

/// Rules the classifier matches against, built from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RouteRules {
  /// A path containing any of these substrings is a static asset.
  pub static_prefixes: Vec<String>,
  /// A path ending in any of these extensions is a static asset.
  pub static_extensions: Vec<String>,
  /// A path starting with any of these prefixes is an API call.
  pub api_prefixes: Vec<String>,
}

impl Default for RouteRules {
  fn default() -> Self {
    Self {
      static_prefixes: vec!["/static/".to_string(), "/icons/".to_string()],
      static_extensions: [".css", ".js", ".png", ".jpg", ".jpeg", ".svg", ".ico"]
        .iter()
        .map(|s| s.to_string())
        .collect(),
      api_prefixes: vec!["/api/".to_string(), "/auth/".to_string()],
    }
  }
}

/// Classify a request by its URL, method, and `Accept` header.
pub fn classify(request: &RequestDescriptor, rules: &RouteRules) -> Category {
  let path = request_path(&request.path);

  if rules.static_prefixes.iter().any(|p| path.contains(p.as_str()))
    || rules
      .static_extensions
      .iter()
      .any(|e| path.ends_with(e.as_str()))
  {
    return Category::Static;
  }

  if rules.api_prefixes.iter().any(|p| path.starts_with(p.as_str())) {
    return Category::Api;
  }

  if request.method.is_get() && request.accepts_html() {
    return Category::Page;
  }

  Category::Other
}

/// Extract the bare path to match rules against: strips the query string,
/// and for a full URL keeps only the path component.
fn request_path(raw: &str) -> String {
  if raw.starts_with("http://") || raw.starts_with("https://") {
    if let Ok(url) = Url::parse(raw) {
      return url.path().to_string();
    }
  }

  match raw.split_once('?') {
    Some((path, _)) => path.to_string(),
    None => raw.to_string(),
  }
}
