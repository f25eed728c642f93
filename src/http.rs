//! Request and response value types shared by the classifier, the cache
//! stores, and the network backends.
//!
//! Responses are plain value snapshots (status, headers, body bytes), so a
//! copy handed to a cache write is independent of the copy returned to the
//! caller. Every read out of a cache yields an owned clone.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};

/// HTTP method of an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
  Get,
  Head,
  Post,
  Put,
  Patch,
  Delete,
}

impl Method {
  pub fn as_str(&self) -> &'static str {
    match self {
      Method::Get => "GET",
      Method::Head => "HEAD",
      Method::Post => "POST",
      Method::Put => "PUT",
      Method::Patch => "PATCH",
      Method::Delete => "DELETE",
    }
  }

  pub fn is_get(&self) -> bool {
    matches!(self, Method::Get)
  }
}

impl std::str::FromStr for Method {
  type Err = color_eyre::Report;

  fn from_str(s: &str) -> Result<Self> {
    match s.to_ascii_uppercase().as_str() {
      "GET" => Ok(Method::Get),
      "HEAD" => Ok(Method::Head),
      "POST" => Ok(Method::Post),
      "PUT" => Ok(Method::Put),
      "PATCH" => Ok(Method::Patch),
      "DELETE" => Ok(Method::Delete),
      other => Err(eyre!("Unsupported HTTP method: {}", other)),
    }
  }
}

impl std::fmt::Display for Method {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

/// The shape of an outgoing request, as seen by classification and the
/// caching strategies.
///
/// `path` is either an absolute path (optionally with a query string) or a
/// full URL; network backends resolve relative paths against their base URL.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
  pub method: Method,
  pub path: String,
  /// Value of the `Accept` header, when the caller declared one.
  pub accept: Option<String>,
  pub content_type: Option<String>,
  pub body: Option<Vec<u8>>,
}

impl RequestDescriptor {
  /// A plain GET request for the given path.
  pub fn get(path: &str) -> Self {
    Self {
      method: Method::Get,
      path: path.to_string(),
      accept: None,
      content_type: None,
      body: None,
    }
  }

  /// A POST request carrying a JSON payload.
  pub fn post_json(path: &str, payload: &serde_json::Value) -> Result<Self> {
    let body = serde_json::to_vec(payload)
      .map_err(|e| eyre!("Failed to serialize request payload: {}", e))?;

    Ok(Self {
      method: Method::Post,
      path: path.to_string(),
      accept: None,
      content_type: Some("application/json".to_string()),
      body: Some(body),
    })
  }

  pub fn with_accept(mut self, accept: &str) -> Self {
    self.accept = Some(accept.to_string());
    self
  }

  /// Whether the caller declared it accepts an HTML response.
  ///
  /// A request without an `Accept` header does not accept HTML; callers
  /// that want page routing must say so explicitly.
  pub fn accepts_html(&self) -> bool {
    self
      .accept
      .as_deref()
      .map(|a| a.contains("text/html"))
      .unwrap_or(false)
  }
}

/// An immutable snapshot of a response: status, headers, body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseSnapshot {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
}

impl ResponseSnapshot {
  pub fn new(status: u16, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
    Self {
      status,
      headers,
      body,
    }
  }

  /// Whether the status is in the success range (2xx).
  pub fn is_success(&self) -> bool {
    (200..=299).contains(&self.status)
  }

  /// Look up a header value, case-insensitively.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn body_len(&self) -> u64 {
    self.body.len() as u64
  }

  /// Synthesized 503 with a structured JSON body, served to API callers when
  /// the network is unreachable and no cached copy exists. The JSON body
  /// lets the calling application distinguish "offline" from "bad request".
  pub fn service_unavailable(message: &str) -> Self {
    let body = serde_json::json!({ "error": message });
    Self {
      status: 503,
      headers: vec![("Content-Type".to_string(), "application/json".to_string())],
      body: body.to_string().into_bytes(),
    }
  }

  /// Built-in last-resort offline page, used when even the precached
  /// offline page is missing from the cache.
  pub fn offline_page() -> Self {
    const FALLBACK: &str =
      "<!doctype html><html><head><title>Offline</title></head>\
       <body><h1>You are offline</h1><p>This page is not available without a network connection.</p></body></html>";
    Self {
      status: 503,
      headers: vec![("Content-Type".to_string(), "text/html".to_string())],
      body: FALLBACK.as_bytes().to_vec(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn success_range_bounds() {
    assert!(ResponseSnapshot::new(200, vec![], vec![]).is_success());
    assert!(ResponseSnapshot::new(299, vec![], vec![]).is_success());
    assert!(!ResponseSnapshot::new(199, vec![], vec![]).is_success());
    assert!(!ResponseSnapshot::new(304, vec![], vec![]).is_success());
    assert!(!ResponseSnapshot::new(500, vec![], vec![]).is_success());
  }

  #[test]
  fn header_lookup_is_case_insensitive() {
    let response = ResponseSnapshot::new(
      200,
      vec![("Content-Type".to_string(), "text/css".to_string())],
      vec![],
    );
    assert_eq!(response.header("content-type"), Some("text/css"));
    assert_eq!(response.header("CONTENT-TYPE"), Some("text/css"));
    assert_eq!(response.header("etag"), None);
  }

  #[test]
  fn service_unavailable_is_structured_json() {
    let response = ResponseSnapshot::service_unavailable("network unreachable");
    assert_eq!(response.status, 503);
    assert!(!response.is_success());
    assert_eq!(response.header("content-type"), Some("application/json"));

    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body["error"], "network unreachable");
  }

  #[test]
  fn accepts_html_requires_declared_header() {
    let page = RequestDescriptor::get("/dashboard").with_accept("text/html,application/xhtml+xml");
    assert!(page.accepts_html());

    let bare = RequestDescriptor::get("/dashboard");
    assert!(!bare.accepts_html());

    let json = RequestDescriptor::get("/dashboard").with_accept("application/json");
    assert!(!json.accepts_html());
  }

  #[test]
  fn method_parses_case_insensitively() {
    use std::str::FromStr;
    assert_eq!(Method::from_str("get").unwrap(), Method::Get);
    assert_eq!(Method::from_str("POST").unwrap(), Method::Post);
    assert!(Method::from_str("TRACE").is_err());
  }
}
