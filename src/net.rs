//! Network backend abstraction and the reqwest implementation.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::http::{Method, RequestDescriptor, ResponseSnapshot};

/// Abstraction over the network for testability.
///
/// Transport failure (unreachable host, reset connection) is an `Err`; any
/// response that arrives, success or not, is an `Ok` snapshot. Strategies
/// key only on that distinction and the status range.
#[async_trait]
pub trait Network: Send + Sync {
  async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot>;
}

/// Network backend over a reqwest client, resolving relative paths against
/// a base URL.
pub struct HttpNetwork {
  client: reqwest::Client,
  base: Url,
}

impl HttpNetwork {
  pub fn new(base_url: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid base URL {}: {}", base_url, e))?;

    Ok(Self {
      client: reqwest::Client::new(),
      base,
    })
  }

  fn resolve(&self, path: &str) -> Result<Url> {
    if path.starts_with("http://") || path.starts_with("https://") {
      return Url::parse(path).map_err(|e| eyre!("Invalid request URL {}: {}", path, e));
    }

    self
      .base
      .join(path)
      .map_err(|e| eyre!("Failed to resolve {} against base URL: {}", path, e))
  }
}

fn to_reqwest(method: Method) -> reqwest::Method {
  match method {
    Method::Get => reqwest::Method::GET,
    Method::Head => reqwest::Method::HEAD,
    Method::Post => reqwest::Method::POST,
    Method::Put => reqwest::Method::PUT,
    Method::Patch => reqwest::Method::PATCH,
    Method::Delete => reqwest::Method::DELETE,
  }
}

#[async_trait]
impl Network for HttpNetwork {
  async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot> {
    let url = self.resolve(&request.path)?;

    let mut builder = self.client.request(to_reqwest(request.method), url);
    if let Some(accept) = &request.accept {
      builder = builder.header(reqwest::header::ACCEPT, accept);
    }
    if let Some(content_type) = &request.content_type {
      builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.path, e))?;

    let status = response.status().as_u16();
    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read response body from {}: {}", request.path, e))?
      .to_vec();

    Ok(ResponseSnapshot::new(status, headers, body))
  }
}

/// Scripted network for tests: serves canned replies per path, records
/// every call, and can delay responses to exercise ordering.
#[cfg(test)]
pub struct ScriptedNetwork {
  routes: std::sync::Mutex<std::collections::HashMap<String, std::collections::VecDeque<ScriptedReply>>>,
  calls: std::sync::Mutex<Vec<String>>,
  delay: Option<std::time::Duration>,
}

#[cfg(test)]
#[derive(Debug, Clone)]
pub enum ScriptedReply {
  Respond(ResponseSnapshot),
  Unreachable,
}

#[cfg(test)]
impl ScriptedNetwork {
  pub fn new() -> Self {
    Self {
      routes: std::sync::Mutex::new(std::collections::HashMap::new()),
      calls: std::sync::Mutex::new(Vec::new()),
      delay: None,
    }
  }

  pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  /// Queue a reply for a path. Replies are consumed in order; the last one
  /// queued sticks and answers every further call.
  pub fn enqueue(&self, path: &str, reply: ScriptedReply) {
    self
      .routes
      .lock()
      .unwrap()
      .entry(path.to_string())
      .or_default()
      .push_back(reply);
  }

  pub fn respond(&self, path: &str, response: ResponseSnapshot) {
    self.enqueue(path, ScriptedReply::Respond(response));
  }

  pub fn unreachable(&self, path: &str) {
    self.enqueue(path, ScriptedReply::Unreachable);
  }

  /// Number of fetches issued for a path so far.
  pub fn calls(&self, path: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|p| *p == path).count()
  }

  fn next_reply(&self, path: &str) -> ScriptedReply {
    let mut routes = self.routes.lock().unwrap();
    match routes.get_mut(path) {
      Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
      Some(queue) if queue.len() == 1 => queue.front().unwrap().clone(),
      _ => ScriptedReply::Unreachable,
    }
  }
}

#[cfg(test)]
#[async_trait]
impl Network for ScriptedNetwork {
  async fn fetch(&self, request: &RequestDescriptor) -> Result<ResponseSnapshot> {
    self.calls.lock().unwrap().push(request.path.clone());

    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }

    match self.next_reply(&request.path) {
      ScriptedReply::Respond(response) => Ok(response),
      ScriptedReply::Unreachable => Err(eyre!("network unreachable: {}", request.path)),
    }
  }
}
