//! Stable keys for cached request/response entries.

use sha2::{Digest, Sha256};

use crate::http::{Method, RequestDescriptor};

/// Key for one cached entry, derived from the request method and URL.
///
/// The digest is a fixed-length hex SHA-256, safe to use as a storage
/// primary key; the human-readable description is kept alongside for
/// inspection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryKey {
  digest: String,
  description: String,
}

impl EntryKey {
  pub fn new(method: Method, path: &str) -> Self {
    let description = format!("{} {}", method.as_str(), path.trim());

    let mut hasher = Sha256::new();
    hasher.update(description.as_bytes());
    let digest = hex::encode(hasher.finalize());

    Self {
      digest,
      description,
    }
  }

  pub fn for_request(request: &RequestDescriptor) -> Self {
    Self::new(request.method, &request.path)
  }

  pub fn digest(&self) -> &str {
    &self.digest
  }

  pub fn description(&self) -> &str {
    &self.description
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn same_request_same_key() {
    let a = EntryKey::new(Method::Get, "/static/app.css");
    let b = EntryKey::new(Method::Get, "/static/app.css");
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
  }

  #[test]
  fn method_and_path_both_distinguish() {
    let get = EntryKey::new(Method::Get, "/api/status");
    let post = EntryKey::new(Method::Post, "/api/status");
    let other = EntryKey::new(Method::Get, "/api/sensors");
    assert_ne!(get.digest(), post.digest());
    assert_ne!(get.digest(), other.digest());
  }

  #[test]
  fn digest_is_fixed_length_hex() {
    let key = EntryKey::new(Method::Get, "/");
    assert_eq!(key.digest().len(), 64);
    assert!(key.digest().chars().all(|c| c.is_ascii_hexdigit()));
    assert_eq!(key.description(), "GET /");
  }
}
