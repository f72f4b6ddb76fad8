//! Client idempotency keys and canonical route templates.
//!
//! Both are half of the natural key identifying one logical request intent,
//! so both are validated/normalized once at construction and immutable
//! afterwards. Route values can originate from proxy-influenced routing
//! metadata and must be scrubbed, not trusted.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Maximum accepted length of a client-supplied idempotency key, after
/// trimming surrounding whitespace.
pub const MAX_KEY_LEN: usize = 200;

/// Maximum accepted length of a canonicalized route template.
pub const MAX_ROUTE_LEN: usize = 500;

// ─── IdempotencyKey ──────────────────────────────────────────────────────────

/// A validated client-supplied idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
  /// Validate a raw header value. Surrounding whitespace is trimmed;
  /// empty-after-trim and over-length values are rejected.
  pub fn parse(raw: &str) -> Result<Self> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
      return Err(Error::InvalidIdempotencyKey(
        "key is empty after trimming".to_string(),
      ));
    }
    let length = trimmed.chars().count();
    if length > MAX_KEY_LEN {
      return Err(Error::InvalidIdempotencyKey(format!(
        "key is {length} characters, maximum is {MAX_KEY_LEN}"
      )));
    }
    Ok(Self(trimmed.to_string()))
  }

  /// Validate an optional header value. An absent header means the caller
  /// proceeds without coordination; it is not an error.
  pub fn from_header(value: Option<&str>) -> Result<Option<Self>> {
    value.map(Self::parse).transpose()
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for IdempotencyKey {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

// ─── RouteTemplate ───────────────────────────────────────────────────────────

/// A canonicalized logical route — base path plus the *matched template*,
/// never the literal request URL, so two logical endpoints cannot collide
/// through path parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteTemplate(String);

impl RouteTemplate {
  /// Canonicalize `base` + `template`: collapse repeated slashes, strip a
  /// trailing slash (except for the root route), reject values that do not
  /// start with `/`, contain control characters, or exceed
  /// [`MAX_ROUTE_LEN`].
  pub fn canonicalize(base: &str, template: &str) -> Result<Self> {
    let joined = format!("{base}/{template}");

    let mut canonical = String::with_capacity(joined.len());
    let mut prev_slash = false;
    for c in joined.chars() {
      if c.is_control() {
        return Err(Error::InvalidRouteTemplate(
          "route contains control characters".to_string(),
        ));
      }
      if c == '/' {
        if prev_slash {
          continue;
        }
        prev_slash = true;
      } else {
        prev_slash = false;
      }
      canonical.push(c);
    }

    if canonical.len() > 1 && canonical.ends_with('/') {
      canonical.pop();
    }

    if !canonical.starts_with('/') {
      return Err(Error::InvalidRouteTemplate(format!(
        "route must start with '/': {canonical:?}"
      )));
    }
    let length = canonical.chars().count();
    if length > MAX_ROUTE_LEN {
      return Err(Error::InvalidRouteTemplate(format!(
        "route is {length} characters, maximum is {MAX_ROUTE_LEN}"
      )));
    }

    Ok(Self(canonical))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for RouteTemplate {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // ── IdempotencyKey ──────────────────────────────────────────────────────

  #[test]
  fn key_is_trimmed() {
    let key = IdempotencyKey::parse("  abc-123  ").unwrap();
    assert_eq!(key.as_str(), "abc-123");
  }

  #[test]
  fn key_of_exactly_max_len_is_accepted() {
    let raw = "k".repeat(MAX_KEY_LEN);
    assert!(IdempotencyKey::parse(&raw).is_ok());
  }

  #[test]
  fn key_over_max_len_is_rejected() {
    let raw = "k".repeat(MAX_KEY_LEN + 1);
    assert!(matches!(
      IdempotencyKey::parse(&raw),
      Err(Error::InvalidIdempotencyKey(_))
    ));
  }

  #[test]
  fn all_whitespace_key_is_rejected() {
    assert!(matches!(
      IdempotencyKey::parse("   \t "),
      Err(Error::InvalidIdempotencyKey(_))
    ));
  }

  #[test]
  fn absent_header_is_not_an_error() {
    assert!(IdempotencyKey::from_header(None).unwrap().is_none());
  }

  // ── RouteTemplate ───────────────────────────────────────────────────────

  #[test]
  fn base_and_template_are_joined() {
    let route = RouteTemplate::canonicalize("/v1", "/api/registrations").unwrap();
    assert_eq!(route.as_str(), "/v1/api/registrations");
  }

  #[test]
  fn repeated_slashes_collapse() {
    let route = RouteTemplate::canonicalize("/v1/", "//api//things").unwrap();
    assert_eq!(route.as_str(), "/v1/api/things");
  }

  #[test]
  fn trailing_slash_is_stripped() {
    let route = RouteTemplate::canonicalize("", "/api/things/").unwrap();
    assert_eq!(route.as_str(), "/api/things");
  }

  #[test]
  fn root_route_keeps_its_slash() {
    let route = RouteTemplate::canonicalize("", "/").unwrap();
    assert_eq!(route.as_str(), "/");
  }

  #[test]
  fn control_characters_are_rejected() {
    assert!(matches!(
      RouteTemplate::canonicalize("", "/api/\u{7f}things"),
      Err(Error::InvalidRouteTemplate(_))
    ));
    assert!(matches!(
      RouteTemplate::canonicalize("", "/api/\nthings"),
      Err(Error::InvalidRouteTemplate(_))
    ));
  }

  #[test]
  fn missing_leading_slash_is_rejected() {
    assert!(matches!(
      RouteTemplate::canonicalize("v1", "api/things"),
      Err(Error::InvalidRouteTemplate(_))
    ));
  }

  #[test]
  fn over_long_route_is_rejected() {
    let template = format!("/{}", "x".repeat(MAX_ROUTE_LEN));
    assert!(matches!(
      RouteTemplate::canonicalize("", &template),
      Err(Error::InvalidRouteTemplate(_))
    ));
  }
}
