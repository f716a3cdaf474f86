//! Boundary validation for path parameters and request bodies.
//!
//! Everything here runs before the store is touched. Body problems are
//! collected and reported together as a 422; malformed path or query values
//! fail fast with a 400.

use axum::http::{HeaderMap, header, uri::Authority};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use segmentify_core::membership::UserId;

use crate::error::ApiError;

pub const SLUG_MIN_LEN: usize = 5;
pub const SLUG_MAX_LEN: usize = 50;
pub const MAX_USER_ID: UserId = 2_147_483_647;

/// Wire format of `expired` in add requests.
pub const EXPIRY_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";
/// Wire format of the history window bounds.
pub const DAY_FORMAT: &str = "%Y-%m-%d";

/// Collects human-readable validation messages for one request.
#[derive(Debug, Default)]
pub struct Problems(Vec<String>);

impl Problems {
  pub fn new() -> Self { Self::default() }

  pub fn slug(&mut self, field: &str, slug: &str) {
    let len = slug.chars().count();
    if !(SLUG_MIN_LEN..=SLUG_MAX_LEN).contains(&len) {
      self.0.push(format!(
        "{field}: slug must be between {SLUG_MIN_LEN} and {SLUG_MAX_LEN} characters, got {len}"
      ));
    } else if !is_slug_charset(slug) {
      self
        .0
        .push(format!("{field}: slug may contain only letters, digits and '_'"));
    }
  }

  pub fn user_id(&mut self, field: &str, id: i64) {
    if !(1..=MAX_USER_ID).contains(&id) {
      self.0.push(format!("{field}: user id must be between 1 and {MAX_USER_ID}"));
    }
  }

  /// Parse `raw` as an expiry timestamp, recording a message on failure.
  pub fn expiry(&mut self, field: &str, raw: &str) -> Option<DateTime<Utc>> {
    match parse_expiry(raw) {
      Some(at) => Some(at),
      None => {
        self
          .0
          .push(format!("{field}: expected format YYYY-MM-DDTHH:MM:SSZ, got {raw:?}"));
        None
      }
    }
  }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// `Ok(())` when nothing was recorded, otherwise a 422 carrying every message.
  pub fn into_result(self) -> Result<(), ApiError> {
    if self.0.is_empty() { Ok(()) } else { Err(ApiError::Validation(self.0)) }
  }
}

fn is_slug_charset(slug: &str) -> bool {
  slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
  NaiveDateTime::parse_from_str(raw, EXPIRY_FORMAT)
    .ok()
    .map(|n| n.and_utc())
}

/// Parse an `{id}` path segment.
pub fn path_user_id(raw: &str) -> Result<UserId, ApiError> {
  let id: i64 = raw
    .parse()
    .map_err(|_| ApiError::BadRequest(format!("unable to parse user id: {raw:?}")))?;
  if !(1..=MAX_USER_ID).contains(&id) {
    return Err(ApiError::BadRequest(format!(
      "user id must be between 1 and {MAX_USER_ID}, got {id}"
    )));
  }
  Ok(id)
}

/// Parse a required `YYYY-MM-DD` query parameter.
pub fn query_day(name: &str, raw: Option<&str>) -> Result<NaiveDate, ApiError> {
  let raw = raw
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ApiError::BadRequest(format!("{name} is required")))?;
  NaiveDate::parse_from_str(raw, DAY_FORMAT)
    .map_err(|e| ApiError::BadRequest(format!("unable to parse {name}: {e}")))
}

/// Host to use in links handed back to the client.
///
/// Falls back to `localhost` when the request carries no `Host`; anything
/// that is not a bare `host[:port]` authority is a 400.
pub fn link_host(headers: &HeaderMap) -> Result<String, ApiError> {
  let Some(raw) = headers.get(header::HOST) else {
    return Ok("localhost".to_string());
  };
  let host = raw
    .to_str()
    .map_err(|_| ApiError::BadRequest("invalid Host header".to_string()))?;
  match host.parse::<Authority>() {
    Ok(authority) if !host.contains('@') => Ok(authority.as_str().to_string()),
    _ => Err(ApiError::BadRequest(format!("invalid Host header: {host:?}"))),
  }
}
