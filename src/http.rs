//! Request and response model shared by the worker and the cache backends.

use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

/// What the requesting context intends to do with the response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
  /// Top-level navigation
  Document,
  Script,
  Style,
  Font,
  Image,
  Manifest,
  /// fetch()/XHR from a page
  #[default]
  Empty,
}

/// An outgoing request as seen by the worker.
#[derive(Debug, Clone)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  /// A plain `GET` with no particular destination.
  pub fn get(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Empty,
    }
  }

  /// A document navigation to `url`.
  pub fn navigate(url: Url) -> Self {
    Self {
      method: Method::GET,
      url,
      destination: Destination::Document,
    }
  }

  pub fn with_method(mut self, method: Method) -> Self {
    self.method = method;
    self
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  /// Key under which a response to this request is stored.
  ///
  /// Fragments never reach the network, so they are not part of the key.
  pub fn cache_key(&self) -> String {
    let mut url = self.url.clone();
    url.set_fragment(None);
    url.to_string()
  }
}

/// Visibility of a response to the page, mirroring the fetch response types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
  /// Same-origin response
  Basic,
  /// Cross-origin response the remote explicitly shared
  Cors,
  /// Cross-origin response the page cannot inspect
  Opaque,
  /// Network error placeholder
  Error,
}

impl ResponseType {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseType::Basic => "basic",
      ResponseType::Cors => "cors",
      ResponseType::Opaque => "opaque",
      ResponseType::Error => "error",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(ResponseType::Basic),
      "cors" => Some(ResponseType::Cors),
      "opaque" => Some(ResponseType::Opaque),
      "error" => Some(ResponseType::Error),
      _ => None,
    }
  }
}

/// A fully buffered response.
///
/// Bodies are owned bytes, so handing one copy to the caller and another to
/// the cache is an ordinary `clone()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub response_type: ResponseType,
}

impl Response {
  /// Same-origin response with the canonical status text for `status`.
  pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
    let status_text = StatusCode::from_u16(status)
      .ok()
      .and_then(|s| s.canonical_reason())
      .unwrap_or("")
      .to_string();

    Self {
      status,
      status_text,
      headers: Vec::new(),
      body: body.into(),
      response_type: ResponseType::Basic,
    }
  }

  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    self.headers.push((name.to_string(), value.to_string()));
    self
  }

  pub fn with_status_text(mut self, status_text: &str) -> Self {
    self.status_text = status_text.to_string();
    self
  }

  pub fn with_type(mut self, response_type: ResponseType) -> Self {
    self.response_type = response_type;
    self
  }

  /// 2xx status.
  pub fn ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  /// Whether a fetched response may be written to the dynamic generation:
  /// exactly 200 and same-origin.
  pub fn is_storable(&self) -> bool {
    self.status == 200 && self.response_type == ResponseType::Basic
  }

  /// Case-insensitive header lookup.
  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(n, _)| n.eq_ignore_ascii_case(name))
      .map(|(_, v)| v.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}
