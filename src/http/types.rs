//! Plain request and response snapshots.
//!
//! Responses are fully buffered so they can be cloned for the cache
//! write-back and persisted as-is.

use reqwest::Method;
use url::Url;

use crate::error::NetworkError;

/// What the requester intends to do with the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Destination {
  /// Top-level navigation.
  Document,
  Script,
  Style,
  Image,
  Manifest,
  #[default]
  Empty,
}

impl Destination {
  /// Guess the destination from the URL path's extension, the way a static
  /// file server picks a MIME type.
  pub fn infer(url: &Url) -> Self {
    let path = url.path();
    let extension = path
      .rsplit('/')
      .next()
      .and_then(|name| name.rsplit_once('.'))
      .map(|(_, ext)| ext.to_ascii_lowercase());

    match extension.as_deref() {
      None | Some("html") | Some("htm") => Destination::Document,
      Some("js") => Destination::Script,
      Some("css") => Destination::Style,
      Some("png" | "jpg" | "jpeg" | "gif" | "svg" | "ico") => Destination::Image,
      Some("webmanifest") => Destination::Manifest,
      Some("json") if path.ends_with("/manifest.json") => Destination::Manifest,
      Some(_) => Destination::Empty,
    }
  }
}

/// An outbound request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
  pub method: Method,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn new(method: Method, url: Url, destination: Destination) -> Self {
    Self {
      method,
      url,
      destination,
    }
  }

  /// GET for an absolute URL, with the destination inferred from its path.
  pub fn get(url: &str) -> Result<Self, NetworkError> {
    let url = parse_url(url)?;
    let destination = Destination::infer(&url);
    Ok(Self::new(Method::GET, url, destination))
  }

  /// GET for a path (or absolute URL) resolved against `origin`.
  pub fn resolve(origin: &Url, path: &str) -> Result<Self, NetworkError> {
    let url = origin.join(path).map_err(|source| NetworkError::InvalidUrl {
      url: path.to_string(),
      source,
    })?;
    let destination = Destination::infer(&url);
    Ok(Self::new(Method::GET, url, destination))
  }

  pub fn with_destination(mut self, destination: Destination) -> Self {
    self.destination = destination;
    self
  }

  pub fn is_http(&self) -> bool {
    matches!(self.url.scheme(), "http" | "https")
  }
}

fn parse_url(url: &str) -> Result<Url, NetworkError> {
  Url::parse(url).map_err(|source| NetworkError::InvalidUrl {
    url: url.to_string(),
    source,
  })
}

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseType {
  /// Same-origin response.
  Basic,
  /// Cross-origin response with readable body.
  Cors,
  /// Cross-origin response without a readable body.
  Opaque,
  /// Synthesized error response.
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

/// A buffered response snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
  pub status: u16,
  pub status_text: String,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseType,
}

impl Response {
  pub const OFFLINE_BODY: &'static str = "Offline content not available";

  /// Synthesized 503 returned when neither cache nor network can answer.
  pub fn offline() -> Self {
    Self {
      status: 503,
      status_text: "Service Unavailable".to_string(),
      headers: vec![("Content-Type".to_string(), "text/plain".to_string())],
      body: Self::OFFLINE_BODY.as_bytes().to_vec(),
      kind: ResponseType::Basic,
    }
  }

  /// Only successful same-origin responses may be replayed from cache.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseType::Basic
  }

  pub fn is_ok(&self) -> bool {
    (200..300).contains(&self.status)
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self
      .headers
      .iter()
      .find(|(key, _)| key.eq_ignore_ascii_case(name))
      .map(|(_, value)| value.as_str())
  }

  pub fn text(&self) -> String {
    String::from_utf8_lossy(&self.body).into_owned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_infer_destination() {
    let cases = [
      ("http://localhost:3000/", Destination::Document),
      ("http://localhost:3000/index.html", Destination::Document),
      ("http://localhost:3000/poems/1", Destination::Document),
      ("http://localhost:3000/main.css", Destination::Style),
      ("http://localhost:3000/logic.js", Destination::Script),
      ("http://localhost:3000/bgimg.png", Destination::Image),
      ("http://localhost:3000/manifest.json", Destination::Manifest),
      ("http://localhost:3000/data/poems.json", Destination::Empty),
    ];

    for (url, expected) in cases {
      let url = Url::parse(url).unwrap();
      assert_eq!(Destination::infer(&url), expected, "{}", url);
    }
  }

  #[test]
  fn test_resolve_against_origin() {
    let origin = Url::parse("http://localhost:3000").unwrap();
    let request = Request::resolve(&origin, "/main.css").unwrap();

    assert_eq!(request.url.as_str(), "http://localhost:3000/main.css");
    assert_eq!(request.method, Method::GET);
    assert_eq!(request.destination, Destination::Style);
  }

  #[test]
  fn test_non_http_scheme() {
    let request = Request::get("chrome-extension://abc/script.js").unwrap();
    assert!(!request.is_http());
    assert!(Request::get("https://example.com/").unwrap().is_http());
  }

  #[test]
  fn test_offline_response() {
    let response = Response::offline();
    assert_eq!(response.status, 503);
    assert_eq!(response.header("content-type"), Some("text/plain"));
    assert_eq!(response.text(), Response::OFFLINE_BODY);
    assert!(!response.is_cacheable());
  }

  #[test]
  fn test_cacheability() {
    let mut response = Response {
      status: 200,
      status_text: "OK".to_string(),
      headers: Vec::new(),
      body: b"body".to_vec(),
      kind: ResponseType::Basic,
    };
    assert!(response.is_cacheable());

    response.kind = ResponseType::Cors;
    assert!(!response.is_cacheable());

    response.kind = ResponseType::Basic;
    response.status = 404;
    assert!(!response.is_cacheable());
  }
}
