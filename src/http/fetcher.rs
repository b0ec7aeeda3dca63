//! Network access behind a trait so the pipeline can run against a fake.

use reqwest::Client;
use std::future::Future;
use url::Url;

use super::types::{Request, Response, ResponseType};
use crate::connectivity::Connectivity;
use crate::error::NetworkError;

/// Performs a network round trip for a request.
///
/// A rejected future means no response was produced at all (DNS, refused
/// connection, reset). HTTP error statuses are still `Ok` responses.
pub trait Fetcher: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

/// `reqwest`-backed fetcher that classifies responses against the app origin.
///
/// While connectivity reports offline every fetch is rejected without
/// touching the network.
#[derive(Clone)]
pub struct HttpFetcher {
  client: Client,
  origin: Url,
  connectivity: Connectivity,
}

impl HttpFetcher {
  pub fn new(origin: Url, connectivity: Connectivity) -> Result<Self, NetworkError> {
    let client = Client::builder()
      .user_agent(concat!("verso/", env!("CARGO_PKG_VERSION")))
      .build()?;

    Ok(Self {
      client,
      origin,
      connectivity,
    })
  }

  fn classify(&self, url: &Url) -> ResponseType {
    if url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

impl Fetcher for HttpFetcher {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response, NetworkError>> + Send {
    let builder = self
      .client
      .request(request.method.clone(), request.url.clone());
    let this = self.clone();

    async move {
      if !this.connectivity.is_online() {
        return Err(NetworkError::Offline);
      }
      let response = builder.send().await?;

      let status = response.status();
      let kind = this.classify(response.url());
      let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
          value
            .to_str()
            .ok()
            .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect();
      let body = response.bytes().await?.to_vec();

      Ok(Response {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        headers,
        body,
        kind,
      })
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_classify_by_origin() {
    let fetcher = HttpFetcher::new(
      Url::parse("http://localhost:3000/").unwrap(),
      Connectivity::default(),
    )
    .unwrap();

    let same = Url::parse("http://localhost:3000/poems.js").unwrap();
    let other_port = Url::parse("http://localhost:8080/poems.js").unwrap();
    let other_host = Url::parse("https://fonts.example.com/font.woff2").unwrap();

    assert_eq!(fetcher.classify(&same), ResponseType::Basic);
    assert_eq!(fetcher.classify(&other_port), ResponseType::Cors);
    assert_eq!(fetcher.classify(&other_host), ResponseType::Cors);
  }

  #[tokio::test]
  async fn test_offline_rejects_without_network() {
    let connectivity = Connectivity::new(false);
    let fetcher = HttpFetcher::new(Url::parse("http://localhost:3000/").unwrap(), connectivity).unwrap();

    let request = Request::get("http://localhost:3000/poems.js").unwrap();
    let err = fetcher.fetch(&request).await.unwrap_err();
    assert!(matches!(err, NetworkError::Offline));
  }
}
