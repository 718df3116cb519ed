use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::types::{Request, Response, ResponseType};
use super::Fetcher;
use crate::config::Config;

/// HTTP fetcher backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(config: &Config) -> Result<Self> {
    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.http.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self::with_client(client, config.origin_url()?))
  }

  pub fn with_client(client: reqwest::Client, origin: Url) -> Self {
    Self { client, origin }
  }

  /// Same-origin responses are basic, everything else is treated as CORS.
  fn classify(&self, final_url: &Url) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else {
      ResponseType::Cors
    }
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid method {}: {}", request.method, e))?;

    let mut builder = self.client.request(method, request.url.clone());
    for (name, value) in &request.headers {
      builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = &request.body {
      builder = builder.body(body.clone());
    }

    let response = builder
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let kind = self.classify(response.url());
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

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?;

    debug!(url = %request.url, status, ?kind, "Fetched from network");

    let mut result = Response::new(status, kind).with_body(body.to_vec());
    result.headers = headers;
    Ok(result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use wiremock::matchers::{body_string, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn create_fetcher(mock_server: &MockServer) -> HttpFetcher {
    let origin = Url::parse(&mock_server.uri()).unwrap();
    HttpFetcher::with_client(reqwest::Client::new(), origin)
  }

  #[tokio::test]
  async fn test_same_origin_response_is_basic() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/app.js"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_string("console.log('zones')")
          .insert_header("content-type", "application/javascript"),
      )
      .mount(&mock_server)
      .await;

    let fetcher = create_fetcher(&mock_server);
    let url = Url::parse(&format!("{}/app.js", mock_server.uri())).unwrap();
    let response = fetcher.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.kind, ResponseType::Basic);
    assert_eq!(response.text(), "console.log('zones')");
    assert!(response
      .headers
      .iter()
      .any(|(n, v)| n == "content-type" && v == "application/javascript"));
  }

  #[tokio::test]
  async fn test_error_status_is_a_response() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
      .and(path("/missing"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&mock_server)
      .await;

    let fetcher = create_fetcher(&mock_server);
    let url = Url::parse(&format!("{}/missing", mock_server.uri())).unwrap();
    let response = fetcher.fetch(&Request::get(url)).await.unwrap();

    assert_eq!(response.status, 404);
    assert!(!response.is_cacheable());
  }

  #[tokio::test]
  async fn test_method_headers_and_body_are_forwarded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
      .and(path("/api/zones/1"))
      .and(header("content-type", "application/json"))
      .and(body_string("{\"on\":true}"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&mock_server)
      .await;

    let fetcher = create_fetcher(&mock_server);
    let url = Url::parse(&format!("{}/api/zones/1", mock_server.uri())).unwrap();
    let request = Request::get(url)
      .with_method("POST")
      .with_header("Content-Type", "application/json")
      .with_body(b"{\"on\":true}".to_vec());

    let response = fetcher.fetch(&request).await.unwrap();
    assert_eq!(response.status, 204);
  }

  #[tokio::test]
  async fn test_unreachable_host_is_an_error() {
    let origin = Url::parse("http://127.0.0.1:1").unwrap();
    let fetcher = HttpFetcher::with_client(reqwest::Client::new(), origin.clone());

    let result = fetcher.fetch(&Request::get(origin)).await;
    assert!(result.is_err());
  }

  #[test]
  fn test_cross_origin_is_cors() {
    let origin = Url::parse("http://sprinkler.local").unwrap();
    let fetcher = HttpFetcher::with_client(reqwest::Client::new(), origin);

    let same = Url::parse("http://sprinkler.local/app.js").unwrap();
    let other = Url::parse("https://cdn.example.com/lib.js").unwrap();
    assert_eq!(fetcher.classify(&same), ResponseType::Basic);
    assert_eq!(fetcher.classify(&other), ResponseType::Cors);
  }
}
