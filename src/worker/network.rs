//! The worker's view of the network.

use color_eyre::{eyre::eyre, Result};
use reqwest::header::{HeaderMap, ACCESS_CONTROL_ALLOW_ORIGIN};
use std::future::Future;
use url::Url;

use crate::http::{Request, Response, ResponseType};

/// Performs a request for real.
///
/// Any `Err` is a network failure (offline, DNS, timeout). HTTP error statuses
/// are successful fetches and come back as `Ok`.
pub trait Network: Send + Sync + 'static {
  fn fetch(&self, request: &Request) -> impl Future<Output = Result<Response>> + Send;
}

/// Network access through reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
  client: reqwest::Client,
  origin: Url,
}

impl HttpNetwork {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("subway-worker/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }

  /// Classify a response the way a browser would expose it to the page.
  fn response_type(&self, final_url: &Url, headers: &HeaderMap) -> ResponseType {
    if final_url.origin() == self.origin.origin() {
      ResponseType::Basic
    } else if headers.contains_key(ACCESS_CONTROL_ALLOW_ORIGIN) {
      ResponseType::Cors
    } else {
      ResponseType::Opaque
    }
  }
}

impl Network for HttpNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let response = self
      .client
      .request(request.method.clone(), request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", request.url, e))?;

    let status = response.status();
    let response_type = self.response_type(response.url(), response.headers());
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

    let mut response = Response::new(status.as_u16(), body.to_vec()).with_type(response_type);
    response.headers = headers;
    Ok(response)
  }
}

/// Scripted network for tests: routes by URL, counts calls, fails anything
/// unrouted.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct FakeNetwork {
  routes: std::sync::Mutex<std::collections::HashMap<String, Response>>,
  calls: std::sync::Mutex<Vec<String>>,
  offline: std::sync::atomic::AtomicBool,
}

#[cfg(test)]
impl FakeNetwork {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn route(&self, url: &str, response: Response) {
    self
      .routes
      .lock()
      .unwrap()
      .insert(url.to_string(), response);
  }

  pub fn go_offline(&self) {
    self
      .offline
      .store(true, std::sync::atomic::Ordering::SeqCst);
  }

  pub fn calls_to(&self, url: &str) -> usize {
    self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
  }

  pub fn total_calls(&self) -> usize {
    self.calls.lock().unwrap().len()
  }
}

#[cfg(test)]
impl Network for FakeNetwork {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = request.url.to_string();
    self.calls.lock().unwrap().push(url.clone());

    if self.offline.load(std::sync::atomic::Ordering::SeqCst) {
      return Err(eyre!("Request to {} failed: offline", url));
    }

    self
      .routes
      .lock()
      .unwrap()
      .get(&url)
      .cloned()
      .ok_or_else(|| eyre!("Request to {} failed: no route", url))
  }
}
