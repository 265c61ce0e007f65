//! Worker policy over an injected cache store and network.
//!
//! - `install` precaches the manifest into the static generation, all or nothing
//! - `activate` deletes every generation this version does not own
//! - `handle_fetch` answers cache-first, fills the dynamic generation, and falls
//!   back to synthesized responses when the network fails
//! - `handle_message` serves the page's control channel

use color_eyre::{eyre::eyre, Result};
use futures::future::try_join_all;
use reqwest::Method;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use super::fallback;
use super::lifecycle::WorkerState;
use super::message::{ControlMessage, Reply};
use super::network::Network;
use super::notification::{self, ClientAction, Notification};
use super::rules;
use crate::cache::{CacheStore, GenerationNames, StoredResponse};
use crate::config::WorkerConfig;
use crate::http::{Destination, Request, Response};

/// Schemes owned by the browser itself; requests to them are never intercepted.
const INTERNAL_SCHEMES: &[&str] = &[
  "chrome-extension",
  "moz-extension",
  "safari-web-extension",
  "chrome",
  "about",
];

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
  /// Stored response from any generation
  Cache,
  /// Fresh from the network
  Network,
  /// Synthesized or shell response after a network failure
  Fallback,
  /// The worker stayed out of the way
  Passthrough,
}

impl ResponseSource {
  pub fn as_str(&self) -> &'static str {
    match self {
      ResponseSource::Cache => "cache",
      ResponseSource::Network => "network",
      ResponseSource::Fallback => "fallback",
      ResponseSource::Passthrough => "passthrough",
    }
  }
}

#[derive(Debug, Clone)]
pub struct Served {
  pub response: Response,
  pub source: ResponseSource,
}

impl Served {
  fn new(response: Response, source: ResponseSource) -> Self {
    Self { response, source }
  }
}

/// Result of offering a request to the worker.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
  /// Not intercepted; the caller goes to the network itself
  Passthrough,
  Served(Served),
}

/// Generations removed during activation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
  pub deleted: Vec<String>,
  pub failed: Vec<String>,
}

/// One worker instance, bound to a single version.
pub struct WorkerController<S: CacheStore, N: Network> {
  config: WorkerConfig,
  names: GenerationNames,
  precache: Vec<Url>,
  shell: Url,
  store: Arc<S>,
  network: Arc<N>,
  state: RwLock<WorkerState>,
  skip_waiting: AtomicBool,
  clients_claimed: AtomicBool,
  /// Detached dynamic-cache writes
  pending_writes: Mutex<JoinSet<()>>,
}

impl<S: CacheStore + 'static, N: Network> WorkerController<S, N> {
  pub fn new(config: WorkerConfig, store: Arc<S>, network: Arc<N>) -> Result<Self> {
    let precache = config
      .precache
      .iter()
      .map(|url| config.resolve(url))
      .collect::<Result<Vec<_>>>()?;
    let shell = config.resolve(&config.shell)?;

    Ok(Self {
      names: GenerationNames::new(&config.version),
      config,
      precache,
      shell,
      store,
      network,
      state: RwLock::new(WorkerState::Parsed),
      skip_waiting: AtomicBool::new(false),
      clients_claimed: AtomicBool::new(false),
      pending_writes: Mutex::new(JoinSet::new()),
    })
  }

  pub fn version(&self) -> &str {
    self.names.version()
  }

  pub fn state(&self) -> WorkerState {
    *self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) fn set_state(&self, state: WorkerState) {
    let mut current = self.state.write().unwrap_or_else(PoisonError::into_inner);
    let from = *current;
    if from != state {
      debug!(version = self.version(), %from, to = %state, "Worker state change");
      *current = state;
    }
  }

  /// Ask to be activated without waiting for old clients to close.
  pub fn skip_waiting(&self) {
    self.skip_waiting.store(true, Ordering::SeqCst);
  }

  pub fn skip_waiting_requested(&self) -> bool {
    self.skip_waiting.load(Ordering::SeqCst)
  }

  /// Whether this worker has taken control of already-open pages.
  pub fn clients_claimed(&self) -> bool {
    self.clients_claimed.load(Ordering::SeqCst)
  }

  // ==========================================================================
  // Lifecycle
  // ==========================================================================

  /// Precache every manifest URL into the static generation.
  ///
  /// All responses are fetched before anything is stored, so a failed install
  /// leaves no partial entries behind. A static generation that already holds
  /// the whole manifest is not fetched again.
  pub async fn install(&self) -> Result<()> {
    self.set_state(WorkerState::Installing);
    let static_name = self.names.static_name();
    info!(version = self.version(), "Installing");

    self.store.open(static_name)?;

    if self.is_precached()? {
      info!(cache = static_name, "Static cache already complete");
    } else {
      info!(
        cache = static_name,
        count = self.precache.len(),
        "Caching static files"
      );

      let entries = try_join_all(
        self
          .precache
          .iter()
          .map(|url| self.add_request(Request::get(url.clone()))),
      )
      .await
      .map_err(|e| eyre!("Installation failed: {}", e))?;

      for entry in entries {
        self.store.put(static_name, entry)?;
      }
    }

    self.set_state(WorkerState::Installed);
    info!(version = self.version(), "Installation complete");
    self.skip_waiting();
    Ok(())
  }

  /// Delete every generation not owned by this version, then claim clients.
  ///
  /// Deletions run as independent tasks; one failing does not stop the others
  /// or the activation.
  pub async fn activate(&self) -> Result<ActivationReport> {
    self.set_state(WorkerState::Activating);
    info!(version = self.version(), "Activating");

    let stale: Vec<String> = self
      .store
      .keys()?
      .into_iter()
      .filter(|name| !self.names.is_current(name))
      .collect();

    let mut deletions = JoinSet::new();
    for name in stale {
      let store = Arc::clone(&self.store);
      deletions.spawn_blocking(move || {
        let result = store.delete(&name);
        (name, result)
      });
    }

    let mut report = ActivationReport::default();
    while let Some(joined) = deletions.join_next().await {
      match joined {
        Ok((name, Ok(_))) => {
          info!(cache = %name, "Deleted old cache");
          report.deleted.push(name);
        }
        Ok((name, Err(e))) => {
          warn!(cache = %name, error = %e, "Failed to delete old cache");
          report.failed.push(name);
        }
        Err(e) => {
          error!(error = %e, "Cache deletion task failed");
        }
      }
    }
    report.deleted.sort();
    report.failed.sort();

    self.clients_claimed.store(true, Ordering::SeqCst);
    self.set_state(WorkerState::Activated);
    info!(version = self.version(), "Activation complete");

    Ok(report)
  }

  fn is_precached(&self) -> Result<bool> {
    let stored: HashSet<String> = self
      .store
      .entries(self.names.static_name())?
      .into_iter()
      .collect();

    Ok(
      self
        .precache
        .iter()
        .all(|url| stored.contains(&Request::get(url.clone()).cache_key())),
    )
  }

  /// Fetch a request for storage; anything but a 2xx is an error.
  async fn add_request(&self, request: Request) -> Result<StoredResponse> {
    let response = self.network.fetch(&request).await?;
    if !response.ok() {
      return Err(eyre!(
        "Request for {} returned status {}",
        request.url,
        response.status
      ));
    }
    Ok(StoredResponse::new(request.cache_key(), response))
  }

  // ==========================================================================
  // Fetch
  // ==========================================================================

  /// Offer a request to the worker.
  ///
  /// Internal browser schemes, non-GET methods, and any request arriving
  /// before activation are passed through untouched.
  pub async fn handle_fetch(&self, request: &Request) -> FetchOutcome {
    if INTERNAL_SCHEMES.contains(&request.url.scheme()) {
      return FetchOutcome::Passthrough;
    }

    if request.method != Method::GET {
      return FetchOutcome::Passthrough;
    }

    if !self.state().can_intercept_fetch() {
      debug!(url = %request.url, state = %self.state(), "Not active, passing through");
      return FetchOutcome::Passthrough;
    }

    FetchOutcome::Served(self.respond(request).await)
  }

  /// Cache-first: a stored response is served as is, without revalidation.
  async fn respond(&self, request: &Request) -> Served {
    let key = request.cache_key();

    match self.store.match_any(&key) {
      Ok(Some(hit)) => {
        debug!(url = %key, "Serving from cache");
        return Served::new(hit.response, ResponseSource::Cache);
      }
      Ok(None) => {}
      Err(e) => warn!(url = %key, error = %e, "Cache lookup failed"),
    }

    match self.network.fetch(request).await {
      Ok(response) => {
        if response.is_storable() && rules::is_cacheable(request.url.as_str(), &self.config.rules)
        {
          self.store_dynamic(StoredResponse::new(key, response.clone()));
        }
        Served::new(response, ResponseSource::Network)
      }
      Err(e) => {
        warn!(url = %key, error = %e, "Network request failed");
        Served::new(self.fallback(request), ResponseSource::Fallback)
      }
    }
  }

  /// Write into the dynamic generation without making the caller wait.
  ///
  /// A worker that is no longer active starts no new writes.
  fn store_dynamic(&self, entry: StoredResponse) {
    let store = Arc::clone(&self.store);
    let name = self.names.dynamic_name().to_string();

    let mut pending = self
      .pending_writes
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    // Reap writes that already finished
    while pending.try_join_next().is_some() {}

    if !self.state().can_intercept_fetch() {
      debug!(url = %entry.key, state = %self.state(), "Not active, skipping dynamic write");
      return;
    }

    pending.spawn_blocking(move || {
      let key = entry.key.clone();
      match store.put(&name, entry) {
        Ok(()) => info!(url = %key, "Cached dynamic resource"),
        Err(e) => warn!(url = %key, error = %e, "Failed to cache dynamic resource"),
      }
    });
  }

  /// Wait for every detached dynamic-cache write started so far.
  pub async fn settle(&self) {
    let mut pending = std::mem::take(
      &mut *self
        .pending_writes
        .lock()
        .unwrap_or_else(PoisonError::into_inner),
    );
    while pending.join_next().await.is_some() {}
  }

  /// Mark the worker redundant and wait for the writes it already started.
  /// Once this returns the worker touches its dynamic generation no more.
  pub(crate) async fn retire(&self) {
    self.set_state(WorkerState::Redundant);
    self.settle().await;
  }

  /// Offline ladder: shell for navigations, default dataset for the dataset,
  /// 503 for everything else.
  fn fallback(&self, request: &Request) -> Response {
    if request.destination == Destination::Document {
      match self.store.match_any(&Request::get(self.shell.clone()).cache_key()) {
        Ok(Some(shell)) => return shell.response,
        Ok(None) => warn!(shell = %self.shell, "Shell document is not cached"),
        Err(e) => warn!(shell = %self.shell, error = %e, "Shell lookup failed"),
      }
    }

    if request.url.as_str().contains(self.config.dataset_marker()) {
      match fallback::dataset_response() {
        Ok(response) => return response,
        Err(e) => error!(error = %e, "Failed to build offline dataset"),
      }
    }

    fallback::offline_response()
  }

  // ==========================================================================
  // Control channel
  // ==========================================================================

  /// Handle one control message. `None` means no reply is sent.
  pub async fn handle_message(&self, message: ControlMessage) -> Option<Reply> {
    match message {
      ControlMessage::SkipWaiting => {
        self.skip_waiting();
        None
      }
      ControlMessage::GetVersion => Some(Reply::Version {
        version: self.version().to_string(),
      }),
      ControlMessage::ClearCache => match self.store.delete(self.names.dynamic_name()) {
        Ok(existed) => {
          info!(cache = self.names.dynamic_name(), existed, "Cleared dynamic cache");
          Some(Reply::success())
        }
        Err(e) => {
          warn!(error = %e, "Failed to clear dynamic cache");
          Some(Reply::failure(e.to_string()))
        }
      },
      ControlMessage::CacheUrl { url: None } => {
        warn!("CACHE_URL message without payload.url");
        Some(Reply::failure("missing payload.url"))
      }
      ControlMessage::CacheUrl { url: Some(url) } => match self.cache_url(&url).await {
        Ok(()) => Some(Reply::success()),
        Err(e) => {
          warn!(url = %url, error = %e, "Failed to cache URL");
          Some(Reply::failure(e.to_string()))
        }
      },
    }
  }

  async fn cache_url(&self, url: &str) -> Result<()> {
    let url = self.config.resolve(url)?;
    let entry = self.add_request(Request::get(url)).await?;
    if !entry.response.is_storable() {
      return Err(eyre!(
        "Response for {} is not cacheable (status {}, type {})",
        entry.key,
        entry.response.status,
        entry.response.response_type.as_str()
      ));
    }
    info!(url = %entry.key, "Caching requested URL");
    self.store.put(self.names.dynamic_name(), entry)
  }

  // ==========================================================================
  // Notifications
  // ==========================================================================

  pub fn handle_push(&self, text: Option<&str>) -> Option<Notification> {
    let notification = notification::notification_for_push(text);
    if notification.is_none() {
      debug!("Push without data, nothing to show");
    }
    notification
  }

  pub fn handle_notification_click(&self, action: &str) -> Option<ClientAction> {
    debug!(action, "Notification clicked, closing");
    notification::action_for_click(action)
  }

  pub fn handle_sync(&self, tag: &str) {
    if tag == "background-sync" {
      info!(tag, "Background sync triggered");
    } else {
      debug!(tag, "Ignoring sync event");
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::http::ResponseType;
  use crate::worker::FakeNetwork;

  const ORIGIN: &str = "http://localhost:8080";
  const PRECACHE: &[&str] = &["/", "/src/index.html", "/src/js/app.js", "/data/subway-lines.json"];

  fn url(path: &str) -> String {
    format!("{}{}", ORIGIN, path)
  }

  fn parse(path: &str) -> Url {
    Url::parse(&url(path)).unwrap()
  }

  fn config(version: &str) -> WorkerConfig {
    WorkerConfig {
      version: version.to_string(),
      origin: ORIGIN.to_string(),
      precache: PRECACHE.iter().map(|s| s.to_string()).collect(),
      ..WorkerConfig::default()
    }
  }

  fn network() -> Arc<FakeNetwork> {
    let network = FakeNetwork::new();
    for path in PRECACHE {
      network.route(&url(path), Response::new(200, format!("body of {}", path)));
    }
    Arc::new(network)
  }

  fn worker(
    version: &str,
    store: &Arc<MemoryStore>,
    network: &Arc<FakeNetwork>,
  ) -> WorkerController<MemoryStore, FakeNetwork> {
    WorkerController::new(config(version), Arc::clone(store), Arc::clone(network)).unwrap()
  }

  async fn active_worker() -> (
    Arc<MemoryStore>,
    Arc<FakeNetwork>,
    WorkerController<MemoryStore, FakeNetwork>,
  ) {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    let worker = worker("v1", &store, &network);
    worker.install().await.unwrap();
    worker.activate().await.unwrap();
    (store, network, worker)
  }

  async fn served(worker: &WorkerController<MemoryStore, FakeNetwork>, request: Request) -> Served {
    match worker.handle_fetch(&request).await {
      FetchOutcome::Served(served) => served,
      FetchOutcome::Passthrough => panic!("expected {} to be intercepted", request.url),
    }
  }

  #[tokio::test]
  async fn test_precached_urls_served_without_network() {
    let (_store, network, worker) = active_worker().await;
    let calls = network.total_calls();

    for path in PRECACHE {
      let served = served(&worker, Request::get(parse(path))).await;
      assert_eq!(served.source, ResponseSource::Cache);
      assert_eq!(served.response.text(), format!("body of {}", path));
    }
    assert_eq!(network.total_calls(), calls);
  }

  #[tokio::test]
  async fn test_install_is_all_or_nothing() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    network.route(&url("/src/js/app.js"), Response::new(404, "not found"));

    let worker = worker("v1", &store, &network);
    assert!(worker.install().await.is_err());
    assert!(store.entries("v1-static").unwrap().is_empty());
    assert!(!worker.skip_waiting_requested());
    assert_eq!(worker.state(), WorkerState::Installing);
  }

  #[tokio::test]
  async fn test_install_fails_on_network_error() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    network.go_offline();

    let worker = worker("v1", &store, &network);
    assert!(worker.install().await.is_err());
    assert!(store.entries("v1-static").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_install_requests_skip_waiting() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    let worker = worker("v1", &store, &network);

    worker.install().await.unwrap();
    assert!(worker.skip_waiting_requested());
    assert_eq!(worker.state(), WorkerState::Installed);
  }

  #[tokio::test]
  async fn test_reinstall_of_complete_version_skips_network() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    worker("v1", &store, &network).install().await.unwrap();
    let calls = network.total_calls();

    network.go_offline();
    worker("v1", &store, &network).install().await.unwrap();
    assert_eq!(network.total_calls(), calls);
  }

  #[tokio::test]
  async fn test_activate_deletes_only_stale_generations() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    let stale = StoredResponse::new(url("/old.js"), Response::new(200, "old"));
    store.put("v0-static", stale.clone()).unwrap();
    store.put("v0-dynamic", stale.clone()).unwrap();
    store.put("unrelated", stale).unwrap();
    store
      .put(
        "v1-dynamic",
        StoredResponse::new(url("/extra.js"), Response::new(200, "x")),
      )
      .unwrap();

    let worker = worker("v1", &store, &network);
    worker.install().await.unwrap();
    let report = worker.activate().await.unwrap();

    assert_eq!(report.deleted, vec!["unrelated", "v0-dynamic", "v0-static"]);
    assert!(report.failed.is_empty());
    let mut remaining = store.keys().unwrap();
    remaining.sort();
    assert_eq!(remaining, vec!["v1-dynamic", "v1-static"]);
    assert!(worker.clients_claimed());
    assert_eq!(worker.state(), WorkerState::Activated);
  }

  #[tokio::test]
  async fn test_dynamic_resource_cached_after_first_fetch() {
    let (store, network, worker) = active_worker().await;
    let path = "/src/js/station-phone.js";
    network.route(&url(path), Response::new(200, "console.log(1)"));

    let first = served(&worker, Request::get(parse(path))).await;
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(first.response.text(), "console.log(1)");
    worker.settle().await;

    let second = served(&worker, Request::get(parse(path))).await;
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response, first.response);
    assert_eq!(network.calls_to(&url(path)), 1);
    assert_eq!(store.entries("v1-dynamic").unwrap(), vec![url(path)]);
  }

  #[tokio::test]
  async fn test_error_status_never_cached() {
    let (store, network, worker) = active_worker().await;
    network.route(&url("/missing.js"), Response::new(404, "nope"));

    for _ in 0..2 {
      let served = served(&worker, Request::get(parse("/missing.js"))).await;
      assert_eq!(served.source, ResponseSource::Network);
      assert_eq!(served.response.status, 404);
    }
    worker.settle().await;

    assert_eq!(network.calls_to(&url("/missing.js")), 2);
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cross_origin_responses_never_cached() {
    let (store, network, worker) = active_worker().await;
    let lib = "https://cdn.example.com/lib.js";
    network.route(lib, Response::new(200, "lib").with_type(ResponseType::Opaque));
    let font = "https://fonts.gstatic.com/notosans.css";
    network.route(font, Response::new(200, "font").with_type(ResponseType::Cors));

    served(&worker, Request::get(Url::parse(lib).unwrap())).await;
    served(&worker, Request::get(Url::parse(font).unwrap())).await;
    worker.settle().await;

    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_unmatched_url_not_cached() {
    let (store, network, worker) = active_worker().await;
    network.route(&url("/api/lines"), Response::new(200, "[]"));

    let served = served(&worker, Request::get(parse("/api/lines"))).await;
    assert_eq!(served.response.text(), "[]");
    worker.settle().await;

    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_offline_navigation_serves_shell() {
    let (_store, network, worker) = active_worker().await;
    network.go_offline();

    let served = served(&worker, Request::navigate(parse("/stations/seoul"))).await;
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.status, 200);
    assert_eq!(served.response.text(), "body of /src/index.html");
  }

  #[tokio::test]
  async fn test_offline_dataset_serves_default_payload() {
    let (_store, network, worker) = active_worker().await;
    network.go_offline();

    let served = served(&worker, Request::get(parse("/data/subway-lines.json?v=2"))).await;
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.status, 200);
    assert_eq!(served.response.header("Content-Type"), Some("application/json"));

    let dataset: crate::dataset::Dataset = serde_json::from_slice(&served.response.body).unwrap();
    assert_eq!(dataset, crate::dataset::Dataset::offline_default());
  }

  #[tokio::test]
  async fn test_offline_other_request_gets_503() {
    let (_store, network, worker) = active_worker().await;
    network.go_offline();

    let served = served(&worker, Request::get(parse("/assets/icons/icon-192x192.png"))).await;
    assert_eq!(served.source, ResponseSource::Fallback);
    assert_eq!(served.response.status, 503);
    assert_eq!(served.response.status_text, "Service Unavailable");
    assert_eq!(served.response.text(), "오프라인 상태입니다.");
  }

  #[tokio::test]
  async fn test_offline_navigation_without_shell_gets_503() {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    let worker = WorkerController::new(
      WorkerConfig {
        precache: Vec::new(),
        ..config("v1")
      },
      Arc::clone(&store),
      Arc::clone(&network),
    )
    .unwrap();
    worker.install().await.unwrap();
    worker.activate().await.unwrap();

    let served = served(&worker, Request::navigate(parse("/"))).await;
    assert_eq!(served.response.status, 503);
  }

  #[tokio::test]
  async fn test_non_get_bypasses_cache() {
    let (store, network, worker) = active_worker().await;
    let calls = network.total_calls();

    let request = Request::get(parse("/src/js/app.js")).with_method(Method::POST);
    assert!(matches!(
      worker.handle_fetch(&request).await,
      FetchOutcome::Passthrough
    ));
    worker.settle().await;

    assert_eq!(network.total_calls(), calls);
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_internal_scheme_bypasses_worker() {
    let (_store, _network, worker) = active_worker().await;
    let request = Request::get(Url::parse("chrome-extension://abcdef/popup.js").unwrap());
    assert!(matches!(
      worker.handle_fetch(&request).await,
      FetchOutcome::Passthrough
    ));
  }

  #[tokio::test]
  async fn test_inactive_worker_does_not_intercept() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    let worker = worker("v1", &store, &network);
    worker.install().await.unwrap();

    let request = Request::get(parse("/src/index.html"));
    assert!(matches!(
      worker.handle_fetch(&request).await,
      FetchOutcome::Passthrough
    ));
  }

  #[tokio::test]
  async fn test_get_version() {
    let (_store, _network, worker) = active_worker().await;
    assert_eq!(
      worker.handle_message(ControlMessage::GetVersion).await,
      Some(Reply::Version {
        version: "v1".to_string()
      })
    );
  }

  #[tokio::test]
  async fn test_clear_cache_keeps_static() {
    let (store, network, worker) = active_worker().await;
    network.route(&url("/src/css/extra.css"), Response::new(200, "body{}"));
    served(&worker, Request::get(parse("/src/css/extra.css"))).await;
    worker.settle().await;
    assert_eq!(store.entries("v1-dynamic").unwrap().len(), 1);

    let reply = worker.handle_message(ControlMessage::ClearCache).await;
    assert_eq!(reply, Some(Reply::success()));
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
    assert_eq!(store.entries("v1-static").unwrap().len(), PRECACHE.len());
  }

  #[tokio::test]
  async fn test_cache_url() {
    let (store, network, worker) = active_worker().await;
    network.route(&url("/src/js/sms.js"), Response::new(200, "sms"));

    let reply = worker
      .handle_message(ControlMessage::CacheUrl {
        url: Some("/src/js/sms.js".to_string()),
      })
      .await;
    assert_eq!(reply, Some(Reply::success()));
    assert_eq!(store.entries("v1-dynamic").unwrap(), vec![url("/src/js/sms.js")]);
  }

  #[tokio::test]
  async fn test_cache_url_failures_reply() {
    let (store, _network, worker) = active_worker().await;

    let missing = worker
      .handle_message(ControlMessage::CacheUrl { url: None })
      .await;
    assert_eq!(missing, Some(Reply::failure("missing payload.url")));

    let unreachable = worker
      .handle_message(ControlMessage::CacheUrl {
        url: Some("/nowhere.js".to_string()),
      })
      .await;
    assert!(matches!(
      unreachable,
      Some(Reply::Outcome { success: false, .. })
    ));
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_cache_url_rejects_unstorable_responses() {
    let (store, network, worker) = active_worker().await;
    let lib = "https://cdn.example.com/lib.js";
    network.route(lib, Response::new(200, "lib").with_type(ResponseType::Opaque));
    network.route(&url("/empty.json"), Response::new(204, ""));

    for target in [lib.to_string(), "/empty.json".to_string()] {
      let reply = worker
        .handle_message(ControlMessage::CacheUrl { url: Some(target) })
        .await;
      assert!(matches!(
        reply,
        Some(Reply::Outcome {
          success: false,
          error: Some(_)
        })
      ));
    }
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_retired_worker_starts_no_dynamic_writes() {
    let (store, _network, worker) = active_worker().await;

    worker.retire().await;
    assert_eq!(worker.state(), WorkerState::Redundant);

    worker.store_dynamic(StoredResponse::new(url("/src/js/sms.js"), Response::new(200, "sms")));
    worker.settle().await;
    assert!(store.entries("v1-dynamic").unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_skip_waiting_has_no_reply() {
    let store = Arc::new(MemoryStore::new());
    let network = network();
    let worker = worker("v1", &store, &network);

    assert_eq!(worker.handle_message(ControlMessage::SkipWaiting).await, None);
    assert!(worker.skip_waiting_requested());
  }
}
