//! Worker lifecycle states and the registration that owns the active worker.

use color_eyre::Result;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{error, info};

use super::controller::{FetchOutcome, ResponseSource, Served, WorkerController};
use super::network::Network;
use crate::cache::CacheStore;
use crate::http::Request;

/// Lifecycle of one worker instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
  /// Constructed, install not started
  Parsed,
  Installing,
  Installed,
  Activating,
  /// Serving fetches
  Activated,
  /// Failed to install or replaced by a newer worker
  Redundant,
}

impl WorkerState {
  pub fn can_intercept_fetch(&self) -> bool {
    matches!(self, WorkerState::Activated)
  }
}

impl fmt::Display for WorkerState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      WorkerState::Parsed => write!(f, "parsed"),
      WorkerState::Installing => write!(f, "installing"),
      WorkerState::Installed => write!(f, "installed"),
      WorkerState::Activating => write!(f, "activating"),
      WorkerState::Activated => write!(f, "activated"),
      WorkerState::Redundant => write!(f, "redundant"),
    }
  }
}

/// Holds the active worker for an origin and routes requests through it.
///
/// A worker that fails to install or activate is discarded and whatever was
/// active before keeps serving. Installed workers always ask to skip waiting,
/// so a successful install is activated immediately.
pub struct Registration<S: CacheStore, N: Network> {
  network: Arc<N>,
  active: RwLock<Option<Arc<WorkerController<S, N>>>>,
}

impl<S: CacheStore + 'static, N: Network> Registration<S, N> {
  pub fn new(network: Arc<N>) -> Self {
    Self {
      network,
      active: RwLock::new(None),
    }
  }

  pub fn active(&self) -> Option<Arc<WorkerController<S, N>>> {
    self
      .active
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .clone()
  }

  /// Install and activate a worker, replacing the current one on success.
  pub async fn register(
    &self,
    worker: WorkerController<S, N>,
  ) -> Result<Arc<WorkerController<S, N>>> {
    let worker = Arc::new(worker);

    if let Err(e) = worker.install().await {
      worker.set_state(WorkerState::Redundant);
      error!(version = worker.version(), error = %e, "Installation failed, worker discarded");
      return Err(e);
    }

    // The previous worker must finish its dynamic writes before activation
    // purges its generations, or a late write would bring one back.
    let previous = self.active();
    if let Some(previous) = &previous {
      previous.retire().await;
    }

    let report = match worker.activate().await {
      Ok(report) => report,
      Err(e) => {
        worker.set_state(WorkerState::Redundant);
        if let Some(previous) = &previous {
          previous.set_state(WorkerState::Activated);
        }
        error!(version = worker.version(), error = %e, "Activation failed, worker discarded");
        return Err(e);
      }
    };

    *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&worker));

    info!(
      version = worker.version(),
      skip_waiting = worker.skip_waiting_requested(),
      claimed = worker.clients_claimed(),
      deleted = report.deleted.len(),
      failed = report.failed.len(),
      "Worker is now active"
    );
    Ok(worker)
  }

  /// Route a request through the active worker, or straight to the network
  /// when there is none or it passes the request through.
  ///
  /// Only passed-through requests can fail; intercepted GETs always resolve.
  pub async fn fetch(&self, request: &Request) -> Result<Served> {
    if let Some(worker) = self.active() {
      if let FetchOutcome::Served(served) = worker.handle_fetch(request).await {
        return Ok(served);
      }
    }

    let response = self.network.fetch(request).await?;
    Ok(Served {
      response,
      source: ResponseSource::Passthrough,
    })
  }
}
