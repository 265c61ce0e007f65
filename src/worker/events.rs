//! Event loop feeding platform events to the active worker.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error};

use super::controller::Served;
use super::lifecycle::Registration;
use super::message::{ControlMessage, Reply};
use super::network::Network;
use super::notification::{ClientAction, Notification};
use crate::cache::CacheStore;
use crate::http::Request;

/// Events delivered to the worker
#[derive(Debug)]
pub enum WorkerEvent {
  /// Outgoing request from a page
  Fetch {
    request: Request,
    reply: oneshot::Sender<Result<Served>>,
  },
  /// Control message; `reply` is the channel the page attached, if any
  Message {
    data: Value,
    reply: Option<oneshot::Sender<Reply>>,
  },
  Push {
    text: Option<String>,
    reply: oneshot::Sender<Option<Notification>>,
  },
  NotificationClick {
    action: String,
    reply: oneshot::Sender<Option<ClientAction>>,
  },
  Sync {
    tag: String,
  },
}

/// Runs every event on its own task. Handler errors and panics are logged
/// and otherwise ignored; the loop keeps going.
pub struct EventLoop {
  tx: mpsc::UnboundedSender<WorkerEvent>,
  handle: JoinHandle<()>,
}

impl EventLoop {
  pub fn spawn<S, N>(registration: Arc<Registration<S, N>>) -> Self
  where
    S: CacheStore + 'static,
    N: Network,
  {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = tokio::spawn(run(registration, rx));
    Self { tx, handle }
  }

  /// Get a sender for events
  pub fn sender(&self) -> mpsc::UnboundedSender<WorkerEvent> {
    self.tx.clone()
  }

  /// Stop accepting events once every sender is gone, then wait for running
  /// handlers and pending cache writes.
  pub async fn shutdown(self) -> Result<()> {
    drop(self.tx);
    self
      .handle
      .await
      .map_err(|e| eyre!("Event loop failed: {}", e))
  }
}

async fn run<S, N>(
  registration: Arc<Registration<S, N>>,
  mut rx: mpsc::UnboundedReceiver<WorkerEvent>,
) where
  S: CacheStore + 'static,
  N: Network,
{
  let mut handlers: JoinSet<Result<()>> = JoinSet::new();

  loop {
    tokio::select! {
      event = rx.recv() => match event {
        Some(event) => {
          handlers.spawn(dispatch(Arc::clone(&registration), event));
        }
        None => break,
      },
      Some(joined) = handlers.join_next(), if !handlers.is_empty() => report(joined),
    }
  }

  while let Some(joined) = handlers.join_next().await {
    report(joined);
  }

  if let Some(worker) = registration.active() {
    worker.settle().await;
  }
}

fn report(joined: std::result::Result<Result<()>, JoinError>) {
  match joined {
    Ok(Ok(())) => {}
    Ok(Err(e)) => error!(error = %e, "Uncaught worker error"),
    Err(e) => error!(error = %e, "Worker handler panicked"),
  }
}

async fn dispatch<S, N>(registration: Arc<Registration<S, N>>, event: WorkerEvent) -> Result<()>
where
  S: CacheStore + 'static,
  N: Network,
{
  match event {
    WorkerEvent::Fetch { request, reply } => {
      let result = registration.fetch(&request).await;
      reply
        .send(result)
        .map_err(|_| eyre!("Requester for {} went away", request.url))
    }

    WorkerEvent::Message { data, reply } => {
      let Some(message) = ControlMessage::from_value(&data) else {
        debug!(%data, "Ignoring unrecognized message");
        return Ok(());
      };
      let Some(worker) = registration.active() else {
        debug!(?message, "No active worker, message dropped");
        return Ok(());
      };

      match (worker.handle_message(message).await, reply) {
        (Some(response), Some(reply)) => reply
          .send(response)
          .map_err(|_| eyre!("Reply channel closed before the reply was sent")),
        (Some(_), None) => Err(eyre!("Message expects a reply but no reply channel was attached")),
        (None, _) => Ok(()),
      }
    }

    WorkerEvent::Push { text, reply } => {
      let notification = registration
        .active()
        .and_then(|worker| worker.handle_push(text.as_deref()));
      let _ = reply.send(notification);
      Ok(())
    }

    WorkerEvent::NotificationClick { action, reply } => {
      let client_action = registration
        .active()
        .and_then(|worker| worker.handle_notification_click(&action));
      let _ = reply.send(client_action);
      Ok(())
    }

    WorkerEvent::Sync { tag } => {
      if let Some(worker) = registration.active() {
        worker.handle_sync(&tag);
      }
      Ok(())
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::MemoryStore;
  use crate::config::WorkerConfig;
  use crate::http::Response;
  use crate::worker::controller::ResponseSource;
  use crate::worker::{FakeNetwork, WorkerController};
  use serde_json::json;
  use url::Url;

  const SHELL: &str = "http://localhost:8080/src/index.html";

  async fn running() -> (Arc<MemoryStore>, Arc<FakeNetwork>, EventLoop) {
    let store = Arc::new(MemoryStore::new());
    let network = Arc::new(FakeNetwork::new());
    network.route(SHELL, Response::new(200, "<html>"));

    let registration = Arc::new(Registration::new(Arc::clone(&network)));
    let worker = WorkerController::new(
      WorkerConfig {
        version: "v1".to_string(),
        origin: "http://localhost:8080".to_string(),
        precache: vec!["/src/index.html".to_string()],
        ..WorkerConfig::default()
      },
      Arc::clone(&store),
      Arc::clone(&network),
    )
    .unwrap();
    registration.register(worker).await.unwrap();

    (store, network, EventLoop::spawn(registration))
  }

  async fn send_message(events: &EventLoop, data: Value) -> std::result::Result<Reply, oneshot::error::RecvError> {
    let (tx, rx) = oneshot::channel();
    events
      .sender()
      .send(WorkerEvent::Message {
        data,
        reply: Some(tx),
      })
      .unwrap();
    rx.await
  }

  #[tokio::test]
  async fn test_fetch_through_loop() {
    let (_store, _network, events) = running().await;

    let (tx, rx) = oneshot::channel();
    events
      .sender()
      .send(WorkerEvent::Fetch {
        request: Request::get(Url::parse(SHELL).unwrap()),
        reply: tx,
      })
      .unwrap();

    let served = rx.await.unwrap().unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
    assert_eq!(served.response.text(), "<html>");
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_get_version_over_reply_channel() {
    let (_store, _network, events) = running().await;

    let reply = send_message(&events, json!({ "type": "GET_VERSION" })).await.unwrap();
    assert_eq!(
      reply,
      Reply::Version {
        version: "v1".to_string()
      }
    );
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_unknown_message_gets_no_reply() {
    let (_store, _network, events) = running().await;

    // The reply sender is dropped unused, so the receiver sees a closed channel
    assert!(send_message(&events, json!({ "type": "SELF_DESTRUCT" })).await.is_err());
    assert!(send_message(&events, json!({ "type": "SKIP_WAITING" })).await.is_err());

    // Still serving afterwards
    assert!(send_message(&events, json!({ "type": "GET_VERSION" })).await.is_ok());
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_cache_url_without_url_replies_failure() {
    let (_store, _network, events) = running().await;

    let reply = send_message(&events, json!({ "type": "CACHE_URL", "payload": {} })).await.unwrap();
    assert_eq!(reply, Reply::failure("missing payload.url"));
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_closed_reply_channel_does_not_stop_loop() {
    let (store, _network, events) = running().await;

    let (tx, rx) = oneshot::channel();
    drop(rx);
    events
      .sender()
      .send(WorkerEvent::Message {
        data: json!({ "type": "CLEAR_CACHE" }),
        reply: Some(tx),
      })
      .unwrap();

    assert!(send_message(&events, json!({ "type": "GET_VERSION" })).await.is_ok());
    events.sender().send(WorkerEvent::Sync { tag: "background-sync".to_string() }).unwrap();
    assert_eq!(store.entries("v1-static").unwrap().len(), 1);
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_push_and_click() {
    let (_store, _network, events) = running().await;

    let (tx, rx) = oneshot::channel();
    events
      .sender()
      .send(WorkerEvent::Push {
        text: Some("1호선 지연".to_string()),
        reply: tx,
      })
      .unwrap();
    let notification = rx.await.unwrap().unwrap();
    assert_eq!(notification.body, "1호선 지연");

    let (tx, rx) = oneshot::channel();
    events
      .sender()
      .send(WorkerEvent::NotificationClick {
        action: "open".to_string(),
        reply: tx,
      })
      .unwrap();
    assert_eq!(
      rx.await.unwrap(),
      Some(ClientAction::OpenWindow("/".to_string()))
    );

    events
      .sender()
      .send(WorkerEvent::Sync {
        tag: "background-sync".to_string(),
      })
      .unwrap();
    events.shutdown().await.unwrap();
  }

  #[tokio::test]
  async fn test_shutdown_flushes_dynamic_writes() {
    let (store, network, events) = running().await;
    let script = "http://localhost:8080/src/js/app.js";
    network.route(script, Response::new(200, "app"));

    let (tx, rx) = oneshot::channel();
    events
      .sender()
      .send(WorkerEvent::Fetch {
        request: Request::get(Url::parse(script).unwrap()),
        reply: tx,
      })
      .unwrap();
    assert_eq!(rx.await.unwrap().unwrap().source, ResponseSource::Network);

    events.shutdown().await.unwrap();
    assert_eq!(store.entries("v1-dynamic").unwrap(), vec![script]);
  }
}
