//! CLI commands driving the worker.

use clap::Subcommand;
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::cache::{CacheStore, GenerationNames};
use crate::config::Config;
use crate::http::{Destination, Request};
use crate::worker::{EventLoop, Network, Registration, Served, WorkerController, WorkerEvent};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Install and activate the configured version
  Install,
  /// Route one request through the worker
  Fetch {
    /// Absolute URL, or a path relative to the configured origin
    url: String,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Treat the request as a top-level navigation (always GET)
    #[arg(long)]
    document: bool,
  },
  /// Send a control message, e.g. '{"type":"GET_VERSION"}'
  Message { json: String },
  /// List cache generations and their entries
  Status,
  /// Show the notification a push message would produce
  Push { text: Option<String> },
  /// Handle a click on a notification action
  Click { action: String },
  /// Read JSON-lines events from stdin until EOF
  Run,
}

/// One line of input in `run` mode.
#[derive(Debug, Deserialize)]
struct InputLine {
  #[serde(default)]
  id: Option<Value>,
  #[serde(flatten)]
  event: InputEvent,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum InputEvent {
  Fetch {
    url: String,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    destination: Destination,
  },
  Message {
    data: Value,
  },
  Push {
    #[serde(default)]
    text: Option<String>,
  },
  Click {
    action: String,
  },
  Sync {
    tag: String,
  },
}

pub async fn execute<S, N>(
  command: Command,
  config: &Config,
  store: Arc<S>,
  network: Arc<N>,
) -> Result<()>
where
  S: CacheStore + 'static,
  N: Network,
{
  if let Command::Status = command {
    return print_status(store.as_ref(), &GenerationNames::new(&config.worker.version));
  }

  let registration = Arc::new(Registration::new(Arc::clone(&network)));
  let worker = WorkerController::new(config.worker.clone(), Arc::clone(&store), network)?;

  if let Err(e) = registration.register(worker).await {
    if let Command::Install = command {
      return Err(e);
    }
    warn!("No active worker, requests go straight to the network");
  }

  let events = EventLoop::spawn(Arc::clone(&registration));
  let sender = events.sender();

  let result = async {
    match command {
      Command::Install => {
        info!(version = %config.worker.version, "Installed");
        print_status(store.as_ref(), &GenerationNames::new(&config.worker.version))
      }
      Command::Fetch {
        url,
        method,
        document,
      } => {
        let request = if document {
          Request::navigate(config.worker.resolve(&url)?)
        } else {
          request_for(config, &url, Some(&method), Destination::Empty)?
        };
        let served = fetch(&sender, request).await?;
        println!(
          "{} {} ({})",
          served.response.status,
          served.response.status_text,
          served.source.as_str()
        );
        println!("{}", served.response.text());
        Ok(())
      }
      Command::Message { json } => {
        let data: Value =
          serde_json::from_str(&json).map_err(|e| eyre!("Invalid message JSON: {}", e))?;
        match message(&sender, data).await? {
          Some(reply) => println!("{}", reply),
          None => println!("(no reply)"),
        }
        Ok(())
      }
      Command::Push { text } => {
        let (tx, rx) = oneshot::channel();
        send(&sender, WorkerEvent::Push { text, reply: tx })?;
        let notification = rx.await.map_err(|_| eyre!("Worker dropped the push"))?;
        println!("{}", serde_json::to_string_pretty(&notification)?);
        Ok(())
      }
      Command::Click { action } => {
        let (tx, rx) = oneshot::channel();
        send(&sender, WorkerEvent::NotificationClick { action, reply: tx })?;
        let client_action = rx.await.map_err(|_| eyre!("Worker dropped the click"))?;
        println!("{}", serde_json::to_string(&client_action)?);
        Ok(())
      }
      Command::Run => run_stdin(config, &sender).await,
      Command::Status => print_status(store.as_ref(), &GenerationNames::new(&config.worker.version)),
    }
  }
  .await;

  drop(sender);
  events.shutdown().await?;
  result
}

fn print_status<S: CacheStore>(store: &S, names: &GenerationNames) -> Result<()> {
  println!("version: {}", names.version());
  for name in store.keys()? {
    let marker = if names.is_current(&name) { "" } else { " (stale)" };
    let entries = store.entries(&name)?;
    println!("{}{} [{} entries]", name, marker, entries.len());
    for key in entries {
      println!("  {}", key);
    }
  }
  Ok(())
}

fn request_for(
  config: &Config,
  url: &str,
  method: Option<&str>,
  destination: Destination,
) -> Result<Request> {
  let url = config.worker.resolve(url)?;
  let method = match method {
    Some(m) => Method::from_bytes(m.to_uppercase().as_bytes())
      .map_err(|e| eyre!("Invalid method '{}': {}", m, e))?,
    None => Method::GET,
  };

  Ok(Request::get(url).with_method(method).with_destination(destination))
}

fn send(sender: &mpsc::UnboundedSender<WorkerEvent>, event: WorkerEvent) -> Result<()> {
  sender
    .send(event)
    .map_err(|_| eyre!("Worker event loop is not running"))
}

async fn fetch(sender: &mpsc::UnboundedSender<WorkerEvent>, request: Request) -> Result<Served> {
  let (tx, rx) = oneshot::channel();
  send(sender, WorkerEvent::Fetch { request, reply: tx })?;
  rx.await.map_err(|_| eyre!("Worker dropped the request"))?
}

/// Send a control message; `None` when the worker did not reply.
async fn message(sender: &mpsc::UnboundedSender<WorkerEvent>, data: Value) -> Result<Option<Value>> {
  let (tx, rx) = oneshot::channel();
  send(
    sender,
    WorkerEvent::Message {
      data,
      reply: Some(tx),
    },
  )?;

  match rx.await {
    Ok(reply) => Ok(Some(serde_json::to_value(reply)?)),
    Err(_) => Ok(None),
  }
}

fn served_json(result: Result<Served>) -> Value {
  match result {
    Ok(served) => json!({
      "status": served.response.status,
      "statusText": served.response.status_text,
      "source": served.source.as_str(),
      "body": served.response.text(),
    }),
    Err(e) => json!({ "error": e.to_string() }),
  }
}

/// Feed stdin events to the worker; each result is printed as soon as it is
/// ready, so output order follows completion, not input.
async fn run_stdin(config: &Config, sender: &mpsc::UnboundedSender<WorkerEvent>) -> Result<()> {
  let mut lines = BufReader::new(tokio::io::stdin()).lines();
  let mut pending: JoinSet<()> = JoinSet::new();

  while let Some(line) = lines
    .next_line()
    .await
    .map_err(|e| eyre!("Failed to read stdin: {}", e))?
  {
    if line.trim().is_empty() {
      continue;
    }

    let input: InputLine = match serde_json::from_str(&line) {
      Ok(input) => input,
      Err(e) => {
        println!("{}", json!({ "error": format!("Invalid event: {}", e) }));
        continue;
      }
    };
    let id = input.id.unwrap_or(Value::Null);

    match input.event {
      InputEvent::Fetch {
        url,
        method,
        destination,
      } => {
        let request = match request_for(config, &url, method.as_deref(), destination) {
          Ok(request) => request,
          Err(e) => {
            println!("{}", json!({ "id": id, "error": e.to_string() }));
            continue;
          }
        };
        let sender = sender.clone();
        pending.spawn(async move {
          let mut output = served_json(fetch(&sender, request).await);
          output["id"] = id;
          println!("{}", output);
        });
      }
      InputEvent::Message { data } => {
        let sender = sender.clone();
        pending.spawn(async move {
          let output = match message(&sender, data).await {
            Ok(reply) => json!({ "id": id, "reply": reply }),
            Err(e) => json!({ "id": id, "error": e.to_string() }),
          };
          println!("{}", output);
        });
      }
      InputEvent::Push { text } => {
        let (tx, rx) = oneshot::channel();
        send(sender, WorkerEvent::Push { text, reply: tx })?;
        pending.spawn(async move {
          let notification = rx.await.ok().flatten();
          println!("{}", json!({ "id": id, "notification": notification }));
        });
      }
      InputEvent::Click { action } => {
        let (tx, rx) = oneshot::channel();
        send(sender, WorkerEvent::NotificationClick { action, reply: tx })?;
        pending.spawn(async move {
          let client_action = rx.await.ok().flatten();
          println!("{}", json!({ "id": id, "clientAction": client_action }));
        });
      }
      InputEvent::Sync { tag } => {
        send(sender, WorkerEvent::Sync { tag })?;
      }
    }
  }

  while pending.join_next().await.is_some() {}
  Ok(())
}
