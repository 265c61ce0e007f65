//! Synthesized responses for requests that failed on the network.

use color_eyre::{eyre::eyre, Result};

use crate::dataset::Dataset;
use crate::http::Response;

pub const OFFLINE_BODY: &str = "오프라인 상태입니다.";

/// The offline default dataset as a 200 JSON response.
pub fn dataset_response() -> Result<Response> {
  let body = serde_json::to_vec(&Dataset::offline_default())
    .map_err(|e| eyre!("Failed to serialize offline dataset: {}", e))?;

  Ok(Response::new(200, body).with_header("Content-Type", "application/json"))
}

/// Plain-text 503 served when nothing better is available.
pub fn offline_response() -> Response {
  Response::new(503, OFFLINE_BODY).with_status_text("Service Unavailable")
}
