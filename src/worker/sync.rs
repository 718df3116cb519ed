//! Deferred sync of zone operations queued while offline.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

use crate::net::{Fetcher, Request};

/// A mutating API call waiting for connectivity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingOperation {
  pub id: String,
  /// Path below the API prefix, e.g. "/zones/3/start"
  pub endpoint: String,
  pub method: String,
  pub data: serde_json::Value,
}

/// Source of queued operations.
///
/// This is an extension point: durability, idempotent replay and conflict
/// handling belong to the implementation, not to the replay loop.
pub trait PendingQueue: Send + Sync {
  fn pending(&self) -> Result<Vec<PendingOperation>>;

  fn remove(&self, id: &str) -> Result<()>;
}

/// Queue that never holds anything.
/// Used until a persistent queue exists - `pending` is always empty and `remove` discards.
pub struct NoopQueue;

impl PendingQueue for NoopQueue {
  fn pending(&self) -> Result<Vec<PendingOperation>> {
    Ok(Vec::new()) // Nothing queued
  }

  fn remove(&self, _id: &str) -> Result<()> {
    Ok(()) // Discard
  }
}

/// Replays pending operations against the API.
pub struct ZoneSync<F: Fetcher> {
  fetcher: Arc<F>,
  origin: Url,
  api_prefix: String,
  queue: Box<dyn PendingQueue>,
}

impl<F: Fetcher> ZoneSync<F> {
  pub fn new(fetcher: Arc<F>, origin: Url, api_prefix: &str, queue: Box<dyn PendingQueue>) -> Self {
    Self {
      fetcher,
      origin,
      api_prefix: api_prefix.trim_end_matches('/').to_string(),
      queue,
    }
  }

  fn request_for(&self, operation: &PendingOperation) -> Result<Request> {
    let path = format!("{}{}", self.api_prefix, operation.endpoint);
    let url = self
      .origin
      .join(&path)
      .map_err(|e| eyre!("Invalid endpoint '{}': {}", operation.endpoint, e))?;
    let body = serde_json::to_vec(&operation.data)
      .map_err(|e| eyre!("Failed to serialize operation {}: {}", operation.id, e))?;

    Ok(
      Request::get(url)
        .with_method(&operation.method)
        .with_header("Content-Type", "application/json")
        .with_body(body),
    )
  }

  /// Send every pending operation in order, removing each once its request completed.
  ///
  /// Stops at the first failure; operations not yet sent stay queued.
  /// Returns the number of operations replayed.
  pub async fn replay(&self) -> Result<usize> {
    let operations = self.queue.pending()?;
    if operations.is_empty() {
      debug!("No pending operations to sync");
      return Ok(0);
    }

    for operation in &operations {
      let request = self.request_for(operation)?;
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to replay operation {}: {}", operation.id, e))?;

      debug!(
        id = %operation.id,
        method = %request.method,
        url = %request.url,
        status = response.status,
        "Replayed operation"
      );

      self.queue.remove(&operation.id)?;
    }

    info!(count = operations.len(), "Synced pending operations");
    Ok(operations.len())
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::net::testing::FakeFetcher;
  use crate::net::{Response, ResponseType};
  use std::sync::Mutex;

  /// In-memory queue for exercising the replay loop.
  #[derive(Default)]
  pub(crate) struct VecQueue {
    pub(crate) operations: Arc<Mutex<Vec<PendingOperation>>>,
  }

  impl PendingQueue for VecQueue {
    fn pending(&self) -> Result<Vec<PendingOperation>> {
      Ok(self.operations.lock().unwrap().clone())
    }

    fn remove(&self, id: &str) -> Result<()> {
      self.operations.lock().unwrap().retain(|op| op.id != id);
      Ok(())
    }
  }

  pub(crate) fn operation(id: &str, zone: u32) -> PendingOperation {
    PendingOperation {
      id: id.to_string(),
      endpoint: format!("/zones/{}/start", zone),
      method: "post".to_string(),
      data: serde_json::json!({ "duration": 10 }),
    }
  }

  fn origin() -> Url {
    Url::parse("http://sprinkler.local").unwrap()
  }

  #[tokio::test]
  async fn test_noop_queue_replays_nothing() {
    let fetcher = Arc::new(FakeFetcher::new());
    let sync = ZoneSync::new(Arc::clone(&fetcher), origin(), "/api", Box::new(NoopQueue));

    assert_eq!(sync.replay().await.unwrap(), 0);
    assert_eq!(fetcher.calls(), 0);
  }

  #[tokio::test]
  async fn test_replay_sends_json_to_api_and_drains_queue() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.route(
      "http://sprinkler.local/api/zones/1/start",
      Response::new(200, ResponseType::Basic),
    );
    let queue = VecQueue::default();
    queue
      .operations
      .lock()
      .unwrap()
      .extend([operation("a", 1), operation("b", 2)]);
    let operations = Arc::clone(&queue.operations);

    let sync = ZoneSync::new(Arc::clone(&fetcher), origin(), "/api/", Box::new(queue));
    assert_eq!(sync.replay().await.unwrap(), 2);

    let requests = fetcher.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].url.as_str(), "http://sprinkler.local/api/zones/1/start");
    assert_eq!(requests[0].header("content-type"), Some("application/json"));
    assert_eq!(
      requests[0].body.as_deref(),
      Some(br#"{"duration":10}"#.as_slice())
    );
    assert_eq!(requests[1].url.path(), "/api/zones/2/start");
    assert!(operations.lock().unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_network_failure_keeps_operations_queued() {
    let fetcher = Arc::new(FakeFetcher::new());
    fetcher.set_offline(true);
    let queue = VecQueue::default();
    queue.operations.lock().unwrap().push(operation("a", 1));
    let operations = Arc::clone(&queue.operations);

    let sync = ZoneSync::new(Arc::clone(&fetcher), origin(), "/api", Box::new(queue));
    assert!(sync.replay().await.is_err());
    assert_eq!(operations.lock().unwrap().len(), 1);
  }
}
