//! "Wait until" handle for lifecycle events.

use std::future::Future;
use tokio::task::JoinSet;
use tracing::warn;

/// Background work registered while handling one event.
///
/// A handler may return before its side effects are done (a cache write, say).
/// The host keeps the event alive by awaiting [`Lifetime::settle`].
#[derive(Default)]
pub struct Lifetime {
  tasks: JoinSet<()>,
}

impl Lifetime {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `work` in the background and extend the event until it finishes.
  pub fn wait_until<F>(&mut self, work: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.tasks.spawn(work);
  }

  #[cfg(test)]
  pub fn pending(&self) -> usize {
    self.tasks.len()
  }

  /// Wait for every registered task to finish.
  pub async fn settle(mut self) {
    while let Some(result) = self.tasks.join_next().await {
      if let Err(e) = result {
        warn!(error = %e, "Background task did not complete");
      }
    }
  }
}
