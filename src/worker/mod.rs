//! Lifecycle event handling: one method per event the host delivers.

pub mod notify;
pub mod sync;

use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info};
use url::Url;

use crate::cache::{CacheGateway, CacheStorage, Intercepted};
use crate::config::Config;
use crate::lifetime::Lifetime;
use crate::net::{Fetcher, Request};
use notify::{Notification, NotificationDispatcher, NotificationSink};
use sync::{PendingQueue, ZoneSync};

/// Handler for the events a host runtime delivers.
///
/// The host keeps each event alive until the returned future resolves, and
/// for `fetch`, until the passed [`Lifetime`] has settled.
pub trait LifecycleHandler {
  fn install(&self) -> impl Future<Output = Result<()>> + Send;

  fn fetch(
    &self,
    request: &Request,
    lifetime: &mut Lifetime,
  ) -> impl Future<Output = Result<Intercepted>> + Send;

  fn activate(&self) -> impl Future<Output = Result<()>> + Send;

  /// Failures are logged, never returned.
  fn sync(&self, tag: &str) -> impl Future<Output = ()> + Send;

  fn push(&self, payload: Option<&str>) -> impl Future<Output = Result<Notification>> + Send;

  fn notification_click(&self, action: Option<&str>) -> impl Future<Output = Result<Url>> + Send;
}

/// Offline worker for the sprinkler web app.
pub struct ServiceWorker<S: CacheStorage, F: Fetcher> {
  gateway: CacheGateway<S, F>,
  assets: Vec<String>,
  sync_tag: String,
  zone_sync: ZoneSync<F>,
  notifications: NotificationDispatcher,
}

impl<S: CacheStorage + 'static, F: Fetcher> ServiceWorker<S, F> {
  pub fn new(
    config: &Config,
    storage: S,
    fetcher: F,
    queue: Box<dyn PendingQueue>,
    sink: Box<dyn NotificationSink>,
  ) -> Result<Self> {
    let origin = config.origin_url()?;
    let fetcher = Arc::new(fetcher);

    let gateway = CacheGateway::new(
      storage,
      Arc::clone(&fetcher),
      origin.clone(),
      config.cache.version.clone(),
    )
    .with_vary_headers(config.cache.vary_headers.clone());

    let zone_sync = ZoneSync::new(fetcher, origin.clone(), &config.sync.api_prefix, queue);
    let notifications = NotificationDispatcher::new(config.notifications.clone(), origin, sink);

    Ok(Self {
      gateway,
      assets: config.cache.assets.clone(),
      sync_tag: config.sync.tag.clone(),
      zone_sync,
      notifications,
    })
  }

  pub fn gateway(&self) -> &CacheGateway<S, F> {
    &self.gateway
  }
}

impl<S: CacheStorage + 'static, F: Fetcher> LifecycleHandler for ServiceWorker<S, F> {
  async fn install(&self) -> Result<()> {
    self.gateway.install(&self.assets).await
  }

  async fn fetch(&self, request: &Request, lifetime: &mut Lifetime) -> Result<Intercepted> {
    self.gateway.intercept(request, lifetime).await
  }

  async fn activate(&self) -> Result<()> {
    self.gateway.activate().await?;
    info!(version = %self.gateway.version(), "Activated");
    Ok(())
  }

  async fn sync(&self, tag: &str) {
    if tag != self.sync_tag {
      debug!(tag, "Ignoring sync for unknown tag");
      return;
    }

    if let Err(e) = self.zone_sync.replay().await {
      error!(error = %e, "Background sync failed");
    }
  }

  async fn push(&self, payload: Option<&str>) -> Result<Notification> {
    self.notifications.push(payload)
  }

  async fn notification_click(&self, action: Option<&str>) -> Result<Url> {
    self.notifications.click(action)
  }
}
