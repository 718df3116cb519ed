//! Push notification rendering and click routing.

use color_eyre::{eyre::eyre, Result};
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::config::NotificationConfig;

/// Action id that opens the zones view.
pub const OPEN_ZONES: &str = "open-zones";
/// Action id that just closes the notification.
pub const DISMISS: &str = "dismiss";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

/// A system notification ready to be displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  /// Notifications with the same tag replace each other
  pub tag: String,
  pub require_interaction: bool,
  pub actions: Vec<NotificationAction>,
}

/// Where notifications and windows actually appear.
pub trait NotificationSink: Send + Sync {
  fn show(&self, notification: &Notification) -> Result<()>;

  fn close(&self, tag: &str) -> Result<()>;

  fn open_window(&self, url: &Url) -> Result<()>;
}

impl<T: NotificationSink + ?Sized> NotificationSink for Arc<T> {
  fn show(&self, notification: &Notification) -> Result<()> {
    (**self).show(notification)
  }

  fn close(&self, tag: &str) -> Result<()> {
    (**self).close(tag)
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    (**self).open_window(url)
  }
}

/// Sink that prints to stdout.
pub struct StdoutSink;

impl NotificationSink for StdoutSink {
  fn show(&self, notification: &Notification) -> Result<()> {
    let actions: Vec<&str> = notification
      .actions
      .iter()
      .map(|a| a.title.as_str())
      .collect();
    println!(
      "[{}] {}: {} ({})",
      notification.tag,
      notification.title,
      notification.body,
      actions.join(" | ")
    );
    Ok(())
  }

  fn close(&self, tag: &str) -> Result<()> {
    println!("[{}] closed", tag);
    Ok(())
  }

  fn open_window(&self, url: &Url) -> Result<()> {
    println!("open {}", url);
    Ok(())
  }
}

/// Turns push payloads into notifications and clicks into navigations.
pub struct NotificationDispatcher {
  config: NotificationConfig,
  origin: Url,
  sink: Box<dyn NotificationSink>,
}

impl NotificationDispatcher {
  pub fn new(config: NotificationConfig, origin: Url, sink: Box<dyn NotificationSink>) -> Self {
    Self {
      config,
      origin,
      sink,
    }
  }

  /// Build the notification for a push. A missing payload uses the default body.
  pub fn build(&self, payload: Option<&str>) -> Notification {
    Notification {
      title: self.config.title.clone(),
      body: payload
        .map(String::from)
        .unwrap_or_else(|| self.config.default_body.clone()),
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      tag: self.config.tag.clone(),
      require_interaction: self.config.require_interaction,
      actions: vec![
        NotificationAction {
          action: OPEN_ZONES.to_string(),
          title: self.config.open_zones_title.clone(),
        },
        NotificationAction {
          action: DISMISS.to_string(),
          title: self.config.dismiss_title.clone(),
        },
      ],
    }
  }

  pub fn push(&self, payload: Option<&str>) -> Result<Notification> {
    let notification = self.build(payload);
    self.sink.show(&notification)?;
    info!(tag = %notification.tag, body = %notification.body, "Displayed notification");
    Ok(notification)
  }

  /// URL opened for a clicked action. Anything but "open-zones" goes to the root.
  pub fn click_target(&self, action: Option<&str>) -> Result<Url> {
    let path = match action {
      Some(OPEN_ZONES) => &self.config.zones_url,
      _ => &self.config.root_url,
    };

    self
      .origin
      .join(path)
      .map_err(|e| eyre!("Invalid notification target '{}': {}", path, e))
  }

  /// Close the notification and open a window for the chosen action.
  pub fn click(&self, action: Option<&str>) -> Result<Url> {
    self.sink.close(&self.config.tag)?;

    let target = self.click_target(action)?;
    self.sink.open_window(&target)?;
    info!(action = ?action, url = %target, "Handled notification click");
    Ok(target)
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use std::sync::Mutex;

  /// Sink that records every call.
  #[derive(Default)]
  pub(crate) struct RecordingSink {
    pub(crate) shown: Mutex<Vec<Notification>>,
    pub(crate) closed: Mutex<Vec<String>>,
    pub(crate) opened: Mutex<Vec<String>>,
  }

  impl NotificationSink for RecordingSink {
    fn show(&self, notification: &Notification) -> Result<()> {
      self.shown.lock().unwrap().push(notification.clone());
      Ok(())
    }

    fn close(&self, tag: &str) -> Result<()> {
      self.closed.lock().unwrap().push(tag.to_string());
      Ok(())
    }

    fn open_window(&self, url: &Url) -> Result<()> {
      self.opened.lock().unwrap().push(url.to_string());
      Ok(())
    }
  }

  fn dispatcher() -> (NotificationDispatcher, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let dispatcher = NotificationDispatcher::new(
      NotificationConfig::default(),
      Url::parse("http://sprinkler.local").unwrap(),
      Box::new(Arc::clone(&sink)),
    );
    (dispatcher, sink)
  }

  #[test]
  fn test_push_without_payload_uses_default_body() {
    let (dispatcher, sink) = dispatcher();
    let notification = dispatcher.push(None).unwrap();

    assert_eq!(notification.title, "System Nawadniania");
    assert_eq!(notification.body, "Sprawdź status nawadniania");
    assert_eq!(notification.tag, "sprinkler-notification");
    assert_eq!(notification.icon, "/manifest-icon-192.png");
    assert_eq!(notification.badge, "/manifest-icon-96.png");
    assert!(notification.require_interaction);
    assert_eq!(sink.shown.lock().unwrap().len(), 1);
  }

  #[test]
  fn test_push_payload_becomes_body() {
    let (dispatcher, sink) = dispatcher();
    dispatcher.push(Some("Strefa 2 zakończyła podlewanie")).unwrap();

    let shown = sink.shown.lock().unwrap();
    assert_eq!(shown[0].body, "Strefa 2 zakończyła podlewanie");
  }

  #[test]
  fn test_notification_has_two_actions() {
    let (dispatcher, _) = dispatcher();
    let actions: Vec<String> = dispatcher
      .build(None)
      .actions
      .into_iter()
      .map(|a| a.action)
      .collect();
    assert_eq!(actions, vec![OPEN_ZONES, DISMISS]);
  }

  #[test]
  fn test_open_zones_click_opens_zones_view() {
    let (dispatcher, sink) = dispatcher();
    let target = dispatcher.click(Some(OPEN_ZONES)).unwrap();

    assert_eq!(target.as_str(), "http://sprinkler.local/?section=zones");
    assert_eq!(*sink.closed.lock().unwrap(), vec!["sprinkler-notification"]);
    assert_eq!(
      *sink.opened.lock().unwrap(),
      vec!["http://sprinkler.local/?section=zones"]
    );
  }

  #[test]
  fn test_other_clicks_open_root() {
    let (dispatcher, _) = dispatcher();
    for action in [Some(DISMISS), Some("unknown"), None] {
      let target = dispatcher.click_target(action).unwrap();
      assert_eq!(target.as_str(), "http://sprinkler.local/");
    }
  }
}
