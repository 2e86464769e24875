//! Change notifications fanned out to every open view.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Submitted,
    Updated,
    Deleted,
    Imported,
    Recovered,
    ProjectsChanged,
    SettingsChanged,
}

/// Published after a mutation has been persisted. Receivers re-read the slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreChange {
    pub slot: String,
    pub version: u64,
    pub kind: ChangeKind,
    pub at: DateTime<Utc>,
}

impl StoreChange {
    pub fn new(slot: &str, version: u64, kind: ChangeKind) -> Self {
        Self {
            slot: slot.to_string(),
            version,
            kind,
            at: Utc::now(),
        }
    }
}

#[derive(Clone)]
pub struct ChangeNotifier {
    sender: broadcast::Sender<StoreChange>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeNotifier {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, change: StoreChange) {
        // No subscribers is not an error; nobody is looking.
        if self.sender.send(change).is_err() {
            trace!("store change dropped, no subscribers");
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_sees_the_change() {
        let notifier = ChangeNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.publish(StoreChange::new("portfolio_messages", 3, ChangeKind::Submitted));

        assert_eq!(first.recv().await.unwrap().version, 3);
        assert_eq!(second.recv().await.unwrap().kind, ChangeKind::Submitted);
    }

    #[test]
    fn test_publish_without_subscribers() {
        let notifier = ChangeNotifier::new();
        notifier.publish(StoreChange::new("portfolio_messages", 1, ChangeKind::Deleted));
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[test]
    fn test_kind_wire_names() {
        let json = serde_json::to_string(&ChangeKind::ProjectsChanged).unwrap();
        assert_eq!(json, "\"projects_changed\"");
    }
}
