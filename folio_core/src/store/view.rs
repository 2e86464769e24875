//! Admin inbox view that follows store changes.

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tracing::{debug, warn};

use super::message::{InboxStats, Message, MessageFilter};
use super::message_store::MessageStore;
use super::notify::StoreChange;
use super::{StoreResult, MESSAGES_SLOT};

pub struct InboxView {
    store: MessageStore,
    filter: MessageFilter,
    receiver: broadcast::Receiver<StoreChange>,
    messages: Vec<Message>,
    stats: InboxStats,
    version: u64,
}

impl InboxView {
    pub fn open(store: MessageStore, filter: MessageFilter) -> StoreResult<Self> {
        // Subscribe before the first read so no change slips between them.
        let receiver = store.subscribe();
        let mut view = Self {
            store,
            filter,
            receiver,
            messages: Vec::new(),
            stats: InboxStats::default(),
            version: 0,
        };
        view.reload()?;
        Ok(view)
    }

    pub fn reload(&mut self) -> StoreResult<()> {
        let snapshot = self.store.snapshot(self.filter)?;
        self.messages = snapshot.messages;
        self.stats = snapshot.stats;
        self.version = snapshot.version;
        debug!(
            "inbox view reloaded at version {} ({} shown)",
            self.version,
            self.messages.len()
        );
        Ok(())
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn stats(&self) -> InboxStats {
        self.stats
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn filter(&self) -> MessageFilter {
        self.filter
    }

    pub fn set_filter(&mut self, filter: MessageFilter) -> StoreResult<()> {
        self.filter = filter;
        self.reload()
    }

    /// Wait for the next change to the message slot and reload. Returns
    /// `false` once the store has gone away.
    pub async fn wait_for_change(&mut self) -> StoreResult<bool> {
        loop {
            match self.receiver.recv().await {
                Ok(change) if change.slot == MESSAGES_SLOT => {
                    self.reload()?;
                    return Ok(true);
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(missed)) => {
                    warn!("inbox view missed {} changes, reloading", missed);
                    self.reload()?;
                    return Ok(true);
                }
                Err(RecvError::Closed) => return Ok(false),
            }
        }
    }

    /// Drain pending notifications without waiting; reloads at most once.
    /// Returns how many message-slot changes were seen.
    pub fn poll_changes(&mut self) -> StoreResult<usize> {
        let mut seen = 0;
        let mut stale = false;

        loop {
            match self.receiver.try_recv() {
                Ok(change) => {
                    if change.slot == MESSAGES_SLOT {
                        seen += 1;
                    }
                }
                Err(TryRecvError::Lagged(missed)) => {
                    seen += missed as usize;
                    stale = true;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
            }
        }

        if seen > 0 || stale {
            self.reload()?;
        }
        Ok(seen)
    }
}
