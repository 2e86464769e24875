//! The contact inbox: one authoritative slot, a mirror, and an optional
//! fallback medium for when the primary one is full.

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use super::medium::{with_exclusive, StorageMedium};
use super::message::{sort_newest_first, InboxStats, Message, MessageFilter, MessageId};
use super::notify::{ChangeKind, ChangeNotifier, StoreChange};
use super::{StoreError, StoreResult, BACKUP_SLOT, LEGACY_CONTACT_SLOT, MESSAGES_SLOT};
use crate::validation::ContactSubmission;

pub const DEFAULT_MAX_MESSAGES: usize = 100;

#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Submissions beyond this many drop the oldest records.
    pub max_messages: usize,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
        }
    }
}

/// On-medium document. Older writers stored a bare array, read as version 0.
#[derive(Debug, Clone, Default)]
struct Envelope {
    version: u64,
    updated_at: Option<DateTime<Utc>>,
    messages: Vec<Message>,
    /// Records that did not parse, written back verbatim after `messages`.
    unreadable: Vec<Value>,
}

impl Envelope {
    fn is_empty(&self) -> bool {
        self.messages.is_empty() && self.unreadable.is_empty()
    }

    fn to_json(&self) -> StoreResult<String> {
        let mut items = Vec::with_capacity(self.messages.len() + self.unreadable.len());
        for message in &self.messages {
            items.push(serde_json::to_value(message)?);
        }
        items.extend(self.unreadable.iter().cloned());

        Ok(serde_json::to_string(&json!({
            "version": self.version,
            "updated_at": self.updated_at,
            "messages": items,
        }))?)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub skipped: usize,
}

/// Filtered list, statistics and version read from one load of the slot.
#[derive(Debug, Clone, Default)]
pub struct InboxSnapshot {
    pub messages: Vec<Message>,
    pub stats: InboxStats,
    pub version: u64,
}

struct Inner {
    primary: Arc<dyn StorageMedium>,
    fallback: Option<Arc<dyn StorageMedium>>,
    options: StoreOptions,
    notifier: ChangeNotifier,
}

/// Handle to the inbox. Clones share media and notifier. Writes from any
/// handle, cloned or separately opened, serialize on the primary medium's
/// exclusive lock.
#[derive(Clone)]
pub struct MessageStore {
    inner: Arc<Inner>,
}

impl MessageStore {
    /// Open the store and reconcile its slots. Safe to call repeatedly over
    /// the same media: once the primary slot exists nothing is rewritten.
    pub fn open(
        primary: Arc<dyn StorageMedium>,
        fallback: Option<Arc<dyn StorageMedium>>,
        options: StoreOptions,
    ) -> StoreResult<Self> {
        Self::open_with_notifier(primary, fallback, options, ChangeNotifier::new())
    }

    pub fn open_with_notifier(
        primary: Arc<dyn StorageMedium>,
        fallback: Option<Arc<dyn StorageMedium>>,
        options: StoreOptions,
        notifier: ChangeNotifier,
    ) -> StoreResult<Self> {
        let store = Self {
            inner: Arc::new(Inner {
                primary,
                fallback,
                options,
                notifier,
            }),
        };
        store.reconcile()?;
        Ok(store)
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.inner.notifier
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreChange> {
        self.inner.notifier.subscribe()
    }

    pub fn options(&self) -> &StoreOptions {
        &self.inner.options
    }

    fn media(&self) -> impl Iterator<Item = &Arc<dyn StorageMedium>> {
        std::iter::once(&self.inner.primary).chain(self.inner.fallback.iter())
    }

    fn exclusive<T>(&self, section: impl FnOnce() -> StoreResult<T>) -> StoreResult<T> {
        with_exclusive(self.inner.primary.as_ref(), section)
    }

    /// The primary slot wins when present; otherwise the backup seeds it.
    /// Records left in the legacy slot are merged in either case and the
    /// legacy slot is removed.
    fn reconcile(&self) -> StoreResult<()> {
        let recovered = self.exclusive(|| {
            let primary = self.load_primary()?;
            let primary_present = primary.is_some();
            let legacy = self.recover_from(LEGACY_CONTACT_SLOT)?;

            let mut sources = Vec::new();
            let mut env = match primary {
                Some(env) => env,
                None => match self.recover_from(BACKUP_SLOT)? {
                    Some(env) => {
                        sources.push(BACKUP_SLOT);
                        env
                    }
                    None => Envelope::default(),
                },
            };

            if let Some(legacy) = legacy {
                let merged = merge_missing(&mut env.messages, legacy.messages);
                env.unreadable.extend(legacy.unreadable);
                sort_newest_first(&mut env.messages);
                info!("merged {} messages from '{}'", merged, LEGACY_CONTACT_SLOT);
                sources.push(LEGACY_CONTACT_SLOT);
            }

            if sources.is_empty() {
                if primary_present {
                    debug!("message slot present, nothing to reconcile");
                } else {
                    match self.persist(&mut env) {
                        Ok(_) => debug!("initialised empty message slot"),
                        Err(e) => warn!("message slot not initialised: {}", e),
                    }
                }
                return Ok(None);
            }

            env.version += 1;
            let version = self.persist(&mut env)?;
            if sources.contains(&LEGACY_CONTACT_SLOT) {
                for medium in self.media() {
                    if let Err(e) = medium.remove(LEGACY_CONTACT_SLOT) {
                        warn!("could not remove legacy slot from {}: {}", medium.name(), e);
                    }
                }
            }
            info!(
                "reconciled {} messages from {:?}",
                env.messages.len(),
                sources
            );
            Ok(Some(version))
        })?;

        if let Some(version) = recovered {
            self.publish(version, ChangeKind::Recovered);
        }
        Ok(())
    }

    fn recover_from(&self, slot: &str) -> StoreResult<Option<Envelope>> {
        for medium in self.media() {
            if let Some(env) = read_envelope(medium.as_ref(), slot)? {
                if !env.is_empty() {
                    return Ok(Some(env));
                }
            }
        }
        Ok(None)
    }

    /// Highest-version copy of the message slot across media.
    fn load_primary(&self) -> StoreResult<Option<Envelope>> {
        let mut best: Option<Envelope> = None;
        for medium in self.media() {
            if let Some(env) = read_envelope(medium.as_ref(), MESSAGES_SLOT)? {
                if best.as_ref().map_or(true, |b| env.version > b.version) {
                    best = Some(env);
                }
            }
        }
        Ok(best)
    }

    fn load(&self) -> StoreResult<Envelope> {
        Ok(self.load_primary()?.unwrap_or_default())
    }

    /// Like [`load`](Self::load), but refuses to start from an empty list
    /// when the slot exists and cannot be read.
    fn load_for_write(&self) -> StoreResult<Envelope> {
        if let Some(env) = self.load_primary()? {
            return Ok(env);
        }
        for medium in self.media() {
            if medium.read(MESSAGES_SLOT)?.is_some() {
                return Err(StoreError::InvalidPayload(format!(
                    "message slot on {} is unreadable, refusing to overwrite it",
                    medium.name()
                )));
            }
        }
        Ok(Envelope::default())
    }

    /// Write the message slot and its mirror. Tries the fallback medium when
    /// the primary refuses; fails only when every medium does.
    fn persist(&self, env: &mut Envelope) -> StoreResult<u64> {
        env.updated_at = Some(Utc::now());
        let body = env.to_json()?;

        let mut last_error = None;
        for medium in self.media() {
            match medium.write(MESSAGES_SLOT, &body) {
                Ok(()) => {
                    if let Err(e) = medium.write(BACKUP_SLOT, &body) {
                        warn!("backup slot not written on {}: {}", medium.name(), e);
                    }
                    return Ok(env.version);
                }
                Err(e) => {
                    warn!("write to {} failed: {}", medium.name(), e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| StoreError::Storage("no storage medium configured".to_string())))
    }

    fn publish(&self, version: u64, kind: ChangeKind) {
        self.inner
            .notifier
            .publish(StoreChange::new(MESSAGES_SLOT, version, kind));
    }

    /// Read-modify-write under the primary medium's lock, so the version
    /// read is still current when the edit is written. `edit` returns `None`
    /// to leave the store untouched.
    fn mutate<T>(
        &self,
        kind: ChangeKind,
        edit: impl FnOnce(&mut Vec<Message>) -> StoreResult<Option<T>>,
    ) -> StoreResult<Option<T>> {
        let written = self.exclusive(|| {
            let mut env = self.load_for_write()?;
            let Some(outcome) = edit(&mut env.messages)? else {
                return Ok(None);
            };
            env.version += 1;
            let version = self.persist(&mut env)?;
            Ok(Some((outcome, version)))
        })?;

        Ok(written.map(|(outcome, version)| {
            self.publish(version, kind);
            outcome
        }))
    }

    pub fn submit(&self, submission: &ContactSubmission) -> StoreResult<Message> {
        let cleaned = submission.check()?;
        let message = Message {
            id: Some(MessageId::generate()),
            name: cleaned.name,
            email: cleaned.email,
            subject: cleaned
                .subject
                .unwrap_or_else(|| super::message::DEFAULT_SUBJECT.to_string()),
            message: cleaned.message,
            timestamp: Some(Utc::now()),
            read: false,
            page_url: cleaned.page_url,
        };

        self.prepend(message, ChangeKind::Submitted)
    }

    /// Insert the sample message offered by the admin inbox.
    pub fn add_test_message(&self) -> StoreResult<Message> {
        let message = Message {
            id: Some(MessageId::generate()),
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
            subject: "Test Message".to_string(),
            message: "This is a test message to verify the system is working.".to_string(),
            timestamp: Some(Utc::now()),
            read: false,
            page_url: None,
        };

        self.prepend(message, ChangeKind::Submitted)
    }

    fn prepend(&self, message: Message, kind: ChangeKind) -> StoreResult<Message> {
        let max = self.inner.options.max_messages;
        let stored = self.mutate(kind, |messages| {
            messages.insert(0, message.clone());
            messages.truncate(max);
            Ok(Some(message))
        })?;
        stored.ok_or_else(|| StoreError::Storage("message was not stored".to_string()))
    }

    /// Stored records in slot order.
    pub fn messages(&self) -> StoreResult<Vec<Message>> {
        Ok(self.load()?.messages)
    }

    pub fn version(&self) -> StoreResult<u64> {
        Ok(self.load()?.version)
    }

    pub fn list(&self, filter: MessageFilter) -> StoreResult<Vec<Message>> {
        self.list_at(filter, &Local::now())
    }

    pub fn list_at<Tz: TimeZone>(
        &self,
        filter: MessageFilter,
        now: &DateTime<Tz>,
    ) -> StoreResult<Vec<Message>> {
        Ok(self.snapshot_at(filter, now)?.messages)
    }

    pub fn snapshot(&self, filter: MessageFilter) -> StoreResult<InboxSnapshot> {
        self.snapshot_at(filter, &Local::now())
    }

    pub fn snapshot_at<Tz: TimeZone>(
        &self,
        filter: MessageFilter,
        now: &DateTime<Tz>,
    ) -> StoreResult<InboxSnapshot> {
        let env = self.load()?;
        let stats = InboxStats::compute(&env.messages, now);
        let mut messages: Vec<Message> = env
            .messages
            .into_iter()
            .filter(|m| filter.accepts(m, now))
            .collect();
        sort_newest_first(&mut messages);

        Ok(InboxSnapshot {
            messages,
            stats,
            version: env.version,
        })
    }

    pub fn stats(&self) -> StoreResult<InboxStats> {
        self.stats_at(&Local::now())
    }

    pub fn stats_at<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> StoreResult<InboxStats> {
        Ok(InboxStats::compute(&self.load()?.messages, now))
    }

    pub fn mark_read(&self, key: &str) -> StoreResult<bool> {
        self.set_read(key, true)
    }

    /// Set the read flag on the first record matching `key` (id or ISO
    /// timestamp). Returns whether a record matched.
    pub fn set_read(&self, key: &str, read: bool) -> StoreResult<bool> {
        let mut matched = false;
        self.mutate(ChangeKind::Updated, |messages| {
            let Some(record) = messages.iter_mut().find(|m| m.matches_key(key)) else {
                return Ok(None);
            };
            matched = true;
            if record.read == read {
                return Ok(None);
            }
            record.read = read;
            Ok(Some(()))
        })?;
        Ok(matched)
    }

    /// Returns how many records changed.
    pub fn mark_all_read(&self) -> StoreResult<usize> {
        let changed = self.mutate(ChangeKind::Updated, |messages| {
            let mut changed = 0;
            for record in messages.iter_mut().filter(|m| !m.read) {
                record.read = true;
                changed += 1;
            }
            Ok((changed > 0).then_some(changed))
        })?;
        Ok(changed.unwrap_or(0))
    }

    pub fn delete(&self, key: &str) -> StoreResult<bool> {
        let removed = self.mutate(ChangeKind::Deleted, |messages| {
            match messages.iter().position(|m| m.matches_key(key)) {
                Some(index) => {
                    messages.remove(index);
                    Ok(Some(()))
                }
                None => Ok(None),
            }
        })?;
        Ok(removed.is_some())
    }

    pub fn export(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(&self.load()?.messages)?)
    }

    pub fn export_filename(date: NaiveDate) -> String {
        format!("messages-{}.json", date.format("%Y-%m-%d"))
    }

    /// Merge a JSON list of records ahead of the stored ones, dropping
    /// duplicates by id, then timestamp, then full content. Stored records
    /// keep their place when an import repeats them.
    pub fn import(&self, payload: &str) -> StoreResult<ImportSummary> {
        let parsed: Value = serde_json::from_str(payload)
            .map_err(|e| StoreError::InvalidPayload(format!("Invalid file format: {}", e)))?;
        let Value::Array(items) = parsed else {
            return Err(StoreError::InvalidPayload(
                "Invalid file format: expected a list of messages".to_string(),
            ));
        };

        let mut summary = ImportSummary::default();
        let mut incoming = Vec::with_capacity(items.len());
        for item in items {
            match serde_json::from_value::<Message>(item) {
                Ok(message) => incoming.push(message),
                Err(e) => {
                    debug!("skipping unreadable record: {}", e);
                    summary.skipped += 1;
                }
            }
        }

        self.mutate(ChangeKind::Imported, |messages| {
            let mut seen: HashSet<String> = messages.iter().map(dedup_key).collect();
            let mut accepted = Vec::new();
            for message in incoming {
                if seen.insert(dedup_key(&message)) {
                    accepted.push(message);
                } else {
                    summary.skipped += 1;
                }
            }

            if accepted.is_empty() {
                return Ok(None);
            }
            summary.imported = accepted.len();
            accepted.append(messages);
            *messages = accepted;
            Ok(Some(()))
        })?;

        info!(
            "imported {} messages ({} skipped)",
            summary.imported, summary.skipped
        );
        Ok(summary)
    }
}

fn dedup_key(message: &Message) -> String {
    if let Some(id) = &message.id {
        return format!("id:{}", id);
    }
    if let Some(ts) = message.timestamp_string() {
        return format!("ts:{}", ts);
    }
    format!(
        "raw:{}",
        serde_json::to_string(message).unwrap_or_default()
    )
}

/// Append the records whose key is not present yet. Returns how many were
/// added.
fn merge_missing(messages: &mut Vec<Message>, incoming: Vec<Message>) -> usize {
    let mut seen: HashSet<String> = messages.iter().map(dedup_key).collect();
    let before = messages.len();
    for message in incoming {
        if seen.insert(dedup_key(&message)) {
            messages.push(message);
        }
    }
    messages.len() - before
}

fn read_envelope(medium: &dyn StorageMedium, slot: &str) -> StoreResult<Option<Envelope>> {
    let Some(raw) = medium.read(slot)? else {
        return Ok(None);
    };

    match parse_envelope(&raw) {
        Some(env) => Ok(Some(env)),
        None => {
            warn!("ignoring unreadable slot '{}' on {}", slot, medium.name());
            Ok(None)
        }
    }
}

fn parse_envelope(raw: &str) -> Option<Envelope> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let (version, updated_at, items) = match value {
        Value::Array(items) => (0, None, items),
        Value::Object(mut map) => {
            let version = map.get("version").and_then(Value::as_u64).unwrap_or(0);
            let updated_at = map
                .get("updated_at")
                .cloned()
                .and_then(|v| serde_json::from_value(v).ok());
            match map.remove("messages") {
                Some(Value::Array(items)) => (version, updated_at, items),
                _ => return None,
            }
        }
        _ => return None,
    };

    let mut messages = Vec::with_capacity(items.len());
    let mut unreadable = Vec::new();
    for item in items {
        match serde_json::from_value::<Message>(item.clone()) {
            Ok(message) => messages.push(message),
            Err(e) => {
                debug!("keeping unreadable record as-is: {}", e);
                unreadable.push(item);
            }
        }
    }
    if !unreadable.is_empty() {
        warn!("{} stored records could not be read and are kept untouched", unreadable.len());
    }

    Some(Envelope {
        version,
        updated_at,
        messages,
        unreadable,
    })
}
