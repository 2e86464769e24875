//! Storage media: where slots physically live.

use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::{StoreError, StoreResult};

const LOCK_FILE: &str = ".slots.lock";

/// A key-value area of named slots, each holding one serialized document.
pub trait StorageMedium: Send + Sync {
    fn name(&self) -> &str;

    fn read(&self, slot: &str) -> StoreResult<Option<String>>;

    fn write(&self, slot: &str, value: &str) -> StoreResult<()>;

    fn remove(&self, slot: &str) -> StoreResult<()>;

    /// Run `section` holding this medium's exclusive lock. Every handle over
    /// the same storage contends on it, whichever process or store opened it.
    fn exclusive(&self, section: &mut dyn FnMut() -> StoreResult<()>) -> StoreResult<()>;
}

/// Typed wrapper over [`StorageMedium::exclusive`].
pub fn with_exclusive<T>(
    medium: &dyn StorageMedium,
    section: impl FnOnce() -> StoreResult<T>,
) -> StoreResult<T> {
    let mut section = Some(section);
    let mut outcome = None;
    medium.exclusive(&mut || {
        if let Some(section) = section.take() {
            outcome = Some(section()?);
        }
        Ok(())
    })?;
    outcome.ok_or_else(|| StoreError::Storage(format!("lock section on {} did not run", medium.name())))
}

/// In-process medium. An optional quota (total bytes across slots) makes it
/// refuse writes the way a full browser storage area does.
#[derive(Clone, Default)]
pub struct MemoryMedium {
    name: String,
    slots: Arc<RwLock<HashMap<String, String>>>,
    section: Arc<Mutex<()>>,
    quota: Option<usize>,
}

impl MemoryMedium {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Arc::new(RwLock::new(HashMap::new())),
            section: Arc::new(Mutex::new(())),
            quota: None,
        }
    }

    pub fn with_quota(name: impl Into<String>, quota: usize) -> Self {
        Self {
            quota: Some(quota),
            ..Self::new(name)
        }
    }

    pub fn contains(&self, slot: &str) -> bool {
        self.slots.read().contains_key(slot)
    }
}

impl StorageMedium for MemoryMedium {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, slot: &str) -> StoreResult<Option<String>> {
        Ok(self.slots.read().get(slot).cloned())
    }

    fn write(&self, slot: &str, value: &str) -> StoreResult<()> {
        let mut slots = self.slots.write();

        if let Some(quota) = self.quota {
            let others: usize = slots
                .iter()
                .filter(|(key, _)| key.as_str() != slot)
                .map(|(_, v)| v.len())
                .sum();
            if others + value.len() > quota {
                return Err(StoreError::Storage(format!(
                    "quota exceeded on '{}' ({} bytes allowed)",
                    self.name, quota
                )));
            }
        }

        slots.insert(slot.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> StoreResult<()> {
        self.slots.write().remove(slot);
        Ok(())
    }

    fn exclusive(&self, section: &mut dyn FnMut() -> StoreResult<()>) -> StoreResult<()> {
        let _held = self.section.lock();
        section()
    }
}

/// One JSON file per slot inside a directory.
#[derive(Clone)]
pub struct FileMedium {
    name: String,
    dir: PathBuf,
}

impl FileMedium {
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_error(&dir, e))?;
        Ok(Self {
            name: format!("file:{}", dir.display()),
            dir,
        })
    }

    fn slot_path(&self, slot: &str) -> StoreResult<PathBuf> {
        let valid = !slot.is_empty()
            && slot
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::Storage(format!("invalid slot name '{}'", slot)));
        }
        Ok(self.dir.join(format!("{}.json", slot)))
    }
}

fn io_error(path: &Path, err: io::Error) -> StoreError {
    StoreError::Storage(format!("{}: {}", path.display(), err))
}

impl StorageMedium for FileMedium {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self, slot: &str) -> StoreResult<Option<String>> {
        let path = self.slot_path(slot)?;
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    fn write(&self, slot: &str, value: &str) -> StoreResult<()> {
        let path = self.slot_path(slot)?;
        let tmp = path.with_extension("json.tmp");

        let mut file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(value.as_bytes()).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_error(&path, e))?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> StoreResult<()> {
        let path = self.slot_path(slot)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_error(&path, e)),
        }
    }

    /// Advisory lock on a file next to the slots, so separate processes and
    /// separately opened handles serialize on the same directory.
    fn exclusive(&self, section: &mut dyn FnMut() -> StoreResult<()>) -> StoreResult<()> {
        let path = self.dir.join(LOCK_FILE);
        let lock = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| io_error(&path, e))?;
        lock.lock_exclusive().map_err(|e| io_error(&path, e))?;

        let outcome = section();
        if let Err(e) = FileExt::unlock(&lock) {
            tracing::warn!("could not release {}: {}", path.display(), e);
        }
        outcome
    }
}
