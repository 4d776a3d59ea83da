use crate::{StateStore, StoreError};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

struct StoredObject {
    data: Vec<u8>,
    modified: DateTime<Utc>,
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, StoredObject>,
    clock: Option<DateTime<Utc>>,
}

/// In-memory store for tests.
///
/// Modification timestamps are strictly increasing across writes, so two
/// writes to the same key never share a `last_modified`.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|e| StoreError::Backend(format!("mutex poisoned: {e}")))
    }

    /// All keys currently present, sorted.
    pub fn keys(&self) -> Vec<String> {
        let Ok(inner) = self.lock() else {
            return Vec::new();
        };
        let mut keys: Vec<String> = inner.objects.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Inner {
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let next = match self.clock {
            Some(prev) if now <= prev => prev + Duration::milliseconds(1),
            _ => now,
        };
        self.clock = Some(next);
        next
    }
}

impl StateStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn object_exists(&self, key: &str) -> Result<bool, StoreError> {
        Ok(self.lock()?.objects.contains_key(key))
    }

    fn last_modified(&self, key: &str) -> Result<DateTime<Utc>, StoreError> {
        self.lock()?
            .objects
            .get(key)
            .map(|o| o.modified)
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    fn delete_object(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.objects.remove(key);
        Ok(())
    }

    fn get_object(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        self.lock()?
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| StoreError::NotFound(key.to_owned()))
    }

    fn put_object(&self, key: &str, data: &[u8]) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let modified = inner.tick();
        inner.objects.insert(
            key.to_owned(),
            StoredObject {
                data: data.to_vec(),
                modified,
            },
        );
        Ok(())
    }
}
