use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use crate::core::types::ScanResult;

struct CachedVerdict {
    result: ScanResult,
    stored_at: Instant,
}

/// TTL-bounded verdict cache keyed by the normalized URL.
///
/// Guarded by a single lock; expiry is enforced lazily on read and the
/// oldest entries are evicted once the capacity is reached. Only complete
/// results are stored, so a partial/timeout verdict is never replayed.
pub struct ScanCache {
    entries: Mutex<HashMap<String, CachedVerdict>>,
    ttl: Duration,
    capacity: usize,
}

impl ScanCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, key: &str) -> Option<ScanResult> {
        let mut entries = self.entries.lock().expect("cache poisoned");
        match entries.get(key) {
            Some(entry) if entry.stored_at.elapsed() < self.ttl => Some(entry.result.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn put(&self, key: &str, result: &ScanResult) {
        let mut entries = self.entries.lock().expect("cache poisoned");
        entries.retain(|_, entry| entry.stored_at.elapsed() < self.ttl);
        if entries.len() >= self.capacity {
            if let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, entry)| entry.stored_at)
                .map(|(k, _)| k.clone())
            {
                entries.remove(&oldest);
            }
        }
        entries.insert(
            key.to_string(),
            CachedVerdict {
                result: result.clone(),
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
