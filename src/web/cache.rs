use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Mutex;

/// Read-through cache for slow-changing upstream documents.
#[derive(Default)]
pub struct ResponseCache {
    /// Expiry per key; `None` when the TTL is beyond what `Instant` can hold.
    entries: Mutex<HashMap<String, (Option<Instant>, Value)>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some((expires, value)) if expires.map_or(true, |at| Instant::now() < at) => {
                Some(value.clone())
            }
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (Instant::now().checked_add(ttl), value));
    }
}
