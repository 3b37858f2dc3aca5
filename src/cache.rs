//! Grid storage engine
//!
//! A `Grid` owns a set of named caches. Each `NamedCache` stores JSON
//! documents keyed by string, runs filters and entry processors against
//! them in place, and publishes a change event for every mutation.

use crate::processor::{Filter, Processor, ProcessorError};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Default capacity of each cache's event channel
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Kind of change an event describes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    Inserted,
    Updated,
    Deleted,
}

/// Change to one entry of a named cache
#[derive(Clone, Debug, PartialEq)]
pub struct CacheEvent {
    pub kind: EventKind,
    pub key: String,
    pub old: Option<Value>,
    pub new: Option<Value>,
}

impl CacheEvent {
    fn written(key: String, old: Option<Value>, new: Value) -> Self {
        let kind = if old.is_some() {
            EventKind::Updated
        } else {
            EventKind::Inserted
        };
        Self {
            kind,
            key,
            old,
            new: Some(new),
        }
    }
}

/// One named cache
pub struct NamedCache {
    name: String,
    entries: DashMap<String, Value>,
    events: broadcast::Sender<CacheEvent>,
}

impl NamedCache {
    pub fn new(name: impl Into<String>, event_capacity: usize) -> Self {
        let (events, _) = broadcast::channel(event_capacity.max(1));
        Self {
            name: name.into(),
            entries: DashMap::new(),
            events,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Store a value, returning the one it replaced
    pub fn put(&self, key: String, value: Value) -> Option<Value> {
        let old = self.entries.insert(key.clone(), value.clone());
        self.publish(CacheEvent::written(key, old.clone(), value));
        old
    }

    /// Store every entry, returning how many were written
    pub fn put_all(&self, entries: impl IntoIterator<Item = (String, Value)>) -> usize {
        let mut count = 0;
        for (key, value) in entries {
            self.put(key, value);
            count += 1;
        }
        count
    }

    pub fn remove(&self, key: &str) -> Option<Value> {
        let (key, old) = self.entries.remove(key)?;
        self.publish(CacheEvent {
            kind: EventKind::Deleted,
            key,
            old: Some(old.clone()),
            new: None,
        });
        Some(old)
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the key set, sorted
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Apply a processor to one entry. Returns `Ok(None)` when the key is absent.
    pub fn invoke(&self, key: &str, processor: &Processor) -> Result<Option<Value>, ProcessorError> {
        let (result, event) = {
            let Some(mut entry) = self.entries.get_mut(key) else {
                return Ok(None);
            };
            let key = entry.key().clone();
            apply(&key, entry.value_mut(), processor)?
        };

        if let Some(event) = event {
            self.publish(event);
        }
        Ok(Some(result))
    }

    /// Apply a processor to every entry the filter selects.
    ///
    /// Entries are processed independently: a failing entry is left as it
    /// was and the remaining entries are still processed.
    pub fn invoke_all(
        &self,
        filter: &Filter,
        processor: &Processor,
    ) -> Vec<(String, Result<Value, ProcessorError>)> {
        let mut results = Vec::new();
        let mut events = Vec::new();

        for mut entry in self.entries.iter_mut() {
            if !filter.evaluate(entry.value()) {
                continue;
            }
            let key = entry.key().clone();
            match apply(&key, entry.value_mut(), processor) {
                Ok((result, event)) => {
                    events.extend(event);
                    results.push((key, Ok(result)));
                }
                Err(e) => {
                    tracing::warn!("Processor failed on {}/{}: {}", self.name, key, e);
                    results.push((key, Err(e)));
                }
            }
        }

        // shard locks are released before anyone is notified
        for event in events {
            self.publish(event);
        }

        tracing::debug!(
            "invoke_all on {} touched {} entries",
            self.name,
            results.len()
        );
        results
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    /// Live event subscriptions
    pub fn listener_count(&self) -> usize {
        self.events.receiver_count()
    }

    fn publish(&self, event: CacheEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Run a processor on a copy so failures leave the stored value intact
fn apply(
    key: &str,
    stored: &mut Value,
    processor: &Processor,
) -> Result<(Value, Option<CacheEvent>), ProcessorError> {
    if !processor.is_mutating() {
        let mut scratch = stored.clone();
        return Ok((processor.apply(&mut scratch)?, None));
    }

    let mut updated = stored.clone();
    let result = processor.apply(&mut updated)?;
    let old = std::mem::replace(stored, updated.clone());
    Ok((
        result,
        Some(CacheEvent::written(key.to_string(), Some(old), updated)),
    ))
}

/// Registry of named caches, created on first use
#[derive(Clone)]
pub struct Grid {
    caches: Arc<DashMap<String, Arc<NamedCache>>>,
    event_capacity: usize,
}

impl Grid {
    pub fn new(event_capacity: usize) -> Self {
        Self {
            caches: Arc::new(DashMap::new()),
            event_capacity,
        }
    }

    /// Get a cache by name, creating it if needed
    pub fn cache(&self, name: &str) -> Arc<NamedCache> {
        if let Some(cache) = self.caches.get(name) {
            return Arc::clone(cache.value());
        }
        let cache = self
            .caches
            .entry(name.to_string())
            .or_insert_with(|| {
                tracing::info!("Creating cache {}", name);
                Arc::new(NamedCache::new(name, self.event_capacity))
            });
        Arc::clone(cache.value())
    }

    pub fn cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|c| c.key().clone()).collect();
        names.sort();
        names
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
