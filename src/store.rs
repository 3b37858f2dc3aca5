//! Cache store abstraction
//!
//! `CacheStore<V>` is the typed view of one named cache that the demo
//! workflows are written against. `LocalCache` serves it from an in-process
//! grid; `RemoteCache` (in `client`) serves it over gRPC.

use crate::cache::{CacheEvent, EventKind, NamedCache};
use crate::error::GridError;
use crate::processor::{Filter, Processor};
use async_trait::async_trait;
use futures::future;
use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Lazy, finite-or-not sequence of results from the grid
pub type ResultStream<T> = BoxStream<'static, Result<T, GridError>>;

/// Values that can be stored in a cache
pub trait CacheValue: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

/// Result of a processor for one selected entry
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeResult {
    pub key: String,
    pub value: Value,
}

/// Typed change event
#[derive(Clone, Debug, PartialEq)]
pub struct MapEvent<V> {
    pub kind: EventKind,
    pub key: String,
    pub old: Option<V>,
    pub new: Option<V>,
}

impl<V: DeserializeOwned> MapEvent<V> {
    pub(crate) fn decode(event: CacheEvent) -> Result<Self, GridError> {
        Ok(Self {
            kind: event.kind,
            key: event.key,
            old: event.old.map(serde_json::from_value).transpose()?,
            new: event.new.map(serde_json::from_value).transpose()?,
        })
    }
}

/// Operations on one named cache
#[async_trait]
pub trait CacheStore<V: CacheValue>: Send + Sync {
    /// Name of the underlying cache
    fn name(&self) -> &str;

    async fn get(&self, key: &str) -> Result<Option<V>, GridError>;

    /// Store a value, returning the one it replaced
    async fn put(&self, key: &str, value: &V) -> Result<Option<V>, GridError>;

    /// Bulk upsert in one round trip
    async fn put_all(&self, entries: &HashMap<String, V>) -> Result<(), GridError>;

    async fn size(&self) -> Result<usize, GridError>;

    /// Single pass over the current keys
    async fn key_set(&self) -> Result<ResultStream<String>, GridError>;

    /// Run a processor against every entry the filter selects.
    ///
    /// A processor failure on one entry arrives as `GridError::EntryFailed`
    /// in the stream; other entries are unaffected.
    async fn invoke_all(
        &self,
        filter: &Filter,
        processor: &Processor,
    ) -> Result<ResultStream<InvokeResult>, GridError>;

    /// Run a processor against one entry; `None` if the key is absent
    async fn invoke(&self, key: &str, processor: &Processor) -> Result<Option<Value>, GridError>;

    /// Subscribe to change events, all of them or only those of `kind`.
    /// Events of other kinds are dropped before their values are decoded.
    /// The stream ends when the cache goes away.
    async fn subscribe(&self, kind: Option<EventKind>)
        -> Result<ResultStream<MapEvent<V>>, GridError>;
}

/// `CacheStore` backed by a cache in this process
pub struct LocalCache<V> {
    cache: Arc<NamedCache>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> LocalCache<V> {
    pub fn new(cache: Arc<NamedCache>) -> Self {
        Self {
            cache,
            _marker: PhantomData,
        }
    }

}

impl<V> Clone for LocalCache<V> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.cache))
    }
}

#[async_trait]
impl<V: CacheValue> CacheStore<V> for LocalCache<V> {
    fn name(&self) -> &str {
        self.cache.name()
    }

    async fn get(&self, key: &str) -> Result<Option<V>, GridError> {
        Ok(self
            .cache
            .get(key)
            .map(serde_json::from_value)
            .transpose()?)
    }

    async fn put(&self, key: &str, value: &V) -> Result<Option<V>, GridError> {
        let old = self.cache.put(key.to_string(), serde_json::to_value(value)?);
        Ok(old.map(serde_json::from_value).transpose()?)
    }

    async fn put_all(&self, entries: &HashMap<String, V>) -> Result<(), GridError> {
        let encoded = entries
            .iter()
            .map(|(k, v)| -> Result<(String, Value), GridError> {
                Ok((k.clone(), serde_json::to_value(v)?))
            })
            .collect::<Result<Vec<_>, GridError>>()?;
        self.cache.put_all(encoded);
        Ok(())
    }

    async fn size(&self) -> Result<usize, GridError> {
        Ok(self.cache.size())
    }

    async fn key_set(&self) -> Result<ResultStream<String>, GridError> {
        Ok(stream::iter(self.cache.keys().into_iter().map(Ok)).boxed())
    }

    async fn invoke_all(
        &self,
        filter: &Filter,
        processor: &Processor,
    ) -> Result<ResultStream<InvokeResult>, GridError> {
        let results = self.cache.invoke_all(filter, processor);
        Ok(stream::iter(results.into_iter().map(|(key, result)| match result {
            Ok(value) => Ok(InvokeResult { key, value }),
            Err(e) => Err(GridError::EntryFailed {
                key,
                reason: e.to_string(),
            }),
        }))
        .boxed())
    }

    async fn invoke(&self, key: &str, processor: &Processor) -> Result<Option<Value>, GridError> {
        self.cache
            .invoke(key, processor)
            .map_err(|e| GridError::EntryFailed {
                key: key.to_string(),
                reason: e.to_string(),
            })
    }

    async fn subscribe(
        &self,
        kind: Option<EventKind>,
    ) -> Result<ResultStream<MapEvent<V>>, GridError> {
        Ok(event_stream(self.cache.subscribe())
            .filter(move |event| future::ready(accepts(kind, event)))
            .map(MapEvent::<V>::decode)
            .boxed())
    }
}

/// Whether an event passes a subscription's kind filter
pub(crate) fn accepts(kind: Option<EventKind>, event: &CacheEvent) -> bool {
    kind.map_or(true, |kind| event.kind == kind)
}

/// Turn a broadcast receiver into a stream, skipping over lag
pub(crate) fn event_stream(
    rx: broadcast::Receiver<CacheEvent>,
) -> BoxStream<'static, CacheEvent> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => return Some((event, rx)),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!("Event subscriber lagged, skipped {} events", missed);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}
