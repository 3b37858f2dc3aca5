//! Grid client implementation
//!
//! A `GridSession` owns the connection to a grid server. Caches obtained
//! from the session are `RemoteCache` handles that implement `CacheStore`
//! by sending each operation as a gRPC call; bulk results and events are
//! read lazily from server streams.

use crate::cache::{CacheEvent, EventKind};
use crate::error::GridError;
use crate::pb::data_grid_client::DataGridClient;
use crate::processor::{Filter, Processor};
use crate::protocol::{
    self, CacheRequest, Entry, GetRequest, HeartbeatRequest, InvokeAllRequest, InvokeRequest,
    PutAllRequest, PutRequest,
};
use crate::store::{self, CacheStore, CacheValue, InvokeResult, MapEvent, ResultStream};
use async_trait::async_trait;
use futures::future;
use futures::stream::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};

/// Client configuration
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Client node ID
    pub client_id: u32,
    /// Server address (gRPC endpoint)
    pub server_addr: String,
    /// Bound on every request
    pub request_timeout: Duration,
    /// Bound on establishing the connection
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_id: 1,
            server_addr: "http://[::1]:1408".to_string(),
            request_timeout: Duration::from_secs(120),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

struct SessionInner {
    config: ClientConfig,
    /// gRPC client, `None` once closed
    grpc_client: Mutex<Option<DataGridClient<Channel>>>,
}

impl SessionInner {
    fn client(&self) -> Result<DataGridClient<Channel>, GridError> {
        self.grpc_client
            .lock()
            .clone()
            .ok_or(GridError::SessionClosed)
    }
}

/// Connection to a grid server
#[derive(Clone)]
pub struct GridSession {
    inner: Arc<SessionInner>,
}

impl GridSession {
    /// Connect to the server and check it is alive
    pub async fn connect(config: ClientConfig) -> Result<Self, GridError> {
        tracing::info!("Connecting to grid at {}", config.server_addr);

        let channel = Endpoint::from_shared(config.server_addr.clone())?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .connect()
            .await?;

        let mut client = DataGridClient::new(channel);
        let alive = client
            .heartbeat(HeartbeatRequest {
                client_id: config.client_id,
            })
            .await?
            .into_inner()
            .alive;

        if !alive {
            return Err(GridError::Transport(tonic::Status::unavailable(
                "grid server is not alive",
            )));
        }

        tracing::info!("Connected to grid as client {}", config.client_id);

        Ok(Self {
            inner: Arc::new(SessionInner {
                config,
                grpc_client: Mutex::new(Some(client)),
            }),
        })
    }

    /// Typed handle on a named cache
    pub fn cache<V: CacheValue>(&self, name: &str) -> RemoteCache<V> {
        RemoteCache {
            session: Arc::clone(&self.inner),
            name: name.to_string(),
            _marker: PhantomData,
        }
    }

    /// Send a heartbeat to the server
    pub async fn heartbeat(&self) -> Result<bool, GridError> {
        let mut client = self.inner.client()?;
        let response = client
            .heartbeat(HeartbeatRequest {
                client_id: self.inner.config.client_id,
            })
            .await?
            .into_inner();
        Ok(response.alive)
    }

    /// Check if the session is still open
    pub fn is_connected(&self) -> bool {
        self.inner.grpc_client.lock().is_some()
    }

    /// Close the session. Caches obtained from it stop working.
    pub fn close(&self) {
        if self.inner.grpc_client.lock().take().is_some() {
            tracing::info!("Closed grid session");
        }
    }
}

/// `CacheStore` served by a remote grid
pub struct RemoteCache<V> {
    session: Arc<SessionInner>,
    name: String,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for RemoteCache<V> {
    fn clone(&self) -> Self {
        Self {
            session: Arc::clone(&self.session),
            name: self.name.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> RemoteCache<V> {
    fn cache_request(&self) -> CacheRequest {
        CacheRequest {
            cache: self.name.clone(),
        }
    }
}

#[async_trait]
impl<V: CacheValue> CacheStore<V> for RemoteCache<V> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<V>, GridError> {
        let mut client = self.session.client()?;
        let response = client
            .get(GetRequest {
                cache: self.name.clone(),
                key: key.to_string(),
            })
            .await?
            .into_inner();

        if !response.present {
            return Ok(None);
        }
        Ok(Some(protocol::decode(&response.value)?))
    }

    async fn put(&self, key: &str, value: &V) -> Result<Option<V>, GridError> {
        let mut client = self.session.client()?;
        let response = client
            .put(PutRequest {
                cache: self.name.clone(),
                key: key.to_string(),
                value: protocol::encode(value)?,
            })
            .await?
            .into_inner();

        response
            .previous
            .as_deref()
            .map(protocol::decode)
            .transpose()
    }

    async fn put_all(&self, entries: &HashMap<String, V>) -> Result<(), GridError> {
        let mut client = self.session.client()?;
        let entries = entries
            .iter()
            .map(|(key, value)| -> Result<Entry, GridError> {
                Ok(Entry {
                    key: key.clone(),
                    value: protocol::encode(value)?,
                })
            })
            .collect::<Result<Vec<_>, GridError>>()?;

        let response = client
            .put_all(PutAllRequest {
                cache: self.name.clone(),
                entries,
            })
            .await?
            .into_inner();

        tracing::debug!("PUT_ALL wrote {} entries to {}", response.count, self.name);
        Ok(())
    }

    async fn size(&self) -> Result<usize, GridError> {
        let mut client = self.session.client()?;
        let response = client.size(self.cache_request()).await?.into_inner();
        Ok(response.size as usize)
    }

    async fn key_set(&self) -> Result<ResultStream<String>, GridError> {
        let mut client = self.session.client()?;
        let stream = client.key_set(self.cache_request()).await?.into_inner();
        Ok(stream
            .map(|item| item.map(|k| k.key).map_err(GridError::from))
            .boxed())
    }

    async fn invoke_all(
        &self,
        filter: &Filter,
        processor: &Processor,
    ) -> Result<ResultStream<InvokeResult>, GridError> {
        let mut client = self.session.client()?;
        let stream = client
            .invoke_all(InvokeAllRequest {
                cache: self.name.clone(),
                filter: protocol::encode(filter)?,
                processor: protocol::encode(processor)?,
            })
            .await?
            .into_inner();

        Ok(stream
            .map(|item| -> Result<InvokeResult, GridError> {
                let result = item?;
                if let Some(reason) = result.error {
                    return Err(GridError::EntryFailed {
                        key: result.key,
                        reason,
                    });
                }
                Ok(InvokeResult {
                    value: protocol::decode(&result.value)?,
                    key: result.key,
                })
            })
            .boxed())
    }

    async fn invoke(&self, key: &str, processor: &Processor) -> Result<Option<Value>, GridError> {
        let mut client = self.session.client()?;
        let response = client
            .invoke(InvokeRequest {
                cache: self.name.clone(),
                key: key.to_string(),
                processor: protocol::encode(processor)?,
            })
            .await?
            .into_inner();

        if let Some(reason) = response.error {
            return Err(GridError::EntryFailed {
                key: key.to_string(),
                reason,
            });
        }
        if !response.present {
            return Ok(None);
        }
        Ok(Some(protocol::decode(&response.value)?))
    }

    async fn subscribe(
        &self,
        kind: Option<EventKind>,
    ) -> Result<ResultStream<MapEvent<V>>, GridError> {
        let mut client = self.session.client()?;
        let stream = client.listen(self.cache_request()).await?.into_inner();

        tracing::info!("Listening for events on {}", self.name);

        Ok(stream
            .map(|item| -> Result<CacheEvent, GridError> { item?.try_into() })
            .filter(move |event| {
                future::ready(match event {
                    Ok(event) => store::accepts(kind, event),
                    Err(_) => true,
                })
            })
            .map(|event| -> Result<MapEvent<V>, GridError> { MapEvent::decode(event?) })
            .boxed())
    }
}
