//! Grid server implementation
//!
//! The server hosts named caches in memory and exposes them over gRPC.
//! Filters and entry processors shipped by clients run here, next to the
//! data, and change events are streamed back to listening clients.

use crate::cache::{Grid, DEFAULT_EVENT_CAPACITY};
use crate::model::{Price, DEMO_SYMBOLS, INITIAL_PRICE, PRICE_CACHE};
use crate::pb::data_grid_server::{DataGrid, DataGridServer};
use crate::processor::{Filter, Processor};
use crate::protocol::{
    self, CacheRequest, EventMessage, GetRequest, GetResponse, HeartbeatRequest,
    HeartbeatResponse, InvokeAllRequest, InvokeRequest, InvokeResponse, InvokeResult,
    KeyResponse, PutAllRequest, PutAllResponse, PutRequest, PutResponse, SizeResponse,
};
use crate::store::event_stream;
use anyhow::Result;
use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use rand::Rng;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tonic::{Request, Response, Status};

/// Smallest factor a price tick multiplies by
pub const MIN_TICK_FACTOR: f64 = 0.95;

/// Largest factor (exclusive) a price tick multiplies by
pub const MAX_TICK_FACTOR: f64 = 1.06;

/// Ticks never take a price below this
pub const MIN_PRICE: f64 = 5.0;

/// Server configuration
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// gRPC listen address
    pub listen_addr: String,
    /// Capacity of each cache's event channel
    pub event_capacity: usize,
    /// Load the demo prices at startup
    pub bootstrap: bool,
    /// Interval of random price updates, `None` to disable
    pub ticker_interval: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "[::1]:1408".to_string(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            bootstrap: true,
            ticker_interval: None,
        }
    }
}

/// Grid server
pub struct GridServer {
    config: ServerConfig,
    /// Named caches served by this node
    grid: Grid,
}

impl GridServer {
    /// Create a new grid server
    pub fn new(config: ServerConfig) -> Self {
        let grid = Grid::new(config.event_capacity);
        let server = Self { config, grid };
        if server.config.bootstrap {
            server.populate_prices();
        }
        server
    }

    /// gRPC service backed by this server
    pub fn into_service(self: Arc<Self>) -> DataGridServer<DataGridService> {
        DataGridServer::new(DataGridService::new(self))
    }

    /// Get the listen address
    pub fn listen_addr(&self) -> &str {
        &self.config.listen_addr
    }

    /// Caches served by this node
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Put every demo symbol into the Price cache at the initial price
    pub fn populate_prices(&self) {
        let prices = self.grid.cache(PRICE_CACHE);
        let entries = DEMO_SYMBOLS.iter().filter_map(|symbol| {
            serde_json::to_value(Price::new(*symbol, INITIAL_PRICE))
                .ok()
                .map(|value| (symbol.to_string(), value))
        });
        let count = prices.put_all(entries);
        tracing::info!("Populated {} prices at ${:.2}", count, INITIAL_PRICE);
    }

    /// Move the price of one random symbol by a random factor
    pub fn tick_price(&self) {
        let prices = self.grid.cache(PRICE_CACHE);
        let keys = prices.keys();
        if keys.is_empty() {
            return;
        }

        let (symbol, factor) = {
            let mut rng = rand::thread_rng();
            (
                keys[rng.gen_range(0..keys.len())].clone(),
                rng.gen_range(MIN_TICK_FACTOR..MAX_TICK_FACTOR),
            )
        };
        let processor = Processor::multiply_f64(Price::PRICE, factor).with_floor(MIN_PRICE);

        match prices.invoke(&symbol, &processor) {
            Ok(Some(price)) => tracing::debug!("Tick {} -> {}", symbol, price),
            Ok(None) => tracing::debug!("Tick skipped, {} was removed", symbol),
            Err(e) => tracing::warn!("Tick failed for {}: {}", symbol, e),
        }
    }
}

/// Run random price updates until the task is dropped
pub fn spawn_price_ticker(server: Arc<GridServer>, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            server.tick_price();
        }
    })
}

/// gRPC service implementation wrapper
#[derive(Clone)]
pub struct DataGridService {
    inner: Arc<GridServer>,
}

impl DataGridService {
    pub fn new(inner: Arc<GridServer>) -> Self {
        Self { inner }
    }

    pub fn server(&self) -> &Arc<GridServer> {
        &self.inner
    }
}

fn decode_arg<T: DeserializeOwned>(bytes: &[u8], what: &str) -> Result<T, Status> {
    protocol::decode(bytes).map_err(|e| Status::invalid_argument(format!("Invalid {what}: {e}")))
}

fn encode_value(value: &Value) -> Result<Bytes, Status> {
    protocol::encode(value).map_err(|e| Status::internal(e.to_string()))
}

#[tonic::async_trait]
impl DataGrid for DataGridService {
    type KeySetStream = BoxStream<'static, Result<KeyResponse, Status>>;
    type InvokeAllStream = BoxStream<'static, Result<InvokeResult, Status>>;
    type ListenStream = BoxStream<'static, Result<EventMessage, Status>>;

    async fn get(&self, request: Request<GetRequest>) -> Result<Response<GetResponse>, Status> {
        let req = request.into_inner();

        tracing::debug!("GET request: cache={}, key={}", req.cache, req.key);

        let response = match self.inner.grid.cache(&req.cache).get(&req.key) {
            Some(value) => GetResponse {
                present: true,
                value: encode_value(&value)?,
            },
            None => GetResponse {
                present: false,
                value: Bytes::new(),
            },
        };
        Ok(Response::new(response))
    }

    async fn put(&self, request: Request<PutRequest>) -> Result<Response<PutResponse>, Status> {
        let req = request.into_inner();

        tracing::debug!("PUT request: cache={}, key={}", req.cache, req.key);

        let value: Value = decode_arg(&req.value, "value")?;
        let previous = self
            .inner
            .grid
            .cache(&req.cache)
            .put(req.key, value)
            .as_ref()
            .map(encode_value)
            .transpose()?;

        Ok(Response::new(PutResponse { previous }))
    }

    async fn put_all(
        &self,
        request: Request<PutAllRequest>,
    ) -> Result<Response<PutAllResponse>, Status> {
        let req = request.into_inner();

        tracing::debug!(
            "PUT_ALL request: cache={}, entries={}",
            req.cache,
            req.entries.len()
        );

        // decode everything first so a bad entry writes nothing
        let entries = req
            .entries
            .into_iter()
            .map(|entry| -> Result<(String, Value), Status> {
                Ok((entry.key, decode_arg(&entry.value, "value")?))
            })
            .collect::<Result<Vec<_>, Status>>()?;

        let count = self.inner.grid.cache(&req.cache).put_all(entries);
        Ok(Response::new(PutAllResponse {
            count: count as u64,
        }))
    }

    async fn size(&self, request: Request<CacheRequest>) -> Result<Response<SizeResponse>, Status> {
        let req = request.into_inner();
        let size = self.inner.grid.cache(&req.cache).size();
        Ok(Response::new(SizeResponse { size: size as u64 }))
    }

    async fn key_set(
        &self,
        request: Request<CacheRequest>,
    ) -> Result<Response<Self::KeySetStream>, Status> {
        let req = request.into_inner();

        tracing::debug!("KEY_SET request: cache={}", req.cache);

        let keys = self.inner.grid.cache(&req.cache).keys();
        let stream = stream::iter(keys.into_iter().map(|key| Ok(KeyResponse { key })));
        Ok(Response::new(stream.boxed()))
    }

    async fn invoke_all(
        &self,
        request: Request<InvokeAllRequest>,
    ) -> Result<Response<Self::InvokeAllStream>, Status> {
        let req = request.into_inner();
        let filter: Filter = decode_arg(&req.filter, "filter")?;
        let processor: Processor = decode_arg(&req.processor, "processor")?;

        tracing::debug!(
            "INVOKE_ALL request: cache={}, filter={:?}, processor={:?}",
            req.cache,
            filter,
            processor
        );

        let results = self
            .inner
            .grid
            .cache(&req.cache)
            .invoke_all(&filter, &processor);

        let messages = results
            .into_iter()
            .map(|(key, result)| -> Result<InvokeResult, Status> {
                match result {
                    Ok(value) => Ok(InvokeResult {
                        key,
                        value: encode_value(&value)?,
                        error: None,
                    }),
                    Err(e) => Ok(InvokeResult {
                        key,
                        value: Bytes::new(),
                        error: Some(e.to_string()),
                    }),
                }
            });
        Ok(Response::new(stream::iter(messages).boxed()))
    }

    async fn invoke(
        &self,
        request: Request<InvokeRequest>,
    ) -> Result<Response<InvokeResponse>, Status> {
        let req = request.into_inner();
        let processor: Processor = decode_arg(&req.processor, "processor")?;

        tracing::debug!(
            "INVOKE request: cache={}, key={}, processor={:?}",
            req.cache,
            req.key,
            processor
        );

        let response = match self.inner.grid.cache(&req.cache).invoke(&req.key, &processor) {
            Ok(Some(value)) => InvokeResponse {
                present: true,
                value: encode_value(&value)?,
                error: None,
            },
            Ok(None) => InvokeResponse {
                present: false,
                value: Bytes::new(),
                error: None,
            },
            Err(e) => {
                tracing::warn!("INVOKE failed: key={}, error={}", req.key, e);
                InvokeResponse {
                    present: true,
                    value: Bytes::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        Ok(Response::new(response))
    }

    async fn listen(
        &self,
        request: Request<CacheRequest>,
    ) -> Result<Response<Self::ListenStream>, Status> {
        let req = request.into_inner();

        let cache = self.inner.grid.cache(&req.cache);
        let events = event_stream(cache.subscribe()).map(|event| {
            EventMessage::try_from(&event).map_err(|e| Status::internal(e.to_string()))
        });

        tracing::info!(
            "Listener registered on cache {} ({} active)",
            req.cache,
            cache.listener_count()
        );
        Ok(Response::new(events.boxed()))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        tracing::trace!("Heartbeat from client {}", req.client_id);
        Ok(Response::new(HeartbeatResponse { alive: true }))
    }
}

/// Run the server
pub async fn run_server(config: ServerConfig) -> Result<()> {
    let ticker_interval = config.ticker_interval;
    let server = Arc::new(GridServer::new(config));
    let addr = server.listen_addr().parse()?;

    let ticker = ticker_interval.map(|interval| {
        tracing::info!("Price ticker every {:?}", interval);
        spawn_price_ticker(Arc::clone(&server), interval)
    });

    tracing::info!("Starting grid server on {}", addr);

    let result = tonic::transport::Server::builder()
        .add_service(server.into_service())
        .serve(addr)
        .await;

    if let Some(ticker) = ticker {
        ticker.abort();
    }
    result?;

    Ok(())
}
