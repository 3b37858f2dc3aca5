//! Wire types for the DataGrid gRPC service
//!
//! Messages are prost types declared by hand; `build.rs` generates the
//! client and server stubs around them. Values, filters and processors
//! travel as JSON documents in `bytes` fields.

use crate::cache::{CacheEvent, EventKind};
use crate::error::GridError;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Requests that only name a cache (size, key set, listen)
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CacheRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
    #[prost(string, tag = "2")]
    pub key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct GetResponse {
    #[prost(bool, tag = "1")]
    pub present: bool,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
    #[prost(string, tag = "2")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutResponse {
    #[prost(bytes = "bytes", optional, tag = "1")]
    pub previous: Option<Bytes>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Entry {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutAllRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
    #[prost(message, repeated, tag = "2")]
    pub entries: Vec<Entry>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PutAllResponse {
    #[prost(uint64, tag = "1")]
    pub count: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct SizeResponse {
    #[prost(uint64, tag = "1")]
    pub size: u64,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct KeyResponse {
    #[prost(string, tag = "1")]
    pub key: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvokeAllRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub filter: Bytes,
    #[prost(bytes = "bytes", tag = "3")]
    pub processor: Bytes,
}

/// Outcome for one entry of an InvokeAll. A failed entry carries `error`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvokeResult {
    #[prost(string, tag = "1")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvokeRequest {
    #[prost(string, tag = "1")]
    pub cache: String,
    #[prost(string, tag = "2")]
    pub key: String,
    #[prost(bytes = "bytes", tag = "3")]
    pub processor: Bytes,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct InvokeResponse {
    #[prost(bool, tag = "1")]
    pub present: bool,
    #[prost(bytes = "bytes", tag = "2")]
    pub value: Bytes,
    #[prost(string, optional, tag = "3")]
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    Inserted = 0,
    Updated = 1,
    Deleted = 2,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EventMessage {
    #[prost(enumeration = "EventType", tag = "1")]
    pub kind: i32,
    #[prost(string, tag = "2")]
    pub key: String,
    #[prost(bytes = "bytes", optional, tag = "3")]
    pub old_value: Option<Bytes>,
    #[prost(bytes = "bytes", optional, tag = "4")]
    pub new_value: Option<Bytes>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatRequest {
    #[prost(uint32, tag = "1")]
    pub client_id: u32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct HeartbeatResponse {
    #[prost(bool, tag = "1")]
    pub alive: bool,
}

/// Serialize a value, filter or processor for the wire
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, GridError> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, GridError> {
    Ok(serde_json::from_slice(bytes)?)
}

impl From<EventKind> for EventType {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Inserted => EventType::Inserted,
            EventKind::Updated => EventType::Updated,
            EventKind::Deleted => EventType::Deleted,
        }
    }
}

impl From<EventType> for EventKind {
    fn from(kind: EventType) -> Self {
        match kind {
            EventType::Inserted => EventKind::Inserted,
            EventType::Updated => EventKind::Updated,
            EventType::Deleted => EventKind::Deleted,
        }
    }
}

impl TryFrom<&CacheEvent> for EventMessage {
    type Error = GridError;

    fn try_from(event: &CacheEvent) -> Result<Self, Self::Error> {
        Ok(Self {
            kind: EventType::from(event.kind) as i32,
            key: event.key.clone(),
            old_value: event.old.as_ref().map(encode).transpose()?,
            new_value: event.new.as_ref().map(encode).transpose()?,
        })
    }
}

impl TryFrom<EventMessage> for CacheEvent {
    type Error = GridError;

    fn try_from(msg: EventMessage) -> Result<Self, Self::Error> {
        let kind = EventType::try_from(msg.kind)
            .map_err(|_| GridError::MalformedEvent(format!("unknown event type {}", msg.kind)))?;
        Ok(Self {
            kind: kind.into(),
            key: msg.key,
            old: msg.old_value.as_deref().map(decode).transpose()?,
            new: msg.new_value.as_deref().map(decode).transpose()?,
        })
    }
}
