//! Provides the [`Response`] struct of the key-value store and related types.

use crate::{Key, KvsError, LatticeType, LatticeValue};

/// A response to a [`Request`][super::Request].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Response {
    /// The request_id specified in the corresponding request. Used to
    /// associate asynchronous requests and responses.
    pub response_id: Option<String>,
    /// The type of the answered request.
    pub ty: ResponseType,
    /// Any errors associated with the whole request. Individual tuple errors are
    /// captured in the corresponding tuple. This will only be set if the whole
    /// request times out.
    pub error: Result<(), KvsError>,
    /// The individual response pairs associated with this request. There is a
    /// 1-to-1 mapping between these and the keys of the corresponding request.
    pub tuples: Vec<ResponseTuple>,
}

/// Specifies the type of operation that we executed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ResponseType {
    /// Response to a request to retrieve data from the KVS.
    Get,
    /// Response to a request to put data into the KVS.
    Put,
}

/// The result for an individual key.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ResponseTuple {
    /// The key name for this response.
    pub key: Key,
    /// The lattice value for this key.
    pub lattice: Option<LatticeValue>,
    /// The declared lattice type of the key, if known.
    pub lattice_type: Option<LatticeType>,
    /// The error type specified by the server (see [`KvsError`]).
    pub error: Option<KvsError>,
}
