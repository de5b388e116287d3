//! The request and response types of the client-facing causal protocol.
//!
//! Peer cache threads use the same types to read versions from each other.

use super::Address;
use crate::{
    lattice::causal::{CausalLattice, VectorClock},
    ClientKey,
};
use std::collections::HashMap;

/// Consistency level of a [`CausalRequest`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
pub enum ConsistencyType {
    /// Every key is read independently; values are served as soon as they were fetched.
    Single,
    /// The returned values form a causally consistent snapshot.
    Multi,
    /// No consistency level was set. Requests with this level are dropped.
    Unspecified,
}

/// A GET or PUT request to a cache thread.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CausalRequest {
    /// The client ID, echoed in the response.
    pub id: String,
    /// The requested consistency level.
    pub consistency: ConsistencyType,
    /// The keys to read, or the keys and values to write.
    pub tuples: Vec<CausalTuple>,
    /// The address at which the client waits for the [`CausalResponse`].
    pub response_address: Address,
    /// The dependency versions that the client observed in earlier responses, grouped by
    /// the cache thread that holds them.
    ///
    /// Only used for [`ConsistencyType::Multi`] requests.
    #[serde(default)]
    pub key_version_locations: HashMap<Address, Vec<KeyVersion>>,
    /// Keys that the client is going to read next. The cache fetches them in advance.
    #[serde(default)]
    pub future_read_set: Vec<ClientKey>,
}

/// A key with an optional value.
///
/// The payload is set for PUT requests and for GET responses.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CausalTuple {
    /// The key that is read or written.
    pub key: ClientKey,
    /// The value of the key.
    pub payload: Option<CausalLattice>,
}

impl CausalTuple {
    /// Creates a tuple without payload, as used for reads.
    pub fn read(key: ClientKey) -> Self {
        Self { key, payload: None }
    }
}

/// A version of a key that a client has observed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct KeyVersion {
    /// The observed key.
    pub key: ClientKey,
    /// The observed version.
    pub vector_clock: VectorClock,
}

/// The reply to a [`CausalRequest`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CausalResponse {
    /// The `id` of the corresponding request.
    pub id: String,
    /// One tuple per requested key, ordered by key.
    ///
    /// For PUT acknowledgements the tuples carry no payload.
    pub tuples: Vec<CausalTuple>,
    /// The address of the cache thread whose causal cut the values were read from.
    ///
    /// Clients pass it back in later [`CausalRequest::key_version_locations`] so that
    /// other cache threads know where the observed versions can be found.
    pub versions_address: Option<Address>,
}
