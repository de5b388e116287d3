use crate::{
    lattice::causal::{CausalLattice, VectorClock},
    messages::Address,
    ClientKey,
};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

/// Identifies a request that waits for a response.
///
/// Peer cache threads send all remote reads with their own address as response address,
/// so the address alone does not distinguish their requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(super) struct RequestKey {
    /// Where the response is sent to.
    pub address: Address,
    /// The `id` of the request.
    pub client_id: String,
}

impl RequestKey {
    pub fn new(address: Address, client_id: String) -> Self {
        Self { address, client_id }
    }
}

/// Bookkeeping for a client request that could not be answered right away.
#[derive(Debug, Default, Clone)]
pub(super) struct PendingClientMetadata {
    /// The ID of the requesting client.
    pub client_id: String,
    /// All keys of the request, ordered so that responses list them by key.
    pub read_set: BTreeSet<ClientKey>,
    /// The keys of `read_set` that are not locally available yet.
    pub to_cover_set: HashSet<ClientKey>,
    /// Keys that the client announced to read next.
    pub future_read_set: HashSet<ClientKey>,
    /// The frontier versions the client observed, by the cache thread that holds them.
    pub prior_causal_chains: HashMap<Address, HashMap<ClientKey, VectorClock>>,
    /// Keys that were requested from peer cache threads, with the version that is needed.
    pub remote_read_set: HashMap<ClientKey, VectorClock>,
    /// Values returned by peer cache threads. They take precedence over the local causal cut.
    pub remote_results: HashMap<ClientKey, Arc<CausalLattice>>,
}

impl PendingClientMetadata {
    pub fn new(
        client_id: String,
        read_set: BTreeSet<ClientKey>,
        to_cover_set: HashSet<ClientKey>,
    ) -> Self {
        Self {
            client_id,
            read_set,
            to_cover_set,
            ..Default::default()
        }
    }

    /// Marks the key as locally available.
    ///
    /// Returns `true` if this was the last key that the request was waiting for.
    pub fn cover(&mut self, key: &ClientKey) -> bool {
        self.to_cover_set.remove(key) && self.to_cover_set.is_empty()
    }

    /// Stores the result of a remote read.
    ///
    /// Returns `true` if this was the last outstanding remote read.
    pub fn receive_remote(&mut self, key: &ClientKey, value: CausalLattice) -> bool {
        if let Some(requested) = self.remote_read_set.remove(key) {
            if !value.vector_clock().dominates(&requested) {
                log::warn!(
                    "Remote read of key {} for client {} returned version {:?}, \
                    which does not include the requested version {:?}",
                    key,
                    self.client_id,
                    value.vector_clock(),
                    requested
                );
            }
            self.remote_results.insert(key.clone(), Arc::new(value));
            self.remote_read_set.is_empty()
        } else {
            false
        }
    }
}
