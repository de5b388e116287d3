//! Answers pending client requests once all requested values are available.

use super::{pending::RequestKey, CausalCacheNode, Outbound};
use crate::{
    messages::{Address, CausalRequest, CausalResponse, CausalTuple, ConsistencyType},
    ClientKey,
};
use std::collections::HashMap;

impl CausalCacheNode {
    /// Called when `key` was admitted to the causal cut on behalf of `request`.
    pub(super) fn key_covered(&mut self, request: &RequestKey, key: &ClientKey) {
        let is_complete = match self.pending_multi.get_mut(request) {
            Some(pending) => pending.cover(key),
            None => false,
        };
        if is_complete {
            self.complete_multi(request);
        }
    }

    /// Sends the response to the single-key `request`.
    pub(super) fn respond_single(&mut self, request: &RequestKey) {
        let pending = match self.pending_single.remove(request) {
            Some(pending) => pending,
            None => return,
        };
        let tuples = pending
            .read_set
            .into_iter()
            .map(|key| {
                let payload = self.unmerged.get(&key).map(|v| (**v).clone());
                CausalTuple {
                    payload: Some(payload.unwrap_or_default()),
                    key,
                }
            })
            .collect();

        self.outbox.push(Outbound::Respond {
            address: request.address.clone(),
            response: CausalResponse {
                id: pending.client_id,
                tuples,
                versions_address: None,
            },
        });
        self.release_request(request);
    }

    /// All keys of the multi-key `request` are in the causal cut.
    ///
    /// Sends the response, unless some versions must be read from peer cache threads first.
    pub(super) fn complete_multi(&mut self, request: &RequestKey) {
        if !self.fire_remote_read_requests(request) {
            self.respond_multi(request);
        }
    }

    /// Requests the versions that the client observed at other cache threads and that the
    /// local causal cut does not include.
    ///
    /// Returns `true` if at least one remote read was sent.
    fn fire_remote_read_requests(&mut self, request: &RequestKey) -> bool {
        let pending = match self.pending_multi.get_mut(request) {
            Some(pending) => pending,
            None => return false,
        };

        let mut remote_reads: HashMap<Address, Vec<ClientKey>> = HashMap::new();
        for (peer, chain) in &pending.prior_causal_chains {
            for (key, version) in chain {
                if pending.read_set.contains(key)
                    && !pending.remote_read_set.contains_key(key)
                    && !self.versions.covers(key, version)
                {
                    pending.remote_read_set.insert(key.clone(), version.clone());
                    remote_reads
                        .entry(peer.clone())
                        .or_default()
                        .push(key.clone());
                }
            }
        }
        if remote_reads.is_empty() {
            return false;
        }

        let client_id = pending.client_id.clone();
        for (peer, mut keys) in remote_reads {
            keys.sort();
            log::info!(
                "Reading keys {:?} of client {} from peer {}",
                keys,
                client_id,
                peer
            );
            self.outbox.push(Outbound::PeerRequest {
                address: peer,
                request: CausalRequest {
                    id: client_id.clone(),
                    consistency: ConsistencyType::Multi,
                    tuples: keys.into_iter().map(CausalTuple::read).collect(),
                    response_address: self.address.clone(),
                    key_version_locations: HashMap::new(),
                    future_read_set: Vec::new(),
                },
            });
        }
        self.remote_readers
            .entry(client_id)
            .or_default()
            .insert(request.clone());
        true
    }

    /// Sends the response to the multi-key `request`.
    ///
    /// Values read from peers take precedence over the local causal cut.
    pub(super) fn respond_multi(&mut self, request: &RequestKey) {
        let pending = match self.pending_multi.remove(request) {
            Some(pending) => pending,
            None => return,
        };
        let tuples = pending
            .read_set
            .into_iter()
            .map(|key| {
                let payload = pending
                    .remote_results
                    .get(&key)
                    .or_else(|| self.causal_cut.get(&key))
                    .map(|v| (**v).clone());
                CausalTuple {
                    payload: Some(payload.unwrap_or_default()),
                    key,
                }
            })
            .collect();

        self.outbox.push(Outbound::Respond {
            address: request.address.clone(),
            response: CausalResponse {
                id: pending.client_id,
                tuples,
                versions_address: Some(self.address.clone()),
            },
        });
        self.release_request(request);
    }

    /// Forgets every reference to a `request` that was answered.
    fn release_request(&mut self, request: &RequestKey) {
        for progress in self.progress.values_mut() {
            progress.waiters.remove(request);
        }
        self.single_key_callbacks.retain(|_, requests| {
            requests.remove(request);
            !requests.is_empty()
        });
        self.remote_readers.retain(|_, requests| {
            requests.remove(request);
            !requests.is_empty()
        });
    }
}
