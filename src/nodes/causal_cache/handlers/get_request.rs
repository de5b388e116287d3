use crate::{
    messages::{CausalRequest, ConsistencyType},
    nodes::causal_cache::{
        frontier::CausalFrontier,
        pending::{PendingClientMetadata, RequestKey},
        resolver::KeyProgress,
        CausalCacheNode, Continuation,
    },
    ClientKey,
};
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::Arc,
};

impl CausalCacheNode {
    /// Handles a GET request of a client or of a peer cache thread.
    pub fn get_request_handler(&mut self, request: CausalRequest) {
        match request.consistency {
            ConsistencyType::Single => self.single_get(request),
            ConsistencyType::Multi => self.multi_get(request),
            ConsistencyType::Unspecified => {
                log::error!(
                    "Dropping request {} from {} with unspecified consistency level",
                    request.id,
                    request.response_address
                );
            }
        }
        self.drain_continuations();
    }

    /// Serves every key from the unmerged store, fetching the keys that are not there yet.
    fn single_get(&mut self, request: CausalRequest) {
        let request_key = RequestKey::new(request.response_address, request.id.clone());
        let mut read_set = BTreeSet::new();
        let mut to_cover = HashSet::new();

        for tuple in request.tuples {
            let key = tuple.key;
            self.key_set.insert(key.clone());
            read_set.insert(key.clone());

            if !self.unmerged.contains_key(&key) {
                to_cover.insert(key.clone());
                self.single_key_callbacks
                    .entry(key.clone())
                    .or_default()
                    .insert(request_key.clone());
                self.fetch(&key, &Arc::default());
            }
        }

        let is_complete = to_cover.is_empty();
        let replaced = self.pending_single.insert(
            request_key.clone(),
            PendingClientMetadata::new(request.id, read_set, to_cover),
        );
        if replaced.is_some() {
            log::warn!(
                "Replacing the pending single-key request {} of {}",
                request_key.client_id,
                request_key.address
            );
        }
        if is_complete {
            self.respond_single(&request_key);
        }
    }

    /// Serves the keys from the causal cut, resolving every key that is not part of it yet.
    fn multi_get(&mut self, request: CausalRequest) {
        let request_key = RequestKey::new(request.response_address, request.id.clone());
        let frontier = Arc::new(CausalFrontier::from_locations(
            &request.key_version_locations,
        ));

        let mut prior_causal_chains: HashMap<_, HashMap<ClientKey, _>> = HashMap::new();
        for (peer, versions) in request.key_version_locations {
            for version in versions {
                // only versions that made it into the frontier need to be read remotely
                if frontier.contains(&version.key, &version.vector_clock) {
                    prior_causal_chains
                        .entry(peer.clone())
                        .or_default()
                        .insert(version.key, version.vector_clock);
                }
            }
        }

        let mut read_set = BTreeSet::new();
        let mut to_cover = HashSet::new();
        for tuple in request.tuples {
            let key = tuple.key;
            self.key_set.insert(key.clone());
            read_set.insert(key.clone());

            if self.causal_cut.contains_key(&key) || frontier.contains_key(&key) {
                continue;
            }
            to_cover.insert(key.clone());

            if let Some(progress) = self.progress.get_mut(&key) {
                progress.waiters.insert(request_key.clone());
            } else if self.unmerged.contains_key(&key) {
                let mut progress = KeyProgress::preparing(frontier.clone());
                progress.waiters.insert(request_key.clone());
                self.progress.insert(key.clone(), progress);
                self.continuations
                    .push_back(Continuation::Resolve(key.clone()));
            } else {
                self.fetch(&key, &frontier)
                    .waiters
                    .insert(request_key.clone());
            }
        }

        let mut pending = PendingClientMetadata::new(request.id, read_set, to_cover.clone());
        pending.future_read_set = request.future_read_set.into_iter().collect();
        pending.prior_causal_chains = prior_causal_chains;

        let prefetch: Vec<_> = pending
            .future_read_set
            .iter()
            .filter(|key| {
                !self.causal_cut.contains_key(*key)
                    && !self.unmerged.contains_key(*key)
                    && !self.progress.contains_key(*key)
            })
            .cloned()
            .collect();
        for key in prefetch {
            self.key_set.insert(key.clone());
            self.fetch(&key, &Arc::default());
        }

        if self
            .pending_multi
            .insert(request_key.clone(), pending)
            .is_some()
        {
            log::warn!(
                "Replacing the pending multi-key request {} of {}",
                request_key.client_id,
                request_key.address
            );
        }

        // admissions report back through `Continuation::Covered`
        self.drain_continuations();

        if to_cover.is_empty() {
            self.complete_multi(&request_key);
        }
    }
}
