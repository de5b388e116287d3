//! Decides when fetched values may enter the causal cut.
//!
//! A key that some multi-key reader is waiting for is _resolved_: starting from the key's
//! value in the unmerged store, the resolver walks the dependencies. Every dependency version
//! must either be admitted already, be known to the client through its causal frontier, or
//! be available in the unmerged store, in which case its own dependencies are checked as well.
//! The key and all unmerged values that were visited form a _closure_ that is merged into the
//! causal cut at once as soon as nothing is missing.
//!
//! Missing dependencies are fetched from the key-value store. The resolving key registers
//! itself as a dependent of each missing key and is resolved again when that key arrives or
//! is admitted.

use super::{frontier::CausalFrontier, pending::RequestKey, CausalCacheNode, Continuation};
use crate::{
    lattice::{causal::VectorClock, Lattice},
    ClientKey,
};
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

/// Resolution progress of a key that is being fetched or prepared for the causal cut.
#[derive(Debug)]
pub(super) struct KeyProgress {
    pub phase: Phase,
    /// Multi-key requests that wait for this key to be admitted.
    pub waiters: HashSet<RequestKey>,
    /// Keys whose resolution is blocked on this key, by the version they require.
    pub dependents: HashMap<VectorClock, HashSet<ClientKey>>,
    /// Versions that the client which started the resolution has already observed.
    pub frontier: Arc<CausalFrontier>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(super) enum Phase {
    /// A GET for the key is outstanding and no value is available yet.
    Fetching,
    /// The key's value is in the unmerged store; the listed dependencies are missing.
    Preparing { missing: HashSet<ClientKey> },
}

impl KeyProgress {
    pub fn fetching(frontier: Arc<CausalFrontier>) -> Self {
        Self {
            phase: Phase::Fetching,
            waiters: HashSet::new(),
            dependents: HashMap::new(),
            frontier,
        }
    }

    pub fn preparing(frontier: Arc<CausalFrontier>) -> Self {
        Self {
            phase: Phase::Preparing {
                missing: HashSet::new(),
            },
            ..Self::fetching(frontier)
        }
    }

    /// No request or other key is waiting for this key.
    pub fn is_idle(&self) -> bool {
        self.waiters.is_empty() && self.dependents.is_empty()
    }

    pub fn dependent_keys(&self) -> impl Iterator<Item = &ClientKey> + '_ {
        self.dependents.values().flatten()
    }
}

/// Invariant violations that are detected while serving requests.
///
/// They are logged and never abort the cache thread.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    /// Resolving a key led back to the key itself with a newer version requirement.
    #[error(
        "dependency cycle: a dependency of `{key}` requires version {required:?} of `{key}` \
        itself, which is newer than the fetched version"
    )]
    DependencyCycle {
        /// The key whose resolution depends on itself.
        key: ClientKey,
        /// The version of `key` that the cycle requires.
        required: VectorClock,
    },
    /// A PUT response for a non-LWW key arrived that no client request is waiting for.
    #[error("missing request id - address entry for PUT response with non LWW key `{key}`")]
    UntrackedPut {
        /// The written key.
        key: crate::Key,
    },
    /// The key-value store returned a value that is not a multi-key causal lattice.
    #[error("expected a multi-key causal value for key `{key}`, got {ty:?}")]
    UnexpectedLattice {
        /// The fetched key.
        key: ClientKey,
        /// The lattice type that was returned.
        ty: crate::LatticeType,
    },
}

impl CausalCacheNode {
    /// Starts fetching `key` unless it is already being fetched or prepared.
    ///
    /// Returns the progress entry of the key, so that the caller can register itself.
    pub(super) fn fetch(
        &mut self,
        key: &ClientKey,
        frontier: &Arc<CausalFrontier>,
    ) -> &mut KeyProgress {
        if !self.progress.contains_key(key) {
            self.kvs_get(key.clone());
        }
        self.progress
            .entry(key.clone())
            .or_insert_with(|| KeyProgress::fetching(frontier.clone()))
    }

    /// Tries to admit `head` and its unmerged dependencies to the causal cut.
    pub(super) fn resolve(&mut self, head: &ClientKey) {
        let frontier = match self.progress.get(head) {
            Some(KeyProgress {
                phase: Phase::Preparing { .. },
                frontier,
                ..
            }) => frontier.clone(),
            // still fetching, or already admitted
            Some(_) | None => return,
        };

        let lattice = match self.unmerged.get(head) {
            Some(lattice) => lattice.clone(),
            None => {
                log::warn!("Key {} is in preparation without a fetched value", head);
                self.kvs_get(head.clone());
                if let Some(progress) = self.progress.get_mut(head) {
                    progress.phase = Phase::Fetching;
                }
                return;
            }
        };

        if self.causal_cut.contains_key(head) && self.versions.covers(head, lattice.vector_clock())
        {
            self.finish(head);
            return;
        }

        let mut closure = vec![head.clone()];
        let mut in_closure: HashSet<ClientKey> = closure.iter().cloned().collect();
        let mut missing: HashMap<ClientKey, VectorClock> = HashMap::new();
        let mut to_check = vec![lattice];

        while let Some(lattice) = to_check.pop() {
            for (dep, required) in lattice.dependencies().iter() {
                if self.versions.covers(dep, required) || frontier.covers(dep, required) {
                    continue;
                }
                let available = self
                    .unmerged
                    .get(dep)
                    .filter(|value| value.vector_clock().dominates(required));

                if in_closure.contains(dep) {
                    if available.is_some() {
                        // admitted together with the rest of the closure
                        continue;
                    }
                    if dep == head {
                        log::error!(
                            "{}",
                            ResolveError::DependencyCycle {
                                key: head.clone(),
                                required: required.clone(),
                            }
                        );
                    }
                } else if let Some(available) = available {
                    in_closure.insert(dep.clone());
                    closure.push(dep.clone());
                    to_check.push(available.clone());
                    continue;
                }

                missing.entry(dep.clone()).or_default().merge(required);
            }
        }

        if missing.is_empty() {
            for key in &closure {
                self.admit(key);
            }
            for key in &closure {
                self.finish(key);
            }
            return;
        }

        let missing_keys: HashSet<ClientKey> = missing.keys().cloned().collect();
        for (dep, required) in missing {
            // the fetched version is too old; keys without progress are fetched below
            if in_closure.contains(&dep)
                && self.progress.contains_key(&dep)
                && !self.kvs_client.is_fetching(&dep)
            {
                self.kvs_get(dep.clone());
            }
            self.fetch(&dep, &frontier)
                .dependents
                .entry(required)
                .or_default()
                .insert(head.clone());
        }
        if let Some(progress) = self.progress.get_mut(head) {
            progress.phase = Phase::Preparing {
                missing: missing_keys,
            };
        }
    }

    /// Merges the unmerged value of `key` into the causal cut.
    fn admit(&mut self, key: &ClientKey) {
        if let Some(lattice) = self.unmerged.get(key).cloned() {
            let version = self
                .causal_cut
                .merge(key.clone(), &lattice)
                .vector_clock()
                .clone();
            self.versions.update(key.clone(), &version);
            log::info!("Admitted key {} at version {:?}", key, version);
        }
    }

    /// Ends the resolution of an admitted key and notifies everyone waiting for it.
    fn finish(&mut self, key: &ClientKey) {
        if let Some(progress) = self.progress.remove(key) {
            for request in progress.waiters {
                self.continuations.push_back(Continuation::Covered {
                    request,
                    key: key.clone(),
                });
            }
            for dependent in progress.dependents.into_values().flatten() {
                self.continuations
                    .push_back(Continuation::Resolve(dependent));
            }
        }
    }
}
