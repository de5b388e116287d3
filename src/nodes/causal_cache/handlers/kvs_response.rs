use crate::{
    lattice::causal::CausalLattice,
    messages::{
        request::{PutTuple, RequestData},
        response::{ResponseTuple, ResponseType},
        CausalResponse, CausalTuple, Response,
    },
    nodes::causal_cache::{
        resolver::{Phase, ResolveError},
        CausalCacheNode, Continuation, Outbound,
    },
    ClientKey, KvsError, LatticeType, LatticeValue,
};

impl CausalCacheNode {
    /// Handles a response of the key-value store.
    pub fn kvs_response_handler(&mut self, response: Response) {
        self.kvs_client.complete(response.response_id.as_deref());

        match (response.error, response.ty) {
            (Ok(()), ResponseType::Get) => {
                for tuple in response.tuples {
                    self.process_get_tuple(tuple);
                }
            }
            (Ok(()), ResponseType::Put) => self.process_put_response(response),
            (Err(KvsError::Timeout), ResponseType::Get) => {
                for tuple in response.tuples {
                    match ClientKey::try_from(tuple.key) {
                        Ok(key) => {
                            log::info!("GET of key {} timed out, retrying", key);
                            self.kvs_get(key);
                        }
                        Err(err) => log::warn!("dropping timed out GET: {}", err),
                    }
                }
            }
            (Err(KvsError::Timeout), ResponseType::Put) => self.retry_put(response),
            (Err(err), ty) => log::error!(
                "{:?} request {:?} failed: {}",
                ty,
                response.response_id,
                err
            ),
        }

        self.drain_continuations();
    }

    fn process_get_tuple(&mut self, tuple: ResponseTuple) {
        let key = match ClientKey::try_from(tuple.key) {
            Ok(key) => key,
            Err(err) => {
                log::warn!("ignoring GET response tuple: {}", err);
                return;
            }
        };

        let lattice = match (tuple.error, tuple.lattice) {
            (None, Some(LatticeValue::MultiCausal(lattice))) => lattice,
            (None, Some(other)) => {
                log::error!(
                    "{}",
                    ResolveError::UnexpectedLattice {
                        key: key.clone(),
                        ty: other.ty(),
                    }
                );
                CausalLattice::default()
            }
            // a key that does not exist yet reads as the empty value
            (Some(KvsError::KeyDoesNotExist), _) | (None, None) => CausalLattice::default(),
            (Some(err), _) => {
                log::warn!("GET of key {} failed: {}, retrying", key, err);
                self.kvs_get(key);
                return;
            }
        };
        self.unmerged.merge(key.clone(), &lattice);

        if let Some(requests) = self.single_key_callbacks.remove(&key) {
            for request in requests {
                let is_complete = match self.pending_single.get_mut(&request) {
                    Some(pending) => pending.cover(&key),
                    None => false,
                };
                if is_complete {
                    self.respond_single(&request);
                }
            }
        }

        let progress = match self.progress.get_mut(&key) {
            Some(progress) => progress,
            None => return,
        };
        if progress.phase == Phase::Fetching && progress.is_idle() {
            // nobody waits for the key to enter the causal cut
            self.progress.remove(&key);
            return;
        }
        if progress.phase == Phase::Fetching {
            progress.phase = Phase::Preparing {
                missing: Default::default(),
            };
        }
        let dependents: Vec<ClientKey> = progress.dependent_keys().cloned().collect();

        self.continuations
            .push_back(Continuation::Resolve(key.clone()));
        self.continuations
            .extend(dependents.into_iter().map(Continuation::Resolve));
    }

    fn process_put_response(&mut self, response: Response) {
        let request_id = response.response_id.unwrap_or_default();
        match self.pending_puts.remove(&request_id) {
            Some(put) => {
                log::info!("PUT {} of client {} succeeded", request_id, put.client_id);
                let tuples = response
                    .tuples
                    .into_iter()
                    .filter_map(|t| ClientKey::try_from(t.key).ok())
                    .map(CausalTuple::read)
                    .collect();
                self.outbox.push(Outbound::Respond {
                    address: put.address,
                    response: CausalResponse {
                        id: put.client_id,
                        tuples,
                        versions_address: None,
                    },
                });
            }
            None => {
                for tuple in response.tuples {
                    if tuple.lattice_type != Some(LatticeType::Lww) {
                        log::error!("{}", ResolveError::UntrackedPut { key: tuple.key });
                    }
                }
            }
        }
    }

    /// Reissues a timed out client PUT. Internal PUTs are not retried.
    fn retry_put(&mut self, response: Response) {
        let request_id = response.response_id.unwrap_or_default();
        let put = match self.pending_puts.remove(&request_id) {
            Some(put) => put,
            None => {
                for tuple in response.tuples {
                    if tuple.lattice_type != Some(LatticeType::Lww) {
                        log::error!("{}", ResolveError::UntrackedPut { key: tuple.key });
                    }
                }
                return;
            }
        };

        let tuples = response
            .tuples
            .into_iter()
            .filter_map(|t| match (t.key, t.lattice) {
                (key, Some(value)) => Some(PutTuple::new(key, value)),
                (key, None) => {
                    log::warn!("cannot retry PUT of key {} without its value", key);
                    None
                }
            })
            .collect();
        log::info!("PUT {} timed out, retrying", request_id);
        let new_id = self.send_kvs(RequestData::Put { tuples });
        self.pending_puts.insert(new_id, put);
    }
}
