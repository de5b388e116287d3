use crate::{
    messages::CausalRequest,
    nodes::causal_cache::{CausalCacheNode, PendingPut},
    LatticeValue,
};

impl CausalCacheNode {
    /// Handles a PUT request of a client.
    ///
    /// Every tuple is written to the key-value store with its own request. The client gets
    /// one acknowledgement per written key.
    pub fn put_request_handler(&mut self, request: CausalRequest) {
        for tuple in request.tuples {
            let payload = match tuple.payload {
                Some(payload) => payload,
                None => {
                    log::warn!(
                        "Ignoring PUT of key {} from {} without payload",
                        tuple.key,
                        request.response_address
                    );
                    continue;
                }
            };

            let request_id = self.kvs_put(tuple.key.into(), LatticeValue::MultiCausal(payload));
            self.pending_puts.insert(
                request_id,
                PendingPut {
                    address: request.response_address.clone(),
                    client_id: request.id.clone(),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        lattice::causal::CausalLattice,
        messages::{
            request::RequestData,
            response::{ResponseTuple, ResponseType},
            CausalTuple, ConsistencyType, Request, Response,
        },
        nodes::causal_cache::{causal_cache_test_instance, test_util::*, Outbound},
        ClientKey, KvsError, LatticeType, LatticeValue,
    };
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn put_request(key: &str, payload: Option<CausalLattice>) -> crate::messages::CausalRequest {
        let mut request = read_request(ConsistencyType::Single, "client:1", &[]);
        request.tuples.push(CausalTuple {
            key: key.into(),
            payload,
        });
        request
    }

    fn sent_puts(outbox: &[Outbound]) -> Vec<(String, ClientKey)> {
        outbox
            .iter()
            .filter_map(|o| match o {
                Outbound::Kvs(Request {
                    request_id: Some(id),
                    request: RequestData::Put { tuples },
                    ..
                }) => Some((id.clone(), tuples[0].key.clone().try_into().ok()?)),
                _ => None,
            })
            .collect()
    }

    fn put_ack(id: &str, key: &str) -> Response {
        Response {
            response_id: Some(id.into()),
            ty: ResponseType::Put,
            error: Ok(()),
            tuples: vec![ResponseTuple {
                key: ClientKey::from(key).into(),
                lattice: None,
                lattice_type: Some(LatticeType::MultiCausal),
                error: None,
            }],
        }
    }

    #[test]
    fn put_is_acknowledged_after_store_response() {
        let mut node = causal_cache_test_instance();
        let value = CausalLattice::from_parts(vc(&[("client", 1)]), [], ["v"]);
        node.put_request_handler(put_request("a", Some(value.clone())));

        let outbox = node.take_outbox();
        let puts = sent_puts(&outbox);
        assert_eq!(puts.len(), 1);
        assert_eq!(puts[0].1, ClientKey::from("a"));
        match &outbox[0] {
            Outbound::Kvs(Request {
                request: RequestData::Put { tuples },
                ..
            }) => {
                assert_eq!(tuples[0].value, LatticeValue::MultiCausal(value));
                assert_eq!(tuples[0].lattice_type, LatticeType::MultiCausal);
            }
            other => panic!("unexpected message {:?}", other),
        }

        node.kvs_response_handler(put_ack(&puts[0].0, "a"));

        let acks = responses(&node.take_outbox());
        assert_eq!(acks.len(), 1);
        assert_eq!(acks[0].0, "client:1");
        assert_eq!(acks[0].1.tuples, vec![CausalTuple::read("a".into())]);

        // a duplicate acknowledgement is not forwarded again
        node.kvs_response_handler(put_ack(&puts[0].0, "a"));
        assert!(responses(&node.take_outbox()).is_empty());
    }

    #[test]
    fn timed_out_put_is_retried_with_same_value() {
        let mut node = causal_cache_test_instance();
        let value = CausalLattice::from_parts(vc(&[("client", 1)]), [], ["v"]);
        node.put_request_handler(put_request("a", Some(value)));
        let first = sent_puts(&node.take_outbox());

        node.expire_kvs_requests(Instant::now() + Duration::from_secs(60));
        let outbox = node.take_outbox();
        let retried = sent_puts(&outbox);
        assert_eq!(retried.len(), 1);
        assert_ne!(retried[0].0, first[0].0);
        assert_eq!(retried[0].1, ClientKey::from("a"));
        assert!(responses(&outbox).is_empty());

        node.kvs_response_handler(put_ack(&retried[0].0, "a"));
        assert_eq!(responses(&node.take_outbox()).len(), 1);
    }

    #[test]
    fn put_without_payload_is_ignored() {
        let mut node = causal_cache_test_instance();
        node.put_request_handler(put_request("a", None));
        assert!(node.take_outbox().is_empty());

        let mut failed = put_ack("x", "a");
        failed.error = Err(KvsError::Lattice);
        node.kvs_response_handler(failed);
        assert!(node.take_outbox().is_empty());
    }
}
