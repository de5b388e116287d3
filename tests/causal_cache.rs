use causal_cache::{
    lattice::causal::{CausalLattice, VectorClock},
    messages::{
        request::RequestData,
        response::{ResponseTuple, ResponseType},
        CausalRequest, CausalResponse, CausalTuple, ConsistencyType, KeyVersion, Request,
        Response, TcpMessage,
    },
    nodes::{
        causal_cache::{KeyState, Outbound},
        receive_tcp_message, send_tcp_message, CausalCacheNode,
    },
    topics::CacheThread,
    ClientKey, Key, LatticeType, LatticeValue,
};
use futures::{FutureExt, StreamExt};
use pretty_assertions::assert_eq;
use std::{
    collections::HashMap,
    thread,
    time::{Duration, Instant},
};

const NODE_ADDRESS: &str = "127.0.0.1:7000";

fn cache_node() -> CausalCacheNode {
    CausalCacheNode::new(
        CacheThread::new("test-node".into(), 0),
        NODE_ADDRESS.into(),
        Duration::from_secs(10),
    )
}

fn vc(pairs: &[(&str, usize)]) -> VectorClock {
    VectorClock::from_pairs(pairs.iter().copied())
}

fn request(consistency: ConsistencyType, address: &str, keys: &[&str]) -> CausalRequest {
    CausalRequest {
        id: format!("client@{}", address),
        consistency,
        tuples: keys.iter().map(|&k| CausalTuple::read(k.into())).collect(),
        response_address: address.into(),
        key_version_locations: HashMap::new(),
        future_read_set: Vec::new(),
    }
}

/// The (request id, key) pairs of all GETs in the outbox.
fn kvs_gets(outbox: &[Outbound]) -> Vec<(String, String)> {
    outbox
        .iter()
        .filter_map(|o| match o {
            Outbound::Kvs(Request {
                request_id: Some(id),
                request: RequestData::Get { keys },
                ..
            }) => Some(keys.iter().map(move |k| (id.clone(), k.to_string()))),
            _ => None,
        })
        .flatten()
        .collect()
}

fn responses(outbox: &[Outbound]) -> Vec<(String, CausalResponse)> {
    outbox
        .iter()
        .filter_map(|o| match o {
            Outbound::Respond { address, response } => Some((address.clone(), response.clone())),
            _ => None,
        })
        .collect()
}

fn get_response(request_id: &str, key: &str, lattice: CausalLattice) -> Response {
    Response {
        response_id: Some(request_id.into()),
        ty: ResponseType::Get,
        error: Ok(()),
        tuples: vec![ResponseTuple {
            key: Key::Client(key.into()),
            lattice: Some(LatticeValue::MultiCausal(lattice)),
            lattice_type: Some(LatticeType::MultiCausal),
            error: None,
        }],
    }
}

fn payload<'a>(response: &'a CausalResponse, key: &str) -> Option<&'a CausalLattice> {
    response
        .tuples
        .iter()
        .find(|t| t.key.as_str() == key)
        .and_then(|t| t.payload.as_ref())
}

#[test]
fn single_get_of_unmerged_key_needs_no_fetch() {
    let mut node = cache_node();
    node.get_request_handler(request(ConsistencyType::Single, "client:1", &["a"]));
    let gets = kvs_gets(&node.take_outbox());
    let value = CausalLattice::from_parts(vc(&[("w", 1)]), [("b".into(), vc(&[("w", 1)]))], ["x"]);
    node.kvs_response_handler(get_response(&gets[0].0, "a", value.clone()));
    node.take_outbox();

    node.get_request_handler(request(ConsistencyType::Single, "client:2", &["a"]));

    let outbox = node.take_outbox();
    assert_eq!(kvs_gets(&outbox), Vec::new());
    let responses = responses(&outbox);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "client:2");
    assert_eq!(payload(&responses[0].1, "a"), Some(&value));
}

#[test]
fn multi_get_with_local_chain_sends_nothing_else() {
    let mut node = cache_node();
    // fetch a, b and c through single-key reads first
    node.get_request_handler(request(ConsistencyType::Single, "client:0", &["a", "b", "c"]));
    let gets = kvs_gets(&node.take_outbox());
    for (id, key) in gets {
        let lattice = match key.as_str() {
            "a" => CausalLattice::from_parts(vc(&[("w", 3)]), [("b".into(), vc(&[("w", 2)]))], ["a"]),
            "b" => CausalLattice::from_parts(vc(&[("w", 2)]), [("c".into(), vc(&[("w", 1)]))], ["b"]),
            _ => CausalLattice::from_parts(vc(&[("w", 1)]), [], ["c"]),
        };
        node.kvs_response_handler(get_response(&id, &key, lattice));
    }
    node.take_outbox();

    node.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));

    let outbox = node.take_outbox();
    assert_eq!(outbox.len(), 1);
    let responses = responses(&outbox);
    assert_eq!(responses[0].0, "client:1");
    assert_eq!(
        payload(&responses[0].1, "a").map(|p| p.vector_clock()),
        Some(&vc(&[("w", 3)]))
    );
    for key in ["a", "b", "c"] {
        assert_eq!(node.key_state(key), KeyState::CausallyCut);
    }
}

#[test]
fn missing_dependency_leads_to_exactly_one_response() {
    let mut node = cache_node();
    node.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));
    let gets = kvs_gets(&node.take_outbox());
    assert_eq!(gets.len(), 1);

    node.kvs_response_handler(get_response(
        &gets[0].0,
        "a",
        CausalLattice::from_parts(vc(&[("w", 2)]), [("b".into(), vc(&[("w", 1)]))], ["a"]),
    ));
    let outbox = node.take_outbox();
    assert!(responses(&outbox).is_empty());
    let gets = kvs_gets(&outbox);
    assert_eq!(gets.iter().map(|(_, k)| k.as_str()).collect::<Vec<_>>(), vec!["b"]);
    assert_eq!(
        node.key_state("a"),
        KeyState::InPreparation {
            missing: 1,
            waiters: 1
        }
    );

    node.kvs_response_handler(get_response(
        &gets[0].0,
        "b",
        CausalLattice::from_parts(vc(&[("w", 1)]), [], ["b"]),
    ));
    let responses = responses(&node.take_outbox());
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "client:1");
    assert_eq!(node.key_state("a"), KeyState::CausallyCut);
    assert_eq!(node.key_state("b"), KeyState::CausallyCut);
    assert_eq!(node.versions().get("b"), Some(&vc(&[("w", 1)])));

    // further events do not produce another response
    node.kvs_response_handler(get_response(
        &gets[0].0,
        "b",
        CausalLattice::from_parts(vc(&[("w", 1)]), [], ["b"]),
    ));
    assert!(node.take_outbox().is_empty());
}

#[test]
fn concurrent_requests_share_one_fetch() {
    let mut node = cache_node();
    node.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));
    node.get_request_handler(request(ConsistencyType::Multi, "client:2", &["a"]));

    let gets = kvs_gets(&node.take_outbox());
    assert_eq!(gets.len(), 1);
    assert_eq!(node.key_state("a"), KeyState::Fetching);

    node.kvs_response_handler(get_response(
        &gets[0].0,
        "a",
        CausalLattice::from_parts(vc(&[("w", 1)]), [], ["a"]),
    ));

    let mut addresses: Vec<_> = responses(&node.take_outbox())
        .into_iter()
        .map(|(address, _)| address)
        .collect();
    addresses.sort();
    assert_eq!(addresses, vec!["client:1", "client:2"]);
}

#[test]
fn timeout_and_retry_reach_same_state() {
    let value = CausalLattice::from_parts(vc(&[("w", 1)]), [], ["a"]);

    let mut direct = cache_node();
    direct.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));
    let gets = kvs_gets(&direct.take_outbox());
    direct.kvs_response_handler(get_response(&gets[0].0, "a", value.clone()));
    let direct_responses = responses(&direct.take_outbox());

    let mut retried = cache_node();
    retried.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));
    let first = kvs_gets(&retried.take_outbox());
    retried.expire_kvs_requests(Instant::now() + Duration::from_secs(30));
    let second = kvs_gets(&retried.take_outbox());
    assert_eq!(second.len(), 1);
    assert_ne!(first[0].0, second[0].0);
    retried.kvs_response_handler(get_response(&second[0].0, "a", value.clone()));
    // the late answer to the first attempt is merged idempotently
    retried.kvs_response_handler(get_response(&first[0].0, "a", value.clone()));

    assert_eq!(responses(&retried.take_outbox()), direct_responses);
    assert_eq!(retried.key_state("a"), direct.key_state("a"));
    assert_eq!(retried.causal_cut().get("a"), direct.causal_cut().get("a"));
    assert_eq!(retried.versions().get("a"), direct.versions().get("a"));
}

#[test]
fn abandoned_request_does_not_affect_others() {
    let mut node = cache_node();
    // client:1 waits for a key whose dependency never arrives
    node.get_request_handler(request(ConsistencyType::Multi, "client:1", &["x"]));
    let gets = kvs_gets(&node.take_outbox());
    node.kvs_response_handler(get_response(
        &gets[0].0,
        "x",
        CausalLattice::from_parts(vc(&[("w", 1)]), [("y".into(), vc(&[("w", 1)]))], ["x"]),
    ));
    node.take_outbox();
    assert!(node.has_pending_request("client:1"));

    node.get_request_handler(request(ConsistencyType::Multi, "client:2", &["a"]));
    let gets = kvs_gets(&node.take_outbox());
    node.kvs_response_handler(get_response(
        &gets[0].0,
        "a",
        CausalLattice::from_parts(vc(&[("w", 1)]), [], ["a"]),
    ));

    let responses = responses(&node.take_outbox());
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "client:2");
    assert!(node.has_pending_request("client:1"));
}

#[test]
fn observed_versions_are_not_fetched_again() {
    let mut node = cache_node();
    let mut request = request(ConsistencyType::Multi, "client:1", &["a"]);
    request.key_version_locations.insert(
        NODE_ADDRESS.into(),
        vec![KeyVersion {
            key: "b".into(),
            vector_clock: vc(&[("w", 4)]),
        }],
    );
    node.get_request_handler(request);
    let gets = kvs_gets(&node.take_outbox());

    // a depends on an older b than the client has seen already
    node.kvs_response_handler(get_response(
        &gets[0].0,
        "a",
        CausalLattice::from_parts(vc(&[("w", 5)]), [("b".into(), vc(&[("w", 3)]))], ["a"]),
    ));

    let outbox = node.take_outbox();
    assert_eq!(kvs_gets(&outbox), Vec::new());
    assert_eq!(responses(&outbox).len(), 1);
    assert_eq!(node.key_state("b"), KeyState::Unseen);
}

#[test]
fn peer_request_is_answered_from_causal_cut() {
    let mut node = cache_node();
    node.get_request_handler(request(ConsistencyType::Multi, "client:1", &["a"]));
    let gets = kvs_gets(&node.take_outbox());
    let value = CausalLattice::from_parts(vc(&[("w", 2)]), [], ["a"]);
    node.kvs_response_handler(get_response(&gets[0].0, "a", value.clone()));
    node.take_outbox();

    let peer_request = CausalRequest {
        id: "client@elsewhere".into(),
        consistency: ConsistencyType::Multi,
        tuples: vec![CausalTuple::read("a".into())],
        response_address: "127.0.0.1:7101".into(),
        key_version_locations: HashMap::new(),
        future_read_set: Vec::new(),
    };
    node.handle_message(TcpMessage::CausalGet(peer_request));

    let responses = responses(&node.take_outbox());
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "127.0.0.1:7101");
    assert_eq!(responses[0].1.id, "client@elsewhere");
    assert_eq!(payload(&responses[0].1, "a"), Some(&value));
}

#[test]
fn remote_reads_from_one_peer_are_answered_separately() {
    let mut node = cache_node();
    // a peer cache thread sends its remote reads with its own address
    let peer = "10.0.0.2:7000";
    for (id, key) in [("client-1", "a"), ("client-2", "b")] {
        let mut remote_read = request(ConsistencyType::Multi, peer, &[key]);
        remote_read.id = id.into();
        node.handle_message(TcpMessage::CausalGet(remote_read));
    }

    let gets = kvs_gets(&node.take_outbox());
    assert_eq!(gets.len(), 2);
    for (request_id, key) in &gets {
        node.kvs_response_handler(get_response(
            request_id,
            key,
            CausalLattice::from_parts(vc(&[("w", 1)]), [], [key.as_str()]),
        ));
    }

    let mut answered: Vec<_> = responses(&node.take_outbox())
        .into_iter()
        .map(|(address, response)| {
            assert_eq!(address, peer);
            response.id
        })
        .collect();
    answered.sort();
    assert_eq!(answered, vec!["client-1", "client-2"]);
    assert!(!node.has_pending_request(peer));
}

#[test]
fn stale_dependency_is_fetched_once() {
    let mut node = cache_node();
    // single-key reads leave a, b and c unmerged
    node.get_request_handler(request(ConsistencyType::Single, "client:1", &["a", "b", "c"]));
    let gets = kvs_gets(&node.take_outbox());
    for (request_id, key) in &gets {
        let value = match key.as_str() {
            "a" => CausalLattice::from_parts(
                vc(&[("w", 3)]),
                [("b".into(), vc(&[("w", 1)])), ("c".into(), vc(&[("w", 1)]))],
                ["a"],
            ),
            "c" => CausalLattice::from_parts(vc(&[("w", 1)]), [("b".into(), vc(&[("w", 2)]))], ["c"]),
            _ => CausalLattice::from_parts(vc(&[("w", 1)]), [], ["b"]),
        };
        node.kvs_response_handler(get_response(request_id, key, value));
    }
    assert_eq!(responses(&node.take_outbox()).len(), 1);

    // c needs a newer b than the unmerged one
    node.get_request_handler(request(ConsistencyType::Multi, "client:2", &["a"]));
    let refetch = kvs_gets(&node.take_outbox());
    assert_eq!(
        refetch.iter().map(|(_, key)| key.as_str()).collect::<Vec<_>>(),
        vec!["b"]
    );
    assert_eq!(node.key_state("b"), KeyState::Fetching);

    node.kvs_response_handler(get_response(
        &refetch[0].0,
        "b",
        CausalLattice::from_parts(vc(&[("w", 2)]), [], ["b2"]),
    ));
    let outbox = node.take_outbox();
    assert_eq!(kvs_gets(&outbox), Vec::new());
    let responses = responses(&outbox);
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].0, "client:2");
    for key in ["a", "b", "c"] {
        assert_eq!(node.key_state(key), KeyState::CausallyCut);
    }
}

#[test]
fn get_and_put_over_tcp() {
    let _ = set_up_logger();

    smol::block_on(async {
        let kvs_listener = smol::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let kvs_address = kvs_listener.local_addr().unwrap();
        let client_listener = smol::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let client_address = client_listener.local_addr().unwrap();
        let node_address = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap();

        let (shutdown_tx, shutdown_rx) = smol::channel::bounded::<()>(1);
        let node_thread = thread::spawn(move || {
            let node = CausalCacheNode::new(
                CacheThread::new("tcp-node".into(), 0),
                node_address.to_string(),
                Duration::from_secs(10),
            );
            let mut shutdown_rx = shutdown_rx;
            smol::block_on(node.run(
                node_address,
                kvs_address,
                Duration::from_secs(3600),
                shutdown_rx.next().map(|_| ()),
            ))
        });

        let (mut kvs, _) = kvs_listener.accept().await.unwrap();
        let mut node = smol::net::TcpStream::connect(node_address).await.unwrap();

        let mut get = request(ConsistencyType::Multi, &client_address.to_string(), &["a"]);
        get.id = "tcp-client".into();
        send_tcp_message(&TcpMessage::CausalGet(get), &mut node)
            .await
            .unwrap();

        let value = CausalLattice::from_parts(vc(&[("w", 1)]), [], ["hello"]);
        match receive_tcp_message(&mut kvs).await.unwrap() {
            Some(TcpMessage::KvsRequest(Request {
                request_id,
                request: RequestData::Get { keys },
                ..
            })) => {
                assert_eq!(keys, vec![Key::Client("a".into())]);
                let response = get_response(&request_id.unwrap(), "a", value.clone());
                send_tcp_message(&TcpMessage::KvsResponse(response), &mut kvs)
                    .await
                    .unwrap();
            }
            other => panic!("unexpected message {:?}", other),
        }

        let (mut client, _) = client_listener.accept().await.unwrap();
        match receive_tcp_message(&mut client).await.unwrap() {
            Some(TcpMessage::CausalResponse(response)) => {
                assert_eq!(response.id, "tcp-client");
                assert_eq!(payload(&response, "a"), Some(&value));
                assert_eq!(response.versions_address, Some(node_address.to_string()));
            }
            other => panic!("unexpected message {:?}", other),
        }

        let mut put = request(ConsistencyType::Multi, &client_address.to_string(), &[]);
        put.id = "tcp-client".into();
        put.tuples.push(CausalTuple {
            key: "b".into(),
            payload: Some(CausalLattice::from_parts(vc(&[("tcp-client", 1)]), [], ["v"])),
        });
        send_tcp_message(&TcpMessage::CausalPut(put), &mut node)
            .await
            .unwrap();

        match receive_tcp_message(&mut kvs).await.unwrap() {
            Some(TcpMessage::KvsRequest(Request {
                request_id,
                request: RequestData::Put { tuples },
                ..
            })) => {
                let key = ClientKey::try_from(tuples[0].key.clone()).unwrap();
                assert_eq!(key.as_str(), "b");
                let response = Response {
                    response_id: request_id,
                    ty: ResponseType::Put,
                    error: Ok(()),
                    tuples: vec![ResponseTuple {
                        key: key.into(),
                        lattice: None,
                        lattice_type: Some(LatticeType::MultiCausal),
                        error: None,
                    }],
                };
                send_tcp_message(&TcpMessage::KvsResponse(response), &mut kvs)
                    .await
                    .unwrap();
            }
            other => panic!("unexpected message {:?}", other),
        }

        match receive_tcp_message(&mut client).await.unwrap() {
            Some(TcpMessage::CausalResponse(response)) => {
                assert_eq!(response.tuples, vec![CausalTuple::read("b".into())]);
            }
            other => panic!("unexpected message {:?}", other),
        }

        shutdown_tx.close();
        node_thread.join().unwrap().unwrap();
    });
}

fn set_up_logger() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.target(),
                record.level(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .apply()?;
    Ok(())
}
