//! The causal cache thread.
//!
//! A [`CausalCacheNode`] keeps three stores: the _unmerged_ store with values fetched from
//! the key-value store, the _causal cut_ with values whose dependencies are all visible, and
//! the admitted version of each key in the cut. Single-key reads are served from the unmerged
//! store, multi-key reads from the causal cut.
//!
//! All handlers are synchronous. Messages that should be sent are collected as [`Outbound`]
//! values, which the event loop in [`CausalCacheNode::run`] sends out after each handler.

pub use self::{frontier::CausalFrontier, resolver::ResolveError};

use self::{
    kvs_client::KvsClient,
    pending::{PendingClientMetadata, RequestKey},
    resolver::{KeyProgress, Phase},
};
use super::{receive_tcp_message, send_tcp_message};
use crate::{
    config::Config,
    messages::{
        request::{PutTuple, RequestData},
        Address, CausalRequest, CausalResponse, Request, TcpMessage,
    },
    store::{LatticeStore, VersionStore},
    topics::CacheThread,
    ClientKey, Key, LatticeValue,
};
use eyre::Context;
use futures::{
    future::FusedFuture,
    stream::{self, SelectAll},
    Future, FutureExt, StreamExt,
};
use smol::net::{TcpListener, TcpStream};
use std::{
    collections::{hash_map, HashMap, HashSet, VecDeque},
    mem,
    net::SocketAddr,
    time::{Duration, Instant},
};

mod dispatch;
mod frontier;
mod handlers;
mod kvs_client;
mod pending;
mod report;
mod resolver;

/// Interval at which outstanding requests to the key-value store are checked for timeouts.
const TIMEOUT_CHECK_PERIOD: Duration = Duration::from_secs(1);

/// Starts a new multithreaded cache node based on the given config.
///
/// Spawns `config.threads` cache threads and returns when one of them fails.
pub fn run(config: &Config, node_id: String) -> eyre::Result<()> {
    log::info!("Node {} starting up..", node_id);

    let report_period = Duration::from_secs(config.report_period_secs);
    let kvs_timeout = Duration::from_secs(config.kvs_timeout_secs);

    crossbeam_utils::thread::scope(|s| {
        let (shutdown_tx, shutdown) = smol::channel::unbounded::<()>();
        let (result_tx, task_errors) = smol::channel::unbounded();

        for thread_id in 0..config.threads {
            let ct = CacheThread::new(node_id.clone(), thread_id);
            let result_tx = result_tx.clone();
            let mut shutdown = shutdown.clone();

            let task = async move {
                let listen_address = ct.listen_address(config)?;
                let node =
                    CausalCacheNode::new(ct.clone(), listen_address.to_string(), kvs_timeout);
                node.run(
                    listen_address,
                    config.kvs_address,
                    report_period,
                    shutdown.next().map(|_| ()),
                )
                .await
                .with_context(|| format!("cache thread {} failed", ct.cache_id()))
            };
            s.spawn(move |_| {
                smol::block_on(async {
                    if let Err(err) = task.await {
                        let _ = result_tx.send(err).await;
                    }
                })
            });
        }

        mem::drop(result_tx);
        mem::drop(shutdown);

        smol::block_on(task_errors.recv().map(|recv_result| match recv_result {
            Ok(error) => {
                shutdown_tx.close();
                Err(error)
            }
            Err(smol::channel::RecvError) => Ok(()),
        }))
    })
    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
}

/// A causal cache thread.
#[derive(Debug)]
pub struct CausalCacheNode {
    ct: CacheThread,
    /// The address at which this thread receives messages.
    ///
    /// Sent as response address to peers and to the key-value store.
    address: Address,

    /// Values fetched from the key-value store whose dependencies are not checked yet.
    unmerged: LatticeStore,
    /// Values whose dependencies are all part of the cut.
    causal_cut: LatticeStore,
    /// The version of each key in `causal_cut`.
    versions: VersionStore,

    /// Resolution progress of keys that are fetched or prepared for the causal cut.
    progress: HashMap<ClientKey, KeyProgress>,
    /// Work that handlers schedule for later in the same event.
    continuations: VecDeque<Continuation>,

    /// Single-key requests waiting for a fetch of the key.
    single_key_callbacks: HashMap<ClientKey, HashSet<RequestKey>>,
    pending_single: HashMap<RequestKey, PendingClientMetadata>,
    pending_multi: HashMap<RequestKey, PendingClientMetadata>,
    /// Routes peer responses, which carry the client ID, to the waiting requests.
    remote_readers: HashMap<String, HashSet<RequestKey>>,
    /// Client PUTs that wait for the acknowledgement of the key-value store.
    pending_puts: HashMap<String, PendingPut>,

    /// All keys that clients read through this thread.
    key_set: HashSet<ClientKey>,

    kvs_client: KvsClient,
    /// A monotonically increasing integer used for creating request IDs.
    request_id: u32,

    outbox: Vec<Outbound>,
}

/// A message that a handler wants to send.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A request to the key-value store.
    Kvs(Request),
    /// A response to a client or to a peer cache thread.
    Respond {
        /// The response address of the answered request.
        address: Address,
        /// The response.
        response: CausalResponse,
    },
    /// A remote read from a peer cache thread.
    PeerRequest {
        /// The address of the peer cache thread.
        address: Address,
        /// The request, answered by a [`TcpMessage::CausalResponse`].
        request: CausalRequest,
    },
}

/// Work scheduled by the resolver, processed in FIFO order.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Continuation {
    /// Try to admit the key to the causal cut.
    Resolve(ClientKey),
    /// The key was admitted; the multi-key request no longer waits for it.
    Covered { request: RequestKey, key: ClientKey },
}

#[derive(Debug, Clone)]
struct PendingPut {
    address: Address,
    client_id: String,
}

/// The state of a key from the perspective of a cache thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyState {
    /// The key was never fetched.
    Unseen,
    /// A fetch for the key is outstanding.
    Fetching,
    /// A value was fetched, but it was not checked for causal consistency.
    Unmerged,
    /// The key waits for missing dependencies before it can enter the causal cut.
    InPreparation {
        /// The number of dependency keys that are missing.
        missing: usize,
        /// The number of multi-key requests that wait for the key.
        waiters: usize,
    },
    /// The key is part of the causal cut.
    CausallyCut,
}

impl CausalCacheNode {
    /// Creates a new cache thread that is reachable at `address`.
    ///
    /// Requests to the key-value store that are not answered within `kvs_timeout` are
    /// reported as timed out by [`Self::expire_kvs_requests`].
    pub fn new(ct: CacheThread, address: Address, kvs_timeout: Duration) -> Self {
        Self {
            ct,
            address,
            unmerged: Default::default(),
            causal_cut: Default::default(),
            versions: Default::default(),
            progress: Default::default(),
            continuations: Default::default(),
            single_key_callbacks: Default::default(),
            pending_single: Default::default(),
            pending_multi: Default::default(),
            remote_readers: Default::default(),
            pending_puts: Default::default(),
            key_set: Default::default(),
            kvs_client: KvsClient::new(kvs_timeout),
            request_id: 0,
            outbox: Vec::new(),
        }
    }

    /// The address at which this thread receives messages.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the state of the given key.
    pub fn key_state(&self, key: &str) -> KeyState {
        match self.progress.get(key) {
            Some(KeyProgress {
                phase: Phase::Fetching,
                ..
            }) => KeyState::Fetching,
            Some(KeyProgress {
                phase: Phase::Preparing { missing },
                waiters,
                ..
            }) => KeyState::InPreparation {
                missing: missing.len(),
                waiters: waiters.len(),
            },
            None if self.causal_cut.contains_key(key) => KeyState::CausallyCut,
            None if self.unmerged.contains_key(key) => KeyState::Unmerged,
            None => KeyState::Unseen,
        }
    }

    /// The values that are served to multi-key reads.
    pub fn causal_cut(&self) -> &LatticeStore {
        &self.causal_cut
    }

    /// The fetched values, served to single-key reads.
    pub fn unmerged(&self) -> &LatticeStore {
        &self.unmerged
    }

    /// The admitted version of each key in the causal cut.
    pub fn versions(&self) -> &VersionStore {
        &self.versions
    }

    /// Returns `true` if a request with the given response address was not answered yet.
    pub fn has_pending_request(&self, address: &str) -> bool {
        self.pending_single
            .keys()
            .chain(self.pending_multi.keys())
            .any(|request| request.address == address)
    }

    /// Returns all messages that the handlers produced since the last call.
    pub fn take_outbox(&mut self) -> Vec<Outbound> {
        mem::take(&mut self.outbox)
    }

    /// Handles a message received over TCP.
    pub fn handle_message(&mut self, message: TcpMessage) {
        match message {
            TcpMessage::CausalGet(request) => self.get_request_handler(request),
            TcpMessage::CausalPut(request) => self.put_request_handler(request),
            TcpMessage::CausalResponse(response) => self.causal_response_handler(response),
            TcpMessage::KvsResponse(response) => self.kvs_response_handler(response),
            TcpMessage::KvsRequest(request) => log::warn!(
                "Cache thread {} received a key-value store request: {:?}",
                self.ct.cache_id(),
                request
            ),
        }
    }

    /// Reports all requests to the key-value store that were sent before `now` minus the
    /// timeout as failed.
    pub fn expire_kvs_requests(&mut self, now: Instant) {
        for response in self.kvs_client.expire(now) {
            self.kvs_response_handler(response);
        }
    }

    fn generate_request_id(&mut self) -> String {
        self.request_id = self.request_id.wrapping_add(1);
        format!("{}_{}", self.ct.cache_id(), self.request_id)
    }

    fn send_kvs(&mut self, request: RequestData) -> String {
        let request_id = self.generate_request_id();
        let request = Request {
            request_id: Some(request_id.clone()),
            response_address: Some(self.address.clone()),
            request,
        };
        self.kvs_client.track(&request, Instant::now());
        self.outbox.push(Outbound::Kvs(request));
        request_id
    }

    /// Issues a GET for the given key.
    fn kvs_get(&mut self, key: ClientKey) -> String {
        self.send_kvs(RequestData::Get {
            keys: vec![key.into()],
        })
    }

    /// Issues a PUT of the given value.
    fn kvs_put(&mut self, key: Key, value: LatticeValue) -> String {
        self.send_kvs(RequestData::Put {
            tuples: vec![PutTuple::new(key, value)],
        })
    }

    /// Processes scheduled resolver work until none is left.
    fn drain_continuations(&mut self) {
        while let Some(continuation) = self.continuations.pop_front() {
            match continuation {
                Continuation::Resolve(key) => self.resolve(&key),
                Continuation::Covered { request, key } => self.key_covered(&request, &key),
            }
        }
    }

    /// Runs the event loop of the cache thread.
    ///
    /// Listens on `listen_address`, keeps a connection to the key-value store at
    /// `kvs_address`, and reports the cached keys every `report_period`.
    pub async fn run(
        mut self,
        listen_address: SocketAddr,
        kvs_address: SocketAddr,
        report_period: Duration,
        mut shutdown_signal: impl Future<Output = ()> + FusedFuture + Unpin,
    ) -> eyre::Result<()> {
        let tcp_listener = TcpListener::bind(listen_address)
            .await
            .with_context(|| format!("failed to bind TCP listener to {}", listen_address))?;
        let mut tcp_incoming = tcp_listener.incoming().fuse();

        let kvs = TcpStream::connect(kvs_address)
            .await
            .with_context(|| format!("failed to connect to key-value store at {}", kvs_address))?;
        kvs.set_nodelay(true)
            .context("failed to set nodelay for key-value store tcp stream")?;

        let mut tcp_streams = SelectAll::new();
        let unfold_stream = |mut stream: TcpStream| {
            Box::pin(async move {
                let message = receive_tcp_message(&mut stream).await?;
                Result::<_, eyre::Error>::Ok(message.map(|m| (m, stream)))
            })
        };
        tcp_streams.push(stream::try_unfold(kvs.clone(), unfold_stream));
        let mut connections = Connections::new(kvs);

        let mut report_timer = futures_timer::Delay::new(report_period).fuse();
        let mut timeout_timer = futures_timer::Delay::new(TIMEOUT_CHECK_PERIOD).fuse();

        log::info!(
            "Cache thread {} listening on {}",
            self.ct.cache_id(),
            listen_address
        );

        loop {
            futures::select! {
                listen_result = tcp_incoming.select_next_some() => {
                    let tcp_stream = listen_result
                        .context("failed to listen for new TCP connection")?;
                    tcp_stream.set_nodelay(true)
                        .context("failed to set nodelay for client tcp stream")?;
                    tcp_streams.push(stream::try_unfold(tcp_stream, unfold_stream));
                }
                message = tcp_streams.select_next_some() => match message {
                    Ok(message) => self.handle_message(message),
                    Err(err) => log::warn!("failed to receive message: {:?}", err),
                },
                () = report_timer => {
                    self.report_cached_keys().context("failed to report cached keys")?;
                    report_timer = futures_timer::Delay::new(report_period).fuse();
                },
                () = timeout_timer => {
                    self.expire_kvs_requests(Instant::now());
                    timeout_timer = futures_timer::Delay::new(TIMEOUT_CHECK_PERIOD).fuse();
                },
                () = shutdown_signal => break,
                complete => break,
            }

            self.flush_outbox(&mut connections)
                .await
                .context("failed to send messages")?;
        }

        Ok(())
    }

    async fn flush_outbox(&mut self, connections: &mut Connections) -> eyre::Result<()> {
        for outbound in self.take_outbox() {
            match outbound {
                Outbound::Kvs(request) => {
                    send_tcp_message(&TcpMessage::KvsRequest(request), &mut connections.kvs)
                        .await
                        .context("failed to send request to key-value store")?
                }
                Outbound::Respond { address, response } => {
                    connections
                        .send(&address, &TcpMessage::CausalResponse(response))
                        .await
                }
                Outbound::PeerRequest { address, request } => {
                    connections
                        .send(&address, &TcpMessage::CausalGet(request))
                        .await
                }
            }
        }
        Ok(())
    }
}

/// Outgoing TCP connections of a cache thread.
struct Connections {
    kvs: TcpStream,
    /// Connections to clients and peer cache threads, opened on first use.
    others: HashMap<Address, TcpStream>,
}

impl Connections {
    fn new(kvs: TcpStream) -> Self {
        Self {
            kvs,
            others: HashMap::new(),
        }
    }

    /// Sends the message to the given address.
    ///
    /// Clients may disappear at any time, so failures are only logged.
    async fn send(&mut self, address: &str, message: &TcpMessage) {
        if let Err(err) = self.try_send(address, message).await {
            log::warn!("failed to send message to {}: {:?}", address, err);
            self.others.remove(address);
        }
    }

    async fn try_send(&mut self, address: &str, message: &TcpMessage) -> eyre::Result<()> {
        let stream = match self.others.entry(address.to_owned()) {
            hash_map::Entry::Occupied(entry) => entry.into_mut(),
            hash_map::Entry::Vacant(entry) => {
                let socket: SocketAddr = address
                    .parse()
                    .with_context(|| format!("invalid response address `{}`", address))?;
                let stream = TcpStream::connect(socket)
                    .await
                    .with_context(|| format!("failed to connect to {}", socket))?;
                stream
                    .set_nodelay(true)
                    .context("failed to set nodelay for tcp stream")?;
                entry.insert(stream)
            }
        };
        send_tcp_message(message, stream).await
    }
}

#[cfg(test)]
pub(crate) fn causal_cache_test_instance() -> CausalCacheNode {
    CausalCacheNode::new(
        CacheThread::new("cache".into(), 0),
        "127.0.0.1:7000".into(),
        Duration::from_secs(10),
    )
}
