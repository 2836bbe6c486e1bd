//! Kademlia RPC engine.

pub mod config;
mod info;
mod lookup;
mod pending;
mod response;
mod state;
mod store_query;
pub mod transport;

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use flume::Sender;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use crate::common::{
    AddOutcome, Command, Id, Message, Node, Nonce, RoutingTable, StoredValue, FALSE, TRUE, VALUE,
};
use crate::storage::{MemoryStorage, Storage};
use crate::Error;

use lookup::{Goal, Lookup};
use store_query::StoreQuery;

pub use config::Config;
pub use info::Info;
pub use pending::{PendingRequest, PendingRequests};
pub use response::{CallError, CallResponse, CallResult, FindValueResponse, Reply};
pub use state::State;
pub use transport::{MemoryNetwork, MemoryTransport, Transport, UdpTransport, MAX_DATAGRAM_SIZE};

/// Upper bound on datagrams handled by a single [Rpc::tick], so timeouts
/// still fire under sustained traffic.
const MAX_DATAGRAMS_PER_TICK: usize = 64;

#[derive(Debug)]
/// Kademlia protocol engine.
///
/// A single threaded state machine: datagrams are handled, timeouts fired,
/// lookups advanced and maintenance performed when [Rpc::tick] is called.
pub struct Rpc {
    signing_key: SigningKey,
    node: Node,
    routing_table: RoutingTable,
    pending: PendingRequests,
    storage: Box<dyn Storage>,
    transport: Box<dyn Transport>,

    lookups: Vec<Lookup>,
    store_queries: Vec<StoreQuery>,

    /// Nonces of FIND_NODE requests sent by [Rpc::refresh_table].
    refresh_lookups: HashSet<Nonce>,
    /// Last time we refreshed the routing table.
    last_refresh: Instant,
    /// Last time we saved our state.
    last_state_save: Instant,

    // Options
    k: usize,
    alpha: usize,
    refresh_interval: Duration,
    bucket_stale_after: Duration,
    state_path: Option<PathBuf>,
    save_state_interval: Duration,
}

impl Rpc {
    /// Create a new Rpc, binding a [UdpTransport] unless a transport is configured,
    /// and pinging the configured bootstrap addresses.
    pub fn new(config: Config) -> io::Result<Self> {
        let transport: Box<dyn Transport> = match config.transport {
            Some(transport) => transport,
            None => Box::new(UdpTransport::bind(SocketAddr::new(
                config.bind_address,
                config.port.unwrap_or(0),
            ))?),
        };

        let signing_key = config
            .signing_key
            .unwrap_or_else(|| SigningKey::from_bytes(&rand::thread_rng().gen()));

        let address = config
            .public_address
            .unwrap_or_else(|| transport.local_addr());

        let node = Node::from_signing_key(&signing_key, address).with_metadata(config.metadata);

        let storage = config.storage.unwrap_or_else(|| {
            Box::new(MemoryStorage::new(
                NonZeroUsize::new(config.max_keywords).unwrap_or(NonZeroUsize::MIN),
            ))
        });

        let now = Instant::now();

        let mut rpc = Rpc {
            signing_key,
            routing_table: RoutingTable::with_bucket_size(*node.id(), config.k),
            pending: PendingRequests::new(config.request_timeout),
            node,
            storage,
            transport,

            lookups: Vec::new(),
            store_queries: Vec::new(),

            refresh_lookups: HashSet::new(),
            last_refresh: now,
            last_state_save: now,

            k: config.k,
            alpha: config.alpha,
            refresh_interval: config.refresh_interval,
            bucket_stale_after: config.bucket_stale_after,
            state_path: config.state_path,
            save_state_interval: config.save_state_interval,
        };

        if !config.bootstrap.is_empty() {
            rpc.bootstrap(&config.bootstrap);
        }

        Ok(rpc)
    }

    // === Getters ===

    /// Returns the node's Id
    pub fn id(&self) -> &Id {
        self.node.id()
    }

    /// This node's own contact, sent as the sender of every message.
    pub fn node(&self) -> &Node {
        &self.node
    }

    /// Returns the address the transport is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.transport.local_addr()
    }

    /// Contacts we know, bucketed by the prefix they share with our id.
    pub fn routing_table(&self) -> &RoutingTable {
        &self.routing_table
    }

    /// Records this node stores for the network.
    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Number of outgoing requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Returns:
    ///  1. Id
    ///  2. Local address
    ///  3. Routing table size
    ///  4. Pending requests
    pub fn info(&self) -> Info {
        Info::from(self)
    }

    /// Our key pair, parameters and closest neighbours, to restart from later.
    pub fn state(&self) -> State {
        let neighbours = self
            .routing_table
            .find_closest(self.id(), self.k, &[])
            .iter()
            .map(Node::address)
            .collect();

        State::new(
            self.signing_key.clone(),
            self.k,
            self.alpha,
            self.node.metadata().clone(),
            neighbours,
        )
    }

    // === Public Methods ===

    /// Advance the engine: handle received datagrams, fail expired requests,
    /// advance lookups, then refresh the routing table and save our state when due.
    pub fn tick(&mut self) {
        self.tick_at(Instant::now())
    }

    pub(crate) fn tick_at(&mut self, now: Instant) {
        for _ in 0..MAX_DATAGRAMS_PER_TICK {
            match self.transport.recv() {
                Some((bytes, from)) => self.handle_datagram(from, &bytes),
                None => break,
            }
        }

        self.expire_requests(now);

        for lookup in std::mem::take(&mut self.lookups) {
            self.advance_lookup(lookup);
        }
        self.store_queries.retain_mut(|query| !query.tick());

        if now.saturating_duration_since(self.last_refresh) >= self.refresh_interval {
            self.refresh_table_at(now);
        }

        if now.saturating_duration_since(self.last_state_save) >= self.save_state_interval {
            self.last_state_save = now;

            if let Some(path) = self.state_path.clone() {
                self.save_state(&path);
            }
        }
    }

    /// Handle one inbound datagram. Malformed input is logged and dropped.
    pub fn handle_datagram(&mut self, from: SocketAddr, bytes: &[u8]) {
        match Message::from_bytes(bytes) {
            Ok(message) => {
                trace!(
                    context = "socket_message_receiving",
                    ?message,
                    ?from,
                    "Received message"
                );

                self.handle_message(message, from)
            }
            Err(Error::UnknownCommand(command)) => {
                debug!(?from, command, "Dropped message with unknown command");
            }
            Err(error) => {
                trace!(
                    context = "socket_error",
                    ?error,
                    ?from,
                    message = ?String::from_utf8_lossy(bytes),
                    "Received invalid message"
                );
            }
        }
    }

    /// Ping a node.
    pub fn call_ping(&mut self, node: &Node) -> CallResponse {
        self.request(node, Command::Ping, vec![])
    }

    /// Ask a node to store a value under a keyword and key.
    pub fn call_store(
        &mut self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        value: Bytes,
    ) -> CallResponse {
        self.request(node, Command::Store, vec![keyword, key, value])
    }

    /// Ask a node for the contacts it knows closest to `target`.
    pub fn call_find_node(&mut self, node: &Node, target: Id) -> CallResponse {
        self.request(
            node,
            Command::FindNode,
            vec![Bytes::copy_from_slice(target.as_bytes())],
        )
    }

    /// Ask a node for the values stored under a keyword, or the closest contacts
    /// to the keyword if it has none.
    pub fn call_find_value(&mut self, node: &Node, keyword: Bytes) -> CallResponse {
        self.request(node, Command::FindValue, vec![keyword])
    }

    /// Ask a node to delete the value under a keyword and key, with a signature
    /// over `key` by the key pair of the certificate embedded in the stored value.
    pub fn call_delete(
        &mut self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
    ) -> CallResponse {
        self.request(node, Command::Delete, vec![keyword, key, signature])
    }

    /// Ask a node which address our requests come from.
    pub fn call_stun(&mut self, node: &Node) -> CallResponse {
        self.request(node, Command::Stun, vec![])
    }

    /// Send a request to a node, registering it until its response or timeout.
    ///
    /// A request that doesn't fit in a datagram fails right away with
    /// [CallError::TooLarge], and is never sent.
    pub fn request(
        &mut self,
        node: &Node,
        command: Command,
        arguments: Vec<Bytes>,
    ) -> CallResponse {
        let (_, response) = self.send_request(node, command, arguments);

        response
    }

    /// Store every local record on `node` whose keyword is closer to it than to us.
    pub fn transfer_key_values(&mut self, node: &Node) -> Vec<CallResponse> {
        let mut responses = vec![];

        for (keyword, key, value) in self.storage.records() {
            let target = Id::for_keyword(&keyword);

            if node.id().xor(&target) < self.id().xor(&target) {
                responses.push(self.call_store(node, keyword, key, value));
            }
        }

        responses
    }

    /// Ping each address, adding whoever answers to the routing table.
    ///
    /// Our own address is skipped.
    pub fn bootstrap(&mut self, addresses: &[SocketAddr]) -> Vec<CallResponse> {
        info!(?addresses, "Bootstrapping");

        let own = [self.local_addr(), self.node.address()];

        addresses
            .iter()
            .filter(|address| !own.contains(address))
            .map(|address| {
                // The real contact is learned from the response sender.
                let placeholder = Node::new(Id::digest(b"null"), *address);

                self.call_ping(&placeholder)
            })
            .collect()
    }

    /// Look up one id in every stale bucket plus a random one, then republish
    /// stored records to every known contact closer to them than us.
    pub fn refresh_table(&mut self) {
        self.refresh_table_at(Instant::now())
    }

    /// Look up the `k` closest responding nodes to `target` across the network.
    pub fn find_closest_nodes(&mut self, target: Id, sender: Sender<Vec<Node>>) {
        self.start_lookup(Lookup::new(
            *self.id(),
            target,
            self.k,
            self.alpha,
            Goal::ClosestNodes(sender),
        ));
    }

    /// Find the values stored under a keyword, locally or across the network.
    ///
    /// Values found on the network are also stored at the closest node that
    /// responded without them.
    pub fn get(&mut self, keyword: Bytes, sender: Sender<Vec<StoredValue>>) {
        let local = self.storage.get_all(&keyword);

        if !local.is_empty() {
            let values = local
                .into_iter()
                .map(|(key, value)| StoredValue::new(key, value))
                .collect();

            let _ = sender.send(values);
            return;
        }

        let target = Id::for_keyword(&keyword);

        self.start_lookup(
            Lookup::new(*self.id(), target, self.k, self.alpha, Goal::Get(sender))
                .with_keyword(keyword),
        );
    }

    /// Store a record at the `k` closest nodes to its keyword, and locally if
    /// we are among them.
    ///
    /// Reports whether any node accepted it.
    pub fn put(&mut self, keyword: Bytes, key: Bytes, value: Bytes, sender: Sender<bool>) {
        let target = Id::for_keyword(&keyword);

        self.start_lookup(Lookup::new(
            *self.id(),
            target,
            self.k,
            self.alpha,
            Goal::Put {
                keyword,
                key,
                value,
                sender,
            },
        ));
    }

    /// Delete a record from the closest nodes to its keyword, and locally,
    /// with a signature over `key` by the publisher serialized in the value.
    ///
    /// The lookup asks `k` nodes at a time to reach as many holders as possible.
    /// Reports whether any node deleted it.
    pub fn delete(&mut self, keyword: Bytes, key: Bytes, signature: Bytes, sender: Sender<bool>) {
        let target = Id::for_keyword(&keyword);

        self.start_lookup(Lookup::new(
            *self.id(),
            target,
            self.k,
            self.k,
            Goal::Delete {
                keyword,
                key,
                signature,
                sender,
            },
        ));
    }

    /// Find the contact of the node with this id, in the routing table or
    /// across the network.
    pub fn resolve(&mut self, id: Id, sender: Sender<Option<Node>>) {
        if let Some(node) = self.routing_table.get(&id) {
            let _ = sender.send(Some(node.clone()));
            return;
        }

        self.start_lookup(Lookup::new(
            *self.id(),
            id,
            self.k,
            self.alpha,
            Goal::Resolve(sender),
        ));
    }

    // === Private Methods ===

    fn refresh_table_at(&mut self, now: Instant) {
        self.last_refresh = now;

        let mut targets = self
            .routing_table
            .refresh_ids_at(now, self.bucket_stale_after);
        targets.push(Id::random());

        debug!(targets = targets.len(), "Refreshing routing table");

        for target in targets {
            for node in self.routing_table.find_closest(&target, self.alpha, &[]) {
                let (nonce, _) = self.send_request(
                    &node,
                    Command::FindNode,
                    vec![Bytes::copy_from_slice(target.as_bytes())],
                );

                if self.pending.contains(&nonce) {
                    self.refresh_lookups.insert(nonce);
                }
            }
        }

        for node in self.routing_table.to_owned_nodes() {
            self.transfer_key_values(&node);
        }
    }

    /// Save our state, unless we know no neighbour to bootstrap from later.
    fn save_state(&self, path: &Path) {
        let state = self.state();

        if state.neighbours().is_empty() {
            warn!(?path, "No known neighbours, not saving state");
            return;
        }

        match state.save(path) {
            Ok(()) => debug!(?path, "Saved state"),
            Err(error) => warn!(?error, ?path, "Failed to save state"),
        }
    }

    fn start_lookup(&mut self, mut lookup: Lookup) {
        let seeds = self
            .routing_table
            .find_closest(&lookup.target(), self.k, &[]);

        if seeds.is_empty() {
            warn!(target = ?lookup.target(), "No known nodes to start a lookup from");
        }

        for node in seeds {
            lookup.add_candidate(node);
        }

        self.advance_lookup(lookup);
    }

    /// Collect the lookup's responses, ask the next closest candidates, and
    /// complete it once it converged.
    fn advance_lookup(&mut self, mut lookup: Lookup) {
        lookup.poll();

        for node in lookup.next_to_visit() {
            let response = self.request(&node, lookup.command(), lookup.arguments().to_vec());

            lookup.visiting(node, response);
        }

        if lookup.is_done() {
            self.complete_lookup(lookup);
        } else {
            self.lookups.push(lookup);
        }
    }

    fn complete_lookup(&mut self, lookup: Lookup) {
        let target = lookup.target();
        let responders = lookup.responders().to_vec();

        debug!(
            ?target,
            command = ?lookup.command(),
            responders = responders.len(),
            values = lookup.values().len(),
            "Done lookup"
        );

        // Cache found values at the closest node that didn't have them.
        if lookup.command() == Command::FindValue {
            if let (Some(node), Some(keyword)) =
                (lookup.nearest_without_value(), lookup.arguments().first())
            {
                for found in lookup.values() {
                    self.call_store(node, keyword.clone(), found.key.clone(), found.value.clone());
                }
            }
        }

        let met = lookup.met(&target).cloned();
        let values = lookup.values().to_vec();

        match lookup.into_goal() {
            Goal::ClosestNodes(sender) => {
                let _ = sender.send(responders);
            }
            Goal::Get(sender) => {
                let _ = sender.send(values);
            }
            Goal::Resolve(sender) => {
                let _ = sender.send(met);
            }
            Goal::Put {
                keyword,
                key,
                value,
                sender,
            } => {
                let mut query = StoreQuery::new(target, Command::Store, sender);

                let among_closest = match responders.last() {
                    Some(furthest) => {
                        responders.len() < self.k
                            || self.id().xor(&target) < furthest.id().xor(&target)
                    }
                    None => false,
                };

                if among_closest {
                    self.storage.put(keyword.clone(), key.clone(), value.clone());
                    query.succeeded();
                }

                for node in &responders {
                    query.request(self.call_store(
                        node,
                        keyword.clone(),
                        key.clone(),
                        value.clone(),
                    ));
                }

                self.store_queries.push(query);
            }
            Goal::Delete {
                keyword,
                key,
                signature,
                sender,
            } => {
                let mut query = StoreQuery::new(target, Command::Delete, sender);

                if self.delete_record(&keyword, &key, &signature) {
                    query.succeeded();
                }

                for node in &responders {
                    query.request(self.call_delete(
                        node,
                        keyword.clone(),
                        key.clone(),
                        signature.clone(),
                    ));
                }

                self.store_queries.push(query);
            }
        }
    }

    fn send_request(
        &mut self,
        node: &Node,
        command: Command,
        arguments: Vec<Bytes>,
    ) -> (Nonce, CallResponse) {
        let message = Message::request(self.node.clone(), command, arguments);
        let nonce = message.nonce;

        let bytes = match message.to_bytes() {
            Ok(bytes) => bytes,
            Err(error) => {
                debug!(?error, ?command, "Failed to encode request");
                return (nonce, CallResponse::failed(CallError::Encoding));
            }
        };

        if bytes.len() > MAX_DATAGRAM_SIZE {
            debug!(?command, size = bytes.len(), "Request too large to send");
            return (nonce, CallResponse::failed(CallError::TooLarge(bytes.len())));
        }

        let response = self.pending.register(nonce, node.clone(), command);

        trace!(context = "socket_message_sending", ?message, address = ?node.address());
        self.transmit(node.address(), &bytes);

        (nonce, response)
    }

    /// Send a response, dropping trailing arguments until it fits in a datagram.
    fn send_response(&mut self, address: SocketAddr, mut message: Message) {
        loop {
            match message.to_bytes() {
                Ok(bytes) if bytes.len() <= MAX_DATAGRAM_SIZE => {
                    trace!(context = "socket_message_sending", ?message, ?address);
                    self.transmit(address, &bytes);
                    return;
                }
                Ok(bytes) => {
                    debug!(
                        ?address,
                        command = ?message.command,
                        size = bytes.len(),
                        "Response too large, dropping its last argument"
                    );

                    if message.arguments.pop().is_none() {
                        return;
                    }
                }
                Err(error) => {
                    debug!(?error, ?address, "Failed to encode response");
                    return;
                }
            }
        }
    }

    fn transmit(&mut self, address: SocketAddr, bytes: &[u8]) {
        if let Err(error) = self.transport.send(address, bytes) {
            debug!(?error, ?address, "Error sending message");
        }
    }

    fn handle_message(&mut self, message: Message, from: SocketAddr) {
        if !message.sender.is_authentic() {
            debug!(
                ?from,
                id = ?message.sender.id(),
                "Dropped message from a sender whose id isn't derived from its certificate"
            );
            return;
        }

        let sender = observed_sender(message.sender.clone(), from);

        let reply = Reply {
            from: sender.clone(),
            arguments: message.arguments.clone(),
        };

        if self.pending.resolve(&message.nonce, reply).is_some() {
            self.add_node(sender);

            if self.refresh_lookups.remove(&message.nonce) {
                self.ping_unknown_nodes(&message.arguments);
            }

            return;
        }

        if self.pending.is_completed(&message.nonce) {
            trace!(?from, nonce = ?message.nonce, "Ignored late response");
            return;
        }

        self.handle_request(message, sender, from);
    }

    fn handle_request(&mut self, message: Message, sender: Node, from: SocketAddr) {
        let requester = *sender.id();

        self.add_node(sender);

        let arguments = match (message.command, message.arguments.as_slice()) {
            (Command::Ping, _) => Some(vec![]),
            (Command::Store, [keyword, key, value]) => {
                self.storage
                    .put(keyword.clone(), key.clone(), value.clone());

                Some(vec![Bytes::from_static(TRUE)])
            }
            (Command::FindNode, [target]) => Id::from_bytes(target)
                .ok()
                .map(|target| self.closest_nodes_arguments(&target, &requester)),
            (Command::FindValue, [keyword]) => {
                Some(self.find_value_arguments(keyword, &requester))
            }
            (Command::Delete, [keyword, key, signature]) => {
                let deleted = self.delete_record(keyword, key, signature);

                Some(vec![Bytes::from_static(if deleted { TRUE } else { FALSE })])
            }
            (Command::Stun, _) => Some(vec![
                Bytes::from(from.ip().to_string()),
                Bytes::from(from.port().to_string()),
            ]),
            _ => None,
        };

        match arguments {
            Some(arguments) => {
                let response = message.response(self.node.clone(), arguments);

                self.send_response(from, response);
            }
            None => {
                debug!(
                    ?from,
                    command = ?message.command,
                    arguments = message.arguments.len(),
                    "Dropped request with malformed arguments"
                );
            }
        }
    }

    fn closest_nodes_arguments(&self, target: &Id, requester: &Id) -> Vec<Bytes> {
        self.routing_table
            .find_closest(target, self.k, &[*requester])
            .iter()
            .filter_map(|node| node.to_bytes().ok())
            .map(Bytes::from)
            .collect()
    }

    fn find_value_arguments(&self, keyword: &Bytes, requester: &Id) -> Vec<Bytes> {
        let values = self.storage.get_all(keyword);

        if values.is_empty() {
            return self.closest_nodes_arguments(&Id::for_keyword(keyword), requester);
        }

        let mut arguments = vec![Bytes::from_static(VALUE)];

        arguments.extend(
            values
                .into_iter()
                .filter_map(|(key, value)| StoredValue::new(key, value).to_bytes().ok())
                .map(Bytes::from),
        );

        arguments
    }

    /// Delete a record only if `signature` is a valid signature over `key` by the
    /// certificate of the contact serialized in the stored value.
    fn delete_record(&mut self, keyword: &[u8], key: &[u8], signature: &[u8]) -> bool {
        let Some(value) = self.storage.get(keyword, key) else {
            return false;
        };

        let authorized = Node::from_bytes(&value)
            .and_then(|publisher| publisher.certificate())
            .is_ok_and(|certificate| certificate.verify_signature(key, signature));

        if authorized {
            self.storage.delete(keyword, key);
        }

        authorized
    }

    fn add_node(&mut self, node: Node) {
        match self.routing_table.add(node.clone()) {
            AddOutcome::Inserted => {
                debug!(id = ?node.id(), address = ?node.address(), "Added node to routing table");

                self.transfer_key_values(&node);
            }
            AddOutcome::Full { least_recent } => {
                if !self.pending.is_pending_for(least_recent.id()) {
                    self.call_ping(&least_recent);
                }
            }
            AddOutcome::Updated | AddOutcome::Ignored => {}
        }
    }

    fn ping_unknown_nodes(&mut self, arguments: &[Bytes]) {
        for argument in arguments {
            if let Ok(node) = Node::from_bytes(argument) {
                if node.is_authentic()
                    && node.id() != self.id()
                    && !self.routing_table.contains(node.id())
                    && !self.pending.is_pending_for(node.id())
                {
                    self.call_ping(&node);
                }
            }
        }
    }

    fn expire_requests(&mut self, now: Instant) {
        for (nonce, request) in self.pending.expire(now) {
            self.refresh_lookups.remove(&nonce);

            if let Some(node) = self.routing_table.remove(request.node.id()) {
                debug!(
                    id = ?node.id(),
                    address = ?node.address(),
                    command = ?request.command,
                    "Evicted unresponsive node"
                );
            }
        }
    }
}

/// A sender advertising an unspecified IP is reachable on the IP its datagram came from.
fn observed_sender(sender: Node, from: SocketAddr) -> Node {
    if sender.address().ip().is_unspecified() {
        let address = SocketAddr::new(from.ip(), sender.address().port());

        return sender.with_address(address);
    }

    sender
}

#[cfg(test)]
mod test {
    use ed25519_dalek::Signer;
    use flume::Receiver;

    use crate::common::Certificate;

    use super::*;

    fn signing_key() -> SigningKey {
        SigningKey::from_bytes(&[
            0x1a, 0x5c, 0x8e, 0x67, 0xed, 0xb8, 0xd2, 0x79, 0xd1, 0xae, 0x32, 0xfa, 0x2d, 0xa9,
            0x7e, 0x23, 0x6b, 0x95, 0xe9, 0x5c, 0x83, 0x7d, 0xc8, 0xc3, 0xc7, 0xc2, 0xff, 0x7a,
            0x7c, 0xc2, 0x98, 0x55,
        ])
    }

    fn random_key() -> SigningKey {
        SigningKey::from_bytes(&rand::random())
    }

    /// A random key whose node lands in the bucket `prefix_len` of `id`'s routing table.
    fn key_in_bucket(id: &Id, prefix_len: u8) -> SigningKey {
        loop {
            let key = random_key();

            if id.shared_prefix_len(&Certificate::new(&key).id()) == prefix_len {
                return key;
            }
        }
    }

    fn address(i: u8) -> SocketAddr {
        SocketAddr::from(([10, 0, 0, i], 4000))
    }

    fn new_rpc(network: &MemoryNetwork, i: u8) -> Rpc {
        Rpc::new(Config {
            transport: Some(Box::new(network.bind(address(i)))),
            ..Default::default()
        })
        .unwrap()
    }

    /// Tick every engine until a result arrives.
    fn run_until<T>(rpcs: &mut [&mut Rpc], receiver: &Receiver<T>) -> T {
        for _ in 0..100 {
            if let Ok(result) = receiver.try_recv() {
                return result;
            }

            for rpc in rpcs.iter_mut() {
                rpc.tick();
            }
        }

        panic!("no result after 100 rounds")
    }

    /// A raw peer speaking to the engine with hand built envelopes.
    struct Peer {
        node: Node,
        transport: MemoryTransport,
    }

    impl Peer {
        fn new(network: &MemoryNetwork, i: u8) -> Self {
            Self::with_key(network, i, &random_key())
        }

        fn with_key(network: &MemoryNetwork, i: u8, key: &SigningKey) -> Self {
            Self::with_node(network, Node::from_signing_key(key, address(i)))
        }

        fn with_node(network: &MemoryNetwork, node: Node) -> Self {
            Peer {
                transport: network.bind(node.address()),
                node,
            }
        }

        fn request(&mut self, rpc: &mut Rpc, command: Command, arguments: Vec<Bytes>) -> Message {
            let request = Message::request(self.node.clone(), command, arguments);

            self.transport
                .send(rpc.local_addr(), &request.to_bytes().unwrap())
                .unwrap();

            request
        }

        fn call(&mut self, rpc: &mut Rpc, command: Command, arguments: Vec<Bytes>) -> Message {
            let request = self.request(rpc, command, arguments);

            rpc.tick();

            let response = self.recv().expect("no response");

            assert_eq!(response.nonce, request.nonce);
            assert_eq!(response.command, command);
            assert_eq!(&response.sender, rpc.node());

            response
        }

        fn recv(&mut self) -> Option<Message> {
            self.transport
                .recv()
                .map(|(bytes, _)| Message::from_bytes(bytes).unwrap())
        }
    }

    fn b(s: &'static str) -> Bytes {
        Bytes::from_static(s.as_bytes())
    }

    fn id_bytes(id: &Id) -> Bytes {
        Bytes::copy_from_slice(id.as_bytes())
    }

    #[test]
    fn ping() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let response = peer.call(&mut rpc, Command::Ping, vec![]);

        assert!(response.arguments.is_empty());
        assert!(rpc.routing_table().contains(peer.node.id()));
    }

    #[test]
    fn store() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let response = peer.call(
            &mut rpc,
            Command::Store,
            vec![b("Keyword"), b("Key"), b("Value")],
        );

        assert_eq!(response.arguments, vec![b("True")]);
        assert_eq!(rpc.storage().get(b"Keyword", b"Key"), Some(b("Value")));
    }

    #[test]
    fn delete() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let publisher = signing_key();
        let value = Bytes::from(
            Node::from_signing_key(&publisher, address(3))
                .to_bytes()
                .unwrap(),
        );

        peer.call(
            &mut rpc,
            Command::Store,
            vec![b("Keyword"), b("Key"), value.clone()],
        );

        let response = peer.call(
            &mut rpc,
            Command::Delete,
            vec![b("Keyword"), b("Key"), b("Bad Signature")],
        );

        assert_eq!(response.arguments, vec![b("False")]);
        assert_eq!(rpc.storage().get(b"Keyword", b"Key"), Some(value.clone()));

        let wrong_signer = SigningKey::from_bytes(&[7; 32]);
        let forged = Bytes::copy_from_slice(&wrong_signer.sign(b"Key").to_bytes());

        let response = peer.call(
            &mut rpc,
            Command::Delete,
            vec![b("Keyword"), b("Key"), forged],
        );

        assert_eq!(response.arguments, vec![b("False")]);
        assert_eq!(rpc.storage().get(b"Keyword", b"Key"), Some(value));

        let signature = Bytes::copy_from_slice(&publisher.sign(b"Key").to_bytes());

        let response = peer.call(
            &mut rpc,
            Command::Delete,
            vec![b("Keyword"), b("Key"), signature.clone()],
        );

        assert_eq!(response.arguments, vec![b("True")]);
        assert_eq!(rpc.storage().get(b"Keyword", b"Key"), None);

        let response = peer.call(
            &mut rpc,
            Command::Delete,
            vec![b("Keyword"), b("Key"), signature],
        );

        assert_eq!(response.arguments, vec![b("False")]);
    }

    #[test]
    fn stun() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let response = peer.call(&mut rpc, Command::Stun, vec![]);

        assert_eq!(response.arguments, vec![b("10.0.0.2"), b("4000")]);
    }

    fn id(first_byte: u8) -> Id {
        let mut bytes = [0; 20];
        bytes[0] = first_byte;

        Id(bytes)
    }

    #[test]
    fn find_node() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        for (i, first_byte) in [0x40, 0x10, 0x20].into_iter().enumerate() {
            rpc.routing_table
                .add(Node::new(id(first_byte), address(10 + i as u8)));
        }

        let response = peer.call(&mut rpc, Command::FindNode, vec![id_bytes(&id(0))]);

        let ids: Vec<Id> = response
            .arguments
            .iter()
            .map(|argument| *Node::from_bytes(argument).unwrap().id())
            .collect();

        // The requester is never part of the answer.
        assert_eq!(ids, vec![id(0x10), id(0x20), id(0x40)]);
        assert!(rpc.routing_table().contains(peer.node.id()));
    }

    #[test]
    fn find_value() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        peer.call(
            &mut rpc,
            Command::Store,
            vec![b("Keyword"), b("Key"), b("Value")],
        );

        let response = peer.call(&mut rpc, Command::FindValue, vec![b("Keyword")]);

        assert_eq!(response.arguments.len(), 2);
        assert_eq!(response.arguments[0], Bytes::from_static(VALUE));
        assert_eq!(
            StoredValue::from_bytes(&response.arguments[1]).unwrap(),
            StoredValue::new(b("Key"), b("Value"))
        );
    }

    #[test]
    fn find_value_fallback() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        for i in 0..5 {
            rpc.routing_table.add(Node::new(Id::random(), address(10 + i)));
        }

        let keyword = Id::random();

        let find_value = peer.call(&mut rpc, Command::FindValue, vec![id_bytes(&keyword)]);
        let find_node = peer.call(&mut rpc, Command::FindNode, vec![id_bytes(&keyword)]);

        assert_eq!(find_value.arguments.len(), 5);
        assert_eq!(find_value.arguments, find_node.arguments);
    }

    #[test]
    fn oversized_find_value_response_is_trimmed() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        for i in 0..10u8 {
            rpc.storage.put(
                b("Keyword"),
                Bytes::from(format!("Key {i}")),
                Bytes::from(vec![i; 8000]),
            );
        }

        let response = peer.call(&mut rpc, Command::FindValue, vec![b("Keyword")]);

        assert_eq!(response.arguments[0], Bytes::from_static(VALUE));
        assert!(response.arguments.len() > 1);
        assert!(response.arguments.len() < 11);
        assert!(response.to_bytes().unwrap().len() <= MAX_DATAGRAM_SIZE);

        for argument in &response.arguments[1..] {
            assert!(StoredValue::from_bytes(argument).is_ok());
        }
    }

    #[test]
    fn unknown_command() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let request = Message::request(peer.node.clone(), Command::Ping, vec![]);
        let mut bytes = request.to_bytes().unwrap();

        // Command 0 becomes command 9.
        let position = bytes.windows(6).position(|w| w == b"1:ci0e").unwrap();
        bytes[position + 4] = b'9';

        peer.transport.send(rpc.local_addr(), &bytes).unwrap();
        rpc.tick();

        assert!(peer.recv().is_none());
        assert!(rpc.routing_table().is_empty());
    }

    #[test]
    fn malformed_input() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        peer.transport.send(rpc.local_addr(), b"hi").unwrap();
        peer.request(&mut rpc, Command::Store, vec![b("Keyword")]);
        rpc.tick();

        assert!(peer.recv().is_none());
    }

    #[test]
    fn unauthenticated_senders_are_ignored() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);

        let genuine = Node::from_signing_key(&random_key(), address(2));
        let certificate = genuine.certificate_bytes().clone();

        // An id right next to ours, with someone else's certificate.
        let mut forged_id = *rpc.id();
        forged_id.0[19] ^= 1;
        let forged = Node::new(forged_id, address(2)).with_certificate(certificate.clone());

        let missing = Node::new(*genuine.id(), address(3));

        let mut tampered = certificate.to_vec();
        tampered[0] ^= 1;
        let tampered =
            Node::new(Id::digest(&tampered), address(4)).with_certificate(Bytes::from(tampered));

        for node in [forged, missing, tampered] {
            let mut peer = Peer::with_node(&network, node);

            peer.request(&mut rpc, Command::Ping, vec![]);
            peer.request(
                &mut rpc,
                Command::Store,
                vec![b("Keyword"), b("Key"), b("Value")],
            );
            rpc.tick();

            assert!(peer.recv().is_none());
            assert!(rpc.routing_table().is_empty());
            assert_eq!(rpc.storage().get(b"Keyword", b"Key"), None);

            // Nor are their responses accepted.
            let response = rpc.call_ping(&peer.node);
            let request = peer.recv().unwrap();

            let reply = request.response(peer.node.clone(), vec![]);
            peer.transport
                .send(rpc.local_addr(), &reply.to_bytes().unwrap())
                .unwrap();
            rpc.tick();

            assert!(response.try_result().is_none());
            assert!(rpc.routing_table().is_empty());
        }
    }

    #[test]
    fn call_ping_response() {
        let network = MemoryNetwork::new();
        let mut alice = new_rpc(&network, 1);
        let mut bob = new_rpc(&network, 2);

        let response = alice.call_ping(bob.node());

        assert_eq!(alice.pending_requests(), 1);

        bob.tick();
        alice.tick();

        let reply = response.try_result().unwrap().unwrap();

        assert_eq!(&reply.from, bob.node());
        assert!(reply.arguments.is_empty());
        assert_eq!(alice.pending_requests(), 0);
        assert!(alice.routing_table().contains(bob.id()));
        assert!(bob.routing_table().contains(alice.id()));
    }

    #[test]
    fn call_envelopes() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let target = Id::random();
        let node = peer.node.clone();

        rpc.call_store(&node, b("Keyword"), b("Key"), b("Value"));
        rpc.call_find_node(&node, target);
        rpc.call_find_value(&node, b("Keyword"));
        rpc.call_delete(&node, b("Keyword"), b("Key"), b("Signature"));
        rpc.call_stun(&node);

        let expected = [
            (Command::Store, vec![b("Keyword"), b("Key"), b("Value")]),
            (Command::FindNode, vec![id_bytes(&target)]),
            (Command::FindValue, vec![b("Keyword")]),
            (
                Command::Delete,
                vec![b("Keyword"), b("Key"), b("Signature")],
            ),
            (Command::Stun, vec![]),
        ];

        let mut nonces = HashSet::new();

        for (command, arguments) in expected {
            let message = peer.recv().unwrap();

            assert_eq!(message.command, command);
            assert_eq!(message.arguments, arguments);
            assert_eq!(&message.sender, rpc.node());
            assert!(nonces.insert(message.nonce));
        }

        assert_eq!(rpc.pending_requests(), 5);
    }

    #[test]
    fn call_find_value_decoded() {
        let network = MemoryNetwork::new();
        let mut alice = new_rpc(&network, 1);
        let mut bob = new_rpc(&network, 2);

        let bob_node = bob.node().clone();

        let store = alice.call_store(&bob_node, b("Keyword"), b("Key"), b("Value"));
        bob.tick();
        alice.tick();

        assert!(store.wait().unwrap().is_true());

        let found = alice.call_find_value(&bob_node, b("Keyword"));
        bob.tick();
        alice.tick();

        assert_eq!(
            found.wait().unwrap().find_value().unwrap(),
            FindValueResponse::Values(vec![StoredValue::new(b("Key"), b("Value"))])
        );

        let stun = alice.call_stun(&bob_node);
        bob.tick();
        alice.tick();

        assert_eq!(stun.wait().unwrap().stun_address().unwrap(), address(1));
    }

    #[test]
    fn oversized_request_fails_without_eviction() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        peer.call(&mut rpc, Command::Ping, vec![]);

        let value = Bytes::from(vec![0; MAX_DATAGRAM_SIZE]);
        let response = rpc.call_store(&peer.node, b("Keyword"), b("Key"), value);

        assert!(matches!(
            response.try_result(),
            Some(Err(CallError::TooLarge(size))) if size > MAX_DATAGRAM_SIZE
        ));
        assert_eq!(rpc.pending_requests(), 0);
        assert!(peer.recv().is_none());

        rpc.tick_at(Instant::now() + Duration::from_secs(6));

        assert!(rpc.routing_table().contains(peer.node.id()));
    }

    #[test]
    fn timeout_evicts_node() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);

        // Nobody is bound to this address.
        let silent = Node::new(Id::random(), address(9));
        rpc.routing_table.add(silent.clone());

        let response = rpc.call_ping(&silent);

        rpc.tick_at(Instant::now() + Duration::from_secs(4));
        assert!(response.try_result().is_none());

        rpc.tick_at(Instant::now() + Duration::from_secs(6));

        assert_eq!(response.try_result(), Some(Err(CallError::Timeout)));
        assert_eq!(rpc.pending_requests(), 0);
        assert!(!rpc.routing_table().contains(silent.id()));
        assert!(rpc
            .routing_table()
            .find_closest(silent.id(), 20, &[])
            .is_empty());
    }

    #[test]
    fn late_response_ignored() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let response = rpc.call_ping(&peer.node);
        let request = peer.recv().unwrap();

        rpc.tick_at(Instant::now() + Duration::from_secs(6));
        assert_eq!(response.try_result(), Some(Err(CallError::Timeout)));

        let late = request.response(peer.node.clone(), vec![]);
        peer.transport
            .send(rpc.local_addr(), &late.to_bytes().unwrap())
            .unwrap();

        rpc.tick();

        assert!(peer.recv().is_none());
        assert!(!rpc.routing_table().contains(peer.node.id()));
    }

    #[test]
    fn transfer_key_values() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        // Every keyword is closer to the node whose id it is.
        let close_keyword = id_bytes(peer.node.id());
        let distant_keyword = id_bytes(rpc.id());

        rpc.storage.put(close_keyword.clone(), b("Key"), b("Value"));
        rpc.storage
            .put(close_keyword.clone(), b("Other key"), b("Value"));
        rpc.storage.put(distant_keyword, b("Key"), b("Value"));

        let node = peer.node.clone();
        let responses = rpc.transfer_key_values(&node);

        assert_eq!(responses.len(), 2);

        for _ in 0..2 {
            let message = peer.recv().unwrap();

            assert_eq!(message.command, Command::Store);
            assert_eq!(message.arguments[0], close_keyword);
        }

        assert!(peer.recv().is_none());
    }

    #[test]
    fn new_contact_gets_closer_records() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let keyword = id_bytes(peer.node.id());
        rpc.storage.put(keyword.clone(), b("Key"), b("Value"));

        peer.request(&mut rpc, Command::Ping, vec![]);
        rpc.tick();

        let store = peer.recv().unwrap();
        assert_eq!(store.command, Command::Store);
        assert_eq!(store.arguments, vec![keyword, b("Key"), b("Value")]);

        assert_eq!(peer.recv().unwrap().command, Command::Ping);
        assert!(peer.recv().is_none());
    }

    #[test]
    fn full_bucket_pings_least_recent() {
        let network = MemoryNetwork::new();
        let mut rpc = Rpc::new(Config {
            transport: Some(Box::new(network.bind(address(1)))),
            k: 1,
            ..Default::default()
        })
        .unwrap();

        let local = *rpc.id();
        let mut first = Peer::with_key(&network, 2, &key_in_bucket(&local, 0));
        let mut second = Peer::with_key(&network, 3, &key_in_bucket(&local, 0));

        let (first_id, second_id) = (*first.node.id(), *second.node.id());

        first.call(&mut rpc, Command::Ping, vec![]);
        second.call(&mut rpc, Command::Ping, vec![]);

        assert!(rpc.routing_table().contains(&first_id));
        assert!(!rpc.routing_table().contains(&second_id));

        let ping = first.recv().unwrap();
        assert_eq!(ping.command, Command::Ping);

        // The least recently seen node doesn't answer, its replacement takes over.
        rpc.tick_at(Instant::now() + Duration::from_secs(6));

        assert!(!rpc.routing_table().contains(&first_id));
        assert!(rpc.routing_table().contains(&second_id));
    }

    #[test]
    fn refresh_table() {
        let network = MemoryNetwork::new();
        let mut alice = new_rpc(&network, 1);
        let mut bob = new_rpc(&network, 2);
        let carol = new_rpc(&network, 3);

        let unsigned = Node::new(Id::random(), address(4));

        bob.routing_table.add(carol.node().clone());
        bob.routing_table.add(unsigned.clone());

        let ping = alice.call_ping(bob.node());
        bob.tick();
        alice.tick();
        assert!(ping.wait().is_ok());

        alice.refresh_table();
        assert!(alice.pending_requests() >= 1);

        // Bob answers the lookups with Carol, who Alice pings, but never
        // with a contact whose id isn't derived from its certificate.
        bob.tick();
        alice.tick();

        assert!(alice.pending.is_pending_for(carol.id()));
        assert!(!alice.pending.is_pending_for(unsigned.id()));
    }

    #[test]
    fn bootstrap_skips_own_address() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);
        let mut peer = Peer::new(&network, 2);

        let own = rpc.local_addr();
        let responses = rpc.bootstrap(&[own, peer.node.address()]);

        assert_eq!(responses.len(), 1);
        assert_eq!(rpc.pending_requests(), 1);
        assert_eq!(peer.recv().unwrap().command, Command::Ping);

        // Configured bootstrap addresses are pinged on creation.
        let other = Rpc::new(Config {
            transport: Some(Box::new(network.bind(address(3)))),
            bootstrap: vec![address(3), peer.node.address()],
            ..Default::default()
        })
        .unwrap();

        assert_eq!(other.pending_requests(), 1);
        assert_eq!(peer.recv().unwrap().command, Command::Ping);
    }

    /// Alice knows Bob, Bob knows Carol.
    fn chain(network: &MemoryNetwork) -> (Rpc, Rpc, Rpc) {
        let mut alice = new_rpc(network, 1);
        let mut bob = new_rpc(network, 2);
        let carol = new_rpc(network, 3);

        alice.routing_table.add(bob.node().clone());
        bob.routing_table.add(carol.node().clone());

        (alice, bob, carol)
    }

    #[test]
    fn find_closest_nodes() {
        let network = MemoryNetwork::new();
        let (mut alice, mut bob, mut carol) = chain(&network);

        let (sender, receiver) = flume::bounded(1);
        alice.find_closest_nodes(*carol.id(), sender);

        let closest = run_until(&mut [&mut alice, &mut bob, &mut carol], &receiver);

        assert_eq!(closest.len(), 2);
        assert_eq!(&closest[0], carol.node());
        assert_eq!(&closest[1], bob.node());
        assert!(alice.routing_table().contains(carol.id()));
    }

    #[test]
    fn put_get_delete() {
        let network = MemoryNetwork::new();
        let (mut alice, mut bob, mut carol) = chain(&network);

        let mut dave = new_rpc(&network, 4);
        dave.routing_table.add(bob.node().clone());

        let publisher = signing_key();
        let value = Bytes::from(
            Node::from_signing_key(&publisher, address(9))
                .to_bytes()
                .unwrap(),
        );

        let (sender, receiver) = flume::bounded(1);
        alice.put(b("Keyword"), b("Key"), value.clone(), sender);

        assert!(run_until(
            &mut [&mut alice, &mut bob, &mut carol, &mut dave],
            &receiver
        ));

        for rpc in [&alice, &bob, &carol] {
            assert_eq!(rpc.storage().get(b"Keyword", b"Key"), Some(value.clone()));
        }

        let (sender, receiver) = flume::bounded(1);
        dave.get(b("Keyword"), sender);

        assert_eq!(
            run_until(
                &mut [&mut alice, &mut bob, &mut carol, &mut dave],
                &receiver
            ),
            vec![StoredValue::new(b("Key"), value.clone())]
        );

        let (sender, receiver) = flume::bounded(1);
        dave.delete(b("Keyword"), b("Key"), b("Bad Signature"), sender);

        assert!(!run_until(
            &mut [&mut alice, &mut bob, &mut carol, &mut dave],
            &receiver
        ));
        assert_eq!(bob.storage().get(b"Keyword", b"Key"), Some(value));

        let signature = Bytes::copy_from_slice(&publisher.sign(b"Key").to_bytes());

        let (sender, receiver) = flume::bounded(1);
        dave.delete(b("Keyword"), b("Key"), signature, sender);

        assert!(run_until(
            &mut [&mut alice, &mut bob, &mut carol, &mut dave],
            &receiver
        ));

        for rpc in [&alice, &bob, &carol, &dave] {
            assert_eq!(rpc.storage().get(b"Keyword", b"Key"), None);
        }
    }

    #[test]
    fn get_caches_at_nearest_without_value() {
        let network = MemoryNetwork::new();
        let (mut alice, mut bob, mut carol) = chain(&network);

        carol.storage.put(b("Keyword"), b("Key"), b("Value"));

        let (sender, receiver) = flume::bounded(1);
        alice.get(b("Keyword"), sender);

        assert_eq!(
            run_until(&mut [&mut alice, &mut bob, &mut carol], &receiver),
            vec![StoredValue::new(b("Key"), b("Value"))]
        );

        // Bob answered with Carol instead of the value, so he gets a copy.
        for _ in 0..3 {
            bob.tick();
        }

        assert_eq!(bob.storage().get(b"Keyword", b"Key"), Some(b("Value")));
    }

    #[test]
    fn resolve() {
        let network = MemoryNetwork::new();
        let (mut alice, mut bob, mut carol) = chain(&network);

        let (sender, receiver) = flume::bounded(1);
        alice.resolve(*carol.id(), sender);

        assert_eq!(
            run_until(&mut [&mut alice, &mut bob, &mut carol], &receiver),
            Some(carol.node().clone())
        );

        let (sender, receiver) = flume::bounded(1);
        alice.resolve(Id::random(), sender);

        assert_eq!(
            run_until(&mut [&mut alice, &mut bob, &mut carol], &receiver),
            None
        );
    }

    #[test]
    fn lookups_without_contacts() {
        let network = MemoryNetwork::new();
        let mut rpc = new_rpc(&network, 1);

        let (sender, receiver) = flume::bounded(1);
        rpc.find_closest_nodes(Id::random(), sender);
        assert_eq!(receiver.try_recv(), Ok(vec![]));

        let (sender, receiver) = flume::bounded(1);
        rpc.put(b("Keyword"), b("Key"), b("Value"), sender);
        assert!(!run_until(&mut [&mut rpc], &receiver));
        assert_eq!(rpc.storage().get(b"Keyword", b"Key"), None);
    }

    #[test]
    fn saves_state_regularly() {
        let network = MemoryNetwork::new();
        let path = std::env::temp_dir().join(format!("kadrpc-{}", rand::random::<u64>()));

        let mut rpc = Rpc::new(Config {
            transport: Some(Box::new(network.bind(address(1)))),
            state_path: Some(path.clone()),
            ..Default::default()
        })
        .unwrap();

        let start = Instant::now();

        // Nothing worth saving without neighbours.
        rpc.tick_at(start + Duration::from_secs(11 * 60));
        assert!(!path.exists());

        rpc.routing_table.add(Node::new(Id::random(), address(2)));
        rpc.tick_at(start + Duration::from_secs(22 * 60));

        let state = State::load(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(
            &Certificate::new(state.signing_key()).id(),
            rpc.id()
        );
        assert_eq!(state.neighbours(), &[address(2)]);
    }
}
