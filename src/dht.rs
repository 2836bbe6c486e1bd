//! Dht node.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::thread;

use bytes::Bytes;
use flume::{Receiver, Sender, TryRecvError};
use tracing::{debug, info};

use crate::common::{Command, Id, Node, StoredValue};
use crate::rpc::{CallResponse, Config, Info, Rpc, State};
use crate::Error;

#[derive(Debug, Clone)]
/// Kadrpc Dht node.
///
/// Runs an [Rpc] engine in a dedicated thread, and talks to it over channels.
/// Dropping every clone of the handle shuts the thread down.
pub struct Dht(pub(crate) Sender<ActorMessage>);

impl Dht {
    /// Create a new Dht node, binding its socket before spawning its thread.
    pub fn new(config: Config) -> Result<Self, std::io::Error> {
        let (sender, receiver) = flume::unbounded();

        let rpc = Rpc::new(config)?;

        info!(address = ?rpc.local_addr(), id = ?rpc.id(), "Kadrpc node listening");

        thread::Builder::new()
            .name("kadrpc".to_string())
            .spawn(move || run(rpc, receiver))?;

        Ok(Dht(sender))
    }

    /// Create a Dht node with the default [Config].
    pub fn client() -> Result<Self, std::io::Error> {
        Dht::new(Config::default())
    }

    /// Restart a node from a [State] saved at `path`, with the same key pair,
    /// bootstrapping from the neighbours it knew.
    ///
    /// Other options are taken from `config`.
    pub fn from_state<P: AsRef<Path>>(path: P, config: Config) -> Result<Self, Error> {
        let state = State::load(path)?;

        Ok(Dht::new(state.configure(config))?)
    }

    // === Getters ===

    /// Information and statistics about this [Dht] node.
    pub fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.send(ActorMessage::Info(sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Turn this node's routing table to a list of bootstrapping nodes.
    pub fn to_bootstrap(&self) -> Result<Vec<String>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<String>>(1);

        self.send(ActorMessage::ToBootstrap(sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Up to `limit` contacts from the routing table, closest to `target` first.
    pub fn closest(&self, target: Id, limit: usize) -> Result<Vec<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<Node>>(1);

        self.send(ActorMessage::Closest(target, limit, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// This node's key pair, parameters and closest neighbours.
    pub fn state(&self) -> Result<State, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<State>(1);

        self.send(ActorMessage::State(sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    /// Shutdown the actor thread loop.
    pub fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv();
    }

    /// Ping every address, blocking until each one responded or timed out.
    ///
    /// Returns `true` if at least one of them responded.
    pub fn bootstrap(&self, addresses: &[SocketAddr]) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<CallResponse>>(1);

        self.send(ActorMessage::Bootstrap(addresses.to_vec(), sender))?;

        let responses = receiver.recv().map_err(|_| DhtWasShutdown)?;

        let mut bootstrapped = false;

        for response in responses {
            bootstrapped |= response.wait().is_ok();
        }

        Ok(bootstrapped)
    }

    /// Look up stale buckets and republish stored records now.
    pub fn refresh_table(&self) -> Result<(), DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<()>(1);

        self.send(ActorMessage::RefreshTable(sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    // === Lookups ===

    /// The `k` closest nodes to `target` that responded to an iterative lookup,
    /// closest first.
    pub fn find_closest_nodes(&self, target: Id) -> Result<Vec<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<Node>>(1);

        self.send(ActorMessage::FindClosestNodes(target, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Every value stored under a keyword, locally or at the first nodes that
    /// have any on the way to the keyword's closest nodes.
    pub fn get(&self, keyword: Bytes) -> Result<Vec<StoredValue>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<StoredValue>>(1);

        self.send(ActorMessage::Get(keyword, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Store a record at the closest nodes to its keyword.
    ///
    /// Returns `true` if any node, including this one, stored it.
    pub fn put(&self, keyword: Bytes, key: Bytes, value: Bytes) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<bool>(1);

        self.send(ActorMessage::Put(keyword, key, value, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Delete a record from the closest nodes to its keyword, with a signature
    /// over `key` by the publisher serialized in the stored value.
    ///
    /// Returns `true` if any node, including this one, deleted it.
    pub fn delete(
        &self,
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
    ) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<bool>(1);

        self.send(ActorMessage::Delete(keyword, key, signature, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    /// Find the contact of the node with this id.
    pub fn resolve(&self, id: Id) -> Result<Option<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Option<Node>>(1);

        self.send(ActorMessage::Resolve(id, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    // === Calls ===

    /// Ping a node.
    pub fn call_ping(&self, node: &Node) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Ping, vec![])
    }

    /// Ask a node to store a value under a keyword and key.
    pub fn call_store(
        &self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        value: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Store, vec![keyword, key, value])
    }

    /// Ask a node for the contacts it knows closest to `target`.
    pub fn call_find_node(
        &self,
        node: &Node,
        target: Id,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(
            node,
            Command::FindNode,
            vec![Bytes::copy_from_slice(target.as_bytes())],
        )
    }

    /// Ask a node for the values stored under a keyword.
    pub fn call_find_value(
        &self,
        node: &Node,
        keyword: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::FindValue, vec![keyword])
    }

    /// Ask a node to delete a value, with a signature over `key` by its publisher.
    pub fn call_delete(
        &self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Delete, vec![keyword, key, signature])
    }

    /// Ask a node which address our requests come from.
    pub fn call_stun(&self, node: &Node) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Stun, vec![])
    }

    /// Ask the closest contacts to our own id which address our requests come from,
    /// returning every distinct answer.
    pub fn inet_visible_addresses(&self) -> Result<Vec<SocketAddr>, DhtWasShutdown> {
        let id = *self.info()?.id();

        let mut responses = vec![];
        for node in self.closest(id, STUN_NEIGHBOURS)? {
            responses.push(self.call_stun(&node)?);
        }

        let mut seen = HashSet::new();
        let mut addresses = vec![];

        for response in responses {
            if let Ok(address) = response.wait().map(|reply| reply.stun_address()) {
                match address {
                    Ok(address) if seen.insert(address) => addresses.push(address),
                    Ok(_) => {}
                    Err(error) => debug!(?error, "Invalid STUN response"),
                }
            }
        }

        Ok(addresses)
    }

    // === Private Methods ===

    fn call(
        &self,
        node: &Node,
        command: Command,
        arguments: Vec<Bytes>,
    ) -> Result<CallResponse, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<CallResponse>(1);

        self.send(ActorMessage::Call(node.clone(), command, arguments, sender))?;

        receiver.recv().map_err(|_| DhtWasShutdown)
    }

    pub(crate) fn send(&self, message: ActorMessage) -> Result<(), DhtWasShutdown> {
        self.0.send(message).map_err(|_| DhtWasShutdown)
    }
}

/// Number of neighbours asked for our address by [Dht::inet_visible_addresses].
const STUN_NEIGHBOURS: usize = 3;

fn run(mut rpc: Rpc, receiver: Receiver<ActorMessage>) {
    loop {
        match receiver.try_recv() {
            Ok(actor_message) => match actor_message {
                ActorMessage::Shutdown(sender) => {
                    drop(receiver);
                    let _ = sender.send(());
                    break;
                }
                ActorMessage::Info(sender) => {
                    let _ = sender.send(rpc.info());
                }
                ActorMessage::ToBootstrap(sender) => {
                    let _ = sender.send(rpc.routing_table().to_bootstrap());
                }
                ActorMessage::Closest(target, limit, sender) => {
                    let _ = sender.send(rpc.routing_table().find_closest(&target, limit, &[]));
                }
                ActorMessage::Bootstrap(addresses, sender) => {
                    let _ = sender.send(rpc.bootstrap(&addresses));
                }
                ActorMessage::RefreshTable(sender) => {
                    rpc.refresh_table();
                    let _ = sender.send(());
                }
                ActorMessage::State(sender) => {
                    let _ = sender.send(rpc.state());
                }
                ActorMessage::Call(node, command, arguments, sender) => {
                    let _ = sender.send(rpc.request(&node, command, arguments));
                }
                ActorMessage::FindClosestNodes(target, sender) => {
                    rpc.find_closest_nodes(target, sender);
                }
                ActorMessage::Get(keyword, sender) => {
                    rpc.get(keyword, sender);
                }
                ActorMessage::Put(keyword, key, value, sender) => {
                    rpc.put(keyword, key, value, sender);
                }
                ActorMessage::Delete(keyword, key, signature, sender) => {
                    rpc.delete(keyword, key, signature, sender);
                }
                ActorMessage::Resolve(id, sender) => {
                    rpc.resolve(id, sender);
                }
            },
            Err(TryRecvError::Disconnected) => {
                // Node was dropped, kill this thread.
                debug!("kadrpc::Dht's actor thread was shutdown after Drop.");
                break;
            }
            Err(TryRecvError::Empty) => {
                // No op
            }
        }

        rpc.tick();
    }
}

#[derive(Debug)]
pub(crate) enum ActorMessage {
    Info(Sender<Info>),
    ToBootstrap(Sender<Vec<String>>),
    Closest(Id, usize, Sender<Vec<Node>>),
    Bootstrap(Vec<SocketAddr>, Sender<Vec<CallResponse>>),
    RefreshTable(Sender<()>),
    State(Sender<State>),
    Call(Node, Command, Vec<Bytes>, Sender<CallResponse>),
    FindClosestNodes(Id, Sender<Vec<Node>>),
    Get(Bytes, Sender<Vec<StoredValue>>),
    Put(Bytes, Bytes, Bytes, Sender<bool>),
    Delete(Bytes, Bytes, Bytes, Sender<bool>),
    Resolve(Id, Sender<Option<Node>>),
    Shutdown(Sender<()>),
}

#[derive(thiserror::Error, Debug)]
#[error("Dht node was shutdown")]
/// The actor thread of this [Dht] is gone.
pub struct DhtWasShutdown;

/// Create a testnet of Dht nodes on localhost, to run tests against instead
/// of a real network.
#[derive(Debug)]
pub struct Testnet {
    pub bootstrap: Vec<SocketAddr>,
    pub nodes: Vec<Dht>,
}

impl Testnet {
    /// Create `count` nodes bound to `127.0.0.1`, every one bootstrapped off the first.
    pub fn new(count: usize) -> Result<Testnet, std::io::Error> {
        let mut nodes: Vec<Dht> = vec![];
        let mut bootstrap = vec![];

        for i in 0..count {
            let node = Dht::new(Config {
                bind_address: Ipv4Addr::LOCALHOST.into(),
                ..Default::default()
            })?;

            if i == 0 {
                let info = node.info().map_err(std::io::Error::other)?;

                bootstrap.push(info.local_addr());
            } else {
                node.bootstrap(&bootstrap)
                    .map_err(std::io::Error::other)?;
            }

            nodes.push(node);
        }

        Ok(Self { bootstrap, nodes })
    }
}
