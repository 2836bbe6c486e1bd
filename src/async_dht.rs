//! AsyncDht node.

use std::net::SocketAddr;

use bytes::Bytes;

use crate::common::{Command, Id, Node, StoredValue};
use crate::dht::{ActorMessage, Dht, DhtWasShutdown};
use crate::rpc::{CallResponse, Info, State};

impl Dht {
    /// Return an async version of the Dht client.
    pub fn as_async(self) -> AsyncDht {
        AsyncDht(self)
    }
}

#[derive(Debug, Clone)]
/// Async version of the Dht node.
pub struct AsyncDht(Dht);

impl AsyncDht {
    // === Getters ===

    /// Information and statistics about this [Dht] node.
    pub async fn info(&self) -> Result<Info, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Info>(1);

        self.0.send(ActorMessage::Info(sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Turn this node's routing table to a list of bootstraping nodes.
    pub async fn to_bootstrap(&self) -> Result<Vec<String>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<String>>(1);

        self.0.send(ActorMessage::ToBootstrap(sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Up to `limit` contacts from the routing table, closest to `target` first.
    pub async fn closest(&self, target: Id, limit: usize) -> Result<Vec<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<Node>>(1);

        self.0.send(ActorMessage::Closest(target, limit, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// This node's key pair, parameters and closest neighbours.
    pub async fn state(&self) -> Result<State, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<State>(1);

        self.0.send(ActorMessage::State(sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    // === Public Methods ===

    /// Shutdown the actor thread loop.
    pub async fn shutdown(&mut self) {
        let (sender, receiver) = flume::bounded::<()>(1);

        let _ = self.0 .0.send(ActorMessage::Shutdown(sender));
        let _ = receiver.recv_async().await;
    }

    /// Ping every address, waiting until each one responded or timed out.
    ///
    /// Returns `true` if at least one of them responded.
    pub async fn bootstrap(&self, addresses: &[SocketAddr]) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<CallResponse>>(1);

        self.0
            .send(ActorMessage::Bootstrap(addresses.to_vec(), sender))?;

        let responses = receiver.recv_async().await.map_err(|_| DhtWasShutdown)?;

        let mut bootstrapped = false;

        for response in responses {
            bootstrapped |= response.recv_async().await.is_ok();
        }

        Ok(bootstrapped)
    }

    /// Look up stale buckets and republish stored records now.
    pub async fn refresh_table(&self) -> Result<(), DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<()>(1);

        self.0.send(ActorMessage::RefreshTable(sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    // === Lookups ===

    /// Async version of [Dht::find_closest_nodes].
    pub async fn find_closest_nodes(&self, target: Id) -> Result<Vec<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<Node>>(1);

        self.0.send(ActorMessage::FindClosestNodes(target, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Async version of [Dht::get].
    pub async fn get(&self, keyword: Bytes) -> Result<Vec<StoredValue>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Vec<StoredValue>>(1);

        self.0.send(ActorMessage::Get(keyword, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Async version of [Dht::put].
    pub async fn put(
        &self,
        keyword: Bytes,
        key: Bytes,
        value: Bytes,
    ) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<bool>(1);

        self.0
            .send(ActorMessage::Put(keyword, key, value, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Async version of [Dht::delete].
    pub async fn delete(
        &self,
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
    ) -> Result<bool, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<bool>(1);

        self.0
            .send(ActorMessage::Delete(keyword, key, signature, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    /// Async version of [Dht::resolve].
    pub async fn resolve(&self, id: Id) -> Result<Option<Node>, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<Option<Node>>(1);

        self.0.send(ActorMessage::Resolve(id, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }

    // === Calls ===

    /// Ping a node.
    pub async fn call_ping(&self, node: &Node) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Ping, vec![]).await
    }

    /// Ask a node to store a value under a keyword and key.
    pub async fn call_store(
        &self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        value: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Store, vec![keyword, key, value])
            .await
    }

    /// Ask a node for the contacts it knows closest to `target`.
    pub async fn call_find_node(
        &self,
        node: &Node,
        target: Id,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(
            node,
            Command::FindNode,
            vec![Bytes::copy_from_slice(target.as_bytes())],
        )
        .await
    }

    /// Ask a node for the values stored under a keyword.
    pub async fn call_find_value(
        &self,
        node: &Node,
        keyword: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::FindValue, vec![keyword]).await
    }

    /// Ask a node to delete a value, with a signature over `key` by its publisher.
    pub async fn call_delete(
        &self,
        node: &Node,
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
    ) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Delete, vec![keyword, key, signature])
            .await
    }

    /// Ask a node which address our requests come from.
    pub async fn call_stun(&self, node: &Node) -> Result<CallResponse, DhtWasShutdown> {
        self.call(node, Command::Stun, vec![]).await
    }

    // === Private Methods ===

    async fn call(
        &self,
        node: &Node,
        command: Command,
        arguments: Vec<Bytes>,
    ) -> Result<CallResponse, DhtWasShutdown> {
        let (sender, receiver) = flume::bounded::<CallResponse>(1);

        self.0
            .send(ActorMessage::Call(node.clone(), command, arguments, sender))?;

        receiver.recv_async().await.map_err(|_| DhtWasShutdown)
    }
}
