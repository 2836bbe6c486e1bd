use std::net::SocketAddr;

use crate::{Id, Node};

use super::Rpc;

/// Information and statistics about this node.
#[derive(Debug, Clone)]
pub struct Info {
    node: Node,
    local_addr: SocketAddr,
    routing_table_size: usize,
    pending_requests: usize,
}

impl Info {
    /// This Node's [Id]
    pub fn id(&self) -> &Id {
        self.node.id()
    }
    /// This node's contact, as advertised to other nodes.
    pub fn node(&self) -> &Node {
        &self.node
    }
    /// Local socket address that this node is listening on.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
    /// Number of contacts in the routing table.
    pub fn routing_table_size(&self) -> usize {
        self.routing_table_size
    }
    /// Number of outgoing requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending_requests
    }
}

impl From<&Rpc> for Info {
    fn from(rpc: &Rpc) -> Self {
        Self {
            node: rpc.node().clone(),
            local_addr: rpc.local_addr(),
            routing_table_size: rpc.routing_table().size(),
            pending_requests: rpc.pending_requests(),
        }
    }
}
