//! Struct and implementation of the Node entry in the Kademlia routing table
use std::{
    hash::{Hash, Hasher},
    net::{IpAddr, SocketAddr},
};

use bytes::Bytes;
use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use serde_bytes::ByteBuf;

use crate::common::{Certificate, Id};
use crate::{Error, Result};

#[derive(Debug, Clone)]
/// Node entry in Kademlia routing table, a peer's routable identity.
///
/// Two nodes are the same peer if their ids match, regardless of their address.
pub struct Node {
    id: Id,
    address: SocketAddr,
    certificate: Bytes,
    metadata: Bytes,
}

impl Node {
    /// Creates a new Node from an id and socket address.
    pub fn new(id: Id, address: SocketAddr) -> Node {
        Node {
            id,
            address,
            certificate: Bytes::new(),
            metadata: Bytes::new(),
        }
    }

    /// Creates the Node for the owner of a signing key, deriving its [Id]
    /// from its self-signed [Certificate].
    pub fn from_signing_key(signing_key: &SigningKey, address: SocketAddr) -> Node {
        let certificate = Certificate::new(signing_key);

        Node::new(certificate.id(), address)
            .with_certificate(Bytes::copy_from_slice(&certificate.to_bytes()))
    }

    /// Creates a node with a random [Id] for testing purposes.
    #[cfg(test)]
    pub fn random() -> Node {
        Node::new(Id::random(), SocketAddr::from(([0, 0, 0, 0], 0)))
    }

    /// Creates a node with a random Id listening on localhost port `i`, for testing purposes.
    #[cfg(test)]
    pub fn unique(i: usize) -> Node {
        Node::new(Id::random(), SocketAddr::from(([127, 0, 0, 1], i as u16)))
    }

    pub fn with_certificate(mut self, certificate: Bytes) -> Self {
        self.certificate = certificate;
        self
    }

    pub fn with_metadata(mut self, metadata: Bytes) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_address(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    // === Getters ===

    pub fn id(&self) -> &Id {
        &self.id
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    /// Opaque certificate bytes as advertised by the node.
    pub fn certificate_bytes(&self) -> &Bytes {
        &self.certificate
    }

    /// Opaque application metadata, passed through untouched.
    pub fn metadata(&self) -> &Bytes {
        &self.metadata
    }

    /// Parse this node's [Certificate].
    pub fn certificate(&self) -> Result<Certificate> {
        Certificate::from_bytes(&self.certificate)
    }

    // === Public Methods ===

    /// Returns `true` if this node carries a self-signed [Certificate] whose
    /// digest is its [Id].
    ///
    /// Contacts failing this check chose their own position in the key space.
    pub fn is_authentic(&self) -> bool {
        self.certificate()
            .is_ok_and(|certificate| certificate.verify() && certificate.id() == self.id)
    }

    /// Returns true if both nodes have the same ip and port
    pub fn same_address(&self, other: &Self) -> bool {
        self.address == other.address
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(&self.to_wire())?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Node> {
        let wire: WireNode = serde_bencode::from_bytes(bytes.as_ref())?;

        Node::from_wire(wire)
    }

    pub(crate) fn to_wire(&self) -> WireNode {
        WireNode {
            id: ByteBuf::from(self.id.to_vec()),
            host: self.address.ip().to_string(),
            port: self.address.port(),
            certificate: ByteBuf::from(self.certificate.to_vec()),
            metadata: ByteBuf::from(self.metadata.to_vec()),
        }
    }

    pub(crate) fn from_wire(wire: WireNode) -> Result<Node> {
        let ip: IpAddr = wire
            .host
            .parse()
            .map_err(|_| Error::InvalidAddress(wire.host.clone()))?;

        Ok(Node {
            id: Id::from_bytes(&wire.id)?,
            address: SocketAddr::new(ip, wire.port),
            certificate: wire.certificate.into_vec().into(),
            metadata: wire.metadata.into_vec().into(),
        })
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl Hash for Node {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub(crate) struct WireNode {
    #[serde(rename = "i")]
    pub id: ByteBuf,

    #[serde(rename = "h")]
    pub host: String,

    #[serde(rename = "p")]
    pub port: u16,

    #[serde(rename = "c")]
    pub certificate: ByteBuf,

    #[serde(rename = "m")]
    pub metadata: ByteBuf,
}
