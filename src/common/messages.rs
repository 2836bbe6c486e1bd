//! Serialize and deserialize RPC envelopes.

mod internal;

use std::fmt::{self, Debug, Formatter};

use bytes::Bytes;
use rand::Rng;
use serde_bytes::ByteBuf;

use crate::common::Node;
use crate::{Error, Result};

/// Size of a request nonce in bytes.
pub const NONCE_SIZE: usize = 20;

/// Response argument for accepted STORE and authorized DELETE requests.
pub const TRUE: &[u8] = b"True";
/// Response argument for rejected DELETE requests.
pub const FALSE: &[u8] = b"False";
/// First response argument of a FIND_VALUE request that found values.
pub const VALUE: &[u8] = b"value";

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
/// Random correlation token tying a request to its response.
pub struct Nonce(pub [u8; NONCE_SIZE]);

impl Nonce {
    pub fn random() -> Nonce {
        let mut rng = rand::thread_rng();

        Nonce(rng.gen())
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Nonce> {
        let bytes = bytes.as_ref();

        let nonce: [u8; NONCE_SIZE] = bytes
            .try_into()
            .map_err(|_| Error::InvalidNonce(bytes.to_vec()))?;

        Ok(Nonce(nonce))
    }
}

impl Debug for Nonce {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Nonce(")?;
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        write!(f, ")")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
/// RPC commands, and their code on the wire.
pub enum Command {
    Ping,
    Store,
    FindNode,
    FindValue,
    Delete,
    Stun,
}

impl Command {
    pub fn code(&self) -> i64 {
        match self {
            Command::Ping => 0,
            Command::Store => 1,
            Command::FindNode => 2,
            Command::FindValue => 3,
            Command::Delete => 4,
            Command::Stun => 5,
        }
    }
}

impl TryFrom<i64> for Command {
    type Error = Error;

    fn try_from(code: i64) -> Result<Command> {
        Ok(match code {
            0 => Command::Ping,
            1 => Command::Store,
            2 => Command::FindNode,
            3 => Command::FindValue,
            4 => Command::Delete,
            5 => Command::Stun,
            _ => return Err(Error::UnknownCommand(code)),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
/// RPC envelope. Requests and responses share this shape, a response reuses
/// the nonce of its request.
pub struct Message {
    pub nonce: Nonce,

    pub sender: Node,

    pub command: Command,

    /// Command specific arguments, their order is significant.
    pub arguments: Vec<Bytes>,
}

impl Message {
    /// Create a request with a fresh random nonce.
    pub fn request(sender: Node, command: Command, arguments: Vec<Bytes>) -> Message {
        Message {
            nonce: Nonce::random(),
            sender,
            command,
            arguments,
        }
    }

    /// Create the response to this message, reusing its nonce and command.
    pub fn response(&self, sender: Node, arguments: Vec<Bytes>) -> Message {
        Message {
            nonce: self.nonce,
            sender,
            command: self.command,
            arguments,
        }
    }

    fn into_serde_message(self) -> internal::DHTMessage {
        internal::DHTMessage {
            nonce: ByteBuf::from(self.nonce.0.to_vec()),
            sender: self.sender.to_wire(),
            command: self.command.code(),
            arguments: self
                .arguments
                .into_iter()
                .map(|argument| ByteBuf::from(argument.to_vec()))
                .collect(),
        }
    }

    fn from_serde_message(msg: internal::DHTMessage) -> Result<Message> {
        Ok(Message {
            nonce: Nonce::from_bytes(&msg.nonce)?,
            sender: Node::from_wire(msg.sender)?,
            command: Command::try_from(msg.command)?,
            arguments: msg
                .arguments
                .into_iter()
                .map(|argument| Bytes::from(argument.into_vec()))
                .collect(),
        })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(self.clone().into_serde_message().to_bytes()?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<Message> {
        Message::from_serde_message(internal::DHTMessage::from_bytes(bytes.as_ref())?)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// A `(key, value)` pair as returned by FIND_VALUE.
pub struct StoredValue {
    pub key: Bytes,
    pub value: Bytes,
}

impl StoredValue {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_bencode::to_bytes(&internal::DHTStoredValue {
            key: ByteBuf::from(self.key.to_vec()),
            value: ByteBuf::from(self.value.to_vec()),
        })?)
    }

    pub fn from_bytes<T: AsRef<[u8]>>(bytes: T) -> Result<StoredValue> {
        let stored: internal::DHTStoredValue = serde_bencode::from_bytes(bytes.as_ref())?;

        Ok(StoredValue {
            key: stored.key.into_vec().into(),
            value: stored.value.into_vec().into(),
        })
    }
}
