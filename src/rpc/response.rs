//! Responses to outgoing requests, and decoders for their arguments.

use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use flume::{Receiver, TryRecvError};

use crate::common::{Node, StoredValue, TRUE, VALUE};
use crate::{Error, Result};

/// Outcome of an outgoing request.
pub type CallResult = std::result::Result<Reply, CallError>;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
/// Why an outgoing request got no reply.
pub enum CallError {
    /// No response arrived within the request timeout, the contact was evicted.
    #[error("Request timed out")]
    Timeout,

    /// The engine was dropped before the request completed.
    #[error("Request was dropped before it completed")]
    Dropped,

    /// The request doesn't fit in a datagram, it was never sent.
    #[error("Request of {0} bytes is too large to send")]
    TooLarge(usize),

    /// The request could not be encoded, it was never sent.
    #[error("Request could not be encoded")]
    Encoding,
}

#[derive(Debug, Clone, PartialEq)]
/// A response to one of our requests.
pub struct Reply {
    /// The responding node, as it describes itself.
    pub from: Node,
    pub arguments: Vec<Bytes>,
}

impl Reply {
    /// Returns `true` if the first argument is `"True"`, as for accepted STORE
    /// and authorized DELETE requests.
    pub fn is_true(&self) -> bool {
        self.arguments.first().is_some_and(|a| a.as_ref() == TRUE)
    }

    /// Decode the arguments of a FIND_NODE response, each a serialized [Node].
    pub fn nodes(&self) -> Result<Vec<Node>> {
        self.arguments.iter().map(Node::from_bytes).collect()
    }

    /// Decode the arguments of a FIND_VALUE response.
    pub fn find_value(&self) -> Result<FindValueResponse> {
        match self.arguments.split_first() {
            Some((first, values)) if first.as_ref() == VALUE => Ok(FindValueResponse::Values(
                values
                    .iter()
                    .map(StoredValue::from_bytes)
                    .collect::<Result<_>>()?,
            )),
            _ => Ok(FindValueResponse::Nodes(self.nodes()?)),
        }
    }

    /// Decode the arguments of a STUN response: our address as the responder sees it.
    pub fn stun_address(&self) -> Result<SocketAddr> {
        let [host, port] = self.arguments.as_slice() else {
            return Err(Error::InvalidResponse(format!(
                "expected host and port, got {} arguments",
                self.arguments.len()
            )));
        };

        let host = String::from_utf8_lossy(host);
        let port = String::from_utf8_lossy(port);

        let ip: IpAddr = host
            .parse()
            .map_err(|_| Error::InvalidAddress(host.to_string()))?;
        let port: u16 = port
            .parse()
            .map_err(|_| Error::InvalidResponse(format!("invalid port {port}")))?;

        Ok(SocketAddr::new(ip, port))
    }
}

#[derive(Debug, Clone, PartialEq)]
/// What a FIND_VALUE request found.
pub enum FindValueResponse {
    /// The responder stores values under the keyword.
    Values(Vec<StoredValue>),
    /// The responder has no value, these are the closest nodes it knows instead.
    Nodes(Vec<Node>),
}

#[derive(Debug)]
/// Handle to the result of an outgoing request.
///
/// Completes exactly once, with either the [Reply] or a [CallError].
pub struct CallResponse {
    receiver: Receiver<CallResult>,
}

impl CallResponse {
    pub(crate) fn new(receiver: Receiver<CallResult>) -> Self {
        Self { receiver }
    }

    /// A response that already failed, for requests that were never sent.
    pub(crate) fn failed(error: CallError) -> Self {
        let (sender, receiver) = flume::bounded(1);
        let _ = sender.send(Err(error));

        Self { receiver }
    }

    /// The result, if the request has completed.
    pub fn try_result(&self) -> Option<CallResult> {
        match self.receiver.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(CallError::Dropped)),
        }
    }

    /// Block until the request completes.
    pub fn wait(self) -> CallResult {
        self.receiver.recv().unwrap_or(Err(CallError::Dropped))
    }

    #[cfg(feature = "async")]
    /// Await the completion of the request.
    pub async fn recv_async(self) -> CallResult {
        self.receiver
            .recv_async()
            .await
            .unwrap_or(Err(CallError::Dropped))
    }
}
