//! Requests awaiting their response, keyed by nonce.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

use flume::Sender;
use lru::LruCache;

use crate::common::{Command, Id, Node, Nonce};

use super::response::{CallError, CallResponse, CallResult, Reply};

/// How many completed nonces are remembered to recognize late responses.
const MAX_COMPLETED_NONCES: usize = 1024;

#[derive(Debug)]
pub struct PendingRequest {
    pub node: Node,
    pub command: Command,
    pub deadline: Instant,
    sender: Sender<CallResult>,
}

#[derive(Debug)]
/// Outgoing requests that are still waiting for a response.
///
/// Every entry completes exactly once: resolved by a matching response,
/// or failed with [CallError::Timeout] by [PendingRequests::expire].
pub struct PendingRequests {
    requests: HashMap<Nonce, PendingRequest>,
    completed: LruCache<Nonce, ()>,
    timeout: Duration,
}

impl PendingRequests {
    pub fn new(timeout: Duration) -> Self {
        Self {
            requests: HashMap::new(),
            completed: LruCache::new(
                NonZeroUsize::new(MAX_COMPLETED_NONCES).unwrap_or(NonZeroUsize::MIN),
            ),
            timeout,
        }
    }

    // === Getters ===

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    // === Public Methods ===

    /// Track a request sent to `node`, returning a handle to its result.
    pub fn register(&mut self, nonce: Nonce, node: Node, command: Command) -> CallResponse {
        self.register_at(nonce, node, command, Instant::now())
    }

    pub(crate) fn register_at(
        &mut self,
        nonce: Nonce,
        node: Node,
        command: Command,
        now: Instant,
    ) -> CallResponse {
        let (sender, receiver) = flume::bounded(1);

        self.requests.insert(
            nonce,
            PendingRequest {
                node,
                command,
                deadline: now + self.timeout,
                sender,
            },
        );

        CallResponse::new(receiver)
    }

    pub fn contains(&self, nonce: &Nonce) -> bool {
        self.requests.contains_key(nonce)
    }

    /// Returns `true` if this nonce belonged to one of our requests that already
    /// completed, so a message carrying it is a late response.
    pub fn is_completed(&self, nonce: &Nonce) -> bool {
        self.completed.contains(nonce)
    }

    /// Returns `true` if a request to this node is still waiting for a response.
    pub fn is_pending_for(&self, id: &Id) -> bool {
        self.requests.values().any(|request| request.node.id() == id)
    }

    /// Complete the request with this nonce, returning it, or None if it is not
    /// (or no longer) pending.
    pub fn resolve(&mut self, nonce: &Nonce, reply: Reply) -> Option<PendingRequest> {
        let request = self.requests.remove(nonce)?;
        self.completed.put(*nonce, ());

        // The caller may have dropped its handle, that's fine.
        let _ = request.sender.send(Ok(reply));

        Some(request)
    }

    /// Fail every request whose deadline has passed, returning them.
    pub fn expire(&mut self, now: Instant) -> Vec<(Nonce, PendingRequest)> {
        let expired: Vec<Nonce> = self
            .requests
            .iter()
            .filter(|(_, request)| request.deadline <= now)
            .map(|(nonce, _)| *nonce)
            .collect();

        expired
            .into_iter()
            .filter_map(|nonce| {
                let request = self.requests.remove(&nonce)?;
                self.completed.put(nonce, ());
                let _ = request.sender.send(Err(CallError::Timeout));

                Some((nonce, request))
            })
            .collect()
    }
}
