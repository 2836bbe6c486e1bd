//! Iterative lookups converging on the nodes closest to a target.

use std::collections::HashSet;

use bytes::Bytes;
use flume::Sender;
use tracing::{debug, trace};

use crate::common::{ClosestNodes, Command, Id, Node, StoredValue};

use super::response::{CallResponse, FindValueResponse, Reply};

#[derive(Debug)]
/// What to do once a [Lookup] is done.
pub(crate) enum Goal {
    /// Report the closest nodes that responded.
    ClosestNodes(Sender<Vec<Node>>),
    /// Report the values found under the looked up keyword.
    Get(Sender<Vec<StoredValue>>),
    /// Store a record at the closest nodes, reporting whether any accepted it.
    Put {
        keyword: Bytes,
        key: Bytes,
        value: Bytes,
        sender: Sender<bool>,
    },
    /// Delete a record from the closest nodes, reporting whether any deleted it.
    Delete {
        keyword: Bytes,
        key: Bytes,
        signature: Bytes,
        sender: Sender<bool>,
    },
    /// Report the contact with the target id, if the lookup met it.
    Resolve(Sender<Option<Node>>),
}

/// An iterative process of sending FIND_NODE (or FIND_VALUE) requests to the
/// closest known nodes to a target, at most `alpha` at a time, learning closer
/// nodes from their responses, until the `k` closest nodes have all been asked.
///
/// A FIND_VALUE lookup stops asking new nodes as soon as one returns values.
#[derive(Debug)]
pub(crate) struct Lookup {
    requester: Id,
    command: Command,
    arguments: Vec<Bytes>,
    alpha: usize,

    /// Closest nodes according to other nodes.
    candidates: ClosestNodes,
    /// Closest nodes that responded.
    responders: ClosestNodes,
    visited: HashSet<Id>,
    inflight: Vec<(Node, CallResponse)>,

    values: Vec<StoredValue>,
    holders: HashSet<Id>,

    goal: Goal,
}

impl Lookup {
    pub fn new(requester: Id, target: Id, k: usize, alpha: usize, goal: Goal) -> Self {
        let command = if matches!(goal, Goal::Get(_)) {
            Command::FindValue
        } else {
            Command::FindNode
        };

        trace!(?target, ?command, "New lookup");

        Self {
            requester,
            command,
            arguments: vec![Bytes::copy_from_slice(target.as_bytes())],
            alpha: alpha.max(1),

            candidates: ClosestNodes::new(target, k),
            responders: ClosestNodes::new(target, k),
            visited: HashSet::new(),
            inflight: Vec::new(),

            values: Vec::new(),
            holders: HashSet::new(),

            goal,
        }
    }

    /// Use a keyword as the FIND_VALUE argument instead of the target id.
    pub fn with_keyword(mut self, keyword: Bytes) -> Self {
        self.arguments = vec![keyword];
        self
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.candidates.target()
    }

    pub fn command(&self) -> Command {
        self.command
    }

    pub fn arguments(&self) -> &[Bytes] {
        &self.arguments
    }

    /// Closest nodes that responded, closest first.
    pub fn responders(&self) -> &[Node] {
        self.responders.nodes()
    }

    /// Values found by a FIND_VALUE lookup.
    pub fn values(&self) -> &[StoredValue] {
        &self.values
    }

    /// The closest responder that had no value, where found values get cached.
    pub fn nearest_without_value(&self) -> Option<&Node> {
        self.responders
            .nodes()
            .iter()
            .find(|node| !self.holders.contains(node.id()))
    }

    /// The contact with this id, if any responder knew about it.
    pub fn met(&self, id: &Id) -> Option<&Node> {
        self.responders
            .nodes()
            .iter()
            .chain(self.candidates.nodes())
            .find(|node| node.id() == id)
    }

    /// Returns `true` once nothing is in flight and nothing is left to ask.
    pub fn is_done(&self) -> bool {
        self.inflight.is_empty()
    }

    pub fn into_goal(self) -> Goal {
        self.goal
    }

    // === Public Methods ===

    /// Add a candidate node to ask if it is among the closest nodes.
    pub fn add_candidate(&mut self, node: Node) {
        if node.id() == &self.requester || !node.is_authentic() {
            return;
        }

        self.candidates.add(node);
    }

    /// Collect the results of requests that completed since the last poll.
    pub fn poll(&mut self) {
        for (node, response) in std::mem::take(&mut self.inflight) {
            match response.try_result() {
                None => self.inflight.push((node, response)),
                Some(Ok(reply)) => self.handle_reply(reply),
                Some(Err(error)) => {
                    trace!(?error, id = ?node.id(), "Lookup request failed");
                }
            }
        }
    }

    /// The closest candidates not asked yet, within the `alpha` parallelism budget.
    ///
    /// They are marked as visited, callers must [Lookup::visiting] each.
    pub fn next_to_visit(&mut self) -> Vec<Node> {
        if self.command == Command::FindValue && !self.values.is_empty() {
            return vec![];
        }

        let budget = self.alpha.saturating_sub(self.inflight.len());

        let to_visit: Vec<Node> = self
            .candidates
            .nodes()
            .iter()
            .filter(|node| !self.visited.contains(node.id()))
            .take(budget)
            .cloned()
            .collect();

        for node in &to_visit {
            self.visited.insert(*node.id());
        }

        to_visit
    }

    /// Track a request sent to a node.
    pub fn visiting(&mut self, node: Node, response: CallResponse) {
        self.inflight.push((node, response));
    }

    // === Private Methods ===

    fn handle_reply(&mut self, reply: Reply) {
        let from = reply.from.clone();

        let nodes = match self.command {
            Command::FindValue => match reply.find_value() {
                Ok(FindValueResponse::Values(values)) => {
                    self.holders.insert(*from.id());

                    for value in values {
                        if !self.values.iter().any(|found| found.key == value.key) {
                            self.values.push(value);
                        }
                    }

                    vec![]
                }
                Ok(FindValueResponse::Nodes(nodes)) => nodes,
                Err(error) => {
                    debug!(?error, id = ?from.id(), "Invalid FIND_VALUE response");
                    vec![]
                }
            },
            _ => reply.nodes().unwrap_or_else(|error| {
                debug!(?error, id = ?from.id(), "Invalid FIND_NODE response");
                vec![]
            }),
        };

        for node in nodes {
            self.add_candidate(node);
        }

        self.responders.add(from);
    }
}

#[cfg(test)]
mod test {
    use std::net::SocketAddr;

    use ed25519_dalek::SigningKey;

    use crate::common::VALUE;

    use super::*;

    fn signed(i: u8) -> Node {
        Node::from_signing_key(
            &SigningKey::from_bytes(&[i; 32]),
            SocketAddr::from(([10, 0, 0, i], 4000)),
        )
    }

    fn resolved(reply: Reply) -> CallResponse {
        let (sender, receiver) = flume::bounded(1);
        sender.send(Ok(reply)).unwrap();

        CallResponse::new(receiver)
    }

    #[test]
    fn visits_closest_within_budget() {
        let (sender, _receiver) = flume::bounded(1);
        let mut lookup =
            Lookup::new(Id::random(), Id::random(), 20, 2, Goal::ClosestNodes(sender));

        for i in 1..=5 {
            lookup.add_candidate(signed(i));
        }

        // Unauthenticated candidates are never asked.
        lookup.add_candidate(Node::new(Id::random(), "10.0.0.9:1".parse().unwrap()));

        let first = lookup.next_to_visit();
        assert_eq!(first.len(), 2);

        let (_pending, receiver) = flume::bounded(1);
        for node in first.clone() {
            lookup.visiting(node, CallResponse::new(receiver.clone()));
        }

        assert!(lookup.next_to_visit().is_empty());
        assert!(!lookup.is_done());

        let target = lookup.target();
        let distances: Vec<Id> = first.iter().map(|node| node.id().xor(&target)).collect();
        let mut all: Vec<Id> = (1..=5).map(|i| signed(i).id().xor(&target)).collect();
        all.sort();

        assert_eq!(distances, all[..2].to_vec());
    }

    #[test]
    fn find_value_stops_at_values() {
        let (sender, _receiver) = flume::bounded(1);
        let mut lookup = Lookup::new(Id::random(), Id::random(), 20, 3, Goal::Get(sender))
            .with_keyword(Bytes::from_static(b"Keyword"));

        assert_eq!(lookup.command(), Command::FindValue);
        assert_eq!(lookup.arguments(), &[Bytes::from_static(b"Keyword")]);

        let holder = signed(1);
        lookup.add_candidate(holder.clone());
        lookup.add_candidate(signed(2));

        for node in lookup.next_to_visit() {
            let arguments = if node == holder {
                vec![
                    Bytes::from_static(VALUE),
                    StoredValue::new(Bytes::from_static(b"Key"), Bytes::from_static(b"Value"))
                        .to_bytes()
                        .unwrap()
                        .into(),
                ]
            } else {
                vec![signed(3).to_bytes().unwrap().into()]
            };

            lookup.visiting(
                node.clone(),
                resolved(Reply {
                    from: node,
                    arguments,
                }),
            );
        }

        lookup.poll();

        assert!(lookup.is_done());
        assert!(lookup.next_to_visit().is_empty());
        assert_eq!(lookup.values().len(), 1);
        assert_eq!(lookup.responders().len(), 2);
        assert_eq!(lookup.nearest_without_value(), Some(&signed(2)));
        assert_eq!(lookup.met(signed(3).id()), Some(&signed(3)));
    }
}
