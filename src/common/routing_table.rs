//! Kademlia routing table

use std::collections::BTreeMap;
use std::slice::Iter;
use std::time::{Duration, Instant};

use crate::common::{ClosestNodes, Id, Node};

/// K = the default maximum size of a k-bucket.
pub const MAX_BUCKET_SIZE_K: usize = 20;

#[derive(Debug, Clone, PartialEq)]
/// What [RoutingTable::add] did with a node.
pub enum AddOutcome {
    /// The node is new to the table.
    Inserted,
    /// The node was already known, it is now the most recently seen in its bucket.
    Updated,
    /// The bucket is full, so the node waits in the bucket's replacement cache.
    ///
    /// `least_recent` is the contact that should be probed, if it doesn't respond
    /// it gets removed and the freshest replacement takes its place.
    Full { least_recent: Node },
    /// The node is this routing table's own id.
    Ignored,
}

#[derive(Debug, Clone)]
/// Kademlia routing table
///
/// Buckets are indexed by the length of the prefix a node id shares with the local id,
/// and are only allocated once a node falls in their range.
pub struct RoutingTable {
    id: Id,
    k: usize,
    buckets: BTreeMap<u8, KBucket>,
}

impl RoutingTable {
    /// Create a new [RoutingTable] with a given id.
    pub fn new(id: Id) -> Self {
        Self::with_bucket_size(id, MAX_BUCKET_SIZE_K)
    }

    /// Create a new [RoutingTable] with buckets holding up to `k` nodes.
    pub fn with_bucket_size(id: Id, k: usize) -> Self {
        RoutingTable {
            id,
            k,
            buckets: BTreeMap::new(),
        }
    }

    /// Returns the [Id] of this node, where the distance is measured from.
    pub fn id(&self) -> &Id {
        &self.id
    }

    /// Returns the map of shared prefix lengths and their [KBucket]
    pub fn buckets(&self) -> &BTreeMap<u8, KBucket> {
        &self.buckets
    }

    /// Index of the bucket covering `id`.
    pub fn bucket_index(&self, id: &Id) -> u8 {
        self.id.shared_prefix_len(id)
    }

    // === Public Methods ===

    /// Insert or refresh a node, marking its bucket as updated.
    pub fn add(&mut self, node: Node) -> AddOutcome {
        self.add_at(node, Instant::now())
    }

    pub(crate) fn add_at(&mut self, node: Node, now: Instant) -> AddOutcome {
        if node.id() == &self.id {
            // Do not add self to the routing_table
            return AddOutcome::Ignored;
        }

        let index = self.bucket_index(node.id());
        let k = self.k;

        self.buckets
            .entry(index)
            .or_insert_with(|| KBucket::new(k))
            .add(node, now)
    }

    /// Remove a node from this routing table, promoting a replacement if any.
    pub fn remove(&mut self, node_id: &Id) -> Option<Node> {
        let index = self.bucket_index(node_id);

        self.buckets.get_mut(&index)?.remove(node_id)
    }

    pub fn contains(&self, node_id: &Id) -> bool {
        self.get(node_id).is_some()
    }

    pub fn get(&self, node_id: &Id) -> Option<&Node> {
        self.buckets
            .get(&self.bucket_index(node_id))?
            .iter()
            .find(|node| node.id() == node_id)
    }

    /// Return up to `limit` nodes sorted by ascending XOR distance to `target`,
    /// skipping any node in `exclude`.
    pub fn find_closest(&self, target: &Id, limit: usize, exclude: &[Id]) -> Vec<Node> {
        let mut closest = ClosestNodes::new(*target, limit);

        for bucket in self.buckets.values() {
            for node in bucket.iter() {
                if exclude.contains(node.id()) || !closest.accepts(node.id()) {
                    continue;
                }

                closest.add(node.clone());
            }
        }

        closest.into_nodes()
    }

    /// One random id in the range of every bucket not updated within `stale_after`.
    ///
    /// Looking up these ids repopulates stale buckets.
    pub fn refresh_ids(&self, stale_after: Duration) -> Vec<Id> {
        self.refresh_ids_at(Instant::now(), stale_after)
    }

    pub(crate) fn refresh_ids_at(&self, now: Instant, stale_after: Duration) -> Vec<Id> {
        self.buckets
            .iter()
            .filter(|(_, bucket)| now.saturating_duration_since(bucket.last_updated) > stale_after)
            .map(|(index, _)| self.id.random_in_bucket(*index))
            .collect()
    }

    /// Returns `true` if this routing table is empty.
    pub fn is_empty(&self) -> bool {
        self.buckets.values().all(|bucket| bucket.is_empty())
    }

    /// Return the number of nodes in this routing table.
    pub fn size(&self) -> usize {
        self.buckets
            .values()
            .fold(0, |acc, bucket| acc + bucket.len())
    }

    /// Returns an iterator over the nodes in this routing table.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.buckets.values().flat_map(|bucket| bucket.iter())
    }

    /// Export an owned vector of nodes from this routing table.
    pub fn to_owned_nodes(&self) -> Vec<Node> {
        self.nodes().cloned().collect()
    }

    /// Turn this routing table to a list of bootstrapping nodes, closest to us first.
    pub fn to_bootstrap(&self) -> Vec<String> {
        self.find_closest(&self.id, self.k, &[])
            .iter()
            .map(|n| n.address().to_string())
            .collect()
    }
}

/// Kbuckets are similar to LRU caches that probe and evict unresponsive nodes,
/// without dropping any responsive nodes in the process.
#[derive(Debug, Clone)]
pub struct KBucket {
    /// Nodes in the k-bucket, sorted by the least recently seen.
    nodes: Vec<Node>,
    /// Nodes waiting for room in this bucket, the most recently seen last.
    replacements: Vec<Node>,
    capacity: usize,
    last_updated: Instant,
}

impl KBucket {
    pub fn new(capacity: usize) -> Self {
        KBucket {
            nodes: Vec::with_capacity(capacity),
            replacements: Vec::new(),
            capacity,
            last_updated: Instant::now(),
        }
    }

    // === Getters ===

    pub fn last_updated(&self) -> Instant {
        self.last_updated
    }

    pub fn replacements(&self) -> &[Node] {
        &self.replacements
    }

    // === Public Methods ===

    pub fn add(&mut self, incoming: Node, now: Instant) -> AddOutcome {
        self.last_updated = now;

        if let Some(index) = self.iter().position(|n| n.id() == incoming.id()) {
            // Move to the tail, taking the incoming address in case the node moved.
            self.nodes.remove(index);
            self.nodes.push(incoming);

            AddOutcome::Updated
        } else if self.nodes.len() < self.capacity {
            self.replacements.retain(|n| n.id() != incoming.id());
            self.nodes.push(incoming);

            AddOutcome::Inserted
        } else {
            self.replacements.retain(|n| n.id() != incoming.id());
            self.replacements.push(incoming);

            if self.replacements.len() > self.capacity {
                self.replacements.remove(0);
            }

            match self.nodes.first() {
                Some(least_recent) => AddOutcome::Full {
                    least_recent: least_recent.clone(),
                },
                None => AddOutcome::Ignored,
            }
        }
    }

    pub fn remove(&mut self, node_id: &Id) -> Option<Node> {
        self.replacements.retain(|node| node.id() != node_id);

        let index = self.iter().position(|node| node.id() == node_id)?;
        let removed = self.nodes.remove(index);

        if let Some(replacement) = self.replacements.pop() {
            self.nodes.push(replacement);
        }

        Some(removed)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn iter(&self) -> Iter<'_, Node> {
        self.nodes.iter()
    }

    #[cfg(test)]
    fn contains(&self, id: &Id) -> bool {
        self.iter().any(|node| node.id() == id)
    }
}
