use crate::common::{Id, Node};

#[derive(Debug, Clone)]
/// Nodes sorted by ascending XOR distance to a target, capped at `limit`.
pub struct ClosestNodes {
    target: Id,
    limit: usize,
    nodes: Vec<Node>,
}

impl ClosestNodes {
    pub fn new(target: Id, limit: usize) -> Self {
        Self {
            target,
            limit,
            nodes: Vec::with_capacity(limit),
        }
    }

    // === Getters ===

    pub fn target(&self) -> Id {
        self.target
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    // === Public Methods ===

    /// Insert a node in order, ignoring duplicates and anything beyond the limit.
    pub fn add(&mut self, node: Node) {
        let seek = node.id().xor(&self.target);

        if let Err(pos) = self.nodes.binary_search_by(|probe| {
            if probe.id() == node.id() {
                std::cmp::Ordering::Equal
            } else {
                // Distinct ids never have the same distance to a target.
                probe.id().xor(&self.target).cmp(&seek)
            }
        }) {
            if pos < self.limit {
                self.nodes.insert(pos, node);
                self.nodes.truncate(self.limit);
            }
        }
    }

    /// Returns true if `id` is closer to the target than the furthest node so far,
    /// or if there is still room for more nodes.
    pub fn accepts(&self, id: &Id) -> bool {
        match self.nodes.last() {
            Some(furthest) if self.nodes.len() >= self.limit => {
                id.xor(&self.target) < furthest.id().xor(&self.target)
            }
            _ => self.limit > 0,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn into_nodes(self) -> Vec<Node> {
        self.nodes
    }
}
