use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::id::NodeId;
use crate::routing::node::Node;

/// Bounded set of the nodes closest to a target seen so far.
///
/// Backed by a max heap keyed on distance to the target so the farthest member is
/// always the one considered for eviction.
#[derive(Clone, Debug)]
pub struct ClosestNodes {
    target:   NodeId,
    capacity: usize,
    heap:     BinaryHeap<DistanceEntry>,
}

impl ClosestNodes {
    pub fn new(target: NodeId, capacity: usize) -> ClosestNodes {
        ClosestNodes {
            target,
            capacity,
            heap: BinaryHeap::with_capacity(capacity + 1),
        }
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.heap.len() >= self.capacity
    }

    /// Offer a node to the set.
    ///
    /// Returns true if the node was inserted, evicting the current farthest member if the
    /// set was full.
    pub fn add(&mut self, node: Node) -> bool {
        if self.contains(&node.id()) {
            return false;
        }

        let distance = self.target.distance(&node.id());
        if !self.is_full() {
            self.heap.push(DistanceEntry { distance, node });
            return true;
        }

        let closer = self.heap.peek().map_or(false, |farthest| distance < farthest.distance);
        if closer {
            self.heap.pop();
            self.heap.push(DistanceEntry { distance, node });
        }

        closer
    }

    /// Remove the node with the given id, returning true if anything changed.
    pub fn remove(&mut self, id: &NodeId) -> bool {
        let before = self.heap.len();
        let mut entries = std::mem::take(&mut self.heap).into_vec();
        entries.retain(|entry| entry.node.id() != *id);

        self.heap = BinaryHeap::from(entries);
        self.heap.len() != before
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.heap.iter().any(|entry| entry.node.id() == *id)
    }

    /// Member farthest from the target.
    pub fn farthest(&self) -> Option<&Node> {
        self.heap.peek().map(|entry| &entry.node)
    }

    /// Members in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.heap.iter().map(|entry| &entry.node)
    }

    /// Copy of the members, closest first.
    pub fn sorted(&self) -> Vec<Node> {
        self.clone().into_sorted()
    }

    /// Consume the set, returning the members closest first.
    pub fn into_sorted(self) -> Vec<Node> {
        self.heap.into_sorted_vec().into_iter().map(|entry| entry.node).collect()
    }
}

#[derive(Clone, Debug)]
struct DistanceEntry {
    distance: NodeId,
    node:     Node,
}

impl PartialEq for DistanceEntry {
    fn eq(&self, other: &DistanceEntry) -> bool {
        self.distance == other.distance
    }
}

impl Eq for DistanceEntry {}

impl PartialOrd for DistanceEntry {
    fn partial_cmp(&self, other: &DistanceEntry) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DistanceEntry {
    fn cmp(&self, other: &DistanceEntry) -> Ordering {
        self.distance.cmp(&other.distance)
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::id::NodeId;
    use crate::routing::closest::ClosestNodes;
    use crate::routing::node::Node;

    fn dummy_node(id: NodeId) -> Node {
        let addr: SocketAddr = "127.0.0.1:6881".parse().unwrap();

        Node::new(id, addr)
    }

    #[test]
    fn positive_holds_closest_k() {
        let target = NodeId::random();
        let mut closest = ClosestNodes::new(target, 8);
        let mut offered = Vec::new();

        for _ in 0..200 {
            let node = dummy_node(NodeId::random());
            offered.push(node.id());
            closest.add(node);
        }

        assert_eq!(8, closest.len());
        let farthest = target.distance(&closest.farthest().unwrap().id());
        for id in offered.iter().filter(|id| !closest.contains(id)) {
            assert!(target.distance(id) > farthest);
        }
    }

    #[test]
    fn positive_sorted_closest_first() {
        let target = NodeId::MIN;
        let mut closest = ClosestNodes::new(target, 3);

        closest.add(dummy_node(NodeId::MAX));
        closest.add(dummy_node(NodeId::MIN.flip_bit(159)));
        closest.add(dummy_node(NodeId::MIN.flip_bit(0)));
        assert!(closest.add(dummy_node(NodeId::MIN.flip_bit(80))));

        let ids: Vec<NodeId> = closest.into_sorted().iter().map(|node| node.id()).collect();
        assert_eq!(vec![NodeId::MIN.flip_bit(159), NodeId::MIN.flip_bit(80), NodeId::MIN.flip_bit(0)], ids);
    }

    #[test]
    fn positive_remove_and_contains() {
        let mut closest = ClosestNodes::new(NodeId::MIN, 8);
        let id = NodeId::random();
        closest.add(dummy_node(id));

        assert!(closest.contains(&id));
        assert!(closest.remove(&id));
        assert!(!closest.contains(&id));
        assert!(!closest.remove(&id));
    }

    #[test]
    fn negative_duplicate_add() {
        let mut closest = ClosestNodes::new(NodeId::MIN, 8);
        let id = NodeId::random();

        assert!(closest.add(dummy_node(id)));
        assert!(!closest.add(dummy_node(id)));
        assert_eq!(1, closest.len());
    }

    #[test]
    fn negative_farther_node_rejected_when_full() {
        let mut closest = ClosestNodes::new(NodeId::MIN, 1);

        assert!(closest.add(dummy_node(NodeId::MIN.flip_bit(100))));
        assert!(!closest.add(dummy_node(NodeId::MAX)));
        assert_eq!(NodeId::MIN.flip_bit(100), closest.farthest().unwrap().id());
    }
}
