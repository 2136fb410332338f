use std::slice::Iter;
use std::time::{Duration, Instant};

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::NodeId;
use crate::routing::bucket::{self, Bucket};
use crate::routing::closest::ClosestNodes;
use crate::routing::node::{Node, NodeStatus};

/// Result of offering a node to the `RoutingTable`.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum AddOutcome {
    /// Node became a member of a bucket.
    Inserted,
    /// Node was already a member and its record was refreshed.
    Updated,
    /// Bucket was full, node is waiting in the replacement slot.
    Replacement,
    /// Node carries our own id.
    Rejected,
}

/// Routing table containing buckets that partition the identifier space as well
/// as the id of the local node participating in the dht.
pub struct RoutingTable {
    // Sorted by range, ranges are contiguous and cover the whole space
    buckets:   Vec<Bucket>,
    node_id:   NodeId,
    notifiers: Vec<UnboundedSender<Node>>,
}

impl RoutingTable {
    /// Create a new RoutingTable with the given node id as our id.
    pub fn new(node_id: NodeId) -> RoutingTable {
        RoutingTable {
            buckets: vec![Bucket::new()],
            node_id,
            notifiers: Vec::new(),
        }
    }

    /// Return the node id of the RoutingTable.
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Receive a copy of every node that becomes a bucket member from now on.
    pub fn subscribe(&mut self) -> UnboundedReceiver<Node> {
        let (send, recv) = mpsc::unbounded_channel();
        self.notifiers.push(send);

        recv
    }

    /// Iterator over all buckets in the routing table.
    pub fn buckets(&self) -> Iter<Bucket> {
        self.buckets.iter()
    }

    /// Iterator over every member of every bucket.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.buckets.iter().flat_map(|bucket| bucket.iter())
    }

    /// Total number of bucket members.
    pub fn len(&self) -> usize {
        self.buckets.iter().map(|bucket| bucket.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bucket whose range contains the given id.
    pub fn bucket_for(&self, id: &NodeId) -> Option<&Bucket> {
        self.buckets.iter().find(|bucket| bucket.contains(id))
    }

    /// Find the node with the given id, if it exists.
    pub fn find_node(&self, id: &NodeId) -> Option<&Node> {
        self.bucket_for(id).and_then(|bucket| bucket.find(id))
    }

    /// Closest known nodes to the target, closest first.
    pub fn get_closest(&self, target: &NodeId) -> Vec<Node> {
        let mut closest = ClosestNodes::new(*target, bucket::MAX_BUCKET_SIZE);

        for node in self.nodes() {
            closest.add(node.clone());
        }

        closest.into_sorted()
    }

    /// Offer a node to the table.
    ///
    /// An existing member is refreshed in place. A full bucket that holds our own id is
    /// split, any other full bucket parks the node in its replacement slot.
    pub fn add(&mut self, node: Node) -> DhtResult<AddOutcome> {
        if node.id() == self.node_id {
            return Ok(AddOutcome::Rejected);
        }

        loop {
            let index = self.bucket_index(&node.id())?;
            let local_id = self.node_id;
            let bucket = &mut self.buckets[index];

            if bucket.update(&node.id(), |existing| existing.refresh_from(&node)).is_some() {
                return Ok(AddOutcome::Updated);
            }

            if !bucket.is_full() {
                bucket.insert(node.clone())?;
                self.notify(&node);

                return Ok(AddOutcome::Inserted);
            }

            if bucket.contains(&local_id) && bucket.can_split() {
                self.split_bucket(index);
                continue;
            }

            bucket.set_replacement(node)?;
            return Ok(AddOutcome::Replacement);
        }
    }

    /// Remove a member, promoting its bucket's replacement into the vacancy.
    pub fn remove(&mut self, id: &NodeId) -> Option<Node> {
        let index = self.bucket_index(id).ok()?;
        let bucket = &mut self.buckets[index];
        let promoted = bucket.replacement().map(|node| node.clone());

        let removed = bucket.remove(id, true)?;
        if let Some(promoted) = promoted {
            self.notify(&promoted);
        }

        Some(removed)
    }

    /// Evict the stale member and insert the candidate in its place.
    ///
    /// Returns false if the stale node is no longer a member.
    pub fn replace(&mut self, stale: &NodeId, candidate: Node) -> DhtResult<bool> {
        let index = self.bucket_index(stale)?;
        let bucket = &mut self.buckets[index];

        if !bucket.contains(&candidate.id()) {
            return Err(DhtError::from_kind(DhtErrorKind::RangeViolation {
                details: format!("Replacement {:?} Belongs To A Different Bucket Than {:?}", candidate.id(), stale),
            }));
        }

        if bucket.remove(stale, false).is_none() {
            return Ok(false);
        }
        bucket.insert(candidate.clone())?;
        self.notify(&candidate);

        Ok(true)
    }

    /// Drop the candidate waiting in its bucket's replacement slot.
    ///
    /// Returns false if the slot holds some other node, or nothing.
    pub fn discard_replacement(&mut self, id: &NodeId) -> bool {
        match self.bucket_index(id) {
            Ok(index) => self.buckets[index].take_replacement(id).is_some(),
            Err(_) => false,
        }
    }

    /// Remove every node, leaving a single bucket covering the whole space.
    pub fn clear(&mut self) {
        self.buckets = vec![Bucket::new()];
    }

    /// Record an unanswered query, returning the resulting status of the node.
    pub fn mark_failed(&mut self, id: &NodeId, ceiling: usize) -> Option<NodeStatus> {
        self.update_node(id, |node| node.failed(ceiling))
    }

    /// Record a sign of life from the node without vouching for its reachability.
    pub fn touch(&mut self, id: &NodeId) -> bool {
        self.update_node(id, |node| node.touch()).is_some()
    }

    /// Store the announce token the node handed us.
    pub fn set_token(&mut self, id: &NodeId, token: Vec<u8>) -> bool {
        self.update_node(id, |node| node.set_token(token)).is_some()
    }

    /// Ranges of buckets that have not changed within `interval`.
    pub fn stale_buckets(&self, now: Instant, interval: Duration) -> Vec<(NodeId, usize)> {
        self.buckets
            .iter()
            .filter(|bucket| bucket.needs_refresh(now, interval))
            .map(|bucket| (bucket.min(), bucket.depth()))
            .collect()
    }

    /// Stamp the bucket containing the id as freshly changed.
    pub fn mark_bucket_refreshed(&mut self, id: &NodeId) {
        if let Ok(index) = self.bucket_index(id) {
            self.buckets[index].mark_changed();
        }
    }

    fn update_node<F, R>(&mut self, id: &NodeId, update: F) -> Option<R>
    where
        F: FnOnce(&mut Node) -> R,
    {
        let index = self.bucket_index(id).ok()?;

        self.buckets[index].update(id, update)
    }

    fn bucket_index(&self, id: &NodeId) -> DhtResult<usize> {
        self.buckets.iter().position(|bucket| bucket.contains(id)).ok_or_else(|| {
            DhtError::from_kind(DhtErrorKind::RangeViolation {
                details: format!("No Bucket Covers {:?}", id),
            })
        })
    }

    fn split_bucket(&mut self, index: usize) {
        let (lower, upper) = self.buckets.remove(index).split();

        self.buckets.insert(index, upper);
        self.buckets.insert(index, lower);
    }

    fn notify(&mut self, node: &Node) {
        self.notifiers.retain(|send| send.send(node.clone()).is_ok());
    }
}
