use std::slice::Iter;
use std::time::{Duration, Instant};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{NodeId, NODE_ID_BITS};
use crate::routing::node::Node;

/// Maximum number of nodes that should reside in any bucket.
pub const MAX_BUCKET_SIZE: usize = 8;

/// Bucket owning every identifier that starts with a fixed bit prefix.
///
/// A prefix of `depth` bits covers the half open range `[min, max + 1)`. The full space
/// is the bucket with depth zero, which is why the range is stored as a prefix rather
/// than as two 160 bit bounds.
#[derive(Clone, Debug)]
pub struct Bucket {
    prefix:       NodeId,
    depth:        usize,
    // Sorted by last seen, stalest first
    nodes:        Vec<Node>,
    replacement:  Option<Node>,
    last_changed: Instant,
}

impl Bucket {
    /// Create a bucket covering the whole identifier space.
    pub fn new() -> Bucket {
        Bucket::with_range(NodeId::MIN, 0)
    }

    fn with_range(prefix: NodeId, depth: usize) -> Bucket {
        Bucket {
            prefix: prefix.with_suffix(depth, &NodeId::MIN),
            depth,
            nodes: Vec::with_capacity(MAX_BUCKET_SIZE),
            replacement: None,
            last_changed: Instant::now(),
        }
    }

    /// Whether the identifier falls within the range of this bucket.
    pub fn contains(&self, id: &NodeId) -> bool {
        self.prefix.shares_prefix(id, self.depth)
    }

    /// Smallest identifier in the range.
    pub fn min(&self) -> NodeId {
        self.prefix
    }

    /// Largest identifier in the range (inclusive).
    pub fn max(&self) -> NodeId {
        self.prefix.with_suffix(self.depth, &NodeId::MAX)
    }

    /// Number of leading bits shared by every identifier in the range.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Random identifier within the range.
    pub fn random_id(&self) -> NodeId {
        self.prefix.with_suffix(self.depth, &NodeId::random())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.nodes.len() >= MAX_BUCKET_SIZE
    }

    /// Iterator over the members, stalest first.
    pub fn iter(&self) -> Iter<Node> {
        self.nodes.iter()
    }

    /// Node waiting for a vacancy, if any.
    pub fn replacement(&self) -> Option<&Node> {
        self.replacement.as_ref()
    }

    pub fn last_changed(&self) -> Instant {
        self.last_changed
    }

    /// Whether the bucket has gone `interval` without a membership change.
    pub fn needs_refresh(&self, now: Instant, interval: Duration) -> bool {
        now.saturating_duration_since(self.last_changed) >= interval
    }

    pub fn find(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == *id)
    }

    pub(crate) fn mark_changed(&mut self) {
        self.last_changed = Instant::now();
    }

    /// Apply `update` to the member with the given id and restore the ordering.
    pub(crate) fn update<F, R>(&mut self, id: &NodeId, update: F) -> Option<R>
    where
        F: FnOnce(&mut Node) -> R,
    {
        let result = self.nodes.iter_mut().find(|node| node.id() == *id).map(update);

        if result.is_some() {
            self.sort();
        }

        result
    }

    pub(crate) fn insert(&mut self, node: Node) -> DhtResult<()> {
        self.check_range(&node)?;

        if self.is_full() {
            return Err(DhtError::from_kind(DhtErrorKind::RangeViolation {
                details: format!("Inserted {:?} Into A Full Bucket", node.id()),
            }));
        }

        if self.replacement.as_ref().map_or(false, |r| r.id() == node.id()) {
            self.replacement = None;
        }

        self.nodes.push(node);
        self.sort();
        self.mark_changed();

        Ok(())
    }

    pub(crate) fn set_replacement(&mut self, node: Node) -> DhtResult<()> {
        self.check_range(&node)?;
        self.replacement = Some(node);

        Ok(())
    }

    /// Empty the replacement slot if it holds the given id.
    pub(crate) fn take_replacement(&mut self, id: &NodeId) -> Option<Node> {
        match self.replacement {
            Some(ref node) if node.id() == *id => self.replacement.take(),
            _ => None,
        }
    }

    /// Remove a member, promoting the replacement into the vacancy if `promote` is set.
    pub(crate) fn remove(&mut self, id: &NodeId, promote: bool) -> Option<Node> {
        let index = self.nodes.iter().position(|node| node.id() == *id)?;
        let removed = self.nodes.remove(index);

        if promote {
            if let Some(replacement) = self.replacement.take() {
                self.nodes.push(replacement);
                self.sort();
            }
        }
        self.mark_changed();

        Some(removed)
    }

    /// Split the bucket at the midpoint of its range.
    pub(crate) fn split(self) -> (Bucket, Bucket) {
        let depth = self.depth + 1;
        let mut lower = Bucket::with_range(self.prefix, depth);
        let mut upper = Bucket::with_range(self.prefix.flip_bit(self.depth), depth);

        for node in self.nodes.into_iter() {
            if lower.contains(&node.id()) {
                lower.nodes.push(node);
            } else {
                upper.nodes.push(node);
            }
        }

        if let Some(replacement) = self.replacement {
            if lower.contains(&replacement.id()) {
                lower.replacement = Some(replacement);
            } else {
                upper.replacement = Some(replacement);
            }
        }

        (lower, upper)
    }

    /// Whether the bucket can still be split.
    pub fn can_split(&self) -> bool {
        self.depth < NODE_ID_BITS
    }

    fn check_range(&self, node: &Node) -> DhtResult<()> {
        if self.contains(&node.id()) {
            Ok(())
        } else {
            Err(DhtError::from_kind(DhtErrorKind::RangeViolation {
                details: format!("{:?} Lies Outside Of [{:?}, {:?}]", node.id(), self.min(), self.max()),
            }))
        }
    }

    fn sort(&mut self) {
        self.nodes.sort_by_key(|node| node.last_seen());
    }
}

impl Default for Bucket {
    fn default() -> Bucket {
        Bucket::new()
    }
}
