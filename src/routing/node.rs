use std::net::SocketAddr;
use std::time::Instant;

use crate::id::NodeId;
use crate::message::compact_info;

/// Lifecycle state of a remote node.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum NodeStatus {
    /// Never answered one of our queries.
    Unknown,
    /// Most recent query to the node was answered on time.
    Good,
    /// Consecutive unanswered queries reached the retry ceiling.
    Bad,
}

/// Node participating in the DHT.
///
/// State changes go through `seen`, `touch` and `failed` so that the invariants between
/// `status`, `failed_count` and `last_seen` always hold.
#[derive(Clone, Debug)]
pub struct Node {
    id:           NodeId,
    addr:         SocketAddr,
    last_seen:    Instant,
    failed_count: usize,
    status:       NodeStatus,
    token:        Option<Vec<u8>>,
}

impl Node {
    /// Create a node we have not yet heard a response from.
    pub fn new(id: NodeId, addr: SocketAddr) -> Node {
        Node {
            id,
            addr,
            last_seen: Instant::now(),
            failed_count: 0,
            status: NodeStatus::Unknown,
            token: None,
        }
    }

    /// Create a node that has just responded to us.
    pub fn as_good(id: NodeId, addr: SocketAddr) -> Node {
        let mut node = Node::new(id, addr);
        node.seen();

        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn last_seen(&self) -> Instant {
        self.last_seen
    }

    pub fn failed_count(&self) -> usize {
        self.failed_count
    }

    pub fn status(&self) -> NodeStatus {
        self.status
    }

    /// Token the node handed us in its most recent `get_peers` response.
    pub fn token(&self) -> Option<&[u8]> {
        self.token.as_ref().map(|token| &token[..])
    }

    pub fn set_token(&mut self, token: Vec<u8>) {
        self.token = Some(token);
    }

    /// Node sent a verified response to one of our queries.
    pub fn seen(&mut self) {
        self.last_seen = Instant::now();
        self.failed_count = 0;
        self.status = NodeStatus::Good;
    }

    /// Node sent us a query; proof of life but not of reachability.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    /// One of our queries to the node went unanswered.
    ///
    /// Once `ceiling` consecutive failures accumulate the node is `Bad`. The last seen
    /// time keeps pointing at the last successful contact.
    pub fn failed(&mut self, ceiling: usize) -> NodeStatus {
        self.failed_count += 1;

        if self.failed_count >= ceiling {
            self.status = NodeStatus::Bad;
        }

        self.status
    }

    /// Fold what another record of the same node knows into this one.
    pub fn refresh_from(&mut self, other: &Node) {
        match other.status {
            NodeStatus::Good => self.seen(),
            _ => self.touch(),
        }

        if let Some(token) = other.token.as_ref() {
            self.token = Some(token.clone());
        }
    }

    /// Compact node info for the node (26 bytes for IPv4, 38 bytes for IPv6).
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(compact_info::BYTES_PER_COMPACT_NODE_INFO_V6);
        compact_info::write_compact_node(&self.id, &self.addr, &mut buffer);

        buffer
    }

    #[cfg(test)]
    pub(crate) fn with_last_seen(mut self, last_seen: Instant) -> Node {
        self.last_seen = last_seen;
        self
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Node) -> bool {
        self.id == other.id && self.addr == other.addr
    }
}

impl Eq for Node {}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::id::NodeId;
    use crate::routing::node::{Node, NodeStatus};

    fn dummy_socket_addr() -> SocketAddr {
        "127.0.0.1:6881".parse().unwrap()
    }

    fn dummy_node_id() -> NodeId {
        NodeId::from(*b"abcdefghij0123456789")
    }

    #[test]
    fn positive_initially_unknown() {
        let node = Node::new(dummy_node_id(), dummy_socket_addr());

        assert_eq!(NodeStatus::Unknown, node.status());
        assert_eq!(0, node.failed_count());
        assert!(node.token().is_none());
    }

    #[test]
    fn positive_response_makes_good() {
        let mut node = Node::new(dummy_node_id(), dummy_socket_addr());
        node.failed(3);
        node.failed(3);

        node.seen();
        assert_eq!(NodeStatus::Good, node.status());
        assert_eq!(0, node.failed_count());
    }

    #[test]
    fn positive_failures_reach_bad_at_ceiling() {
        let mut node = Node::as_good(dummy_node_id(), dummy_socket_addr());
        let last_seen = node.last_seen();

        assert_eq!(NodeStatus::Good, node.failed(3));
        assert_eq!(NodeStatus::Good, node.failed(3));
        assert_eq!(NodeStatus::Bad, node.failed(3));
        assert_eq!(3, node.failed_count());
        assert_eq!(last_seen, node.last_seen());
    }

    #[test]
    fn positive_touch_keeps_failures() {
        let mut node = Node::new(dummy_node_id(), dummy_socket_addr());
        node.failed(3);
        node.touch();

        assert_eq!(1, node.failed_count());
        assert_eq!(NodeStatus::Unknown, node.status());
    }

    #[test]
    fn positive_encode_v4_and_v6() {
        let v4 = Node::new(dummy_node_id(), dummy_socket_addr());
        let v6 = Node::new(dummy_node_id(), "[::1]:6881".parse().unwrap());

        let v4_bytes = v4.encode();
        assert_eq!(26, v4_bytes.len());
        assert_eq!(&b"abcdefghij0123456789"[..], &v4_bytes[..20]);
        assert_eq!(&[127, 0, 0, 1, 0x1A, 0xE1][..], &v4_bytes[20..]);

        assert_eq!(38, v6.encode().len());
    }

    #[test]
    fn negative_different_addr_not_equal() {
        let node_a = Node::new(dummy_node_id(), dummy_socket_addr());
        let node_b = Node::new(dummy_node_id(), "127.0.0.2:6881".parse().unwrap());

        assert!(node_a != node_b);
    }
}
