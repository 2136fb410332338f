use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::vec::IntoIter;

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{NodeId, NODE_ID_LEN};
use crate::routing::node::Node;

pub const BYTES_PER_COMPACT_IPV4: usize = 6;
pub const BYTES_PER_COMPACT_IPV6: usize = 18;
pub const BYTES_PER_COMPACT_NODE_INFO_V4: usize = NODE_ID_LEN + BYTES_PER_COMPACT_IPV4;
pub const BYTES_PER_COMPACT_NODE_INFO_V6: usize = NODE_ID_LEN + BYTES_PER_COMPACT_IPV6;

/// Write the compact form of an address (ip octets followed by a big endian port).
pub fn write_compact_addr(addr: &SocketAddr, buffer: &mut Vec<u8>) {
    match *addr {
        SocketAddr::V4(v4) => buffer.extend_from_slice(&v4.ip().octets()),
        SocketAddr::V6(v6) => buffer.extend_from_slice(&v6.ip().octets()),
    };

    buffer.extend_from_slice(&addr.port().to_be_bytes());
}

/// Write the compact node info for an id and address.
pub fn write_compact_node(id: &NodeId, addr: &SocketAddr, buffer: &mut Vec<u8>) {
    buffer.extend_from_slice(id.as_ref());
    write_compact_addr(addr, buffer);
}

/// Parse a 6 byte (IPv4) or 18 byte (IPv6) compact address.
pub fn read_compact_addr(bytes: &[u8]) -> DhtResult<SocketAddr> {
    match bytes.len() {
        BYTES_PER_COMPACT_IPV4 => {
            let ip = Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3]);
            let port = u16::from_be_bytes([bytes[4], bytes[5]]);

            Ok(SocketAddr::V4(SocketAddrV4::new(ip, port)))
        }
        BYTES_PER_COMPACT_IPV6 => {
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&bytes[..16]);
            let port = u16::from_be_bytes([bytes[16], bytes[17]]);

            Ok(SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0)))
        }
        actual => Err(DhtError::from_kind(DhtErrorKind::InvalidLength {
            expected: BYTES_PER_COMPACT_IPV4,
            actual,
        })),
    }
}

// ----------------------------------------------------------------------------//

/// List of nodes in the form carried by the `nodes` and `nodes6` keys.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct CompactNodeInfo {
    nodes: Vec<(NodeId, SocketAddr)>,
}

impl CompactNodeInfo {
    pub fn new() -> CompactNodeInfo {
        CompactNodeInfo { nodes: Vec::new() }
    }

    /// Parse concatenated 26 byte IPv4 node entries.
    pub fn from_v4_bytes(bytes: &[u8]) -> DhtResult<CompactNodeInfo> {
        CompactNodeInfo::from_bytes(bytes, BYTES_PER_COMPACT_NODE_INFO_V4)
    }

    /// Parse concatenated 38 byte IPv6 node entries.
    pub fn from_v6_bytes(bytes: &[u8]) -> DhtResult<CompactNodeInfo> {
        CompactNodeInfo::from_bytes(bytes, BYTES_PER_COMPACT_NODE_INFO_V6)
    }

    fn from_bytes(bytes: &[u8], entry_len: usize) -> DhtResult<CompactNodeInfo> {
        if bytes.len() % entry_len != 0 {
            return Err(DhtError::from_kind(DhtErrorKind::InvalidLength {
                expected: (bytes.len() / entry_len + 1) * entry_len,
                actual:   bytes.len(),
            }));
        }

        let mut nodes = Vec::with_capacity(bytes.len() / entry_len);
        for entry in bytes.chunks(entry_len) {
            let id = NodeId::from_hash(&entry[..NODE_ID_LEN])?;
            let addr = read_compact_addr(&entry[NODE_ID_LEN..])?;

            nodes.push((id, addr));
        }

        Ok(CompactNodeInfo { nodes })
    }

    /// Collect the id and address of each node.
    pub fn from_nodes<'a, I>(nodes: I) -> CompactNodeInfo
    where
        I: IntoIterator<Item = &'a Node>,
    {
        CompactNodeInfo {
            nodes: nodes.into_iter().map(|node| (node.id(), node.addr())).collect(),
        }
    }

    pub fn push(&mut self, id: NodeId, addr: SocketAddr) {
        self.nodes.push((id, addr));
    }

    pub fn extend(&mut self, other: CompactNodeInfo) {
        self.nodes.extend(other.nodes);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(NodeId, SocketAddr)> {
        self.nodes.iter()
    }

    /// Whether any IPv6 node is present.
    pub fn has_v6(&self) -> bool {
        self.nodes.iter().any(|(_, addr)| addr.is_ipv6())
    }

    /// Concatenated entries for the IPv4 nodes.
    pub fn v4_bytes(&self) -> Vec<u8> {
        self.write_filtered(|addr| addr.is_ipv4(), BYTES_PER_COMPACT_NODE_INFO_V4)
    }

    /// Concatenated entries for the IPv6 nodes.
    pub fn v6_bytes(&self) -> Vec<u8> {
        self.write_filtered(|addr| addr.is_ipv6(), BYTES_PER_COMPACT_NODE_INFO_V6)
    }

    fn write_filtered<F>(&self, filter: F, entry_len: usize) -> Vec<u8>
    where
        F: Fn(&SocketAddr) -> bool,
    {
        let mut buffer = Vec::with_capacity(self.nodes.len() * entry_len);

        for (id, addr) in self.nodes.iter().filter(|(_, addr)| filter(addr)) {
            write_compact_node(id, addr, &mut buffer);
        }

        buffer
    }
}

impl IntoIterator for CompactNodeInfo {
    type Item = (NodeId, SocketAddr);
    type IntoIter = IntoIter<(NodeId, SocketAddr)>;

    fn into_iter(self) -> Self::IntoIter {
        self.nodes.into_iter()
    }
}

// ----------------------------------------------------------------------------//

/// Peer contact list in the form carried by the `values` key.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Default)]
pub struct CompactValueInfo {
    values: Vec<SocketAddr>,
}

impl CompactValueInfo {
    pub fn new(values: Vec<SocketAddr>) -> CompactValueInfo {
        CompactValueInfo { values }
    }

    /// Parse a list of compact addresses.
    pub fn from_entries<'a, I>(entries: I) -> DhtResult<CompactValueInfo>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        let values = entries.into_iter().map(read_compact_addr).collect::<DhtResult<Vec<SocketAddr>>>()?;

        Ok(CompactValueInfo { values })
    }

    pub fn values(&self) -> &[SocketAddr] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Compact form of every value.
    pub fn entries(&self) -> Vec<Vec<u8>> {
        self.values
            .iter()
            .map(|addr| {
                let mut buffer = Vec::with_capacity(BYTES_PER_COMPACT_IPV6);
                write_compact_addr(addr, &mut buffer);

                buffer
            })
            .collect()
    }
}

impl IntoIterator for CompactValueInfo {
    type Item = SocketAddr;
    type IntoIter = IntoIter<SocketAddr>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
