//! Identifiers and the XOR metric that orders the identifier space.

use std::fmt::{self, Debug, Display, Formatter};
use std::ops::BitXor;

use rand::Rng;

use crate::error::{DhtError, DhtErrorKind, DhtResult};

/// Number of bytes in a `NodeId`.
pub const NODE_ID_LEN: usize = 20;

/// Number of bits in a `NodeId`.
pub const NODE_ID_BITS: usize = NODE_ID_LEN * 8;

/// Info hashes share the identifier space with nodes.
pub type InfoHash = NodeId;

/// 160 bit big endian identifier.
///
/// Ordering is unsigned big endian byte comparison, which the derived `Ord` on the
/// underlying array already provides.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct NodeId {
    id: [u8; NODE_ID_LEN],
}

impl NodeId {
    /// Smallest identifier in the space.
    pub const MIN: NodeId = NodeId { id: [0x00; NODE_ID_LEN] };

    /// Largest identifier in the space.
    pub const MAX: NodeId = NodeId { id: [0xFF; NODE_ID_LEN] };

    /// Create a `NodeId` from exactly `NODE_ID_LEN` bytes.
    pub fn from_hash(bytes: &[u8]) -> DhtResult<NodeId> {
        if bytes.len() != NODE_ID_LEN {
            return Err(DhtError::from_kind(DhtErrorKind::InvalidLength {
                expected: NODE_ID_LEN,
                actual:   bytes.len(),
            }));
        }

        let mut id = [0u8; NODE_ID_LEN];
        id.copy_from_slice(bytes);

        Ok(NodeId { id })
    }

    /// Generate a uniformly random identifier.
    pub fn random() -> NodeId {
        let mut id = [0u8; NODE_ID_LEN];
        rand::thread_rng().fill(&mut id[..]);

        NodeId { id }
    }

    /// XOR distance between two identifiers.
    pub fn distance(&self, other: &NodeId) -> NodeId {
        *self ^ *other
    }

    /// Value of the bit at `index`, where index 0 is the most significant bit.
    pub fn bit(&self, index: usize) -> bool {
        let byte = self.id[index / 8];

        byte & (0x80 >> (index % 8)) != 0
    }

    /// Copy of this identifier with the bit at `index` flipped.
    pub fn flip_bit(&self, index: usize) -> NodeId {
        let mut id = self.id;
        id[index / 8] ^= 0x80 >> (index % 8);

        NodeId { id }
    }

    /// Number of leading zero bits.
    pub fn leading_zeros(&self) -> usize {
        let mut count = 0;

        for byte in self.id.iter() {
            count += byte.leading_zeros() as usize;

            if *byte != 0 {
                break;
            }
        }

        count
    }

    /// Whether the first `prefix_len` bits of both identifiers are equal.
    pub fn shares_prefix(&self, other: &NodeId, prefix_len: usize) -> bool {
        self.distance(other).leading_zeros() >= prefix_len
    }

    /// Keep the first `prefix_len` bits of `self` and take the remaining bits from `suffix`.
    pub fn with_suffix(&self, prefix_len: usize, suffix: &NodeId) -> NodeId {
        let mut id = [0u8; NODE_ID_LEN];

        for (index, byte) in id.iter_mut().enumerate() {
            let bits_from_prefix = prefix_len.saturating_sub(index * 8).min(8);
            let prefix_mask = if bits_from_prefix == 0 { 0 } else { 0xFFu8 << (8 - bits_from_prefix) };

            *byte = (self.id[index] & prefix_mask) | (suffix.id[index] & !prefix_mask);
        }

        NodeId { id }
    }

    /// Underlying bytes of the identifier.
    pub fn as_bytes(&self) -> &[u8; NODE_ID_LEN] {
        &self.id
    }
}

impl BitXor for NodeId {
    type Output = NodeId;

    fn bitxor(self, rhs: NodeId) -> NodeId {
        let mut id = [0u8; NODE_ID_LEN];

        for ((dst, lhs), rhs) in id.iter_mut().zip(self.id.iter()).zip(rhs.id.iter()) {
            *dst = lhs ^ rhs;
        }

        NodeId { id }
    }
}

impl From<[u8; NODE_ID_LEN]> for NodeId {
    fn from(id: [u8; NODE_ID_LEN]) -> NodeId {
        NodeId { id }
    }
}

impl From<NodeId> for [u8; NODE_ID_LEN] {
    fn from(id: NodeId) -> [u8; NODE_ID_LEN] {
        id.id
    }
}

impl AsRef<[u8]> for NodeId {
    fn as_ref(&self) -> &[u8] {
        &self.id
    }
}

impl Display for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        for byte in self.id.iter() {
            write!(f, "{:02x}", byte)?;
        }

        Ok(())
    }
}

impl Debug for NodeId {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "NodeId({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::{NodeId, NODE_ID_BITS, NODE_ID_LEN};

    fn sample_ids() -> Vec<NodeId> {
        let mut ids = vec![NodeId::MIN, NodeId::MAX];

        ids.push(NodeId::from(*b"abcdefghij0123456789"));
        ids.push(NodeId::from(*b"mnopqrstuvwxyz123456"));
        ids.push(NodeId::MIN.flip_bit(NODE_ID_BITS - 1));
        ids.push(NodeId::MIN.flip_bit(0));
        for _ in 0..16 {
            ids.push(NodeId::random());
        }

        ids
    }

    #[test]
    fn positive_xor_self_is_zero() {
        for id in sample_ids() {
            assert_eq!(NodeId::MIN, id ^ id);
        }
    }

    #[test]
    fn positive_xor_symmetric_and_invertible() {
        let ids = sample_ids();

        for a in ids.iter() {
            for b in ids.iter() {
                assert_eq!(*a ^ *b, *b ^ *a);
                assert_eq!(*a, (*a ^ *b) ^ *b);
                assert_eq!(a == b, a.distance(b) == NodeId::MIN);
            }
        }
    }

    #[test]
    fn positive_ordering_matches_big_endian_bytes() {
        let ids = sample_ids();

        for a in ids.iter() {
            for b in ids.iter() {
                assert_eq!(a.as_bytes().cmp(b.as_bytes()), a.cmp(b));
            }
        }

        assert!(NodeId::MIN < NodeId::MIN.flip_bit(NODE_ID_BITS - 1));
        assert!(NodeId::MIN.flip_bit(NODE_ID_BITS - 1) < NodeId::MIN.flip_bit(0));
        assert!(NodeId::MIN.flip_bit(0) < NodeId::MAX);
    }

    #[test]
    fn positive_leading_zeros() {
        assert_eq!(NODE_ID_BITS, NodeId::MIN.leading_zeros());
        assert_eq!(0, NodeId::MAX.leading_zeros());

        for index in 0..NODE_ID_BITS {
            assert_eq!(index, NodeId::MIN.flip_bit(index).leading_zeros());
        }
    }

    #[test]
    fn positive_with_suffix_keeps_prefix() {
        let prefix = NodeId::MAX;

        assert_eq!(NodeId::MIN, prefix.with_suffix(0, &NodeId::MIN));
        assert_eq!(NodeId::MAX, prefix.with_suffix(NODE_ID_BITS, &NodeId::MIN));

        let spliced = prefix.with_suffix(13, &NodeId::MIN);
        for index in 0..NODE_ID_BITS {
            assert_eq!(index < 13, spliced.bit(index));
        }
    }

    #[test]
    fn negative_from_hash_wrong_length() {
        assert!(NodeId::from_hash(&[0u8; NODE_ID_LEN - 1]).is_err());
        assert!(NodeId::from_hash(&[0u8; NODE_ID_LEN + 1]).is_err());
        assert!(NodeId::from_hash(&[0u8; NODE_ID_LEN]).is_ok());
    }
}
