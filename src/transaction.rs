pub const TRANSACTION_ID_LEN: usize = 4;

/// Hands out transaction ids for outgoing queries.
///
/// Ids are a wrapping counter seeded at random, so ids in flight never collide until
/// 2^32 queries have been issued.
#[derive(Clone, Debug)]
pub struct TransactionIds {
    next: u32,
}

impl TransactionIds {
    pub fn new() -> TransactionIds {
        TransactionIds::with_seed(rand::random::<u32>())
    }

    pub fn with_seed(seed: u32) -> TransactionIds {
        TransactionIds { next: seed }
    }

    pub fn generate(&mut self) -> [u8; TRANSACTION_ID_LEN] {
        let id = self.next;
        self.next = self.next.wrapping_add(1);

        id.to_be_bytes()
    }
}

impl Default for TransactionIds {
    fn default() -> TransactionIds {
        TransactionIds::new()
    }
}

impl Iterator for TransactionIds {
    type Item = [u8; TRANSACTION_ID_LEN];

    fn next(&mut self) -> Option<[u8; TRANSACTION_ID_LEN]> {
        Some(self.generate())
    }
}
