use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::net::SocketAddr;

use chrono::{DateTime, Duration, Utc};

use crate::id::InfoHash;

pub const MAX_ITEMS_STORED: usize = 500;

const EXPIRATION_TIME_HOURS: i64 = 24;

/// Peers announced to us, grouped by info hash and expired after a day.
pub struct AnnounceStorage {
    storage: HashMap<InfoHash, Vec<SocketAddr>>,
    // Oldest insertion first
    expires: Vec<ItemExpiration>,
}

impl AnnounceStorage {
    pub fn new() -> AnnounceStorage {
        AnnounceStorage {
            storage: HashMap::new(),
            expires: Vec::new(),
        }
    }

    /// Returns true if the peer was added or its expiration renewed.
    pub fn add_item(&mut self, info_hash: InfoHash, address: SocketAddr) -> bool {
        self.add(info_hash, address, Utc::now())
    }

    /// All unexpired peers for the info hash.
    pub fn find_items(&mut self, info_hash: &InfoHash) -> Vec<SocketAddr> {
        self.find(info_hash, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.expires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.expires.is_empty()
    }

    fn add(&mut self, info_hash: InfoHash, address: SocketAddr, now: DateTime<Utc>) -> bool {
        self.remove_expired_items(now);

        let expiration = ItemExpiration {
            info_hash,
            address,
            inserted: now,
        };
        let already_stored = self
            .storage
            .get(&info_hash)
            .map_or(false, |items| items.contains(&address));

        if already_stored {
            self.expires.retain(|item| !item.matches(&info_hash, &address));
            self.expires.push(expiration);

            true
        } else if self.expires.len() < MAX_ITEMS_STORED {
            match self.storage.entry(info_hash) {
                Entry::Occupied(mut occ) => occ.get_mut().push(address),
                Entry::Vacant(vac) => {
                    vac.insert(vec![address]);
                }
            }
            self.expires.push(expiration);

            true
        } else {
            false
        }
    }

    fn find(&mut self, info_hash: &InfoHash, now: DateTime<Utc>) -> Vec<SocketAddr> {
        self.remove_expired_items(now);

        self.storage.get(info_hash).cloned().unwrap_or_default()
    }

    fn remove_expired_items(&mut self, now: DateTime<Utc>) {
        let num_expired = self.expires.iter().take_while(|item| item.is_expired(now)).count();

        for expired in self.expires.drain(0..num_expired) {
            let now_empty = match self.storage.get_mut(&expired.info_hash) {
                Some(items) => {
                    items.retain(|addr| *addr != expired.address);
                    items.is_empty()
                }
                None => false,
            };

            if now_empty {
                self.storage.remove(&expired.info_hash);
            }
        }
    }
}

impl Default for AnnounceStorage {
    fn default() -> AnnounceStorage {
        AnnounceStorage::new()
    }
}

// ----------------------------------------------------------------------------//

#[derive(Debug, Clone)]
struct ItemExpiration {
    info_hash: InfoHash,
    address:   SocketAddr,
    inserted:  DateTime<Utc>,
}

impl ItemExpiration {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.inserted >= Duration::hours(EXPIRATION_TIME_HOURS)
    }

    fn matches(&self, info_hash: &InfoHash, address: &SocketAddr) -> bool {
        self.info_hash == *info_hash && self.address == *address
    }
}
