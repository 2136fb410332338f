//! Announce tokens handed out with `get_peers` responses.
//!
//! Issued tokens are never stored. Instead we keep two secrets and accept a token if it was
//! generated from the requester's address with either of them. The current secret rotates
//! lazily once per interval, so a token stays valid for between one and two intervals.

use std::net::{IpAddr, SocketAddr};
use std::time;

use chrono::{DateTime, Duration, Utc};
use sha1::{Digest, Sha1};

use crate::error::{DhtError, DhtErrorKind, DhtResult};

pub const TOKEN_LEN: usize = 20;

const DEFAULT_REFRESH_INTERVAL_MINS: i64 = 10;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Token {
    token: [u8; TOKEN_LEN],
}

impl Token {
    pub fn new(bytes: &[u8]) -> DhtResult<Token> {
        if bytes.len() != TOKEN_LEN {
            return Err(DhtError::from_kind(DhtErrorKind::InvalidLength {
                expected: TOKEN_LEN,
                actual:   bytes.len(),
            }));
        }

        let mut token = [0u8; TOKEN_LEN];
        token.copy_from_slice(bytes);

        Ok(Token::from(token))
    }
}

impl From<[u8; TOKEN_LEN]> for Token {
    fn from(token: [u8; TOKEN_LEN]) -> Token {
        Token { token }
    }
}

impl From<Token> for [u8; TOKEN_LEN] {
    fn from(token: Token) -> [u8; TOKEN_LEN] {
        token.token
    }
}

impl AsRef<[u8]> for Token {
    fn as_ref(&self) -> &[u8] {
        &self.token
    }
}

// ----------------------------------------------------------------------------//

#[derive(Copy, Clone, Debug)]
pub struct TokenStore {
    curr_secret:  u32,
    last_secret:  u32,
    last_refresh: DateTime<Utc>,
    interval:     Duration,
}

impl TokenStore {
    /// Create a store whose secret rotates every `interval`.
    pub fn new(interval: time::Duration) -> TokenStore {
        let interval = Duration::from_std(interval)
            .ok()
            .filter(|interval| interval.num_milliseconds() > 0)
            .unwrap_or_else(|| Duration::minutes(DEFAULT_REFRESH_INTERVAL_MINS));

        TokenStore {
            curr_secret: rand::random::<u32>(),
            last_secret: rand::random::<u32>(),
            last_refresh: Utc::now(),
            interval,
        }
    }

    /// Generate the token for the given requester.
    pub fn checkout(&mut self, addr: SocketAddr) -> Token {
        self.checkout_at(addr, Utc::now())
    }

    /// Returns true if the token was generated for the requester within the last two intervals.
    pub fn checkin(&mut self, addr: SocketAddr, token: &[u8]) -> bool {
        self.checkin_at(addr, token, Utc::now())
    }

    fn checkout_at(&mut self, addr: SocketAddr, now: DateTime<Utc>) -> Token {
        self.refresh_check(now);

        generate_token(addr, self.curr_secret)
    }

    fn checkin_at(&mut self, addr: SocketAddr, token: &[u8], now: DateTime<Utc>) -> bool {
        self.refresh_check(now);

        match Token::new(token) {
            Ok(token) => generate_token(addr, self.curr_secret) == token || generate_token(addr, self.last_secret) == token,
            Err(_) => false,
        }
    }

    fn refresh_check(&mut self, now: DateTime<Utc>) {
        match self.intervals_passed(now) {
            0 => (),
            1 => {
                self.last_secret = self.curr_secret;
                self.curr_secret = rand::random::<u32>();
                self.last_refresh = self.last_refresh + self.interval;
            }
            _ => {
                self.last_secret = rand::random::<u32>();
                self.curr_secret = rand::random::<u32>();
                self.last_refresh = now;
            }
        }
    }

    /// Secrets are rotated lazily so more than one interval may have passed since the last
    /// rotation, in which case both secrets are stale.
    fn intervals_passed(&self, now: DateTime<Utc>) -> i64 {
        let elapsed = (now - self.last_refresh).num_milliseconds();

        if elapsed <= 0 {
            0
        } else {
            elapsed / self.interval.num_milliseconds()
        }
    }
}

impl Default for TokenStore {
    fn default() -> TokenStore {
        TokenStore::new(time::Duration::from_secs(DEFAULT_REFRESH_INTERVAL_MINS as u64 * 60))
    }
}

/// SHA-1 over the address octets, the port and the secret, all big endian.
fn generate_token(addr: SocketAddr, secret: u32) -> Token {
    let mut hasher = Sha1::new();

    match addr.ip() {
        IpAddr::V4(v4) => hasher.update(v4.octets()),
        IpAddr::V6(v6) => hasher.update(v6.octets()),
    }
    hasher.update(addr.port().to_be_bytes());
    hasher.update(secret.to_be_bytes());

    let mut token = [0u8; TOKEN_LEN];
    token.copy_from_slice(&hasher.finalize());

    Token::from(token)
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::time;

    use chrono::{Duration, Utc};

    use crate::token::{Token, TokenStore};

    const INTERVAL_MINS: i64 = 10;

    fn store() -> TokenStore {
        TokenStore::new(time::Duration::from_secs(INTERVAL_MINS as u64 * 60))
    }

    fn v4_addr() -> SocketAddr {
        "10.0.0.1:6881".parse().unwrap()
    }

    fn v6_addr() -> SocketAddr {
        "[fe80::1]:6881".parse().unwrap()
    }

    #[test]
    fn positive_accept_valid_v4_token() {
        let mut store = store();

        let token = store.checkout(v4_addr());

        assert!(store.checkin(v4_addr(), token.as_ref()));
    }

    #[test]
    fn positive_accept_valid_v6_token() {
        let mut store = store();

        let token = store.checkout(v6_addr());

        assert!(store.checkin(v6_addr(), token.as_ref()));
    }

    #[test]
    fn positive_same_token_within_interval() {
        let mut store = store();
        let now = Utc::now();

        let first = store.checkout_at(v4_addr(), now);
        let second = store.checkout_at(v4_addr(), now + Duration::minutes(INTERVAL_MINS / 2));

        assert_eq!(first, second);
    }

    #[test]
    fn positive_accept_token_after_one_interval() {
        let mut store = store();
        let issued = store.last_refresh;

        let token = store.checkout_at(v4_addr(), issued);
        let later = issued + Duration::minutes(INTERVAL_MINS) + Duration::seconds(1);

        assert!(store.checkin_at(v4_addr(), token.as_ref(), later));
    }

    #[test]
    fn positive_accept_token_just_before_two_intervals() {
        let mut store = store();
        let issued = store.last_refresh;

        let token = store.checkout_at(v6_addr(), issued);
        let later = issued + Duration::minutes(INTERVAL_MINS * 2) - Duration::seconds(1);

        assert!(store.checkin_at(v6_addr(), token.as_ref(), later));
    }

    #[test]
    fn negative_reject_token_after_two_intervals() {
        let mut store = store();
        let issued = store.last_refresh;

        let token = store.checkout_at(v4_addr(), issued);
        let later = issued + Duration::minutes(INTERVAL_MINS * 2);

        assert!(!store.checkin_at(v4_addr(), token.as_ref(), later));
    }

    #[test]
    fn negative_reject_token_across_two_lazy_rotations() {
        let mut store = store();
        let issued = store.last_refresh;

        let token = store.checkout_at(v4_addr(), issued);
        let one = issued + Duration::minutes(INTERVAL_MINS);
        let two = issued + Duration::minutes(INTERVAL_MINS * 2);

        assert!(store.checkin_at(v4_addr(), token.as_ref(), one));
        assert!(!store.checkin_at(v4_addr(), token.as_ref(), two));
    }

    #[test]
    fn negative_reject_token_for_other_address() {
        let mut store = store();
        let other_ip: SocketAddr = "10.0.0.2:6881".parse().unwrap();
        let other_port: SocketAddr = "10.0.0.1:6882".parse().unwrap();

        let token = store.checkout(v4_addr());

        assert!(!store.checkin(other_ip, token.as_ref()));
        assert!(!store.checkin(other_port, token.as_ref()));
    }

    #[test]
    fn negative_reject_wrong_length_token() {
        let mut store = store();

        assert!(!store.checkin(v4_addr(), b"aoeusnth"));
        assert!(Token::new(b"aoeusnth").is_err());
    }
}
