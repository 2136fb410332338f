//! Interact with the bittorrent mainline Distributed Hash Table.
//!
//! Nodes are organized by the Kademlia XOR metric. A `MainlineDht` keeps a routing table of
//! other nodes, answers their queries, and runs iterative lookups for nodes and for peers
//! of an info hash.
//!
//! ```no_run
//! use bip_kademlia::{DhtBuilder, InfoHash, Router};
//!
//! # async fn run() -> bip_kademlia::DhtResult<()> {
//! let dht = DhtBuilder::with_router(Router::uTorrent).start_mainline().await?;
//!
//! let info_hash = InfoHash::from([0x11; 20]);
//! for peer in dht.search(info_hash, false).await {
//!     println!("Found peer {}", peer);
//! }
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate bip_bencode;
#[macro_use]
extern crate error_chain;
#[macro_use]
extern crate log;

// Mainline DHT extensions supported on behalf of libtorrent:
// - Unrecognized requests which contain either an 'info_hash' or 'target' arguments are interpreted as 'find_node'
// - IPv6 nodes are exchanged under the 'nodes6' key

mod builder;
mod error;
mod id;
pub mod message;
mod router;
pub mod routing;
mod storage;
mod token;
mod transaction;
mod worker;

pub use crate::builder::{DhtBuilder, MainlineDht};
pub use crate::error::{DhtError, DhtErrorKind, DhtResult};
pub use crate::id::{InfoHash, NodeId, NODE_ID_LEN};
pub use crate::router::Router;
pub use crate::worker::{DhtEvent, ShutdownCause};
