//! Iterative lookups that walk the overlay toward a target id.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future;

use crate::id::{InfoHash, NodeId};
use crate::message::announce_peer::ConnectPort;
use crate::message::factory::OutgoingQuery;
use crate::message::response::ResponseType;
use crate::routing::bucket;
use crate::routing::closest::ClosestNodes;
use crate::routing::node::Node;
use crate::worker::query::QueryTask;
use crate::worker::{DhtContext, DhtEvent};

/// Number of queries in flight per round.
pub const LOOKUP_ALPHA: usize = 3;
/// Upper bound on rounds for a single lookup.
pub const MAX_LOOKUP_ROUNDS: usize = 32;

/// Nodes closest to `target` that answered us, closest first.
pub async fn find_node(context: Arc<DhtContext>, target: NodeId) -> Vec<Node> {
    let lookup = TableLookup::new(context, target, OutgoingQuery::FindNode(target));

    lookup.run().await.responded.into_sorted()
}

/// Peers for the info hash, optionally announcing ourselves to the closest nodes on the way out.
pub async fn search(context: Arc<DhtContext>, info_hash: InfoHash, announce: bool) -> Vec<SocketAddr> {
    info!("bip_kademlia: Starting lookup for {}...", info_hash);
    let lookup = TableLookup::new(context.clone(), info_hash, OutgoingQuery::GetPeers(info_hash));
    let outcome = lookup.run().await;

    if announce && !context.is_shutdown() {
        let announces = outcome.responded.into_sorted().into_iter().filter_map(|node| {
            node.token().map(|token| {
                let query = OutgoingQuery::AnnouncePeer {
                    info_hash,
                    token: token.to_vec(),
                    port: ConnectPort::Implied,
                };

                QueryTask::new(context.clone(), node.clone(), query).execute()
            })
        });

        let results = future::join_all(announces).await;
        let accepted = results.iter().filter(|(_, result)| result.is_ok()).count();
        info!("bip_kademlia: Announced {} to {} of {} nodes", info_hash, accepted, results.len());
    }

    context.broadcast(DhtEvent::LookupCompleted(info_hash));
    outcome.peers
}

// ----------------------------------------------------------------------------//

struct LookupOutcome {
    responded: ClosestNodes,
    peers:     Vec<SocketAddr>,
}

struct TableLookup {
    context:   Arc<DhtContext>,
    target:    NodeId,
    query:     OutgoingQuery,
    shortlist: ClosestNodes,
    queried:   HashSet<NodeId>,
    responded: ClosestNodes,
    peers:     Vec<SocketAddr>,
    seen:      HashSet<SocketAddr>,
}

impl TableLookup {
    fn new(context: Arc<DhtContext>, target: NodeId, query: OutgoingQuery) -> TableLookup {
        let mut shortlist = ClosestNodes::new(target, bucket::MAX_BUCKET_SIZE);
        for node in context.table().read().get_closest(&target) {
            shortlist.add(node);
        }

        TableLookup {
            context,
            target,
            query,
            shortlist,
            queried: HashSet::new(),
            responded: ClosestNodes::new(target, bucket::MAX_BUCKET_SIZE),
            peers: Vec::new(),
            seen: HashSet::new(),
        }
    }

    async fn run(mut self) -> LookupOutcome {
        for round in 0..MAX_LOOKUP_ROUNDS {
            if self.context.is_shutdown() {
                break;
            }

            let candidates: Vec<Node> = self
                .shortlist
                .sorted()
                .into_iter()
                .filter(|node| !self.queried.contains(&node.id()))
                .take(LOOKUP_ALPHA)
                .collect();
            if candidates.is_empty() {
                debug!("bip_kademlia: Lookup for {} converged after {} rounds", self.target, round);
                break;
            }

            let queries = candidates.into_iter().map(|node| {
                self.queried.insert(node.id());
                QueryTask::new(self.context.clone(), node, self.query.clone()).execute()
            });
            let results = future::join_all(queries.collect::<Vec<_>>()).await;

            for (node, result) in results {
                match result {
                    Ok(response) => self.handle_response(node, response),
                    Err(error) => {
                        trace!("bip_kademlia: Lookup query to {} failed: {}", node.addr(), error);
                        self.shortlist.remove(&node.id());
                    }
                }
            }
        }

        LookupOutcome {
            responded: self.responded,
            peers:     self.peers,
        }
    }

    fn handle_response(&mut self, mut node: Node, response: ResponseType) {
        let local_id = self.context.node_id();

        let nodes = match response {
            ResponseType::FindNode(find_node) => find_node.nodes().clone(),
            ResponseType::GetPeers(get_peers) => {
                if let Some(token) = get_peers.token() {
                    node.set_token(token.to_vec());
                    self.context.table().write().set_token(&node.id(), token.to_vec());
                }

                if let Some(values) = get_peers.info_type().values() {
                    for peer in values.values() {
                        if self.seen.insert(*peer) {
                            self.peers.push(*peer);
                            self.context.broadcast(DhtEvent::PeerFound(self.target, *peer));
                        }
                    }
                }

                get_peers.info_type().nodes().cloned().unwrap_or_default()
            }
            other => {
                warn!("bip_kademlia: Lookup received an unexpected response {:?}", other);
                return;
            }
        };

        // Swap in the record carrying the token
        self.shortlist.remove(&node.id());
        self.shortlist.add(node.clone());
        self.queried.insert(node.id());
        self.responded.add(node);

        for (id, addr) in nodes {
            if id != local_id && !self.queried.contains(&id) {
                self.shortlist.add(Node::new(id, addr));
            }
        }
    }
}
