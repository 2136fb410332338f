use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;

use futures::future;

use crate::id::NodeId;
use crate::message::factory::OutgoingQuery;
use crate::message::response::ResponseType;
use crate::router::Router;
use crate::routing::node::Node;
use crate::worker::lookup;
use crate::worker::query::QueryTask;
use crate::worker::{DhtContext, DhtEvent};

/// Join the overlay through the configured routers and nodes.
///
/// Every contact is asked for the nodes closest to our own id. Responders other than routers
/// and every node they return are offered to the routing table, after which a single lookup
/// toward our own id fills in the near buckets.
pub async fn run_bootstrap(context: Arc<DhtContext>, routers: Vec<Router>, nodes: Vec<SocketAddr>) {
    info!(
        "bip_kademlia: Bootstrapping from {} routers and {} nodes...",
        routers.len(),
        nodes.len()
    );

    let router_addrs = resolve_routers(&routers).await;
    let node_id = context.node_id();

    let mut queries = Vec::with_capacity(router_addrs.len() + nodes.len());
    for addr in router_addrs.iter() {
        let router = Node::new(NodeId::random(), *addr);
        queries.push(QueryTask::new(context.clone(), router, OutgoingQuery::FindNode(node_id)).detached());
    }
    for addr in nodes.iter().filter(|addr| !router_addrs.contains(*addr)) {
        let node = context.node_for_addr(*addr);
        queries.push(QueryTask::new(context.clone(), node, OutgoingQuery::FindNode(node_id)));
    }

    let results = future::join_all(queries.into_iter().map(QueryTask::execute)).await;

    let mut responded = 0;
    for (node, result) in results {
        match result {
            Ok(ResponseType::FindNode(find_node)) => {
                responded += 1;

                for (id, addr) in find_node.nodes().iter() {
                    if *id != node_id && !router_addrs.contains(addr) {
                        context.add_node(Node::new(*id, *addr));
                    }
                }
            }
            Ok(other) => warn!("bip_kademlia: Bootstrap received an unexpected response {:?}", other),
            Err(error) => warn!("bip_kademlia: Bootstrap contact {} did not answer: {}", node.addr(), error),
        }
    }

    if !context.table().read().is_empty() {
        lookup::find_node(context.clone(), node_id).await;
    }

    if !context.is_shutdown() {
        info!(
            "bip_kademlia: Bootstrap finished, {} contacts answered and {} nodes in the table",
            responded,
            context.table().read().len()
        );
        context.broadcast(DhtEvent::BootstrapCompleted);
    }
}

async fn resolve_routers(routers: &[Router]) -> HashSet<SocketAddr> {
    let mut addrs = HashSet::new();

    for router in routers {
        match router.socket_addrs().await {
            Ok(resolved) => addrs.extend(resolved),
            Err(error) => warn!("bip_kademlia: Failed to resolve router {}: {}", router, error),
        }
    }

    addrs
}
