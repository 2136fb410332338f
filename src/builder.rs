use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bip_bencode::{BDecodeOpt, BRefAccess, BencodeRef};
use tokio::net::UdpSocket;
use tokio::sync::mpsc::{Receiver, Sender, UnboundedReceiver};
use tokio_util::sync::CancellationToken;

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{InfoHash, NodeId};
use crate::message::compact_info::CompactNodeInfo;
use crate::message::factory::OutgoingQuery;
use crate::message::response::ResponseType;
use crate::router::Router;
use crate::routing::node::Node;
use crate::worker::messenger;
use crate::worker::query::QueryTask;
use crate::worker::{self, lookup, Datagram, DhtContext, DhtEvent, ShutdownCause, WorkerConfig};

const DEFAULT_SOURCE_ADDR: ([u8; 4], u16) = ([0, 0, 0, 0], 6881);
const DEFAULT_TIMEOUT_MILLIS: u64 = 2000;
const DEFAULT_RETRIES: usize = 3;
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 15 * 60;
const DEFAULT_TOKEN_INTERVAL_SECS: u64 = 10 * 60;

const EXPORT_NODES_KEY: &str = "nodes";
const EXPORT_NODES6_KEY: &str = "nodes6";

/// Maintains a distributed hash (routing) table.
pub struct MainlineDht {
    context: Arc<DhtContext>,
}

impl MainlineDht {
    fn with_transport(
        builder: DhtBuilder,
        outgoing: Sender<Datagram>,
        incoming: Receiver<Datagram>,
        shutdown: CancellationToken,
    ) -> DhtResult<MainlineDht> {
        let restored = match builder.routing_table {
            Some(ref bytes) => decode_export(bytes)?,
            None => CompactNodeInfo::new(),
        };

        let node_id = builder.node_id.unwrap_or_else(NodeId::random);
        let config = WorkerConfig {
            read_only:        builder.read_only,
            timeout:          builder.timeout,
            retries:          builder.retries,
            refresh_interval: builder.refresh_interval,
            token_interval:   builder.token_interval,
        };

        let (context, added) = DhtContext::new(node_id, config, outgoing, shutdown);
        for (id, addr) in restored {
            context.add_node(Node::new(id, addr));
        }
        info!(
            "bip_kademlia: Starting dht {} with {} restored nodes...",
            node_id,
            context.table().read().len()
        );

        let routers: Vec<Router> = builder.routers.into_iter().collect();
        let nodes: Vec<SocketAddr> = builder.nodes.into_iter().collect();
        worker::start_engine(context.clone(), added, incoming, routers, nodes);

        Ok(MainlineDht { context })
    }

    /// Our identifier in the dht.
    pub fn node_id(&self) -> NodeId {
        self.context.node_id()
    }

    /// Ping the address, returning the id it reports.
    ///
    /// A responding node is offered to the routing table, making this the way to seed the
    /// table by hand.
    pub async fn ping(&self, addr: SocketAddr) -> DhtResult<NodeId> {
        let node = self.context.node_for_addr(addr);
        let (node, result) = QueryTask::new(self.context.clone(), node, OutgoingQuery::Ping).execute().await;

        result.map(|_| node.id())
    }

    /// Ask the node at `addr` for the nodes it knows closest to `target`.
    pub async fn find_node_at(&self, addr: SocketAddr, target: NodeId) -> DhtResult<Vec<(NodeId, SocketAddr)>> {
        let node = self.context.node_for_addr(addr);
        let (_, result) = QueryTask::new(self.context.clone(), node, OutgoingQuery::FindNode(target)).execute().await;

        match result? {
            ResponseType::FindNode(find_node) => Ok(find_node.nodes().iter().cloned().collect()),
            other => Err(DhtError::from_kind(DhtErrorKind::InvalidResponse {
                details: format!("Expected A find_node Response But Found {:?}", other),
            })),
        }
    }

    /// Perform an iterative lookup for the nodes closest to `target`.
    pub async fn find_node(&self, target: NodeId) -> Vec<(NodeId, SocketAddr)> {
        lookup::find_node(self.context.clone(), target)
            .await
            .into_iter()
            .map(|node| (node.id(), node.addr()))
            .collect()
    }

    /// Perform a search for peers of the info hash.
    ///
    /// If announce is true, we will announce ourselves to the closest nodes that gave us a
    /// token, using our own source port.
    pub async fn search(&self, info_hash: InfoHash, announce: bool) -> Vec<SocketAddr> {
        lookup::search(self.context.clone(), info_hash, announce).await
    }

    /// Receive events from the dht.
    pub fn events(&self) -> UnboundedReceiver<DhtEvent> {
        self.context.subscribe()
    }

    /// Encode every node in the routing table so a later start can restore them.
    pub fn export_nodes(&self) -> Vec<u8> {
        let table = self.context.table().read();
        let info = CompactNodeInfo::from_nodes(table.nodes());

        let nodes = info.v4_bytes();
        let nodes6 = info.v6_bytes();

        (ben_map!{
            EXPORT_NODES_KEY => ben_bytes!(&nodes[..]),
            EXPORT_NODES6_KEY => ben_bytes!(&nodes6[..])
        })
        .encode()
    }

    /// Stop the dht, every outstanding operation resolves with a shutdown error.
    pub fn shutdown(&self) {
        self.context.shutdown(ShutdownCause::ClientInitiated);
    }
}

impl Drop for MainlineDht {
    fn drop(&mut self) {
        self.context.shutdown(ShutdownCause::ClientInitiated);
    }
}

fn decode_export(bytes: &[u8]) -> DhtResult<CompactNodeInfo> {
    let bencode = BencodeRef::decode(bytes, BDecodeOpt::default())?;
    let dict = bencode.dict().ok_or_else(|| {
        DhtError::from_kind(DhtErrorKind::InvalidMessage {
            details: "Routing Table Export Is Not A Dictionary".to_owned(),
        })
    })?;

    let mut nodes = match dict.lookup(EXPORT_NODES_KEY.as_bytes()).and_then(|value| value.bytes()) {
        Some(bytes) => CompactNodeInfo::from_v4_bytes(bytes)?,
        None => CompactNodeInfo::new(),
    };
    if let Some(bytes) = dict.lookup(EXPORT_NODES6_KEY.as_bytes()).and_then(|value| value.bytes()) {
        nodes.extend(CompactNodeInfo::from_v6_bytes(bytes)?);
    }

    Ok(nodes)
}

// ----------------------------------------------------------------------------//

/// Stores information for initializing a dht.
#[derive(Clone, Debug)]
pub struct DhtBuilder {
    nodes:            HashSet<SocketAddr>,
    routers:          HashSet<Router>,
    read_only:        bool,
    src_addr:         SocketAddr,
    node_id:          Option<NodeId>,
    timeout:          Duration,
    retries:          usize,
    refresh_interval: Duration,
    token_interval:   Duration,
    routing_table:    Option<Vec<u8>>,
}

impl DhtBuilder {
    /// Create a new DhtBuilder with no way to reach the dht.
    ///
    /// Nodes can still be added after start through `MainlineDht::ping`.
    pub fn new() -> DhtBuilder {
        DhtBuilder {
            nodes:            HashSet::new(),
            routers:          HashSet::new(),
            read_only:        false,
            src_addr:         SocketAddr::from(DEFAULT_SOURCE_ADDR),
            node_id:          None,
            timeout:          Duration::from_millis(DEFAULT_TIMEOUT_MILLIS),
            retries:          DEFAULT_RETRIES,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            token_interval:   Duration::from_secs(DEFAULT_TOKEN_INTERVAL_SECS),
            routing_table:    None,
        }
    }

    /// Creates a DhtBuilder with an initial node for our routing table.
    pub fn with_node(node_addr: SocketAddr) -> DhtBuilder {
        DhtBuilder::new().add_node(node_addr)
    }

    /// Creates a DhtBuilder with an initial router which will let us gather nodes
    /// if our routing table is ever empty.
    ///
    /// Difference between a node and a router is that a router is never put in
    /// our routing table.
    pub fn with_router(router: Router) -> DhtBuilder {
        DhtBuilder::new().add_router(router)
    }

    /// Add nodes which will be distributed within our routing table.
    pub fn add_node(mut self, node_addr: SocketAddr) -> DhtBuilder {
        self.nodes.insert(node_addr);

        self
    }

    /// Add a router which will let us gather nodes if our routing table is ever empty.
    ///
    /// See DhtBuilder::with_router for difference between a router and a node.
    pub fn add_router(mut self, router: Router) -> DhtBuilder {
        self.routers.insert(router);

        self
    }

    /// Set the read only flag, a read only node answers no queries.
    ///
    /// Used when we are behind a restrictive NAT and/or we want to decrease
    /// incoming network traffic. Default value is false.
    pub fn set_read_only(mut self, read_only: bool) -> DhtBuilder {
        self.read_only = read_only;

        self
    }

    /// Provide the dht with the source address.
    ///
    /// If this is not supplied we will use 0.0.0.0:6881.
    pub fn set_source_addr(mut self, addr: SocketAddr) -> DhtBuilder {
        self.src_addr = addr;

        self
    }

    /// Use the given id instead of a random one.
    pub fn set_node_id(mut self, node_id: NodeId) -> DhtBuilder {
        self.node_id = Some(node_id);

        self
    }

    /// Time to wait for a response before resending a query.
    pub fn set_timeout(mut self, timeout: Duration) -> DhtBuilder {
        self.timeout = timeout;

        self
    }

    /// Total number of sends for a query before the node is considered bad.
    pub fn set_retries(mut self, retries: usize) -> DhtBuilder {
        self.retries = retries;

        self
    }

    /// Time a bucket may go without a membership change before it is refreshed.
    pub fn set_refresh_interval(mut self, interval: Duration) -> DhtBuilder {
        self.refresh_interval = interval;

        self
    }

    /// Lifetime of the secret announce tokens are derived from.
    pub fn set_token_interval(mut self, interval: Duration) -> DhtBuilder {
        self.token_interval = interval;

        self
    }

    /// Restore the nodes from a previous `MainlineDht::export_nodes`.
    pub fn set_routing_table(mut self, export: Vec<u8>) -> DhtBuilder {
        self.routing_table = Some(export);

        self
    }

    /// Start a mainline dht on a UDP socket bound to the source address.
    pub async fn start_mainline(self) -> DhtResult<MainlineDht> {
        let socket = Arc::new(UdpSocket::bind(self.src_addr).await?);
        info!("bip_kademlia: Bound dht socket to {}", socket.local_addr()?);

        let shutdown = CancellationToken::new();
        let outgoing = messenger::create_outgoing_messenger(socket.clone(), shutdown.clone());
        let incoming = messenger::create_incoming_messenger(socket, shutdown.clone());

        MainlineDht::with_transport(self, outgoing, incoming, shutdown)
    }

    /// Start a mainline dht that sends and receives datagrams through the given channels.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_with_transport(self, outgoing: Sender<Datagram>, incoming: Receiver<Datagram>) -> DhtResult<MainlineDht> {
        MainlineDht::with_transport(self, outgoing, incoming, CancellationToken::new())
    }
}

impl Default for DhtBuilder {
    fn default() -> DhtBuilder {
        DhtBuilder::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use tokio::sync::mpsc;

    use crate::builder::{self, DhtBuilder};
    use crate::id::NodeId;
    use crate::router::Router;

    #[test]
    fn positive_builder_chains() {
        let addr: SocketAddr = "127.0.0.1:6881".parse().unwrap();
        let builder = DhtBuilder::with_router(Router::uTorrent)
            .add_node(addr)
            .add_node(addr)
            .set_read_only(true)
            .set_retries(5);

        assert_eq!(1, builder.nodes.len());
        assert_eq!(1, builder.routers.len());
        assert!(builder.read_only);
        assert_eq!(5, builder.retries);
        assert_eq!("0.0.0.0:6881".parse::<SocketAddr>().unwrap(), builder.src_addr);
    }

    #[test]
    fn positive_decode_export() {
        let mut export = Vec::new();
        export.extend_from_slice(b"d5:nodes26:");
        export.extend_from_slice(&[0x11; 20]);
        export.extend_from_slice(&[127, 0, 0, 1, 0x1A, 0xE1]);
        export.extend_from_slice(b"6:nodes60:e");

        let nodes = builder::decode_export(&export).unwrap();
        let expected = (NodeId::from([0x11; 20]), "127.0.0.1:6881".parse().unwrap());

        assert_eq!(1, nodes.len());
        assert_eq!(Some(&expected), nodes.iter().next());
    }

    #[test]
    fn negative_decode_export_wrong_multiple() {
        let mut export = Vec::new();
        export.extend_from_slice(b"d5:nodes25:");
        export.extend_from_slice(&[0x11; 25]);
        export.extend_from_slice(b"e");

        assert!(builder::decode_export(&export).is_err());
        assert!(builder::decode_export(b"le").is_err());
    }

    #[tokio::test]
    async fn negative_start_rejects_bad_export() {
        let (send, _) = mpsc::channel(16);
        let (_, recv) = mpsc::channel(16);

        let result = DhtBuilder::new()
            .set_routing_table(b"not bencode".to_vec())
            .start_with_transport(send, recv);

        assert!(result.is_err());
    }
}
