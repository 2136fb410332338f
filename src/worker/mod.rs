//! Engine state shared by the receive loop and every task it spawns.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError, Receiver, Sender, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

use crate::id::{InfoHash, NodeId};
use crate::message::factory::MessageFactory;
use crate::router::Router;
use crate::routing::node::Node;
use crate::routing::table::{AddOutcome, RoutingTable};
use crate::storage::AnnounceStorage;
use crate::token::TokenStore;
use crate::worker::replace::ReplaceNodeTask;

pub mod bootstrap;
pub mod handler;
pub mod lookup;
pub mod messenger;
pub mod query;
pub mod refresh;
pub mod replace;

/// Datagram paired with the remote address it came from or goes to.
pub type Datagram = (Vec<u8>, SocketAddr);

/// Event that occured within the DHT which clients may be interested in.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DhtEvent {
    /// DHT completed the bootstrap.
    BootstrapCompleted,
    /// Node became a member of our routing table.
    NodeAdded(NodeId, SocketAddr),
    /// One send of a query finished, either answered or timed out.
    QueryAttempt {
        addr:      SocketAddr,
        timed_out: bool,
    },
    /// Lookup for the info hash turned up a peer.
    PeerFound(InfoHash, SocketAddr),
    /// Lookup for the info hash finished.
    LookupCompleted(InfoHash),
    /// DHT is shutting down for some reason.
    ShuttingDown(ShutdownCause),
}

/// Reason the DHT shut down.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ShutdownCause {
    /// Client controlling the DHT intentionally shut it down.
    ClientInitiated,
    /// Cause of shutdown is not specified.
    Unspecified,
}

/// Tunables the engine consults while running.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct WorkerConfig {
    pub read_only:        bool,
    pub timeout:          Duration,
    /// Total sends per query before it fails.
    pub retries:          usize,
    pub refresh_interval: Duration,
    pub token_interval:   Duration,
}

// ----------------------------------------------------------------------------//

pub struct DhtContext {
    node_id:   NodeId,
    config:    WorkerConfig,
    table:     RwLock<RoutingTable>,
    tokens:    Mutex<TokenStore>,
    storage:   Mutex<AnnounceStorage>,
    factory:   Mutex<MessageFactory>,
    outgoing:  Sender<Datagram>,
    notifiers: Mutex<Vec<UnboundedSender<DhtEvent>>>,
    // Lowest id of every bucket with a replacement in progress
    replacing: Mutex<HashSet<NodeId>>,
    shutdown:  CancellationToken,
}

impl DhtContext {
    /// Create the engine state along with the stream of nodes inserted into its table.
    ///
    /// Cancelling `shutdown` from outside stops the engine without any `ShuttingDown` event.
    pub fn new(
        node_id: NodeId,
        config: WorkerConfig,
        outgoing: Sender<Datagram>,
        shutdown: CancellationToken,
    ) -> (Arc<DhtContext>, UnboundedReceiver<Node>) {
        let mut table = RoutingTable::new(node_id);
        let added = table.subscribe();

        let context = DhtContext {
            node_id,
            tokens: Mutex::new(TokenStore::new(config.token_interval)),
            storage: Mutex::new(AnnounceStorage::new()),
            factory: Mutex::new(MessageFactory::new(node_id)),
            table: RwLock::new(table),
            config,
            outgoing,
            notifiers: Mutex::new(Vec::new()),
            replacing: Mutex::new(HashSet::new()),
            shutdown,
        };

        (Arc::new(context), added)
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    pub fn table(&self) -> &RwLock<RoutingTable> {
        &self.table
    }

    pub fn tokens(&self) -> &Mutex<TokenStore> {
        &self.tokens
    }

    pub fn storage(&self) -> &Mutex<AnnounceStorage> {
        &self.storage
    }

    pub fn factory(&self) -> &Mutex<MessageFactory> {
        &self.factory
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Queue a datagram without waiting; returns false if it was dropped.
    pub fn send(&self, bytes: Vec<u8>, addr: SocketAddr) -> bool {
        match self.outgoing.try_send((bytes, addr)) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("bip_kademlia: Outgoing queue is full, dropping message to {}...", addr);
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!("bip_kademlia: Outgoing channel closed, shutting down...");
                self.shutdown(ShutdownCause::Unspecified);
                false
            }
        }
    }

    /// Register a new receiver of engine events.
    pub fn subscribe(&self) -> UnboundedReceiver<DhtEvent> {
        let (send, recv) = mpsc::unbounded_channel();

        let mut notifiers = self.notifiers.lock();
        if self.is_shutdown() {
            // Receiver sees the stream end right away
            drop(send);
        } else {
            notifiers.push(send);
        }

        recv
    }

    /// Deliver the event to every live receiver, pruning closed ones.
    pub fn broadcast(&self, event: DhtEvent) {
        let mut notifiers = self.notifiers.lock();

        if !self.is_shutdown() {
            notifiers.retain(|send| send.send(event.clone()).is_ok());
        }
    }

    /// Begin shutting down the engine. Only the first call has any effect.
    pub fn shutdown(&self, cause: ShutdownCause) {
        {
            let mut notifiers = self.notifiers.lock();
            if self.is_shutdown() {
                return;
            }

            self.shutdown.cancel();
            for send in notifiers.drain(..) {
                let _ = send.send(DhtEvent::ShuttingDown(cause));
            }
        }

        // Dropping the senders wakes every query still waiting on a response
        self.factory.lock().clear();
        info!("bip_kademlia: Dht shutting down, cause {:?}...", cause);
    }

    /// Offer a node to the routing table, starting a replacement if it lands in a full bucket.
    pub fn add_node(self: &Arc<Self>, node: Node) {
        if self.is_shutdown() {
            return;
        }

        let outcome = {
            let mut table = self.table.write();

            table.add(node.clone()).map(|outcome| {
                let bucket_key = table.bucket_for(&node.id()).map(|bucket| bucket.min());
                (outcome, bucket_key)
            })
        };

        match outcome {
            Ok((AddOutcome::Replacement, Some(bucket_key))) => self.start_replacement(bucket_key, node),
            Ok(_) => (),
            Err(error) => error!("bip_kademlia: Failed to add node {:?} to the routing table: {}", node.id(), error),
        }
    }

    /// Existing table record for the address, or a record with a placeholder id.
    pub fn node_for_addr(&self, addr: SocketAddr) -> Node {
        self.table
            .read()
            .nodes()
            .find(|node| node.addr() == addr)
            .cloned()
            .unwrap_or_else(|| Node::new(NodeId::random(), addr))
    }

    fn start_replacement(self: &Arc<Self>, bucket_key: NodeId, candidate: Node) {
        if !self.replacing.lock().insert(bucket_key) {
            return;
        }

        let context = self.clone();
        tokio::spawn(async move {
            let candidate_id = candidate.id();

            match ReplaceNodeTask::new(context.clone(), candidate).execute().await {
                Ok(true) => debug!("bip_kademlia: Node {:?} replaced a stale bucket member", candidate_id),
                Ok(false) => debug!("bip_kademlia: Bucket members all alive, discarded node {:?}", candidate_id),
                Err(error) => debug!("bip_kademlia: Replacement for node {:?} stopped: {}", candidate_id, error),
            }

            context.replacing.lock().remove(&bucket_key);
        });
    }
}

/// Spawn every task of a running engine.
pub fn start_engine(
    context: Arc<DhtContext>,
    added: UnboundedReceiver<Node>,
    incoming: Receiver<Datagram>,
    routers: Vec<Router>,
    nodes: Vec<SocketAddr>,
) {
    tokio::spawn(forward_added_nodes(context.clone(), added));
    tokio::spawn(handler::run_receive_loop(context.clone(), incoming));
    tokio::spawn(refresh::run_refresh(context.clone()));
    tokio::spawn(bootstrap::run_bootstrap(context, routers, nodes));
}

/// Turn routing table insertions into `NodeAdded` events.
async fn forward_added_nodes(context: Arc<DhtContext>, mut added: UnboundedReceiver<Node>) {
    loop {
        tokio::select! {
            biased;
            _ = context.shutdown_token().cancelled() => break,
            node = added.recv() => match node {
                Some(node) => context.broadcast(DhtEvent::NodeAdded(node.id(), node.addr())),
                None => break,
            },
        }
    }
}
