use std::iter;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::mpsc::Receiver;

use crate::error::DhtErrorKind;
use crate::message::announce_peer::{AnnouncePeerRequest, AnnouncePeerResponse, ConnectPort};
use crate::message::compact_info::{CompactNodeInfo, CompactValueInfo};
use crate::message::error::{ErrorCode, ErrorMessage};
use crate::message::find_node::{FindNodeRequest, FindNodeResponse};
use crate::message::get_peers::{CompactInfoType, GetPeersRequest, GetPeersResponse};
use crate::message::ping::PingResponse;
use crate::message::request::RequestType;
use crate::routing::node::Node;
use crate::worker::{Datagram, DhtContext, ShutdownCause};

const INVALID_TOKEN_MESSAGE: &str = "Invalid or expired token received";

/// Decode and dispatch inbound datagrams until shutdown.
pub async fn run_receive_loop(context: Arc<DhtContext>, mut incoming: Receiver<Datagram>) {
    loop {
        tokio::select! {
            biased;
            _ = context.shutdown_token().cancelled() => break,
            datagram = incoming.recv() => match datagram {
                Some((bytes, addr)) => handle_incoming(&context, &bytes, addr),
                None => {
                    error!("bip_kademlia: Incoming channel closed, shutting down...");
                    context.shutdown(ShutdownCause::Unspecified);
                    break;
                }
            },
        }
    }

    info!("bip_kademlia: Receive loop exiting...");
}

/// Process a single datagram from `addr`.
pub fn handle_incoming(context: &Arc<DhtContext>, bytes: &[u8], addr: SocketAddr) {
    if context.is_shutdown() {
        return;
    }

    let decoded = context.factory().lock().receive(bytes, addr);

    match decoded {
        Ok(None) => trace!("bip_kademlia: Resolved a pending query with a message from {}", addr),
        Ok(Some(_)) if context.config().read_only => {
            trace!("bip_kademlia: Ignoring request from {} in read only mode", addr)
        }
        Ok(Some(request)) => handle_request(context, request, addr),
        Err(error) => match *error.kind() {
            DhtErrorKind::InvalidRequest { ref msg } => {
                warn!("bip_kademlia: Received an invalid request from {}: {}", addr, msg.error_message());

                if !context.config().read_only {
                    context.send(msg.encode(), addr);
                }
            }
            DhtErrorKind::RemoteError { code, ref message } => {
                debug!("bip_kademlia: Uncorrelated error {} from {}: {}", code, addr, message)
            }
            _ => warn!("bip_kademlia: Dropping message from {}: {}", addr, error),
        },
    }
}

fn handle_request(context: &Arc<DhtContext>, request: RequestType, addr: SocketAddr) {
    let sender = Node::new(request.node_id(), addr);

    let reply = match request {
        RequestType::Ping(ping) => {
            debug!("bip_kademlia: Received a PingRequest from {}...", addr);

            PingResponse::new(ping.transaction_id().to_vec(), context.node_id()).encode()
        }
        RequestType::FindNode(find_node) => {
            debug!("bip_kademlia: Received a FindNodeRequest from {}...", addr);

            handle_find_node(context, &find_node)
        }
        RequestType::GetPeers(get_peers) => {
            debug!("bip_kademlia: Received a GetPeersRequest from {}...", addr);

            handle_get_peers(context, &get_peers, addr)
        }
        RequestType::AnnouncePeer(announce) => {
            debug!("bip_kademlia: Received an AnnouncePeerRequest from {}...", addr);

            match handle_announce_peer(context, &announce, addr) {
                Some(reply) => reply,
                None => {
                    let error = ErrorMessage::new(
                        announce.transaction_id().to_vec(),
                        ErrorCode::ProtocolError,
                        INVALID_TOKEN_MESSAGE.to_owned(),
                    );
                    context.send(error.encode(), addr);

                    return;
                }
            }
        }
    };

    context.add_node(sender);
    context.send(reply, addr);
}

fn handle_find_node(context: &DhtContext, request: &FindNodeRequest) -> Vec<u8> {
    let nodes = {
        let table = context.table().read();
        let target = request.target_id();

        match table.find_node(&target) {
            Some(node) => CompactNodeInfo::from_nodes(iter::once(node)),
            None => CompactNodeInfo::from_nodes(table.get_closest(&target).iter()),
        }
    };

    FindNodeResponse::new(request.transaction_id().to_vec(), context.node_id(), nodes).encode()
}

fn handle_get_peers(context: &DhtContext, request: &GetPeersRequest, addr: SocketAddr) -> Vec<u8> {
    let token = context.tokens().lock().checkout(addr);
    let values = context.storage().lock().find_items(&request.info_hash());

    let info_type = if values.is_empty() {
        let closest = context.table().read().get_closest(&request.info_hash());

        CompactInfoType::Nodes(CompactNodeInfo::from_nodes(closest.iter()))
    } else {
        CompactInfoType::Values(CompactValueInfo::new(values))
    };

    GetPeersResponse::new(
        request.transaction_id().to_vec(),
        context.node_id(),
        Some(token.as_ref().to_vec()),
        info_type,
    )
    .encode()
}

/// Returns None if the token was not accepted.
fn handle_announce_peer(context: &DhtContext, request: &AnnouncePeerRequest, addr: SocketAddr) -> Option<Vec<u8>> {
    if !context.tokens().lock().checkin(addr, request.token()) {
        warn!("bip_kademlia: Rejecting announce from {} with an invalid token", addr);
        return None;
    }

    let port = match request.connect_port() {
        ConnectPort::Implied => addr.port(),
        ConnectPort::Explicit(port) => port,
    };
    let peer = SocketAddr::new(addr.ip(), port);

    if !context.storage().lock().add_item(request.info_hash(), peer) {
        warn!("bip_kademlia: Announce storage full, not storing peer {}", peer);
    }

    Some(AnnouncePeerResponse::new(request.transaction_id().to_vec(), context.node_id()).encode())
}
