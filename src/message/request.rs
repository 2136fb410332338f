use bip_bencode::{BConvert, BRefAccess, BencodeConvertError, BencodeRef};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{InfoHash, NodeId};
use crate::message;
use crate::message::announce_peer::AnnouncePeerRequest;
use crate::message::error::{ErrorCode, ErrorMessage};
use crate::message::find_node::FindNodeRequest;
use crate::message::get_peers::GetPeersRequest;
use crate::message::ping::PingRequest;

pub const REQUEST_ARGS_KEY: &str = "a";

// Top level request methods
pub const PING_TYPE_KEY: &str = "ping";
pub const FIND_NODE_TYPE_KEY: &str = "find_node";
pub const GET_PEERS_TYPE_KEY: &str = "get_peers";
pub const ANNOUNCE_PEER_TYPE_KEY: &str = "announce_peer";

/// Error for a request that we should answer with a protocol error message.
pub fn protocol_error(trans_id: &[u8], message: &str) -> DhtError {
    let error_msg = ErrorMessage::new(trans_id.to_vec(), ErrorCode::ProtocolError, message.to_owned());

    DhtError::from_kind(DhtErrorKind::InvalidRequest { msg: error_msg })
}

// ----------------------------------------------------------------------------//

pub struct RequestValidate<'a> {
    trans_id: &'a [u8],
}

impl<'a> RequestValidate<'a> {
    pub fn new(trans_id: &'a [u8]) -> RequestValidate<'a> {
        RequestValidate { trans_id }
    }

    pub fn validate_node_id(&self, node_id: &[u8]) -> DhtResult<NodeId> {
        NodeId::from_hash(node_id)
            .map_err(|_| protocol_error(self.trans_id, &format!("Node ID With Length {} Is Not Valid", node_id.len())))
    }

    pub fn validate_info_hash(&self, info_hash: &[u8]) -> DhtResult<InfoHash> {
        InfoHash::from_hash(info_hash)
            .map_err(|_| protocol_error(self.trans_id, &format!("InfoHash With Length {} Is Not Valid", info_hash.len())))
    }

    pub fn validate_port(&self, port: i64) -> DhtResult<u16> {
        if port < 0 || port > i64::from(u16::max_value()) {
            Err(protocol_error(self.trans_id, &format!("Port {} Is Not Valid", port)))
        } else {
            Ok(port as u16)
        }
    }
}

impl<'a> BConvert for RequestValidate<'a> {
    type Error = DhtError;

    fn handle_error(&self, error: BencodeConvertError) -> DhtError {
        protocol_error(self.trans_id, &error.to_string())
    }
}

// ----------------------------------------------------------------------------//

/// Queries a node can receive.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RequestType {
    Ping(PingRequest),
    FindNode(FindNodeRequest),
    GetPeers(GetPeersRequest),
    AnnouncePeer(AnnouncePeerRequest),
}

impl RequestType {
    pub fn from_parts(rqst_args: &BencodeRef, trans_id: &[u8], rqst_type: &str) -> DhtResult<RequestType> {
        match rqst_type {
            PING_TYPE_KEY => {
                let ping_rqst = PingRequest::from_parts(rqst_args, trans_id)?;
                Ok(RequestType::Ping(ping_rqst))
            }
            FIND_NODE_TYPE_KEY => {
                let find_node_rqst = FindNodeRequest::from_parts(rqst_args, trans_id, message::TARGET_ID_KEY)?;
                Ok(RequestType::FindNode(find_node_rqst))
            }
            GET_PEERS_TYPE_KEY => {
                let get_peers_rqst = GetPeersRequest::from_parts(rqst_args, trans_id)?;
                Ok(RequestType::GetPeers(get_peers_rqst))
            }
            ANNOUNCE_PEER_TYPE_KEY => {
                let announce_peer_rqst = AnnouncePeerRequest::from_parts(rqst_args, trans_id)?;
                Ok(RequestType::AnnouncePeer(announce_peer_rqst))
            }
            unknown => {
                if let Some(target_key) = forward_compatible_find_node(rqst_args) {
                    let find_node_rqst = FindNodeRequest::from_parts(rqst_args, trans_id, target_key)?;
                    Ok(RequestType::FindNode(find_node_rqst))
                } else {
                    let error_message = ErrorMessage::new(
                        trans_id.to_vec(),
                        ErrorCode::MethodUnknown,
                        format!("Received Unknown Request Method: {}", unknown),
                    );

                    Err(DhtError::from_kind(DhtErrorKind::InvalidRequest { msg: error_message }))
                }
            }
        }
    }

    pub fn transaction_id(&self) -> &[u8] {
        match *self {
            RequestType::Ping(ref n) => n.transaction_id(),
            RequestType::FindNode(ref n) => n.transaction_id(),
            RequestType::GetPeers(ref n) => n.transaction_id(),
            RequestType::AnnouncePeer(ref n) => n.transaction_id(),
        }
    }

    /// Id of the node that sent the request.
    pub fn node_id(&self) -> NodeId {
        match *self {
            RequestType::Ping(ref n) => n.node_id(),
            RequestType::FindNode(ref n) => n.node_id(),
            RequestType::GetPeers(ref n) => n.node_id(),
            RequestType::AnnouncePeer(ref n) => n.node_id(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            RequestType::Ping(ref n) => n.encode(),
            RequestType::FindNode(ref n) => n.encode(),
            RequestType::GetPeers(ref n) => n.encode(),
            RequestType::AnnouncePeer(ref n) => n.encode(),
        }
    }
}

/// Mainline dht extension for forward compatibility.
///
/// Unrecognized requests which contain either an `info_hash` or `target` argument are
/// interpreted as `find_node`.
fn forward_compatible_find_node(rqst_args: &BencodeRef) -> Option<&'static str> {
    let rqst_root = rqst_args.dict()?;

    match (rqst_root.lookup(message::TARGET_ID_KEY.as_bytes()), rqst_root.lookup(message::INFO_HASH_KEY.as_bytes())) {
        (Some(_), _) => Some(message::TARGET_ID_KEY),
        (_, Some(_)) => Some(message::INFO_HASH_KEY),
        (None, None) => None,
    }
}
