use bip_bencode::inner::BCowConvert;
use bip_bencode::{BConvert, BListAccess, BMutAccess, BRefAccess, BencodeConvertError, BencodeMut, BencodeRef};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::NodeId;
use crate::message::announce_peer::AnnouncePeerResponse;
use crate::message::compact_info::{CompactNodeInfo, CompactValueInfo};
use crate::message::find_node::FindNodeResponse;
use crate::message::get_peers::GetPeersResponse;
use crate::message::ping::PingResponse;

pub const RESPONSE_ARGS_KEY: &str = "r";

/// Insert an optional argument into an already built response dictionary.
pub fn insert_arg<'a>(args: &mut BencodeMut<'a>, key: &'a str, value: BencodeMut<'a>) {
    if let Some(dict) = args.dict_mut() {
        dict.insert(BCowConvert::convert(key), value);
    }
}

// ----------------------------------------------------------------------------//

pub struct ResponseValidate<'a> {
    trans_id: &'a [u8],
}

impl<'a> ResponseValidate<'a> {
    pub fn new(trans_id: &'a [u8]) -> ResponseValidate<'a> {
        ResponseValidate { trans_id }
    }

    pub fn validate_node_id(&self, node_id: &[u8]) -> DhtResult<NodeId> {
        NodeId::from_hash(node_id).map_err(|_| {
            invalid_response(format!("Found Node ID With Invalid Length {}", node_id.len()))
        })
    }

    /// Validate the compact node strings of a response, either of which may be absent.
    pub fn validate_nodes(&self, nodes: Option<&[u8]>, nodes6: Option<&[u8]>) -> DhtResult<CompactNodeInfo> {
        let mut compact_nodes = match nodes {
            Some(bytes) => CompactNodeInfo::from_v4_bytes(bytes)
                .map_err(|_| invalid_response("Found nodes Structure With Wrong Multiple Of Bytes".to_owned()))?,
            None => CompactNodeInfo::new(),
        };

        if let Some(bytes) = nodes6 {
            let compact_nodes6 = CompactNodeInfo::from_v6_bytes(bytes)
                .map_err(|_| invalid_response("Found nodes6 Structure With Wrong Multiple Of Bytes".to_owned()))?;

            compact_nodes.extend(compact_nodes6);
        }

        Ok(compact_nodes)
    }

    pub fn validate_values<'b>(&self, values: &dyn BListAccess<BencodeRef<'b>>) -> DhtResult<CompactValueInfo> {
        let mut entries = Vec::with_capacity(values.len());

        for index in 0..values.len() {
            match values.get(index).and_then(|value| value.bytes()) {
                Some(bytes) => entries.push(bytes),
                None => {
                    return Err(invalid_response(
                        "Found values Structure Element With Wrong Bencode Type".to_owned(),
                    ))
                }
            }
        }

        CompactValueInfo::from_entries(entries)
            .map_err(|_| invalid_response("Found values Structure Element With Wrong Number Of Bytes".to_owned()))
    }

    pub fn transaction_id(&self) -> &[u8] {
        self.trans_id
    }
}

impl<'a> BConvert for ResponseValidate<'a> {
    type Error = DhtError;

    fn handle_error(&self, error: BencodeConvertError) -> DhtError {
        invalid_response(error.to_string())
    }
}

fn invalid_response(details: String) -> DhtError {
    DhtError::from_kind(DhtErrorKind::InvalidResponse { details })
}

// ----------------------------------------------------------------------------//

/// Response we expect for an outstanding transaction.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ExpectedResponse {
    Ping,
    FindNode,
    GetPeers,
    AnnouncePeer,
    None,
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum ResponseType {
    Ping(PingResponse),
    FindNode(FindNodeResponse),
    GetPeers(GetPeersResponse),
    AnnouncePeer(AnnouncePeerResponse),
}

impl ResponseType {
    pub fn from_parts(rsp_args: &BencodeRef, trans_id: &[u8], rsp_type: ExpectedResponse) -> DhtResult<ResponseType> {
        match rsp_type {
            ExpectedResponse::Ping => {
                let ping_rsp = PingResponse::from_parts(rsp_args, trans_id)?;
                Ok(ResponseType::Ping(ping_rsp))
            }
            ExpectedResponse::FindNode => {
                let find_node_rsp = FindNodeResponse::from_parts(rsp_args, trans_id)?;
                Ok(ResponseType::FindNode(find_node_rsp))
            }
            ExpectedResponse::GetPeers => {
                let get_peers_rsp = GetPeersResponse::from_parts(rsp_args, trans_id)?;
                Ok(ResponseType::GetPeers(get_peers_rsp))
            }
            ExpectedResponse::AnnouncePeer => {
                let announce_peer_rsp = AnnouncePeerResponse::from_parts(rsp_args, trans_id)?;
                Ok(ResponseType::AnnouncePeer(announce_peer_rsp))
            }
            ExpectedResponse::None => Err(DhtError::from_kind(DhtErrorKind::UnsolicitedResponse {
                trans_id: trans_id.to_vec(),
            })),
        }
    }

    pub fn transaction_id(&self) -> &[u8] {
        match *self {
            ResponseType::Ping(ref n) => n.transaction_id(),
            ResponseType::FindNode(ref n) => n.transaction_id(),
            ResponseType::GetPeers(ref n) => n.transaction_id(),
            ResponseType::AnnouncePeer(ref n) => n.transaction_id(),
        }
    }

    /// Id of the node that sent the response.
    pub fn node_id(&self) -> NodeId {
        match *self {
            ResponseType::Ping(ref n) => n.node_id(),
            ResponseType::FindNode(ref n) => n.node_id(),
            ResponseType::GetPeers(ref n) => n.node_id(),
            ResponseType::AnnouncePeer(ref n) => n.node_id(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            ResponseType::Ping(ref n) => n.encode(),
            ResponseType::FindNode(ref n) => n.encode(),
            ResponseType::GetPeers(ref n) => n.encode(),
            ResponseType::AnnouncePeer(ref n) => n.encode(),
        }
    }
}
