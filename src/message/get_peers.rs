use bip_bencode::{BConvert, BMutAccess, BencodeMut, BencodeRef};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{InfoHash, NodeId};
use crate::message;
use crate::message::compact_info::{CompactNodeInfo, CompactValueInfo};
use crate::message::request::{self, RequestValidate};
use crate::message::response::{self, ResponseValidate};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GetPeersRequest {
    trans_id:  Vec<u8>,
    node_id:   NodeId,
    info_hash: InfoHash,
}

impl GetPeersRequest {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId, info_hash: InfoHash) -> GetPeersRequest {
        GetPeersRequest { trans_id, node_id, info_hash }
    }

    pub fn from_parts(rqst_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<GetPeersRequest> {
        let validate = RequestValidate::new(trans_id);
        let rqst_root = validate.convert_dict(rqst_args, request::REQUEST_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rqst_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        let info_hash_bytes = validate.lookup_and_convert_bytes(rqst_root, message::INFO_HASH_KEY)?;
        let info_hash = validate.validate_info_hash(info_hash_bytes)?;

        Ok(GetPeersRequest::new(trans_id.to_vec(), node_id, info_hash))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn info_hash(&self) -> InfoHash {
        self.info_hash
    }

    pub fn encode(&self) -> Vec<u8> {
        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::REQUEST_TYPE_KEY),
            message::REQUEST_TYPE_KEY => ben_bytes!(request::GET_PEERS_TYPE_KEY),
            request::REQUEST_ARGS_KEY => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..]),
                message::INFO_HASH_KEY => ben_bytes!(&self.info_hash.as_bytes()[..])
            }
        })
        .encode()
    }
}

/// Contact information carried by a `get_peers` response.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum CompactInfoType {
    Nodes(CompactNodeInfo),
    Values(CompactValueInfo),
    Both(CompactNodeInfo, CompactValueInfo),
}

impl CompactInfoType {
    pub fn nodes(&self) -> Option<&CompactNodeInfo> {
        match *self {
            CompactInfoType::Nodes(ref nodes) | CompactInfoType::Both(ref nodes, _) => Some(nodes),
            CompactInfoType::Values(_) => None,
        }
    }

    pub fn values(&self) -> Option<&CompactValueInfo> {
        match *self {
            CompactInfoType::Values(ref values) | CompactInfoType::Both(_, ref values) => Some(values),
            CompactInfoType::Nodes(_) => None,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct GetPeersResponse {
    trans_id:  Vec<u8>,
    node_id:   NodeId,
    // Bootstrap routers are known to leave the token out
    token:     Option<Vec<u8>>,
    info_type: CompactInfoType,
}

impl GetPeersResponse {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId, token: Option<Vec<u8>>, info_type: CompactInfoType) -> GetPeersResponse {
        GetPeersResponse {
            trans_id,
            node_id,
            token,
            info_type,
        }
    }

    pub fn from_parts(rsp_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<GetPeersResponse> {
        let validate = ResponseValidate::new(trans_id);
        let rsp_root = validate.convert_dict(rsp_args, response::RESPONSE_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rsp_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        let token = validate
            .lookup_and_convert_bytes(rsp_root, message::TOKEN_KEY)
            .ok()
            .map(|token| token.to_vec());

        let maybe_nodes = validate.lookup_and_convert_bytes(rsp_root, message::NODES_KEY).ok();
        let maybe_nodes6 = validate.lookup_and_convert_bytes(rsp_root, message::NODES6_KEY).ok();
        let has_nodes = maybe_nodes.is_some() || maybe_nodes6.is_some();

        let maybe_values = match validate.lookup_and_convert_list(rsp_root, message::VALUES_KEY) {
            Ok(values) => Some(validate.validate_values(values)?),
            Err(_) => None,
        };

        let info_type = match (has_nodes, maybe_values) {
            (true, Some(values)) => CompactInfoType::Both(validate.validate_nodes(maybe_nodes, maybe_nodes6)?, values),
            (true, None) => CompactInfoType::Nodes(validate.validate_nodes(maybe_nodes, maybe_nodes6)?),
            (false, Some(values)) => CompactInfoType::Values(values),
            (false, None) => {
                return Err(DhtError::from_kind(DhtErrorKind::InvalidResponse {
                    details: "Failed To Find nodes Or values In Node Response".to_owned(),
                }))
            }
        };

        Ok(GetPeersResponse::new(trans_id.to_vec(), node_id, token, info_type))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn token(&self) -> Option<&[u8]> {
        self.token.as_ref().map(|token| &token[..])
    }

    pub fn info_type(&self) -> &CompactInfoType {
        &self.info_type
    }

    pub fn encode(&self) -> Vec<u8> {
        let nodes = self.info_type.nodes().map(|nodes| (nodes.v4_bytes(), nodes.v6_bytes()));
        let values = self.info_type.values().map(|values| values.entries());

        let mut response_args = ben_map!{
            message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..])
        };

        if let Some(ref token) = self.token {
            response::insert_arg(&mut response_args, message::TOKEN_KEY, ben_bytes!(&token[..]));
        }

        if let Some((ref nodes, ref nodes6)) = nodes {
            response::insert_arg(&mut response_args, message::NODES_KEY, ben_bytes!(&nodes[..]));
            if !nodes6.is_empty() {
                response::insert_arg(&mut response_args, message::NODES6_KEY, ben_bytes!(&nodes6[..]));
            }
        }

        if let Some(ref values) = values {
            let mut values_list = BencodeMut::new_list();
            if let Some(list) = values_list.list_mut() {
                for value in values.iter() {
                    list.push(ben_bytes!(&value[..]));
                }
            }

            response::insert_arg(&mut response_args, message::VALUES_KEY, values_list);
        }

        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::RESPONSE_TYPE_KEY),
            response::RESPONSE_ARGS_KEY => response_args
        })
        .encode()
    }
}
