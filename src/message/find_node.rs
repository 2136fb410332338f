use bip_bencode::{BConvert, BencodeRef};

use crate::error::DhtResult;
use crate::id::NodeId;
use crate::message;
use crate::message::compact_info::CompactNodeInfo;
use crate::message::request::{self, RequestValidate};
use crate::message::response::{self, ResponseValidate};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FindNodeRequest {
    trans_id: Vec<u8>,
    node_id:  NodeId,
    target:   NodeId,
}

impl FindNodeRequest {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId, target: NodeId) -> FindNodeRequest {
        FindNodeRequest { trans_id, node_id, target }
    }

    /// Create a FindNodeRequest from parts.
    ///
    /// The `target_key` argument is provided for cases where, due to forward compatibility,
    /// the target key we are interested in could fall under the target key or another key.
    pub fn from_parts(rqst_args: &BencodeRef, trans_id: &[u8], target_key: &str) -> DhtResult<FindNodeRequest> {
        let validate = RequestValidate::new(trans_id);
        let rqst_root = validate.convert_dict(rqst_args, request::REQUEST_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rqst_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        let target_bytes = validate.lookup_and_convert_bytes(rqst_root, target_key)?;
        let target = validate.validate_node_id(target_bytes)?;

        Ok(FindNodeRequest::new(trans_id.to_vec(), node_id, target))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn target_id(&self) -> NodeId {
        self.target
    }

    pub fn encode(&self) -> Vec<u8> {
        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::REQUEST_TYPE_KEY),
            message::REQUEST_TYPE_KEY => ben_bytes!(request::FIND_NODE_TYPE_KEY),
            request::REQUEST_ARGS_KEY => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..]),
                message::TARGET_ID_KEY => ben_bytes!(&self.target.as_bytes()[..])
            }
        })
        .encode()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct FindNodeResponse {
    trans_id: Vec<u8>,
    node_id:  NodeId,
    nodes:    CompactNodeInfo,
}

impl FindNodeResponse {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId, nodes: CompactNodeInfo) -> FindNodeResponse {
        FindNodeResponse { trans_id, node_id, nodes }
    }

    pub fn from_parts(rsp_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<FindNodeResponse> {
        let validate = ResponseValidate::new(trans_id);
        let rsp_root = validate.convert_dict(rsp_args, response::RESPONSE_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rsp_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        let maybe_nodes = validate.lookup_and_convert_bytes(rsp_root, message::NODES_KEY).ok();
        let maybe_nodes6 = validate.lookup_and_convert_bytes(rsp_root, message::NODES6_KEY).ok();
        let nodes = validate.validate_nodes(maybe_nodes, maybe_nodes6)?;

        Ok(FindNodeResponse::new(trans_id.to_vec(), node_id, nodes))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn nodes(&self) -> &CompactNodeInfo {
        &self.nodes
    }

    pub fn encode(&self) -> Vec<u8> {
        let nodes = self.nodes.v4_bytes();
        let nodes6 = self.nodes.v6_bytes();

        let mut response_args = ben_map!{
            message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..]),
            message::NODES_KEY => ben_bytes!(&nodes[..])
        };
        if !nodes6.is_empty() {
            response::insert_arg(&mut response_args, message::NODES6_KEY, ben_bytes!(&nodes6[..]));
        }

        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::RESPONSE_TYPE_KEY),
            response::RESPONSE_ARGS_KEY => response_args
        })
        .encode()
    }
}
