use bip_bencode::{BConvert, BencodeRef};

use crate::error::DhtResult;
use crate::id::NodeId;
use crate::message;
use crate::message::request::{self, RequestValidate};
use crate::message::response::{self, ResponseValidate};

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PingRequest {
    trans_id: Vec<u8>,
    node_id:  NodeId,
}

impl PingRequest {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId) -> PingRequest {
        PingRequest { trans_id, node_id }
    }

    pub fn from_parts(rqst_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<PingRequest> {
        let validate = RequestValidate::new(trans_id);
        let rqst_root = validate.convert_dict(rqst_args, request::REQUEST_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rqst_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        Ok(PingRequest::new(trans_id.to_vec(), node_id))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn encode(&self) -> Vec<u8> {
        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::REQUEST_TYPE_KEY),
            message::REQUEST_TYPE_KEY => ben_bytes!(request::PING_TYPE_KEY),
            request::REQUEST_ARGS_KEY => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..])
            }
        })
        .encode()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct PingResponse {
    trans_id: Vec<u8>,
    node_id:  NodeId,
}

impl PingResponse {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId) -> PingResponse {
        PingResponse { trans_id, node_id }
    }

    pub fn from_parts(rsp_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<PingResponse> {
        let validate = ResponseValidate::new(trans_id);
        let rsp_root = validate.convert_dict(rsp_args, response::RESPONSE_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rsp_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        Ok(PingResponse::new(trans_id.to_vec(), node_id))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn encode(&self) -> Vec<u8> {
        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::RESPONSE_TYPE_KEY),
            response::RESPONSE_ARGS_KEY => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..])
            }
        })
        .encode()
    }
}

#[cfg(test)]
mod tests {
    use crate::id::NodeId;
    use crate::message::ping::{PingRequest, PingResponse};

    #[test]
    fn positive_encode_request() {
        let request = PingRequest::new(b"aa".to_vec(), NodeId::from(*b"abcdefghij0123456789"));

        assert_eq!(
            &b"d1:ad2:id20:abcdefghij0123456789e1:q4:ping1:t2:aa1:y1:qe"[..],
            &request.encode()[..]
        );
    }

    #[test]
    fn positive_encode_response() {
        let response = PingResponse::new(b"aa".to_vec(), NodeId::from(*b"mnopqrstuvwxyz123456"));

        assert_eq!(&b"d1:rd2:id20:mnopqrstuvwxyz123456e1:t2:aa1:y1:re"[..], &response.encode()[..]);
    }
}
