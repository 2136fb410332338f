use bip_bencode::{BConvert, BRefAccess, BencodeRef};

use crate::error::DhtResult;
use crate::id::{InfoHash, NodeId};
use crate::message;
use crate::message::request::{self, RequestValidate};
use crate::message::response::{self, ResponseValidate};

const PORT_KEY: &str = "port";
const IMPLIED_PORT_KEY: &str = "implied_port";

/// Port the announcing peer accepts connections on.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConnectPort {
    /// Use the source port of the announce datagram.
    Implied,
    Explicit(u16),
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AnnouncePeerRequest {
    trans_id:  Vec<u8>,
    node_id:   NodeId,
    info_hash: InfoHash,
    token:     Vec<u8>,
    port:      ConnectPort,
}

impl AnnouncePeerRequest {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId, info_hash: InfoHash, token: Vec<u8>, port: ConnectPort) -> AnnouncePeerRequest {
        AnnouncePeerRequest {
            trans_id,
            node_id,
            info_hash,
            token,
            port,
        }
    }

    pub fn from_parts(rqst_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<AnnouncePeerRequest> {
        let validate = RequestValidate::new(trans_id);
        let rqst_root = validate.convert_dict(rqst_args, request::REQUEST_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rqst_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        let info_hash_bytes = validate.lookup_and_convert_bytes(rqst_root, message::INFO_HASH_KEY)?;
        let info_hash = validate.validate_info_hash(info_hash_bytes)?;

        let token = validate.lookup_and_convert_bytes(rqst_root, message::TOKEN_KEY)?;

        // Any non zero implied port means the source port should be used
        let implied = rqst_root
            .lookup(IMPLIED_PORT_KEY.as_bytes())
            .and_then(|value| value.int())
            .map_or(false, |value| value != 0);

        let port = if implied {
            ConnectPort::Implied
        } else {
            let port_number = validate.lookup_and_convert_int(rqst_root, PORT_KEY)?;
            ConnectPort::Explicit(validate.validate_port(port_number)?)
        };

        Ok(AnnouncePeerRequest::new(trans_id.to_vec(), node_id, info_hash, token.to_vec(), port))
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

    pub fn token(&self) -> &[u8] {
        &self.token
    }

    pub fn connect_port(&self) -> ConnectPort {
        self.port
    }

    pub fn encode(&self) -> Vec<u8> {
        let args = match self.port {
            // Some clients error out when the port key is absent, so send a dummy alongside
            ConnectPort::Implied => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..]),
                IMPLIED_PORT_KEY => ben_int!(1),
                message::INFO_HASH_KEY => ben_bytes!(&self.info_hash.as_bytes()[..]),
                PORT_KEY => ben_int!(0),
                message::TOKEN_KEY => ben_bytes!(&self.token[..])
            },
            ConnectPort::Explicit(port) => ben_map!{
                message::NODE_ID_KEY => ben_bytes!(&self.node_id.as_bytes()[..]),
                message::INFO_HASH_KEY => ben_bytes!(&self.info_hash.as_bytes()[..]),
                PORT_KEY => ben_int!(i64::from(port)),
                message::TOKEN_KEY => ben_bytes!(&self.token[..])
            },
        };

        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::REQUEST_TYPE_KEY),
            message::REQUEST_TYPE_KEY => ben_bytes!(request::ANNOUNCE_PEER_TYPE_KEY),
            request::REQUEST_ARGS_KEY => args
        })
        .encode()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct AnnouncePeerResponse {
    trans_id: Vec<u8>,
    node_id:  NodeId,
}

impl AnnouncePeerResponse {
    pub fn new(trans_id: Vec<u8>, node_id: NodeId) -> AnnouncePeerResponse {
        AnnouncePeerResponse { trans_id, node_id }
    }

    pub fn from_parts(rsp_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<AnnouncePeerResponse> {
        let validate = ResponseValidate::new(trans_id);
        let rsp_root = validate.convert_dict(rsp_args, response::RESPONSE_ARGS_KEY)?;

        let node_id_bytes = validate.lookup_and_convert_bytes(rsp_root, message::NODE_ID_KEY)?;
        let node_id = validate.validate_node_id(node_id_bytes)?;

        Ok(AnnouncePeerResponse::new(trans_id.to_vec(), node_id))
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
    use crate::message::announce_peer::{AnnouncePeerRequest, ConnectPort};
    use crate::message::request::RequestType;
    use crate::message::response::ExpectedResponse;
    use crate::message::MessageType;

    const ANNOUNCE_BYTES: &[u8] =
        b"d1:ad2:id20:abcdefghij01234567899:info_hash20:mnopqrstuvwxyz1234564:porti6881e5:token8:aoeusnthe1:q13:announce_peer1:t2:aa1:y1:qe";

    fn sample_request(port: ConnectPort) -> AnnouncePeerRequest {
        AnnouncePeerRequest::new(
            b"aa".to_vec(),
            NodeId::from(*b"abcdefghij0123456789"),
            NodeId::from(*b"mnopqrstuvwxyz123456"),
            b"aoeusnth".to_vec(),
            port,
        )
    }

    #[test]
    fn positive_encode_explicit_port() {
        assert_eq!(ANNOUNCE_BYTES, &sample_request(ConnectPort::Explicit(6881)).encode()[..]);
    }

    #[test]
    fn positive_decode_explicit_port() {
        let message = MessageType::new(ANNOUNCE_BYTES, |_| ExpectedResponse::None).unwrap();

        assert_eq!(
            MessageType::Request(RequestType::AnnouncePeer(sample_request(ConnectPort::Explicit(6881)))),
            message
        );
    }

    #[test]
    fn positive_implied_port_round_trip() {
        let request = sample_request(ConnectPort::Implied);

        match MessageType::new(&request.encode(), |_| ExpectedResponse::None).unwrap() {
            MessageType::Request(RequestType::AnnouncePeer(decoded)) => {
                assert_eq!(ConnectPort::Implied, decoded.connect_port());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn negative_port_out_of_range() {
        let bytes =
            b"d1:ad2:id20:abcdefghij01234567899:info_hash20:mnopqrstuvwxyz1234564:porti70000e5:token8:aoeusnthe1:q13:announce_peer1:t2:aa1:y1:qe";

        assert!(MessageType::new(&bytes[..], |_| ExpectedResponse::None).is_err());
    }

    #[test]
    fn negative_missing_token() {
        let bytes = b"d1:ad2:id20:abcdefghij01234567899:info_hash20:mnopqrstuvwxyz1234564:porti6881ee1:q13:announce_peer1:t2:aa1:y1:qe";

        assert!(MessageType::new(&bytes[..], |_| ExpectedResponse::None).is_err());
    }
}
