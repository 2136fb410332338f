//! KRPC messages exchanged between nodes.

use bip_bencode::{BConvert, BDecodeOpt, BRefAccess, BencodeConvertError, BencodeRef};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::message::error::ErrorMessage;
use crate::message::request::RequestType;
use crate::message::response::{ExpectedResponse, ResponseType};

pub mod compact_info;

pub mod error;
pub mod factory;
pub mod request;
pub mod response;

pub mod announce_peer;
pub mod find_node;
pub mod get_peers;
pub mod ping;

// Top level message keys
const TRANSACTION_ID_KEY: &str = "t";
const MESSAGE_TYPE_KEY: &str = "y";
const CLIENT_VERSION_KEY: &str = "v";

// Top level message type sentinels
const REQUEST_TYPE_KEY: &str = "q";
const RESPONSE_TYPE_KEY: &str = "r";
const ERROR_TYPE_KEY: &str = "e";

// Refers to root dictionary itself
const ROOT_ID_KEY: &str = "root";

// Keys common across message types
const NODE_ID_KEY: &str = "id";
const NODES_KEY: &str = "nodes";
const NODES6_KEY: &str = "nodes6";
const VALUES_KEY: &str = "values";
const TARGET_ID_KEY: &str = "target";
const INFO_HASH_KEY: &str = "info_hash";
const TOKEN_KEY: &str = "token";

// ----------------------------------------------------------------------------//

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct MessageValidate;

impl BConvert for MessageValidate {
    type Error = DhtError;

    fn handle_error(&self, error: BencodeConvertError) -> DhtError {
        DhtError::from_kind(DhtErrorKind::InvalidMessage {
            details: error.to_string(),
        })
    }
}

// ----------------------------------------------------------------------------//

/// Any message that can be received from a remote node.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum MessageType {
    Request(RequestType),
    Response(ResponseType),
    Error(ErrorMessage),
}

impl MessageType {
    /// Decode a message.
    ///
    /// Responses carry no indication of which query they answer, so `trans_mapper` is asked
    /// what response, if any, is expected for the transaction id.
    pub fn new<T>(bytes: &[u8], trans_mapper: T) -> DhtResult<MessageType>
    where
        T: FnOnce(&[u8]) -> ExpectedResponse,
    {
        MessageType::with_version(bytes, trans_mapper).map(|(message, _)| message)
    }

    /// Decode a message along with the client version string the sender advertised, if any.
    pub fn with_version<T>(bytes: &[u8], trans_mapper: T) -> DhtResult<(MessageType, Option<Vec<u8>>)>
    where
        T: FnOnce(&[u8]) -> ExpectedResponse,
    {
        let bencode = BencodeRef::decode(bytes, BDecodeOpt::default())?;

        let validate = MessageValidate;
        let msg_root = validate.convert_dict(&bencode, ROOT_ID_KEY)?;

        let trans_id = validate.lookup_and_convert_bytes(msg_root, TRANSACTION_ID_KEY)?;
        let msg_type = validate.lookup_and_convert_str(msg_root, MESSAGE_TYPE_KEY)?;

        // Optional, ignored unless it is a byte string
        let version = msg_root
            .lookup(CLIENT_VERSION_KEY.as_bytes())
            .and_then(|value| value.bytes())
            .map(|value| value.to_vec());

        let message = match msg_type {
            REQUEST_TYPE_KEY => {
                let rqst_type = validate.lookup_and_convert_str(msg_root, REQUEST_TYPE_KEY)?;
                let rqst_args = validate.lookup(msg_root, request::REQUEST_ARGS_KEY).map_err(|_| {
                    request::protocol_error(trans_id, "Missing Dictionary Key: a")
                })?;

                MessageType::Request(RequestType::from_parts(rqst_args, trans_id, rqst_type)?)
            }
            RESPONSE_TYPE_KEY => {
                let rsp_args = validate.lookup(msg_root, response::RESPONSE_ARGS_KEY)?;

                let rsp_type = trans_mapper(trans_id);
                MessageType::Response(ResponseType::from_parts(rsp_args, trans_id, rsp_type)?)
            }
            ERROR_TYPE_KEY => {
                let err_args = validate.lookup(msg_root, ERROR_TYPE_KEY)?;

                MessageType::Error(ErrorMessage::from_parts(err_args, trans_id)?)
            }
            unknown => {
                return Err(DhtError::from_kind(DhtErrorKind::InvalidMessage {
                    details: format!("Unknown Message Type {:?}", unknown),
                }))
            }
        };

        Ok((message, version))
    }

    pub fn transaction_id(&self) -> &[u8] {
        match *self {
            MessageType::Request(ref rqst) => rqst.transaction_id(),
            MessageType::Response(ref rsp) => rsp.transaction_id(),
            MessageType::Error(ref err) => err.transaction_id(),
        }
    }
}
