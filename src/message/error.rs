use bip_bencode::{BConvert, BListAccess, BencodeConvertError, BencodeRef};

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::message;

const NUM_ERROR_ARGS: usize = 2;

const GENERIC_ERROR_CODE: i64 = 201;
const SERVER_ERROR_CODE: i64 = 202;
const PROTOCOL_ERROR_CODE: i64 = 203;
const METHOD_UNKNOWN_CODE: i64 = 204;

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ErrorCode {
    GenericError,
    ServerError,
    ProtocolError,
    MethodUnknown,
    /// Code outside of the standard set, kept so it can be reported.
    Other(i64),
}

impl ErrorCode {
    pub fn code(&self) -> i64 {
        match *self {
            ErrorCode::GenericError => GENERIC_ERROR_CODE,
            ErrorCode::ServerError => SERVER_ERROR_CODE,
            ErrorCode::ProtocolError => PROTOCOL_ERROR_CODE,
            ErrorCode::MethodUnknown => METHOD_UNKNOWN_CODE,
            ErrorCode::Other(code) => code,
        }
    }
}

impl From<i64> for ErrorCode {
    fn from(code: i64) -> ErrorCode {
        match code {
            GENERIC_ERROR_CODE => ErrorCode::GenericError,
            SERVER_ERROR_CODE => ErrorCode::ServerError,
            PROTOCOL_ERROR_CODE => ErrorCode::ProtocolError,
            METHOD_UNKNOWN_CODE => ErrorCode::MethodUnknown,
            other => ErrorCode::Other(other),
        }
    }
}

// ----------------------------------------------------------------------------//

#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
struct ErrorValidate;

impl ErrorValidate {
    fn extract_error_args<'a>(&self, args: &'a dyn BListAccess<BencodeRef<'a>>) -> DhtResult<(i64, &'a str)> {
        if args.len() != NUM_ERROR_ARGS {
            return Err(DhtError::from_kind(DhtErrorKind::InvalidMessage {
                details: format!("Error Message Invalid Number Of Error Args: {}", args.len()),
            }));
        }

        let missing = || {
            DhtError::from_kind(DhtErrorKind::InvalidMessage {
                details: "Error Message Missing Error Args".to_owned(),
            })
        };
        let code = self.convert_int(args.get(0).ok_or_else(missing)?, "e[0]")?;
        let message = self.convert_str(args.get(1).ok_or_else(missing)?, "e[1]")?;

        Ok((code, message))
    }
}

impl BConvert for ErrorValidate {
    type Error = DhtError;

    fn handle_error(&self, error: BencodeConvertError) -> DhtError {
        DhtError::from_kind(DhtErrorKind::InvalidMessage {
            details: error.to_string(),
        })
    }
}

// ----------------------------------------------------------------------------//

/// KRPC error message, sent in place of a response.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct ErrorMessage {
    trans_id: Vec<u8>,
    code:     ErrorCode,
    message:  String,
}

impl ErrorMessage {
    pub fn new(trans_id: Vec<u8>, code: ErrorCode, message: String) -> ErrorMessage {
        ErrorMessage {
            trans_id,
            code,
            message,
        }
    }

    pub fn from_parts(err_args: &BencodeRef, trans_id: &[u8]) -> DhtResult<ErrorMessage> {
        let validate = ErrorValidate;
        let error_args = validate.convert_list(err_args, message::ERROR_TYPE_KEY)?;

        let (code, message) = validate.extract_error_args(error_args)?;

        Ok(ErrorMessage::new(trans_id.to_vec(), ErrorCode::from(code), message.to_owned()))
    }

    pub fn transaction_id(&self) -> &[u8] {
        &self.trans_id
    }

    pub fn error_code(&self) -> ErrorCode {
        self.code
    }

    pub fn error_message(&self) -> &str {
        &self.message
    }

    pub fn encode(&self) -> Vec<u8> {
        (ben_map!{
            message::TRANSACTION_ID_KEY => ben_bytes!(&self.trans_id[..]),
            message::MESSAGE_TYPE_KEY => ben_bytes!(message::ERROR_TYPE_KEY),
            message::ERROR_TYPE_KEY => ben_list!(
                ben_int!(self.code.code()),
                ben_bytes!(self.message.as_bytes())
            )
        })
        .encode()
    }
}

impl From<ErrorMessage> for DhtError {
    fn from(message: ErrorMessage) -> DhtError {
        DhtError::from_kind(DhtErrorKind::RemoteError {
            code:    message.code.code(),
            message: message.message,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::message::error::{ErrorCode, ErrorMessage};
    use crate::message::response::ExpectedResponse;
    use crate::message::MessageType;

    const ERROR_BYTES: &[u8] = b"d1:eli201e23:A Generic Error Ocurrede1:t2:aa1:y1:ee";

    #[test]
    fn positive_encode_generic_error() {
        let message = ErrorMessage::new(b"aa".to_vec(), ErrorCode::GenericError, "A Generic Error Ocurred".to_owned());

        assert_eq!(ERROR_BYTES, &message.encode()[..]);
    }

    #[test]
    fn positive_decode_generic_error() {
        match MessageType::new(ERROR_BYTES, |_| ExpectedResponse::None).unwrap() {
            MessageType::Error(message) => {
                assert_eq!(ErrorCode::GenericError, message.error_code());
                assert_eq!("A Generic Error Ocurred", message.error_message());
                assert_eq!(&b"aa"[..], message.transaction_id());
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn positive_decode_nonstandard_code() {
        let bytes = b"d1:eli299e4:oopse1:t2:aa1:y1:ee";

        match MessageType::new(&bytes[..], |_| ExpectedResponse::None).unwrap() {
            MessageType::Error(message) => assert_eq!(ErrorCode::Other(299), message.error_code()),
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn negative_error_wrong_arg_count() {
        let bytes = b"d1:eli201ee1:t2:aa1:y1:ee";

        assert!(MessageType::new(&bytes[..], |_| ExpectedResponse::None).is_err());
    }
}
