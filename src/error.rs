//! Errors produced while decoding, routing and querying.

use std::io;

use bip_bencode::{BencodeConvertError, BencodeParseError};

use crate::message::error::ErrorMessage;

error_chain! {
    types {
        DhtError, DhtErrorKind, DhtResultExt, DhtResult;
    }

    foreign_links {
        Io(io::Error);
        BencodeParse(BencodeParseError);
        BencodeConvert(BencodeConvertError);
    }

    errors {
        InvalidLength {
            expected: usize,
            actual:   usize
        } {
            description("Found Bytes With An Invalid Length")
            display("Found Bytes With Length {} But Expected {}", actual, expected)
        }
        InvalidMessage {
            details: String
        } {
            description("Node Sent An Invalid Message")
            display("Node Sent An Invalid Message: {}", details)
        }
        InvalidRequest {
            msg: ErrorMessage
        } {
            description("Node Sent An Invalid Request")
            display("Node Sent An Invalid Request: {:?}", msg)
        }
        InvalidResponse {
            details: String
        } {
            description("Node Sent An Invalid Response")
            display("Node Sent An Invalid Response: {}", details)
        }
        UnsolicitedResponse {
            trans_id: Vec<u8>
        } {
            description("Node Sent A Response With A Bad Transaction ID")
            display("Node Sent A Response With A Bad Transaction ID {:?}", trans_id)
        }
        RemoteError {
            code:    i64,
            message: String
        } {
            description("Node Replied With An Error Message")
            display("Node Replied With Error {}: {}", code, message)
        }
        Timeout {
            attempts: usize
        } {
            description("Node Failed To Respond To A Query")
            display("Node Failed To Respond After {} Attempts", attempts)
        }
        RangeViolation {
            details: String
        } {
            description("Routing Table Invariant Violated")
            display("Routing Table Invariant Violated: {}", details)
        }
        Shutdown {
            description("Dht Is Shutting Down")
            display("Dht Is Shutting Down")
        }
    }
}

impl DhtError {
    /// Whether the error was caused by a query that went unanswered.
    pub fn is_timeout(&self) -> bool {
        match self.kind() {
            DhtErrorKind::Timeout { .. } => true,
            _ => false,
        }
    }
}
