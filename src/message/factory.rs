//! Correlates outgoing queries with the responses and errors that answer them.

use std::collections::HashMap;
use std::net::SocketAddr;

use tokio::sync::oneshot;

use crate::error::{DhtError, DhtErrorKind, DhtResult};
use crate::id::{InfoHash, NodeId};
use crate::message::announce_peer::{AnnouncePeerRequest, ConnectPort};
use crate::message::find_node::FindNodeRequest;
use crate::message::get_peers::GetPeersRequest;
use crate::message::ping::PingRequest;
use crate::message::request::RequestType;
use crate::message::response::{ExpectedResponse, ResponseType};
use crate::message::MessageType;
use crate::transaction::TransactionIds;

/// Query we can send to a remote node.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum OutgoingQuery {
    Ping,
    FindNode(NodeId),
    GetPeers(InfoHash),
    AnnouncePeer {
        info_hash: InfoHash,
        token:     Vec<u8>,
        port:      ConnectPort,
    },
}

impl OutgoingQuery {
    /// Response type that answers this query.
    pub fn expected_response(&self) -> ExpectedResponse {
        match *self {
            OutgoingQuery::Ping => ExpectedResponse::Ping,
            OutgoingQuery::FindNode(_) => ExpectedResponse::FindNode,
            OutgoingQuery::GetPeers(_) => ExpectedResponse::GetPeers,
            OutgoingQuery::AnnouncePeer { .. } => ExpectedResponse::AnnouncePeer,
        }
    }

    pub fn encode(&self, trans_id: &[u8], node_id: NodeId) -> Vec<u8> {
        let trans_id = trans_id.to_vec();

        match *self {
            OutgoingQuery::Ping => PingRequest::new(trans_id, node_id).encode(),
            OutgoingQuery::FindNode(target) => FindNodeRequest::new(trans_id, node_id, target).encode(),
            OutgoingQuery::GetPeers(info_hash) => GetPeersRequest::new(trans_id, node_id, info_hash).encode(),
            OutgoingQuery::AnnouncePeer {
                info_hash,
                ref token,
                port,
            } => AnnouncePeerRequest::new(trans_id, node_id, info_hash, token.clone(), port).encode(),
        }
    }
}

/// Outcome delivered to whoever registered a query.
pub type QueryResult = DhtResult<ResponseType>;

/// Registered query, ready to be put on the wire.
pub struct PendingQuery {
    pub trans_id: Vec<u8>,
    pub bytes:    Vec<u8>,
    pub response: oneshot::Receiver<QueryResult>,
}

struct PendingEntry {
    expected: ExpectedResponse,
    addr:     SocketAddr,
    sender:   oneshot::Sender<QueryResult>,
}

// ----------------------------------------------------------------------------//

/// Pending transaction table plus the encode and decode entry points of the engine.
pub struct MessageFactory {
    node_id:   NodeId,
    pending:   HashMap<Vec<u8>, PendingEntry>,
    trans_ids: TransactionIds,
}

impl MessageFactory {
    pub fn new(node_id: NodeId) -> MessageFactory {
        MessageFactory {
            node_id,
            pending: HashMap::new(),
            trans_ids: TransactionIds::new(),
        }
    }

    /// Register a query to `addr` under a fresh transaction id.
    pub fn register(&mut self, query: &OutgoingQuery, addr: SocketAddr) -> PendingQuery {
        let mut trans_id = self.trans_ids.generate().to_vec();
        while self.pending.contains_key(&trans_id) {
            trans_id = self.trans_ids.generate().to_vec();
        }

        let (sender, response) = oneshot::channel();
        self.pending.insert(
            trans_id.clone(),
            PendingEntry {
                expected: query.expected_response(),
                addr,
                sender,
            },
        );

        PendingQuery {
            bytes: query.encode(&trans_id, self.node_id),
            trans_id,
            response,
        }
    }

    /// Forget about a query that will not be waited on any longer.
    pub fn cancel(&mut self, trans_id: &[u8]) -> bool {
        self.pending.remove(trans_id).is_some()
    }

    /// Number of queries waiting on a response.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Drop every pending query; their receivers observe a closed channel.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Decode a datagram from `addr`.
    ///
    /// Requests are handed back for the caller to handle. Responses and errors are delivered to
    /// the query they answer and `None` is returned. Responses only match a transaction that was
    /// sent to the same address.
    pub fn receive(&mut self, bytes: &[u8], addr: SocketAddr) -> DhtResult<Option<RequestType>> {
        let mut matched = None;

        let decoded = {
            let pending = &self.pending;
            let matched = &mut matched;

            MessageType::with_version(bytes, |trans_id| match pending.get(trans_id) {
                Some(entry) if entry.addr == addr => {
                    *matched = Some(trans_id.to_vec());
                    entry.expected
                }
                _ => ExpectedResponse::None,
            })
        };
        let decoded = decoded.map(|(message, version)| {
            if let Some(version) = version {
                trace!("bip_kademlia: Message from {} carries client version {:?}", addr, String::from_utf8_lossy(&version));
            }

            message
        });

        match decoded {
            Ok(MessageType::Request(request)) => Ok(Some(request)),
            Ok(MessageType::Response(response)) => {
                if let Some(entry) = self.pending.remove(response.transaction_id()) {
                    // Receiver may have given up already
                    let _ = entry.sender.send(Ok(response));
                }

                Ok(None)
            }
            Ok(MessageType::Error(message)) => match self.take_entry(message.transaction_id(), addr) {
                Some(entry) => {
                    let _ = entry.sender.send(Err(DhtError::from(message)));
                    Ok(None)
                }
                None => Err(DhtError::from(message)),
            },
            Err(error) => {
                // Malformed answer to a query we did send, resolve it right away
                if let Some(entry) = matched.and_then(|trans_id| self.pending.remove(&trans_id)) {
                    let _ = entry.sender.send(Err(DhtError::from_kind(DhtErrorKind::InvalidResponse {
                        details: error.to_string(),
                    })));
                }

                Err(error)
            }
        }
    }

    fn take_entry(&mut self, trans_id: &[u8], addr: SocketAddr) -> Option<PendingEntry> {
        match self.pending.get(trans_id) {
            Some(entry) if entry.addr == addr => self.pending.remove(trans_id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::error::DhtErrorKind;
    use crate::id::NodeId;
    use crate::message::error::{ErrorCode, ErrorMessage};
    use crate::message::factory::{MessageFactory, OutgoingQuery};
    use crate::message::ping::PingResponse;
    use crate::message::request::RequestType;
    use crate::message::response::ResponseType;

    fn remote() -> SocketAddr {
        "10.0.0.1:6881".parse().unwrap()
    }

    #[test]
    fn positive_response_resolves_pending_query() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let mut pending = factory.register(&OutgoingQuery::Ping, remote());

        let response = PingResponse::new(pending.trans_id.clone(), NodeId::from([2u8; 20])).encode();
        assert!(factory.receive(&response, remote()).unwrap().is_none());

        match pending.response.try_recv().unwrap() {
            Ok(ResponseType::Ping(ping)) => assert_eq!(NodeId::from([2u8; 20]), ping.node_id()),
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(0, factory.pending());
    }

    #[test]
    fn positive_request_is_returned() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let bytes = OutgoingQuery::FindNode(NodeId::from([3u8; 20])).encode(b"aa", NodeId::from([2u8; 20]));

        match factory.receive(&bytes, remote()).unwrap() {
            Some(RequestType::FindNode(request)) => assert_eq!(NodeId::from([3u8; 20]), request.target_id()),
            other => panic!("unexpected request {:?}", other),
        }
    }

    #[test]
    fn positive_error_resolves_pending_query() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let mut pending = factory.register(&OutgoingQuery::Ping, remote());

        let error = ErrorMessage::new(pending.trans_id.clone(), ErrorCode::ServerError, "busy".to_owned()).encode();
        assert!(factory.receive(&error, remote()).unwrap().is_none());

        match pending.response.try_recv().unwrap() {
            Err(error) => match *error.kind() {
                DhtErrorKind::RemoteError { code, .. } => assert_eq!(202, code),
                ref other => panic!("unexpected error kind {:?}", other),
            },
            Ok(response) => panic!("unexpected response {:?}", response),
        }
    }

    #[test]
    fn positive_malformed_response_resolves_pending_query() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let mut pending = factory.register(&OutgoingQuery::FindNode(NodeId::from([3u8; 20])), remote());

        // find_node response whose nodes string is one byte short
        let mut bytes = b"d1:rd2:id20:mnopqrstuvwxyz1234565:nodes25:".to_vec();
        bytes.extend_from_slice(&[0u8; 25]);
        bytes.extend_from_slice(b"e1:t4:");
        bytes.extend_from_slice(&pending.trans_id);
        bytes.extend_from_slice(b"1:y1:re");

        assert!(factory.receive(&bytes, remote()).is_err());
        assert!(pending.response.try_recv().unwrap().is_err());
        assert_eq!(0, factory.pending());
    }

    #[test]
    fn negative_unknown_transaction_id() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let response = PingResponse::new(b"zzzz".to_vec(), NodeId::from([2u8; 20])).encode();

        let error = factory.receive(&response, remote()).unwrap_err();
        match *error.kind() {
            DhtErrorKind::UnsolicitedResponse { .. } => (),
            ref other => panic!("unexpected error kind {:?}", other),
        }
    }

    #[test]
    fn negative_response_from_wrong_address() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let mut pending = factory.register(&OutgoingQuery::Ping, remote());
        let spoofer: SocketAddr = "10.0.0.2:6881".parse().unwrap();

        let response = PingResponse::new(pending.trans_id.clone(), NodeId::from([2u8; 20])).encode();
        assert!(factory.receive(&response, spoofer).is_err());

        assert!(pending.response.try_recv().is_err());
        assert_eq!(1, factory.pending());
    }

    #[test]
    fn negative_cancelled_query_is_unsolicited() {
        let mut factory = MessageFactory::new(NodeId::from([1u8; 20]));
        let pending = factory.register(&OutgoingQuery::Ping, remote());

        assert!(factory.cancel(&pending.trans_id));

        let response = PingResponse::new(pending.trans_id.clone(), NodeId::from([2u8; 20])).encode();
        assert!(factory.receive(&response, remote()).is_err());
    }
}
