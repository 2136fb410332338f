use std::sync::Arc;

use tokio::time;

use crate::error::{DhtError, DhtErrorKind};
use crate::message::factory::{OutgoingQuery, PendingQuery, QueryResult};
use crate::routing::node::Node;
use crate::worker::{DhtContext, DhtEvent};

enum Attempt {
    Answered(QueryResult),
    TimedOut,
    Shutdown,
}

/// Single query to a single node, resent on timeout until the retry ceiling is reached.
pub struct QueryTask {
    context: Arc<DhtContext>,
    node:    Node,
    query:   OutgoingQuery,
    record:  bool,
}

impl QueryTask {
    pub fn new(context: Arc<DhtContext>, node: Node, query: OutgoingQuery) -> QueryTask {
        QueryTask {
            context,
            node,
            query,
            record: true,
        }
    }

    /// Do not offer the responder to the routing table.
    pub fn detached(mut self) -> QueryTask {
        self.record = false;
        self
    }

    /// Run the query to completion.
    ///
    /// Resolves exactly once with the final state of the node and the response, the error the
    /// node replied with, or the reason no answer came back.
    pub async fn execute(self) -> (Node, QueryResult) {
        let QueryTask {
            context,
            mut node,
            query,
            record,
        } = self;
        let retries = context.config().retries.max(1);

        if context.is_shutdown() {
            return (node, Err(DhtError::from_kind(DhtErrorKind::Shutdown)));
        }

        let PendingQuery {
            trans_id,
            bytes,
            mut response,
        } = context.factory().lock().register(&query, node.addr());

        let mut attempts = 0;
        loop {
            attempts += 1;
            trace!("bip_kademlia: Sending {:?} to {} (attempt {})...", query, node.addr(), attempts);
            context.send(bytes.clone(), node.addr());

            let attempt = tokio::select! {
                biased;
                _ = context.shutdown_token().cancelled() => Attempt::Shutdown,
                result = &mut response => match result {
                    Ok(result) => Attempt::Answered(result),
                    // Pending table was cleared
                    Err(_) => Attempt::Shutdown,
                },
                _ = time::sleep(context.config().timeout) => Attempt::TimedOut,
            };

            if context.is_shutdown() {
                context.factory().lock().cancel(&trans_id);
                return (node, Err(DhtError::from_kind(DhtErrorKind::Shutdown)));
            }

            match attempt {
                Attempt::Answered(Ok(response)) => {
                    context.broadcast(DhtEvent::QueryAttempt {
                        addr:      node.addr(),
                        timed_out: false,
                    });

                    // Placeholder ids give way to the id the node reports
                    if response.node_id() != node.id() {
                        node = Node::new(response.node_id(), node.addr());
                    }
                    node.seen();
                    if record {
                        context.add_node(node.clone());
                    }

                    return (node, Ok(response));
                }
                Attempt::Answered(Err(error)) => {
                    context.broadcast(DhtEvent::QueryAttempt {
                        addr:      node.addr(),
                        timed_out: false,
                    });

                    // Alive, though the answer is no verified response
                    node.touch();
                    if record {
                        context.table().write().touch(&node.id());
                    }

                    return (node, Err(error));
                }
                Attempt::TimedOut => {
                    context.broadcast(DhtEvent::QueryAttempt {
                        addr:      node.addr(),
                        timed_out: true,
                    });

                    node.failed(retries);
                    context.table().write().mark_failed(&node.id(), retries);

                    if attempts >= retries {
                        context.factory().lock().cancel(&trans_id);
                        debug!("bip_kademlia: Node {} failed to respond after {} attempts", node.addr(), attempts);

                        return (node, Err(DhtError::from_kind(DhtErrorKind::Timeout { attempts })));
                    }
                }
                Attempt::Shutdown => {
                    context.factory().lock().cancel(&trans_id);
                    return (node, Err(DhtError::from_kind(DhtErrorKind::Shutdown)));
                }
            }
        }
    }
}
