use std::sync::Arc;

use crate::error::{DhtErrorKind, DhtResult};
use crate::message::factory::OutgoingQuery;
use crate::routing::node::Node;
use crate::worker::query::QueryTask;
use crate::worker::DhtContext;

/// Probes the members of a full bucket, stalest first, and swaps the candidate in for the
/// first one that does not answer.
pub struct ReplaceNodeTask {
    context:   Arc<DhtContext>,
    candidate: Node,
}

impl ReplaceNodeTask {
    pub fn new(context: Arc<DhtContext>, candidate: Node) -> ReplaceNodeTask {
        ReplaceNodeTask { context, candidate }
    }

    /// Returns true if the candidate took the place of an unresponsive member.
    ///
    /// If every member answers, the candidate is discarded and the members are left as they were.
    pub async fn execute(self) -> DhtResult<bool> {
        let mut members: Vec<Node> = {
            let table = self.context.table().read();

            table
                .bucket_for(&self.candidate.id())
                .map(|bucket| bucket.iter().cloned().collect())
                .unwrap_or_default()
        };
        members.sort_by_key(|member| member.last_seen());

        for member in members {
            let member_id = member.id();
            let (_, result) = QueryTask::new(self.context.clone(), member, OutgoingQuery::Ping).execute().await;

            match result {
                Ok(_) => continue,
                Err(error) => match *error.kind() {
                    DhtErrorKind::Timeout { .. } => {
                        return self.context.table().write().replace(&member_id, self.candidate);
                    }
                    DhtErrorKind::Shutdown => return Err(error),
                    // Replied with an error, which still proves it is alive
                    _ => continue,
                },
            }
        }

        self.context.table().write().discard_replacement(&self.candidate.id());
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use crate::id::NodeId;
    use crate::routing::bucket;
    use crate::routing::node::Node;
    use crate::routing::table::AddOutcome;
    use crate::worker::harness;
    use crate::worker::replace::ReplaceNodeTask;
    use crate::worker::DhtContext;

    /// Fill the upper half of the id space, which our all zero id never splits, with members
    /// whose last seen times grow with their index.
    fn fill_far_bucket(context: &DhtContext) -> Vec<Node> {
        let now = Instant::now();
        let mut table = context.table().write();

        // Split off the upper half first
        for index in 0..=bucket::MAX_BUCKET_SIZE {
            let mut id = [0u8; 20];
            id[0] = 0x01;
            id[19] = index as u8;
            table.add(Node::as_good(NodeId::from(id), harness::addr(100 + index as u16))).unwrap();
        }

        (0..bucket::MAX_BUCKET_SIZE)
            .map(|index| {
                let mut id = [0xF0u8; 20];
                id[19] = index as u8;

                let seen = now - Duration::from_secs((bucket::MAX_BUCKET_SIZE - index) as u64);
                let node = Node::as_good(NodeId::from(id), harness::addr(index as u16 + 1)).with_last_seen(seen);
                assert_eq!(AddOutcome::Inserted, table.add(node.clone()).unwrap());

                node
            })
            .collect()
    }

    fn candidate() -> Node {
        Node::new(NodeId::from([0xFE; 20]), harness::addr(999))
    }

    #[tokio::test]
    async fn positive_stalest_unresponsive_member_replaced() {
        let (context, outgoing) = harness::context(2);
        let members = fill_far_bucket(&context);

        let mut alive = HashMap::new();
        for member in members.iter().skip(1) {
            alive.insert(member.addr(), member.id());
        }
        harness::spawn_responder(context.clone(), outgoing, alive);

        assert_eq!(AddOutcome::Replacement, context.table().write().add(candidate()).unwrap());
        let replaced = ReplaceNodeTask::new(context.clone(), candidate()).execute().await.unwrap();

        assert!(replaced);
        let table = context.table().read();
        assert!(table.find_node(&members[0].id()).is_none());
        assert!(table.find_node(&candidate().id()).is_some());
        assert_eq!(bucket::MAX_BUCKET_SIZE, table.bucket_for(&candidate().id()).unwrap().len());
    }

    #[tokio::test]
    async fn positive_all_members_alive_candidate_discarded() {
        let (context, outgoing) = harness::context(2);
        let members = fill_far_bucket(&context);

        let alive = members.iter().map(|member| (member.addr(), member.id())).collect();
        harness::spawn_responder(context.clone(), outgoing, alive);

        assert_eq!(AddOutcome::Replacement, context.table().write().add(candidate()).unwrap());
        let replaced = ReplaceNodeTask::new(context.clone(), candidate()).execute().await.unwrap();

        assert!(!replaced);
        let table = context.table().read();
        assert!(table.find_node(&candidate().id()).is_none());
        assert!(table.bucket_for(&candidate().id()).unwrap().replacement().is_none());
        for member in members.iter() {
            assert!(table.find_node(&member.id()).is_some());
        }
    }
}
