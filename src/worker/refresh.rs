use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future;
use tokio::time::{self, MissedTickBehavior};

use crate::id::NodeId;
use crate::message::factory::OutgoingQuery;
use crate::message::response::ResponseType;
use crate::routing::node::Node;
use crate::worker::query::QueryTask;
use crate::worker::DhtContext;

const MIN_SCAN_INTERVAL: Duration = Duration::from_millis(1);

/// Scan for idle buckets every quarter of the refresh interval until shutdown.
pub async fn run_refresh(context: Arc<DhtContext>) {
    let scan_interval = (context.config().refresh_interval / 4).max(MIN_SCAN_INTERVAL);

    let mut ticker = time::interval(scan_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // First tick completes immediately, nothing is stale at start
    ticker.tick().await;

    loop {
        tokio::select! {
            biased;
            _ = context.shutdown_token().cancelled() => break,
            _ = ticker.tick() => refresh_stale(&context, Instant::now()).await,
        }
    }

    info!("bip_kademlia: Bucket refresh exiting...");
}

/// Refresh every bucket that has gone a full interval without a membership change as of `now`.
pub async fn refresh_stale(context: &Arc<DhtContext>, now: Instant) {
    let interval = context.config().refresh_interval;

    let targets: Vec<(NodeId, Vec<Node>)> = {
        let mut table = context.table().write();

        let stale = table.stale_buckets(now, interval);
        let targets = stale
            .iter()
            .filter_map(|(bucket_key, depth)| {
                let bucket = table.bucket_for(bucket_key)?;
                let target = bucket.random_id();

                let seeds: Vec<Node> = if bucket.is_empty() {
                    table.get_closest(&target)
                } else {
                    bucket.iter().cloned().collect()
                };
                debug!(
                    "bip_kademlia: Refreshing bucket at depth {} with {} seed nodes",
                    depth,
                    seeds.len()
                );

                Some((target, seeds))
            })
            .collect();

        for (bucket_key, _) in stale.iter() {
            table.mark_bucket_refreshed(bucket_key);
        }

        targets
    };

    let queries = targets.into_iter().flat_map(|(target, seeds)| {
        seeds
            .into_iter()
            .map(move |node| QueryTask::new(context.clone(), node, OutgoingQuery::FindNode(target)).execute())
    });
    let results = future::join_all(queries.collect::<Vec<_>>()).await;

    for (node, result) in results {
        match result {
            Ok(ResponseType::FindNode(find_node)) => {
                for (id, addr) in find_node.nodes().iter() {
                    if *id != context.node_id() {
                        context.add_node(Node::new(*id, *addr));
                    }
                }
            }
            Ok(other) => warn!("bip_kademlia: Refresh received an unexpected response {:?}", other),
            Err(error) => trace!("bip_kademlia: Refresh query to {} failed: {}", node.addr(), error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::{Duration, Instant};

    use crate::id::NodeId;
    use crate::routing::node::{Node, NodeStatus};
    use crate::worker::{harness, refresh, DhtEvent};

    #[tokio::test]
    async fn positive_refresh_queries_stale_bucket_members() {
        let (context, outgoing) = harness::context(1);
        let mut events = context.subscribe();
        let member_id = NodeId::from([0x40; 20]);

        context.add_node(Node::new(member_id, harness::addr(1)));

        let mut alive = HashMap::new();
        alive.insert(harness::addr(1), member_id);
        harness::spawn_responder(context.clone(), outgoing, alive);

        let later = Instant::now() + context.config().refresh_interval;
        refresh::refresh_stale(&context, later).await;

        let mut answered = 0;
        while let Ok(event) = events.try_recv() {
            if let DhtEvent::QueryAttempt { addr, timed_out } = event {
                assert_eq!(harness::addr(1), addr);
                assert!(!timed_out);
                answered += 1;
            }
        }
        assert_eq!(1, answered);

        let table = context.table().read();
        assert_eq!(NodeStatus::Good, table.find_node(&member_id).unwrap().status());
        assert!(table
            .stale_buckets(Instant::now(), context.config().refresh_interval)
            .is_empty());
    }

    #[tokio::test]
    async fn negative_refresh_skips_fresh_buckets() {
        let (context, mut outgoing) = harness::context(1);

        context.add_node(Node::new(NodeId::from([0x40; 20]), harness::addr(1)));
        refresh::refresh_stale(&context, Instant::now()).await;

        assert!(outgoing.try_recv().is_err());
    }

    #[tokio::test]
    async fn negative_refresh_stops_on_shutdown() {
        let (context, _outgoing) = harness::context(1);
        let task = tokio::spawn(refresh::run_refresh(context.clone()));

        context.shutdown(crate::worker::ShutdownCause::ClientInitiated);

        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
