extern crate bip_kademlia;
extern crate parking_lot;
extern crate tokio;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bip_kademlia::{DhtBuilder, DhtEvent, MainlineDht};
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, Sender, UnboundedReceiver};
use tokio::time;

mod test_export;
mod test_shutdown;

const NETWORK_CAPACITY: usize = 1024;

/// Timeout used by every dht on a `MockNetwork`.
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(150);

/// Longest a test waits for an event before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Datagram network living entirely in memory, routed by destination address.
#[derive(Clone)]
pub struct MockNetwork {
    inboxes: Arc<Mutex<HashMap<SocketAddr, Sender<(Vec<u8>, SocketAddr)>>>>,
}

impl MockNetwork {
    pub fn new() -> MockNetwork {
        MockNetwork {
            inboxes: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Builder with the short timeouts every test runs with.
    pub fn builder() -> DhtBuilder {
        DhtBuilder::new().set_timeout(QUERY_TIMEOUT).set_retries(2)
    }

    /// Start a dht reachable at `addr`.
    pub fn start(&self, addr: SocketAddr, builder: DhtBuilder) -> MainlineDht {
        let (out_send, mut out_recv) = mpsc::channel::<(Vec<u8>, SocketAddr)>(NETWORK_CAPACITY);
        let (in_send, in_recv) = mpsc::channel(NETWORK_CAPACITY);

        self.inboxes.lock().insert(addr, in_send);

        let inboxes = self.inboxes.clone();
        tokio::spawn(async move {
            while let Some((bytes, dest)) = out_recv.recv().await {
                let inbox = inboxes.lock().get(&dest).cloned();

                if let Some(inbox) = inbox {
                    let _ = inbox.try_send((bytes, addr));
                }
            }
        });

        builder.start_with_transport(out_send, in_recv).unwrap()
    }

    /// Stop delivering datagrams to `addr`, closing its inbound channel.
    pub fn disconnect(&self, addr: SocketAddr) {
        self.inboxes.lock().remove(&addr);
    }
}

pub fn addr(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Wait for the first event matching `predicate`, returning it.
pub async fn wait_for<F>(events: &mut UnboundedReceiver<DhtEvent>, mut predicate: F) -> Option<DhtEvent>
where
    F: FnMut(&DhtEvent) -> bool,
{
    time::timeout(EVENT_TIMEOUT, async {
        while let Some(event) = events.recv().await {
            if predicate(&event) {
                return Some(event);
            }
        }

        None
    })
    .await
    .ok()
    .and_then(|event| event)
}

/// Start one dht per address, each bootstrapping off the first, and wait for all bootstraps.
pub async fn start_swarm(network: &MockNetwork, addrs: &[SocketAddr]) -> Vec<MainlineDht> {
    let mut dhts = Vec::with_capacity(addrs.len());
    let mut pending = Vec::with_capacity(addrs.len());

    for (index, addr) in addrs.iter().enumerate() {
        let builder = if index == 0 {
            MockNetwork::builder()
        } else {
            MockNetwork::builder().add_node(addrs[0])
        };

        let dht = network.start(*addr, builder);
        pending.push(dht.events());
        dhts.push(dht);
    }

    for events in pending.iter_mut() {
        let completed = wait_for(events, |event| *event == DhtEvent::BootstrapCompleted).await;
        assert_eq!(Some(DhtEvent::BootstrapCompleted), completed);
    }

    dhts
}
