use bip_kademlia::{DhtErrorKind, DhtEvent, ShutdownCause};

use crate::{addr, wait_for, MockNetwork};

#[tokio::test]
async fn positive_shutdown_notifies_client() {
    let network = MockNetwork::new();

    let dht = network.start(addr(7400), MockNetwork::builder());
    let mut events = dht.events();

    dht.shutdown();

    let shutdown = wait_for(&mut events, |event| match *event {
        DhtEvent::ShuttingDown(_) => true,
        _ => false,
    })
    .await;
    assert_eq!(Some(DhtEvent::ShuttingDown(ShutdownCause::ClientInitiated)), shutdown);
    assert_eq!(None, events.recv().await);

    match *dht.ping(addr(7401)).await.unwrap_err().kind() {
        DhtErrorKind::Shutdown => (),
        ref other => panic!("Expected Shutdown But Found {:?}", other),
    }
}

#[tokio::test]
async fn positive_drop_notifies_client() {
    let network = MockNetwork::new();

    let dht = network.start(addr(7410), MockNetwork::builder());
    let mut events = dht.events();

    drop(dht);

    let shutdown = wait_for(&mut events, |event| match *event {
        DhtEvent::ShuttingDown(_) => true,
        _ => false,
    })
    .await;
    assert_eq!(Some(DhtEvent::ShuttingDown(ShutdownCause::ClientInitiated)), shutdown);
}

#[tokio::test]
async fn positive_shutdown_resolves_inflight_query() {
    let network = MockNetwork::new();

    let dht = network.start(addr(7420), MockNetwork::builder());

    // Nothing listens on the address, the query would otherwise wait out its timeouts
    let (result, _) = tokio::join!(dht.ping(addr(7421)), async { dht.shutdown() });

    match *result.unwrap_err().kind() {
        DhtErrorKind::Shutdown => (),
        ref other => panic!("Expected Shutdown But Found {:?}", other),
    }
}

#[tokio::test]
async fn negative_closed_transport_shuts_down() {
    let network = MockNetwork::new();

    let dht = network.start(addr(7430), MockNetwork::builder());
    let mut events = dht.events();

    network.disconnect(addr(7430));

    let shutdown = wait_for(&mut events, |event| match *event {
        DhtEvent::ShuttingDown(_) => true,
        _ => false,
    })
    .await;
    assert_eq!(Some(DhtEvent::ShuttingDown(ShutdownCause::Unspecified)), shutdown);
}
