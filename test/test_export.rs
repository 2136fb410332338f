use bip_kademlia::NodeId;

use crate::{addr, MockNetwork};

#[tokio::test]
async fn positive_export_restores_nodes() {
    let network = MockNetwork::new();
    let remote_id = NodeId::from([0x66; 20]);

    let local = network.start(addr(7500), MockNetwork::builder());
    let _remote = network.start(addr(7501), MockNetwork::builder().set_node_id(remote_id));

    local.ping(addr(7501)).await.unwrap();
    let export = local.export_nodes();
    drop(local);

    let restored = network.start(addr(7502), MockNetwork::builder().set_routing_table(export.clone()));

    assert_eq!(export, restored.export_nodes());
    assert_eq!(vec![(remote_id, addr(7501))], restored.find_node(remote_id).await);
}

#[tokio::test]
async fn positive_export_empty_table() {
    let network = MockNetwork::new();

    let dht = network.start(addr(7510), MockNetwork::builder());

    assert_eq!(&b"d5:nodes0:6:nodes60:e"[..], &dht.export_nodes()[..]);
}
