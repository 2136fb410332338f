use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc::{self, Receiver, Sender};
use tokio_util::sync::CancellationToken;

use crate::worker::Datagram;

const OUTGOING_MESSAGE_CAPACITY: usize = 4096;
const INCOMING_MESSAGE_CAPACITY: usize = 4096;

const MAX_DATAGRAM_SIZE: usize = 1500;

/// Spawn a task writing every queued datagram to the socket.
pub fn create_outgoing_messenger(socket: Arc<UdpSocket>, shutdown: CancellationToken) -> Sender<Datagram> {
    let (send, mut recv) = mpsc::channel::<Datagram>(OUTGOING_MESSAGE_CAPACITY);

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                message = recv.recv() => match message {
                    Some((bytes, addr)) => send_bytes(&socket, &bytes, addr).await,
                    None => break,
                },
            }
        }

        info!("bip_kademlia: Outgoing messenger exiting...");
    });

    send
}

async fn send_bytes(socket: &UdpSocket, bytes: &[u8], addr: SocketAddr) {
    match socket.send_to(bytes, addr).await {
        Ok(sent) if sent == bytes.len() => (),
        Ok(sent) => warn!(
            "bip_kademlia: Outgoing messenger wrote {} of {} bytes to {}...",
            sent,
            bytes.len(),
            addr
        ),
        Err(error) => warn!(
            "bip_kademlia: Outgoing messenger failed to write {} bytes to {}: {}",
            bytes.len(),
            addr,
            error
        ),
    }
}

/// Spawn a task forwarding every datagram read from the socket.
pub fn create_incoming_messenger(socket: Arc<UdpSocket>, shutdown: CancellationToken) -> Receiver<Datagram> {
    let (send, recv) = mpsc::channel::<Datagram>(INCOMING_MESSAGE_CAPACITY);

    tokio::spawn(async move {
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                _ = send.closed() => break,
                received = socket.recv_from(&mut buffer) => received,
            };

            match received {
                Ok((size, addr)) => {
                    if send.send((buffer[..size].to_vec(), addr)).await.is_err() {
                        break;
                    }
                }
                Err(error) => warn!("bip_kademlia: Incoming messenger failed to receive bytes: {}", error),
            }
        }

        info!("bip_kademlia: Incoming messenger exiting...");
    });

    recv
}
