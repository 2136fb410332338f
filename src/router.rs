use std::fmt::{self, Display, Formatter};
use std::io;
use std::net::SocketAddr;

const UTORRENT_DHT: (&str, u16) = ("router.utorrent.com", 6881);
const BITCOMET_DHT: (&str, u16) = ("router.bitcomet.com", 6881);
const TRANSMISSION_DHT: (&str, u16) = ("dht.transmissionbt.com", 6881);

/// Enumerates different routers that can be used to bootstrap a dht.
#[allow(non_camel_case_types)]
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum Router {
    /// Bootstrap server maintained by uTorrent.
    uTorrent,
    /// Bootstrap server maintained by BitComet.
    BitComet,
    /// Bootstrap server maintained by Transmission.
    Transmission,
    /// Bootstrap server given by host name and port.
    Host(String, u16),
    /// Bootstrap server given by address.
    Custom(SocketAddr),
}

impl Router {
    /// Resolve all addresses for the router.
    pub async fn socket_addrs(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs = match *self {
            Router::uTorrent => tokio::net::lookup_host(UTORRENT_DHT).await?.collect(),
            Router::BitComet => tokio::net::lookup_host(BITCOMET_DHT).await?.collect(),
            Router::Transmission => tokio::net::lookup_host(TRANSMISSION_DHT).await?.collect(),
            Router::Host(ref host, port) => tokio::net::lookup_host((host.as_str(), port)).await?.collect(),
            Router::Custom(addr) => vec![addr],
        };

        Ok(addrs)
    }

    /// Resolve the first address for the router.
    pub async fn socket_addr(&self) -> io::Result<SocketAddr> {
        self.socket_addrs()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "No SocketAddresses Found For Host"))
    }
}

impl Display for Router {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match *self {
            Router::uTorrent => write!(f, "{}:{}", UTORRENT_DHT.0, UTORRENT_DHT.1),
            Router::BitComet => write!(f, "{}:{}", BITCOMET_DHT.0, BITCOMET_DHT.1),
            Router::Transmission => write!(f, "{}:{}", TRANSMISSION_DHT.0, TRANSMISSION_DHT.1),
            Router::Host(ref host, port) => write!(f, "{}:{}", host, port),
            Router::Custom(addr) => Display::fmt(&addr, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use crate::router::Router;

    #[tokio::test]
    async fn positive_custom_router_resolves_to_itself() {
        let addr: SocketAddr = "10.0.0.1:6881".parse().unwrap();

        assert_eq!(vec![addr], Router::Custom(addr).socket_addrs().await.unwrap());
    }

    #[tokio::test]
    async fn positive_host_router_resolves_literal() {
        let router = Router::Host("127.0.0.1".to_owned(), 6881);

        assert_eq!("127.0.0.1:6881".parse::<SocketAddr>().unwrap(), router.socket_addr().await.unwrap());
    }

    #[test]
    fn positive_display() {
        assert_eq!("router.utorrent.com:6881", Router::uTorrent.to_string());
        assert_eq!("10.0.0.1:6881", Router::Custom("10.0.0.1:6881".parse().unwrap()).to_string());
    }
}
