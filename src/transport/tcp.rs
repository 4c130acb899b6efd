// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! TCP transport

use std::{
    io,
    net::{IpAddr, Ipv4Addr, SocketAddr},
    time::Duration,
};

use async_trait::async_trait;
use socket2::{Domain, SockRef, Socket, TcpKeepalive, Type};
use tokio::net::{TcpListener, TcpStream};

use super::{read_some, write_frame, Backend, Transport};
use crate::{bytes::BytesMut, error::TransportError, Error, Result};

/// The registered TCP port of Modbus.
pub const MODBUS_TCP_PORT: u16 = 502;

const KEEPALIVE_TIME: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Eq)]
enum Target {
    Host { host: String, port: u16 },
    Service { node: String, service: String },
    Accepted { peer: SocketAddr },
}

/// A Modbus TCP connection.
#[derive(Debug)]
pub struct TcpTransport {
    target: Target,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Connect to `host` (IPv4 address or name) on `port` when
    /// [`Transport::connect`] is called.
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            target: Target::Host {
                host: host.into(),
                port,
            },
            stream: None,
        }
    }

    /// Protocol independent addressing: `node` is a host name, an IPv4 or an
    /// IPv6 address and `service` a port number or a Modbus service name.
    ///
    /// An empty `node` refers to the local host.
    ///
    /// # Errors
    ///
    /// Fails if `service` is neither a port number nor `mbap`/`modbus`.
    pub fn new_pi(node: impl Into<String>, service: impl Into<String>) -> Result<Self> {
        let service = service.into();
        resolve_service(&service)?;
        Ok(Self {
            target: Target::Service {
                node: node.into(),
                service,
            },
            stream: None,
        })
    }

    /// Wrap an already established connection, e.g. one that has been
    /// accepted by a listener.
    ///
    /// # Errors
    ///
    /// Fails if the socket options cannot be applied.
    pub fn from_stream(stream: TcpStream) -> io::Result<Self> {
        let peer = stream.peer_addr()?;
        configure_stream(&stream)?;
        Ok(Self {
            target: Target::Accepted { peer },
            stream: Some(stream),
        })
    }

    /// Bind a listening socket for serving Modbus TCP connections.
    ///
    /// # Errors
    ///
    /// Fails if the socket cannot be created or bound.
    pub fn listen(addr: SocketAddr, backlog: i32) -> io::Result<TcpListener> {
        let socket = match addr {
            SocketAddr::V4(_) => Socket::new(Domain::IPV4, Type::STREAM, None)?,
            SocketAddr::V6(_) => Socket::new(Domain::IPV6, Type::STREAM, None)?,
        };
        socket.set_reuse_address(true)?;
        socket.set_nodelay(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&addr.into())?;
        socket.listen(backlog)?;
        TcpListener::from_std(socket.into())
    }

    /// Accept the next connection of `listener`.
    ///
    /// # Errors
    ///
    /// Fails if accepting the connection fails.
    pub async fn accept(listener: &TcpListener) -> io::Result<Self> {
        let (stream, peer) = listener.accept().await?;
        log::debug!("Accepted connection from {peer}");
        Self::from_stream(stream)
    }

    /// The connected stream, if any.
    #[must_use]
    pub fn stream(&self) -> Option<&TcpStream> {
        self.stream.as_ref()
    }

    async fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        let addrs = match &self.target {
            Target::Host { host, port } => {
                if let Ok(ip) = host.parse::<IpAddr>() {
                    vec![SocketAddr::new(ip, *port)]
                } else {
                    tokio::net::lookup_host((host.as_str(), *port)).await?.collect()
                }
            }
            Target::Service { node, service } => {
                let port = resolve_service(service)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;
                if node.is_empty() {
                    vec![SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)]
                } else {
                    tokio::net::lookup_host((node.as_str(), port)).await?.collect()
                }
            }
            Target::Accepted { peer } => {
                return Err(io::Error::new(
                    io::ErrorKind::NotConnected,
                    format!("cannot reconnect to accepted peer {peer}"),
                ));
            }
        };
        Ok(addrs)
    }
}

fn resolve_service(service: &str) -> Result<u16> {
    match service {
        "mbap" | "modbus" => Ok(MODBUS_TCP_PORT),
        service => service
            .parse()
            .map_err(|_| Error::InvalidArgument(format!("unknown service: {service:?}"))),
    }
}

fn configure_stream(stream: &TcpStream) -> io::Result<()> {
    stream.set_nodelay(true)?;
    let socket = SockRef::from(stream);
    socket.set_tcp_keepalive(&TcpKeepalive::new().with_time(KEEPALIVE_TIME))?;
    Ok(())
}

#[async_trait]
impl Transport for TcpTransport {
    fn backend(&self) -> Backend {
        Backend::Tcp
    }

    async fn connect(&mut self) -> std::result::Result<(), TransportError> {
        self.stream = None;
        let addrs = self.resolve().await.map_err(TransportError::io("resolve"))?;
        let mut last_err =
            io::Error::new(io::ErrorKind::AddrNotAvailable, "no address to connect to");
        for addr in addrs {
            log::debug!("Connecting to {addr}");
            match TcpStream::connect(addr).await {
                Ok(stream) => {
                    configure_stream(&stream).map_err(TransportError::io("configure"))?;
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(err) => {
                    log::debug!("Failed to connect to {addr}: {err}");
                    last_err = err;
                }
            }
        }
        Err(TransportError::Io {
            context: "connect",
            source: last_err,
        })
    }

    async fn close(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("Closed connection to {:?}", self.target);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn flush(&mut self) -> std::result::Result<usize, TransportError> {
        let stream = self.stream.as_ref().ok_or(TransportError::NotConnected)?;
        let mut discarded = 0;
        let mut scratch = [0; 260];
        loop {
            match stream.try_read(&mut scratch) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(err) if err.kind() == io::ErrorKind::WouldBlock => break,
                Err(err) => return Err(TransportError::io("flush")(err)),
            }
        }
        Ok(discarded)
    }

    async fn send(&mut self, frame: &[u8]) -> std::result::Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        write_frame(stream, frame).await
    }

    async fn receive(
        &mut self,
        buf: &mut BytesMut,
        timeout: Duration,
    ) -> std::result::Result<usize, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::NotConnected)?;
        read_some(stream, buf, timeout).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_names() {
        assert_eq!(resolve_service("mbap").unwrap(), 502);
        assert_eq!(resolve_service("modbus").unwrap(), 502);
        assert_eq!(resolve_service("1502").unwrap(), 1502);
        assert!(resolve_service("http").is_err());
        assert!(TcpTransport::new_pi("::1", "nope").is_err());
    }

    #[tokio::test]
    async fn operations_require_a_connection() {
        let mut transport = TcpTransport::new("127.0.0.1", 1502);
        assert!(!transport.is_connected());
        assert!(matches!(
            transport.send(&[0]).await,
            Err(TransportError::NotConnected)
        ));
        let mut buf = BytesMut::new();
        assert!(matches!(
            transport.receive(&mut buf, Duration::from_millis(1)).await,
            Err(TransportError::NotConnected)
        ));
        // Closing twice is fine
        transport.close().await;
        transport.close().await;
    }

    #[tokio::test]
    async fn connect_flush_and_close() -> anyhow::Result<()> {
        let listener = TcpTransport::listen("127.0.0.1:0".parse()?, 8)?;
        let addr = listener.local_addr()?;

        let mut client = TcpTransport::new_pi("127.0.0.1", addr.port().to_string())?;
        let (connected, accepted) = tokio::join!(client.connect(), TcpTransport::accept(&listener));
        connected?;
        let mut server = accepted?;
        assert!(client.is_connected());

        server.send(&[1, 2, 3]).await?;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(client.flush().await?, 3);

        client.send(&[4, 5]).await?;
        let mut buf = BytesMut::new();
        server.receive(&mut buf, Duration::from_secs(1)).await?;
        assert_eq!(&buf[..], &[4, 5]);

        client.close().await;
        let err = server
            .receive(&mut buf, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Io { .. }));

        // An accepted connection cannot be re-established
        server.close().await;
        assert!(server.connect().await.is_err());
        Ok(())
    }
}
