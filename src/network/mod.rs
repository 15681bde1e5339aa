//! Datagram transport consumed by the DHCP exchange.

use bytes::Bytes;
use std::{
    future::Future,
    io,
    net::{SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket},
};
use thiserror::Error;
use tokio::net::UdpSocket as TokioUdpSocket;

/// Defines all possible errors for socket setup.
#[derive(Error, Debug)]
pub enum SocketError {
    #[error("Failed to create a new socket")]
    CreateSocket(#[source] io::Error),

    #[error("Failed to enable broadcast on socket")]
    SetBroadcast(#[source] io::Error),

    #[error("Failed to set SO_BINDTODEVICE on interface '{interface}'")]
    BindToDevice {
        interface: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to bind socket to {addr}")]
    BindSocket {
        addr: SocketAddrV4,
        #[source]
        source: io::Error,
    },

    #[error("Failed to set SO_REUSEADDR on socket")]
    SetReuseAddress(#[source] io::Error),

    #[error("Failed to set socket to non-blocking mode")]
    SetNonBlocking(#[source] io::Error),

    #[error("Failed to convert socket to TokioUdpSocket")]
    ConvertToTokio(#[source] io::Error),

    #[error("Binding to a specific device is not implemented on this platform")]
    NotImplemented,
}

/// Send/receive capability the exchange drives.
///
/// A transport is owned by exactly one exchange; calls never overlap.
pub trait Transport {
    fn send_to(
        &mut self,
        buf: &[u8],
        target: SocketAddr,
    ) -> impl Future<Output = io::Result<()>> + Send;

    /// Receives one datagram of at most `max_len` bytes.
    fn recv_from(
        &mut self,
        max_len: usize,
    ) -> impl Future<Output = io::Result<(Bytes, SocketAddr)>> + Send;
}

/// Broadcast-capable UDP transport.
#[derive(Debug)]
pub struct UdpTransport {
    socket: TokioUdpSocket,
}

impl UdpTransport {
    /// Binds to `local`, restricted to `interface` when one is given.
    pub fn bind(interface: Option<&str>, local: SocketAddrV4) -> Result<Self, SocketError> {
        let socket = new_tokio_socket_bound_to_device(interface, local)?;
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl Transport for UdpTransport {
    async fn send_to(&mut self, buf: &[u8], target: SocketAddr) -> io::Result<()> {
        let sent = self.socket.send_to(buf, target).await?;
        tracing::debug!("Sent {} bytes to {}", sent, target);
        if sent != buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", buf.len()),
            ));
        }
        Ok(())
    }

    async fn recv_from(&mut self, max_len: usize) -> io::Result<(Bytes, SocketAddr)> {
        let mut buf = vec![0u8; max_len];
        let (len, addr) = self.socket.recv_from(&mut buf).await?;
        buf.truncate(len);
        tracing::debug!("Received {} bytes from {}", len, addr);
        Ok((Bytes::from(buf), addr))
    }
}

/// Creates a broadcast-enabled `tokio::net::UdpSocket` bound to `local`.
///
/// `SO_REUSEADDR` is set so the client port can be shared with other
/// listeners. When `interface` is given the socket is also restricted to
/// that device with `SO_BINDTODEVICE`.
pub fn new_tokio_socket_bound_to_device(
    interface: Option<&str>,
    local: SocketAddrV4,
) -> Result<TokioUdpSocket, SocketError> {
    use socket2::{Domain, Socket, Type};

    // Create a socket2 socket, which allows setting options before binding.
    let socket2 =
        Socket::new(Domain::IPV4, Type::DGRAM, None).map_err(SocketError::CreateSocket)?;

    socket2
        .set_broadcast(true)
        .map_err(SocketError::SetBroadcast)?;

    socket2
        .set_reuse_address(true)
        .map_err(SocketError::SetReuseAddress)?;

    if let Some(interface) = interface {
        bind_to_device(&socket2, interface)?;
    }

    socket2
        .bind(&SocketAddr::V4(local).into())
        .map_err(|source| SocketError::BindSocket {
            addr: local,
            source,
        })?;

    // Convert to a standard socket, then into a Tokio socket.
    let std_socket: StdUdpSocket = socket2.into();
    std_socket
        .set_nonblocking(true)
        .map_err(SocketError::SetNonBlocking)?;
    TokioUdpSocket::from_std(std_socket).map_err(SocketError::ConvertToTokio)
}

#[cfg(target_os = "linux")]
fn bind_to_device(socket: &socket2::Socket, interface: &str) -> Result<(), SocketError> {
    use std::os::fd::AsRawFd;

    // SAFETY: the fd is owned by `socket` and the option value points to
    // `interface.len()` readable bytes.
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::SOL_SOCKET,
            libc::SO_BINDTODEVICE,
            interface.as_ptr() as *const libc::c_void,
            interface.len() as libc::socklen_t,
        )
    };
    if ret < 0 {
        return Err(SocketError::BindToDevice {
            interface: interface.to_string(),
            source: io::Error::last_os_error(),
        });
    }
    Ok(())
}

/// Fallback for non-Linux systems where `SO_BINDTODEVICE` is not available.
#[cfg(not(target_os = "linux"))]
fn bind_to_device(_socket: &socket2::Socket, _interface: &str) -> Result<(), SocketError> {
    Err(SocketError::NotImplemented)
}
