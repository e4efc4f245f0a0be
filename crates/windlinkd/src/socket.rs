//! Telemetry socket setup.

use std::net::{SocketAddr, ToSocketAddrs};

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Bind the UDP socket nodes send telemetry to.
///
/// The port is bound exclusively: a second receiver on the same address
/// fails here instead of splitting traffic with the first.
///
/// `recv_buffer_bytes` sets SO_RCVBUF when non-zero, so bursts from many
/// nodes queue in the kernel while a slow sink write is in progress.
pub fn bind_telemetry_socket(addr: &str, recv_buffer_bytes: usize) -> Result<UdpSocket> {
    let addr: SocketAddr = addr
        .to_socket_addrs()
        .with_context(|| format!("invalid listen address {addr}"))?
        .next()
        .with_context(|| format!("listen address {addr} resolved to nothing"))?;

    let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))
        .context("socket()")?;
    if recv_buffer_bytes > 0 {
        socket
            .set_recv_buffer_size(recv_buffer_bytes)
            .context("SO_RCVBUF")?;
    }
    socket.set_nonblocking(true).context("set_nonblocking")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("bind({addr})"))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).context("failed to convert to tokio UdpSocket")
}
