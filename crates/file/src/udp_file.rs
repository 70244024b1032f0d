// SPDX-FileCopyrightText: © 2025 PackKit Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! UDP receive-only backing.
//!
//! One `read` receives one datagram; the caller must supply a buffer large
//! enough for a whole datagram (~64 KiB), as excess bytes are discarded by
//! the socket layer. Joining a multicast group requires the `interface`
//! option.

use crate::file::File;
use crate::udp_options::UdpOptions;
use async_trait::async_trait;
use packkit_core::{PackKitError, Result};
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

const MAX_DATAGRAM_SIZE: usize = 65535;

pub struct UdpFile {
    file_name: String,
    socket: tokio::net::UdpSocket,
    timeout: Option<Duration>,
}

impl UdpFile {
    /// Bind (and for multicast destinations, join) the address described by
    /// the part of a UDP URL after the `udp://` prefix.
    pub async fn open(udp_url: &str) -> Result<Self> {
        let options = UdpOptions::parse(udp_url)?;

        let address: Ipv4Addr = options.address().parse().map_err(|_| {
            PackKitError::InvalidArgument(format!("malformed IPv4 address {}", options.address()))
        })?;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(|e| PackKitError::File(format!("could not allocate socket: {e}")))?;

        if options.reuse() {
            socket.set_reuse_address(true).map_err(|e| {
                PackKitError::File(format!("could not set address reuse on udp socket: {e}"))
            })?;
        }

        socket
            .bind(&SocketAddrV4::new(address, options.port()).into())
            .map_err(|e| PackKitError::File(format!("could not bind udp socket: {e}")))?;

        if address.is_multicast() {
            if options.interface_address().is_empty() {
                return Err(PackKitError::InvalidArgument(
                    "interface address is required for multicast, e.g. \
                     udp://ip:port?interface=interface_ip"
                        .to_string(),
                ));
            }
            let interface: Ipv4Addr = options.interface_address().parse().map_err(|_| {
                PackKitError::InvalidArgument(format!(
                    "malformed IPv4 interface address {}",
                    options.interface_address()
                ))
            })?;
            socket
                .join_multicast_v4(&address, &interface)
                .map_err(|e| PackKitError::File(format!("failed to join multicast group: {e}")))?;
        }

        socket.set_nonblocking(true)?;
        let socket = tokio::net::UdpSocket::from_std(socket.into())
            .map_err(|e| PackKitError::File(format!("could not register udp socket: {e}")))?;

        let timeout = match options.timeout_us() {
            0 => None,
            us => Some(Duration::from_micros(u64::from(us))),
        };

        Ok(Self { file_name: udp_url.to_string(), socket, timeout })
    }
}

#[async_trait]
impl File for UdpFile {
    fn file_name(&self) -> &str {
        &self.file_name
    }

    async fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        debug_assert!(
            buffer.len() >= MAX_DATAGRAM_SIZE,
            "buffer may be too small to read an entire datagram"
        );
        let received = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, self.socket.recv(buffer))
                .await
                .map_err(|_| {
                    PackKitError::TimedOut("no datagram within the receive timeout".to_string())
                })?,
            None => self.socket.recv(buffer).await,
        };
        Ok(received?)
    }

    async fn write(&mut self, _buffer: &[u8]) -> Result<usize> {
        Err(PackKitError::File("udp files do not support writing".to_string()))
    }

    async fn size(&mut self) -> Result<u64> {
        // Unbounded source sentinel; callers must not rely on a finite value.
        Ok(u64::MAX)
    }

    async fn flush(&mut self) -> Result<()> {
        Err(PackKitError::File("udp files do not support flush".to_string()))
    }

    async fn seek(&mut self, _position: u64) -> Result<()> {
        Err(PackKitError::File("udp files do not support seeking".to_string()))
    }

    async fn tell(&mut self) -> Result<u64> {
        Err(PackKitError::File("udp files do not support seeking".to_string()))
    }

    async fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_receives_datagrams_in_order() {
        let mut receiver = UdpFile::open("127.0.0.1:0").await.unwrap();
        let local_addr = receiver.socket.local_addr().unwrap();

        let sender = tokio::net::UdpSocket::bind("127.0.0.1:0").await.unwrap();
        sender.send_to(b"datagram one", local_addr).await.unwrap();
        sender.send_to(b"two", local_addr).await.unwrap();

        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        let count = receiver.read(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..count], b"datagram one");
        let count = receiver.read(&mut buffer).await.unwrap();
        assert_eq!(&buffer[..count], b"two");

        assert_eq!(receiver.size().await.unwrap(), u64::MAX);
        Box::new(receiver).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_receive_timeout() {
        let mut receiver = UdpFile::open("127.0.0.1:0?timeout=20000").await.unwrap();
        let mut buffer = vec![0u8; MAX_DATAGRAM_SIZE];
        assert!(matches!(
            receiver.read(&mut buffer).await,
            Err(PackKitError::TimedOut(_))
        ));
        Box::new(receiver).close().await.unwrap();
    }

    #[tokio::test]
    async fn test_multicast_requires_interface() {
        assert!(matches!(
            UdpFile::open("224.1.2.30:8000").await,
            Err(PackKitError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_unsupported_operations() {
        let mut receiver = UdpFile::open("127.0.0.1:0").await.unwrap();
        assert!(receiver.write(b"x").await.is_err());
        assert!(receiver.seek(0).await.is_err());
        assert!(receiver.tell().await.is_err());
        Box::new(receiver).close().await.unwrap();
    }
}
