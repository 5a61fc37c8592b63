//! Wake-on-LAN
//!
//! A powered-off television keeps no control session, so switching it on goes
//! through a magic packet broadcast on the local network.

use crate::error::{WebOsError, Result};
use async_trait::async_trait;
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use std::str::FromStr;
use tokio::net::UdpSocket;

const WOL_PORT: u16 = 9;

/// Sends wake requests to a hardware address
#[async_trait]
pub trait WakeOnLan: Send + Sync {
    async fn wake(&self, mac: &str) -> Result<()>;
}

/// Six-byte hardware address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Six 0xFF bytes followed by the address sixteen times
    pub fn magic_packet(&self) -> [u8; 102] {
        let mut packet = [0xFF; 102];
        for chunk in packet[6..].chunks_exact_mut(6) {
            chunk.copy_from_slice(&self.0);
        }
        packet
    }
}

impl FromStr for MacAddress {
    type Err = WebOsError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || WebOsError::InvalidMac(s.to_string());
        let parts: Vec<&str> = s.trim().split(|c: char| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(invalid());
        }

        let mut octets = [0u8; 6];
        for (octet, part) in octets.iter_mut().zip(parts) {
            if part.len() != 2 {
                return Err(invalid());
            }
            *octet = u8::from_str_radix(part, 16).map_err(|_| invalid())?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}", a, b, c, d, e, g)
    }
}

/// Broadcasts the magic packet over UDP
#[derive(Debug, Clone)]
pub struct MagicPacketWaker {
    target: SocketAddr,
}

impl MagicPacketWaker {
    pub fn new() -> Self {
        Self::with_target(SocketAddr::from((Ipv4Addr::BROADCAST, WOL_PORT)))
    }

    /// Send to a specific address instead of the limited broadcast address
    pub fn with_target(target: SocketAddr) -> Self {
        Self { target }
    }
}

impl Default for MagicPacketWaker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WakeOnLan for MagicPacketWaker {
    async fn wake(&self, mac: &str) -> Result<()> {
        let mac: MacAddress = mac.parse()?;
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        socket.set_broadcast(true)?;
        socket.send_to(&mac.magic_packet(), self.target).await?;
        tracing::debug!("Sent magic packet for {} to {}", mac, self.target);
        Ok(())
    }
}
