//! # Module SSDP - Simple Service Discovery Protocol
//!
//! - [`SsdpServer`] : annonce le renderer (NOTIFY alive/byebye, réponses M-SEARCH)
//! - [`SsdpClient`] : control point, envoie des M-SEARCH et reçoit les réponses
//! - [`SsdpDevice`] : représentation d'un device pour les annonces
//!
//! ## Constantes SSDP
//!
//! - **Multicast Address**: 239.255.255.250:1900
//! - **Max-Age**: 1800 secondes, annonces périodiques toutes les 900 secondes

mod client;
mod device;
mod server;

pub use client::{SsdpClient, SsdpEvent, parse_message};
pub use device::SsdpDevice;
pub use server::SsdpServer;

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// Adresse multicast SSDP
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Port SSDP
pub const SSDP_PORT: u16 = 1900;

/// Durée de validité des annonces (en secondes)
pub const MAX_AGE: u32 = 1800;

pub(crate) fn multicast_target() -> SocketAddr {
    SocketAddr::V4(SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT))
}

pub(crate) fn usn_for(uuid: &str, nt: &str) -> String {
    if nt.starts_with("uuid:") {
        nt.to_string()
    } else {
        format!("uuid:{}::{}", uuid, nt)
    }
}
