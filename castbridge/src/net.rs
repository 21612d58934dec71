use std::ffi::CStr;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use anyhow::{Result, bail};
use get_if_addrs::get_if_addrs;
use tracing::info;

/// Address the servers bind to and advertise.
///
/// `requested` is an IP address or an interface name. Without one, the
/// address used for outgoing traffic is picked.
pub fn resolve_interface(requested: Option<&str>) -> Result<IpAddr> {
    let Some(requested) = requested.map(str::trim).filter(|r| !r.is_empty()) else {
        let address = guess_local_ip();
        info!("Using address: {}", address);
        return Ok(address);
    };

    if let Ok(address) = requested.parse::<IpAddr>() {
        info!("Using address: {}", address);
        return Ok(address);
    }

    let candidates: Vec<IpAddr> = get_if_addrs()?
        .into_iter()
        .filter(|iface| iface.name == requested)
        .map(|iface| iface.ip())
        .collect();
    match pick_address(&candidates) {
        Some(address) => {
            info!("Using address {} of interface {}", address, requested);
            Ok(address)
        }
        None => bail!("No address found for interface '{}'", requested),
    }
}

/// IPv4 first, then anything else.
fn pick_address(candidates: &[IpAddr]) -> Option<IpAddr> {
    candidates
        .iter()
        .find(|a| a.is_ipv4())
        .or_else(|| candidates.first())
        .copied()
}

/// Local address of the route to a public host, first non-loopback IPv4 otherwise.
pub fn guess_local_ip() -> IpAddr {
    let routed = UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip());
    if let Ok(address) = routed {
        return address;
    }

    get_if_addrs()
        .ok()
        .and_then(|ifaces| {
            ifaces
                .into_iter()
                .map(|iface| iface.ip())
                .find(|ip| ip.is_ipv4() && !ip.is_loopback())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Host name of this machine, for the default display name.
pub fn hostname() -> String {
    let mut buf = [0u8; 256];
    // SAFETY: the buffer is valid for its whole length.
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast(), buf.len()) };
    if rc == 0 {
        if let Ok(name) = CStr::from_bytes_until_nul(&buf) {
            let name = name.to_string_lossy().trim().to_string();
            if !name.is_empty() {
                return name;
            }
        }
    }
    std::env::var("HOSTNAME").unwrap_or_else(|_| "localhost".to_string())
}
