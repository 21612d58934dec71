//! Client SSDP (control point)
//!
//! Le client ne se lie jamais au port 1900: le serveur du renderer l'occupe déjà
//! et le noyau répartirait les datagrammes entre les deux sockets. Il utilise un
//! port éphémère, envoie des M-SEARCH et reçoit les réponses unicast.

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, multicast_target};
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Événements SSDP intéressants pour un control point
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpEvent {
    Alive {
        usn: String,
        nt: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
    ByeBye {
        usn: String,
        nt: String,
        from: SocketAddr,
    },
    SearchResponse {
        usn: String,
        st: String,
        location: String,
        server: String,
        max_age: u32,
        from: SocketAddr,
    },
}

impl SsdpEvent {
    pub fn usn(&self) -> &str {
        match self {
            SsdpEvent::Alive { usn, .. }
            | SsdpEvent::ByeBye { usn, .. }
            | SsdpEvent::SearchResponse { usn, .. } => usn,
        }
    }
}

/// Client SSDP pour envoyer des M-SEARCH et écouter les réponses
pub struct SsdpClient {
    socket: UdpSocket,
    buf: Vec<u8>,
}

impl SsdpClient {
    pub fn new() -> std::io::Result<Self> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        socket2.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)).into())?;

        let socket: UdpSocket = socket2.into();
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_loop_v4(true)?;

        for iface in get_if_addrs::get_if_addrs()? {
            if let IpAddr::V4(ipv4) = iface.ip() {
                if ipv4.is_loopback() {
                    continue;
                }
                match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &ipv4) {
                    Ok(()) => debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4),
                    Err(e) => warn!(
                        "SSDP: failed to join {} on {}: {}",
                        SSDP_MULTICAST_ADDR, ipv4, e
                    ),
                }
            }
        }

        Ok(Self {
            socket,
            buf: vec![0u8; 8192],
        })
    }

    /// Envoie un M-SEARCH pour un type donné
    pub fn send_msearch(&self, st: &str, mx: u32) -> std::io::Result<()> {
        let msg = msearch_message(st, mx);
        self.socket.send_to(msg.as_bytes(), multicast_target())?;
        debug!("📤 M-SEARCH sent (ST={}, MX={})", st, mx.max(1));
        Ok(())
    }

    /// Attend un événement SSDP au plus `timeout`
    ///
    /// Retourne `Ok(None)` à l'expiration ou pour un datagramme non reconnu,
    /// ce qui permet à l'appelant de vérifier régulièrement un drapeau d'arrêt.
    pub fn poll_event(&mut self, timeout: Duration) -> std::io::Result<Option<SsdpEvent>> {
        self.socket
            .set_read_timeout(Some(timeout.max(Duration::from_millis(1))))?;
        match self.socket.recv_from(&mut self.buf) {
            Ok((n, from)) => {
                let data = String::from_utf8_lossy(&self.buf[..n]);
                Ok(parse_message(&data, from))
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

pub(crate) fn msearch_message(st: &str, mx: u32) -> String {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {}\r\n\
         ST: {}\r\n\
         USER-AGENT: castbridge SSDP client\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        mx.max(1),
        st
    )
}

/// Analyse un datagramme SSDP
///
/// Les M-SEARCH d'autres control points et les messages incomplets sont ignorés.
pub fn parse_message(data: &str, from: SocketAddr) -> Option<SsdpEvent> {
    let mut lines = data.lines();
    let first_line = lines.next()?.trim().to_ascii_uppercase();
    let headers = parse_headers(lines);

    if first_line.starts_with("NOTIFY ") {
        handle_notify(&headers, from)
    } else if first_line.starts_with("HTTP/") && first_line.contains(" 200") {
        handle_search_response(&headers, from)
    } else {
        trace!("Ignoring SSDP message from {}: {}", from, first_line);
        None
    }
}

fn handle_notify(headers: &HashMap<String, String>, from: SocketAddr) -> Option<SsdpEvent> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.clone();
    let usn = headers.get("USN")?.clone();

    match nts.as_str() {
        "ssdp:alive" => Some(SsdpEvent::Alive {
            usn,
            nt,
            location: headers.get("LOCATION")?.clone(),
            server: server_header(headers),
            max_age: parse_max_age(headers.get("CACHE-CONTROL")),
            from,
        }),
        "ssdp:byebye" => Some(SsdpEvent::ByeBye { usn, nt, from }),
        other => {
            trace!("Unknown NTS value from {}: {}", from, other);
            None
        }
    }
}

fn handle_search_response(
    headers: &HashMap<String, String>,
    from: SocketAddr,
) -> Option<SsdpEvent> {
    Some(SsdpEvent::SearchResponse {
        usn: headers.get("USN")?.clone(),
        st: headers.get("ST")?.clone(),
        location: headers.get("LOCATION")?.clone(),
        server: server_header(headers),
        max_age: parse_max_age(headers.get("CACHE-CONTROL")),
        from,
    })
}

fn server_header(headers: &HashMap<String, String>) -> String {
    headers
        .get("SERVER")
        .cloned()
        .unwrap_or_else(|| "Unknown".to_string())
}

fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        // Les valeurs peuvent contenir ':' (LOCATION)
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim().to_ascii_uppercase();
            let value = value.trim();
            if !name.is_empty() && !value.is_empty() {
                headers.insert(name, value.to_string());
            }
        }
    }
    headers
}

fn parse_max_age(value: Option<&String>) -> u32 {
    value
        .and_then(|v| {
            let lower = v.to_ascii_lowercase();
            let idx = lower.find("max-age")?;
            let digits: String = lower[idx + 7..]
                .trim_start()
                .trim_start_matches('=')
                .trim_start()
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            digits.parse().ok()
        })
        .unwrap_or(MAX_AGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from() -> SocketAddr {
        "192.168.1.20:1900".parse().unwrap()
    }

    #[test]
    fn test_parse_search_response() {
        let msg = "HTTP/1.1 200 OK\r\n\
                   Cache-Control: max-age = 120\r\n\
                   Location: http://192.168.1.20:8008/ssdp/device-desc.xml\r\n\
                   ST: urn:dial-multiscreen-org:service:dial:1\r\n\
                   USN: uuid:1234::urn:dial-multiscreen-org:service:dial:1\r\n\
                   \r\n";
        let event = parse_message(msg, from()).unwrap();
        assert_eq!(
            event,
            SsdpEvent::SearchResponse {
                usn: "uuid:1234::urn:dial-multiscreen-org:service:dial:1".to_string(),
                st: "urn:dial-multiscreen-org:service:dial:1".to_string(),
                location: "http://192.168.1.20:8008/ssdp/device-desc.xml".to_string(),
                server: "Unknown".to_string(),
                max_age: 120,
                from: from(),
            }
        );
    }

    #[test]
    fn test_parse_notify() {
        let alive = "NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\nNTS: ssdp:alive\r\n\
                     USN: uuid:a::upnp:rootdevice\r\nLOCATION: http://h/d.xml\r\n\r\n";
        match parse_message(alive, from()) {
            Some(SsdpEvent::Alive { max_age, .. }) => assert_eq!(max_age, MAX_AGE),
            other => panic!("unexpected: {:?}", other),
        }

        let bye = "NOTIFY * HTTP/1.1\r\nNT: upnp:rootdevice\r\nNTS: ssdp:byebye\r\n\
                   USN: uuid:a::upnp:rootdevice\r\n\r\n";
        let event = parse_message(bye, from()).unwrap();
        assert_eq!(event.usn(), "uuid:a::upnp:rootdevice");
    }

    #[test]
    fn test_incomplete_messages_are_ignored() {
        // alive sans LOCATION
        let msg = "NOTIFY * HTTP/1.1\r\nNT: x\r\nNTS: ssdp:alive\r\nUSN: uuid:a\r\n\r\n";
        assert!(parse_message(msg, from()).is_none());
        assert!(parse_message(&msearch_message("ssdp:all", 0), from()).is_none());
        assert!(parse_message("", from()).is_none());
    }

    #[test]
    fn test_msearch_mx_floor() {
        let msg = msearch_message("ssdp:all", 0);
        assert!(msg.contains("MX: 1\r\n"));
        assert!(msg.contains("ST: ssdp:all\r\n"));
    }
}
