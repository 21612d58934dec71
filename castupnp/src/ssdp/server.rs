//! Serveur SSDP

use super::{MAX_AGE, SSDP_MULTICAST_ADDR, SSDP_PORT, SsdpDevice, multicast_target, usn_for};
use parking_lot::RwLock;
use socket2::{Domain, Protocol, Socket, Type};
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Serveur SSDP gérant les annonces et les réponses aux M-SEARCH
pub struct SsdpServer {
    /// Devices enregistrés (UUID -> Device)
    devices: Arc<RwLock<HashMap<String, SsdpDevice>>>,

    /// Socket UDP pour SSDP
    socket: Option<Arc<UdpSocket>>,

    /// Interface utilisée pour le multicast
    interface: Ipv4Addr,

    stop: Arc<AtomicBool>,
}

impl SsdpServer {
    /// Crée un serveur SSDP; `interface` à `UNSPECIFIED` laisse le noyau choisir
    pub fn new(interface: Ipv4Addr) -> Self {
        Self {
            devices: Arc::new(RwLock::new(HashMap::new())),
            socket: None,
            interface,
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Démarre le serveur SSDP
    pub fn start(&mut self) -> std::io::Result<()> {
        let socket2 = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket2.set_reuse_address(true)?;
        #[cfg(unix)]
        socket2.set_reuse_port(true)?;
        let bind_addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, SSDP_PORT));
        socket2.bind(&bind_addr.into())?;

        let socket: UdpSocket = socket2.into();
        socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &self.interface)?;
        socket.set_read_timeout(Some(Duration::from_secs(1)))?;
        socket.set_multicast_loop_v4(false)?;

        let socket = Arc::new(socket);
        self.socket = Some(Arc::clone(&socket));

        info!(
            "✅ SSDP server started on {}:{} (interface {})",
            SSDP_MULTICAST_ADDR, SSDP_PORT, self.interface
        );

        self.start_periodic_announcements(Arc::clone(&socket))?;
        self.start_msearch_listener(socket)?;
        Ok(())
    }

    /// Ajoute un device et envoie un alive initial
    pub fn add_device(&self, device: SsdpDevice) {
        if let Some(socket) = &self.socket {
            for nt in device.notification_types() {
                send_alive(socket, &device, nt);
            }
        }
        self.devices.write().insert(device.uuid.clone(), device);
    }

    /// Supprime un device et envoie un byebye
    pub fn remove_device(&self, uuid: &str) {
        let removed = self.devices.write().remove(uuid);
        if let (Some(device), Some(socket)) = (removed, &self.socket) {
            for nt in device.notification_types() {
                send_byebye(socket, &device, nt);
            }
        }
    }

    /// Annonces périodiques toutes les MAX_AGE/2 secondes
    fn start_periodic_announcements(&self, socket: Arc<UdpSocket>) -> std::io::Result<()> {
        let devices = Arc::clone(&self.devices);
        let stop = Arc::clone(&self.stop);
        let period = Duration::from_secs((MAX_AGE / 2) as u64);

        std::thread::Builder::new()
            .name("ssdp-announce".to_string())
            .spawn(move || {
                let mut last = Instant::now();
                while !stop.load(Ordering::Acquire) {
                    std::thread::sleep(Duration::from_secs(1));
                    if last.elapsed() < period {
                        continue;
                    }
                    last = Instant::now();
                    for device in devices.read().values() {
                        for nt in device.notification_types() {
                            send_alive(&socket, device, nt);
                        }
                    }
                }
            })?;
        Ok(())
    }

    /// Démarre l'écoute des M-SEARCH
    fn start_msearch_listener(&self, socket: Arc<UdpSocket>) -> std::io::Result<()> {
        let devices = Arc::clone(&self.devices);
        let stop = Arc::clone(&self.stop);

        std::thread::Builder::new()
            .name("ssdp-listen".to_string())
            .spawn(move || {
                let mut buf = [0u8; 8192];
                while !stop.load(Ordering::Acquire) {
                    match socket.recv_from(&mut buf) {
                        Ok((n, src)) => {
                            let data = String::from_utf8_lossy(&buf[..n]);
                            if !data.starts_with("M-SEARCH") {
                                continue;
                            }
                            if let Some(st) = parse_st(&data) {
                                debug!("M-SEARCH from {} with ST={}", src, st);
                                for device in devices.read().values() {
                                    for nt in device.matching_types(&st) {
                                        send_search_response(&socket, &src, device, &nt);
                                    }
                                }
                            }
                        }
                        Err(e)
                            if e.kind() == std::io::ErrorKind::WouldBlock
                                || e.kind() == std::io::ErrorKind::TimedOut =>
                        {
                            continue;
                        }
                        Err(e) => warn!("❌ SSDP read error: {}", e),
                    }
                }
            })?;
        Ok(())
    }
}

/// Parse le champ ST d'un M-SEARCH
pub(crate) fn parse_st(data: &str) -> Option<String> {
    data.lines().find_map(|line| {
        let (name, value) = line.split_once(':')?;
        if name.trim().eq_ignore_ascii_case("ST") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

pub(crate) fn alive_message(device: &SsdpDevice, nt: &str) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         LOCATION: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         SERVER: {}\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        MAX_AGE,
        device.location,
        nt,
        device.server,
        usn_for(&device.uuid, nt)
    )
}

pub(crate) fn search_response(device: &SsdpDevice, nt: &str) -> String {
    let date = chrono::Utc::now().format("%a, %d %b %Y %H:%M:%S GMT");
    format!(
        "HTTP/1.1 200 OK\r\n\
         CACHE-CONTROL: max-age={}\r\n\
         DATE: {}\r\n\
         EXT:\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         ST: {}\r\n\
         USN: {}\r\n\
         \r\n",
        MAX_AGE,
        date,
        device.location,
        device.server,
        nt,
        usn_for(&device.uuid, nt)
    )
}

fn send_alive(socket: &UdpSocket, device: &SsdpDevice, nt: &str) {
    let msg = alive_message(device, nt);
    match socket.send_to(msg.as_bytes(), multicast_target()) {
        Ok(_) => debug!("✅ NOTIFY alive: NT={}", nt),
        Err(e) => warn!("❌ Failed to send NOTIFY alive for {}: {}", nt, e),
    }
}

fn send_byebye(socket: &UdpSocket, device: &SsdpDevice, nt: &str) {
    let msg = format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}:{}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\
         \r\n",
        SSDP_MULTICAST_ADDR,
        SSDP_PORT,
        nt,
        usn_for(&device.uuid, nt)
    );
    match socket.send_to(msg.as_bytes(), multicast_target()) {
        Ok(_) => debug!("👋 NOTIFY byebye: NT={}", nt),
        Err(e) => warn!("❌ Failed to send NOTIFY byebye for {}: {}", nt, e),
    }
}

fn send_search_response(socket: &UdpSocket, src: &SocketAddr, device: &SsdpDevice, nt: &str) {
    let resp = search_response(device, nt);
    match socket.send_to(resp.as_bytes(), src) {
        Ok(_) => debug!("📡 M-SEARCH response sent to {} with ST={}", src, nt),
        Err(e) => warn!("❌ Failed to send M-SEARCH response to {}: {}", src, e),
    }
}

impl Drop for SsdpServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        if let Some(socket) = &self.socket {
            info!("👋 Shutting down SSDP server, sending byebye for all devices");
            for device in self.devices.read().values() {
                for nt in device.notification_types() {
                    send_byebye(socket, device, nt);
                }
            }
        }
    }
}
