//! Eventing GENA: abonnements et notifications NOTIFY
//!
//! Chaque service possède un [`EventPublisher`]. Les abonnés reçoivent un
//! événement initial (SEQ 0) puis une notification à chaque changement des
//! variables évènementielles, avec un compteur SEQ propre à chaque SID.

use parking_lot::Mutex;
use quick_xml::escape::escape;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Durée d'abonnement par défaut
pub const DEFAULT_SUBSCRIPTION_SECS: u64 = 1800;

/// Namespace des propertyset GENA
pub const EVENT_NS: &str = "urn:schemas-upnp-org:event-1-0";

#[derive(Debug, Clone)]
struct Subscription {
    callbacks: Vec<String>,
    next_seq: u32,
    expires_at: Instant,
}

impl Subscription {
    fn take_seq(&mut self) -> u32 {
        let seq = self.next_seq;
        // Après u32::MAX on repart à 1, 0 est réservé à l'événement initial
        self.next_seq = self.next_seq.checked_add(1).unwrap_or(1);
        seq
    }
}

/// Gestionnaire des abonnés d'un service
pub struct EventPublisher {
    service: String,
    subscriptions: Mutex<HashMap<String, Subscription>>,
    last_published: Mutex<Option<Vec<(String, String)>>>,
    client: reqwest::Client,
}

impl EventPublisher {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            subscriptions: Mutex::new(HashMap::new()),
            last_published: Mutex::new(None),
            client: reqwest::Client::new(),
        }
    }

    /// Crée un abonnement; retourne `(SID, TIMEOUT)` ou `None` sans callback valide
    pub fn subscribe(&self, callback_header: &str, timeout_header: &str) -> Option<(String, String)> {
        let callbacks = parse_callbacks(callback_header);
        if callbacks.is_empty() {
            return None;
        }
        let timeout = parse_timeout(timeout_header);
        let sid = format!("uuid:{}", uuid::Uuid::new_v4());

        info!(
            "🔒 New subscription on {}: SID={}, Callback={:?}, Timeout={}s",
            self.service,
            sid,
            callbacks,
            timeout.as_secs()
        );
        self.subscriptions.lock().insert(
            sid.clone(),
            Subscription {
                callbacks,
                next_seq: 0,
                expires_at: Instant::now() + timeout,
            },
        );
        Some((sid, format_timeout(timeout)))
    }

    /// Renouvelle un abonnement; `None` si le SID est inconnu
    pub fn renew(&self, sid: &str, timeout_header: &str) -> Option<String> {
        let timeout = parse_timeout(timeout_header);
        let mut subs = self.subscriptions.lock();
        let sub = subs.get_mut(sid)?;
        sub.expires_at = Instant::now() + timeout;
        info!("♻️ Renewed SID {} on {} for {}s", sid, self.service, timeout.as_secs());
        Some(format_timeout(timeout))
    }

    pub fn unsubscribe(&self, sid: &str) -> bool {
        let removed = self.subscriptions.lock().remove(sid).is_some();
        if removed {
            info!("❌ Unsubscribe SID={} on {}", sid, self.service);
        }
        removed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    /// Retire les abonnements expirés et prépare les envois (callbacks, SEQ)
    fn prepare_batch(&self, only: Option<&str>) -> Vec<(String, Vec<String>, u32)> {
        let now = Instant::now();
        let mut subs = self.subscriptions.lock();
        subs.retain(|sid, sub| {
            let alive = sub.expires_at > now;
            if !alive {
                debug!("Subscription {} expired", sid);
            }
            alive
        });
        subs.iter_mut()
            .filter(|(sid, _)| only.is_none_or(|o| o == sid.as_str()))
            .map(|(sid, sub)| (sid.clone(), sub.callbacks.clone(), sub.take_seq()))
            .collect()
    }

    /// Envoie l'état complet à un nouvel abonné (SEQ 0)
    pub async fn send_initial(&self, sid: &str, vars: &[(String, String)]) {
        let batch = self.prepare_batch(Some(sid));
        self.send_batch(batch, vars).await;
    }

    /// Notifie les abonnés si `vars` diffère du dernier envoi
    ///
    /// Retourne le nombre de notifications tentées.
    pub async fn publish_if_changed(&self, vars: Vec<(String, String)>) -> usize {
        {
            let mut last = self.last_published.lock();
            if last.as_ref() == Some(&vars) {
                return 0;
            }
            *last = Some(vars.clone());
        }
        let batch = self.prepare_batch(None);
        self.send_batch(batch, &vars).await
    }

    async fn send_batch(&self, batch: Vec<(String, Vec<String>, u32)>, vars: &[(String, String)]) -> usize {
        if batch.is_empty() {
            return 0;
        }
        let body = build_propertyset(vars);
        let method = match reqwest::Method::from_bytes(b"NOTIFY") {
            Ok(m) => m,
            Err(e) => {
                warn!("Invalid NOTIFY method: {}", e);
                return 0;
            }
        };

        let mut sent = 0;
        for (sid, callbacks, seq) in batch {
            // On essaie les callbacks dans l'ordre jusqu'au premier succès
            for callback in callbacks {
                let result = self
                    .client
                    .request(method.clone(), &callback)
                    .header("Content-Type", r#"text/xml; charset="utf-8""#)
                    .header("NT", "upnp:event")
                    .header("NTS", "upnp:propchange")
                    .header("SID", &sid)
                    .header("SEQ", seq.to_string())
                    .timeout(Duration::from_secs(5))
                    .body(body.clone())
                    .send()
                    .await;
                match result {
                    Ok(resp) => {
                        debug!(
                            "✅ Event SEQ={} sent to {} ({}), status={}",
                            seq,
                            callback,
                            self.service,
                            resp.status()
                        );
                        sent += 1;
                        break;
                    }
                    Err(e) => warn!("Failed to notify {} for {}: {}", callback, sid, e),
                }
            }
        }
        sent
    }
}

/// Extrait les URLs d'un en-tête CALLBACK (`<url1><url2>`)
pub fn parse_callbacks(header: &str) -> Vec<String> {
    header
        .split('<')
        .filter_map(|part| part.split_once('>').map(|(url, _)| url.trim()))
        .filter(|url| url.starts_with("http://"))
        .map(str::to_string)
        .collect()
}

/// Interprète un en-tête TIMEOUT (`Second-N` ou `infinite`)
pub fn parse_timeout(header: &str) -> Duration {
    let secs = header
        .trim()
        .strip_prefix("Second-")
        .and_then(|n| n.parse::<u64>().ok())
        .filter(|n| *n > 0)
        .unwrap_or(DEFAULT_SUBSCRIPTION_SECS);
    Duration::from_secs(secs)
}

fn format_timeout(timeout: Duration) -> String {
    format!("Second-{}", timeout.as_secs())
}

/// Construit le corps `e:propertyset` d'une notification
pub fn build_propertyset(vars: &[(String, String)]) -> String {
    let mut body = format!(r#"<?xml version="1.0"?><e:propertyset xmlns:e="{}">"#, EVENT_NS);
    for (name, value) in vars {
        body.push_str(&format!(
            "<e:property><{0}>{1}</{0}></e:property>",
            name,
            escape(value.as_str())
        ));
    }
    body.push_str("</e:propertyset>");
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_callbacks() {
        assert_eq!(
            parse_callbacks("<http://10.0.0.3:49152/evt><http://10.0.0.3:49153/evt>"),
            vec![
                "http://10.0.0.3:49152/evt".to_string(),
                "http://10.0.0.3:49153/evt".to_string()
            ]
        );
        assert!(parse_callbacks("").is_empty());
        assert!(parse_callbacks("<ftp://x>").is_empty());
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout("Second-300"), Duration::from_secs(300));
        assert_eq!(parse_timeout("infinite"), Duration::from_secs(1800));
        assert_eq!(parse_timeout(""), Duration::from_secs(1800));
        assert_eq!(parse_timeout("Second-0"), Duration::from_secs(1800));
    }

    #[test]
    fn test_propertyset_escapes_lastchange() {
        let body = build_propertyset(&[(
            "LastChange".to_string(),
            r#"<Event><TransportState val="PLAYING"/></Event>"#.to_string(),
        )]);
        assert!(body.contains(r#"xmlns:e="urn:schemas-upnp-org:event-1-0""#));
        assert!(body.contains(
            "<LastChange>&lt;Event&gt;&lt;TransportState val=&quot;PLAYING&quot;/&gt;&lt;/Event&gt;</LastChange>"
        ));

        let body = build_propertyset(&[(
            "AVTransportURI".to_string(),
            "http://nas/a.mp3?x=1&y='2'".to_string(),
        )]);
        assert!(body.contains("<AVTransportURI>http://nas/a.mp3?x=1&amp;y=&apos;2&apos;</AVTransportURI>"));
    }

    #[test]
    fn test_subscription_lifecycle() {
        let publisher = EventPublisher::new("AVTransport");
        assert!(publisher.subscribe("", "Second-60").is_none());

        let (sid, timeout) = publisher
            .subscribe("<http://127.0.0.1:1/cb>", "Second-60")
            .unwrap();
        assert!(sid.starts_with("uuid:"));
        assert_eq!(timeout, "Second-60");
        assert_eq!(publisher.subscriber_count(), 1);

        assert_eq!(publisher.renew(&sid, ""), Some("Second-1800".to_string()));
        assert!(publisher.renew("uuid:unknown", "").is_none());

        // SEQ 0 pour le premier envoi, puis croissant
        assert_eq!(publisher.prepare_batch(Some(&sid))[0].2, 0);
        assert_eq!(publisher.prepare_batch(None)[0].2, 1);

        assert!(publisher.unsubscribe(&sid));
        assert!(!publisher.unsubscribe(&sid));
        assert_eq!(publisher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_publish_only_when_changed() {
        let publisher = EventPublisher::new("RenderingControl");
        let vars = vec![("LastChange".to_string(), "a".to_string())];
        // Aucun abonné: rien n'est envoyé mais l'état est mémorisé
        assert_eq!(publisher.publish_if_changed(vars.clone()).await, 0);
        assert_eq!(*publisher.last_published.lock(), Some(vars.clone()));
        assert_eq!(publisher.publish_if_changed(vars).await, 0);
    }
}
