//! Serveur HTTP du device: description, SCPD, contrôle SOAP et eventing

use crate::description::{DeviceDescription, ServiceDescription};
use crate::eventing::EventPublisher;
use crate::soap::{SoapAction, UpnpFault, build_soap_response, error_codes, parse_soap_action};
use crate::ssdp::SsdpDevice;
use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub const METHOD_SUBSCRIBE: &str = "SUBSCRIBE";
pub const METHOD_UNSUBSCRIBE: &str = "UNSUBSCRIBE";

const XML_CONTENT_TYPE: &str = r#"text/xml; charset="utf-8""#;

/// Implémentation d'un service UPnP
///
/// Le serveur se charge du transport SOAP et GENA; le handler ne voit que
/// l'action décodée et renvoie les arguments de sortie dans l'ordre du SCPD.
#[async_trait]
pub trait ServiceHandler: Send + Sync {
    fn description(&self) -> &ServiceDescription;

    /// Document SCPD servi sur `/<Service>/desc.xml`
    fn scpd(&self) -> &str;

    async fn invoke(&self, action: &SoapAction) -> Result<Vec<(String, String)>, UpnpFault>;

    /// Variables évènementielles (nom, valeur) dans leur état courant
    fn evented_state(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Service monté sur le serveur: handler et abonnés
pub struct UpnpService {
    handler: Arc<dyn ServiceHandler>,
    events: EventPublisher,
}

impl UpnpService {
    pub fn new(handler: Arc<dyn ServiceHandler>) -> Self {
        let events = EventPublisher::new(&handler.description().name);
        Self { handler, events }
    }

    pub fn description(&self) -> &ServiceDescription {
        self.handler.description()
    }

    pub fn events(&self) -> &EventPublisher {
        &self.events
    }

    /// Publie l'état évènementiel s'il a changé depuis le dernier envoi
    pub async fn publish_changes(&self) -> usize {
        self.events
            .publish_if_changed(self.handler.evented_state())
            .await
    }
}

/// Device racine et ses services
pub struct UpnpDevice {
    description: DeviceDescription,
    services: Vec<Arc<UpnpService>>,
}

impl UpnpDevice {
    /// La liste des services de `description` est reconstruite à partir des handlers
    pub fn new(mut description: DeviceDescription, handlers: Vec<Arc<dyn ServiceHandler>>) -> Self {
        description.services = handlers
            .iter()
            .map(|h| h.description().clone())
            .collect();
        let services = handlers
            .into_iter()
            .map(|h| Arc::new(UpnpService::new(h)))
            .collect();
        Self {
            description,
            services,
        }
    }

    pub fn description(&self) -> &DeviceDescription {
        &self.description
    }

    pub fn services(&self) -> &[Arc<UpnpService>] {
        &self.services
    }

    /// Device SSDP correspondant, avec un type de notification par service
    pub fn ssdp_device(&self, location: &str, server: &str) -> SsdpDevice {
        let mut device = SsdpDevice::new(
            &self.description.udn,
            &self.description.device_type,
            location,
            server,
        );
        for service in &self.services {
            device.add_notification_type(&service.description().service_type);
        }
        device
    }

    /// Routes `/device.xml` et `/<Service>/{desc.xml,control,event}`
    pub fn router(self: &Arc<Self>) -> Router {
        let mut router = Router::new().route(
            "/device.xml",
            get(device_description_handler).with_state(Arc::clone(self)),
        );

        for service in &self.services {
            let desc = service.description();
            info!(
                "✅ Service {} mounted at {}",
                desc.name,
                desc.control_route()
            );
            router = router
                .route(
                    &desc.scpd_route(),
                    get(scpd_handler).with_state(Arc::clone(service)),
                )
                .route(
                    &desc.control_route(),
                    post(control_handler).with_state(Arc::clone(service)),
                )
                .route(
                    &desc.event_route(),
                    any(event_sub_handler).with_state(Arc::clone(service)),
                );
        }
        router
    }

    /// Publie les changements de tous les services toutes les `interval`
    pub fn spawn_event_publisher(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let device = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            info!("✅ Starting event publisher every {:?}", interval);
            loop {
                ticker.tick().await;
                for service in &device.services {
                    service.publish_changes().await;
                }
            }
        })
    }
}

fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, XML_CONTENT_TYPE)], body).into_response()
}

fn fault_response(fault: &UpnpFault) -> Response {
    match fault.to_xml() {
        Ok(xml) => xml_response(StatusCode::INTERNAL_SERVER_ERROR, xml),
        Err(e) => {
            error!("❌ Failed to serialize SOAP fault: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn device_description_handler(State(device): State<Arc<UpnpDevice>>) -> Response {
    debug!("📋 Device description requested");
    match device.description.to_xml() {
        Ok(xml) => xml_response(StatusCode::OK, xml),
        Err(e) => {
            error!("❌ Failed to serialize device description: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn scpd_handler(State(service): State<Arc<UpnpService>>) -> Response {
    debug!("📋 SCPD requested for service {}", service.description().name);
    xml_response(StatusCode::OK, service.handler.scpd().to_string())
}

async fn control_handler(State(service): State<Arc<UpnpService>>, body: Bytes) -> Response {
    let action = match parse_soap_action(&body) {
        Ok(action) => action,
        Err(e) => {
            warn!("❌ Failed to parse SOAP request: {}", e);
            return fault_response(&UpnpFault::new(error_codes::INVALID_ACTION, e.to_string()));
        }
    };
    debug!(
        "🎬 {} action {} {:?}",
        service.description().name,
        action.name,
        action.args
    );

    match service.handler.invoke(&action).await {
        Ok(values) => {
            match build_soap_response(&service.description().service_type, &action.name, values)
            {
                Ok(xml) => xml_response(StatusCode::OK, xml),
                Err(e) => {
                    error!("❌ Failed to build SOAP response: {}", e);
                    fault_response(&UpnpFault::new(
                        error_codes::ACTION_FAILED,
                        "Failed to build SOAP response",
                    ))
                }
            }
        }
        Err(fault) => {
            info!("{} {} rejected: {}", service.description().name, action.name, fault);
            fault_response(&fault)
        }
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .trim()
}

fn subscription_response(sid: &str, timeout: &str) -> Response {
    match (HeaderValue::from_str(sid), HeaderValue::from_str(timeout)) {
        (Ok(sid), Ok(timeout)) => (
            StatusCode::OK,
            [
                (HeaderName::from_static("sid"), sid),
                (HeaderName::from_static("timeout"), timeout),
            ],
        )
            .into_response(),
        _ => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}

async fn event_sub_handler(
    State(service): State<Arc<UpnpService>>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let sid = header_str(&headers, "SID");
    let timeout = header_str(&headers, "TIMEOUT");
    let callback = header_str(&headers, "CALLBACK");

    match method.as_str() {
        METHOD_SUBSCRIBE if sid.is_empty() => {
            let Some((sid, timeout)) = service.events.subscribe(callback, timeout) else {
                return StatusCode::PRECONDITION_FAILED.into_response();
            };
            let initial = Arc::clone(&service);
            let initial_sid = sid.clone();
            tokio::spawn(async move {
                let vars = initial.handler.evented_state();
                initial.events.send_initial(&initial_sid, &vars).await;
            });
            subscription_response(&sid, &timeout)
        }
        METHOD_SUBSCRIBE => {
            if !callback.is_empty() {
                return StatusCode::BAD_REQUEST.into_response();
            }
            match service.events.renew(sid, timeout) {
                Some(timeout) => subscription_response(sid, &timeout),
                None => StatusCode::PRECONDITION_FAILED.into_response(),
            }
        }
        METHOD_UNSUBSCRIBE => {
            if service.events.unsubscribe(sid) {
                StatusCode::OK.into_response()
            } else {
                StatusCode::PRECONDITION_FAILED.into_response()
            }
        }
        other => {
            warn!("Unsupported event method: {}", other);
            StatusCode::METHOD_NOT_ALLOWED.into_response()
        }
    }
}
