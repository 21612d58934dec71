//! # castupnp
//!
//! Briques UPnP du renderer: annonces et recherches SSDP, SOAP, documents de
//! description, eventing GENA et routeur axum.
//!
//! Le comportement des services (AVTransport, RenderingControl...) est fourni
//! par des implémentations de [`ServiceHandler`].

pub mod description;
pub mod eventing;
pub mod server;
pub mod soap;
pub mod ssdp;

pub use description::{DeviceDescription, ServiceDescription};
pub use eventing::EventPublisher;
pub use server::{ServiceHandler, UpnpDevice, UpnpService};
pub use soap::{SoapAction, UpnpFault};

/// Type du device MediaRenderer
pub const MEDIA_RENDERER_TYPE: &str = "urn:schemas-upnp-org:device:MediaRenderer:1";
