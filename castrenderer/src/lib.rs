//! # castrenderer
//!
//! MediaRenderer UPnP adossé à la boucle de réconciliation de `castcontrol`.
//!
//! # Architecture
//!
//! - **AVTransport** : les actions SOAP sont aiguillées vers un
//!   [`AvTransport`], implémenté par [`ProtocolTranslator`] qui traduit chaque
//!   action en mutation de l'état cible de la boucle
//! - **RenderingControl** : volume fixe, modifications ignorées
//! - **ConnectionManager** : une connexion implicite en entrée
//!
//! Les variables `LastChange` sont recalculées à chaque publication à partir
//! de l'état du traducteur.
//!
//! # Utilisation
//!
//! ```ignore
//! use castrenderer::{ProtocolTranslator, media_renderer, renderer_description};
//!
//! let translator = Arc::new(ProtocolTranslator::new(reconciler.handle()));
//! let description = renderer_description(&config, "Kitchen", "Kitchen bridge")?;
//! let device = Arc::new(media_renderer(description, translator));
//! let app = device.router();
//! ```

mod args;
pub mod avtransport;
pub mod connectionmanager;
pub mod device;
pub mod didl;
pub mod errors;
pub mod lastchange;
pub mod renderingcontrol;
pub mod time;
pub mod translator;

pub use device::{default_friendly_name, media_renderer, renderer_description};
pub use errors::{AvResult, AvTransportError};
pub use translator::{
    AvTransport, MediaInfo, PositionInfo, ProtocolTranslator, TransportAction, TransportInfo,
    TransportState, TransportStatus,
};
