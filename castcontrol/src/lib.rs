//! # castcontrol
//!
//! Pilotage d'un appareil Cast par convergence d'état.
//!
//! - [`session::SessionManager`] détient l'unique liaison vers l'appareil
//!   (cellule atomique, un seul gagnant par compare-and-swap).
//! - [`reconciler::Reconciler`] compare en boucle l'état voulu et l'état
//!   observé et émet la prochaine commande minimale.
//! - [`chromecast::ChromecastDevice`] implémente [`device::DeviceClient`]
//!   au-dessus de `rust_cast`.
//! - [`discovery`] fournit les producteurs mDNS et SSDP.

pub mod chromecast;
pub mod clock;
pub mod device;
pub mod discovery;
pub mod errors;
pub mod events;
pub mod media;
pub mod reconciler;
pub mod session;
pub mod timestamped;

pub use chromecast::{ChromecastConnector, ChromecastDevice};
pub use clock::{Clock, ManualClock, SystemClock};
pub use device::{
    DeviceCandidate, DeviceClient, DeviceConnector, DeviceHandle, DeviceStatus, IdleReason,
    MediaStatus, PlayerState, RunningApp,
};
pub use errors::{DeviceError, DeviceResult};
pub use events::{EventSink, LoopEvent};
pub use media::{ItemDetails, LoadRequest, MediaDescriptor, TranscodeGateway};
pub use reconciler::{Reconciler, ReconcilerConfig, ReconcilerHandle, TargetState};
pub use session::{DiscoveryControl, DiscoverySource, SessionManager, ShutdownGuard};
pub use timestamped::Timestamped;
