//! # Module SOAP
//!
//! Parsing des requêtes de contrôle UPnP et construction des réponses et des
//! SOAP Faults.
//!
//! ```ignore
//! use castupnp::soap::{parse_soap_action, build_soap_response};
//!
//! let action = parse_soap_action(body.as_bytes())?;
//! assert_eq!(action.name, "Play");
//!
//! let xml = build_soap_response(
//!     "urn:schemas-upnp-org:service:AVTransport:1",
//!     "GetPositionInfo",
//!     vec![("Track".to_string(), "1".to_string())],
//! )?;
//! ```

mod builder;
mod parser;

pub use builder::{UpnpFault, build_soap_fault, build_soap_response};
pub use parser::{SoapAction, SoapParseError, parse_soap_action};

/// Namespace de l'enveloppe SOAP
pub const SOAP_ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";

/// Style d'encodage SOAP
pub const SOAP_ENCODING: &str = "http://schemas.xmlsoap.org/soap/encoding/";

/// Namespace des détails d'erreur UPnP
pub const UPNP_CONTROL_NS: &str = "urn:schemas-upnp-org:control-1-0";

/// Codes d'erreur UPnP standards
pub mod error_codes {
    /// Action invalide
    pub const INVALID_ACTION: u16 = 401;

    /// Arguments invalides
    pub const INVALID_ARGS: u16 = 402;

    /// Action échouée
    pub const ACTION_FAILED: u16 = 501;

    /// Valeur d'argument invalide
    pub const ARGUMENT_VALUE_INVALID: u16 = 600;

    /// Argument hors limites
    pub const ARGUMENT_VALUE_OUT_OF_RANGE: u16 = 601;

    /// Action optionnelle non implémentée
    pub const OPTIONAL_ACTION_NOT_IMPLEMENTED: u16 = 602;

    pub const OUT_OF_MEMORY: u16 = 603;

    pub const HUMAN_INTERVENTION_REQUIRED: u16 = 604;

    pub const STRING_ARGUMENT_TOO_LONG: u16 = 605;
}
