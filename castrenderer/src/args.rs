//! Lecture des arguments d'action et construction des sorties

use castupnp::soap::error_codes;
use castupnp::{SoapAction, UpnpFault};

use crate::errors::AvTransportError;

/// Argument obligatoire, faute 402 s'il manque
pub(crate) fn required<'a>(action: &'a SoapAction, name: &str) -> Result<&'a str, UpnpFault> {
    action.arg(name).ok_or_else(|| {
        UpnpFault::new(
            error_codes::INVALID_ARGS,
            format!("Missing argument {}", name),
        )
    })
}

/// Un seul InstanceID est exposé: 0
pub(crate) fn check_instance_id(action: &SoapAction) -> Result<(), UpnpFault> {
    let id = required(action, "InstanceID")?.trim();
    if id == "0" {
        Ok(())
    } else {
        Err(AvTransportError::InvalidInstanceId(id.to_string()).into())
    }
}

pub(crate) fn invalid_action(action: &SoapAction) -> UpnpFault {
    UpnpFault::new(
        error_codes::INVALID_ACTION,
        format!("Invalid Action {}", action.name),
    )
}

pub(crate) fn outputs<const N: usize>(values: [(&str, String); N]) -> Vec<(String, String)> {
    values
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}
