//! Erreurs AVTransport et leur traduction en fautes UPnP

use castupnp::UpnpFault;
use castupnp::soap::error_codes;
use thiserror::Error;

/// Code AVTransport: cible de seek illégale
pub const ILLEGAL_SEEK_TARGET: u16 = 711;

/// Code AVTransport: InstanceID invalide
pub const INVALID_INSTANCE_ID: u16 = 718;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AvTransportError {
    #[error("Invalid args: {0}")]
    InvalidArgs(String),

    #[error("Action failed: {0}")]
    ActionFailed(String),

    #[error("Illegal seek target: {0}")]
    IllegalSeekTarget(String),

    #[error("Invalid InstanceID: {0}")]
    InvalidInstanceId(String),
}

impl AvTransportError {
    pub fn code(&self) -> u16 {
        match self {
            AvTransportError::InvalidArgs(_) => error_codes::INVALID_ARGS,
            AvTransportError::ActionFailed(_) => error_codes::ACTION_FAILED,
            AvTransportError::IllegalSeekTarget(_) => ILLEGAL_SEEK_TARGET,
            AvTransportError::InvalidInstanceId(_) => INVALID_INSTANCE_ID,
        }
    }
}

impl From<AvTransportError> for UpnpFault {
    fn from(err: AvTransportError) -> Self {
        UpnpFault::new(err.code(), err.to_string())
    }
}

pub type AvResult<T> = Result<T, AvTransportError>;
