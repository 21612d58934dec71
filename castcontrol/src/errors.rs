use thiserror::Error;

/// Failures raised while talking to a cast device.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The handle exists but the transport is down.
    #[error("Device {0} is not connected")]
    NotConnected(String),
    /// The device did not answer, or answered with an empty status.
    #[error("No response from device: {0}")]
    NoResponse(String),
    /// Another application owns the device and may not be interrupted.
    #[error("Device is busy with foreign app {display_name} ({app_id})")]
    DeviceBusyWithForeignApp { app_id: String, display_name: String },
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Device action '{action}' failed: {message}")]
    ActionFailed { action: String, message: String },
}

impl DeviceError {
    pub fn not_connected(message: impl Into<String>) -> Self {
        DeviceError::NotConnected(message.into())
    }

    pub fn no_response(message: impl Into<String>) -> Self {
        DeviceError::NoResponse(message.into())
    }

    pub fn action_failed(action: &str, message: impl ToString) -> Self {
        DeviceError::ActionFailed {
            action: action.to_string(),
            message: message.to_string(),
        }
    }

    /// Connectivity failures only feed the give-up accounting.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, DeviceError::NotConnected(_) | DeviceError::NoResponse(_))
    }
}

pub type DeviceResult<T> = Result<T, DeviceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        assert!(DeviceError::not_connected("tv").is_connectivity());
        assert!(DeviceError::no_response("status").is_connectivity());
        assert!(!DeviceError::action_failed("load", "boom").is_connectivity());
        assert!(
            !DeviceError::DeviceBusyWithForeignApp {
                app_id: "233637DE".into(),
                display_name: "YouTube".into(),
            }
            .is_connectivity()
        );
    }
}
