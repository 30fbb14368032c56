//! Error types for drawing operations.

use thiserror::Error;

/// Result type for drawing operations.
pub type CadResult<T> = Result<T, CadError>;

/// Errors that can occur while talking to the host application.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CadError {
    /// No application or document is reachable.
    #[error("Not connected to AutoCAD")]
    NotConnected {
        /// Why the connection attempt failed.
        reason: String,
    },

    /// A call into the automation interface failed.
    #[error("{operation} failed: {message}")]
    Automation {
        /// The host call that failed (e.g. `AddLine`).
        operation: String,
        /// Message reported by the host.
        message: String,
        /// Whether repeating the call after a pause may succeed.
        retryable: bool,
    },

    /// No entity with the given handle exists in model space.
    #[error("Entity with handle {handle} not found")]
    EntityNotFound {
        /// The handle that was looked up.
        handle: String,
    },

    /// No layer with the given name exists in the drawing.
    #[error("Layer not found: {name}")]
    LayerNotFound {
        /// The layer name that was looked up.
        name: String,
    },

    /// An entity property could not be read.
    #[error("Property {property} is not available on entity {index}")]
    PropertyUnavailable {
        /// Index of the entity in model space.
        index: usize,
        /// Name of the property.
        property: &'static str,
    },

    /// Geometry data does not describe a drawable shape.
    #[error("{message}")]
    InvalidGeometry {
        /// Description of what's wrong.
        message: String,
    },

    /// A required tool parameter was not supplied.
    #[error("Missing required parameter: {name}")]
    MissingParameter {
        /// Parameter name.
        name: String,
    },

    /// A tool parameter has an invalid value.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Description of what's wrong.
        message: String,
    },
}

impl CadError {
    /// Creates a not-connected error.
    pub fn not_connected(reason: impl Into<String>) -> Self {
        Self::NotConnected {
            reason: reason.into(),
        }
    }

    /// Creates a transient automation error (the host was busy or mid-regen).
    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Automation {
            operation: operation.into(),
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a permanent automation error (the host rejected the call).
    pub fn rejected(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Automation {
            operation: operation.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates an entity-not-found error.
    pub fn entity_not_found(handle: impl Into<String>) -> Self {
        Self::EntityNotFound {
            handle: handle.into(),
        }
    }

    /// Creates a layer-not-found error.
    pub fn layer_not_found(name: impl Into<String>) -> Self {
        Self::LayerNotFound { name: name.into() }
    }

    /// Creates an invalid geometry error.
    pub fn invalid_geometry(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }

    /// Creates a missing parameter error.
    pub fn missing_parameter(name: impl Into<String>) -> Self {
        Self::MissingParameter { name: name.into() }
    }

    /// Creates an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if the failure is transient and a later attempt may succeed.
    ///
    /// A lost connection counts as retryable: the next call reconnects.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::NotConnected { .. } => true,
            Self::Automation { retryable, .. } => *retryable,
            Self::EntityNotFound { .. }
            | Self::LayerNotFound { .. }
            | Self::PropertyUnavailable { .. }
            | Self::InvalidGeometry { .. }
            | Self::MissingParameter { .. }
            | Self::InvalidParameter { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_display_is_stable() {
        let err = CadError::not_connected("no running instance");
        assert_eq!(err.to_string(), "Not connected to AutoCAD");
    }

    #[test]
    fn automation_error_display() {
        let err = CadError::transient("AddLine", "call was rejected by callee");
        assert_eq!(err.to_string(), "AddLine failed: call was rejected by callee");
    }

    #[test]
    fn retryable_classification() {
        assert!(CadError::transient("Regen", "busy").is_retryable());
        assert!(!CadError::rejected("AddArc", "invalid input").is_retryable());
        assert!(CadError::not_connected("gone").is_retryable());
        assert!(!CadError::entity_not_found("2A").is_retryable());
        assert!(!CadError::invalid_geometry("bad").is_retryable());
        assert!(!CadError::missing_parameter("start").is_retryable());
    }

    #[test]
    fn missing_parameter_display() {
        let err = CadError::missing_parameter("layer_name");
        assert_eq!(err.to_string(), "Missing required parameter: layer_name");
    }
}
