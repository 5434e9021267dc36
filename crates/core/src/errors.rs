use thiserror::Error;

/// Text shown to a user when a session ends early. Operator detail goes to the logs.
pub const APOLOGY_MESSAGE: &str =
    "Sorry, I encountered an error while processing your request. Please try again in a moment.";

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error("orchestration fault: {0}")]
    Orchestration(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::ServiceUnavailable { .. } => {
                "The data catalog or language model is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => APOLOGY_MESSAGE,
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Orchestration(message) | ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, InterfaceError, APOLOGY_MESSAGE};

    #[test]
    fn orchestration_fault_maps_to_internal_with_apology() {
        let interface = ApplicationError::Orchestration("llm retries exhausted".to_owned())
            .into_interface("thread-1");

        assert!(matches!(
            interface,
            InterfaceError::Internal {
                ref correlation_id,
                ..
            } if correlation_id == "thread-1"
        ));
        assert_eq!(interface.user_message(), APOLOGY_MESSAGE);
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("catalog unreachable".to_owned())
            .into_interface("thread-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "thread-2");
    }

    #[test]
    fn user_message_never_contains_operator_detail() {
        let interface =
            ApplicationError::Configuration("bad refresh token xyz".to_owned()).into_interface("c");

        assert!(!interface.user_message().contains("xyz"));
    }
}
