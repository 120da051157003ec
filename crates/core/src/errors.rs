//! Error layering: domain invariants, application outcomes, and the
//! interface-facing mapping that decides what a buyer may ever see.

use thiserror::Error;

use crate::domain::session::SessionState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid product economics: list_price={list_price}, floor_price={floor_price}")]
    InvalidEconomics { list_price: i64, floor_price: i64 },
    #[error("invalid session transition from {from:?} to {to:?}")]
    InvalidSessionTransition { from: SessionState, to: SessionState },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("validation failure: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("generation backend timed out after {timeout_secs}s")]
    BackendTimeout { timeout_secs: u64 },
    #[error("generation backend failure: {0}")]
    Backend(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Neutral, in-persona line shown to the buyer when the generation backend
/// is unreachable. Internals and the floor price never surface here.
pub const BACKEND_RETRY_MESSAGE: &str = "Sinyal lagi jelek nih bos, ulangi dong.";

impl ApplicationError {
    /// Retryable errors aborted the exchange before any transcript write;
    /// the caller may resubmit the same buyer message safely.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::BackendTimeout { .. } | Self::Backend(_) | Self::Persistence(_))
    }

    /// Collapses the application error into what the interface layer is
    /// allowed to expose, tagged with the request's correlation id. Detail
    /// strings here go to logs and operators, never to buyers; the
    /// buyer-facing words come from [`InterfaceError::user_message`].
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self {
            Self::Domain(_) | Self::Validation(_) => InterfaceError::BadRequest {
                message: "request validation failed".to_owned(),
                correlation_id,
            },
            Self::NotFound(message) => InterfaceError::NotFound { message, correlation_id },
            Self::Conflict(message) => InterfaceError::Conflict { message, correlation_id },
            Self::BackendTimeout { timeout_secs } => InterfaceError::ServiceUnavailable {
                message: format!("generation backend timed out after {timeout_secs}s"),
                correlation_id,
            },
            Self::Backend(message) | Self::Persistence(message) => {
                InterfaceError::ServiceUnavailable { message, correlation_id }
            }
            Self::Configuration(message) => InterfaceError::Internal { message, correlation_id },
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("conflict: {message}")]
    Conflict { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested resource does not exist.",
            Self::Conflict { .. } => "This negotiation is closed and accepts no further messages.",
            Self::ServiceUnavailable { .. } => BACKEND_RETRY_MESSAGE,
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::errors::{ApplicationError, DomainError, InterfaceError, BACKEND_RETRY_MESSAGE};

    #[test]
    fn domain_error_maps_to_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidEconomics {
            list_price: 100,
            floor_price: 200,
        })
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest { ref correlation_id, .. } if correlation_id == "req-1"
        ));
    }

    #[test]
    fn backend_timeout_is_retryable_and_in_persona() {
        let error = ApplicationError::BackendTimeout { timeout_secs: 30 };
        assert!(error.is_retryable());

        let interface = error.into_interface("req-2");
        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.user_message(), BACKEND_RETRY_MESSAGE);
    }

    #[test]
    fn conflict_keeps_closed_session_wording() {
        let interface =
            ApplicationError::Conflict("session is dealt".to_owned()).into_interface("req-3");

        assert!(matches!(interface, InterfaceError::Conflict { .. }));
        assert!(interface.user_message().contains("closed"));
    }

    #[test]
    fn validation_is_not_retryable() {
        assert!(!ApplicationError::Validation("empty buyer id".to_owned()).is_retryable());
    }
}
