use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::quote::QuoteStatus;

/// One problem with one input field, reported back to the caller verbatim.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    pub field: String,
    pub message: String,
}

impl FieldIssue {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self { field: field.into(), message: message.into() }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid quote transition from {from:?} to {to:?}")]
    InvalidQuoteTransition { from: QuoteStatus, to: QuoteStatus },
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("invalid input: {message}")]
    InvalidInput { message: String, details: Vec<FieldIssue> },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rate limit exceeded; retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64, limit: u32 },
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, details: Vec<FieldIssue>, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after_secs: u64, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

/// Wire shape of every error response: `{error, details?}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<FieldIssue>,
    pub correlation_id: String,
}

impl InterfaceError {
    pub fn status_code(&self) -> u16 {
        match self {
            Self::BadRequest { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::ServiceUnavailable { .. } => 503,
            Self::Internal { .. } => 500,
        }
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The requested company, session, or quote was not found.",
            Self::RateLimited { .. } => "Too many messages in a short time. Please wait a moment.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::RateLimited { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, details) = match self {
            Self::BadRequest { message, details, .. } => (message.clone(), details.clone()),
            Self::NotFound { message, .. } | Self::RateLimited { message, .. } => {
                (message.clone(), Vec::new())
            }
            // Internal detail stays in the logs.
            Self::ServiceUnavailable { .. } | Self::Internal { .. } => {
                (self.user_message().to_owned(), Vec::new())
            }
        };
        ErrorBody { error, details, correlation_id: self.correlation_id().to_owned() }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::RateLimited { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        let correlation_id = "unassigned".to_owned();
        match value {
            ApplicationError::Domain(error @ DomainError::InvalidQuoteTransition { .. }) => {
                Self::BadRequest { message: error.to_string(), details: Vec::new(), correlation_id }
            }
            ApplicationError::Domain(error @ DomainError::InvariantViolation(_)) => {
                Self::Internal { message: error.to_string(), correlation_id }
            }
            ApplicationError::InvalidInput { message, details } => {
                Self::BadRequest { message, details, correlation_id }
            }
            ApplicationError::NotFound(message) => Self::NotFound { message, correlation_id },
            ApplicationError::RateLimited { retry_after_secs, limit } => Self::RateLimited {
                message: format!("limit of {limit} messages per minute reached"),
                retry_after_secs,
                correlation_id,
            },
            ApplicationError::Persistence(message) | ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id }
            }
            ApplicationError::Configuration(message) => Self::Internal { message, correlation_id },
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::quote::QuoteStatus;
    use crate::errors::{ApplicationError, DomainError, FieldIssue, InterfaceError};

    #[test]
    fn invalid_input_maps_to_bad_request_with_details() {
        let interface = ApplicationError::InvalidInput {
            message: "measurements are invalid".to_owned(),
            details: vec![FieldIssue::new("totalWallsSqft", "must be zero or greater")],
        }
        .into_interface("req-1");

        assert_eq!(interface.status_code(), 400);
        let body = interface.body();
        assert_eq!(body.correlation_id, "req-1");
        assert_eq!(body.details[0].field, "totalWallsSqft");
    }

    #[test]
    fn pricing_invariant_violation_is_internal() {
        let interface = ApplicationError::from(DomainError::InvariantViolation(
            "labor cost would be negative".to_owned(),
        ))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.status_code(), 500);
        assert_eq!(interface.body().error, "An unexpected internal error occurred.");
    }

    #[test]
    fn invalid_transition_is_bad_request() {
        let interface = ApplicationError::from(DomainError::InvalidQuoteTransition {
            from: QuoteStatus::Draft,
            to: QuoteStatus::Accepted,
        })
        .into_interface("req-3");

        assert_eq!(interface.status_code(), 400);
    }

    #[test]
    fn rate_limit_and_not_found_have_distinct_statuses() {
        let limited = ApplicationError::RateLimited { retry_after_secs: 12, limit: 20 }
            .into_interface("req-4");
        let missing =
            ApplicationError::NotFound("company 9".to_owned()).into_interface("req-5");

        assert_eq!(limited.status_code(), 429);
        assert!(limited.body().error.contains("20 messages per minute"));
        assert_eq!(missing.status_code(), 404);
    }

    #[test]
    fn persistence_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Persistence("database lock timeout".to_owned())
            .into_interface("req-6");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }
}
