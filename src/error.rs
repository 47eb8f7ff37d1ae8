//! Error types for the lifecycle controller

use std::fmt;

use thiserror::Error;

/// Error code the platform reports when an instance still has bindings
pub const ASSOCIATION_NOT_EMPTY_CODE: &str = "CF-AssociationNotEmpty";

/// Marker found in the broker's refusal to delete a force-enrolled instance
pub const FORCED_ENROLLMENT_MARKER: &str = "forced enrollment";

/// Main error type for lifecycle operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A named entity could not be resolved on the platform
    #[error("{kind} not found: {name}")]
    NotFound {
        /// Kind of entity that was looked up
        kind: EntityKind,
        /// Name (or URL) used for the lookup
        name: String,
    },

    /// An operation was invoked while local state contradicts its contract
    #[error("precondition failed for {operation}: {message}")]
    Precondition {
        /// Operation that was refused
        operation: &'static str,
        /// Violated precondition
        message: String,
    },

    /// A supplied payload or configuration value is invalid
    #[error("validation error: {0}")]
    Validation(String),

    /// The platform answered with a non-2xx status
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),

    /// A response body could not be decoded into the expected structure
    #[error("malformed response for {operation}: {message}")]
    MalformedResponse {
        /// Operation whose response failed to decode
        operation: String,
        /// Decoder message
        message: String,
    },

    /// An observed state disagrees with the expectation
    #[error("assertion failed: {0}")]
    Assertion(String),

    /// The cleanup loop kept hitting conflicts until its retry policy was exhausted
    #[error(
        "service instance {instance} still not deleted after {attempts} attempts (last conflict: {last_conflict})"
    )]
    ConvergenceTimeout {
        /// Instance name being cleaned
        instance: String,
        /// Number of delete attempts made
        attempts: u32,
        /// Conflict returned by the final attempt
        last_conflict: Conflict,
    },

    /// The request never produced a response
    #[error("transport error during {operation}: {source}")]
    Transport {
        /// Operation being attempted
        operation: String,
        /// Underlying HTTP client error
        #[source]
        source: reqwest::Error,
    },

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a not-found error for the given entity
    pub fn not_found(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Create a precondition error for the given operation
    pub fn precondition(operation: &'static str, message: impl Into<String>) -> Self {
        Self::Precondition {
            operation,
            message: message.into(),
        }
    }

    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a malformed-response error
    pub fn malformed(operation: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::MalformedResponse {
            operation: operation.into(),
            message: msg.into(),
        }
    }

    /// Create an assertion failure with the given message
    pub fn assertion(msg: impl Into<String>) -> Self {
        Self::Assertion(msg.into())
    }

    /// Create a configuration error with the given message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a transport error for the given operation
    pub fn transport(operation: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            operation: operation.into(),
            source,
        }
    }
}

/// Kinds of platform entity the resolver looks up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    /// Organization
    Organization,
    /// Space inside an organization
    Space,
    /// Application inside a space
    Application,
    /// Registered service broker
    ServiceBroker,
    /// Service offering from the marketplace
    ServiceOffering,
    /// Plan of a service offering
    ServicePlan,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Organization => "organization",
            Self::Space => "space",
            Self::Application => "application",
            Self::ServiceBroker => "service broker",
            Self::ServiceOffering => "service offering",
            Self::ServicePlan => "service plan",
        };
        f.write_str(name)
    }
}

/// Recoverable conflicts the cleanup loop knows how to work around
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Conflict {
    /// The instance still has bindings (one appeared since the last listing)
    AssociationNotEmpty,
    /// The broker refuses deletion while the instance is in forced enrollment mode
    ForcedEnrollment,
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AssociationNotEmpty => f.write_str("association not empty"),
            Self::ForcedEnrollment => f.write_str("forced enrollment"),
        }
    }
}

/// A non-2xx answer from the platform API
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteError {
    /// Operation that produced the error
    pub operation: String,
    /// HTTP status code
    pub status: u16,
    /// Platform error code, e.g. `CF-AssociationNotEmpty`
    pub error_code: Option<String>,
    /// Human readable description
    pub description: Option<String>,
}

impl RemoteError {
    /// Create a remote error with no structured body
    pub fn new(operation: impl Into<String>, status: u16) -> Self {
        Self {
            operation: operation.into(),
            status,
            error_code: None,
            description: None,
        }
    }

    /// Attach the platform error code
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self
    }

    /// Attach the description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Classify this error as one of the recoverable conflicts, if it is one
    pub fn conflict(&self) -> Option<Conflict> {
        let code = self.error_code.as_deref();
        if self.is_bad_request() && code == Some(ASSOCIATION_NOT_EMPTY_CODE) {
            return Some(Conflict::AssociationNotEmpty);
        }
        let forced = self
            .description
            .as_deref()
            .map(|d| d.to_ascii_lowercase().contains(FORCED_ENROLLMENT_MARKER))
            .unwrap_or(false);
        forced.then_some(Conflict::ForcedEnrollment)
    }

    /// True for HTTP 400 answers
    pub fn is_bad_request(&self) -> bool {
        self.status == 400
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} returned HTTP {}", self.operation, self.status)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{}]", code)?;
        }
        if let Some(description) = &self.description {
            write!(f, ": {}", description)?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}
