//! Errors

use http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the crate.
pub type Result<T> = anyhow::Result<T, Error>;

/// Error type returned by the mapping engine and the entities facade.
///
/// Client errors carry a description naming the offending dotted property
/// path so a REST layer can hand it straight back to the caller.
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum Error {
    // --- Client errors ---
    /// Request payload, field list, filter or sort is invalid.
    #[error("code: {code}, description: {description}")]
    BadRequest { code: String, description: String },

    /// No entity matched the requested id.
    #[error("code: {code}, description: {description}")]
    NotFound { code: String, description: String },

    /// A write violated a database constraint the entity type registered a
    /// message for.
    #[error("code: {code}, description: {description}")]
    Conflict { code: String, description: String },

    // --- Server errors ---
    /// The entity type is misconfigured.
    #[error("code: {code}, description: {description}")]
    Config { code: String, description: String },

    /// A non recoverable internal error occurred.
    #[error("code: {code}, description: {description}")]
    ServerError { code: String, description: String },
}

impl Error {
    /// Returns the HTTP status code associated with the variant.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
            Self::NotFound { .. } => StatusCode::NOT_FOUND,
            Self::Conflict { .. } => StatusCode::CONFLICT,
            Self::Config { .. } | Self::ServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error code for the variant.
    #[must_use]
    pub fn code(&self) -> String {
        match self {
            Self::BadRequest { code, .. }
            | Self::NotFound { code, .. }
            | Self::Conflict { code, .. }
            | Self::Config { code, .. }
            | Self::ServerError { code, .. } => code.clone(),
        }
    }

    /// Returns the error description.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::BadRequest { description, .. }
            | Self::NotFound { description, .. }
            | Self::Conflict { description, .. }
            | Self::Config { description, .. }
            | Self::ServerError { description, .. } => description.clone(),
        }
    }

    /// Returns `true` for errors caused by the caller's input.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.status().is_client_error()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        let chain = err.chain().map(ToString::to_string).collect::<Vec<_>>().join(": ");

        // keep the variant of a wrapped Error, with the added context
        if let Some(inner) = err.downcast_ref::<Self>() {
            tracing::debug!("Error: {err}, caused by: {inner}");

            let code = inner.code();
            return match inner {
                Self::BadRequest { .. } => Self::BadRequest {
                    code,
                    description: chain,
                },
                Self::NotFound { .. } => Self::NotFound {
                    code,
                    description: chain,
                },
                Self::Conflict { .. } => Self::Conflict {
                    code,
                    description: chain,
                },
                Self::Config { .. } => Self::Config {
                    code,
                    description: chain,
                },
                Self::ServerError { .. } => Self::ServerError {
                    code,
                    description: chain,
                },
            };
        }

        Self::ServerError {
            code: "server_error".to_string(),
            description: chain,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::BadRequest {
            code: "serde_json".to_string(),
            description: err.to_string(),
        }
    }
}

/// Builds an [`Error::BadRequest`] with `format!` semantics.
#[macro_export]
macro_rules! bad_request {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::BadRequest { code: "bad_request".to_string(), description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::BadRequest { code: "bad_request".to_string(), description: format!($desc) }
    };
}

/// Builds an [`Error::Config`] with `format!` semantics.
#[macro_export]
macro_rules! config_error {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::Config { code: "config_error".to_string(), description: format!($fmt, $($arg)*) }
    };
    ($desc:expr $(,)?) => {
        $crate::Error::Config { code: "config_error".to_string(), description: format!($desc) }
    };
}

/// Builds an [`Error::ServerError`] with `format!` semantics.
#[macro_export]
macro_rules! server_error {
    ($fmt:expr, $($arg:tt)*) => {
        $crate::Error::ServerError { code: "server_error".to_string(), description: format!($fmt, $($arg)*) }
    };
    ($err:expr $(,)?) => {
        $crate::Error::ServerError { code: "server_error".to_string(), description: format!($err) }
    };
}
