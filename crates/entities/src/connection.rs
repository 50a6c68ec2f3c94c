//! # SQL collaborator
//!
//! The traits the entities facade uses to reach a database. The facade only
//! issues statements built by its query builders and never manages
//! transactions or pools.

use std::fmt::Debug;
use std::future::Future;

use anyhow::Result;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::types::{DataType, Row};

/// Result type for asynchronous operations.
pub type FutureResult<T> = BoxFuture<'static, Result<T>>;

/// A connection able to run parameterized SQL.
pub trait Connection: Debug + Send + Sync + 'static {
    /// Runs a statement returning rows.
    fn query(&self, sql: String, params: Vec<DataType>) -> FutureResult<Vec<Row>>;

    /// Runs a statement, returning the number of rows affected.
    fn exec(&self, sql: String, params: Vec<DataType>) -> FutureResult<u32>;
}

/// Failures a [`Connection`] reports in a form the facade can act on.
///
/// Implementations attach a `SqlError` to the returned `anyhow::Error` so the
/// facade can find it by downcasting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SqlError {
    /// A unique, foreign key or check constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(String),
}

/// Implemented by backends to allow them to be connected from environment
/// configuration.
pub trait Backend: Sized + Sync + Send {
    /// The options used to connect to the backend.
    type ConnectOptions: FromEnv;

    /// Connect to the backend using options read from the environment.
    #[must_use]
    fn connect() -> impl Future<Output = Result<Self>> {
        async { Self::connect_with(Self::ConnectOptions::from_env()?).await }
    }

    /// Connect to the backend with the specified options.
    fn connect_with(options: Self::ConnectOptions) -> impl Future<Output = Result<Self>>;
}

/// Trait for creating connection options from environment variables.
pub trait FromEnv: Sized {
    /// Create connection options from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    fn from_env() -> Result<Self>;
}

/// Returns the constraint violation carried by a collaborator error, if any.
pub(crate) fn constraint_violation(err: &anyhow::Error) -> Option<&SqlError> {
    err.chain().find_map(|cause| cause.downcast_ref::<SqlError>())
}
