//! Default `SQLite` connection
//!
//! This is a lightweight implementation for development and tests.

#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_possible_wrap)]

use std::sync::Arc;

use anyhow::{Context, Result};
use fromenv::FromEnv;
use futures::FutureExt;
use rusqlite::types::{Value as SqliteValue, ValueRef};
use rusqlite::{ErrorCode, params_from_iter};
use tracing::instrument;

use crate::connection::{Backend, Connection, FutureResult, SqlError};
use crate::types::{DataType, Field, Row};

/// Options used to connect to the SQL database.
///
/// This struct is used to load connection options from environment variables.
#[derive(Debug, Clone, FromEnv)]
pub struct ConnectOptions {
    /// Database path or URI.
    #[env(from = "SQL_DATABASE", default = "file::memory:?cache=shared")]
    pub database: String,
}

impl crate::connection::FromEnv for ConnectOptions {
    fn from_env() -> Result<Self> {
        Self::from_env().finalize().context("issue loading connection options")
    }
}

/// [`Connection`] backed by a single `SQLite` connection.
#[derive(Debug, Clone)]
pub struct SqliteConnection {
    // Mutex is necessary since rusqlite::Connection isn't `Sync`
    conn: Arc<parking_lot::Mutex<rusqlite::Connection>>,
}

impl Backend for SqliteConnection {
    type ConnectOptions = ConnectOptions;

    #[instrument]
    async fn connect_with(options: Self::ConnectOptions) -> Result<Self> {
        tracing::debug!("initializing SQLite connection to: {}", options.database);

        let conn = rusqlite::Connection::open(&options.database)
            .context("failed to open SQLite database")?;

        // constraint remapping relies on foreign keys being enforced
        conn.pragma_update(None, "foreign_keys", "ON").context("failed to enable foreign keys")?;

        Ok(Self {
            conn: Arc::new(parking_lot::Mutex::new(conn)),
        })
    }
}

impl Connection for SqliteConnection {
    fn query(&self, sql: String, params: Vec<DataType>) -> FutureResult<Vec<Row>> {
        tracing::debug!("executing query: {}", sql);
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(sqlite_error)?;

            let params: Vec<_> = params.iter().map(datatype_to_sqlite).collect();
            let column_names: Vec<String> =
                stmt.column_names().iter().map(ToString::to_string).collect();

            let mut rows = stmt.query(params_from_iter(params.iter())).map_err(sqlite_error)?;

            let mut result = Vec::new();
            while let Some(row) = rows.next().map_err(sqlite_error)? {
                let mut fields = Vec::with_capacity(column_names.len());
                for (i, name) in column_names.iter().enumerate() {
                    let value = row.get_ref(i).context("failed to get column value")?;
                    fields.push(Field {
                        name: name.clone(),
                        value: sqlite_to_datatype(value)?,
                    });
                }
                result.push(Row {
                    fields,
                    index: result.len().to_string(),
                });
            }

            Ok(result)
        }
        .boxed()
    }

    fn exec(&self, sql: String, params: Vec<DataType>) -> FutureResult<u32> {
        tracing::debug!("executing statement: {}", sql);
        let conn = Arc::clone(&self.conn);

        async move {
            let conn = conn.lock();
            let mut stmt = conn.prepare(&sql).map_err(sqlite_error)?;

            let params: Vec<_> = params.iter().map(datatype_to_sqlite).collect();
            let affected = stmt.execute(params_from_iter(params.iter())).map_err(sqlite_error)?;

            Ok(affected as u32)
        }
        .boxed()
    }
}

fn sqlite_error(err: rusqlite::Error) -> anyhow::Error {
    if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
        return anyhow::Error::new(SqlError::Constraint(err.to_string()));
    }
    anyhow::Error::new(err).context("failed to execute statement")
}

fn datatype_to_sqlite(value: &DataType) -> SqliteValue {
    match value {
        DataType::Boolean(Some(b)) => SqliteValue::Integer(i64::from(*b)),
        DataType::Int32(Some(i)) => SqliteValue::Integer(i64::from(*i)),
        DataType::Int64(Some(i)) => SqliteValue::Integer(*i),
        DataType::Uint32(Some(u)) => SqliteValue::Integer(i64::from(*u)),
        DataType::Uint64(Some(u)) => SqliteValue::Integer(*u as i64),
        DataType::Float(Some(f)) => SqliteValue::Real(f64::from(*f)),
        DataType::Double(Some(f)) => SqliteValue::Real(*f),
        DataType::Str(Some(s))
        | DataType::Date(Some(s))
        | DataType::Time(Some(s))
        | DataType::Timestamp(Some(s)) => SqliteValue::Text(s.clone()),
        DataType::Binary(Some(b)) => SqliteValue::Blob(b.clone()),
        _ => SqliteValue::Null,
    }
}

fn sqlite_to_datatype(value: ValueRef) -> Result<DataType> {
    match value {
        ValueRef::Null => Ok(DataType::NULL),
        ValueRef::Integer(i) => Ok(DataType::Int64(Some(i))),
        ValueRef::Real(f) => Ok(DataType::Double(Some(f))),
        ValueRef::Text(t) => {
            let s = std::str::from_utf8(t).context("invalid UTF-8 in text value")?;
            Ok(DataType::Str(Some(s.to_string())))
        }
        ValueRef::Blob(b) => Ok(DataType::Binary(Some(b.to_vec()))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn connect() -> SqliteConnection {
        SqliteConnection::connect_with(ConnectOptions {
            database: ":memory:".to_string(),
        })
        .await
        .expect("connect")
    }

    #[tokio::test]
    async fn query_and_exec() {
        let conn = connect().await;

        conn.exec("CREATE TABLE clients (ClientID INTEGER PRIMARY KEY, Company TEXT, Seats INTEGER)".to_string(), vec![])
            .await
            .expect("create table");

        let affected = conn
            .exec(
                r#"INSERT INTO "clients" ("Company", "Seats") VALUES ($1, $2), ($3, $4)"#.to_string(),
                vec!["Acme".into(), 30_i64.into(), "Globex".into(), DataType::NULL],
            )
            .await
            .expect("insert");
        assert_eq!(affected, 2);

        let rows = conn
            .query("SELECT ClientID, Company, Seats FROM clients ORDER BY Company".to_string(), vec![])
            .await
            .expect("query");

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("Company"), Some(&DataType::Str(Some("Acme".to_string()))));
        assert_eq!(rows[0].get("Seats"), Some(&DataType::Int64(Some(30))));
        assert_eq!(rows[1].get("Seats"), Some(&DataType::NULL));
        assert_eq!(rows[1].index, "1");
    }

    #[tokio::test]
    async fn constraint_violation() {
        let conn = connect().await;

        conn.exec("CREATE TABLE tags (name TEXT UNIQUE)".to_string(), vec![]).await.expect("create");
        conn.exec("INSERT INTO tags (name) VALUES ($1)".to_string(), vec!["a".into()])
            .await
            .expect("insert");

        let err = conn
            .exec("INSERT INTO tags (name) VALUES ($1)".to_string(), vec!["a".into()])
            .await
            .expect_err("duplicate");
        assert!(matches!(err.downcast_ref::<SqlError>(), Some(SqlError::Constraint(_))));

        let err = conn.exec("INSERT INTO nowhere VALUES (1)".to_string(), vec![]).await.expect_err("no table");
        assert!(err.downcast_ref::<SqlError>().is_none());
    }
}
