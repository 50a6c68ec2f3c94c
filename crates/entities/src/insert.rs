use std::marker::PhantomData;

use anyhow::{Result, bail};
use sea_query::{Alias, SimpleExpr};

use crate::columns::ColumnMap;
use crate::entities::EntityType;
use crate::query::{Query, QueryBuilder};
use crate::types::{json_to_value, values_to_datatypes};

/// Builder for constructing multi-row INSERT queries.
pub struct InsertBuilder<E: EntityType> {
    rows: Vec<ColumnMap>,
    returning: Vec<String>,
    _marker: PhantomData<E>,
}

impl<E: EntityType> Default for InsertBuilder<E> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            returning: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<E: EntityType> InsertBuilder<E> {
    /// Creates a new INSERT query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a row of column values.
    #[must_use]
    pub fn row(mut self, row: ColumnMap) -> Self {
        self.rows.push(row);
        self
    }

    /// Adds several rows of column values.
    #[must_use]
    pub fn rows(mut self, rows: impl IntoIterator<Item = ColumnMap>) -> Self {
        self.rows.extend(rows);
        self
    }

    /// Specifies columns to return from inserted rows.
    #[must_use]
    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning.push(column.into());
        self
    }

    /// Build the INSERT query.
    ///
    /// # Errors
    ///
    /// Returns an error if there are no rows, the rows do not share the same
    /// columns, or a value is not a scalar.
    pub fn build(self) -> Result<Query> {
        let Some(first) = self.rows.first() else {
            bail!("no rows to insert into {}", E::TABLE);
        };
        let columns: Vec<String> = first.keys().cloned().collect();
        if columns.is_empty() {
            bail!("no columns to insert into {}", E::TABLE);
        }

        let mut statement = sea_query::Query::insert();
        statement.into_table(Alias::new(E::TABLE));
        statement.columns(columns.iter().map(Alias::new));

        for row in &self.rows {
            if !row.keys().eq(columns.iter()) {
                bail!("rows inserted together must share the same columns");
            }
            let values = row
                .iter()
                .map(|(col, value)| match json_to_value(value) {
                    Some(value) => Ok(SimpleExpr::Value(value)),
                    None => bail!("column {col} requires a scalar value"),
                })
                .collect::<Result<Vec<_>>>()?;
            statement.values(values)?;
        }

        for column in self.returning {
            statement.returning_col(Alias::new(column));
        }

        let (sql, values) = statement.build(QueryBuilder::default());
        let params = values_to_datatypes(values)?;

        tracing::debug!(
            table = E::TABLE,
            sql = %sql,
            rows = self.rows.len(),
            param_count = params.len(),
            "InsertBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
