use std::marker::PhantomData;

use anyhow::{Result, bail};
use sea_query::{Alias, SimpleExpr, Value};

use crate::columns::ColumnMap;
use crate::entities::EntityType;
use crate::filter::Filter;
use crate::query::{Query, QueryBuilder};
use crate::types::{json_to_value, values_to_datatypes};

/// Builder for the UPDATE writing column values to an entity type's table.
pub struct UpdateBuilder<E: EntityType> {
    set_clauses: Vec<(String, Value)>,
    filters: Vec<SimpleExpr>,
    _marker: PhantomData<E>,
}

impl<E: EntityType> Default for UpdateBuilder<E> {
    fn default() -> Self {
        Self {
            set_clauses: Vec::new(),
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<E: EntityType> UpdateBuilder<E> {
    /// Creates a new UPDATE query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column to a new value.
    #[must_use]
    pub fn set<V>(mut self, column: impl Into<String>, value: V) -> Self
    where
        V: Into<Value>,
    {
        self.set_clauses.push((column.into(), value.into()));
        self
    }

    /// Sets every column of a column map.
    ///
    /// # Errors
    ///
    /// Returns an error if a value is not a scalar.
    pub fn set_columns(mut self, columns: &ColumnMap) -> Result<Self> {
        for (col, value) in columns {
            let Some(value) = json_to_value(value) else {
                bail!("column {col} requires a scalar value");
            };
            self.set_clauses.push((col.clone(), value));
        }
        Ok(self)
    }

    /// Restricts the statement to rows matching `filter`. Filters are ANDed.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.filters.push(filter.into_expr());
        self
    }

    /// Build the UPDATE query.
    ///
    /// # Errors
    ///
    /// Returns an error if no column is set or query values cannot be
    /// converted to SQL data types.
    pub fn build(self) -> Result<Query> {
        if self.set_clauses.is_empty() {
            bail!("no columns to update in {}", E::TABLE);
        }

        let mut statement = sea_query::Query::update();
        statement.table(Alias::new(E::TABLE));

        for (column, value) in self.set_clauses {
            statement.value(Alias::new(column), value);
        }

        for filter in self.filters {
            statement.and_where(filter);
        }

        let (sql, values) = statement.build(QueryBuilder::default());
        let params = values_to_datatypes(values)?;

        tracing::debug!(
            table = E::TABLE,
            sql = %sql,
            param_count = params.len(),
            "UpdateBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
