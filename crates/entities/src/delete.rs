use std::marker::PhantomData;

use anyhow::Result;
use sea_query::{Alias, SimpleExpr};

use crate::entities::EntityType;
use crate::filter::Filter;
use crate::query::{Query, QueryBuilder};
use crate::types::values_to_datatypes;

/// Builder for the DELETE removing rows from an entity type's table,
/// usually restricted to a set of ids.
pub struct DeleteBuilder<E: EntityType> {
    filters: Vec<SimpleExpr>,
    _marker: PhantomData<E>,
}

impl<E: EntityType> Default for DeleteBuilder<E> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
            _marker: PhantomData,
        }
    }
}

impl<E: EntityType> DeleteBuilder<E> {
    /// Creates a new DELETE query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the statement to rows matching `filter`. Filters are ANDed.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.filters.push(filter.into_expr());
        self
    }

    /// Build the DELETE query.
    ///
    /// # Errors
    ///
    /// Returns an error if any query values cannot be converted to SQL data types.
    pub fn build(self) -> Result<Query> {
        let mut statement = sea_query::Query::delete();
        statement.from_table(Alias::new(E::TABLE));

        for filter in self.filters {
            statement.and_where(filter);
        }

        let (sql, values) = statement.build(QueryBuilder::default());
        let params = values_to_datatypes(values)?;

        tracing::debug!(
            table = E::TABLE,
            sql = %sql,
            param_count = params.len(),
            "DeleteBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}
