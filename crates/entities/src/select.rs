use std::marker::PhantomData;

use sea_query::{Alias, Expr, Order, SimpleExpr};
use serde_json::Value as Json;

use crate::columns::ColumnMap;
use crate::entities::EntityType;
use crate::error::Result;
use crate::fields::FieldPropMap;
use crate::filter::Filter;
use crate::join::Join;
use crate::query::{Query, QueryBuilder};
use crate::types::values_to_datatypes;

/// Builder for constructing SELECT queries over an entity type's table.
pub struct SelectBuilder<E: EntityType> {
    columns: Vec<(String, Option<String>)>,
    count: bool,
    filters: Vec<SimpleExpr>,
    limit: Option<u64>,
    offset: Option<u64>,
    order: Vec<(String, Order)>,
    joins: Vec<Join>,
    _marker: PhantomData<E>,
}

impl<E: EntityType> Default for SelectBuilder<E> {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            count: false,
            filters: Vec::new(),
            limit: None,
            offset: None,
            order: Vec::new(),
            joins: E::joins(),
            _marker: PhantomData,
        }
    }
}

impl<E: EntityType> SelectBuilder<E> {
    /// Creates a new SELECT query builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects a column expression, optionally under an alias.
    #[must_use]
    pub fn column(mut self, col: impl Into<String>, alias: Option<&str>) -> Self {
        self.columns.push((col.into(), alias.map(ToString::to_string)));
        self
    }

    /// Selects the column of every chosen property. Computed properties
    /// without a column contribute nothing.
    #[must_use]
    pub fn columns(mut self, fields: &FieldPropMap<'_>) -> Self {
        for selected in fields.iter() {
            let prop = selected.prop;
            if prop.col().is_empty() {
                continue;
            }
            let alias = (!prop.alias().is_empty()).then(|| prop.alias().to_string());
            self.columns.push((prop.col().to_string(), alias));
        }
        self
    }

    /// Selects `COUNT(*) AS count` instead of columns. Ordering, limit and
    /// offset are ignored.
    #[must_use]
    pub const fn count(mut self) -> Self {
        self.count = true;
        self
    }

    /// Adds a WHERE clause filter.
    #[must_use]
    pub fn r#where(mut self, filter: Filter) -> Self {
        self.filters.push(filter.into_expr());
        self
    }

    /// Adds a WHERE clause for each filter column.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid operator or operand.
    pub fn filter(mut self, columns: &ColumnMap) -> Result<Self> {
        for (col, value) in columns {
            self = self.r#where(Filter::from_json(col, value)?);
        }
        Ok(self)
    }

    /// Adds a WHERE clause on a single column expression, using the same
    /// value grammar as request filters.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid operator or operand.
    pub fn filter_column(self, col: &str, value: &Json) -> Result<Self> {
        Ok(self.r#where(Filter::from_json(col, value)?))
    }

    /// Adds an ORDER BY clause for each sort column.
    ///
    /// # Errors
    ///
    /// Returns a client error when a direction is not `asc` or `desc`.
    pub fn sort(mut self, columns: &ColumnMap) -> Result<Self> {
        for (col, direction) in columns {
            let order = sort_order(col, direction)?;
            self.order.push((col.clone(), order));
        }
        Ok(self)
    }

    /// Adds ascending ORDER BY clause.
    #[must_use]
    pub fn order_by(mut self, col: impl Into<String>) -> Self {
        self.order.push((col.into(), Order::Asc));
        self
    }

    /// Adds descending ORDER BY clause.
    #[must_use]
    pub fn order_by_desc(mut self, col: impl Into<String>) -> Self {
        self.order.push((col.into(), Order::Desc));
        self
    }

    /// Sets the maximum number of rows to return.
    #[must_use]
    pub const fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the number of rows to skip.
    #[must_use]
    pub const fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Adds a JOIN clause to the query.
    #[must_use]
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Build the SELECT query.
    ///
    /// # Errors
    ///
    /// Returns an error if query values cannot be converted to SQL data types.
    pub fn build(self) -> anyhow::Result<Query> {
        let mut statement = sea_query::Query::select();

        if self.count {
            statement.expr_as(Expr::cust("COUNT(*)"), Alias::new("count"));
        } else if self.columns.is_empty() {
            // only computed properties without dependencies were selected
            statement.expr(Expr::cust("1"));
        } else {
            for (col, alias) in self.columns {
                match alias {
                    Some(alias) => statement.expr_as(Expr::cust(col), Alias::new(alias)),
                    None => statement.expr(Expr::cust(col)),
                };
            }
        }

        // reads may come from a view over the written table
        let from = Alias::new(E::VIEW.unwrap_or(E::TABLE));
        match E::TABLE_ALIAS {
            Some(alias) => statement.from_as(from, Alias::new(alias)),
            None => statement.from(from),
        };

        for join in self.joins {
            join.apply(&mut statement);
        }

        for filter in self.filters {
            statement.and_where(filter);
        }

        if !self.count {
            for (col, order) in self.order {
                statement.order_by_expr(Expr::cust(col), order);
            }

            if let Some(limit) = self.limit {
                statement.limit(limit);
            }

            if let Some(offset) = self.offset {
                statement.offset(offset);
            }
        }

        let (sql, values) = statement.build(QueryBuilder::default());
        let params = values_to_datatypes(values)?;

        tracing::debug!(
            table = E::TABLE,
            sql = %sql,
            param_count = params.len(),
            "SelectBuilder generated SQL"
        );

        Ok(Query { sql, params })
    }
}

fn sort_order(col: &str, direction: &Json) -> Result<Order> {
    match direction.as_str().map(str::to_ascii_lowercase).as_deref() {
        Some("asc") => Ok(Order::Asc),
        Some("desc") => Ok(Order::Desc),
        _ => {
            let direction = direction.as_str().map_or_else(|| direction.to_string(), ToString::to_string);
            Err(bad_request!("Invalid sort direction '{direction}' for column '{col}'"))
        }
    }
}
