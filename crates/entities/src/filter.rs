use sea_query::{Expr, ExprTrait, SimpleExpr, Value};
use serde_json::Value as Json;

use crate::error::Result;
use crate::types::json_to_value;

/// A predicate on a column expression.
///
/// Column expressions are emitted verbatim, so qualified names such as
/// `u.name` keep their table alias.
#[derive(Debug, Clone)]
pub enum Filter {
    /// column = value
    Eq(String, Value),
    /// column <> value
    Ne(String, Value),
    /// column > value
    Gt(String, Value),
    /// column >= value
    Gte(String, Value),
    /// column < value
    Lt(String, Value),
    /// column <= value
    Lte(String, Value),
    /// column IN (values)
    In(String, Vec<Value>),
    /// column NOT IN (values)
    NotIn(String, Vec<Value>),
    /// column IS NULL
    IsNull(String),
    /// column IS NOT NULL
    IsNotNull(String),
    /// column LIKE pattern
    Like(String, String),
    /// column NOT LIKE pattern
    NotLike(String, String),
    /// Column-to-column equality, used for join conditions.
    ColEq(String, String),
    /// Logical AND of multiple filters
    And(Vec<Self>),
}

impl Filter {
    /// Column-to-column equality, for join conditions.
    #[must_use]
    pub fn col_eq(left: impl Into<String>, right: impl Into<String>) -> Self {
        Self::ColEq(left.into(), right.into())
    }

    /// Builds the predicate for one filter column from its JSON value.
    ///
    /// A scalar compares for equality, `null` tests for `NULL`, and an array
    /// tests membership. An object combines operator clauses with AND:
    /// `eq`, `ne`, `lt`, `le`, `gt`, `ge`, `lk` (LIKE), `nl` (NOT LIKE),
    /// `nu` (IS NULL) and `nn` (IS NOT NULL).
    ///
    /// # Errors
    ///
    /// Returns a client error for an unknown operator or an operand of the
    /// wrong shape.
    pub fn from_json(col: &str, value: &Json) -> Result<Self> {
        match value {
            Json::Object(ops) => {
                let clauses = ops
                    .iter()
                    .map(|(op, operand)| Self::operator(col, op, operand))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::And(clauses))
            }
            other => Self::operator(col, "eq", other),
        }
    }

    fn operator(col: &str, op: &str, operand: &Json) -> Result<Self> {
        let col = col.to_string();
        let filter = match (op, operand) {
            ("eq", Json::Null) => Self::IsNull(col),
            ("eq", Json::Array(items)) => Self::In(col.clone(), list(&col, op, items)?),
            ("eq", _) => Self::Eq(col.clone(), scalar(&col, op, operand)?),
            ("ne", Json::Null) => Self::IsNotNull(col),
            ("ne", Json::Array(items)) => Self::NotIn(col.clone(), list(&col, op, items)?),
            ("ne", _) => Self::Ne(col.clone(), scalar(&col, op, operand)?),
            ("lt", _) => Self::Lt(col.clone(), comparable(&col, op, operand)?),
            ("le", _) => Self::Lte(col.clone(), comparable(&col, op, operand)?),
            ("gt", _) => Self::Gt(col.clone(), comparable(&col, op, operand)?),
            ("ge", _) => Self::Gte(col.clone(), comparable(&col, op, operand)?),
            ("lk", _) => Self::Like(col.clone(), pattern(&col, op, operand)?),
            ("nl", _) => Self::NotLike(col.clone(), pattern(&col, op, operand)?),
            ("nu", _) => Self::IsNull(col),
            ("nn", _) => Self::IsNotNull(col),
            _ => return Err(bad_request!("Invalid operator '{op}' for column '{col}'")),
        };
        Ok(filter)
    }

    /// Convert Filter to a ``SeaQuery`` ``SimpleExpr``.
    #[must_use]
    pub fn into_expr(self) -> SimpleExpr {
        match self {
            Self::Eq(col, val) => Expr::cust(col).eq(val),
            Self::Ne(col, val) => Expr::cust(col).ne(val),
            Self::Gt(col, val) => Expr::cust(col).gt(val),
            Self::Gte(col, val) => Expr::cust(col).gte(val),
            Self::Lt(col, val) => Expr::cust(col).lt(val),
            Self::Lte(col, val) => Expr::cust(col).lte(val),
            // an empty list matches nothing (or everything, negated)
            Self::In(_, vals) if vals.is_empty() => Expr::cust("1 = 0"),
            Self::NotIn(_, vals) if vals.is_empty() => Expr::cust("1 = 1"),
            Self::In(col, vals) => Expr::cust(col).is_in(vals),
            Self::NotIn(col, vals) => Expr::cust(col).is_not_in(vals),
            Self::IsNull(col) => Expr::cust(col).is_null(),
            Self::IsNotNull(col) => Expr::cust(col).is_not_null(),
            Self::Like(col, pattern) => Expr::cust(col).like(pattern),
            Self::NotLike(col, pattern) => Expr::cust(col).not_like(pattern),
            Self::ColEq(left, right) => Expr::cust(left).eq(Expr::cust(right)),
            Self::And(filters) => {
                let mut exprs = filters.into_iter().map(Self::into_expr);
                exprs.next().map_or_else(
                    || Expr::value(true), // no filters, so all conditions satisfied, hence `true`
                    |first| exprs.fold(first, SimpleExpr::and),
                )
            }
        }
    }
}

fn scalar(col: &str, op: &str, operand: &Json) -> Result<Value> {
    json_to_value(operand).ok_or_else(|| {
        bad_request!("Operator '{op}' for column '{col}' requires a scalar value")
    })
}

fn comparable(col: &str, op: &str, operand: &Json) -> Result<Value> {
    if operand.is_null() {
        return Err(bad_request!("Operator '{op}' for column '{col}' cannot compare with null"));
    }
    scalar(col, op, operand)
}

fn list(col: &str, op: &str, items: &[Json]) -> Result<Vec<Value>> {
    items.iter().map(|item| scalar(col, op, item)).collect()
}

fn pattern(col: &str, op: &str, operand: &Json) -> Result<String> {
    match operand {
        Json::String(pattern) => Ok(pattern.clone()),
        Json::Number(n) => Ok(n.to_string()),
        _ => Err(bad_request!("Operator '{op}' for column '{col}' requires a string pattern")),
    }
}
