use sea_query::backend::{
    EscapeBuilder, OperLeftAssocDecider, PrecedenceDecider, QuotedBuilder, TableRefBuilder,
};
use sea_query::prepare::SqlWriter;
use sea_query::{BinOper, Oper, Quote, SimpleExpr, SubQueryStatement, Value};

use crate::types::DataType;

/// A generated SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Statement text with numbered `$n` placeholders.
    pub sql: String,

    /// Parameters in placeholder order.
    pub params: Vec<DataType>,
}

/// `SeaQuery` backend emitting double-quoted identifiers and `$n`
/// placeholders, accepted by both `Postgres` and `Sqlite`.
pub struct QueryBuilder {
    quote: Quote,
    placeholder: &'static str, // "?" or "$"
    numbered: bool,            // false for "?", true for "$1, $2, ..."
}

impl Default for QueryBuilder {
    fn default() -> Self {
        Self {
            quote: Quote::new(b'"'),
            placeholder: "$",
            numbered: true,
        }
    }
}

impl QuotedBuilder for QueryBuilder {
    fn quote(&self) -> Quote {
        self.quote
    }
}

impl EscapeBuilder for QueryBuilder {}

impl TableRefBuilder for QueryBuilder {}

impl OperLeftAssocDecider for QueryBuilder {
    fn well_known_left_associative(&self, op: &BinOper) -> bool {
        // same set as sea-query 0.32 `common_well_known_left_associative`
        matches!(
            op,
            BinOper::And | BinOper::Or | BinOper::Add | BinOper::Sub | BinOper::Mul | BinOper::Mod
        )
    }
}

impl PrecedenceDecider for QueryBuilder {
    fn inner_expr_well_known_greater_precedence(
        &self, inner: &SimpleExpr, _outer_oper: &Oper,
    ) -> bool {
        // operands that render as a single term stay bare; a tuple already
        // carries its own parentheses, so `col IN ($1, $2)` is not wrapped
        // again into a row value
        matches!(
            inner,
            SimpleExpr::Column(_)
                | SimpleExpr::Custom(_)
                | SimpleExpr::Value(_)
                | SimpleExpr::Keyword(_)
                | SimpleExpr::Constant(_)
                | SimpleExpr::Tuple(_)
                | SimpleExpr::FunctionCall(_)
                | SimpleExpr::Case(_)
                | SimpleExpr::SubQuery(..)
        )
    }
}

impl sea_query::backend::QueryBuilder for QueryBuilder {
    fn prepare_query_statement(&self, query: &SubQueryStatement, sql: &mut dyn SqlWriter) {
        match query {
            SubQueryStatement::SelectStatement(s) => self.prepare_select_statement(s, sql),
            SubQueryStatement::InsertStatement(s) => self.prepare_insert_statement(s, sql),
            SubQueryStatement::UpdateStatement(s) => self.prepare_update_statement(s, sql),
            SubQueryStatement::DeleteStatement(s) => self.prepare_delete_statement(s, sql),
            SubQueryStatement::WithStatement(s) => self.prepare_with_query(s, sql),
        }
    }

    fn prepare_value(&self, value: &Value, sql: &mut dyn SqlWriter) {
        sql.push_param(value.clone(), self);
    }

    fn placeholder(&self) -> (&str, bool) {
        (self.placeholder, self.numbered)
    }
}
