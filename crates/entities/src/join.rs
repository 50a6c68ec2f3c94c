use sea_query::{Alias, JoinType, SelectStatement};

use crate::filter::Filter;

/// A joined table, added to every SELECT of an entity type through
/// [`EntityType::joins`](crate::EntityType::joins) or to a single statement
/// through [`SelectBuilder::join`](crate::SelectBuilder::join).
///
/// Columns of a joined table are addressed in the property map by the join
/// alias, e.g. `ut.thing_id`.
#[derive(Debug, Clone)]
pub struct Join {
    kind: JoinKind,
    table: &'static str,
    alias: Option<&'static str>,
    on: Filter,
}

/// How a joined table's rows combine with the entity's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`: nested objects read from the joined table may be absent
    Left,
    /// `RIGHT JOIN`
    Right,
    /// `FULL OUTER JOIN`
    Full,
}

impl Join {
    /// An `INNER JOIN` of `table` on the condition `on`.
    #[must_use]
    pub const fn new(table: &'static str, on: Filter) -> Self {
        Self::of_kind(JoinKind::Inner, table, on)
    }

    /// A `LEFT JOIN`, the usual join behind a null group.
    #[must_use]
    pub const fn left(table: &'static str, on: Filter) -> Self {
        Self::of_kind(JoinKind::Left, table, on)
    }

    /// A `RIGHT JOIN`.
    #[must_use]
    pub const fn right(table: &'static str, on: Filter) -> Self {
        Self::of_kind(JoinKind::Right, table, on)
    }

    /// A `FULL OUTER JOIN`.
    #[must_use]
    pub const fn full(table: &'static str, on: Filter) -> Self {
        Self::of_kind(JoinKind::Full, table, on)
    }

    /// Names the joined table `alias` in the statement.
    #[must_use]
    pub const fn alias(mut self, alias: &'static str) -> Self {
        self.alias = Some(alias);
        self
    }

    /// The kind of join.
    #[must_use]
    pub const fn kind(&self) -> JoinKind {
        self.kind
    }

    const fn of_kind(kind: JoinKind, table: &'static str, on: Filter) -> Self {
        Self {
            kind,
            table,
            alias: None,
            on,
        }
    }

    pub(crate) fn apply(self, statement: &mut SelectStatement) {
        let kind = match self.kind {
            JoinKind::Inner => JoinType::InnerJoin,
            JoinKind::Left => JoinType::LeftJoin,
            JoinKind::Right => JoinType::RightJoin,
            JoinKind::Full => JoinType::FullOuterJoin,
        };
        let on = self.on.into_expr();

        match self.alias {
            Some(alias) => statement.join_as(kind, Alias::new(self.table), Alias::new(alias), on),
            None => statement.join(kind, Alias::new(self.table), on),
        };
    }
}
