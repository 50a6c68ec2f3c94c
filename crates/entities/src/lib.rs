//! Property-to-column mapping for generic REST CRUD endpoints over SQL.
//!
//! An entity type describes its nested properties (dotted paths such as
//! `client.type.id`) and the SQL columns behind them. From that description
//! the crate translates REST-style filters, sorts, field selections and
//! payloads into SQL, and rebuilds nested JSON entities from flat result
//! rows.
//!
//! # Quick Start
//!
//! ## Define an Entity Type
//!
//! ```ignore
//! use omnia_entities::{EntityType, Prop, PropType, SelectMap, select_map};
//!
//! struct Users;
//!
//! impl EntityType for Users {
//!     const TABLE: &'static str = "Users";
//!
//!     fn map() -> SelectMap {
//!         select_map! {
//!             "id": "user_id",
//!             "name": "name",
//!             "client": { "id": "client_id" },
//!         }
//!     }
//!
//!     fn select_props() -> omnia_entities::Result<Vec<Prop>> {
//!         Ok(vec![Prop::new("isDisabled", "disabled").kind(PropType::Bool).build()?])
//!     }
//! }
//! ```
//!
//! ## CRUD Operations
//!
//! ```ignore
//! use omnia_entities::{Backend, Entities, SqliteConnection};
//! use serde_json::{Map, json};
//!
//! let users = Entities::<Users, _>::new(SqliteConnection::connect().await?)?;
//!
//! // filter on nested properties, select a subset of fields
//! let mut filter = Map::new();
//! filter.insert("client".to_string(), json!({"id": 5}));
//! filter.insert("name".to_string(), json!({"lk": "A%"}));
//! let found = users.get_entities(filter, &["name"], Map::new(), 0, 10).await?;
//!
//! // full replacement and JSON merge patch
//! users.update_by_id(json!(1), payload).await?;
//! users.patch_by_ids(&[json!(1), json!(2)], patch).await?;
//! ```
//!
//! ## Mapping Engine
//!
//! The building blocks used by [`Entities`] are public so they can back a
//! different persistence layer:
//!
//! - [`build_prop_map`] merges a [`SelectMap`] with explicit [`Prop`]s;
//! - [`field_prop_map`] resolves a requested field list;
//! - [`properties_to_columns`], [`sort_to_columns`], [`patch_to_columns`] and
//!   [`all_properties_to_columns`] project request objects onto columns;
//! - [`map_rows`] rebuilds nested entities from flat rows.

/// Builds a [`SelectMap`] from a literal tree of property keys and column
/// expressions.
///
/// ```ignore
/// let map = select_map! {
///     "name": "UserName",
///     "client": { "id": "ClientID" },
/// };
/// ```
#[macro_export]
macro_rules! select_map {
    (@node { $($inner:tt)* }) => {
        $crate::SelectNode::Group($crate::select_map! { $($inner)* })
    };
    (@node $col:expr) => {
        $crate::SelectNode::Column(::std::string::String::from($col))
    };
    ($($key:literal : $value:tt),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut map = $crate::SelectMap::new();
        $( map.insert($key, $crate::select_map!(@node $value)); )*
        map
    }};
}

#[macro_use]
mod error;

mod columns;
mod connection;
mod delete;
mod entities;
mod fields;
mod filter;
mod insert;
mod join;
mod prop;
mod prop_map;
mod query;
mod rows;
mod select;
mod sqlite;
mod types;
mod update;

pub use columns::{
    ColumnMap, Projection, all_properties_to_columns, patch_to_columns, project,
    properties_to_columns, sort_to_columns,
};
pub use connection::{Backend, Connection, FromEnv, FutureResult, SqlError};
pub use delete::DeleteBuilder;
pub use entities::{Entities, EntityType, QueryOptions};
pub use error::{Error, Result};
pub use fields::{FieldPropMap, SelectedProp, field_prop_map};
pub use filter::Filter;
pub use insert::InsertBuilder;
pub use join::{Join, JoinKind};
pub use prop::{Prop, PropBuilder, PropType, TimeZone, ValueGetter};
pub use prop_map::{
    PropMap, SelectMap, SelectNode, build_prop_map, merge_prop_maps, prop_list_to_prop_map,
    prop_map_to_alias_map, prop_map_to_select_map, select_map_to_prop_map,
};
pub use query::Query;
pub use rows::map_rows;
pub use select::SelectBuilder;
pub use sqlite::{ConnectOptions, SqliteConnection};
pub use types::{DataType, Field, Row};
pub use update::UpdateBuilder;
