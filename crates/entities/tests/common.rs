//! Common test helpers shared across integration tests.
#![allow(dead_code)]

use omnia_entities::{
    Backend, ConnectOptions, Connection, EntityType, Filter, Join, Prop, PropType, QueryOptions,
    Result, SelectBuilder, SelectMap, SqliteConnection, bad_request, select_map,
};
use serde_json::{Map, Value, json};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry, fmt};

/// Users table with a flat property map.
pub struct Users;

impl EntityType for Users {
    const TABLE: &'static str = "Users";

    fn map() -> SelectMap {
        select_map! {
            "id": "user_id",
            "name": "name",
            "birthday": "dob",
            "weight": "weight",
            "isDisabled": "isDisabled",
        }
    }

    fn select_props() -> Result<Vec<Prop>> {
        Ok(vec![Prop::new("isDisabled", "isDisabled").kind(PropType::Bool).build()?])
    }

    fn default_values() -> Map<String, Value> {
        object(json!({"isDisabled": false}))
    }

    fn duplicate_error() -> Option<&'static str> {
        Some("A user with this name already exists")
    }

    fn constraint_error() -> Option<&'static str> {
        Some("Failed to delete user: it still has things referencing it")
    }
}

/// Users read through a view and joined to their things, with aliased,
/// typed, computed and null-group properties.
pub struct ModernUsers;

impl EntityType for ModernUsers {
    const TABLE: &'static str = "Users";
    const TABLE_ALIAS: Option<&'static str> = Some("u");
    const VIEW: Option<&'static str> = Some("vUsers");

    fn map() -> SelectMap {
        select_map! {
            "id": "user_id",
            "name": "name",
            "birthday": "dob",
            "weight": "weight",
            "isDisabled": "isDisabled",
        }
    }

    fn select_props() -> Result<Vec<Prop>> {
        Ok(vec![
            Prop::new("id", "u.u_id").build()?,
            Prop::new("name", "u.name").alias("username").build()?,
            Prop::new("isDisabled", "u.isDisabled").kind(PropType::Bool).build()?,
            Prop::computed("heavy", |row| {
                row.get("weight").and_then(|w| w.to_json().as_f64()).map_or(Value::Null, |w| {
                    Value::Bool(w > 100.0)
                })
            })
            .depends_on(["weight"])
            .not_default()
            .build()?,
            Prop::new("thing.id", "ut.thing_id").null_group().build()?,
            Prop::new("thing.uid", "ut.user_id").alias("thing_user").build()?,
        ])
    }

    fn joins() -> Vec<Join> {
        vec![Join::left("UserThings", Filter::col_eq("ut.user_id", "u.u_id")).alias("ut")]
    }
}

/// Users with a custom filter, a separate read map and a row hook.
pub struct LegacyUsers;

impl EntityType for LegacyUsers {
    const TABLE: &'static str = "Users";
    const TABLE_ALIAS: Option<&'static str> = Some("u");

    fn map() -> SelectMap {
        select_map! {
            "name": "name",
            "birthday": "dob",
            "weight": "weight",
            "isDisabled": "isDisabled",
        }
    }

    fn select_map() -> SelectMap {
        select_map! {
            "id": "u.user_id",
            "name": "u.name",
            "birthday": "u.dob",
            "thing": { "id": "ut.thing_id" },
        }
    }

    fn joins() -> Vec<Join> {
        vec![Join::left("UserThings", Filter::col_eq("ut.user_id", "u.user_id")).alias("ut")]
    }

    fn process_filter(mut filter: Map<String, Value>) -> Result<Map<String, Value>> {
        match filter.remove("customFilter") {
            None | Some(Value::Bool(_)) => Ok(filter),
            Some(_) => Err(bad_request!("customFilter must be a boolean")),
        }
    }

    fn base_select(
        select: SelectBuilder<Self>, options: &QueryOptions<'_>,
    ) -> Result<SelectBuilder<Self>> {
        if options.original_filter.get("customFilter") == Some(&Value::Bool(true)) {
            return select.filter_column("u.weight", &json!({"gt": 100}));
        }
        Ok(select)
    }

    fn process_row(
        mut row: omnia_entities::ColumnMap, ids: &[Value],
    ) -> Result<omnia_entities::ColumnMap> {
        if ids.is_empty() {
            row.insert("dob".to_string(), json!("2001-03-20"));
        }
        Ok(row)
    }
}

/// Users whose name is computed from the row, reading its own column.
pub struct Accounts;

impl EntityType for Accounts {
    const TABLE: &'static str = "Users";

    fn map() -> SelectMap {
        select_map! {
            "id": "user_id",
            "username": "name",
        }
    }

    fn select_props() -> Result<Vec<Prop>> {
        Ok(vec![
            Prop::new("username", "name")
                .get_value(|row| {
                    if row.value("user_id") == json!(1) {
                        json!("testUser")
                    } else {
                        row.value("name")
                    }
                })
                .depends_on(["id"])
                .build()?,
        ])
    }
}

/// Entity type whose id property is missing from its map.
pub struct NoId;

impl EntityType for NoId {
    const TABLE: &'static str = "NoId";

    fn map() -> SelectMap {
        select_map! { "name": "name" }
    }
}

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE Users (
        user_id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE,
        dob TEXT NOT NULL,
        weight REAL NOT NULL,
        isDisabled INTEGER NOT NULL
    )",
    "CREATE TABLE UserThings (
        thing_id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id INTEGER NOT NULL REFERENCES Users (user_id)
    )",
    "CREATE VIEW vUsers AS
        SELECT user_id AS u_id, name, dob, weight, isDisabled FROM Users",
];

/// Installs a test subscriber honouring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    let _ = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer().with_test_writer())
        .try_init();
}

/// Opens a private in-memory database holding the test schema.
pub async fn database() -> SqliteConnection {
    init_tracing();

    let conn = SqliteConnection::connect_with(ConnectOptions {
        database: ":memory:".to_string(),
    })
    .await
    .expect("connect");

    for statement in SCHEMA {
        conn.exec((*statement).to_string(), vec![]).await.expect("create schema");
    }
    conn
}

/// Returns the object held by `value`.
#[allow(clippy::missing_panics_doc)]
pub fn object(value: Value) -> Map<String, Value> {
    let Value::Object(object) = value else { panic!("expected object") };
    object
}

/// Normalize SQL by collapsing whitespace.
fn normalize_sql(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Canonicalize SQL for comparison by removing identifier quotes and normalizing whitespace.
/// Preserves quotes inside string literals.
fn canonicalize_sql(sql: &str) -> String {
    let mut cleaned = String::with_capacity(sql.len());
    let mut in_single_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' => {
                in_single_quote = !in_single_quote;
                cleaned.push(ch);
            }
            '"' if !in_single_quote => {}
            _ => cleaned.push(ch),
        }
    }

    normalize_sql(&cleaned)
}

/// Assert that SQL contains all expected fragments in order, ignoring
/// identifier quotes and whitespace differences.
#[allow(clippy::missing_panics_doc)]
pub fn assert_sql_contains(actual: &str, fragments: &[&str]) {
    let actual_canonical = canonicalize_sql(actual);
    let mut search_start = 0usize;

    for fragment in fragments {
        let fragment_canonical = canonicalize_sql(fragment);
        if fragment_canonical.is_empty() {
            continue;
        }

        let Some(pos) = actual_canonical[search_start..].find(&fragment_canonical) else {
            panic!("expected SQL fragment `{fragment_canonical}` not found in `{actual_canonical}`");
        };
        search_start += pos + fragment_canonical.len();
    }
}
