//! # Entities
//!
//! Generic CRUD over one table, driven by an [`EntityType`] description.
//!
//! An entity type declares how its nested properties map onto columns; the
//! [`Entities`] facade uses that description to translate REST-style
//! filters, sorts, field selections and payloads into SQL, and to rebuild
//! nested entities from the flat rows the [`Connection`] returns.

use std::marker::PhantomData;

use serde_json::{Map, Value};

use crate::columns::{
    ColumnMap, all_properties_to_columns, patch_to_columns, properties_to_columns, sort_to_columns,
};
use crate::connection::{Connection, constraint_violation};
use crate::delete::DeleteBuilder;
use crate::error::{Error, Result};
use crate::fields::{FieldPropMap, field_prop_map};
use crate::filter::Filter;
use crate::insert::InsertBuilder;
use crate::join::Join;
use crate::prop::Prop;
use crate::prop_map::{PropMap, SelectMap, SelectNode, build_prop_map, json_type, prop_map_to_select_map};
use crate::rows::map_rows;
use crate::select::SelectBuilder;
use crate::types::{DataType, json_to_value};
use crate::update::UpdateBuilder;

/// Describes how an entity is stored.
///
/// Implemented by a unit struct per table. Only [`EntityType::TABLE`] and
/// [`EntityType::map`] are required; every other item has a default.
pub trait EntityType: Sized + Send + Sync + 'static {
    /// Table written by inserts, updates and deletes.
    const TABLE: &'static str;

    /// Table or view read by selects, when it differs from [`Self::TABLE`].
    const VIEW: Option<&'static str> = None;

    /// Alias given to the selected table. Column expressions in the select
    /// map may be qualified with it.
    const TABLE_ALIAS: Option<&'static str> = None;

    /// Writable properties and the columns they are stored in.
    fn map() -> SelectMap;

    /// Readable properties, used for selecting, filtering and sorting.
    #[must_use]
    fn select_map() -> SelectMap {
        Self::map()
    }

    /// Explicit properties overlaid on [`Self::select_map`] by name.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when a property is invalid.
    fn select_props() -> Result<Vec<Prop>> {
        Ok(Vec::new())
    }

    /// Name of the identity property.
    #[must_use]
    fn id_field() -> &'static str {
        "id"
    }

    /// Whether clients supply the identity on insert and update.
    #[must_use]
    fn writable_id() -> bool {
        false
    }

    /// Joins added to every select.
    #[must_use]
    fn joins() -> Vec<Join> {
        Vec::new()
    }

    /// Sort applied when a request does not specify one.
    #[must_use]
    fn default_sort() -> Map<String, Value> {
        let mut sort = Map::new();
        sort.insert(Self::id_field().to_string(), Value::from("asc"));
        sort
    }

    /// Values merged beneath each added entity.
    #[must_use]
    fn default_values() -> Map<String, Value> {
        Map::new()
    }

    /// Validates or rewrites a request filter before it is projected.
    ///
    /// # Errors
    ///
    /// Returns a client error to reject the filter.
    fn process_filter(filter: Map<String, Value>) -> Result<Map<String, Value>> {
        Ok(filter)
    }

    /// Validates or rewrites a payload before it is projected. `ids` is
    /// empty for inserts.
    ///
    /// # Errors
    ///
    /// Returns a client error to reject the payload.
    #[allow(unused_variables)]
    fn process_values(data: Map<String, Value>, ids: &[Value]) -> Result<Map<String, Value>> {
        Ok(data)
    }

    /// Adjusts the columns of a row before it is written. `ids` is empty for
    /// inserts.
    ///
    /// # Errors
    ///
    /// Returns a client error to reject the row.
    #[allow(unused_variables)]
    fn process_row(row: ColumnMap, ids: &[Value]) -> Result<ColumnMap> {
        Ok(row)
    }

    /// Customizes the select before the request filter, sort and paging are
    /// applied.
    ///
    /// # Errors
    ///
    /// Returns a client error to reject the request.
    #[allow(unused_variables)]
    fn base_select(
        select: SelectBuilder<Self>, options: &QueryOptions<'_>,
    ) -> Result<SelectBuilder<Self>> {
        Ok(select)
    }

    /// Message returned with a conflict when an insert or update violates a
    /// constraint.
    #[must_use]
    fn duplicate_error() -> Option<&'static str> {
        None
    }

    /// Message returned with a conflict when a delete violates a constraint.
    #[must_use]
    fn constraint_error() -> Option<&'static str> {
        None
    }
}

/// The request a select is being built for.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions<'a> {
    /// Filter after [`EntityType::process_filter`].
    pub filter: &'a Map<String, Value>,

    /// Filter as the client sent it.
    pub original_filter: &'a Map<String, Value>,

    /// Effective sort.
    pub sort: &'a Map<String, Value>,

    /// Properties selected for the request.
    pub field_props: &'a FieldPropMap<'a>,
}

/// CRUD operations over the table of an entity type.
pub struct Entities<E: EntityType, C: Connection> {
    conn: C,
    prop_map: PropMap,
    select_map: SelectMap,
    map: SelectMap,
    id_column: String,
    _marker: PhantomData<E>,
}

impl<E: EntityType, C: Connection> Entities<E, C> {
    /// Builds the property map of `E` and binds it to a connection.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the entity type is invalid, for
    /// instance when it has no identity property.
    pub fn new(conn: C) -> Result<Self> {
        let prop_map = build_prop_map(&E::select_map(), E::select_props()?)?;
        let Some(id_prop) = prop_map.get(E::id_field()) else {
            return Err(config_error!("Missing required id property in map"));
        };

        let mut map = E::map();
        let id_column = match map.get(E::id_field()) {
            Some(SelectNode::Column(col)) => col.clone(),
            _ => id_prop.col().rsplit_once('.').map_or(id_prop.col(), |(_, col)| col).to_string(),
        };
        if id_column.is_empty() {
            return Err(config_error!("id property must be mapped to a column"));
        }
        if !E::writable_id() {
            map.remove(E::id_field());
        }

        let select_map = prop_map_to_select_map(&prop_map);
        tracing::debug!(table = E::TABLE, id_column = %id_column, props = prop_map.len(), "configured entity type");

        Ok(Self {
            conn,
            prop_map,
            select_map,
            map,
            id_column,
            _marker: PhantomData,
        })
    }

    /// Returns every property of the entity type.
    #[must_use]
    pub const fn prop_map(&self) -> &PropMap {
        &self.prop_map
    }

    /// Returns the map used to translate filters and sorts.
    #[must_use]
    pub const fn select_map(&self) -> &SelectMap {
        &self.select_map
    }

    /// Returns the map used to validate and translate writes.
    #[must_use]
    pub const fn map(&self) -> &SelectMap {
        &self.map
    }

    /// Returns the identity column of the written table.
    #[must_use]
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Returns the underlying connection.
    #[must_use]
    pub const fn connection(&self) -> &C {
        &self.conn
    }

    /// Returns the entities matching `filter`, limited to `fields` (every
    /// default property when empty) and ordered by `sort` (the entity
    /// type's default when empty). Paging applies only when `limit` is not
    /// zero.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid filter, sort or field, and a
    /// server error when the query fails.
    pub async fn get_entities<S: AsRef<str> + Sync>(
        &self, filter: Map<String, Value>, fields: &[S], sort: Map<String, Value>, offset: u64,
        limit: u64,
    ) -> Result<Vec<Value>> {
        let processed = E::process_filter(filter.clone())?;
        let sort = if sort.is_empty() { E::default_sort() } else { sort };
        let field_props = field_prop_map(fields, &self.prop_map)?;

        let options = QueryOptions {
            filter: &processed,
            original_filter: &filter,
            sort: &sort,
            field_props: &field_props,
        };
        let select = E::base_select(SelectBuilder::new().columns(&field_props), &options)?;

        let mut select = select
            .filter(&properties_to_columns(&self.select_map, &processed)?)?
            .sort(&sort_to_columns(&self.select_map, &sort)?)?;
        if limit != 0 {
            select = select.limit(limit).offset(offset);
        }

        let query = select.build()?;
        let rows = self.conn.query(query.sql, query.params).await?;
        map_rows(rows, &field_props)
    }

    /// Returns the entity with the given id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] when no entity has the id.
    pub async fn get_entity_by_id<S: AsRef<str> + Sync>(
        &self, id: Value, fields: &[S],
    ) -> Result<Value> {
        let mut entities = self.get_entities_by_ids(&[id], fields, Map::new()).await?;
        if entities.is_empty() {
            return Err(Error::NotFound {
                code: "not_found".to_string(),
                description: "Invalid ID".to_string(),
            });
        }
        Ok(entities.swap_remove(0))
    }

    /// Returns the entities with the given ids. No query is run when `ids`
    /// is empty.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid sort or field, and a server
    /// error when the query fails.
    pub async fn get_entities_by_ids<S: AsRef<str> + Sync>(
        &self, ids: &[Value], fields: &[S], sort: Map<String, Value>,
    ) -> Result<Vec<Value>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut filter = Map::new();
        filter.insert(E::id_field().to_string(), Value::Array(ids.to_vec()));
        self.get_entities(filter, fields, sort, 0, 0).await
    }

    /// Counts the entities matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid filter, and a server error when
    /// the query fails.
    pub async fn count_entities(&self, filter: Map<String, Value>) -> Result<u64> {
        let processed = E::process_filter(filter.clone())?;
        let sort = Map::new();
        let field_props = field_prop_map::<&str>(&[], &self.prop_map)?;

        let options = QueryOptions {
            filter: &processed,
            original_filter: &filter,
            sort: &sort,
            field_props: &field_props,
        };
        let query = E::base_select(SelectBuilder::new().count(), &options)?
            .filter(&properties_to_columns(&self.select_map, &processed)?)?
            .build()?;

        let rows = self.conn.query(query.sql, query.params).await?;
        let count = rows.first().and_then(|row| row.get("count")).and_then(count_value);
        count.ok_or_else(|| server_error!("count query for {} returned no count", E::TABLE))
    }

    /// Inserts the entities, returning their ids in order. Default values
    /// are merged beneath each entity, which must then supply every
    /// writable property. No query is run when `entities` is empty.
    ///
    /// # Errors
    ///
    /// Returns a client error for an invalid entity, [`Error::Conflict`] for
    /// a registered constraint violation, and a server error when the insert
    /// fails.
    pub async fn add_entities(&self, entities: Vec<Map<String, Value>>) -> Result<Vec<Value>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let defaults = E::default_values();
        let mut rows = Vec::with_capacity(entities.len());
        for entity in entities {
            let data = merge_defaults(defaults.clone(), entity);
            let data = E::process_values(self.writable(data), &[])?;
            let row = all_properties_to_columns(&self.map, &data)?;
            rows.push(E::process_row(row, &[])?);
        }

        let query = InsertBuilder::<E>::new().rows(rows).returning(self.id_column.clone()).build()?;
        let inserted = self
            .conn
            .query(query.sql, query.params)
            .await
            .map_err(|err| remap_constraint::<E>(err, E::duplicate_error()))?;

        Ok(inserted.iter().map(|row| row.value(&self.id_column)).collect())
    }

    /// Replaces every writable property of the entity with the given id,
    /// returning the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns a client error unless `data` supplies exactly the writable
    /// properties, [`Error::Conflict`] for a registered constraint
    /// violation, and a server error when the update fails.
    pub async fn update_by_id(&self, id: Value, data: Map<String, Value>) -> Result<u32> {
        let ids = [id];
        let data = E::process_values(self.writable(data), &ids)?;
        let row = E::process_row(all_properties_to_columns(&self.map, &data)?, &ids)?;
        self.update_rows(&ids, &row).await
    }

    /// Applies a JSON merge patch to the entities with the given ids,
    /// returning the number of rows changed. Only supplied properties are
    /// written and `null` clears a property. No query is run when `ids` or
    /// the patch is empty.
    ///
    /// # Errors
    ///
    /// Returns a client error for an unknown or non-scalar property,
    /// [`Error::Conflict`] for a registered constraint violation, and a
    /// server error when the update fails.
    pub async fn patch_by_ids(&self, ids: &[Value], patch: Map<String, Value>) -> Result<u32> {
        if ids.is_empty() {
            return Ok(0);
        }

        let data = E::process_values(patch, ids)?;
        let row = E::process_row(patch_to_columns(&self.map, &data)?, ids)?;
        if row.is_empty() {
            return Ok(0);
        }
        self.update_rows(ids, &row).await
    }

    /// Deletes the entities with the given ids, returning the number of rows
    /// removed. No query is run when `ids` is empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conflict`] for a registered constraint violation and
    /// a server error when the delete fails.
    pub async fn delete_by_ids(&self, ids: &[Value]) -> Result<u32> {
        if ids.is_empty() {
            return Ok(0);
        }

        let query = DeleteBuilder::<E>::new().r#where(self.id_filter(ids)?).build()?;
        self.conn
            .exec(query.sql, query.params)
            .await
            .map_err(|err| remap_constraint::<E>(err, E::constraint_error()))
    }

    async fn update_rows(&self, ids: &[Value], row: &ColumnMap) -> Result<u32> {
        let query =
            UpdateBuilder::<E>::new().set_columns(row)?.r#where(self.id_filter(ids)?).build()?;
        self.conn
            .exec(query.sql, query.params)
            .await
            .map_err(|err| remap_constraint::<E>(err, E::duplicate_error()))
    }

    fn id_filter(&self, ids: &[Value]) -> Result<Filter> {
        let values = ids
            .iter()
            .map(|id| {
                json_to_value(id)
                    .filter(|_| !id.is_null())
                    .ok_or_else(|| bad_request!("Invalid ID, got {}", json_type(id)))
            })
            .collect::<Result<Vec<_>>>()?;

        let col = self.id_column.clone();
        Ok(match <[_; 1]>::try_from(values) {
            Ok([value]) => Filter::Eq(col, value),
            Err(values) => Filter::In(col, values),
        })
    }

    // the identity is not part of the writable map unless clients own it
    fn writable(&self, mut data: Map<String, Value>) -> Map<String, Value> {
        if !E::writable_id() {
            data.remove(E::id_field());
        }
        data
    }
}

/// Merges `entity` over `defaults`, recursing into objects present in both.
fn merge_defaults(mut defaults: Map<String, Value>, entity: Map<String, Value>) -> Map<String, Value> {
    for (key, value) in entity {
        match (defaults.get_mut(&key), value) {
            (Some(Value::Object(base)), Value::Object(nested)) => {
                let merged = merge_defaults(std::mem::take(base), nested);
                *base = merged;
            }
            (_, value) => {
                defaults.insert(key, value);
            }
        }
    }
    defaults
}

fn remap_constraint<E: EntityType>(err: anyhow::Error, message: Option<&'static str>) -> Error {
    if let (Some(message), Some(violation)) = (message, constraint_violation(&err)) {
        tracing::warn!(table = E::TABLE, %violation, "constraint violation");
        return Error::Conflict {
            code: "conflict".to_string(),
            description: message.to_string(),
        };
    }
    Error::from(err)
}

fn count_value(value: &DataType) -> Option<u64> {
    match value {
        DataType::Int32(Some(n)) => u64::try_from(*n).ok(),
        DataType::Int64(Some(n)) => u64::try_from(*n).ok(),
        DataType::Uint32(Some(n)) => Some(u64::from(*n)),
        DataType::Uint64(Some(n)) => Some(*n),
        DataType::Str(Some(n)) => n.parse().ok(),
        _ => None,
    }
}
