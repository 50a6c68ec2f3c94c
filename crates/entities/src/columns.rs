//! Projection of nested request properties onto flat SQL columns.
//!
//! Filters, sorts and patches are projected *partially*: only the supplied
//! properties are translated. Full writes are projected *strictly*: the
//! payload and the map must describe exactly the same leaves.

use indexmap::IndexMap;
use serde_json::{Map, Value};

use crate::error::Result;
use crate::prop_map::{SelectMap, SelectNode, json_type};

/// Ordered mapping of column expressions to JSON values.
pub type ColumnMap = IndexMap<String, Value>;

/// Options for a partial projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Projection {
    /// Skip properties the map does not know instead of rejecting them.
    pub ignore_unmapped: bool,

    /// Allow arrays and objects as leaf values (filter operators, `IN`
    /// lists).
    pub complex_values: bool,
}

impl Projection {
    /// Filters: every property must be mapped; operator objects and lists
    /// are allowed.
    pub const FILTER: Self = Self {
        ignore_unmapped: false,
        complex_values: true,
    };
    /// Patches: every property must be mapped and hold a scalar.
    pub const PATCH: Self = Self {
        ignore_unmapped: false,
        complex_values: false,
    };
    /// Sorts: unknown properties are skipped.
    pub const SORT: Self = Self {
        ignore_unmapped: true,
        complex_values: false,
    };
}

/// Projects filter properties onto columns.
///
/// # Errors
///
/// Returns a client error for an unmapped property or a non-object value
/// where the map expects a nested object, and a configuration error when two
/// properties map to the same column.
pub fn properties_to_columns(map: &SelectMap, properties: &Map<String, Value>) -> Result<ColumnMap> {
    project(map, properties, Projection::FILTER)
}

/// Projects sort properties onto columns, skipping unknown properties.
///
/// # Errors
///
/// Returns a client error for a non-scalar direction or a non-object value
/// where the map expects a nested object.
pub fn sort_to_columns(map: &SelectMap, sort: &Map<String, Value>) -> Result<ColumnMap> {
    project(map, sort, Projection::SORT)
}

/// Projects a merge patch onto columns. Only the supplied properties are
/// written; an explicit `null` clears its column.
///
/// # Errors
///
/// Returns a client error for an unmapped property or a non-scalar value.
pub fn patch_to_columns(map: &SelectMap, patch: &Map<String, Value>) -> Result<ColumnMap> {
    project(map, patch, Projection::PATCH)
}

/// Projects `properties` onto columns with the given options.
///
/// # Errors
///
/// See [`properties_to_columns`].
pub fn project(
    map: &SelectMap, properties: &Map<String, Value>, projection: Projection,
) -> Result<ColumnMap> {
    let mut columns = ColumnMap::new();
    project_into(map, properties, projection, "", &mut columns)?;
    Ok(columns)
}

fn project_into(
    map: &SelectMap, properties: &Map<String, Value>, projection: Projection, context: &str,
    columns: &mut ColumnMap,
) -> Result<()> {
    for (property, value) in properties {
        let path = format!("{context}{property}");

        match map.get(property) {
            None if projection.ignore_unmapped => {}
            None => return Err(bad_request!("Invalid {path} property")),
            Some(SelectNode::Group(group)) => {
                let Value::Object(nested) = value else {
                    return Err(bad_request!(
                        "Expected {path} property to be an object, got {}",
                        json_type(value)
                    ));
                };
                project_into(group, nested, projection, &format!("{path}."), columns)?;
            }
            Some(SelectNode::Column(col)) => {
                if columns.contains_key(col) {
                    return Err(config_error!(
                        "Column '{col}' is mapped to more than one property ({path})"
                    ));
                }
                if !projection.complex_values && !is_scalar(value) {
                    return Err(bad_request!(
                        "Expected {path} property to have a scalar value, got {}",
                        json_type(value)
                    ));
                }
                columns.insert(col.clone(), value.clone());
            }
        }
    }
    Ok(())
}

/// Projects a full entity onto columns, in map order.
///
/// Every leaf of `data` must be mapped and every leaf of `map` must be
/// present in `data`.
///
/// # Errors
///
/// Returns a client error naming the first offending dotted path: `Invalid
/// <path> property` for a leaf the map does not know, `Missing required
/// <path> property` for a map leaf absent from the data, or a type mismatch
/// between a nested object and a scalar. Returns a configuration error when
/// two properties map to the same column.
pub fn all_properties_to_columns(map: &SelectMap, data: &Map<String, Value>) -> Result<ColumnMap> {
    check_mapped(map, data, "")?;

    let mut columns = ColumnMap::new();
    collect_required(map, data, "", &mut columns)?;
    Ok(columns)
}

fn check_mapped(map: &SelectMap, data: &Map<String, Value>, context: &str) -> Result<()> {
    for (property, value) in data {
        let path = format!("{context}{property}");

        match map.get(property) {
            None => return Err(bad_request!("Invalid {path} property")),
            Some(SelectNode::Group(group)) => {
                let Value::Object(nested) = value else {
                    return Err(bad_request!(
                        "Expected {path} property to be an object, got {}",
                        json_type(value)
                    ));
                };
                check_mapped(group, nested, &format!("{path}."))?;
            }
            Some(SelectNode::Column(_)) => {
                if !is_scalar(value) {
                    return Err(bad_request!(
                        "Expected {path} property to have a scalar value, got {}",
                        json_type(value)
                    ));
                }
            }
        }
    }
    Ok(())
}

fn collect_required(
    map: &SelectMap, data: &Map<String, Value>, context: &str, columns: &mut ColumnMap,
) -> Result<()> {
    for (property, node) in map.iter() {
        let path = format!("{context}{property}");

        match (node, data.get(property)) {
            (SelectNode::Group(group), Some(Value::Object(nested))) => {
                collect_required(group, nested, &format!("{path}."), columns)?;
            }
            (SelectNode::Group(group), _) => {
                // the whole object is absent: name its first leaf
                let leaf = group.first_leaf().map_or(path.clone(), |leaf| format!("{path}.{leaf}"));
                return Err(bad_request!("Missing required {leaf} property"));
            }
            (SelectNode::Column(_), None) => {
                return Err(bad_request!("Missing required {path} property"));
            }
            (SelectNode::Column(col), Some(value)) => {
                if columns.contains_key(col) {
                    return Err(config_error!(
                        "Column '{col}' is mapped to more than one property ({path})"
                    ));
                }
                columns.insert(col.clone(), value.clone());
            }
        }
    }
    Ok(())
}

const fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Array(_) | Value::Object(_))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Error;

    fn map() -> SelectMap {
        select_map! {
            "name": "UserName",
            "client": { "id": "ClientID" },
            "group": { "type": { "id": "GroupTypeID" } },
        }
    }

    fn object(value: Value) -> Map<String, Value> {
        let Value::Object(object) = value else { panic!("expected object") };
        object
    }

    fn bad_request(result: Result<ColumnMap>) -> String {
        match result {
            Err(Error::BadRequest { description, .. }) => description,
            other => panic!("expected bad request, got {other:?}"),
        }
    }

    #[test]
    fn filter_projection() {
        let filter = object(json!({
            "name": {"lk": "A%"},
            "group": {"type": {"id": [1, 2]}},
        }));
        let columns = properties_to_columns(&map(), &filter).unwrap();

        assert_eq!(columns.keys().collect::<Vec<_>>(), ["UserName", "GroupTypeID"]);
        assert_eq!(columns["GroupTypeID"], json!([1, 2]));
    }

    #[test]
    fn filter_rejects_unknown() {
        let filter = object(json!({"client": {"secret": 1}}));
        assert_eq!(bad_request(properties_to_columns(&map(), &filter)), "Invalid client.secret property");
    }

    #[test]
    fn filter_rejects_scalar_for_group() {
        let filter = object(json!({"client": 5}));
        assert_eq!(
            bad_request(properties_to_columns(&map(), &filter)),
            "Expected client property to be an object, got int"
        );
    }

    #[test]
    fn sort_ignores_unknown() {
        let sort = object(json!({"unknown": "asc", "name": "desc"}));
        let columns = sort_to_columns(&map(), &sort).unwrap();
        assert_eq!(columns, ColumnMap::from([("UserName".to_string(), json!("desc"))]));
    }

    #[test]
    fn patch_rejects_non_scalar() {
        let patch = object(json!({"name": ["a"]}));
        assert_eq!(
            bad_request(patch_to_columns(&map(), &patch)),
            "Expected name property to have a scalar value, got array"
        );

        let patch = object(json!({"client": {"id": null}}));
        let columns = patch_to_columns(&map(), &patch).unwrap();
        assert_eq!(columns, ColumnMap::from([("ClientID".to_string(), Value::Null)]));
    }

    #[test]
    fn column_claimed_twice() {
        let map = select_map! { "a": "col", "b": "col" };
        let result = patch_to_columns(&map, &object(json!({"a": 1, "b": 2})));
        let Err(Error::Config { description, .. }) = result else {
            panic!("expected config error");
        };
        assert_eq!(description, "Column 'col' is mapped to more than one property (b)");
    }

    #[test]
    fn all_properties_missing() {
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &Map::new())),
            "Missing required name property"
        );

        let data = object(json!({"name": "Test Name", "client": {}}));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Missing required client.id property"
        );

        let data = object(json!({"name": "Test Name", "client": {"id": null}, "group": {"type": {}}}));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Missing required group.type.id property"
        );

        let data = object(json!({"name": "Test Name", "client": {"id": null}}));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Missing required group.type.id property"
        );
    }

    #[test]
    fn all_properties_invalid() {
        let data = object(json!({
            "name": "Test Name",
            "client": {"id": null, "extra": true},
            "group": {"type": {"id": 234}},
        }));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Invalid client.extra property"
        );

        let data = object(json!({"name": {"first": "Test"}}));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Expected name property to have a scalar value, got object"
        );

        let data = object(json!({"name": "Test", "client": "acme"}));
        assert_eq!(
            bad_request(all_properties_to_columns(&map(), &data)),
            "Expected client property to be an object, got string"
        );
    }

    #[test]
    fn all_properties_valid() {
        let data = object(json!({
            "group": {"type": {"id": 234}},
            "name": "Test Name",
            "client": {"id": null},
        }));
        let columns = all_properties_to_columns(&map(), &data).unwrap();

        assert_eq!(
            columns.into_iter().collect::<Vec<_>>(),
            [
                ("UserName".to_string(), json!("Test Name")),
                ("ClientID".to_string(), Value::Null),
                ("GroupTypeID".to_string(), json!(234)),
            ]
        );
        assert!(all_properties_to_columns(&SelectMap::new(), &Map::new()).unwrap().is_empty());
    }
}
