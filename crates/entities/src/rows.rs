//! Rehydration of flat result rows into nested entities.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone as _, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value};

use crate::error::Result;
use crate::fields::FieldPropMap;
use crate::prop::{Prop, PropType, TimeZone};
use crate::types::{DataType, Row};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// Maps each row to a nested entity holding the selected properties.
///
/// Values are computed in selection order. A `null` null-group
/// discriminant suppresses the rest of its object, which is written as a
/// single `null` at the object's path; when nested groups are both null,
/// only the outermost is written.
///
/// # Errors
///
/// Returns a server error when a timestamp column holds text that cannot be
/// parsed.
pub fn map_rows<I>(rows: I, fields: &FieldPropMap<'_>) -> Result<Vec<Value>>
where
    I: IntoIterator<Item = Row>,
{
    let alias_map = fields.alias_map();
    rows.into_iter()
        .map(|row| {
            let mut entity = Map::new();
            let mut null_parents: IndexMap<&str, &Prop> = IndexMap::new();

            for (col_name, selected) in &alias_map {
                let prop = selected.prop;

                if prop.is_null_group() && is_null(prop, &row, col_name) {
                    if prop.parents().iter().any(|parent| null_parents.contains_key(parent.as_str()))
                    {
                        continue;
                    }
                    let Some(parent) = prop.parents().last() else {
                        continue;
                    };
                    // an outer null group supersedes any inner one already seen
                    null_parents.retain(|inner, _| !inner.starts_with(parent.as_str()));
                    null_parents.insert(parent.as_str(), prop);
                } else if selected.output {
                    set_path(&mut entity, prop.map(), prop_value(prop, &row, col_name)?);
                }
            }

            for prop in null_parents.values() {
                set_path(&mut entity, &prop.map()[..prop.depth() - 1], Value::Null);
            }
            Ok(Value::Object(entity))
        })
        .collect()
}

/// Null test for a null-group discriminant, made on the raw column value
/// before any coercion.
fn is_null(prop: &Prop, row: &Row, col_name: &str) -> bool {
    match prop.get_value() {
        Some(get_value) => get_value(row).is_null(),
        None => row.get(col_name).is_none_or(DataType::is_null),
    }
}

fn prop_value(prop: &Prop, row: &Row, col_name: &str) -> Result<Value> {
    if let Some(get_value) = prop.get_value() {
        return Ok(get_value(row));
    }

    let null = DataType::NULL;
    let raw = row.get(col_name).unwrap_or(&null);
    if let Some(kind) = prop.kind() {
        return Ok(coerce(raw, kind));
    }

    match (prop.time_zone(), raw.as_text()) {
        (TimeZone::Unset, _) | (_, None) => Ok(raw.to_json()),
        (time_zone, Some(text)) => format_timestamp(text, time_zone).map(Value::String),
    }
}

/// Coerces a raw value to `kind`. SQL `NULL` becomes the type's zero value.
fn coerce(raw: &DataType, kind: PropType) -> Value {
    match kind {
        PropType::Bool => Value::Bool(as_bool(raw)),
        PropType::Int => Value::Number(as_int(raw)),
        PropType::Float => Number::from_f64(as_float(raw)).map_or(Value::Null, Value::Number),
        PropType::String => Value::String(as_string(raw)),
    }
}

fn as_bool(raw: &DataType) -> bool {
    match raw {
        DataType::Boolean(Some(v)) => *v,
        DataType::Int32(Some(v)) => *v != 0,
        DataType::Int64(Some(v)) => *v != 0,
        DataType::Uint32(Some(v)) => *v != 0,
        DataType::Uint64(Some(v)) => *v != 0,
        DataType::Float(Some(v)) => *v != 0.0,
        DataType::Double(Some(v)) => *v != 0.0,
        DataType::Binary(Some(v)) => !v.is_empty(),
        other => other.as_text().is_some_and(|text| !text.is_empty() && text != "0"),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn as_int(raw: &DataType) -> Number {
    match raw {
        DataType::Boolean(Some(v)) => Number::from(i64::from(*v)),
        DataType::Int32(Some(v)) => Number::from(*v),
        DataType::Int64(Some(v)) => Number::from(*v),
        DataType::Uint32(Some(v)) => Number::from(*v),
        DataType::Uint64(Some(v)) => Number::from(*v),
        DataType::Float(Some(v)) => Number::from(f64::from(*v) as i64),
        DataType::Double(Some(v)) => Number::from(*v as i64),
        other => {
            let text = other.as_text().unwrap_or_default().trim();
            text.parse::<i64>()
                .or_else(|_| text.parse::<f64>().map(|v| v as i64))
                .map_or_else(|_| Number::from(0), Number::from)
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn as_float(raw: &DataType) -> f64 {
    match raw {
        DataType::Boolean(Some(v)) => f64::from(u8::from(*v)),
        DataType::Int32(Some(v)) => f64::from(*v),
        DataType::Int64(Some(v)) => *v as f64,
        DataType::Uint32(Some(v)) => f64::from(*v),
        DataType::Uint64(Some(v)) => *v as f64,
        DataType::Float(Some(v)) => f64::from(*v),
        DataType::Double(Some(v)) => *v,
        other => other.as_text().and_then(|text| text.trim().parse().ok()).unwrap_or_default(),
    }
}

fn as_string(raw: &DataType) -> String {
    match raw {
        DataType::Boolean(Some(v)) => v.to_string(),
        DataType::Int32(Some(v)) => v.to_string(),
        DataType::Int64(Some(v)) => v.to_string(),
        DataType::Uint32(Some(v)) => v.to_string(),
        DataType::Uint64(Some(v)) => v.to_string(),
        DataType::Float(Some(v)) => v.to_string(),
        DataType::Double(Some(v)) => v.to_string(),
        DataType::Binary(Some(v)) => String::from_utf8_lossy(v).into_owned(),
        other => other.as_text().unwrap_or_default().to_string(),
    }
}

/// Renders timestamp text as `YYYY-MM-DDTHH:MM:SS±HH:MM`. Text carrying its
/// own offset keeps it; naive text is read in `time_zone`.
fn format_timestamp(text: &str, time_zone: TimeZone) -> Result<String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.format(TIMESTAMP_FORMAT).to_string());
    }

    let naive = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| {
            NaiveDate::parse_from_str(text, "%Y-%m-%d").map(|date| date.and_time(NaiveTime::MIN))
        })
        .map_err(|e| server_error!("invalid timestamp '{text}': {e}"))?;

    let offset = match time_zone {
        TimeZone::Fixed(offset) => offset,
        TimeZone::Unset | TimeZone::Utc => Utc.fix(),
    };
    let dt = offset
        .from_local_datetime(&naive)
        .single()
        .ok_or_else(|| server_error!("ambiguous timestamp '{text}'"))?;

    Ok(dt.format(TIMESTAMP_FORMAT).to_string())
}

/// Writes `value` at `path`, creating (or replacing scalars with) objects
/// along the way.
fn set_path(entity: &mut Map<String, Value>, path: &[String], value: Value) {
    match path {
        [] => {}
        [leaf] => {
            entity.insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let child = entity.entry(head.clone()).or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            if let Value::Object(nested) = child {
                set_path(nested, rest, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::FixedOffset;
    use serde_json::json;

    use super::*;
    use crate::fields::field_prop_map;
    use crate::prop_map::{PropMap, prop_list_to_prop_map};

    fn row(fields: &[(&str, DataType)]) -> Row {
        fields.iter().cloned().collect()
    }

    fn props(client_null_group: bool) -> PropMap {
        let client_id = Prop::new("client.id", "a.ClientID");
        let client_id = if client_null_group { client_id.null_group() } else { client_id };

        prop_list_to_prop_map([
            Prop::new("id", "UserID").build().unwrap(),
            Prop::computed("username", |row| {
                if row.value("UserID") == json!(1) {
                    json!("testUser")
                } else {
                    row.value("UserName")
                }
            })
            .depends_on(["id"])
            .build()
            .unwrap(),
            client_id.build().unwrap(),
            Prop::new("client.isDisabled", "c.isDisabled")
                .alias("Disabled")
                .kind(PropType::Bool)
                .build()
                .unwrap(),
            Prop::new("client.type.id", "TypeID").null_group().build().unwrap(),
            Prop::new("dateCreated", "DateCreatedUTC").time_zone(TimeZone::Utc).build().unwrap(),
        ])
        .unwrap()
    }

    fn user_rows() -> Vec<Row> {
        vec![
            row(&[
                ("UserID", 5_i64.into()),
                ("UserName", "theodoreb".into()),
                ("ClientID", 1_i64.into()),
                ("Disabled", 0_i64.into()),
                ("TypeID", 2_i64.into()),
                ("DateCreatedUTC", "2019-02-18 09:01:35".into()),
            ]),
            row(&[
                ("UserID", 42_i64.into()),
                ("UserName", "jsmith".into()),
                ("ClientID", 2_i64.into()),
                ("Disabled", 1_i64.into()),
                ("TypeID", DataType::NULL),
                ("DateCreatedUTC", "2018-05-20 23:22:40".into()),
            ]),
            row(&[
                ("UserID", 1_i64.into()),
                ("UserName", "test".into()),
                ("ClientID", DataType::NULL),
                ("Disabled", DataType::NULL),
                ("TypeID", DataType::NULL),
                ("DateCreatedUTC", DataType::NULL),
            ]),
        ]
    }

    #[test]
    fn all_fields_with_nullable_type_group() {
        let map = props(false);
        let fields = field_prop_map::<&str>(&[], &map).unwrap();

        let entities = map_rows(user_rows(), &fields).unwrap();
        assert_eq!(
            entities,
            [
                json!({"id": 5, "username": "theodoreb", "client": {"id": 1, "isDisabled": false, "type": {"id": 2}}, "dateCreated": "2019-02-18T09:01:35+00:00"}),
                json!({"id": 42, "username": "jsmith", "client": {"id": 2, "isDisabled": true, "type": null}, "dateCreated": "2018-05-20T23:22:40+00:00"}),
                json!({"id": 1, "username": "testUser", "client": {"id": null, "isDisabled": false, "type": null}, "dateCreated": null}),
            ]
        );
    }

    #[test]
    fn non_client_fields() {
        let map = props(false);
        let fields = field_prop_map(&["id", "username", "dateCreated"], &map).unwrap();

        let entities = map_rows(user_rows(), &fields).unwrap();
        assert_eq!(
            entities,
            [
                json!({"id": 5, "username": "theodoreb", "dateCreated": "2019-02-18T09:01:35+00:00"}),
                json!({"id": 42, "username": "jsmith", "dateCreated": "2018-05-20T23:22:40+00:00"}),
                json!({"id": 1, "username": "testUser", "dateCreated": null}),
            ]
        );
    }

    #[test]
    fn nullable_client_group_from_child() {
        let map = props(true);
        let fields =
            field_prop_map(&["id", "username", "client.isDisabled", "dateCreated"], &map).unwrap();

        let entities = map_rows(user_rows(), &fields).unwrap();
        assert_eq!(
            entities,
            [
                json!({"id": 5, "username": "theodoreb", "client": {"isDisabled": false}, "dateCreated": "2019-02-18T09:01:35+00:00"}),
                json!({"id": 42, "username": "jsmith", "client": {"isDisabled": true}, "dateCreated": "2018-05-20T23:22:40+00:00"}),
                json!({"id": 1, "username": "testUser", "client": null, "dateCreated": null}),
            ]
        );
    }

    #[test]
    fn nullable_client_group_from_grandchild() {
        let map = props(true);
        let fields = field_prop_map(&["username", "client.type.id"], &map).unwrap();

        let entities = map_rows(user_rows(), &fields).unwrap();
        assert_eq!(
            entities,
            [
                json!({"username": "theodoreb", "client": {"type": {"id": 2}}}),
                json!({"username": "jsmith", "client": {"type": null}}),
                json!({"username": "testUser", "client": null}),
            ]
        );
    }

    #[test]
    fn outer_null_group_wins_in_any_order() {
        // inner discriminant first in the selection
        let map = prop_list_to_prop_map([
            Prop::new("client.type.id", "TypeID").null_group().build().unwrap(),
            Prop::new("client.id", "ClientID").null_group().build().unwrap(),
        ])
        .unwrap();
        let fields = field_prop_map::<&str>(&[], &map).unwrap();

        let rows = vec![row(&[("TypeID", DataType::NULL), ("ClientID", DataType::NULL)])];
        assert_eq!(map_rows(rows, &fields).unwrap(), [json!({"client": null})]);
    }

    #[test]
    fn typed_null_group_discriminant() {
        let map = prop_list_to_prop_map([
            Prop::new("id", "UserID").build().unwrap(),
            Prop::new("client.id", "ClientID").kind(PropType::Int).null_group().build().unwrap(),
            Prop::new("client.name", "Company").alias("ClientName").build().unwrap(),
        ])
        .unwrap();
        let fields = field_prop_map::<&str>(&[], &map).unwrap();

        let rows = vec![
            row(&[("UserID", 1_i64.into()), ("ClientID", DataType::NULL), ("ClientName", DataType::NULL)]),
            row(&[("UserID", 2_i64.into()), ("ClientID", "7".into()), ("ClientName", "Acme".into())]),
        ];
        assert_eq!(
            map_rows(rows, &fields).unwrap(),
            [json!({"id": 1, "client": null}), json!({"id": 2, "client": {"id": 7, "name": "Acme"}})]
        );
    }

    #[test]
    fn dependency_only_values_are_not_computed() {
        let map = prop_list_to_prop_map([
            Prop::new("created", "Created").time_zone(TimeZone::Utc).build().unwrap(),
            Prop::computed("label", |row| row.value("Name")).depends_on(["created"]).build().unwrap(),
        ])
        .unwrap();
        let fields = field_prop_map(&["label"], &map).unwrap();

        // the unparseable timestamp is only a dependency, so it is never formatted
        let rows = vec![row(&[("Created", "yesterday".into()), ("Name", "x".into())])];
        assert_eq!(map_rows(rows, &fields).unwrap(), [json!({"label": "x"})]);
    }

    #[test]
    fn computed_value() {
        let map = prop_list_to_prop_map([
            Prop::new("id", "UserID").build().unwrap(),
            Prop::computed("username", |row| {
                if row.value("UserID") == json!(1) { json!("testUser") } else { row.value("UserName") }
            })
            .depends_on(["id"])
            .build()
            .unwrap(),
        ])
        .unwrap();
        let fields = field_prop_map(&["username"], &map).unwrap();

        let rows = vec![row(&[("UserID", 1_i64.into()), ("UserName", "x".into())])];
        assert_eq!(map_rows(rows, &fields).unwrap(), [json!({"username": "testUser"})]);
    }

    #[test]
    fn coercion_of_null_and_text() {
        assert_eq!(coerce(&DataType::NULL, PropType::Bool), json!(false));
        assert_eq!(coerce(&DataType::NULL, PropType::Int), json!(0));
        assert_eq!(coerce(&DataType::NULL, PropType::Float), json!(0.0));
        assert_eq!(coerce(&DataType::NULL, PropType::String), json!(""));
        assert_eq!(coerce(&"42".into(), PropType::Int), json!(42));
        assert_eq!(coerce(&"4.5".into(), PropType::Float), json!(4.5));
        assert_eq!(coerce(&"0".into(), PropType::Bool), json!(false));
        assert_eq!(coerce(&7_i64.into(), PropType::String), json!("7"));
        assert_eq!(coerce(&2.9_f64.into(), PropType::Int), json!(2));
    }

    #[test]
    fn timestamp_formats() {
        let plus_13 = TimeZone::Fixed(FixedOffset::east_opt(13 * 3600).unwrap());

        assert_eq!(
            format_timestamp("2019-02-18 09:01:35", TimeZone::Utc).unwrap(),
            "2019-02-18T09:01:35+00:00"
        );
        assert_eq!(
            format_timestamp("2019-02-18 09:01:35.250", plus_13).unwrap(),
            "2019-02-18T09:01:35+13:00"
        );
        assert_eq!(
            format_timestamp("2019-02-18T09:01:35-05:00", TimeZone::Utc).unwrap(),
            "2019-02-18T09:01:35-05:00"
        );
        assert_eq!(format_timestamp("2019-02-18", TimeZone::Utc).unwrap(), "2019-02-18T00:00:00+00:00");
        assert!(format_timestamp("yesterday", TimeZone::Utc).is_err());
    }
}
