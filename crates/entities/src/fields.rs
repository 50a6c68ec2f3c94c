//! Per-request field selection.

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::error::Result;
use crate::prop::Prop;
use crate::prop_map::PropMap;

/// A property chosen for one request, with its output flag for that request.
///
/// Properties pulled in only because another selected property needs them
/// are selected with `output` cleared; the shared [`Prop`] is never mutated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SelectedProp<'a> {
    /// The configured property.
    pub prop: &'a Prop,

    /// Whether the value is written to the output entity.
    pub output: bool,
}

/// Ordered selection of properties for one request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldPropMap<'a> {
    props: IndexMap<&'a str, SelectedProp<'a>>,
}

impl<'a> FieldPropMap<'a> {
    /// Returns the selected property named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SelectedProp<'a>> {
        self.props.get(name)
    }

    /// Returns `true` if the property named `name` is selected.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    /// Iterates over the selected property names in order.
    pub fn names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.props.keys().copied()
    }

    /// Iterates over the selected properties in order.
    pub fn iter(&self) -> impl Iterator<Item = &SelectedProp<'a>> {
        self.props.values()
    }

    /// Number of selected properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.props.len()
    }

    /// Returns `true` when nothing is selected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Indexes the selection by output column name.
    #[must_use]
    pub fn alias_map(&self) -> IndexMap<&'a str, SelectedProp<'a>> {
        self.props.values().map(|selected| (selected.prop.output_col(), *selected)).collect()
    }

    fn select(&mut self, prop: &'a Prop) {
        self.props.insert(
            prop.name(),
            SelectedProp {
                prop,
                output: prop.is_output(),
            },
        );
    }
}

/// Resolves the requested `fields` against `prop_map`.
///
/// An empty field list selects every default property. Otherwise each field
/// selects the property of that exact name or, failing that, every property
/// nested below it. Properties that a selected property depends on, and the
/// null-group discriminants of any object a selected property lives in, are
/// added with output disabled.
///
/// # Errors
///
/// Returns a client error when a field matches no property.
pub fn field_prop_map<'a, S: AsRef<str>>(
    fields: &[S], prop_map: &'a PropMap,
) -> Result<FieldPropMap<'a>> {
    let mut selection = FieldPropMap::default();
    let mut depended_on: Vec<&str> = Vec::new();

    if fields.is_empty() {
        for (_, prop) in prop_map.iter().filter(|(_, prop)| prop.is_default()) {
            selection.select(prop);
            depended_on.extend(prop.depends_on().iter().map(String::as_str));
        }
    } else {
        for field in fields {
            let field = field.as_ref();
            let matches: Vec<&Prop> = if let Some(prop) = prop_map.get(field) {
                vec![prop]
            } else {
                let prefix = format!("{field}.");
                prop_map
                    .iter()
                    .filter(|(name, _)| name.starts_with(&prefix))
                    .map(|(_, prop)| prop)
                    .collect()
            };
            if matches.is_empty() {
                return Err(bad_request!("'{field}' is not a valid field"));
            }

            for prop in matches {
                depended_on.extend(prop.depends_on().iter().map(String::as_str));
                selection.select(prop);
            }
        }

        // a selected child needs its group's discriminant to detect a null group
        for (name, prop) in prop_map.iter() {
            if selection.contains(name) || !prop.is_null_group() {
                continue;
            }
            let Some(parent) = prop.parents().last() else {
                continue;
            };
            if selection.names().any(|selected| selected.starts_with(parent.as_str())) {
                depended_on.push(name);
            }
        }
    }

    let mut pulled = 0;
    for (name, prop) in prop_map.iter() {
        if !depended_on.contains(&name) {
            continue;
        }
        if let Entry::Vacant(entry) = selection.props.entry(name) {
            entry.insert(SelectedProp { prop, output: false });
            pulled += 1;
        }
    }
    if pulled > 0 {
        tracing::debug!(pulled, selected = selection.len(), "added dependency-only props");
    }

    Ok(selection)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::Error;
    use crate::prop_map::prop_list_to_prop_map;

    fn prop_map() -> PropMap {
        prop_list_to_prop_map([
            Prop::new("username", "UserName").not_default().build().unwrap(),
            Prop::new("client.id", "ClientID").null_group().build().unwrap(),
            Prop::new("client.name", "Company").alias("ClientName").build().unwrap(),
            Prop::new("client.isDisabled", "isDisabled").build().unwrap(),
            Prop::new("group.type.id", "GroupTypeID").build().unwrap(),
            Prop::new("group.type.name", "GroupName").build().unwrap(),
            Prop::new("groupName", "DiffGroupName").build().unwrap(),
        ])
        .unwrap()
    }

    fn names(selection: &FieldPropMap<'_>) -> Vec<String> {
        selection.names().map(ToString::to_string).collect()
    }

    #[test]
    fn default_fields() {
        let map = prop_map();
        let selection = field_prop_map::<&str>(&[], &map).unwrap();
        assert_eq!(
            names(&selection),
            [
                "client.id",
                "client.name",
                "client.isDisabled",
                "group.type.id",
                "group.type.name",
                "groupName"
            ]
        );
        assert!(selection.iter().all(|selected| selected.output));
    }

    #[test]
    fn explicit_and_nested_fields() {
        let map = prop_map();
        let selection = field_prop_map(&["username", "group"], &map).unwrap();
        assert_eq!(names(&selection), ["username", "group.type.id", "group.type.name"]);

        let selection = field_prop_map(&["client", "group.type"], &map).unwrap();
        assert_eq!(
            names(&selection),
            [
                "client.id",
                "client.name",
                "client.isDisabled",
                "group.type.id",
                "group.type.name"
            ]
        );
    }

    #[test]
    fn null_group_discriminant() {
        let map = prop_map();
        let selection = field_prop_map(&["client.isDisabled", "groupName"], &map).unwrap();

        assert_eq!(names(&selection), ["client.isDisabled", "groupName", "client.id"]);
        assert!(selection.get("groupName").unwrap().output);
        assert!(!selection.get("client.id").unwrap().output);
        assert!(map.get("client.id").unwrap().is_output());
    }

    #[test]
    fn dependency_in_null_group() {
        let mut props: Vec<Prop> = prop_map().iter().map(|(_, prop)| prop.clone()).collect();
        props[6] = Prop::computed("groupName", |_| json!(""))
            .depends_on(["client.name"])
            .build()
            .unwrap();
        let map = prop_list_to_prop_map(props).unwrap();

        let selection = field_prop_map(&["groupName"], &map).unwrap();
        assert_eq!(names(&selection), ["groupName", "client.name"]);
        assert!(selection.get("groupName").unwrap().output);
        assert!(!selection.get("client.name").unwrap().output);
    }

    #[test]
    fn invalid_fields() {
        let map = prop_map();

        let Err(Error::BadRequest { description, .. }) = field_prop_map(&["group.test"], &map)
        else {
            panic!("expected bad request");
        };
        assert_eq!(description, "'group.test' is not a valid field");

        let Err(Error::BadRequest { description, .. }) = field_prop_map(&[" username"], &map)
        else {
            panic!("expected bad request");
        };
        assert_eq!(description, "' username' is not a valid field");
    }

    #[test]
    fn non_default_and_no_output_dependencies() {
        let map = prop_list_to_prop_map([
            Prop::new("username", "UserName").not_default().build().unwrap(),
            Prop::computed("client.id", |_| json!(""))
                .null_group()
                .depends_on(["username", "client.secret"])
                .build()
                .unwrap(),
            Prop::new("client.name", "Company").alias("ClientName").build().unwrap(),
            Prop::new("client.secret", "Secret").no_output().build().unwrap(),
        ])
        .unwrap();

        // client.id is only a discriminant here, so its own dependencies stay out
        let selection = field_prop_map(&["client.name"], &map).unwrap();
        assert_eq!(names(&selection), ["client.name", "client.id"]);
        assert!(selection.get("client.name").unwrap().output);
        assert!(!selection.get("client.id").unwrap().output);

        let selection = field_prop_map::<&str>(&[], &map).unwrap();
        assert_eq!(names(&selection), ["client.id", "client.name", "client.secret", "username"]);
        assert!(selection.get("client.id").unwrap().output);
        assert!(selection.get("client.name").unwrap().output);
        assert!(!selection.get("client.secret").unwrap().output);
        assert!(!selection.get("username").unwrap().output);
    }

    #[test]
    fn alias_map_keys() {
        let map = prop_map();
        let selection = field_prop_map(&["client"], &map).unwrap();
        let alias_map = selection.alias_map();
        assert_eq!(
            alias_map.keys().copied().collect::<Vec<_>>(),
            ["ClientID", "ClientName", "isDisabled"]
        );
    }
}
