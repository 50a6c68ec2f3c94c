//! Select maps and property maps.
//!
//! A [`SelectMap`] is the shorthand, nested form of an entity's property to
//! column mapping. A [`PropMap`] is the flat, ordered form keyed by dotted
//! property name, with one [`Prop`] per leaf.

use indexmap::IndexMap;
use indexmap::map::Entry;
use serde_json::Value;

use crate::error::Result;
use crate::prop::Prop;

/// A node of a [`SelectMap`]: a column expression or a nested group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectNode {
    /// Leaf mapped to a column expression.
    Column(String),
    /// Nested object.
    Group(SelectMap),
}

/// Ordered, nested mapping from property names to column expressions.
///
/// Build with the [`select_map!`](crate::select_map) macro or by inserting
/// nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectMap(IndexMap<String, SelectNode>);

impl SelectMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a node, replacing any node with the same key in place.
    pub fn insert(&mut self, key: impl Into<String>, node: SelectNode) {
        self.0.insert(key.into(), node);
    }

    /// Adds a leaf column.
    #[must_use]
    pub fn column(mut self, key: impl Into<String>, col: impl Into<String>) -> Self {
        self.insert(key, SelectNode::Column(col.into()));
        self
    }

    /// Adds a nested group.
    #[must_use]
    pub fn group(mut self, key: impl Into<String>, group: Self) -> Self {
        self.insert(key, SelectNode::Group(group));
        self
    }

    /// Returns the node at `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&SelectNode> {
        self.0.get(key)
    }

    /// Removes the node at `key`, keeping the order of the rest.
    pub fn remove(&mut self, key: &str) -> Option<SelectNode> {
        self.0.shift_remove(key)
    }

    /// Iterates over the top-level nodes in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SelectNode)> {
        self.0.iter().map(|(key, node)| (key.as_str(), node))
    }

    /// Number of top-level nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the map has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dotted path of the first leaf, depth first.
    pub(crate) fn first_leaf(&self) -> Option<String> {
        self.0.iter().find_map(|(key, node)| match node {
            SelectNode::Column(_) => Some(key.clone()),
            SelectNode::Group(group) => group.first_leaf().map(|leaf| format!("{key}.{leaf}")),
        })
    }

    /// Builds a map from a JSON object whose leaves are column strings.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `value` is not an object or any leaf
    /// is neither a string nor an object.
    pub fn from_json(value: &Value) -> Result<Self> {
        let Value::Object(object) = value else {
            return Err(config_error!("Select map must be an object, found {}", json_type(value)));
        };
        Self::from_json_object(object, "")
    }

    fn from_json_object(object: &serde_json::Map<String, Value>, context: &str) -> Result<Self> {
        let mut map = Self::new();
        for (key, value) in object {
            let path = format!("{context}{key}");
            let node = match value {
                Value::String(col) => SelectNode::Column(col.clone()),
                Value::Object(inner) => {
                    SelectNode::Group(Self::from_json_object(inner, &format!("{path}."))?)
                }
                other => {
                    return Err(config_error!(
                        "Map values must be objects or strings, found {} for {path} property",
                        json_type(other)
                    ));
                }
            };
            map.insert(key.clone(), node);
        }
        Ok(map)
    }
}

impl<K: Into<String>> FromIterator<(K, SelectNode)> for SelectMap {
    fn from_iter<I: IntoIterator<Item = (K, SelectNode)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(key, node)| (key.into(), node)).collect())
    }
}

/// Ordered map of dotted property names to [`Prop`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropMap(IndexMap<String, Prop>);

impl PropMap {
    /// Returns the property named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Prop> {
        self.0.get(name)
    }

    /// Returns `true` if a property named `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    /// Iterates over the properties in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Prop)> {
        self.0.iter().map(|(name, prop)| (name.as_str(), prop))
    }

    /// Iterates over the property names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of properties.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` when the map has no properties.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Checks that every `dependsOn` entry names a property in the map.
    fn check_dependencies(&self) -> Result<()> {
        for prop in self.0.values() {
            for field in prop.depends_on() {
                if !self.0.contains_key(field) {
                    return Err(config_error!(
                        "Invalid dependsOn value '{field}' on {} property",
                        prop.name()
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Flattens a select map into a prop map, one plain [`Prop`] per leaf.
///
/// # Errors
///
/// Returns a configuration error if a leaf column is blank or two leaves
/// produce the same dotted name.
pub fn select_map_to_prop_map(map: &SelectMap) -> Result<PropMap> {
    let mut props = IndexMap::new();
    flatten(map, "", &mut props)?;
    Ok(PropMap(props))
}

fn flatten(map: &SelectMap, context: &str, props: &mut IndexMap<String, Prop>) -> Result<()> {
    for (key, node) in map.iter() {
        let name = format!("{context}{key}");
        match node {
            SelectNode::Column(col) => {
                let prop = Prop::new(name.clone(), col.clone()).build()?;
                if props.insert(name.clone(), prop).is_some() {
                    return Err(config_error!("Duplicate property {name}"));
                }
            }
            SelectNode::Group(group) => flatten(group, &format!("{name}."), props)?,
        }
    }
    Ok(())
}

/// Rebuilds the nested select map from a prop map. Computed properties with
/// a blank column are left out.
#[must_use]
pub fn prop_map_to_select_map(map: &PropMap) -> SelectMap {
    let mut select_map = SelectMap::new();
    for prop in map.0.values().filter(|prop| !prop.col().is_empty()) {
        insert_path(&mut select_map, prop.map(), prop.col());
    }
    select_map
}

fn insert_path(map: &mut SelectMap, path: &[String], col: &str) {
    match path {
        [] => {}
        [leaf] => map.insert(leaf.clone(), SelectNode::Column(col.to_string())),
        [head, rest @ ..] => {
            let node = map
                .0
                .entry(head.clone())
                .or_insert_with(|| SelectNode::Group(SelectMap::new()));
            if let SelectNode::Column(_) = node {
                *node = SelectNode::Group(SelectMap::new());
            }
            if let SelectNode::Group(group) = node {
                insert_path(group, rest, col);
            }
        }
    }
}

/// Indexes a list of explicit properties by name.
///
/// # Errors
///
/// Returns a configuration error for a duplicate name, a property depending
/// on itself, or a `dependsOn` entry naming no property in the list.
pub fn prop_list_to_prop_map(props: impl IntoIterator<Item = Prop>) -> Result<PropMap> {
    let mut map = IndexMap::new();
    for prop in props {
        if prop.depends_on().iter().any(|field| field == prop.name()) {
            return Err(config_error!("{} property cannot depend on itself", prop.name()));
        }
        match map.entry(prop.name().to_string()) {
            Entry::Occupied(entry) => {
                return Err(config_error!("Duplicate property {}", entry.key()));
            }
            Entry::Vacant(entry) => {
                entry.insert(prop);
            }
        }
    }

    let map = PropMap(map);
    map.check_dependencies()?;
    Ok(map)
}

/// Overlays explicit properties on a shorthand prop map. An explicit
/// property replaces the shorthand one of the same name in place; new ones
/// are appended.
///
/// # Errors
///
/// Returns a configuration error if a `dependsOn` entry of the merged map
/// names no property.
pub fn merge_prop_maps(shorthand: PropMap, explicit: PropMap) -> Result<PropMap> {
    let mut merged = shorthand.0;
    merged.extend(explicit.0);

    let merged = PropMap(merged);
    merged.check_dependencies()?;
    Ok(merged)
}

/// Builds the full prop map of an entity type: the shorthand select map
/// overlaid with the explicit properties.
///
/// # Errors
///
/// Returns any configuration error raised while building either map or the
/// merge.
pub fn build_prop_map(select_map: &SelectMap, props: Vec<Prop>) -> Result<PropMap> {
    let shorthand = select_map_to_prop_map(select_map)?;

    // explicit props may depend on shorthand ones, so dependencies are
    // checked on the merged map only
    let mut explicit = IndexMap::new();
    for prop in props {
        if prop.depends_on().iter().any(|field| field == prop.name()) {
            return Err(config_error!("{} property cannot depend on itself", prop.name()));
        }
        if explicit.contains_key(prop.name()) {
            return Err(config_error!("Duplicate property {}", prop.name()));
        }
        explicit.insert(prop.name().to_string(), prop);
    }

    let merged = merge_prop_maps(shorthand, PropMap(explicit))?;
    tracing::debug!(props = merged.len(), "built prop map");
    Ok(merged)
}

/// Indexes properties by the name of their column in the result row.
#[must_use]
pub fn prop_map_to_alias_map(map: &PropMap) -> IndexMap<&str, &Prop> {
    map.0.values().map(|prop| (prop.output_col(), prop)).collect()
}

/// Returns the type name used in client error messages.
pub(crate) fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) => {
            if n.is_f64() {
                "float"
            } else {
                "int"
            }
        }
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
