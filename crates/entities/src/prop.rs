//! Property descriptors.
//!
//! A [`Prop`] describes how one dotted output property (`client.type.id`) is
//! read from a SQL result row: which column it comes from, under what alias
//! it is selected, how its raw value is coerced, and whether it takes part in
//! default selection or null grouping.

use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use chrono::FixedOffset;
use serde_json::Value;

use crate::error::Result;
use crate::types::Row;

/// Computes a property value from the whole result row.
pub type ValueGetter = Arc<dyn Fn(&Row) -> Value + Send + Sync>;

/// Scalar type a raw column value is coerced to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropType {
    /// JSON boolean.
    Bool,
    /// JSON integer.
    Int,
    /// JSON float.
    Float,
    /// JSON string.
    String,
}

impl FromStr for PropType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bool" => Ok(Self::Bool),
            "int" => Ok(Self::Int),
            "float" => Ok(Self::Float),
            "string" => Ok(Self::String),
            _ => Err(config_error!("type must be bool, int, float, or string, found '{s}'")),
        }
    }
}

/// Time zone used to render timestamp text as ISO-8601.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZone {
    /// No formatting; the raw value passes through.
    #[default]
    Unset,
    /// Render in UTC.
    Utc,
    /// Render with a fixed offset.
    Fixed(FixedOffset),
}

impl TimeZone {
    /// Returns `true` when the property should be formatted as a timestamp.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        !matches!(self, Self::Unset)
    }
}

/// An immutable, validated property descriptor.
///
/// Construct with [`Prop::new`] or [`Prop::computed`] and finish with
/// [`PropBuilder::build`].
#[derive(Clone)]
pub struct Prop {
    name: String,
    map: Vec<String>,
    parents: Vec<String>,
    col: String,
    alias: String,
    kind: Option<PropType>,
    time_zone: TimeZone,
    get_value: Option<ValueGetter>,
    depends_on: Vec<String>,
    null_group: bool,
    is_default: bool,
    output: bool,
}

impl Prop {
    /// Starts a property read from column expression `col`.
    #[allow(clippy::new_ret_no_self)]
    pub fn new(name: impl Into<String>, col: impl Into<String>) -> PropBuilder {
        PropBuilder {
            name: name.into(),
            col: col.into(),
            ..PropBuilder::default()
        }
    }

    /// Starts a property computed from the whole row by `getter`.
    pub fn computed(
        name: impl Into<String>, getter: impl Fn(&Row) -> Value + Send + Sync + 'static,
    ) -> PropBuilder {
        PropBuilder {
            name: name.into(),
            get_value: Some(Arc::new(getter)),
            ..PropBuilder::default()
        }
    }

    /// Dotted property name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name split on `.`.
    #[must_use]
    pub fn map(&self) -> &[String] {
        &self.map
    }

    /// Number of path segments.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.map.len()
    }

    /// Ancestor prefixes, outermost first, each ending in `.`: `client.type.id`
    /// has parents `client.` and `client.type.`.
    #[must_use]
    pub fn parents(&self) -> &[String] {
        &self.parents
    }

    /// Dotted name of the containing object, empty for top-level properties.
    #[must_use]
    pub fn parent(&self) -> &str {
        self.parents.last().map_or("", |parent| parent.trim_end_matches('.'))
    }

    /// Column expression, blank for computed properties without a column of
    /// their own.
    #[must_use]
    pub fn col(&self) -> &str {
        &self.col
    }

    /// Select alias, blank when the column is selected under its own name.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Name of the column in the result row: the alias if set, else the
    /// last dot-segment of the column expression, else the property name.
    #[must_use]
    pub fn output_col(&self) -> &str {
        if !self.alias.is_empty() {
            return &self.alias;
        }
        if self.col.is_empty() {
            return &self.name;
        }
        self.col.rsplit('.').next().unwrap_or(&self.col)
    }

    /// Coercion type, if any.
    #[must_use]
    pub const fn kind(&self) -> Option<PropType> {
        self.kind
    }

    /// Timestamp formatting zone.
    #[must_use]
    pub const fn time_zone(&self) -> TimeZone {
        self.time_zone
    }

    /// Value getter for computed properties.
    #[must_use]
    pub const fn get_value(&self) -> Option<&ValueGetter> {
        self.get_value.as_ref()
    }

    /// Names of the properties a computed property reads from the row.
    #[must_use]
    pub fn depends_on(&self) -> &[String] {
        &self.depends_on
    }

    /// Whether a `null` value nulls the whole containing object.
    #[must_use]
    pub const fn is_null_group(&self) -> bool {
        self.null_group
    }

    /// Whether the property is selected when no fields are requested.
    #[must_use]
    pub const fn is_default(&self) -> bool {
        self.is_default
    }

    /// Whether the property is written to output entities.
    #[must_use]
    pub const fn is_output(&self) -> bool {
        self.output
    }
}

impl Debug for Prop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prop")
            .field("name", &self.name)
            .field("col", &self.col)
            .field("alias", &self.alias)
            .field("kind", &self.kind)
            .field("time_zone", &self.time_zone)
            .field("get_value", &self.get_value.as_ref().map(|_| "Fn(&Row) -> Value"))
            .field("depends_on", &self.depends_on)
            .field("null_group", &self.null_group)
            .field("is_default", &self.is_default)
            .field("output", &self.output)
            .finish()
    }
}

impl PartialEq for Prop {
    fn eq(&self, other: &Self) -> bool {
        let same_getter = match (&self.get_value, &other.get_value) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_getter
            && self.name == other.name
            && self.col == other.col
            && self.alias == other.alias
            && self.kind == other.kind
            && self.time_zone == other.time_zone
            && self.depends_on == other.depends_on
            && self.null_group == other.null_group
            && self.is_default == other.is_default
            && self.output == other.output
    }
}

/// Builder for [`Prop`]. Options are checked together in [`Self::build`].
pub struct PropBuilder {
    name: String,
    col: String,
    alias: String,
    kind: Option<PropType>,
    type_name: Option<String>,
    time_zone: TimeZone,
    get_value: Option<ValueGetter>,
    depends_on: Vec<String>,
    null_group: bool,
    is_default: bool,
    output: bool,
}

impl Default for PropBuilder {
    fn default() -> Self {
        Self {
            name: String::new(),
            col: String::new(),
            alias: String::new(),
            kind: None,
            type_name: None,
            time_zone: TimeZone::Unset,
            get_value: None,
            depends_on: Vec::new(),
            null_group: false,
            is_default: true,
            output: true,
        }
    }
}

impl PropBuilder {
    /// Select column expression `col` too. A computed property with a
    /// column reads it from the row like any other column.
    #[must_use]
    pub fn col(mut self, col: impl Into<String>) -> Self {
        self.col = col.into();
        self
    }

    /// Compute the value from the whole row with `getter`.
    #[must_use]
    pub fn get_value(mut self, getter: impl Fn(&Row) -> Value + Send + Sync + 'static) -> Self {
        self.get_value = Some(Arc::new(getter));
        self
    }

    /// Select the column under `alias`.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = alias.into();
        self
    }

    /// Coerce raw values to `kind`.
    #[must_use]
    pub const fn kind(mut self, kind: PropType) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Coerce raw values to the type named `type_name` (`bool`, `int`,
    /// `float` or `string`). The name is checked on [`Self::build`].
    #[must_use]
    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    /// Format timestamp text in `time_zone`.
    #[must_use]
    pub const fn time_zone(mut self, time_zone: TimeZone) -> Self {
        self.time_zone = time_zone;
        self
    }

    /// Names of the properties the value getter reads.
    #[must_use]
    pub fn depends_on<I, S>(mut self, props: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on = props.into_iter().map(Into::into).collect();
        self
    }

    /// A `null` value for this property nulls its whole containing object.
    #[must_use]
    pub const fn null_group(mut self) -> Self {
        self.null_group = true;
        self
    }

    /// Exclude the property from the default selection.
    #[must_use]
    pub const fn not_default(mut self) -> Self {
        self.is_default = false;
        self
    }

    /// Select the property for dependencies only; never write it to output.
    #[must_use]
    pub const fn no_output(mut self) -> Self {
        self.output = false;
        self
    }

    /// Validates the options and builds the property.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the options conflict: `nullGroup`
    /// on a top-level property, a blank column or `dependsOn` without a
    /// value getter, `type` or `timeZone` alongside a value getter, an
    /// unknown type name, or `timeZone` alongside `type`.
    pub fn build(self) -> Result<Prop> {
        let name = self.name;
        let map: Vec<String> = name.split('.').map(ToString::to_string).collect();

        if self.null_group && map.len() < 2 {
            return Err(config_error!("nullGroup cannot be set on top-level {name} property"));
        }

        let has_type = self.kind.is_some() || self.type_name.is_some();
        if self.get_value.is_none() {
            if self.col.is_empty() {
                return Err(config_error!(
                    "col cannot be blank on {name} property without getValue function"
                ));
            }
            if !self.depends_on.is_empty() {
                return Err(config_error!(
                    "dependsOn cannot be used on {name} property without getValue function"
                ));
            }
        } else {
            if has_type {
                return Err(config_error!(
                    "type cannot be set on {name} property along with getValue"
                ));
            }
            if self.time_zone.is_set() {
                return Err(config_error!(
                    "timeZone cannot be set on {name} property along with getValue"
                ));
            }
        }

        let kind = match (self.kind, self.type_name) {
            (Some(kind), _) => Some(kind),
            (None, Some(type_name)) => match type_name.parse::<PropType>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    return Err(config_error!(
                        "type for {name} property must be bool, int, float, or string"
                    ));
                }
            },
            (None, None) => None,
        };
        if kind.is_some() && self.time_zone.is_set() {
            return Err(config_error!("timeZone cannot be set on {name} property along with type"));
        }

        let mut parents = Vec::with_capacity(map.len().saturating_sub(1));
        let mut prefix = String::new();
        for segment in &map[..map.len() - 1] {
            prefix.push_str(segment);
            prefix.push('.');
            parents.push(prefix.clone());
        }

        Ok(Prop {
            name,
            map,
            parents,
            col: self.col,
            alias: self.alias,
            kind,
            time_zone: self.time_zone,
            get_value: self.get_value,
            depends_on: self.depends_on,
            null_group: self.null_group,
            is_default: self.is_default,
            output: self.output,
        })
    }
}
