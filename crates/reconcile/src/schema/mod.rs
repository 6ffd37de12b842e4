//! Typed property schemas
//!
//! A [`Schema`] is a tree of [`Field`]s. Each field maps a raw configuration
//! key to a node:
//!
//! - `Leaf` - a scalar (string, enum, boolean, integer)
//! - `Group` - named children; flattened into the parent unless it has an API name
//! - `Repeated` - an array, one group per item
//! - `Multiplex` - an array whose items are dispatched to one of several
//!   variants by which discriminating key they carry; every variant writes
//!   its own API property
//!
//! Parsing a raw object yields a [`NormalizedSet`] keyed by management-API
//! property name. Fields without an API name are validated but stay local.

pub mod catalog;

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;

pub use catalog::{database_schema, server_schema};

/// Owning entity kind of a property set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EntityKind {
    Database,
    Server,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Database => write!(f, "database"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// A typed, validated property value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropValue {
    String(String),
    Integer(i64),
    Boolean(bool),
    Object(BTreeMap<String, PropValue>),
    Array(Vec<PropValue>),
}

impl PropValue {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// JSON form, as sent to the management API
    pub fn to_json(&self) -> Value {
        match self {
            Self::String(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Object(m) => {
                Value::Object(m.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
            }
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Structural comparison against a live JSON value
    ///
    /// Scalars compare across representations (`8000` and `"8000"`). Arrays
    /// compare as multisets; an absent live array equals an empty one.
    pub fn matches(&self, live: Option<&Value>) -> bool {
        match (self, live) {
            (Self::Array(items), None | Some(Value::Null)) => items.is_empty(),
            (_, None) => false,
            (Self::String(s), Some(Value::String(l))) => s == l,
            (Self::String(s), Some(Value::Number(n))) => *s == n.to_string(),
            (Self::String(s), Some(Value::Bool(b))) => *s == b.to_string(),
            (Self::Integer(i), Some(Value::Number(n))) => n.as_i64() == Some(*i),
            (Self::Integer(i), Some(Value::String(l))) => l.parse::<i64>().ok() == Some(*i),
            (Self::Boolean(b), Some(Value::Bool(l))) => b == l,
            (Self::Boolean(b), Some(Value::String(l))) => parse_bool_str(l) == Some(*b),
            (Self::Object(m), Some(Value::Object(l))) => {
                m.len() == l.len()
                    && m.iter().all(|(k, v)| l.contains_key(k) && v.matches(l.get(k)))
            }
            (Self::Array(items), Some(Value::Array(l))) => same_multiset(items, l),
            _ => false,
        }
    }
}

impl fmt::Display for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

/// One-to-one matching of desired items against live items
fn same_multiset(desired: &[PropValue], live: &[Value]) -> bool {
    if desired.len() != live.len() {
        return false;
    }
    let mut used = vec![false; live.len()];
    desired.iter().all(|d| {
        let found = live
            .iter()
            .enumerate()
            .find(|(i, l)| !used[*i] && d.matches(Some(l)))
            .map(|(i, _)| i);
        match found {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

fn parse_bool_str(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Scalar leaf types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeafKind {
    String,
    Enum(&'static [&'static str]),
    Boolean,
    Integer,
}

impl LeafKind {
    fn parse(self, raw: &Value, entity: &str, path: &str) -> Result<PropValue> {
        match self {
            Self::String => match raw {
                Value::String(s) => Ok(PropValue::String(s.clone())),
                _ => Err(Error::InvalidPropertyShape {
                    entity: entity.to_string(),
                    path: path.to_string(),
                    expected: "a string",
                }),
            },
            Self::Enum(allowed) => match raw {
                Value::String(s) if allowed.contains(&s.as_str()) => {
                    Ok(PropValue::String(s.clone()))
                }
                other => Err(Error::InvalidEnumValue {
                    entity: entity.to_string(),
                    path: path.to_string(),
                    value: other.as_str().map_or_else(|| other.to_string(), str::to_string),
                    allowed: allowed.iter().map(|a| (*a).to_string()).collect(),
                }),
            },
            Self::Boolean => {
                let parsed = match raw {
                    Value::Bool(b) => Some(*b),
                    Value::String(s) => parse_bool_str(s),
                    _ => None,
                };
                parsed.map(PropValue::Boolean).ok_or_else(|| Error::InvalidBooleanValue {
                    entity: entity.to_string(),
                    path: path.to_string(),
                    value: raw.to_string(),
                })
            }
            Self::Integer => {
                let parsed = match raw {
                    Value::Number(n) => n.as_u64().and_then(|u| i64::try_from(u).ok()),
                    Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                        s.parse().ok()
                    }
                    _ => None,
                };
                parsed.map(PropValue::Integer).ok_or_else(|| Error::InvalidIntegerValue {
                    entity: entity.to_string(),
                    path: path.to_string(),
                    value: raw.to_string(),
                })
            }
        }
    }
}

/// Values parsed so far in a group, by raw key
pub type Siblings = BTreeMap<&'static str, PropValue>;

/// Default applied when a key is absent from the raw input
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Literal(PropValue),
    /// Computed from already-parsed siblings; `None` leaves the key unset
    Derived(fn(&Siblings) -> Option<PropValue>),
}

/// One variant of a multiplexed array
#[derive(Debug, Clone)]
pub struct Variant {
    /// Raw key whose presence selects this variant
    pub discriminator: &'static str,
    /// API property collecting the items of this variant
    pub api: &'static str,
    pub fields: Vec<Field>,
}

impl Variant {
    pub fn new(discriminator: &'static str, api: &'static str, fields: Vec<Field>) -> Self {
        Self {
            discriminator,
            api,
            fields,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(LeafKind),
    Group(Vec<Field>),
    Repeated(Vec<Field>),
    Multiplex(Vec<Variant>),
}

/// A named schema node with its requirement and API mapping
#[derive(Debug, Clone)]
pub struct Field {
    pub key: &'static str,
    pub api: Option<&'static str>,
    pub node: Node,
    pub mandatory: bool,
    pub default: Option<DefaultValue>,
    pub frozen: bool,
}

impl Field {
    fn new(key: &'static str, node: Node) -> Self {
        Self {
            key,
            api: None,
            node,
            mandatory: false,
            default: None,
            frozen: false,
        }
    }

    pub fn string(key: &'static str) -> Self {
        Self::new(key, Node::Leaf(LeafKind::String))
    }

    pub fn enumeration(key: &'static str, values: &'static [&'static str]) -> Self {
        Self::new(key, Node::Leaf(LeafKind::Enum(values)))
    }

    pub fn boolean(key: &'static str) -> Self {
        Self::new(key, Node::Leaf(LeafKind::Boolean))
    }

    pub fn integer(key: &'static str) -> Self {
        Self::new(key, Node::Leaf(LeafKind::Integer))
    }

    pub fn group(key: &'static str, fields: Vec<Field>) -> Self {
        Self::new(key, Node::Group(fields))
    }

    pub fn repeated(key: &'static str, fields: Vec<Field>) -> Self {
        Self::new(key, Node::Repeated(fields))
    }

    pub fn multiplex(key: &'static str, variants: Vec<Variant>) -> Self {
        Self::new(key, Node::Multiplex(variants))
    }

    pub fn api(mut self, name: &'static str) -> Self {
        self.api = Some(name);
        self
    }

    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    pub fn frozen(mut self) -> Self {
        self.frozen = true;
        self
    }

    pub fn default_value(mut self, value: PropValue) -> Self {
        self.default = Some(DefaultValue::Literal(value));
        self
    }

    pub fn derived(mut self, f: fn(&Siblings) -> Option<PropValue>) -> Self {
        self.default = Some(DefaultValue::Derived(f));
        self
    }
}

/// Where a property value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Origin {
    Explicit,
    Default,
}

/// A normalized property with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub value: PropValue,
    pub frozen: bool,
    pub origin: Origin,
}

/// Validated properties of one entity, by API name, in schema order
#[derive(Debug, Clone)]
pub struct NormalizedSet {
    kind: EntityKind,
    entity: String,
    props: Vec<(String, Property)>,
}

impl NormalizedSet {
    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Name of the owning entity
    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn get(&self, name: &str) -> Option<&Property> {
        self.props.iter().find(|(k, _)| k == name).map(|(_, p)| p)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|p| p.value.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Property)> {
        self.props.iter().map(|(k, p)| (k.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.props.len()
    }

    pub fn is_empty(&self) -> bool {
        self.props.is_empty()
    }

    /// Every property as one JSON payload
    pub fn to_payload(&self) -> Map<String, Value> {
        self.props
            .iter()
            .map(|(k, p)| (k.clone(), p.value.to_json()))
            .collect()
    }
}

type Entries = Vec<(String, Property)>;

/// A validated schema for one entity kind
#[derive(Debug, Clone)]
pub struct Schema {
    kind: EntityKind,
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, checking its definition
    pub fn new(kind: EntityKind, fields: Vec<Field>) -> Result<Self> {
        check_fields(&fields, kind.to_string().as_str())?;
        Ok(Self { kind, fields })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Parse a raw object into a normalized property set
    ///
    /// `entity` names the owner in error messages and in the result.
    pub fn parse(&self, entity: &str, raw: &Map<String, Value>) -> Result<NormalizedSet> {
        let label = format!("{} {entity}", self.kind);
        let props = parse_fields(&self.fields, raw, &label, "")?;
        Ok(NormalizedSet {
            kind: self.kind,
            entity: entity.to_string(),
            props,
        })
    }
}

fn check_fields(fields: &[Field], path: &str) -> Result<()> {
    let mut keys = HashSet::new();
    for field in fields {
        let here = join(path, field.key);
        if !keys.insert(field.key) {
            return Err(Error::InvalidSchema(format!("{here} is defined twice")));
        }
        if field.mandatory && field.default.is_some() {
            return Err(Error::InvalidSchema(format!(
                "{here} cannot be both mandatory and defaulted"
            )));
        }
        match &field.node {
            Node::Leaf(_) => {}
            Node::Group(children) => {
                if field.default.is_some() {
                    return Err(Error::InvalidSchema(format!("group {here} cannot have a default")));
                }
                check_fields(children, &here)?;
            }
            Node::Repeated(children) => {
                if field.api.is_none() || field.default.is_some() {
                    return Err(Error::InvalidSchema(format!(
                        "repeated {here} needs an API name and no default"
                    )));
                }
                check_fields(children, &here)?;
            }
            Node::Multiplex(variants) => {
                if field.api.is_some() || field.default.is_some() || variants.is_empty() {
                    return Err(Error::InvalidSchema(format!(
                        "multiplexed {here} takes its API names from its variants \
                         and has no default"
                    )));
                }
                for variant in variants {
                    if !variant.fields.iter().any(|f| f.key == variant.discriminator) {
                        return Err(Error::InvalidSchema(format!(
                            "variant {} of {here} does not define its discriminator",
                            variant.api
                        )));
                    }
                    check_fields(&variant.fields, &here)?;
                }
            }
        }
    }
    Ok(())
}

fn join(path: &str, key: &str) -> String {
    if path.is_empty() {
        key.to_string()
    } else {
        format!("{path}.{key}")
    }
}

/// Parse a group: explicit values first, then defaults in field order
fn parse_fields(
    fields: &[Field],
    raw: &Map<String, Value>,
    entity: &str,
    path: &str,
) -> Result<Entries> {
    if let Some(unknown) = raw.keys().find(|k| !fields.iter().any(|f| f.key == k.as_str())) {
        return Err(Error::UnknownProperty {
            entity: entity.to_string(),
            path: join(path, unknown),
        });
    }

    let mut siblings = Siblings::new();
    let mut explicit: Vec<Option<Entries>> = Vec::with_capacity(fields.len());
    for field in fields {
        match raw.get(field.key) {
            Some(value) => {
                let (leaf, entries) = parse_field(field, value, entity, &join(path, field.key))?;
                if let Some(leaf) = leaf {
                    siblings.insert(field.key, leaf);
                }
                explicit.push(Some(entries));
            }
            None => explicit.push(None),
        }
    }

    let mut out = Entries::new();
    for (field, parsed) in fields.iter().zip(explicit) {
        if let Some(entries) = parsed {
            out.extend(entries);
            continue;
        }

        let value = match &field.default {
            Some(DefaultValue::Literal(v)) => Some(v.clone()),
            Some(DefaultValue::Derived(f)) => f(&siblings),
            None => None,
        };
        match value {
            Some(value) => {
                if let Some(api) = field.api {
                    out.push((
                        api.to_string(),
                        Property {
                            value: value.clone(),
                            frozen: field.frozen,
                            origin: Origin::Default,
                        },
                    ));
                }
                siblings.insert(field.key, value);
            }
            None if field.mandatory => {
                return Err(Error::MissingMandatoryProperty {
                    entity: entity.to_string(),
                    path: join(path, field.key),
                });
            }
            None => {}
        }
    }
    Ok(out)
}

/// Parse one explicit value; returns the leaf value (for siblings) and the
/// entries it contributes
fn parse_field(
    field: &Field,
    raw: &Value,
    entity: &str,
    path: &str,
) -> Result<(Option<PropValue>, Entries)> {
    let explicit = |value: PropValue| Property {
        value,
        frozen: field.frozen,
        origin: Origin::Explicit,
    };

    match &field.node {
        Node::Leaf(kind) => {
            let value = kind.parse(raw, entity, path)?;
            let entries = field
                .api
                .map(|api| vec![(api.to_string(), explicit(value.clone()))])
                .unwrap_or_default();
            Ok((Some(value), entries))
        }
        Node::Group(children) => {
            let obj = expect_object(raw, entity, path)?;
            let entries = parse_fields(children, obj, entity, path)?;
            let entries = match field.api {
                Some(api) => vec![(api.to_string(), explicit(to_object(entries)))],
                None => entries
                    .into_iter()
                    .map(|(k, mut p)| {
                        p.frozen |= field.frozen;
                        (k, p)
                    })
                    .collect(),
            };
            Ok((None, entries))
        }
        Node::Repeated(children) => {
            let items = expect_array(raw, entity, path)?;
            let mut parsed = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let obj = expect_object(item, entity, &item_path)?;
                parsed.push(to_object(parse_fields(children, obj, entity, &item_path)?));
            }
            let api = field.api.unwrap_or(field.key);
            Ok((None, vec![(api.to_string(), explicit(PropValue::Array(parsed)))]))
        }
        Node::Multiplex(variants) => {
            let items = expect_array(raw, entity, path)?;
            let mut buckets: Vec<Vec<PropValue>> = vec![Vec::new(); variants.len()];
            for (i, item) in items.iter().enumerate() {
                let item_path = format!("{path}[{i}]");
                let obj = expect_object(item, entity, &item_path)?;
                let Some(index) = variants
                    .iter()
                    .position(|v| obj.contains_key(v.discriminator))
                else {
                    return Err(Error::UnmatchedVariant {
                        entity: entity.to_string(),
                        path: item_path,
                        expected: variants.iter().map(|v| v.discriminator.to_string()).collect(),
                    });
                };
                let entries = parse_fields(&variants[index].fields, obj, entity, &item_path)?;
                buckets[index].push(to_object(entries));
            }
            let entries = variants
                .iter()
                .zip(buckets)
                .map(|(v, items)| (v.api.to_string(), explicit(PropValue::Array(items))))
                .collect();
            Ok((None, entries))
        }
    }
}

fn to_object(entries: Entries) -> PropValue {
    PropValue::Object(entries.into_iter().map(|(k, p)| (k, p.value)).collect())
}

fn expect_object<'a>(raw: &'a Value, entity: &str, path: &str) -> Result<&'a Map<String, Value>> {
    raw.as_object().ok_or_else(|| Error::InvalidPropertyShape {
        entity: entity.to_string(),
        path: path.to_string(),
        expected: "an object",
    })
}

fn expect_array<'a>(raw: &'a Value, entity: &str, path: &str) -> Result<&'a Vec<Value>> {
    raw.as_array().ok_or_else(|| Error::InvalidPropertyShape {
        entity: entity.to_string(),
        path: path.to_string(),
        expected: "an array",
    })
}
