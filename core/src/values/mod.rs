//! Runtime value model
//!
//! Values are a tagged enum. Scalars are held inline, reference types
//! (arrays, maps, records) are shared through `Arc` so that copying a value
//! into another register aliases the same collection. Collections expose
//! iteration through the [`Collection`] capability.

pub mod array;
pub mod iterator;
pub mod map;
pub mod range;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

pub use array::{
    grown_capacity, ArrayElement, ArrayIterator, ArrayRef, ArrayValue, ElementKind,
    GrowableArray, DEFAULT_ARRAY_SIZE, MAX_ARRAY_SIZE,
};
pub use iterator::{Arity, Collection, ValueIterator};
pub use map::{MapIterator, MapRef};
pub use range::{IntRange, IntRangeIterator};

/// Shared immutable byte payload
pub type Blob = Arc<[u8]>;

/// Collections already being rendered, by identity
pub(crate) type Visited = Vec<usize>;

/// Copies made so far, keyed by the identity of their original
pub(crate) type Copies = HashMap<usize, Value>;

/// Identity of a shared collection
pub(crate) fn identity<T>(shared: &Arc<T>) -> usize {
    Arc::as_ptr(shared) as *const () as usize
}

/* ===================== Value ===================== */

/// Runtime value type
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Blob(Blob),
    Array(ArrayRef),
    Map(MapRef),
    Range(IntRange),
    Struct(StructRef),
    /// Error value carrying a message
    Error(Arc<ErrorValue>),
}

/// Type tag reported by [`Value::type_tag`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeTag {
    Null,
    Int,
    Float,
    Boolean,
    String,
    Blob,
    Array(ElementKind),
    Map,
    Range,
    Struct,
    Error,
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Null => write!(f, "null"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Boolean => write!(f, "boolean"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Blob => write!(f, "blob"),
            TypeTag::Array(kind) => write!(f, "{}[]", kind),
            TypeTag::Map => write!(f, "map"),
            TypeTag::Range => write!(f, "range"),
            TypeTag::Struct => write!(f, "struct"),
            TypeTag::Error => write!(f, "error"),
        }
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Value::Error(Arc::new(ErrorValue::new(message)))
    }

    pub fn type_tag(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Null,
            Value::Int(_) => TypeTag::Int,
            Value::Float(_) => TypeTag::Float,
            Value::Bool(_) => TypeTag::Boolean,
            Value::Str(_) => TypeTag::String,
            Value::Blob(_) => TypeTag::Blob,
            Value::Array(array) => TypeTag::Array(array.element_kind()),
            Value::Map(_) => TypeTag::Map,
            Value::Range(_) => TypeTag::Range,
            Value::Struct(_) => TypeTag::Struct,
            Value::Error(_) => TypeTag::Error,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Render the value the way the language's string conversion does.
    ///
    /// A collection that contains itself renders the inner occurrence as
    /// `[...]` or `{...}`.
    pub fn string_value(&self) -> String {
        self.render(&mut Visited::new())
    }

    pub(crate) fn render(&self, visited: &mut Visited) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
            Value::Blob(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            Value::Array(array) => array.render(visited),
            Value::Map(map) => map.render(visited),
            Value::Range(range) => range.to_string(),
            Value::Struct(record) => record.render(visited),
            Value::Error(err) => err.to_string(),
        }
    }

    /// Copy the value.
    ///
    /// Arrays, maps and records are copied deeply into fresh storage. Every
    /// other variant is immutable, so the copy shares the original. Sharing
    /// and cycles inside the original are reproduced in the copy.
    pub fn copy(&self) -> Value {
        self.copy_with(&mut Copies::new())
    }

    pub(crate) fn copy_with(&self, copies: &mut Copies) -> Value {
        match self {
            Value::Array(array) => Value::Array(array.deep_copy(copies)),
            Value::Map(map) => Value::Map(map.deep_copy(copies)),
            Value::Struct(record) => Value::Struct(record.deep_copy(copies)),
            other => other.clone(),
        }
    }

    /// The collection capability, for variants that have one
    pub fn as_collection(&self) -> Option<&dyn Collection> {
        match self {
            Value::Array(array) => Some(array),
            Value::Map(map) => Some(map),
            Value::Range(range) => Some(range),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/* ===================== Records ===================== */

/// Structured record value with named fields
#[derive(Debug, Clone, PartialEq)]
pub struct StructValue {
    pub type_name: String,
    pub fields: IndexMap<String, Value>,
}

/// Shared handle to a record
#[derive(Debug, Clone)]
pub struct StructRef(Arc<RwLock<StructValue>>);

impl StructRef {
    pub fn new(type_name: impl Into<String>) -> Self {
        StructRef(Arc::new(RwLock::new(StructValue {
            type_name: type_name.into(),
            fields: IndexMap::new(),
        })))
    }

    pub fn type_name(&self) -> String {
        self.0.read().type_name.clone()
    }

    /// Missing fields read as null
    pub fn get_field(&self, name: &str) -> Value {
        self.0.read().fields.get(name).cloned().unwrap_or_default()
    }

    pub fn set_field(&self, name: impl Into<String>, value: Value) {
        self.0.write().fields.insert(name.into(), value);
    }

    fn deep_copy(&self, copies: &mut Copies) -> StructRef {
        let id = identity(&self.0);
        if let Some(Value::Struct(done)) = copies.get(&id) {
            return done.clone();
        }
        let (type_name, fields) = {
            let inner = self.0.read();
            (inner.type_name.clone(), inner.fields.clone())
        };
        let copy = StructRef::new(type_name);
        copies.insert(id, Value::Struct(copy.clone()));
        for (name, value) in fields {
            let value = value.copy_with(copies);
            copy.set_field(name, value);
        }
        copy
    }

    fn render(&self, visited: &mut Visited) -> String {
        let id = identity(&self.0);
        if visited.contains(&id) {
            return "{...}".to_string();
        }
        let fields = self.0.read().fields.clone();
        visited.push(id);
        let fields: Vec<String> = fields
            .iter()
            .map(|(k, v)| format!("{}:{}", k, v.render(visited)))
            .collect();
        visited.pop();
        format!("{{{}}}", fields.join(", "))
    }
}

/// Records compare by identity
impl PartialEq for StructRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/* ===================== Errors ===================== */

/// Language-level error value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorValue {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<Box<ErrorValue>>,
}

impl ErrorValue {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(mut self, cause: ErrorValue) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }
}

impl fmt::Display for ErrorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {}", self.message)?;
        if let Some(cause) = &self.cause {
            write!(f, " (caused by {})", cause.message)?;
        }
        Ok(())
    }
}
