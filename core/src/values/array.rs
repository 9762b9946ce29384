//! Growable arrays
//!
//! Every array kind shares one growth and bounds-checking implementation,
//! [`GrowableArray`], parameterised over its element representation. Primitive
//! kinds keep unboxed backing storage; reference arrays store [`Value`]s.

use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::trace;

use super::iterator::{Arity, Collection, ValueIterator};
use super::{identity, Copies, Value, Visited};
use crate::errors::{ArrayError, IteratorError};

/// Largest backing storage an array may allocate (host array ceiling)
pub const MAX_ARRAY_SIZE: usize = i32::MAX as usize - 8;

/// Capacity of an array created without an explicit length
pub const DEFAULT_ARRAY_SIZE: usize = 100;

/// Element representation of an array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementKind {
    Int,
    Float,
    String,
    Boolean,
    Blob,
    Ref,
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElementKind::Int => "int",
            ElementKind::Float => "float",
            ElementKind::String => "string",
            ElementKind::Boolean => "boolean",
            ElementKind::Blob => "blob",
            ElementKind::Ref => "any",
        };
        f.write_str(name)
    }
}

impl ElementKind {
    /// Whether an array of this kind can store `value`
    pub fn accepts(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ElementKind::Ref, _)
                | (ElementKind::Int, Value::Int(_))
                | (ElementKind::Float, Value::Float(_))
                | (ElementKind::String, Value::Str(_))
                | (ElementKind::Boolean, Value::Bool(_))
                | (ElementKind::Blob, Value::Blob(_))
        )
    }
}

/* ===================== Element Kinds ===================== */

/// Backing-storage element of a [`GrowableArray`]
pub trait ArrayElement: Clone + Default + fmt::Debug + Send + Sync + 'static {
    const KIND: ElementKind;

    fn into_value(self) -> Value;

    fn from_value(value: Value) -> Result<Self, ArrayError>;

    fn render(&self) -> String {
        self.clone().into_value().string_value()
    }
}

fn element_mismatch(kind: ElementKind, value: &Value) -> ArrayError {
    ArrayError::ElementType {
        expected: kind,
        found: value.type_tag(),
    }
}

impl ArrayElement for i64 {
    const KIND: ElementKind = ElementKind::Int;

    fn into_value(self) -> Value {
        Value::Int(self)
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        match value {
            Value::Int(i) => Ok(i),
            other => Err(element_mismatch(Self::KIND, &other)),
        }
    }
}

impl ArrayElement for f64 {
    const KIND: ElementKind = ElementKind::Float;

    fn into_value(self) -> Value {
        Value::Float(self)
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        match value {
            Value::Float(f) => Ok(f),
            other => Err(element_mismatch(Self::KIND, &other)),
        }
    }
}

impl ArrayElement for String {
    const KIND: ElementKind = ElementKind::String;

    fn into_value(self) -> Value {
        Value::Str(self)
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        match value {
            Value::Str(s) => Ok(s),
            other => Err(element_mismatch(Self::KIND, &other)),
        }
    }

    fn render(&self) -> String {
        format!("\"{}\"", self)
    }
}

impl ArrayElement for bool {
    const KIND: ElementKind = ElementKind::Boolean;

    fn into_value(self) -> Value {
        Value::Bool(self)
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        match value {
            Value::Bool(b) => Ok(b),
            other => Err(element_mismatch(Self::KIND, &other)),
        }
    }
}

impl ArrayElement for Vec<u8> {
    const KIND: ElementKind = ElementKind::Blob;

    fn into_value(self) -> Value {
        Value::Blob(self.into())
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        match value {
            Value::Blob(bytes) => Ok(bytes.to_vec()),
            other => Err(element_mismatch(Self::KIND, &other)),
        }
    }
}

impl ArrayElement for Value {
    const KIND: ElementKind = ElementKind::Ref;

    fn into_value(self) -> Value {
        self
    }

    fn from_value(value: Value) -> Result<Self, ArrayError> {
        Ok(value)
    }
}

/* ===================== Growth & Bounds ===================== */

/// Capacity to grow to when `requested` slots are needed.
///
/// Grows by 1.5x, never below `requested`, never above [`MAX_ARRAY_SIZE`].
pub fn grown_capacity(current: usize, requested: usize) -> usize {
    let grown = current.saturating_add(current >> 1);
    grown.max(requested).min(MAX_ARRAY_SIZE)
}

/// Validate an index for writing. Too-large is checked before negative.
fn range_check(index: i64, size: usize) -> Result<usize, ArrayError> {
    if index > MAX_ARRAY_SIZE as i64 || index < i64::from(i32::MIN) {
        return Err(ArrayError::IndexTooLarge { index });
    }
    if index < 0 {
        return Err(ArrayError::IndexOutOfRange { index, size });
    }
    Ok(index as usize)
}

fn range_check_for_get(index: i64, size: usize) -> Result<usize, ArrayError> {
    let idx = range_check(index, size)?;
    if idx >= size {
        return Err(ArrayError::IndexOutOfRange { index, size });
    }
    Ok(idx)
}

/// Array with amortized growth over a typed backing store.
///
/// Invariant: `size <= capacity <= MAX_ARRAY_SIZE`. Slots between `size` and
/// `capacity` hold the element default.
#[derive(Debug, Clone)]
pub struct GrowableArray<T: ArrayElement> {
    values: Vec<T>,
    size: usize,
}

impl<T: ArrayElement> GrowableArray<T> {
    pub fn new() -> Self {
        Self {
            values: vec![T::default(); DEFAULT_ARRAY_SIZE],
            size: 0,
        }
    }

    /// Array of `length` default elements
    pub fn with_length(length: i64) -> Result<Self, ArrayError> {
        let length = range_check(length, 0)?;
        Ok(Self {
            values: vec![T::default(); length],
            size: length,
        })
    }

    pub fn from_vec(values: Vec<T>) -> Result<Self, ArrayError> {
        if values.len() > MAX_ARRAY_SIZE {
            return Err(ArrayError::IndexTooLarge {
                index: values.len() as i64,
            });
        }
        let size = values.len();
        Ok(Self { values, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, index: i64) -> Result<T, ArrayError> {
        let idx = range_check_for_get(index, self.size)?;
        Ok(self.values[idx].clone())
    }

    /// Write `value` at `index`, growing storage and size as needed
    pub fn set(&mut self, index: i64, value: T) -> Result<(), ArrayError> {
        let idx = range_check(index, self.size)?;
        self.ensure_capacity(idx + 1)?;
        self.values[idx] = value;
        if idx >= self.size {
            self.size = idx + 1;
        }
        Ok(())
    }

    pub fn push(&mut self, value: T) -> Result<(), ArrayError> {
        self.set(self.size as i64, value)
    }

    /// Make room for at least `requested` elements
    pub fn ensure_capacity(&mut self, requested: usize) -> Result<(), ArrayError> {
        let capacity = self.capacity();
        if requested <= capacity {
            return Ok(());
        }
        if requested > MAX_ARRAY_SIZE {
            return Err(ArrayError::IndexTooLarge {
                index: requested as i64 - 1,
            });
        }
        let new_capacity = grown_capacity(capacity, requested);
        trace!(kind = %T::KIND, from = capacity, to = new_capacity, "growing array");
        self.values.resize(new_capacity, T::default());
        Ok(())
    }

    /// Elements `0..size`
    pub fn as_slice(&self) -> &[T] {
        &self.values[..self.size]
    }
}

impl<T: ArrayElement> Default for GrowableArray<T> {
    fn default() -> Self {
        Self::new()
    }
}

/* ===================== Array Values ===================== */

/// An array of any element kind
#[derive(Debug, Clone)]
pub enum ArrayValue {
    Int(GrowableArray<i64>),
    Float(GrowableArray<f64>),
    Str(GrowableArray<String>),
    Bool(GrowableArray<bool>),
    Blob(GrowableArray<Vec<u8>>),
    Ref(GrowableArray<Value>),
}

macro_rules! each_kind {
    ($self:expr, $arr:ident => $body:expr) => {
        match $self {
            ArrayValue::Int($arr) => $body,
            ArrayValue::Float($arr) => $body,
            ArrayValue::Str($arr) => $body,
            ArrayValue::Bool($arr) => $body,
            ArrayValue::Blob($arr) => $body,
            ArrayValue::Ref($arr) => $body,
        }
    };
}

impl ArrayValue {
    pub fn new(kind: ElementKind) -> Self {
        match kind {
            ElementKind::Int => ArrayValue::Int(GrowableArray::new()),
            ElementKind::Float => ArrayValue::Float(GrowableArray::new()),
            ElementKind::String => ArrayValue::Str(GrowableArray::new()),
            ElementKind::Boolean => ArrayValue::Bool(GrowableArray::new()),
            ElementKind::Blob => ArrayValue::Blob(GrowableArray::new()),
            ElementKind::Ref => ArrayValue::Ref(GrowableArray::new()),
        }
    }

    pub fn with_length(kind: ElementKind, length: i64) -> Result<Self, ArrayError> {
        Ok(match kind {
            ElementKind::Int => ArrayValue::Int(GrowableArray::with_length(length)?),
            ElementKind::Float => ArrayValue::Float(GrowableArray::with_length(length)?),
            ElementKind::String => ArrayValue::Str(GrowableArray::with_length(length)?),
            ElementKind::Boolean => ArrayValue::Bool(GrowableArray::with_length(length)?),
            ElementKind::Blob => ArrayValue::Blob(GrowableArray::with_length(length)?),
            ElementKind::Ref => ArrayValue::Ref(GrowableArray::with_length(length)?),
        })
    }

    pub fn kind(&self) -> ElementKind {
        match self {
            ArrayValue::Int(_) => ElementKind::Int,
            ArrayValue::Float(_) => ElementKind::Float,
            ArrayValue::Str(_) => ElementKind::String,
            ArrayValue::Bool(_) => ElementKind::Boolean,
            ArrayValue::Blob(_) => ElementKind::Blob,
            ArrayValue::Ref(_) => ElementKind::Ref,
        }
    }

    pub fn size(&self) -> usize {
        each_kind!(self, arr => arr.size())
    }

    pub fn capacity(&self) -> usize {
        each_kind!(self, arr => arr.capacity())
    }

    pub fn get(&self, index: i64) -> Result<Value, ArrayError> {
        each_kind!(self, arr => arr.get(index).map(ArrayElement::into_value))
    }

    pub fn set(&mut self, index: i64, value: Value) -> Result<(), ArrayError> {
        each_kind!(self, arr => arr.set(index, ArrayElement::from_value(value)?))
    }

    pub fn string_value(&self) -> String {
        self.render(&mut Visited::new())
    }

    fn render(&self, visited: &mut Visited) -> String {
        let items: Vec<String> = match self {
            ArrayValue::Ref(arr) => arr.as_slice().iter().map(|v| v.render(visited)).collect(),
            other => each_kind!(other, arr => arr.as_slice().iter().map(ArrayElement::render).collect()),
        };
        format!("[{}]", items.join(", "))
    }
}

/// Shared handle to an array value
#[derive(Debug, Clone)]
pub struct ArrayRef(Arc<RwLock<ArrayValue>>);

impl ArrayRef {
    pub fn new(kind: ElementKind) -> Self {
        ArrayRef::from_value(ArrayValue::new(kind))
    }

    pub fn with_length(kind: ElementKind, length: i64) -> Result<Self, ArrayError> {
        Ok(ArrayRef::from_value(ArrayValue::with_length(kind, length)?))
    }

    pub fn from_value(array: ArrayValue) -> Self {
        ArrayRef(Arc::new(RwLock::new(array)))
    }

    /// String array holding `items` in order
    pub fn from_strings<I, S>(items: I) -> Result<Self, ArrayError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = items.into_iter().map(Into::into).collect();
        Ok(ArrayRef::from_value(ArrayValue::Str(GrowableArray::from_vec(values)?)))
    }

    pub fn element_kind(&self) -> ElementKind {
        self.0.read().kind()
    }

    pub fn size(&self) -> usize {
        self.0.read().size()
    }

    pub fn capacity(&self) -> usize {
        self.0.read().capacity()
    }

    pub fn get(&self, index: i64) -> Result<Value, ArrayError> {
        self.0.read().get(index)
    }

    /// Write `value` at `index`.
    ///
    /// The element type is checked before the write lock is taken, since
    /// describing a rejected array value reads that array's own kind.
    pub fn set(&self, index: i64, value: Value) -> Result<(), ArrayError> {
        self.check_element(&value)?;
        self.0.write().set(index, value)
    }

    pub fn push(&self, value: Value) -> Result<(), ArrayError> {
        self.check_element(&value)?;
        let mut array = self.0.write();
        let next = array.size() as i64;
        array.set(next, value)
    }

    fn check_element(&self, value: &Value) -> Result<(), ArrayError> {
        let kind = self.element_kind();
        if kind.accepts(value) {
            return Ok(());
        }
        Err(element_mismatch(kind, value))
    }

    /// Elements `0..size` as values
    pub fn to_vec(&self) -> Vec<Value> {
        let array = self.0.read();
        each_kind!(&*array, arr => arr.as_slice().iter().cloned().map(ArrayElement::into_value).collect())
    }

    pub fn string_value(&self) -> String {
        self.render(&mut Visited::new())
    }

    pub(crate) fn render(&self, visited: &mut Visited) -> String {
        let id = identity(&self.0);
        if visited.contains(&id) {
            return "[...]".to_string();
        }
        let array = self.0.read().clone();
        visited.push(id);
        let rendered = array.render(visited);
        visited.pop();
        rendered
    }

    pub(crate) fn deep_copy(&self, copies: &mut Copies) -> ArrayRef {
        let id = identity(&self.0);
        if let Some(Value::Array(done)) = copies.get(&id) {
            return done.clone();
        }
        let array = self.0.read().clone();
        let copy = ArrayRef::from_value(array.clone());
        copies.insert(id, Value::Array(copy.clone()));

        if let ArrayValue::Ref(elements) = array {
            for (index, element) in elements.as_slice().iter().enumerate() {
                let element = element.copy_with(copies);
                if let ArrayValue::Ref(target) = &mut *copy.0.write() {
                    target.values[index] = element;
                }
            }
        }
        copy
    }
}

/// Arrays compare by identity
impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Collection for ArrayRef {
    fn new_iterator(&self) -> Box<dyn ValueIterator> {
        Box::new(ArrayIterator::new(self))
    }
}

/* ===================== Iteration ===================== */

/// Iterator over an array.
///
/// The traversal length is the array's size when the iterator was created;
/// elements appended afterwards are not visited. The back-reference is weak,
/// so a live iterator never keeps its array alive.
#[derive(Debug)]
pub struct ArrayIterator {
    array: Weak<RwLock<ArrayValue>>,
    cursor: usize,
    length: usize,
}

impl ArrayIterator {
    pub fn new(array: &ArrayRef) -> Self {
        Self {
            array: Arc::downgrade(&array.0),
            cursor: 0,
            length: array.size(),
        }
    }
}

impl ValueIterator for ArrayIterator {
    fn has_next(&self) -> bool {
        self.cursor < self.length && self.array.strong_count() > 0
    }

    fn get_next(&mut self, arity: Arity) -> Result<Vec<Value>, IteratorError> {
        if self.cursor >= self.length {
            return Err(IteratorError::Exhausted);
        }
        let array = self.array.upgrade().ok_or(IteratorError::CollectionDropped)?;
        let cursor = self.cursor;
        let element = array.read().get(cursor as i64)?;
        self.cursor += 1;

        Ok(match arity {
            Arity::One => vec![element],
            Arity::Two => vec![Value::Int(cursor as i64), element],
        })
    }
}
