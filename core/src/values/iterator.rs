//! Uniform iteration protocol over collection values

use std::fmt;

use super::Value;
use crate::errors::IteratorError;

/// Shape of each element produced by [`ValueIterator::get_next`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    /// A bare element
    One,
    /// An (index or key, element) pair
    Two,
}

impl Arity {
    pub fn width(self) -> usize {
        match self {
            Arity::One => 1,
            Arity::Two => 2,
        }
    }
}

impl TryFrom<usize> for Arity {
    type Error = IteratorError;

    fn try_from(n: usize) -> Result<Self, Self::Error> {
        match n {
            1 => Ok(Arity::One),
            2 => Ok(Arity::Two),
            other => Err(IteratorError::InvalidArity(other)),
        }
    }
}

/// Stateful single-pass cursor over a collection.
///
/// Not restartable: once `has_next` reports false the iterator is spent and
/// a new one must be requested from the collection.
pub trait ValueIterator: Send + Sync + fmt::Debug {
    fn has_next(&self) -> bool;

    fn get_next(&mut self, arity: Arity) -> Result<Vec<Value>, IteratorError>;
}

/// Capability of a value to produce iterators over its elements
pub trait Collection {
    fn new_iterator(&self) -> Box<dyn ValueIterator>;
}
