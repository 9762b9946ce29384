//! Inclusive integer ranges

use std::fmt;

use super::iterator::{Arity, Collection, ValueIterator};
use super::Value;
use crate::errors::IteratorError;

/// Inclusive range `start..=end`. Empty when `start > end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
}

impl IntRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

impl fmt::Display for IntRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..{}]", self.start, self.end)
    }
}

impl Collection for IntRange {
    fn new_iterator(&self) -> Box<dyn ValueIterator> {
        Box::new(IntRangeIterator::new(*self))
    }
}

#[derive(Debug)]
pub struct IntRangeIterator {
    range: IntRange,
    cursor: i64,
    current: i64,
    // Set once `current` has stepped past `i64::MAX`
    exhausted: bool,
}

impl IntRangeIterator {
    pub fn new(range: IntRange) -> Self {
        Self {
            range,
            cursor: 0,
            current: range.start,
            exhausted: false,
        }
    }
}

impl ValueIterator for IntRangeIterator {
    fn has_next(&self) -> bool {
        !self.exhausted && self.range.start <= self.current && self.current <= self.range.end
    }

    fn get_next(&mut self, arity: Arity) -> Result<Vec<Value>, IteratorError> {
        if !self.has_next() {
            return Err(IteratorError::Exhausted);
        }
        let (cursor, current) = (self.cursor, self.current);
        match current.checked_add(1) {
            Some(next) => self.current = next,
            None => self.exhausted = true,
        }
        self.cursor += 1;

        Ok(match arity {
            Arity::One => vec![Value::Int(current)],
            Arity::Two => vec![Value::Int(cursor), Value::Int(current)],
        })
    }
}
