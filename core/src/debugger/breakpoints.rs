//! Breakpoint registry

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::DebugError;
use crate::program::SourcePos;

/// A (source unit, line) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Breakpoint {
    pub source: String,
    pub line: u32,
}

impl Breakpoint {
    pub fn new(source: impl Into<String>, line: u32) -> Self {
        Self {
            source: source.into(),
            line,
        }
    }
}

impl fmt::Display for Breakpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

/// Parses `<source>:<line>`. The source may itself contain colons.
impl FromStr for Breakpoint {
    type Err = DebugError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || DebugError::InvalidBreakpoint(s.to_string());
        let (source, line) = s.rsplit_once(':').ok_or_else(invalid)?;
        if source.is_empty() {
            return Err(invalid());
        }
        let line = line.trim().parse().map_err(|_| invalid())?;
        Ok(Breakpoint::new(source, line))
    }
}

/// Source unit -> line numbers
#[derive(Debug, Clone, Default)]
pub struct BreakpointRegistry {
    lines: HashMap<String, HashSet<u32>>,
}

impl BreakpointRegistry {
    pub fn add(&mut self, breakpoint: Breakpoint) {
        self.lines
            .entry(breakpoint.source)
            .or_default()
            .insert(breakpoint.line);
    }

    /// Replace the whole set
    pub fn replace(&mut self, breakpoints: impl IntoIterator<Item = Breakpoint>) {
        self.lines.clear();
        for bp in breakpoints {
            self.add(bp);
        }
    }

    pub fn contains(&self, pos: &SourcePos) -> bool {
        self.lines
            .get(&pos.source)
            .is_some_and(|lines| lines.contains(&pos.line))
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn len(&self) -> usize {
        self.lines.values().map(HashSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted by source then line
    pub fn to_vec(&self) -> Vec<Breakpoint> {
        let mut all: Vec<Breakpoint> = self
            .lines
            .iter()
            .flat_map(|(source, lines)| lines.iter().map(|line| Breakpoint::new(source.clone(), *line)))
            .collect();
        all.sort_by(|a, b| a.source.cmp(&b.source).then(a.line.cmp(&b.line)));
        all
    }
}
