//! Program artifact
//!
//! The compiled program is produced elsewhere and consumed read-only. It is
//! loaded from JSON and shared between workers behind an `Arc`.

use std::fmt;
use std::path::Path;

use anyhow::{Context as _, Result};
use serde::{Deserialize, Serialize};

use crate::bytecode::Instruction;

/// Index into [`ProgramFile::functions`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FunctionId(pub u32);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Compiled program
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgramFile {
    /// Package whose `main` is the entry point
    #[serde(default)]
    pub entry_package: String,

    #[serde(default)]
    pub packages: Vec<PackageInfo>,

    pub functions: Vec<FunctionInfo>,

    /// String constant pool
    #[serde(default)]
    pub constants: Vec<String>,

    pub code: Vec<Instruction>,

    /// Instruction offsets mapped to source lines, sorted by `ip`
    #[serde(default)]
    pub line_numbers: Vec<LineNumberEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PackageInfo {
    pub name: String,

    /// Runs once before the entry function
    #[serde(default)]
    pub init_function: Option<FunctionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub name: String,

    #[serde(default)]
    pub package: String,

    /// Runs inline in the caller's context
    pub default_worker: WorkerInfo,

    /// Each one spawned as its own task on activation
    #[serde(default)]
    pub workers: Vec<WorkerInfo>,
}

/// Static description of a worker: where its code starts and how many
/// registers of each kind it needs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    #[serde(default = "default_worker_name")]
    pub name: String,

    pub code_addr: usize,

    #[serde(default)]
    pub registers: RegisterShape,
}

fn default_worker_name() -> String {
    "default".to_string()
}

/// Register bank sizes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterShape {
    pub ints: u16,
    pub floats: u16,
    pub strings: u16,
    pub bools: u16,
    pub refs: u16,
    pub iterators: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourcePos {
    pub source: String,
    pub line: u32,
}

impl fmt::Display for SourcePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.line)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineNumberEntry {
    pub ip: usize,
    #[serde(flatten)]
    pub pos: SourcePos,
}

impl ProgramFile {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut program: ProgramFile =
            serde_json::from_str(json).context("Failed to parse program JSON")?;
        program.line_numbers.sort_by_key(|entry| entry.ip);
        Ok(program)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read program {}", path.display()))?;
        Self::from_json_str(&json).with_context(|| format!("Invalid program {}", path.display()))
    }

    pub fn function(&self, id: FunctionId) -> Option<&FunctionInfo> {
        self.functions.get(id.0 as usize)
    }

    /// Look a function up by name, preferring the entry package
    pub fn find_function(&self, name: &str) -> Option<(FunctionId, &FunctionInfo)> {
        let indexed = || {
            self.functions
                .iter()
                .enumerate()
                .map(|(i, f)| (FunctionId(i as u32), f))
        };
        indexed()
            .find(|(_, f)| f.name == name && f.package == self.entry_package)
            .or_else(|| indexed().find(|(_, f)| f.name == name))
    }

    pub fn main_function(&self) -> Option<(FunctionId, &FunctionInfo)> {
        self.functions
            .iter()
            .enumerate()
            .find(|(_, f)| f.name == "main" && f.package == self.entry_package)
            .map(|(i, f)| (FunctionId(i as u32), f))
    }

    pub fn instruction(&self, ip: usize) -> Option<&Instruction> {
        self.code.get(ip)
    }

    pub fn constant(&self, index: usize) -> Option<&str> {
        self.constants.get(index).map(String::as_str)
    }

    /// Source position of the instruction at `ip`: the entry with the greatest
    /// offset not past `ip`
    pub fn position_of(&self, ip: usize) -> Option<&SourcePos> {
        let idx = self.line_numbers.partition_point(|entry| entry.ip <= ip);
        idx.checked_sub(1).map(|i| &self.line_numbers[i].pos)
    }
}
