// src/compiler/parent.rs

//! The value stored in a compiler's parent-compilation slot.
//!
//! Callers may store any marker there, not only a real compilation.
//! [`ParentMarker::is_truthy`] decides whether the compiler counts as a
//! child: only `Null`, `false`, `0`, `-0`, `NaN` and `""` do not.

use std::collections::BTreeMap;

use crate::compilation::{Compilation, CompilationId};

/// Identity of the compilation a child compiler was created from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationRef {
    pub id: CompilationId,
    pub name: Option<String>,
}

impl From<&Compilation> for CompilationRef {
    fn from(c: &Compilation) -> Self {
        Self {
            id: c.id(),
            name: c.name().map(str::to_string),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum ParentMarker {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<ParentMarker>),
    Object(BTreeMap<String, ParentMarker>),
    Compilation(CompilationRef),
}

impl ParentMarker {
    pub fn is_truthy(&self) -> bool {
        match self {
            ParentMarker::Null => false,
            ParentMarker::Bool(b) => *b,
            ParentMarker::Number(n) => *n != 0.0 && !n.is_nan(),
            ParentMarker::Str(s) => !s.is_empty(),
            // Containers count even when empty.
            ParentMarker::List(_) | ParentMarker::Object(_) | ParentMarker::Compilation(_) => true,
        }
    }
}

impl From<bool> for ParentMarker {
    fn from(b: bool) -> Self {
        ParentMarker::Bool(b)
    }
}

impl From<f64> for ParentMarker {
    fn from(n: f64) -> Self {
        ParentMarker::Number(n)
    }
}

impl From<i64> for ParentMarker {
    fn from(n: i64) -> Self {
        ParentMarker::Number(n as f64)
    }
}

impl From<&str> for ParentMarker {
    fn from(s: &str) -> Self {
        ParentMarker::Str(s.to_string())
    }
}

impl From<String> for ParentMarker {
    fn from(s: String) -> Self {
        ParentMarker::Str(s)
    }
}

impl From<&Compilation> for ParentMarker {
    fn from(c: &Compilation) -> Self {
        ParentMarker::Compilation(c.into())
    }
}

impl<T: Into<ParentMarker>> From<Option<T>> for ParentMarker {
    fn from(value: Option<T>) -> Self {
        value.map_or(ParentMarker::Null, Into::into)
    }
}
