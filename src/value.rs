//! Value Model
//!
//! The tagged union of values scripts can hold and pass between commands.
//! See SPEC_FULL.md §3. Values are immutable from the script's perspective:
//! `List`/`Map` hold their payload behind an `Arc` rather than `Rc` so a
//! captured value can cross the `tokio` task boundary a pipeline stage runs on.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use indexmap::IndexMap;

use crate::closure::Callable;
use crate::port::PipeHandle;
use crate::exception::Exception;

/// A file handle opened by `fopen`, closeable exactly once via `fclose`.
pub struct FileHandle {
    pub path: String,
    pub file: std::sync::Mutex<Option<std::fs::File>>,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileHandle({})", self.path)
    }
}

#[derive(Clone)]
pub enum Value {
    Str(Arc<str>),
    Bool(bool),
    List(Arc<Vec<Value>>),
    Map(Arc<IndexMap<Value, Value>>),
    Fn(Arc<Callable>),
    File(Arc<FileHandle>),
    Pipe(Arc<PipeHandle>),
    Exception(Arc<Exception>),
}

impl Value {
    pub fn str(s: impl Into<Arc<str>>) -> Self {
        Value::Str(s.into())
    }

    pub fn bool(b: bool) -> Self {
        Value::Bool(b)
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(Arc::new(items))
    }

    pub fn map(m: IndexMap<Value, Value>) -> Self {
        Value::Map(Arc::new(m))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&IndexMap<Value, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_callable(&self) -> Option<&Arc<Callable>> {
        match self {
            Value::Fn(c) => Some(c),
            _ => None,
        }
    }

    /// `eq` (§3): structural for strings/bools/numbers, by identity for lists/maps.
    pub fn eq_structural(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Fn(a), Value::Fn(b)) => Arc::ptr_eq(a, b),
            (Value::File(a), Value::File(b)) => Arc::ptr_eq(a, b),
            (Value::Pipe(a), Value::Pipe(b)) => Arc::ptr_eq(a, b),
            (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// `is` (§3): identity comparison, only meaningful for values with observable
    /// identity. Strings/bools compare structurally since they have none.
    pub fn is_identical(&self, other: &Value) -> bool {
        self.eq_structural(other)
    }

    /// `eq` (§3, §8): deep structural equality, recursing into list/map
    /// elements rather than comparing their container's identity.
    pub fn eq_deep(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.eq_deep(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).is_some_and(|bv| v.eq_deep(bv)))
            }
            _ => self.eq_structural(other),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Str(_) => "string",
            Value::Bool(_) => "bool",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Fn(_) => "fn",
            Value::File(_) => "file",
            Value::Pipe(_) => "pipe",
            Value::Exception(_) => "exception",
        }
    }

    /// Textual representation used by `print`/`echo`/string concatenation.
    pub fn display_text(&self) -> String {
        match self {
            Value::Str(s) => s.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::List(items) => {
                let parts: Vec<String> = items.iter().map(|v| v.repr()).collect();
                format!("[{}]", parts.join(" "))
            }
            Value::Map(m) => {
                let parts: Vec<String> = m
                    .iter()
                    .map(|(k, v)| format!("&{}={}", k.repr(), v.repr()))
                    .collect();
                format!("[{}]", parts.join(" "))
            }
            Value::Fn(_) => "<fn>".to_string(),
            Value::File(h) => format!("<file {}>", h.path),
            Value::Pipe(_) => "<pipe>".to_string(),
            Value::Exception(e) => format!("<exception: {}>", e.message()),
        }
    }

    /// `pprint`-style representation (quotes strings).
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("{:?}", s.as_ref()),
            _ => self.display_text(),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_text())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.eq_structural(other)
    }
}
impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Str(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            Value::Bool(b) => {
                1u8.hash(state);
                b.hash(state);
            }
            Value::List(l) => {
                2u8.hash(state);
                Arc::as_ptr(l).hash(state);
            }
            Value::Map(m) => {
                3u8.hash(state);
                Arc::as_ptr(m).hash(state);
            }
            Value::Fn(c) => {
                4u8.hash(state);
                Arc::as_ptr(c).hash(state);
            }
            Value::File(h) => {
                5u8.hash(state);
                Arc::as_ptr(h).hash(state);
            }
            Value::Pipe(p) => {
                6u8.hash(state);
                Arc::as_ptr(p).hash(state);
            }
            Value::Exception(e) => {
                7u8.hash(state);
                Arc::as_ptr(e).hash(state);
            }
        }
    }
}

/// Ad-hoc hash helper used by `IndexMap` construction in built-ins that need
/// a quick dedup key without pulling in a full hasher type at every call site.
pub fn quick_hash(v: &Value) -> u64 {
    let mut hasher = DefaultHasher::new();
    v.hash(&mut hasher);
    hasher.finish()
}
