//! Variable & Namespace Store (SPEC_FULL.md §3, §4.1).
//!
//! A `Frame` is the runtime counterpart of a lexical scope: an unqualified
//! name maps to a `Slot` (a heap cell shared with any closure that captured
//! it as an upvalue), plus a reference to the enclosing lexical scope
//! (fixed at closure-creation time, not the dynamic call chain) and the
//! namespaces this frame has `use`d. Mirrors the teacher's `local_scopes`
//! stack (`interpreter/types.rs`) generalized from "a stack of maps" to an
//! explicit parent-linked chain, since this evaluator's scopes nest by
//! lexical closure rather than by bash's single flat call stack.

use std::sync::{Arc, Mutex};

use indexmap::IndexMap;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

/// A named, mutable cell. Shared (via `Arc`) between the scope that owns it
/// and any closure that captured it as an upvalue (§9).
pub type Slot = Arc<Mutex<Value>>;

pub fn new_slot(v: Value) -> Slot {
    Arc::new(Mutex::new(v))
}

/// A qualified-name reference, resolved once at the name-resolution site.
#[derive(Debug, Clone)]
pub enum NameRef {
    /// `local:x` — force a new slot in the current frame.
    Local(String),
    /// `up:x` — force resolution starting at the parent frame.
    Up(String),
    /// `E:x` — the process environment namespace.
    Env(String),
    /// `x` — ordinary lexical lookup.
    Plain(String),
    /// `a:b:...:x` — `x` inside the namespace bound to `a`, which may itself
    /// be bound inside the namespace bound to further prefixes.
    Namespaced(Vec<String>, String),
}

impl NameRef {
    pub fn parse(qualified: &str) -> Self {
        let parts: Vec<&str> = qualified.split(':').collect();
        match parts.as_slice() {
            [name] => NameRef::Plain(name.to_string()),
            ["local", name] => NameRef::Local(name.to_string()),
            ["up", name] => NameRef::Up(name.to_string()),
            ["E", name] => NameRef::Env(name.to_string()),
            _ => {
                let (last, prefix) = parts.split_last().unwrap();
                NameRef::Namespaced(
                    prefix.iter().map(|s| s.to_string()).collect(),
                    last.to_string(),
                )
            }
        }
    }
}

/// A lexical scope. The root frame of the evaluator holds the built-in
/// namespace; every closure call creates a child frame whose parent is the
/// frame in effect when the closure literal was *compiled*, not the frame
/// of whichever call site invoked it.
pub struct Frame {
    vars: Mutex<IndexMap<String, Slot>>,
    imports: Mutex<IndexMap<String, Arc<Frame>>>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    pub fn root() -> Arc<Frame> {
        Arc::new(Frame {
            vars: Mutex::new(IndexMap::new()),
            imports: Mutex::new(IndexMap::new()),
            parent: None,
        })
    }

    pub fn child(parent: &Arc<Frame>) -> Arc<Frame> {
        Arc::new(Frame {
            vars: Mutex::new(IndexMap::new()),
            imports: Mutex::new(IndexMap::new()),
            parent: Some(Arc::clone(parent)),
        })
    }

    pub fn parent(&self) -> Option<&Arc<Frame>> {
        self.parent.as_ref()
    }

    /// Look up a plain name in this frame only (no parent walk).
    pub fn get_local_slot(&self, name: &str) -> Option<Slot> {
        self.vars.lock().unwrap().get(name).cloned()
    }

    /// Look up a plain name walking from this frame up through parents.
    pub fn get_slot(&self, name: &str) -> Option<Slot> {
        if let Some(slot) = self.get_local_slot(name) {
            return Some(slot);
        }
        self.parent.as_ref().and_then(|p| p.get_slot(name))
    }

    /// `local:x` — unconditionally create (or replace) a slot in this frame.
    pub fn declare_local(&self, name: &str, value: Value) -> Slot {
        let slot = new_slot(value);
        self.vars
            .lock()
            .unwrap()
            .insert(name.to_string(), Arc::clone(&slot));
        slot
    }

    /// Unqualified assignment: bind in the nearest enclosing frame (starting
    /// at `self`) that already declares `name`; otherwise create a fresh
    /// slot in `self`.
    pub fn assign(self: &Arc<Self>, name: &str, value: Value) {
        if let Some(slot) = self.get_slot(name) {
            *slot.lock().unwrap() = value;
        } else {
            self.declare_local(name, value);
        }
    }

    /// `up:x` — same rule as `assign`, but the search starts at the parent.
    pub fn assign_up(&self, name: &str, value: Value) -> EvalResult<()> {
        let parent = self
            .parent
            .as_ref()
            .ok_or_else(|| Exception::new(Cause::UndefinedVariable(format!("up:{name}"))))?;
        if let Some(slot) = parent.get_slot(name) {
            *slot.lock().unwrap() = value;
        } else {
            parent.declare_local(name, value);
        }
        Ok(())
    }

    /// Register a namespace (the exports of a `use`d module) under `prefix`,
    /// visible to this frame and to any closure that later captures it as an
    /// upvalue (§4.5: "imports are lexically scoped").
    pub fn bind_namespace(&self, prefix: &str, ns: Arc<Frame>) {
        self.imports
            .lock()
            .unwrap()
            .insert(prefix.to_string(), ns);
    }

    pub fn get_namespace(&self, prefix: &str) -> Option<Arc<Frame>> {
        if let Some(ns) = self.imports.lock().unwrap().get(prefix).cloned() {
            return Some(ns);
        }
        self.parent.as_ref().and_then(|p| p.get_namespace(prefix))
    }

    /// Resolve a `Namespaced` reference's prefix chain to the innermost
    /// namespace frame, then fetch `name` from it directly (namespace
    /// members are looked up by local declaration only, not through *its*
    /// parent chain, since a namespace's exports are precisely its own
    /// top-level bindings).
    pub fn resolve_namespaced(&self, path: &[String], name: &str) -> Option<Slot> {
        let mut cur = self.get_namespace(&path[0])?;
        for seg in &path[1..] {
            cur = cur.get_namespace(seg)?;
        }
        cur.get_local_slot(name)
    }

    /// Remove a name from this frame only, used to undo a temporary
    /// assignment (`a=1 cmd`, §4.1) that introduced a binding which didn't
    /// exist before the form ran.
    pub fn remove_local(&self, name: &str) {
        self.vars.lock().unwrap().shift_remove(name);
    }

    /// Reinsert an existing slot under `name` in this frame, used to restore
    /// a temporary assignment that shadowed a prior binding (preserves the
    /// original slot's identity, so any closure that captured it as an
    /// upvalue sees the restored value through the same cell).
    pub fn set_local_slot(&self, name: &str, slot: Slot) {
        self.vars.lock().unwrap().insert(name.to_string(), slot);
    }

    /// All names declared directly in this frame — used when a module's
    /// root frame is captured as the `Namespace` it exports (§4.5).
    pub fn exported_names(&self) -> Vec<String> {
        self.vars.lock().unwrap().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_declares_in_current_frame() {
        let root = Frame::root();
        let child = Frame::child(&root);
        child.declare_local("x", Value::str("1"));
        assert!(child.get_local_slot("x").is_some());
        assert!(root.get_local_slot("x").is_none());
    }

    #[test]
    fn assign_finds_enclosing_binding() {
        let root = Frame::root();
        root.declare_local("x", Value::str("outer"));
        let child = Frame::child(&root);
        child.assign("x", Value::str("inner"));
        assert_eq!(
            root.get_slot("x").unwrap().lock().unwrap().as_str(),
            Some("inner")
        );
        assert!(child.get_local_slot("x").is_none());
    }

    #[test]
    fn assign_without_existing_binding_creates_local() {
        let root = Frame::root();
        let child = Frame::child(&root);
        child.assign("y", Value::str("new"));
        assert!(child.get_local_slot("y").is_some());
        assert!(root.get_local_slot("y").is_none());
    }

    #[test]
    fn namespaced_name_parses_multi_level() {
        match NameRef::parse("a:b:c") {
            NameRef::Namespaced(prefix, name) => {
                assert_eq!(prefix, vec!["a".to_string(), "b".to_string()]);
                assert_eq!(name, "c");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn pseudo_namespaces_parse() {
        assert!(matches!(NameRef::parse("local:x"), NameRef::Local(n) if n == "x"));
        assert!(matches!(NameRef::parse("up:x"), NameRef::Up(n) if n == "x"));
        assert!(matches!(NameRef::parse("E:HOME"), NameRef::Env(n) if n == "HOME"));
        assert!(matches!(NameRef::parse("x"), NameRef::Plain(n) if n == "x"));
    }
}
