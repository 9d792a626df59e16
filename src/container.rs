//! Functional container update & indexing (SPEC_FULL.md §3, §4.6).
//!
//! `List`/`Map` values are immutable; every "mutating" built-in (`assoc`,
//! `dissoc`) and the `x[i] = v` assignment sugar instead builds a new
//! container sharing structure with the old one where possible. The teacher
//! has no counterpart (bash arrays are mutated in place), so this is grounded
//! directly on the value model's own identity rules (§3: a fresh `Arc`
//! means a fresh identity, which is what makes `is` meaningful at all).

use indexmap::IndexMap;

use crate::exception::{Cause, EvalResult, Exception};
use crate::value::Value;

fn list_index(len: usize, raw: i64) -> EvalResult<usize> {
    let idx = if raw < 0 { raw + len as i64 } else { raw };
    if idx < 0 || idx as usize >= len {
        return Err(Exception::new(Cause::ArgKindError(format!(
            "index {raw} out of bounds for list of length {len}"
        ))));
    }
    Ok(idx as usize)
}

fn parse_int(v: &Value) -> EvalResult<i64> {
    v.as_str()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| Exception::new(Cause::ArgKindError(format!("not an integer index: {}", v.repr()))))
}

/// `$x[k]` indexing for both lists (integer index, negative-from-end) and
/// maps (arbitrary key).
pub fn index(container: &Value, key: &Value) -> EvalResult<Value> {
    match container {
        Value::List(items) => {
            let i = list_index(items.len(), parse_int(key)?)?;
            Ok(items[i].clone())
        }
        Value::Map(m) => m.get(key).cloned().ok_or_else(|| {
            Exception::new(Cause::ArgKindError(format!("key not found: {}", key.repr())))
        }),
        other => Err(Exception::new(Cause::ArgKindError(format!(
            "cannot index a {}",
            other.type_name()
        )))),
    }
}

/// `$x[i:j]` slicing (lists only).
pub fn slice(container: &Value, begin: Option<i64>, end: Option<i64>) -> EvalResult<Value> {
    let items = container
        .as_list()
        .ok_or_else(|| Exception::new(Cause::ArgKindError("slicing requires a list".into())))?;
    let len = items.len() as i64;
    let norm = |raw: i64| -> usize {
        let v = if raw < 0 { raw + len } else { raw };
        v.clamp(0, len) as usize
    };
    let b = norm(begin.unwrap_or(0));
    let e = norm(end.unwrap_or(len));
    if b >= e {
        return Ok(Value::list(Vec::new()));
    }
    Ok(Value::list(items[b..e].to_vec()))
}

/// Functional update: returns a container equal to `container` but with
/// `key` mapped to `val` (lists: in-place-by-value at an existing index only;
/// maps: insert or overwrite).
pub fn assoc(container: &Value, key: &Value, val: Value) -> EvalResult<Value> {
    match container {
        Value::List(items) => {
            let i = list_index(items.len(), parse_int(key)?)?;
            let mut new_items = items.as_ref().clone();
            new_items[i] = val;
            Ok(Value::list(new_items))
        }
        Value::Map(m) => {
            let mut new_map: IndexMap<Value, Value> = m.as_ref().clone();
            new_map.insert(key.clone(), val);
            Ok(Value::map(new_map))
        }
        other => Err(Exception::new(Cause::ArgKindError(format!(
            "cannot assoc into a {}",
            other.type_name()
        )))),
    }
}

/// Functional delete: maps only, returns a container without `key`. A
/// missing key is a no-op (returns an equal map), matching the teacher's
/// general tolerance for deleting an absent thing.
pub fn dissoc(container: &Value, key: &Value) -> EvalResult<Value> {
    match container {
        Value::Map(m) => {
            let mut new_map: IndexMap<Value, Value> = m.as_ref().clone();
            new_map.shift_remove(key);
            Ok(Value::map(new_map))
        }
        other => Err(Exception::new(Cause::ArgKindError(format!(
            "cannot dissoc from a {}",
            other.type_name()
        )))),
    }
}

/// `x[a][b] = v` sugar, generalized to an arbitrary-depth index path (§9).
pub fn assoc_path(container: &Value, path: &[Value], val: Value) -> EvalResult<Value> {
    match path.split_first() {
        None => Ok(val),
        Some((first, [])) => assoc(container, first, val),
        Some((first, rest)) => {
            let inner = index(container, first)?;
            let updated = assoc_path(&inner, rest, val)?;
            assoc(container, first, updated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_index_counts_from_end() {
        let l = Value::list(vec![Value::str("a"), Value::str("b"), Value::str("c")]);
        assert_eq!(index(&l, &Value::str("-1")).unwrap(), Value::str("c"));
    }

    #[test]
    fn assoc_on_list_replaces_element() {
        let l = Value::list(vec![Value::str("a"), Value::str("b")]);
        let updated = assoc(&l, &Value::str("0"), Value::str("z")).unwrap();
        assert_eq!(updated.as_list().unwrap()[0], Value::str("z"));
        assert_eq!(l.as_list().unwrap()[0], Value::str("a"));
    }

    #[test]
    fn dissoc_removes_map_key() {
        let mut m = IndexMap::new();
        m.insert(Value::str("k"), Value::str("v"));
        let map = Value::map(m);
        let updated = dissoc(&map, &Value::str("k")).unwrap();
        assert!(updated.as_map().unwrap().is_empty());
    }

    #[test]
    fn slice_clamps_bounds() {
        let l = Value::list(vec![Value::str("a"), Value::str("b"), Value::str("c")]);
        let s = slice(&l, Some(-2), None).unwrap();
        assert_eq!(s.as_list().unwrap().len(), 2);
    }
}
