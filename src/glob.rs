//! Wildcard & tilde expansion (SPEC_FULL.md §4.7).
//!
//! Grounded in the `glob` crate the teacher already depends on for its own
//! filename generation (`interpreter/word_expansion.rs`); matches are sorted
//! lexicographically, the same order `glob::glob` yields by default.

use std::path::Path;

use crate::exception::{Cause, EvalResult, Exception};

/// Expand a glob pattern against the current directory (or an absolute
/// pattern against the root). Returns matches in lexicographic order; an
/// empty result is the caller's problem (`nomatch_ok` decides whether that's
/// an error) — see `expand_or_fail`.
pub fn expand(pattern: &str) -> EvalResult<Vec<String>> {
    let mut matches = Vec::new();
    let paths = glob::glob(pattern)
        .map_err(|e| Exception::new(Cause::CompileError(format!("bad glob pattern: {e}"))))?;
    for entry in paths {
        match entry {
            Ok(path) => matches.push(path_to_word(&path)),
            Err(e) => {
                return Err(Exception::new(Cause::IOError(e.to_string())));
            }
        }
    }
    matches.sort();
    Ok(matches)
}

/// Expand `pattern`, honoring `nomatch_ok` (the `[nomatch-ok]` argument
/// modifier, §4.7): no matches is an empty argument list if set, otherwise a
/// `WildcardNoMatch` exception.
pub fn expand_or_fail(pattern: &str, nomatch_ok: bool) -> EvalResult<Vec<String>> {
    let matches = expand(pattern)?;
    if matches.is_empty() && !nomatch_ok {
        return Err(Exception::new(Cause::WildcardNoMatch(pattern.to_string())));
    }
    Ok(matches)
}

fn path_to_word(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// `~` / `~name` (§4.7). Only the invoking user's own home directory is
/// supported; `~name` for another user is not resolvable without a real
/// passwd lookup and fails with `IOError`.
pub fn expand_tilde(user: Option<&str>) -> EvalResult<String> {
    match user {
        None | Some("") => std::env::var("HOME")
            .map_err(|_| Exception::new(Cause::IOError("HOME is not set".into()))),
        Some(_) => Err(Exception::new(Cause::IOError(
            "~user expansion for other users is not supported".into(),
        ))),
    }
}

/// True if `text` contains any glob metacharacter this evaluator recognizes
/// (`*`, `?`, `[`), used by the compiler to decide whether a concatenated
/// bareword should be treated as a glob pattern.
pub fn looks_like_pattern(text: &str) -> bool {
    text.contains(['*', '?', '['])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nomatch_ok_yields_empty_not_error() {
        let result = expand_or_fail("/no/such/dir/*.zzz_nonexistent", true);
        assert_eq!(result.unwrap(), Vec::<String>::new());
    }

    #[test]
    fn nomatch_without_ok_errors() {
        let result = expand_or_fail("/no/such/dir/*.zzz_nonexistent", false);
        assert!(result.is_err());
    }

    #[test]
    fn detects_pattern_metacharacters() {
        assert!(looks_like_pattern("*.txt"));
        assert!(looks_like_pattern("file?.log"));
        assert!(!looks_like_pattern("plain.txt"));
    }
}
