//! Expands `-- @include <path>` directives in a SQL file, recursively,
//! wrapping each inclusion in `BEGIN INCLUDE`/`END INCLUDE` markers so the
//! expanded text remains readable in logs and `EXPLAIN` output.
//!
//! Ported from `original_source/runner.py::_process_sql_includes`: a file
//! visited twice in the same expansion — whether a true cycle or a diamond
//! include of the same file from two branches — is rejected. The set of
//! visited paths is threaded explicitly through the recursion rather than
//! held as engine state, so concurrent expansions never interfere.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Error, Kind};

fn include_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*--\s*@include\s+(.+?)\s*$").unwrap())
}

/// Expand all `@include` directives in `path`, returning the fully resolved
/// SQL text.
pub fn expand_includes(path: &Path) -> Result<String, Error> {
    let mut visited = HashSet::new();
    expand(path, &mut visited)
}

fn expand(path: &Path, visited: &mut HashSet<PathBuf>) -> Result<String, Error> {
    let canonical = path.canonicalize().map_err(Error::from)?;
    if !visited.insert(canonical) {
        return Err(Kind::IncludeCycle(path.to_path_buf()).into());
    }

    let text = std::fs::read_to_string(path)?;
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut out = Vec::with_capacity(text.lines().count());

    for line in text.lines() {
        match include_re().captures(line) {
            Some(caps) => {
                let include_file = caps[1].trim();
                let include_path = parent.join(include_file);
                if !include_path.is_file() {
                    return Err(Kind::IncludeNotFound(include_path).into());
                }
                let included = expand(&include_path, visited)?;
                out.push(format!("-- BEGIN INCLUDE: {include_file}"));
                out.push(included);
                out.push(format!("-- END INCLUDE: {include_file}"));
            }
            None => out.push(line.to_string()),
        }
    }

    Ok(out.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn expands_a_single_include() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("shared.sql"), "create table shared();").unwrap();
        std::fs::write(
            tmp.path().join("up.sql"),
            "-- @include shared.sql\ncreate table t();",
        )
        .unwrap();

        let expanded = expand_includes(&tmp.path().join("up.sql")).unwrap();
        assert!(expanded.contains("BEGIN INCLUDE: shared.sql"));
        assert!(expanded.contains("create table shared();"));
        assert!(expanded.contains("create table t();"));
    }

    #[test]
    fn expands_nested_includes_recursively() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("base.sql"), "create table base();").unwrap();
        std::fs::write(
            tmp.path().join("mid.sql"),
            "-- @include base.sql\ncreate table mid();",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("up.sql"),
            "-- @include mid.sql\ncreate table t();",
        )
        .unwrap();

        let expanded = expand_includes(&tmp.path().join("up.sql")).unwrap();
        assert!(expanded.contains("create table base();"));
        assert!(expanded.contains("create table mid();"));
        assert!(expanded.contains("create table t();"));
    }

    #[test]
    fn direct_self_include_is_a_cycle() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("up.sql"), "-- @include up.sql\n").unwrap();

        let err = expand_includes(&tmp.path().join("up.sql")).unwrap_err();
        assert!(matches!(err.kind(), Kind::IncludeCycle(_)));
    }

    #[test]
    fn mutual_include_is_a_cycle() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("a.sql"), "-- @include b.sql\n").unwrap();
        std::fs::write(tmp.path().join("b.sql"), "-- @include a.sql\n").unwrap();

        let err = expand_includes(&tmp.path().join("a.sql")).unwrap_err();
        assert!(matches!(err.kind(), Kind::IncludeCycle(_)));
    }

    #[test]
    fn diamond_include_of_the_same_file_is_rejected() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("shared.sql"), "create table shared();").unwrap();
        std::fs::write(tmp.path().join("left.sql"), "-- @include shared.sql\n").unwrap();
        std::fs::write(tmp.path().join("right.sql"), "-- @include shared.sql\n").unwrap();
        std::fs::write(
            tmp.path().join("up.sql"),
            "-- @include left.sql\n-- @include right.sql\n",
        )
        .unwrap();

        let err = expand_includes(&tmp.path().join("up.sql")).unwrap_err();
        assert!(matches!(err.kind(), Kind::IncludeCycle(_)));
    }

    #[test]
    fn missing_include_target_is_reported() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("up.sql"), "-- @include missing.sql\n").unwrap();

        let err = expand_includes(&tmp.path().join("up.sql")).unwrap_err();
        assert!(matches!(err.kind(), Kind::IncludeNotFound(_)));
    }

    #[test]
    fn plain_sql_with_dashdash_comment_is_left_alone() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("up.sql"), "-- just a comment\nselect 1;").unwrap();

        let expanded = expand_includes(&tmp.path().join("up.sql")).unwrap();
        assert_eq!(expanded, "-- just a comment\nselect 1;");
    }
}
