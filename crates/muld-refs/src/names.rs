//! Ref name validation following git's `check-ref-format` conventions.
//!
//! Valid ref names:
//! - Must be non-empty
//! - Must not contain whitespace, control characters, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Must not contain consecutive slashes (`//`)
//! - Components between slashes must be non-empty and not start with `.`
//!
//! Both short names (`main`) and full names (`refs/heads/main`) are accepted;
//! muld never rewrites names, it only mirrors them.

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidRefName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a ref name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use muld_refs::names::validate_ref_name;
///
/// assert!(validate_ref_name("main").is_ok());
/// assert!(validate_ref_name("refs/heads/feature/auth").is_ok());
/// assert!(validate_ref_name("").is_err());
/// assert!(validate_ref_name("bad..name").is_err());
/// ```
pub fn validate_ref_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "ref name must not be empty"));
    }

    if let Some(ch) = name.chars().find(|c| c.is_control()) {
        return Err(invalid(name, format!("contains control character: {ch:?}")));
    }

    for ch in FORBIDDEN_CHARS {
        if name.contains(*ch) {
            return Err(invalid(name, format!("contains forbidden character: {ch:?}")));
        }
    }

    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }

    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }

    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid(name, "must not start or end with '.'"));
    }

    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid(name, "must not start or end with '/'"));
    }

    if name.ends_with(".lock") {
        return Err(invalid(name, "must not end with '.lock'"));
    }

    if name.contains("//") {
        return Err(invalid(name, "must not contain consecutive slashes '//'"));
    }

    for component in name.split('/') {
        if component.starts_with('.') {
            return Err(invalid(
                name,
                format!("component must not start with '.': {component:?}"),
            ));
        }
        if component.ends_with(".lock") {
            return Err(invalid(
                name,
                format!("component must not end with '.lock': {component:?}"),
            ));
        }
    }

    Ok(())
}

/// Validate a single-component name such as a repository or downstream name.
///
/// These names double as file names in the state directory, so they must be a
/// simple identifier: no slashes, no leading dot, no forbidden characters.
pub fn validate_component_name(name: &str) -> Result<()> {
    let bad = |reason: &str| RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    };
    if name.is_empty() {
        return Err(bad("name must not be empty"));
    }
    if name.contains('/') {
        return Err(bad("name must not contain '/'"));
    }
    if name.starts_with('.') {
        return Err(bad("name must not start with '.'"));
    }
    if name.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c)) {
        return Err(bad("name contains a forbidden character"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_short_and_full_names() {
        assert!(validate_ref_name("main").is_ok());
        assert!(validate_ref_name("v1.0").is_ok());
        assert!(validate_ref_name("refs/heads/main").is_ok());
        assert!(validate_ref_name("refs/tags/v2.1.0").is_ok());
        assert!(validate_ref_name("refs/heads/user/alice/fix-123").is_ok());
    }

    #[test]
    fn reject_empty_name() {
        assert!(validate_ref_name("").is_err());
    }

    #[test]
    fn reject_double_dot() {
        assert!(validate_ref_name("bad..name").is_err());
        assert!(validate_ref_name("refs/heads/a..b").is_err());
    }

    #[test]
    fn reject_whitespace_and_control() {
        assert!(validate_ref_name("has space").is_err());
        assert!(validate_ref_name("has\ttab").is_err());
        assert!(validate_ref_name("bell\u{7}").is_err());
    }

    #[test]
    fn reject_forbidden_chars() {
        for name in ["a~b", "a^b", "a:b", "a?b", "a*b", "a[b", "a\\b"] {
            assert!(validate_ref_name(name).is_err(), "{name} should be rejected");
        }
    }

    #[test]
    fn reject_boundaries() {
        assert!(validate_ref_name(".hidden").is_err());
        assert!(validate_ref_name("trailing.").is_err());
        assert!(validate_ref_name("/leading").is_err());
        assert!(validate_ref_name("trailing/").is_err());
        assert!(validate_ref_name("a//b").is_err());
    }

    #[test]
    fn reject_lock_suffix_anywhere() {
        assert!(validate_ref_name("main.lock").is_err());
        assert!(validate_ref_name("refs/heads.lock/main").is_err());
    }

    #[test]
    fn reject_reflog_syntax() {
        assert!(validate_ref_name("main@{0}").is_err());
    }

    #[test]
    fn reject_component_starting_with_dot() {
        assert!(validate_ref_name("refs/heads/.hidden").is_err());
    }

    #[test]
    fn component_names() {
        assert!(validate_component_name("demo").is_ok());
        assert!(validate_component_name("github-backup").is_ok());
        assert!(validate_component_name("").is_err());
        assert!(validate_component_name("a/b").is_err());
        assert!(validate_component_name(".state").is_err());
        assert!(validate_component_name("with space").is_err());
    }
}
