//! Branch name validation following git-style conventions.
//!
//! Valid branch names:
//! - Must be non-empty
//! - Must not contain whitespace, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - Must not contain `..` (double dot) or `@{`
//! - Must not start or end with `.` or `/`
//! - Must not end with `.lock`
//! - Components between slashes must be non-empty

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a branch name.
const FORBIDDEN_CHARS: &[char] = &[' ', '\t', '\n', '\r', '~', '^', ':', '?', '*', '[', '\\'];

/// Longest slug kept from an issue title in a generated branch name.
const MAX_SLUG_LEN: usize = 40;

/// Validate a branch name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use strata_refs::names::validate_branch_name;
///
/// assert!(validate_branch_name("main").is_ok());
/// assert!(validate_branch_name("contractor/acme-hvac").is_ok());
/// assert!(validate_branch_name("").is_err());
/// assert!(validate_branch_name("bad..name").is_err());
/// ```
pub fn validate_branch_name(name: &str) -> Result<()> {
    let invalid = |reason: String| RefError::InvalidBranchName {
        name: name.to_string(),
        reason,
    };

    if name.is_empty() {
        return Err(invalid("branch name must not be empty".into()));
    }
    if let Some(ch) = FORBIDDEN_CHARS.iter().find(|ch| name.contains(**ch)) {
        return Err(invalid(format!("contains forbidden character: {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid("must not contain '..'".into()));
    }
    if name.contains("@{") {
        return Err(invalid("must not contain '@{'".into()));
    }
    if name.starts_with('.') || name.ends_with('.') {
        return Err(invalid("must not start or end with '.'".into()));
    }
    if name.starts_with('/') || name.ends_with('/') {
        return Err(invalid("must not start or end with '/'".into()));
    }
    if name.ends_with(".lock") {
        return Err(invalid("must not end with '.lock'".into()));
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid("path components must not be empty".into()));
        }
        if component.starts_with('.') {
            return Err(invalid(format!("component must not start with '.': {component:?}")));
        }
    }

    Ok(())
}

/// Branch name for work on an issue: `issue/<number>-<slug of title>`.
pub fn issue_branch_name(number: u64, title: &str) -> String {
    let mut slug = String::new();
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.is_empty() && !slug.ends_with('-') {
            slug.push('-');
        }
        if slug.len() >= MAX_SLUG_LEN {
            break;
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        format!("issue/{number}")
    } else {
        format!("issue/{number}-{slug}")
    }
}
