//! Branch-name syntax.
//!
//! A subset of `git check-ref-format --branch` that catches everything an
//! operator is likely to type by mistake.

use chrono::NaiveDate;
use thiserror::Error;

/// Characters git never allows in a ref name.
const FORBIDDEN_CHARS: &[char] = &['~', '^', ':', '?', '*', '[', ']', '\\'];

/// Why a branch name was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvalidBranchName {
    #[error("branch name is empty")]
    Empty,

    #[error("branch name contains whitespace")]
    Whitespace,

    #[error("branch name contains a control character")]
    ControlChar,

    #[error("branch name contains '{0}'")]
    ForbiddenChar(char),

    #[error("branch name contains '..'")]
    DoubleDot,

    #[error("branch name contains '@{{'")]
    AtBrace,

    #[error("branch name cannot be '@'")]
    LoneAt,

    #[error("branch name cannot end with '.lock'")]
    LockSuffix,

    #[error("branch name components cannot start with '.'")]
    LeadingDot,

    #[error("branch name cannot end with '.'")]
    TrailingDot,

    #[error("branch name cannot end with '/'")]
    TrailingSlash,

    #[error("branch name has an empty path component")]
    EmptyComponent,
}

/// Checks that `name` is usable as a git branch name.
pub fn validate_branch_name(name: &str) -> Result<(), InvalidBranchName> {
    if name.is_empty() {
        return Err(InvalidBranchName::Empty);
    }
    if name == "@" {
        return Err(InvalidBranchName::LoneAt);
    }
    for ch in name.chars() {
        if ch.is_whitespace() {
            return Err(InvalidBranchName::Whitespace);
        }
        if ch.is_control() {
            return Err(InvalidBranchName::ControlChar);
        }
        if FORBIDDEN_CHARS.contains(&ch) {
            return Err(InvalidBranchName::ForbiddenChar(ch));
        }
    }
    if name.contains("..") {
        return Err(InvalidBranchName::DoubleDot);
    }
    if name.contains("@{") {
        return Err(InvalidBranchName::AtBrace);
    }
    if name.ends_with('/') {
        return Err(InvalidBranchName::TrailingSlash);
    }
    if name.ends_with(".lock") {
        return Err(InvalidBranchName::LockSuffix);
    }
    if name.ends_with('.') {
        return Err(InvalidBranchName::TrailingDot);
    }
    for component in name.split('/') {
        if component.is_empty() {
            return Err(InvalidBranchName::EmptyComponent);
        }
        if component.starts_with('.') {
            return Err(InvalidBranchName::LeadingDot);
        }
    }
    Ok(())
}

/// Returns true if `name` passes [`validate_branch_name`].
pub fn is_valid_branch_name(name: &str) -> bool {
    validate_branch_name(name).is_ok()
}

/// Candidate replacements for a retired name, in preference order.
///
/// Yields `<name>-vN` for the first `N >= 2` accepted by `is_free`, then a
/// date-stamped and a `-continued` variant. Every candidate is syntactically
/// valid and accepted by `is_free`.
pub fn suggest_alternatives(
    name: &str,
    today: NaiveDate,
    is_free: impl Fn(&str) -> bool,
) -> Vec<String> {
    // A retired name that ends in `.lock` or `/` still has a usable stem.
    let stem = name.trim_end_matches('/');
    let stem = stem.strip_suffix(".lock").unwrap_or(stem);

    let mut suggestions = Vec::new();
    if let Some(versioned) = (2..100)
        .map(|n| format!("{}-v{}", stem, n))
        .find(|c| is_valid_branch_name(c) && is_free(c))
    {
        suggestions.push(versioned);
    }
    for candidate in [
        format!("{}-{}", stem, today.format("%Y%m%d")),
        format!("{}-continued", stem),
    ] {
        if is_valid_branch_name(&candidate) && is_free(&candidate) {
            suggestions.push(candidate);
        }
    }
    suggestions
}
