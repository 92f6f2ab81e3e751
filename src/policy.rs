use crate::error::MillError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

/// Engine actions a caller may request. Anything else fails validation
/// before a process is spawned.
pub const SAFE_ACTIONS: &[&str] = &[
    "select-all",
    "select-clear",
    "select-by-id",
    "select-by-class",
    "select-by-element",
    "path-union",
    "path-difference",
    "path-intersection",
    "path-division",
    "path-exclusion",
    "path-simplify",
    "object-to-path",
    "object-stroke-to-path",
    "selection-group",
    "selection-ungroup",
    "export-area-page",
    "export-area-drawing",
    "export-type",
    "export-filename",
    "export-dpi",
    "export-do",
    "file-save",
    "file-close",
    "transform-translate",
    "transform-scale",
    "transform-rotate",
    "query-x",
    "query-y",
    "query-width",
    "query-height",
    "query-all",
];

static SAFE_ACTION_SET: Lazy<HashSet<&'static str>> =
    Lazy::new(|| SAFE_ACTIONS.iter().copied().collect());

/// Structural CSS subset: anything outside this class is rejected outright.
static SAFE_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9#.\-\s,>*]+$").expect("selector pattern"));

/// Known-dangerous selector fragments, checked before the structural class.
static UNSAFE_SELECTOR_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"//",                  // XPath syntax
        r"(?i)script",          // script tags/selectors
        r"(?i)@import",         // CSS imports
        r"(?i)expression\s*\(", // CSS expressions
        r"(?i)javascript:",     // javascript protocol
        r"(?i)<\s*script",      // HTML script tags
        r"(?i)url\s*\(",        // url functions
        r"\\\\",                // backslash escapes
        r"[{}]",                // brace injection
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("denylist pattern"))
    .collect()
});

/// An action token may carry a `:value` suffix; only the identifier before
/// the first `:` is significant.
pub fn action_identifier(token: &str) -> &str {
    token.split(':').next().unwrap_or(token)
}

pub fn is_safe_action(token: &str) -> bool {
    SAFE_ACTION_SET.contains(action_identifier(token))
}

/// Validates the whole list atomically; the first offending token fails the
/// request with `UnsafeAction` and nothing is executed.
pub fn validate_actions(actions: &[String]) -> Result<(), MillError> {
    for token in actions {
        if !is_safe_action(token) {
            return Err(MillError::UnsafeAction {
                action: token.clone(),
            });
        }
    }
    Ok(())
}

pub fn is_safe_selector(value: &str) -> bool {
    if UNSAFE_SELECTOR_PATTERNS.iter().any(|p| p.is_match(value)) {
        return false;
    }
    SAFE_SELECTOR.is_match(value)
}

pub fn validate_selector(value: &str) -> Result<(), MillError> {
    if is_safe_selector(value) {
        Ok(())
    } else {
        Err(MillError::UnsafeSelector {
            selector: value.to_string(),
        })
    }
}
