use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectorKind {
    Css,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selector {
    #[serde(rename = "type")]
    pub kind: SelectorKind,
    pub value: String,
}

impl Selector {
    pub fn css(value: impl Into<String>) -> Self {
        Self {
            kind: SelectorKind::Css,
            value: value.into(),
        }
    }
}

/// One structured edit: set attributes (`@x`) or style properties
/// (`style.fill`) on every node the selector matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetOp {
    pub selector: Selector,
    pub set: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct DomEditOutcome {
    pub svg: String,
    pub changed: usize,
}

/// The DOM editing engine, consumed as a capability. The service owns
/// selector safety, path confinement, size bounds, and atomic persistence;
/// implementations only parse and mutate documents.
pub trait DomEditor: Send + Sync {
    /// Parses the document, failing with a short reason if it is not valid.
    fn validate(&self, svg: &str) -> Result<(), String>;

    /// Applies every op to the parsed document and returns the serialized
    /// result plus the count of matched nodes.
    fn apply(&self, svg: &str, ops: &[SetOp]) -> Result<DomEditOutcome, String>;

    /// Returns a cleaned/optimized rendition of the document.
    fn clean(&self, svg: &str) -> Result<String, String>;
}
