//! Trace records: one node per intercepted call, linked into a DAG through
//! `parent_id`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Deterministic,
    Stochastic,
    Hybrid,
}

impl Domain {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "deterministic" => Some(Domain::Deterministic),
            "stochastic" => Some(Domain::Stochastic),
            "hybrid" => Some(Domain::Hybrid),
            _ => None,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Domain::Deterministic => "deterministic",
            Domain::Stochastic => "stochastic",
            Domain::Hybrid => "hybrid",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TokenCounts {
    pub input: u64,
    pub output: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceNode {
    pub id: u64,
    pub domain: Domain,
    pub primitive: Option<String>,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub truncated_input: String,
    pub truncated_output: Option<String>,
    pub parent_id: Option<u64>,
    pub timestamp: String,
    pub latency_ms: f64,
    pub cache_hit: bool,
    pub model_id: Option<String>,
    pub token_counts: Option<TokenCounts>,
    pub estimated_cost: f64,
    pub error: Option<String>,
    #[serde(default)]
    pub metadata: BTreeMap<String, Json>,
}

/// A labelled checkpoint between trace nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Boundary {
    pub label: String,
    pub domain: Domain,
    /// Last node recorded before the boundary, if any.
    pub after_node: Option<u64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Dag {
    pub nodes: Vec<TraceNode>,
    /// `(parent, child)` pairs.
    pub edges: Vec<(u64, u64)>,
}

impl Dag {
    pub fn from_nodes(nodes: &[TraceNode]) -> Self {
        let edges = nodes
            .iter()
            .filter_map(|n| n.parent_id.map(|p| (p, n.id)))
            .collect();
        Dag {
            nodes: nodes.to_vec(),
            edges,
        }
    }

    pub fn roots(&self) -> impl Iterator<Item = &TraceNode> {
        self.nodes.iter().filter(|n| n.parent_id.is_none())
    }
}

/// Hex SHA-256 of `primitive NUL canonical-json`.
pub fn input_hash(primitive: &str, canonical: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(primitive.as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical.as_bytes());
    to_hex(&hasher.finalize())
}

pub fn content_hash(canonical: &str) -> String {
    to_hex(&Sha256::digest(canonical.as_bytes()))
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// serde_json maps are ordered, so plain serialization is canonical.
pub fn canonical_json(value: &Json) -> String {
    serde_json::to_string(value).unwrap_or_default()
}

/// Cuts `text` to at most `max` characters, marking the cut with `…`.
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}

/// chars / 4, rounded up.
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_depends_on_primitive_and_args() {
        let a = input_hash("infer", "[\"x\"]");
        assert_eq!(a.len(), 64);
        assert_eq!(a, input_hash("infer", "[\"x\"]"));
        assert_ne!(a, input_hash("embed", "[\"x\"]"));
        assert_ne!(a, input_hash("infer", "[\"y\"]"));
    }

    #[test]
    fn canonical_json_sorts_keys() {
        let v: Json = serde_json::from_str(r#"{"b":1,"a":[true,null]}"#).unwrap();
        assert_eq!(canonical_json(&v), r#"{"a":[true,null],"b":1}"#);
    }

    #[test]
    fn token_estimate_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn truncation_counts_characters() {
        assert_eq!(truncate("héllo", 10), "héllo");
        assert_eq!(truncate("héllo", 2), "hé…");
    }
}
