//! Session summaries: aggregate stats, the JSON report, the compact text
//! log and the replay bundle format.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::cache::CacheEntry;
use super::trace::{Boundary, TraceNode};

pub const BUNDLE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SalStats {
    pub calls: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub errors: u64,
    pub total_latency_ms: f64,
    pub tokens_in: u64,
    pub tokens_out: u64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub version: u32,
    pub session: String,
    pub stats: SalStats,
    pub cache_entries: usize,
    pub trace: Vec<TraceNode>,
    pub boundaries: Vec<Boundary>,
}

/// Export format: everything needed to replay a session's primitive calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bundle {
    pub version: u32,
    pub session: String,
    pub cache: Vec<CacheEntry>,
    pub trace: Vec<TraceNode>,
}

/// One line per node, indented by DAG depth:
/// `#3 infer stochastic miss 0.4ms $0.000012 "prompt…" -> "output…"`.
pub fn format_trace_log(nodes: &[TraceNode], boundaries: &[Boundary]) -> String {
    let mut depth: HashMap<u64, usize> = HashMap::new();
    let mut out = String::new();
    let mut pending = boundaries.iter().peekable();

    // boundaries recorded before any node
    while let Some(b) = pending.next_if(|b| b.after_node.is_none()) {
        let _ = writeln!(out, "-- {} [{}] --", b.label, b.domain);
    }
    for node in nodes {
        let d = node
            .parent_id
            .and_then(|p| depth.get(&p))
            .map(|d| d + 1)
            .unwrap_or(0);
        depth.insert(node.id, d);

        let status = if node.error.is_some() {
            "error"
        } else if node.cache_hit {
            "hit"
        } else {
            "miss"
        };
        let _ = write!(
            out,
            "{}#{} {} {} {} {:.1}ms ${:.6} {:?}",
            "  ".repeat(d),
            node.id,
            node.primitive.as_deref().unwrap_or("-"),
            node.domain,
            status,
            node.latency_ms,
            node.estimated_cost,
            node.truncated_input,
        );
        match (&node.error, &node.truncated_output) {
            (Some(err), _) => {
                let _ = write!(out, " !! {err}");
            }
            (None, Some(output)) => {
                let _ = write!(out, " -> {output:?}");
            }
            (None, None) => {}
        }
        out.push('\n');
        while let Some(b) = pending.next_if(|b| b.after_node.map_or(false, |id| id <= node.id)) {
            let _ = writeln!(out, "-- {} [{}] --", b.label, b.domain);
        }
    }
    for b in pending {
        let _ = writeln!(out, "-- {} [{}] --", b.label, b.domain);
    }
    out
}
