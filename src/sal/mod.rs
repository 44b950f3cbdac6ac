//! SAL: the instrumentation layer around nondeterministic primitives.
//!
//! Every AI primitive call goes through [`Sal::intercept`], which hashes the
//! canonical arguments, serves cacheable primitives from the cache, records a
//! [`TraceNode`] and accounts latency, tokens and cost. The handle is cheap to
//! clone; state sits behind a mutex that is never held while the executor
//! runs, so executors may re-enter `intercept` (nested `reflect`/`compose`).

pub mod cache;
pub mod report;
pub mod trace;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::core::ast::Primitive;
use crate::io::atomic_write;

pub use cache::{CacheEntry, PrimitiveCache};
pub use report::{Bundle, Report, SalStats, BUNDLE_VERSION};
pub use trace::{Boundary, Dag, Domain, TokenCounts, TraceNode};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SalConfig {
    pub cache_enabled: bool,
    pub max_cache_entries: usize,
    /// `None` keeps entries until evicted.
    pub cache_ttl_secs: Option<u64>,
    /// Characters of input/output kept on each trace node.
    pub truncate_len: usize,
    pub input_cost_per_1k: f64,
    pub output_cost_per_1k: f64,
}

impl Default for SalConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            max_cache_entries: 1024,
            cache_ttl_secs: None,
            truncate_len: 80,
            input_cost_per_1k: 0.0005,
            output_cost_per_1k: 0.0015,
        }
    }
}

#[derive(Debug, Error)]
pub enum SalError {
    #[error("bundle i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("bundle is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported bundle version {0} (expected {expected})", expected = BUNDLE_VERSION)]
    UnsupportedVersion(u32),
}

/// Per-call facts the caller knows and SAL does not.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    pub model: Option<String>,
    pub metadata: BTreeMap<String, Json>,
}

#[derive(Debug, Clone)]
pub struct Intercepted {
    pub output: Json,
    pub node: TraceNode,
    pub cache_hit: bool,
}

pub fn is_cacheable(p: Primitive) -> bool {
    matches!(p, Primitive::Infer | Primitive::Embed | Primitive::SemanticSearch)
}

pub fn domain_of(p: Primitive) -> Domain {
    match p {
        Primitive::Infer | Primitive::Embed | Primitive::SemanticSearch => Domain::Stochastic,
        Primitive::PromptTemplate => Domain::Deterministic,
        Primitive::PipeCompose | Primitive::ReflectExec => Domain::Hybrid,
    }
}

/// Primitives billed per token.
pub fn is_text_generating(p: Primitive) -> bool {
    p == Primitive::Infer
}

#[derive(Debug)]
struct SalState {
    session: String,
    config: SalConfig,
    cache: PrimitiveCache,
    trace: Vec<TraceNode>,
    imported_trace: Vec<TraceNode>,
    /// Open primitive calls, per calling thread.
    parents: HashMap<ThreadId, Vec<u64>>,
    boundaries: Vec<Boundary>,
    stats: SalStats,
}

impl SalState {
    fn next_id(&self) -> u64 {
        self.trace.len() as u64 + 1
    }

    fn current_parent(&self) -> Option<u64> {
        self.parents
            .get(&thread::current().id())
            .and_then(|stack| stack.last().copied())
    }

    fn open_call(&mut self, id: u64) {
        self.parents.entry(thread::current().id()).or_default().push(id);
    }

    fn close_call(&mut self, id: u64) {
        let tid = thread::current().id();
        if let Some(stack) = self.parents.get_mut(&tid) {
            if let Some(pos) = stack.iter().rposition(|p| *p == id) {
                stack.truncate(pos);
            }
            if stack.is_empty() {
                self.parents.remove(&tid);
            }
        }
    }
}

#[derive(Clone, Debug)]
pub struct Sal {
    inner: Arc<Mutex<SalState>>,
}

impl Default for Sal {
    fn default() -> Self {
        Self::new(SalConfig::default())
    }
}

impl Sal {
    pub fn new(config: SalConfig) -> Self {
        let session = format!("s-{}", Utc::now().format("%Y%m%dT%H%M%S%.3fZ"));
        Self::with_session(config, session)
    }

    pub fn with_session(config: SalConfig, session: impl Into<String>) -> Self {
        let cache = PrimitiveCache::new(
            config.max_cache_entries,
            config.cache_ttl_secs.map(Duration::from_secs),
        );
        Self {
            inner: Arc::new(Mutex::new(SalState {
                session: session.into(),
                config,
                cache,
                trace: Vec::new(),
                imported_trace: Vec::new(),
                parents: HashMap::new(),
                boundaries: Vec::new(),
                stats: SalStats::default(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SalState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn session(&self) -> String {
        self.state().session.clone()
    }

    pub fn config(&self) -> SalConfig {
        self.state().config.clone()
    }

    /// Runs `executor` under instrumentation (or serves it from the cache).
    /// Executor errors are recorded on the node and then returned unchanged.
    pub fn intercept<E, F>(
        &self,
        primitive: Primitive,
        args: &Json,
        context: &CallContext,
        executor: F,
    ) -> Result<Intercepted, E>
    where
        E: fmt::Display,
        F: FnOnce(&Json) -> Result<Json, E>,
    {
        let canonical = trace::canonical_json(args);
        let hash = trace::input_hash(primitive.name(), &canonical);
        let use_cache = is_cacheable(primitive);

        // Phase 1: cache lookup or open a pending node.
        let (index, id) = {
            let mut st = self.state();
            st.stats.calls += 1;
            let truncate_len = st.config.truncate_len;
            let cache_on = use_cache && st.config.cache_enabled;
            let parent_id = st.current_parent();
            let id = st.next_id();

            if cache_on {
                if let Some(entry) = st.cache.get(&hash, Utc::now().timestamp_millis()) {
                    st.stats.cache_hits += 1;
                    let node = TraceNode {
                        id,
                        domain: domain_of(primitive),
                        primitive: Some(primitive.name().to_string()),
                        input_hash: hash.clone(),
                        output_hash: Some(entry.output_hash.clone()),
                        truncated_input: trace::truncate(&display_text(args), truncate_len),
                        truncated_output: Some(trace::truncate(&display_text(&entry.output), truncate_len)),
                        parent_id,
                        timestamp: Utc::now().to_rfc3339(),
                        latency_ms: 0.0,
                        cache_hit: true,
                        model_id: context.model.clone(),
                        token_counts: None,
                        estimated_cost: 0.0,
                        error: None,
                        metadata: context.metadata.clone(),
                    };
                    st.trace.push(node.clone());
                    debug!(primitive = primitive.name(), id, hash = %&hash[..12], "cache hit");
                    return Ok(Intercepted {
                        output: entry.output,
                        node,
                        cache_hit: true,
                    });
                }
                st.stats.cache_misses += 1;
            }

            st.trace.push(TraceNode {
                id,
                domain: domain_of(primitive),
                primitive: Some(primitive.name().to_string()),
                input_hash: hash.clone(),
                output_hash: None,
                truncated_input: trace::truncate(&display_text(args), truncate_len),
                truncated_output: None,
                parent_id,
                timestamp: Utc::now().to_rfc3339(),
                latency_ms: 0.0,
                cache_hit: false,
                model_id: context.model.clone(),
                token_counts: None,
                estimated_cost: 0.0,
                error: None,
                metadata: context.metadata.clone(),
            });
            st.open_call(id);
            (st.trace.len() - 1, id)
        };

        // Phase 2: run without holding the lock.
        trace!(primitive = primitive.name(), id, "executing");
        let started = Instant::now();
        let result = executor(args);
        let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

        // Phase 3: complete the node.
        let mut st = self.state();
        st.close_call(id);
        st.stats.total_latency_ms += latency_ms;
        let truncate_len = st.config.truncate_len;
        let (in_rate, out_rate) = (st.config.input_cost_per_1k, st.config.output_cost_per_1k);
        let cache_on = use_cache && st.config.cache_enabled;

        match result {
            Ok(output) => {
                let output_canonical = trace::canonical_json(&output);
                let output_hash = trace::content_hash(&output_canonical);
                let (tokens, cost) = if is_text_generating(primitive) {
                    let input = first_text(args);
                    let counts = TokenCounts {
                        input: trace::estimate_tokens(&input),
                        output: trace::estimate_tokens(&display_text(&output)),
                    };
                    let cost = counts.input as f64 / 1000.0 * in_rate
                        + counts.output as f64 / 1000.0 * out_rate;
                    (Some(counts), cost)
                } else {
                    (None, 0.0)
                };
                if let Some(t) = tokens {
                    st.stats.tokens_in += t.input;
                    st.stats.tokens_out += t.output;
                }
                st.stats.total_cost += cost;

                if cache_on {
                    let now = Utc::now();
                    st.cache.put(CacheEntry {
                        input_hash: hash.clone(),
                        primitive: primitive.name().to_string(),
                        output: output.clone(),
                        output_hash: output_hash.clone(),
                        created_at: now.to_rfc3339(),
                        created_at_ms: now.timestamp_millis(),
                        hit_count: 0,
                        last_used: 0,
                        pinned: false,
                    });
                }

                let node = &mut st.trace[index];
                node.output_hash = Some(output_hash);
                node.truncated_output = Some(trace::truncate(&display_text(&output), truncate_len));
                node.latency_ms = latency_ms;
                node.token_counts = tokens;
                node.estimated_cost = cost;
                let node = node.clone();
                debug!(primitive = primitive.name(), id, latency_ms, cost, "primitive executed");
                Ok(Intercepted {
                    output,
                    node,
                    cache_hit: false,
                })
            }
            Err(e) => {
                st.stats.errors += 1;
                let node = &mut st.trace[index];
                node.latency_ms = latency_ms;
                node.error = Some(e.to_string());
                warn!(primitive = primitive.name(), id, error = %e, "primitive failed");
                Err(e)
            }
        }
    }

    /// Records a deterministic step (e.g. a user function call) as a
    /// completed node under the active call.
    pub fn record_deterministic(&self, kind: &str, input: &Json, output: &Json) -> TraceNode {
        let mut st = self.state();
        let truncate_len = st.config.truncate_len;
        let node = TraceNode {
            id: st.next_id(),
            domain: Domain::Deterministic,
            primitive: Some(kind.to_string()),
            input_hash: trace::input_hash(kind, &trace::canonical_json(input)),
            output_hash: Some(trace::content_hash(&trace::canonical_json(output))),
            truncated_input: trace::truncate(&display_text(input), truncate_len),
            truncated_output: Some(trace::truncate(&display_text(output), truncate_len)),
            parent_id: st.current_parent(),
            timestamp: Utc::now().to_rfc3339(),
            latency_ms: 0.0,
            cache_hit: false,
            model_id: None,
            token_counts: None,
            estimated_cost: 0.0,
            error: None,
            metadata: BTreeMap::new(),
        };
        st.trace.push(node.clone());
        node
    }

    pub fn mark_boundary(&self, label: &str, domain: Domain) -> Boundary {
        let mut st = self.state();
        let boundary = Boundary {
            label: label.to_string(),
            domain,
            after_node: st.trace.last().map(|n| n.id),
            timestamp: Utc::now().to_rfc3339(),
        };
        st.boundaries.push(boundary.clone());
        boundary
    }

    pub fn stats(&self) -> SalStats {
        self.state().stats.clone()
    }

    pub fn trace(&self) -> Vec<TraceNode> {
        self.state().trace.clone()
    }

    /// Trace nodes carried in by [`Sal::import`]; kept apart from this
    /// session's trace.
    pub fn imported_trace(&self) -> Vec<TraceNode> {
        self.state().imported_trace.clone()
    }

    pub fn boundaries(&self) -> Vec<Boundary> {
        self.state().boundaries.clone()
    }

    pub fn cache_len(&self) -> usize {
        self.state().cache.len()
    }

    pub fn report(&self) -> Json {
        let st = self.state();
        let report = Report {
            version: BUNDLE_VERSION,
            session: st.session.clone(),
            stats: st.stats.clone(),
            cache_entries: st.cache.len(),
            trace: st.trace.clone(),
            boundaries: st.boundaries.clone(),
        };
        serde_json::to_value(report).unwrap_or(Json::Null)
    }

    pub fn trace_log(&self) -> String {
        let st = self.state();
        report::format_trace_log(&st.trace, &st.boundaries)
    }

    pub fn dag(&self) -> Dag {
        Dag::from_nodes(&self.state().trace)
    }

    pub fn export(&self) -> Bundle {
        let st = self.state();
        Bundle {
            version: BUNDLE_VERSION,
            session: st.session.clone(),
            cache: st.cache.snapshot(),
            trace: st.trace.clone(),
        }
    }

    pub fn export_json(&self) -> Result<String, SalError> {
        Ok(serde_json::to_string_pretty(&self.export())?)
    }

    pub fn export_to(&self, path: impl AsRef<Path>) -> Result<(), SalError> {
        let json = self.export_json()?;
        atomic_write(path, json)?;
        Ok(())
    }

    /// Loads a bundle's cache entries (pinned) and keeps its trace for
    /// reference. Returns the number of cache entries loaded.
    pub fn import(&self, bundle: Bundle) -> Result<usize, SalError> {
        if bundle.version != BUNDLE_VERSION {
            return Err(SalError::UnsupportedVersion(bundle.version));
        }
        let mut st = self.state();
        let count = bundle.cache.len();
        for entry in bundle.cache {
            st.cache.put_pinned(entry);
        }
        st.imported_trace.extend(bundle.trace);
        debug!(entries = count, from = %bundle.session, "bundle imported");
        Ok(count)
    }

    pub fn import_json(&self, json: &str) -> Result<usize, SalError> {
        self.import(serde_json::from_str(json)?)
    }

    pub fn import_from(&self, path: impl AsRef<Path>) -> Result<usize, SalError> {
        let text = std::fs::read_to_string(path)?;
        self.import_json(&text)
    }
}

/// Strings as-is, everything else as compact JSON.
fn display_text(value: &Json) -> String {
    match value {
        Json::String(s) => s.clone(),
        other => trace::canonical_json(other),
    }
}

/// The prompt of a text call: the first argument when args form an array.
fn first_text(args: &Json) -> String {
    match args {
        Json::Array(items) => items.first().map(display_text).unwrap_or_default(),
        other => display_text(other),
    }
}
