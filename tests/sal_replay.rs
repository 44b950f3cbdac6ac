use std::sync::{Arc, Barrier};

use anyhow::bail;
use cellscript::ai::{DryRun, InferenceBackend};
use cellscript::core::symbols::SymbolTable;
use cellscript::sal::Domain;
use cellscript::{Error, ErrorKind, Interpreter, InterpreterOptions, Sal, SalConfig};

/// Backend that refuses every call; proves a run was served from cache.
struct Offline;

impl InferenceBackend for Offline {
    fn name(&self) -> &'static str {
        "offline"
    }
    fn default_model(&self) -> &str {
        "gpt-4o-mini"
    }
    fn default_max_tokens(&self) -> u32 {
        256
    }
    fn infer(&self, _prompt: &str, _model: &str, _max_tokens: u32) -> anyhow::Result<String> {
        bail!("network unavailable")
    }
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f64>> {
        bail!("network unavailable")
    }
}

/// Backend whose `infer` calls rendezvous, so two threads are inside the
/// layer at the same time.
struct Rendezvous(Barrier);

impl InferenceBackend for Rendezvous {
    fn name(&self) -> &'static str {
        "rendezvous"
    }
    fn default_model(&self) -> &str {
        "gpt-4o-mini"
    }
    fn default_max_tokens(&self) -> u32 {
        256
    }
    fn infer(&self, prompt: &str, _model: &str, _max_tokens: u32) -> anyhow::Result<String> {
        self.0.wait();
        Ok(format!("seen {prompt}"))
    }
    fn embed(&self, _text: &str) -> anyhow::Result<Vec<f64>> {
        bail!("not used")
    }
}

fn interpreter(sal: &Sal, backend: Arc<dyn InferenceBackend>) -> Interpreter {
    Interpreter::with_parts(InterpreterOptions::default(), sal.clone(), backend)
}

fn cells(readable: &str) -> String {
    SymbolTable::standard().spell(readable)
}

#[test]
fn scenario_d_dry_run_infer_records_one_stochastic_node() {
    let sal = Sal::default();
    let mut interp = interpreter(&sal, Arc::new(DryRun::default()));
    let prompt = "Summarize the history of braille writing in one short paragraph";
    let exec = interp
        .run_source(&cells(&format!("print(infer(\"{prompt}\"))")))
        .unwrap();

    let preview: String = prompt.chars().take(48).collect();
    assert_eq!(exec.output_lines, vec![format!("[dry-run:gpt-4o-mini] {preview}…")]);

    let trace = sal.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].domain, Domain::Stochastic);
    assert_eq!(trace[0].primitive.as_deref(), Some("infer"));
    assert_eq!(trace[0].model_id.as_deref(), Some("gpt-4o-mini"));
    assert!(!trace[0].cache_hit);
    assert!(trace[0].estimated_cost > 0.0);
}

#[test]
fn identical_calls_hit_the_cache() {
    let sal = Sal::default();
    let mut interp = interpreter(&sal, Arc::new(DryRun::default()));
    interp
        .run_source(&cells(r#"
            let a = infer("same prompt")
            let b = infer("same prompt")
            print(a == b)
        "#))
        .unwrap();

    let trace = sal.trace();
    assert_eq!(trace.len(), 2);
    assert!(!trace[0].cache_hit);
    assert!(trace[1].cache_hit);
    assert_eq!(trace[1].latency_ms, 0.0);
    assert_eq!(trace[1].estimated_cost, 0.0);
    assert_eq!(trace[0].output_hash, trace[1].output_hash);

    let stats = sal.stats();
    assert_eq!(stats.cache_hits, 1);
    assert_eq!(stats.cache_misses, 1);
}

#[test]
fn different_models_are_different_cache_keys() {
    let sal = Sal::default();
    let mut interp = interpreter(&sal, Arc::new(DryRun::default()));
    let exec = interp
        .run_source(&cells(r#"
            print(infer("p", "model-a"))
            print(infer("p", "model-b"))
        "#))
        .unwrap();
    assert_eq!(exec.output_lines, vec!["[dry-run:model-a] p", "[dry-run:model-b] p"]);
    assert!(sal.trace().iter().all(|n| !n.cache_hit));
}

#[test]
fn nested_primitives_form_a_dag() {
    let sal = Sal::default();
    let mut interp = interpreter(&sal, Arc::new(DryRun::default()));
    interp
        .run_source(&cells(r#"
            fn ask(x) { infer("about " + x) }
            fn inner() { infer("inner") }
            let out = compose("cells", ask)
            let again = reflect("inner()")
            print(prompt("{a}-{b}", { a: 1 }))
        "#))
        .unwrap();

    let trace = sal.trace();
    let names: Vec<&str> = trace.iter().filter_map(|n| n.primitive.as_deref()).collect();
    assert_eq!(names, vec!["pipeCompose", "infer", "reflectExec", "infer", "promptTemplate"]);

    for node in &trace {
        if let Some(parent) = node.parent_id {
            assert!(parent < node.id, "parent {parent} must precede {}", node.id);
            assert!(trace.iter().any(|n| n.id == parent));
        }
    }
    assert_eq!(trace[1].parent_id, Some(trace[0].id));
    assert_eq!(trace[3].parent_id, Some(trace[2].id));
    assert_eq!(trace[4].parent_id, None);
    assert_eq!(trace[0].domain, Domain::Hybrid);
    assert_eq!(trace[4].domain, Domain::Deterministic);

    let dag = sal.dag();
    assert_eq!(dag.roots().count(), 3);
    assert!(dag.edges.contains(&(trace[0].id, trace[1].id)));
}

#[test]
fn prompt_fills_known_placeholders_only() {
    let mut interp = Interpreter::new();
    let exec = interp
        .run_source(&cells(r#"print(prompt("Hi {name}, {other}", { name: "Ada" }))"#))
        .unwrap();
    assert_eq!(exec.output_lines, vec!["Hi Ada, {other}"]);
}

#[test]
fn search_ranks_by_similarity() {
    let mut interp = Interpreter::new();
    let exec = interp
        .run_source(&cells(r#"
            print(search("cat", ["dog", "cat", "fish"], 1))
            print(len(search("cat", ["a", "b", "c", "d", "e"])))
            print(len(embed("x")))
        "#))
        .unwrap();
    assert_eq!(exec.output_lines, vec!["[cat]", "3", "8"]);
}

#[test]
fn backend_failures_are_recorded_then_raised() {
    let sal = Sal::default();
    let mut interp = interpreter(&sal, Arc::new(Offline));
    match interp.run_source(&cells("infer(\"x\")")) {
        Err(Error::Runtime(e)) => {
            assert_eq!(e.kind, ErrorKind::PrimitiveExecution);
            assert!(e.message.contains("network unavailable"), "{}", e.message);
        }
        other => panic!("unexpected {other:?}"),
    }
    let trace = sal.trace();
    assert_eq!(trace.len(), 1);
    assert!(trace[0].error.as_deref().unwrap_or("").contains("network unavailable"));
    assert_eq!(sal.stats().errors, 1);
    assert_eq!(sal.cache_len(), 0);

    // and they are catchable
    let out = interp
        .run_source(&cells("try { embed(\"x\") } catch (e) { print(\"offline\") }"))
        .unwrap();
    assert_eq!(out.output_lines, vec!["offline"]);
}

#[test]
fn exported_bundle_replays_without_the_backend() {
    let program = cells(r#"
        let s = infer("write a haiku about dots")
        let v = embed("dots")
        print(s, len(v))
    "#);

    let first = Sal::default();
    let exec1 = interpreter(&first, Arc::new(DryRun::default()))
        .run_source(&program)
        .unwrap();
    let bundle = first.export_json().unwrap();

    // TTL 0 would expire ordinary entries immediately; imported ones are pinned.
    let second = Sal::new(SalConfig {
        cache_ttl_secs: Some(0),
        ..SalConfig::default()
    });
    assert_eq!(second.import_json(&bundle).unwrap(), 2);
    let exec2 = interpreter(&second, Arc::new(Offline))
        .run_source(&program)
        .unwrap();

    assert_eq!(exec1.output_lines, exec2.output_lines);
    assert!(second.trace().iter().all(|n| n.cache_hit));
    assert_eq!(second.imported_trace().len(), 2);
}

#[test]
fn deterministic_calls_are_traced_when_enabled() {
    let sal = Sal::default();
    let options = InterpreterOptions {
        trace_deterministic: true,
        ..InterpreterOptions::default()
    };
    let mut interp = Interpreter::with_parts(options, sal.clone(), Arc::new(DryRun::default()));
    interp
        .run_source(&cells("fn add(a, b) { a + b }\nadd(1, 2)\nboundary(\"done\")"))
        .unwrap();

    let trace = sal.trace();
    assert_eq!(trace.len(), 1);
    assert_eq!(trace[0].domain, Domain::Deterministic);
    assert_eq!(trace[0].primitive.as_deref(), Some("call:add"));
    assert_eq!(trace[0].truncated_output.as_deref(), Some("3"));

    let boundaries = sal.boundaries();
    assert_eq!(boundaries.len(), 1);
    assert_eq!(boundaries[0].label, "done");
    assert_eq!(boundaries[0].after_node, Some(trace[0].id));
    assert!(sal.trace_log().contains("-- done [deterministic] --"));
}

#[test]
fn one_sal_is_shared_across_threads() {
    let sal = Sal::default();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let sal = sal.clone();
            std::thread::spawn(move || {
                let mut interp = Interpreter::with_parts(
                    InterpreterOptions::default(),
                    sal,
                    Arc::new(DryRun::default()),
                );
                interp
                    .run_source(&SymbolTable::standard().spell("infer(\"shared\")"))
                    .unwrap()
                    .output_lines
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    let stats = sal.stats();
    assert_eq!(stats.calls, 4);
    assert_eq!(stats.cache_hits + stats.cache_misses, 4);
    assert_eq!(sal.cache_len(), 1);
    assert!(sal.trace().iter().all(|n| n.parent_id.is_none()));
}

#[test]
fn concurrent_calls_do_not_adopt_another_threads_parent() {
    let sal = Sal::default();
    let backend: Arc<dyn InferenceBackend> = Arc::new(Rendezvous(Barrier::new(2)));
    let spawn = |readable: &'static str| {
        let sal = sal.clone();
        let backend = backend.clone();
        std::thread::spawn(move || {
            interpreter(&sal, backend)
                .run_source(&cells(readable))
                .unwrap()
                .output_lines
        })
    };
    // The nested infer blocks until the top-level one has opened its node.
    let composed = spawn("fn ask(x) { infer(x) }\nprint(compose(\"nested\", ask))");
    let plain = spawn("print(infer(\"top\"))");
    assert_eq!(composed.join().unwrap(), vec!["seen nested"]);
    assert_eq!(plain.join().unwrap(), vec!["seen top"]);

    let trace = sal.trace();
    let by_prompt = |name: &str, text: &str| {
        trace
            .iter()
            .find(|n| {
                n.primitive.as_deref() == Some(name)
                    && n.truncated_output.as_deref().is_some_and(|o| o.contains(text))
            })
            .unwrap_or_else(|| panic!("no {name} node for {text}: {trace:?}"))
    };
    let compose = by_prompt("pipeCompose", "nested");
    let nested = by_prompt("infer", "nested");
    let top = by_prompt("infer", "top");
    assert_eq!(nested.parent_id, Some(compose.id));
    assert_eq!(top.parent_id, None);
    assert_eq!(compose.parent_id, None);
}
