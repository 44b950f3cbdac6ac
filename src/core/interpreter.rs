//! Tree-walking interpreter over the AST.
//!
//! Scoping: one child `Environment` per block, call and for-each iteration.
//! AI primitives are routed through SAL; the inference backend is injected.

use std::collections::BTreeMap;
use std::mem;
use std::rc::Rc;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tracing::{debug, trace, warn};

use crate::ai::{DryRun, InferenceBackend};
use crate::core::ast::{AstNode, FunctionBody, FunctionDef, LogicalOp, Pos, Primitive, UnaryOp};
use crate::core::builtins;
use crate::core::environment::Environment;
use crate::core::error::{Error, ErrorKind, RuntimeError};
use crate::core::lexer::{Lexer, LexerOptions};
use crate::core::parser::parse;
use crate::core::symbols::{is_alphabet, Operator, SymbolTable};
use crate::core::value::{Class, Function, Instance, MethodBinding, Value};
use crate::sal::{CallContext, Sal};

/// Remaining stack below which evaluation moves to a fresh segment.
const STACK_RED_ZONE: usize = 128 * 1024;
const STACK_GROW_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct InterpreterOptions {
    /// Iteration cap for `loop`.
    pub max_loop_iterations: u64,
    pub max_call_depth: usize,
    pub max_reflect_depth: usize,
    /// Record user function calls as deterministic trace nodes.
    pub trace_deterministic: bool,
    pub lenient_literals: bool,
}

impl Default for InterpreterOptions {
    fn default() -> Self {
        Self {
            max_loop_iterations: 100_000,
            max_call_depth: 200,
            max_reflect_depth: 8,
            trace_deterministic: false,
            lenient_literals: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecStats {
    pub statements: u64,
    pub calls: u64,
    pub primitive_calls: u64,
    pub loop_iterations: u64,
    pub deepest_call: usize,
}

#[derive(Debug)]
pub struct Execution {
    pub output_lines: Vec<String>,
    /// Value of the last top-level statement (or of a top-level `return`).
    pub result: Value,
    pub stats: ExecStats,
    /// The program stopped at `halt`.
    pub halted: bool,
}

enum Flow {
    Normal(Value),
    Return(Value),
    Break,
    Continue,
}

struct Frame {
    binding: Option<MethodBinding>,
    /// Collects `yield`ed values for generator-like functions.
    yields: Option<Vec<Value>>,
}

pub struct Interpreter {
    env: Environment,
    options: InterpreterOptions,
    sal: Sal,
    backend: Arc<dyn InferenceBackend>,
    output: Vec<String>,
    frames: Vec<Frame>,
    reflect_depth: usize,
    stats: ExecStats,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self::new()
    }
}

impl Interpreter {
    pub fn new() -> Self {
        Self::with_parts(InterpreterOptions::default(), Sal::default(), Arc::new(DryRun::default()))
    }

    pub fn with_parts(options: InterpreterOptions, sal: Sal, backend: Arc<dyn InferenceBackend>) -> Self {
        let env = Environment::new();
        // Fresh scope: defining builtins cannot collide.
        let _ = builtins::install(&env);
        Self {
            env,
            options,
            sal,
            backend,
            output: Vec::new(),
            frames: Vec::new(),
            reflect_depth: 0,
            stats: ExecStats::default(),
        }
    }

    pub fn with_options(mut self, options: InterpreterOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_sal(mut self, sal: Sal) -> Self {
        self.sal = sal;
        self
    }

    pub fn with_backend(mut self, backend: Arc<dyn InferenceBackend>) -> Self {
        self.backend = backend;
        self
    }

    pub fn sal(&self) -> &Sal {
        &self.sal
    }

    pub fn options(&self) -> &InterpreterOptions {
        &self.options
    }

    /// Every line printed so far, including by a run that later failed.
    pub fn output(&self) -> &[String] {
        &self.output
    }

    pub fn globals(&self) -> &Environment {
        &self.env
    }

    /// Tokenizes, parses and executes cell source.
    pub fn run_source(&mut self, source: &str) -> Result<Execution, Error> {
        let program = self.parse_source(source)?;
        Ok(self.execute(&program)?)
    }

    fn parse_source(&self, source: &str) -> Result<AstNode, Error> {
        let lex_options = LexerOptions {
            lenient_literals: self.options.lenient_literals,
        };
        let tokens = Lexer::with_options(source, lex_options).tokenize()?;
        Ok(parse(tokens)?)
    }

    pub fn execute(&mut self, program: &AstNode) -> Result<Execution, RuntimeError> {
        let first_line = self.output.len();
        let stats_before = self.stats.clone();
        let stmts: &[AstNode] = match program {
            AstNode::Program(items) | AstNode::Block(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };

        let mut halted = false;
        let result = match self.exec_sequence(stmts) {
            Ok(Flow::Normal(v)) | Ok(Flow::Return(v)) => v,
            Ok(Flow::Break) | Ok(Flow::Continue) => Value::Null,
            Err(e) if e.kind == ErrorKind::Halt => {
                debug!("program halted");
                halted = true;
                Value::Null
            }
            Err(e) => {
                debug!(error = %e, "execution failed");
                return Err(e);
            }
        };
        let stats = ExecStats {
            statements: self.stats.statements - stats_before.statements,
            calls: self.stats.calls - stats_before.calls,
            primitive_calls: self.stats.primitive_calls - stats_before.primitive_calls,
            loop_iterations: self.stats.loop_iterations - stats_before.loop_iterations,
            deepest_call: self.stats.deepest_call,
        };
        debug!(lines = self.output.len() - first_line, ?stats, "execution finished");
        Ok(Execution {
            output_lines: self.output[first_line..].to_vec(),
            result,
            stats,
            halted,
        })
    }

    /// Runs `f` with `env` as the current scope, restoring the previous
    /// scope on every exit path.
    fn in_scope<T>(
        &mut self,
        env: Environment,
        f: impl FnOnce(&mut Self) -> Result<T, RuntimeError>,
    ) -> Result<T, RuntimeError> {
        let saved = mem::replace(&mut self.env, env);
        let out = f(self);
        self.env = saved;
        out
    }

    /// Executes statements in the current scope; the flow carries the
    /// value of the last statement.
    fn exec_sequence(&mut self, stmts: &[AstNode]) -> Result<Flow, RuntimeError> {
        let mut last = Value::Null;
        for s in stmts {
            match self.exec(s)? {
                Flow::Normal(v) => last = v,
                other => return Ok(other),
            }
        }
        Ok(Flow::Normal(last))
    }

    fn exec_block(&mut self, stmts: &[AstNode]) -> Result<Flow, RuntimeError> {
        let scope = self.env.child();
        self.in_scope(scope, |this| this.exec_sequence(stmts))
    }

    fn exec(&mut self, node: &AstNode) -> Result<Flow, RuntimeError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.exec_inner(node))
    }

    fn exec_inner(&mut self, node: &AstNode) -> Result<Flow, RuntimeError> {
        self.stats.statements += 1;
        match node {
            AstNode::Let {
                name,
                value,
                constant,
                pos,
            } => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                self.env.define(name, v, *constant).map_err(|e| e.at(*pos))?;
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::FunctionDecl(def) => {
                let func = Value::Function(Rc::new(Function {
                    def: def.clone(),
                    closure: self.env.clone(),
                    bound: None,
                }));
                self.env
                    .define(def.display_name(), func, false)
                    .map_err(|e| e.at(def.pos))?;
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::ClassDecl {
                name,
                parent,
                methods,
                pos,
            } => {
                let parent = match parent {
                    Some(p) => match self.env.get(p).map_err(|e| e.at(*pos))? {
                        Value::Class(c) => Some(c),
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "class {name} cannot extend {}",
                                other.type_name()
                            ))
                            .at(*pos))
                        }
                    },
                    None => None,
                };
                let methods = methods
                    .iter()
                    .map(|m| (m.display_name().to_string(), m.clone()))
                    .collect();
                let class = Class {
                    name: name.clone(),
                    methods,
                    parent,
                    closure: self.env.clone(),
                };
                self.env
                    .define(name, Value::Class(Rc::new(class)), false)
                    .map_err(|e| e.at(*pos))?;
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::Import { module, pos } => {
                let value = builtins::module(module).ok_or_else(|| {
                    RuntimeError::new(ErrorKind::UnboundName, format!("no module named '{module}'")).at(*pos)
                })?;
                self.env.define(module, value, false).map_err(|e| e.at(*pos))?;
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::Block(stmts) => self.exec_block(stmts),
            AstNode::Print(args) => {
                let mut parts = Vec::with_capacity(args.len());
                for a in args {
                    parts.push(self.eval(a)?.to_string());
                }
                let line = parts.join(" ");
                trace!(%line, "print");
                self.output.push(line);
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::Return(value) => {
                let v = match value {
                    Some(e) => self.eval(e)?,
                    None => Value::Null,
                };
                Ok(Flow::Return(v))
            }
            AstNode::Yield(e) => {
                let v = self.eval(e)?;
                match self.frames.last_mut().and_then(|f| f.yields.as_mut()) {
                    Some(yields) => {
                        yields.push(v);
                        Ok(Flow::Normal(Value::Null))
                    }
                    None => Err(RuntimeError::type_mismatch("yield outside of a function")),
                }
            }
            AstNode::Break => Ok(Flow::Break),
            AstNode::Continue => Ok(Flow::Continue),
            AstNode::Halt => Err(RuntimeError::halt()),
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if self.eval(condition)?.truthy() {
                    self.exec(then_branch)
                } else if let Some(e) = else_branch {
                    self.exec(e)
                } else {
                    Ok(Flow::Normal(Value::Null))
                }
            }
            AstNode::While { condition, body } => {
                while self.eval(condition)?.truthy() {
                    self.stats.loop_iterations += 1;
                    match self.exec(body)? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal(_) | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::Loop(body) => self.exec_forever(body),
            AstNode::ForEach {
                var,
                iterable,
                body,
            } => {
                let items = iteration_items(&self.eval(iterable)?);
                for item in items {
                    self.stats.loop_iterations += 1;
                    let scope = self.env.child();
                    scope.define(var, item, false)?;
                    match self.in_scope(scope, |this| this.exec(body))? {
                        Flow::Break => break,
                        Flow::Return(v) => return Ok(Flow::Return(v)),
                        Flow::Normal(_) | Flow::Continue => {}
                    }
                }
                Ok(Flow::Normal(Value::Null))
            }
            AstNode::Try {
                body,
                catch_name,
                handler,
            } => match self.exec(body) {
                Err(e) if e.kind.is_catchable() => {
                    debug!(error = %e, "caught");
                    let scope = self.env.child();
                    if let Some(name) = catch_name {
                        scope.define(name, Value::Str(e.to_string()), false)?;
                    }
                    self.in_scope(scope, |this| this.exec(handler))
                }
                other => other,
            },
            AstNode::Switch {
                subject,
                cases,
                default,
            } => {
                let subject = self.eval(subject)?;
                for case in cases {
                    if self.eval(&case.value)?.try_eq(&subject)? {
                        return self.exec_switch_body(&case.body);
                    }
                }
                match default {
                    Some(body) => self.exec_switch_body(body),
                    None => Ok(Flow::Normal(Value::Null)),
                }
            }
            // Expression statements
            _ => Ok(Flow::Normal(self.eval(node)?)),
        }
    }

    /// `break` leaves the switch; `continue` and `return` propagate.
    fn exec_switch_body(&mut self, body: &[AstNode]) -> Result<Flow, RuntimeError> {
        match self.exec_block(body)? {
            Flow::Break => Ok(Flow::Normal(Value::Null)),
            other => Ok(other),
        }
    }

    fn exec_forever(&mut self, body: &AstNode) -> Result<Flow, RuntimeError> {
        let cap = self.options.max_loop_iterations;
        let mut n = 0u64;
        loop {
            if n >= cap {
                warn!(cap, "loop iteration cap reached");
                self.output
                    .push(format!("[loop] iteration cap of {cap} reached, exiting loop"));
                break;
            }
            n += 1;
            self.stats.loop_iterations += 1;
            match self.exec(body)? {
                Flow::Break => break,
                Flow::Return(v) => return Ok(Flow::Return(v)),
                Flow::Normal(_) | Flow::Continue => {}
            }
        }
        Ok(Flow::Normal(Value::Null))
    }

    fn eval(&mut self, node: &AstNode) -> Result<Value, RuntimeError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.eval_inner(node))
    }

    fn eval_inner(&mut self, node: &AstNode) -> Result<Value, RuntimeError> {
        Ok(match node {
            AstNode::Number(n) => Value::Number(*n),
            AstNode::Str(s) => Value::Str(s.clone()),
            AstNode::Bool(b) => Value::Bool(*b),
            AstNode::Null => Value::Null,
            AstNode::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for it in items {
                    out.push(self.eval(it)?);
                }
                Value::array(out)
            }
            AstNode::Map(pairs) => {
                let mut map = BTreeMap::new();
                for (k, v) in pairs {
                    let key = self.eval(k)?.as_key();
                    map.insert(key, self.eval(v)?);
                }
                Value::map(map)
            }
            AstNode::Identifier { name, pos } => self.env.get(name).map_err(|e| e.at(*pos))?,
            AstNode::This(pos) => match self.current_binding() {
                Some(b) => Value::Instance(b.this),
                None => return Err(RuntimeError::type_mismatch("'this' outside of a method").at(*pos)),
            },
            AstNode::Super { method, pos } => self.eval_super(method).map_err(|e| e.at(*pos))?,
            AstNode::Assign { target, value, pos } => {
                let v = self.eval(value)?;
                self.assign(target, v.clone()).map_err(|e| e.at(*pos))?;
                v
            }
            AstNode::Lambda(def) => Value::Function(Rc::new(Function {
                def: def.clone(),
                closure: self.env.clone(),
                bound: None,
            })),
            AstNode::Binary { op, left, right, pos } => {
                let l = self.eval(left)?;
                let r = self.eval(right)?;
                eval_binop(*op, l, r).map_err(|e| e.at(*pos))?
            }
            AstNode::Logical { op, left, right } => {
                let l = self.eval(left)?.truthy();
                let result = match op {
                    LogicalOp::And => l && self.eval(right)?.truthy(),
                    LogicalOp::Or => l || self.eval(right)?.truthy(),
                };
                Value::Bool(result)
            }
            AstNode::Unary { op, operand, pos } => {
                let v = self.eval(operand)?;
                match op {
                    UnaryOp::Not => Value::Bool(!v.truthy()),
                    UnaryOp::Negate => match v {
                        Value::Number(n) => Value::Number(-n),
                        other => {
                            return Err(RuntimeError::type_mismatch(format!(
                                "unary '-' on {}",
                                other.type_name()
                            ))
                            .at(*pos))
                        }
                    },
                }
            }
            AstNode::Await(inner) => self.eval(inner)?,
            AstNode::Call { callee, args, pos } => {
                let callee_v = self.eval(callee)?;
                let argv = self.eval_args(args)?;
                self.call_value(callee_v, argv).map_err(|e| e.at(*pos))?
            }
            AstNode::Member { object, name, pos } => {
                let obj = self.eval(object)?;
                get_member(&obj, name).map_err(|e| e.at(*pos))?
            }
            AstNode::Index { object, index, pos } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                get_index(&obj, &idx).map_err(|e| e.at(*pos))?
            }
            AstNode::Primitive { primitive, args, pos } => {
                let argv = self.eval_args(args)?;
                self.call_primitive(*primitive, argv, *pos)
                    .map_err(|e| e.at(*pos))?
            }
            AstNode::Error(msg) => {
                return Err(RuntimeError::type_mismatch(format!("malformed node: {msg}")))
            }
            AstNode::Program(_)
            | AstNode::Let { .. }
            | AstNode::FunctionDecl(_)
            | AstNode::ClassDecl { .. }
            | AstNode::Import { .. }
            | AstNode::Block(_)
            | AstNode::Print(_)
            | AstNode::Return(_)
            | AstNode::Yield(_)
            | AstNode::Break
            | AstNode::Continue
            | AstNode::Halt
            | AstNode::If { .. }
            | AstNode::While { .. }
            | AstNode::Loop(_)
            | AstNode::ForEach { .. }
            | AstNode::Try { .. }
            | AstNode::Switch { .. } => match self.exec(node)? {
                Flow::Normal(v) | Flow::Return(v) => v,
                Flow::Break | Flow::Continue => Value::Null,
            },
        })
    }

    fn eval_args(&mut self, args: &[AstNode]) -> Result<Vec<Value>, RuntimeError> {
        let mut out = Vec::with_capacity(args.len());
        for a in args {
            out.push(self.eval(a)?);
        }
        Ok(out)
    }

    fn current_binding(&self) -> Option<MethodBinding> {
        self.frames.iter().rev().find_map(|f| f.binding.clone())
    }

    fn eval_super(&mut self, method: &str) -> Result<Value, RuntimeError> {
        let binding = self
            .current_binding()
            .ok_or_else(|| RuntimeError::type_mismatch("'super' outside of a method"))?;
        let parent = binding.owner.parent.clone().ok_or_else(|| {
            RuntimeError::type_mismatch(format!("class {} has no parent", binding.owner.name))
        })?;
        let (def, owner) = parent.find_method(method).ok_or_else(|| {
            RuntimeError::new(
                ErrorKind::UnboundName,
                format!("no method '{method}' above class {}", binding.owner.name),
            )
        })?;
        Ok(Value::Function(Rc::new(Function {
            def,
            closure: owner.closure.clone(),
            bound: Some(MethodBinding {
                this: binding.this,
                owner,
            }),
        })))
    }

    fn assign(&mut self, target: &AstNode, value: Value) -> Result<(), RuntimeError> {
        match target {
            AstNode::Identifier { name, .. } => self.env.set(name, value),
            AstNode::Member { object, name, .. } => match self.eval(object)? {
                Value::Instance(inst) => {
                    inst.fields.borrow_mut().insert(name.clone(), value);
                    Ok(())
                }
                Value::Map(m) => {
                    m.borrow_mut().insert(name.clone(), value);
                    Ok(())
                }
                other => Err(RuntimeError::type_mismatch(format!(
                    "cannot set member '{name}' on {}",
                    other.type_name()
                ))),
            },
            AstNode::Index { object, index, .. } => {
                let obj = self.eval(object)?;
                let idx = self.eval(index)?;
                match (&obj, &idx) {
                    (Value::Array(items), Value::Number(n)) => {
                        let mut items = items.borrow_mut();
                        let i = array_slot(*n, items.len())?;
                        items[i] = value;
                        Ok(())
                    }
                    (Value::Map(m), key) => {
                        m.borrow_mut().insert(key.as_key(), value);
                        Ok(())
                    }
                    _ => Err(RuntimeError::type_mismatch(format!(
                        "cannot index-assign {} with {}",
                        obj.type_name(),
                        idx.type_name()
                    ))),
                }
            }
            other => Err(RuntimeError::type_mismatch(format!(
                "invalid assignment target {other:?}"
            ))),
        }
    }

    pub fn call_value(&mut self, callee: Value, args: Vec<Value>) -> Result<Value, RuntimeError> {
        match callee {
            Value::Builtin(b) => {
                if b.arity != usize::MAX && b.arity != args.len() {
                    return Err(RuntimeError::type_mismatch(format!(
                        "builtin `{}` expected {} args, got {}",
                        b.name,
                        b.arity,
                        args.len()
                    )));
                }
                (b.f)(self, args)
            }
            Value::Function(f) => self.call_function(&f, args),
            Value::Class(class) => self.instantiate(class, args),
            other => Err(RuntimeError::type_mismatch(format!(
                "{} is not callable",
                other.type_name()
            ))),
        }
    }

    fn instantiate(&mut self, class: Rc<Class>, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let instance = Rc::new(Instance {
            class: class.clone(),
            fields: Default::default(),
        });
        if let Some((def, owner)) = class.find_method("init") {
            let init = Function {
                def,
                closure: owner.closure.clone(),
                bound: Some(MethodBinding {
                    this: instance.clone(),
                    owner,
                }),
            };
            self.call_function(&init, args)?;
        }
        Ok(Value::Instance(instance))
    }

    fn call_function(&mut self, f: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW_SIZE, || self.call_function_inner(f, args))
    }

    fn call_function_inner(&mut self, f: &Function, args: Vec<Value>) -> Result<Value, RuntimeError> {
        if self.frames.len() >= self.options.max_call_depth {
            return Err(RuntimeError::new(
                ErrorKind::RecursionLimit,
                format!("call depth exceeded {}", self.options.max_call_depth),
            ));
        }
        self.stats.calls += 1;
        let traced_args = if self.options.trace_deterministic {
            Some(Json::Array(
                args.iter().map(Value::to_json).collect::<Result<_, _>>()?,
            ))
        } else {
            None
        };

        let scope = f.closure.child();
        let mut args = args.into_iter();
        for p in &f.def.params {
            // missing → null, extra → dropped
            scope.define(p, args.next().unwrap_or(Value::Null), false)?;
        }

        self.frames.push(Frame {
            binding: f.bound.clone(),
            yields: f.def.is_generator().then(Vec::new),
        });
        self.stats.deepest_call = self.stats.deepest_call.max(self.frames.len());
        let def = f.def.clone();
        let result = self.in_scope(scope, |this| this.run_body(&def));
        let frame = self.frames.pop();
        let mut value = result?;

        if let Some(yields) = frame.and_then(|fr| fr.yields) {
            if !yields.is_empty() {
                value = Value::array(yields);
            }
        }
        if let Some(input) = traced_args {
            self.sal.record_deterministic(
                &format!("call:{}", def.display_name()),
                &input,
                &value.to_json()?,
            );
        }
        Ok(value)
    }

    fn run_body(&mut self, def: &FunctionDef) -> Result<Value, RuntimeError> {
        match &def.body {
            FunctionBody::Expr(e) => self.eval(e),
            FunctionBody::Block(stmts) => match self.exec_sequence(stmts)? {
                Flow::Normal(v) | Flow::Return(v) => Ok(v),
                Flow::Break | Flow::Continue => Ok(Value::Null),
            },
        }
    }

    // ---------- AI primitives ----------

    fn call_primitive(&mut self, primitive: Primitive, args: Vec<Value>, pos: Pos) -> Result<Value, RuntimeError> {
        self.stats.primitive_calls += 1;
        let sal = self.sal.clone();
        let backend = self.backend.clone();
        let mut context = CallContext::default();
        context.metadata.insert("line".into(), Json::from(pos.line));
        context.metadata.insert("col".into(), Json::from(pos.col));

        match primitive {
            Primitive::Infer => {
                let prompt = text_arg(args.first());
                let model = match args.get(1) {
                    Some(Value::Str(m)) => m.clone(),
                    _ => backend.default_model().to_string(),
                };
                let max_tokens = match args.get(2) {
                    Some(Value::Number(n)) if *n >= 1.0 => *n as u32,
                    _ => backend.default_max_tokens(),
                };
                context.model = Some(model.clone());
                let key = Json::Array(vec![
                    Json::String(prompt.clone()),
                    Json::String(model.clone()),
                    Json::from(max_tokens),
                ]);
                let out = sal.intercept(primitive, &key, &context, |_| {
                    backend
                        .infer(&prompt, &model, max_tokens)
                        .map(Json::String)
                        .map_err(|e| RuntimeError::primitive(format!("infer failed: {e:#}")))
                })?;
                Ok(Value::from_json(&out.output))
            }
            Primitive::Embed => {
                let text = text_arg(args.first());
                let key = Json::Array(vec![Json::String(text.clone())]);
                let out = sal.intercept(primitive, &key, &context, |_| {
                    backend
                        .embed(&text)
                        .map(|v| Json::Array(v.into_iter().map(Json::from).collect()))
                        .map_err(|e| RuntimeError::primitive(format!("embed failed: {e:#}")))
                })?;
                Ok(Value::from_json(&out.output))
            }
            Primitive::PromptTemplate => {
                let template = text_arg(args.first());
                let vars = args.get(1).cloned().unwrap_or(Value::Null);
                let key = Json::Array(vec![Json::String(template.clone()), vars.to_json()?]);
                let out = sal.intercept(primitive, &key, &context, |_| {
                    fill_template(&template, &vars).map(Json::String)
                })?;
                Ok(Value::from_json(&out.output))
            }
            Primitive::PipeCompose => {
                let mut args = args.into_iter();
                let seed = args.next().unwrap_or(Value::Null);
                let stages: Vec<Value> = args.collect();
                let mut key_items = vec![seed.to_json()?];
                for stage in &stages {
                    key_items.push(stage.to_json()?);
                }
                let key = Json::Array(key_items);

                let mut produced = None;
                sal.intercept(primitive, &key, &context, |_| {
                    let mut acc = seed;
                    for stage in stages {
                        acc = self.call_value(stage, vec![acc])?;
                    }
                    let json = acc.to_json()?;
                    produced = Some(acc);
                    Ok::<Json, RuntimeError>(json)
                })?;
                Ok(produced.unwrap_or(Value::Null))
            }
            Primitive::ReflectExec => {
                let source = text_arg(args.first());
                let key = Json::Array(vec![Json::String(source.clone())]);
                let mut produced = None;
                sal.intercept(primitive, &key, &context, |_| {
                    let v = self.reflect(&source)?;
                    let json = v.to_json()?;
                    produced = Some(v);
                    Ok::<Json, RuntimeError>(json)
                })?;
                Ok(produced.unwrap_or(Value::Null))
            }
            Primitive::SemanticSearch => {
                let query = text_arg(args.first());
                let docs: Vec<Value> = match args.get(1) {
                    Some(Value::Array(items)) => items.borrow().clone(),
                    Some(other) => {
                        return Err(RuntimeError::type_mismatch(format!(
                            "search expects an array of documents, got {}",
                            other.type_name()
                        )))
                    }
                    None => Vec::new(),
                };
                let k = match args.get(2) {
                    Some(Value::Number(n)) if *n >= 0.0 => *n as usize,
                    _ => DEFAULT_SEARCH_K,
                };
                let key = Json::Array(vec![
                    Json::String(query.clone()),
                    Json::Array(docs.iter().map(Value::to_json).collect::<Result<_, _>>()?),
                    Json::from(k),
                ]);
                let out = sal.intercept(primitive, &key, &context, |_| {
                    rank_documents(backend.as_ref(), &query, &docs, k)
                })?;
                Ok(Value::from_json(&out.output))
            }
        }
    }

    /// Runs source in the current scope. Readable spelling (no alphabet
    /// cells) is transliterated first.
    fn reflect(&mut self, source: &str) -> Result<Value, RuntimeError> {
        if self.reflect_depth >= self.options.max_reflect_depth {
            return Err(RuntimeError::new(
                ErrorKind::RecursionLimit,
                format!("reflect depth exceeded {}", self.options.max_reflect_depth),
            ));
        }
        let cells = if source.chars().any(is_alphabet) {
            source.to_string()
        } else {
            SymbolTable::standard().spell(source)
        };
        let program = self
            .parse_source(&cells)
            .map_err(|e| RuntimeError::primitive(format!("reflect: {e}")))?;
        let stmts = match &program {
            AstNode::Program(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        self.reflect_depth += 1;
        let result = self.exec_sequence(stmts);
        self.reflect_depth -= 1;
        match result? {
            Flow::Normal(v) | Flow::Return(v) => Ok(v),
            Flow::Break | Flow::Continue => Ok(Value::Null),
        }
    }
}

const DEFAULT_SEARCH_K: usize = 3;

fn text_arg(v: Option<&Value>) -> String {
    v.map(|v| v.to_string()).unwrap_or_default()
}

/// Replaces `{key}` with the display form of `vars[key]`; unknown keys are
/// left in place.
fn fill_template(template: &str, vars: &Value) -> Result<String, RuntimeError> {
    let lookup = |key: &str| -> Option<String> {
        match vars {
            Value::Map(m) => m.borrow().get(key).map(|v| v.to_string()),
            Value::Instance(i) => i.fields.borrow().get(key).map(|v| v.to_string()),
            _ => None,
        }
    };
    if !matches!(vars, Value::Map(_) | Value::Instance(_) | Value::Null) {
        return Err(RuntimeError::type_mismatch(format!(
            "prompt expects a map of variables, got {}",
            vars.type_name()
        )));
    }
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        match after.find('}') {
            Some(close) => {
                let key = &after[..close];
                match lookup(key) {
                    Some(v) => out.push_str(&v),
                    None => {
                        out.push('{');
                        out.push_str(key);
                        out.push('}');
                    }
                }
                rest = &after[close + 1..];
            }
            None => {
                out.push_str(&rest[open..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    Ok(out)
}

fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}

/// Top-`k` documents by cosine similarity to the query; ties keep input order.
fn rank_documents(
    backend: &dyn InferenceBackend,
    query: &str,
    docs: &[Value],
    k: usize,
) -> Result<Json, RuntimeError> {
    let fail = |e: anyhow::Error| RuntimeError::primitive(format!("search failed: {e:#}"));
    let q = backend.embed(query).map_err(fail)?;
    let mut scored = Vec::with_capacity(docs.len());
    for (i, doc) in docs.iter().enumerate() {
        let v = backend.embed(&doc.to_string()).map_err(fail)?;
        scored.push((cosine(&q, &v), i));
    }
    scored.sort_by(|a, b| b.0.total_cmp(&a.0).then(a.1.cmp(&b.1)));
    Ok(Json::Array(
        scored
            .into_iter()
            .take(k)
            .map(|(_, i)| docs[i].to_json())
            .collect::<Result<_, _>>()?,
    ))
}

fn iteration_items(v: &Value) -> Vec<Value> {
    match v {
        Value::Array(items) => items.borrow().clone(),
        Value::Map(m) => m
            .borrow()
            .iter()
            .map(|(k, v)| Value::array(vec![Value::str(k.as_str()), v.clone()]))
            .collect(),
        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
        _ => Vec::new(),
    }
}

fn get_member(obj: &Value, name: &str) -> Result<Value, RuntimeError> {
    match obj {
        Value::Instance(inst) => {
            if let Some(v) = inst.fields.borrow().get(name) {
                return Ok(v.clone());
            }
            let (def, owner) = inst.class.find_method(name).ok_or_else(|| {
                RuntimeError::new(
                    ErrorKind::UnboundName,
                    format!("{} has no member '{name}'", inst.class.name),
                )
            })?;
            Ok(Value::Function(Rc::new(Function {
                def,
                closure: owner.closure.clone(),
                bound: Some(MethodBinding {
                    this: inst.clone(),
                    owner,
                }),
            })))
        }
        Value::Map(m) => Ok(m.borrow().get(name).cloned().unwrap_or(Value::Null)),
        Value::Array(items) if name == "length" => Ok(Value::Number(items.borrow().len() as f64)),
        Value::Str(s) if name == "length" => Ok(Value::Number(s.chars().count() as f64)),
        other => Err(RuntimeError::type_mismatch(format!(
            "{} has no member '{name}'",
            other.type_name()
        ))),
    }
}

fn get_index(obj: &Value, idx: &Value) -> Result<Value, RuntimeError> {
    match (obj, idx) {
        (Value::Array(items), Value::Number(n)) => {
            let items = items.borrow();
            Ok(array_slot(*n, items.len())
                .ok()
                .map(|i| items[i].clone())
                .unwrap_or(Value::Null))
        }
        (Value::Str(s), Value::Number(n)) => Ok(if n.fract() == 0.0 && *n >= 0.0 {
            s.chars()
                .nth(*n as usize)
                .map(|c| Value::Str(c.to_string()))
                .unwrap_or(Value::Null)
        } else {
            Value::Null
        }),
        (Value::Map(m), key) => Ok(m.borrow().get(&key.as_key()).cloned().unwrap_or(Value::Null)),
        (Value::Instance(inst), Value::Str(key)) => {
            Ok(inst.fields.borrow().get(key).cloned().unwrap_or(Value::Null))
        }
        _ => Err(RuntimeError::type_mismatch(format!(
            "cannot index {} with {}",
            obj.type_name(),
            idx.type_name()
        ))),
    }
}

fn array_slot(n: f64, len: usize) -> Result<usize, RuntimeError> {
    if n.fract() != 0.0 || n < 0.0 || n as usize >= len {
        return Err(RuntimeError::type_mismatch(format!(
            "index {} out of range for array of length {len}",
            crate::core::value::format_number(n)
        )));
    }
    Ok(n as usize)
}

fn eval_binop(op: Operator, l: Value, r: Value) -> Result<Value, RuntimeError> {
    use Operator::*;
    match op {
        Plus => match (l, r) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::Str(a), b) => Ok(Value::Str(format!("{a}{b}"))),
            (a, Value::Str(b)) => Ok(Value::Str(format!("{a}{b}"))),
            (a, b) => Err(RuntimeError::type_mismatch(format!(
                "'+' on {} and {}",
                a.type_name(),
                b.type_name()
            ))),
        },
        Minus => num2(op, l, r, |a, b| a - b),
        Star => num2(op, l, r, |a, b| a * b),
        Slash | Percent => {
            if r == Value::Number(0.0) {
                return Err(RuntimeError::new(ErrorKind::DivisionByZero, "division by zero"));
            }
            if op == Slash {
                num2(op, l, r, |a, b| a / b)
            } else {
                num2(op, l, r, |a, b| a % b)
            }
        }
        EqEq => Ok(Value::Bool(l.try_eq(&r)?)),
        NotEq => Ok(Value::Bool(!l.try_eq(&r)?)),
        Less => cmp2(op, l, r, |o| o.is_lt()),
        LessEq => cmp2(op, l, r, |o| o.is_le()),
        Greater => cmp2(op, l, r, |o| o.is_gt()),
        GreaterEq => cmp2(op, l, r, |o| o.is_ge()),
        AndAnd => Ok(Value::Bool(l.truthy() && r.truthy())),
        OrOr => Ok(Value::Bool(l.truthy() || r.truthy())),
        Bang | Assign | Arrow | PipeForward | Dot => Err(RuntimeError::type_mismatch(format!(
            "'{}' is not a binary operator",
            op.lexeme()
        ))),
    }
}

fn num2(op: Operator, l: Value, r: Value, f: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    match (l, r) {
        (Value::Number(a), Value::Number(b)) => Ok(Value::Number(f(a, b))),
        (a, b) => Err(RuntimeError::type_mismatch(format!(
            "'{}' on {} and {}",
            op.lexeme(),
            a.type_name(),
            b.type_name()
        ))),
    }
}

fn cmp2(
    op: Operator,
    l: Value,
    r: Value,
    f: fn(std::cmp::Ordering) -> bool,
) -> Result<Value, RuntimeError> {
    let ord = match (&l, &r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        _ => {
            return Err(RuntimeError::type_mismatch(format!(
                "'{}' on {} and {}",
                op.lexeme(),
                l.type_name(),
                r.type_name()
            )))
        }
    };
    // NaN compares false both ways
    Ok(Value::Bool(ord.map(f).unwrap_or(false)))
}
