//! JavaScript back end.
//!
//! Each AST node maps to one host construct. Semantics that differ from JS
//! (truthiness, `+`, equality, calls, printing) go through helpers defined in
//! the runtime preamble, so emitted programs behave like interpreted ones.
//! AI primitives become calls into `__prim`, which talks to the backend
//! directly.

use std::collections::HashSet;
use std::mem;

use serde_json::Value as Json;
use tracing::debug;
use unicode_ident::{is_xid_continue, is_xid_start};

use crate::core::ast::{AstNode, FunctionBody, FunctionDef, LogicalOp, Primitive, UnaryOp};
use crate::core::lexer::Lexer;
use crate::core::parser::parse;
use crate::core::symbols::{is_alphabet, Operator, SymbolTable};
use crate::core::value::format_number;

/// Runtime support prepended to every compiled program.
pub const PREAMBLE: &str = include_str!("preamble.js");

const JS_RESERVED: &[&str] = &[
    "arguments", "async", "await", "break", "case", "catch", "class", "const", "continue",
    "debugger", "default", "delete", "do", "else", "enum", "eval", "export", "extends", "false",
    "finally", "for", "function", "if", "implements", "import", "in", "instanceof", "interface",
    "let", "new", "null", "package", "private", "protected", "public", "return", "static",
    "super", "switch", "this", "throw", "true", "try", "typeof", "undefined", "var", "void",
    "while", "with", "yield", "NaN", "Infinity",
    // host globals the runtime relies on
    "console", "process", "Math", "Object", "Array", "Number", "String", "JSON", "Promise",
    "fetch",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CompilerOptions {
    pub max_loop_iterations: u64,
    pub include_preamble: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            max_loop_iterations: 100_000,
            include_preamble: true,
        }
    }
}

/// Compiles with default options.
pub fn compile(program: &AstNode) -> String {
    Compiler::new().compile(program)
}

/// Maps a cellscript name to a valid JS identifier; distinct names stay
/// distinct. Letters of any script survive. Any other character, and `$`
/// itself, becomes `$<hex>$`. Reserved words, host globals and the
/// runtime's `__` namespace get a `$_` prefix.
pub fn sanitize_identifier(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for ch in name.chars() {
        let keep = if out.is_empty() {
            ch == '_' || is_xid_start(ch)
        } else {
            is_xid_continue(ch)
        };
        if keep {
            out.push(ch);
        } else {
            out.push_str(&format!("${:x}$", ch as u32));
        }
    }
    if out.is_empty() {
        return "$".into();
    }
    if JS_RESERVED.contains(&out.as_str()) || out.starts_with("__") {
        out.insert_str(0, "$_");
    }
    out
}

fn js_string(s: &str) -> String {
    Json::String(s.to_string()).to_string()
}

fn js_number(n: f64) -> String {
    if n.is_finite() {
        format_number(n)
    } else if n.is_nan() {
        "NaN".into()
    } else if n > 0.0 {
        "Infinity".into()
    } else {
        "-Infinity".into()
    }
}

fn unsupported(what: &str) -> String {
    format!("/* unsupported: {} */", what.replace("*/", "* /"))
}

fn is_expression(node: &AstNode) -> bool {
    matches!(
        node,
        AstNode::Assign { .. }
            | AstNode::Lambda(_)
            | AstNode::Binary { .. }
            | AstNode::Logical { .. }
            | AstNode::Unary { .. }
            | AstNode::Await(_)
            | AstNode::Call { .. }
            | AstNode::Member { .. }
            | AstNode::Index { .. }
            | AstNode::Primitive { .. }
            | AstNode::Identifier { .. }
            | AstNode::This(_)
            | AstNode::Super { .. }
            | AstNode::Number(_)
            | AstNode::Str(_)
            | AstNode::Bool(_)
            | AstNode::Null
            | AstNode::Array(_)
            | AstNode::Map(_)
    )
}

pub struct Compiler {
    indent: usize,
    options: CompilerOptions,
    /// Names declared per block, to turn redeclarations into assignments.
    scopes: Vec<HashSet<String>>,
    /// Innermost breakable construct; `Some(label)` for a switch.
    breaks: Vec<Option<String>>,
    /// One entry per enclosing function: whether it collects yields.
    generators: Vec<bool>,
    labels: usize,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Self::with_options(CompilerOptions::default())
    }

    pub fn with_options(options: CompilerOptions) -> Self {
        Self {
            indent: 0,
            options,
            scopes: Vec::new(),
            breaks: Vec::new(),
            generators: Vec::new(),
            labels: 0,
        }
    }

    pub fn compile(&mut self, program: &AstNode) -> String {
        let stmts: &[AstNode] = match program {
            AstNode::Program(items) | AstNode::Block(items) => items.as_slice(),
            other => std::slice::from_ref(other),
        };
        let mut out = String::new();
        if self.options.include_preamble {
            out.push_str(PREAMBLE);
            out.push('\n');
        }
        out.push_str("__main(async () => {\n");
        self.indent = 1;
        self.scopes = vec![HashSet::new()];
        self.breaks.clear();
        self.generators.clear();
        for s in stmts {
            out.push_str(&self.stmt(s));
        }
        self.indent = 0;
        out.push_str("});\n");
        debug!(bytes = out.len(), statements = stmts.len(), "compiled to js");
        out
    }

    fn indent_str(&self) -> String {
        "  ".repeat(self.indent)
    }

    fn line(&self, text: &str) -> String {
        format!("{}{}\n", self.indent_str(), text)
    }

    fn declare(&mut self, name: &str) -> bool {
        match self.scopes.last_mut() {
            Some(scope) => scope.insert(name.to_string()),
            None => true,
        }
    }

    fn next_label(&mut self) -> usize {
        self.labels += 1;
        self.labels
    }

    /// `{ ... }` with its own scope; no trailing newline.
    fn block(&mut self, stmts: &[AstNode]) -> String {
        self.block_with(stmts, &[], "")
    }

    /// Block that pre-declares `names` and starts with `prologue` lines.
    fn block_with(&mut self, stmts: &[AstNode], names: &[&str], prologue: &str) -> String {
        let mut s = String::from("{\n");
        self.indent += 1;
        self.scopes
            .push(names.iter().map(|n| n.to_string()).collect());
        for l in prologue.lines() {
            s.push_str(&self.line(l));
        }
        for st in stmts {
            s.push_str(&self.stmt(st));
        }
        self.scopes.pop();
        self.indent -= 1;
        s.push_str(&self.indent_str());
        s.push('}');
        s
    }

    /// Binds `names` in an outer block and runs `stmts` one block deeper,
    /// so the body may shadow them like any nested scope.
    fn binding_block(&mut self, stmts: &[AstNode], names: &[&str], prologue: &str) -> String {
        let mut s = String::from("{\n");
        self.indent += 1;
        self.scopes
            .push(names.iter().map(|n| n.to_string()).collect());
        for l in prologue.lines() {
            s.push_str(&self.line(l));
        }
        let body = self.block(stmts);
        s.push_str(&self.line(&body));
        self.scopes.pop();
        self.indent -= 1;
        s.push_str(&self.indent_str());
        s.push('}');
        s
    }

    fn wrap_stmt(&mut self, node: &AstNode) -> String {
        match node {
            AstNode::Block(items) => self.block(items),
            other => self.block(std::slice::from_ref(other)),
        }
    }

    fn stmt(&mut self, node: &AstNode) -> String {
        match node {
            AstNode::Let {
                name,
                value,
                constant,
                ..
            } => {
                let js_name = sanitize_identifier(name);
                let v = match value {
                    Some(e) => self.expr(e),
                    None => "null".into(),
                };
                if self.declare(&js_name) {
                    let kw = if *constant { "const" } else { "let" };
                    self.line(&format!("{kw} {js_name} = {v};"))
                } else {
                    self.line(&format!("{js_name} = {v};"))
                }
            }
            AstNode::FunctionDecl(def) => {
                let js_name = sanitize_identifier(def.display_name());
                self.declare(&js_name);
                let params = self.params(def);
                let body = self.function_body(def);
                self.line(&format!("async function {js_name}({params}) {body}"))
            }
            AstNode::ClassDecl {
                name,
                parent,
                methods,
                ..
            } => {
                let js_name = sanitize_identifier(name);
                let head = match parent {
                    Some(p) => format!("class {js_name} extends {} {{", sanitize_identifier(p)),
                    None => format!("class {js_name} {{"),
                };
                let mut s = if self.declare(&js_name) {
                    self.line(&head)
                } else {
                    self.line(&format!("{js_name} = {head}"))
                };
                self.indent += 1;
                for m in methods {
                    let params = self.params(m);
                    let body = self.function_body(m);
                    s.push_str(&self.line(&format!(
                        "async [{}]({params}) {body}",
                        js_string(m.display_name())
                    )));
                }
                self.indent -= 1;
                s.push_str(&self.line("}"));
                s
            }
            AstNode::Import { module, .. } => {
                let js_name = sanitize_identifier(module);
                let kw = if self.declare(&js_name) { "const " } else { "" };
                self.line(&format!("{kw}{js_name} = __module({});", js_string(module)))
            }
            AstNode::Block(items) => {
                let b = self.block(items);
                format!("{}{b}\n", self.indent_str())
            }
            AstNode::Print(args) => {
                let a = self.args(args);
                self.line(&format!("__print({a});"))
            }
            AstNode::Return(value) => {
                let v = match value {
                    Some(e) => self.expr(e),
                    None => "null".into(),
                };
                self.line(&format!("return {v};"))
            }
            AstNode::Yield(e) => {
                let v = self.expr(e);
                if self.generators.last().copied().unwrap_or(false) {
                    self.line(&format!("__y.push({v});"))
                } else {
                    self.line("__fail(\"TypeMismatch\", \"yield outside of a function\");")
                }
            }
            AstNode::Break => match self.breaks.last() {
                Some(Some(label)) => self.line(&format!("break {label};")),
                _ => self.line("break;"),
            },
            AstNode::Continue => self.line("continue;"),
            AstNode::Halt => self.line("throw new __Halt();"),
            AstNode::If { .. } => {
                let chain = self.if_chain(node);
                format!("{}{chain}\n", self.indent_str())
            }
            AstNode::While { condition, body } => {
                let c = self.expr(condition);
                self.breaks.push(None);
                let b = self.wrap_stmt(body);
                self.breaks.pop();
                self.line(&format!("while (__truthy({c})) {b}"))
            }
            AstNode::Loop(body) => {
                let cap = self.options.max_loop_iterations;
                let guard = format!(
                    "if (__n >= {cap}) {{ console.log({}); break; }}",
                    js_string(&format!("[loop] iteration cap of {cap} reached, exiting loop"))
                );
                self.breaks.push(None);
                let b = self.block_with(std::slice::from_ref(body.as_ref()), &[], &guard);
                self.breaks.pop();
                self.line(&format!("for (let __n = 0; ; __n++) {b}"))
            }
            AstNode::ForEach {
                var,
                iterable,
                body,
            } => {
                let v = sanitize_identifier(var);
                let it = self.expr(iterable);
                self.breaks.push(None);
                let stmts: &[AstNode] = match body.as_ref() {
                    AstNode::Block(items) => items.as_slice(),
                    other => std::slice::from_ref(other),
                };
                let b = self.binding_block(stmts, &[&v], "");
                self.breaks.pop();
                self.line(&format!("for (const {v} of __iter({it})) {b}"))
            }
            AstNode::Try {
                body,
                catch_name,
                handler,
            } => {
                let b = self.wrap_stmt(body);
                let mut prologue = String::from("if (__e instanceof __Halt) throw __e;");
                let mut names = Vec::new();
                let catch_js = catch_name.as_deref().map(sanitize_identifier);
                if let Some(n) = &catch_js {
                    prologue.push_str(&format!("\nlet {n} = __errText(__e);"));
                    names.push(n.as_str());
                }
                let stmts: &[AstNode] = match handler.as_ref() {
                    AstNode::Block(items) => items.as_slice(),
                    other => std::slice::from_ref(other),
                };
                let h = self.binding_block(stmts, &names, &prologue);
                self.line(&format!("try {b} catch (__e) {h}"))
            }
            AstNode::Switch {
                subject,
                cases,
                default,
            } => {
                let n = self.next_label();
                let label = format!("__sw{n}");
                let subject_var = format!("__s{n}");
                let subj = self.expr(subject);
                let mut s = self.line(&format!("{label}: {{"));
                self.indent += 1;
                s.push_str(&self.line(&format!("const {subject_var} = {subj};")));
                self.breaks.push(Some(label));
                let mut chain = String::new();
                for (i, case) in cases.iter().enumerate() {
                    let v = self.expr(&case.value);
                    let b = self.block(&case.body);
                    if i > 0 {
                        chain.push_str(" else ");
                    }
                    chain.push_str(&format!("if (__eq({subject_var}, {v})) {b}"));
                }
                if let Some(d) = default {
                    let b = self.block(d);
                    if cases.is_empty() {
                        chain.push_str(&b);
                    } else {
                        chain.push_str(&format!(" else {b}"));
                    }
                }
                self.breaks.pop();
                if !chain.is_empty() {
                    s.push_str(&self.line(&chain));
                }
                self.indent -= 1;
                s.push_str(&self.line("}"));
                s
            }
            AstNode::Error(msg) => self.line(&unsupported(msg)),
            AstNode::Program(items) => {
                let mut s = String::new();
                for it in items {
                    s.push_str(&self.stmt(it));
                }
                s
            }
            other => {
                let e = self.expr(other);
                self.line(&format!("{e};"))
            }
        }
    }

    /// `if (...) {...} else if (...) {...} else {...}` without indentation.
    fn if_chain(&mut self, node: &AstNode) -> String {
        match node {
            AstNode::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let c = self.expr(condition);
                let t = self.wrap_stmt(then_branch);
                let mut s = format!("if (__truthy({c})) {t}");
                if let Some(e) = else_branch {
                    s.push_str(" else ");
                    if matches!(e.as_ref(), AstNode::If { .. }) {
                        s.push_str(&self.if_chain(e));
                    } else {
                        s.push_str(&self.wrap_stmt(e));
                    }
                }
                s
            }
            other => self.wrap_stmt(other),
        }
    }

    fn params(&self, def: &FunctionDef) -> String {
        def.params
            .iter()
            .map(|p| sanitize_identifier(p))
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn args(&mut self, args: &[AstNode]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Braced body. The last expression statement becomes the return value;
    /// generators return their yields when any were produced.
    fn function_body(&mut self, def: &FunctionDef) -> String {
        let saved_breaks = mem::take(&mut self.breaks);
        let generator = def.is_generator();
        self.generators.push(generator);

        let stmts: Vec<AstNode> = match &def.body {
            FunctionBody::Block(items) => items.clone(),
            FunctionBody::Expr(e) => vec![AstNode::Return(Some(e.clone()))],
        };
        let params: Vec<String> = def.params.iter().map(|p| sanitize_identifier(p)).collect();
        let param_refs: Vec<&str> = params.iter().map(String::as_str).collect();

        let body = if generator {
            let mut s = String::from("{\n");
            self.indent += 1;
            s.push_str(&self.line("const __y = [];"));
            let inner = self.returning_block(&stmts, &param_refs);
            s.push_str(&self.line(&format!("const __r = await (async () => {inner})();")));
            s.push_str(&self.line("return __y.length ? __y : __r;"));
            self.indent -= 1;
            s.push_str(&self.indent_str());
            s.push('}');
            s
        } else {
            self.returning_block(&stmts, &param_refs)
        };

        self.generators.pop();
        self.breaks = saved_breaks;
        body
    }

    fn returning_block(&mut self, stmts: &[AstNode], names: &[&str]) -> String {
        match stmts.split_last() {
            Some((last, init)) if is_expression(last) => {
                let mut items = init.to_vec();
                items.push(AstNode::Return(Some(Box::new(last.clone()))));
                self.block_with(&items, names, "")
            }
            _ => self.block_with(stmts, names, ""),
        }
    }

    fn lambda(&mut self, def: &FunctionDef) -> String {
        let params = self.params(def);
        match &def.body {
            FunctionBody::Expr(e) if !def.is_generator() => {
                self.generators.push(false);
                let body = self.expr(e);
                self.generators.pop();
                format!("(async ({params}) => ({body}))")
            }
            _ => {
                let body = self.function_body(def);
                format!("(async ({params}) => {body})")
            }
        }
    }

    fn expr(&mut self, node: &AstNode) -> String {
        match node {
            AstNode::Number(n) => js_number(*n),
            AstNode::Str(s) => js_string(s),
            AstNode::Bool(b) => b.to_string(),
            AstNode::Null => "null".into(),
            AstNode::Array(items) => format!("[{}]", self.args(items)),
            AstNode::Map(pairs) => {
                let parts: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| {
                        let key = match k {
                            AstNode::Str(s) => js_string(s),
                            AstNode::Number(n) => js_string(&format_number(*n)),
                            other => format!("[__key({})]", self.expr(other)),
                        };
                        format!("{key}: {}", self.expr(v))
                    })
                    .collect();
                format!("({{{}}})", parts.join(", "))
            }
            AstNode::Identifier { name, .. } => sanitize_identifier(name),
            AstNode::This(_) => "this".into(),
            AstNode::Super { method, .. } => format!("super[{}].bind(this)", js_string(method)),
            AstNode::Assign { target, value, .. } => {
                let v = self.expr(value);
                match target.as_ref() {
                    AstNode::Identifier { name, .. } => format!("({} = {v})", sanitize_identifier(name)),
                    AstNode::Member { object, name, .. } => {
                        format!("({}[{}] = {v})", self.expr(object), js_string(name))
                    }
                    AstNode::Index { object, index, .. } => {
                        format!("__setIndex({}, {}, {v})", self.expr(object), self.expr(index))
                    }
                    _ => format!("{} null", unsupported("assignment target")),
                }
            }
            AstNode::Lambda(def) => self.lambda(def),
            AstNode::Binary { op, left, right, .. } => {
                let l = self.expr(left);
                let r = self.expr(right);
                match op {
                    Operator::Plus => format!("__add({l}, {r})"),
                    Operator::Slash => format!("__div({l}, {r})"),
                    Operator::Percent => format!("__mod({l}, {r})"),
                    Operator::EqEq => format!("__eq({l}, {r})"),
                    Operator::NotEq => format!("!__eq({l}, {r})"),
                    Operator::AndAnd => format!("(__truthy({l}) && __truthy({r}))"),
                    Operator::OrOr => format!("(__truthy({l}) || __truthy({r}))"),
                    Operator::Minus
                    | Operator::Star
                    | Operator::Less
                    | Operator::LessEq
                    | Operator::Greater
                    | Operator::GreaterEq => format!("({l} {} {r})", op.lexeme()),
                    Operator::Bang
                    | Operator::Assign
                    | Operator::Arrow
                    | Operator::PipeForward
                    | Operator::Dot => format!("{} null", unsupported(op.lexeme())),
                }
            }
            AstNode::Logical { op, left, right } => {
                let l = self.expr(left);
                let r = self.expr(right);
                match op {
                    LogicalOp::And => format!("(__truthy({l}) && __truthy({r}))"),
                    LogicalOp::Or => format!("(__truthy({l}) || __truthy({r}))"),
                }
            }
            AstNode::Unary { op, operand, .. } => {
                let v = self.expr(operand);
                match op {
                    UnaryOp::Not => format!("!__truthy({v})"),
                    UnaryOp::Negate => format!("(-{v})"),
                }
            }
            AstNode::Await(inner) => format!("(await {})", self.expr(inner)),
            AstNode::Call { callee, args, .. } => {
                let a = self.args(args);
                match callee.as_ref() {
                    AstNode::Member { object, name, .. } => {
                        format!("(await __callm({}, {}, [{a}]))", self.expr(object), js_string(name))
                    }
                    AstNode::Super { method, .. } => {
                        format!("(await super[{}]({a}))", js_string(method))
                    }
                    other => format!("(await __call({}, [{a}]))", self.expr(other)),
                }
            }
            AstNode::Member { object, name, .. } => {
                format!("{}[{}]", self.expr(object), js_string(name))
            }
            AstNode::Index { object, index, .. } => {
                format!("{}[{}]", self.expr(object), self.expr(index))
            }
            AstNode::Primitive { primitive, args, .. } => match (primitive, args.first()) {
                (Primitive::ReflectExec, Some(AstNode::Str(src))) => self.static_reflect(src),
                _ => format!("(await __prim.{}({}))", primitive.name(), self.args(args)),
            },
            AstNode::Error(msg) => format!("{} null", unsupported(msg)),
            _ => format!("{} null", unsupported("statement in expression position")),
        }
    }

    /// A literal `reflect` source is compiled ahead of time into an inline
    /// async block.
    fn static_reflect(&mut self, src: &str) -> String {
        let cells = if src.chars().any(is_alphabet) {
            src.to_string()
        } else {
            SymbolTable::standard().spell(src)
        };
        let parsed = Lexer::new(&cells)
            .tokenize()
            .map_err(|e| e.to_string())
            .and_then(|tokens| parse(tokens).map_err(|e| e.to_string()));
        match parsed {
            Ok(AstNode::Program(items)) => {
                let saved_breaks = mem::take(&mut self.breaks);
                let body = self.returning_block(&items, &[]);
                self.breaks = saved_breaks;
                format!("(await (async () => {body})())")
            }
            Ok(other) => format!("{} null", unsupported(&format!("reflect source {other:?}"))),
            Err(e) => format!(
                "__fail(\"PrimitiveExecution\", {})",
                js_string(&format!("reflect: {e}"))
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::lexer::tokenize;

    fn emit(readable: &str) -> String {
        let cells = SymbolTable::standard().spell(readable);
        let ast = parse(tokenize(&cells).unwrap()).unwrap();
        Compiler::with_options(CompilerOptions {
            include_preamble: false,
            ..CompilerOptions::default()
        })
        .compile(&ast)
    }

    #[test]
    fn let_and_print_snapshot() {
        let js = emit("let x = 2\nprint(x + 1)");
        insta::assert_snapshot!(js, @r###"
        __main(async () => {
          let x = 2;
          __print(__add(x, 1));
        });
        "###);
    }

    #[test]
    fn identifiers_are_sanitized() {
        assert_eq!(sanitize_identifier("a-b"), "a$2d$b");
        assert_eq!(sanitize_identifier("1x"), "$31$x");
        assert_eq!(sanitize_identifier("class"), "$_class");
        assert_eq!(sanitize_identifier("λ"), "λ");
        assert_eq!(sanitize_identifier("__y"), "$___y");
        assert_eq!(sanitize_identifier(""), "$");
    }

    #[test]
    fn loop_and_catch_bodies_get_their_own_scope() {
        let js = emit("for v in [1] { let v = 2\nprint(v) }\ntry { print(1) } catch (e) { const e = 3 }");
        assert!(js.contains("for (const v of __iter([1])) {"), "{js}");
        assert!(js.contains("let v = 2;"), "{js}");
        assert!(js.contains("const e = 3;"), "{js}");
    }

    #[test]
    fn index_stores_go_through_the_checked_helper() {
        let js = emit("let xs = [1]\nxs[0] = 5");
        assert!(js.contains("__setIndex(xs, 0, 5)"), "{js}");
    }

    #[test]
    fn sanitized_names_never_merge() {
        let names = ["a-b", "a+b", "a_b", "a$2d$b", "class", "class_", "$_class", "\\x80", "\\x81"];
        let mut seen = std::collections::HashSet::new();
        for name in names {
            assert!(seen.insert(sanitize_identifier(name)), "{name} collided");
        }
    }

    #[test]
    fn functions_are_async_and_return_last_expression() {
        let js = emit("fn add(a, b) { a + b }\nprint(add(4, 5))");
        assert!(js.contains("async function add(a, b) {"), "{js}");
        assert!(js.contains("return __add(a, b);"), "{js}");
        assert!(js.contains("__print((await __call(add, [4, 5])));"), "{js}");
    }

    #[test]
    fn redeclaration_becomes_assignment() {
        let js = emit("let x = 1\nlet x = 2");
        assert!(js.contains("let x = 1;"));
        assert!(js.contains("  x = 2;"));
        assert!(!js.contains("let x = 2;"));
    }

    #[test]
    fn switch_break_targets_its_label() {
        let js = emit("while true { switch 1 { case 1 { break } } }");
        assert!(js.contains("__sw1: {"), "{js}");
        assert!(js.contains("break __sw1;"), "{js}");
    }

    #[test]
    fn loop_carries_the_iteration_cap() {
        let js = Compiler::with_options(CompilerOptions {
            max_loop_iterations: 7,
            include_preamble: false,
        })
        .compile(&AstNode::Program(vec![AstNode::Loop(Box::new(AstNode::Block(vec![
            AstNode::Break,
        ])))]));
        assert!(js.contains("if (__n >= 7)"), "{js}");
        assert!(js.contains("iteration cap of 7 reached"), "{js}");
    }

    #[test]
    fn literal_reflect_is_compiled_inline() {
        let js = emit("print(reflect(\"1 + 2\"))");
        assert!(js.contains("(await (async () => {"), "{js}");
        assert!(js.contains("return __add(1, 2);"), "{js}");
        assert!(!js.contains("__prim.reflectExec"), "{js}");
    }

    #[test]
    fn primitives_call_the_runtime() {
        let js = emit("let a = infer(\"hi\")\nlet b = search(\"q\", [\"x\"], 1)");
        assert!(js.contains("(await __prim.infer(\"hi\"))"), "{js}");
        assert!(js.contains("(await __prim.semanticSearch(\"q\", [\"x\"], 1))"), "{js}");
    }

    #[test]
    fn malformed_nodes_become_comments() {
        let js = Compiler::new().compile(&AstNode::Program(vec![AstNode::Error("bad */ node".into())]));
        assert!(js.contains("/* unsupported: bad * / node */"));
        assert!(js.starts_with("\"use strict\";"));
    }
}
