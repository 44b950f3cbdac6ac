//! Runtime values. Arrays, maps and instances have reference semantics
//! (shared, interior-mutable); everything else is copied.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::Rc;

use serde_json::Value as Json;

use crate::core::ast::FunctionDef;
use crate::core::environment::Environment;
use crate::core::error::RuntimeError;
use crate::core::interpreter::Interpreter;

#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    Array(Rc<RefCell<Vec<Value>>>),
    Map(Rc<RefCell<BTreeMap<String, Value>>>),
    Function(Rc<Function>),
    Builtin(Builtin),
    Class(Rc<Class>),
    Instance(Rc<Instance>),
}

/// A user function or lambda together with its defining scope.
pub struct Function {
    pub def: Rc<FunctionDef>,
    pub closure: Environment,
    /// Set for methods fetched through an instance.
    pub bound: Option<MethodBinding>,
}

#[derive(Clone)]
pub struct MethodBinding {
    pub this: Rc<Instance>,
    /// Class that declared the method; `super` resolves from its parent.
    pub owner: Rc<Class>,
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.def.display_name())
            .field("params", &self.def.params)
            .field("bound", &self.bound.is_some())
            .finish()
    }
}

pub type BuiltinFn = fn(&mut Interpreter, Vec<Value>) -> Result<Value, RuntimeError>;

#[derive(Clone)]
pub struct Builtin {
    pub name: &'static str,
    pub arity: usize, // use usize::MAX for variadic
    pub f: BuiltinFn,
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

pub struct Class {
    pub name: String,
    pub methods: HashMap<String, Rc<FunctionDef>>,
    pub parent: Option<Rc<Class>>,
    pub closure: Environment,
}

impl Class {
    /// Own methods first, then up the parent chain. Returns the declaring class.
    pub fn find_method(self: &Rc<Self>, name: &str) -> Option<(Rc<FunctionDef>, Rc<Class>)> {
        let mut class = Some(self.clone());
        while let Some(c) = class {
            if let Some(m) = c.methods.get(name) {
                return Some((m.clone(), c));
            }
            class = c.parent.clone();
        }
        None
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name.clone()))
            .finish()
    }
}

pub struct Instance {
    pub class: Rc<Class>,
    pub fields: RefCell<BTreeMap<String, Value>>,
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.borrow())
            .finish()
    }
}

impl Value {
    pub fn str(s: impl Into<String>) -> Self {
        Value::Str(s.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(items)))
    }

    pub fn map(entries: BTreeMap<String, Value>) -> Self {
        Value::Map(Rc::new(RefCell::new(entries)))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
            Value::Function(_) | Value::Builtin(_) => "function",
            Value::Class(_) => "class",
            Value::Instance(_) => "instance",
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(a) => !a.borrow().is_empty(),
            Value::Map(m) => !m.borrow().is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Class(_) | Value::Instance(_) => true,
        }
    }

    /// Key under which this value indexes a map.
    pub fn as_key(&self) -> String {
        match self {
            Value::Str(s) => s.clone(),
            other => other.to_string(),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Lossless for data values; callables become their display text.
    /// A container that contains itself has no JSON form.
    pub fn to_json(&self) -> Result<Json, RuntimeError> {
        json_of(self, &mut Vec::new())
    }

    /// Structural equality for arrays and maps, identity for objects.
    /// Fails when both sides recurse into themselves.
    pub fn try_eq(&self, other: &Value) -> Result<bool, RuntimeError> {
        equal(self, other, &mut Vec::new())
    }

    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Str(s.clone()),
            Json::Array(items) => Value::array(items.iter().map(Value::from_json).collect()),
            Json::Object(obj) => Value::map(
                obj.iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            ),
        }
    }
}

/// Integral numbers serialize without a fraction so hashes agree with
/// hand-written JSON.
fn number_to_json(n: f64) -> Json {
    if n.fract() == 0.0 && n.abs() < 9.0e15 {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n)
            .map(Json::Number)
            .unwrap_or(Json::Null)
    }
}

pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".into()
    } else if n.is_infinite() {
        if n > 0.0 { "Infinity".into() } else { "-Infinity".into() }
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// Address of a shared container, used to spot cycles.
fn addr<T: ?Sized>(rc: &Rc<T>) -> usize {
    Rc::as_ptr(rc) as *const () as usize
}

fn cyclic(what: &str) -> RuntimeError {
    RuntimeError::type_mismatch(format!("cannot {what} a value that contains itself"))
}

fn json_fields(
    entries: &BTreeMap<String, Value>,
    active: &mut Vec<usize>,
) -> Result<serde_json::Map<String, Json>, RuntimeError> {
    entries
        .iter()
        .map(|(k, v)| Ok((k.clone(), json_of(v, active)?)))
        .collect()
}

fn json_of(v: &Value, active: &mut Vec<usize>) -> Result<Json, RuntimeError> {
    let id = match v {
        Value::Array(a) => addr(a),
        Value::Map(m) => addr(m),
        Value::Instance(i) => addr(i),
        Value::Null => return Ok(Json::Null),
        Value::Bool(b) => return Ok(Json::Bool(*b)),
        Value::Number(n) => return Ok(number_to_json(*n)),
        Value::Str(s) => return Ok(Json::String(s.clone())),
        other => return Ok(Json::String(other.to_string())),
    };
    if active.contains(&id) {
        return Err(cyclic("serialize"));
    }
    active.push(id);
    let json = match v {
        Value::Array(items) => Json::Array(
            items
                .borrow()
                .iter()
                .map(|item| json_of(item, active))
                .collect::<Result<_, _>>()?,
        ),
        Value::Map(m) => Json::Object(json_fields(&m.borrow(), active)?),
        Value::Instance(inst) => Json::Object(json_fields(&inst.fields.borrow(), active)?),
        _ => Json::Null,
    };
    active.pop();
    Ok(json)
}

fn equal(a: &Value, b: &Value, active: &mut Vec<(usize, usize)>) -> Result<bool, RuntimeError> {
    use Value::*;
    match (a, b) {
        (Array(x), Array(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let pair = (addr(x), addr(y));
            if active.contains(&pair) {
                return Err(cyclic("compare"));
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            if xs.len() != ys.len() {
                return Ok(false);
            }
            active.push(pair);
            for (l, r) in xs.iter().zip(ys.iter()) {
                if !equal(l, r, active)? {
                    active.pop();
                    return Ok(false);
                }
            }
            active.pop();
            Ok(true)
        }
        (Map(x), Map(y)) => {
            if Rc::ptr_eq(x, y) {
                return Ok(true);
            }
            let pair = (addr(x), addr(y));
            if active.contains(&pair) {
                return Err(cyclic("compare"));
            }
            let (xs, ys) = (x.borrow(), y.borrow());
            if xs.len() != ys.len() || !xs.keys().eq(ys.keys()) {
                return Ok(false);
            }
            active.push(pair);
            for (l, r) in xs.values().zip(ys.values()) {
                if !equal(l, r, active)? {
                    active.pop();
                    return Ok(false);
                }
            }
            active.pop();
            Ok(true)
        }
        (Null, Null) => Ok(true),
        (Bool(x), Bool(y)) => Ok(x == y),
        (Number(x), Number(y)) => Ok(x == y),
        (Str(x), Str(y)) => Ok(x == y),
        // Callables and objects compare by identity.
        (Function(x), Function(y)) => Ok(Rc::ptr_eq(x, y)),
        (Builtin(x), Builtin(y)) => Ok(x.name == y.name),
        (Class(x), Class(y)) => Ok(Rc::ptr_eq(x, y)),
        (Instance(x), Instance(y)) => Ok(Rc::ptr_eq(x, y)),
        _ => Ok(false),
    }
}

/// Writes `v`; a container already being written shows as `[...]` / `{...}`.
fn render(v: &Value, out: &mut String, active: &mut Vec<usize>) {
    match v {
        Value::Array(a) => {
            let id = addr(a);
            if active.contains(&id) {
                out.push_str("[...]");
                return;
            }
            active.push(id);
            out.push('[');
            for (i, item) in a.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                render(item, out, active);
            }
            out.push(']');
            active.pop();
        }
        Value::Map(m) => {
            let id = addr(m);
            if active.contains(&id) {
                out.push_str("{...}");
                return;
            }
            active.push(id);
            out.push('{');
            for (i, (k, item)) in m.borrow().iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                out.push_str(k);
                out.push_str(": ");
                render(item, out, active);
            }
            out.push('}');
            active.pop();
        }
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&format_number(*n)),
        Value::Str(s) => out.push_str(s),
        Value::Function(func) => out.push_str(&format!("<fn {}>", func.def.display_name())),
        Value::Builtin(b) => out.push_str(&format!("<builtin:{}>", b.name)),
        Value::Class(c) => out.push_str(&format!("<class {}>", c.name)),
        Value::Instance(i) => out.push_str(&format!("<{} instance>", i.class.name)),
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        render(self, &mut out, &mut Vec::new());
        f.write_str(&out)
    }
}

impl PartialEq for Value {
    /// Cyclic structures that cannot be compared are unequal.
    fn eq(&self, other: &Self) -> bool {
        self.try_eq(other).unwrap_or(false)
    }
}
