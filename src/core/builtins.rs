//! Built-in functions and the fixed module table behind `import`.

use std::collections::BTreeMap;

use crate::core::environment::Environment;
use crate::core::error::RuntimeError;
use crate::core::interpreter::Interpreter;
use crate::core::value::{format_number, Builtin, BuiltinFn, Value};
use crate::sal::Domain;

const VARIADIC: usize = usize::MAX;

fn builtin(name: &'static str, arity: usize, f: BuiltinFn) -> Value {
    Value::Builtin(Builtin { name, arity, f })
}

/// Defines the global functions in `env`.
pub fn install(env: &Environment) -> Result<(), RuntimeError> {
    let globals = [
        builtin("len", 1, builtin_len),
        builtin("str", 1, builtin_str),
        builtin("num", 1, builtin_num),
        builtin("type", 1, builtin_type),
        builtin("push", 2, builtin_push),
        builtin("keys", 1, builtin_keys),
        builtin("range", VARIADIC, builtin_range),
        builtin("boundary", VARIADIC, builtin_boundary),
    ];
    for value in globals {
        if let Value::Builtin(b) = &value {
            env.define(b.name, value.clone(), false)?;
        }
    }
    Ok(())
}

pub const MODULES: [&str; 2] = ["math", "text"];

/// Module object for `import name`, or `None` for an unknown module.
pub fn module(name: &str) -> Option<Value> {
    let members: Vec<(&'static str, Value)> = match name {
        "math" => vec![
            ("sqrt", builtin("sqrt", 1, math_sqrt)),
            ("floor", builtin("floor", 1, math_floor)),
            ("ceil", builtin("ceil", 1, math_ceil)),
            ("abs", builtin("abs", 1, math_abs)),
            ("pow", builtin("pow", 2, math_pow)),
            ("min", builtin("min", VARIADIC, math_min)),
            ("max", builtin("max", VARIADIC, math_max)),
            ("pi", Value::Number(std::f64::consts::PI)),
        ],
        "text" => vec![
            ("upper", builtin("upper", 1, text_upper)),
            ("lower", builtin("lower", 1, text_lower)),
            ("trim", builtin("trim", 1, text_trim)),
            ("split", builtin("split", 2, text_split)),
            ("join", builtin("join", 2, text_join)),
            ("contains", builtin("contains", 2, text_contains)),
        ],
        _ => return None,
    };
    let map: BTreeMap<String, Value> = members
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
    Some(Value::map(map))
}

fn number_arg(name: &str, v: &Value) -> Result<f64, RuntimeError> {
    v.as_number()
        .ok_or_else(|| RuntimeError::type_mismatch(format!("{name} expects a number, got {}", v.type_name())))
}

fn string_arg<'a>(name: &str, v: &'a Value) -> Result<&'a str, RuntimeError> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(RuntimeError::type_mismatch(format!(
            "{name} expects a string, got {}",
            other.type_name()
        ))),
    }
}

// ---------- Globals ----------

fn builtin_len(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let n = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::Array(a) => a.borrow().len(),
        Value::Map(m) => m.borrow().len(),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "len expects a string, array or map, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::Number(n as f64))
}

fn builtin_str(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Str(args[0].to_string()))
}

fn builtin_num(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    match &args[0] {
        Value::Number(n) => Ok(Value::Number(*n)),
        Value::Bool(b) => Ok(Value::Number(if *b { 1.0 } else { 0.0 })),
        Value::Null => Ok(Value::Number(0.0)),
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Number)
            .map_err(|_| RuntimeError::type_mismatch(format!("cannot convert {s:?} to a number"))),
        other => Err(RuntimeError::type_mismatch(format!(
            "cannot convert {} to a number",
            other.type_name()
        ))),
    }
}

fn builtin_type(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(args[0].type_name()))
}

fn builtin_push(_i: &mut Interpreter, mut args: Vec<Value>) -> Result<Value, RuntimeError> {
    let item = args.pop().unwrap_or(Value::Null);
    match &args[0] {
        Value::Array(a) => {
            let mut items = a.borrow_mut();
            items.push(item);
            Ok(Value::Number(items.len() as f64))
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "push expects an array, got {}",
            other.type_name()
        ))),
    }
}

fn builtin_keys(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let keys: Vec<Value> = match &args[0] {
        Value::Map(m) => m.borrow().keys().map(|k| Value::str(k.as_str())).collect(),
        Value::Instance(inst) => inst.fields.borrow().keys().map(|k| Value::str(k.as_str())).collect(),
        other => {
            return Err(RuntimeError::type_mismatch(format!(
                "keys expects a map, got {}",
                other.type_name()
            )))
        }
    };
    Ok(Value::array(keys))
}

/// `range(n)` is `0..n`; `range(a, b)` is `a..b`.
/// Longest array `range` will build.
pub const MAX_RANGE_LEN: u64 = 1_000_000;

fn range_bound(v: &Value) -> Result<i64, RuntimeError> {
    let n = number_arg("range", v)?;
    // 2^53: past this, consecutive integers are no longer distinct f64s.
    if n.fract() != 0.0 || n.abs() > 9_007_199_254_740_992.0 {
        return Err(RuntimeError::type_mismatch(format!(
            "range expects safe integer bounds, got {}",
            format_number(n)
        )));
    }
    Ok(n as i64)
}

fn builtin_range(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let (start, end) = match args.as_slice() {
        [n] => (0, range_bound(n)?),
        [a, b] => (range_bound(a)?, range_bound(b)?),
        _ => return Err(RuntimeError::type_mismatch("range expects 1 or 2 arguments")),
    };
    let len = end.saturating_sub(start).max(0) as u64;
    if len > MAX_RANGE_LEN {
        return Err(RuntimeError::type_mismatch(format!(
            "range of {len} elements exceeds the limit of {MAX_RANGE_LEN}"
        )));
    }
    Ok(Value::array((start..end).map(|x| Value::Number(x as f64)).collect()))
}

fn builtin_boundary(i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let label = match args.first() {
        Some(v) => v.to_string(),
        None => return Err(RuntimeError::type_mismatch("boundary expects a label")),
    };
    let domain = match args.get(1) {
        None => Domain::Deterministic,
        Some(v) => {
            let name = string_arg("boundary", v)?;
            Domain::parse(name)
                .ok_or_else(|| RuntimeError::type_mismatch(format!("unknown domain {name:?}")))?
        }
    };
    i.sal().mark_boundary(&label, domain);
    Ok(Value::Null)
}

// ---------- math ----------

fn math_sqrt(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Number(number_arg("sqrt", &args[0])?.sqrt()))
}

fn math_floor(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Number(number_arg("floor", &args[0])?.floor()))
}

fn math_ceil(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Number(number_arg("ceil", &args[0])?.ceil()))
}

fn math_abs(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::Number(number_arg("abs", &args[0])?.abs()))
}

fn math_pow(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let base = number_arg("pow", &args[0])?;
    Ok(Value::Number(base.powf(number_arg("pow", &args[1])?)))
}

fn fold_numbers(name: &str, args: &[Value], f: fn(f64, f64) -> f64) -> Result<Value, RuntimeError> {
    let mut acc: Option<f64> = None;
    for v in args {
        let n = number_arg(name, v)?;
        acc = Some(acc.map_or(n, |a| f(a, n)));
    }
    acc.map(Value::Number)
        .ok_or_else(|| RuntimeError::type_mismatch(format!("{name} expects at least one number")))
}

fn math_min(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    fold_numbers("min", &args, f64::min)
}

fn math_max(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    fold_numbers("max", &args, f64::max)
}

// ---------- text ----------

fn text_upper(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(string_arg("upper", &args[0])?.to_uppercase()))
}

fn text_lower(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(string_arg("lower", &args[0])?.to_lowercase()))
}

fn text_trim(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    Ok(Value::str(string_arg("trim", &args[0])?.trim()))
}

fn text_split(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let s = string_arg("split", &args[0])?;
    let sep = string_arg("split", &args[1])?;
    let parts: Vec<Value> = if sep.is_empty() {
        s.chars().map(|c| Value::Str(c.to_string())).collect()
    } else {
        s.split(sep).map(Value::str).collect()
    };
    Ok(Value::array(parts))
}

fn text_join(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let sep = string_arg("join", &args[1])?;
    match &args[0] {
        Value::Array(items) => {
            let parts: Vec<String> = items.borrow().iter().map(|v| v.to_string()).collect();
            Ok(Value::Str(parts.join(sep)))
        }
        other => Err(RuntimeError::type_mismatch(format!(
            "join expects an array, got {}",
            other.type_name()
        ))),
    }
}

fn text_contains(_i: &mut Interpreter, args: Vec<Value>) -> Result<Value, RuntimeError> {
    let hay = string_arg("contains", &args[0])?;
    Ok(Value::Bool(hay.contains(string_arg("contains", &args[1])?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_table_is_fixed() {
        for name in MODULES {
            assert!(module(name).is_some(), "{name}");
        }
        assert!(module("os").is_none());
    }

    #[test]
    fn math_module_exposes_pi() {
        match module("math").unwrap() {
            Value::Map(m) => assert_eq!(m.borrow().get("pi"), Some(&Value::Number(std::f64::consts::PI))),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn range_and_len() {
        let mut interp = Interpreter::new();
        let r = builtin_range(&mut interp, vec![Value::Number(2.0), Value::Number(5.0)]).unwrap();
        assert_eq!(r.to_string(), "[2, 3, 4]");
        let n = builtin_len(&mut interp, vec![Value::str("héllo")]).unwrap();
        assert_eq!(n, Value::Number(5.0));
        assert!(builtin_len(&mut interp, vec![Value::Number(1.0)]).is_err());
    }

    #[test]
    fn range_rejects_huge_or_fractional_bounds() {
        let mut interp = Interpreter::new();
        let mut range = |args: Vec<f64>| {
            builtin_range(&mut interp, args.into_iter().map(Value::Number).collect())
        };
        // Past 2^53, `x + 1.0 == x` and a float counter never advances.
        assert!(range(vec![9_007_199_254_740_992.0, 9_007_199_254_740_994.0]).is_err());
        assert!(range(vec![1e12]).is_err());
        assert!(range(vec![1.5]).is_err());
        assert!(range(vec![f64::INFINITY]).is_err());
        assert!(range(vec![f64::NAN]).is_err());
        assert_eq!(range(vec![5.0, 2.0]).unwrap().to_string(), "[]");
        assert_eq!(range(vec![-2.0, 1.0]).unwrap().to_string(), "[-2, -1, 0]");
    }

    #[test]
    fn text_helpers() {
        let mut interp = Interpreter::new();
        let parts = text_split(&mut interp, vec![Value::str("a,b"), Value::str(",")]).unwrap();
        let joined = text_join(&mut interp, vec![parts, Value::str("-")]).unwrap();
        assert_eq!(joined, Value::str("a-b"));
    }
}
