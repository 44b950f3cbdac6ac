//! Lexical scopes: a parent-linked chain of `name → (value, is_const)`.
//!
//! Closures hold an `Environment` handle, which keeps the whole chain alive.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::core::error::RuntimeError;
use crate::core::value::Value;

#[derive(Clone, Debug, Default)]
pub struct Environment {
    inner: Rc<RefCell<Scope>>,
}

#[derive(Debug, Default)]
struct Scope {
    vars: HashMap<String, Binding>,
    parent: Option<Environment>,
}

#[derive(Debug)]
struct Binding {
    value: Value,
    constant: bool,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Scope {
                vars: HashMap::new(),
                parent: Some(self.clone()),
            })),
        }
    }

    /// Binds `name` in this scope. Shadowing an outer binding is always
    /// allowed; replacing a constant of this same scope is not.
    pub fn define(&self, name: &str, value: Value, constant: bool) -> Result<(), RuntimeError> {
        let mut scope = self.inner.borrow_mut();
        if let Some(existing) = scope.vars.get(name) {
            if existing.constant {
                return Err(RuntimeError::const_reassignment(name));
            }
        }
        scope.vars.insert(name.to_string(), Binding { value, constant });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Result<Value, RuntimeError> {
        self.lookup(name).ok_or_else(|| RuntimeError::unbound(name))
    }

    pub fn lookup(&self, name: &str) -> Option<Value> {
        // borrow only for the local lookup; drop before walking to the parent
        let parent = {
            let scope = self.inner.borrow();
            if let Some(b) = scope.vars.get(name) {
                return Some(b.value.clone());
            }
            scope.parent.clone()
        };
        parent.and_then(|p| p.lookup(name))
    }

    /// Rebinds the nearest existing `name`.
    pub fn set(&self, name: &str, value: Value) -> Result<(), RuntimeError> {
        let parent = {
            let mut scope = self.inner.borrow_mut();
            if let Some(b) = scope.vars.get_mut(name) {
                if b.constant {
                    return Err(RuntimeError::const_reassignment(name));
                }
                b.value = value;
                return Ok(());
            }
            scope.parent.clone()
        };
        match parent {
            Some(p) => p.set(name, value),
            None => Err(RuntimeError::unbound(name)),
        }
    }

    pub fn is_defined_locally(&self, name: &str) -> bool {
        self.inner.borrow().vars.contains_key(name)
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut cur = self.inner.borrow().parent.clone();
        while let Some(env) = cur {
            depth += 1;
            cur = env.inner.borrow().parent.clone();
        }
        depth
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::ErrorKind;

    #[test]
    fn lookup_walks_outward() {
        let global = Environment::new();
        global.define("x", Value::Number(1.0), false).unwrap();
        let inner = global.child().child();
        assert_eq!(inner.get("x").unwrap(), Value::Number(1.0));
        assert_eq!(inner.depth(), 2);
        assert_eq!(inner.get("nope").unwrap_err().kind, ErrorKind::UnboundName);
    }

    #[test]
    fn set_updates_the_defining_scope() {
        let global = Environment::new();
        global.define("x", Value::Number(1.0), false).unwrap();
        let inner = global.child();
        inner.set("x", Value::Number(2.0)).unwrap();
        assert_eq!(global.get("x").unwrap(), Value::Number(2.0));
        assert!(!inner.is_defined_locally("x"));
    }

    #[test]
    fn constants_reject_mutation_but_allow_shadowing() {
        let global = Environment::new();
        global.define("k", Value::Number(1.0), true).unwrap();
        assert_eq!(
            global.set("k", Value::Null).unwrap_err().kind,
            ErrorKind::ConstReassignment
        );
        assert_eq!(
            global.define("k", Value::Null, false).unwrap_err().kind,
            ErrorKind::ConstReassignment
        );
        let inner = global.child();
        inner.define("k", Value::Number(7.0), false).unwrap();
        assert_eq!(inner.get("k").unwrap(), Value::Number(7.0));
        assert_eq!(global.get("k").unwrap(), Value::Number(1.0));
    }

    #[test]
    fn set_of_unknown_name_is_unbound() {
        let env = Environment::new().child();
        assert_eq!(env.set("ghost", Value::Null).unwrap_err().kind, ErrorKind::UnboundName);
    }
}
