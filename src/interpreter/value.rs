use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::ast::{DeclKind, FuncDef, Line};

use super::{Interpreter, RuntimeError};

/// Arity constraints for native (built-in) functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeArity {
    /// The function expects exactly this many arguments.
    Exact(usize),
    /// Inclusive minimum and optional maximum; `None` means no upper bound.
    Range { min: usize, max: Option<usize> },
}

impl NativeArity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            NativeArity::Exact(n) => *n == count,
            NativeArity::Range { min, max } => {
                count >= *min && max.map_or(true, |max| count <= max)
            }
        }
    }
}

pub type NativeFn =
    fn(&mut Interpreter, Option<&Value>, &[Value], Line) -> Result<Value, RuntimeError>;

/// A native function value, possibly bound to a receiver (`s.split` read off
/// a string yields a bound native).
pub struct NativeFunc {
    pub name: &'static str,
    pub arity: NativeArity,
    pub func: NativeFn,
    pub receiver: Option<Value>,
}

/// Ordered member storage for objects. Insertion order is observable through
/// `Object.keys` and friends.
pub struct ObjectData {
    pub members: IndexMap<String, Value>,
    pub class: Option<Rc<ClassValue>>,
    pub frozen: bool,
    /// Marks sandbox-provided built-in objects; `"Array"` in particular so
    /// `new Array(...)` can point students at `Array.create`.
    pub tag: Option<&'static str>,
}

impl ObjectData {
    pub fn plain(members: IndexMap<String, Value>) -> Self {
        Self {
            members,
            class: None,
            frozen: false,
            tag: None,
        }
    }
}

pub struct ArrayData {
    pub elements: Vec<Value>,
    pub frozen: bool,
}

/// A user function together with its captured environment. Arrows also
/// capture the `this` in force at the point of definition.
pub struct Closure {
    pub def: Rc<FuncDef>,
    pub env: Env,
    pub this: Option<Value>,
}

/// A class declaration value: constructor, methods, and the environment the
/// class body closes over.
pub struct ClassValue {
    pub name: String,
    pub ctor: Option<Rc<FuncDef>>,
    pub methods: IndexMap<String, Rc<FuncDef>>,
    pub env: Env,
}

/// Runtime values. Scalars are copied; objects, arrays and functions have
/// reference semantics through `Rc`.
#[derive(Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
    Array(Rc<RefCell<ArrayData>>),
    Object(Rc<RefCell<ObjectData>>),
    Closure(Rc<Closure>),
    Native(Rc<NativeFunc>),
    Class(Rc<ClassValue>),
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Value::Str(Rc::from(text.into().into_boxed_str()))
    }

    pub fn array(elements: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayData {
            elements,
            frozen: false,
        })))
    }

    pub fn object(members: IndexMap<String, Value>) -> Self {
        Value::Object(Rc::new(RefCell::new(ObjectData::plain(members))))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
            Value::Closure(_) | Value::Native(_) => "function",
            Value::Class(_) => "class",
        }
    }

    pub fn is_callable(&self) -> bool {
        matches!(self, Value::Closure(_) | Value::Native(_))
    }

    /// Permissive truthiness, used only as the silent-mode fallback when a
    /// boolean check has been logged instead of raised.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Undefined | Value::Null => false,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Str(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Strict (`===`) equality: value equality for scalars, reference
    /// equality for objects, arrays and functions. `NaN !== NaN`.
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) => true,
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => Rc::ptr_eq(a, b),
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Native(a), Value::Native(b)) => Rc::ptr_eq(a, b),
            (Value::Class(a), Value::Class(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => f.write_str("undefined"),
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => f.write_str(&format_number(*n)),
            Value::Str(s) => f.write_str(s),
            Value::Array(array) => {
                f.write_str("[")?;
                for (i, element) in array.borrow().elements.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                f.write_str("]")
            }
            Value::Object(object) => {
                f.write_str("{")?;
                for (i, (key, value)) in object.borrow().members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", key, value)?;
                }
                f.write_str("}")
            }
            Value::Closure(closure) => {
                write!(f, "<function {}>", closure.def.display_name())
            }
            Value::Native(native) => write!(f, "<function {}>", native.name),
            Value::Class(class) => write!(f, "<class {}>", class.name),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self)
    }
}

/// Render a number the way students expect: integers without a trailing
/// `.0`, and the usual `NaN` / `Infinity` spellings.
pub fn format_number(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if n == n.trunc() && n.abs() < 9.007_199_254_740_992e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[derive(Clone)]
pub struct Binding {
    pub value: Value,
    pub kind: DeclKind,
}

struct EnvData {
    vars: HashMap<String, Binding>,
    parent: Option<Env>,
}

/// A lexical environment chain with reference semantics, so closures see
/// later writes to captured bindings.
#[derive(Clone)]
pub struct Env(Rc<RefCell<EnvData>>);

impl Env {
    pub fn new() -> Self {
        Env(Rc::new(RefCell::new(EnvData {
            vars: HashMap::new(),
            parent: None,
        })))
    }

    pub fn child(&self) -> Self {
        Env(Rc::new(RefCell::new(EnvData {
            vars: HashMap::new(),
            parent: Some(self.clone()),
        })))
    }

    pub fn is_same(&self, other: &Env) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn declare(&self, name: &str, kind: DeclKind, value: Value) {
        self.0
            .borrow_mut()
            .vars
            .insert(name.to_string(), Binding { value, kind });
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let data = self.0.borrow();
        if let Some(binding) = data.vars.get(name) {
            return Some(binding.value.clone());
        }
        data.parent.as_ref().and_then(|parent| parent.get(name))
    }

    /// Update an existing binding somewhere along the chain. Returns false
    /// when no scope declares the name.
    pub fn set(&self, name: &str, value: Value) -> bool {
        let mut data = self.0.borrow_mut();
        if let Some(binding) = data.vars.get_mut(name) {
            binding.value = value;
            return true;
        }
        match &data.parent {
            Some(parent) => parent.set(name, value),
            None => false,
        }
    }
}

impl Default for Env {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_format_like_javascript() {
        assert_eq!(format_number(42.0), "42");
        assert_eq!(format_number(-3.0), "-3");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
    }

    #[test]
    fn strict_equality_uses_reference_semantics_for_objects() {
        let a = Value::array(vec![Value::Number(1.0)]);
        let b = a.clone();
        let c = Value::array(vec![Value::Number(1.0)]);
        assert!(a.strict_eq(&b));
        assert!(!a.strict_eq(&c));
        assert!(!Value::Number(f64::NAN).strict_eq(&Value::Number(f64::NAN)));
    }

    #[test]
    fn env_chain_updates_are_visible_through_closure_copies() {
        let root = Env::new();
        root.declare("x", DeclKind::Let, Value::Number(1.0));
        let inner = root.child();
        assert!(inner.set("x", Value::Number(2.0)));
        assert_eq!(
            root.get("x").map(|v| v.to_string()),
            Some("2".to_string())
        );
        assert!(!inner.set("missing", Value::Undefined));
    }
}
