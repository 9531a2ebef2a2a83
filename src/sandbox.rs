//=====================================================
// File: sandbox.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: GuardScript sandboxed global environment
// Objective: Freeze the whitelisted global bindings, intercept reads and
//            writes of global names, and expose require() over the
//            whitelisted modules
//=====================================================

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use rand::Rng;

use crate::ast::Line;
use crate::harness;
use crate::interpreter::natives::join_values;
use crate::interpreter::value::{Env, NativeArity, NativeFn, NativeFunc, ObjectData, Value};
use crate::interpreter::{Interpreter, RuntimeError};

/// The program's global environment: a frozen set of built-in bindings plus
/// the root scope where program-level bindings live.
///
/// Reads of a name in neither fail with `NAME is not defined.`; writes to a
/// frozen name fail with `NAME is part of the global library, and cannot be
/// overwritten.`; writes to any other name create a program-level binding.
pub struct Globals {
    frozen: IndexMap<String, Value>,
    root: Env,
}

impl Globals {
    pub fn root(&self) -> &Env {
        &self.root
    }

    pub fn is_frozen(&self, name: &str) -> bool {
        self.frozen.contains_key(name)
    }

    pub fn frozen_get(&self, name: &str) -> Option<Value> {
        self.frozen.get(name).cloned()
    }

    /// Host-side view of the live global object: program bindings shadow
    /// nothing (frozen names cannot be redeclared at the top level), so the
    /// lookup order mirrors the evaluator's.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.root.get(name).or_else(|| self.frozen_get(name))
    }
}

fn native(name: &'static str, arity: NativeArity, func: NativeFn) -> Value {
    Value::Native(Rc::new(NativeFunc {
        name,
        arity,
        func,
        receiver: None,
    }))
}

fn frozen_object(tag: &'static str, members: IndexMap<String, Value>) -> Value {
    Value::Object(Rc::new(RefCell::new(ObjectData {
        members,
        class: None,
        frozen: true,
        tag: Some(tag),
    })))
}

fn fail(line: Line, message: String) -> RuntimeError {
    RuntimeError::Exception { line, message }
}

/// Build the frozen global set for one program.
pub fn build_globals() -> Rc<Globals> {
    let mut frozen = IndexMap::new();

    let mut console = IndexMap::new();
    console.insert(
        "log".to_string(),
        native("log", NativeArity::Range { min: 0, max: None }, console_log),
    );
    frozen.insert("console".to_string(), frozen_object("console", console));

    let mut math = IndexMap::new();
    math.insert("PI".to_string(), Value::Number(std::f64::consts::PI));
    math.insert("E".to_string(), Value::Number(std::f64::consts::E));
    for (name, func) in [
        ("abs", math_abs as NativeFn),
        ("floor", math_floor),
        ("ceil", math_ceil),
        ("round", math_round),
        ("sqrt", math_sqrt),
        ("sin", math_sin),
        ("cos", math_cos),
        ("tan", math_tan),
        ("log", math_log),
    ] {
        math.insert(name.to_string(), native(name, NativeArity::Exact(1), func));
    }
    math.insert(
        "pow".to_string(),
        native("pow", NativeArity::Exact(2), math_pow),
    );
    math.insert(
        "min".to_string(),
        native("min", NativeArity::Range { min: 1, max: None }, math_min),
    );
    math.insert(
        "max".to_string(),
        native("max", NativeArity::Range { min: 1, max: None }, math_max),
    );
    math.insert(
        "random".to_string(),
        native("random", NativeArity::Exact(0), math_random),
    );
    frozen.insert("Math".to_string(), frozen_object("Math", math));

    let mut array = IndexMap::new();
    array.insert(
        "create".to_string(),
        native("create", NativeArity::Exact(2), array_create),
    );
    frozen.insert("Array".to_string(), frozen_object("Array", array));

    let mut object = IndexMap::new();
    for (name, func) in [
        ("keys", object_keys as NativeFn),
        ("values", object_values),
        ("entries", object_entries),
        ("getOwnPropertyNames", object_keys),
    ] {
        object.insert(name.to_string(), native(name, NativeArity::Exact(1), func));
    }
    frozen.insert("Object".to_string(), frozen_object("Object", object));

    let mut json = IndexMap::new();
    json.insert(
        "parse".to_string(),
        native("parse", NativeArity::Exact(1), json_parse),
    );
    json.insert(
        "stringify".to_string(),
        native("stringify", NativeArity::Exact(1), json_stringify),
    );
    frozen.insert("JSON".to_string(), frozen_object("JSON", json));

    frozen.insert(
        "parseInt".to_string(),
        native(
            "parseInt",
            NativeArity::Range { min: 1, max: Some(2) },
            parse_int,
        ),
    );
    frozen.insert(
        "parseFloat".to_string(),
        native("parseFloat", NativeArity::Exact(1), parse_float),
    );

    frozen.insert("Infinity".to_string(), Value::Number(f64::INFINITY));
    frozen.insert("NaN".to_string(), Value::Number(f64::NAN));
    frozen.insert("undefined".to_string(), Value::Undefined);

    frozen.insert(
        "test".to_string(),
        native("test", NativeArity::Exact(2), harness::native_test),
    );
    frozen.insert(
        "assert".to_string(),
        native("assert", NativeArity::Exact(1), harness::native_assert),
    );
    frozen.insert(
        "summary".to_string(),
        native(
            "summary",
            NativeArity::Range { min: 0, max: Some(1) },
            harness::native_summary,
        ),
    );
    frozen.insert(
        "enableTests".to_string(),
        native(
            "enableTests",
            NativeArity::Range { min: 0, max: Some(2) },
            harness::native_enable_tests,
        ),
    );

    frozen.insert(
        "require".to_string(),
        native("require", NativeArity::Exact(1), require),
    );
    frozen.insert(
        "version".to_string(),
        native("version", NativeArity::Exact(0), version),
    );

    Rc::new(Globals {
        frozen,
        root: Env::new(),
    })
}

/// Freeze a whitelisted module's exported value, recursively.
pub fn deep_freeze(value: &Value) {
    match value {
        Value::Object(data) => {
            let mut borrowed = data.borrow_mut();
            if borrowed.frozen {
                return;
            }
            borrowed.frozen = true;
            let members: Vec<Value> = borrowed.members.values().cloned().collect();
            drop(borrowed);
            for member in members {
                deep_freeze(&member);
            }
        }
        Value::Array(data) => {
            let mut borrowed = data.borrow_mut();
            if borrowed.frozen {
                return;
            }
            borrowed.frozen = true;
            let elements = borrowed.elements.clone();
            drop(borrowed);
            for element in &elements {
                deep_freeze(element);
            }
        }
        _ => {}
    }
}

//=====================================================
// Section 1.0 - Console, modules, version
//=====================================================

fn console_log(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    _line: Line,
) -> Result<Value, RuntimeError> {
    let text = join_values(args);
    (interp.console)(&text);
    Ok(Value::Undefined)
}

fn require(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let Some(Value::Str(name)) = args.first() else {
        return Err(fail(
            line,
            format!(
                "Argument of 'require' must be a string, instead received '{}'.",
                args.first().cloned().unwrap_or(Value::Undefined)
            ),
        ));
    };
    let modules = interp.modules.borrow();
    match modules.get(&**name) {
        Some(value) => Ok(value.clone()),
        None => Err(fail(line, format!("'{}' not found.", name))),
    }
}

fn version(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    _args: &[Value],
    _line: Line,
) -> Result<Value, RuntimeError> {
    match &interp.version {
        Some(callback) => {
            let callback = Rc::clone(callback);
            callback();
        }
        None => (interp.console)(concat!("GuardScript ", env!("CARGO_PKG_VERSION"))),
    }
    Ok(Value::Undefined)
}

//=====================================================
// Section 2.0 - Numeric primitives
//=====================================================

fn expect_number(name: &str, value: Option<&Value>, line: Line) -> Result<f64, RuntimeError> {
    match value {
        Some(Value::Number(n)) => Ok(*n),
        other => Err(fail(
            line,
            format!(
                "Argument of '{}' must be a number, instead received '{}'.",
                name,
                other.cloned().unwrap_or(Value::Undefined)
            ),
        )),
    }
}

macro_rules! unary_math {
    ($rust_name:ident, $name:literal, $op:expr) => {
        fn $rust_name(
            _interp: &mut Interpreter,
            _this: Option<&Value>,
            args: &[Value],
            line: Line,
        ) -> Result<Value, RuntimeError> {
            let n = expect_number($name, args.first(), line)?;
            let f: fn(f64) -> f64 = $op;
            Ok(Value::Number(f(n)))
        }
    };
}

unary_math!(math_abs, "abs", f64::abs);
unary_math!(math_floor, "floor", f64::floor);
unary_math!(math_ceil, "ceil", f64::ceil);
unary_math!(math_round, "round", f64::round);
unary_math!(math_sqrt, "sqrt", f64::sqrt);
unary_math!(math_sin, "sin", f64::sin);
unary_math!(math_cos, "cos", f64::cos);
unary_math!(math_tan, "tan", f64::tan);
unary_math!(math_log, "log", f64::ln);

fn math_pow(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let base = expect_number("pow", args.first(), line)?;
    let exp = expect_number("pow", args.get(1), line)?;
    Ok(Value::Number(base.powf(exp)))
}

fn math_min(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let mut best = f64::INFINITY;
    for arg in args {
        let n = expect_number("min", Some(arg), line)?;
        best = best.min(n);
    }
    Ok(Value::Number(best))
}

fn math_max(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let mut best = f64::NEG_INFINITY;
    for arg in args {
        let n = expect_number("max", Some(arg), line)?;
        best = best.max(n);
    }
    Ok(Value::Number(best))
}

fn math_random(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    _args: &[Value],
    _line: Line,
) -> Result<Value, RuntimeError> {
    Ok(Value::Number(rand::thread_rng().gen::<f64>()))
}

fn parse_int(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let Some(Value::Str(text)) = args.first() else {
        return Err(fail(
            line,
            format!(
                "Argument of 'parseInt' must be a string, instead received '{}'.",
                args.first().cloned().unwrap_or(Value::Undefined)
            ),
        ));
    };
    let radix = match args.get(1) {
        Some(Value::Number(n)) if (2.0..=36.0).contains(n) && n.fract() == 0.0 => *n as u32,
        None => 10,
        Some(_) => return Ok(Value::Number(f64::NAN)),
    };
    Ok(Value::Number(parse_int_prefix(text.trim(), radix)))
}

/// Longest valid numeric prefix in the given radix, like the usual
/// `parseInt`; `NaN` when no digits are present.
fn parse_int_prefix(text: &str, radix: u32) -> f64 {
    let mut chars = text.chars().peekable();
    let mut sign = 1.0;
    if let Some(&c) = chars.peek() {
        if c == '+' || c == '-' {
            if c == '-' {
                sign = -1.0;
            }
            chars.next();
        }
    }
    let mut value: Option<f64> = None;
    for c in chars {
        match c.to_digit(radix) {
            Some(digit) => {
                value = Some(value.unwrap_or(0.0) * radix as f64 + digit as f64);
            }
            None => break,
        }
    }
    value.map(|v| sign * v).unwrap_or(f64::NAN)
}

fn parse_float(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let Some(Value::Str(text)) = args.first() else {
        return Err(fail(
            line,
            format!(
                "Argument of 'parseFloat' must be a string, instead received '{}'.",
                args.first().cloned().unwrap_or(Value::Undefined)
            ),
        ));
    };
    let trimmed = text.trim();
    // Longest prefix that parses as a float.
    let mut best: Option<f64> = None;
    for end in 1..=trimmed.len() {
        if !trimmed.is_char_boundary(end) {
            continue;
        }
        if let Ok(v) = trimmed[..end].parse::<f64>() {
            best = Some(v);
        }
    }
    Ok(Value::Number(best.unwrap_or(f64::NAN)))
}

//=====================================================
// Section 3.0 - Array / Object / JSON
//=====================================================

fn array_create(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let size = match args.first() {
        Some(Value::Number(n)) if n.fract() == 0.0 && *n > 0.0 && n.is_finite() => *n as usize,
        other => {
            return Err(fail(
                line,
                format!(
                    "Array size must be a positive integer, instead received '{}'.",
                    other.cloned().unwrap_or(Value::Undefined)
                ),
            ));
        }
    };
    let fill = args.get(1).cloned().unwrap_or(Value::Undefined);
    Ok(Value::array(vec![fill; size]))
}

fn expect_object(
    name: &str,
    value: Option<&Value>,
    line: Line,
) -> Result<Rc<RefCell<ObjectData>>, RuntimeError> {
    match value {
        Some(Value::Object(data)) => Ok(Rc::clone(data)),
        other => Err(fail(
            line,
            format!(
                "Argument of 'Object.{}' must be an object, instead received '{}'.",
                name,
                other.cloned().unwrap_or(Value::Undefined)
            ),
        )),
    }
}

fn object_keys(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let object = expect_object("keys", args.first(), line)?;
    let keys = object
        .borrow()
        .members
        .keys()
        .map(|k| Value::string(k.clone()))
        .collect();
    Ok(Value::array(keys))
}

fn object_values(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let object = expect_object("values", args.first(), line)?;
    let values = object.borrow().members.values().cloned().collect();
    Ok(Value::array(values))
}

fn object_entries(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let object = expect_object("entries", args.first(), line)?;
    let entries = object
        .borrow()
        .members
        .iter()
        .map(|(k, v)| Value::array(vec![Value::string(k.clone()), v.clone()]))
        .collect();
    Ok(Value::array(entries))
}

fn json_parse(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let Some(Value::Str(text)) = args.first() else {
        return Err(fail(
            line,
            format!(
                "Argument of 'JSON.parse' must be a string, instead received '{}'.",
                args.first().cloned().unwrap_or(Value::Undefined)
            ),
        ));
    };
    let parsed: serde_json::Value = serde_json::from_str(text)
        .map_err(|err| fail(line, format!("JSON.parse failed: {}.", err)))?;
    Ok(json_to_value(&parsed))
}

fn json_to_value(json: &serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s.clone()),
        serde_json::Value::Array(items) => {
            Value::array(items.iter().map(json_to_value).collect())
        }
        serde_json::Value::Object(map) => {
            let mut members = IndexMap::new();
            for (key, value) in map {
                members.insert(key.clone(), json_to_value(value));
            }
            Value::object(members)
        }
    }
}

fn json_stringify(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let value = args.first().cloned().unwrap_or(Value::Undefined);
    let json = value_to_json(&value, line)?;
    let text = serde_json::to_string(&json)
        .map_err(|err| RuntimeError::Internal(format!("JSON.stringify failed: {}", err)))?;
    Ok(Value::string(text))
}

fn value_to_json(value: &Value, line: Line) -> Result<serde_json::Value, RuntimeError> {
    match value {
        Value::Undefined | Value::Null => Ok(serde_json::Value::Null),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Number(n) => Ok(serde_json::Number::from_f64(*n)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)),
        Value::Str(s) => Ok(serde_json::Value::String(s.to_string())),
        Value::Array(data) => {
            let mut items = Vec::new();
            for element in &data.borrow().elements {
                items.push(value_to_json(element, line)?);
            }
            Ok(serde_json::Value::Array(items))
        }
        Value::Object(data) => {
            let mut map = serde_json::Map::new();
            for (key, member) in &data.borrow().members {
                map.insert(key.clone(), value_to_json(member, line)?);
            }
            Ok(serde_json::Value::Object(map))
        }
        other => Err(fail(
            line,
            format!(
                "JSON.stringify cannot serialize a value of type '{}'.",
                other.type_name()
            ),
        )),
    }
}

//=====================================================
// End of file
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_expose_frozen_builtins() {
        let globals = build_globals();
        assert!(globals.is_frozen("console"));
        assert!(globals.is_frozen("undefined"));
        assert!(globals.frozen_get("Infinity").is_some());
        assert!(globals.get("nonexistent").is_none());
    }

    #[test]
    fn parse_int_prefix_handles_radix_and_sign() {
        assert_eq!(parse_int_prefix("42abc", 10), 42.0);
        assert_eq!(parse_int_prefix("-17", 10), -17.0);
        assert_eq!(parse_int_prefix("ff", 16), 255.0);
        assert!(parse_int_prefix("xyz", 10).is_nan());
    }

    #[test]
    fn deep_freeze_reaches_nested_values() {
        let inner = Value::array(vec![Value::Number(1.0)]);
        let mut members = IndexMap::new();
        members.insert("list".to_string(), inner.clone());
        let module = Value::object(members);
        deep_freeze(&module);
        let Value::Array(data) = &inner else {
            unreachable!();
        };
        assert!(data.borrow().frozen);
    }
}
