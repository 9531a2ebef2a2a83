//! Built-in members of strings and sequences. Sequence higher-order
//! operations run their callbacks through the evaluator, so they hit the
//! scheduler's checkpoints and can be timed out like any student code.

use std::rc::Rc;

use crate::ast::Line;

use super::value::{NativeArity, NativeFunc, Value};
use super::{Interpreter, RuntimeError};

fn bound(name: &'static str, arity: NativeArity, func: super::value::NativeFn, receiver: &Value) -> Value {
    Value::Native(Rc::new(NativeFunc {
        name,
        arity,
        func,
        receiver: Some(receiver.clone()),
    }))
}

fn type_error(line: Line, message: String) -> RuntimeError {
    RuntimeError::Exception { line, message }
}

fn expect_receiver_string(receiver: Option<&Value>, line: Line) -> Result<Rc<str>, RuntimeError> {
    match receiver {
        Some(Value::Str(s)) => Ok(Rc::clone(s)),
        other => Err(RuntimeError::Internal(format!(
            "string method called on '{}' (line {})",
            other.map(|v| v.type_name()).unwrap_or("nothing"),
            line
        ))),
    }
}

fn expect_receiver_array(
    receiver: Option<&Value>,
    line: Line,
) -> Result<Rc<std::cell::RefCell<super::value::ArrayData>>, RuntimeError> {
    match receiver {
        Some(Value::Array(array)) => Ok(Rc::clone(array)),
        other => Err(RuntimeError::Internal(format!(
            "array method called on '{}' (line {})",
            other.map(|v| v.type_name()).unwrap_or("nothing"),
            line
        ))),
    }
}

/// Own members of a string value: `length`, `split`, and a small set of
/// text helpers. Returns `None` for anything else so `dot` can report the
/// member as missing.
pub fn string_member(receiver: &Value, name: &str) -> Option<Value> {
    let Value::Str(s) = receiver else {
        return None;
    };
    match name {
        "length" => Some(Value::Number(s.chars().count() as f64)),
        "split" => Some(bound("split", NativeArity::Exact(1), string_split, receiver)),
        "toUpperCase" => Some(bound(
            "toUpperCase",
            NativeArity::Exact(0),
            string_to_upper,
            receiver,
        )),
        "toLowerCase" => Some(bound(
            "toLowerCase",
            NativeArity::Exact(0),
            string_to_lower,
            receiver,
        )),
        "charAt" => Some(bound("charAt", NativeArity::Exact(1), string_char_at, receiver)),
        _ => None,
    }
}

fn string_split(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let text = expect_receiver_string(receiver, line)?;
    let Some(Value::Str(sep)) = args.first() else {
        return Err(type_error(
            line,
            format!(
                "Argument of 'split' must be a string, instead received '{}'.",
                args.first().cloned().unwrap_or(Value::Undefined)
            ),
        ));
    };
    let parts: Vec<Value> = if sep.is_empty() {
        text.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        text.split(&**sep).map(Value::string).collect()
    };
    Ok(Value::array(parts))
}

fn string_to_upper(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    _args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let text = expect_receiver_string(receiver, line)?;
    Ok(Value::string(text.to_uppercase()))
}

fn string_to_lower(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    _args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let text = expect_receiver_string(receiver, line)?;
    Ok(Value::string(text.to_lowercase()))
}

fn string_char_at(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let text = expect_receiver_string(receiver, line)?;
    let index = match args.first() {
        Some(Value::Number(n)) if n.fract() == 0.0 && *n >= 0.0 => *n as usize,
        _ => return Ok(Value::string("")),
    };
    Ok(text
        .chars()
        .nth(index)
        .map(|c| Value::string(c.to_string()))
        .unwrap_or_else(|| Value::string("")))
}

/// Own members of a sequence: `length` plus the mutating and higher-order
/// operations.
pub fn array_member(receiver: &Value, name: &str) -> Option<Value> {
    let Value::Array(array) = receiver else {
        return None;
    };
    match name {
        "length" => Some(Value::Number(array.borrow().elements.len() as f64)),
        "push" => Some(bound(
            "push",
            NativeArity::Range { min: 1, max: None },
            array_push,
            receiver,
        )),
        "pop" => Some(bound("pop", NativeArity::Exact(0), array_pop, receiver)),
        "map" => Some(bound("map", NativeArity::Exact(1), array_map, receiver)),
        "filter" => Some(bound("filter", NativeArity::Exact(1), array_filter, receiver)),
        "forEach" => Some(bound("forEach", NativeArity::Exact(1), array_for_each, receiver)),
        "reduce" => Some(bound(
            "reduce",
            NativeArity::Range { min: 1, max: Some(2) },
            array_reduce,
            receiver,
        )),
        "join" => Some(bound(
            "join",
            NativeArity::Range { min: 0, max: Some(1) },
            array_join,
            receiver,
        )),
        "indexOf" => Some(bound("indexOf", NativeArity::Exact(1), array_index_of, receiver)),
        "slice" => Some(bound(
            "slice",
            NativeArity::Range { min: 0, max: Some(2) },
            array_slice,
            receiver,
        )),
        _ => None,
    }
}

fn frozen_check(
    array: &std::cell::RefCell<super::value::ArrayData>,
    line: Line,
) -> Result<(), RuntimeError> {
    if array.borrow().frozen {
        Err(type_error(line, "Cannot modify a frozen value.".to_string()))
    } else {
        Ok(())
    }
}

fn array_push(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    frozen_check(&array, line)?;
    let mut data = array.borrow_mut();
    for arg in args {
        data.elements.push(arg.clone());
    }
    Ok(Value::Number(data.elements.len() as f64))
}

fn array_pop(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    _args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    frozen_check(&array, line)?;
    let mut data = array.borrow_mut();
    Ok(data.elements.pop().unwrap_or(Value::Undefined))
}

fn array_map(
    interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let callback = &args[0];
    let snapshot = array.borrow().elements.clone();
    let mut mapped = Vec::with_capacity(snapshot.len());
    for (i, element) in snapshot.into_iter().enumerate() {
        let value = interp.call_callback(
            callback,
            vec![element, Value::Number(i as f64)],
            line,
        )?;
        mapped.push(value);
    }
    Ok(Value::array(mapped))
}

fn array_filter(
    interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let callback = &args[0];
    let snapshot = array.borrow().elements.clone();
    let mut kept = Vec::new();
    for (i, element) in snapshot.into_iter().enumerate() {
        let keep = interp.call_callback(
            callback,
            vec![element.clone(), Value::Number(i as f64)],
            line,
        )?;
        let keep = match keep {
            Value::Bool(b) => b,
            other => {
                return Err(type_error(
                    line,
                    format!(
                        "The 'filter' callback must return a boolean, instead received '{}'.",
                        other
                    ),
                ));
            }
        };
        if keep {
            kept.push(element);
        }
    }
    Ok(Value::array(kept))
}

fn array_for_each(
    interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let callback = &args[0];
    let snapshot = array.borrow().elements.clone();
    for (i, element) in snapshot.into_iter().enumerate() {
        interp.call_callback(callback, vec![element, Value::Number(i as f64)], line)?;
    }
    Ok(Value::Undefined)
}

fn array_reduce(
    interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let callback = &args[0];
    let snapshot = array.borrow().elements.clone();
    let mut iter = snapshot.into_iter().enumerate();
    let mut acc = match args.get(1) {
        Some(initial) => initial.clone(),
        None => match iter.next() {
            Some((_, first)) => first,
            None => {
                return Err(type_error(
                    line,
                    "Reduce of an empty array with no initial value.".to_string(),
                ));
            }
        },
    };
    for (i, element) in iter {
        acc = interp.call_callback(
            callback,
            vec![acc, element, Value::Number(i as f64)],
            line,
        )?;
    }
    Ok(acc)
}

fn array_join(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let sep = match args.first() {
        Some(Value::Str(s)) => s.to_string(),
        Some(other) => {
            return Err(type_error(
                line,
                format!(
                    "Argument of 'join' must be a string, instead received '{}'.",
                    other
                ),
            ));
        }
        None => ",".to_string(),
    };
    let joined = array
        .borrow()
        .elements
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(&sep);
    Ok(Value::string(joined))
}

fn array_index_of(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let needle = &args[0];
    let found = array
        .borrow()
        .elements
        .iter()
        .position(|element| element.strict_eq(needle));
    Ok(Value::Number(found.map(|i| i as f64).unwrap_or(-1.0)))
}

fn array_slice(
    _interp: &mut Interpreter,
    receiver: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let array = expect_receiver_array(receiver, line)?;
    let data = array.borrow();
    let len = data.elements.len() as i64;
    let clamp = |raw: f64| -> usize {
        let raw = raw.trunc() as i64;
        let idx = if raw < 0 { len + raw } else { raw };
        idx.clamp(0, len) as usize
    };
    let start = match args.first() {
        Some(Value::Number(n)) => clamp(*n),
        None => 0,
        Some(other) => {
            return Err(type_error(
                line,
                format!(
                    "Argument of 'slice' must be a number, instead received '{}'.",
                    other
                ),
            ));
        }
    };
    let end = match args.get(1) {
        Some(Value::Number(n)) => clamp(*n),
        None => len as usize,
        Some(other) => {
            return Err(type_error(
                line,
                format!(
                    "Argument of 'slice' must be a number, instead received '{}'.",
                    other
                ),
            ));
        }
    };
    let slice = if start < end {
        data.elements[start..end].to_vec()
    } else {
        Vec::new()
    };
    Ok(Value::array(slice))
}

/// Join values for `console.log`, space separated like the usual console.
pub fn join_values(args: &[Value]) -> String {
    args.iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}
