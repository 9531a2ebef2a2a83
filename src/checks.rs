//! The runtime check library: the named operations the rewriter splices
//! around loads, stores, arithmetic, updates and calls. Each either returns
//! a value or fails with a student-facing message that names the offending
//! value; the exact strings are part of the crate's interface.

use std::rc::Rc;

use crate::ast::{BinaryOp, Line, UpdateOp};
use crate::interpreter::natives;
use crate::interpreter::value::{Closure, Value};
use crate::interpreter::RuntimeError;

fn fail(line: Line, message: String) -> RuntimeError {
    RuntimeError::Exception { line, message }
}

fn frozen_error(line: Line) -> RuntimeError {
    fail(line, "Cannot modify a frozen value.".to_string())
}

fn out_of_bounds(index: &Value, line: Line) -> RuntimeError {
    fail(line, format!("Index '{}' is out of array bounds.", index))
}

fn missing_member(name: &str, line: Line) -> RuntimeError {
    fail(line, format!("Object does not have member '{}'.", name))
}

/// A usable element index into a sequence of length `len`: a non-negative
/// integer strictly below the length.
fn sequence_index(index: &Value, len: usize) -> Option<usize> {
    let Value::Number(n) = index else {
        return None;
    };
    if !n.is_finite() || n.fract() != 0.0 || *n < 0.0 {
        return None;
    }
    let idx = *n as usize;
    if idx < len {
        Some(idx)
    } else {
        None
    }
}

/// `o[i]` read: `o` must be a sequence, `i` a valid existing index.
pub fn array_bounds_check(object: &Value, index: &Value, line: Line) -> Result<Value, RuntimeError> {
    let Value::Array(array) = object else {
        return Err(fail(
            line,
            format!("Expected an array, instead received '{}'.", object),
        ));
    };
    let data = array.borrow();
    match sequence_index(index, data.elements.len()) {
        Some(idx) => Ok(data.elements[idx].clone()),
        None => Err(out_of_bounds(index, line)),
    }
}

/// `o[i] = v`: bounds-checked write to an existing index. Refuses to write
/// `length`.
pub fn check_array(
    object: &Value,
    index: &Value,
    value: Value,
    line: Line,
) -> Result<Value, RuntimeError> {
    let Value::Array(array) = object else {
        return Err(fail(
            line,
            format!("Expected an array, instead received '{}'.", object),
        ));
    };
    if matches!(index, Value::Str(s) if &**s == "length") {
        return Err(fail(
            line,
            "Cannot write to the 'length' member of an array.".to_string(),
        ));
    }
    let mut data = array.borrow_mut();
    if data.frozen {
        return Err(frozen_error(line));
    }
    let len = data.elements.len();
    match sequence_index(index, len) {
        Some(idx) => {
            data.elements[idx] = value.clone();
            Ok(value)
        }
        None => Err(out_of_bounds(index, line)),
    }
}

/// `o.x` read. `o` must be object-shaped (object, string, boolean, number
/// or callable) and must own the member. Strings and arrays expose their
/// built-in members (`length`, `split`, the sequence operations) here.
pub fn dot(object: &Value, name: &str, line: Line) -> Result<Value, RuntimeError> {
    match object {
        Value::Undefined | Value::Null => Err(fail(
            line,
            format!("Cannot access member '{}' of '{}'.", name, object),
        )),
        Value::Object(data) => {
            let borrowed = data.borrow();
            if let Some(value) = borrowed.members.get(name) {
                return Ok(value.clone());
            }
            if let Some(class) = &borrowed.class {
                if let Some(def) = class.methods.get(name) {
                    return Ok(Value::Closure(Rc::new(Closure {
                        def: Rc::clone(def),
                        env: class.env.clone(),
                        this: Some(object.clone()),
                    })));
                }
            }
            Err(missing_member(name, line))
        }
        Value::Str(_) => {
            natives::string_member(object, name).ok_or_else(|| missing_member(name, line))
        }
        Value::Array(_) => {
            natives::array_member(object, name).ok_or_else(|| missing_member(name, line))
        }
        Value::Number(_) | Value::Bool(_) | Value::Closure(_) | Value::Native(_)
        | Value::Class(_) => Err(missing_member(name, line)),
    }
}

/// `o.x = v`: the member must already exist (constructors are exempted at
/// rewrite time, since the constructor is what creates the members).
/// Sequences take the `check_array` path instead.
pub fn check_member(
    object: &Value,
    name: &str,
    value: Value,
    line: Line,
) -> Result<Value, RuntimeError> {
    match object {
        Value::Array(_) => Err(fail(
            line,
            "Array members must be written with an index.".to_string(),
        )),
        Value::Object(data) => {
            let mut borrowed = data.borrow_mut();
            if borrowed.frozen {
                return Err(frozen_error(line));
            }
            if !borrowed.members.contains_key(name) {
                return Err(missing_member(name, line));
            }
            borrowed.members.insert(name.to_string(), value.clone());
            Ok(value)
        }
        other => Err(fail(
            line,
            format!("Cannot write member '{}' of '{}'.", name, other),
        )),
    }
}

/// The target of a prefix update on `o.m` or `o[i]`.
pub enum UpdateKey<'a> {
    Member(&'a str),
    Index(&'a Value),
}

fn updated(op: UpdateOp, n: f64) -> f64 {
    match op {
        UpdateOp::Increment => n + 1.0,
        UpdateOp::Decrement => n - 1.0,
    }
}

/// Prefix `++o.m` / `++o[i]`: checks existence and numeric-ness, applies the
/// update in place and returns the new value. The object expression has
/// already been evaluated exactly once by the caller.
pub fn check_update_operand(
    op: UpdateOp,
    object: &Value,
    key: UpdateKey<'_>,
    line: Line,
) -> Result<Value, RuntimeError> {
    match (object, key) {
        (Value::Object(data), UpdateKey::Member(name)) => {
            let mut borrowed = data.borrow_mut();
            if borrowed.frozen {
                return Err(frozen_error(line));
            }
            let Some(slot) = borrowed.members.get_mut(name) else {
                return Err(missing_member(name, line));
            };
            let n = match slot {
                Value::Number(n) => *n,
                other => {
                    // Format outside the borrow; the value may reference the
                    // object being updated.
                    let shown = other.clone();
                    drop(borrowed);
                    return Err(fail(
                        line,
                        format!(
                            "The operand of '{}' must be a number, instead received '{}'.",
                            op, shown
                        ),
                    ));
                }
            };
            let next = updated(op, n);
            borrowed.members.insert(name.to_string(), Value::Number(next));
            Ok(Value::Number(next))
        }
        (Value::Array(array), UpdateKey::Index(index)) => {
            let mut data = array.borrow_mut();
            if data.frozen {
                return Err(frozen_error(line));
            }
            let len = data.elements.len();
            let Some(idx) = sequence_index(index, len) else {
                return Err(out_of_bounds(index, line));
            };
            let n = match &data.elements[idx] {
                Value::Number(n) => *n,
                other => {
                    let shown = other.clone();
                    drop(data);
                    return Err(fail(
                        line,
                        format!(
                            "The operand of '{}' must be a number, instead received '{}'.",
                            op, shown
                        ),
                    ));
                }
            };
            let next = updated(op, n);
            data.elements[idx] = Value::Number(next);
            Ok(Value::Number(next))
        }
        (other, UpdateKey::Member(name)) => {
            if matches!(other, Value::Undefined | Value::Null) {
                Err(fail(
                    line,
                    format!("Cannot access member '{}' of '{}'.", name, other),
                ))
            } else {
                Err(missing_member(name, line))
            }
        }
        (_, UpdateKey::Index(index)) => Err(out_of_bounds(index, line)),
    }
}

/// Guard for prefix updates of plain variables: the current value must be a
/// number. Returns the updated number for the caller to store back.
pub fn update_only_numbers(op: UpdateOp, value: &Value, line: Line) -> Result<f64, RuntimeError> {
    match value {
        Value::Number(n) => Ok(updated(op, *n)),
        other => Err(fail(
            line,
            format!(
                "The operand of '{}' must be a number, instead received '{}'.",
                op, other
            ),
        )),
    }
}

/// JavaScript `ToInt32` for the bitwise and shift operators.
fn to_int32(n: f64) -> i32 {
    if !n.is_finite() || n == 0.0 {
        return 0;
    }
    let modulus = 4_294_967_296.0;
    let mut m = n.trunc() % modulus;
    if m < 0.0 {
        m += modulus;
    }
    if m >= 2_147_483_648.0 {
        (m - modulus) as i32
    } else {
        m as i32
    }
}

fn to_uint32(n: f64) -> u32 {
    to_int32(n) as u32
}

/// Arithmetic, comparison, shift and bitwise operators over two numbers.
pub fn apply_num_op(
    op: BinaryOp,
    left: &Value,
    right: &Value,
    line: Line,
) -> Result<Value, RuntimeError> {
    let (Value::Number(l), Value::Number(r)) = (left, right) else {
        return Err(fail(
            line,
            format!("Arguments of operator '{}' must both be numbers.", op),
        ));
    };
    let value = match op {
        BinaryOp::Sub => Value::Number(l - r),
        BinaryOp::Mul => Value::Number(l * r),
        BinaryOp::Div => Value::Number(l / r),
        BinaryOp::Mod => Value::Number(l % r),
        BinaryOp::Less => Value::Bool(l < r),
        BinaryOp::LessEq => Value::Bool(l <= r),
        BinaryOp::Greater => Value::Bool(l > r),
        BinaryOp::GreaterEq => Value::Bool(l >= r),
        BinaryOp::Shl => Value::Number((to_int32(*l) << (to_uint32(*r) & 31)) as f64),
        BinaryOp::Shr => Value::Number((to_int32(*l) >> (to_uint32(*r) & 31)) as f64),
        BinaryOp::UShr => Value::Number((to_uint32(*l) >> (to_uint32(*r) & 31)) as f64),
        BinaryOp::BitAnd => Value::Number((to_int32(*l) & to_int32(*r)) as f64),
        BinaryOp::BitOr => Value::Number((to_int32(*l) | to_int32(*r)) as f64),
        BinaryOp::BitXor => Value::Number((to_int32(*l) ^ to_int32(*r)) as f64),
        other => {
            return Err(RuntimeError::Internal(format!(
                "apply_num_op invoked with operator '{}'",
                other
            )));
        }
    };
    Ok(value)
}

/// `+`: both numbers or both strings.
pub fn apply_num_or_string_op(
    left: &Value,
    right: &Value,
    line: Line,
) -> Result<Value, RuntimeError> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
        (Value::Str(l), Value::Str(r)) => {
            let mut text = String::with_capacity(l.len() + r.len());
            text.push_str(l);
            text.push_str(r);
            Ok(Value::string(text))
        }
        _ => Err(fail(
            line,
            "Arguments of operator '+' must both be numbers or strings.".to_string(),
        )),
    }
}

/// Boolean-context enforcement for statement tests, conditionals, logical
/// operands and `!`.
pub fn check_if_boolean(
    value: &Value,
    op: Option<&'static str>,
    line: Line,
) -> Result<bool, RuntimeError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => {
            let message = match op {
                None => format!("Expected a boolean expression, instead received '{}'.", other),
                Some(op) => format!(
                    "Expected a boolean expression as the operand of '{}', instead received '{}'.",
                    op, other
                ),
            };
            Err(fail(line, message))
        }
    }
}

fn argument_word(count: usize) -> &'static str {
    if count == 1 {
        "argument"
    } else {
        "arguments"
    }
}

/// Declared-arity enforcement for every rewritten function.
pub fn arity_check(
    name: &str,
    expected: usize,
    actual: usize,
    line: Line,
) -> Result<(), RuntimeError> {
    if expected == actual {
        return Ok(());
    }
    Err(fail(
        line,
        format!(
            "Function {} expected {} {} but received {} {}.",
            name,
            expected,
            argument_word(expected),
            actual,
            argument_word(actual)
        ),
    ))
}
