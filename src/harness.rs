//! The student-facing test framework: `test`, `assert`, `summary` and
//! `enableTests`, with per-test deadlines enforced through the scheduler.

use std::time::Duration;

use indexmap::IndexMap;

use crate::ast::Line;
use crate::interpreter::value::Value;
use crate::interpreter::{Interpreter, RuntimeError};

/// One executed test, in execution order.
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub description: String,
    pub failed: bool,
    pub error: Option<String>,
}

/// Harness state stored in the program's global runtime state. `summary`
/// consumes the records and disables testing until `enableTests` runs again.
pub struct TestState {
    enabled: bool,
    timeout: Duration,
    records: Vec<TestRecord>,
}

pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

impl TestState {
    pub fn new() -> Self {
        Self {
            enabled: false,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            records: Vec::new(),
        }
    }

    pub fn enable(&mut self, on: bool, timeout_ms: u64) {
        self.enabled = on;
        self.timeout = Duration::from_millis(timeout_ms);
        self.records.clear();
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn record(&mut self, record: TestRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[TestRecord] {
        &self.records
    }

    /// Produce the `summary` report and advance the harness state: records
    /// are consumed and testing is disabled until re-enabled.
    pub fn summary_output(&mut self, has_styles: bool) -> String {
        if !self.enabled {
            return "Testing is not enabled.".to_string();
        }
        self.enabled = false;
        if self.records.is_empty() {
            return "No tests written.\nWrite some with test('description', function() { ... })."
                .to_string();
        }

        let mark = |text: &str, color: u8| -> String {
            if has_styles {
                format!("\u{1b}[{}m{}\u{1b}[0m", color, text)
            } else {
                text.to_string()
            }
        };

        let mut lines = Vec::with_capacity(self.records.len() + 1);
        let mut failed = 0usize;
        for record in self.records.drain(..) {
            if record.failed {
                failed += 1;
                lines.push(format!(
                    "{} {}\n         {}",
                    mark(" FAILED ", 31),
                    record.description,
                    record.error.unwrap_or_default()
                ));
            } else {
                lines.push(format!("{}     {}", mark(" OK ", 32), record.description));
            }
        }
        let total = lines.len();
        lines.push(format!(
            "Tests:     {} failed, {} passed, {} total.",
            failed,
            total - failed,
            total
        ));
        lines.join("\n")
    }
}

impl Default for TestState {
    fn default() -> Self {
        Self::new()
    }
}

//=====================================================
// Natives bound into the sandbox globals
//=====================================================

pub fn native_enable_tests(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    let on = match args.first() {
        Some(Value::Bool(b)) => *b,
        None => true,
        Some(other) => {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "Argument of 'enableTests' must be a boolean, instead received '{}'.",
                    other
                ),
            });
        }
    };
    let timeout_ms = match args.get(1) {
        Some(Value::Number(n)) if *n > 0.0 => *n as u64,
        None => DEFAULT_TIMEOUT_MS,
        Some(other) => {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "Timeout for 'enableTests' must be a positive number, instead received '{}'.",
                    other
                ),
            });
        }
    };
    interp.harness.borrow_mut().enable(on, timeout_ms);
    Ok(Value::Undefined)
}

/// `test(description, thunk)`: runs the thunk under the per-test deadline.
/// Failures and timeouts are recorded and never propagate past the test
/// boundary, so subsequent tests still run; a requested stop does
/// propagate.
pub fn native_test(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    if !interp.harness.borrow().is_enabled() {
        return Ok(Value::Undefined);
    }
    let description = match args.first() {
        Some(Value::Str(s)) => s.to_string(),
        other => {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "First argument of 'test' must be a string, instead received '{}'.",
                    other.cloned().unwrap_or(Value::Undefined)
                ),
            });
        }
    };
    let thunk = match args.get(1) {
        Some(value) if value.is_callable() => value.clone(),
        other => {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "Second argument of 'test' must be a function, instead received '{}'.",
                    other.cloned().unwrap_or(Value::Undefined)
                ),
            });
        }
    };

    let timeout = interp.harness.borrow().timeout();
    let previous = interp.control.arm_deadline(timeout);
    let outcome = interp.call_value(thunk, None, Vec::new(), line);
    interp.control.restore_deadline(previous);

    let record = match outcome {
        Ok(_) => TestRecord {
            description,
            failed: false,
            error: None,
        },
        Err(RuntimeError::TimeLimit { .. }) => TestRecord {
            description,
            failed: true,
            error: Some("Time limit exceeded.".to_string()),
        },
        Err(RuntimeError::Stopped) => return Err(RuntimeError::Stopped),
        Err(err) => TestRecord {
            description,
            failed: true,
            error: Some(err.message()),
        },
    };
    interp.harness.borrow_mut().record(record);
    Ok(Value::Undefined)
}

pub fn native_assert(
    _interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    line: Line,
) -> Result<Value, RuntimeError> {
    match args.first() {
        Some(Value::Bool(true)) => Ok(Value::Bool(true)),
        Some(Value::Bool(false)) => Err(RuntimeError::Exception {
            line,
            message: "Assertion failed.".to_string(),
        }),
        other => Err(RuntimeError::Exception {
            line,
            message: format!(
                "Assertion argument '{}' is not a boolean value.",
                other.cloned().unwrap_or(Value::Undefined)
            ),
        }),
    }
}

pub fn native_summary(
    interp: &mut Interpreter,
    _this: Option<&Value>,
    args: &[Value],
    _line: Line,
) -> Result<Value, RuntimeError> {
    let has_styles = matches!(args.first(), Some(Value::Bool(true)));
    let output = interp.harness.borrow_mut().summary_output(has_styles);
    let mut members = IndexMap::new();
    members.insert("output".to_string(), Value::string(output));
    Ok(Value::object(members))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_formats_ok_and_failed_lines() {
        let mut state = TestState::new();
        state.enable(true, 2000);
        state.record(TestRecord {
            description: "loop".to_string(),
            failed: true,
            error: Some("Time limit exceeded.".to_string()),
        });
        let output = state.summary_output(false);
        let lines: Vec<&str> = output.split('\n').collect();
        assert_eq!(lines[0], " FAILED  loop");
        assert_eq!(lines[1], "         Time limit exceeded.");
        assert_eq!(lines[2], "Tests:     1 failed, 0 passed, 1 total.");
    }

    #[test]
    fn summary_consumes_and_disables() {
        let mut state = TestState::new();
        state.enable(true, 2000);
        state.record(TestRecord {
            description: "ok".to_string(),
            failed: false,
            error: None,
        });
        let first = state.summary_output(false);
        assert!(first.contains(" OK      ok"));
        assert!(first.contains("Tests:     0 failed, 1 passed, 1 total."));
        let second = state.summary_output(false);
        assert_eq!(second, "Testing is not enabled.");
    }

    #[test]
    fn summary_hints_when_no_tests_written() {
        let mut state = TestState::new();
        state.enable(true, 2000);
        let output = state.summary_output(false);
        assert!(output.starts_with("No tests written."));
    }

    #[test]
    fn styled_summary_wraps_status_markers() {
        let mut state = TestState::new();
        state.enable(true, 2000);
        state.record(TestRecord {
            description: "ok".to_string(),
            failed: false,
            error: None,
        });
        let output = state.summary_output(true);
        assert!(output.contains("\u{1b}[32m OK \u{1b}[0m"));
    }
}
