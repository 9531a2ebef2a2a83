pub mod natives;
pub mod value;

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::ast::{
    AssignOp, BinaryOp, Check, DeclKind, Expr, FuncDef, FuncKind, Line, LogicalOp, Program, Stmt,
    UnaryOp,
};
use crate::checks;
use crate::harness::TestState;
use crate::sandbox::Globals;
use crate::scheduler::{ExecControl, Interrupt};
use value::{ClassValue, Closure, Env, NativeArity, ObjectData, Value};

/// Runtime error taxonomy. `Return` / `Break` / `Continue` are control flow
/// and never escape the evaluator; `Stopped` and `TimeLimit` come from the
/// scheduler; `Internal` marks an engine invariant violation students should
/// report rather than debug.
pub enum RuntimeError {
    Exception { line: Line, message: String },
    Return(Value),
    Break,
    Continue,
    Stopped,
    TimeLimit { line: Line },
    Internal(String),
}

impl RuntimeError {
    /// The message surfaced in a `{type: "exception"}` result payload.
    pub fn message(&self) -> String {
        match self {
            RuntimeError::Exception { message, .. } => message.clone(),
            RuntimeError::TimeLimit { .. } => "Time limit exceeded.".to_string(),
            RuntimeError::Stopped => "Execution was stopped.".to_string(),
            RuntimeError::Internal(detail) => format!(
                "Potential bug in GuardScript: {}. Please report it.",
                detail
            ),
            RuntimeError::Return(_) => "A 'return' statement may only be used inside a function."
                .to_string(),
            RuntimeError::Break => "A 'break' statement may only be used inside a loop.".to_string(),
            RuntimeError::Continue => {
                "A 'continue' statement may only be used inside a loop.".to_string()
            }
        }
    }

    pub fn line(&self) -> Line {
        match self {
            RuntimeError::Exception { line, .. } | RuntimeError::TimeLimit { line } => *line,
            _ => 0,
        }
    }
}

impl fmt::Debug for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::Exception { line, message } => {
                write!(f, "Exception(line {}: {})", line, message)
            }
            RuntimeError::Return(value) => write!(f, "Return({})", value),
            RuntimeError::Break => f.write_str("Break"),
            RuntimeError::Continue => f.write_str("Continue"),
            RuntimeError::Stopped => f.write_str("Stopped"),
            RuntimeError::TimeLimit { line } => write!(f, "TimeLimit(line {})", line),
            RuntimeError::Internal(detail) => write!(f, "Internal({})", detail),
        }
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

/// One entry of the call stack: the callee's display name and the line of
/// the call site, used to attribute runtime failures.
struct Frame {
    callee: String,
    call_line: Line,
}

/// Tree-walking evaluator for rewritten GuardScript programs. The rewriter
/// has already spliced `Check` nodes around every unsafe operation; the
/// evaluator routes them to the runtime check library and consults the
/// scheduler at every statement boundary, loop back-edge and function entry.
pub struct Interpreter {
    pub(crate) globals: Rc<Globals>,
    pub(crate) control: Arc<ExecControl>,
    pub(crate) harness: Rc<RefCell<TestState>>,
    pub(crate) console: Rc<dyn Fn(&str)>,
    pub(crate) version: Option<Rc<dyn Fn()>>,
    pub(crate) modules: Rc<RefCell<HashMap<String, Value>>>,
    pub(crate) silent: bool,
    call_stack: Vec<Frame>,
    this_stack: Vec<Value>,
    max_call_depth: usize,
}

impl Interpreter {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        globals: Rc<Globals>,
        control: Arc<ExecControl>,
        harness: Rc<RefCell<TestState>>,
        console: Rc<dyn Fn(&str)>,
        version: Option<Rc<dyn Fn()>>,
        modules: Rc<RefCell<HashMap<String, Value>>>,
        silent: bool,
    ) -> Self {
        Self {
            globals,
            control,
            harness,
            console,
            version,
            modules,
            silent,
            call_stack: Vec::new(),
            this_stack: Vec::new(),
            max_call_depth: 1000,
        }
    }

    pub fn eval_program(&mut self, program: &Program) -> Result<Option<Value>, RuntimeError> {
        let env = self.globals.root().clone();
        let mut last = None;
        for stmt in &program.body {
            match self.eval_stmt(stmt, &env) {
                Ok(val) => last = val,
                Err(RuntimeError::Return(val)) => return Ok(Some(val)),
                Err(err) => return Err(err),
            }
        }
        Ok(last)
    }

    /// Format the current call stack for an exception payload, innermost
    /// frame first.
    pub(crate) fn capture_stack(&self, err_line: Line) -> Vec<String> {
        let mut stack = Vec::new();
        let mut line = err_line;
        for frame in self.call_stack.iter().rev() {
            stack.push(format!("at {} (line {})", frame.callee, line));
            line = frame.call_line;
        }
        stack.push(format!("at <program> (line {})", line));
        stack
    }

    fn checkpoint(&self, line: Line) -> Result<(), RuntimeError> {
        self.control.checkpoint().map_err(|interrupt| match interrupt {
            Interrupt::Stopped => RuntimeError::Stopped,
            Interrupt::TimeLimit => RuntimeError::TimeLimit { line },
        })
    }

    /// Silent mode: log a suppressed check failure and continue with a
    /// best-effort value.
    fn soften(
        &self,
        result: Result<Value, RuntimeError>,
        fallback: impl FnOnce() -> Value,
    ) -> Result<Value, RuntimeError> {
        match result {
            Err(RuntimeError::Exception { line, message }) if self.silent => {
                tracing::warn!(line, %message, "runtime check suppressed");
                Ok(fallback())
            }
            other => other,
        }
    }

    fn current_this(&self) -> Value {
        self.this_stack.last().cloned().unwrap_or(Value::Undefined)
    }

    //=====================================================
    // Statements
    //=====================================================

    fn eval_stmt(&mut self, stmt: &Stmt, env: &Env) -> Result<Option<Value>, RuntimeError> {
        self.checkpoint(stmt.line())?;
        match stmt {
            Stmt::VarDecl { kind, decls, .. } => {
                for decl in decls {
                    let value = match &decl.init {
                        Some(init) => self.eval_expr(init, env)?,
                        None => Value::Undefined,
                    };
                    self.declare(env, &decl.name, *kind, value, decl.line)?;
                }
                Ok(None)
            }
            Stmt::FuncDecl { def, line } => {
                let closure = self.make_closure(Rc::clone(def), env);
                if let Some(name) = &def.name {
                    self.declare(env, name, DeclKind::Let, closure, *line)?;
                }
                Ok(None)
            }
            Stmt::ClassDecl {
                name,
                ctor,
                methods,
                line,
            } => {
                let mut method_map = IndexMap::new();
                for (method_name, def) in methods {
                    method_map.insert(method_name.clone(), Rc::clone(def));
                }
                let class = Value::Class(Rc::new(ClassValue {
                    name: name.clone(),
                    ctor: ctor.clone(),
                    methods: method_map,
                    env: env.clone(),
                }));
                self.declare(env, name, DeclKind::Let, class, *line)?;
                Ok(None)
            }
            Stmt::Expr { expr, .. } => Ok(Some(self.eval_expr(expr, env)?)),
            Stmt::Block { body, .. } => {
                let scope = env.child();
                let mut last = None;
                for stmt in body {
                    last = self.eval_stmt(stmt, &scope)?;
                }
                Ok(last)
            }
            Stmt::If {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval_condition(test, env)? {
                    self.eval_stmt(consequent, env)
                } else if let Some(alternate) = alternate {
                    self.eval_stmt(alternate, env)
                } else {
                    Ok(None)
                }
            }
            Stmt::While { test, body, .. } => {
                while self.eval_condition(test, env)? {
                    match self.eval_stmt(body, env) {
                        Ok(_) => {}
                        Err(RuntimeError::Break) => break,
                        Err(RuntimeError::Continue) => continue,
                        Err(err) => return Err(err),
                    }
                }
                Ok(None)
            }
            Stmt::DoWhile { body, test, .. } => {
                loop {
                    match self.eval_stmt(body, env) {
                        Ok(_) => {}
                        Err(RuntimeError::Break) => break,
                        Err(RuntimeError::Continue) => {}
                        Err(err) => return Err(err),
                    }
                    if !self.eval_condition(test, env)? {
                        break;
                    }
                }
                Ok(None)
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                ..
            } => {
                let loop_env = env.child();
                if let Some(init) = init {
                    self.eval_stmt(init, &loop_env)?;
                }
                loop {
                    if let Some(test) = test {
                        if !self.eval_condition(test, &loop_env)? {
                            break;
                        }
                    }
                    match self.eval_stmt(body, &loop_env) {
                        Ok(_) => {}
                        Err(RuntimeError::Break) => break,
                        Err(RuntimeError::Continue) => {}
                        Err(err) => return Err(err),
                    }
                    if let Some(update) = update {
                        self.eval_expr(update, &loop_env)?;
                    }
                }
                Ok(None)
            }
            Stmt::Switch { disc, cases, line } => self.eval_switch(disc, cases, *line, env),
            Stmt::Return { value, .. } => {
                let value = match value {
                    Some(expr) => self.eval_expr(expr, env)?,
                    None => Value::Undefined,
                };
                Err(RuntimeError::Return(value))
            }
            Stmt::Break { .. } => Err(RuntimeError::Break),
            Stmt::Continue { .. } => Err(RuntimeError::Continue),
            Stmt::Empty { .. } => Ok(None),
            // Forbidden statements only reach the evaluator in silent mode,
            // where their diagnostics were logged instead of raised. They
            // still do not execute.
            Stmt::Throw { line, .. } => Err(RuntimeError::Exception {
                line: *line,
                message: "The 'throw' statement is not supported.".to_string(),
            }),
            Stmt::Try { line, .. } => Err(RuntimeError::Exception {
                line: *line,
                message: "The 'try' statement is not supported.".to_string(),
            }),
            Stmt::With { line } => Err(RuntimeError::Exception {
                line: *line,
                message: "The 'with' statement is not supported.".to_string(),
            }),
            Stmt::ForInOf { of, line } => Err(RuntimeError::Exception {
                line: *line,
                message: if *of {
                    "The for-of loop is not supported.".to_string()
                } else {
                    "The for-in loop is not supported.".to_string()
                },
            }),
        }
    }

    fn eval_switch(
        &mut self,
        disc: &Expr,
        cases: &[crate::ast::SwitchCase],
        _line: Line,
        env: &Env,
    ) -> Result<Option<Value>, RuntimeError> {
        let disc = self.eval_expr(disc, env)?;
        let mut start = None;
        let mut default = None;
        for (i, case) in cases.iter().enumerate() {
            match &case.test {
                Some(test) => {
                    let candidate = self.eval_expr(test, env)?;
                    if disc.strict_eq(&candidate) {
                        start = Some(i);
                        break;
                    }
                }
                None => default = Some(i),
            }
        }
        let Some(start) = start.or(default) else {
            return Ok(None);
        };
        for case in &cases[start..] {
            for stmt in &case.body {
                match self.eval_stmt(stmt, env) {
                    Ok(_) => {}
                    Err(RuntimeError::Break) => return Ok(None),
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(None)
    }

    fn eval_condition(&mut self, test: &Expr, env: &Env) -> Result<bool, RuntimeError> {
        let value = self.eval_expr(test, env)?;
        Ok(match value {
            Value::Bool(b) => b,
            other => other.is_truthy(),
        })
    }

    //=====================================================
    // Expressions
    //=====================================================

    fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Number { value, .. } => Ok(Value::Number(*value)),
            Expr::Str { value, .. } => Ok(Value::string(value.clone())),
            Expr::Bool { value, .. } => Ok(Value::Bool(*value)),
            Expr::Null { .. } => Ok(Value::Null),
            Expr::This { .. } => Ok(self.current_this()),
            Expr::Ident { name, line } => self.lookup(env, name, *line),
            Expr::ArrayLit { elements, .. } => {
                let mut values = Vec::with_capacity(elements.len());
                for element in elements {
                    values.push(self.eval_expr(element, env)?);
                }
                Ok(Value::array(values))
            }
            Expr::ObjectLit { props, .. } => {
                let mut members = IndexMap::new();
                for prop in props {
                    let value = self.eval_expr(&prop.value, env)?;
                    members.insert(prop.key.clone(), value);
                }
                Ok(Value::object(members))
            }
            Expr::Member {
                object,
                property,
                line,
            } => {
                let object = self.eval_expr(object, env)?;
                let result = checks::dot(&object, property, *line);
                self.soften(result, || Value::Undefined)
            }
            Expr::Index {
                object,
                index,
                line,
            } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                let result = checks::array_bounds_check(&object, &index, *line);
                self.soften(result, || Value::Undefined)
            }
            Expr::Call { callee, args, line } => self.eval_call(callee, args, *line, env),
            Expr::New { callee, args, line } => self.eval_new(callee, args, *line, env),
            Expr::Function { def, .. } => Ok(self.make_closure(Rc::clone(def), env)),
            Expr::Unary { op, operand, line } => self.eval_unary(*op, operand, *line, env),
            Expr::Update { line, .. } => Err(RuntimeError::Internal(format!(
                "raw update expression survived rewriting (line {})",
                line
            ))),
            Expr::Binary {
                op,
                left,
                right,
                line,
            } => self.eval_binary(*op, left, right, *line, env),
            Expr::Logical {
                op, left, right, ..
            } => {
                let left = self.eval_expr(left, env)?;
                let taken = match left {
                    Value::Bool(b) => b,
                    ref other => other.is_truthy(),
                };
                match op {
                    LogicalOp::And if !taken => Ok(left),
                    LogicalOp::Or if taken => Ok(left),
                    _ => self.eval_expr(right, env),
                }
            }
            Expr::Conditional {
                test,
                consequent,
                alternate,
                ..
            } => {
                if self.eval_condition(test, env)? {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            Expr::Assign {
                op,
                target,
                value,
                line,
            } => self.eval_assign(*op, target, value, *line, env),
            Expr::Seq { exprs, .. } => {
                let mut last = Value::Undefined;
                for expr in exprs {
                    last = self.eval_expr(expr, env)?;
                }
                Ok(last)
            }
            Expr::Check { check, line } => self.eval_check(check, *line, env),
        }
    }

    fn eval_unary(
        &mut self,
        op: UnaryOp,
        operand: &Expr,
        line: Line,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        let value = self.eval_expr(operand, env)?;
        match op {
            UnaryOp::Minus => Ok(Value::Number(-to_number_lenient(&value))),
            UnaryOp::Plus => Ok(Value::Number(to_number_lenient(&value))),
            UnaryOp::Not => {
                let b = match value {
                    Value::Bool(b) => b,
                    other => other.is_truthy(),
                };
                Ok(Value::Bool(!b))
            }
            UnaryOp::BitNot => {
                let result = checks::apply_num_op(
                    BinaryOp::BitXor,
                    &Value::Number(to_number_lenient(&value)),
                    &Value::Number(-1.0),
                    line,
                );
                self.soften(result, || Value::Number(f64::NAN))
            }
            // Rejected at compile time; silent mode still gets a value.
            UnaryOp::TypeOf => Ok(Value::string(value.type_name())),
            UnaryOp::Void => Ok(Value::Undefined),
            UnaryOp::Delete => Err(RuntimeError::Exception {
                line,
                message: "The 'delete' operator is not supported.".to_string(),
            }),
        }
    }

    fn eval_binary(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        line: Line,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        let left = self.eval_expr(left, env)?;
        let right = self.eval_expr(right, env)?;
        match op {
            BinaryOp::StrictEq | BinaryOp::LooseEq => Ok(Value::Bool(left.strict_eq(&right))),
            BinaryOp::StrictNeq | BinaryOp::LooseNeq => Ok(Value::Bool(!left.strict_eq(&right))),
            // `in` / `instanceof` are rejected at compile time; silent mode
            // evaluates them with their usual meaning.
            BinaryOp::In => match (&left, &right) {
                (Value::Str(name), Value::Object(data)) => {
                    Ok(Value::Bool(data.borrow().members.contains_key(&**name)))
                }
                _ => Ok(Value::Bool(false)),
            },
            BinaryOp::InstanceOf => match (&left, &right) {
                (Value::Object(data), Value::Class(class)) => {
                    let is_instance = data
                        .borrow()
                        .class
                        .as_ref()
                        .map_or(false, |c| Rc::ptr_eq(c, class));
                    Ok(Value::Bool(is_instance))
                }
                _ => Ok(Value::Bool(false)),
            },
            BinaryOp::Add => {
                let result = checks::apply_num_or_string_op(&left, &right, line);
                self.soften(result, || silent_plus(&left, &right))
            }
            other => {
                let result = checks::apply_num_op(other, &left, &right, line);
                self.soften(result, || silent_num_op(other))
            }
        }
    }

    fn eval_assign(
        &mut self,
        op: AssignOp,
        target: &Expr,
        value: &Expr,
        line: Line,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        if op != AssignOp::Assign {
            return Err(RuntimeError::Internal(format!(
                "compound assignment survived rewriting (line {})",
                line
            )));
        }
        match target {
            Expr::Ident { name, .. } => {
                let value = self.eval_expr(value, env)?;
                self.assign_ident(env, name, value.clone(), line)?;
                Ok(value)
            }
            // Member writes that survive rewriting are `this.m = v` inside a
            // constructor, where the member is being created.
            Expr::Member {
                object, property, ..
            } => {
                let object = self.eval_expr(object, env)?;
                let value = self.eval_expr(value, env)?;
                match &object {
                    Value::Object(data) => {
                        let mut borrowed = data.borrow_mut();
                        if borrowed.frozen {
                            return Err(RuntimeError::Exception {
                                line,
                                message: "Cannot modify a frozen value.".to_string(),
                            });
                        }
                        borrowed.members.insert(property.clone(), value.clone());
                        Ok(value)
                    }
                    other => Err(RuntimeError::Exception {
                        line,
                        message: format!("Cannot write member '{}' of '{}'.", property, other),
                    }),
                }
            }
            // Index targets are always spliced into `Check::IndexWrite`.
            _ => Err(RuntimeError::Internal(format!(
                "invalid assignment target survived rewriting (line {})",
                line
            ))),
        }
    }

    //=====================================================
    // Checks (the C4 dispatch)
    //=====================================================

    fn eval_check(&mut self, check: &Check, line: Line, env: &Env) -> Result<Value, RuntimeError> {
        match check {
            Check::ArrayBounds { object, index } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                let result = checks::array_bounds_check(&object, &index, line);
                self.soften(result, || Value::Undefined)
            }
            Check::Dot { object, property } => {
                let object = self.eval_expr(object, env)?;
                let result = checks::dot(&object, property, line);
                self.soften(result, || Value::Undefined)
            }
            Check::MemberWrite {
                object,
                property,
                value,
            } => {
                let object = self.eval_expr(object, env)?;
                let value = self.eval_expr(value, env)?;
                let result = checks::check_member(&object, property, value.clone(), line);
                self.soften(result, || {
                    if let Value::Object(data) = &object {
                        data.borrow_mut()
                            .members
                            .insert(property.clone(), value.clone());
                    }
                    value
                })
            }
            Check::IndexWrite {
                object,
                index,
                value,
            } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                let value = self.eval_expr(value, env)?;
                let result = checks::check_array(&object, &index, value.clone(), line);
                self.soften(result, || value)
            }
            Check::UpdateIdent { op, name } => {
                let current = self.lookup(env, name, line)?;
                let result = checks::update_only_numbers(*op, &current, line).map(Value::Number);
                let updated = self.soften(result, || current.clone())?;
                self.assign_ident(env, name, updated.clone(), line)?;
                Ok(updated)
            }
            Check::UpdateMember {
                op,
                object,
                property,
            } => {
                let object = self.eval_expr(object, env)?;
                let result = checks::check_update_operand(
                    *op,
                    &object,
                    checks::UpdateKey::Member(property),
                    line,
                );
                self.soften(result, || Value::Undefined)
            }
            Check::UpdateIndex { op, object, index } => {
                let object = self.eval_expr(object, env)?;
                let index = self.eval_expr(index, env)?;
                let result =
                    checks::check_update_operand(*op, &object, checks::UpdateKey::Index(&index), line);
                self.soften(result, || Value::Undefined)
            }
            Check::NumOp { op, left, right } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                let result = checks::apply_num_op(*op, &left, &right, line);
                self.soften(result, || silent_num_op(*op))
            }
            Check::NumOrStringOp { left, right } => {
                let left = self.eval_expr(left, env)?;
                let right = self.eval_expr(right, env)?;
                let result = checks::apply_num_or_string_op(&left, &right, line);
                self.soften(result, || silent_plus(&left, &right))
            }
            Check::IfBoolean { value, op } => {
                let value = self.eval_expr(value, env)?;
                let result = checks::check_if_boolean(&value, *op, line).map(Value::Bool);
                self.soften(result, || Value::Bool(value.is_truthy()))
            }
        }
    }

    //=====================================================
    // Calls, construction and environments
    //=====================================================

    fn eval_call(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        line: Line,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        // A member callee is looked up with `dot` semantics and called with
        // its receiver bound, so `o.f()` sees `this === o`.
        if let Expr::Member {
            object, property, ..
        } = callee
        {
            let receiver = self.eval_expr(object, env)?;
            let method = {
                let result = checks::dot(&receiver, property, line);
                self.soften(result, || Value::Undefined)?
            };
            let args = self.eval_args(args, env)?;
            return self.call_value(method, Some(receiver), args, line);
        }
        let callee = self.eval_expr(callee, env)?;
        let args = self.eval_args(args, env)?;
        self.call_value(callee, None, args, line)
    }

    fn eval_args(&mut self, args: &[Expr], env: &Env) -> Result<Vec<Value>, RuntimeError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(arg, env)?);
        }
        Ok(values)
    }

    fn eval_new(
        &mut self,
        callee: &Expr,
        args: &[Expr],
        line: Line,
        env: &Env,
    ) -> Result<Value, RuntimeError> {
        let callee = self.eval_expr(callee, env)?;
        let args = self.eval_args(args, env)?;
        match callee {
            Value::Class(class) => self.instantiate(class, args, line),
            Value::Object(data) if data.borrow().tag == Some("Array") => {
                Err(RuntimeError::Exception {
                    line,
                    message: "Use Array.create(length, init).".to_string(),
                })
            }
            other => Err(RuntimeError::Exception {
                line,
                message: format!("Expected a class, instead received '{}'.", other),
            }),
        }
    }

    fn instantiate(
        &mut self,
        class: Rc<ClassValue>,
        args: Vec<Value>,
        line: Line,
    ) -> Result<Value, RuntimeError> {
        let instance = Value::Object(Rc::new(RefCell::new(ObjectData {
            members: IndexMap::new(),
            class: Some(Rc::clone(&class)),
            frozen: false,
            tag: None,
        })));
        if let Some(ctor) = &class.ctor {
            let closure = Value::Closure(Rc::new(Closure {
                def: Rc::clone(ctor),
                env: class.env.clone(),
                this: Some(instance.clone()),
            }));
            self.call_value(closure, None, args, line)?;
        } else if !args.is_empty() {
            checks::arity_check(&class.name, 0, args.len(), line)?;
        }
        Ok(instance)
    }

    /// Call any callable value. `this` is the receiver for method calls;
    /// closures created by `dot` or arrows may carry their own binding,
    /// which wins.
    pub(crate) fn call_value(
        &mut self,
        func: Value,
        this: Option<Value>,
        args: Vec<Value>,
        line: Line,
    ) -> Result<Value, RuntimeError> {
        self.checkpoint(line)?;
        if self.call_stack.len() >= self.max_call_depth {
            return Err(RuntimeError::Exception {
                line,
                message: "Stack overflow.".to_string(),
            });
        }
        match func {
            Value::Closure(closure) => {
                let def = &closure.def;
                if def.arity_checked {
                    let result = checks::arity_check(
                        def.display_name(),
                        def.params.len(),
                        args.len(),
                        line,
                    )
                    .map(|()| Value::Undefined);
                    self.soften(result, || Value::Undefined)?;
                }
                let scope = closure.env.child();
                for (i, param) in def.params.iter().enumerate() {
                    let value = args.get(i).cloned().unwrap_or(Value::Undefined);
                    scope.declare(param, DeclKind::Let, value);
                }
                let this_value = match def.kind {
                    FuncKind::Arrow => closure.this.clone().unwrap_or(Value::Undefined),
                    _ => closure
                        .this
                        .clone()
                        .or(this)
                        .unwrap_or(Value::Undefined),
                };

                self.this_stack.push(this_value);
                self.call_stack.push(Frame {
                    callee: def.display_name().to_string(),
                    call_line: line,
                });

                let mut result = Ok(Value::Undefined);
                for stmt in &def.body {
                    match self.eval_stmt(stmt, &scope) {
                        Ok(_) => {}
                        Err(RuntimeError::Return(value)) => {
                            result = Ok(value);
                            break;
                        }
                        Err(err) => {
                            result = Err(err);
                            break;
                        }
                    }
                }

                self.call_stack.pop();
                self.this_stack.pop();
                result
            }
            Value::Native(native) => {
                let mut args = args;
                if !native.arity.accepts(args.len()) {
                    let expected = match native.arity {
                        NativeArity::Exact(n) => n,
                        NativeArity::Range { min, .. } => min,
                    };
                    let result = checks::arity_check(native.name, expected, args.len(), line)
                        .map(|()| Value::Undefined);
                    self.soften(result, || Value::Undefined)?;
                    while args.len() < expected {
                        args.push(Value::Undefined);
                    }
                }
                self.call_stack.push(Frame {
                    callee: native.name.to_string(),
                    call_line: line,
                });
                let receiver = native.receiver.clone().or(this);
                let result = (native.func)(self, receiver.as_ref(), &args, line);
                self.call_stack.pop();
                result
            }
            Value::Class(class) => Err(RuntimeError::Exception {
                line,
                message: format!(
                    "Class constructor {} cannot be invoked without 'new'.",
                    class.name
                ),
            }),
            Value::Object(data) if data.borrow().tag == Some("Array") => {
                Err(RuntimeError::Exception {
                    line,
                    message: "Use Array.create(length, init).".to_string(),
                })
            }
            other => Err(RuntimeError::Exception {
                line,
                message: format!("Expected a function, instead received '{}'.", other),
            }),
        }
    }

    /// Call a student-supplied callback from a native sequence operation,
    /// passing only as many arguments as the callback declares (up to the
    /// ones available). Keeps declared-arity enforcement useful for
    /// callbacks written with fewer parameters.
    pub(crate) fn call_callback(
        &mut self,
        callback: &Value,
        available: Vec<Value>,
        line: Line,
    ) -> Result<Value, RuntimeError> {
        let take = match callback {
            Value::Closure(closure) => closure.def.params.len().min(available.len()),
            _ => available.len(),
        };
        let args = available.into_iter().take(take).collect();
        self.call_value(callback.clone(), None, args, line)
    }

    fn make_closure(&self, def: Rc<FuncDef>, env: &Env) -> Value {
        let this = if def.kind == FuncKind::Arrow {
            Some(self.current_this())
        } else {
            None
        };
        Value::Closure(Rc::new(Closure {
            def,
            env: env.clone(),
            this,
        }))
    }

    fn lookup(&self, env: &Env, name: &str, line: Line) -> Result<Value, RuntimeError> {
        if let Some(value) = env.get(name) {
            return Ok(value);
        }
        if let Some(value) = self.globals.frozen_get(name) {
            return Ok(value);
        }
        Err(RuntimeError::Exception {
            line,
            message: format!("{} is not defined.", name),
        })
    }

    fn declare(
        &mut self,
        env: &Env,
        name: &str,
        kind: DeclKind,
        value: Value,
        line: Line,
    ) -> Result<(), RuntimeError> {
        if env.is_same(self.globals.root()) && self.globals.is_frozen(name) {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "{} is part of the global library, and cannot be overwritten.",
                    name
                ),
            });
        }
        env.declare(name, kind, value);
        Ok(())
    }

    fn assign_ident(
        &mut self,
        env: &Env,
        name: &str,
        value: Value,
        line: Line,
    ) -> Result<(), RuntimeError> {
        if env.set(name, value.clone()) {
            return Ok(());
        }
        if self.globals.is_frozen(name) {
            return Err(RuntimeError::Exception {
                line,
                message: format!(
                    "{} is part of the global library, and cannot be overwritten.",
                    name
                ),
            });
        }
        // Writes to unknown names create a program-level binding.
        self.globals.root().declare(name, DeclKind::Let, value);
        Ok(())
    }
}

fn to_number_lenient(value: &Value) -> f64 {
    match value {
        Value::Number(n) => *n,
        Value::Bool(true) => 1.0,
        Value::Bool(false) => 0.0,
        _ => f64::NAN,
    }
}

/// Best-effort `+` used when a silent-mode check failure was logged.
fn silent_plus(left: &Value, right: &Value) -> Value {
    if matches!(left, Value::Str(_)) || matches!(right, Value::Str(_)) {
        Value::string(format!("{}{}", left, right))
    } else {
        Value::Number(f64::NAN)
    }
}

/// Best-effort result for a failed numeric operator in silent mode.
fn silent_num_op(op: BinaryOp) -> Value {
    match op {
        BinaryOp::Less
        | BinaryOp::LessEq
        | BinaryOp::Greater
        | BinaryOp::GreaterEq => Value::Bool(false),
        _ => Value::Number(f64::NAN),
    }
}
