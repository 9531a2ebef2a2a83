//=====================================================
// File: rewriter.rs
//=====================================================
// Author: ZobieLabs
// License: Duality Public License (DPL v1.0)
// Goal: Static checking and dynamic-check splicing for GuardScript
// Objective: Reject forbidden constructs with student-facing diagnostics,
//            desugar compound assignments and updates, and wrap unsafe
//            operations in named runtime checks
//=====================================================

pub mod scope;

use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{
    AssignOp, BinaryOp, Check, DeclKind, Declarator, Expr, FuncDef, FuncKind, LogicalOp, Program,
    Stmt, SwitchCase, UnaryOp, UpdateOp,
};
use crate::diagnostics::DiagnosticSink;
use scope::{AssignTracker, ScopeKind, VarState};

/// Prefix of rewriter-generated temporaries. The tokenizer does not accept
/// `$` in identifiers, so these can never collide with user bindings.
pub const TEMP_PREFIX: &str = "$tmp";

/// Rewrite a parsed program: collect diagnostics for forbidden constructs,
/// enforce definite assignment, and splice dynamic checks. Always returns a
/// best-effort tree so silent mode can execute programs whose diagnostics
/// are only logged.
pub fn rewrite_program(program: Program, sink: &mut DiagnosticSink) -> Program {
    let mut rewriter = Rewriter::new(sink);
    let body = rewriter.rewrite_hoisted_body(program.body);
    Program { body }
}

struct Rewriter<'a> {
    sink: &'a mut DiagnosticSink,
    tracker: AssignTracker,
    in_constructor: bool,
    temp_frames: Vec<Vec<String>>,
    temp_counter: u32,
}

impl<'a> Rewriter<'a> {
    fn new(sink: &'a mut DiagnosticSink) -> Self {
        Self {
            sink,
            tracker: AssignTracker::new(),
            in_constructor: false,
            temp_frames: Vec::new(),
            temp_counter: 0,
        }
    }

    fn error(&mut self, line: u32, message: impl Into<String>) {
        self.sink.error(line, message);
    }

    fn fresh_temp(&mut self) -> String {
        let name = format!("{}{}", TEMP_PREFIX, self.temp_counter);
        self.temp_counter += 1;
        if let Some(frame) = self.temp_frames.last_mut() {
            frame.push(name.clone());
        }
        name
    }

    /// Rewrite a program or function body, prepending declarations for the
    /// temporaries hoisted out of compound assignments inside it.
    fn rewrite_hoisted_body(&mut self, body: Vec<Stmt>) -> Vec<Stmt> {
        self.temp_frames.push(Vec::new());
        let mut rewritten: Vec<Stmt> = body.into_iter().map(|s| self.rewrite_stmt(s)).collect();
        let temps = self.temp_frames.pop().unwrap_or_default();
        if !temps.is_empty() {
            let line = rewritten.first().map(Stmt::line).unwrap_or(1);
            let decls = temps
                .into_iter()
                .map(|name| Declarator {
                    name,
                    init: None,
                    pattern: false,
                    line,
                })
                .collect();
            rewritten.insert(
                0,
                Stmt::VarDecl {
                    kind: DeclKind::Let,
                    decls,
                    line,
                },
            );
        }
        rewritten
    }

    //=====================================================
    // Statements
    //=====================================================

    fn rewrite_stmt(&mut self, stmt: Stmt) -> Stmt {
        match stmt {
            Stmt::VarDecl { kind, decls, line } => self.rewrite_var_decl(kind, decls, line),
            Stmt::FuncDecl { def, line } => {
                if let Some(name) = &def.name {
                    self.tracker.declare(name, DeclKind::Let, true);
                }
                let def = self.rewrite_func(def);
                Stmt::FuncDecl { def, line }
            }
            Stmt::ClassDecl {
                name,
                ctor,
                methods,
                line,
            } => {
                self.tracker.declare(&name, DeclKind::Let, true);
                let ctor = ctor.map(|def| self.rewrite_func(def));
                let methods = methods
                    .into_iter()
                    .map(|(method_name, def)| (method_name, self.rewrite_func(def)))
                    .collect();
                Stmt::ClassDecl {
                    name,
                    ctor,
                    methods,
                    line,
                }
            }
            Stmt::Expr { expr, line } => {
                let expr = self.rewrite_expr(expr);
                Stmt::Expr { expr, line }
            }
            Stmt::Block { body, line } => {
                self.tracker.push_scope(ScopeKind::Block);
                let body = body.into_iter().map(|s| self.rewrite_stmt(s)).collect();
                self.tracker.pop_scope();
                Stmt::Block { body, line }
            }
            Stmt::If {
                test,
                consequent,
                alternate,
                line,
            } => {
                let (stmt, promoted) = self.rewrite_if(test, consequent, alternate, line);
                if let Some(names) = promoted {
                    self.tracker.promote_all(&names);
                }
                stmt
            }
            Stmt::While { test, body, line } => {
                self.forbid_assignment(&test);
                let test = self.bool_checked(test, None);
                self.require_braced_loop_body(&body);
                self.tracker.push_scope(ScopeKind::Loop);
                let body = Box::new(self.rewrite_stmt(*body));
                self.tracker.pop_scope();
                Stmt::While { test, body, line }
            }
            Stmt::DoWhile { body, test, line } => {
                self.require_braced_loop_body(&body);
                // The body of a do-while runs at least once, so it merges
                // into the enclosing scope like a plain block.
                self.tracker.push_scope(ScopeKind::Block);
                let body = Box::new(self.rewrite_stmt(*body));
                self.tracker.pop_scope();
                self.forbid_assignment(&test);
                let test = self.bool_checked(test, None);
                Stmt::DoWhile { body, test, line }
            }
            Stmt::For {
                init,
                test,
                update,
                body,
                line,
            } => self.rewrite_for(init, test, update, body, line),
            Stmt::ForInOf { of, line } => {
                if of {
                    self.error(line, "Do not use for-of loops.");
                } else {
                    self.error(line, "Do not use for-in loops.");
                }
                Stmt::ForInOf { of, line }
            }
            Stmt::Switch { disc, cases, line } => self.rewrite_switch(disc, cases, line),
            Stmt::Return { value, line } => {
                let value = value.map(|expr| self.rewrite_expr(expr));
                Stmt::Return { value, line }
            }
            Stmt::Throw { value, line } => {
                self.error(line, "Do not use the 'throw' statement.");
                Stmt::Throw { value, line }
            }
            Stmt::Try {
                block,
                handler,
                finalizer,
                line,
            } => {
                self.error(line, "Do not use the 'try' statement.");
                Stmt::Try {
                    block,
                    handler,
                    finalizer,
                    line,
                }
            }
            Stmt::With { line } => {
                self.error(line, "Do not use the 'with' statement.");
                Stmt::With { line }
            }
            stmt @ (Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Empty { .. }) => stmt,
        }
    }

    fn rewrite_var_decl(&mut self, kind: DeclKind, decls: Vec<Declarator>, line: u32) -> Stmt {
        if kind == DeclKind::Var {
            self.error(line, "Use 'let' or 'const' to declare a variable.");
        }
        let effective = if kind == DeclKind::Var {
            DeclKind::Let
        } else {
            kind
        };
        let decls = decls
            .into_iter()
            .map(|decl| {
                let Declarator {
                    name,
                    init,
                    pattern,
                    line: decl_line,
                } = decl;
                if pattern {
                    self.error(decl_line, "Destructuring patterns are not supported.");
                }
                if effective == DeclKind::Const && init.is_none() {
                    self.error(decl_line, "A 'const' variable must be initialized.");
                }
                let init = init.map(|expr| self.rewrite_expr(expr));
                self.tracker.declare(&name, effective, init.is_some());
                Declarator {
                    name,
                    init,
                    pattern,
                    line: decl_line,
                }
            })
            .collect();
        Stmt::VarDecl {
            kind: effective,
            decls,
            line,
        }
    }

    /// Rewrite one `if` and report the names it promotes from uninitialized
    /// to initialized (`None` when the chain is not exhaustive).
    fn rewrite_if(
        &mut self,
        test: Expr,
        consequent: Box<Stmt>,
        alternate: Option<Box<Stmt>>,
        line: u32,
    ) -> (Stmt, Option<HashSet<String>>) {
        self.forbid_assignment(&test);
        let test = self.bool_checked(test, None);

        if !matches!(*consequent, Stmt::Block { .. }) {
            self.error(
                consequent.line(),
                "All branches of an if-statement must be enclosed in braces.",
            );
        }
        self.tracker.push_scope(ScopeKind::Branch);
        let consequent = Box::new(self.rewrite_stmt(*consequent));
        let then_promoted = self.tracker.pop_branch();

        let Some(alternate) = alternate else {
            return (
                Stmt::If {
                    test,
                    consequent,
                    alternate: None,
                    line,
                },
                None,
            );
        };

        if !matches!(*alternate, Stmt::Block { .. } | Stmt::If { .. }) {
            self.error(
                alternate.line(),
                "All branches of an if-statement must be enclosed in braces.",
            );
        }
        self.tracker.push_scope(ScopeKind::Branch);
        let alternate = Box::new(self.rewrite_stmt(*alternate));
        let else_promoted = self.tracker.pop_branch();

        let common: HashSet<String> = then_promoted
            .intersection(&else_promoted)
            .cloned()
            .collect();
        (
            Stmt::If {
                test,
                consequent,
                alternate: Some(alternate),
                line,
            },
            Some(common),
        )
    }

    fn rewrite_for(
        &mut self,
        init: Option<Box<Stmt>>,
        test: Option<Expr>,
        update: Option<Expr>,
        body: Box<Stmt>,
        line: u32,
    ) -> Stmt {
        if init.is_none() || test.is_none() || update.is_none() {
            self.error(
                line,
                "A for-loop must have an initializer, a test, and an update expression.",
            );
        }
        self.require_braced_loop_body(&body);

        self.tracker.push_scope(ScopeKind::Loop);
        let init = init.map(|stmt| {
            match *stmt {
                Stmt::VarDecl { .. } => {}
                Stmt::Expr {
                    expr: Expr::Assign { .. },
                    ..
                } => {}
                ref other => {
                    self.error(
                        other.line(),
                        "A for-loop initializer must be an assignment or a variable declaration.",
                    );
                }
            }
            Box::new(self.rewrite_stmt(*stmt))
        });
        let test = test.map(|expr| {
            self.forbid_assignment(&expr);
            self.bool_checked(expr, None)
        });
        let update = update.map(|expr| self.rewrite_expr(expr));
        let body = Box::new(self.rewrite_stmt(*body));
        self.tracker.pop_scope();

        Stmt::For {
            init,
            test,
            update,
            body,
            line,
        }
    }

    fn rewrite_switch(&mut self, disc: Expr, cases: Vec<SwitchCase>, line: u32) -> Stmt {
        self.forbid_assignment(&disc);
        let disc = self.rewrite_expr(disc);

        let has_default = cases.iter().any(|case| case.test.is_none());
        let default_is_empty = cases
            .iter()
            .any(|case| case.test.is_none() && case.body.is_empty());
        let mut group_promotions: Vec<HashSet<String>> = Vec::new();
        let mut trailing_empty_group = false;

        let cases = cases
            .into_iter()
            .map(|case| {
                let test = case.test.map(|expr| {
                    self.forbid_assignment(&expr);
                    self.rewrite_expr(expr)
                });
                if case.body.is_empty() {
                    trailing_empty_group = true;
                    return SwitchCase {
                        test,
                        body: case.body,
                        line: case.line,
                    };
                }
                trailing_empty_group = false;
                if !matches!(case.body.first(), Some(Stmt::Block { .. })) {
                    self.error(case.line, "Each switch case must be enclosed in braces.");
                }
                self.tracker.push_scope(ScopeKind::Branch);
                let body = case
                    .body
                    .into_iter()
                    .map(|stmt| self.rewrite_stmt(stmt))
                    .collect();
                group_promotions.push(self.tracker.pop_branch());
                SwitchCase {
                    test,
                    body,
                    line: case.line,
                }
            })
            .collect();

        // Cases with empty bodies fall through into the next non-empty case
        // and share its promotions; a trailing empty group (or an empty
        // default) promotes nothing.
        if has_default && !trailing_empty_group && !default_is_empty {
            if let Some(first) = group_promotions.first() {
                let common = group_promotions
                    .iter()
                    .skip(1)
                    .fold(first.clone(), |acc, set| {
                        acc.intersection(set).cloned().collect()
                    });
                self.tracker.promote_all(&common);
            }
        }

        Stmt::Switch { disc, cases, line }
    }

    fn require_braced_loop_body(&mut self, body: &Stmt) {
        if !matches!(body, Stmt::Block { .. }) {
            self.error(body.line(), "The body of a loop must be enclosed in braces.");
        }
    }

    fn rewrite_func(&mut self, def: Rc<FuncDef>) -> Rc<FuncDef> {
        let FuncDef {
            name,
            params,
            has_rest,
            body,
            kind,
            line,
            ..
        } = Rc::try_unwrap(def).unwrap_or_else(|shared| (*shared).clone());
        if has_rest {
            self.error(line, "Do not use rest parameters.");
        }

        let was_in_constructor = self.in_constructor;
        self.in_constructor = match kind {
            FuncKind::Constructor => true,
            FuncKind::Arrow => was_in_constructor,
            FuncKind::Ordinary | FuncKind::Method => false,
        };

        self.tracker.push_scope(ScopeKind::Function);
        for param in &params {
            self.tracker.declare(param, DeclKind::Let, true);
        }
        let body = self.rewrite_hoisted_body(body);
        self.tracker.pop_scope();
        self.in_constructor = was_in_constructor;

        Rc::new(FuncDef {
            name,
            params,
            has_rest,
            body,
            kind,
            arity_checked: true,
            line,
        })
    }

    //=====================================================
    // Expressions
    //=====================================================

    fn rewrite_expr(&mut self, expr: Expr) -> Expr {
        match expr {
            // Already-spliced checks are left untouched so that rewriting an
            // already-rewritten tree changes nothing.
            expr @ (Expr::Check { .. }
            | Expr::Number { .. }
            | Expr::Str { .. }
            | Expr::Bool { .. }
            | Expr::Null { .. }
            | Expr::This { .. }) => expr,

            Expr::Ident { name, line } => {
                if self.tracker.state(&name) == VarState::Uninitialized {
                    self.error(
                        line,
                        format!("You must initialize the variable '{}' before use.", name),
                    );
                }
                Expr::Ident { name, line }
            }

            Expr::ArrayLit { elements, line } => Expr::ArrayLit {
                elements: elements
                    .into_iter()
                    .map(|element| self.rewrite_expr(element))
                    .collect(),
                line,
            },

            Expr::ObjectLit { props, line } => {
                let mut seen: HashSet<String> = HashSet::new();
                let props = props
                    .into_iter()
                    .map(|prop| {
                        let crate::ast::ObjectProp {
                            key,
                            key_is_ident,
                            value,
                            line: prop_line,
                        } = prop;
                        if !key_is_ident {
                            self.error(prop_line, "Object member name must be an identifier.");
                        }
                        if !seen.insert(key.clone()) {
                            self.error(
                                prop_line,
                                format!("Object member name '{}' may only be used once.", key),
                            );
                        }
                        let value = self.rewrite_expr(value);
                        crate::ast::ObjectProp {
                            key,
                            key_is_ident,
                            value,
                            line: prop_line,
                        }
                    })
                    .collect();
                Expr::ObjectLit { props, line }
            }

            Expr::Member {
                object,
                property,
                line,
            } => {
                let object = self.rewrite_expr(*object);
                Expr::Check {
                    check: Box::new(Check::Dot { object, property }),
                    line,
                }
            }

            Expr::Index {
                object,
                index,
                line,
            } => {
                let object = self.rewrite_expr(*object);
                let index = self.rewrite_expr(*index);
                Expr::Check {
                    check: Box::new(Check::ArrayBounds { object, index }),
                    line,
                }
            }

            Expr::Call { callee, args, line } => {
                // A member callee stays a member so the evaluator can bind
                // `this`; its object is still rewritten.
                let callee = match *callee {
                    Expr::Member {
                        object,
                        property,
                        line: member_line,
                    } => Expr::Member {
                        object: Box::new(self.rewrite_expr(*object)),
                        property,
                        line: member_line,
                    },
                    other => self.rewrite_expr(other),
                };
                let args = args.into_iter().map(|arg| self.rewrite_expr(arg)).collect();
                Expr::Call {
                    callee: Box::new(callee),
                    args,
                    line,
                }
            }

            Expr::New { callee, args, line } => Expr::New {
                callee: Box::new(self.rewrite_expr(*callee)),
                args: args.into_iter().map(|arg| self.rewrite_expr(arg)).collect(),
                line,
            },

            Expr::Function { def, line } => Expr::Function {
                def: self.rewrite_func(def),
                line,
            },

            Expr::Unary { op, operand, line } => {
                self.forbid_assignment(&operand);
                match op {
                    UnaryOp::Delete | UnaryOp::TypeOf | UnaryOp::Void => {
                        self.error(line, format!("Do not use the '{}' operator.", op));
                        Expr::Unary {
                            op,
                            operand: Box::new(self.rewrite_expr(*operand)),
                            line,
                        }
                    }
                    UnaryOp::Not => {
                        let operand = self.bool_checked(*operand, Some("!"));
                        Expr::Unary {
                            op,
                            operand: Box::new(operand),
                            line,
                        }
                    }
                    UnaryOp::Minus | UnaryOp::Plus | UnaryOp::BitNot => Expr::Unary {
                        op,
                        operand: Box::new(self.rewrite_expr(*operand)),
                        line,
                    },
                }
            }

            Expr::Update {
                op,
                prefix,
                target,
                line,
            } => self.rewrite_update(op, prefix, target, line),

            Expr::Binary {
                op,
                left,
                right,
                line,
            } => self.rewrite_binary(op, left, right, line),

            Expr::Logical {
                op,
                left,
                right,
                line,
            } => {
                self.forbid_assignment(&left);
                self.forbid_assignment(&right);
                let op_name: &'static str = match op {
                    LogicalOp::And => "&&",
                    LogicalOp::Or => "||",
                };
                let left = self.bool_checked(*left, Some(op_name));
                let right = self.bool_checked(*right, Some(op_name));
                Expr::Logical {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                    line,
                }
            }

            Expr::Conditional {
                test,
                consequent,
                alternate,
                line,
            } => {
                self.forbid_assignment(&test);
                self.forbid_assignment(&consequent);
                self.forbid_assignment(&alternate);
                let test = self.bool_checked(*test, None);
                Expr::Conditional {
                    test: Box::new(test),
                    consequent: Box::new(self.rewrite_expr(*consequent)),
                    alternate: Box::new(self.rewrite_expr(*alternate)),
                    line,
                }
            }

            Expr::Assign {
                op,
                target,
                value,
                line,
            } => self.rewrite_assign(op, target, value, line),

            Expr::Seq { exprs, line } => Expr::Seq {
                exprs: exprs.into_iter().map(|e| self.rewrite_expr(e)).collect(),
                line,
            },
        }
    }

    fn rewrite_binary(
        &mut self,
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        line: u32,
    ) -> Expr {
        self.forbid_assignment(&left);
        self.forbid_assignment(&right);
        match op {
            BinaryOp::LooseEq => {
                self.error(line, "Do not use the '==' operator. Use '===' instead.");
                self.rewrite_binary(BinaryOp::StrictEq, left, right, line)
            }
            BinaryOp::LooseNeq => {
                self.error(line, "Do not use the '!=' operator. Use '!==' instead.");
                self.rewrite_binary(BinaryOp::StrictNeq, left, right, line)
            }
            BinaryOp::In | BinaryOp::InstanceOf => {
                self.error(line, format!("Do not use the '{}' operator.", op));
                Expr::Binary {
                    op,
                    left: Box::new(self.rewrite_expr(*left)),
                    right: Box::new(self.rewrite_expr(*right)),
                    line,
                }
            }
            BinaryOp::StrictEq | BinaryOp::StrictNeq => Expr::Binary {
                op,
                left: Box::new(self.rewrite_expr(*left)),
                right: Box::new(self.rewrite_expr(*right)),
                line,
            },
            BinaryOp::Add => {
                let left = self.rewrite_expr(*left);
                let right = self.rewrite_expr(*right);
                Expr::Check {
                    check: Box::new(Check::NumOrStringOp { left, right }),
                    line,
                }
            }
            _ => {
                let left = self.rewrite_expr(*left);
                let right = self.rewrite_expr(*right);
                Expr::Check {
                    check: Box::new(Check::NumOp { op, left, right }),
                    line,
                }
            }
        }
    }

    fn rewrite_update(
        &mut self,
        op: UpdateOp,
        prefix: bool,
        target: Box<Expr>,
        line: u32,
    ) -> Expr {
        if !prefix {
            self.error(line, "Do not use post-increment or post-decrement operators.");
        }
        match *target {
            Expr::Ident { name, line: id_line } => {
                if self.tracker.state(&name) == VarState::Uninitialized {
                    self.error(
                        id_line,
                        format!("You must initialize the variable '{}' before use.", name),
                    );
                }
                if self.tracker.is_const(&name) {
                    self.error(
                        id_line,
                        format!("Cannot assign to '{}' because it is a 'const' variable.", name),
                    );
                }
                self.tracker.initialize(&name);
                Expr::Check {
                    check: Box::new(Check::UpdateIdent { op, name }),
                    line,
                }
            }
            Expr::Member {
                object, property, ..
            } => {
                let object = self.rewrite_expr(*object);
                Expr::Check {
                    check: Box::new(Check::UpdateMember {
                        op,
                        object,
                        property,
                    }),
                    line,
                }
            }
            Expr::Index { object, index, .. } => {
                let object = self.rewrite_expr(*object);
                let index = self.rewrite_expr(*index);
                Expr::Check {
                    check: Box::new(Check::UpdateIndex { op, object, index }),
                    line,
                }
            }
            other => {
                self.error(
                    line,
                    format!(
                        "The operand of '{}' must be a variable, a member, or an index.",
                        op
                    ),
                );
                self.rewrite_expr(other)
            }
        }
    }

    fn rewrite_assign(
        &mut self,
        op: AssignOp,
        target: Box<Expr>,
        value: Box<Expr>,
        line: u32,
    ) -> Expr {
        if matches!(*target, Expr::ArrayLit { .. } | Expr::ObjectLit { .. }) {
            self.error(line, "Destructuring patterns are not supported.");
            return Expr::Assign {
                op,
                target,
                value: Box::new(self.rewrite_expr(*value)),
                line,
            };
        }

        if let Some(bin) = op.binary_op() {
            let allowed = matches!(
                op,
                AssignOp::Add | AssignOp::Sub | AssignOp::Mul | AssignOp::Div | AssignOp::Mod
            );
            if !allowed {
                self.error(line, format!("Do not use the '{}' operator.", op));
            }
            return self.desugar_compound_assign(bin, target, value, line);
        }

        match *target {
            Expr::Ident { name, line: id_line } => {
                if self.tracker.is_const(&name) {
                    self.error(
                        id_line,
                        format!("Cannot assign to '{}' because it is a 'const' variable.", name),
                    );
                }
                let value = self.rewrite_expr(*value);
                self.tracker.initialize(&name);
                Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(Expr::Ident {
                        name,
                        line: id_line,
                    }),
                    value: Box::new(value),
                    line,
                }
            }
            Expr::Member {
                object,
                property,
                line: member_line,
            } => {
                let constructor_this =
                    self.in_constructor && matches!(*object, Expr::This { .. });
                let object = self.rewrite_expr(*object);
                let value = self.rewrite_expr(*value);
                if constructor_this {
                    // The constructor is what creates the members of `this`,
                    // so existence is not enforced here.
                    Expr::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(Expr::Member {
                            object: Box::new(object),
                            property,
                            line: member_line,
                        }),
                        value: Box::new(value),
                        line,
                    }
                } else {
                    Expr::Check {
                        check: Box::new(Check::MemberWrite {
                            object,
                            property,
                            value,
                        }),
                        line,
                    }
                }
            }
            Expr::Index { object, index, .. } => {
                let object = self.rewrite_expr(*object);
                let index = self.rewrite_expr(*index);
                let value = self.rewrite_expr(*value);
                Expr::Check {
                    check: Box::new(Check::IndexWrite {
                        object,
                        index,
                        value,
                    }),
                    line,
                }
            }
            other => {
                self.error(
                    line,
                    "The left-hand side of an assignment must be a variable, a member, or an index.",
                );
                let target = self.rewrite_expr(other);
                Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(target),
                    value: Box::new(self.rewrite_expr(*value)),
                    line,
                }
            }
        }
    }

    /// Desugar `x op= v` so every assignment that survives the rewrite has
    /// operator `=`. A computed target's object expression is captured in a
    /// hoisted temporary so it is evaluated exactly once.
    fn desugar_compound_assign(
        &mut self,
        bin: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
        line: u32,
    ) -> Expr {
        match *target {
            Expr::Ident { name, line: id_line } => {
                let read = Expr::Ident {
                    name: name.clone(),
                    line: id_line,
                };
                let desugared = Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(Expr::Ident {
                        name,
                        line: id_line,
                    }),
                    value: Box::new(Expr::Binary {
                        op: bin,
                        left: Box::new(read),
                        right: value,
                        line,
                    }),
                    line,
                };
                self.rewrite_expr(desugared)
            }
            Expr::Member {
                object,
                property,
                line: member_line,
            } => {
                let temp = self.fresh_temp();
                let temp_ident = |line| Expr::Ident {
                    name: temp.clone(),
                    line,
                };
                let exprs = vec![
                    Expr::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(temp_ident(member_line)),
                        value: object,
                        line,
                    },
                    Expr::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(Expr::Member {
                            object: Box::new(temp_ident(member_line)),
                            property: property.clone(),
                            line: member_line,
                        }),
                        value: Box::new(Expr::Binary {
                            op: bin,
                            left: Box::new(Expr::Member {
                                object: Box::new(temp_ident(member_line)),
                                property,
                                line: member_line,
                            }),
                            right: value,
                            line,
                        }),
                        line,
                    },
                ];
                Expr::Seq {
                    exprs: exprs.into_iter().map(|e| self.rewrite_expr(e)).collect(),
                    line,
                }
            }
            Expr::Index {
                object,
                index,
                line: index_line,
            } => {
                let temp = self.fresh_temp();
                let temp_ident = |line| Expr::Ident {
                    name: temp.clone(),
                    line,
                };
                let exprs = vec![
                    Expr::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(temp_ident(index_line)),
                        value: object,
                        line,
                    },
                    Expr::Assign {
                        op: AssignOp::Assign,
                        target: Box::new(Expr::Index {
                            object: Box::new(temp_ident(index_line)),
                            index: Box::new((*index).clone()),
                            line: index_line,
                        }),
                        value: Box::new(Expr::Binary {
                            op: bin,
                            left: Box::new(Expr::Index {
                                object: Box::new(temp_ident(index_line)),
                                index,
                                line: index_line,
                            }),
                            right: value,
                            line,
                        }),
                        line,
                    },
                ];
                Expr::Seq {
                    exprs: exprs.into_iter().map(|e| self.rewrite_expr(e)).collect(),
                    line,
                }
            }
            other => {
                self.error(
                    line,
                    "The left-hand side of an assignment must be a variable, a member, or an index.",
                );
                self.rewrite_expr(other)
            }
        }
    }

    //=====================================================
    // Helpers
    //=====================================================

    fn bool_checked(&mut self, expr: Expr, op: Option<&'static str>) -> Expr {
        let line = expr.line();
        let value = self.rewrite_expr(expr);
        // An operand that is already a boolean check (a previous rewrite of
        // this tree) is not wrapped again.
        if matches!(&value, Expr::Check { check, .. } if matches!(&**check, Check::IfBoolean { .. }))
        {
            return value;
        }
        Expr::Check {
            check: Box::new(Check::IfBoolean { value, op }),
            line,
        }
    }

    /// Assignments may not appear as statement tests or as operands of
    /// logical, binary, conditional, unary or switch-case expressions.
    fn forbid_assignment(&mut self, expr: &Expr) {
        if let Expr::Assign { line, .. } = expr {
            self.error(*line, "Forbidden assignment expression.");
        }
    }
}

//=====================================================
// End of file
//=====================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_source;

    fn rewrite(source: &str) -> (Program, Vec<String>) {
        let program = parse_source(source).expect("parse");
        let mut sink = DiagnosticSink::new();
        let rewritten = rewrite_program(program, &mut sink);
        let messages = sink
            .into_diagnostics()
            .into_iter()
            .map(|d| d.message)
            .collect();
        (rewritten, messages)
    }

    fn messages(source: &str) -> Vec<String> {
        rewrite(source).1
    }

    #[test]
    fn rejects_var_declarations() {
        assert!(messages("var x = 10;")
            .contains(&"Use 'let' or 'const' to declare a variable.".to_string()));
    }

    #[test]
    fn splices_dot_checks_for_member_reads() {
        let (program, diags) = rewrite("let o = {x: 1}; o.x;");
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        let Stmt::Expr {
            expr: Expr::Check { check, .. },
            ..
        } = &program.body[1]
        else {
            panic!("expected spliced check, got {:?}", program.body[1]);
        };
        assert!(matches!(**check, Check::Dot { .. }));
    }

    #[test]
    fn rewriting_twice_is_identity() {
        let program = parse_source(
            "let a = [1, 2]; let i = 0; while (i < 2) { a[i] = a[i] * 2; i += 1; }",
        )
        .expect("parse");
        let mut sink = DiagnosticSink::new();
        let once = rewrite_program(program, &mut sink);
        assert!(!sink.has_errors());
        let mut sink2 = DiagnosticSink::new();
        let twice = rewrite_program(once.clone(), &mut sink2);
        assert!(!sink2.has_errors());
        assert_eq!(once, twice);
    }

    #[test]
    fn compound_member_assignment_hoists_one_temp() {
        let (program, diags) = rewrite("let o = {n: 1}; o.n += 2;");
        assert!(diags.is_empty(), "unexpected diagnostics: {diags:?}");
        let Stmt::VarDecl { decls, .. } = &program.body[0] else {
            panic!("expected hoisted temp declaration first");
        };
        assert!(decls[0].name.starts_with(TEMP_PREFIX));
    }

    #[test]
    fn definite_assignment_examples_from_branches() {
        assert!(messages("let x; x;")
            .contains(&"You must initialize the variable 'x' before use.".to_string()));
        assert!(messages(
            "let x; if (true) { x = 0; x; } else { x = 1; x; } x;"
        )
        .is_empty());
        assert!(messages("let x; if (true) { x = 0; } x;")
            .contains(&"You must initialize the variable 'x' before use.".to_string()));
    }

    #[test]
    fn forbidden_assignment_positions_are_reported() {
        assert!(messages("let x = 0; if (x = 1) { }")
            .contains(&"Forbidden assignment expression.".to_string()));
        assert!(messages("let x = 0; let y = (x = 1) + 2;")
            .contains(&"Forbidden assignment expression.".to_string()));
    }

    #[test]
    fn loose_equality_suggests_strict() {
        let diags = messages("1 == 2;");
        assert!(diags.contains(&"Do not use the '==' operator. Use '===' instead.".to_string()));
    }
}
