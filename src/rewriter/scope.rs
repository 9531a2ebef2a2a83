use std::collections::{HashMap, HashSet};

use crate::ast::DeclKind;

/// Scope kinds with distinct exit behaviour for definite-assignment
/// tracking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Program or function body: fresh sets on entry, discarded on exit.
    Function,
    /// Plain block (and `do-while` bodies, which always run once): inherits
    /// copies and unions both sets back into the parent.
    Block,
    /// `while` / `for` bodies: possibly zero iterations, so assignments do
    /// not propagate out.
    Loop,
    /// One branch of an `if`-chain or one `switch` case: compared against a
    /// shared baseline, merged only when the construct is exhaustive.
    Branch,
}

/// Assignment state of a name as seen from the current scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarState {
    Initialized,
    Uninitialized,
    /// Not tracked here: either never declared (the sandbox handles it at
    /// runtime) or declared beyond a function boundary.
    Unknown,
}

#[derive(Debug, Clone)]
struct Scope {
    kind: ScopeKind,
    initialized: HashSet<String>,
    uninitialized: HashSet<String>,
    /// Names declared in this very scope, with their declaration keyword.
    /// Used for const-write rejection with correct shadowing.
    decls: HashMap<String, DeclKind>,
}

impl Scope {
    fn fresh(kind: ScopeKind) -> Self {
        Self {
            kind,
            initialized: HashSet::new(),
            uninitialized: HashSet::new(),
            decls: HashMap::new(),
        }
    }

    fn inheriting(kind: ScopeKind, parent: &Scope) -> Self {
        Self {
            kind,
            initialized: parent.initialized.clone(),
            uninitialized: parent.uninitialized.clone(),
            decls: HashMap::new(),
        }
    }
}

/// Static approximation of "every variable is written before it is read".
///
/// Each lexical scope owns two disjoint sets of names: initialized and
/// declared-but-unassigned. Nested scopes start from copies of the parent
/// sets; what flows back out on exit depends on the [`ScopeKind`].
pub struct AssignTracker {
    scopes: Vec<Scope>,
}

impl AssignTracker {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope::fresh(ScopeKind::Function)],
        }
    }

    fn current(&self) -> &Scope {
        self.scopes.last().expect("scope stack is never empty")
    }

    fn current_mut(&mut self) -> &mut Scope {
        self.scopes.last_mut().expect("scope stack is never empty")
    }

    pub fn declare(&mut self, name: &str, kind: DeclKind, initialized: bool) {
        let scope = self.current_mut();
        scope.decls.insert(name.to_string(), kind);
        if initialized {
            scope.uninitialized.remove(name);
            scope.initialized.insert(name.to_string());
        } else {
            scope.initialized.remove(name);
            scope.uninitialized.insert(name.to_string());
        }
    }

    /// Move a name from the uninitialized set to the initialized set, as an
    /// assignment to it does.
    pub fn initialize(&mut self, name: &str) {
        let scope = self.current_mut();
        if scope.uninitialized.remove(name) {
            scope.initialized.insert(name.to_string());
        }
    }

    pub fn state(&self, name: &str) -> VarState {
        let scope = self.current();
        if scope.uninitialized.contains(name) {
            VarState::Uninitialized
        } else if scope.initialized.contains(name) {
            VarState::Initialized
        } else {
            VarState::Unknown
        }
    }

    /// Whether an assignment to `name` would write a `const` binding.
    /// Scopes are searched innermost-first so shadowing declarations win.
    pub fn is_const(&self, name: &str) -> bool {
        for scope in self.scopes.iter().rev() {
            if let Some(kind) = scope.decls.get(name) {
                return *kind == DeclKind::Const;
            }
        }
        false
    }

    pub fn push_scope(&mut self, kind: ScopeKind) {
        let scope = match kind {
            ScopeKind::Function => Scope::fresh(kind),
            ScopeKind::Block | ScopeKind::Loop | ScopeKind::Branch => {
                Scope::inheriting(kind, self.current())
            }
        };
        self.scopes.push(scope);
    }

    /// Exit the current scope, merging per its kind. `Branch` scopes must be
    /// exited with [`AssignTracker::pop_branch`] instead.
    pub fn pop_scope(&mut self) {
        let child = self.scopes.pop().expect("scope stack is never empty");
        match child.kind {
            ScopeKind::Function | ScopeKind::Loop | ScopeKind::Branch => {}
            ScopeKind::Block => {
                let parent = self.current_mut();
                for name in child.initialized {
                    parent.uninitialized.remove(&name);
                    parent.initialized.insert(name);
                }
                for name in child.uninitialized {
                    if !parent.initialized.contains(&name) {
                        parent.uninitialized.insert(name);
                    }
                }
            }
        }
    }

    /// Exit a `Branch` scope, reporting which of the parent's uninitialized
    /// names this branch promoted. The branch's own sets are discarded; the
    /// caller merges the intersection across branches when the construct is
    /// exhaustive.
    pub fn pop_branch(&mut self) -> HashSet<String> {
        let child = self.scopes.pop().expect("scope stack is never empty");
        debug_assert_eq!(child.kind, ScopeKind::Branch);
        let parent = self.current();
        child
            .initialized
            .into_iter()
            .filter(|name| parent.uninitialized.contains(name))
            .collect()
    }

    /// Promote every name in `names` in the current scope. Used after an
    /// exhaustive `if`-chain or `switch` whose branches all promoted them.
    pub fn promote_all(&mut self, names: &HashSet<String>) {
        for name in names {
            self.initialize(name);
        }
    }
}

impl Default for AssignTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_assignment_promotes_in_parent() {
        let mut tracker = AssignTracker::new();
        tracker.declare("x", DeclKind::Let, false);
        tracker.push_scope(ScopeKind::Block);
        tracker.initialize("x");
        tracker.pop_scope();
        assert_eq!(tracker.state("x"), VarState::Initialized);
    }

    #[test]
    fn loop_assignment_does_not_promote() {
        let mut tracker = AssignTracker::new();
        tracker.declare("x", DeclKind::Let, false);
        tracker.push_scope(ScopeKind::Loop);
        tracker.initialize("x");
        assert_eq!(tracker.state("x"), VarState::Initialized);
        tracker.pop_scope();
        assert_eq!(tracker.state("x"), VarState::Uninitialized);
    }

    #[test]
    fn function_scope_hides_outer_uninitialized() {
        let mut tracker = AssignTracker::new();
        tracker.declare("x", DeclKind::Let, false);
        tracker.push_scope(ScopeKind::Function);
        assert_eq!(tracker.state("x"), VarState::Unknown);
        tracker.pop_scope();
        assert_eq!(tracker.state("x"), VarState::Uninitialized);
    }

    #[test]
    fn exhaustive_branches_promote_only_common_names() {
        let mut tracker = AssignTracker::new();
        tracker.declare("x", DeclKind::Let, false);
        tracker.declare("y", DeclKind::Let, false);

        tracker.push_scope(ScopeKind::Branch);
        tracker.initialize("x");
        tracker.initialize("y");
        let first = tracker.pop_branch();

        tracker.push_scope(ScopeKind::Branch);
        tracker.initialize("x");
        let second = tracker.pop_branch();

        let common: HashSet<String> = first.intersection(&second).cloned().collect();
        tracker.promote_all(&common);
        assert_eq!(tracker.state("x"), VarState::Initialized);
        assert_eq!(tracker.state("y"), VarState::Uninitialized);
    }

    #[test]
    fn const_lookup_respects_shadowing() {
        let mut tracker = AssignTracker::new();
        tracker.declare("x", DeclKind::Const, true);
        assert!(tracker.is_const("x"));
        tracker.push_scope(ScopeKind::Block);
        tracker.declare("x", DeclKind::Let, true);
        assert!(!tracker.is_const("x"));
        tracker.pop_scope();
        assert!(tracker.is_const("x"));
    }
}
