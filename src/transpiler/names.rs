//! Name analysis for translation units: what a unit binds, and which of its names the
//! closures and lambdas nested in it read or write.

use rustc_hash::FxHashSet;

use super::scope::Declared;
use super::stmt::{children, collect_bindings};
use crate::ast::{AssignTarget, Expression, Parameter, Statement, StatementKind};

/// Bindings of one function, method, closure, lambda or module body.
#[derive(Debug, Default)]
pub(super) struct UnitNames {
    /// Names the unit binds itself, in source order. `nonlocal` names are excluded.
    pub locals: Vec<(String, Declared)>,
    /// Free names of the closures and lambdas nested directly in the unit.
    pub captured: FxHashSet<String>,
}

impl UnitNames {
    pub(super) fn of_block<'s>(body: impl IntoIterator<Item = &'s Statement>) -> Self {
        Self::summarize(body).0
    }

    /// The unit's names together with the walk that produced them.
    fn summarize<'s>(body: impl IntoIterator<Item = &'s Statement>) -> (Self, NameWalk) {
        let mut walk = NameWalk::default();
        let mut bindings = Vec::new();
        for statement in body {
            collect_bindings(&statement.kind, &mut bindings);
            walk.statement(statement);
        }
        for name in &walk.augmented {
            if !bindings.iter().any(|(bound, _)| bound == name) {
                bindings.push((name.clone(), Declared::Value));
            }
        }
        let locals = bindings
            .into_iter()
            .filter(|(name, _)| !walk.nonlocals.contains(name))
            .collect();
        let names = Self {
            locals,
            captured: std::mem::take(&mut walk.captured),
        };
        (names, walk)
    }

    pub(super) fn of_lambda(body: &Expression) -> Self {
        let mut walk = NameWalk::default();
        walk.expr(body);
        Self {
            locals: Vec::new(),
            captured: walk.captured,
        }
    }

    pub(super) fn binds(&self, name: &str) -> bool {
        self.locals.iter().any(|(local, _)| local == name)
    }
}

/// Every identifier spelled anywhere in `statements`, nested units included.
pub(super) fn source_names(statements: &[Statement]) -> FxHashSet<String> {
    let mut walk = NameWalk {
        descend: true,
        ..NameWalk::default()
    };
    walk.block(statements);
    walk.spelled
}

#[derive(Debug, Default)]
struct NameWalk {
    /// Walk into nested functions and lambdas instead of summarizing their free names.
    descend: bool,
    spelled: FxHashSet<String>,
    augmented: FxHashSet<String>,
    nonlocals: FxHashSet<String>,
    captured: FxHashSet<String>,
}

impl NameWalk {
    fn block(&mut self, body: &[Statement]) {
        for statement in body {
            self.statement(statement);
        }
    }

    fn statement(&mut self, statement: &Statement) {
        match &statement.kind {
            StatementKind::ClassDef {
                name, bases, body, ..
            } => {
                self.spelled.insert(name.clone());
                for base in bases {
                    self.expr(base);
                }
                if self.descend {
                    self.block(body);
                }
            }
            StatementKind::FunctionDef {
                name, params, body, ..
            } => {
                self.spelled.insert(name.clone());
                self.function(params, body);
            }
            StatementKind::Assign { target, value } => {
                self.target(target);
                self.expr(value);
            }
            StatementKind::AugAssign { target, value, .. } => {
                if let AssignTarget::Name(name) = target {
                    self.augmented.insert(name.clone());
                }
                self.target(target);
                self.expr(value);
            }
            StatementKind::If {
                condition,
                then_body,
                elif_clauses,
                else_body,
            } => {
                self.expr(condition);
                self.block(then_body);
                for clause in elif_clauses {
                    self.expr(&clause.condition);
                    self.block(&clause.body);
                }
                self.block(else_body);
            }
            StatementKind::While {
                condition,
                body,
                else_body,
            } => {
                self.expr(condition);
                self.block(body);
                self.block(else_body);
            }
            StatementKind::For {
                target,
                iterable,
                body,
                else_body,
            } => {
                self.target(target);
                self.expr(iterable);
                self.block(body);
                self.block(else_body);
            }
            StatementKind::Try {
                body,
                handlers,
                else_body,
                finally_body,
            } => {
                self.block(body);
                for handler in handlers {
                    if let Some(kind) = &handler.kind {
                        self.expr(kind);
                    }
                    if let Some(name) = &handler.name {
                        self.spelled.insert(name.clone());
                    }
                    self.block(&handler.body);
                }
                self.block(else_body);
                self.block(finally_body);
            }
            StatementKind::Raise(value) | StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StatementKind::Assert { condition, message } => {
                self.expr(condition);
                if let Some(message) = message {
                    self.expr(message);
                }
            }
            StatementKind::Nonlocal(names) => {
                self.spelled.extend(names.iter().cloned());
                self.nonlocals.extend(names.iter().cloned());
            }
            StatementKind::Global(names) => self.spelled.extend(names.iter().cloned()),
            StatementKind::Break | StatementKind::Continue | StatementKind::Pass => {}
            StatementKind::Expr(expr) => self.expr(expr),
        }
    }

    fn function(&mut self, params: &[Parameter], body: &[Statement]) {
        if self.descend {
            self.spelled
                .extend(params.iter().map(|param| param.name.clone()));
            self.block(body);
            return;
        }
        let (names, walk) = UnitNames::summarize(body);
        let mut bound: FxHashSet<&str> = params.iter().map(|param| param.name.as_str()).collect();
        bound.extend(names.locals.iter().map(|(name, _)| name.as_str()));
        let free = walk
            .spelled
            .iter()
            .chain(&names.captured)
            .filter(|name| walk.nonlocals.contains(*name) || !bound.contains(name.as_str()))
            .cloned();
        self.captured.extend(free);
    }

    fn lambda(&mut self, params: &[Parameter], body: &Expression) {
        if self.descend {
            self.spelled
                .extend(params.iter().map(|param| param.name.clone()));
            self.expr(body);
            return;
        }
        let mut inner = NameWalk::default();
        inner.expr(body);
        let free = inner
            .spelled
            .into_iter()
            .chain(inner.captured)
            .filter(|name| !params.iter().any(|param| &param.name == name));
        self.captured.extend(free);
    }

    fn target(&mut self, target: &AssignTarget) {
        match target {
            AssignTarget::Name(name) => {
                self.spelled.insert(name.clone());
            }
            AssignTarget::Tuple(targets) => {
                for target in targets {
                    self.target(target);
                }
            }
            AssignTarget::Index { object, index } => {
                self.expr(object);
                self.expr(index);
            }
            AssignTarget::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                self.expr(object);
                for bound in [lower, upper, step].into_iter().flatten() {
                    self.expr(bound);
                }
            }
            AssignTarget::Attribute { object, .. } => self.expr(object),
        }
    }

    fn expr(&mut self, expr: &Expression) {
        match expr {
            Expression::Identifier(name) => {
                self.spelled.insert(name.clone());
            }
            Expression::NamedExpr { name, value } => {
                self.spelled.insert(name.clone());
                self.expr(value);
            }
            Expression::Lambda { params, body } => self.lambda(params, body),
            Expression::Comprehension {
                element, clauses, ..
            } => {
                for clause in clauses {
                    self.target(&clause.target);
                    self.expr(&clause.iterable);
                    for condition in &clause.conditions {
                        self.expr(condition);
                    }
                }
                self.expr(element);
            }
            other => {
                for child in children(other) {
                    self.expr(child);
                }
            }
        }
    }
}
