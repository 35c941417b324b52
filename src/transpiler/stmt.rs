use super::cpp_runtime::{binary_builtin, cpp_name};
use super::expr::{Lowered, target_names};
use super::scope::{Declared, ScopeKind};
use super::{Codegen, OperatorPosition, TranspileResult};
use crate::ast::{
    AssignTarget, ElifClause, ExceptHandler, Expression, Statement, StatementKind,
};

impl Codegen<'_> {
    pub(super) fn translate_block(&mut self, body: &[Statement]) -> TranspileResult<Vec<String>> {
        let mut lines = Vec::new();
        for statement in body {
            lines.extend(self.translate_statement(statement)?);
        }
        Ok(lines)
    }

    /// Lines for one statement: its hoisted prelude followed by its own lines.
    pub(super) fn translate_statement(
        &mut self,
        statement: &Statement,
    ) -> TranspileResult<Vec<String>> {
        let outer_span = std::mem::replace(&mut self.span, statement.span);
        let result = self.capture_hoisted(|this| {
            this.predeclare(&statement.kind);
            this.lower_statement(&statement.kind)
        });
        self.span = outer_span;

        let (mut lines, own) = result?;
        lines.extend(own);
        Ok(lines)
    }

    fn translate_indented(&mut self, body: &[Statement]) -> TranspileResult<Vec<String>> {
        let lines = self.translate_block(body)?;
        Ok(self.indent(lines))
    }

    /// Declares ahead of a statement the names that would otherwise first be bound in a
    /// nested C++ block.
    fn predeclare(&mut self, kind: &StatementKind) {
        let mut bindings = Vec::new();
        if is_compound(kind) {
            collect_bindings(kind, &mut bindings);
        } else {
            for expr in statement_expressions(kind) {
                collect_walrus(expr, false, &mut bindings);
            }
        }
        for (name, declared) in bindings {
            if self.scope.env.declare(&name, declared) {
                self.hoist(format!("{} {};", declared.type_name(), cpp_name(&name)));
            }
        }
    }

    fn lower_statement(&mut self, kind: &StatementKind) -> TranspileResult<Vec<String>> {
        match kind {
            StatementKind::ClassDef { .. } => {
                Err(self.unsupported("class definition below module level"))
            }
            StatementKind::FunctionDef {
                name,
                params,
                decorators,
                body,
            } => self.lower_nested_def(name, params, decorators, body),
            StatementKind::Assign {
                target: AssignTarget::Name(name),
                value,
            } => {
                let lowered = self.lower_expr(value)?;
                let class = self.classify(value);
                self.scope.var_classes.record(name, class);
                Ok(vec![self.bind_name(name, &lowered)])
            }
            StatementKind::Assign { target, value } => {
                let value = self.lower_expr(value)?.code;
                let mut lines = Vec::new();
                self.assign_to_target(target, value, &mut lines)?;
                Ok(lines)
            }
            StatementKind::AugAssign { target, op, value } => {
                let Some(builtin) = binary_builtin(*op) else {
                    return Err(self.unsupported_operator(
                        &format!("{}=", op.symbol()),
                        OperatorPosition::AugmentedAssignment,
                    ));
                };
                self.lower_aug_assign(target, builtin, value)
            }
            StatementKind::If {
                condition,
                then_body,
                elif_clauses,
                else_body,
            } => {
                let condition = self.lower_expr(condition)?.code;
                let mut lines = vec![format!("if (py_truth({condition})) {{")];
                lines.extend(self.translate_indented(then_body)?);
                self.lower_else_chain(elif_clauses, else_body, &mut lines)?;
                lines.push("}".to_string());
                Ok(lines)
            }
            StatementKind::While {
                condition,
                body,
                else_body,
            } => {
                if !else_body.is_empty() {
                    return Err(self.unsupported("while loop with an else clause"));
                }
                let (hoisted, condition) = self.capture_hoisted(|this| this.lower_expr(condition))?;
                let body = self.translate_block(body)?;
                if hoisted.is_empty() {
                    let mut lines = vec![format!("while (py_truth({})) {{", condition.code)];
                    lines.extend(self.indent(body));
                    lines.push("}".to_string());
                    return Ok(lines);
                }
                // Hoists must run again before every test of the condition.
                let mut inner = hoisted;
                inner.push(format!("if (!py_truth({})) break;", condition.code));
                inner.extend(body);
                let mut lines = vec!["while (true) {".to_string()];
                lines.extend(self.indent(inner));
                lines.push("}".to_string());
                Ok(lines)
            }
            StatementKind::For {
                target,
                iterable,
                body,
                else_body,
            } => {
                if !else_body.is_empty() {
                    return Err(self.unsupported("for loop with an else clause"));
                }
                let source = self.lower_iterable(iterable)?;
                let item = self.temps.fresh();
                let mut inner = Vec::new();
                self.bind_loop_target(target, &item, &mut inner)?;
                inner.extend(self.translate_block(body)?);

                let mut lines = vec![format!("for (Value {item} : {source}) {{")];
                lines.extend(self.indent(inner));
                lines.push("}".to_string());
                Ok(lines)
            }
            StatementKind::Try {
                body,
                handlers,
                else_body,
                finally_body,
            } => self.lower_try(body, handlers, else_body, finally_body),
            StatementKind::Raise(Some(exception)) => {
                let exception = self.lower_expr(exception)?.code;
                Ok(vec![format!("throw {exception};")])
            }
            StatementKind::Raise(None) => Ok(vec!["throw Value(\"Exception\");".to_string()]),
            StatementKind::Assert { condition, message } => {
                let condition = self.lower_expr(condition)?.code;
                let message = match message {
                    Some(message) => self.lower_expr(message)?.code,
                    None => "Value(\"AssertionError\")".to_string(),
                };
                Ok(vec![format!("if (!py_truth({condition})) {{ throw {message}; }}")])
            }
            StatementKind::Return(value) => {
                if !self.scope.in_function() {
                    return Err(self.unsupported("return outside function"));
                }
                let value = match value {
                    Some(value) => self.lower_expr(value)?.code,
                    None => "Value()".to_string(),
                };
                Ok(vec![format!("return {value};")])
            }
            StatementKind::Nonlocal(names) => {
                if self.scope.kind != ScopeKind::Closure {
                    return Err(self.unsupported("nonlocal outside a nested function"));
                }
                for name in names {
                    self.scope.env.declare(name, Declared::Value);
                }
                Ok(Vec::new())
            }
            StatementKind::Global(_) => Err(self.unsupported("global statement")),
            StatementKind::Break => Ok(vec!["break;".to_string()]),
            StatementKind::Continue => Ok(vec!["continue;".to_string()]),
            StatementKind::Pass => Ok(vec![";".to_string()]),
            // docstring
            StatementKind::Expr(Expression::String(_)) => Ok(Vec::new()),
            StatementKind::Expr(expr) => {
                let code = self.lower_expr(expr)?.code;
                Ok(vec![format!("{code};")])
            }
        }
    }

    /// Binds `value` to an assignment target, appending the emitted lines to `out`.
    pub(super) fn assign_to_target(
        &mut self,
        target: &AssignTarget,
        value: String,
        out: &mut Vec<String>,
    ) -> TranspileResult<()> {
        match target {
            AssignTarget::Name(name) => {
                self.scope.var_classes.record(name, None);
                out.push(self.bind_name(name, &Lowered::value(value)));
            }
            AssignTarget::Tuple(targets) => {
                let source = self.temps.fresh();
                out.push(format!("Value {source} = {value};"));
                self.unpack_tuple(targets, &source, out)?;
            }
            AssignTarget::Attribute { object, name } => {
                let (hoisted, object) = self.capture_hoisted(|this| this.lower_expr(object))?;
                out.extend(hoisted);
                out.push(format!(
                    "{}.asObject()->fields[\"{name}\"] = {value};",
                    object.code
                ));
            }
            AssignTarget::Index { object, index } => {
                let is_dict = self.is_dict_name(object);
                let (hoisted, (object, index)) = self.capture_hoisted(|this| {
                    Ok((this.lower_expr(object)?.code, this.lower_expr(index)?.code))
                })?;
                out.extend(hoisted);
                let builtin = if is_dict { "dict_set" } else { "list_set" };
                out.push(format!("{builtin}({object}, {index}, {value});"));
            }
            AssignTarget::Slice { .. } => return Err(self.unsupported("slice assignment")),
        }
        Ok(())
    }

    /// Binds a loop variable; tuple targets unpack straight from the loop item.
    pub(super) fn bind_loop_target(
        &mut self,
        target: &AssignTarget,
        item: &str,
        out: &mut Vec<String>,
    ) -> TranspileResult<()> {
        match target {
            AssignTarget::Tuple(targets) => self.unpack_tuple(targets, item, out),
            other => self.assign_to_target(other, item.to_string(), out),
        }
    }

    fn unpack_tuple(
        &mut self,
        targets: &[AssignTarget],
        source: &str,
        out: &mut Vec<String>,
    ) -> TranspileResult<()> {
        for (position, target) in targets.iter().enumerate() {
            self.assign_to_target(target, format!("tuple_get({source}, Value({position}))"), out)?;
        }
        Ok(())
    }

    fn lower_aug_assign(
        &mut self,
        target: &AssignTarget,
        builtin: &str,
        value: &Expression,
    ) -> TranspileResult<Vec<String>> {
        match target {
            AssignTarget::Name(name) => {
                if !self.scope.env.is_declared(name) {
                    return Err(self.unsupported(format!(
                        "augmented assignment to unbound name `{name}`"
                    )));
                }
                let value = self.lower_expr(value)?.code;
                let name = self.name_ref(name);
                Ok(vec![format!("{name} = {builtin}({name}, {value});")])
            }
            AssignTarget::Attribute { object, name } => {
                if has_side_effects(object) {
                    return Err(self.unsupported("augmented assignment to an impure attribute target"));
                }
                let object = self.lower_expr(object)?.code;
                let value = self.lower_expr(value)?.code;
                let field = format!("{object}.asObject()->fields[\"{name}\"]");
                Ok(vec![format!("{field} = {builtin}({field}, {value});")])
            }
            AssignTarget::Index { object, index } => {
                if has_side_effects(object) || has_side_effects(index) {
                    return Err(self.unsupported("augmented assignment to an impure subscript target"));
                }
                let (getter, setter) = if self.is_dict_name(object) {
                    ("dict_get", "dict_set")
                } else {
                    ("list_get", "list_set")
                };
                let object = self.lower_expr(object)?.code;
                let index = self.lower_expr(index)?.code;
                let value = self.lower_expr(value)?.code;
                Ok(vec![format!(
                    "{setter}({object}, {index}, {builtin}({getter}({object}, {index}), {value}));"
                )])
            }
            AssignTarget::Tuple(_) => Err(self.unsupported("augmented assignment to a tuple")),
            AssignTarget::Slice { .. } => Err(self.unsupported("augmented slice assignment")),
        }
    }

    /// Appends the `elif`/`else` arms of an `if`; the caller closes the final brace.
    fn lower_else_chain(
        &mut self,
        elif_clauses: &[ElifClause],
        else_body: &[Statement],
        lines: &mut Vec<String>,
    ) -> TranspileResult<()> {
        let Some((clause, rest)) = elif_clauses.split_first() else {
            if !else_body.is_empty() {
                lines.push("} else {".to_string());
                lines.extend(self.translate_indented(else_body)?);
            }
            return Ok(());
        };

        let outer_span = std::mem::replace(&mut self.span, clause.span);
        let condition = self.capture_hoisted(|this| this.lower_expr(&clause.condition));
        self.span = outer_span;
        let (hoisted, condition) = condition?;

        if hoisted.is_empty() {
            lines.push(format!("}} else if (py_truth({})) {{", condition.code));
            lines.extend(self.translate_indented(&clause.body)?);
            return self.lower_else_chain(rest, else_body, lines);
        }

        let mut nested = hoisted;
        nested.push(format!("if (py_truth({})) {{", condition.code));
        nested.extend(self.translate_indented(&clause.body)?);
        self.lower_else_chain(rest, else_body, &mut nested)?;
        nested.push("}".to_string());
        lines.push("} else {".to_string());
        lines.extend(self.indent(nested));
        Ok(())
    }

    fn lower_try(
        &mut self,
        body: &[Statement],
        handlers: &[ExceptHandler],
        else_body: &[Statement],
        finally_body: &[Statement],
    ) -> TranspileResult<Vec<String>> {
        if handlers.is_empty() && !else_body.is_empty() {
            return Err(self.unsupported("try/else without an except clause"));
        }

        let mut core = Vec::new();
        if handlers.is_empty() {
            core.extend(self.translate_block(body)?);
        } else {
            let completed = (!else_body.is_empty()).then(|| self.temps.fresh());
            if let Some(flag) = &completed {
                core.push(format!("Value {flag} = Value(false);"));
            }
            core.push("try {".to_string());
            let mut try_lines = self.translate_block(body)?;
            if let Some(flag) = &completed {
                try_lines.push(format!("{flag} = Value(true);"));
            }
            core.extend(self.indent(try_lines));
            for handler in handlers {
                core.extend(self.lower_handler(handler)?);
            }
            core.push("}".to_string());

            if let Some(flag) = &completed {
                core.push("// else".to_string());
                core.push(format!("if (py_truth({flag})) {{"));
                core.extend(self.translate_indented(else_body)?);
                core.push("}".to_string());
            }
        }

        if finally_body.is_empty() {
            return Ok(core);
        }
        let finally_lines = self.translate_block(finally_body)?;
        let mut rethrow = finally_lines.clone();
        rethrow.push("throw;".to_string());

        let mut lines = vec!["try {".to_string()];
        lines.extend(self.indent(core));
        lines.push("} catch (...) {".to_string());
        lines.extend(self.indent(rethrow));
        lines.push("}".to_string());
        lines.push("// finally".to_string());
        lines.extend(finally_lines);
        Ok(lines)
    }

    fn lower_handler(&mut self, handler: &ExceptHandler) -> TranspileResult<Vec<String>> {
        let outer_span = std::mem::replace(&mut self.span, handler.span);
        let result = self.lower_handler_body(handler);
        self.span = outer_span;
        result
    }

    fn lower_handler_body(&mut self, handler: &ExceptHandler) -> TranspileResult<Vec<String>> {
        let Some(kind) = &handler.kind else {
            let mut lines = vec!["} catch (...) {".to_string()];
            lines.extend(self.translate_indented(&handler.body)?);
            return Ok(lines);
        };

        let binding = match &handler.name {
            Some(name) => name.clone(),
            None => self.temps.fresh(),
        };
        let label = exception_label(kind);
        let caught = cpp_name(&binding).into_owned();

        // Source raises arrive as `Value`; runtime failures as `std::exception`.
        let mut lines = vec![format!("}} catch (Value& {caught}) {{  // except {label}")];
        lines.extend(self.translate_handler_block(&binding, &handler.body)?);

        let native = self.temps.fresh();
        lines.push(format!(
            "}} catch (const std::exception& {native}) {{  // except {label}"
        ));
        lines.extend(self.indent(vec![format!("Value {caught} = Value({native}.what());")]));
        lines.extend(self.translate_handler_block(&binding, &handler.body)?);
        Ok(lines)
    }

    /// A handler body with `binding` visible only inside it.
    fn translate_handler_block(
        &mut self,
        binding: &str,
        body: &[Statement],
    ) -> TranspileResult<Vec<String>> {
        let binding = binding.to_string();
        let shadowed = self.scope.shadow(std::slice::from_ref(&binding));
        self.scope.env.declare(&binding, Declared::Value);
        let lines = self.translate_indented(body);
        self.scope.unshadow(shadowed);
        lines
    }
}

fn is_compound(kind: &StatementKind) -> bool {
    matches!(
        kind,
        StatementKind::If { .. }
            | StatementKind::While { .. }
            | StatementKind::For { .. }
            | StatementKind::Try { .. }
    )
}

fn binding_kind(value: &Expression) -> Declared {
    match value {
        Expression::Lambda { params, .. } => Declared::Callable {
            arity: params.len(),
        },
        _ => Declared::Value,
    }
}

/// Every name bound anywhere inside a compound statement, in source order.
pub(super) fn collect_bindings(kind: &StatementKind, out: &mut Vec<(String, Declared)>) {
    match kind {
        StatementKind::Assign { target, value } => {
            match target {
                AssignTarget::Name(name) => out.push((name.clone(), binding_kind(value))),
                AssignTarget::Tuple(_) => out.extend(
                    target_names(target)
                        .into_iter()
                        .map(|name| (name, Declared::Value)),
                ),
                _ => {}
            }
            collect_walrus(value, true, out);
        }
        StatementKind::FunctionDef { name, params, .. } => out.push((
            name.clone(),
            Declared::Callable {
                arity: params.len(),
            },
        )),
        StatementKind::If {
            condition,
            then_body,
            elif_clauses,
            else_body,
        } => {
            collect_walrus(condition, true, out);
            collect_block(then_body, out);
            for clause in elif_clauses {
                collect_walrus(&clause.condition, true, out);
                collect_block(&clause.body, out);
            }
            collect_block(else_body, out);
        }
        StatementKind::While {
            condition,
            body,
            else_body,
        } => {
            collect_walrus(condition, true, out);
            collect_block(body, out);
            collect_block(else_body, out);
        }
        StatementKind::For {
            target,
            iterable,
            body,
            else_body,
        } => {
            out.extend(
                target_names(target)
                    .into_iter()
                    .map(|name| (name, Declared::Value)),
            );
            collect_walrus(iterable, true, out);
            collect_block(body, out);
            collect_block(else_body, out);
        }
        StatementKind::Try {
            body,
            handlers,
            else_body,
            finally_body,
        } => {
            collect_block(body, out);
            for handler in handlers {
                collect_block(&handler.body, out);
            }
            collect_block(else_body, out);
            collect_block(finally_body, out);
        }
        other => {
            for expr in statement_expressions(other) {
                collect_walrus(expr, true, out);
            }
        }
    }
}

fn collect_block(body: &[Statement], out: &mut Vec<(String, Declared)>) {
    for statement in body {
        collect_bindings(&statement.kind, out);
    }
}

/// Expressions evaluated directly by a simple statement.
fn statement_expressions(kind: &StatementKind) -> Vec<&Expression> {
    match kind {
        StatementKind::Assign { value, .. } | StatementKind::AugAssign { value, .. } => {
            vec![value]
        }
        StatementKind::Raise(Some(expr))
        | StatementKind::Return(Some(expr))
        | StatementKind::Expr(expr) => vec![expr],
        StatementKind::Assert { condition, message } => {
            let mut exprs = vec![condition];
            exprs.extend(message);
            exprs
        }
        _ => Vec::new(),
    }
}

/// Collects walrus bindings; `record` is false until a comprehension body is entered.
fn collect_walrus(expr: &Expression, record: bool, out: &mut Vec<(String, Declared)>) {
    match expr {
        Expression::NamedExpr { name, value } => {
            if record {
                out.push((name.clone(), binding_kind(value)));
            }
            collect_walrus(value, record, out);
        }
        Expression::Comprehension {
            element, clauses, ..
        } => {
            for (position, clause) in clauses.iter().enumerate() {
                collect_walrus(&clause.iterable, record || position > 0, out);
                for condition in &clause.conditions {
                    collect_walrus(condition, true, out);
                }
            }
            collect_walrus(element, true, out);
        }
        Expression::Lambda { .. } => {}
        other => {
            for child in children(other) {
                collect_walrus(child, record, out);
            }
        }
    }
}

fn has_side_effects(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Call { .. }
            | Expression::NamedExpr { .. }
            | Expression::Comprehension { .. }
            | Expression::Lambda { .. }
            | Expression::Yield(_)
    ) || children(expr).into_iter().any(has_side_effects)
}

pub(super) fn children(expr: &Expression) -> Vec<&Expression> {
    match expr {
        Expression::Integer(_)
        | Expression::Float(_)
        | Expression::String(_)
        | Expression::Bytes(_)
        | Expression::Boolean(_)
        | Expression::None
        | Expression::Identifier(_) => Vec::new(),
        Expression::List(items) | Expression::Tuple(items) => items.iter().collect(),
        Expression::Dict(entries) => entries
            .iter()
            .flat_map(|(key, value)| [key, value])
            .collect(),
        Expression::Attribute { object, .. } => vec![object.as_ref()],
        Expression::Index { object, index } => vec![object.as_ref(), index.as_ref()],
        Expression::Slice {
            object,
            lower,
            upper,
            step,
        } => {
            let mut exprs = vec![object.as_ref()];
            exprs.extend(lower.as_deref());
            exprs.extend(upper.as_deref());
            exprs.extend(step.as_deref());
            exprs
        }
        Expression::BinaryOp { left, right, .. } => vec![left.as_ref(), right.as_ref()],
        Expression::UnaryOp { operand, .. } => vec![operand.as_ref()],
        Expression::BoolOp { values, .. } => values.iter().collect(),
        Expression::Compare { left, comparisons } => {
            let mut exprs = vec![left.as_ref()];
            exprs.extend(comparisons.iter().map(|(_, right)| right));
            exprs
        }
        Expression::Call {
            callee,
            args,
            keywords,
        } => {
            let mut exprs = vec![callee.as_ref()];
            exprs.extend(args);
            exprs.extend(keywords.iter().map(|keyword| &keyword.value));
            exprs
        }
        Expression::Conditional {
            condition,
            body,
            orelse,
        } => vec![condition.as_ref(), body.as_ref(), orelse.as_ref()],
        Expression::Lambda { body, .. } => vec![body.as_ref()],
        Expression::Comprehension {
            element, clauses, ..
        } => {
            let mut exprs = vec![element.as_ref()];
            for clause in clauses {
                exprs.push(&clause.iterable);
                exprs.extend(&clause.conditions);
            }
            exprs
        }
        Expression::NamedExpr { value, .. } => vec![value.as_ref()],
        Expression::Yield(value) => value.as_deref().into_iter().collect(),
    }
}

/// Source-like label for the type named in an `except` clause.
fn exception_label(kind: &Expression) -> String {
    match kind {
        Expression::Identifier(name) => name.clone(),
        Expression::Attribute { object, name } => format!("{}.{name}", exception_label(object)),
        Expression::Tuple(items) => {
            let labels: Vec<_> = items.iter().map(exception_label).collect();
            format!("({})", labels.join(", "))
        }
        _ => "<expression>".to_string(),
    }
}
