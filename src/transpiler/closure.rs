use tracing::debug;

use super::cpp_runtime::{cell_declaration, cpp_name};
use super::expr::{ExprKind, Lowered};
use super::names::UnitNames;
use super::scope::{Declared, Scope, ScopeKind};
use super::{Codegen, TranspileResult};
use crate::ast::{Expression, Parameter, ParameterKind, Statement, StatementKind};

impl Codegen<'_> {
    pub(super) fn compile_function(
        &mut self,
        name: &str,
        params: &[Parameter],
        decorators: &[Expression],
        body: &[Statement],
    ) -> TranspileResult<()> {
        if !decorators.is_empty() {
            return Err(self.unsupported("function decorators"));
        }
        self.check_params(params)?;
        debug!(function = name, params = params.len(), "compiling function");

        let names = param_names(params);
        let unit = UnitNames::of_block(body);
        let (signature_params, lines) =
            self.with_scope(Scope::function(ScopeKind::Function, &names), |this| {
                this.compile_unit_body(&names, &unit, body)
            })?;
        let symbol = cpp_name(name).into_owned();
        let signature = format!("Value {symbol}({})", value_params(&signature_params));
        self.register_function(&symbol, signature, lines)
    }

    /// Opens the unit's cells, then compiles its body. Returns the C++ parameter names
    /// alongside the body lines.
    pub(super) fn compile_unit_body(
        &mut self,
        params: &[String],
        unit: &UnitNames,
        body: &[Statement],
    ) -> TranspileResult<(Vec<String>, Vec<String>)> {
        let (signature_params, mut lines) = self.open_cells(params, unit);
        lines.extend(self.compile_body(body)?);
        Ok((signature_params, lines))
    }

    /// Moves every parameter and local that a nested closure uses into a shared cell,
    /// declared before the body. A captured parameter arrives under a temporary name and
    /// is copied into its cell.
    pub(super) fn open_cells(
        &mut self,
        params: &[String],
        unit: &UnitNames,
    ) -> (Vec<String>, Vec<String>) {
        let mut signature_params = Vec::with_capacity(params.len());
        let mut prelude = Vec::new();
        for param in params {
            if !unit.captured.contains(param) {
                signature_params.push(param.clone());
                continue;
            }
            let incoming = self.temps.fresh();
            prelude.push(cell_declaration("Value", &cpp_name(param), &incoming));
            self.scope.cells.insert(param.clone());
            signature_params.push(incoming);
        }
        for (name, declared) in &unit.locals {
            if !unit.captured.contains(name) || !self.scope.env.declare(name, *declared) {
                continue;
            }
            prelude.push(cell_declaration(&declared.type_name(), &cpp_name(name), ""));
            self.scope.cells.insert(name.clone());
        }
        (signature_params, prelude)
    }

    /// Scope for a closure or lambda defined in the current scope. Cells of the enclosing
    /// units stay visible unless the nested unit binds the same name itself.
    fn nested_scope(&self, kind: ScopeKind, params: &[String], unit: &UnitNames) -> Scope {
        let mut scope = Scope::function(kind, params);
        for name in &self.scope.cells {
            if params.contains(name) || unit.binds(name) {
                continue;
            }
            let declared = self.scope.env.get(name).unwrap_or(Declared::Value);
            scope.env.declare(name, declared);
            scope.cells.insert(name.clone());
        }
        scope
    }

    pub(super) fn check_params(&self, params: &[Parameter]) -> TranspileResult<()> {
        for param in params {
            match param.kind {
                ParameterKind::VarArgs => return Err(self.unsupported("*args parameter")),
                ParameterKind::KwArgs => return Err(self.unsupported("**kwargs parameter")),
                ParameterKind::Positional => {}
            }
            if param.default.is_some() {
                return Err(self.unsupported(format!(
                    "default value for parameter `{}`",
                    param.name
                )));
            }
        }
        Ok(())
    }

    /// A function body with the implicit `return Value();` when no top-level line exits.
    pub(super) fn compile_body(&mut self, body: &[Statement]) -> TranspileResult<Vec<String>> {
        let mut lines = self.translate_block(body)?;
        let exits = body.iter().any(|statement| {
            matches!(
                statement.kind,
                StatementKind::Return(_) | StatementKind::Raise(_)
            )
        });
        if !exits {
            lines.push("return Value();".to_string());
        }
        Ok(lines)
    }

    /// A nested `def` bound to a `std::function`. The lambda copies the cells it uses, so
    /// writes are shared with the enclosing unit and the closure may outlive it.
    pub(super) fn lower_nested_def(
        &mut self,
        name: &str,
        params: &[Parameter],
        decorators: &[Expression],
        body: &[Statement],
    ) -> TranspileResult<Vec<String>> {
        if !decorators.is_empty() {
            return Err(self.unsupported("function decorators"));
        }
        self.check_params(params)?;

        let names = param_names(params);
        let declared = Declared::Callable { arity: names.len() };
        let unit = UnitNames::of_block(body);
        let scope = self.nested_scope(ScopeKind::Closure, &names, &unit);
        let (signature_params, body) = self.with_scope(scope, |this| {
            this.compile_unit_body(&names, &unit, body)
        })?;
        let first_binding = self.scope.env.declare(name, declared);
        self.scope.var_classes.record(name, None);

        let params = value_params(&signature_params);
        let header = if first_binding {
            format!(
                "{} {} = [=]({params}) -> Value {{",
                declared.type_name(),
                cpp_name(name)
            )
        } else {
            format!("{} = [=]({params}) -> Value {{", self.name_ref(name))
        };
        let mut lines = vec![header];
        lines.extend(self.indent(body));
        lines.push("};".to_string());
        Ok(lines)
    }

    pub(super) fn lower_lambda(
        &mut self,
        params: &[Parameter],
        body: &Expression,
    ) -> TranspileResult<Lowered> {
        self.check_params(params)?;
        let names = param_names(params);
        let unit = UnitNames::of_lambda(body);
        let scope = self.nested_scope(ScopeKind::Lambda, &names, &unit);
        let (signature_params, parts) = self.with_scope(scope, |this| {
            let (signature_params, mut parts) = this.open_cells(&names, &unit);
            let body = this.lower_expr(body)?;
            parts.append(&mut this.scope.hoisted);
            parts.push(format!("return {};", body.code));
            Ok((signature_params, parts))
        })?;

        Ok(Lowered {
            code: format!(
                "[=]({}) -> Value {{ {} }}",
                value_params(&signature_params),
                parts.join(" ")
            ),
            kind: ExprKind::Callable {
                arity: names.len(),
            },
        })
    }
}

pub(super) fn param_names(params: &[Parameter]) -> Vec<String> {
    params.iter().map(|param| param.name.clone()).collect()
}

/// `Value a, Value b` for a C++ parameter list.
pub(super) fn value_params(names: &[String]) -> String {
    names
        .iter()
        .map(|name| format!("Value {}", cpp_name(name)))
        .collect::<Vec<_>>()
        .join(", ")
}
