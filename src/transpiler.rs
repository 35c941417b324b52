//! Lowers a parsed [`Program`] to C++ source over the runtime's tagged `Value` type.
//!
//! Translation is a single recursive walk. [`Codegen`] carries the mutable state of
//! that walk: the active [`Scope`] (declared names, variable classes, class context,
//! captured cells and hoisted lines), the temporary-name counter and the functions
//! emitted so far.
//! Classes and top-level functions are compiled first; the remaining top-level
//! statements then become the body of `main`.

use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::ast::{Program, StatementKind};
use crate::config::TranspileConfig;
use crate::token::Span;

use self::classes::ClassTable;
use self::emit::{FunctionUnit, render_module};
use self::names::{UnitNames, source_names};
use self::scope::{Scope, TempNames};

mod classes;
mod closure;
mod cpp_runtime;
mod emit;
mod error;
mod expr;
mod names;
mod scope;
mod stmt;

pub use error::{DispatchFailure, OperatorPosition, TranspileError, TranspileResult};

#[derive(Debug, Clone, Default)]
pub struct Transpiler {
    config: TranspileConfig,
}

impl Transpiler {
    pub fn new(config: TranspileConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TranspileConfig {
        &self.config
    }

    /// Translates the whole program, or fails without producing any output.
    pub fn transpile(&self, program: &Program) -> TranspileResult<String> {
        let classes = ClassTable::build(program)?;
        debug!(
            statements = program.statements.len(),
            classes = classes.len(),
            "transpiling program"
        );
        let mut codegen = Codegen::new(&self.config, classes);
        let main = codegen.compile_program(program)?;
        Ok(render_module(&self.config, &codegen.functions, &main))
    }
}

pub(crate) struct Codegen<'c> {
    config: &'c TranspileConfig,
    classes: ClassTable,
    scope: Scope,
    temps: TempNames,
    /// Span of the statement being translated, reported by every error.
    span: Span,
    functions: Vec<FunctionUnit>,
    symbols: FxHashSet<String>,
    registrations: Vec<String>,
}

impl<'c> Codegen<'c> {
    fn new(config: &'c TranspileConfig, classes: ClassTable) -> Self {
        Self {
            config,
            classes,
            scope: Scope::module(),
            temps: TempNames::new(config.temp_prefix.clone()),
            span: Span::default(),
            functions: Vec::new(),
            symbols: FxHashSet::default(),
            registrations: Vec::new(),
        }
    }

    fn compile_program(&mut self, program: &Program) -> TranspileResult<Vec<String>> {
        self.temps.reserve(source_names(&program.statements));
        for statement in &program.statements {
            self.span = statement.span;
            match &statement.kind {
                StatementKind::ClassDef { name, body, .. } => self.compile_class(name, body)?,
                StatementKind::FunctionDef {
                    name,
                    params,
                    decorators,
                    body,
                } => self.compile_function(name, params, decorators, body)?,
                _ => {}
            }
        }

        let top_level: Vec<_> = program
            .statements
            .iter()
            .filter(|statement| {
                !matches!(
                    statement.kind,
                    StatementKind::ClassDef { .. } | StatementKind::FunctionDef { .. }
                )
            })
            .collect();

        self.scope = Scope::module();
        let mut main = std::mem::take(&mut self.registrations);
        let (_, cells) = self.open_cells(&[], &UnitNames::of_block(top_level.iter().copied()));
        main.extend(cells);
        for statement in top_level {
            main.extend(self.translate_statement(statement)?);
        }
        Ok(main)
    }

    /// Runs `f` inside `scope`, restoring the caller's scope afterwards even when `f` fails.
    fn with_scope<T>(
        &mut self,
        scope: Scope,
        f: impl FnOnce(&mut Self) -> TranspileResult<T>,
    ) -> TranspileResult<T> {
        let saved_scope = std::mem::replace(&mut self.scope, scope);
        let saved_span = self.span;
        let result = f(self);
        self.scope = saved_scope;
        self.span = saved_span;
        result
    }

    /// Runs `f` against an empty hoisted buffer and returns what it hoisted.
    fn capture_hoisted<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> TranspileResult<T>,
    ) -> TranspileResult<(Vec<String>, T)> {
        let outer = std::mem::take(&mut self.scope.hoisted);
        let result = f(self);
        let hoisted = std::mem::replace(&mut self.scope.hoisted, outer);
        result.map(|value| (hoisted, value))
    }

    fn hoist(&mut self, line: String) {
        trace!(line = self.span.line, hoisted = %line, "hoisting");
        self.scope.hoisted.push(line);
    }

    fn indent(&self, lines: Vec<String>) -> Vec<String> {
        let unit = " ".repeat(self.config.indent_width);
        lines
            .into_iter()
            .map(|line| format!("{unit}{line}"))
            .collect()
    }

    fn register_function(
        &mut self,
        symbol: &str,
        signature: String,
        body: Vec<String>,
    ) -> TranspileResult<()> {
        if !self.symbols.insert(symbol.to_string()) {
            return Err(self.unsupported(format!("redefinition of `{symbol}`")));
        }
        debug!(symbol, lines = body.len(), "emitted function");
        self.functions.push(FunctionUnit { signature, body });
        Ok(())
    }

    fn unsupported(&self, construct: impl Into<String>) -> TranspileError {
        TranspileError::UnsupportedConstruct {
            construct: construct.into(),
            line: self.span.line,
            column: self.span.column,
        }
    }

    fn unresolved(&self, class: &str, method: &str, reason: DispatchFailure) -> TranspileError {
        TranspileError::UnresolvedDispatch {
            class: class.to_string(),
            method: method.to_string(),
            reason,
            line: self.span.line,
            column: self.span.column,
        }
    }

    fn unsupported_operator(&self, operator: &str, position: OperatorPosition) -> TranspileError {
        TranspileError::UnsupportedOperator {
            operator: operator.to_string(),
            position,
            line: self.span.line,
            column: self.span.column,
        }
    }
}

#[cfg(test)]
mod tests;
