//! Single-inheritance class table and the code emitted for each class.
//!
//! The table is built from every module-level `class` statement before any body is
//! translated, so dispatch never depends on definition order. Method calls on a receiver
//! of known class walk the base chain and bind to the first class defining the method.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use super::closure::{param_names, value_params};
use super::cpp_runtime::cpp_name;
use super::names::UnitNames;
use super::scope::Scope;
use super::{Codegen, TranspileError, TranspileResult};
use crate::ast::{Expression, Parameter, Program, Statement, StatementKind};
use crate::token::Span;

/// Special methods every class gets a body for, written by hand or synthesized.
const DEFAULT_METHODS: [&str; 2] = ["__new__", "__repr__"];

/// Special methods published in `builtin_methods` when the class resolves them.
const REGISTERED_METHODS: [&str; 3] = ["__new__", "__repr__", "__str__"];

#[derive(Debug, Clone)]
struct ClassInfo {
    base: Option<String>,
    methods: FxHashSet<String>,
    init_params: Option<Vec<String>>,
    synthesized: Vec<&'static str>,
}

#[derive(Debug, Default)]
pub(crate) struct ClassTable {
    classes: FxHashMap<String, ClassInfo>,
}

impl ClassTable {
    pub fn build(program: &Program) -> TranspileResult<Self> {
        let mut table = Self::default();
        let mut spans = FxHashMap::default();

        for statement in &program.statements {
            let StatementKind::ClassDef {
                name,
                bases,
                keywords,
                decorators,
                body,
            } = &statement.kind
            else {
                continue;
            };
            let span = statement.span;
            if !decorators.is_empty() {
                return Err(unsupported_at(span, "class decorators"));
            }
            if !keywords.is_empty() {
                return Err(unsupported_at(span, "class keyword arguments"));
            }
            let base = match bases.as_slice() {
                [] => None,
                [Expression::Identifier(base)] if base == "object" => None,
                [Expression::Identifier(base)] => Some(base.clone()),
                [_] => return Err(unsupported_at(span, "base class that is not a plain name")),
                _ => return Err(unsupported_at(span, "multiple inheritance")),
            };

            let mut methods = FxHashSet::default();
            let mut init_params = None;
            for member in body {
                if let StatementKind::FunctionDef {
                    name: method,
                    params,
                    ..
                } = &member.kind
                {
                    if method == "__init__" {
                        init_params = Some(param_names(params));
                    }
                    methods.insert(method.clone());
                }
            }

            if table.classes.contains_key(name) {
                return Err(unsupported_at(span, format!("redefinition of class `{name}`")));
            }
            spans.insert(name.clone(), span);
            table.classes.insert(
                name.clone(),
                ClassInfo {
                    base,
                    methods,
                    init_params,
                    synthesized: Vec::new(),
                },
            );
        }

        table.check_acyclic(&spans)?;
        table.plan_defaults();
        Ok(table)
    }

    fn check_acyclic(&self, spans: &FxHashMap<String, Span>) -> TranspileResult<()> {
        for (name, span) in spans {
            let mut seen = FxHashSet::default();
            let mut current = Some(name.as_str());
            while let Some(class) = current {
                if !seen.insert(class) {
                    return Err(unsupported_at(
                        *span,
                        format!("cyclic inheritance involving `{name}`"),
                    ));
                }
                current = self.base(class).filter(|base| self.contains(base));
            }
        }
        Ok(())
    }

    /// Marks the default special methods no user class in the chain provides.
    fn plan_defaults(&mut self) {
        let mut missing = Vec::new();
        for name in self.classes.keys() {
            for method in DEFAULT_METHODS {
                if self.resolve(name, method).is_none() {
                    missing.push((name.clone(), method));
                }
            }
        }
        for (name, method) in missing {
            if let Some(info) = self.classes.get_mut(&name) {
                info.methods.insert(method.to_string());
                info.synthesized.push(method);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn base(&self, class: &str) -> Option<&str> {
        self.classes.get(class)?.base.as_deref()
    }

    /// The class followed by its known ancestors, nearest first.
    pub fn chain<'t>(&'t self, class: &str) -> impl Iterator<Item = &'t str> + use<'t> {
        let start = self.known(class);
        std::iter::successors(start, move |current| self.known(self.base(current)?))
    }

    fn known(&self, class: &str) -> Option<&str> {
        self.classes
            .get_key_value(class)
            .map(|(name, _)| name.as_str())
    }

    /// The class that supplies `method` for instances of `class`.
    pub fn resolve(&self, class: &str, method: &str) -> Option<&str> {
        self.chain(class).find(|owner| {
            self.classes
                .get(*owner)
                .is_some_and(|info| info.methods.contains(method))
        })
    }

    /// The nearest `__init__` in the chain and its parameters, receiver included.
    pub fn initializer(&self, class: &str) -> Option<(&str, &[String])> {
        self.chain(class).find_map(|owner| {
            let params = self.classes.get(owner)?.init_params.as_deref()?;
            Some((owner, params))
        })
    }

    fn synthesized(&self, class: &str) -> &[&'static str] {
        self.classes
            .get(class)
            .map_or(&[], |info| info.synthesized.as_slice())
    }
}

pub(super) fn method_symbol(class: &str, method: &str) -> String {
    format!("{class}__{method}")
}

fn unsupported_at(span: Span, construct: impl Into<String>) -> TranspileError {
    TranspileError::UnsupportedConstruct {
        construct: construct.into(),
        line: span.line,
        column: span.column,
    }
}

impl Codegen<'_> {
    pub(super) fn compile_class(&mut self, class: &str, body: &[Statement]) -> TranspileResult<()> {
        debug!(class, base = ?self.classes.base(class), "compiling class");
        let class_span = self.span;
        for statement in body {
            self.span = statement.span;
            match &statement.kind {
                StatementKind::FunctionDef {
                    name,
                    params,
                    decorators,
                    body,
                } => self.compile_method(class, name, params, decorators, body)?,
                StatementKind::Pass | StatementKind::Expr(Expression::String(_)) => {}
                _ => return Err(self.unsupported("class body statement other than a method")),
            }
        }
        self.span = class_span;

        self.emit_default_methods(class)?;
        self.emit_constructor(class)?;
        for method in REGISTERED_METHODS {
            if let Some(owner) = self.classes.resolve(class, method) {
                let symbol = method_symbol(owner, method);
                self.registrations
                    .push(format!("builtin_methods[\"{class}{method}\"] = {symbol};"));
            }
        }
        Ok(())
    }

    fn compile_method(
        &mut self,
        class: &str,
        method: &str,
        params: &[Parameter],
        decorators: &[Expression],
        body: &[Statement],
    ) -> TranspileResult<()> {
        if !decorators.is_empty() {
            return Err(self.unsupported("method decorators"));
        }
        self.check_params(params)?;
        if params.is_empty() {
            return Err(self.unsupported(format!("method `{method}` without a receiver parameter")));
        }

        let names = param_names(params);
        let unit = UnitNames::of_block(body);
        let (signature_params, lines) = self.with_scope(Scope::method(class, &names), |this| {
            this.compile_unit_body(&names, &unit, body)
        })?;
        let symbol = method_symbol(class, method);
        let signature = format!("Value {symbol}({})", value_params(&signature_params));
        self.register_function(&symbol, signature, lines)
    }

    fn emit_default_methods(&mut self, class: &str) -> TranspileResult<()> {
        for method in self.classes.synthesized(class).to_vec() {
            let symbol = method_symbol(class, method);
            let (signature, body) = match method {
                "__new__" => (
                    format!("Value {symbol}(Value cls_obj)"),
                    vec![
                        "auto obj = std::make_shared<Object>();".to_string(),
                        format!("obj->type_name = \"{class}\";"),
                        "return Value(obj);".to_string(),
                    ],
                ),
                _ => (
                    format!("Value {symbol}(Value self)"),
                    vec![format!("return Value(\"<{class} object>\");")],
                ),
            };
            self.register_function(&symbol, signature, body)?;
        }
        Ok(())
    }

    /// `Value Cls(args)`: allocate, stamp the type name, run the nearest initializer.
    fn emit_constructor(&mut self, class: &str) -> TranspileResult<()> {
        let initializer = self
            .classes
            .initializer(class)
            .map(|(owner, params)| (owner.to_string(), params.to_vec()));
        let params: Vec<String> = initializer
            .as_ref()
            .map(|(_, params)| params.iter().skip(1).cloned().collect())
            .unwrap_or_default();

        let object = self.local_name("obj", &params);
        let receiver = self.local_name("self", &params);
        let mut body = vec![
            format!("auto {object} = std::make_shared<Object>();"),
            format!("{object}->type_name = \"{class}\";"),
            format!("Value {receiver}({object});"),
        ];
        if let Some((owner, _)) = &initializer {
            let mut args = vec![receiver.clone()];
            args.extend(params.iter().map(|param| cpp_name(param).into_owned()));
            body.push(format!(
                "{}({});",
                method_symbol(owner, "__init__"),
                args.join(", ")
            ));
        }
        body.push(format!("return {receiver};"));

        let symbol = cpp_name(class).into_owned();
        let signature = format!("Value {symbol}({})", value_params(&params));
        self.register_function(&symbol, signature, body)
    }

    fn local_name(&mut self, preferred: &str, taken: &[String]) -> String {
        if taken.iter().any(|name| name == preferred) {
            self.temps.fresh()
        } else {
            preferred.to_string()
        }
    }
}
