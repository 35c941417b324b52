use tracing::trace;

use super::cpp_runtime::{
    binary_builtin, compare_builtin, cpp_name, escape_cpp_bytes, escape_cpp_string, format_float,
};
use super::scope::{Declared, VarClass};
use super::{Codegen, DispatchFailure, OperatorPosition, TranspileResult};
use crate::ast::{
    AssignTarget, BoolOperator, CompareOperator, ComprehensionClause, ComprehensionKind,
    Expression, Keyword, UnaryOperator,
};
use crate::builtins::BuiltinFunction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExprKind {
    Value,
    Callable { arity: usize },
}

impl ExprKind {
    pub(crate) fn declared(self) -> Declared {
        match self {
            Self::Value => Declared::Value,
            Self::Callable { arity } => Declared::Callable { arity },
        }
    }
}

/// A lowered expression: C++ text plus the kind of value it produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Lowered {
    pub code: String,
    pub kind: ExprKind,
}

impl Lowered {
    pub(crate) fn value(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            kind: ExprKind::Value,
        }
    }
}

impl Codegen<'_> {
    pub(super) fn lower_expr(&mut self, expr: &Expression) -> TranspileResult<Lowered> {
        let code = match expr {
            Expression::Integer(value) => {
                if i32::try_from(*value).is_err() {
                    return Err(self.unsupported(format!(
                        "integer literal {value} outside the 32-bit range"
                    )));
                }
                format!("Value({value})")
            }
            Expression::Float(value) => match format_float(*value) {
                Some(text) => format!("Value({text})"),
                None => return Err(self.unsupported("float literal that overflows to infinity")),
            },
            Expression::String(value) => format!("Value(\"{}\")", escape_cpp_string(value)),
            Expression::Bytes(value) => format!(
                "Value(make_bytes(\"{}\", {}))",
                escape_cpp_bytes(value),
                value.len()
            ),
            Expression::Boolean(value) => format!("Value({value})"),
            Expression::None => "Value()".to_string(),
            Expression::Identifier(name) => {
                let kind = match self.scope.env.get(name) {
                    Some(Declared::Callable { arity }) => ExprKind::Callable { arity },
                    _ => ExprKind::Value,
                };
                return Ok(Lowered {
                    code: self.name_ref(name),
                    kind,
                });
            }
            Expression::List(elements) => {
                format!("Value(make_list({{{}}}))", self.lower_args(elements)?.join(", "))
            }
            Expression::Tuple(elements) => {
                format!("Value(make_tuple({{{}}}))", self.lower_args(elements)?.join(", "))
            }
            Expression::Dict(entries) => {
                let mut items = Vec::with_capacity(entries.len());
                for (key, value) in entries {
                    let key = self.lower_expr(key)?.code;
                    let value = self.lower_expr(value)?.code;
                    items.push(format!("{{{key}, {value}}}"));
                }
                format!("Value(make_dict({{{}}}))", items.join(", "))
            }
            Expression::Attribute { object, name } => {
                let object = self.lower_expr(object)?.code;
                format!("{object}.asObject()->fields[\"{name}\"]")
            }
            Expression::Index { object, index } => {
                let is_dict = self.is_dict_name(object);
                let object = self.lower_expr(object)?.code;
                let index = self.lower_expr(index)?.code;
                if is_dict {
                    format!("dict_get({object}, {index})")
                } else {
                    format!("list_get({object}, {index})")
                }
            }
            Expression::Slice {
                object,
                lower,
                upper,
                step,
            } => {
                let object = if upper.is_none() {
                    self.lower_pinned(object)?
                } else {
                    self.lower_expr(object)?.code
                };
                let lower = self.lower_optional(lower.as_deref(), "Value(0)".to_string())?;
                let upper = self.lower_optional(upper.as_deref(), format!("list_len({object})"))?;
                let step = self.lower_optional(step.as_deref(), "Value(1)".to_string())?;
                format!("list_slice({object}, {lower}, {upper}, {step})")
            }
            Expression::BinaryOp { left, op, right } => {
                let Some(builtin) = binary_builtin(*op) else {
                    return Err(self.unsupported_operator(op.symbol(), OperatorPosition::Binary));
                };
                let left = self.lower_expr(left)?.code;
                let right = self.lower_expr(right)?.code;
                format!("{builtin}({left}, {right})")
            }
            Expression::UnaryOp { op, operand } => {
                let operand = self.lower_expr(operand)?.code;
                match op {
                    UnaryOperator::Neg => format!("neg_builtin_func({operand})"),
                    UnaryOperator::Not => format!("not_op({operand})"),
                    UnaryOperator::Invert => format!("invert_builtin_func({operand})"),
                    UnaryOperator::Pos => operand,
                }
            }
            Expression::BoolOp { op, values } => self.lower_bool_op(*op, values)?,
            Expression::Compare { left, comparisons } => self.lower_compare(left, comparisons)?,
            Expression::Call {
                callee,
                args,
                keywords,
            } => self.lower_call(callee, args, keywords)?,
            Expression::Conditional {
                condition,
                body,
                orelse,
            } => {
                let condition = self.lower_expr(condition)?.code;
                let body = self.lower_expr(body)?.code;
                let orelse = self.lower_expr(orelse)?.code;
                format!("(py_truth({condition}) ? {body} : {orelse})")
            }
            Expression::Lambda { params, body } => return self.lower_lambda(params, body),
            Expression::Comprehension {
                kind,
                element,
                clauses,
            } => self.lower_comprehension(*kind, element, clauses)?,
            Expression::NamedExpr { name, value } => return self.lower_named_expr(name, value),
            Expression::Yield(_) => return Err(self.unsupported("yield expression")),
        };
        Ok(Lowered::value(code))
    }

    pub(super) fn lower_args(&mut self, args: &[Expression]) -> TranspileResult<Vec<String>> {
        args.iter()
            .map(|arg| self.lower_expr(arg).map(|lowered| lowered.code))
            .collect()
    }

    fn lower_optional(
        &mut self,
        expr: Option<&Expression>,
        default: String,
    ) -> TranspileResult<String> {
        match expr {
            Some(expr) => Ok(self.lower_expr(expr)?.code),
            None => Ok(default),
        }
    }

    /// `a and b and c` becomes `and_op(a, and_op(b, c))`.
    fn lower_bool_op(&mut self, op: BoolOperator, values: &[Expression]) -> TranspileResult<String> {
        let builtin = match op {
            BoolOperator::And => "and_op",
            BoolOperator::Or => "or_op",
        };
        let lowered = self.lower_args(values)?;
        Ok(fold_right(builtin, lowered))
    }

    /// `a < b < c` becomes `and_op(lt(a, b), lt(b, c))`. In a chain, every operand but
    /// the last is pinned to a temporary so it is evaluated once and in source order.
    fn lower_compare(
        &mut self,
        left: &Expression,
        comparisons: &[(CompareOperator, Expression)],
    ) -> TranspileResult<String> {
        let chained = comparisons.len() > 1;
        let mut previous = if chained {
            self.lower_pinned(left)?
        } else {
            self.lower_expr(left)?.code
        };
        let mut pairs = Vec::with_capacity(comparisons.len());
        for (position, (op, right)) in comparisons.iter().enumerate() {
            let right = if position + 1 < comparisons.len() {
                self.lower_pinned(right)?
            } else {
                self.lower_expr(right)?.code
            };
            let (builtin, negated) = compare_builtin(*op);
            let call = format!("{builtin}({previous}, {right})");
            pairs.push(if negated {
                format!("not_op({call})")
            } else {
                call
            });
            previous = right;
        }
        Ok(fold_right("and_op", pairs))
    }

    fn lower_call(
        &mut self,
        callee: &Expression,
        args: &[Expression],
        keywords: &[Keyword],
    ) -> TranspileResult<String> {
        if !keywords.is_empty() {
            return Err(self.unsupported("keyword arguments"));
        }

        match callee {
            Expression::Attribute { object, name } if name == "join" && args.len() == 1 => {
                let object = self.lower_expr(object)?.code;
                let arg = self.lower_expr(&args[0])?.code;
                Ok(format!("str_join({object}, {arg})"))
            }
            Expression::Attribute { object, name } if name == "get" && matches!(args.len(), 1 | 2) => {
                let object = self.lower_expr(object)?.code;
                let args = self.lower_args(args)?;
                Ok(format!("dict_get({object}, {})", args.join(", ")))
            }
            Expression::Attribute { object, name } => match object.as_ref() {
                Expression::Call {
                    callee: super_callee,
                    args: super_args,
                    keywords: super_keywords,
                } if is_builtin(super_callee, BuiltinFunction::Super) => {
                    if !super_keywords.is_empty() {
                        return Err(self.unsupported("keyword arguments to super()"));
                    }
                    self.lower_super_call(super_args, name, args)
                }
                _ => self.lower_method_call(object, name, args),
            },
            Expression::Identifier(name) => match BuiltinFunction::from_name(name) {
                Some(BuiltinFunction::Range) => self.lower_range(args),
                Some(BuiltinFunction::Super) => Err(self.unsupported("super() without a method call")),
                _ => {
                    let callee = self.name_ref(name);
                    let args = self.lower_args(args)?;
                    Ok(format!("{callee}({})", args.join(", ")))
                }
            },
            other => {
                let callee = self.lower_expr(other)?.code;
                let args = self.lower_args(args)?;
                Ok(format!("{callee}({})", args.join(", ")))
            }
        }
    }

    /// `range` with its optional bounds filled in.
    pub(super) fn lower_range(&mut self, args: &[Expression]) -> TranspileResult<String> {
        let mut lowered = self.lower_args(args)?;
        let (start, end, step) = match lowered.len() {
            1 => ("Value(0)".to_string(), lowered.remove(0), "Value(1)".to_string()),
            2 => {
                let end = lowered.remove(1);
                (lowered.remove(0), end, "Value(1)".to_string())
            }
            3 => {
                let step = lowered.remove(2);
                let end = lowered.remove(1);
                (lowered.remove(0), end, step)
            }
            count => {
                return Err(self.unsupported(format!(
                    "{}() with {count} arguments",
                    BuiltinFunction::Range.name()
                )));
            }
        };
        Ok(format!("range({start}, {end}, {step})"))
    }

    fn lower_super_call(
        &mut self,
        super_args: &[Expression],
        method: &str,
        args: &[Expression],
    ) -> TranspileResult<String> {
        let (class, receiver) = match super_args {
            [] => {
                let Some(context) = self.scope.class_context.clone() else {
                    return Err(self.unresolved("<module>", method, DispatchFailure::NoCurrentClass));
                };
                (context.class, self.name_ref(&context.receiver))
            }
            [Expression::Identifier(class), receiver] => {
                (class.clone(), self.lower_expr(receiver)?.code)
            }
            [_, _] => return Err(self.unsupported("super() with a non-name class argument")),
            _ => {
                return Err(self.unsupported(format!(
                    "super() with {} arguments",
                    super_args.len()
                )));
            }
        };

        let Some(base) = self.classes.base(&class).map(str::to_string) else {
            return Err(self.unresolved(&class, method, DispatchFailure::NoBaseClass));
        };
        let Some(owner) = self.classes.resolve(&base, method).map(str::to_string) else {
            return Err(self.unresolved(&class, method, DispatchFailure::MethodNotFound));
        };
        trace!(%class, method, %owner, "resolved super() call");

        let mut call_args = vec![receiver];
        call_args.extend(self.lower_args(args)?);
        Ok(format!(
            "{}({})",
            super::classes::method_symbol(&owner, method),
            call_args.join(", ")
        ))
    }

    fn lower_method_call(
        &mut self,
        object: &Expression,
        method: &str,
        args: &[Expression],
    ) -> TranspileResult<String> {
        let receiver_class = self.receiver_class(object);
        let receiver = self.lower_expr(object)?.code;
        let args = self.lower_args(args)?;

        match receiver_class {
            Some(VarClass::List) if method == "append" && args.len() == 1 => {
                return Ok(format!("list_append({receiver}, {})", args[0]));
            }
            Some(VarClass::Instance(class)) => {
                if let Some(owner) = self.classes.resolve(&class, method) {
                    trace!(%class, method, owner, "resolved method call");
                    let mut call_args = vec![receiver];
                    call_args.extend(args);
                    return Ok(format!(
                        "{}({})",
                        super::classes::method_symbol(owner, method),
                        call_args.join(", ")
                    ));
                }
                trace!(%class, method, "method not in class chain, using field call");
            }
            _ => {}
        }
        Ok(format!(
            "{receiver}.asObject()->fields[\"{method}\"]({})",
            args.join(", ")
        ))
    }

    fn lower_named_expr(&mut self, name: &str, value: &Expression) -> TranspileResult<Lowered> {
        let lowered = self.lower_expr(value)?;
        let class = self.classify(value);
        self.scope.var_classes.record(name, class);
        let line = self.bind_name(name, &lowered);
        self.hoist(line);
        Ok(Lowered {
            code: self.name_ref(name),
            kind: lowered.kind,
        })
    }

    /// Emits the collection loop ahead of the current statement and yields the collection.
    fn lower_comprehension(
        &mut self,
        kind: ComprehensionKind,
        element: &Expression,
        clauses: &[ComprehensionClause],
    ) -> TranspileResult<String> {
        let [clause] = clauses else {
            return Err(self.unsupported(format!(
                "comprehension with {} for clauses",
                clauses.len()
            )));
        };
        let source = self.lower_iterable(&clause.iterable)?;
        let result = self.temps.fresh();

        let names = target_names(&clause.target);
        let shadowed = self.scope.shadow(&names);
        let body = self.comprehension_body(clause, element, &source, &result);
        self.scope.unshadow(shadowed);
        let (header, body) = body?;

        trace!(?kind, temp = %result, "lowering comprehension");
        self.hoist(format!("Value {result} = Value(make_list({{}}));"));
        self.hoist(header);
        for line in self.indent(body) {
            self.hoist(line);
        }
        self.hoist("}".to_string());
        Ok(result)
    }

    fn comprehension_body(
        &mut self,
        clause: &ComprehensionClause,
        element: &Expression,
        source: &str,
        result: &str,
    ) -> TranspileResult<(String, Vec<String>)> {
        let mut body = Vec::new();
        let header = match &clause.target {
            AssignTarget::Name(name) => {
                self.scope.env.declare(name, Declared::Value);
                format!("for (Value {} : {source}) {{", cpp_name(name))
            }
            target @ AssignTarget::Tuple(_) => {
                let item = self.temps.fresh();
                self.bind_loop_target(target, &item, &mut body)?;
                format!("for (Value {item} : {source}) {{")
            }
            _ => return Err(self.unsupported("comprehension target that is not a name or tuple")),
        };

        for condition in &clause.conditions {
            let (hoisted, condition) = self.capture_hoisted(|this| this.lower_expr(condition))?;
            body.extend(hoisted);
            body.push(format!("if (!py_truth({})) continue;", condition.code));
        }
        let (hoisted, element) = self.capture_hoisted(|this| this.lower_expr(element))?;
        body.extend(hoisted);
        body.push(format!("list_append({result}, {});", element.code));
        Ok((header, body))
    }

    /// Assignment-site classification of a right-hand side.
    pub(super) fn classify(&self, expr: &Expression) -> Option<VarClass> {
        match expr {
            Expression::List(_) | Expression::Comprehension { .. } => Some(VarClass::List),
            Expression::Dict(_) => Some(VarClass::Dict),
            Expression::Call { callee, .. } => match callee.as_ref() {
                Expression::Identifier(name) if self.classes.contains(name) => {
                    Some(VarClass::Instance(name.clone()))
                }
                Expression::Identifier(name) => match BuiltinFunction::from_name(name) {
                    Some(BuiltinFunction::List) => Some(VarClass::List),
                    Some(BuiltinFunction::Dict) => Some(VarClass::Dict),
                    _ => None,
                },
                _ => None,
            },
            _ => None,
        }
    }

    fn receiver_class(&self, object: &Expression) -> Option<VarClass> {
        match object {
            Expression::Identifier(name) => self.scope.var_classes.get(name).cloned(),
            other => self.classify(other),
        }
    }

    pub(super) fn is_dict_name(&self, object: &Expression) -> bool {
        matches!(
            object,
            Expression::Identifier(name)
                if self.scope.var_classes.get(name) == Some(&VarClass::Dict)
        )
    }

    /// Declares `name` on first binding, otherwise reassigns it.
    pub(super) fn bind_name(&mut self, name: &str, lowered: &Lowered) -> String {
        let declared = lowered.kind.declared();
        if self.scope.env.declare(name, declared) {
            format!("{} {} = {};", declared.type_name(), cpp_name(name), lowered.code)
        } else {
            format!("{} = {};", self.name_ref(name), lowered.code)
        }
    }

    /// C++ expression for a source name; captured variables are read through their cell.
    pub(super) fn name_ref(&self, name: &str) -> String {
        let spelled = cpp_name(name);
        if self.scope.cells.contains(name) {
            format!("(*{spelled})")
        } else {
            spelled.into_owned()
        }
    }

    /// Lowers `expr` and, unless it is a name or a literal, pins the result to a hoisted
    /// temporary so the value can be reused without evaluating `expr` again.
    fn lower_pinned(&mut self, expr: &Expression) -> TranspileResult<String> {
        let code = self.lower_expr(expr)?.code;
        if is_atom(expr) {
            return Ok(code);
        }
        let temp = self.temps.fresh();
        self.hoist(format!("Value {temp} = {code};"));
        Ok(temp)
    }

    /// The range of a `for` loop or comprehension: `range(...)` calls are iterated
    /// directly, anything else through `iterate`.
    pub(super) fn lower_iterable(&mut self, iterable: &Expression) -> TranspileResult<String> {
        let lowered = self.lower_expr(iterable)?.code;
        if is_builtin_call(iterable, BuiltinFunction::Range) {
            Ok(lowered)
        } else {
            Ok(format!("iterate({lowered})"))
        }
    }
}

fn fold_right(builtin: &str, mut operands: Vec<String>) -> String {
    let Some(mut folded) = operands.pop() else {
        return "Value()".to_string();
    };
    while let Some(operand) = operands.pop() {
        folded = format!("{builtin}({operand}, {folded})");
    }
    folded
}

fn is_builtin(expr: &Expression, builtin: BuiltinFunction) -> bool {
    matches!(expr, Expression::Identifier(name) if BuiltinFunction::from_name(name) == Some(builtin))
}

fn is_builtin_call(expr: &Expression, builtin: BuiltinFunction) -> bool {
    matches!(expr, Expression::Call { callee, .. } if is_builtin(callee, builtin))
}

fn is_atom(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Identifier(_)
            | Expression::Integer(_)
            | Expression::Float(_)
            | Expression::String(_)
            | Expression::Bytes(_)
            | Expression::Boolean(_)
            | Expression::None
    )
}

pub(super) fn target_names(target: &AssignTarget) -> Vec<String> {
    match target {
        AssignTarget::Name(name) => vec![name.clone()],
        AssignTarget::Tuple(targets) => targets.iter().flat_map(target_names).collect(),
        _ => Vec::new(),
    }
}
