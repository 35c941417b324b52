use indoc::indoc;

use super::classes::ClassTable;
use super::scope::{Declared, Scope};
use super::*;
use crate::parser::parse;

fn transpile(source: &str) -> String {
    let program = parse(source).expect("program should parse");
    Transpiler::default()
        .transpile(&program)
        .expect("program should transpile")
}

fn transpile_err(source: &str) -> TranspileError {
    let program = parse(source).expect("program should parse");
    Transpiler::default()
        .transpile(&program)
        .expect_err("program should be rejected")
}

/// Asserts that `expected` appear as whole (trimmed) lines of `output`, in order.
fn assert_lines_in_order(output: &str, expected: &[&str]) {
    let mut lines = output.lines().map(str::trim);
    for wanted in expected {
        assert!(
            lines.any(|line| line == *wanted),
            "expected line `{wanted}` (in order) in:\n{output}"
        );
    }
}

#[test]
fn transpiles_class_program_end_to_end() {
    let output = transpile(indoc! {r#"
        class Employee:
            def __init__(self, name):
                self.name = name

            def greet(self):
                return "Hello " + self.name

        e = Employee("Piet")
        print(e.greet())
    "#});

    assert_eq!(
        output,
        indoc! {r#"
            #include <iostream>
            #include <functional>
            #include "library/value.hpp"
            #include "library/range.hpp"
            #include "library/booleans.hpp"

            Value Employee____init__(Value self, Value name);
            Value Employee__greet(Value self);
            Value Employee____new__(Value cls_obj);
            Value Employee____repr__(Value self);
            Value Employee(Value name);

            Value Employee____init__(Value self, Value name) {
                self.asObject()->fields["name"] = name;
                return Value();
            }

            Value Employee__greet(Value self) {
                return add_builtin_func(Value("Hello "), self.asObject()->fields["name"]);
            }

            Value Employee____new__(Value cls_obj) {
                auto obj = std::make_shared<Object>();
                obj->type_name = "Employee";
                return Value(obj);
            }

            Value Employee____repr__(Value self) {
                return Value("<Employee object>");
            }

            Value Employee(Value name) {
                auto obj = std::make_shared<Object>();
                obj->type_name = "Employee";
                Value self(obj);
                Employee____init__(self, name);
                return self;
            }

            int main() {
                builtin_methods["Employee__new__"] = Employee____new__;
                builtin_methods["Employee__repr__"] = Employee____repr__;
                Value e = Employee(Value("Piet"));
                print(Employee__greet(e));
                return 0;
            }
        "#}
    );
}

#[test]
fn declares_each_name_once() {
    let output = transpile(indoc! {"
        def f():
            x = 1
            x = 2
            return x
    "});
    assert_lines_in_order(&output, &["Value x = Value(1);", "x = Value(2);", "return x;"]);
    assert_eq!(output.matches("Value x").count(), 1);
}

#[test]
fn predeclares_names_bound_inside_blocks() {
    let output = transpile(indoc! {"
        def f(c):
            if c:
                y = 1
            else:
                y = 2
            return y
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value y;",
            "if (py_truth(c)) {",
            "y = Value(1);",
            "} else {",
            "y = Value(2);",
            "}",
            "return y;",
        ],
    );
}

#[test]
fn dispatches_to_the_nearest_definition() {
    let output = transpile(indoc! {r#"
        class A:
            def who(self):
                return "A"

            def hello(self):
                return "hello"

        class B(A):
            def who(self):
                return "B"

        class C(B):
            pass

        c = C()
        c.who()
        c.hello()
    "#});
    assert_lines_in_order(&output, &["Value c = C();", "B__who(c);", "A__hello(c);"]);
    assert!(output.contains("Value C() {"));
    assert!(!output.contains("____init__"));
}

#[test]
fn unknown_methods_fall_back_to_field_calls() {
    let output = transpile(indoc! {"
        class A:
            pass

        a = A()
        a.missing(1)
        other.method()
    "});
    assert_lines_in_order(
        &output,
        &[
            "a.asObject()->fields[\"missing\"](Value(1));",
            "other.asObject()->fields[\"method\"]();",
        ],
    );
}

#[test]
fn constructs_subclasses_through_inherited_initializer() {
    let output = transpile(indoc! {"
        class Base:
            def __init__(self, n):
                self.n = n

        class Child(Base):
            def size(self):
                return self.n
    "});
    assert_lines_in_order(
        &output,
        &["Value Child(Value n) {", "Base____init__(self, n);", "return self;"],
    );
}

#[test]
fn resolves_super_calls() {
    let output = transpile(indoc! {"
        class A:
            def __init__(self, n):
                self.n = n

            def who(self):
                return 1

        class B(A):
            def __init__(self, n):
                super().__init__(n)

        class C(B):
            def who(self):
                return super(B, self).who()
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value B____init__(Value self, Value n) {",
            "A____init__(self, n);",
            "Value C__who(Value self) {",
            "return A__who(self);",
        ],
    );
}

#[test]
fn rejects_unresolvable_super_calls() {
    let error = transpile_err("super().run()\n");
    assert!(matches!(
        error,
        TranspileError::UnresolvedDispatch {
            reason: DispatchFailure::NoCurrentClass,
            line: 1,
            ..
        }
    ));

    let error = transpile_err(indoc! {"
        class A:
            def f(self):
                return super().f()
    "});
    assert!(matches!(
        error,
        TranspileError::UnresolvedDispatch {
            reason: DispatchFailure::NoBaseClass,
            line: 3,
            ..
        }
    ));

    let error = transpile_err(indoc! {"
        class A:
            pass

        class B(A):
            def f(self):
                return super().g()
    "});
    match error {
        TranspileError::UnresolvedDispatch {
            class,
            method,
            reason,
            ..
        } => {
            assert_eq!((class.as_str(), method.as_str()), ("B", "g"));
            assert_eq!(reason, DispatchFailure::MethodNotFound);
        }
        other => panic!("expected an unresolved dispatch, got {other:?}"),
    }
}

#[test]
fn hoists_comprehensions_before_their_statement() {
    let output = transpile(indoc! {"
        def f(xs):
            ys = [x * 2 for x in xs if x > 1]
            return ys
    "});
    assert!(output.contains(indoc! {"
        Value f(Value xs) {
            Value _tmp0 = Value(make_list({}));
            for (Value x : iterate(xs)) {
                if (!py_truth(gt(x, Value(1)))) continue;
                list_append(_tmp0, mul_builtin_func(x, Value(2)));
            }
            Value ys = _tmp0;
            return ys;
        }
    "}));
}

#[test]
fn comprehension_variables_do_not_leak() {
    let output = transpile(indoc! {"
        def f(xs):
            ys = [x for x in xs]
            x = 1
            return x
    "});
    assert_lines_in_order(&output, &["for (Value x : iterate(xs)) {", "Value x = Value(1);"]);
}

#[test]
fn unpacks_tuple_comprehension_targets() {
    let output = transpile(indoc! {"
        def f(pairs):
            return [a + b for a, b in pairs]
    "});
    assert_lines_in_order(
        &output,
        &[
            "for (Value _tmp1 : iterate(pairs)) {",
            "Value a = tuple_get(_tmp1, Value(0));",
            "Value b = tuple_get(_tmp1, Value(1));",
            "list_append(_tmp0, add_builtin_func(a, b));",
        ],
    );
}

#[test]
fn predeclares_walrus_targets_inside_comprehensions() {
    let output = transpile(indoc! {"
        def f(xs):
            ys = [(last := x) for x in xs]
            return last
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value last;",
            "Value _tmp0 = Value(make_list({}));",
            "last = x;",
            "list_append(_tmp0, last);",
            "return last;",
        ],
    );
}

#[test]
fn rejects_multiple_comprehension_clauses() {
    let error = transpile_err("pairs = [x for x in xs for y in ys]\n");
    assert!(error.to_string().contains("comprehension with 2 for clauses"));
}

#[test]
fn fills_in_slice_defaults() {
    let output = transpile(indoc! {"
        def f(seq):
            a = seq[:]
            b = seq[1:]
            c = seq[::2]
            return a
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value a = list_slice(seq, Value(0), list_len(seq), Value(1));",
            "Value b = list_slice(seq, Value(1), list_len(seq), Value(1));",
            "Value c = list_slice(seq, Value(0), list_len(seq), Value(2));",
        ],
    );
}

#[test]
fn destructures_tuples_through_one_temporary() {
    let output = transpile(indoc! {"
        def f(pair):
            a, b = pair
            return a
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value _tmp0 = pair;",
            "Value a = tuple_get(_tmp0, Value(0));",
            "Value b = tuple_get(_tmp0, Value(1));",
        ],
    );
    assert!(!output.contains("_tmp1"));
}

#[test]
fn picks_container_builtins_from_variable_classes() {
    let output = transpile(indoc! {r#"
        d = {"a": 1}
        d["a"] = 2
        d["a"] += 1
        xs = [1]
        xs.append(2)
        xs[0] = d.get("a")
        print(d["a"], xs[0])
    "#});
    assert_lines_in_order(
        &output,
        &[
            "Value d = Value(make_dict({{Value(\"a\"), Value(1)}}));",
            "dict_set(d, Value(\"a\"), Value(2));",
            "dict_set(d, Value(\"a\"), add_builtin_func(dict_get(d, Value(\"a\")), Value(1)));",
            "Value xs = Value(make_list({Value(1)}));",
            "list_append(xs, Value(2));",
            "list_set(xs, Value(0), dict_get(d, Value(\"a\")));",
            "print(dict_get(d, Value(\"a\")), list_get(xs, Value(0)));",
        ],
    );
}

#[test]
fn normalizes_range_loops() {
    let output = transpile(indoc! {"
        for i in range(3):
            print(i)
        for j in range(1, 10, 2):
            print(j)
        for k in items:
            print(k)
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value i;",
            "for (Value _tmp0 : range(Value(0), Value(3), Value(1))) {",
            "i = _tmp0;",
            "print(i);",
            "}",
            "Value j;",
            "for (Value _tmp1 : range(Value(1), Value(10), Value(2))) {",
            "Value k;",
            "for (Value _tmp2 : iterate(items)) {",
        ],
    );
}

#[test]
fn rejects_range_with_too_many_arguments() {
    let error = transpile_err("for i in range(1, 2, 3, 4):\n    pass\n");
    assert!(error.to_string().contains("range() with 4 arguments"));
}

#[test]
fn folds_boolean_and_comparison_chains() {
    let output = transpile("ok = a < b < c and not d or e is not None\n");
    assert_lines_in_order(
        &output,
        &["Value ok = or_op(and_op(and_op(lt(a, b), lt(b, c)), not_op(d)), not_op(is_op(e, Value())));"],
    );
}

#[test]
fn chained_comparisons_evaluate_each_operand_once() {
    let output = transpile(indoc! {"
        def f():
            return 1

        x = 0 < f() < 2
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value _tmp0 = f();",
            "Value x = and_op(lt(Value(0), _tmp0), lt(_tmp0, Value(2)));",
        ],
    );
    assert!(!output.contains("f())"), "f() evaluated twice:\n{output}");
}

#[test]
fn comprehensions_iterate_ranges_directly() {
    let output = transpile("squares = [n * n for n in range(4)]\n");
    assert_lines_in_order(
        &output,
        &["for (Value n : range(Value(0), Value(4), Value(1))) {"],
    );
    assert!(!output.contains("iterate(range("));
}

#[test]
fn temporaries_never_reuse_source_names() {
    let output = transpile(indoc! {"
        _tmp0 = 5
        y = [a for a in [1]]
    "});
    assert_lines_in_order(
        &output,
        &[
            "Value _tmp0 = Value(5);",
            "Value _tmp1 = Value(make_list({}));",
            "Value y = _tmp1;",
        ],
    );
    assert_eq!(output.matches("Value _tmp0 =").count(), 1);
}

#[test]
fn open_slices_evaluate_the_object_once() {
    let output = transpile("tail = load()[1:]\n");
    assert_lines_in_order(
        &output,
        &[
            "Value _tmp0 = load();",
            "Value tail = list_slice(_tmp0, Value(1), list_len(_tmp0), Value(1));",
        ],
    );
}

#[test]
fn rejects_literals_the_runtime_cannot_hold() {
    for (source, construct) in [
        ("x = 99999999999\n", "integer literal 99999999999 outside the 32-bit range"),
        ("x = 1e999\n", "float literal that overflows to infinity"),
    ] {
        let error = transpile_err(source);
        assert!(
            error.to_string().contains(construct),
            "`{source}` should fail with `{construct}`, got `{error}`"
        );
    }
}

#[test]
fn moves_elif_hoists_into_a_nested_if() {
    let output = transpile(indoc! {"
        def f(x, xs):
            if x:
                return 1
            elif [y for y in xs]:
                return 2
            else:
                return 3
    "});
    assert!(output.contains(indoc! {"
        Value f(Value x, Value xs) {
            if (py_truth(x)) {
                return Value(1);
            } else {
                Value _tmp0 = Value(make_list({}));
                for (Value y : iterate(xs)) {
                    list_append(_tmp0, y);
                }
                if (py_truth(_tmp0)) {
                    return Value(2);
                } else {
                    return Value(3);
                }
            }
    "}));
}

#[test]
fn reruns_while_condition_hoists_every_iteration() {
    let output = transpile(indoc! {"
        def f(xs):
            while len([x for x in xs if x]) > 0:
                xs = rest(xs)
    "});
    assert!(output.contains(indoc! {"
        Value f(Value xs) {
            while (true) {
                Value _tmp0 = Value(make_list({}));
                for (Value x : iterate(xs)) {
                    if (!py_truth(x)) continue;
                    list_append(_tmp0, x);
                }
                if (!py_truth(gt(len(_tmp0), Value(0)))) break;
                xs = rest(xs);
            }
    "}));
}

#[test]
fn lowers_try_with_else_and_finally() {
    let output = transpile(indoc! {"
        def f(x):
            try:
                risky(x)
            except ValueError as e:
                log(e)
            except:
                log(x)
            else:
                ok()
            finally:
                done()
    "});
    assert!(output.contains(indoc! {"
        Value f(Value x) {
            try {
                Value _tmp0 = Value(false);
                try {
                    risky(x);
                    _tmp0 = Value(true);
                } catch (Value& e) {  // except ValueError
                    log(e);
                } catch (const std::exception& _tmp1) {  // except ValueError
                    Value e = Value(_tmp1.what());
                    log(e);
                } catch (...) {
                    log(x);
                }
                // else
                if (py_truth(_tmp0)) {
                    ok();
                }
            } catch (...) {
                done();
                throw;
            }
            // finally
            done();
            return Value();
    "}));
}

#[test]
fn typed_handlers_also_catch_runtime_errors() {
    let output = transpile(indoc! {r#"
        d = {"a": 1}
        try:
            v = d["k"]
        except KeyError:
            v = 0
        print(v)
    "#});
    assert!(output.contains(indoc! {r#"
        int main() {
            Value d = Value(make_dict({{Value("a"), Value(1)}}));
            Value v;
            try {
                v = dict_get(d, Value("k"));
            } catch (Value& _tmp0) {  // except KeyError
                v = Value(0);
            } catch (const std::exception& _tmp1) {  // except KeyError
                Value _tmp0 = Value(_tmp1.what());
                v = Value(0);
            }
    "#}));
}

#[test]
fn handler_names_stay_inside_their_handler() {
    let output = transpile(indoc! {"
        def f():
            try:
                risky()
            except KeyError as e:
                pass
            e = 1
            return e
    "});
    assert_lines_in_order(
        &output,
        &["} catch (Value& e) {  // except KeyError", ";", "Value e = Value(1);"],
    );
}

#[test]
fn lowers_raise_and_assert() {
    let output = transpile(indoc! {r#"
        def f(x):
            assert x
            assert x > 0, "negative"
            raise
    "#});
    assert_lines_in_order(
        &output,
        &[
            "if (!py_truth(x)) { throw Value(\"AssertionError\"); }",
            "if (!py_truth(gt(x, Value(0)))) { throw Value(\"negative\"); }",
            "throw Value(\"Exception\");",
        ],
    );
    assert!(!output.contains("return Value();"));
}

#[test]
fn compiles_closures_that_write_through_nonlocal() {
    let output = transpile(indoc! {"
        def outer():
            count = 0
            def bump():
                nonlocal count
                count += 1
                return count
            bump()
            return count
    "});
    assert!(output.contains(indoc! {"
        Value outer() {
            std::shared_ptr<Value> count = std::make_shared<Value>();
            (*count) = Value(0);
            std::function<Value()> bump = [=]() -> Value {
                (*count) = add_builtin_func((*count), Value(1));
                return (*count);
            };
            bump();
            return (*count);
    "}));
}

#[test]
fn captured_parameters_move_into_cells() {
    let output = transpile(indoc! {"
        def make_adder(k):
            return lambda x: x + k
    "});
    assert!(output.contains(indoc! {"
        Value make_adder(Value _tmp0) {
            std::shared_ptr<Value> k = std::make_shared<Value>(_tmp0);
            return [=](Value x) -> Value { return add_builtin_func(x, (*k)); };
    "}));
}

#[test]
fn closures_see_locals_bound_after_the_def() {
    let output = transpile(indoc! {"
        def outer():
            def inner():
                return later
            later = 1
            return inner()
    "});
    assert!(output.contains(indoc! {"
        Value outer() {
            std::shared_ptr<Value> later = std::make_shared<Value>();
            std::function<Value()> inner = [=]() -> Value {
                return (*later);
            };
            (*later) = Value(1);
            return inner();
    "}));
}

#[test]
fn recursive_nested_defs_call_through_their_cell() {
    let output = transpile(indoc! {"
        def outer(n):
            def fact(k):
                if k < 2:
                    return 1
                return k * fact(k - 1)
            return fact(n)
    "});
    assert_lines_in_order(
        &output,
        &[
            "std::shared_ptr<std::function<Value(Value)>> fact = std::make_shared<std::function<Value(Value)>>();",
            "(*fact) = [=](Value k) -> Value {",
            "return mul_builtin_func(k, (*fact)(sub_builtin_func(k, Value(1))));",
            "};",
            "return (*fact)(n);",
        ],
    );
}

#[test]
fn closure_locals_shadow_enclosing_cells() {
    let output = transpile(indoc! {"
        def outer():
            x = 1
            def reader():
                return x
            def writer():
                x = 2
                return x
            return reader() + writer()
    "});
    assert_lines_in_order(
        &output,
        &[
            "std::shared_ptr<Value> x = std::make_shared<Value>();",
            "return (*x);",
            "std::function<Value()> writer = [=]() -> Value {",
            "Value x = Value(2);",
            "return x;",
        ],
    );
}

#[test]
fn binds_lambdas_as_callables() {
    let output = transpile(indoc! {"
        def f():
            square = lambda x: x * x
            return square(3)
    "});
    assert_lines_in_order(
        &output,
        &[
            "std::function<Value(Value)> square = [=](Value x) -> Value { return mul_builtin_func(x, x); };",
            "return square(Value(3));",
        ],
    );
}

#[test]
fn renames_reserved_identifiers() {
    let output = transpile(indoc! {"
        def main():
            new = 1
            return new

        main()
    "});
    assert_lines_in_order(
        &output,
        &["Value main_() {", "Value new_ = Value(1);", "return new_;", "main_();"],
    );
}

#[test]
fn emits_literals() {
    let output = transpile(indoc! {r#"
        values = (1, 2.5, "a\"b", b"\x00A", True, None)
    "#});
    assert_lines_in_order(
        &output,
        &["Value values = Value(make_tuple({Value(1), Value(2.5), Value(\"a\\\"b\"), Value(make_bytes(\"\\000A\", 2)), Value(true), Value()}));"],
    );
}

#[test]
fn drops_docstrings() {
    let output = transpile(indoc! {r#"
        def f():
            """Does nothing."""
            pass
    "#});
    assert_lines_in_order(&output, &["Value f() {", ";", "return Value();"]);
    assert!(!output.contains("Does nothing"));
}

#[test]
fn yield_aborts_the_whole_compilation() {
    let error = transpile_err(indoc! {"
        def ok():
            return 1

        def gen():
            yield 1
    "});
    match error {
        TranspileError::UnsupportedConstruct {
            construct, line, ..
        } => {
            assert_eq!(construct, "yield expression");
            assert_eq!(line, 5);
        }
        other => panic!("expected an unsupported construct, got {other:?}"),
    }
}

#[test]
fn rejects_unsupported_operators() {
    let error = transpile_err("def f(a, b):\n    return a @ b\n");
    assert!(matches!(
        error,
        TranspileError::UnsupportedOperator {
            position: OperatorPosition::Binary,
            line: 2,
            ..
        }
    ));
    assert!(error.to_string().contains('@'));
    assert_eq!(error.line(), 2);
}

#[test]
fn rejects_unsupported_statements() {
    for (source, construct) in [
        ("return 1\n", "return outside function"),
        ("f(x=1)\n", "keyword arguments"),
        ("def f():\n    global x\n", "global statement"),
        ("xs[1:2] = ys\n", "slice assignment"),
        ("while x:\n    pass\nelse:\n    pass\n", "while loop with an else clause"),
        ("def f(a=1):\n    pass\n", "default value for parameter `a`"),
        ("def f():\n    n += 1\n", "augmented assignment to unbound name `n`"),
        ("def f():\n    class Inner:\n        pass\n", "class definition below module level"),
    ] {
        let error = transpile_err(source);
        assert!(
            error.to_string().contains(construct),
            "`{source}` should fail with `{construct}`, got `{error}`"
        );
    }
}

#[test]
fn restores_scope_after_a_failed_nested_unit() {
    let program = parse(indoc! {"
        def g():
            y = 1
            yield y
    "})
    .expect("program should parse");
    let config = TranspileConfig::default();
    let classes = ClassTable::build(&program).expect("no classes to reject");
    let mut codegen = Codegen::new(&config, classes);
    codegen.scope.env.declare("outer", Declared::Value);
    codegen.hoist("Value outer;".to_string());
    let before: Scope = codegen.scope.clone();

    assert!(codegen.translate_statement(&program.statements[0]).is_err());
    assert_eq!(codegen.scope, before);
    assert!(codegen.functions.is_empty());
}

#[test]
fn restores_scope_after_a_failed_method() {
    let program = parse(indoc! {"
        class A:
            def f(self):
                return self @ self
    "})
    .expect("program should parse");
    let config = TranspileConfig::default();
    let classes = ClassTable::build(&program).expect("table should build");
    let mut codegen = Codegen::new(&config, classes);
    let before = codegen.scope.clone();

    assert!(codegen.compile_program(&program).is_err());
    assert_eq!(codegen.scope, before);
}
