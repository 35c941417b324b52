//! Names and literal spellings of the C++ runtime library the generated code links against.

use std::borrow::Cow;

use crate::ast::{BinaryOperator, CompareOperator};

/// Source identifiers that are reserved in C++ (or taken by the entry point).
const RESERVED_NAMES: &[&str] = &[
    "auto", "bool", "case", "catch", "char", "const", "default", "delete", "do", "double",
    "enum", "explicit", "extern", "float", "friend", "goto", "inline", "int", "long", "main",
    "namespace", "new", "operator", "private", "protected", "public", "register", "short",
    "signed", "sizeof", "static", "struct", "switch", "template", "this", "throw", "typedef",
    "typename", "union", "unsigned", "using", "virtual", "void", "volatile",
];

/// C++ spelling of a source identifier; reserved words get a trailing underscore.
pub fn cpp_name(name: &str) -> Cow<'_, str> {
    if RESERVED_NAMES.contains(&name) {
        Cow::Owned(format!("{name}_"))
    } else {
        Cow::Borrowed(name)
    }
}

pub fn binary_builtin(op: BinaryOperator) -> Option<&'static str> {
    let name = match op {
        BinaryOperator::Add => "add_builtin_func",
        BinaryOperator::Sub => "sub_builtin_func",
        BinaryOperator::Mult => "mul_builtin_func",
        BinaryOperator::Div => "div_builtin_func",
        BinaryOperator::FloorDiv => "floor_div_builtin_func",
        BinaryOperator::Mod => "mod_builtin_func",
        BinaryOperator::Pow => "pow_builtin_func",
        BinaryOperator::LShift => "lshift_builtin_func",
        BinaryOperator::RShift => "rshift_builtin_func",
        BinaryOperator::BitOr => "bit_or_builtin_func",
        BinaryOperator::BitAnd => "bit_and_builtin_func",
        BinaryOperator::BitXor => "bit_xor_builtin_func",
        BinaryOperator::MatMult => return None,
    };
    Some(name)
}

/// Builtin for a comparison and whether its result is negated with `not_op`.
pub fn compare_builtin(op: CompareOperator) -> (&'static str, bool) {
    match op {
        CompareOperator::Lt => ("lt", false),
        CompareOperator::LtE => ("le", false),
        CompareOperator::Gt => ("gt", false),
        CompareOperator::GtE => ("ge", false),
        CompareOperator::Eq => ("eq", false),
        CompareOperator::NotEq => ("ne", false),
        CompareOperator::Is => ("is_op", false),
        CompareOperator::IsNot => ("is_op", true),
        CompareOperator::In => ("in_op", false),
        CompareOperator::NotIn => ("in_op", true),
    }
}

pub fn callable_type(arity: usize) -> String {
    let params = vec!["Value"; arity].join(", ");
    format!("std::function<Value({params})>")
}

/// Declaration of a captured variable: a shared cell both the unit and its closures point at.
pub fn cell_declaration(type_name: &str, name: &str, init: &str) -> String {
    format!("std::shared_ptr<{type_name}> {name} = std::make_shared<{type_name}>({init});")
}

pub fn include_line(target: &str) -> String {
    if target.starts_with('<') {
        format!("#include {target}")
    } else {
        format!("#include \"{target}\"")
    }
}

pub fn escape_cpp_string(value: &str) -> String {
    let mut escaped = String::new();
    for ch in value.chars() {
        match ch {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            // Octal escapes stop after three digits, unlike \x.
            c if c.is_control() && (c as u32) < 0x80 => {
                escaped.push_str(&format!("\\{:03o}", c as u32));
            }
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn escape_cpp_bytes(bytes: &[u8]) -> String {
    let mut escaped = String::new();
    for &byte in bytes {
        match byte {
            b'\\' => escaped.push_str("\\\\"),
            b'"' => escaped.push_str("\\\""),
            b'\n' => escaped.push_str("\\n"),
            b'\r' => escaped.push_str("\\r"),
            b'\t' => escaped.push_str("\\t"),
            0x20..=0x7e => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:03o}")),
        }
    }
    escaped
}

/// Spells a float so C++ reads it as a double, never as an integer. `None` when the
/// value has no literal spelling (infinity or NaN).
pub fn format_float(value: f64) -> Option<String> {
    if !value.is_finite() {
        return None;
    }
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        Some(text)
    } else {
        Some(format!("{text}.0"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_quotes_and_control_characters() {
        assert_eq!(escape_cpp_string("say \"hi\"\n"), "say \\\"hi\\\"\\n");
        assert_eq!(escape_cpp_string("a\\b"), "a\\\\b");
        assert_eq!(escape_cpp_string("\x07bell"), "\\007bell");
        assert_eq!(escape_cpp_string("héllo"), "héllo");
    }

    #[test]
    fn escapes_non_printable_bytes() {
        assert_eq!(escape_cpp_bytes(&[0, b'A', 0xff]), "\\000A\\377");
    }

    #[test]
    fn floats_keep_a_fractional_part() {
        assert_eq!(format_float(2.5).as_deref(), Some("2.5"));
        assert_eq!(format_float(1.0).as_deref(), Some("1.0"));
        assert_eq!(format_float(1e300).as_deref(), Some("1e300"));
        assert_eq!(format_float(f64::INFINITY), None);
    }

    #[test]
    fn renames_reserved_identifiers() {
        assert_eq!(cpp_name("main"), "main_");
        assert_eq!(cpp_name("new"), "new_");
        assert_eq!(cpp_name("total"), "total");
    }

    #[test]
    fn formats_callable_types() {
        assert_eq!(callable_type(0), "std::function<Value()>");
        assert_eq!(callable_type(2), "std::function<Value(Value, Value)>");
    }

    #[test]
    fn declares_shared_cells() {
        assert_eq!(
            cell_declaration("Value", "total", "_tmp0"),
            "std::shared_ptr<Value> total = std::make_shared<Value>(_tmp0);"
        );
    }

    #[test]
    fn formats_includes() {
        assert_eq!(include_line("<iostream>"), "#include <iostream>");
        assert_eq!(
            include_line("library/value.hpp"),
            "#include \"library/value.hpp\""
        );
    }
}
