use super::cpp_runtime::include_line;
use crate::config::TranspileConfig;

/// One emitted C++ function: its signature and body lines relative to the body's indentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FunctionUnit {
    pub signature: String,
    pub body: Vec<String>,
}

pub(crate) fn render_module(
    config: &TranspileConfig,
    functions: &[FunctionUnit],
    main: &[String],
) -> String {
    let unit = " ".repeat(config.indent_width);
    let mut output = String::new();

    for include in &config.includes {
        push_line(&mut output, "", &include_line(include));
    }
    output.push('\n');

    for function in functions {
        push_line(&mut output, "", &format!("{};", function.signature));
    }
    if !functions.is_empty() {
        output.push('\n');
    }

    for function in functions {
        push_line(&mut output, "", &format!("{} {{", function.signature));
        for line in &function.body {
            push_line(&mut output, &unit, line);
        }
        push_line(&mut output, "", "}");
        output.push('\n');
    }

    push_line(&mut output, "", "int main() {");
    for line in main {
        push_line(&mut output, &unit, line);
    }
    push_line(&mut output, &unit, "return 0;");
    push_line(&mut output, "", "}");
    output
}

fn push_line(output: &mut String, indent: &str, line: &str) {
    output.push_str(indent);
    output.push_str(line);
    output.push('\n');
}
