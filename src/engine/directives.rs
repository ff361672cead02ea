use crate::config::INTERRUPT_DIRECTIVE;
use std::path::Path;

/// Quote `text` as an sclang string literal.
pub fn sc_string_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for ch in text.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out.push('"');
    out
}

/// Line telling the engine to load and run the file at `path`.
pub fn load_directive(path: &Path) -> String {
    format!("{}.load;", sc_string_literal(&path.to_string_lossy()))
}

pub fn interrupt_directive() -> &'static str {
    INTERRUPT_DIRECTIVE
}

/// Wrap code in the single enclosing block the interpreter runs as one unit.
pub fn wrap_block(code: &str) -> String {
    let mut out = String::with_capacity(code.len() + 6);
    out.push_str("(\n");
    out.push_str(code);
    if !code.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(")\n");
    out
}
