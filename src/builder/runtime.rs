// src/builder/runtime.rs

//! Output templates: the per-module wrapper and the chunk bootstrap.

use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Name of the require function inside emitted bundles.
pub const REQUIRE_FN: &str = "__packwatch_require__";

/// Quote `s` as a JavaScript double-quoted string literal.
pub fn js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Wrap one module's source as a bundle entry.
///
/// `source` has already had its resolved `require` calls rewritten.
pub fn render_module(identifier: &str, source: &str) -> String {
    let mut out = String::with_capacity(source.len() + 96);
    let _ = writeln!(
        out,
        "/***/ {}: (function(module, exports, {REQUIRE_FN}) {{",
        js_string(identifier)
    );
    out.push_str(source);
    if !source.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("/***/ }),\n");
    out
}

/// Assemble a chunk: bootstrap plus the module table, modules ordered by
/// identifier.
pub fn render_chunk(entry: &str, modules: &BTreeMap<&str, &str>) -> String {
    let body_len: usize = modules.values().map(|m| m.len()).sum();
    let mut out = String::with_capacity(body_len + 512);
    out.push_str("(function(modules) {\n");
    out.push_str("  var installed = {};\n");
    let _ = writeln!(out, "  function {REQUIRE_FN}(id) {{");
    out.push_str("    if (installed[id]) return installed[id].exports;\n");
    out.push_str("    var module = installed[id] = { id: id, exports: {} };\n");
    let _ = writeln!(
        out,
        "    modules[id].call(module.exports, module, module.exports, {REQUIRE_FN});"
    );
    out.push_str("    return module.exports;\n");
    out.push_str("  }\n");
    let _ = writeln!(out, "  return {REQUIRE_FN}({});", js_string(entry));
    out.push_str("})({\n");
    for artifact in modules.values() {
        out.push_str(artifact);
    }
    out.push_str("});\n");
    out
}
