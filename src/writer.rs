//! Source rendering.
//!
//! The decompiler produces indent-tagged statement lines; this module turns
//! them into script source text. With line alignment enabled, blank lines
//! are inserted so statements land on the line the compiler recorded for
//! them, which keeps diffs against an original source file readable.

use crate::bytecode::{GlobalInit, Payload, ScriptKind, SlotDecl};
use crate::decompiler::format_float;

/// One printable statement line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub indent: usize,
    pub text: String,
    /// Source line the originating instruction carried, 1-based.
    pub source_line: Option<u32>,
}

/// A decompiled script ready for rendering.
#[derive(Debug, Clone)]
pub struct ScriptSource {
    pub name: String,
    pub kind: ScriptKind,
    pub params: Vec<String>,
    /// Local declarations (parameters excluded).
    pub locals: Vec<SlotDecl>,
    pub lines: Vec<SourceLine>,
}

/// Rendering options.
#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Insert blank lines so statements align to recorded source lines.
    pub align_lines: bool,
    pub indent_unit: &'static str,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            align_lines: false,
            indent_unit: "    ",
        }
    }
}

/// Render one global initializer declaration.
pub fn render_global(global: &GlobalInit) -> String {
    let value = match global.payload {
        Payload::Float(v) => format_float(v),
        Payload::Int(v) => v.to_string(),
        Payload::Bool(v) => v.to_string(),
        Payload::None => "0".to_string(),
    };
    format!("global {} = {}", global.name, value)
}

/// Render one script to source text.
pub fn render_script(src: &ScriptSource, opts: &WriterOptions) -> String {
    let mut out = String::new();
    let mut emitted = 0usize;

    let header = if src.params.is_empty() {
        format!("begin {} {}", src.kind.keyword(), src.name)
    } else {
        format!(
            "begin {} {}({})",
            src.kind.keyword(),
            src.name,
            src.params.join(", ")
        )
    };
    push_line(&mut out, &header, &mut emitted);

    for local in &src.locals {
        let decl = if local.size > 1 {
            format!("{}local {}[{}]", opts.indent_unit, local.name, local.size)
        } else {
            format!("{}local {}", opts.indent_unit, local.name)
        };
        push_line(&mut out, &decl, &mut emitted);
    }

    for line in &src.lines {
        if opts.align_lines {
            if let Some(target) = line.source_line {
                while (emitted as u32) + 1 < target {
                    push_line(&mut out, "", &mut emitted);
                }
            }
        }
        let text = format!("{}{}", opts.indent_unit.repeat(line.indent), line.text);
        push_line(&mut out, &text, &mut emitted);
    }

    push_line(
        &mut out,
        &format!("end {} {}", src.kind.keyword(), src.name),
        &mut emitted,
    );
    out
}

fn push_line(out: &mut String, text: &str, emitted: &mut usize) {
    out.push_str(text.trim_end());
    out.push('\n');
    *emitted += 1;
}
