//! Native-function metadata.
//!
//! A bank's SYS instructions call natives by numeric id; the bank carries the
//! id → name table, and the signatures, statement templates and render
//! options resolve by name through the compile-time map generated from
//! `data/natives.toml`.

// Include the compile-time generated native map (NativeSpec + NATIVE_MAP)
include!(concat!(env!("OUT_DIR"), "/native_map.rs"));

/// Stack kind of one native argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Int,
    Float,
    Bool,
    Coord,
    Object,
}

impl ArgKind {
    /// Operand-stack cells the argument occupies.
    pub fn width(self) -> usize {
        match self {
            ArgKind::Coord => 3,
            _ => 1,
        }
    }
}

/// How an argument slot renders in the statement grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgRender {
    /// Default rendering for the kind.
    Plain,
    /// Two-word boolean option, e.g. "enable" / "disable".
    BoolWords {
        on: &'static str,
        off: &'static str,
    },
    /// Integer rendered through a named enum table.
    Enum(&'static str),
    /// Integer rendered through the subtype table of `base`, narrowed by the
    /// value of argument `key_arg`.
    Subtype {
        base: &'static str,
        key_arg: usize,
    },
    /// Integer offset into the bank's data section, printed as a quoted
    /// string.
    StringRef,
    /// Integer script id, printed as the script's name.
    ScriptRef,
    /// Enum-like sound-bank entry.
    Sound,
    /// Enum-like animation entry.
    Anim,
}

/// A parsed argument slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub kind: ArgKind,
    pub render: ArgRender,
}

/// Parse one spec string from `data/natives.toml`.
///
/// Unknown specs fall back to a plain int slot; the data file is trusted
/// build input, not user input.
pub fn parse_arg_spec(spec: &'static str) -> ArgSpec {
    if let Some(rest) = spec.strip_prefix("enum:") {
        return ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Enum(rest),
        };
    }
    if let Some(rest) = spec.strip_prefix("bool:") {
        let (on, off) = rest.split_once('|').unwrap_or((rest, rest));
        return ArgSpec {
            kind: ArgKind::Bool,
            render: ArgRender::BoolWords { on, off },
        };
    }
    if let Some(rest) = spec.strip_prefix("subtype:") {
        let (base, key) = rest.split_once('@').unwrap_or((rest, "0"));
        return ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Subtype {
                base,
                key_arg: key.parse().unwrap_or(0),
            },
        };
    }
    match spec {
        "int" => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Plain,
        },
        "float" => ArgSpec {
            kind: ArgKind::Float,
            render: ArgRender::Plain,
        },
        "bool" => ArgSpec {
            kind: ArgKind::Bool,
            render: ArgRender::Plain,
        },
        "coord" => ArgSpec {
            kind: ArgKind::Coord,
            render: ArgRender::Plain,
        },
        "object" => ArgSpec {
            kind: ArgKind::Object,
            render: ArgRender::Plain,
        },
        "string" => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::StringRef,
        },
        "script" => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::ScriptRef,
        },
        "sound" => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Sound,
        },
        "anim" => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Anim,
        },
        _ => ArgSpec {
            kind: ArgKind::Int,
            render: ArgRender::Plain,
        },
    }
}

impl NativeSpec {
    /// Parsed argument slots.
    pub fn arg_specs(&self) -> Vec<ArgSpec> {
        self.args.iter().map(|s| parse_arg_spec(s)).collect()
    }

    /// Sum of the declared arguments' stack widths.
    pub fn fixed_width(&self) -> usize {
        self.arg_specs().iter().map(|a| a.kind.width()).sum()
    }

    pub fn has_return(&self) -> bool {
        !self.ret.is_empty()
    }
}

/// A native resolved through the bank's id table.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedNative<'a> {
    pub name: &'a str,
    pub spec: &'static NativeSpec,
}

/// The bank's native id → name table, joined with the static metadata map.
#[derive(Debug, Clone, Default)]
pub struct NativeTable {
    names: Vec<String>,
}

impl NativeTable {
    pub fn new(names: Vec<String>) -> Self {
        Self { names }
    }

    /// Table containing every native the data file knows, in name order.
    /// Banks normally carry their own table; this is for tests and tools.
    pub fn builtin() -> Self {
        let mut names: Vec<String> = NATIVE_MAP.keys().map(|k| k.to_string()).collect();
        names.sort();
        Self { names }
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Numeric id of a named native, where present.
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// Name carried by the bank for an id, metadata or not.
    pub fn name_of(&self, id: usize) -> Option<&str> {
        self.names.get(id).map(String::as_str)
    }

    /// Resolve a SYS payload to name + metadata.
    pub fn lookup(&self, id: usize) -> Option<ResolvedNative<'_>> {
        let name = self.names.get(id)?;
        let spec = NATIVE_MAP.get(name)?;
        Some(ResolvedNative { name, spec })
    }
}
