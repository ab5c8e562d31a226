//! Native-call formatting and the native-driven pseudo-block idioms.
//!
//! Formatting is table-driven: each native's statement template and per-slot
//! render options come from the compile-time map built out of
//! `data/natives.toml`. The genuinely structural cases — the busy-retry
//! openers and release sequences of the camera/dialogue/cinema pseudo-blocks
//! — are explicit pattern matchers that run before template dispatch.

use crate::bytecode::{Addr, ArgKind, ArgRender, ArgSpec, Instruction, Opcode, ResolvedNative};
use crate::error::DecompileError;

use super::blocks::BlockKind;
use super::expr::{Expr, Literal};
use super::state::{FileCtx, ScriptPass};
use super::types::{Type, TypeKind};

// ═══════════════════════════════════════════════════════════════════════════
// Typing helpers
// ═══════════════════════════════════════════════════════════════════════════

/// Type a native argument slot pins onto a variable bound to it.
pub fn slot_type(spec: &ArgSpec) -> Option<Type> {
    match spec.render {
        ArgRender::Enum(name) => Some(Type::with_subtype(TypeKind::Enum, name)),
        ArgRender::Sound => Some(Type::new(TypeKind::Sound)),
        ArgRender::Anim => Some(Type::new(TypeKind::Anim)),
        ArgRender::BoolWords { .. } => Some(Type::new(TypeKind::Bool)),
        ArgRender::Subtype { .. } | ArgRender::StringRef | ArgRender::ScriptRef => None,
        ArgRender::Plain => match spec.kind {
            ArgKind::Int => Some(Type::new(TypeKind::Int)),
            ArgKind::Bool => Some(Type::new(TypeKind::Bool)),
            ArgKind::Coord => Some(Type::new(TypeKind::Coord)),
            ArgKind::Object => Some(Type::new(TypeKind::Object)),
            ArgKind::Float => None,
        },
    }
}

/// Type of a native's return value, when it says more than "a float".
pub fn return_type(ret: &str) -> Option<Type> {
    match ret {
        "int" => Some(Type::new(TypeKind::Int)),
        "bool" => Some(Type::new(TypeKind::Bool)),
        "object" => Some(Type::new(TypeKind::Object)),
        "coord" => Some(Type::new(TypeKind::Coord)),
        _ => None,
    }
}

/// Symbolic rendering of an integer under an enum-like type, when the loaded
/// tables know the value.
pub fn typed_int_symbol(ctx: &FileCtx<'_>, ty: &Type, value: i32) -> Option<String> {
    let table = match (ty.kind, &ty.subtype) {
        (TypeKind::Enum, Some(name)) => name.as_str(),
        (TypeKind::Sound, _) => "SOUND",
        (TypeKind::Anim, _) => "ANIM",
        _ => return None,
    };
    ctx.tables.enum_symbol(table, value).map(str::to_string)
}

// ═══════════════════════════════════════════════════════════════════════════
// Statement rendering
// ═══════════════════════════════════════════════════════════════════════════

/// Render a native call through its statement template, or the generic
/// `NAME(args)` form when the data file declares none.
pub fn render_native(
    ctx: &mut FileCtx<'_>,
    script: &str,
    addr: Addr,
    native: ResolvedNative<'_>,
    args: &[Expr],
    extras: &[Expr],
) -> String {
    let specs = native.spec.arg_specs();
    let rendered: Vec<String> = specs
        .iter()
        .enumerate()
        .map(|(i, spec)| render_arg(ctx, script, addr, spec, args, i))
        .collect();
    let extra_list = extras
        .iter()
        .map(|e| e.text.clone())
        .collect::<Vec<_>>()
        .join(", ");

    if native.spec.template.is_empty() {
        // The compiler pushes the first `implicit_args` itself; they carry
        // no surface syntax.
        let mut shown: Vec<String> = rendered
            .iter()
            .skip(native.spec.implicit_args)
            .cloned()
            .collect();
        if !extra_list.is_empty() {
            shown.push(extra_list);
        }
        return if shown.is_empty() {
            native.name.to_string()
        } else {
            format!("{}({})", native.name, shown.join(", "))
        };
    }

    let mut text = native.spec.template.replace("$*", &extra_list);
    for i in (0..rendered.len()).rev() {
        text = text.replace(&format!("${i}"), &rendered[i]);
    }
    // A template written for an empty vararg tail leaves "()" behind.
    text.replace("()", "").trim_end().to_string()
}

fn render_arg(
    ctx: &mut FileCtx<'_>,
    script: &str,
    addr: Addr,
    spec: &ArgSpec,
    args: &[Expr],
    index: usize,
) -> String {
    let Some(expr) = args.get(index) else {
        return String::new();
    };
    match spec.render {
        ArgRender::Plain => match (spec.kind, expr.lit) {
            (ArgKind::Int, Some(Literal::Int(v))) => ctx
                .tables
                .alias_for(v)
                .map(str::to_string)
                .unwrap_or_else(|| expr.text.clone()),
            _ => expr.text.clone(),
        },
        ArgRender::BoolWords { on, off } => match expr.lit {
            Some(Literal::Bool(true)) => on.to_string(),
            Some(Literal::Bool(false)) => off.to_string(),
            _ => expr.text.clone(),
        },
        ArgRender::Enum(name) => match expr.lit {
            Some(Literal::Int(v)) => ctx
                .tables
                .enum_symbol(name, v)
                .map(str::to_string)
                .unwrap_or_else(|| expr.text.clone()),
            _ => expr.text.clone(),
        },
        ArgRender::Subtype { base, key_arg } => {
            let key = args.get(key_arg).and_then(|k| k.lit).and_then(Literal::as_int);
            let value = expr.lit.and_then(Literal::as_int);
            let (Some(key), Some(value)) = (key, value) else {
                return expr.text.clone();
            };
            match ctx.tables.subtype_enum(base, key) {
                Some(target) => {
                    let target = target.to_string();
                    ctx.tables
                        .enum_symbol(&target, value)
                        .map(str::to_string)
                        .unwrap_or_else(|| expr.text.clone())
                }
                None => {
                    ctx.warn(
                        script,
                        Some(addr),
                        format!("no subtype mapping for {base} value {key}"),
                    );
                    expr.text.clone()
                }
            }
        }
        ArgRender::StringRef => match expr.lit.and_then(Literal::as_int) {
            Some(offset) => match ctx.bank.get_string(offset as u32) {
                Ok(s) => format!("\"{s}\""),
                Err(_) => {
                    ctx.warn(
                        script,
                        Some(addr),
                        format!("string offset {offset} outside the data section"),
                    );
                    expr.text.clone()
                }
            },
            None => expr.text.clone(),
        },
        ArgRender::ScriptRef => match expr.lit.and_then(Literal::as_int) {
            Some(id) => match u32::try_from(id).ok().and_then(|id| ctx.bank.script_by_id(id)) {
                Some(callee) => callee.name.clone(),
                None => {
                    ctx.warn(script, Some(addr), format!("unknown script id {id}"));
                    expr.text.clone()
                }
            },
            None => expr.text.clone(),
        },
        ArgRender::Sound => render_enum_like(ctx, "SOUND", expr),
        ArgRender::Anim => render_enum_like(ctx, "ANIM", expr),
    }
}

fn render_enum_like(ctx: &FileCtx<'_>, table: &str, expr: &Expr) -> String {
    match expr.lit.and_then(Literal::as_int) {
        Some(v) => ctx
            .tables
            .enum_symbol(table, v)
            .map(str::to_string)
            .unwrap_or_else(|| expr.text.clone()),
        None => expr.text.clone(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Pseudo-block idioms
// ═══════════════════════════════════════════════════════════════════════════

fn native_name<'b>(ctx: &FileCtx<'b>, instr: &Instruction) -> Option<&'b str> {
    let id = usize::try_from(instr.payload.as_int()?).ok()?;
    ctx.bank.natives.name_of(id)
}

/// Marker natives that open a block on their own.
pub fn marker_open(name: &str) -> Option<BlockKind> {
    match name {
        "ENTER_CANNON_MODE" => Some(BlockKind::Cannon),
        "SPLIT_SCREEN_START" => Some(BlockKind::DualCamera),
        _ => None,
    }
}

/// Match a busy-retry pseudo-block opener.
///
/// The caller has already established that the statement span `[start..=end]`
/// ends in a backward self-looping conditional jump. Returns the opened
/// block kind and the address where decompilation resumes; the instructions
/// in between are subsumed by the opener keyword.
pub fn match_pseudo_open(
    ctx: &FileCtx<'_>,
    pass: &ScriptPass<'_>,
    start: Addr,
    end: Addr,
) -> Result<Option<(BlockKind, Addr)>, DecompileError> {
    if end != start + 1 {
        return Ok(None);
    }
    let sys = pass.instr(start)?;
    if sys.opcode != Opcode::Sys {
        return Ok(None);
    }
    match native_name(ctx, sys) {
        Some("START_DIALOGUE") => Ok(Some((BlockKind::Dialogue, end + 1))),
        Some("START_CAMERA_CONTROL") => {
            // Camera control is always acquired together with dialogue.
            expect_sys(ctx, pass, end + 1, "START_DIALOGUE")?;
            expect_retry_jz(pass, end + 2, end + 1)?;
            let tail = end + 3;
            if is_cinema_tail(ctx, pass, tail) {
                Ok(Some((BlockKind::Cinema, tail + 4)))
            } else {
                Ok(Some((BlockKind::Camera, tail)))
            }
        }
        _ => Ok(None),
    }
}

/// Match a pseudo-block release sequence against the current block.
///
/// Peeks past the already-scanned statement; a mismatch is not an error —
/// the statement simply formats normally (a cinema block may legitimately
/// change the game speed without closing).
pub fn match_pseudo_close(
    ctx: &FileCtx<'_>,
    pass: &ScriptPass<'_>,
    start: Addr,
    end: Addr,
) -> Result<Option<(BlockKind, Addr)>, DecompileError> {
    let fin = pass.instr(end)?;
    let Some(name) = native_name(ctx, fin) else {
        return Ok(None);
    };
    let top = pass.current_block().kind;
    match (top, name) {
        (BlockKind::Dialogue, "END_DIALOGUE") if start == end => {
            Ok(Some((BlockKind::Dialogue, end + 1)))
        }
        (BlockKind::Camera, "END_DIALOGUE") if start == end => {
            expect_sys(ctx, pass, end + 1, "END_CAMERA_CONTROL")?;
            Ok(Some((BlockKind::Camera, end + 2)))
        }
        (BlockKind::Cinema, "SET_GAME_SPEED") if start + 1 == end => {
            let push = pass.instr(start)?;
            let restores_speed = push.opcode == Opcode::PushF
                && push.payload.as_float().is_some_and(|v| v == 1.0);
            if restores_speed && is_cinema_release_tail(ctx, pass, end + 1) {
                Ok(Some((BlockKind::Cinema, end + 5)))
            } else {
                Ok(None)
            }
        }
        (BlockKind::Cannon, "EXIT_CANNON_MODE") if start == end => {
            Ok(Some((BlockKind::Cannon, end + 1)))
        }
        (BlockKind::DualCamera, "SPLIT_SCREEN_END") if start == end => {
            Ok(Some((BlockKind::DualCamera, end + 1)))
        }
        _ => Ok(None),
    }
}

/// Opener/closer keywords for the pseudo-blocks.
pub fn pseudo_keyword(kind: BlockKind, open: bool) -> &'static str {
    match (kind, open) {
        (BlockKind::Cinema, true) => "begin cinema",
        (BlockKind::Cinema, false) => "end cinema",
        (BlockKind::Camera, true) => "begin camera",
        (BlockKind::Camera, false) => "end camera",
        (BlockKind::Dialogue, true) => "begin dialogue",
        (BlockKind::Dialogue, false) => "end dialogue",
        (BlockKind::Cannon, false) => "end cannon",
        (BlockKind::DualCamera, false) => "end dual camera",
        _ => "",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence probes
// ─────────────────────────────────────────────────────────────────────────────

fn expect_sys(
    ctx: &FileCtx<'_>,
    pass: &ScriptPass<'_>,
    addr: Addr,
    name: &'static str,
) -> Result<(), DecompileError> {
    let instr = pass.instr(addr)?;
    if instr.opcode == Opcode::Sys && native_name(ctx, instr) == Some(name) {
        Ok(())
    } else {
        Err(pass.err_unexpected(addr, name))
    }
}

fn expect_retry_jz(pass: &ScriptPass<'_>, addr: Addr, target: Addr) -> Result<(), DecompileError> {
    let instr = pass.instr(addr)?;
    let ok = instr.opcode == Opcode::Jz
        && !instr.flags.is_forward()
        && instr.target() == Some(target);
    if ok {
        Ok(())
    } else {
        Err(pass.err_unexpected(addr, "busy-retry conditional jump"))
    }
}

/// `PushB true; SET_WIDESCREEN; PushF _; SET_GAME_SPEED` after the retries
/// upgrades a camera opener to a cinema opener.
fn is_cinema_tail(ctx: &FileCtx<'_>, pass: &ScriptPass<'_>, addr: Addr) -> bool {
    let Some(widescreen_on) = pass.bank.instruction(addr) else {
        return false;
    };
    if widescreen_on.opcode != Opcode::PushB
        || widescreen_on.payload.as_bool() != Some(true)
    {
        return false;
    }
    if !probe_sys(ctx, pass, addr + 1, "SET_WIDESCREEN") {
        return false;
    }
    let Some(speed) = pass.bank.instruction(addr + 2) else {
        return false;
    };
    speed.opcode == Opcode::PushF && probe_sys(ctx, pass, addr + 3, "SET_GAME_SPEED")
}

/// `PushB false; SET_WIDESCREEN; END_DIALOGUE; END_CAMERA_CONTROL`.
fn is_cinema_release_tail(ctx: &FileCtx<'_>, pass: &ScriptPass<'_>, addr: Addr) -> bool {
    let Some(widescreen_off) = pass.bank.instruction(addr) else {
        return false;
    };
    widescreen_off.opcode == Opcode::PushB
        && widescreen_off.payload.as_bool() == Some(false)
        && probe_sys(ctx, pass, addr + 1, "SET_WIDESCREEN")
        && probe_sys(ctx, pass, addr + 2, "END_DIALOGUE")
        && probe_sys(ctx, pass, addr + 3, "END_CAMERA_CONTROL")
}

fn probe_sys(ctx: &FileCtx<'_>, pass: &ScriptPass<'_>, addr: Addr, name: &str) -> bool {
    pass.bank
        .instruction(addr)
        .is_some_and(|i| i.opcode == Opcode::Sys && native_name(ctx, i) == Some(name))
}
