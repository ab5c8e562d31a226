//! Structured control-flow reconstruction from jump geometry.

mod common;

use common::*;
use scenedec::bytecode::Opcode;
use scenedec::decompiler::NoticeSeverity;

#[test]
fn plain_if_closes_at_jump_target() {
    // if flag / wait 1 / end if — the guard's jump lands right after the body.
    let mut a = Asm::new();
    a.pushv(0);
    let jz = a.jz_fwd();
    a.pushf(1.0);
    a.sleep();
    let merge = a.here();
    a.patch(jz, merge);
    a.end();

    let b = bank(a, vec![script(0, "gate", 0, &["flag"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "gate"), vec!["if flag", "wait 1", "end if"]);
    assert!(out.notices.is_empty());
}

#[test]
fn if_elsif_else_chain() {
    let mut a = Asm::new();
    // if a
    a.pushv(0);
    let jz_a = a.jz_fwd();
    a.pushf(1.0);
    a.pushv_ref(2);
    a.popf();
    let jmp_a = a.jmp_fwd();
    // elsif b
    let clause_b = a.here();
    a.patch(jz_a, clause_b);
    a.pushv(1);
    let jz_b = a.jz_fwd();
    a.pushf(2.0);
    a.pushv_ref(2);
    a.popf();
    let jmp_b = a.jmp_fwd();
    // else
    let clause_else = a.here();
    a.patch(jz_b, clause_else);
    a.pushb_synth();
    let jz_else = a.jz_fwd();
    a.pushf(3.0);
    a.pushv_ref(2);
    a.popf();
    // merge
    let merge = a.here();
    a.patch(jmp_a, merge);
    a.patch(jmp_b, merge);
    a.patch(jz_else, merge);
    a.end();

    let b = bank(a, vec![script(0, "pick", 0, &["a", "b", "x"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "pick"),
        vec![
            "if a", "x = 1", "elsif b", "x = 2", "else", "x = 3", "end if"
        ]
    );
}

#[test]
fn nested_ifs_close_inner_first() {
    let mut a = Asm::new();
    a.pushv(0);
    let outer = a.jz_fwd();
    a.pushv(1);
    let inner = a.jz_fwd();
    a.pushf(1.0);
    a.sleep();
    let inner_merge = a.here();
    a.patch(inner, inner_merge);
    a.pushf(2.0);
    a.sleep();
    let outer_merge = a.here();
    a.patch(outer, outer_merge);
    a.end();

    let b = bank(a, vec![script(0, "nest", 0, &["a", "b"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "nest"),
        vec![
            "if a", "if b", "wait 1", "end if", "wait 2", "end if"
        ]
    );

    // Indentation mirrors nesting depth.
    let src = &out.scripts[0];
    let indents: Vec<usize> = src.lines.iter().map(|l| l.indent).collect();
    assert_eq!(indents, vec![1, 2, 3, 2, 2, 1]);
}

#[test]
fn infinite_loop_idiom() {
    // begin loop / wait 1 / end loop: handler points one past the backward
    // jump to the construct's own begin.
    let mut a = Asm::new();
    let begin = a.except();
    a.pushf(1.0);
    a.sleep();
    a.jmp_back(begin);
    let handler = a.here();
    a.patch(begin, handler);
    a.iter_except();
    a.end();

    let b = bank(a, vec![script(0, "forever", 0, &[], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "forever"),
        vec!["begin loop", "wait 1", "end loop"]
    );
    assert!(out.notices.is_empty());
}

#[test]
fn while_loop_with_guard() {
    // while x > 0 / x-- / end while
    let mut a = Asm::new();
    let begin = a.except();
    a.pushv(0);
    a.pushf(0.0);
    a.op(Opcode::Gt);
    let jz = a.jz_fwd();
    a.pushv(0);
    a.pushf(1.0);
    a.op(Opcode::Sub);
    a.pushv_ref(0);
    a.popf();
    a.iter_except();
    let exit = a.here();
    a.patch(jz, exit);
    a.end_except_free();
    let jmp = a.jmp_fwd();
    let after = a.here();
    a.patch(begin, after);
    a.patch(jmp, after);
    a.end();

    let b = bank(a, vec![script(0, "drain", 0, &["x"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "drain"),
        vec!["while x > 0", "x--", "end while"]
    );
    assert!(out.notices.is_empty());
}

#[test]
fn until_clause_jumps_into_handler() {
    // begin loop / wait 1 / until done / end loop
    let mut a = Asm::new();
    let begin = a.except();
    a.pushf(1.0);
    a.sleep();
    a.pushv(0);
    a.op(Opcode::Not);
    let jz_until = a.jz_fwd();
    a.jmp_back(begin);
    let handler = a.here();
    a.patch(begin, handler);
    a.iter_except();
    let stub = a.here();
    a.patch(jz_until, stub);
    a.brk_except();
    let jmp_out = a.jmp_fwd();
    let after = a.here();
    a.patch(jmp_out, after);
    a.end();

    let b = bank(a, vec![script(0, "poll", 0, &["done"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "poll"),
        vec!["begin loop", "wait 1", "until done", "end loop"]
    );
}

#[test]
fn dialogue_camera_and_cinema_blocks() {
    let mut a = Asm::new();
    // begin cinema
    let cam = a.sys("START_CAMERA_CONTROL");
    a.jz_back(cam);
    let dlg = a.sys("START_DIALOGUE");
    a.jz_back(dlg);
    a.pushb(true);
    a.sys("SET_WIDESCREEN");
    a.pushf(0.3);
    a.sys("SET_GAME_SPEED");
    // body: a camera-context native is fine here
    a.pushf(1.0);
    a.pushf(2.0);
    a.pushf(3.0);
    a.cast_coord();
    a.sys("SET_CAMERA_POSITION");
    // end cinema
    a.pushf(1.0);
    a.sys("SET_GAME_SPEED");
    a.pushb(false);
    a.sys("SET_WIDESCREEN");
    a.sys("END_DIALOGUE");
    a.sys("END_CAMERA_CONTROL");
    a.end();

    let b = bank(a, vec![script(0, "cutscene", 0, &[], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "cutscene"),
        vec![
            "begin cinema",
            "set camera position to [1, 2, 3]",
            "end cinema"
        ]
    );
    assert!(out.notices.is_empty(), "notices: {:?}", out.notices);
}

#[test]
fn camera_block_without_cinema_tail() {
    let mut a = Asm::new();
    let cam = a.sys("START_CAMERA_CONTROL");
    a.jz_back(cam);
    let dlg = a.sys("START_DIALOGUE");
    a.jz_back(dlg);
    a.pushf(1.0);
    a.pushf(1.0);
    a.pushf(1.0);
    a.cast_coord();
    a.sys("SET_CAMERA_FOCUS");
    a.sys("END_DIALOGUE");
    a.sys("END_CAMERA_CONTROL");
    a.end();

    let b = bank(a, vec![script(0, "look", 0, &[], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "look"),
        vec![
            "begin camera",
            "set camera focus to [1, 1, 1]",
            "end camera"
        ]
    );
}

#[test]
fn cannon_and_dual_camera_markers() {
    let mut a = Asm::new();
    // Inside a camera block so the context checks stay quiet.
    let cam = a.sys("START_CAMERA_CONTROL");
    a.jz_back(cam);
    let dlg = a.sys("START_DIALOGUE");
    a.jz_back(dlg);
    a.pushv_obj(0);
    a.sys("ENTER_CANNON_MODE");
    a.sys("EXIT_CANNON_MODE");
    a.sys("SPLIT_SCREEN_START");
    a.sys("SPLIT_SCREEN_END");
    a.sys("END_DIALOGUE");
    a.sys("END_CAMERA_CONTROL");
    a.end();

    let b = bank(a, vec![script(0, "modes", 0, &["gun"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "modes"),
        vec![
            "begin camera",
            "begin cannon gun",
            "end cannon",
            "begin dual camera",
            "end dual camera",
            "end camera"
        ]
    );
}

#[test]
fn camera_native_outside_camera_block_warns() {
    let mut a = Asm::new();
    a.pushf(0.0);
    a.pushf(0.0);
    a.pushf(0.0);
    a.cast_coord();
    a.sys("SET_CAMERA_POSITION");
    a.end();

    let b = bank(a, vec![script(0, "stray", 0, &[], 0)]);
    let out = decompile(&b);
    // Output still comes through; the violation is a warning.
    assert_eq!(
        lines(&out, "stray"),
        vec!["set camera position to [0, 0, 0]"]
    );
    assert!(out
        .notices
        .iter()
        .any(|n| n.severity == NoticeSeverity::Warning
            && n.message.contains("requires a camera block")));
}

#[test]
fn corrupt_script_yields_partial_bank_output() {
    let mut a = Asm::new();
    // Script 0 reads a variable id that does not exist.
    a.pushv(7);
    a.pushv_ref(7);
    a.popf();
    a.end();
    let good_entry = a.here();
    a.pushf(1.0);
    a.sleep();
    a.end();

    let b = bank(
        a,
        vec![
            script(0, "broken", 0, &[], 0),
            script(1, "fine", good_entry, &[], 0),
        ],
    );
    let out = decompile(&b);
    assert_eq!(lines(&out, "fine"), vec!["wait 1"]);
    assert!(out
        .notices
        .iter()
        .any(|n| n.script == "broken" && n.message.contains("decompilation aborted")));
}

#[test]
fn truncated_stream_reports_unsupported_construct() {
    // An if whose guard jump points past the script's End.
    let mut a = Asm::new();
    a.pushv(0);
    let jz = a.jz_fwd();
    a.pushf(1.0);
    a.sleep();
    a.end();
    a.patch(jz, 99);

    let b = bank(a, vec![script(0, "chopped", 0, &["flag"], 0)]);
    let out = decompile(&b);
    assert!(out
        .notices
        .iter()
        .any(|n| n.script == "chopped" && n.message.contains("decompilation aborted")));
}

#[test]
fn stack_underflow_is_reported_not_guessed() {
    let mut a = Asm::new();
    a.op(Opcode::Add); // pops an empty stack
    a.end();

    let b = bank(a, vec![script(0, "hollow", 0, &[], 0)]);
    let out = decompile(&b);
    assert!(out
        .notices
        .iter()
        .any(|n| n.script == "hollow" && n.message.contains("stack underflow")));
}
