//! Statement and expression recovery.

mod common;

use common::*;
use scenedec::bytecode::Opcode;

#[test]
fn literal_assignment() {
    // x = 3.0  =>  PushF 3.0; PushV &x; PopF
    let mut a = Asm::new();
    a.pushf(3.0);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "set_x", 0, &["x"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "set_x"), vec!["x = 3"]);
    assert!(out.notices.is_empty(), "unexpected notices: {:?}", out.notices);
}

#[test]
fn compound_assignment_and_increment() {
    // x += 2; x++; x--
    let mut a = Asm::new();
    a.pushv(0);
    a.pushf(2.0);
    a.op(Opcode::Add);
    a.pushv_ref(0);
    a.popf();

    a.pushv(0);
    a.pushf(1.0);
    a.op(Opcode::Add);
    a.pushv_ref(0);
    a.popf();

    a.pushv(0);
    a.pushf(1.0);
    a.op(Opcode::Sub);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "bump", 0, &["x"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "bump"), vec!["x += 2", "x++", "x--"]);
}

#[test]
fn self_reference_only_applies_to_left_operand() {
    // x = 10 - x must not become x -= 10.
    let mut a = Asm::new();
    a.pushf(10.0);
    a.pushv(0);
    a.op(Opcode::Sub);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "flip", 0, &["x"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "flip"), vec!["x = 10 - x"]);
}

#[test]
fn operator_precedence_prints_minimum_parentheses() {
    // y = (1 + 2) * 3 and y = 1 + 2 * 3 keep their shapes apart.
    let mut a = Asm::new();
    a.pushf(1.0);
    a.pushf(2.0);
    a.op(Opcode::Add);
    a.pushf(3.0);
    a.op(Opcode::Mul);
    a.pushv_ref(0);
    a.popf();

    a.pushf(1.0);
    a.pushf(2.0);
    a.pushf(3.0);
    a.op(Opcode::Mul);
    a.op(Opcode::Add);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "math", 0, &["y"], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "math"),
        vec!["y = (1 + 2) * 3", "y = 1 + 2 * 3"]
    );
}

#[test]
fn boolean_and_comparison_nesting() {
    // f = a < 1 and not b == 2
    let mut a = Asm::new();
    a.pushv(0);
    a.pushf(1.0);
    a.op(Opcode::Lt);
    a.pushv(1);
    a.pushf(2.0);
    a.op(Opcode::Eq);
    a.op(Opcode::Not);
    a.op(Opcode::And);
    a.pushv_ref(2);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "cmp", 0, &["a", "b", "f"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "cmp"), vec!["f = a < 1 and not b == 2"]);
}

#[test]
fn stack_reorder_swaps_operand_order() {
    // Operands pushed backwards, fixed by Swap: x = 10 - y.
    let mut a = Asm::new();
    a.pushv(1);
    a.pushf(10.0);
    a.swap();
    a.op(Opcode::Sub);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "reorder", 0, &["x", "y"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "reorder"), vec!["x = 10 - y"]);
}

#[test]
fn coordinate_literal_and_arithmetic() {
    // pos = [1, 2, 3] + delta
    let mut a = Asm::new();
    a.pushf(1.0);
    a.pushf(2.0);
    a.pushf(3.0);
    a.cast_coord();
    a.pushv_coord(3);
    a.op(Opcode::CAdd);
    a.pushv_ref(0);
    a.popc();
    a.end();

    let b = bank(
        a,
        vec![script(0, "place", 0, &["pos", "@", "@", "delta", "@", "@"], 0)],
    );
    let out = decompile(&b);
    assert_eq!(lines(&out, "place"), vec!["pos = [1, 2, 3] + delta"]);
}

#[test]
fn coordinate_scaling_consumes_scalar() {
    // pos = delta * 2
    let mut a = Asm::new();
    a.pushv_coord(3);
    a.pushf(2.0);
    a.op(Opcode::CMul);
    a.pushv_ref(0);
    a.popc();
    a.end();

    let b = bank(
        a,
        vec![script(0, "scale", 0, &["pos", "@", "@", "delta", "@", "@"], 0)],
    );
    let out = decompile(&b);
    assert_eq!(lines(&out, "scale"), vec!["pos = delta * 2"]);
}

#[test]
fn wait_statement() {
    let mut a = Asm::new();
    a.pushf(2.5);
    a.sleep();
    a.end();

    let b = bank(a, vec![script(0, "pause", 0, &[], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "pause"), vec!["wait 2.5"]);
}

#[test]
fn native_statement_uses_template() {
    let mut a = Asm::new();
    a.pushv_obj(0);
    a.pushf(50.0);
    a.sys("SET_HEALTH");
    a.end();

    let b = bank(a, vec![script(0, "heal", 0, &["target"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "heal"), vec!["set health of target to 50"]);
}

#[test]
fn native_bool_options_render_as_words() {
    // SET_WIDESCREEN outside a cinema opener is an ordinary statement.
    let mut a = Asm::new();
    a.pushb(true);
    a.sys("SET_WIDESCREEN");
    a.pushb(false);
    a.sys("SET_WIDESCREEN");
    a.end();

    let b = bank(a, vec![script(0, "bars", 0, &[], 0)]);
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "bars"),
        vec!["enable widescreen", "disable widescreen"]
    );
}

#[test]
fn native_string_argument_dereferences_data_section() {
    let mut a = Asm::new();
    // Inside a dialogue block so the context check stays quiet.
    let d = a.sys("START_DIALOGUE");
    a.jz_back(d);
    a.pushi(6);
    a.sys("SAY");
    a.sys("END_DIALOGUE");
    a.end();

    let mut b = bank(a, vec![script(0, "talk", 0, &[], 0)]);
    b.data = b"ignore\0hello there\0".to_vec();
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "talk"),
        vec!["begin dialogue", "say \"hello there\"", "end dialogue"]
    );
}

#[test]
fn variable_arity_native_consumes_counted_tail() {
    // Two extra cells, regardless of any declared minimum.
    let mut a = Asm::new();
    a.pushv_obj(0);
    a.pushi(7);
    a.pushi(9);
    a.pushi(2);
    a.sys("PLAY_ANIM_QUEUE");
    a.end();

    let b = bank(a, vec![script(0, "anims", 0, &["actor"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "anims"), vec!["queue anims on actor 7, 9"]);
    assert!(out.notices.is_empty());
}

#[test]
fn background_script_with_empty_tail_drops_parentheses() {
    let mut a = Asm::new();
    a.pushi(1); // script id of "worker"
    a.pushi(0); // no extra args
    a.sys("RUN_BACKGROUND_SCRIPT");
    a.end();
    let worker_entry = a.here();
    a.end();

    let b = bank(
        a,
        vec![
            script(0, "spawn", 0, &[], 0),
            script(1, "worker", worker_entry, &[], 0),
        ],
    );
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "spawn"),
        vec!["run background script worker"]
    );
}

#[test]
fn run_and_call_statements() {
    // run script helper(1, 2); x = add_up(3, 4)
    let mut a = Asm::new();
    a.pushf(1.0);
    a.pushf(2.0);
    a.call(1);
    a.pushf(3.0);
    a.pushf(4.0);
    a.call(2);
    a.pushv_ref(0);
    a.popf();
    a.end();

    let helper_entry = a.here();
    a.end();
    let add_entry = a.here();
    a.pushv(0);
    a.pushv(1);
    a.op(Opcode::Add);
    a.ret();
    a.end();

    let b = bank(
        a,
        vec![
            script(0, "caller", 0, &["x"], 0),
            script(1, "helper", helper_entry, &["a", "b"], 2),
            function(2, "add_up", add_entry, &["p", "q"], 2),
        ],
    );
    let out = decompile(&b);
    assert_eq!(
        lines(&out, "caller"),
        vec!["run script helper(1, 2)", "x = add_up(3, 4)"]
    );
    assert_eq!(lines(&out, "add_up"), vec!["return p + q"]);
}

#[test]
fn array_slots_print_with_element_index() {
    // waypoints[2] = 5
    let mut a = Asm::new();
    a.pushf(5.0);
    a.pushv_ref(2);
    a.popf();
    a.end();

    let b = bank(a, vec![script(0, "nav", 0, &["waypoints", "@", "@"], 0)]);
    let out = decompile(&b);
    assert_eq!(lines(&out, "nav"), vec!["waypoints[2] = 5"]);
}

#[test]
fn discarded_function_result_prints_bare_call() {
    let mut a = Asm::new();
    a.call(1);
    a.discard();
    a.end();
    let f_entry = a.here();
    a.pushf(1.0);
    a.ret();
    a.end();

    let b = bank(
        a,
        vec![
            script(0, "main", 0, &[], 0),
            function(1, "noise", f_entry, &[], 0),
        ],
    );
    let out = decompile(&b);
    assert_eq!(lines(&out, "main"), vec!["noise()"]);
}
