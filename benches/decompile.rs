//! Criterion benchmarks for decompilation throughput.
//!
//! A synthetic bank is generated in memory: each script is a run of
//! assignments wrapped in an if and a while, which exercises the statement
//! scanner, the backward builder and the block reconstructor together.
//!
//! Run with: `cargo bench --bench decompile`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scenedec::bytecode::{
    DataKind, InstrFlags, Instruction, NativeTable, Opcode, Payload, Script, ScriptBank,
    ScriptKind,
};
use scenedec::tables::GameTables;
use scenedec::{decompile_bank, DecompilerOptions, Effort};

fn instr(opcode: Opcode, flags: u32, data_kind: DataKind, payload: Payload) -> Instruction {
    Instruction {
        opcode,
        flags: InstrFlags(flags),
        data_kind,
        payload,
        line: 0,
    }
}

/// One script: x = 1; if x > 0 { while x > 0 { x-- } } repeated.
fn emit_script(code: &mut Vec<Instruction>, statements: usize) -> usize {
    let entry = code.len();
    for _ in 0..statements {
        // x = 1
        code.push(instr(Opcode::PushF, 0, DataKind::Float, Payload::Float(1.0)));
        code.push(instr(
            Opcode::PushV,
            InstrFlags::REF,
            DataKind::Var,
            Payload::Int(0),
        ));
        code.push(instr(Opcode::PopF, 0, DataKind::Float, Payload::None));

        // if x > 0
        code.push(instr(Opcode::PushV, 0, DataKind::Float, Payload::Int(0)));
        code.push(instr(Opcode::PushF, 0, DataKind::Float, Payload::Float(0.0)));
        code.push(instr(Opcode::Gt, 0, DataKind::None, Payload::None));
        let jz = code.len();
        code.push(instr(
            Opcode::Jz,
            InstrFlags::FORWARD,
            DataKind::Int,
            Payload::Int(0),
        ));

        // while x > 0 { x-- }
        let begin = code.len();
        code.push(instr(Opcode::Except, 0, DataKind::Int, Payload::Int(0)));
        code.push(instr(Opcode::PushV, 0, DataKind::Float, Payload::Int(0)));
        code.push(instr(Opcode::PushF, 0, DataKind::Float, Payload::Float(0.0)));
        code.push(instr(Opcode::Gt, 0, DataKind::None, Payload::None));
        let exit_jz = code.len();
        code.push(instr(
            Opcode::Jz,
            InstrFlags::FORWARD,
            DataKind::Int,
            Payload::Int(0),
        ));
        code.push(instr(Opcode::PushV, 0, DataKind::Float, Payload::Int(0)));
        code.push(instr(Opcode::PushF, 0, DataKind::Float, Payload::Float(1.0)));
        code.push(instr(Opcode::Sub, 0, DataKind::None, Payload::None));
        code.push(instr(
            Opcode::PushV,
            InstrFlags::REF,
            DataKind::Var,
            Payload::Int(0),
        ));
        code.push(instr(Opcode::PopF, 0, DataKind::Float, Payload::None));
        code.push(instr(Opcode::IterExcept, 0, DataKind::None, Payload::None));
        let exit = code.len();
        code[exit_jz].payload = Payload::Int(exit as i32);
        code.push(instr(
            Opcode::EndExcept,
            InstrFlags::FREE,
            DataKind::None,
            Payload::None,
        ));
        let jmp = code.len();
        code.push(instr(
            Opcode::Jmp,
            InstrFlags::FORWARD,
            DataKind::Int,
            Payload::Int(0),
        ));
        let after = code.len();
        code[begin].payload = Payload::Int(after as i32);
        code[jmp].payload = Payload::Int(after as i32);

        // end if
        code[jz].payload = Payload::Int(code.len() as i32);
    }
    code.push(instr(Opcode::End, 0, DataKind::None, Payload::None));
    entry
}

fn synthetic_bank(scripts: usize, statements: usize) -> ScriptBank {
    let mut code = Vec::new();
    let mut records = Vec::new();
    for id in 0..scripts {
        let entry = emit_script(&mut code, statements);
        records.push(Script {
            id: id as u32,
            name: format!("script_{id}"),
            source_file: "bench.scn".to_string(),
            kind: ScriptKind::Script,
            visible_globals: 0,
            param_count: 0,
            var_names: vec!["x".to_string()],
            entry,
        });
    }
    ScriptBank {
        instructions: code,
        scripts: records,
        globals: Vec::new(),
        data: Vec::new(),
        natives: NativeTable::builtin(),
    }
}

fn bench_decompile(c: &mut Criterion) {
    let tables = GameTables::new();
    let mut group = c.benchmark_group("decompile");

    for &scripts in &[4usize, 32] {
        let bank = synthetic_bank(scripts, 16);
        group.throughput(Throughput::Elements(bank.instructions.len() as u64));
        group.bench_with_input(
            BenchmarkId::new("standard", scripts),
            &bank,
            |b, bank| {
                let options = DecompilerOptions::builder().effort(Effort::Standard).build();
                b.iter(|| decompile_bank(bank, &tables, &options));
            },
        );
        group.bench_with_input(BenchmarkId::new("full", scripts), &bank, |b, bank| {
            let options = DecompilerOptions::builder().effort(Effort::Full).build();
            b.iter(|| decompile_bank(bank, &tables, &options));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_decompile);
criterion_main!(benches);
