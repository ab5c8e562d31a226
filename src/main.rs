use std::fs::File;
use std::io::{BufReader, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use scenedec::bytecode::ScriptBank;
use scenedec::tables::GameTables;
use scenedec::writer::WriterOptions;
use scenedec::{decompile_bank, DecompilerOptions, Effort};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "scenedec", about = "Decompile a SceneScript scene bank")]
struct Args {
    /// Scene bank to decompile (.sbk)
    bank: PathBuf,

    /// Output file (stdout when omitted)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enum/alias/subtype table files
    #[arg(short, long)]
    tables: Vec<PathBuf>,

    /// Heuristic effort level, 0-3
    #[arg(short, long, default_value_t = 2)]
    effort: u8,

    /// Align statements to recorded source lines with blank lines
    #[arg(long)]
    align: bool,
}

fn run(args: &Args) -> Result<(), Box<dyn std::error::Error>> {
    let bank = ScriptBank::read(BufReader::new(File::open(&args.bank)?))?;

    let mut tables = GameTables::new();
    for path in &args.tables {
        tables.load_file(path)?;
    }

    let options = DecompilerOptions::builder()
        .effort(Effort::from_level(args.effort))
        .align_lines(args.align)
        .build();

    let output = decompile_bank(&bank, &tables, &options);
    for notice in &output.notices {
        tracing::warn!(script = %notice.script, "{}", notice.message);
    }

    let writer_opts = WriterOptions {
        align_lines: options.align_lines,
        ..Default::default()
    };
    let text = output.render(&writer_opts);
    match &args.output {
        Some(path) => {
            File::create(path)?.write_all(text.as_bytes())?;
            tracing::info!(
                scripts = output.scripts.len(),
                path = %path.display(),
                "wrote decompiled source"
            );
        }
        None => print!("{text}"),
    }
    Ok(())
}
