//! Build script to generate the compile-time native-function map.
//!
//! This script reads `data/natives.toml` and generates a static phf::Map
//! that maps native-function names to NativeSpec structs.

use std::env;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn main() {
    // Re-run if the native-function data changes
    println!("cargo:rerun-if-changed=data/natives.toml");

    let out_dir = env::var("OUT_DIR").unwrap();
    let dest_path = Path::new(&out_dir).join("native_map.rs");
    let mut file = BufWriter::new(File::create(&dest_path).unwrap());

    // Parse the TOML file
    let content =
        std::fs::read_to_string("data/natives.toml").expect("Failed to read data/natives.toml");
    let table: toml::Table = content.parse().expect("Failed to parse data/natives.toml");

    // Write the struct definition
    writeln!(
        &mut file,
        "/// Metadata for one native function, generated from data/natives.toml.\n\
         #[derive(Debug, Clone, Copy)]\n\
         pub struct NativeSpec {{\n\
         \x20   pub args: &'static [&'static str],\n\
         \x20   pub ret: &'static str,\n\
         \x20   pub varargs: bool,\n\
         \x20   pub context: &'static str,\n\
         \x20   pub template: &'static str,\n\
         \x20   pub implicit_args: usize,\n\
         }}\n"
    )
    .unwrap();

    // Build the map
    let mut builder = phf_codegen::Map::new();

    for (key, value) in &table {
        if let toml::Value::Table(native) = value {
            let args: Vec<String> = native
                .get("args")
                .and_then(|v| v.as_array())
                .map(|a| {
                    a.iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| format!("\"{}\"", escape_string(s)))
                        .collect()
                })
                .unwrap_or_default();
            let ret = native.get("ret").and_then(|v| v.as_str()).unwrap_or("");
            let varargs = native
                .get("varargs")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            let context = native
                .get("context")
                .and_then(|v| v.as_str())
                .unwrap_or("none");
            let template = native.get("template").and_then(|v| v.as_str()).unwrap_or("");
            let implicit_args = native
                .get("implicit_args")
                .and_then(|v| v.as_integer())
                .unwrap_or(0);

            let struct_literal = format!(
                "NativeSpec {{ args: &[{}], ret: \"{}\", varargs: {}, context: \"{}\", template: \"{}\", implicit_args: {} }}",
                args.join(", "),
                escape_string(ret),
                varargs,
                escape_string(context),
                escape_string(template),
                implicit_args
            );
            builder.entry(key.as_str(), &struct_literal);
        }
    }

    writeln!(
        &mut file,
        "/// Compile-time generated native-function map.\n\
         /// Maps native names to their signatures and statement templates.\n\
         static NATIVE_MAP: phf::Map<&'static str, NativeSpec> = {};",
        builder.build()
    )
    .unwrap();
}

/// Escape special characters in a string for use in Rust string literals.
fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}
