// cshape: C declaration parser and memory layout reporter

mod init;
mod layout;
mod parser;
mod types;

use std::fs;
use std::path::Path;

use init::{validate_initializer, InitState};
use layout::profile::AbiProfile;
use layout::LayoutEngine;
use parser::ast::{InitValue, Type, TypeName};
use parser::parse::Parser;
use types::resolver::resolve_unit;
use types::table::TypeTable;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        let program_name = args.first().map(|s| s.as_str()).unwrap_or("cshape");
        eprintln!("Error: No input file provided");
        eprintln!();
        eprintln!("Usage: {} <file.c> [--abi=64|32] [--pack=N]", program_name);
        eprintln!();
        eprintln!("Prints the size, alignment, and member offsets of every");
        eprintln!("aggregate declared in the file, plus initializer coverage");
        eprintln!("for initialized variables.");
        std::process::exit(1);
    }

    let input_file = &args[1];
    let mut profile = AbiProfile::lp64();
    for arg in &args[2..] {
        if let Some(abi) = arg.strip_prefix("--abi=") {
            profile = match abi {
                "64" => AbiProfile::lp64(),
                "32" => AbiProfile::ilp32(),
                other => {
                    eprintln!("Error: unknown ABI '{}' (use 64 or 32)", other);
                    std::process::exit(1);
                }
            };
        } else if let Some(pack) = arg.strip_prefix("--pack=") {
            match pack.parse::<usize>() {
                Ok(n) if n > 0 => profile = profile.with_pack(n),
                _ => {
                    eprintln!("Error: invalid pack value '{}'", pack);
                    std::process::exit(1);
                }
            }
        } else {
            eprintln!("Error: unknown option '{}'", arg);
            std::process::exit(1);
        }
    }

    if !Path::new(input_file).exists() {
        eprintln!("Error: File '{}' not found", input_file);
        std::process::exit(1);
    }

    let source = fs::read_to_string(input_file)?;
    report(&source, &profile)
}

/// Run one session over `source` and print the layout report.
fn report(
    source: &str,
    profile: &AbiProfile,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut parser = Parser::new(source)?;
    let unit = parser.parse_unit()?;
    let resolved = resolve_unit(&unit)?;

    let mut engine = LayoutEngine::new(&resolved.table, profile);

    for aggregate in resolved.table.aggregates_in_order() {
        match engine.layout_of(&aggregate.key) {
            Ok(layout) => {
                println!(
                    "{} (size {}, align {}, abi {})",
                    aggregate.display_name(),
                    layout.size,
                    layout.align,
                    profile.name
                );
                let mut expected = 0usize;
                for (member, field) in
                    aggregate.members.iter().zip(&layout.fields)
                {
                    if field.offset > expected {
                        println!(
                            "    {:>4} | <padding> ({} bytes)",
                            expected,
                            field.offset - expected
                        );
                    }
                    println!(
                        "    {:>4} | {:<12} {} ({} bytes)",
                        field.offset,
                        member.name.as_deref().unwrap_or("<anonymous>"),
                        type_desc(&member.ty),
                        field.size
                    );
                    expected = expected.max(field.offset + field.size);
                }
                if layout.size > expected {
                    println!(
                        "    {:>4} | <padding> ({} bytes)",
                        expected,
                        layout.size - expected
                    );
                }
            }
            Err(err) => {
                println!(
                    "{}: layout unavailable: {}",
                    aggregate.display_name(),
                    err
                );
            }
        }
        println!();
    }

    for variable in &resolved.variables {
        let Some(InitValue::List(list)) = &variable.init else {
            continue;
        };
        if variable.ty.pointer_depth > 0 || !variable.ty.array_dims.is_empty()
        {
            continue;
        }
        let TypeName::TagRef(_, key) = &variable.ty.base else {
            continue;
        };
        let Some(aggregate) = resolved.table.aggregate(key) else {
            continue;
        };
        let layout = engine.layout_of(key)?;
        let report =
            validate_initializer(&resolved.table, aggregate, &layout, list)?;
        println!(
            "{} = {{...}}: {} explicit, {} partial, {} zero-filled",
            variable.name, report.explicit, report.partial, report.zero_filled
        );
        for entry in &report.entries {
            let state = match entry.state {
                InitState::Explicit => "explicit",
                InitState::Partial => "partial",
                InitState::ZeroFilled => "zero",
            };
            println!(
                "    {:>4} | {:<12} {}",
                entry.offset,
                entry.name.as_deref().unwrap_or("<anonymous>"),
                state
            );
        }
        println!();
    }

    Ok(())
}

/// Human-readable form of a canonical type for the report
fn type_desc(ty: &Type) -> String {
    let base = match &ty.base {
        TypeName::Primitive(prim) => prim.to_string(),
        TypeName::TagRef(_, key) | TypeName::EnumRef(key) => {
            TypeTable::display_key(key)
        }
        TypeName::TypedefRef(name) => name.clone(),
        TypeName::AggregateDef(body) => format!("{} {{...}}", body.kind),
        TypeName::EnumDef(_) => "enum {...}".to_string(),
    };
    let mut desc = base;
    for _ in 0..ty.pointer_depth {
        desc.push('*');
    }
    for dim in &ty.array_dims {
        match dim {
            Some(n) => desc.push_str(&format!("[{}]", n)),
            None => desc.push_str("[]"),
        }
    }
    desc
}
