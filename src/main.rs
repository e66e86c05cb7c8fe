use cinder::compiler::ir::{ArchitectureInfo, RegisterSize, RuntimeStatic};
use std::env;
use std::fs;
use std::process;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    let mut file = None;
    let mut print_ast = false;
    let mut architecture = ArchitectureInfo::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--ast" => print_ast = true,
            "--address-size" => {
                architecture.address_size = parse_size_argument(&args, &mut i);
            }
            "--default-size" => {
                architecture.default_size = parse_size_argument(&args, &mut i);
            }
            "help" | "--help" | "-h" => {
                print_usage();
                return;
            }
            "version" | "--version" | "-v" => {
                println!("cinder {}", env!("CARGO_PKG_VERSION"));
                return;
            }
            other if other.starts_with('-') => {
                eprintln!("error: unknown option '{}'\n", other);
                print_usage();
                process::exit(1);
            }
            other => {
                if file.replace(other.to_string()).is_some() {
                    eprintln!("error: more than one source file given\n");
                    process::exit(1);
                }
            }
        }
        i += 1;
    }

    let file = file.unwrap_or_else(|| {
        eprintln!("error: no source file provided\n");
        print_usage();
        process::exit(1);
    });

    if print_ast {
        let source = read_source(&file);
        match cinder::source_to_ast_json(&file, &source) {
            Ok(json) => println!("{}", json),
            Err(error) => {
                eprintln!("{}", error);
                process::exit(1);
            }
        }
        return;
    }

    match cinder::compile_file(&file, architecture) {
        Ok(statics) => {
            for static_entry in &statics {
                match static_entry {
                    RuntimeStatic::Function(function) => print!("{}", function),
                    RuntimeStatic::Constant(constant) => print!("{}", constant_summary(constant)),
                }
            }
        }
        Err(error) => {
            error.report();
            process::exit(1);
        }
    }
}

fn constant_summary(constant: &cinder::compiler::ir::StaticConstant) -> String {
    let mut summary = format!(
        "{}: {} bytes align {} =",
        constant.name,
        constant.data.len(),
        constant.alignment
    );
    for byte in &constant.data {
        summary.push_str(&format!(" {:02x}", byte));
    }
    summary.push('\n');
    summary
}

fn parse_size_argument(args: &[String], i: &mut usize) -> RegisterSize {
    *i += 1;
    let value = args.get(*i).unwrap_or_else(|| {
        eprintln!("error: expected a size (8/16/32/64) after '{}'", args[*i - 1]);
        process::exit(1);
    });
    let bits: u64 = value.parse().unwrap_or(0);
    RegisterSize::from_bits(bits).unwrap_or_else(|| {
        eprintln!("error: invalid size '{}'; expected 8, 16, 32 or 64", value);
        process::exit(1);
    })
}

fn read_source(file: &str) -> String {
    fs::read_to_string(file).unwrap_or_else(|error| {
        eprintln!("error: cannot read '{}': {}", file, error);
        process::exit(1);
    })
}

fn print_usage() {
    println!(
        "Cinder — statically typed low-level systems language\n\
         \n\
         Usage:\n\
         \x20 cinder <file.cin> [options]      Compile and print the IR\n\
         \x20 cinder <file.cin> --ast          Print the AST as JSON\n\
         \x20 cinder help                      Show this message\n\
         \x20 cinder version                   Show version\n\
         \n\
         Options:\n\
         \x20 --address-size <8|16|32|64>      Pointer width in bits (default 64)\n\
         \x20 --default-size <8|16|32|64>      Default integer width in bits (default 64)"
    );
}
