//! Funk CLI: evaluate a source file or run the interactive REPL.

use std::io::Read;
use std::process;
use std::{env, fs, io};

use tracing_subscriber::EnvFilter;

use funk::bytecode::{Compiler, Vm, VmConfig};
use funk::lexer::Lexer;
use funk::parser::Parser;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_usage() {
    eprintln!("Funk v{}", VERSION);
    eprintln!();
    eprintln!("USAGE:");
    eprintln!("    funk [OPTIONS] [INPUT]");
    eprintln!();
    eprintln!("OPTIONS:");
    eprintln!("    -h, --help       Print this help message");
    eprintln!("    -v, --version    Print version information");
    eprintln!("    --repl           Start the interactive REPL (default without INPUT)");
    eprintln!("    --disasm         Print bytecode instead of executing");
    eprintln!("    --trace          Trace executed instructions (needs RUST_LOG=trace)");
    eprintln!();
    eprintln!("ARGUMENTS:");
    eprintln!("    [INPUT]          Input Funk file (use '-' for stdin)");
    eprintln!();
    eprintln!("EXAMPLES:");
    eprintln!("    funk program.funk");
    eprintln!("    funk --disasm program.funk");
    eprintln!("    cat program.funk | funk -");
    eprintln!("    funk");
}

struct Options {
    input: Option<String>,
    repl_mode: bool,
    disasm: bool,
    trace: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();

    let mut input = None;
    let mut repl_mode = false;
    let mut disasm = false;
    let mut trace = false;

    for arg in &args[1..] {
        match arg.as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-v" | "--version" => {
                println!("Funk {}", VERSION);
                process::exit(0);
            }
            "--repl" => repl_mode = true,
            "--disasm" => disasm = true,
            "--trace" => trace = true,
            arg if arg.starts_with('-') && arg != "-" => {
                return Err(format!("Unknown option: {}", arg));
            }
            arg => {
                if input.is_some() {
                    return Err("Multiple input files specified".to_string());
                }
                input = Some(arg.to_string());
            }
        }
    }

    Ok(Options {
        input,
        repl_mode,
        disasm,
        trace,
    })
}

fn read_input(input: &str) -> Result<String, String> {
    if input == "-" {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(|err| format!("Failed to read from stdin: {}", err))?;
        Ok(buffer)
    } else {
        fs::read_to_string(input)
            .map_err(|err| format!("Failed to read file '{}': {}", input, err))
    }
}

fn run_source(source: &str, options: &Options) -> Result<(), String> {
    let lexer = Lexer::new(source);
    let mut parser = Parser::new(lexer);
    let program = parser.parse_program();

    if !parser.errors().is_empty() {
        return Err(format!("parser errors:\n\t{}", parser.errors().join("\n\t")));
    }

    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .map_err(|err| format!("compilation failed: {}", err))?;
    let bytecode = compiler.bytecode();

    if options.disasm {
        print!("{}", bytecode.instructions);
        for (index, constant) in bytecode.constants.iter().enumerate() {
            println!("CONSTANT {}: {}", index, constant);
        }
        return Ok(());
    }

    let mut vm = Vm::with_config(
        bytecode,
        VmConfig {
            trace: options.trace,
        },
    );
    vm.run()
        .map_err(|err| format!("executing bytecode failed: {}", err))?;
    println!("{}", vm.last_popped());
    Ok(())
}

fn run_repl() {
    let user = env::var("USER")
        .or_else(|_| env::var("USERNAME"))
        .unwrap_or_else(|_| "friend".to_string());
    println!("Hello {}! This is the Funk programming language!", user);
    println!("Feel free to type in commands");

    if let Err(err) = funk::repl::start() {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let options = match parse_args() {
        Ok(options) => options,
        Err(err) => {
            eprintln!("Error: {}", err);
            eprintln!();
            print_usage();
            process::exit(1);
        }
    };

    if options.repl_mode || options.input.is_none() {
        run_repl();
        return;
    }

    let input = options.input.as_deref().unwrap_or("-");
    let source = match read_input(input) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("Error: {}", err);
            process::exit(1);
        }
    };

    if let Err(err) = run_source(&source, &options) {
        eprintln!("Error: {}", err);
        process::exit(1);
    }
}
