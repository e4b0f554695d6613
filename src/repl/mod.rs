//! Interactive read-eval-print loop.
//!
//! Each line runs parse → compile → run. The symbol table, constant pool,
//! and globals vector survive across iterations by injecting them into a
//! fresh compiler and VM, so `let` bindings keep working on later lines.

use std::path::PathBuf;

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::debug;

use crate::bytecode::{Compiler, SymbolTable, Vm, GLOBALS_SIZE};
use crate::lexer::Lexer;
use crate::object::Value;
use crate::parser::Parser;

const PROMPT: &str = ">> ";

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".funk_history"))
}

/// Run the REPL until end-of-input or interrupt.
pub fn start() -> rustyline::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = &history {
        // Missing history is fine on first launch
        let _ = editor.load_history(path);
    }

    let mut symbol_table = SymbolTable::new();
    let mut constants: Vec<Value> = Vec::new();
    let mut globals = vec![Value::Null; GLOBALS_SIZE];

    loop {
        let line = match editor.readline(PROMPT) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => return Err(err),
        };

        if line.trim().is_empty() {
            continue;
        }
        editor.add_history_entry(&line)?;

        let lexer = Lexer::new(&line);
        let mut parser = Parser::new(lexer);
        let program = parser.parse_program();

        if !parser.errors().is_empty() {
            println!("parser errors:");
            for error in parser.errors() {
                println!("\t{}", error);
            }
            continue;
        }

        // Fresh compiler, carried-over state
        let mut compiler = Compiler::with_state(symbol_table, constants);
        let compiled = compiler.compile(&program);
        let bytecode = compiler.bytecode();
        (symbol_table, constants) = compiler.into_state();

        if let Err(err) = compiled {
            println!("compilation failed:\n {}", err);
            continue;
        }

        let mut vm = Vm::with_globals(bytecode, globals);
        let result = vm.run();
        let last = vm.last_popped().clone();
        globals = vm.into_globals();

        match result {
            Ok(()) => println!("{}", last),
            Err(err) => println!("executing bytecode failed:\n {}", err),
        }
    }

    if let Some(path) = &history {
        if let Err(err) = editor.save_history(path) {
            debug!(error = %err, "could not save history");
        }
    }
    Ok(())
}
