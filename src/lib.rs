//! Funk - a small expression language compiled to bytecode.
//!
//! Funk supports integers, floats, booleans, strings, arrays, hashes,
//! first-class functions with closures, conditionals (including the
//! ternary operator), prefix/infix/postfix operators including bit
//! operations, `let` bindings with lexical scoping, and a small set of
//! built-in functions.
//!
//! # Architecture
//!
//! Programs run through a three-stage pipeline:
//!
//! 1. **Lexing & Parsing** (`lexer`, `parser` modules)
//!    - Tokenizes source text
//!    - Builds an AST with a Pratt parser driven by a precedence table
//! 2. **Compilation** (`bytecode::compiler`)
//!    - Walks the AST once, emitting opcodes with big-endian operands
//!    - Resolves names to global/local/builtin/free symbols and performs
//!      closure conversion
//!    - Back-patches forward jumps for conditionals
//! 3. **Execution** (`bytecode::vm`)
//!    - Stack machine with call frames and base-pointer-relative locals
//!    - Globals vector and append-only constant pool, both reusable across
//!      REPL iterations
//!
//! # Example
//!
//! ```
//! use funk::bytecode::{Compiler, Vm};
//! use funk::lexer::Lexer;
//! use funk::object::Value;
//! use funk::parser::Parser;
//!
//! let lexer = Lexer::new("let double = funk(x) { x * 2 }; double(21)");
//! let mut parser = Parser::new(lexer);
//! let program = parser.parse_program();
//! assert!(parser.errors().is_empty());
//!
//! let mut compiler = Compiler::new();
//! compiler.compile(&program).unwrap();
//!
//! let mut vm = Vm::new(compiler.bytecode());
//! vm.run().unwrap();
//! assert_eq!(vm.last_popped(), &Value::Integer(42));
//! ```

pub mod ast;
pub mod bytecode;
pub mod lexer;
pub mod object;
pub mod parser;
pub mod repl;
pub mod token;

pub use bytecode::{Bytecode, CompileError, Compiler, Vm, VmError};
pub use lexer::Lexer;
pub use object::Value;
pub use parser::Parser;
pub use token::{Token, TokenKind};
