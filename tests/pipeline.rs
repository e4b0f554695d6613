//! End-to-end pipeline tests: source text through lexer, parser, compiler,
//! and VM to a final value.

use funk::bytecode::{make, Compiler, Opcode, Vm};
use funk::lexer::Lexer;
use funk::object::Value;
use funk::parser::Parser;

fn eval(input: &str) -> Value {
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer);
    let program = parser.parse_program();
    assert!(
        parser.errors().is_empty(),
        "parser errors for {:?}: {:?}",
        input,
        parser.errors()
    );

    let mut compiler = Compiler::new();
    compiler
        .compile(&program)
        .unwrap_or_else(|err| panic!("compile error for {:?}: {}", input, err));

    let mut vm = Vm::new(compiler.bytecode());
    vm.run()
        .unwrap_or_else(|err| panic!("vm error for {:?}: {}", input, err));
    vm.last_popped().clone()
}

#[test]
fn arithmetic_precedence() {
    assert_eq!(eval("1 + 2 * 3"), Value::Integer(7));
}

#[test]
fn fibonacci() {
    let input = "
        let fib = funk(n) { if (n < 2) { n } else { fib(n-1) + fib(n-2) } };
        fib(10)
    ";
    assert_eq!(eval(input), Value::Integer(55));
}

#[test]
fn closures_capture_free_variables() {
    let input = "
        let newAdder = funk(x) { funk(y) { x + y } };
        let addTwo = newAdder(2);
        addTwo(3)
    ";
    assert_eq!(eval(input), Value::Integer(5));
}

#[test]
fn closure_bytecode_shape() {
    let input = "let newAdder = funk(x) { funk(y) { x + y } };";
    let lexer = Lexer::new(input);
    let mut parser = Parser::new(lexer);
    let program = parser.parse_program();
    assert!(parser.errors().is_empty());

    let mut compiler = Compiler::new();
    compiler.compile(&program).unwrap();
    let bytecode = compiler.bytecode();

    // constants: [inner funk, newAdder funk]
    let Value::CompiledFunction(inner) = &bytecode.constants[0] else {
        panic!("constant 0 is not a function: {:?}", bytecode.constants[0]);
    };
    let Value::CompiledFunction(outer) = &bytecode.constants[1] else {
        panic!("constant 1 is not a function: {:?}", bytecode.constants[1]);
    };

    // The inner function reads `x` as its first free variable
    let get_free = make(Opcode::GetFree, &[0]);
    assert!(
        inner
            .instructions
            .windows(get_free.len())
            .any(|window| window == &get_free[..]),
        "inner function must load free variable 0:\n{}",
        inner.instructions
    );

    // newAdder pushes the captured value, then wraps the inner function
    // into a closure with one free variable
    let mut expected = Vec::new();
    expected.extend(make(Opcode::GetLocal, &[0]));
    expected.extend(make(Opcode::Closure, &[0, 1]));
    assert!(
        outer
            .instructions
            .windows(expected.len())
            .any(|window| window == &expected[..]),
        "outer function must emit get_local 0 followed by closure 0 1:\n{}",
        outer.instructions
    );
}

#[test]
fn hash_index_arithmetic() {
    assert_eq!(eval(r#"{"a": 1, "b": 2}["b"] + 10"#), Value::Integer(12));
}

#[test]
fn string_hash_key_uses_fnv1a() {
    let key = Value::String("b".to_string()).hash_key().unwrap();
    // FNV-1a 64 of the single byte 'b'
    let expected = (0xcbf29ce484222325u64 ^ u64::from(b'b')).wrapping_mul(0x100000001b3);
    assert_eq!(key.value, expected);
}

#[test]
fn untaken_conditional_is_null() {
    assert_eq!(eval("if (false) { 10 }"), Value::Null);
}

#[test]
fn push_does_not_mutate_its_input() {
    assert_eq!(eval("len(push([1, 2], 3))"), Value::Integer(3));
    // The original array is unchanged under a second evaluation
    assert_eq!(
        eval("let a = [1, 2]; len(push(a, 3)); len(push(a, 3))"),
        Value::Integer(3)
    );
    assert_eq!(eval("let a = [1, 2]; push(a, 3); len(a)"), Value::Integer(2));
}

#[test]
fn array_indexing_round_trip() {
    let elements = ["1 + 1", "7", "2 * 13", "len(\"four\")"];
    let list = format!("[{}]", elements.join(", "));
    for (index, element) in elements.iter().enumerate() {
        assert_eq!(
            eval(&format!("{}[{}]", list, index)),
            eval(element),
            "element {}",
            index
        );
    }
}

#[test]
fn double_negation_round_trips() {
    for input in ["true", "false"] {
        assert_eq!(eval(&format!("!!{}", input)), eval(input));
    }
    for input in ["0", "1", "-7", "123456"] {
        assert_eq!(eval(&format!("~~({})", input)), eval(input));
    }
}

#[test]
fn calling_directly_equals_calling_through_binding() {
    let cases = [
        ("funk(x) { x * 2 }", "21"),
        ("funk(a, b) { a + b }", "1, 2"),
        ("funk() { 42 }", ""),
    ];
    for (function, args) in cases {
        let direct = eval(&format!("({})({})", function, args));
        let bound = eval(&format!("let g = {}; g({})", function, args));
        assert_eq!(direct, bound, "function: {}", function);
    }
}

#[test]
fn ternary_and_bitwise_pipeline() {
    assert_eq!(eval("1 << 4 >> 2"), Value::Integer(4));
    assert_eq!(eval("((5 & 3) == 1) ? 10 : 20"), Value::Integer(10));
    assert_eq!(eval("power(2, 8) ^ 255"), Value::Integer(511));
}

#[test]
fn error_values_flow_through_the_stack() {
    assert_eq!(
        eval("len(1)"),
        Value::Error("argument to `len` not supported. got: INTEGER".to_string())
    );
}
