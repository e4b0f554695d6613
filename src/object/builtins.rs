//! Built-in functions.
//!
//! The table order is part of the bytecode contract: `GetBuiltin` operands
//! index into it, so entries must never be reordered, only appended.

use super::Value;

/// A built-in takes its argument window and returns a value, or `None` when
/// it has nothing to produce (the VM pushes `null` in that case). Contract
/// violations are reported as first-class `Error` values, not VM errors.
pub type BuiltinFunction = fn(&[Value]) -> Option<Value>;

#[derive(Debug, PartialEq)]
pub struct BuiltinDef {
    pub name: &'static str,
    pub func: BuiltinFunction,
}

pub static BUILTINS: &[BuiltinDef] = &[
    BuiltinDef {
        name: "len",
        func: builtin_len,
    },
    BuiltinDef {
        name: "puts",
        func: builtin_puts,
    },
    BuiltinDef {
        name: "first",
        func: builtin_first,
    },
    BuiltinDef {
        name: "last",
        func: builtin_last,
    },
    BuiltinDef {
        name: "rest",
        func: builtin_rest,
    },
    BuiltinDef {
        name: "push",
        func: builtin_push,
    },
    BuiltinDef {
        name: "power",
        func: builtin_power,
    },
];

/// Look up a built-in by name (used by the symbol table and tests).
pub fn lookup(name: &str) -> Option<&'static BuiltinDef> {
    BUILTINS.iter().find(|def| def.name == name)
}

fn new_error(message: String) -> Option<Value> {
    Some(Value::Error(message))
}

fn builtin_len(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got: {}, want: 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::String(value) => Some(Value::Integer(value.len() as i64)),
        Value::Array(elements) => Some(Value::Integer(elements.len() as i64)),
        other => new_error(format!(
            "argument to `len` not supported. got: {}",
            other.type_name()
        )),
    }
}

fn builtin_puts(args: &[Value]) -> Option<Value> {
    for arg in args {
        println!("{}", arg);
    }
    None
}

fn builtin_first(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got: {}, want: 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.first().cloned(),
        other => new_error(format!(
            "argument to `first` must be of ARRAY type, got {}",
            other.type_name()
        )),
    }
}

fn builtin_last(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got: {}, want: 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => elements.last().cloned(),
        other => new_error(format!(
            "argument to `last` must be of ARRAY type, got {}",
            other.type_name()
        )),
    }
}

fn builtin_rest(args: &[Value]) -> Option<Value> {
    if args.len() != 1 {
        return new_error(format!(
            "wrong number of arguments. got: {}, want: 1",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            if elements.is_empty() {
                None
            } else {
                Some(Value::Array(elements[1..].to_vec()))
            }
        }
        other => new_error(format!(
            "argument to `rest` must be of ARRAY type, got {}",
            other.type_name()
        )),
    }
}

fn builtin_push(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return new_error(format!(
            "wrong number of arguments. got: {}, want: 2",
            args.len()
        ));
    }
    match &args[0] {
        Value::Array(elements) => {
            // The input array is left untouched
            let mut appended = elements.clone();
            appended.push(args[1].clone());
            Some(Value::Array(appended))
        }
        other => new_error(format!(
            "argument to `push` must be of ARRAY type, got {}",
            other.type_name()
        )),
    }
}

fn builtin_power(args: &[Value]) -> Option<Value> {
    if args.len() != 2 {
        return new_error(format!(
            "wrong number of arguments for power. got: {}, want: 2",
            args.len()
        ));
    }
    match (&args[0], &args[1]) {
        (Value::Integer(base), Value::Integer(exponent)) => {
            let result = (*base as f64).powf(*exponent as f64);
            // Integral results collapse back to integers
            if result == (result as i64) as f64 {
                Some(Value::Integer(result as i64))
            } else {
                Some(Value::Float(result))
            }
        }
        (left, right) => new_error(format!(
            "arguments to `power` must be of INTEGER type, got: {} (1st argument) | {} (2nd argument)",
            left.type_name(),
            right.type_name()
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order_is_stable() {
        let names: Vec<_> = BUILTINS.iter().map(|def| def.name).collect();
        assert_eq!(names, ["len", "puts", "first", "last", "rest", "push", "power"]);
    }

    #[test]
    fn test_len() {
        assert_eq!(
            builtin_len(&[Value::String("hello".into())]),
            Some(Value::Integer(5))
        );
        assert_eq!(
            builtin_len(&[Value::Array(vec![Value::Integer(1), Value::Integer(2)])]),
            Some(Value::Integer(2))
        );
        assert_eq!(
            builtin_len(&[Value::Integer(1)]),
            Some(Value::Error(
                "argument to `len` not supported. got: INTEGER".into()
            ))
        );
        assert_eq!(
            builtin_len(&[]),
            Some(Value::Error("wrong number of arguments. got: 0, want: 1".into()))
        );
    }

    #[test]
    fn test_first_last_rest_on_empty_array() {
        let empty = Value::Array(vec![]);
        assert_eq!(builtin_first(std::slice::from_ref(&empty)), None);
        assert_eq!(builtin_last(std::slice::from_ref(&empty)), None);
        assert_eq!(builtin_rest(std::slice::from_ref(&empty)), None);
    }

    #[test]
    fn test_rest_drops_the_head() {
        let arr = Value::Array(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]);
        assert_eq!(
            builtin_rest(&[arr]),
            Some(Value::Array(vec![Value::Integer(2), Value::Integer(3)]))
        );
    }

    #[test]
    fn test_push_leaves_input_untouched() {
        let original = Value::Array(vec![Value::Integer(1), Value::Integer(2)]);
        let pushed = builtin_push(&[original.clone(), Value::Integer(3)]);
        assert_eq!(
            pushed,
            Some(Value::Array(vec![
                Value::Integer(1),
                Value::Integer(2),
                Value::Integer(3)
            ]))
        );
        assert_eq!(
            original,
            Value::Array(vec![Value::Integer(1), Value::Integer(2)])
        );
    }

    #[test]
    fn test_power() {
        assert_eq!(
            builtin_power(&[Value::Integer(2), Value::Integer(10)]),
            Some(Value::Integer(1024))
        );
        assert_eq!(
            builtin_power(&[Value::Integer(2), Value::Integer(-1)]),
            Some(Value::Float(0.5))
        );
        assert!(matches!(
            builtin_power(&[Value::Integer(2), Value::Boolean(true)]),
            Some(Value::Error(_))
        ));
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("len").map(|d| d.name), Some("len"));
        assert!(lookup("nope").is_none());
    }
}
