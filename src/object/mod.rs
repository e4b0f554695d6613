//! Runtime value model.
//!
//! All runtime values live in the single closed [`Value`] enum. Compiled
//! functions and closures are shared through `Arc` so the constant pool,
//! the stack, and captured environments can alias them cheaply. Hash keys
//! are restricted to the hashable subset (integers, booleans, strings).

pub mod builtins;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use smallvec::SmallVec;

pub use builtins::{BuiltinDef, BuiltinFunction, BUILTINS};

use crate::bytecode::Instructions;

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Null,
    String(String),
    Array(Vec<Value>),
    Hash(HashMap<HashKey, HashPair>),
    CompiledFunction(Arc<CompiledFunction>),
    Closure(Arc<Closure>),
    Builtin(&'static BuiltinDef),
    Error(String),
}

impl Value {
    /// Uppercase type tag used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Boolean(_) => "BOOLEAN",
            Value::Null => "NULL",
            Value::String(_) => "STRING",
            Value::Array(_) => "ARRAY",
            Value::Hash(_) => "HASH",
            Value::CompiledFunction(_) => "COMPILED_FUNCTION",
            Value::Closure(_) => "CLOSURE",
            Value::Builtin(_) => "BUILTIN",
            Value::Error(_) => "ERROR",
        }
    }

    /// `Null` and `false` are falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Boolean(value) => *value,
            Value::Null => false,
            _ => true,
        }
    }

    /// Compute the hash key for values in the hashable subset.
    pub fn hash_key(&self) -> Option<HashKey> {
        match self {
            Value::Integer(value) => Some(HashKey {
                kind: self.type_name(),
                value: *value as u64,
            }),
            Value::Boolean(value) => Some(HashKey {
                kind: self.type_name(),
                value: u64::from(*value),
            }),
            Value::String(value) => Some(HashKey {
                kind: self.type_name(),
                value: fnv1a(value.as_bytes()),
            }),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(value) => write!(f, "{}", value),
            Value::Float(value) => write!(f, "{:.6}", value),
            Value::Boolean(value) => write!(f, "{}", value),
            Value::Null => write!(f, "null"),
            Value::String(value) => write!(f, "{}", value),
            Value::Array(elements) => write!(f, "[{}]", elements.iter().join(", ")),
            Value::Hash(pairs) => {
                write!(
                    f,
                    "{{{}}}",
                    pairs
                        .values()
                        .map(|pair| format!("{}: {}", pair.key, pair.value))
                        .join(", ")
                )
            }
            Value::CompiledFunction(func) => {
                write!(f, "CompiledFunction[{:p}]", Arc::as_ptr(func))
            }
            Value::Closure(closure) => write!(f, "Closure[{:p}]", Arc::as_ptr(closure)),
            Value::Builtin(_) => write!(f, "builtin function"),
            Value::Error(message) => write!(f, "ERROR: {}", message),
        }
    }
}

/// Key under which a hashable value is stored: a type tag plus a 64-bit
/// digest. Keys of different types never collide because the tag is part
/// of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HashKey {
    pub kind: &'static str,
    pub value: u64,
}

/// A hash entry keeps the original key object next to the value so the
/// display form can reproduce it.
#[derive(Debug, Clone, PartialEq)]
pub struct HashPair {
    pub key: Value,
    pub value: Value,
}

/// Bytecode plus the frame layout facts the VM needs to call it.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFunction {
    pub instructions: Instructions,
    /// Number of local binding slots, parameters included.
    pub num_locals: usize,
    pub num_parameters: usize,
}

/// A compiled function bundled with its captured free values. Most
/// closures capture only a handful of bindings, so they live inline.
#[derive(Debug, Clone, PartialEq)]
pub struct Closure {
    pub func: Arc<CompiledFunction>,
    pub free: SmallVec<[Value; 4]>,
}

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a 64-bit. The algorithm is part of the language contract: string
/// hash keys must digest to these exact values.
fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}
