//! Stack-based virtual machine.
//!
//! The VM executes compiled bytecode with a preallocated value stack, a
//! frame stack for calls, and a globals vector. `stack[sp]` (one past the
//! top) intentionally keeps the last popped value so the REPL can report
//! the result of an expression statement after its trailing pop.

use std::collections::HashMap;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::object::{builtins::BUILTINS, BuiltinDef, Closure, CompiledFunction, HashPair, Value};

use super::compiler::Bytecode;
use super::instructions::{read_u16, read_u8};
use super::opcodes::Opcode;

/// Value stack depth.
pub const STACK_SIZE: usize = 2048;
/// Size of the globals vector.
pub const GLOBALS_SIZE: usize = 65536;
/// Call depth limit.
pub const MAX_FRAMES: usize = 1024;

/// Result of VM execution
pub type VmResult<T> = Result<T, VmError>;

/// Errors that abort execution. Builtin contract violations are not here:
/// those come back as first-class `Error` values on the stack.
#[derive(Debug, Clone, PartialEq)]
pub enum VmError {
    StackOverflow,
    StackUnderflow,
    FrameOverflow,
    UnknownOpcode(u8),
    InvalidConstant(usize),
    UnsupportedBinaryTypes(&'static str, &'static str),
    UnsupportedComparison {
        opcode: Opcode,
        left: &'static str,
        right: &'static str,
    },
    UnsupportedNegation(&'static str),
    DivisionByZero,
    NotCallable(&'static str),
    WrongNumberOfArguments {
        want: usize,
        got: usize,
    },
    NotAFunction(&'static str),
    UnknownBuiltin(usize),
    Unhashable(&'static str),
    IndexNotSupported(&'static str),
    ReturnOutsideFunction,
}

impl std::fmt::Display for VmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::StackOverflow => write!(f, "stack overflow"),
            Self::StackUnderflow => write!(f, "stack underflow"),
            Self::FrameOverflow => write!(f, "frame stack overflow"),
            Self::UnknownOpcode(byte) => write!(f, "opcode {} undefined", byte),
            Self::InvalidConstant(index) => write!(f, "constant {} undefined", index),
            Self::UnsupportedBinaryTypes(left, right) => {
                write!(f, "unsupported types for binary operation: {} {}", left, right)
            }
            Self::UnsupportedComparison {
                opcode,
                left,
                right,
            } => write!(f, "unknown operator: {} ({} {})", opcode, left, right),
            Self::UnsupportedNegation(operand) => {
                write!(f, "unsupported type for negation: {}", operand)
            }
            Self::DivisionByZero => write!(f, "division by zero"),
            Self::NotCallable(_) => write!(f, "calling non-function and non-built-in"),
            Self::WrongNumberOfArguments { want, got } => {
                write!(f, "wrong number of arguments: want={}, got={}", want, got)
            }
            Self::NotAFunction(kind) => write!(f, "not a function: {}", kind),
            Self::UnknownBuiltin(index) => write!(f, "builtin {} undefined", index),
            Self::Unhashable(kind) => write!(f, "unusable as hash key: {}", kind),
            Self::IndexNotSupported(kind) => {
                write!(f, "index operator not supported: {}", kind)
            }
            Self::ReturnOutsideFunction => write!(f, "return outside of a function"),
        }
    }
}

impl std::error::Error for VmError {}

/// Configuration for the VM.
#[derive(Debug, Clone, Default)]
pub struct VmConfig {
    /// Emit a trace event per executed instruction.
    pub trace: bool,
}

/// Per-call state. `ip` starts at -1 so the fetch loop's increment lands on
/// the first instruction.
#[derive(Debug)]
struct Frame {
    closure: Arc<Closure>,
    ip: isize,
    base_pointer: usize,
}

impl Frame {
    fn new(closure: Arc<Closure>, base_pointer: usize) -> Self {
        Frame {
            closure,
            ip: -1,
            base_pointer,
        }
    }
}

pub struct Vm {
    constants: Vec<Value>,
    /// Preallocated; `sp` points at the next free slot, so the top of the
    /// stack is `stack[sp - 1]`.
    stack: Vec<Value>,
    sp: usize,
    globals: Vec<Value>,
    frames: Vec<Frame>,
    config: VmConfig,
}

impl Vm {
    pub fn new(bytecode: Bytecode) -> Self {
        Self::with_globals(bytecode, vec![Value::Null; GLOBALS_SIZE])
    }

    /// Run against an existing globals vector so the REPL keeps bindings
    /// across iterations.
    pub fn with_globals(bytecode: Bytecode, globals: Vec<Value>) -> Self {
        // The main program is wrapped in a synthetic closure so the fetch
        // loop only ever deals with frames
        let main_function = Arc::new(CompiledFunction {
            instructions: bytecode.instructions,
            num_locals: 0,
            num_parameters: 0,
        });
        let main_closure = Arc::new(Closure {
            func: main_function,
            free: SmallVec::new(),
        });

        Vm {
            constants: bytecode.constants,
            stack: vec![Value::Null; STACK_SIZE],
            sp: 0,
            globals,
            frames: vec![Frame::new(main_closure, 0)],
            config: VmConfig::default(),
        }
    }

    pub fn with_config(bytecode: Bytecode, config: VmConfig) -> Self {
        let mut vm = Self::new(bytecode);
        vm.config = config;
        vm
    }

    /// Hand the globals back for the next REPL turn.
    pub fn into_globals(self) -> Vec<Value> {
        self.globals
    }

    /// The value most recently popped off the stack; after a successful
    /// top-level run this is the last expression statement's result.
    pub fn last_popped(&self) -> &Value {
        &self.stack[self.sp]
    }

    pub fn run(&mut self) -> VmResult<()> {
        loop {
            let (ip, byte) = {
                let frame = self.current_frame_mut();
                let len = frame.closure.func.instructions.len() as isize;
                if frame.ip >= len - 1 {
                    break;
                }
                frame.ip += 1;
                let ip = frame.ip as usize;
                (ip, frame.closure.func.instructions[ip])
            };

            let opcode = Opcode::from_byte(byte).ok_or(VmError::UnknownOpcode(byte))?;
            if self.config.trace {
                trace!(ip, op = opcode.mnemonic(), sp = self.sp, "execute");
            }

            match opcode {
                Opcode::Constant => {
                    let index = self.read_u16_operand();
                    let constant = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or(VmError::InvalidConstant(index))?;
                    self.push(constant)?;
                }
                Opcode::True => self.push(Value::Boolean(true))?,
                Opcode::False => self.push(Value::Boolean(false))?,
                Opcode::Null => self.push(Value::Null)?,
                Opcode::Pop => {
                    self.pop()?;
                }

                Opcode::Add
                | Opcode::Sub
                | Opcode::Mul
                | Opcode::Div
                | Opcode::Pipe
                | Opcode::Ampersand
                | Opcode::Exponent
                | Opcode::RShift
                | Opcode::LShift => self.execute_binary_operation(opcode)?,

                Opcode::Equal | Opcode::NotEqual | Opcode::GreaterThan => {
                    self.execute_comparison(opcode)?
                }

                Opcode::Bang => self.execute_bang_operator()?,
                Opcode::Minus
                | Opcode::Tilde
                | Opcode::PreInc
                | Opcode::PreDec
                | Opcode::PostInc
                | Opcode::PostDec => self.execute_unary_operation(opcode)?,

                Opcode::Jump => {
                    let target = self.read_u16_operand();
                    // The loop's increment lands the ip on the target
                    self.current_frame_mut().ip = target as isize - 1;
                }
                Opcode::JumpNotTruthy => {
                    let target = self.read_u16_operand();
                    let condition = self.pop()?;
                    if !condition.is_truthy() {
                        self.current_frame_mut().ip = target as isize - 1;
                    }
                }

                Opcode::SetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.pop()?;
                    self.globals[index] = value;
                }
                Opcode::GetGlobal => {
                    let index = self.read_u16_operand();
                    let value = self.globals[index].clone();
                    self.push(value)?;
                }
                Opcode::SetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.pop()?;
                    self.stack[base_pointer + index] = value;
                }
                Opcode::GetLocal => {
                    let index = self.read_u8_operand();
                    let base_pointer = self.current_frame().base_pointer;
                    let value = self.stack[base_pointer + index].clone();
                    self.push(value)?;
                }
                Opcode::GetBuiltin => {
                    let index = self.read_u8_operand();
                    let builtin = BUILTINS.get(index).ok_or(VmError::UnknownBuiltin(index))?;
                    self.push(Value::Builtin(builtin))?;
                }

                Opcode::Array => {
                    let count = self.read_u16_operand();
                    let array = self.build_array(count);
                    self.sp -= count;
                    self.push(array)?;
                }
                Opcode::Hash => {
                    let count = self.read_u16_operand();
                    let hash = self.build_hash(count)?;
                    self.sp -= count;
                    self.push(hash)?;
                }
                Opcode::Index => {
                    let index = self.pop()?;
                    let left = self.pop()?;
                    self.execute_index_expression(left, index)?;
                }

                Opcode::Call => {
                    let argc = self.read_u8_operand();
                    self.execute_call(argc)?;
                }
                Opcode::ReturnValue => {
                    let value = self.pop()?;
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;
                    self.push(value)?;
                }
                Opcode::Return => {
                    let frame = self.pop_frame()?;
                    self.sp = frame.base_pointer - 1;
                    self.push(Value::Null)?;
                }

                Opcode::Closure => {
                    let const_index = self.read_u16_operand();
                    let num_free = self.read_u8_operand();
                    self.push_closure(const_index, num_free)?;
                }
                Opcode::GetFree => {
                    let index = self.read_u8_operand();
                    let value = self.current_frame().closure.free[index].clone();
                    self.push(value)?;
                }
                Opcode::CurrentClosure => {
                    let closure = self.current_frame().closure.clone();
                    self.push(Value::Closure(closure))?;
                }
            }
        }
        Ok(())
    }

    fn current_frame(&self) -> &Frame {
        // The main frame is never popped, so the stack is always non-empty
        &self.frames[self.frames.len() - 1]
    }

    fn current_frame_mut(&mut self) -> &mut Frame {
        let index = self.frames.len() - 1;
        &mut self.frames[index]
    }

    fn pop_frame(&mut self) -> VmResult<Frame> {
        // A top-level `return` would unwind the main frame
        if self.frames.len() == 1 {
            return Err(VmError::ReturnOutsideFunction);
        }
        self.frames.pop().ok_or(VmError::ReturnOutsideFunction)
    }

    /// Read the u16 operand following the current opcode and step past it.
    fn read_u16_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u16(&frame.closure.func.instructions[ip + 1..]) as usize;
        frame.ip += 2;
        value
    }

    /// Read the u8 operand following the current opcode and step past it.
    fn read_u8_operand(&mut self) -> usize {
        let frame = self.current_frame_mut();
        let ip = frame.ip as usize;
        let value = read_u8(&frame.closure.func.instructions[ip + 1..]) as usize;
        frame.ip += 1;
        value
    }

    fn push(&mut self, value: Value) -> VmResult<()> {
        if self.sp >= STACK_SIZE {
            return Err(VmError::StackOverflow);
        }
        self.stack[self.sp] = value;
        self.sp += 1;
        Ok(())
    }

    /// Pop leaves the value in place at `stack[sp]` for `last_popped`.
    fn pop(&mut self) -> VmResult<Value> {
        if self.sp == 0 {
            return Err(VmError::StackUnderflow);
        }
        self.sp -= 1;
        Ok(self.stack[self.sp].clone())
    }

    fn execute_binary_operation(&mut self, opcode: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        match (&left, &right) {
            (Value::Integer(left), Value::Integer(right)) => {
                self.execute_binary_integer_operation(opcode, *left, *right)
            }
            (Value::String(left), Value::String(right)) if opcode == Opcode::Add => {
                let concatenated = format!("{}{}", left, right);
                self.push(Value::String(concatenated))
            }
            _ => Err(VmError::UnsupportedBinaryTypes(
                left.type_name(),
                right.type_name(),
            )),
        }
    }

    fn execute_binary_integer_operation(
        &mut self,
        opcode: Opcode,
        left: i64,
        right: i64,
    ) -> VmResult<()> {
        let result = match opcode {
            Opcode::Add => left.wrapping_add(right),
            Opcode::Sub => left.wrapping_sub(right),
            Opcode::Mul => left.wrapping_mul(right),
            Opcode::Div => {
                if right == 0 {
                    return Err(VmError::DivisionByZero);
                }
                left.wrapping_div(right)
            }
            Opcode::Pipe => left | right,
            Opcode::Ampersand => left & right,
            Opcode::Exponent => left ^ right,
            Opcode::RShift => left.wrapping_shr(right as u32),
            Opcode::LShift => left.wrapping_shl(right as u32),
            _ => unreachable!("{} is not a binary integer opcode", opcode),
        };
        self.push(Value::Integer(result))
    }

    fn execute_comparison(&mut self, opcode: Opcode) -> VmResult<()> {
        let right = self.pop()?;
        let left = self.pop()?;

        if let (Value::Integer(left), Value::Integer(right)) = (&left, &right) {
            let result = match opcode {
                Opcode::Equal => left == right,
                Opcode::NotEqual => left != right,
                _ => left > right,
            };
            return self.push(Value::Boolean(result));
        }

        // Outside of integers, equality means being the same singleton;
        // distinct heap objects never compare equal
        match opcode {
            Opcode::Equal => {
                let equal = singleton_eq(&left, &right);
                self.push(Value::Boolean(equal))
            }
            Opcode::NotEqual => {
                let equal = singleton_eq(&left, &right);
                self.push(Value::Boolean(!equal))
            }
            _ => Err(VmError::UnsupportedComparison {
                opcode,
                left: left.type_name(),
                right: right.type_name(),
            }),
        }
    }

    fn execute_bang_operator(&mut self) -> VmResult<()> {
        let operand = self.pop()?;
        let result = match operand {
            Value::Boolean(value) => !value,
            Value::Null => true,
            _ => false,
        };
        self.push(Value::Boolean(result))
    }

    fn execute_unary_operation(&mut self, opcode: Opcode) -> VmResult<()> {
        let operand = self.pop()?;
        let value = match operand {
            Value::Integer(value) => value,
            other => return Err(VmError::UnsupportedNegation(other.type_name())),
        };

        let result = match opcode {
            Opcode::Minus => value.wrapping_neg(),
            Opcode::Tilde => !value,
            Opcode::PreInc => value.wrapping_add(1),
            Opcode::PreDec => value.wrapping_sub(1),
            // Postfix pushes the original value; there is no environment
            // write-back in compiled code
            Opcode::PostInc | Opcode::PostDec => value,
            _ => unreachable!("{} is not a unary opcode", opcode),
        };
        self.push(Value::Integer(result))
    }

    fn build_array(&mut self, count: usize) -> Value {
        let elements = self.stack[self.sp - count..self.sp].to_vec();
        Value::Array(elements)
    }

    fn build_hash(&mut self, count: usize) -> VmResult<Value> {
        let mut pairs = HashMap::with_capacity(count / 2);
        let start = self.sp - count;
        for offset in (start..self.sp).step_by(2) {
            let key = self.stack[offset].clone();
            let value = self.stack[offset + 1].clone();
            let hash_key = key
                .hash_key()
                .ok_or_else(|| VmError::Unhashable(key.type_name()))?;
            pairs.insert(hash_key, HashPair { key, value });
        }
        Ok(Value::Hash(pairs))
    }

    fn execute_index_expression(&mut self, left: Value, index: Value) -> VmResult<()> {
        match (left, index) {
            (Value::Array(elements), Value::Integer(index)) => {
                // Out-of-range indexing produces null, not an error
                let element = if index >= 0 {
                    elements.get(index as usize).cloned().unwrap_or(Value::Null)
                } else {
                    Value::Null
                };
                self.push(element)
            }
            (Value::Hash(pairs), key) => {
                let hash_key = key
                    .hash_key()
                    .ok_or_else(|| VmError::Unhashable(key.type_name()))?;
                let value = pairs
                    .get(&hash_key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Null);
                self.push(value)
            }
            (left, _) => Err(VmError::IndexNotSupported(left.type_name())),
        }
    }

    fn execute_call(&mut self, argc: usize) -> VmResult<()> {
        let callee = self.stack[self.sp - 1 - argc].clone();
        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc),
            other => Err(VmError::NotCallable(other.type_name())),
        }
    }

    fn call_closure(&mut self, closure: Arc<Closure>, argc: usize) -> VmResult<()> {
        if argc != closure.func.num_parameters {
            return Err(VmError::WrongNumberOfArguments {
                want: closure.func.num_parameters,
                got: argc,
            });
        }
        if self.frames.len() >= MAX_FRAMES {
            return Err(VmError::FrameOverflow);
        }

        // Arguments already sit in the first parameter slots; the slots for
        // the remaining locals are reserved by bumping sp
        let base_pointer = self.sp - argc;
        let new_sp = base_pointer + closure.func.num_locals;
        if new_sp > STACK_SIZE {
            return Err(VmError::StackOverflow);
        }

        self.frames.push(Frame::new(closure, base_pointer));
        self.sp = new_sp;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: &'static BuiltinDef, argc: usize) -> VmResult<()> {
        let args = &self.stack[self.sp - argc..self.sp];
        let result = (builtin.func)(args);

        // Drop the arguments and the builtin itself
        self.sp = self.sp - argc - 1;
        self.push(result.unwrap_or(Value::Null))
    }

    fn push_closure(&mut self, const_index: usize, num_free: usize) -> VmResult<()> {
        let constant = self
            .constants
            .get(const_index)
            .cloned()
            .ok_or(VmError::InvalidConstant(const_index))?;
        let func = match constant {
            Value::CompiledFunction(func) => func,
            other => return Err(VmError::NotAFunction(other.type_name())),
        };

        let free: SmallVec<[Value; 4]> = self.stack[self.sp - num_free..self.sp]
            .iter()
            .cloned()
            .collect();
        self.sp -= num_free;

        self.push(Value::Closure(Arc::new(Closure { func, free })))
    }
}

/// Equality for the non-integer fallback: true/false/null are singletons
/// compared by identity, everything else is a distinct object.
fn singleton_eq(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Boolean(left), Value::Boolean(right)) => left == right,
        (Value::Null, Value::Null) => true,
        _ => false,
    }
}
