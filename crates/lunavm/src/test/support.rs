// Hand-assembly support: tests build prototypes directly with the
// instruction encoders, since chunks normally arrive precompiled.

use crate::chunk::Proto;
use crate::lua_value::LuaValue;
use crate::lua_vm::{Instruction, LuaError, LuaState};
use smol_str::SmolStr;
use std::rc::Rc;

pub struct ProtoBuilder {
    source: SmolStr,
    num_params: u8,
    num_upvalues: u8,
    is_vararg: u8,
    max_stack_size: u8,
    code: Vec<Instruction>,
    constants: Vec<LuaValue>,
    protos: Vec<Rc<Proto>>,
}

impl ProtoBuilder {
    pub fn new(max_stack_size: u8) -> Self {
        Self {
            source: SmolStr::new("@test"),
            num_params: 0,
            num_upvalues: 0,
            is_vararg: 0,
            max_stack_size,
            code: Vec::new(),
            constants: Vec::new(),
            protos: Vec::new(),
        }
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = SmolStr::new(source);
        self
    }

    pub fn params(mut self, n: u8) -> Self {
        self.num_params = n;
        self
    }

    pub fn upvalues(mut self, n: u8) -> Self {
        self.num_upvalues = n;
        self
    }

    pub fn vararg(mut self, flags: u8) -> Self {
        self.is_vararg = flags;
        self
    }

    pub fn constant(mut self, value: LuaValue) -> Self {
        self.constants.push(value);
        self
    }

    pub fn op(mut self, instr: Instruction) -> Self {
        self.code.push(instr);
        self
    }

    pub fn proto(mut self, proto: Proto) -> Self {
        self.protos.push(Rc::new(proto));
        self
    }

    pub fn build(self) -> Proto {
        let line_info = (1..=self.code.len() as u32).collect();
        Proto {
            source: self.source,
            line_defined: 0,
            last_line_defined: 0,
            num_upvalues: self.num_upvalues,
            num_params: self.num_params,
            is_vararg: self.is_vararg,
            max_stack_size: self.max_stack_size,
            code: self.code,
            constants: self.constants,
            protos: self.protos,
            line_info,
            local_vars: Vec::new(),
            upvalue_names: Vec::new(),
        }
    }
}

/// RK operand naming constant `index`
pub fn k(index: u32) -> u32 {
    Instruction::rk_constant(index)
}

/// Run a chunk in a fresh state with the builtins registered.
pub fn run(proto: Proto) -> Vec<LuaValue> {
    let mut l = LuaState::new();
    l.open_libs();
    l.execute_chunk(Rc::new(proto)).expect("chunk execution failed")
}

/// Run a chunk expected to fail, returning the error.
pub fn run_err(proto: Proto) -> LuaError {
    let mut l = LuaState::new();
    l.open_libs();
    l.execute_chunk(Rc::new(proto))
        .expect_err("chunk unexpectedly succeeded")
}
