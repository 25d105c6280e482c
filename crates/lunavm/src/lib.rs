// lunavm
// A loader and register-based virtual machine for Lua 5.1 binary
// chunks. Chunks arrive precompiled; there is no source compiler.

#[cfg(test)]
mod test;

pub mod chunk;
pub mod lib_registry;
pub mod lua_value;
pub mod lua_vm;
pub mod stdlib;

pub use chunk::{decode_chunk, encode_chunk, ChunkError, Proto};
pub use lua_value::{LuaClosure, LuaTable, LuaValue};
pub use lua_vm::{Instruction, LuaError, LuaResult, LuaState, NativeFn, OpCode};

use std::rc::Rc;

/// Load a compiled chunk from bytes.
pub fn load(data: &[u8]) -> Result<Rc<Proto>, ChunkError> {
    chunk::decode_chunk(data)
}

/// Execute a loaded chunk in a fresh state with the builtins
/// registered, returning the chunk's top-level return values.
pub fn execute(proto: Rc<Proto>) -> LuaResult<Vec<LuaValue>> {
    let mut state = LuaState::new();
    state.open_libs();
    state.execute_chunk(proto)
}
