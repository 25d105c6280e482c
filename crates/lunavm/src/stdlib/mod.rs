// Builtin global functions.

pub mod basic;

use crate::lua_vm::LuaState;

/// Install the builtin globals into a state.
pub fn open_libs(l: &mut LuaState) {
    basic::create_basic_lib().install(l);
}
