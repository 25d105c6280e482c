// The virtual machine: state, call frames, upvalues, the instruction
// codec and the dispatch engine.

pub mod execute;
mod frame;
mod lua_error;
mod lua_limits;
mod lua_state;
pub mod opcode;
mod upvalue;

pub use execute::{ArithOp, TmKind};
pub use frame::{Frame, LuaFrame, NativeFrame, RetTarget};
pub use lua_error::LuaError;
pub use lua_limits::{FIELDS_PER_FLUSH, MAX_CALL_DEPTH, MAX_C_CALLS, MAX_TAG_LOOP};
pub use lua_state::{LuaState, LUA_GLOBALSINDEX};
pub use opcode::{Instruction, OpArg, OpCode, OpInfo, OpMode, NUM_OPCODES, OP_INFO};
pub use upvalue::{Upvalue, UpvalueRef};

pub type LuaResult<T> = Result<T, LuaError>;

/// Native function type: a Rust function callable from Lua. It reads
/// its arguments from its frame through the state API, pushes its
/// results, and returns how many it pushed.
pub type NativeFn = fn(&mut LuaState) -> LuaResult<usize>;
