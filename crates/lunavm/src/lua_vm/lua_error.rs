use crate::lua_value::LuaValue;
use thiserror::Error;

/// Runtime errors raised while the VM executes.
///
/// Message-carrying variants hold text already prefixed with the chunk
/// source and line (`source:line: message`) when that information was
/// available at the raise site. A protected call turns any of these
/// into a Lua value: `Raised` yields the thrown value itself, every
/// other variant yields its display text as a string.
#[derive(Debug, Clone, Error)]
pub enum LuaError {
    /// Operation applied to a value of the wrong type
    #[error("{0}")]
    Type(String),
    /// Arithmetic failure (e.g. integer modulo by zero)
    #[error("{0}")]
    Arith(String),
    /// Call-frame ceiling reached
    #[error("stack overflow")]
    StackOverflow,
    /// Out-of-range stack or argument access through the state API
    #[error("{0}")]
    Index(String),
    /// A metamethod chain (__index, __newindex, __call) exceeded its bound
    #[error("loop in metamethod resolution")]
    MetamethodLoop,
    /// Bytecode the dispatcher cannot execute (bad opcode, bad operand)
    #[error("{0}")]
    Bytecode(String),
    /// General runtime failure (bad table key, missing RETURN, ...)
    #[error("{0}")]
    Runtime(String),
    /// A Lua value thrown by error(); caught intact by pcall
    #[error("{0}")]
    Raised(LuaValue),
}

impl LuaError {
    /// Convert this error into the value a protected call returns.
    pub fn into_value(self) -> LuaValue {
        match self {
            LuaError::Raised(v) => v,
            other => LuaValue::string(other.to_string()),
        }
    }
}
