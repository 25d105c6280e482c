// Lua 5.1 binary chunks: the serialized form of compiled functions.
//
// Layout reference: lundump.c / ldump.c in the 5.1 sources. Only the
// standard little-endian desktop profile is accepted (4-byte int,
// 8-byte size_t, 4-byte instruction, 8-byte IEEE-754 double).

mod decoder;
mod reader;
mod writer;

pub use decoder::decode_chunk;
pub use reader::ChunkReader;
pub use writer::encode_chunk;

use crate::lua_value::LuaValue;
use crate::lua_vm::Instruction;
use smol_str::SmolStr;
use std::rc::Rc;
use thiserror::Error;

/// First four bytes of every compiled chunk ("\x1bLua")
pub const LUA_SIGNATURE: [u8; 4] = [0x1B, b'L', b'u', b'a'];

/// Bytecode version byte for Lua 5.1
pub const LUAC_VERSION: u8 = 0x51;

/// Official format byte
pub const LUAC_FORMAT: u8 = 0;

/// The full 12-byte header of the supported profile:
/// signature, version, format, little-endian flag, sizeof(int),
/// sizeof(size_t), sizeof(Instruction), sizeof(lua_Number),
/// integral-number flag.
pub const LUAC_HEADER: [u8; 12] = [
    0x1B, b'L', b'u', b'a', LUAC_VERSION, LUAC_FORMAT, 1, 4, 8, 4, 8, 0,
];

// is_vararg flag bits (lobject.h)
pub const VARARG_HASARG: u8 = 1;
pub const VARARG_ISVARARG: u8 = 2;
pub const VARARG_NEEDSARG: u8 = 4;

// Constant tags (lua.h type tags as serialized by ldump.c)
pub const TAG_NIL: u8 = 0;
pub const TAG_BOOLEAN: u8 = 1;
pub const TAG_NUMBER: u8 = 3;
pub const TAG_STRING: u8 = 4;

/// Errors produced while loading a binary chunk
#[derive(Debug, Error)]
pub enum ChunkError {
    #[error("bad signature (not a precompiled Lua chunk)")]
    BadSignature,
    #[error("unsupported bytecode version {0:#04x} (expected 0x51)")]
    UnsupportedVersion(u8),
    #[error("unsupported chunk profile: {0}")]
    UnsupportedProfile(&'static str),
    #[error("unknown constant tag {0}")]
    UnknownConstantTag(u8),
    #[error("truncated chunk")]
    TruncatedChunk,
    #[error("invalid upvalue binding instruction at pc {pc}")]
    InvalidUpvalueInstruction { pc: usize },
    #[error("string constant is not valid UTF-8")]
    InvalidString,
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// Debug record for one local variable slot
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    pub name: SmolStr,
    pub start_pc: u32,
    pub end_pc: u32,
}

/// One function prototype decoded from a chunk.
///
/// Prototypes are immutable once decoded and shared (via `Rc`) by
/// every closure instantiated from them.
#[derive(Debug, Clone, PartialEq)]
pub struct Proto {
    /// Chunk name; nested prototypes inherit it when serialized empty
    pub source: SmolStr,
    pub line_defined: u32,
    pub last_line_defined: u32,
    pub num_upvalues: u8,
    pub num_params: u8,
    /// Raw flag byte from the chunk (VARARG_* bits)
    pub is_vararg: u8,
    pub max_stack_size: u8,
    pub code: Vec<Instruction>,
    pub constants: Vec<LuaValue>,
    pub protos: Vec<Rc<Proto>>,
    /// Source line for each instruction (may be empty when stripped)
    pub line_info: Vec<u32>,
    pub local_vars: Vec<LocalVar>,
    pub upvalue_names: Vec<SmolStr>,
}

impl Proto {
    #[inline(always)]
    pub fn has_varargs(&self) -> bool {
        self.is_vararg & VARARG_ISVARARG != 0
    }

    /// Source line for the instruction at `pc`, if debug info is present
    #[inline]
    pub fn line_at(&self, pc: usize) -> Option<u32> {
        self.line_info.get(pc).copied()
    }
}
