// Interpreter limits (counterparts of the luaconf.h / llimits.h values)

/// Maximum call-frame depth before `StackOverflow` (LUAI_MAXCALLS)
pub const MAX_CALL_DEPTH: usize = 20000;

/// Maximum nested host re-entries - protected calls, metamethod and
/// iterator invocations - before `StackOverflow` (LUAI_MAXCCALLS).
/// Plain Lua calls never nest the host stack and are only bounded by
/// `MAX_CALL_DEPTH`.
pub const MAX_C_CALLS: usize = 200;

/// Maximum metamethod chain length for __index/__newindex/__call (MAXTAGLOOP)
pub const MAX_TAG_LOOP: usize = 100;

/// Array slots written per SETLIST batch (LFIELDS_PER_FLUSH)
pub const FIELDS_PER_FLUSH: u32 = 50;
