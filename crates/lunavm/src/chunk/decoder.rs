use super::{
    ChunkError, ChunkReader, LocalVar, Proto, LUAC_FORMAT, LUAC_VERSION, LUA_SIGNATURE, TAG_BOOLEAN,
    TAG_NIL, TAG_NUMBER, TAG_STRING,
};
use crate::lua_value::LuaValue;
use crate::lua_vm::{Instruction, OpCode};
use log::debug;
use smol_str::SmolStr;
use std::io::Read;
use std::rc::Rc;

/// Decode a binary chunk into its top-level prototype.
pub fn decode_chunk<R: Read>(data: R) -> Result<Rc<Proto>, ChunkError> {
    let mut r = ChunkReader::new(data);
    read_header(&mut r)?;
    let proto = read_proto(&mut r, None)?;
    validate_proto(&proto)?;
    debug!(
        "loaded chunk {:?}: {} instructions, {} constants, {} nested prototypes",
        proto.source,
        proto.code.len(),
        proto.constants.len(),
        proto.protos.len()
    );
    Ok(Rc::new(proto))
}

fn read_header<R: Read>(r: &mut ChunkReader<R>) -> Result<(), ChunkError> {
    let mut signature = [0u8; 4];
    r.read_exact(&mut signature)?;
    if signature != LUA_SIGNATURE {
        return Err(ChunkError::BadSignature);
    }
    let version = r.read_u8()?;
    if version != LUAC_VERSION {
        return Err(ChunkError::UnsupportedVersion(version));
    }
    if r.read_u8()? != LUAC_FORMAT {
        return Err(ChunkError::UnsupportedProfile("format byte"));
    }
    if r.read_u8()? != 1 {
        return Err(ChunkError::UnsupportedProfile("big-endian chunk"));
    }
    if r.read_u8()? != 4 {
        return Err(ChunkError::UnsupportedProfile("sizeof(int)"));
    }
    if r.read_u8()? != 8 {
        return Err(ChunkError::UnsupportedProfile("sizeof(size_t)"));
    }
    if r.read_u8()? != 4 {
        return Err(ChunkError::UnsupportedProfile("sizeof(Instruction)"));
    }
    if r.read_u8()? != 8 {
        return Err(ChunkError::UnsupportedProfile("sizeof(lua_Number)"));
    }
    if r.read_u8()? != 0 {
        return Err(ChunkError::UnsupportedProfile("integral numbers"));
    }
    Ok(())
}

fn read_proto<R: Read>(
    r: &mut ChunkReader<R>,
    parent_source: Option<&SmolStr>,
) -> Result<Proto, ChunkError> {
    let mut source = r.read_string()?;
    if source.is_empty() {
        if let Some(parent) = parent_source {
            source = parent.clone();
        }
    }
    let line_defined = r.read_u32()?;
    let last_line_defined = r.read_u32()?;
    let num_upvalues = r.read_u8()?;
    let num_params = r.read_u8()?;
    let is_vararg = r.read_u8()?;
    let max_stack_size = r.read_u8()?;

    let code = r.read_vec(|r| r.read_u32().map(Instruction))?;
    let constants = r.read_vec(read_constant)?;
    let mut protos = Vec::new();
    {
        let count = r.read_u32()? as usize;
        protos.reserve(count.min(1 << 16));
        for _ in 0..count {
            protos.push(Rc::new(read_proto(r, Some(&source))?));
        }
    }

    let line_info = r.read_vec(|r| r.read_u32())?;
    let local_vars = r.read_vec(|r| {
        Ok(LocalVar {
            name: r.read_string()?,
            start_pc: r.read_u32()?,
            end_pc: r.read_u32()?,
        })
    })?;
    let upvalue_names = r.read_vec(|r| r.read_string())?;

    Ok(Proto {
        source,
        line_defined,
        last_line_defined,
        num_upvalues,
        num_params,
        is_vararg,
        max_stack_size,
        code,
        constants,
        protos,
        line_info,
        local_vars,
        upvalue_names,
    })
}

fn read_constant<R: Read>(r: &mut ChunkReader<R>) -> Result<LuaValue, ChunkError> {
    match r.read_u8()? {
        TAG_NIL => Ok(LuaValue::Nil),
        TAG_BOOLEAN => Ok(LuaValue::Boolean(r.read_u8()? != 0)),
        TAG_NUMBER => Ok(LuaValue::number(r.read_f64()?)),
        TAG_STRING => Ok(LuaValue::String(r.read_string()?)),
        tag => Err(ChunkError::UnknownConstantTag(tag)),
    }
}

/// Check every CLOSURE instruction: the pseudo-instructions that bind
/// its upvalues must all be MOVE or GETUPVAL. SETLIST's extra-word form
/// is skipped over so a raw count is never misread as an opcode.
fn validate_proto(proto: &Proto) -> Result<(), ChunkError> {
    let code = &proto.code;
    let mut pc = 0;
    while pc < code.len() {
        match code[pc].opcode() {
            Some(OpCode::Closure) => {
                let bx = code[pc].bx() as usize;
                let nups = match proto.protos.get(bx) {
                    Some(p) => p.num_upvalues as usize,
                    None => {
                        pc += 1;
                        continue;
                    }
                };
                for j in 1..=nups {
                    match code.get(pc + j).and_then(|i| i.opcode()) {
                        Some(OpCode::Move) | Some(OpCode::GetUpval) => {}
                        _ => return Err(ChunkError::InvalidUpvalueInstruction { pc: pc + j }),
                    }
                }
                pc += 1 + nups;
            }
            Some(OpCode::SetList) if code[pc].c() == 0 => pc += 2,
            _ => pc += 1,
        }
    }
    for nested in &proto.protos {
        validate_proto(nested)?;
    }
    Ok(())
}
