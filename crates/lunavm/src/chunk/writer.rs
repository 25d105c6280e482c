use super::{Proto, LUAC_HEADER, TAG_BOOLEAN, TAG_NIL, TAG_NUMBER, TAG_STRING};
use crate::lua_value::LuaValue;

/// Serialize a prototype tree back into the binary chunk format the
/// decoder accepts. Decoding the result yields a structurally equal
/// prototype.
pub fn encode_chunk(proto: &Proto) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&LUAC_HEADER);
    write_proto(&mut buf, proto);
    buf
}

fn write_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_u64(buf: &mut Vec<u8>, v: u64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_f64(buf: &mut Vec<u8>, v: f64) {
    buf.extend_from_slice(&v.to_le_bytes());
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    if s.is_empty() {
        write_u64(buf, 0);
    } else {
        write_u64(buf, s.len() as u64 + 1);
        buf.extend_from_slice(s.as_bytes());
        buf.push(0);
    }
}

fn write_proto(buf: &mut Vec<u8>, proto: &Proto) {
    write_string(buf, &proto.source);
    write_u32(buf, proto.line_defined);
    write_u32(buf, proto.last_line_defined);
    buf.push(proto.num_upvalues);
    buf.push(proto.num_params);
    buf.push(proto.is_vararg);
    buf.push(proto.max_stack_size);

    write_u32(buf, proto.code.len() as u32);
    for instr in &proto.code {
        write_u32(buf, instr.raw());
    }

    write_u32(buf, proto.constants.len() as u32);
    for constant in &proto.constants {
        write_constant(buf, constant);
    }

    write_u32(buf, proto.protos.len() as u32);
    for nested in &proto.protos {
        write_proto(buf, nested);
    }

    write_u32(buf, proto.line_info.len() as u32);
    for &line in &proto.line_info {
        write_u32(buf, line);
    }
    write_u32(buf, proto.local_vars.len() as u32);
    for var in &proto.local_vars {
        write_string(buf, &var.name);
        write_u32(buf, var.start_pc);
        write_u32(buf, var.end_pc);
    }
    write_u32(buf, proto.upvalue_names.len() as u32);
    for name in &proto.upvalue_names {
        write_string(buf, name);
    }
}

fn write_constant(buf: &mut Vec<u8>, value: &LuaValue) {
    match value {
        LuaValue::Nil => buf.push(TAG_NIL),
        LuaValue::Boolean(b) => {
            buf.push(TAG_BOOLEAN);
            buf.push(u8::from(*b));
        }
        LuaValue::Integer(i) => {
            buf.push(TAG_NUMBER);
            write_f64(buf, *i as f64);
        }
        LuaValue::Float(f) => {
            buf.push(TAG_NUMBER);
            write_f64(buf, *f);
        }
        LuaValue::String(s) => {
            buf.push(TAG_STRING);
            write_string(buf, s);
        }
        _ => unreachable!("reference value in a constant table"),
    }
}
