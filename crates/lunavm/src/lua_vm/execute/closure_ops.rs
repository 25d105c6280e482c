// CLOSURE instantiation, upvalue closing, and VARARG.

use crate::lua_value::{LuaClosure, LuaValue};
use crate::lua_vm::{LuaResult, LuaState, OpCode};
use std::rc::Rc;

/// CLOSURE: instantiate a nested prototype, consuming one
/// pseudo-instruction per upvalue. MOVE captures a caller register
/// (finding or creating the shared open cell); GETUPVAL shares one of
/// the caller's own upvalues.
pub(crate) fn make_closure(
    l: &mut LuaState,
    frame_idx: usize,
    a: usize,
    bx: usize,
) -> LuaResult<()> {
    let parent = l.frame(frame_idx).closure.clone();
    let Some(proto) = parent.proto.protos.get(bx).cloned() else {
        return Err(l.bytecode_error(format_args!(
            "CLOSURE references missing prototype {}",
            bx
        )));
    };

    let nups = proto.num_upvalues as usize;
    let mut upvalues = Vec::with_capacity(nups);
    for _ in 0..nups {
        let pc = l.frame(frame_idx).pc;
        let Some(&pseudo) = parent.proto.code.get(pc) else {
            return Err(l.bytecode_error("truncated upvalue binding sequence"));
        };
        l.frame_mut(frame_idx).pc = pc + 1;
        match pseudo.opcode() {
            Some(OpCode::Move) => {
                upvalues.push(l.find_upvalue(frame_idx, pseudo.b() as usize));
            }
            Some(OpCode::GetUpval) => match parent.upvalues.get(pseudo.b() as usize) {
                Some(cell) => upvalues.push(cell.clone()),
                None => return Err(l.bytecode_error("upvalue index out of range")),
            },
            _ => return Err(l.bytecode_error("invalid upvalue binding instruction")),
        }
    }

    let closure = Rc::new(LuaClosure::new(proto, upvalues));
    l.set_reg(frame_idx, a, LuaValue::Function(closure));
    Ok(())
}

/// VARARG: copy the frame's extra arguments into registers. B == 0
/// copies them all and leaves the top just past the last one; a fixed
/// B copies B-1 values, padding with nil.
pub(crate) fn vararg(l: &mut LuaState, frame_idx: usize, a: usize, b: u32) {
    let varargs = l.frame(frame_idx).varargs.clone();
    if b == 0 {
        let n = varargs.len();
        for (i, value) in varargs.into_iter().enumerate() {
            l.set_reg(frame_idx, a + i, value);
        }
        l.frame_mut(frame_idx).set_top(a + n);
    } else {
        let want = (b - 1) as usize;
        for i in 0..want {
            let value = varargs.get(i).cloned().unwrap_or(LuaValue::Nil);
            l.set_reg(frame_idx, a + i, value);
        }
    }
}
