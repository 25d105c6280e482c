/*----------------------------------------------------------------------
  VM execution engine.

  Single-loop design in the shape of luaV_execute: the labeled outer
  loop is the frame context switch, the inner loop fetches, decodes and
  dispatches one instruction at a time. CALL, TAILCALL and RETURN only
  adjust the frame stack and continue the outer loop, so plain Lua
  recursion never grows the host call stack. Only protected calls and
  metamethod invocations run a nested loop.
----------------------------------------------------------------------*/

pub mod arith;
pub(crate) mod call;
pub(crate) mod closure_ops;
pub(crate) mod loops;
pub mod table_ops;

pub use arith::ArithOp;
pub use table_ops::TmKind;

use crate::chunk::Proto;
use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::{Instruction, LuaResult, LuaState, OpCode, FIELDS_PER_FLUSH};
use call::FrameAction;

fn constant(l: &LuaState, proto: &Proto, index: usize) -> LuaResult<LuaValue> {
    proto.constants.get(index).cloned().ok_or_else(|| {
        l.bytecode_error(format_args!("constant index {} out of range", index))
    })
}

/// RK operand resolution: values >= 256 name constants, the rest name
/// registers.
fn rk(l: &LuaState, proto: &Proto, frame_idx: usize, operand: u32) -> LuaResult<LuaValue> {
    if Instruction::is_constant(operand) {
        constant(l, proto, Instruction::constant_index(operand))
    } else {
        Ok(l.reg(frame_idx, operand as usize))
    }
}

pub(crate) fn jump(l: &mut LuaState, frame_idx: usize, offset: i32) -> LuaResult<()> {
    let target = l.frame(frame_idx).pc as i64 + offset as i64;
    if target < 0 {
        return Err(l.bytecode_error("jump target out of range"));
    }
    l.frame_mut(frame_idx).pc = target as usize;
    Ok(())
}

/// Run until the frame stack is back down to `target_depth`.
/// Protected calls and metamethod invocations use the depth bound to
/// execute just the frames they pushed.
pub(crate) fn lua_execute(l: &mut LuaState, target_depth: usize) -> LuaResult<()> {
    'reentry: loop {
        if l.frames.len() <= target_depth {
            return Ok(());
        }
        let frame_idx = l.frames.len() - 1;
        let proto = l.frame(frame_idx).closure.proto.clone();
        let globals = l.globals_value();

        loop {
            let pc = l.frame(frame_idx).pc;
            let Some(&instr) = proto.code.get(pc) else {
                return Err(l.bytecode_error("function body ended without RETURN"));
            };
            l.frame_mut(frame_idx).pc = pc + 1;

            let Some(op) = instr.opcode() else {
                return Err(l.bytecode_error(format_args!(
                    "unknown opcode {:#x}",
                    instr.raw() & 0x3F
                )));
            };

            match op {
                OpCode::Move => {
                    let value = l.reg(frame_idx, instr.b() as usize);
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::LoadK => {
                    let value = constant(l, &proto, instr.bx() as usize)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::LoadBool => {
                    l.set_reg(
                        frame_idx,
                        instr.a() as usize,
                        LuaValue::Boolean(instr.b() != 0),
                    );
                    if instr.c() != 0 {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::LoadNil => {
                    for i in instr.a() as usize..=instr.b() as usize {
                        l.set_reg(frame_idx, i, LuaValue::Nil);
                    }
                }
                OpCode::GetUpval => {
                    let cell = l
                        .frame(frame_idx)
                        .closure
                        .upvalues
                        .get(instr.b() as usize)
                        .cloned();
                    match cell {
                        Some(cell) => {
                            let value = l.read_upvalue(&cell);
                            l.set_reg(frame_idx, instr.a() as usize, value);
                        }
                        None => return Err(l.bytecode_error("upvalue index out of range")),
                    }
                }
                OpCode::SetUpval => {
                    let cell = l
                        .frame(frame_idx)
                        .closure
                        .upvalues
                        .get(instr.b() as usize)
                        .cloned();
                    match cell {
                        Some(cell) => {
                            let value = l.reg(frame_idx, instr.a() as usize);
                            l.write_upvalue(&cell, value);
                        }
                        None => return Err(l.bytecode_error("upvalue index out of range")),
                    }
                }
                OpCode::GetGlobal => {
                    let key = constant(l, &proto, instr.bx() as usize)?;
                    let value = table_ops::get_table(l, &globals, &key)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::SetGlobal => {
                    let key = constant(l, &proto, instr.bx() as usize)?;
                    let value = l.reg(frame_idx, instr.a() as usize);
                    table_ops::set_table(l, &globals, key, value)?;
                }
                OpCode::GetTable => {
                    let obj = l.reg(frame_idx, instr.b() as usize);
                    let key = rk(l, &proto, frame_idx, instr.c())?;
                    let value = table_ops::get_table(l, &obj, &key)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::SetTable => {
                    let obj = l.reg(frame_idx, instr.a() as usize);
                    let key = rk(l, &proto, frame_idx, instr.b())?;
                    let value = rk(l, &proto, frame_idx, instr.c())?;
                    table_ops::set_table(l, &obj, key, value)?;
                }
                OpCode::NewTable => {
                    let table = LuaTable::new(instr.b() as usize, instr.c() as usize);
                    l.set_reg(frame_idx, instr.a() as usize, LuaValue::table(table));
                }
                OpCode::Self_ => {
                    let a = instr.a() as usize;
                    let obj = l.reg(frame_idx, instr.b() as usize);
                    let key = rk(l, &proto, frame_idx, instr.c())?;
                    l.set_reg(frame_idx, a + 1, obj.clone());
                    let value = table_ops::get_table(l, &obj, &key)?;
                    l.set_reg(frame_idx, a, value);
                }
                OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Mod
                | OpCode::Pow => {
                    let lhs = rk(l, &proto, frame_idx, instr.b())?;
                    let rhs = rk(l, &proto, frame_idx, instr.c())?;
                    let arith_op = match op {
                        OpCode::Add => ArithOp::Add,
                        OpCode::Sub => ArithOp::Sub,
                        OpCode::Mul => ArithOp::Mul,
                        OpCode::Div => ArithOp::Div,
                        OpCode::Mod => ArithOp::Mod,
                        _ => ArithOp::Pow,
                    };
                    let value = arith::arith(l, arith_op, &lhs, &rhs)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::Unm => {
                    let operand = l.reg(frame_idx, instr.b() as usize);
                    let value = arith::unary_minus(l, &operand)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::Not => {
                    let operand = l.reg(frame_idx, instr.b() as usize);
                    l.set_reg(frame_idx, instr.a() as usize, LuaValue::Boolean(operand.is_falsy()));
                }
                OpCode::Len => {
                    let operand = l.reg(frame_idx, instr.b() as usize);
                    let value = table_ops::length_of(l, &operand)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::Concat => {
                    let b = instr.b() as usize;
                    let c = instr.c() as usize;
                    let values: Vec<LuaValue> = (b..=c).map(|i| l.reg(frame_idx, i)).collect();
                    let value = table_ops::concat_values(l, values)?;
                    l.set_reg(frame_idx, instr.a() as usize, value);
                }
                OpCode::Jmp => jump(l, frame_idx, instr.sbx())?,
                OpCode::Eq => {
                    let lhs = rk(l, &proto, frame_idx, instr.b())?;
                    let rhs = rk(l, &proto, frame_idx, instr.c())?;
                    let result = arith::equals(l, &lhs, &rhs)?;
                    if result != (instr.a() != 0) {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::Lt => {
                    let lhs = rk(l, &proto, frame_idx, instr.b())?;
                    let rhs = rk(l, &proto, frame_idx, instr.c())?;
                    let result = arith::less_than(l, &lhs, &rhs)?;
                    if result != (instr.a() != 0) {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::Le => {
                    let lhs = rk(l, &proto, frame_idx, instr.b())?;
                    let rhs = rk(l, &proto, frame_idx, instr.c())?;
                    let result = arith::less_equal(l, &lhs, &rhs)?;
                    if result != (instr.a() != 0) {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::Test => {
                    let value = l.reg(frame_idx, instr.a() as usize);
                    if value.is_truthy() != (instr.c() != 0) {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::TestSet => {
                    let value = l.reg(frame_idx, instr.b() as usize);
                    if value.is_truthy() == (instr.c() != 0) {
                        l.set_reg(frame_idx, instr.a() as usize, value);
                    } else {
                        l.frame_mut(frame_idx).pc += 1;
                    }
                }
                OpCode::Call => {
                    match call::do_call(l, frame_idx, instr.a() as usize, instr.b(), instr.c())? {
                        FrameAction::Reenter => continue 'reentry,
                        FrameAction::Continue => {}
                    }
                }
                OpCode::TailCall => {
                    match call::do_tailcall(l, frame_idx, instr.a() as usize, instr.b())? {
                        FrameAction::Reenter => continue 'reentry,
                        FrameAction::Continue => {}
                    }
                }
                OpCode::Return => {
                    call::do_return(l, frame_idx, instr.a() as usize, instr.b())?;
                    continue 'reentry;
                }
                OpCode::ForLoop => {
                    loops::for_loop(l, frame_idx, instr.a() as usize, instr.sbx())?;
                }
                OpCode::ForPrep => {
                    loops::for_prep(l, frame_idx, instr.a() as usize, instr.sbx())?;
                }
                OpCode::TForLoop => {
                    loops::tfor_loop(l, frame_idx, instr.a() as usize, instr.c())?;
                }
                OpCode::SetList => {
                    let a = instr.a() as usize;
                    let b = instr.b();
                    let mut c = instr.c();
                    if c == 0 {
                        // the next raw word is the real batch number
                        let pc = l.frame(frame_idx).pc;
                        let Some(&extra) = proto.code.get(pc) else {
                            return Err(l.bytecode_error("missing extended SETLIST count"));
                        };
                        l.frame_mut(frame_idx).pc = pc + 1;
                        c = extra.raw();
                    }
                    let n = if b == 0 {
                        l.frame(frame_idx).top.saturating_sub(a + 1)
                    } else {
                        b as usize
                    };
                    let table_value = l.reg(frame_idx, a);
                    let Some(table) = table_value.as_table().cloned() else {
                        return Err(l.type_error(format_args!(
                            "attempt to index a {} value",
                            table_value.type_name()
                        )));
                    };
                    let first = (c as i64 - 1) * FIELDS_PER_FLUSH as i64;
                    let values: Vec<LuaValue> =
                        (1..=n).map(|i| l.reg(frame_idx, a + i)).collect();
                    let mut t = table.borrow_mut();
                    for (i, value) in values.into_iter().enumerate() {
                        t.set_int(first + i as i64 + 1, value);
                    }
                }
                OpCode::Close => {
                    l.close_upvalues(frame_idx, instr.a() as usize);
                }
                OpCode::Closure => {
                    closure_ops::make_closure(l, frame_idx, instr.a() as usize, instr.bx() as usize)?;
                }
                OpCode::Vararg => {
                    closure_ops::vararg(l, frame_idx, instr.a() as usize, instr.b());
                }
            }
        }
    }
}
