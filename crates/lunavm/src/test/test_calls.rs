// The call protocol: multiple returns, varargs, tail calls, the frame
// ceiling, and generic-for iteration.

use super::support::{k, run, run_err, ProtoBuilder};
use crate::lua_value::LuaValue;
use crate::lua_vm::{Instruction, LuaError, OpCode};

#[test]
fn test_multiple_returns_fixed_expectation() {
    // local function two() return 1, 2 end; return two()  (C = 3)
    let two = ProtoBuilder::new(2)
        .constant(LuaValue::Integer(1))
        .constant(LuaValue::Integer(2))
        .op(Instruction::abx(OpCode::LoadK, 0, 0))
        .op(Instruction::abx(OpCode::LoadK, 1, 1))
        .op(Instruction::abc(OpCode::Return, 0, 3, 0))
        .build();

    let proto = ProtoBuilder::new(3)
        .proto(two)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abc(OpCode::Call, 0, 1, 3))
        .op(Instruction::abc(OpCode::Return, 0, 3, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::Integer(1), LuaValue::Integer(2)]);
}

#[test]
fn test_return_padding_with_nil() {
    // one() returns a single value but the call site expects three
    let one = ProtoBuilder::new(2)
        .constant(LuaValue::Integer(9))
        .op(Instruction::abx(OpCode::LoadK, 0, 0))
        .op(Instruction::abc(OpCode::Return, 0, 2, 0))
        .build();

    let proto = ProtoBuilder::new(4)
        .proto(one)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abc(OpCode::Call, 0, 1, 4))
        .op(Instruction::abc(OpCode::Return, 0, 4, 0))
        .build();
    assert_eq!(
        run(proto),
        vec![LuaValue::Integer(9), LuaValue::Nil, LuaValue::Nil]
    );
}

#[test]
fn test_open_call_feeds_open_return() {
    // f(1, 2, 3) with B == 0 consumes everything the previous open
    // call produced; the vararg function forwards its arguments.
    let forward = ProtoBuilder::new(4)
        .params(1)
        .vararg(crate::chunk::VARARG_ISVARARG)
        .op(Instruction::abc(OpCode::Move, 1, 0, 0))
        .op(Instruction::abc(OpCode::Vararg, 2, 0, 0))
        .op(Instruction::abc(OpCode::Return, 1, 0, 0))
        .build();

    let proto = ProtoBuilder::new(5)
        .constant(LuaValue::Integer(1))
        .constant(LuaValue::Integer(2))
        .constant(LuaValue::Integer(3))
        .proto(forward)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abx(OpCode::LoadK, 1, 0))
        .op(Instruction::abx(OpCode::LoadK, 2, 1))
        .op(Instruction::abx(OpCode::LoadK, 3, 2))
        .op(Instruction::abc(OpCode::Call, 0, 4, 0))
        .op(Instruction::abc(OpCode::Return, 0, 0, 0))
        .build();
    assert_eq!(
        run(proto),
        vec![
            LuaValue::Integer(1),
            LuaValue::Integer(2),
            LuaValue::Integer(3)
        ]
    );
}

#[test]
fn test_vararg_fixed_count_pads() {
    // f(7): VARARG with B = 3 wants two values, one exists
    let f = ProtoBuilder::new(4)
        .vararg(crate::chunk::VARARG_ISVARARG)
        .op(Instruction::abc(OpCode::Vararg, 0, 3, 0))
        .op(Instruction::abc(OpCode::Return, 0, 3, 0))
        .build();

    let proto = ProtoBuilder::new(3)
        .constant(LuaValue::Integer(7))
        .proto(f)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abx(OpCode::LoadK, 1, 0))
        .op(Instruction::abc(OpCode::Call, 0, 2, 0))
        .op(Instruction::abc(OpCode::Return, 0, 0, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::Integer(7), LuaValue::Nil]);
}

#[test]
fn test_tail_calls_run_in_constant_frame_depth() {
    // local function loop(n) if n == 0 then return n end
    //   return loop(n - 1) end
    // return loop(1000000)
    let loop_fn = ProtoBuilder::new(3)
        .params(1)
        .constant(LuaValue::Integer(0))
        .constant(LuaValue::Integer(1))
        .constant(LuaValue::string("loop"))
        .op(Instruction::abc(OpCode::Eq, 1, 0, k(0)))
        .op(Instruction::asbx(OpCode::Jmp, 0, 3))
        .op(Instruction::abx(OpCode::GetGlobal, 1, 2))
        .op(Instruction::abc(OpCode::Sub, 2, 0, k(1)))
        .op(Instruction::abc(OpCode::TailCall, 1, 2, 0))
        .op(Instruction::abc(OpCode::Return, 0, 2, 0))
        .build();

    let proto = ProtoBuilder::new(3)
        .constant(LuaValue::string("loop"))
        .constant(LuaValue::Integer(1_000_000))
        .proto(loop_fn)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abx(OpCode::SetGlobal, 0, 0))
        .op(Instruction::abx(OpCode::GetGlobal, 1, 0))
        .op(Instruction::abx(OpCode::LoadK, 2, 1))
        .op(Instruction::abc(OpCode::Call, 1, 2, 2))
        .op(Instruction::abc(OpCode::Return, 1, 2, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::Integer(0)]);
}

#[test]
fn test_unbounded_plain_recursion_overflows() {
    // local function rec() return 1 + rec() end -- not a tail call
    let rec = ProtoBuilder::new(3)
        .constant(LuaValue::string("rec"))
        .constant(LuaValue::Integer(1))
        .op(Instruction::abx(OpCode::GetGlobal, 0, 0))
        .op(Instruction::abc(OpCode::Call, 0, 1, 2))
        .op(Instruction::abc(OpCode::Add, 1, k(1), 0))
        .op(Instruction::abc(OpCode::Return, 1, 2, 0))
        .build();

    let proto = ProtoBuilder::new(2)
        .constant(LuaValue::string("rec"))
        .proto(rec)
        .op(Instruction::abx(OpCode::Closure, 0, 0))
        .op(Instruction::abx(OpCode::SetGlobal, 0, 0))
        .op(Instruction::abx(OpCode::GetGlobal, 0, 0))
        .op(Instruction::abc(OpCode::Call, 0, 1, 1))
        .op(Instruction::abc(OpCode::Return, 0, 1, 0))
        .build();
    assert!(matches!(run_err(proto), LuaError::StackOverflow));
}

#[test]
fn test_generic_for_with_ipairs() {
    // local s = 0; for _, v in ipairs({10, 20, 30}) do s = s + v end
    // return s
    let proto = ProtoBuilder::new(7)
        .constant(LuaValue::Integer(0))
        .constant(LuaValue::string("ipairs"))
        .constant(LuaValue::Integer(10))
        .constant(LuaValue::Integer(20))
        .constant(LuaValue::Integer(30))
        .op(Instruction::abx(OpCode::LoadK, 0, 0))
        .op(Instruction::abx(OpCode::GetGlobal, 1, 1))
        .op(Instruction::abc(OpCode::NewTable, 2, 3, 0))
        .op(Instruction::abx(OpCode::LoadK, 3, 2))
        .op(Instruction::abx(OpCode::LoadK, 4, 3))
        .op(Instruction::abx(OpCode::LoadK, 5, 4))
        .op(Instruction::abc(OpCode::SetList, 2, 3, 1))
        .op(Instruction::abc(OpCode::Call, 1, 2, 4))
        .op(Instruction::asbx(OpCode::Jmp, 0, 1))
        .op(Instruction::abc(OpCode::Add, 0, 0, 5))
        .op(Instruction::abc(OpCode::TForLoop, 1, 0, 2))
        .op(Instruction::asbx(OpCode::Jmp, 0, -3))
        .op(Instruction::abc(OpCode::Return, 0, 2, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::Integer(60)]);
}

#[test]
fn test_generic_for_with_pairs_visits_all_keys() {
    // count keys of {x=1, y=2, z=3} via pairs
    let proto = ProtoBuilder::new(8)
        .constant(LuaValue::Integer(0))
        .constant(LuaValue::string("pairs"))
        .constant(LuaValue::string("x"))
        .constant(LuaValue::string("y"))
        .constant(LuaValue::string("z"))
        .constant(LuaValue::Integer(1))
        .op(Instruction::abx(OpCode::LoadK, 0, 0))
        .op(Instruction::abx(OpCode::GetGlobal, 1, 1))
        .op(Instruction::abc(OpCode::NewTable, 2, 0, 3))
        .op(Instruction::abc(OpCode::SetTable, 2, k(2), k(5)))
        .op(Instruction::abc(OpCode::SetTable, 2, k(3), k(5)))
        .op(Instruction::abc(OpCode::SetTable, 2, k(4), k(5)))
        .op(Instruction::abc(OpCode::Call, 1, 2, 4))
        .op(Instruction::asbx(OpCode::Jmp, 0, 1))
        .op(Instruction::abc(OpCode::Add, 0, 0, k(5)))
        .op(Instruction::abc(OpCode::TForLoop, 1, 0, 2))
        .op(Instruction::asbx(OpCode::Jmp, 0, -3))
        .op(Instruction::abc(OpCode::Return, 0, 2, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::Integer(3)]);
}

#[test]
fn test_calling_a_number_fails() {
    let proto = ProtoBuilder::new(2)
        .constant(LuaValue::Integer(3))
        .op(Instruction::abx(OpCode::LoadK, 0, 0))
        .op(Instruction::abc(OpCode::Call, 0, 1, 1))
        .op(Instruction::abc(OpCode::Return, 0, 1, 0))
        .build();
    match run_err(proto) {
        LuaError::Type(msg) => assert!(msg.contains("call"), "got {:?}", msg),
        other => panic!("expected a type error, got {:?}", other),
    }
}

#[test]
fn test_native_call_from_bytecode() {
    // return type(42)
    let proto = ProtoBuilder::new(3)
        .constant(LuaValue::string("type"))
        .constant(LuaValue::Integer(42))
        .op(Instruction::abx(OpCode::GetGlobal, 0, 0))
        .op(Instruction::abx(OpCode::LoadK, 1, 1))
        .op(Instruction::abc(OpCode::Call, 0, 2, 2))
        .op(Instruction::abc(OpCode::Return, 0, 2, 0))
        .build();
    assert_eq!(run(proto), vec![LuaValue::string("number")]);
}
