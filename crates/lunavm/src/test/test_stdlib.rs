// Builtin behavior, driven through the host-call API.

use crate::lua_value::{LuaTable, LuaValue};
use crate::lua_vm::LuaState;
use std::rc::Rc;

fn state() -> LuaState {
    let mut l = LuaState::new();
    l.open_libs();
    l
}

fn call_builtin(l: &mut LuaState, name: &str, args: Vec<LuaValue>) -> Vec<LuaValue> {
    let func = l.get_global(name);
    assert!(func.is_function(), "builtin {:?} is not registered", name);
    l.call_function(func, args).expect("builtin call failed")
}

#[test]
fn test_required_builtins_are_registered() {
    let l = state();
    for name in [
        "print",
        "getmetatable",
        "setmetatable",
        "next",
        "pairs",
        "ipairs",
    ] {
        assert!(
            l.get_global(name).is_function(),
            "missing builtin {:?}",
            name
        );
    }
}

#[test]
fn test_type_builtin() {
    let mut l = state();
    let r = call_builtin(&mut l, "type", vec![LuaValue::Integer(1)]);
    assert_eq!(r, vec![LuaValue::string("number")]);
    let r = call_builtin(&mut l, "type", vec![LuaValue::Nil]);
    assert_eq!(r, vec![LuaValue::string("nil")]);
    let r = call_builtin(&mut l, "type", vec![LuaValue::table(LuaTable::new(0, 0))]);
    assert_eq!(r, vec![LuaValue::string("table")]);
}

#[test]
fn test_tostring_and_tonumber() {
    let mut l = state();
    let r = call_builtin(&mut l, "tostring", vec![LuaValue::Integer(42)]);
    assert_eq!(r, vec![LuaValue::string("42")]);
    let r = call_builtin(&mut l, "tostring", vec![LuaValue::Boolean(true)]);
    assert_eq!(r, vec![LuaValue::string("true")]);

    let r = call_builtin(&mut l, "tonumber", vec![LuaValue::string("0x10")]);
    assert_eq!(r, vec![LuaValue::Integer(16)]);
    let r = call_builtin(&mut l, "tonumber", vec![LuaValue::string("nope")]);
    assert_eq!(r, vec![LuaValue::Nil]);
    let r = call_builtin(
        &mut l,
        "tonumber",
        vec![LuaValue::string("ff"), LuaValue::Integer(16)],
    );
    assert_eq!(r, vec![LuaValue::Integer(255)]);
}

#[test]
fn test_next_builtin_walks_the_table() {
    let mut l = state();
    let mut table = LuaTable::new(0, 0);
    table.set_int(1, LuaValue::string("one"));
    table.set_int(2, LuaValue::string("two"));
    let t = LuaValue::table(table);

    let r = call_builtin(&mut l, "next", vec![t.clone()]);
    assert_eq!(
        r,
        vec![LuaValue::Integer(1), LuaValue::string("one")]
    );
    let r = call_builtin(&mut l, "next", vec![t.clone(), LuaValue::Integer(1)]);
    assert_eq!(
        r,
        vec![LuaValue::Integer(2), LuaValue::string("two")]
    );
    let r = call_builtin(&mut l, "next", vec![t, LuaValue::Integer(2)]);
    assert_eq!(r, vec![LuaValue::Nil]);
}

#[test]
fn test_pairs_visits_every_key_once() {
    let mut l = state();
    let mut table = LuaTable::new(0, 0);
    table.set_int(1, LuaValue::Integer(10));
    table.set_field("a", LuaValue::Integer(20));
    table.set_field("b", LuaValue::Integer(30));
    let t = LuaValue::table(table);

    let r = call_builtin(&mut l, "pairs", vec![t.clone()]);
    assert_eq!(r.len(), 3);
    let iter = r[0].clone();
    assert_eq!(r[1], t);
    assert_eq!(r[2], LuaValue::Nil);

    // drive the returned iterator by hand
    let mut seen = Vec::new();
    let mut key = LuaValue::Nil;
    loop {
        let step = l
            .call_function(iter.clone(), vec![t.clone(), key.clone()])
            .expect("iteration failed");
        match step.first() {
            None | Some(LuaValue::Nil) => break,
            Some(k) => {
                seen.push(k.clone());
                key = k.clone();
            }
        }
    }
    assert_eq!(seen.len(), 3);
}

#[test]
fn test_getmetatable_and_guard() {
    let mut l = state();
    let t = LuaValue::table(LuaTable::new(0, 0));
    let r = call_builtin(&mut l, "getmetatable", vec![t.clone()]);
    assert_eq!(r, vec![LuaValue::Nil]);

    let mt = LuaValue::table(LuaTable::new(0, 0));
    let r = call_builtin(&mut l, "setmetatable", vec![t.clone(), mt.clone()]);
    assert_eq!(r, vec![t.clone()]);
    let r = call_builtin(&mut l, "getmetatable", vec![t.clone()]);
    assert_eq!(r, vec![mt.clone()]);

    // install a __metatable guard: reads see the guard, writes fail
    if let LuaValue::Table(m) = &mt {
        m.borrow_mut()
            .set_field("__metatable", LuaValue::string("locked"));
    }
    let r = call_builtin(&mut l, "getmetatable", vec![t.clone()]);
    assert_eq!(r, vec![LuaValue::string("locked")]);

    let setmetatable = l.get_global("setmetatable");
    let result = l.call_function(setmetatable, vec![t, LuaValue::Nil]);
    assert!(result.is_err(), "protected metatable was replaced");
}

#[test]
fn test_rawget_rawset_rawequal() {
    let mut l = state();
    let t = LuaValue::table(LuaTable::new(0, 0));
    call_builtin(
        &mut l,
        "rawset",
        vec![t.clone(), LuaValue::string("k"), LuaValue::Integer(5)],
    );
    let r = call_builtin(&mut l, "rawget", vec![t.clone(), LuaValue::string("k")]);
    assert_eq!(r, vec![LuaValue::Integer(5)]);

    let r = call_builtin(&mut l, "rawequal", vec![t.clone(), t.clone()]);
    assert_eq!(r, vec![LuaValue::Boolean(true)]);
    let other = LuaValue::table(LuaTable::new(0, 0));
    let r = call_builtin(&mut l, "rawequal", vec![t, other]);
    assert_eq!(r, vec![LuaValue::Boolean(false)]);
}

#[test]
fn test_select() {
    let mut l = state();
    let args = vec![
        LuaValue::string("#"),
        LuaValue::Integer(10),
        LuaValue::Integer(20),
    ];
    let r = call_builtin(&mut l, "select", args);
    assert_eq!(r, vec![LuaValue::Integer(2)]);

    let args = vec![
        LuaValue::Integer(2),
        LuaValue::Integer(10),
        LuaValue::Integer(20),
        LuaValue::Integer(30),
    ];
    let r = call_builtin(&mut l, "select", args);
    assert_eq!(r, vec![LuaValue::Integer(20), LuaValue::Integer(30)]);
}

#[test]
fn test_unpack() {
    let mut l = state();
    let mut table = LuaTable::new(3, 0);
    table.set_int(1, LuaValue::Integer(1));
    table.set_int(2, LuaValue::Integer(2));
    table.set_int(3, LuaValue::Integer(3));
    let r = call_builtin(&mut l, "unpack", vec![LuaValue::table(table)]);
    assert_eq!(
        r,
        vec![
            LuaValue::Integer(1),
            LuaValue::Integer(2),
            LuaValue::Integer(3)
        ]
    );
}

#[test]
fn test_pcall_catches_errors() {
    let mut l = state();
    let error_fn = l.get_global("error");
    let pcall = l.get_global("pcall");
    let r = l
        .call_function(pcall, vec![error_fn, LuaValue::string("boom")])
        .expect("pcall itself must not fail");
    assert_eq!(r[0], LuaValue::Boolean(false));
    match &r[1] {
        LuaValue::String(s) => assert!(s.ends_with("boom"), "got {:?}", s),
        other => panic!("expected a string error value, got {:?}", other),
    }
}

#[test]
fn test_pcall_success_passes_results_through() {
    let mut l = state();
    let pcall = l.get_global("pcall");
    let type_fn = l.get_global("type");
    let r = l
        .call_function(pcall, vec![type_fn, LuaValue::Integer(1)])
        .expect("pcall failed");
    assert_eq!(
        r,
        vec![LuaValue::Boolean(true), LuaValue::string("number")]
    );
}

#[test]
fn test_assert_builtin() {
    let mut l = state();
    let assert_fn = l.get_global("assert");
    let r = l
        .call_function(assert_fn.clone(), vec![LuaValue::Integer(1)])
        .expect("assert(1) failed");
    assert_eq!(r, vec![LuaValue::Integer(1)]);

    let result = l.call_function(assert_fn, vec![LuaValue::Boolean(false)]);
    assert!(result.is_err());
}

#[test]
fn test_error_with_non_string_value() {
    let mut l = state();
    let error_fn = l.get_global("error");
    let payload = LuaValue::table(LuaTable::new(0, 0));
    let (ok, results) = l.pcall(error_fn, vec![payload.clone()]);
    assert!(!ok);
    // non-string error values pass through untouched
    assert_eq!(results, vec![payload]);
}

#[test]
fn test_execute_helper() {
    // the crate-level convenience runs a chunk end to end
    let proto = super::support::ProtoBuilder::new(2)
        .constant(LuaValue::Integer(5))
        .op(crate::lua_vm::Instruction::abx(crate::lua_vm::OpCode::LoadK, 0, 0))
        .op(crate::lua_vm::Instruction::abc(crate::lua_vm::OpCode::Return, 0, 2, 0))
        .build();
    let results = crate::execute(Rc::new(proto)).expect("execute failed");
    assert_eq!(results, vec![LuaValue::Integer(5)]);
}
