// Basic library (global builtins)
// Implements: print, type, tostring, tonumber, next, pairs, ipairs,
// getmetatable, setmetatable, rawget, rawset, rawequal, assert, error,
// select, unpack, pcall.

use crate::lib_registry::LibraryModule;
use crate::lua_value::{string_to_number, LuaValue};
use crate::lua_vm::{LuaError, LuaResult, LuaState, TmKind};

pub fn create_basic_lib() -> LibraryModule {
    crate::lib_module!("_G", {
        "print" => lua_print,
        "type" => lua_type,
        "tostring" => lua_tostring,
        "tonumber" => lua_tonumber,
        "next" => lua_next,
        "pairs" => lua_pairs,
        "ipairs" => lua_ipairs,
        "getmetatable" => lua_getmetatable,
        "setmetatable" => lua_setmetatable,
        "rawget" => lua_rawget,
        "rawset" => lua_rawset,
        "rawequal" => lua_rawequal,
        "assert" => lua_assert,
        "error" => lua_error,
        "select" => lua_select,
        "unpack" => lua_unpack,
        "pcall" => lua_pcall,
    })
}

/// String form of a value, honoring __tostring
fn tostring_value(l: &mut LuaState, value: &LuaValue) -> LuaResult<String> {
    if let Some(handler) = l.metamethod(value, TmKind::Tostring) {
        let results = l.call_value(handler, vec![value.clone()], 1)?;
        let first = results.into_iter().next().unwrap_or(LuaValue::Nil);
        return Ok(first.to_string());
    }
    Ok(value.to_string())
}

/// print(...) - write the arguments' string forms, TAB-separated
fn lua_print(l: &mut LuaState) -> LuaResult<usize> {
    let count = l.arg_count();
    let mut line = String::new();
    for i in 1..=count {
        let arg = l.get_arg(i).unwrap_or(LuaValue::Nil);
        line.push_str(&tostring_value(l, &arg)?);
        if i < count {
            line.push('\t');
        }
    }
    println!("{}", line);
    Ok(0)
}

/// type(v) - the type of a value as a string
fn lua_type(l: &mut LuaState) -> LuaResult<usize> {
    let value = match l.get_arg(1) {
        Some(v) => v,
        None => return Err(l.bad_argument(1, "type", "value")),
    };
    l.push_string(value.type_name());
    Ok(1)
}

/// tostring(v)
fn lua_tostring(l: &mut LuaState) -> LuaResult<usize> {
    let value = match l.get_arg(1) {
        Some(v) => v,
        None => return Err(l.bad_argument(1, "tostring", "value")),
    };
    let text = tostring_value(l, &value)?;
    l.push_string(text);
    Ok(1)
}

/// tonumber(v [, base]) - nil when the value does not convert
fn lua_tonumber(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or(LuaValue::Nil);
    let base = l.get_arg(2).and_then(|b| b.as_integer()).unwrap_or(10);

    if base == 10 {
        let converted = match &value {
            LuaValue::Integer(_) | LuaValue::Float(_) => Some(value.clone()),
            LuaValue::String(s) => string_to_number(s),
            _ => None,
        };
        l.push_value(converted.unwrap_or(LuaValue::Nil));
        return Ok(1);
    }

    if !(2..=36).contains(&base) {
        return Err(l.bad_argument(2, "tonumber", "base out of range"));
    }
    let converted = value
        .as_str()
        .and_then(|s| i64::from_str_radix(s.trim(), base as u32).ok())
        .map(LuaValue::Integer);
    l.push_value(converted.unwrap_or(LuaValue::Nil));
    Ok(1)
}

/// next(t [, key]) - traversal step over a table
fn lua_next(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(LuaValue::Table(t)) => t,
        _ => return Err(l.bad_argument(1, "next", "table")),
    };
    let key = l.get_arg(2).unwrap_or(LuaValue::Nil);
    let step = table.borrow().next(&key);
    match step {
        Ok(Some((k, v))) => {
            l.push_value(k);
            l.push_value(v);
            Ok(2)
        }
        Ok(None) => {
            l.push_nil();
            Ok(1)
        }
        Err(e) => Err(l.position(e)),
    }
}

/// pairs(t) -> next, t, nil
fn lua_pairs(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(v @ LuaValue::Table(_)) => v,
        _ => return Err(l.bad_argument(1, "pairs", "table")),
    };
    l.push_native(lua_next);
    l.push_value(table);
    l.push_nil();
    Ok(3)
}

/// Iterator behind ipairs: steps i while t[i] is non-nil (raw access)
fn ipairs_aux(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(LuaValue::Table(t)) => t,
        _ => return Err(l.bad_argument(1, "ipairs", "table")),
    };
    let i = l.get_arg(2).and_then(|v| v.as_integer()).unwrap_or(0) + 1;
    let value = table.borrow().get_int(i);
    if value.is_nil() {
        return Ok(0);
    }
    l.push_integer(i);
    l.push_value(value);
    Ok(2)
}

/// ipairs(t) -> aux, t, 0
fn lua_ipairs(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(v @ LuaValue::Table(_)) => v,
        _ => return Err(l.bad_argument(1, "ipairs", "table")),
    };
    l.push_native(ipairs_aux);
    l.push_value(table);
    l.push_integer(0);
    Ok(3)
}

/// getmetatable(v) - honors a __metatable guard field
fn lua_getmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let value = l.get_arg(1).unwrap_or(LuaValue::Nil);
    match l.metatable_of(&value) {
        Some(mt) => {
            let guard = mt.borrow().get(&LuaValue::string("__metatable"));
            if guard.is_nil() {
                l.push_value(LuaValue::Table(mt));
            } else {
                l.push_value(guard);
            }
        }
        None => l.push_nil(),
    }
    Ok(1)
}

/// setmetatable(t, mt) - mt must be a table or nil; returns t
fn lua_setmetatable(l: &mut LuaState) -> LuaResult<usize> {
    let table_value = match l.get_arg(1) {
        Some(v @ LuaValue::Table(_)) => v,
        _ => return Err(l.bad_argument(1, "setmetatable", "table")),
    };
    let new_mt = match l.get_arg(2) {
        Some(LuaValue::Table(mt)) => Some(mt),
        Some(LuaValue::Nil) | None => None,
        _ => return Err(l.bad_argument(2, "setmetatable", "nil or table")),
    };
    if let Some(current) = l.metatable_of(&table_value) {
        let guard = current.borrow().get(&LuaValue::string("__metatable"));
        if !guard.is_nil() {
            return Err(l.rt_error("cannot change a protected metatable"));
        }
    }
    if let LuaValue::Table(t) = &table_value {
        t.borrow_mut().set_metatable(new_mt);
    }
    l.push_value(table_value);
    Ok(1)
}

/// rawget(t, k)
fn lua_rawget(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(LuaValue::Table(t)) => t,
        _ => return Err(l.bad_argument(1, "rawget", "table")),
    };
    let key = l.get_arg(2).unwrap_or(LuaValue::Nil);
    let value = table.borrow().get(&key);
    l.push_value(value);
    Ok(1)
}

/// rawset(t, k, v) - returns t
fn lua_rawset(l: &mut LuaState) -> LuaResult<usize> {
    let table_value = match l.get_arg(1) {
        Some(v @ LuaValue::Table(_)) => v,
        _ => return Err(l.bad_argument(1, "rawset", "table")),
    };
    let key = l.get_arg(2).unwrap_or(LuaValue::Nil);
    let value = l.get_arg(3).unwrap_or(LuaValue::Nil);
    if let LuaValue::Table(t) = &table_value {
        let result = t.borrow_mut().set(key, value);
        result.map_err(|e| l.position(e))?;
    }
    l.push_value(table_value);
    Ok(1)
}

/// rawequal(a, b)
fn lua_rawequal(l: &mut LuaState) -> LuaResult<usize> {
    let a = l.get_arg(1).unwrap_or(LuaValue::Nil);
    let b = l.get_arg(2).unwrap_or(LuaValue::Nil);
    l.push_boolean(a.raw_equals(&b));
    Ok(1)
}

/// assert(v [, message]) - raise when v is falsy, else pass through
fn lua_assert(l: &mut LuaState) -> LuaResult<usize> {
    let count = l.arg_count();
    let condition = l.get_arg(1).unwrap_or(LuaValue::Nil);
    if condition.is_falsy() {
        let message = l
            .get_arg(2)
            .unwrap_or_else(|| LuaValue::string("assertion failed!"));
        return Err(LuaError::Raised(message));
    }
    Ok(count)
}

/// error(message [, level]) - string messages get a position prefix
/// unless level is 0
fn lua_error(l: &mut LuaState) -> LuaResult<usize> {
    let message = l.get_arg(1).unwrap_or(LuaValue::Nil);
    let level = l.get_arg(2).and_then(|v| v.as_integer()).unwrap_or(1);
    let value = match &message {
        LuaValue::String(s) if level != 0 => {
            LuaValue::string(format!("{}{}", l.where_str(), s))
        }
        _ => message,
    };
    Err(LuaError::Raised(value))
}

/// select('#', ...) or select(n, ...)
fn lua_select(l: &mut LuaState) -> LuaResult<usize> {
    let count = l.arg_count();
    match l.get_arg(1) {
        Some(LuaValue::String(s)) if s == "#" => {
            l.push_integer(count as i64 - 1);
            Ok(1)
        }
        Some(v) => {
            let n = match v.as_integer() {
                Some(n) if n >= 1 => n as usize,
                _ => return Err(l.bad_argument(1, "select", "number out of range")),
            };
            let mut pushed = 0;
            for i in (n + 1)..=count {
                let arg = l.get_arg(i).unwrap_or(LuaValue::Nil);
                l.push_value(arg);
                pushed += 1;
            }
            Ok(pushed)
        }
        None => Err(l.bad_argument(1, "select", "number")),
    }
}

/// unpack(t [, i [, j]]) - raw reads of t[i..j]
fn lua_unpack(l: &mut LuaState) -> LuaResult<usize> {
    let table = match l.get_arg(1) {
        Some(LuaValue::Table(t)) => t,
        _ => return Err(l.bad_argument(1, "unpack", "table")),
    };
    let i = l.get_arg(2).and_then(|v| v.as_integer()).unwrap_or(1);
    let j = l
        .get_arg(3)
        .and_then(|v| v.as_integer())
        .unwrap_or_else(|| table.borrow().len());
    let mut pushed = 0;
    let mut k = i;
    while k <= j {
        let value = table.borrow().get_int(k);
        l.push_value(value);
        pushed += 1;
        k += 1;
    }
    Ok(pushed)
}

/// pcall(f, ...) - false plus the error value on failure
fn lua_pcall(l: &mut LuaState) -> LuaResult<usize> {
    let func = match l.get_arg(1) {
        Some(v) => v,
        None => return Err(l.bad_argument(1, "pcall", "value")),
    };
    let count = l.arg_count();
    let args: Vec<LuaValue> = (2..=count)
        .map(|i| l.get_arg(i).unwrap_or(LuaValue::Nil))
        .collect();
    let (ok, results) = l.pcall(func, args);
    l.push_boolean(ok);
    let n = results.len();
    for value in results {
        l.push_value(value);
    }
    Ok(1 + n)
}
