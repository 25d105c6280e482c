// Centralized metamethod resolution for indexing, length and
// concatenation.

use crate::lua_value::{number_to_string, LuaValue};
use crate::lua_vm::{LuaError, LuaResult, LuaState, MAX_TAG_LOOP};

/// Metamethod event keys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TmKind {
    Index,
    NewIndex,
    Call,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Unm,
    Concat,
    Len,
    Eq,
    Lt,
    Le,
    Metatable,
    Tostring,
}

impl TmKind {
    pub fn name(self) -> &'static str {
        match self {
            TmKind::Index => "__index",
            TmKind::NewIndex => "__newindex",
            TmKind::Call => "__call",
            TmKind::Add => "__add",
            TmKind::Sub => "__sub",
            TmKind::Mul => "__mul",
            TmKind::Div => "__div",
            TmKind::Mod => "__mod",
            TmKind::Pow => "__pow",
            TmKind::Unm => "__unm",
            TmKind::Concat => "__concat",
            TmKind::Len => "__len",
            TmKind::Eq => "__eq",
            TmKind::Lt => "__lt",
            TmKind::Le => "__le",
            TmKind::Metatable => "__metatable",
            TmKind::Tostring => "__tostring",
        }
    }
}

/// Indexed read honoring __index chains. The handler may be a function
/// (called with `(obj, key)`) or a table (looked up recursively); the
/// chain length is bounded to stop metatable cycles.
pub fn get_table(l: &mut LuaState, obj: &LuaValue, key: &LuaValue) -> LuaResult<LuaValue> {
    let mut current = obj.clone();
    for _ in 0..MAX_TAG_LOOP {
        let handler = if let LuaValue::Table(t) = &current {
            let raw = t.borrow().get(key);
            if !raw.is_nil() {
                return Ok(raw);
            }
            match l.metamethod(&current, TmKind::Index) {
                Some(h) => h,
                None => return Ok(LuaValue::Nil),
            }
        } else {
            match l.metamethod(&current, TmKind::Index) {
                Some(h) => h,
                None => {
                    return Err(l.type_error(format_args!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
            }
        };
        if handler.is_function() {
            let results = l.call_value(handler, vec![current, key.clone()], 1)?;
            return Ok(results.into_iter().next().unwrap_or(LuaValue::Nil));
        }
        current = handler;
    }
    Err(LuaError::MetamethodLoop)
}

/// Indexed write honoring __newindex chains.
pub fn set_table(
    l: &mut LuaState,
    obj: &LuaValue,
    key: LuaValue,
    value: LuaValue,
) -> LuaResult<()> {
    let mut current = obj.clone();
    for _ in 0..MAX_TAG_LOOP {
        let handler = if let LuaValue::Table(t) = &current {
            let existing = !t.borrow().get(&key).is_nil();
            if existing {
                let r = t.borrow_mut().set(key, value);
                return r.map_err(|e| l.position(e));
            }
            match l.metamethod(&current, TmKind::NewIndex) {
                Some(h) => h,
                None => {
                    let r = t.borrow_mut().set(key, value);
                    return r.map_err(|e| l.position(e));
                }
            }
        } else {
            match l.metamethod(&current, TmKind::NewIndex) {
                Some(h) => h,
                None => {
                    return Err(l.type_error(format_args!(
                        "attempt to index a {} value",
                        current.type_name()
                    )))
                }
            }
        };
        if handler.is_function() {
            l.call_value(handler, vec![current, key, value], 0)?;
            return Ok(());
        }
        current = handler;
    }
    Err(LuaError::MetamethodLoop)
}

/// The # operator: string byte length, table border, or __len.
pub fn length_of(l: &mut LuaState, value: &LuaValue) -> LuaResult<LuaValue> {
    match value {
        LuaValue::String(s) => Ok(LuaValue::Integer(s.len() as i64)),
        LuaValue::Table(t) => Ok(LuaValue::Integer(t.borrow().len())),
        other => match l.metamethod(other, TmKind::Len) {
            Some(handler) => {
                let results = l.call_value(handler, vec![other.clone()], 1)?;
                Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
            }
            None => Err(l.type_error(format_args!(
                "attempt to get length of a {} value",
                other.type_name()
            ))),
        },
    }
}

fn concat_text(value: &LuaValue) -> Option<String> {
    match value {
        LuaValue::String(s) => Some(s.to_string()),
        LuaValue::Integer(_) | LuaValue::Float(_) => {
            number_to_string(value).map(|s| s.to_string())
        }
        _ => None,
    }
}

fn concat_pair(l: &mut LuaState, lhs: LuaValue, rhs: LuaValue) -> LuaResult<LuaValue> {
    if let (Some(a), Some(b)) = (concat_text(&lhs), concat_text(&rhs)) {
        let mut s = a;
        s.push_str(&b);
        return Ok(LuaValue::string(s));
    }
    let handler = l
        .metamethod(&lhs, TmKind::Concat)
        .or_else(|| l.metamethod(&rhs, TmKind::Concat));
    match handler {
        Some(h) => {
            let results = l.call_value(h, vec![lhs, rhs], 1)?;
            Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
        }
        None => {
            let offender = if concat_text(&lhs).is_none() { &lhs } else { &rhs };
            Err(l.type_error(format_args!(
                "attempt to concatenate a {} value",
                offender.type_name()
            )))
        }
    }
}

/// CONCAT folds right-to-left so metamethods see the operands in the
/// order the language defines.
pub fn concat_values(l: &mut LuaState, mut values: Vec<LuaValue>) -> LuaResult<LuaValue> {
    let Some(mut acc) = values.pop() else {
        return Ok(LuaValue::string(""));
    };
    while let Some(lhs) = values.pop() {
        acc = concat_pair(l, lhs, acc)?;
    }
    Ok(acc)
}
