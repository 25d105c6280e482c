// Arithmetic and comparison cores: numeric coercion first, metamethod
// fallback second.
//
// Integer pairs stay on integer arithmetic for ADD/SUB/MUL/MOD;
// everything else runs on doubles. DIV and POW always run on doubles.
// Operator results are never re-canonicalized, so `1.5 * 2` stays a
// float even though its value is integral.

use super::table_ops::TmKind;
use crate::lua_value::{string_to_number, LuaValue};
use crate::lua_vm::{LuaResult, LuaState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
}

impl ArithOp {
    fn tm(self) -> TmKind {
        match self {
            ArithOp::Add => TmKind::Add,
            ArithOp::Sub => TmKind::Sub,
            ArithOp::Mul => TmKind::Mul,
            ArithOp::Div => TmKind::Div,
            ArithOp::Mod => TmKind::Mod,
            ArithOp::Pow => TmKind::Pow,
        }
    }
}

/// A coerced numeric operand
#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Flt(f64),
}

impl Num {
    #[inline]
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Flt(f) => f,
        }
    }
}

/// Coerce an operand to a number: numbers pass through, strings parse.
pub(crate) fn to_number(value: &LuaValue) -> Option<Num> {
    match value {
        LuaValue::Integer(i) => Some(Num::Int(*i)),
        LuaValue::Float(f) => Some(Num::Flt(*f)),
        LuaValue::String(s) => match string_to_number(s)? {
            LuaValue::Integer(i) => Some(Num::Int(i)),
            LuaValue::Float(f) => Some(Num::Flt(f)),
            _ => None,
        },
        _ => None,
    }
}

/// Lua's floor modulo on doubles: a - floor(a/b)*b
#[inline]
fn float_mod(a: f64, b: f64) -> f64 {
    a - (a / b).floor() * b
}

/// Floor modulo on integers, sign following the divisor
#[inline]
fn int_mod(a: i64, b: i64) -> i64 {
    let r = a.wrapping_rem(b);
    if r != 0 && (r ^ b) < 0 {
        r + b
    } else {
        r
    }
}

fn numeric_arith(l: &LuaState, op: ArithOp, a: Num, b: Num) -> LuaResult<LuaValue> {
    if let (Num::Int(x), Num::Int(y)) = (a, b) {
        match op {
            ArithOp::Add => return Ok(LuaValue::Integer(x.wrapping_add(y))),
            ArithOp::Sub => return Ok(LuaValue::Integer(x.wrapping_sub(y))),
            ArithOp::Mul => return Ok(LuaValue::Integer(x.wrapping_mul(y))),
            ArithOp::Mod => {
                if y == 0 {
                    return Err(l.arith_error("attempt to perform 'n%0'"));
                }
                return Ok(LuaValue::Integer(int_mod(x, y)));
            }
            // DIV and POW always work on doubles
            ArithOp::Div | ArithOp::Pow => {}
        }
    }
    let x = a.as_f64();
    let y = b.as_f64();
    let result = match op {
        ArithOp::Add => x + y,
        ArithOp::Sub => x - y,
        ArithOp::Mul => x * y,
        ArithOp::Div => x / y,
        ArithOp::Mod => float_mod(x, y),
        ArithOp::Pow => x.powf(y),
    };
    Ok(LuaValue::Float(result))
}

/// Binary arithmetic with coercion and metamethod fallback.
pub fn arith(
    l: &mut LuaState,
    op: ArithOp,
    lhs: &LuaValue,
    rhs: &LuaValue,
) -> LuaResult<LuaValue> {
    if let (Some(a), Some(b)) = (to_number(lhs), to_number(rhs)) {
        return numeric_arith(l, op, a, b);
    }
    let handler = l
        .metamethod(lhs, op.tm())
        .or_else(|| l.metamethod(rhs, op.tm()));
    match handler {
        Some(h) => {
            let results = l.call_value(h, vec![lhs.clone(), rhs.clone()], 1)?;
            Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
        }
        None => {
            let offender = if to_number(lhs).is_none() { lhs } else { rhs };
            Err(l.type_error(format_args!(
                "attempt to perform arithmetic on a {} value",
                offender.type_name()
            )))
        }
    }
}

/// Unary minus with coercion and __unm fallback.
pub fn unary_minus(l: &mut LuaState, value: &LuaValue) -> LuaResult<LuaValue> {
    match to_number(value) {
        Some(Num::Int(i)) => Ok(LuaValue::Integer(i.wrapping_neg())),
        Some(Num::Flt(f)) => Ok(LuaValue::Float(-f)),
        None => match l.metamethod(value, TmKind::Unm) {
            Some(h) => {
                // the operand is passed twice, as the 5.1 VM does
                let results = l.call_value(h, vec![value.clone(), value.clone()], 1)?;
                Ok(results.into_iter().next().unwrap_or(LuaValue::Nil))
            }
            None => Err(l.type_error(format_args!(
                "attempt to perform arithmetic on a {} value",
                value.type_name()
            ))),
        },
    }
}

fn numeric_lt(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => Some(x < y),
        _ => None,
    }
}

fn numeric_le(a: &LuaValue, b: &LuaValue) -> Option<bool> {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) if a.is_number() && b.is_number() => Some(x <= y),
        _ => None,
    }
}

fn order_error(l: &LuaState, a: &LuaValue, b: &LuaValue) -> crate::lua_vm::LuaError {
    if a.type_name() == b.type_name() {
        l.type_error(format_args!(
            "attempt to compare two {} values",
            a.type_name()
        ))
    } else {
        l.type_error(format_args!(
            "attempt to compare {} with {}",
            a.type_name(),
            b.type_name()
        ))
    }
}

fn call_compare(l: &mut LuaState, h: LuaValue, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    let results = l.call_value(h, vec![a.clone(), b.clone()], 1)?;
    Ok(results.first().map(|v| v.is_truthy()).unwrap_or(false))
}

/// The < operator: numbers by value, strings by byte order, __lt
/// otherwise.
pub fn less_than(l: &mut LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if let Some(r) = numeric_lt(a, b) {
        return Ok(r);
    }
    if let (LuaValue::String(x), LuaValue::String(y)) = (a, b) {
        return Ok(x.as_bytes() < y.as_bytes());
    }
    let handler = l
        .metamethod(a, TmKind::Lt)
        .or_else(|| l.metamethod(b, TmKind::Lt));
    match handler {
        Some(h) => call_compare(l, h, a, b),
        None => Err(order_error(l, a, b)),
    }
}

/// The <= operator; falls back to `not (b < a)` via __lt when __le is
/// absent, as 5.1 does.
pub fn less_equal(l: &mut LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if let Some(r) = numeric_le(a, b) {
        return Ok(r);
    }
    if let (LuaValue::String(x), LuaValue::String(y)) = (a, b) {
        return Ok(x.as_bytes() <= y.as_bytes());
    }
    let handler = l
        .metamethod(a, TmKind::Le)
        .or_else(|| l.metamethod(b, TmKind::Le));
    if let Some(h) = handler {
        return call_compare(l, h, a, b);
    }
    let handler = l
        .metamethod(a, TmKind::Lt)
        .or_else(|| l.metamethod(b, TmKind::Lt));
    match handler {
        Some(h) => Ok(!call_compare(l, h, b, a)?),
        None => Err(order_error(l, a, b)),
    }
}

/// The == operator. Raw equality is type-aware (numbers compare across
/// the integer/float split); __eq only runs when both operands are
/// tables that compared unequal.
pub fn equals(l: &mut LuaState, a: &LuaValue, b: &LuaValue) -> LuaResult<bool> {
    if a.raw_equals(b) {
        return Ok(true);
    }
    if let (LuaValue::Table(_), LuaValue::Table(_)) = (a, b) {
        let handler = l
            .metamethod(a, TmKind::Eq)
            .or_else(|| l.metamethod(b, TmKind::Eq));
        if let Some(h) = handler {
            return call_compare(l, h, a, b);
        }
    }
    Ok(false)
}
