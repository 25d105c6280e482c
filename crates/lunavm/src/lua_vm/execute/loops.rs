// The for-loop family. Numeric loops stay on integers when the
// initial value, limit and step are all integers; otherwise every
// control slot is converted to a float up front.

use super::arith::{to_number, Num};
use super::jump;
use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaResult, LuaState};

fn coerce_control(
    l: &mut LuaState,
    frame_idx: usize,
    index: usize,
    what: &str,
) -> LuaResult<Num> {
    let value = l.reg(frame_idx, index);
    to_number(&value).ok_or_else(|| l.type_error(format_args!("'for' {} must be a number", what)))
}

pub(crate) fn for_prep(l: &mut LuaState, frame_idx: usize, a: usize, sbx: i32) -> LuaResult<()> {
    let init = coerce_control(l, frame_idx, a, "initial value")?;
    let limit = coerce_control(l, frame_idx, a + 1, "limit")?;
    let step = coerce_control(l, frame_idx, a + 2, "step")?;

    match (init, limit, step) {
        (Num::Int(i), Num::Int(lim), Num::Int(st)) => {
            l.set_reg(frame_idx, a, LuaValue::Integer(i.wrapping_sub(st)));
            l.set_reg(frame_idx, a + 1, LuaValue::Integer(lim));
            l.set_reg(frame_idx, a + 2, LuaValue::Integer(st));
        }
        (i, lim, st) => {
            let (i, lim, st) = (i.as_f64(), lim.as_f64(), st.as_f64());
            l.set_reg(frame_idx, a, LuaValue::Float(i - st));
            l.set_reg(frame_idx, a + 1, LuaValue::Float(lim));
            l.set_reg(frame_idx, a + 2, LuaValue::Float(st));
        }
    }
    jump(l, frame_idx, sbx)
}

pub(crate) fn for_loop(l: &mut LuaState, frame_idx: usize, a: usize, sbx: i32) -> LuaResult<()> {
    let idx = l.reg(frame_idx, a);
    let limit = l.reg(frame_idx, a + 1);
    let step = l.reg(frame_idx, a + 2);

    if let (LuaValue::Integer(i), LuaValue::Integer(lim), LuaValue::Integer(st)) =
        (&idx, &limit, &step)
    {
        // integer overflow terminates the loop instead of wrapping
        let Some(next) = i.checked_add(*st) else {
            return Ok(());
        };
        let continues = if *st > 0 { next <= *lim } else { next >= *lim };
        l.set_reg(frame_idx, a, LuaValue::Integer(next));
        if continues {
            l.set_reg(frame_idx, a + 3, LuaValue::Integer(next));
            return jump(l, frame_idx, sbx);
        }
        return Ok(());
    }

    let (Some(i), Some(lim), Some(st)) = (idx.as_number(), limit.as_number(), step.as_number())
    else {
        return Err(l.type_error("'for' control variable must be a number"));
    };
    let next = i + st;
    let continues = if st > 0.0 { next <= lim } else { next >= lim };
    l.set_reg(frame_idx, a, LuaValue::Float(next));
    if continues {
        l.set_reg(frame_idx, a + 3, LuaValue::Float(next));
        return jump(l, frame_idx, sbx);
    }
    Ok(())
}

/// TFORLOOP: call the iterator with the state and the control value,
/// expecting C results. A nil first result ends the loop by skipping
/// the jump that follows; otherwise the control value advances and the
/// jump runs.
pub(crate) fn tfor_loop(l: &mut LuaState, frame_idx: usize, a: usize, c: u32) -> LuaResult<()> {
    let func = l.reg(frame_idx, a);
    let args = vec![l.reg(frame_idx, a + 1), l.reg(frame_idx, a + 2)];
    let results = l.call_value(func, args, c as i32)?;
    for (i, value) in results.into_iter().enumerate() {
        l.set_reg(frame_idx, a + 3 + i, value);
    }
    let first = l.reg(frame_idx, a + 3);
    if first.is_nil() {
        l.frame_mut(frame_idx).pc += 1;
    } else {
        l.set_reg(frame_idx, a + 2, first);
    }
    Ok(())
}
