// CALL / TAILCALL / RETURN: frame creation, in-place replacement and
// result transfer.

use crate::lua_value::LuaValue;
use crate::lua_vm::frame::{Frame, LuaFrame, RetTarget};
use crate::lua_vm::{LuaError, LuaResult, LuaState};

/// What the dispatch loop does after a call-family handler ran.
pub(crate) enum FrameAction {
    /// The frame stack changed: re-enter the outer loop
    Reenter,
    /// The current frame is unchanged: keep dispatching
    Continue,
}

fn gather_args(l: &LuaState, frame_idx: usize, a: usize, b: u32) -> Vec<LuaValue> {
    let nargs = if b == 0 {
        l.frame(frame_idx).top.saturating_sub(a + 1)
    } else {
        (b - 1) as usize
    };
    (0..nargs).map(|i| l.reg(frame_idx, a + 1 + i)).collect()
}

/// Copy a finished call's results into the caller's registers at
/// `base`. An open expectation (-1) also moves the logical top so a
/// following multiple-value consumer sees the exact count.
fn deliver_results(
    l: &mut LuaState,
    frame_idx: usize,
    base: usize,
    results: Vec<LuaValue>,
    expected: i32,
) {
    let count = results.len();
    let frame = l.frame_mut(frame_idx);
    let mut slot = base;
    for value in results {
        frame.set_reg(slot, value);
        slot += 1;
    }
    if expected < 0 {
        frame.set_top(base + count);
    }
}

pub(crate) fn do_call(
    l: &mut LuaState,
    frame_idx: usize,
    a: usize,
    b: u32,
    c: u32,
) -> LuaResult<FrameAction> {
    let func = l.reg(frame_idx, a);
    let args = gather_args(l, frame_idx, a, b);
    let expected = c as i32 - 1;

    let (callee, args) = l.resolve_callable(func, args)?;
    match callee {
        LuaValue::Function(closure) => {
            l.push_lua_frame(closure, args, expected, RetTarget::Register(a))?;
            Ok(FrameAction::Reenter)
        }
        LuaValue::NativeFunction(f) => {
            let results = l.call_native(f, args, expected)?;
            deliver_results(l, frame_idx, a, results, expected);
            Ok(FrameAction::Continue)
        }
        _ => Err(l.type_error("attempt to call a non-function value")),
    }
}

/// TAILCALL replaces the running frame in place, keeping the caller's
/// return bookkeeping, so tail-recursive loops run in constant frame
/// depth. A native target degrades to an ordinary call whose results
/// the following RETURN forwards.
pub(crate) fn do_tailcall(
    l: &mut LuaState,
    frame_idx: usize,
    a: usize,
    b: u32,
) -> LuaResult<FrameAction> {
    let func = l.reg(frame_idx, a);
    let args = gather_args(l, frame_idx, a, b);

    let (callee, args) = l.resolve_callable(func, args)?;
    match callee {
        LuaValue::Function(closure) => {
            l.close_upvalues(frame_idx, 0);
            let (expected, target) = {
                let f = l.frame(frame_idx);
                (f.expected_returns, f.return_target)
            };
            l.frames[frame_idx] = Frame::Lua(LuaFrame::new(closure, args, expected, target));
            Ok(FrameAction::Reenter)
        }
        LuaValue::NativeFunction(f) => {
            let results = l.call_native(f, args, -1)?;
            deliver_results(l, frame_idx, a, results, -1);
            Ok(FrameAction::Continue)
        }
        _ => Err(l.type_error("attempt to call a non-function value")),
    }
}

/// RETURN: collect the results, close the frame's upvalues, pop it,
/// and deliver to the call site (caller registers or the host).
pub(crate) fn do_return(l: &mut LuaState, frame_idx: usize, a: usize, b: u32) -> LuaResult<()> {
    let count = if b == 0 {
        l.frame(frame_idx).top.saturating_sub(a)
    } else {
        (b - 1) as usize
    };
    let mut results: Vec<LuaValue> = (0..count).map(|i| l.reg(frame_idx, a + i)).collect();

    l.close_upvalues(frame_idx, 0);
    let frame = match l.frames.pop() {
        Some(Frame::Lua(f)) => f,
        _ => return Err(LuaError::Runtime("call frame imbalance on return".to_string())),
    };

    let expected = frame.expected_returns;
    if expected >= 0 {
        results.resize(expected as usize, LuaValue::Nil);
    }
    match frame.return_target {
        RetTarget::Host => {
            l.host_results = results;
        }
        RetTarget::Register(base) => {
            let Some(caller_idx) = l.frames.len().checked_sub(1) else {
                return Err(LuaError::Runtime(
                    "return into a missing caller frame".to_string(),
                ));
            };
            deliver_results(l, caller_idx, base, results, expected);
        }
    }
    Ok(())
}
