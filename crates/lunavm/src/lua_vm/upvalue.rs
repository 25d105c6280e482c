use crate::lua_value::LuaValue;
use std::cell::RefCell;
use std::rc::Rc;

/// A variable captured by a closure.
///
/// While the owning frame is alive the upvalue stays open and reads
/// and writes go straight to that frame's register, so every closure
/// sharing the cell observes the same variable. CLOSE (or the frame's
/// return) lifts the current register value into the cell, after
/// which the closures keep sharing the heap copy.
#[derive(Debug)]
pub enum Upvalue {
    Open { frame: usize, register: usize },
    Closed(LuaValue),
}

/// Shared upvalue cell
pub type UpvalueRef = Rc<RefCell<Upvalue>>;

impl Upvalue {
    pub fn closed(value: LuaValue) -> UpvalueRef {
        Rc::new(RefCell::new(Upvalue::Closed(value)))
    }

    pub fn open(frame: usize, register: usize) -> UpvalueRef {
        Rc::new(RefCell::new(Upvalue::Open { frame, register }))
    }
}
