// Interpreter state: the frame stack, the registry and globals, the
// per-type default metatables, and the stack-style surface builtins
// program against.

use crate::lua_value::{LuaClosure, LuaTable, LuaValue, TableRef};
use crate::lua_vm::execute::{self, table_ops, TmKind};
use crate::lua_vm::frame::{Frame, LuaFrame, NativeFrame, RetTarget};
use crate::lua_vm::upvalue::{Upvalue, UpvalueRef};
use crate::lua_vm::{LuaError, LuaResult, NativeFn, MAX_CALL_DEPTH, MAX_C_CALLS, MAX_TAG_LOOP};
use crate::chunk::Proto;
use ahash::AHashMap;
use log::debug;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Registry slot holding the globals table
pub const LUA_GLOBALSINDEX: i64 = -10002;

pub struct LuaState {
    pub(crate) frames: Vec<Frame>,
    registry: TableRef,
    globals: TableRef,
    /// Default metatables for non-table values, keyed by type name
    type_metatables: AHashMap<&'static str, TableRef>,
    /// Open upvalues, keyed by (frame index, register index)
    open_upvalues: AHashMap<(usize, usize), UpvalueRef>,
    /// Return values of the innermost host-target frame
    pub(crate) host_results: Vec<LuaValue>,
    /// Nested host re-entry count (pcall, metamethods, iterators)
    c_calls: usize,
}

impl LuaState {
    pub fn new() -> Self {
        let registry = Rc::new(RefCell::new(LuaTable::new(0, 8)));
        let globals = Rc::new(RefCell::new(LuaTable::new(0, 32)));
        registry
            .borrow_mut()
            .set_int(LUA_GLOBALSINDEX, LuaValue::Table(globals.clone()));
        debug!("new interpreter state");
        Self {
            frames: Vec::new(),
            registry,
            globals,
            type_metatables: AHashMap::new(),
            open_upvalues: AHashMap::new(),
            host_results: Vec::new(),
            c_calls: 0,
        }
    }

    /// Register the builtin global functions
    pub fn open_libs(&mut self) {
        crate::stdlib::open_libs(self);
    }

    #[inline]
    pub fn registry(&self) -> TableRef {
        self.registry.clone()
    }

    #[inline]
    pub fn globals(&self) -> TableRef {
        self.globals.clone()
    }

    #[inline]
    pub(crate) fn globals_value(&self) -> LuaValue {
        LuaValue::Table(self.globals.clone())
    }

    // ============ Chunk execution ============

    /// Wrap the top-level prototype in a closure and run it, returning
    /// whatever the chunk returns.
    pub fn execute_chunk(&mut self, proto: Rc<Proto>) -> LuaResult<Vec<LuaValue>> {
        let upvalues = (0..proto.num_upvalues)
            .map(|_| Upvalue::closed(LuaValue::Nil))
            .collect();
        let closure = Rc::new(LuaClosure::new(proto, upvalues));
        self.call_function(LuaValue::Function(closure), Vec::new())
    }

    /// Call any callable value with the given arguments
    pub fn call_function(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
    ) -> LuaResult<Vec<LuaValue>> {
        self.call_value(func, args, -1)
    }

    /// Protected call: errors are caught and returned as a value
    pub fn pcall(&mut self, func: LuaValue, args: Vec<LuaValue>) -> (bool, Vec<LuaValue>) {
        match self.call_value(func, args, -1) {
            Ok(results) => (true, results),
            Err(e) => (false, vec![e.into_value()]),
        }
    }

    // ============ Call protocol ============

    /// Resolve a call target through __call chains until an actual
    /// function is found, accumulating the prepended self arguments.
    pub(crate) fn resolve_callable(
        &mut self,
        mut func: LuaValue,
        mut args: Vec<LuaValue>,
    ) -> LuaResult<(LuaValue, Vec<LuaValue>)> {
        for _ in 0..MAX_TAG_LOOP {
            match func {
                LuaValue::Function(_) | LuaValue::NativeFunction(_) => return Ok((func, args)),
                other => match self.metamethod(&other, TmKind::Call) {
                    Some(handler) => {
                        args.insert(0, other);
                        func = handler;
                    }
                    None => {
                        return Err(self.type_error(format_args!(
                            "attempt to call a {} value",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        Err(LuaError::MetamethodLoop)
    }

    /// Call a value to completion and hand back its results, adjusted
    /// to `expected` (-1 keeps them all). This is the entry used by
    /// the host, by metamethod dispatch and by builtins. Every use
    /// nests the host stack, so the depth is bounded separately from
    /// the frame count.
    pub(crate) fn call_value(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        expected: i32,
    ) -> LuaResult<Vec<LuaValue>> {
        if self.c_calls >= MAX_C_CALLS {
            return Err(LuaError::StackOverflow);
        }
        self.c_calls += 1;
        let result = self.call_value_inner(func, args, expected);
        self.c_calls -= 1;
        result
    }

    fn call_value_inner(
        &mut self,
        func: LuaValue,
        args: Vec<LuaValue>,
        expected: i32,
    ) -> LuaResult<Vec<LuaValue>> {
        let (callee, args) = self.resolve_callable(func, args)?;
        match callee {
            LuaValue::NativeFunction(f) => self.call_native(f, args, expected),
            LuaValue::Function(closure) => {
                let base_depth = self.frames.len();
                self.push_lua_frame(closure, args, expected, RetTarget::Host)?;
                match execute::lua_execute(self, base_depth) {
                    Ok(()) => Ok(std::mem::take(&mut self.host_results)),
                    Err(e) => {
                        self.unwind_to(base_depth);
                        Err(e)
                    }
                }
            }
            _ => Err(self.type_error("attempt to call a non-function value")),
        }
    }

    /// Native precall/postcall: push the argument frame, run the
    /// callable synchronously, transfer its results.
    pub(crate) fn call_native(
        &mut self,
        func: NativeFn,
        args: Vec<LuaValue>,
        expected: i32,
    ) -> LuaResult<Vec<LuaValue>> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(LuaError::StackOverflow);
        }
        self.frames.push(Frame::Native(NativeFrame { func, stack: args }));
        let result = func(self);
        let frame = match self.frames.pop() {
            Some(Frame::Native(f)) => f,
            _ => return Err(LuaError::Runtime("native frame imbalance".to_string())),
        };
        let nret = result?;
        let start = frame.stack.len().saturating_sub(nret);
        let mut results = frame.stack[start..].to_vec();
        if expected >= 0 {
            results.resize(expected as usize, LuaValue::Nil);
        }
        Ok(results)
    }

    pub(crate) fn push_lua_frame(
        &mut self,
        closure: Rc<LuaClosure>,
        args: Vec<LuaValue>,
        expected_returns: i32,
        return_target: RetTarget,
    ) -> LuaResult<()> {
        if self.frames.len() >= MAX_CALL_DEPTH {
            return Err(LuaError::StackOverflow);
        }
        self.frames
            .push(Frame::Lua(LuaFrame::new(closure, args, expected_returns, return_target)));
        Ok(())
    }

    /// Drop frames above `depth`, closing their upvalues (error unwind)
    pub(crate) fn unwind_to(&mut self, depth: usize) {
        while self.frames.len() > depth {
            let idx = self.frames.len() - 1;
            self.close_upvalues(idx, 0);
            self.frames.pop();
        }
    }

    // ============ Frame access (dispatch plumbing) ============

    #[inline]
    pub(crate) fn frame(&self, idx: usize) -> &LuaFrame {
        match &self.frames[idx] {
            Frame::Lua(f) => f,
            Frame::Native(_) => unreachable!("dispatch entered a native frame"),
        }
    }

    #[inline]
    pub(crate) fn frame_mut(&mut self, idx: usize) -> &mut LuaFrame {
        match &mut self.frames[idx] {
            Frame::Lua(f) => f,
            Frame::Native(_) => unreachable!("dispatch entered a native frame"),
        }
    }

    #[inline]
    pub(crate) fn reg(&self, frame_idx: usize, index: usize) -> LuaValue {
        self.frame(frame_idx).reg(index)
    }

    #[inline]
    pub(crate) fn set_reg(&mut self, frame_idx: usize, index: usize, value: LuaValue) {
        self.frame_mut(frame_idx).set_reg(index, value);
    }

    // ============ Upvalues ============

    /// Find or create the shared cell for a caller register
    pub(crate) fn find_upvalue(&mut self, frame: usize, register: usize) -> UpvalueRef {
        self.open_upvalues
            .entry((frame, register))
            .or_insert_with(|| Upvalue::open(frame, register))
            .clone()
    }

    pub(crate) fn read_upvalue(&self, cell: &UpvalueRef) -> LuaValue {
        match &*cell.borrow() {
            Upvalue::Closed(v) => v.clone(),
            Upvalue::Open { frame, register } => self
                .frames
                .get(*frame)
                .and_then(|f| f.as_lua())
                .map(|f| f.reg(*register))
                .unwrap_or(LuaValue::Nil),
        }
    }

    pub(crate) fn write_upvalue(&mut self, cell: &UpvalueRef, value: LuaValue) {
        let target = match &*cell.borrow() {
            Upvalue::Open { frame, register } => Some((*frame, *register)),
            Upvalue::Closed(_) => None,
        };
        match target {
            Some((frame, register)) => {
                if let Some(f) = self.frames.get_mut(frame).and_then(|f| f.as_lua_mut()) {
                    f.set_reg(register, value);
                }
            }
            None => *cell.borrow_mut() = Upvalue::Closed(value),
        }
    }

    /// Close every open upvalue of `frame` at or above `from_register`
    pub(crate) fn close_upvalues(&mut self, frame: usize, from_register: usize) {
        let keys: Vec<(usize, usize)> = self
            .open_upvalues
            .keys()
            .filter(|(f, r)| *f == frame && *r >= from_register)
            .copied()
            .collect();
        for key in keys {
            if let Some(cell) = self.open_upvalues.remove(&key) {
                let value = self
                    .frames
                    .get(key.0)
                    .and_then(|f| f.as_lua())
                    .map(|f| f.reg(key.1))
                    .unwrap_or(LuaValue::Nil);
                *cell.borrow_mut() = Upvalue::Closed(value);
            }
        }
    }

    // ============ Metatables ============

    /// The metatable governing a value: its own for tables, the
    /// per-type default otherwise.
    pub(crate) fn metatable_of(&self, value: &LuaValue) -> Option<TableRef> {
        match value {
            LuaValue::Table(t) => t.borrow().metatable(),
            other => self.type_metatables.get(other.type_name()).cloned(),
        }
    }

    /// A non-nil metamethod for `value`, if one is installed
    pub(crate) fn metamethod(&self, value: &LuaValue, tm: TmKind) -> Option<LuaValue> {
        let mt = self.metatable_of(value)?;
        let handler = mt.borrow().get(&LuaValue::string(tm.name()));
        if handler.is_nil() {
            None
        } else {
            Some(handler)
        }
    }

    pub(crate) fn set_type_metatable(&mut self, type_name: &'static str, mt: Option<TableRef>) {
        match mt {
            Some(mt) => {
                self.type_metatables.insert(type_name, mt);
            }
            None => {
                self.type_metatables.remove(type_name);
            }
        }
    }

    // ============ Globals ============

    pub fn get_global(&self, name: &str) -> LuaValue {
        self.globals.borrow().get(&LuaValue::string(name))
    }

    pub fn set_global(&mut self, name: &str, value: LuaValue) {
        self.globals.borrow_mut().set_field(name, value);
    }

    // ============ Stack surface (current frame) ============

    fn stack_top(&self) -> usize {
        match self.frames.last() {
            Some(Frame::Native(f)) => f.stack.len(),
            Some(Frame::Lua(f)) => f.top,
            None => 0,
        }
    }

    /// Resolve a possibly-negative stack index against the current top
    fn abs_index(&self, idx: i32) -> LuaResult<usize> {
        let top = self.stack_top() as i64;
        let abs = if idx < 0 { top + idx as i64 } else { idx as i64 };
        if abs < 0 || abs >= top {
            return Err(LuaError::Index(format!(
                "stack index {} out of range (top is {})",
                idx, top
            )));
        }
        Ok(abs as usize)
    }

    fn stack_get(&self, index: usize) -> LuaValue {
        match self.frames.last() {
            Some(Frame::Native(f)) => f.stack.get(index).cloned().unwrap_or(LuaValue::Nil),
            Some(Frame::Lua(f)) => f.reg(index),
            None => LuaValue::Nil,
        }
    }

    /// Number of live stack slots in the current frame
    pub fn top(&self) -> usize {
        self.stack_top()
    }

    pub fn set_top(&mut self, new_top: usize) {
        match self.frames.last_mut() {
            Some(Frame::Native(f)) => f.stack.resize(new_top, LuaValue::Nil),
            Some(Frame::Lua(f)) => f.set_top(new_top),
            None => {}
        }
    }

    /// Value at a stack index of the current frame
    pub fn value_at(&self, idx: i32) -> LuaResult<LuaValue> {
        let abs = self.abs_index(idx)?;
        Ok(self.stack_get(abs))
    }

    pub fn push_value(&mut self, value: LuaValue) {
        match self.frames.last_mut() {
            Some(Frame::Native(f)) => f.stack.push(value),
            Some(Frame::Lua(f)) => {
                let top = f.top;
                f.set_reg(top, value);
                f.top = top + 1;
            }
            None => {}
        }
    }

    pub fn pop_value(&mut self) -> LuaValue {
        match self.frames.last_mut() {
            Some(Frame::Native(f)) => f.stack.pop().unwrap_or(LuaValue::Nil),
            Some(Frame::Lua(f)) => {
                if f.top == 0 {
                    return LuaValue::Nil;
                }
                f.top -= 1;
                f.registers.get(f.top).cloned().unwrap_or(LuaValue::Nil)
            }
            None => LuaValue::Nil,
        }
    }

    pub fn push_nil(&mut self) {
        self.push_value(LuaValue::Nil);
    }

    pub fn push_boolean(&mut self, b: bool) {
        self.push_value(LuaValue::Boolean(b));
    }

    pub fn push_number(&mut self, n: f64) {
        self.push_value(LuaValue::number(n));
    }

    pub fn push_integer(&mut self, i: i64) {
        self.push_value(LuaValue::Integer(i));
    }

    pub fn push_string(&mut self, s: impl AsRef<str>) {
        self.push_value(LuaValue::string(s));
    }

    pub fn push_native(&mut self, func: NativeFn) {
        self.push_value(LuaValue::NativeFunction(func));
    }

    // ============ Builtin argument access ============

    /// Argument `index` (1-based) of the current native frame
    pub fn get_arg(&self, index: usize) -> Option<LuaValue> {
        match self.frames.last() {
            Some(Frame::Native(f)) => f.stack.get(index.saturating_sub(1)).cloned(),
            _ => None,
        }
    }

    /// Argument count of the current native frame. Only meaningful
    /// before the callable starts pushing results.
    pub fn arg_count(&self) -> usize {
        match self.frames.last() {
            Some(Frame::Native(f)) => f.stack.len(),
            _ => 0,
        }
    }

    pub(crate) fn bad_argument(&self, index: usize, func: &str, expected: &str) -> LuaError {
        self.type_error(format_args!(
            "bad argument #{} to '{}' ({} expected)",
            index, func, expected
        ))
    }

    // ============ Table operations through metamethods ============

    pub fn get_table(&mut self, idx: i32, key: &LuaValue) -> LuaResult<LuaValue> {
        let obj = self.value_at(idx)?;
        table_ops::get_table(self, &obj, key)
    }

    pub fn set_table(&mut self, idx: i32, key: LuaValue, value: LuaValue) -> LuaResult<()> {
        let obj = self.value_at(idx)?;
        table_ops::set_table(self, &obj, key, value)
    }

    pub fn len(&mut self, idx: i32) -> LuaResult<LuaValue> {
        let obj = self.value_at(idx)?;
        table_ops::length_of(self, &obj)
    }

    /// Metatable of the value at `idx` (including per-type defaults)
    pub fn get_metatable(&self, idx: i32) -> LuaResult<Option<TableRef>> {
        let value = self.value_at(idx)?;
        Ok(self.metatable_of(&value))
    }

    /// Pop a metatable (table or nil) from the top and install it on
    /// the value at `idx`; non-table values get a per-type default.
    pub fn set_metatable(&mut self, idx: i32) -> LuaResult<()> {
        let mt_value = self.pop_value();
        let mt = match mt_value {
            LuaValue::Nil => None,
            LuaValue::Table(t) => Some(t),
            other => {
                return Err(self.type_error(format_args!(
                    "metatable must be a table, got {}",
                    other.type_name()
                )))
            }
        };
        let value = self.value_at(idx)?;
        match value {
            LuaValue::Table(t) => t.borrow_mut().set_metatable(mt),
            other => self.set_type_metatable(other.type_name(), mt),
        }
        Ok(())
    }

    /// C-API-style traversal step: pops the previous key from the top,
    /// pushes the next key/value pair (returning true) or nothing at
    /// the end (returning false).
    pub fn next(&mut self, idx: i32) -> LuaResult<bool> {
        let value = self.value_at(idx)?;
        let Some(table) = value.as_table().cloned() else {
            return Err(self.type_error(format_args!(
                "attempt to iterate a {} value",
                value.type_name()
            )));
        };
        let key = self.pop_value();
        let step = table.borrow().next(&key);
        match step {
            Ok(Some((k, v))) => {
                self.push_value(k);
                self.push_value(v);
                Ok(true)
            }
            Ok(None) => Ok(false),
            Err(e) => Err(self.position(e)),
        }
    }

    /// Call the function at `idx` with `nargs` arguments above it;
    /// results replace the function and arguments on the stack.
    pub fn call(&mut self, idx: i32, nargs: usize, nrets: i32) -> LuaResult<()> {
        let base = self.abs_index(idx)?;
        let func = self.stack_get(base);
        let args: Vec<LuaValue> = (0..nargs).map(|i| self.stack_get(base + 1 + i)).collect();
        let results = self.call_value(func, args, nrets)?;
        match self.frames.last_mut() {
            Some(Frame::Native(f)) => {
                f.stack.truncate(base);
                f.stack.extend(results);
            }
            Some(Frame::Lua(f)) => {
                let mut i = base;
                for v in results {
                    f.set_reg(i, v);
                    i += 1;
                }
                f.set_top(i);
            }
            None => {}
        }
        Ok(())
    }

    // ============ Error construction ============

    /// `source:line: ` prefix for the innermost Lua frame
    pub(crate) fn where_str(&self) -> String {
        for frame in self.frames.iter().rev() {
            if let Frame::Lua(f) = frame {
                let proto = &f.closure.proto;
                let pc = f.pc.saturating_sub(1);
                return match proto.line_at(pc) {
                    Some(line) => format!("{}:{}: ", proto.source, line),
                    None if !proto.source.is_empty() => format!("{}: ", proto.source),
                    None => String::new(),
                };
            }
        }
        String::new()
    }

    pub(crate) fn type_error(&self, msg: impl fmt::Display) -> LuaError {
        LuaError::Type(format!("{}{}", self.where_str(), msg))
    }

    pub(crate) fn arith_error(&self, msg: impl fmt::Display) -> LuaError {
        LuaError::Arith(format!("{}{}", self.where_str(), msg))
    }

    pub(crate) fn rt_error(&self, msg: impl fmt::Display) -> LuaError {
        LuaError::Runtime(format!("{}{}", self.where_str(), msg))
    }

    pub(crate) fn bytecode_error(&self, msg: impl fmt::Display) -> LuaError {
        LuaError::Bytecode(format!("{}{}", self.where_str(), msg))
    }

    /// Attach the current position to an error raised by a helper that
    /// had no access to the state.
    pub(crate) fn position(&self, e: LuaError) -> LuaError {
        let here = self.where_str();
        if here.is_empty() {
            return e;
        }
        match e {
            LuaError::Type(m) => LuaError::Type(format!("{}{}", here, m)),
            LuaError::Arith(m) => LuaError::Arith(format!("{}{}", here, m)),
            LuaError::Index(m) => LuaError::Index(format!("{}{}", here, m)),
            LuaError::Runtime(m) => LuaError::Runtime(format!("{}{}", here, m)),
            LuaError::Bytecode(m) => LuaError::Bytecode(format!("{}{}", here, m)),
            other => other,
        }
    }
}

impl Default for LuaState {
    fn default() -> Self {
        Self::new()
    }
}
