// Registration system for native library functions.

use crate::lua_value::LuaValue;
use crate::lua_vm::{LuaState, NativeFn};
use log::debug;

/// A named group of native functions installed together.
pub struct LibraryModule {
    pub name: &'static str,
    pub entries: Vec<(&'static str, NativeFn)>,
}

impl LibraryModule {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            entries: Vec::new(),
        }
    }

    pub fn with_function(mut self, name: &'static str, func: NativeFn) -> Self {
        self.entries.push((name, func));
        self
    }

    /// Install every entry. The "_G" module installs straight into the
    /// globals table; any other module gets its own table global.
    pub fn install(&self, l: &mut LuaState) {
        debug!("registering library {:?} ({} entries)", self.name, self.entries.len());
        if self.name == "_G" {
            for (name, func) in &self.entries {
                l.set_global(name, LuaValue::NativeFunction(*func));
            }
        } else {
            let module = crate::lua_value::LuaTable::new(0, self.entries.len());
            let module = LuaValue::table(module);
            if let LuaValue::Table(t) = &module {
                let mut t = t.borrow_mut();
                for (name, func) in &self.entries {
                    t.set_field(name, LuaValue::NativeFunction(*func));
                }
            }
            l.set_global(self.name, module);
        }
    }
}

/// Build a [`LibraryModule`] from a table of name/function pairs.
#[macro_export]
macro_rules! lib_module {
    ($name:expr, {
        $($item_name:expr => $item:expr),* $(,)?
    }) => {{
        let mut module = $crate::lib_registry::LibraryModule::new($name);
        $(
            module.entries.push(($item_name, $item));
        )*
        module
    }};
}
