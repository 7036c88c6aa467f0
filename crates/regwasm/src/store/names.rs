use alloc::{boxed::Box, collections::BTreeMap, format, string::String};
use regwasm_types::FuncIdx;

use crate::Function;

/// Debug names of functions, used to print trap backtraces.
#[derive(Debug, Default)]
pub(crate) struct NameRegistry {
    names: BTreeMap<Function, Box<str>>,
}

impl NameRegistry {
    /// Record the names of an instance's functions.
    ///
    /// Names from the module's name map win; exported functions without one are named after
    /// their first export.
    pub(crate) fn register<'a>(
        &mut self,
        funcs: &[Function],
        func_names: &[(FuncIdx, Box<str>)],
        exports: impl Iterator<Item = (&'a str, Function)>,
    ) {
        for (index, name) in func_names {
            if let Some(func) = funcs.get(*index as usize) {
                self.names.insert(*func, name.clone());
            }
        }

        for (name, func) in exports {
            self.names.entry(func).or_insert_with(|| name.into());
        }
    }

    pub(crate) fn insert(&mut self, func: Function, name: String) {
        self.names.insert(func, name.into());
    }

    pub(crate) fn lookup(&self, func: Function) -> Option<&str> {
        self.names.get(&func).map(|name| &**name)
    }

    /// A printable name for `func`. `wasm_index` is the module-local index of a wasm function.
    pub(crate) fn symbolicate(&self, func: Function, wasm_index: Option<FuncIdx>) -> String {
        if let Some(name) = self.lookup(func) {
            return name.into();
        }

        match wasm_index {
            Some(index) => format!("wasm function[{index}]"),
            None => "unknown host function".into(),
        }
    }
}
