use alloc::boxed::Box;

use crate::interpreter::UntypedValue;

/// A WebAssembly Element Instance
///
/// Only passive segments keep their items past instantiation.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#element-instances>
#[derive(Debug)]
pub(crate) struct ElementInstance {
    pub(crate) items: Option<Box<[UntypedValue]>>, // none if the segment was dropped
}

impl ElementInstance {
    pub(crate) fn new(items: Option<Box<[UntypedValue]>>) -> Self {
        Self { items }
    }

    pub(crate) fn items(&self) -> &[UntypedValue] {
        self.items.as_deref().unwrap_or_default()
    }

    pub(crate) fn drop(&mut self) {
        self.items = None;
    }
}
