use alloc::boxed::Box;

/// A WebAssembly Data Instance
///
/// Only passive segments keep their bytes past instantiation.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#data-instances>
#[derive(Debug)]
pub(crate) struct DataInstance {
    pub(crate) data: Option<Box<[u8]>>, // none if the segment was dropped
}

impl DataInstance {
    pub(crate) fn new(data: Option<Box<[u8]>>) -> Self {
        Self { data }
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or_default()
    }

    pub(crate) fn drop(&mut self) {
        self.data = None;
    }
}
