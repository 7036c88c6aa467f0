use regwasm_types::GlobalType;

use crate::interpreter::UntypedValue;
use crate::{Error, Result, WasmValue};

/// A WebAssembly Global Instance
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#global-instances>
#[derive(Debug)]
pub struct GlobalInstance {
    pub(crate) ty: GlobalType,
    pub(crate) value: UntypedValue,
}

impl GlobalInstance {
    pub(crate) fn new(ty: GlobalType, value: UntypedValue) -> Self {
        Self { ty, value }
    }

    /// The global's type
    pub fn ty(&self) -> GlobalType {
        self.ty
    }

    /// The current value
    pub fn get(&self) -> WasmValue {
        self.value.attach_type(self.ty.ty)
    }

    /// Replace the current value
    ///
    /// Fails if the global is immutable or the value has the wrong type.
    pub fn set(&mut self, value: WasmValue) -> Result<()> {
        if !self.ty.mutable {
            return Err(Error::Other("global is immutable".into()));
        }

        if value.val_type() != self.ty.ty {
            return Err(Error::Other("global type mismatch".into()));
        }

        self.value = value.into();
        Ok(())
    }
}
