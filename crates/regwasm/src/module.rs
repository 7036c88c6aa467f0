use regwasm_types::WasmModule;

use crate::{ModuleInstance, Result, Store};

#[derive(Debug, Clone)]
/// A WebAssembly Module
///
/// A validated module description, ready to be instantiated in a [`Store`].
///
/// See <https://webassembly.github.io/spec/core/syntax/modules.html#syntax-module>
pub struct Module {
    pub(crate) data: WasmModule,
}

impl From<&WasmModule> for Module {
    fn from(data: &WasmModule) -> Self {
        Self { data: data.clone() }
    }
}

impl From<WasmModule> for Module {
    fn from(data: WasmModule) -> Self {
        Self { data }
    }
}

impl Module {
    #[cfg(feature = "archive")]
    /// Read a module from an archived module description. Requires the `archive` feature.
    pub fn from_archive(bytes: &[u8]) -> Result<Self> {
        Ok(WasmModule::from_archive(bytes)?.into())
    }

    /// The module description
    pub fn description(&self) -> &WasmModule {
        &self.data
    }

    /// Instantiate the module in the given store, resolving imports against the names
    /// registered with [`Store::define`] and [`Store::register_instance`]
    ///
    /// See <https://webassembly.github.io/spec/core/exec/modules.html#exec-instantiation>
    pub fn instantiate(&self, store: &mut Store) -> Result<ModuleInstance> {
        store.instantiate(self)
    }
}
