use alloc::{boxed::Box, collections::BTreeMap, rc::Rc, string::ToString, vec::Vec};
use regwasm_types::{ExternalKind, Features};

use crate::func::{FromWasmValueTuple, IntoWasmValueTuple};
use crate::{
    DataInstance, ElementInstance, Error, ExternVal, FuncHandle, FuncTypeId, Function, GlobalInstance, Handle,
    MemoryInstance, Result, Store, TableInstance, TypedFuncHandle, WasmValue,
};

/// A WebAssembly Module Instance
///
/// A lightweight handle to the instance data owned by the [`Store`] it was created in.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#module-instances>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleInstance {
    pub(crate) addr: Handle<ModuleInstanceInner>,
    pub(crate) store_id: usize,
}

/// Per-kind index lists mapping the module's index spaces to store handles.
///
/// Imported entities come first. A default (empty) value is allocated when instantiation
/// starts so that functions can refer to their owner before it is complete.
#[derive(Debug, Default)]
pub(crate) struct ModuleInstanceInner {
    pub(crate) types: Box<[FuncTypeId]>,
    pub(crate) funcs: Box<[Function]>,
    pub(crate) tables: Box<[Handle<TableInstance>]>,
    pub(crate) memories: Box<[Handle<MemoryInstance>]>,
    pub(crate) globals: Rc<[Handle<GlobalInstance>]>,
    pub(crate) elements: Box<[Handle<ElementInstance>]>,
    pub(crate) datas: Box<[Handle<DataInstance>]>,
    pub(crate) exports: BTreeMap<Box<str>, ExternVal>,
    pub(crate) features: Features,
}

impl ModuleInstance {
    fn inner<'s>(&self, store: &'s Store) -> Result<&'s ModuleInstanceInner> {
        if self.store_id != store.id() {
            return Err(Error::InvalidStore);
        }

        store.data.instances.get(self.addr).ok_or(Error::InvalidStore)
    }

    /// The store-unique id of this instance
    pub fn id(&self) -> u32 {
        self.addr.index()
    }

    /// Names and values of all exports
    pub fn exports<'s>(&self, store: &'s Store) -> Result<impl Iterator<Item = (&'s str, ExternVal)> + use<'s>> {
        Ok(self.inner(store)?.exports.iter().map(|(name, val)| (&**name, *val)))
    }

    /// Get an export by name
    pub fn export(&self, store: &Store, name: &str) -> Result<ExternVal> {
        self.inner(store)?.exports.get(name).copied().ok_or_else(|| Error::ExportNotFound(name.to_string()))
    }

    fn export_of_kind(&self, store: &Store, name: &str, kind: ExternalKind) -> Result<ExternVal> {
        match self.export(store, name)? {
            val if val.kind() == kind => Ok(val),
            _ => Err(Error::ExportNotFound(name.to_string())),
        }
    }

    /// Get an exported function by name
    pub fn exported_func(&self, store: &Store, name: &str) -> Result<FuncHandle> {
        let ExternVal::Func(func) = self.export_of_kind(store, name, ExternalKind::Func)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        Ok(FuncHandle { func, ty: store.func_type(func)?.clone(), store_id: store.id(), name: Some(name.to_string()) })
    }

    /// Get a typed exported function by name
    ///
    /// Fails if the Rust types do not match the function's signature.
    pub fn typed_func<P, R>(&self, store: &Store, name: &str) -> Result<TypedFuncHandle<P, R>>
    where
        P: IntoWasmValueTuple + crate::ValTypesFromTuple,
        R: FromWasmValueTuple + crate::ValTypesFromTuple,
    {
        let func = self.exported_func(store, name)?;
        if *func.ty.params != *P::val_types() || *func.ty.results != *R::val_types() {
            return Err(Error::Other(alloc::format!("function {name} has type {:?}", func.ty)));
        }

        Ok(TypedFuncHandle { func, marker: core::marker::PhantomData })
    }

    /// Call an exported function by name
    pub fn invoke(&self, store: &mut Store, name: &str, params: &[WasmValue]) -> Result<Vec<WasmValue>> {
        self.exported_func(store, name)?.call(store, params)
    }

    /// Read an exported global
    pub fn exported_global(&self, store: &Store, name: &str) -> Result<WasmValue> {
        let ExternVal::Global(global) = self.export_of_kind(store, name, ExternalKind::Global)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        Ok(store.global(global)?.get())
    }

    /// Write an exported global
    ///
    /// Fails if the global is immutable or the value has the wrong type.
    pub fn set_exported_global(&self, store: &mut Store, name: &str, value: WasmValue) -> Result<()> {
        let ExternVal::Global(global) = self.export_of_kind(store, name, ExternalKind::Global)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        store.global_mut(global)?.set(value)
    }

    /// Get an exported memory by name
    pub fn exported_memory<'s>(&self, store: &'s Store, name: &str) -> Result<&'s MemoryInstance> {
        let ExternVal::Memory(memory) = self.export_of_kind(store, name, ExternalKind::Memory)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        store.memory(memory)
    }

    /// Get an exported memory by name, mutably
    pub fn exported_memory_mut<'s>(&self, store: &'s mut Store, name: &str) -> Result<&'s mut MemoryInstance> {
        let ExternVal::Memory(memory) = self.export_of_kind(store, name, ExternalKind::Memory)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        store.memory_mut(memory)
    }

    /// Get an exported table by name
    pub fn exported_table<'s>(&self, store: &'s Store, name: &str) -> Result<&'s TableInstance> {
        let ExternVal::Table(table) = self.export_of_kind(store, name, ExternalKind::Table)? else {
            return Err(Error::ExportNotFound(name.to_string()));
        };

        store.table(table)
    }

    /// The instance's default memory (memory index 0)
    pub fn memory<'s>(&self, store: &'s Store) -> Result<&'s MemoryInstance> {
        store.memory(self.memory_handle(store)?)
    }

    pub(crate) fn memory_handle(&self, store: &Store) -> Result<Handle<MemoryInstance>> {
        self.inner(store)?.memories.first().copied().ok_or_else(|| Error::Other("instance has no memory".into()))
    }
}
