use alloc::{boxed::Box, rc::Rc, vec::Vec};
use core::fmt::Debug;
use regwasm_types::{ExternalKind, FuncType, GlobalType, Import, MemoryType, TableType};

use crate::func::{FromWasmValueTuple, IntoWasmValueTuple, ValTypesFromTuple};
use crate::{
    Caller, Function, GlobalInstance, Handle, LinkingError, MemoryInstance, Result, Store, TableInstance, WasmValue, log,
};

pub(crate) type HostFuncInner = Rc<dyn Fn(Caller<'_>, &[WasmValue]) -> Result<Vec<WasmValue>>>;

/// A host function
///
/// The callback receives a [`Caller`] giving access to the store and, when called from wasm,
/// the calling instance.
#[derive(Clone)]
pub struct HostFunction {
    pub(crate) ty: FuncType,
    pub(crate) func: HostFuncInner,
}

impl HostFunction {
    /// Create a host function from a callback working on untyped values
    ///
    /// The callback must return values matching the result types of `ty`, otherwise the call
    /// traps with [`Trap::ResultTypesMismatch`](crate::Trap::ResultTypesMismatch).
    pub fn from_untyped(
        ty: &FuncType,
        func: impl Fn(Caller<'_>, &[WasmValue]) -> Result<Vec<WasmValue>> + 'static,
    ) -> Self {
        Self { ty: ty.clone(), func: Rc::new(func) }
    }

    /// Create a host function from a callback working on Rust types
    pub fn from_typed<P, R>(func: impl Fn(Caller<'_>, P) -> Result<R> + 'static) -> Self
    where
        P: FromWasmValueTuple + ValTypesFromTuple,
        R: IntoWasmValueTuple + ValTypesFromTuple,
    {
        let inner_func = move |caller: Caller<'_>, args: &[WasmValue]| -> Result<Vec<WasmValue>> {
            let args = P::from_wasm_value_tuple(args)?;
            let result = func(caller, args)?;
            Ok(result.into_wasm_value_tuple())
        };

        let ty = FuncType { params: P::val_types(), results: R::val_types() };
        Self { ty, func: Rc::new(inner_func) }
    }

    /// The function's signature
    pub fn ty(&self) -> &FuncType {
        &self.ty
    }

    pub(crate) fn call(&self, caller: Caller<'_>, args: &[WasmValue]) -> Result<Vec<WasmValue>> {
        (self.func)(caller, args)
    }
}

impl Debug for HostFunction {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HostFunction").field("ty", &self.ty).field("func", &"...").finish()
    }
}

/// An entity defined by the host, to be allocated with [`Store::define`]
#[derive(Debug)]
#[non_exhaustive]
pub enum Extern {
    /// A global value
    Global {
        /// The global's type
        ty: GlobalType,
        /// Initial value
        value: WasmValue,
    },

    /// A table
    Table {
        /// The table's type
        ty: TableType,
        /// Value of every initial element
        init: WasmValue,
    },

    /// A memory
    Memory {
        /// The memory's type
        ty: MemoryType,
    },

    /// A function
    Func(HostFunction),
}

impl Extern {
    /// Create a new global
    pub fn global(value: WasmValue, mutable: bool) -> Self {
        Self::Global { ty: GlobalType::new(value.val_type(), mutable), value }
    }

    /// Create a new table
    pub fn table(ty: TableType, init: WasmValue) -> Self {
        Self::Table { ty, init }
    }

    /// Create a new memory
    pub fn memory(ty: MemoryType) -> Self {
        Self::Memory { ty }
    }

    /// Create a new function
    pub fn func(ty: &FuncType, func: impl Fn(Caller<'_>, &[WasmValue]) -> Result<Vec<WasmValue>> + 'static) -> Self {
        Self::Func(HostFunction::from_untyped(ty, func))
    }

    /// Create a new typed function
    pub fn typed_func<P, R>(func: impl Fn(Caller<'_>, P) -> Result<R> + 'static) -> Self
    where
        P: FromWasmValueTuple + ValTypesFromTuple,
        R: IntoWasmValueTuple + ValTypesFromTuple,
    {
        Self::Func(HostFunction::from_typed(func))
    }

    /// The kind of entity this defines
    pub fn kind(&self) -> ExternalKind {
        match self {
            Self::Global { .. } => ExternalKind::Global,
            Self::Table { .. } => ExternalKind::Table,
            Self::Memory { .. } => ExternalKind::Memory,
            Self::Func(_) => ExternalKind::Func,
        }
    }
}

/// A reference to an entity in a [`Store`] that can satisfy an import
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#external-values>
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternVal {
    /// A function
    Func(Function),
    /// A table
    Table(Handle<TableInstance>),
    /// A memory
    Memory(Handle<MemoryInstance>),
    /// A global
    Global(Handle<GlobalInstance>),
}

impl ExternVal {
    /// The kind of the referenced entity
    pub fn kind(&self) -> ExternalKind {
        match self {
            Self::Func(_) => ExternalKind::Func,
            Self::Table(_) => ExternalKind::Table,
            Self::Memory(_) => ExternalKind::Memory,
            Self::Global(_) => ExternalKind::Global,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Ord, PartialOrd, Hash)]
/// Name of an import
pub struct ExternName {
    module: Box<str>,
    name: Box<str>,
}

impl ExternName {
    /// Create a new import name
    pub fn new(module: &str, name: &str) -> Self {
        Self { module: module.into(), name: name.into() }
    }

    /// The module part
    pub fn module(&self) -> &str {
        &self.module
    }

    /// The field part
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl From<&Import> for ExternName {
    fn from(import: &Import) -> Self {
        Self { module: import.module.clone(), name: import.name.clone() }
    }
}

/// Look up every import of a module among the names registered in the store.
///
/// Only presence and kind are checked here; the full type check happens during instantiation.
pub(crate) fn resolve_imports(store: &Store, imports: &[Import]) -> Result<Vec<ExternVal>> {
    imports
        .iter()
        .map(|import| {
            let Some(val) = store.resolve(&ExternName::from(import)) else {
                log::debug!("unresolved import {}.{}", import.module, import.name);
                return Err(LinkingError::unknown_import(import).into());
            };

            if val.kind() != import.kind.external_kind() {
                return Err(LinkingError::incompatible_import_type(import).into());
            }

            log::trace!("resolved import {}.{} to {val:?}", import.module, import.name);
            Ok(val)
        })
        .collect()
}
