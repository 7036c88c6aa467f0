use alloc::{boxed::Box, collections::BTreeMap, format, rc::Rc, string::String};
use core::fmt::Debug;
use core::sync::atomic::{AtomicUsize, Ordering};
use regwasm_types::{FuncType, MemoryType, TableType};

use crate::arena::{Arena, owner_tag};
use crate::instance::ModuleInstanceInner;
use crate::interpreter::UntypedValue;
use crate::translator::{self, CompiledCode, ModuleEnv};
use crate::{
    Config, Error, Extern, ExternName, ExternVal, FuncTypeId, Handle, InstantiationError, Interceptor, Interner,
    ModuleInstance,
    ResourceLimiter, Result, log,
};

mod data;
mod element;
mod function;
mod global;
mod memory;
mod names;
mod table;

pub(crate) use data::*;
pub(crate) use element::*;
pub use function::{Function, HostFunctionInstance, WasmFunctionInstance};
pub(crate) use function::CodeBody;
pub use global::*;
pub use memory::MemoryInstance;
pub(crate) use memory::{MemLoadable, MemStorable};
pub(crate) use names::NameRegistry;
pub use table::*;

// global store id counter
static STORE_ID: AtomicUsize = AtomicUsize::new(0);

/// Global state that can be manipulated by WebAssembly programs
///
/// The store owns every runtime entity: functions, tables, memories, globals, segments and
/// module instances. Entities are never freed individually, so a store grows as long as
/// modules are instantiated in it. For short-lived workloads, create a new store and drop it
/// when you're done.
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#store>
pub struct Store {
    id: usize,
    pub(crate) config: Config,
    pub(crate) limiter: Option<Box<dyn ResourceLimiter>>,
    interceptor: Option<Box<dyn Interceptor>>,
    registry: BTreeMap<ExternName, ExternVal>,
    translations: usize,
    pub(crate) invocations: usize,

    pub(crate) data: StoreData,
    pub(crate) types: Interner<FuncType>,
    pub(crate) names: NameRegistry,
}

/// The per-kind entity arenas of a store.
#[derive(Debug)]
pub(crate) struct StoreData {
    pub(crate) instances: Arena<ModuleInstanceInner>,
    pub(crate) wasm_funcs: Arena<WasmFunctionInstance>,
    pub(crate) host_funcs: Arena<HostFunctionInstance>,
    pub(crate) codes: Arena<CodeBody>,
    pub(crate) tables: Arena<TableInstance>,
    pub(crate) memories: Arena<MemoryInstance>,
    pub(crate) globals: Arena<GlobalInstance>,
    pub(crate) elements: Arena<ElementInstance>,
    pub(crate) datas: Arena<DataInstance>,
}

impl StoreData {
    fn new(owner: u32) -> Self {
        Self {
            instances: Arena::new(owner),
            wasm_funcs: Arena::new(owner),
            host_funcs: Arena::new(owner),
            codes: Arena::new(owner),
            tables: Arena::new(owner),
            memories: Arena::new(owner),
            globals: Arena::new(owner),
            elements: Arena::new(owner),
            datas: Arena::new(owner),
        }
    }
}

impl Debug for Store {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Store")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("limiter", &self.limiter.is_some())
            .field("interceptor", &self.interceptor.is_some())
            .field("registry", &self.registry)
            .field("translations", &self.translations)
            .field("invocations", &self.invocations)
            .field("data", &self.data)
            .finish()
    }
}

impl PartialEq for Store {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::with_config(Config::default())
    }
}

impl Store {
    /// Create a new store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new store with the given configuration
    pub fn with_config(config: Config) -> Self {
        let id = STORE_ID.fetch_add(1, Ordering::Relaxed);
        log::debug!("creating store {id} with {config:?}");

        Self {
            id,
            config,
            limiter: None,
            interceptor: None,
            registry: BTreeMap::new(),
            translations: 0,
            invocations: 0,
            data: StoreData::new(owner_tag(id)),
            types: Interner::new(owner_tag(id)),
            names: NameRegistry::default(),
        }
    }

    /// Get the store's ID (unique per process)
    pub fn id(&self) -> usize {
        self.id
    }

    /// The store's configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Install a limiter consulted whenever a table or memory is created or grown
    pub fn set_limiter(&mut self, limiter: impl ResourceLimiter + 'static) {
        self.limiter = Some(Box::new(limiter));
    }

    /// Install an interceptor notified whenever a function is entered or exited
    pub fn set_interceptor(&mut self, interceptor: impl Interceptor + 'static) {
        self.interceptor = Some(Box::new(interceptor));
    }

    /// Remove the interceptor, if any
    pub fn clear_interceptor(&mut self) {
        self.interceptor = None;
    }

    #[inline]
    pub(crate) fn enter_function(&self, func: Function) {
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_enter_function(self, func);
        }
    }

    #[inline]
    pub(crate) fn exit_function(&self, func: Function) {
        if let Some(interceptor) = &self.interceptor {
            interceptor.on_exit_function(self, func);
        }
    }

    /// Number of function bodies lowered into the internal encoding so far
    pub fn translation_count(&self) -> usize {
        self.translations
    }

    /// Intern a function signature
    pub fn intern_type(&mut self, ty: &FuncType) -> FuncTypeId {
        self.types.intern(ty)
    }

    /// Look up an interned function signature
    ///
    /// Fails with [`Error::InvalidStore`] for ids interned by another store.
    pub fn resolve_type(&self, id: FuncTypeId) -> Result<&FuncType> {
        self.types.resolve(id).ok_or(Error::InvalidStore)
    }

    /// Allocate a host entity and make it importable as `module.name`
    ///
    /// A later definition under the same name replaces the earlier one for future
    /// instantiations; the earlier entity stays alive.
    pub fn define(&mut self, module: &str, name: &str, value: Extern) -> Result<ExternVal> {
        let val = match value {
            Extern::Func(func) => {
                log::debug!("defining host function {module}.{name}: {:?}", func.ty);
                let ty = self.types.intern(&func.ty);
                let func = Function::Host(self.data.host_funcs.alloc(HostFunctionInstance { ty, func }));
                self.names.insert(func, format!("{module}.{name}"));
                ExternVal::Func(func)
            }
            Extern::Global { ty, value } => {
                if value.val_type() != ty.ty {
                    return Err(Error::Other(format!("global {module}.{name} initialized with {value:?}")));
                }
                ExternVal::Global(self.data.globals.alloc(GlobalInstance::new(ty, value.into())))
            }
            Extern::Memory { ty } => ExternVal::Memory(self.alloc_memory(ty)?),
            Extern::Table { ty, init } => {
                if init.val_type() != ty.element_type {
                    return Err(Error::Other(format!("table {module}.{name} initialized with {init:?}")));
                }
                ExternVal::Table(self.alloc_table(ty, init.into())?)
            }
        };

        self.registry.insert(ExternName::new(module, name), val);
        Ok(val)
    }

    /// Make all exports of `instance` importable under the module name `name`
    pub fn register_instance(&mut self, name: &str, instance: &ModuleInstance) -> Result<()> {
        let exports: alloc::vec::Vec<_> =
            instance.exports(self)?.map(|(export, val)| (ExternName::new(name, export), val)).collect();

        log::debug!("registering {} exports of instance {} as {name}", exports.len(), instance.id());
        self.registry.extend(exports);
        Ok(())
    }

    /// Look up a name registered with [`Store::define`] or [`Store::register_instance`]
    pub fn resolve(&self, name: &ExternName) -> Option<ExternVal> {
        self.registry.get(name).copied()
    }

    /// The signature of a function
    pub fn func_type(&self, func: Function) -> Result<&FuncType> {
        self.resolve_type(self.func_type_id(func)?)
    }

    pub(crate) fn func_type_id(&self, func: Function) -> Result<FuncTypeId> {
        match func {
            Function::Wasm(handle) => self.data.wasm_funcs.get(handle).map(|f| f.ty),
            Function::Host(handle) => self.data.host_funcs.get(handle).map(|f| f.ty),
        }
        .ok_or(Error::InvalidStore)
    }

    /// Get a memory by handle
    pub fn memory(&self, handle: Handle<MemoryInstance>) -> Result<&MemoryInstance> {
        self.data.memories.get(handle).ok_or(Error::InvalidStore)
    }

    /// Get a memory by handle, mutably
    pub fn memory_mut(&mut self, handle: Handle<MemoryInstance>) -> Result<&mut MemoryInstance> {
        self.data.memories.get_mut(handle).ok_or(Error::InvalidStore)
    }

    /// Get a table by handle
    pub fn table(&self, handle: Handle<TableInstance>) -> Result<&TableInstance> {
        self.data.tables.get(handle).ok_or(Error::InvalidStore)
    }

    /// Get a table by handle, mutably
    pub fn table_mut(&mut self, handle: Handle<TableInstance>) -> Result<&mut TableInstance> {
        self.data.tables.get_mut(handle).ok_or(Error::InvalidStore)
    }

    /// Get a global by handle
    pub fn global(&self, handle: Handle<GlobalInstance>) -> Result<&GlobalInstance> {
        self.data.globals.get(handle).ok_or(Error::InvalidStore)
    }

    /// Get a global by handle, mutably
    pub fn global_mut(&mut self, handle: Handle<GlobalInstance>) -> Result<&mut GlobalInstance> {
        self.data.globals.get_mut(handle).ok_or(Error::InvalidStore)
    }

    pub(crate) fn alloc_memory(&mut self, ty: MemoryType) -> Result<Handle<MemoryInstance>> {
        let memory = create_memory(self.limiter.as_deref(), ty)?;
        Ok(self.data.memories.alloc(memory))
    }

    pub(crate) fn alloc_table(&mut self, ty: TableType, init: UntypedValue) -> Result<Handle<TableInstance>> {
        let table = create_table(&self.config, self.limiter.as_deref(), ty, init)?;
        Ok(self.data.tables.alloc(table))
    }

    /// The lowered code of a wasm function, translating it on first use.
    pub(crate) fn compiled_code(&mut self, handle: Handle<WasmFunctionInstance>) -> Result<Rc<CompiledCode>> {
        let func = self.data.wasm_funcs.get(handle).ok_or(Error::InvalidStore)?;
        let (locals, body) = match &self.data.codes[func.code] {
            CodeBody::Compiled(code) => return Ok(code.clone()),
            CodeBody::Uncompiled { locals, body } => (locals.clone(), body.clone()),
        };

        let (owner, code_handle, index) = (func.owner, func.code, func.index);
        let ty = self.resolve_type(func.ty)?;
        let env = InstanceEnv { store: self, instance: &self.data.instances[owner] };
        let code = match translator::translate(&env, ty, &locals, &body) {
            Ok(code) => Rc::new(code),
            Err(err) => {
                log::error!("failed to translate {}: {err}", self.symbolicate(Function::Wasm(handle)));
                return Err(err.into());
            }
        };

        log::debug!(
            "translated function {index} of instance {}: {} ops, frame size {}",
            owner.index(),
            code.ops.len(),
            code.frame_size
        );

        self.data.codes[code_handle] = CodeBody::Compiled(code.clone());
        self.translations += 1;
        Ok(code)
    }

    /// A printable name of a function, as used in trap backtraces
    pub fn symbolicate(&self, func: Function) -> String {
        let wasm_index = match func {
            Function::Wasm(handle) => self.data.wasm_funcs.get(handle).map(|f| f.index),
            Function::Host(_) => None,
        };
        self.names.symbolicate(func, wasm_index)
    }
}

/// Check a memory against the resource limits and create it.
pub(crate) fn create_memory(limiter: Option<&dyn ResourceLimiter>, ty: MemoryType) -> Result<MemoryInstance> {
    let within_limits = ty.page_count_initial <= ty.page_count_max()
        && limiter.is_none_or(|limiter| limiter.limit_memory_growth(ty.initial_size()));

    if !within_limits {
        log::debug!("memory of {} pages exceeds the resource limits", ty.page_count_initial);
        return Err(InstantiationError::ResourceLimitExceeded.into());
    }

    Ok(MemoryInstance::new(ty))
}

/// Check a table against the configured cap and the resource limits and create it.
pub(crate) fn create_table(
    config: &Config,
    limiter: Option<&dyn ResourceLimiter>,
    ty: TableType,
    init: UntypedValue,
) -> Result<TableInstance> {
    let within_limits = ty.size_initial <= config.table_limit()
        && limiter.is_none_or(|limiter| limiter.limit_table_growth(ty.size_initial as usize));

    if !within_limits {
        log::debug!("table of {} elements exceeds the resource limits", ty.size_initial);
        return Err(InstantiationError::ResourceLimitExceeded.into());
    }

    Ok(TableInstance::new(ty, init))
}

/// Resolves module indices while translating a function of `instance`.
struct InstanceEnv<'a> {
    store: &'a Store,
    instance: &'a ModuleInstanceInner,
}

impl ModuleEnv for InstanceEnv<'_> {
    fn func_type(&self, ty: regwasm_types::TypeIdx) -> Option<(FuncTypeId, &FuncType)> {
        let id = *self.instance.types.get(ty as usize)?;
        Some((id, self.store.types.resolve(id)?))
    }

    fn callee(&self, func: regwasm_types::FuncIdx) -> Option<(Function, &FuncType)> {
        let func = *self.instance.funcs.get(func as usize)?;
        Some((func, self.store.types.resolve(self.store.func_type_id(func).ok()?)?))
    }

    fn compiled(&self, func: Handle<WasmFunctionInstance>) -> Option<Rc<CompiledCode>> {
        let code = self.store.data.wasm_funcs.get(func)?.code;
        match self.store.data.codes.get(code)? {
            CodeBody::Compiled(code) => Some(code.clone()),
            CodeBody::Uncompiled { .. } => None,
        }
    }

    fn features(&self) -> regwasm_types::Features {
        self.instance.features
    }
}
