use alloc::{boxed::Box, collections::BTreeMap, format, string::ToString, sync::Arc, vec::Vec};
use regwasm_types::{DataKind, ElementKind, ExternalKind, ImportKind, WasmModule};

use crate::const_eval::{ConstEvalContext, eval_const, eval_offset};
use crate::imports::resolve_imports;
use crate::instance::ModuleInstanceInner;
use crate::interpreter::{self, UntypedValue};
use crate::store::{CodeBody, create_memory, create_table};
use crate::{
    DataInstance, ElementInstance, Error, ExternVal, FuncTypeId, Function, GlobalInstance, Handle,
    InstantiationError, LinkingError, MemoryInstance, Module, ModuleInstance, Result, Store, TableInstance,
    WasmFunctionInstance, log,
};

/// Imported entities, partitioned by kind in import order.
#[derive(Debug, Default)]
struct Imported {
    funcs: Vec<Function>,
    tables: Vec<Handle<TableInstance>>,
    memories: Vec<Handle<MemoryInstance>>,
    globals: Vec<Handle<GlobalInstance>>,
}

/// Whether an entity with limits `actual` can satisfy an import declaring `expected`.
///
/// See <https://webassembly.github.io/spec/core/valid/types.html#limits>
fn limits_match(actual: (u32, Option<u32>), expected: (u32, Option<u32>)) -> bool {
    let (actual_min, actual_max) = actual;
    let (expected_min, expected_max) = expected;

    actual_min >= expected_min
        && match expected_max {
            None => true,
            Some(expected_max) => actual_max.is_some_and(|actual_max| actual_max <= expected_max),
        }
}

impl Store {
    /// Instantiate a module, resolving its imports against the names registered in this store
    ///
    /// See [`Store::instantiate_with`] for the instantiation steps.
    pub fn instantiate(&mut self, module: &Module) -> Result<ModuleInstance> {
        let imports = resolve_imports(self, &module.data.imports)?;
        self.instantiate_with(module, &imports)
    }

    /// Instantiate a module with explicitly resolved imports, one value per import in import
    /// order
    ///
    /// Instantiation is not transactional: if it fails, or the start function traps, entities
    /// allocated and memory or table contents written up to that point stay in the store.
    ///
    /// See <https://webassembly.github.io/spec/core/exec/modules.html#exec-instantiation>
    pub fn instantiate_with(&mut self, module: &Module, imports: &[ExternVal]) -> Result<ModuleInstance> {
        let module = &module.data;
        log::debug!(
            "instantiating module with {} imports, {} functions and {} exports",
            module.imports.len(),
            module.funcs.len(),
            module.exports.len()
        );

        let types: Box<[FuncTypeId]> = module.types.iter().map(|ty| self.types.intern(ty)).collect();

        // 1. + 2.
        let imported = self.link_imports(module, &types, imports)?;

        // functions need their owner before the instance is complete
        let addr = self.data.instances.alloc(ModuleInstanceInner::default());

        // 3.
        let imported_funcs = imported.funcs.len();
        let mut funcs = imported.funcs;
        funcs.reserve(module.funcs.len());
        for (i, func) in module.funcs.iter().enumerate() {
            let ty = *types.get(func.ty as usize).ok_or_else(|| invalid_index("type", func.ty))?;
            let code = self
                .data
                .codes
                .alloc(CodeBody::Uncompiled { locals: func.locals.clone(), body: Arc::clone(&func.body) });
            let index = (imported_funcs + i) as u32;
            funcs.push(Function::Wasm(self.data.wasm_funcs.alloc(WasmFunctionInstance { ty, owner: addr, index, code })));
        }

        let (config, limiter) = (self.config, self.limiter.as_deref());
        let tables = self.data.tables.alloc_list(&imported.tables, module.tables.len(), |i| {
            create_table(&config, limiter, module.tables[i], UntypedValue::NULL)
        })?;
        let memories = self
            .data
            .memories
            .alloc_list(&imported.memories, module.memories.len(), |i| create_memory(limiter, module.memories[i]))?;

        // 4. + 5.
        let mut globals = imported.globals;
        globals.reserve(module.globals.len());
        for global in module.globals.iter() {
            let ctx = ConstEvalContext { globals: &globals, funcs: &funcs };
            let value = eval_const(self, &ctx, &global.init)?;
            globals.push(self.data.globals.alloc(GlobalInstance::new(global.ty, value.into())));
        }

        // 6.
        let segment_items = {
            let ctx = ConstEvalContext { globals: &globals, funcs: &funcs };
            module
                .elements
                .iter()
                .map(|elem| elem.items.iter().map(|item| eval_const(self, &ctx, item).map(UntypedValue::from)).collect())
                .collect::<Result<Vec<Box<[UntypedValue]>>>>()?
        };

        let elements = self.data.elements.alloc_list(&[], module.elements.len(), |i| {
            Ok::<_, Error>(ElementInstance::new(match module.elements[i].kind {
                ElementKind::Passive => Some(segment_items[i].clone()),
                ElementKind::Active { .. } | ElementKind::Declared => None,
            }))
        })?;

        // 7.
        let datas = self.data.datas.alloc_list(&[], module.data.len(), |i| {
            Ok::<_, Error>(DataInstance::new(match module.data[i].kind {
                DataKind::Passive => Some(module.data[i].data.clone()),
                DataKind::Active { .. } => None,
            }))
        })?;

        // 8.
        let mut exports = BTreeMap::new();
        for export in module.exports.iter() {
            let index = export.index as usize;
            let val = match export.kind {
                ExternalKind::Func => funcs.get(index).map(|f| ExternVal::Func(*f)),
                ExternalKind::Table => tables.get(index).map(|t| ExternVal::Table(*t)),
                ExternalKind::Memory => memories.get(index).map(|m| ExternVal::Memory(*m)),
                ExternalKind::Global => globals.get(index).map(|g| ExternVal::Global(*g)),
            }
            .ok_or_else(|| invalid_index("export", export.index))?;

            if exports.insert(export.name.clone(), val).is_some() {
                return Err(InstantiationError::DuplicateExport(export.name.to_string()).into());
            }
        }

        let exported_funcs = exports.iter().filter_map(|(name, val)| match val {
            ExternVal::Func(func) => Some((&**name, *func)),
            _ => None,
        });
        self.names.register(&funcs, &module.func_names, exported_funcs);

        self.data.instances[addr] = ModuleInstanceInner {
            types,
            funcs: funcs.into_boxed_slice(),
            tables,
            memories,
            globals: globals.into(),
            elements,
            datas,
            exports,
            features: module.features,
        };
        let instance = ModuleInstance { addr, store_id: self.id() };

        // 9.
        for (segment, elem) in module.elements.iter().enumerate() {
            let ElementKind::Active { table, offset } = &elem.kind else {
                continue;
            };

            let ctx = self.const_eval_context(addr);
            let offset = eval_offset(self, &ctx, offset)?;
            let table = *self.data.instances[addr].tables.get(*table as usize).ok_or_else(|| invalid_index("table", *table))?;

            log::trace!("copying element segment {segment} to table {} at {offset}", table.index());
            self.table_mut(table)?
                .copy_from_slice(offset as usize, &segment_items[segment])
                .map_err(|_| InstantiationError::TableOutOfBounds { segment })?;
        }

        // 10.
        for (segment, data) in module.data.iter().enumerate() {
            let DataKind::Active { mem, offset } = &data.kind else {
                continue;
            };

            let ctx = self.const_eval_context(addr);
            let offset = eval_offset(self, &ctx, offset)?;
            let memory = *self.data.instances[addr].memories.get(*mem as usize).ok_or_else(|| invalid_index("memory", *mem))?;

            log::trace!("copying data segment {segment} to memory {} at {offset}", memory.index());
            self.memory_mut(memory)?
                .store(offset as usize, &data.data)
                .map_err(|_| InstantiationError::MemoryOutOfBounds { segment })?;
        }

        // 11.
        if let Some(start) = module.start_func {
            let func = *self.data.instances[addr].funcs.get(start as usize).ok_or_else(|| invalid_index("function", start))?;
            log::debug!("running start function {}", self.symbolicate(func));
            interpreter::invoke(self, func, &[])?;
        }

        Ok(instance)
    }

    /// Check the supplied values against the module's imports and partition them by kind.
    ///
    /// Values created by another store fail the handle lookups with [`Error::InvalidStore`].
    fn link_imports(&self, module: &WasmModule, types: &[FuncTypeId], imports: &[ExternVal]) -> Result<Imported> {
        if imports.len() != module.imports.len() {
            return Err(LinkingError::ImportCountMismatch { expected: module.imports.len(), actual: imports.len() }.into());
        }

        let mut imported = Imported::default();
        for (import, val) in module.imports.iter().zip(imports) {
            let matches = match (&import.kind, *val) {
                (ImportKind::Function(ty), ExternVal::Func(func)) => {
                    let expected = *types.get(*ty as usize).ok_or_else(|| invalid_index("type", *ty))?;
                    imported.funcs.push(func);
                    self.func_type_id(func)? == expected
                }
                (ImportKind::Table(ty), ExternVal::Table(table)) => {
                    let actual = self.table(table)?.ty();
                    imported.tables.push(table);
                    actual.element_type == ty.element_type
                        && limits_match((actual.size_initial, actual.size_max), (ty.size_initial, ty.size_max))
                }
                (ImportKind::Memory(ty), ExternVal::Memory(memory)) => {
                    let actual = self.memory(memory)?.ty();
                    imported.memories.push(memory);
                    limits_match(
                        (actual.page_count_initial, actual.page_count_max),
                        (ty.page_count_initial, ty.page_count_max),
                    )
                }
                (ImportKind::Global(ty), ExternVal::Global(global)) => {
                    imported.globals.push(global);
                    self.global(global)?.ty() == *ty
                }
                _ => false,
            };

            if !matches {
                log::debug!("import {}.{} does not match {val:?}", import.module, import.name);
                return Err(LinkingError::incompatible_import_type(import).into());
            }
        }

        Ok(imported)
    }

    fn const_eval_context(&self, addr: Handle<ModuleInstanceInner>) -> ConstEvalContext<'_> {
        let instance = &self.data.instances[addr];
        ConstEvalContext { globals: &instance.globals, funcs: &instance.funcs }
    }
}

#[cold]
fn invalid_index(kind: &str, index: u32) -> Error {
    Error::Other(format!("module refers to missing {kind} {index}"))
}
