#![allow(dead_code)]

use regwasm::Module;
use regwasm::types::{
    ConstExpr, Data, DataKind, Element, ElementKind, Export, ExternalKind, Features, FuncType, Function, Global,
    GlobalType, Import, ImportKind, Instruction, MemoryType, TableType, ValType, WasmModule,
};

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

/// Assembles a [`WasmModule`] by hand. Indices returned by the builder methods account for
/// imports, so imports have to be declared first.
#[derive(Debug, Default)]
pub struct ModuleBuilder {
    types: Vec<FuncType>,
    imports: Vec<Import>,
    funcs: Vec<Function>,
    tables: Vec<TableType>,
    memories: Vec<MemoryType>,
    globals: Vec<Global>,
    exports: Vec<Export>,
    elements: Vec<Element>,
    data: Vec<Data>,
    start_func: Option<u32>,
    func_names: Vec<(u32, Box<str>)>,
    features: Features,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        init_logger();
        Self::default()
    }

    pub fn with_features(mut self, features: Features) -> Self {
        self.features = features;
        self
    }

    fn imported(&self, kind: ExternalKind) -> u32 {
        self.imports.iter().filter(|import| import.kind.external_kind() == kind).count() as u32
    }

    pub fn ty(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        let ty = FuncType::new(params, results);
        match self.types.iter().position(|t| *t == ty) {
            Some(idx) => idx as u32,
            None => {
                self.types.push(ty);
                self.types.len() as u32 - 1
            }
        }
    }

    pub fn import(&mut self, module: &str, name: &str, kind: ImportKind) -> u32 {
        let index = self.imported(kind.external_kind());
        self.imports.push(Import { module: module.into(), name: name.into(), kind });
        index
    }

    pub fn import_func(&mut self, module: &str, name: &str, params: &[ValType], results: &[ValType]) -> u32 {
        let ty = self.ty(params, results);
        self.import(module, name, ImportKind::Function(ty))
    }

    /// Declare a function; the final `end` is appended.
    pub fn func(&mut self, params: &[ValType], results: &[ValType], locals: &[ValType], body: &[Instruction]) -> u32 {
        let ty = self.ty(params, results);
        let body: Vec<Instruction> = body.iter().cloned().chain([Instruction::End]).collect();
        self.funcs.push(Function { ty, locals: locals.into(), body: body.into() });
        self.imported(ExternalKind::Func) + self.funcs.len() as u32 - 1
    }

    pub fn table(&mut self, element_type: ValType, initial: u32, max: Option<u32>) -> u32 {
        self.tables.push(TableType::new(element_type, initial, max));
        self.imported(ExternalKind::Table) + self.tables.len() as u32 - 1
    }

    pub fn memory(&mut self, initial: u32, max: Option<u32>) -> u32 {
        self.memories.push(MemoryType::new(initial, max));
        self.imported(ExternalKind::Memory) + self.memories.len() as u32 - 1
    }

    pub fn global(&mut self, ty: ValType, mutable: bool, init: ConstExpr) -> u32 {
        self.globals.push(Global { ty: GlobalType::new(ty, mutable), init });
        self.imported(ExternalKind::Global) + self.globals.len() as u32 - 1
    }

    pub fn export(&mut self, name: &str, kind: ExternalKind, index: u32) -> &mut Self {
        self.exports.push(Export { name: name.into(), kind, index });
        self
    }

    pub fn export_func(&mut self, name: &str, index: u32) -> &mut Self {
        self.export(name, ExternalKind::Func, index)
    }

    pub fn name(&mut self, func: u32, name: &str) -> &mut Self {
        self.func_names.push((func, name.into()));
        self
    }

    pub fn active_elements(&mut self, table: u32, offset: i32, funcs: &[u32]) -> u32 {
        let items = funcs.iter().map(|func| ConstExpr::ref_func(*func)).collect();
        self.element(ElementKind::Active { table, offset: ConstExpr::i32(offset) }, items)
    }

    pub fn passive_elements(&mut self, funcs: &[u32]) -> u32 {
        let items = funcs.iter().map(|func| ConstExpr::ref_func(*func)).collect();
        self.element(ElementKind::Passive, items)
    }

    pub fn element(&mut self, kind: ElementKind, items: Vec<ConstExpr>) -> u32 {
        self.elements.push(Element { kind, ty: ValType::RefFunc, items: items.into() });
        self.elements.len() as u32 - 1
    }

    pub fn active_data(&mut self, offset: i32, bytes: &[u8]) -> u32 {
        self.data.push(Data { kind: DataKind::Active { mem: 0, offset: ConstExpr::i32(offset) }, data: bytes.into() });
        self.data.len() as u32 - 1
    }

    pub fn passive_data(&mut self, bytes: &[u8]) -> u32 {
        self.data.push(Data { kind: DataKind::Passive, data: bytes.into() });
        self.data.len() as u32 - 1
    }

    pub fn start(&mut self, func: u32) -> &mut Self {
        self.start_func = Some(func);
        self
    }

    pub fn description(self) -> WasmModule {
        WasmModule {
            types: self.types.into(),
            imports: self.imports.into(),
            funcs: self.funcs.into(),
            tables: self.tables.into(),
            memories: self.memories.into(),
            globals: self.globals.into(),
            exports: self.exports.into(),
            elements: self.elements.into(),
            data: self.data.into(),
            start_func: self.start_func,
            func_names: self.func_names.into(),
            features: self.features,
        }
    }

    pub fn build(self) -> Module {
        Module::from(self.description())
    }
}

/// A module exporting `name` as a single function.
pub fn single_func(name: &str, params: &[ValType], results: &[ValType], locals: &[ValType], body: &[Instruction]) -> Module {
    let mut builder = ModuleBuilder::new();
    let func = builder.func(params, results, locals, body);
    builder.export_func(name, func);
    builder.build()
}
