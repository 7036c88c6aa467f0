#![no_std]
#![forbid(unsafe_code)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_assignments, unused_variables))
))]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

//! Module description types used by [`regwasm`](https://docs.rs/regwasm).
//!
//! A [`WasmModule`] is the already-validated, structured form of a WebAssembly module.
//! Producing one (decoding the binary or text format) is the job of an external front end;
//! the runtime only consumes it.

extern crate alloc;

// log for logging (optional).
#[cfg(feature = "log")]
#[allow(clippy::single_component_path_imports, unused_imports)]
use log;

#[cfg(not(feature = "log"))]
#[allow(unused_imports, unused_macros)]
pub(crate) mod log {
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
    pub(crate) use debug;
    pub(crate) use error;
}

mod instructions;
pub use instructions::*;

#[cfg(feature = "archive")]
pub mod archive;

use alloc::{boxed::Box, sync::Arc};

/// A validated WebAssembly module description.
///
/// Index spaces follow the WebAssembly rules: imported entities come first, followed by the
/// entities declared in the module itself. Nothing in here is checked again by the runtime,
/// so a `WasmModule` built by hand must already be valid.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct WasmModule {
    /// Function signatures, referenced by [`TypeIdx`].
    pub types: Box<[FuncType]>,

    /// Imports in declaration order.
    pub imports: Box<[Import]>,

    /// Functions declared in the module (not including imported functions).
    pub funcs: Box<[Function]>,

    /// Tables declared in the module (not including imported tables).
    pub tables: Box<[TableType]>,

    /// Memories declared in the module (not including imported memories).
    pub memories: Box<[MemoryType]>,

    /// Globals declared in the module (not including imported globals).
    pub globals: Box<[Global]>,

    /// Exports of the module.
    pub exports: Box<[Export]>,

    /// Element segments.
    pub elements: Box<[Element]>,

    /// Data segments.
    pub data: Box<[Data]>,

    /// The start function, if any.
    pub start_func: Option<FuncIdx>,

    /// Debug names of functions, indexed by their position in the function index space.
    pub func_names: Box<[(FuncIdx, Box<str>)]>,

    /// Proposals this module was validated against.
    pub features: Features,
}

impl WasmModule {
    /// Number of imports of the given kind.
    pub fn imported_count(&self, kind: ExternalKind) -> usize {
        self.imports.iter().filter(|import| import.kind.external_kind() == kind).count()
    }
}

/// Index into the type section.
pub type TypeIdx = u32;
/// Index into the function index space.
pub type FuncIdx = u32;
/// Index into the table index space.
pub type TableIdx = u32;
/// Index into the memory index space.
pub type MemIdx = u32;
/// Index into the global index space.
pub type GlobalIdx = u32;
/// Index of an element segment.
pub type ElemIdx = u32;
/// Index of a data segment.
pub type DataIdx = u32;
/// Index of a local (parameters first).
pub type LocalIdx = u32;
/// Relative depth of a branch target.
pub type LabelIdx = u32;

/// Type of a WebAssembly value.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#value-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum ValType {
    /// A 32-bit integer.
    I32,
    /// A 64-bit integer.
    I64,
    /// A 32-bit float.
    F32,
    /// A 64-bit float.
    F64,
    /// A reference to a function.
    RefFunc,
    /// A reference to an external value.
    RefExtern,
}

impl ValType {
    /// Whether this is one of the reference types.
    pub fn is_ref(&self) -> bool {
        matches!(self, Self::RefFunc | Self::RefExtern)
    }
}

/// The type of a WebAssembly function.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#function-types>
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct FuncType {
    /// Parameter types.
    pub params: Box<[ValType]>,
    /// Result types.
    pub results: Box<[ValType]>,
}

impl FuncType {
    /// Create a new function type.
    pub fn new(params: &[ValType], results: &[ValType]) -> Self {
        Self { params: params.into(), results: results.into() }
    }

    /// A function type without parameters and results.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A function declared in a module.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Function {
    /// The function's signature.
    pub ty: TypeIdx,
    /// Declared locals, not including the parameters.
    pub locals: Box<[ValType]>,
    /// The function body, terminated by a final [`Instruction::End`].
    pub body: Arc<[Instruction]>,
}

/// The type of a global.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct GlobalType {
    /// Whether `global.set` is allowed.
    pub mutable: bool,
    /// The value type.
    pub ty: ValType,
}

impl GlobalType {
    /// Create a new global type.
    pub fn new(ty: ValType, mutable: bool) -> Self {
        Self { ty, mutable }
    }
}

/// A global declared in a module.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Global {
    /// The global's type.
    pub ty: GlobalType,
    /// Initializer.
    pub init: ConstExpr,
}

/// The type of a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct TableType {
    /// Either [`ValType::RefFunc`] or [`ValType::RefExtern`].
    pub element_type: ValType,
    /// Initial number of elements.
    pub size_initial: u32,
    /// Maximum number of elements.
    pub size_max: Option<u32>,
}

impl TableType {
    /// Create a new table type.
    pub fn new(element_type: ValType, size_initial: u32, size_max: Option<u32>) -> Self {
        Self { element_type, size_initial, size_max }
    }
}

/// The type of a linear memory. Sizes are in 64 KiB pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryType {
    /// Initial number of pages.
    pub page_count_initial: u32,
    /// Maximum number of pages.
    pub page_count_max: Option<u32>,
}

/// Size of a WebAssembly page in bytes.
pub const PAGE_SIZE: usize = 65536;

/// Largest number of pages a 32-bit memory can have.
pub const MAX_PAGES: u32 = 65536;

impl MemoryType {
    /// Create a new memory type.
    pub fn new(page_count_initial: u32, page_count_max: Option<u32>) -> Self {
        Self { page_count_initial, page_count_max }
    }

    /// The maximum number of pages, falling back to the architectural limit.
    pub fn page_count_max(&self) -> u32 {
        self.page_count_max.unwrap_or(MAX_PAGES)
    }

    /// Initial size in bytes.
    pub fn initial_size(&self) -> usize {
        self.page_count_initial as usize * PAGE_SIZE
    }
}

/// The kind of an external value.
///
/// See <https://webassembly.github.io/spec/core/syntax/types.html#external-types>
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum ExternalKind {
    /// A function.
    Func,
    /// A table.
    Table,
    /// A memory.
    Memory,
    /// A global.
    Global,
}

/// A module import.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Import {
    /// Module name.
    pub module: Box<str>,
    /// Field name.
    pub name: Box<str>,
    /// What is being imported.
    pub kind: ImportKind,
}

/// The description of an import.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum ImportKind {
    /// A function of the given type.
    Function(TypeIdx),
    /// A table.
    Table(TableType),
    /// A memory.
    Memory(MemoryType),
    /// A global.
    Global(GlobalType),
}

impl ImportKind {
    /// The kind of external value this import expects.
    pub fn external_kind(&self) -> ExternalKind {
        match self {
            Self::Function(_) => ExternalKind::Func,
            Self::Table(_) => ExternalKind::Table,
            Self::Memory(_) => ExternalKind::Memory,
            Self::Global(_) => ExternalKind::Global,
        }
    }
}

/// A module export.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Export {
    /// The name of the export.
    pub name: Box<str>,
    /// The kind of the export.
    pub kind: ExternalKind,
    /// The index of the exported item in its index space.
    pub index: u32,
}

/// An element segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Element {
    /// Segment mode.
    pub kind: ElementKind,
    /// Reference type of the items.
    pub ty: ValType,
    /// One constant expression per item.
    pub items: Box<[ConstExpr]>,
}

/// How an element segment is used.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementKind {
    /// Available to `table.init` at runtime.
    Passive,
    /// Only forward-declares function references.
    Declared,
    /// Copied into `table` at `offset` during instantiation.
    Active {
        /// Target table.
        table: TableIdx,
        /// Offset expression (must evaluate to an `i32`).
        offset: ConstExpr,
    },
}

/// A data segment.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Data {
    /// Segment mode.
    pub kind: DataKind,
    /// Segment contents.
    pub data: Box<[u8]>,
}

/// How a data segment is used.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum DataKind {
    /// Available to `memory.init` at runtime.
    Passive,
    /// Copied into `mem` at `offset` during instantiation.
    Active {
        /// Target memory.
        mem: MemIdx,
        /// Offset expression (must evaluate to an `i32`).
        offset: ConstExpr,
    },
}

/// Proposals a module may use on top of the MVP instruction set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct Features {
    /// `i32.extend8_s` and friends.
    pub sign_extension: bool,
    /// `i32.trunc_sat_f32_s` and friends.
    pub saturating_float_to_int: bool,
    /// `memory.copy`, `memory.fill`, `memory.init`, `data.drop`, `table.copy`, `table.init`, `elem.drop`.
    pub bulk_memory: bool,
    /// Reference types and the table instructions that use them.
    pub reference_types: bool,
    /// Blocks with parameters or several results.
    pub multi_value: bool,
}

impl Features {
    /// Only the WebAssembly 1.0 instruction set.
    pub const fn mvp() -> Self {
        Self {
            sign_extension: false,
            saturating_float_to_int: false,
            bulk_memory: false,
            reference_types: false,
            multi_value: false,
        }
    }

    /// Everything this runtime supports.
    pub const fn all() -> Self {
        Self {
            sign_extension: true,
            saturating_float_to_int: true,
            bulk_memory: true,
            reference_types: true,
            multi_value: true,
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::all()
    }
}
