use alloc::string::{String, ToString};
use core::fmt::Display;
use regwasm_types::{FuncType, Import};

#[cfg(feature = "archive")]
pub use regwasm_types::archive::ArchiveError;

/// Errors that can occur for regwasm operations
#[derive(Debug)]
pub enum Error {
    /// A WebAssembly trap occurred
    Trap(Trap),

    /// Imports could not be resolved or did not match the module's declarations
    Linker(LinkingError),

    /// Instantiation failed before the instance was returned
    Instantiation(InstantiationError),

    /// A function body could not be lowered into the internal encoding
    Translation(TranslationError),

    /// No export with this name and kind exists
    ExportNotFound(String),

    /// The store is not the one that the module instance was instantiated in
    InvalidStore,

    /// An unknown error occurred
    Other(String),

    #[cfg(feature = "archive")]
    /// An archived module description could not be read
    Archive(ArchiveError),
}

#[derive(Debug)]
/// Errors that can occur when linking a WebAssembly module
pub enum LinkingError {
    /// An unknown import was encountered
    UnknownImport {
        /// The module name
        module: String,
        /// The import name
        name: String,
    },

    /// A mismatched import type was encountered
    IncompatibleImportType {
        /// The module name
        module: String,
        /// The import name
        name: String,
    },

    /// The number of resolved values differs from the number of imports
    ImportCountMismatch {
        /// Number of imports declared by the module
        expected: usize,
        /// Number of values supplied
        actual: usize,
    },
}

impl LinkingError {
    pub(crate) fn incompatible_import_type(import: &Import) -> Self {
        Self::IncompatibleImportType { module: import.module.to_string(), name: import.name.to_string() }
    }

    pub(crate) fn unknown_import(import: &Import) -> Self {
        Self::UnknownImport { module: import.module.to_string(), name: import.name.to_string() }
    }

    /// Get the message of the linking error
    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownImport { .. } => "unknown import",
            Self::IncompatibleImportType { .. } => "incompatible import type",
            Self::ImportCountMismatch { .. } => "import count mismatch",
        }
    }
}

#[derive(Debug)]
/// Errors raised while instantiating a module, before any guest code runs
pub enum InstantiationError {
    /// An active element segment does not fit into its table
    TableOutOfBounds {
        /// The element segment index
        segment: usize,
    },

    /// An active data segment does not fit into its memory
    MemoryOutOfBounds {
        /// The data segment index
        segment: usize,
    },

    /// A constant expression is not one of the supported forms
    InvalidConstExpr(String),

    /// Two exports share a name
    DuplicateExport(String),

    /// A table or memory could not be allocated within the configured limits
    ResourceLimitExceeded,
}

impl InstantiationError {
    /// Get the message of the instantiation error
    pub fn message(&self) -> &'static str {
        match self {
            Self::TableOutOfBounds { .. } => "out of bounds table access",
            Self::MemoryOutOfBounds { .. } => "out of bounds memory access",
            Self::InvalidConstExpr(_) => "invalid constant expression",
            Self::DuplicateExport(_) => "duplicate export name",
            Self::ResourceLimitExceeded => "resource limit exceeded",
        }
    }
}

#[derive(Debug)]
/// Errors raised while lowering a function body
pub enum TranslationError {
    /// The body uses an instruction from a proposal the module does not enable
    DisabledFeature(&'static str),

    /// The body is structurally invalid (unbalanced blocks, bad indices, ...)
    InvalidBody(String),
}

#[derive(Debug)]
/// A WebAssembly trap
///
/// See <https://webassembly.github.io/spec/core/intro/overview.html#trap>
pub enum Trap {
    /// An unreachable instruction was executed
    Unreachable,

    /// An out-of-bounds memory access occurred
    MemoryOutOfBounds {
        /// The offset of the access
        offset: usize,
        /// The size of the access
        len: usize,
        /// The maximum size of the memory
        max: usize,
    },

    /// An out-of-bounds table access occurred
    TableOutOfBounds {
        /// The offset of the access
        offset: usize,
        /// The size of the access
        len: usize,
        /// The maximum size of the table
        max: usize,
    },

    /// A division by zero occurred
    DivisionByZero,

    /// Invalid Integer Conversion
    InvalidConversionToInt,

    /// Integer Overflow
    IntegerOverflow,

    /// The register file or the frame stack is full
    CallStackExhausted,

    /// `call_indirect` used an index outside of the table
    UndefinedElement {
        /// The element index
        index: usize,
    },

    /// `call_indirect` hit a null entry
    UninitializedElement {
        /// The element index
        index: usize,
    },

    /// Indirect call type mismatch
    IndirectCallTypeMismatch {
        /// The expected type
        expected: FuncType,
        /// The actual type
        actual: FuncType,
    },

    /// Arguments passed to a function do not match its parameters
    ParameterTypesMismatch,

    /// A host function returned values that do not match its results
    ResultTypesMismatch,

    /// The guest asked the host to exit the process
    Exit(i32),

    /// A host function failed
    Host(String),
}

impl Trap {
    /// Get the message of the trap
    pub fn message(&self) -> &'static str {
        match self {
            Self::Unreachable => "unreachable",
            Self::MemoryOutOfBounds { .. } => "out of bounds memory access",
            Self::TableOutOfBounds { .. } => "out of bounds table access",
            Self::DivisionByZero => "integer divide by zero",
            Self::InvalidConversionToInt => "invalid conversion to integer",
            Self::IntegerOverflow => "integer overflow",
            Self::CallStackExhausted => "call stack exhausted",
            Self::UndefinedElement { .. } => "undefined element",
            Self::UninitializedElement { .. } => "uninitialized element",
            Self::IndirectCallTypeMismatch { .. } => "indirect call type mismatch",
            Self::ParameterTypesMismatch => "parameter types don't match",
            Self::ResultTypesMismatch => "result types don't match",
            Self::Exit(_) => "exit",
            Self::Host(_) => "host function error",
        }
    }
}

impl From<LinkingError> for Error {
    fn from(value: LinkingError) -> Self {
        Self::Linker(value)
    }
}

impl From<Trap> for Error {
    fn from(value: Trap) -> Self {
        Self::Trap(value)
    }
}

impl From<InstantiationError> for Error {
    fn from(value: InstantiationError) -> Self {
        Self::Instantiation(value)
    }
}

impl From<TranslationError> for Error {
    fn from(value: TranslationError) -> Self {
        Self::Translation(value)
    }
}

#[cfg(feature = "archive")]
impl From<ArchiveError> for Error {
    fn from(value: ArchiveError) -> Self {
        Self::Archive(value)
    }
}

impl Error {
    /// The trap that caused this error, if any
    pub fn trap(&self) -> Option<&Trap> {
        match self {
            Self::Trap(trap) => Some(trap),
            _ => None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            #[cfg(feature = "archive")]
            Self::Archive(err) => write!(f, "archive error: {err}"),

            Self::Trap(trap) => write!(f, "trap: {trap}"),
            Self::Linker(err) => write!(f, "linking error: {err}"),
            Self::Instantiation(err) => write!(f, "instantiation error: {err}"),
            Self::Translation(err) => write!(f, "translation error: {err}"),
            Self::ExportNotFound(name) => write!(f, "export not found: {name}"),
            Self::InvalidStore => write!(f, "invalid store"),
            Self::Other(message) => write!(f, "unknown error: {message}"),
        }
    }
}

impl Display for LinkingError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::UnknownImport { module, name } => write!(f, "unknown import: {module}.{name}"),
            Self::IncompatibleImportType { module, name } => {
                write!(f, "incompatible import type: {module}.{name}")
            }
            Self::ImportCountMismatch { expected, actual } => {
                write!(f, "import count mismatch: expected={expected}, actual={actual}")
            }
        }
    }
}

impl Display for InstantiationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::TableOutOfBounds { segment } => write!(f, "out of bounds table access: element segment {segment}"),
            Self::MemoryOutOfBounds { segment } => write!(f, "out of bounds memory access: data segment {segment}"),
            Self::InvalidConstExpr(expr) => write!(f, "invalid constant expression: {expr}"),
            Self::DuplicateExport(name) => write!(f, "duplicate export name: {name}"),
            Self::ResourceLimitExceeded => write!(f, "resource limit exceeded"),
        }
    }
}

impl Display for TranslationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::DisabledFeature(feature) => write!(f, "disabled feature: {feature}"),
            Self::InvalidBody(message) => write!(f, "invalid function body: {message}"),
        }
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MemoryOutOfBounds { offset, len, max } => {
                write!(f, "out of bounds memory access: offset={offset}, len={len}, max={max}")
            }
            Self::TableOutOfBounds { offset, len, max } => {
                write!(f, "out of bounds table access: offset={offset}, len={len}, max={max}")
            }
            Self::UndefinedElement { index } => write!(f, "undefined element: index={index}"),
            Self::UninitializedElement { index } => {
                write!(f, "uninitialized element: index={index}")
            }
            Self::IndirectCallTypeMismatch { expected, actual } => {
                write!(f, "indirect call type mismatch: expected={expected:?}, actual={actual:?}")
            }
            Self::Exit(code) => write!(f, "exit with code {code}"),
            Self::Host(message) => write!(f, "host function error: {message}"),
            trap => write!(f, "{}", trap.message()),
        }
    }
}

impl core::error::Error for Error {}

/// A wrapper around [`core::result::Result`] for regwasm operations
pub type Result<T, E = Error> = core::result::Result<T, E>;
