use alloc::{boxed::Box, rc::Rc, sync::Arc};
use regwasm_types::{FuncIdx, Instruction, ValType};

use crate::translator::CompiledCode;
use crate::{FuncTypeId, Handle, HostFunction};

use crate::instance::ModuleInstanceInner;

/// A function owned by a [`Store`](crate::Store)
///
/// Two values are equal exactly when they refer to the same function instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Function {
    /// A function defined by a WebAssembly module
    Wasm(Handle<WasmFunctionInstance>),
    /// A function defined by the host
    Host(Handle<HostFunctionInstance>),
}

/// A WebAssembly Function Instance defined by a module
///
/// See <https://webassembly.github.io/spec/core/exec/runtime.html#function-instances>
#[derive(Debug)]
pub struct WasmFunctionInstance {
    pub(crate) ty: FuncTypeId,
    pub(crate) owner: Handle<ModuleInstanceInner>,
    pub(crate) index: FuncIdx,
    pub(crate) code: Handle<CodeBody>,
}

/// A function provided by the host
#[derive(Debug)]
pub struct HostFunctionInstance {
    pub(crate) ty: FuncTypeId,
    pub(crate) func: HostFunction,
}

/// The body of a wasm function.
///
/// Starts out as the validated instruction list and is replaced by its lowered form the first
/// time the function is called. The transition happens at most once.
#[derive(Debug)]
pub(crate) enum CodeBody {
    Uncompiled { locals: Box<[ValType]>, body: Arc<[Instruction]> },
    Compiled(Rc<CompiledCode>),
}
