use alloc::{boxed::Box, rc::Rc, vec, vec::Vec};

use super::values::UntypedValue;
use crate::instance::ModuleInstanceInner;
use crate::translator::CompiledCode;
use crate::{Config, Handle, Trap, WasmFunctionInstance, unlikely};

/// The register file and frame stack of one top-level invocation.
///
/// Both have a fixed capacity taken from the store's [`Config`]. Frames overlap: a callee's
/// registers start at the caller's first argument register.
#[derive(Debug)]
pub(crate) struct Stack {
    pub(crate) regs: Box<[UntypedValue]>,
    pub(crate) call_stack: CallStack,
}

impl Stack {
    pub(crate) fn new(config: &Config) -> Self {
        Self {
            regs: vec![UntypedValue::default(); config.stack_size()].into_boxed_slice(),
            call_stack: CallStack::new(config.call_frames()),
        }
    }

    /// Check that a frame of `code` fits at `base` and initialize its declared locals.
    ///
    /// Parameters are expected to already sit at `base`.
    #[inline]
    pub(crate) fn enter_frame(&mut self, base: usize, code: &CompiledCode) -> Result<(), Trap> {
        let end = base.checked_add(code.frame_size as usize);
        if unlikely(end.is_none_or(|end| end > self.regs.len())) {
            return Err(Trap::CallStackExhausted);
        }

        let locals = base + code.params as usize;
        self.regs[locals..locals + code.local_init.len()].copy_from_slice(&code.local_init);
        Ok(())
    }
}

/// Suspended frames; the running frame is owned by the executor.
#[derive(Debug)]
pub(crate) struct CallStack {
    stack: Vec<CallFrame>,
    limit: usize,
}

impl CallStack {
    pub(crate) fn new(limit: usize) -> Self {
        Self { stack: Vec::with_capacity(limit.min(256)), limit }
    }

    #[inline(always)]
    pub(crate) fn pop(&mut self) -> Option<CallFrame> {
        self.stack.pop()
    }

    #[inline(always)]
    pub(crate) fn push(&mut self, call_frame: CallFrame) -> Result<(), Trap> {
        if unlikely((self.stack.len() + 1) >= self.limit) {
            return Err(Trap::CallStackExhausted);
        }
        self.stack.push(call_frame);
        Ok(())
    }

    /// Suspended frames, innermost first
    pub(crate) fn iter(&self) -> impl Iterator<Item = &CallFrame> {
        self.stack.iter().rev()
    }
}

#[derive(Debug)]
pub(crate) struct CallFrame {
    /// Index of the next op to execute. Suspended frames point past their call.
    pub(crate) pc: usize,
    /// Absolute index of the frame's register 0.
    pub(crate) base: usize,
    pub(crate) func: Handle<WasmFunctionInstance>,
    pub(crate) instance: Handle<ModuleInstanceInner>,
    pub(crate) code: Rc<CompiledCode>,
}

impl CallFrame {
    pub(crate) fn new(
        code: Rc<CompiledCode>,
        func: Handle<WasmFunctionInstance>,
        instance: Handle<ModuleInstanceInner>,
        base: usize,
    ) -> Self {
        Self { pc: 0, base, func, instance, code }
    }
}
