#[cfg(not(feature = "std"))]
#[allow(unused_imports)]
use super::no_std_floats::NoStdFloatExt;

use alloc::{format, rc::Rc, vec::Vec};
use core::ops::ControlFlow;
use regwasm_types::{BinaryOp, DataIdx, ElemIdx, GlobalIdx, LoadOp, StoreOp, TableIdx, UnaryOp};

use super::num_helpers::*;
use super::stack::{CallFrame, Stack};
use super::values::{InternalValue, UntypedValue};
use super::check_results;
use crate::store::{DataInstance, ElementInstance, MemLoadable, MemStorable};
use crate::translator::{BrTarget, CompiledCode, Move, Op, RETURN_TARGET, Reg};
use crate::{
    Caller, Error, FuncTypeId, Function, GlobalInstance, Handle, HostFunctionInstance, MemoryInstance, ModuleInstance,
    Result, Store, TableInstance, Trap, WasmFunctionInstance, WasmValue, cold, log, unlikely,
};

pub(super) struct Executor<'store, 'stack> {
    cf: CallFrame,
    store: &'store mut Store,
    stack: &'stack mut Stack,

    // state of the instance owning `cf`
    memory: Option<Handle<MemoryInstance>>,
    globals: Rc<[Handle<GlobalInstance>]>,
}

impl<'store, 'stack> Executor<'store, 'stack> {
    pub(super) fn new(store: &'store mut Store, stack: &'stack mut Stack, cf: CallFrame) -> Self {
        let instance = &store.data.instances[cf.instance];
        let (memory, globals) = (instance.memories.first().copied(), instance.globals.clone());
        Self { cf, store, stack, memory, globals }
    }

    #[inline]
    pub(super) fn run_to_completion(&mut self) -> Result<()> {
        loop {
            match self.exec_next() {
                Ok(ControlFlow::Continue(())) => continue,
                Ok(ControlFlow::Break(())) => return Ok(()),
                Err(err) => {
                    cold();
                    self.log_trap(&err);
                    return Err(err);
                }
            }
        }
    }

    #[inline(always)]
    fn exec_next(&mut self) -> Result<ControlFlow<()>> {
        match self.cf.code.ops[self.cf.pc] {
            Op::Unreachable => return Err(exec_unreachable()),
            Op::Br { target, moves } => return self.exec_br(target, moves),
            Op::BrIf { cond, target, moves } => {
                if self.reg::<i32>(cond) != 0 {
                    return self.exec_br(target, moves);
                }
            }
            Op::BrIfNot { cond, target } => {
                if self.reg::<i32>(cond) == 0 {
                    self.cf.pc = target as usize;
                    return Ok(ControlFlow::Continue(()));
                }
            }
            Op::BrTable { index, start, len } => return self.exec_br_table(index, start, len),
            Op::CallWasm { callee, base } => return self.exec_call(callee, base),
            Op::CallHost { func, base } => self.exec_call_host(func, base)?,
            Op::CallIndirect { ty, table, index, base } => return self.exec_call_indirect(ty, table, index, base),

            Op::Copy { src, dst } => self.set_slot(dst, self.slot(src)),
            Op::Const { dst, value } => self.set_slot(dst, value),
            Op::Select { dst, other, cond } => {
                if self.reg::<i32>(cond) == 0 {
                    self.set_slot(dst, self.slot(other));
                }
            }
            Op::GlobalGet { global, dst } => {
                let global = self.global_handle(global)?;
                self.set_slot(dst, self.store.data.globals[global].value);
            }
            Op::GlobalSet { global, src } => {
                let global = self.global_handle(global)?;
                self.store.data.globals[global].value = self.slot(src);
            }

            Op::Load { op, addr, offset } => self.exec_load(op, addr, offset)?,
            Op::Store { op, addr, value, offset } => self.exec_store(op, addr, value, offset)?,
            Op::MemorySize { dst } => {
                let pages = self.memory()?.page_count() as i32;
                self.set_reg(dst, pages);
            }
            Op::MemoryGrow { delta } => self.exec_memory_grow(delta)?,
            Op::MemoryCopy { base } => self.exec_memory_copy(base)?,
            Op::MemoryFill { base } => self.exec_memory_fill(base)?,
            Op::MemoryInit { data, base } => self.exec_memory_init(data, base)?,
            Op::DataDrop(data) => {
                let data = self.data_handle(data)?;
                self.store.data.datas[data].drop();
            }

            Op::TableGet { table, index } => {
                let value = self.table(table)?.get_raw(self.reg::<u32>(index))?;
                self.set_slot(index, value);
            }
            Op::TableSet { table, index, value } => {
                let (index, value) = (self.reg::<u32>(index), self.slot(value));
                self.table_mut(table)?.set_raw(index, value)?;
            }
            Op::TableSize { table, dst } => {
                let size = self.table(table)?.size() as i32;
                self.set_reg(dst, size);
            }
            Op::TableGrow { table, base } => self.exec_table_grow(table, base)?,
            Op::TableFill { table, base } => {
                let (dst, value, len) = (self.reg::<u32>(base), self.slot(base + 1), self.reg::<u32>(base + 2));
                self.table_mut(table)?.fill(dst as usize, len as usize, value)?;
            }
            Op::TableCopy { dst, src, base } => self.exec_table_copy(dst, src, base)?,
            Op::TableInit { elem, table, base } => self.exec_table_init(elem, table, base)?,
            Op::ElemDrop(elem) => {
                let elem = self.elem_handle(elem)?;
                self.store.data.elements[elem].drop();
            }
            Op::RefIsNull { reg } => {
                let is_null = self.slot(reg).is_null() as i32;
                self.set_reg(reg, is_null);
            }
            Op::RefFunc { func, dst } => self.set_slot(dst, UntypedValue::func_ref(Some(func))),

            Op::Unary { op, reg } => self.exec_unary(op, reg)?,
            Op::Binary { op, lhs, rhs } => self.exec_binary(op, lhs, rhs)?,
        };

        self.cf.pc += 1;
        Ok(ControlFlow::Continue(()))
    }

    // > Registers

    #[inline(always)]
    fn slot(&self, reg: Reg) -> UntypedValue {
        self.stack.regs[self.cf.base + reg as usize]
    }

    #[inline(always)]
    fn set_slot(&mut self, reg: Reg, value: UntypedValue) {
        self.stack.regs[self.cf.base + reg as usize] = value;
    }

    #[inline(always)]
    fn reg<T: InternalValue>(&self, reg: Reg) -> T {
        T::from_slot(self.slot(reg))
    }

    #[inline(always)]
    fn set_reg<T: InternalValue>(&mut self, reg: Reg, value: T) {
        self.set_slot(reg, value.into_slot());
    }

    #[inline(always)]
    fn unop<T: InternalValue, R: InternalValue>(&mut self, reg: Reg, f: impl FnOnce(T) -> R) {
        let value = f(self.reg(reg));
        self.set_reg(reg, value);
    }

    #[inline(always)]
    fn try_unop<T: InternalValue, R: InternalValue>(
        &mut self,
        reg: Reg,
        f: impl FnOnce(T) -> Result<R, Trap>,
    ) -> Result<(), Trap> {
        let value = f(self.reg(reg))?;
        self.set_reg(reg, value);
        Ok(())
    }

    #[inline(always)]
    fn binop<T: InternalValue, R: InternalValue>(&mut self, lhs: Reg, rhs: Reg, f: impl FnOnce(T, T) -> R) {
        let value = f(self.reg(lhs), self.reg(rhs));
        self.set_reg(lhs, value);
    }

    #[inline(always)]
    fn try_binop<T: InternalValue, R: InternalValue>(
        &mut self,
        lhs: Reg,
        rhs: Reg,
        f: impl FnOnce(T, T) -> Result<R, Trap>,
    ) -> Result<(), Trap> {
        let value = f(self.reg(lhs), self.reg(rhs))?;
        self.set_reg(lhs, value);
        Ok(())
    }

    // > Control

    #[inline(always)]
    fn apply_move(&mut self, moves: Move) {
        if !moves.is_noop() {
            let from = self.cf.base + moves.from as usize;
            let to = self.cf.base + moves.to as usize;
            self.stack.regs.copy_within(from..from + moves.count as usize, to);
        }
    }

    #[inline(always)]
    fn exec_br(&mut self, target: u32, moves: Move) -> Result<ControlFlow<()>> {
        if target == RETURN_TARGET {
            return self.exec_return(moves);
        }

        self.apply_move(moves);
        self.cf.pc = target as usize;
        Ok(ControlFlow::Continue(()))
    }

    fn exec_br_table(&mut self, index: Reg, start: u32, len: u32) -> Result<ControlFlow<()>> {
        let entry = (self.reg::<u32>(index) as usize).min((len as usize).saturating_sub(1));
        let Some(BrTarget { target, moves }) = self.cf.code.br_tables.get(start as usize + entry).copied() else {
            cold();
            return Err(Error::Other(format!("br_table entry {} out of range", start as usize + entry)));
        };

        self.exec_br(target, moves)
    }

    fn exec_return(&mut self, moves: Move) -> Result<ControlFlow<()>> {
        self.apply_move(moves);
        self.store.exit_function(Function::Wasm(self.cf.func));

        let Some(caller) = self.stack.call_stack.pop() else {
            return Ok(ControlFlow::Break(()));
        };

        let switched = caller.instance != self.cf.instance;
        self.cf = caller;
        if switched {
            self.refresh_instance();
        }
        Ok(ControlFlow::Continue(()))
    }

    fn refresh_instance(&mut self) {
        let instance = &self.store.data.instances[self.cf.instance];
        self.memory = instance.memories.first().copied();
        self.globals = instance.globals.clone();
    }

    /// A direct call through the callee table, which caches the callee's code after the first call.
    fn exec_call(&mut self, callee: u32, base: Reg) -> Result<ControlFlow<()>> {
        let callee = &self.cf.code.callees[callee as usize];
        let func = callee.func;
        let code = match callee.resolved() {
            Some(code) => code,
            None => {
                let code = self.store.compiled_code(func)?;
                let _ = callee.code.set(Rc::downgrade(&code));
                code
            }
        };

        self.enter_wasm(func, code, base)
    }

    fn exec_call_wasm(&mut self, func: Handle<WasmFunctionInstance>, base: Reg) -> Result<ControlFlow<()>> {
        let code = self.store.compiled_code(func)?;
        self.enter_wasm(func, code, base)
    }

    fn enter_wasm(
        &mut self,
        func: Handle<WasmFunctionInstance>,
        code: Rc<CompiledCode>,
        base: Reg,
    ) -> Result<ControlFlow<()>> {
        let instance = self.store.data.wasm_funcs[func].owner;
        let base = self.cf.base + base as usize;
        self.stack.enter_frame(base, &code)?;

        self.cf.pc += 1;
        let caller = core::mem::replace(&mut self.cf, CallFrame::new(code, func, instance, base));
        let switched = caller.instance != instance;
        self.stack.call_stack.push(caller)?;

        if switched {
            self.refresh_instance();
        }
        self.store.enter_function(Function::Wasm(func));
        Ok(ControlFlow::Continue(()))
    }

    fn exec_call_host(&mut self, func: Handle<HostFunctionInstance>, base: Reg) -> Result<()> {
        let host = &self.store.data.host_funcs[func];
        let (callback, ty) = (host.func.clone(), self.store.resolve_type(host.ty)?.clone());
        let base = self.cf.base + base as usize;

        let args: Vec<WasmValue> =
            ty.params.iter().enumerate().map(|(i, ty)| self.stack.regs[base + i].attach_type(*ty)).collect();

        let instance = ModuleInstance { addr: self.cf.instance, store_id: self.store.id() };
        self.store.enter_function(Function::Host(func));
        let results = callback.call(Caller { store: &mut *self.store, instance: Some(instance) }, &args)?;
        check_results(&ty.results, &results)?;
        self.store.exit_function(Function::Host(func));

        for (slot, value) in self.stack.regs[base..].iter_mut().zip(results) {
            *slot = value.into();
        }
        Ok(())
    }

    fn exec_call_indirect(&mut self, ty: FuncTypeId, table: TableIdx, index: Reg, base: Reg) -> Result<ControlFlow<()>> {
        let index = self.reg::<u32>(index);
        let table = self.table(table)?;
        if unlikely(!table.is_func_table()) {
            return Err(Error::Other("call_indirect on a table that does not hold functions".into()));
        }

        let func = table
            .elements
            .get(index as usize)
            .ok_or(Trap::UndefinedElement { index: index as usize })?
            .as_func_ref()
            .ok_or(Trap::UninitializedElement { index: index as usize })?;

        let actual = self.store.func_type_id(func)?;
        if unlikely(actual != ty) {
            return Err(Trap::IndirectCallTypeMismatch {
                expected: self.store.resolve_type(ty)?.clone(),
                actual: self.store.resolve_type(actual)?.clone(),
            }
            .into());
        }

        match func {
            Function::Wasm(func) => self.exec_call_wasm(func, base),
            Function::Host(func) => {
                self.exec_call_host(func, base)?;
                self.cf.pc += 1;
                Ok(ControlFlow::Continue(()))
            }
        }
    }

    // > Instance lookups

    fn global_handle(&self, global: GlobalIdx) -> Result<Handle<GlobalInstance>> {
        self.globals.get(global as usize).copied().ok_or_else(|| missing("global", global))
    }

    fn table_handle(&self, table: TableIdx) -> Result<Handle<TableInstance>> {
        let instance = &self.store.data.instances[self.cf.instance];
        instance.tables.get(table as usize).copied().ok_or_else(|| missing("table", table))
    }

    fn elem_handle(&self, elem: ElemIdx) -> Result<Handle<ElementInstance>> {
        let instance = &self.store.data.instances[self.cf.instance];
        instance.elements.get(elem as usize).copied().ok_or_else(|| missing("element segment", elem))
    }

    fn data_handle(&self, data: DataIdx) -> Result<Handle<DataInstance>> {
        let instance = &self.store.data.instances[self.cf.instance];
        instance.datas.get(data as usize).copied().ok_or_else(|| missing("data segment", data))
    }

    fn table(&self, table: TableIdx) -> Result<&TableInstance> {
        Ok(&self.store.data.tables[self.table_handle(table)?])
    }

    fn table_mut(&mut self, table: TableIdx) -> Result<&mut TableInstance> {
        let table = self.table_handle(table)?;
        Ok(&mut self.store.data.tables[table])
    }

    fn memory(&self) -> Result<&MemoryInstance> {
        let memory = self.memory.ok_or_else(|| missing("memory", 0))?;
        Ok(&self.store.data.memories[memory])
    }

    fn memory_mut(&mut self) -> Result<&mut MemoryInstance> {
        let memory = self.memory.ok_or_else(|| missing("memory", 0))?;
        Ok(&mut self.store.data.memories[memory])
    }

    // > Memory

    #[inline(always)]
    fn mem_load<const SIZE: usize, T: MemLoadable<SIZE>, R: InternalValue>(
        &mut self,
        addr: Reg,
        offset: u32,
        conv: impl FnOnce(T) -> R,
    ) -> Result<()> {
        let memory = self.memory()?;
        let ea = effective_address(memory, self.reg::<u32>(addr), offset, SIZE)?;
        let value = memory.load_as::<SIZE, T>(ea)?;
        self.set_reg(addr, conv(value));
        Ok(())
    }

    #[inline(always)]
    fn mem_store<const SIZE: usize, T: MemStorable<SIZE>>(&mut self, addr: Reg, offset: u32, value: T) -> Result<()> {
        let addr = self.reg::<u32>(addr);
        let memory = self.memory_mut()?;
        let ea = effective_address(memory, addr, offset, SIZE)?;
        memory.store_as::<SIZE, T>(ea, value)?;
        Ok(())
    }

    fn exec_load(&mut self, op: LoadOp, addr: Reg, offset: u32) -> Result<()> {
        use LoadOp::*;
        match op {
            I32Load => self.mem_load::<4, i32, _>(addr, offset, |v| v),
            I64Load => self.mem_load::<8, i64, _>(addr, offset, |v| v),
            F32Load => self.mem_load::<4, f32, _>(addr, offset, |v| v),
            F64Load => self.mem_load::<8, f64, _>(addr, offset, |v| v),
            I32Load8S => self.mem_load::<1, i8, _>(addr, offset, |v| v as i32),
            I32Load8U => self.mem_load::<1, u8, _>(addr, offset, |v| v as i32),
            I32Load16S => self.mem_load::<2, i16, _>(addr, offset, |v| v as i32),
            I32Load16U => self.mem_load::<2, u16, _>(addr, offset, |v| v as i32),
            I64Load8S => self.mem_load::<1, i8, _>(addr, offset, |v| v as i64),
            I64Load8U => self.mem_load::<1, u8, _>(addr, offset, |v| v as i64),
            I64Load16S => self.mem_load::<2, i16, _>(addr, offset, |v| v as i64),
            I64Load16U => self.mem_load::<2, u16, _>(addr, offset, |v| v as i64),
            I64Load32S => self.mem_load::<4, i32, _>(addr, offset, |v| v as i64),
            I64Load32U => self.mem_load::<4, u32, _>(addr, offset, |v| v as i64),
        }
    }

    fn exec_store(&mut self, op: StoreOp, addr: Reg, value: Reg, offset: u32) -> Result<()> {
        use StoreOp::*;
        match op {
            I32Store => self.mem_store::<4, i32>(addr, offset, self.reg::<i32>(value)),
            I64Store => self.mem_store::<8, i64>(addr, offset, self.reg::<i64>(value)),
            F32Store => self.mem_store::<4, f32>(addr, offset, self.reg::<f32>(value)),
            F64Store => self.mem_store::<8, f64>(addr, offset, self.reg::<f64>(value)),
            I32Store8 => self.mem_store::<1, i8>(addr, offset, self.reg::<i32>(value) as i8),
            I32Store16 => self.mem_store::<2, i16>(addr, offset, self.reg::<i32>(value) as i16),
            I64Store8 => self.mem_store::<1, i8>(addr, offset, self.reg::<i64>(value) as i8),
            I64Store16 => self.mem_store::<2, i16>(addr, offset, self.reg::<i64>(value) as i16),
            I64Store32 => self.mem_store::<4, i32>(addr, offset, self.reg::<i64>(value) as i32),
        }
    }

    fn exec_memory_grow(&mut self, delta: Reg) -> Result<()> {
        let pages = self.reg::<u32>(delta);
        let memory = self.memory.ok_or_else(|| missing("memory", 0))?;
        let limiter = self.store.limiter.as_deref();

        let result = match self.store.data.memories[memory].grow(pages, limiter) {
            Some(previous) => previous as i32,
            None => -1,
        };

        log::trace!("memory.grow by {pages} pages: {result}");
        self.set_reg(delta, result);
        Ok(())
    }

    fn exec_memory_copy(&mut self, base: Reg) -> Result<()> {
        let (dst, src, len) = (self.reg::<u32>(base), self.reg::<u32>(base + 1), self.reg::<u32>(base + 2));
        self.memory_mut()?.copy_within(dst as usize, src as usize, len as usize)?;
        Ok(())
    }

    fn exec_memory_fill(&mut self, base: Reg) -> Result<()> {
        let (dst, value, len) = (self.reg::<u32>(base), self.reg::<i32>(base + 1), self.reg::<u32>(base + 2));
        self.memory_mut()?.fill(dst as usize, len as usize, value as u8)?;
        Ok(())
    }

    fn exec_memory_init(&mut self, data: DataIdx, base: Reg) -> Result<()> {
        let (dst, src, len) =
            (self.reg::<u32>(base) as usize, self.reg::<u32>(base + 1) as usize, self.reg::<u32>(base + 2) as usize);
        let data = self.data_handle(data)?;
        let memory = self.memory.ok_or_else(|| missing("memory", 0))?;

        let bytes = self.store.data.datas[data].bytes();
        let Some(bytes) = src.checked_add(len).and_then(|end| bytes.get(src..end)) else {
            cold();
            return Err(Trap::MemoryOutOfBounds { offset: src, len, max: bytes.len() }.into());
        };

        self.store.data.memories[memory].store(dst, bytes)
    }

    // > Tables

    fn exec_table_grow(&mut self, table: TableIdx, base: Reg) -> Result<()> {
        let (init, delta) = (self.slot(base), self.reg::<u32>(base + 1));
        let table = self.table_handle(table)?;
        let (limit, limiter) = (self.store.config.table_limit(), self.store.limiter.as_deref());

        let result = match self.store.data.tables[table].grow(delta, init, limit, limiter) {
            Some(previous) => previous as i32,
            None => -1,
        };

        log::trace!("table.grow by {delta} elements: {result}");
        self.set_reg(base, result);
        Ok(())
    }

    fn exec_table_copy(&mut self, dst: TableIdx, src: TableIdx, base: Reg) -> Result<()> {
        let (dst_index, src_index, len) =
            (self.reg::<u32>(base) as usize, self.reg::<u32>(base + 1) as usize, self.reg::<u32>(base + 2) as usize);
        let (dst, src) = (self.table_handle(dst)?, self.table_handle(src)?);

        if dst == src {
            self.store.data.tables[dst].copy_within(dst_index, src_index, len)?;
            return Ok(());
        }

        let items = self.store.data.tables[src].load(src_index, len)?.to_vec();
        self.store.data.tables[dst].copy_from_slice(dst_index, &items)?;
        Ok(())
    }

    fn exec_table_init(&mut self, elem: ElemIdx, table: TableIdx, base: Reg) -> Result<()> {
        let (dst, src, len) =
            (self.reg::<u32>(base) as usize, self.reg::<u32>(base + 1) as usize, self.reg::<u32>(base + 2) as usize);
        let (elem, table) = (self.elem_handle(elem)?, self.table_handle(table)?);

        let items = self.store.data.elements[elem].items();
        let Some(items) = src.checked_add(len).and_then(|end| items.get(src..end)) else {
            cold();
            return Err(Trap::TableOutOfBounds { offset: src, len, max: items.len() }.into());
        };

        self.store.data.tables[table].copy_from_slice(dst, items)?;
        Ok(())
    }

    // > Numeric

    fn exec_unary(&mut self, op: UnaryOp, reg: Reg) -> Result<(), Trap> {
        use UnaryOp::*;
        match op {
            I32Eqz => self.unop::<i32, _>(reg, |v| (v == 0) as i32),
            I64Eqz => self.unop::<i64, _>(reg, |v| (v == 0) as i32),
            I32Clz => self.unop::<i32, _>(reg, |v| v.leading_zeros() as i32),
            I32Ctz => self.unop::<i32, _>(reg, |v| v.trailing_zeros() as i32),
            I32Popcnt => self.unop::<i32, _>(reg, |v| v.count_ones() as i32),
            I64Clz => self.unop::<i64, _>(reg, |v| v.leading_zeros() as i64),
            I64Ctz => self.unop::<i64, _>(reg, |v| v.trailing_zeros() as i64),
            I64Popcnt => self.unop::<i64, _>(reg, |v| v.count_ones() as i64),

            F32Abs => self.unop::<f32, _>(reg, |v| v.abs()),
            F32Neg => self.unop::<f32, _>(reg, |v| -v),
            F32Ceil => self.unop::<f32, _>(reg, |v| v.ceil()),
            F32Floor => self.unop::<f32, _>(reg, |v| v.floor()),
            F32Trunc => self.unop::<f32, _>(reg, |v| v.trunc()),
            F32Nearest => self.unop::<f32, _>(reg, |v| v.wasm_nearest()),
            F32Sqrt => self.unop::<f32, _>(reg, |v| v.sqrt()),
            F64Abs => self.unop::<f64, _>(reg, |v| v.abs()),
            F64Neg => self.unop::<f64, _>(reg, |v| -v),
            F64Ceil => self.unop::<f64, _>(reg, |v| v.ceil()),
            F64Floor => self.unop::<f64, _>(reg, |v| v.floor()),
            F64Trunc => self.unop::<f64, _>(reg, |v| v.trunc()),
            F64Nearest => self.unop::<f64, _>(reg, |v| v.wasm_nearest()),
            F64Sqrt => self.unop::<f64, _>(reg, |v| v.sqrt()),

            I32WrapI64 => self.unop::<i64, _>(reg, |v| v as i32),
            I32TruncF32S => self.try_unop::<f32, i32>(reg, |v| checked_conv_float!(f32, i32, v))?,
            I32TruncF32U => self.try_unop::<f32, i32>(reg, |v| checked_conv_float!(f32, u32, i32, v))?,
            I32TruncF64S => self.try_unop::<f64, i32>(reg, |v| checked_conv_float!(f64, i32, v))?,
            I32TruncF64U => self.try_unop::<f64, i32>(reg, |v| checked_conv_float!(f64, u32, i32, v))?,
            I64ExtendI32S => self.unop::<i32, _>(reg, |v| v as i64),
            I64ExtendI32U => self.unop::<u32, _>(reg, |v| v as i64),
            I64TruncF32S => self.try_unop::<f32, i64>(reg, |v| checked_conv_float!(f32, i64, v))?,
            I64TruncF32U => self.try_unop::<f32, i64>(reg, |v| checked_conv_float!(f32, u64, i64, v))?,
            I64TruncF64S => self.try_unop::<f64, i64>(reg, |v| checked_conv_float!(f64, i64, v))?,
            I64TruncF64U => self.try_unop::<f64, i64>(reg, |v| checked_conv_float!(f64, u64, i64, v))?,
            F32ConvertI32S => self.unop::<i32, _>(reg, |v| v as f32),
            F32ConvertI32U => self.unop::<u32, _>(reg, |v| v as f32),
            F32ConvertI64S => self.unop::<i64, _>(reg, |v| v as f32),
            F32ConvertI64U => self.unop::<u64, _>(reg, |v| v as f32),
            F32DemoteF64 => self.unop::<f64, _>(reg, |v| v as f32),
            F64ConvertI32S => self.unop::<i32, _>(reg, |v| v as f64),
            F64ConvertI32U => self.unop::<u32, _>(reg, |v| v as f64),
            F64ConvertI64S => self.unop::<i64, _>(reg, |v| v as f64),
            F64ConvertI64U => self.unop::<u64, _>(reg, |v| v as f64),
            F64PromoteF32 => self.unop::<f32, _>(reg, |v| v as f64),

            // slots are untyped, the bits stay where they are
            I32ReinterpretF32 | I64ReinterpretF64 | F32ReinterpretI32 | F64ReinterpretI64 => {}

            I32Extend8S => self.unop::<i32, _>(reg, |v| (v as i8) as i32),
            I32Extend16S => self.unop::<i32, _>(reg, |v| (v as i16) as i32),
            I64Extend8S => self.unop::<i64, _>(reg, |v| (v as i8) as i64),
            I64Extend16S => self.unop::<i64, _>(reg, |v| (v as i16) as i64),
            I64Extend32S => self.unop::<i64, _>(reg, |v| (v as i32) as i64),

            // `as` saturates and maps NaN to zero
            I32TruncSatF32S => self.unop::<f32, _>(reg, |v| v as i32),
            I32TruncSatF32U => self.unop::<f32, _>(reg, |v| v as u32),
            I32TruncSatF64S => self.unop::<f64, _>(reg, |v| v as i32),
            I32TruncSatF64U => self.unop::<f64, _>(reg, |v| v as u32),
            I64TruncSatF32S => self.unop::<f32, _>(reg, |v| v as i64),
            I64TruncSatF32U => self.unop::<f32, _>(reg, |v| v as u64),
            I64TruncSatF64S => self.unop::<f64, _>(reg, |v| v as i64),
            I64TruncSatF64U => self.unop::<f64, _>(reg, |v| v as u64),
        }
        Ok(())
    }

    fn exec_binary(&mut self, op: BinaryOp, lhs: Reg, rhs: Reg) -> Result<(), Trap> {
        use BinaryOp::*;
        match op {
            I32Eq => self.binop::<i32, _>(lhs, rhs, |a, b| (a == b) as i32),
            I32Ne => self.binop::<i32, _>(lhs, rhs, |a, b| (a != b) as i32),
            I32LtS => self.binop::<i32, _>(lhs, rhs, |a, b| (a < b) as i32),
            I32LtU => self.binop::<u32, _>(lhs, rhs, |a, b| (a < b) as i32),
            I32GtS => self.binop::<i32, _>(lhs, rhs, |a, b| (a > b) as i32),
            I32GtU => self.binop::<u32, _>(lhs, rhs, |a, b| (a > b) as i32),
            I32LeS => self.binop::<i32, _>(lhs, rhs, |a, b| (a <= b) as i32),
            I32LeU => self.binop::<u32, _>(lhs, rhs, |a, b| (a <= b) as i32),
            I32GeS => self.binop::<i32, _>(lhs, rhs, |a, b| (a >= b) as i32),
            I32GeU => self.binop::<u32, _>(lhs, rhs, |a, b| (a >= b) as i32),
            I64Eq => self.binop::<i64, _>(lhs, rhs, |a, b| (a == b) as i32),
            I64Ne => self.binop::<i64, _>(lhs, rhs, |a, b| (a != b) as i32),
            I64LtS => self.binop::<i64, _>(lhs, rhs, |a, b| (a < b) as i32),
            I64LtU => self.binop::<u64, _>(lhs, rhs, |a, b| (a < b) as i32),
            I64GtS => self.binop::<i64, _>(lhs, rhs, |a, b| (a > b) as i32),
            I64GtU => self.binop::<u64, _>(lhs, rhs, |a, b| (a > b) as i32),
            I64LeS => self.binop::<i64, _>(lhs, rhs, |a, b| (a <= b) as i32),
            I64LeU => self.binop::<u64, _>(lhs, rhs, |a, b| (a <= b) as i32),
            I64GeS => self.binop::<i64, _>(lhs, rhs, |a, b| (a >= b) as i32),
            I64GeU => self.binop::<u64, _>(lhs, rhs, |a, b| (a >= b) as i32),
            F32Eq => self.binop::<f32, _>(lhs, rhs, |a, b| (a == b) as i32),
            F32Ne => self.binop::<f32, _>(lhs, rhs, |a, b| (a != b) as i32),
            F32Lt => self.binop::<f32, _>(lhs, rhs, |a, b| (a < b) as i32),
            F32Gt => self.binop::<f32, _>(lhs, rhs, |a, b| (a > b) as i32),
            F32Le => self.binop::<f32, _>(lhs, rhs, |a, b| (a <= b) as i32),
            F32Ge => self.binop::<f32, _>(lhs, rhs, |a, b| (a >= b) as i32),
            F64Eq => self.binop::<f64, _>(lhs, rhs, |a, b| (a == b) as i32),
            F64Ne => self.binop::<f64, _>(lhs, rhs, |a, b| (a != b) as i32),
            F64Lt => self.binop::<f64, _>(lhs, rhs, |a, b| (a < b) as i32),
            F64Gt => self.binop::<f64, _>(lhs, rhs, |a, b| (a > b) as i32),
            F64Le => self.binop::<f64, _>(lhs, rhs, |a, b| (a <= b) as i32),
            F64Ge => self.binop::<f64, _>(lhs, rhs, |a, b| (a >= b) as i32),

            I32Add => self.binop::<i32, _>(lhs, rhs, |a, b| a.wrapping_add(b)),
            I32Sub => self.binop::<i32, _>(lhs, rhs, |a, b| a.wrapping_sub(b)),
            I32Mul => self.binop::<i32, _>(lhs, rhs, |a, b| a.wrapping_mul(b)),
            // these can trap
            I32DivS => self.try_binop::<i32, _>(lhs, rhs, |a, b| a.wasm_checked_div(b))?,
            I32DivU => self.try_binop::<u32, _>(lhs, rhs, |a, b| a.wasm_checked_div(b))?,
            I32RemS => self.try_binop::<i32, _>(lhs, rhs, |a, b| a.checked_wrapping_rem(b))?,
            I32RemU => self.try_binop::<u32, _>(lhs, rhs, |a, b| a.checked_wrapping_rem(b))?,
            I32And => self.binop::<i32, _>(lhs, rhs, |a, b| a & b),
            I32Or => self.binop::<i32, _>(lhs, rhs, |a, b| a | b),
            I32Xor => self.binop::<i32, _>(lhs, rhs, |a, b| a ^ b),
            I32Shl => self.binop::<i32, _>(lhs, rhs, |a, b| a.wasm_shl(b)),
            I32ShrS => self.binop::<i32, _>(lhs, rhs, |a, b| a.wasm_shr(b)),
            I32ShrU => self.binop::<u32, _>(lhs, rhs, |a, b| a.wasm_shr(b)),
            I32Rotl => self.binop::<i32, _>(lhs, rhs, |a, b| a.wasm_rotl(b)),
            I32Rotr => self.binop::<i32, _>(lhs, rhs, |a, b| a.wasm_rotr(b)),

            I64Add => self.binop::<i64, _>(lhs, rhs, |a, b| a.wrapping_add(b)),
            I64Sub => self.binop::<i64, _>(lhs, rhs, |a, b| a.wrapping_sub(b)),
            I64Mul => self.binop::<i64, _>(lhs, rhs, |a, b| a.wrapping_mul(b)),
            I64DivS => self.try_binop::<i64, _>(lhs, rhs, |a, b| a.wasm_checked_div(b))?,
            I64DivU => self.try_binop::<u64, _>(lhs, rhs, |a, b| a.wasm_checked_div(b))?,
            I64RemS => self.try_binop::<i64, _>(lhs, rhs, |a, b| a.checked_wrapping_rem(b))?,
            I64RemU => self.try_binop::<u64, _>(lhs, rhs, |a, b| a.checked_wrapping_rem(b))?,
            I64And => self.binop::<i64, _>(lhs, rhs, |a, b| a & b),
            I64Or => self.binop::<i64, _>(lhs, rhs, |a, b| a | b),
            I64Xor => self.binop::<i64, _>(lhs, rhs, |a, b| a ^ b),
            I64Shl => self.binop::<i64, _>(lhs, rhs, |a, b| a.wasm_shl(b)),
            I64ShrS => self.binop::<i64, _>(lhs, rhs, |a, b| a.wasm_shr(b)),
            I64ShrU => self.binop::<u64, _>(lhs, rhs, |a, b| a.wasm_shr(b)),
            I64Rotl => self.binop::<i64, _>(lhs, rhs, |a, b| a.wasm_rotl(b)),
            I64Rotr => self.binop::<i64, _>(lhs, rhs, |a, b| a.wasm_rotr(b)),

            F32Add => self.binop::<f32, _>(lhs, rhs, |a, b| a + b),
            F32Sub => self.binop::<f32, _>(lhs, rhs, |a, b| a - b),
            F32Mul => self.binop::<f32, _>(lhs, rhs, |a, b| a * b),
            F32Div => self.binop::<f32, _>(lhs, rhs, |a, b| a / b),
            F32Min => self.binop::<f32, _>(lhs, rhs, |a, b| a.wasm_minimum(b)),
            F32Max => self.binop::<f32, _>(lhs, rhs, |a, b| a.wasm_maximum(b)),
            F32Copysign => self.binop::<f32, _>(lhs, rhs, |a, b| a.copysign(b)),
            F64Add => self.binop::<f64, _>(lhs, rhs, |a, b| a + b),
            F64Sub => self.binop::<f64, _>(lhs, rhs, |a, b| a - b),
            F64Mul => self.binop::<f64, _>(lhs, rhs, |a, b| a * b),
            F64Div => self.binop::<f64, _>(lhs, rhs, |a, b| a / b),
            F64Min => self.binop::<f64, _>(lhs, rhs, |a, b| a.wasm_minimum(b)),
            F64Max => self.binop::<f64, _>(lhs, rhs, |a, b| a.wasm_maximum(b)),
            F64Copysign => self.binop::<f64, _>(lhs, rhs, |a, b| a.copysign(b)),
        }
        Ok(())
    }

    // > Diagnostics

    #[cfg(feature = "log")]
    fn log_trap(&self, err: &Error) {
        let frames = core::iter::once(&self.cf).chain(self.stack.call_stack.iter());
        let backtrace: Vec<_> = frames.map(|frame| self.store.symbolicate(Function::Wasm(frame.func))).collect();
        log::warn!("{err}");
        log::debug!("backtrace:\n  at {}", backtrace.join("\n  at "));
    }

    #[cfg(not(feature = "log"))]
    fn log_trap(&self, _err: &Error) {}
}

#[cold]
fn exec_unreachable() -> Error {
    Error::Trap(Trap::Unreachable)
}

#[cold]
fn missing(kind: &str, index: u32) -> Error {
    Error::Other(format!("instance has no {kind} {index}"))
}

/// `addr + offset` as a byte index; the sum of two `u32`s cannot wrap in 64 bits.
#[inline(always)]
fn effective_address(memory: &MemoryInstance, addr: u32, offset: u32, len: usize) -> Result<usize, Trap> {
    usize::try_from(addr as u64 + offset as u64)
        .map_err(|_| Trap::MemoryOutOfBounds { offset: usize::MAX, len, max: memory.len() })
}
