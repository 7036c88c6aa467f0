//! Lowering of validated function bodies into the register-addressed encoding.
//!
//! The translator makes one linear pass over the structured instructions. It tracks the
//! operand stack height to turn every operand into a frame-relative register, and a label
//! stack to turn nested blocks into absolute jumps.

use alloc::collections::BTreeMap;
use alloc::rc::{Rc, Weak};
use alloc::{boxed::Box, format, vec::Vec};
use core::cell::OnceCell;
use regwasm_types::{
    BlockType, FuncIdx, FuncType, Features, Instruction, LabelIdx, LocalIdx, TypeIdx, ValType,
};

use crate::interpreter::UntypedValue;
use crate::{FuncTypeId, Function, Handle, TranslationError, WasmFunctionInstance, log};

mod ops;
pub(crate) use ops::*;

/// The lowered form of one function body.
#[derive(Debug)]
pub(crate) struct CompiledCode {
    pub(crate) ops: Box<[Op]>,
    pub(crate) br_tables: Box<[BrTarget]>,
    /// The wasm functions called directly, one entry per distinct callee.
    pub(crate) callees: Box<[Callee]>,
    /// Registers needed by one activation: parameters, locals and the maximum operand height,
    /// at least the number of results.
    pub(crate) frame_size: u32,
    pub(crate) params: u32,
    /// Initial values of the declared locals (null for references, zero otherwise).
    pub(crate) local_init: Box<[UntypedValue]>,
}

/// The target of a direct call to a wasm function.
///
/// The code is filled in during translation if the callee was already translated, otherwise by
/// the first call. It is held weakly: the store owns all translated code, and a recursive
/// function would otherwise keep itself alive.
#[derive(Debug)]
pub(crate) struct Callee {
    pub(crate) func: Handle<WasmFunctionInstance>,
    pub(crate) code: OnceCell<Weak<CompiledCode>>,
}

impl Callee {
    /// The callee's code if it has been resolved.
    #[inline]
    pub(crate) fn resolved(&self) -> Option<Rc<CompiledCode>> {
        self.code.get()?.upgrade()
    }
}

/// Resolves the module-level indices a function body refers to.
pub(crate) trait ModuleEnv {
    fn func_type(&self, ty: TypeIdx) -> Option<(FuncTypeId, &FuncType)>;
    fn callee(&self, func: FuncIdx) -> Option<(Function, &FuncType)>;
    /// The code of a wasm function, if it is already translated.
    fn compiled(&self, func: Handle<WasmFunctionInstance>) -> Option<Rc<CompiledCode>>;
    fn features(&self) -> Features;
}

/// Translate one function body. `body` must end with the function's final `end`.
pub(crate) fn translate(
    env: &impl ModuleEnv,
    ty: &FuncType,
    locals: &[ValType],
    body: &[Instruction],
) -> Result<CompiledCode, TranslationError> {
    let features = env.features();
    if ty.results.len() > 1 && !features.multi_value {
        return Err(TranslationError::DisabledFeature("multi-value"));
    }

    let mut builder = FunctionBuilder::new(env, ty, locals.len() as u32, body.len());
    let mut instrs = body.iter();
    for instr in instrs.by_ref() {
        builder.visit(instr)?;
        if builder.frames.is_empty() {
            break;
        }
    }

    if !builder.frames.is_empty() || instrs.next().is_some() {
        return Err(invalid("function body is not terminated by its final end"));
    }

    builder.finish(locals)
}

#[cold]
fn invalid(message: &str) -> TranslationError {
    TranslationError::InvalidBody(message.into())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Function,
    Block,
    Loop,
    If,
    Else,
}

type LabelId = usize;

#[derive(Debug, Clone, Copy)]
enum LabelUser {
    Op(usize),
    Table(usize),
}

#[derive(Debug)]
enum Label {
    Pinned(u32),
    Unpinned(Vec<LabelUser>),
}

#[derive(Debug)]
struct ControlFrame {
    kind: FrameKind,
    /// Branch target: the start of a loop, the end of anything else.
    label: LabelId,
    /// Start of the else branch of an `if`.
    else_label: Option<LabelId>,
    /// Operand height below the block's parameters.
    height: u32,
    params: u32,
    results: u32,
}

impl ControlFrame {
    fn branch_arity(&self) -> u32 {
        match self.kind {
            FrameKind::Loop => self.params,
            _ => self.results,
        }
    }
}

struct FunctionBuilder<'a, E: ModuleEnv> {
    env: &'a E,
    features: Features,
    ops: Vec<Op>,
    br_tables: Vec<BrTarget>,
    callees: Vec<Callee>,
    callee_slots: BTreeMap<Handle<WasmFunctionInstance>, u32>,
    labels: Vec<Label>,
    frames: Vec<ControlFrame>,

    params: u32,
    locals_end: u32,
    height: u32,
    max_height: u32,
    results: u32,

    /// Whether the current instruction can be reached. Blocks opened while unreachable are
    /// only counted in `dead_depth`.
    reachable: bool,
    dead_depth: u32,
}

macro_rules! require_feature {
    ($self:ident, $feature:ident, $name:literal) => {
        if !$self.features.$feature {
            return Err(TranslationError::DisabledFeature($name));
        }
    };
}

impl<'a, E: ModuleEnv> FunctionBuilder<'a, E> {
    fn new(env: &'a E, ty: &FuncType, locals: u32, capacity: usize) -> Self {
        let params = ty.params.len() as u32;
        let results = ty.results.len() as u32;

        let mut builder = Self {
            env,
            features: env.features(),
            ops: Vec::with_capacity(capacity),
            br_tables: Vec::new(),
            callees: Vec::new(),
            callee_slots: BTreeMap::new(),
            labels: Vec::new(),
            frames: Vec::with_capacity(16),
            params,
            locals_end: params + locals,
            height: 0,
            max_height: 0,
            results,
            reachable: true,
            dead_depth: 0,
        };

        let label = builder.new_label();
        builder.frames.push(ControlFrame {
            kind: FrameKind::Function,
            label,
            else_label: None,
            height: 0,
            params: 0,
            results,
        });
        builder
    }

    fn finish(self, locals: &[ValType]) -> Result<CompiledCode, TranslationError> {
        if self.labels.iter().any(|label| matches!(label, Label::Unpinned(users) if !users.is_empty())) {
            return Err(invalid("branch to a label that was never placed"));
        }

        let local_init = locals
            .iter()
            .map(|ty| if ty.is_ref() { UntypedValue::NULL } else { UntypedValue::default() })
            .collect();

        Ok(CompiledCode {
            ops: self.ops.into_boxed_slice(),
            br_tables: self.br_tables.into_boxed_slice(),
            callees: self.callees.into_boxed_slice(),
            frame_size: (self.locals_end + self.max_height).max(self.results),
            params: self.params,
            local_init,
        })
    }

    /// The callee table entry of `func`, added on its first call site.
    fn callee_slot(&mut self, func: Handle<WasmFunctionInstance>) -> u32 {
        if let Some(slot) = self.callee_slots.get(&func) {
            return *slot;
        }

        let code = OnceCell::new();
        if let Some(compiled) = self.env.compiled(func) {
            let _ = code.set(Rc::downgrade(&compiled));
        }

        let slot = self.callees.len() as u32;
        self.callees.push(Callee { func, code });
        self.callee_slots.insert(func, slot);
        slot
    }

    #[inline]
    fn reg(&self, height: u32) -> u32 {
        self.locals_end + height
    }

    fn push(&mut self) -> u32 {
        let reg = self.reg(self.height);
        self.height += 1;
        self.max_height = self.max_height.max(self.height);
        reg
    }

    fn pop(&mut self) -> Result<u32, TranslationError> {
        self.height = self.height.checked_sub(1).ok_or_else(|| invalid("operand stack underflow"))?;
        Ok(self.reg(self.height))
    }

    /// Pop `n` operands, returning the register of the first one.
    fn pop_n(&mut self, n: u32) -> Result<u32, TranslationError> {
        self.height = self.height.checked_sub(n).ok_or_else(|| invalid("operand stack underflow"))?;
        Ok(self.reg(self.height))
    }

    fn top(&self) -> Result<u32, TranslationError> {
        match self.height {
            0 => Err(invalid("operand stack underflow")),
            height => Ok(self.reg(height - 1)),
        }
    }

    fn local(&self, idx: LocalIdx) -> Result<u32, TranslationError> {
        if idx >= self.locals_end {
            return Err(invalid("local index out of range"));
        }
        Ok(idx)
    }

    fn emit(&mut self, op: Op) -> usize {
        self.ops.push(op);
        self.ops.len() - 1
    }

    fn pc(&self) -> u32 {
        self.ops.len() as u32
    }

    fn new_label(&mut self) -> LabelId {
        self.labels.push(Label::Unpinned(Vec::new()));
        self.labels.len() - 1
    }

    /// Place `label` at the next op and patch every branch waiting for it.
    fn pin_label(&mut self, label: LabelId) {
        let pc = self.pc();
        if matches!(self.labels[label], Label::Pinned(_)) {
            return;
        }

        let Label::Unpinned(users) = core::mem::replace(&mut self.labels[label], Label::Pinned(pc)) else {
            return;
        };

        for user in users {
            match user {
                LabelUser::Op(idx) => self.ops[idx].set_target(pc),
                LabelUser::Table(idx) => self.br_tables[idx].target = pc,
            }
        }
    }

    /// The target of `label` as seen by `user`; unresolved labels are patched later.
    fn resolve_label(&mut self, label: LabelId, user: LabelUser) -> u32 {
        match &mut self.labels[label] {
            Label::Pinned(pc) => *pc,
            Label::Unpinned(users) => {
                users.push(user);
                0
            }
        }
    }

    fn frame_at(&self, depth: LabelIdx) -> Result<&ControlFrame, TranslationError> {
        let len = self.frames.len();
        (depth as usize).checked_add(1).and_then(|d| len.checked_sub(d)).and_then(|i| self.frames.get(i)).ok_or_else(
            || TranslationError::InvalidBody(format!("branch depth {depth} exceeds {} open blocks", len)),
        )
    }

    /// The target and value move of a branch to `depth`, taken at the current height.
    fn branch(&self, depth: LabelIdx) -> Result<(LabelId, bool, Move), TranslationError> {
        let frame = self.frame_at(depth)?;
        let arity = frame.branch_arity();
        let from = self.reg(self.height.checked_sub(arity).ok_or_else(|| invalid("operand stack underflow"))?);

        if frame.kind == FrameKind::Function {
            return Ok((frame.label, true, Move { from, to: 0, count: arity }));
        }

        let moves = Move { from, to: self.reg(frame.height), count: arity };
        Ok((frame.label, false, if moves.is_noop() { Move::NONE } else { moves }))
    }

    fn emit_return(&mut self) -> Result<(), TranslationError> {
        let from = self.reg(self.height.checked_sub(self.results).ok_or_else(|| invalid("operand stack underflow"))?);
        self.emit(Op::Br { target: RETURN_TARGET, moves: Move { from, to: 0, count: self.results } });
        Ok(())
    }

    fn block_arity(&self, ty: BlockType) -> Result<(u32, u32), TranslationError> {
        match ty {
            BlockType::Empty => Ok((0, 0)),
            BlockType::Value(_) => Ok((0, 1)),
            BlockType::Func(idx) => {
                let (_, ty) = self.env.func_type(idx).ok_or_else(|| invalid("block type index out of range"))?;
                let (params, results) = (ty.params.len() as u32, ty.results.len() as u32);
                if (params > 0 || results > 1) && !self.features.multi_value {
                    return Err(TranslationError::DisabledFeature("multi-value"));
                }
                Ok((params, results))
            }
        }
    }

    fn open_frame(&mut self, kind: FrameKind, ty: BlockType) -> Result<&mut ControlFrame, TranslationError> {
        let (params, results) = self.block_arity(ty)?;
        let height = self.height.checked_sub(params).ok_or_else(|| invalid("operand stack underflow"))?;
        let label = self.new_label();
        self.frames.push(ControlFrame { kind, label, else_label: None, height, params, results });
        self.frames.last_mut().ok_or_else(|| invalid("no open block"))
    }

    fn visit(&mut self, instr: &Instruction) -> Result<(), TranslationError> {
        use Instruction::*;

        if !self.reachable {
            return self.visit_unreachable(instr);
        }

        match instr {
            Unreachable => {
                self.emit(Op::Unreachable);
                self.reachable = false;
            }
            Nop => {}

            Block(ty) => {
                self.open_frame(FrameKind::Block, *ty)?;
            }
            Loop(ty) => {
                let pc = self.pc();
                let label = self.open_frame(FrameKind::Loop, *ty)?.label;
                self.labels[label] = Label::Pinned(pc);
            }
            If(ty) => {
                let cond = self.pop()?;
                let else_label = self.new_label();
                self.open_frame(FrameKind::If, *ty)?.else_label = Some(else_label);
                let idx = self.emit(Op::BrIfNot { cond, target: 0 });
                let target = self.resolve_label(else_label, LabelUser::Op(idx));
                self.ops[idx].set_target(target);
            }
            Else => self.visit_else()?,
            End => self.visit_end()?,

            Br(depth) => {
                let (label, returns, moves) = self.branch(*depth)?;
                if returns {
                    self.emit(Op::Br { target: RETURN_TARGET, moves });
                } else {
                    let idx = self.emit(Op::Br { target: 0, moves });
                    let target = self.resolve_label(label, LabelUser::Op(idx));
                    self.ops[idx].set_target(target);
                }
                self.reachable = false;
            }
            BrIf(depth) => {
                let cond = self.pop()?;
                let (label, returns, moves) = self.branch(*depth)?;
                if returns {
                    self.emit(Op::BrIf { cond, target: RETURN_TARGET, moves });
                } else {
                    let idx = self.emit(Op::BrIf { cond, target: 0, moves });
                    let target = self.resolve_label(label, LabelUser::Op(idx));
                    self.ops[idx].set_target(target);
                }
            }
            BrTable(labels, default) => {
                let index = self.pop()?;
                let start = self.br_tables.len();
                for depth in labels.iter().chain(core::iter::once(default)) {
                    let (label, returns, moves) = self.branch(*depth)?;
                    let entry = self.br_tables.len();
                    self.br_tables.push(BrTarget { target: RETURN_TARGET, moves });
                    if !returns {
                        self.br_tables[entry].target = self.resolve_label(label, LabelUser::Table(entry));
                    }
                }

                let len = (self.br_tables.len() - start) as u32;
                self.emit(Op::BrTable { index, start: start as u32, len });
                self.reachable = false;
            }
            Return => {
                self.emit_return()?;
                self.reachable = false;
            }
            Call(idx) => {
                let (func, ty) = self.env.callee(*idx).ok_or_else(|| invalid("function index out of range"))?;
                let (params, results) = (ty.params.len() as u32, ty.results.len() as u32);
                let base = self.pop_n(params)?;
                let op = match func {
                    Function::Wasm(func) => Op::CallWasm { callee: self.callee_slot(func), base },
                    Function::Host(func) => Op::CallHost { func, base },
                };
                self.emit(op);
                self.push_n(results);
            }
            CallIndirect(ty, table) => {
                let (id, func_ty) = self.env.func_type(*ty).ok_or_else(|| invalid("type index out of range"))?;
                let (params, results) = (func_ty.params.len() as u32, func_ty.results.len() as u32);
                let index = self.pop()?;
                let base = self.pop_n(params)?;
                self.emit(Op::CallIndirect { ty: id, table: *table, index, base });
                self.push_n(results);
            }

            Drop => {
                self.pop()?;
            }
            Select(ty) => {
                if ty.is_some() {
                    require_feature!(self, reference_types, "reference-types");
                }
                let cond = self.pop()?;
                let other = self.pop()?;
                let dst = self.top()?;
                self.emit(Op::Select { dst, other, cond });
            }

            LocalGet(idx) => {
                let src = self.local(*idx)?;
                let dst = self.push();
                self.emit(Op::Copy { src, dst });
            }
            LocalSet(idx) => {
                let dst = self.local(*idx)?;
                let src = self.pop()?;
                self.emit(Op::Copy { src, dst });
            }
            LocalTee(idx) => {
                let dst = self.local(*idx)?;
                let src = self.top()?;
                self.emit(Op::Copy { src, dst });
            }
            GlobalGet(global) => {
                let dst = self.push();
                self.emit(Op::GlobalGet { global: *global, dst });
            }
            GlobalSet(global) => {
                let src = self.pop()?;
                self.emit(Op::GlobalSet { global: *global, src });
            }

            TableGet(table) => {
                require_feature!(self, reference_types, "reference-types");
                let index = self.top()?;
                self.emit(Op::TableGet { table: *table, index });
            }
            TableSet(table) => {
                require_feature!(self, reference_types, "reference-types");
                let value = self.pop()?;
                let index = self.pop()?;
                self.emit(Op::TableSet { table: *table, index, value });
            }
            TableSize(table) => {
                require_feature!(self, reference_types, "reference-types");
                let dst = self.push();
                self.emit(Op::TableSize { table: *table, dst });
            }
            TableGrow(table) => {
                require_feature!(self, reference_types, "reference-types");
                let base = self.pop_n(2)?;
                self.emit(Op::TableGrow { table: *table, base });
                self.push();
            }
            TableFill(table) => {
                require_feature!(self, reference_types, "reference-types");
                let base = self.pop_n(3)?;
                self.emit(Op::TableFill { table: *table, base });
            }
            TableCopy { dst, src } => {
                require_feature!(self, bulk_memory, "bulk-memory");
                let base = self.pop_n(3)?;
                self.emit(Op::TableCopy { dst: *dst, src: *src, base });
            }
            TableInit(elem, table) => {
                require_feature!(self, bulk_memory, "bulk-memory");
                let base = self.pop_n(3)?;
                self.emit(Op::TableInit { elem: *elem, table: *table, base });
            }
            ElemDrop(elem) => {
                require_feature!(self, bulk_memory, "bulk-memory");
                self.emit(Op::ElemDrop(*elem));
            }

            Load(op, memarg) => {
                let addr = self.top()?;
                self.emit(Op::Load { op: *op, addr, offset: memarg.offset });
            }
            Store(op, memarg) => {
                let value = self.pop()?;
                let addr = self.pop()?;
                self.emit(Op::Store { op: *op, addr, value, offset: memarg.offset });
            }
            MemorySize => {
                let dst = self.push();
                self.emit(Op::MemorySize { dst });
            }
            MemoryGrow => {
                let delta = self.top()?;
                self.emit(Op::MemoryGrow { delta });
            }
            MemoryCopy => {
                require_feature!(self, bulk_memory, "bulk-memory");
                let base = self.pop_n(3)?;
                self.emit(Op::MemoryCopy { base });
            }
            MemoryFill => {
                require_feature!(self, bulk_memory, "bulk-memory");
                let base = self.pop_n(3)?;
                self.emit(Op::MemoryFill { base });
            }
            MemoryInit(data) => {
                require_feature!(self, bulk_memory, "bulk-memory");
                let base = self.pop_n(3)?;
                self.emit(Op::MemoryInit { data: *data, base });
            }
            DataDrop(data) => {
                require_feature!(self, bulk_memory, "bulk-memory");
                self.emit(Op::DataDrop(*data));
            }

            I32Const(v) => self.emit_const(UntypedValue::i32(*v)),
            I64Const(v) => self.emit_const(UntypedValue::i64(*v)),
            F32Const(v) => self.emit_const(UntypedValue::f32(*v)),
            F64Const(v) => self.emit_const(UntypedValue::f64(*v)),
            RefNull(_) => {
                require_feature!(self, reference_types, "reference-types");
                self.emit_const(UntypedValue::NULL);
            }
            RefIsNull => {
                require_feature!(self, reference_types, "reference-types");
                let reg = self.top()?;
                self.emit(Op::RefIsNull { reg });
            }
            RefFunc(idx) => {
                require_feature!(self, reference_types, "reference-types");
                let (func, _) = self.env.callee(*idx).ok_or_else(|| invalid("function index out of range"))?;
                let dst = self.push();
                self.emit(Op::RefFunc { func, dst });
            }

            Unary(op) => {
                if op.is_sign_extension() {
                    require_feature!(self, sign_extension, "sign-extension");
                }
                if op.is_saturating() {
                    require_feature!(self, saturating_float_to_int, "saturating-float-to-int");
                }
                let reg = self.top()?;
                self.emit(Op::Unary { op: *op, reg });
            }
            Binary(op) => {
                let rhs = self.pop()?;
                let lhs = self.top()?;
                self.emit(Op::Binary { op: *op, lhs, rhs });
            }
        }

        Ok(())
    }

    /// Skip dead code, keeping track of the blocks opened in it.
    fn visit_unreachable(&mut self, instr: &Instruction) -> Result<(), TranslationError> {
        match instr {
            Instruction::Block(_) | Instruction::Loop(_) | Instruction::If(_) => self.dead_depth += 1,
            Instruction::Else if self.dead_depth == 0 => self.visit_else()?,
            Instruction::End if self.dead_depth == 0 => self.visit_end()?,
            Instruction::End => self.dead_depth -= 1,
            _ => {}
        }
        Ok(())
    }

    fn push_n(&mut self, n: u32) {
        self.height += n;
        self.max_height = self.max_height.max(self.height);
    }

    fn emit_const(&mut self, value: UntypedValue) {
        let dst = self.push();
        self.emit(Op::Const { dst, value });
    }

    fn visit_else(&mut self) -> Result<(), TranslationError> {
        let frame = self.frames.last().ok_or_else(|| invalid("else outside of a block"))?;
        let (FrameKind::If, Some(else_label)) = (frame.kind, frame.else_label) else {
            return Err(invalid("else outside of an if block"));
        };
        let (label, height, params) = (frame.label, frame.height, frame.params);

        if self.reachable {
            let idx = self.emit(Op::Br { target: 0, moves: Move::NONE });
            let target = self.resolve_label(label, LabelUser::Op(idx));
            self.ops[idx].set_target(target);
        }

        self.pin_label(else_label);
        if let Some(frame) = self.frames.last_mut() {
            frame.kind = FrameKind::Else;
        }
        self.height = height + params;
        self.reachable = true;
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), TranslationError> {
        let frame = self.frames.pop().ok_or_else(|| invalid("end outside of a block"))?;

        if frame.kind == FrameKind::Function {
            if self.reachable {
                self.emit_return()?;
            }
            log::trace!("translated body: {} ops, {} br_table entries", self.ops.len(), self.br_tables.len());
            return Ok(());
        }

        if let Some(else_label) = frame.else_label {
            self.pin_label(else_label);
        }
        if frame.kind != FrameKind::Loop {
            self.pin_label(frame.label);
        }

        self.height = frame.height + frame.results;
        self.max_height = self.max_height.max(self.height);
        self.reachable = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Handle, Interner};
    use regwasm_types::{BinaryOp, MemArg, StoreOp};

    struct TestEnv {
        types: Interner<FuncType>,
        type_ids: Vec<FuncTypeId>,
        funcs: Vec<(Function, FuncTypeId)>,
        compiled: Vec<(Handle<WasmFunctionInstance>, Rc<CompiledCode>)>,
        features: Features,
    }

    impl TestEnv {
        fn new(types: &[FuncType]) -> Self {
            let mut interner = Interner::default();
            let type_ids = types.iter().map(|ty| interner.intern(ty)).collect();
            Self { types: interner, type_ids, funcs: Vec::new(), compiled: Vec::new(), features: Features::all() }
        }

        fn with_func(mut self, func: Function, ty: TypeIdx) -> Self {
            let id = self.type_ids[ty as usize];
            self.funcs.push((func, id));
            self
        }
    }

    impl ModuleEnv for TestEnv {
        fn func_type(&self, ty: TypeIdx) -> Option<(FuncTypeId, &FuncType)> {
            let id = *self.type_ids.get(ty as usize)?;
            Some((id, self.types.resolve(id)?))
        }

        fn callee(&self, func: FuncIdx) -> Option<(Function, &FuncType)> {
            let (func, id) = *self.funcs.get(func as usize)?;
            Some((func, self.types.resolve(id)?))
        }

        fn compiled(&self, func: Handle<WasmFunctionInstance>) -> Option<Rc<CompiledCode>> {
            self.compiled.iter().find(|(f, _)| *f == func).map(|(_, code)| code.clone())
        }

        fn features(&self) -> Features {
            self.features
        }
    }

    fn i32_i32() -> FuncType {
        FuncType::new(&[ValType::I32], &[ValType::I32])
    }

    #[test]
    fn test_register_layout() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let ty = FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32]);
        let body = [LocalGet(0), LocalGet(1), Binary(BinaryOp::I32Add), LocalSet(2), LocalGet(2), End];
        let code = translate(&env, &ty, &[ValType::I32], &body).unwrap();

        assert_eq!(code.params, 2);
        assert_eq!(code.frame_size, 5);
        assert_eq!(&*code.local_init, &[UntypedValue::default()]);
        assert_eq!(
            &*code.ops,
            &[
                Op::Copy { src: 0, dst: 3 },
                Op::Copy { src: 1, dst: 4 },
                Op::Binary { op: BinaryOp::I32Add, lhs: 3, rhs: 4 },
                Op::Copy { src: 3, dst: 2 },
                Op::Copy { src: 2, dst: 3 },
                Op::Br { target: RETURN_TARGET, moves: Move { from: 3, to: 0, count: 1 } },
            ]
        );
    }

    #[test]
    fn test_ref_locals_start_null() {
        let env = TestEnv::new(&[]);
        let code = translate(&env, &FuncType::empty(), &[ValType::RefFunc, ValType::F64], &[Instruction::End]).unwrap();
        assert_eq!(&*code.local_init, &[UntypedValue::NULL, UntypedValue::default()]);
    }

    #[test]
    fn test_forward_branch_is_patched() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [
            Block(BlockType::Value(ValType::I32)),
            I32Const(1),
            LocalGet(0),
            BrIf(0),
            Drop,
            I32Const(2),
            End,
            End,
        ];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();

        assert_eq!(code.ops[2], Op::BrIf { cond: 2, target: 4, moves: Move::NONE });
        assert_eq!(code.ops[3], Op::Const { dst: 1, value: UntypedValue::i32(2) });
        assert_eq!(code.ops.len(), 5);
    }

    #[test]
    fn test_loop_branch_goes_backwards() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [Loop(BlockType::Empty), LocalGet(0), BrIf(0), End, I32Const(0), End];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();
        assert_eq!(code.ops[1], Op::BrIf { cond: 1, target: 0, moves: Move::NONE });
    }

    #[test]
    fn test_branch_moves_kept_values() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [Block(BlockType::Value(ValType::I32)), I32Const(1), I32Const(2), Br(0), End, End];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();

        assert_eq!(code.ops[2], Op::Br { target: 3, moves: Move { from: 2, to: 1, count: 1 } });
        assert_eq!(code.frame_size, 3);
    }

    #[test]
    fn test_if_else() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [LocalGet(0), If(BlockType::Value(ValType::I32)), I32Const(1), Else, I32Const(2), End, End];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();

        assert_eq!(
            &code.ops[..5],
            &[
                Op::Copy { src: 0, dst: 1 },
                Op::BrIfNot { cond: 1, target: 4 },
                Op::Const { dst: 1, value: UntypedValue::i32(1) },
                Op::Br { target: 5, moves: Move::NONE },
                Op::Const { dst: 1, value: UntypedValue::i32(2) },
            ]
        );
    }

    #[test]
    fn test_br_table_side_table() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [
            Block(BlockType::Empty),
            Block(BlockType::Empty),
            LocalGet(0),
            BrTable(Box::new([0, 1]), 2),
            End,
            End,
            End,
        ];
        let code = translate(&env, &FuncType::new(&[ValType::I32], &[]), &[], &body).unwrap();

        assert_eq!(code.ops[1], Op::BrTable { index: 1, start: 0, len: 3 });
        assert_eq!(code.br_tables[0].target, 2);
        assert_eq!(code.br_tables[1].target, 2);
        assert_eq!(code.br_tables[2].target, RETURN_TARGET);
    }

    #[test]
    fn test_dead_code_is_skipped() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [
            Block(BlockType::Empty),
            Br(0),
            I32Const(1),
            Block(BlockType::Empty),
            Unreachable,
            End,
            Drop,
            End,
            I32Const(3),
            End,
        ];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();
        assert_eq!(
            &*code.ops,
            &[
                Op::Br { target: 1, moves: Move::NONE },
                Op::Const { dst: 1, value: UntypedValue::i32(3) },
                Op::Br { target: RETURN_TARGET, moves: Move { from: 1, to: 0, count: 1 } },
            ]
        );
    }

    #[test]
    fn test_calls() {
        use Instruction::*;
        let ty = FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32]);
        let env = TestEnv::new(&[ty.clone()])
            .with_func(Function::Wasm(Handle::new(0, 3)), 0)
            .with_func(Function::Host(Handle::new(0, 1)), 0);
        let body = [
            I32Const(1),
            I32Const(2),
            Call(0),
            I32Const(5),
            Call(1),
            I32Const(6),
            LocalGet(0),
            CallIndirect(0, 0),
            End,
        ];
        let code = translate(&env, &ty, &[], &body).unwrap();

        assert_eq!(code.ops[2], Op::CallWasm { callee: 0, base: 2 });
        assert_eq!(code.ops[4], Op::CallHost { func: Handle::new(0, 1), base: 2 });
        assert!(matches!(code.ops[7], Op::CallIndirect { table: 0, index: 4, base: 2, .. }));
        assert_eq!(code.frame_size, 5);

        assert_eq!(code.callees.len(), 1);
        assert_eq!(code.callees[0].func, Handle::new(0, 3));
        assert!(code.callees[0].resolved().is_none());
    }

    #[test]
    fn test_callees_resolved_when_compiled() {
        use Instruction::*;
        let ty = FuncType::new(&[], &[]);
        let (compiled, pending) = (Handle::new(0, 4), Handle::new(0, 5));
        let mut env = TestEnv::new(&[ty.clone()])
            .with_func(Function::Wasm(compiled), 0)
            .with_func(Function::Wasm(pending), 0);
        let leaf = Rc::new(translate(&env, &ty, &[], &[End]).unwrap());
        env.compiled.push((compiled, leaf.clone()));

        let body = [Call(0), Call(1), Call(0), Call(1), End];
        let code = translate(&env, &ty, &[], &body).unwrap();

        // one entry per distinct callee, shared by all call sites
        assert_eq!(code.callees.len(), 2);
        assert_eq!(code.ops[0], Op::CallWasm { callee: 0, base: 0 });
        assert_eq!(code.ops[1], Op::CallWasm { callee: 1, base: 0 });
        assert_eq!(code.ops[2], Op::CallWasm { callee: 0, base: 0 });
        assert_eq!(code.ops[3], Op::CallWasm { callee: 1, base: 0 });

        let resolved = code.callees[0].resolved().expect("translated callee is resolved up front");
        assert!(Rc::ptr_eq(&resolved, &leaf));
        assert!(code.callees[1].resolved().is_none());
    }

    #[test]
    fn test_disabled_features() {
        use Instruction::*;
        let mut env = TestEnv::new(&[FuncType::new(&[ValType::I32], &[ValType::I32, ValType::I32])]);
        env.features = Features::mvp();

        let cases: [&[Instruction]; 5] = [
            &[LocalGet(0), Unary(regwasm_types::UnaryOp::I32Extend8S), Drop, End],
            &[LocalGet(0), Unary(regwasm_types::UnaryOp::I32TruncSatF32S), Drop, End],
            &[LocalGet(0), LocalGet(0), LocalGet(0), MemoryFill, End],
            &[RefNull(ValType::RefFunc), Drop, End],
            &[LocalGet(0), Block(BlockType::Func(0)), Unreachable, End, Drop, Drop, End],
        ];

        for body in cases {
            let ty = FuncType::new(&[ValType::I32], &[]);
            assert!(matches!(translate(&env, &ty, &[], body), Err(TranslationError::DisabledFeature(_))));
        }
    }

    #[test]
    fn test_store_pops_both_operands() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let body = [I32Const(8), LocalGet(0), Store(StoreOp::I32Store, MemArg::offset(4)), LocalGet(0), End];
        let code = translate(&env, &i32_i32(), &[], &body).unwrap();
        assert_eq!(code.ops[2], Op::Store { op: StoreOp::I32Store, addr: 1, value: 2, offset: 4 });
        assert_eq!(code.ops[3], Op::Copy { src: 0, dst: 1 });
    }

    #[test]
    fn test_invalid_bodies() {
        use Instruction::*;
        let env = TestEnv::new(&[]);
        let ty = FuncType::empty();
        assert!(translate(&env, &ty, &[], &[Nop]).is_err());
        assert!(translate(&env, &ty, &[], &[End, Nop]).is_err());
        assert!(translate(&env, &ty, &[], &[Drop, End]).is_err());
        assert!(translate(&env, &ty, &[], &[Br(1), End]).is_err());
        assert!(translate(&env, &ty, &[], &[LocalGet(0), Drop, End]).is_err());
    }
}
