use regwasm_types::{BinaryOp, DataIdx, ElemIdx, GlobalIdx, LoadOp, StoreOp, TableIdx, UnaryOp};

use crate::interpreter::UntypedValue;
use crate::{FuncTypeId, Function, Handle, HostFunctionInstance};

/// A frame-relative register index.
pub(crate) type Reg = u32;

/// Branch target that leaves the function: the moved values become the results.
pub(crate) const RETURN_TARGET: u32 = u32::MAX;

/// A block move performed when a branch is taken: `count` registers starting at `from` are
/// copied to `to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct Move {
    pub(crate) from: Reg,
    pub(crate) to: Reg,
    pub(crate) count: u32,
}

impl Move {
    pub(crate) const NONE: Self = Self { from: 0, to: 0, count: 0 };

    #[inline(always)]
    pub(crate) fn is_noop(&self) -> bool {
        self.count == 0 || self.from == self.to
    }
}

/// One entry of a `br_table` side table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BrTarget {
    pub(crate) target: u32,
    pub(crate) moves: Move,
}

/// A lowered instruction.
///
/// Operands are registers relative to the frame base; branch targets are absolute op indices.
/// Ops marked "in place" read their last operand from a register and write the result back
/// into it. Ops taking a `base` read consecutive operands starting at `base`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[rustfmt::skip]
pub(crate) enum Op {
    // > Control
    Unreachable,
    Br { target: u32, moves: Move },
    BrIf { cond: Reg, target: u32, moves: Move },
    BrIfNot { cond: Reg, target: u32 },
    /// `len` entries of the side table starting at `start`; the last one is the default.
    BrTable { index: Reg, start: u32, len: u32 },
    /// Entry `callee` of [`CompiledCode::callees`](super::CompiledCode::callees).
    CallWasm { callee: u32, base: Reg },
    CallHost { func: Handle<HostFunctionInstance>, base: Reg },
    CallIndirect { ty: FuncTypeId, table: TableIdx, index: Reg, base: Reg },

    // > Parametric and variable
    Copy { src: Reg, dst: Reg },
    Const { dst: Reg, value: UntypedValue },
    /// `dst = if cond == 0 { other } else { dst }`
    Select { dst: Reg, other: Reg, cond: Reg },
    GlobalGet { global: GlobalIdx, dst: Reg },
    GlobalSet { global: GlobalIdx, src: Reg },

    // > Memory (memory 0)
    Load { op: LoadOp, addr: Reg, offset: u32 }, // in place
    Store { op: StoreOp, addr: Reg, value: Reg, offset: u32 },
    MemorySize { dst: Reg },
    MemoryGrow { delta: Reg }, // in place
    MemoryCopy { base: Reg }, // dst, src, len
    MemoryFill { base: Reg }, // dst, value, len
    MemoryInit { data: DataIdx, base: Reg }, // dst, src, len
    DataDrop(DataIdx),

    // > Tables and references
    TableGet { table: TableIdx, index: Reg }, // in place
    TableSet { table: TableIdx, index: Reg, value: Reg },
    TableSize { table: TableIdx, dst: Reg },
    TableGrow { table: TableIdx, base: Reg }, // init, delta -> result at base
    TableFill { table: TableIdx, base: Reg }, // dst, value, len
    TableCopy { dst: TableIdx, src: TableIdx, base: Reg }, // dst, src, len
    TableInit { elem: ElemIdx, table: TableIdx, base: Reg }, // dst, src, len
    ElemDrop(ElemIdx),
    RefIsNull { reg: Reg }, // in place
    RefFunc { func: Function, dst: Reg },

    // > Numeric
    Unary { op: UnaryOp, reg: Reg }, // in place
    Binary { op: BinaryOp, lhs: Reg, rhs: Reg }, // result in lhs
}

impl Op {
    /// Point a branch at `target`. Does nothing for ops that do not branch.
    pub(crate) fn set_target(&mut self, pc: u32) {
        match self {
            Self::Br { target, .. } | Self::BrIf { target, .. } | Self::BrIfNot { target, .. } => *target = pc,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_target() {
        let mut op = Op::BrIf { cond: 3, target: 0, moves: Move::NONE };
        op.set_target(12);
        assert_eq!(op, Op::BrIf { cond: 3, target: 12, moves: Move::NONE });

        let mut op = Op::Copy { src: 1, dst: 2 };
        op.set_target(12);
        assert_eq!(op, Op::Copy { src: 1, dst: 2 });
    }

    #[test]
    fn test_move_noop() {
        assert!(Move::NONE.is_noop());
        assert!(Move { from: 4, to: 4, count: 2 }.is_noop());
        assert!(!Move { from: 5, to: 4, count: 1 }.is_noop());
    }
}
