use crate::{DataIdx, ElemIdx, FuncIdx, GlobalIdx, LabelIdx, LocalIdx, TableIdx, TypeIdx, ValType};
use alloc::boxed::Box;

/// The signature of a structured control instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum BlockType {
    /// `[] -> []`
    Empty,
    /// `[] -> [t]`
    Value(ValType),
    /// Parameters and results of a function type.
    Func(TypeIdx),
}

/// Memory immediate of a load or store. Always refers to memory 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct MemArg {
    /// Static offset added to the dynamic address.
    pub offset: u32,
    /// Alignment hint (log2), ignored by the interpreter.
    pub align: u8,
}

impl MemArg {
    /// A memory immediate with the given offset.
    pub fn offset(offset: u32) -> Self {
        Self { offset, align: 0 }
    }
}

/// A validated WebAssembly instruction.
///
/// This is the structured form handed to the runtime; blocks are still nested and branch
/// targets are relative label depths. The runtime lowers it into its own register-based
/// encoding before executing it.
///
/// See <https://webassembly.github.io/spec/core/syntax/instructions.html>
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub enum Instruction {
    // > Control Instructions
    // See <https://webassembly.github.io/spec/core/syntax/instructions.html#control-instructions>
    Unreachable,
    Nop,
    Block(BlockType),
    Loop(BlockType),
    If(BlockType),
    Else,
    End,
    Br(LabelIdx),
    BrIf(LabelIdx),
    BrTable(Box<[LabelIdx]>, LabelIdx),
    Return,
    Call(FuncIdx),
    CallIndirect(TypeIdx, TableIdx),

    // > Parametric Instructions
    Drop,
    Select(Option<ValType>),

    // > Variable Instructions
    LocalGet(LocalIdx),
    LocalSet(LocalIdx),
    LocalTee(LocalIdx),
    GlobalGet(GlobalIdx),
    GlobalSet(GlobalIdx),

    // > Table Instructions
    TableGet(TableIdx),
    TableSet(TableIdx),
    TableSize(TableIdx),
    TableGrow(TableIdx),
    TableFill(TableIdx),
    TableCopy { dst: TableIdx, src: TableIdx },
    TableInit(ElemIdx, TableIdx),
    ElemDrop(ElemIdx),

    // > Memory Instructions
    Load(LoadOp, MemArg),
    Store(StoreOp, MemArg),
    MemorySize,
    MemoryGrow,
    MemoryCopy,
    MemoryFill,
    MemoryInit(DataIdx),
    DataDrop(DataIdx),

    // > Constants and References
    I32Const(i32),
    I64Const(i64),
    F32Const(f32),
    F64Const(f64),
    RefNull(ValType),
    RefIsNull,
    RefFunc(FuncIdx),

    // > Numeric Instructions
    Unary(UnaryOp),
    Binary(BinaryOp),
}

/// Loads from linear memory. The suffix names the memory width and extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum LoadOp {
    I32Load, I64Load, F32Load, F64Load,
    I32Load8S, I32Load8U, I32Load16S, I32Load16U,
    I64Load8S, I64Load8U, I64Load16S, I64Load16U, I64Load32S, I64Load32U,
}

/// Stores to linear memory. The suffix names the stored width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum StoreOp {
    I32Store, I64Store, F32Store, F64Store,
    I32Store8, I32Store16,
    I64Store8, I64Store16, I64Store32,
}

/// Numeric instructions taking one operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum UnaryOp {
    I32Eqz, I64Eqz,
    I32Clz, I32Ctz, I32Popcnt,
    I64Clz, I64Ctz, I64Popcnt,

    F32Abs, F32Neg, F32Ceil, F32Floor, F32Trunc, F32Nearest, F32Sqrt,
    F64Abs, F64Neg, F64Ceil, F64Floor, F64Trunc, F64Nearest, F64Sqrt,

    I32WrapI64,
    I32TruncF32S, I32TruncF32U, I32TruncF64S, I32TruncF64U,
    I64ExtendI32S, I64ExtendI32U,
    I64TruncF32S, I64TruncF32U, I64TruncF64S, I64TruncF64U,
    F32ConvertI32S, F32ConvertI32U, F32ConvertI64S, F32ConvertI64U, F32DemoteF64,
    F64ConvertI32S, F64ConvertI32U, F64ConvertI64S, F64ConvertI64U, F64PromoteF32,
    I32ReinterpretF32, I64ReinterpretF64, F32ReinterpretI32, F64ReinterpretI64,

    // sign-extension
    I32Extend8S, I32Extend16S, I64Extend8S, I64Extend16S, I64Extend32S,

    // non-trapping float-to-int conversions
    I32TruncSatF32S, I32TruncSatF32U, I32TruncSatF64S, I32TruncSatF64U,
    I64TruncSatF32S, I64TruncSatF32U, I64TruncSatF64S, I64TruncSatF64U,
}

impl UnaryOp {
    /// Part of the sign-extension proposal.
    pub fn is_sign_extension(&self) -> bool {
        matches!(self, Self::I32Extend8S | Self::I32Extend16S | Self::I64Extend8S | Self::I64Extend16S | Self::I64Extend32S)
    }

    /// Part of the non-trapping float-to-int proposal.
    pub fn is_saturating(&self) -> bool {
        matches!(
            self,
            Self::I32TruncSatF32S
                | Self::I32TruncSatF32U
                | Self::I32TruncSatF64S
                | Self::I32TruncSatF64U
                | Self::I64TruncSatF32S
                | Self::I64TruncSatF32U
                | Self::I64TruncSatF64S
                | Self::I64TruncSatF64U
        )
    }
}

/// Numeric instructions taking two operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
#[rustfmt::skip]
pub enum BinaryOp {
    I32Eq, I32Ne, I32LtS, I32LtU, I32GtS, I32GtU, I32LeS, I32LeU, I32GeS, I32GeU,
    I64Eq, I64Ne, I64LtS, I64LtU, I64GtS, I64GtU, I64LeS, I64LeU, I64GeS, I64GeU,
    F32Eq, F32Ne, F32Lt, F32Gt, F32Le, F32Ge,
    F64Eq, F64Ne, F64Lt, F64Gt, F64Le, F64Ge,

    I32Add, I32Sub, I32Mul, I32DivS, I32DivU, I32RemS, I32RemU,
    I32And, I32Or, I32Xor, I32Shl, I32ShrS, I32ShrU, I32Rotl, I32Rotr,
    I64Add, I64Sub, I64Mul, I64DivS, I64DivU, I64RemS, I64RemU,
    I64And, I64Or, I64Xor, I64Shl, I64ShrS, I64ShrU, I64Rotl, I64Rotr,

    F32Add, F32Sub, F32Mul, F32Div, F32Min, F32Max, F32Copysign,
    F64Add, F64Sub, F64Mul, F64Div, F64Min, F64Max, F64Copysign,
}

/// A constant expression, as used by global initializers and segment offsets.
///
/// Valid expressions are a single constant-producing instruction followed by
/// [`Instruction::End`]. Anything else is rejected when the expression is evaluated.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "archive", derive(serde::Serialize, serde::Deserialize))]
pub struct ConstExpr(pub Box<[Instruction]>);

impl ConstExpr {
    fn single(instr: Instruction) -> Self {
        Self(Box::new([instr, Instruction::End]))
    }

    /// `i32.const value`
    pub fn i32(value: i32) -> Self {
        Self::single(Instruction::I32Const(value))
    }

    /// `i64.const value`
    pub fn i64(value: i64) -> Self {
        Self::single(Instruction::I64Const(value))
    }

    /// `f32.const value`
    pub fn f32(value: f32) -> Self {
        Self::single(Instruction::F32Const(value))
    }

    /// `f64.const value`
    pub fn f64(value: f64) -> Self {
        Self::single(Instruction::F64Const(value))
    }

    /// `global.get idx`
    pub fn global_get(idx: GlobalIdx) -> Self {
        Self::single(Instruction::GlobalGet(idx))
    }

    /// `ref.null ty`
    pub fn ref_null(ty: ValType) -> Self {
        Self::single(Instruction::RefNull(ty))
    }

    /// `ref.func idx`
    pub fn ref_func(idx: FuncIdx) -> Self {
        Self::single(Instruction::RefFunc(idx))
    }
}
