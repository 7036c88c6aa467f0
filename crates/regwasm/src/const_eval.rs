use alloc::format;
use regwasm_types::{ConstExpr, Instruction};

use crate::{Function, GlobalInstance, Handle, InstantiationError, Result, Store, WasmValue};

/// What a constant expression may refer to.
///
/// `globals` holds the globals visible to the expression: the imported ones and, for global
/// initializers, the ones declared before it.
pub(crate) struct ConstEvalContext<'a> {
    pub(crate) globals: &'a [Handle<GlobalInstance>],
    pub(crate) funcs: &'a [Function],
}

fn invalid(expr: &ConstExpr) -> InstantiationError {
    InstantiationError::InvalidConstExpr(format!("{:?}", expr.0))
}

/// Evaluate a constant expression.
///
/// Supports exactly one `*.const`, `global.get`, `ref.null` or `ref.func` instruction followed
/// by `end`.
pub(crate) fn eval_const(store: &Store, ctx: &ConstEvalContext<'_>, expr: &ConstExpr) -> Result<WasmValue> {
    let [instr, Instruction::End] = &*expr.0 else {
        return Err(invalid(expr).into());
    };

    let value = match instr {
        Instruction::I32Const(v) => WasmValue::I32(*v),
        Instruction::I64Const(v) => WasmValue::I64(*v),
        Instruction::F32Const(v) => WasmValue::F32(*v),
        Instruction::F64Const(v) => WasmValue::F64(*v),
        Instruction::RefNull(ty) if ty.is_ref() => WasmValue::RefNull(*ty),
        Instruction::RefFunc(idx) => WasmValue::RefFunc(*ctx.funcs.get(*idx as usize).ok_or_else(|| invalid(expr))?),
        Instruction::GlobalGet(idx) => {
            let global = ctx.globals.get(*idx as usize).ok_or_else(|| invalid(expr))?;
            store.global(*global)?.get()
        }
        _ => return Err(invalid(expr).into()),
    };

    Ok(value)
}

/// Evaluate a segment offset, which must be an `i32`.
pub(crate) fn eval_offset(store: &Store, ctx: &ConstEvalContext<'_>, expr: &ConstExpr) -> Result<u32> {
    match eval_const(store, ctx, expr)? {
        WasmValue::I32(offset) => Ok(offset as u32),
        _ => Err(invalid(expr).into()),
    }
}
