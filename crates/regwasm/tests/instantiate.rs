mod common;

use common::ModuleBuilder;
use eyre::Result;
use regwasm::types::Instruction::*;
use regwasm::types::ValType::{I32, I64};
use regwasm::types::{ConstExpr, ExternalKind, FuncType, Instruction, MemArg, MemoryType, StoreOp, ValType};
use regwasm::{
    Error, Extern, ExternName, ExternVal, InstantiationError, Module, ResourceLimiter, Store, Trap, WasmValue,
};

#[test]
fn test_interning() -> Result<()> {
    let mut store = Store::default();
    let a = store.intern_type(&FuncType::new(&[I32], &[I64]));
    let b = store.intern_type(&FuncType::new(&[I32], &[I64]));
    let c = store.intern_type(&FuncType::new(&[I64], &[I32]));

    assert_eq!(a, b);
    assert_ne!(a, c);
    assert_eq!(store.resolve_type(c)?, &FuncType::new(&[I64], &[I32]));

    // ids only resolve in the store that interned them
    let other = Store::default();
    assert!(matches!(other.resolve_type(c), Err(Error::InvalidStore)));
    Ok(())
}

#[test]
fn test_active_data_segment() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.memory(1, None);
    builder.active_data(4, b"abc");

    let mut store = Store::default();
    let instance = store.instantiate(&builder.build())?;
    let memory = instance.memory(&store)?;

    assert_eq!(memory.load(4, 3)?, b"abc");
    assert!(memory.data()[..4].iter().all(|b| *b == 0));
    assert!(memory.data()[7..].iter().all(|b| *b == 0));
    Ok(())
}

#[test]
fn test_exported_global() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    let g = builder.global(I32, false, ConstExpr::i32(41));
    builder.export("g", ExternalKind::Global, g);

    let mut store = Store::default();
    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.exported_global(&store, "g")?, WasmValue::I32(41));

    // immutable
    assert!(instance.set_exported_global(&mut store, "g", WasmValue::I32(0)).is_err());
    Ok(())
}

#[test]
fn test_global_initializers_see_imported_globals() -> Result<()> {
    let mut store = Store::default();
    store.define("env", "base", Extern::global(WasmValue::I64(1 << 33), false))?;

    let mut builder = ModuleBuilder::new();
    builder.import("env", "base", regwasm::types::ImportKind::Global(regwasm::types::GlobalType::new(I64, false)));
    let copy = builder.global(I64, false, ConstExpr::global_get(0));
    builder.export("copy", ExternalKind::Global, copy);

    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.exported_global(&store, "copy")?, WasmValue::I64(1 << 33));
    Ok(())
}

#[test]
fn test_element_segment_out_of_bounds() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.table(ValType::RefFunc, 2, None);
    let func = builder.func(&[], &[], &[], &[]);
    builder.active_elements(0, 1, &[func, func]);

    let mut store = Store::default();
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Instantiation(InstantiationError::TableOutOfBounds { segment: 0 })), "{err:?}");
    Ok(())
}

#[test]
fn test_data_segment_out_of_bounds() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.memory(1, None);
    builder.active_data(0, b"ok");
    builder.active_data(65535, b"no");

    let mut store = Store::default();
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Instantiation(InstantiationError::MemoryOutOfBounds { segment: 1 })), "{err:?}");
    Ok(())
}

#[test]
fn test_invalid_const_expr() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.global(I32, false, ConstExpr(Box::new([I32Const(1), I32Const(2), Binary(regwasm::types::BinaryOp::I32Add), End])));

    let mut store = Store::default();
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Instantiation(InstantiationError::InvalidConstExpr(_))), "{err:?}");
    Ok(())
}

#[test]
fn test_duplicate_export() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    let func = builder.func(&[], &[], &[], &[]);
    builder.export_func("f", func).export_func("f", func);

    let mut store = Store::default();
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Instantiation(InstantiationError::DuplicateExport(ref name)) if name == "f"), "{err:?}");
    Ok(())
}

#[test]
fn test_start_function() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    let g = builder.global(I32, true, ConstExpr::i32(0));
    let start = builder.func(&[], &[], &[], &[I32Const(5), GlobalSet(g)]);
    builder.start(start);
    builder.export("g", ExternalKind::Global, g);

    let mut store = Store::default();
    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.exported_global(&store, "g")?, WasmValue::I32(5));
    Ok(())
}

#[test]
fn test_start_trap_is_not_rolled_back() -> Result<()> {
    let mut store = Store::default();
    let ExternVal::Memory(memory) = store.define("env", "memory", Extern::memory(MemoryType::new(1, None)))? else {
        unreachable!()
    };

    let mut builder = ModuleBuilder::new();
    builder.import("env", "memory", regwasm::types::ImportKind::Memory(MemoryType::new(1, None)));
    builder.active_data(0, b"data");
    let start = builder.func(
        &[],
        &[],
        &[],
        &[I32Const(8), I32Const(7), Instruction::Store(StoreOp::I32Store8, MemArg::default()), Unreachable],
    );
    builder.start(start);

    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Trap(Trap::Unreachable)), "{err:?}");

    let memory = store.memory(memory)?;
    assert_eq!(memory.load(0, 4)?, b"data");
    assert_eq!(memory.load(8, 1)?, &[7]);
    Ok(())
}

struct MaxBytes(usize);

impl ResourceLimiter for MaxBytes {
    fn limit_memory_growth(&self, desired: usize) -> bool {
        desired <= self.0
    }
}

#[test]
fn test_resource_limiter() -> Result<()> {
    let mut store = Store::default();
    store.set_limiter(MaxBytes(2 * regwasm::types::PAGE_SIZE));

    let mut builder = ModuleBuilder::new();
    builder.memory(3, None);
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Instantiation(InstantiationError::ResourceLimitExceeded)), "{err:?}");

    let mut builder = ModuleBuilder::new();
    builder.memory(1, None);
    let grow = builder.func(&[I32], &[I32], &[], &[LocalGet(0), MemoryGrow]);
    builder.export_func("grow", grow);

    let instance = store.instantiate(&builder.build())?;
    let grow = instance.typed_func::<i32, i32>(&store, "grow")?;
    assert_eq!(grow.call(&mut store, 2)?, -1);
    assert_eq!(grow.call(&mut store, 1)?, 1);
    assert_eq!(grow.call(&mut store, 1)?, -1);
    Ok(())
}

#[test]
fn test_archive_round_trip() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    let func = builder.func(&[I32], &[I32], &[], &[LocalGet(0), I32Const(1), Binary(regwasm::types::BinaryOp::I32Add)]);
    builder.export_func("inc", func);
    let description = builder.description();

    let bytes = description.serialize_archive()?;
    let module = Module::from_archive(&bytes)?;
    assert_eq!(module.description(), &description);

    let mut store = Store::default();
    let instance = store.instantiate(&module)?;
    assert_eq!(instance.typed_func::<i32, i32>(&store, "inc")?.call(&mut store, 41)?, 42);

    assert!(Module::from_archive(&bytes[1..]).is_err());
    Ok(())
}

#[test]
fn test_exports_are_registered_by_name() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    let func = builder.func(&[], &[I32], &[], &[I32Const(3)]);
    builder.export_func("three", func);

    let mut store = Store::default();
    let instance = store.instantiate(&builder.build())?;
    store.register_instance("numbers", &instance)?;

    let Some(ExternVal::Func(func)) = store.resolve(&ExternName::new("numbers", "three")) else {
        panic!("export was not registered");
    };
    assert_eq!(store.func_type(func)?, &FuncType::new(&[], &[I32]));
    assert!(matches!(instance.export(&store, "missing"), Err(Error::ExportNotFound(_))));
    Ok(())
}
