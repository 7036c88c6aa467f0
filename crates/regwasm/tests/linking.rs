mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::ModuleBuilder;
use eyre::Result;
use regwasm::types::Instruction::*;
use regwasm::types::ValType::{I32, I64};
use regwasm::types::{
    BinaryOp, ConstExpr, ExternalKind, FuncType, GlobalType, ImportKind, Instruction, LoadOp, MemArg, MemoryType, StoreOp,
    TableType, ValType,
};
use regwasm::{Caller, Config, Error, Extern, ExternVal, Function, Interceptor, LinkingError, Store, Trap, WasmValue};

#[test]
fn test_host_function() -> Result<()> {
    let log = Rc::new(RefCell::new(Vec::new()));

    let mut store = Store::default();
    let sink = log.clone();
    store.define(
        "env",
        "log",
        Extern::typed_func(move |_: Caller<'_>, value: i32| {
            sink.borrow_mut().push(value);
            Ok(())
        }),
    )?;
    store.define("env", "add", Extern::typed_func(|_: Caller<'_>, (a, b): (i64, i64)| Ok(a + b)))?;

    let mut builder = ModuleBuilder::new();
    let log_fn = builder.import_func("env", "log", &[I32], &[]);
    let add_fn = builder.import_func("env", "add", &[I64, I64], &[I64]);
    let run = builder.func(
        &[],
        &[I64],
        &[],
        &[I32Const(1), Call(log_fn), I32Const(2), Call(log_fn), I64Const(40), I64Const(2), Call(add_fn)],
    );
    builder.export_func("run", run);

    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.invoke(&mut store, "run", &[])?, [WasmValue::I64(42)]);
    assert_eq!(*log.borrow(), [1, 2]);
    Ok(())
}

#[test]
fn test_host_writes_guest_memory() -> Result<()> {
    let mut store = Store::default();
    store.define(
        "env",
        "fill",
        Extern::typed_func(|mut caller: Caller<'_>, (addr, len): (i32, i32)| {
            assert!(caller.instance().is_some());
            caller.write_memory(addr as usize, &vec![0xab; len as usize])?;
            Ok(caller.read_memory(addr as usize, 1)?[0] as i32)
        }),
    )?;

    let mut builder = ModuleBuilder::new();
    let fill = builder.import_func("env", "fill", &[I32, I32], &[I32]);
    builder.memory(1, None);
    let run = builder.func(
        &[],
        &[I32],
        &[],
        &[
            I32Const(16),
            I32Const(4),
            Call(fill),
            Drop,
            I32Const(16),
            Load(LoadOp::I32Load, MemArg::default()),
        ],
    );
    builder.export_func("run", run);

    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.invoke(&mut store, "run", &[])?, [WasmValue::I32(0xabababab_u32 as i32)]);
    Ok(())
}

#[test]
fn test_host_function_called_directly() -> Result<()> {
    let mut store = Store::default();
    store.define(
        "env",
        "double",
        Extern::typed_func(|caller: Caller<'_>, v: i32| {
            assert!(caller.instance().is_none());
            Ok(v * 2)
        }),
    )?;

    let mut builder = ModuleBuilder::new();
    let double = builder.import_func("env", "double", &[I32], &[I32]);
    builder.export_func("double", double);

    let instance = store.instantiate(&builder.build())?;
    assert_eq!(instance.typed_func::<i32, i32>(&store, "double")?.call(&mut store, 21)?, 42);
    Ok(())
}

/// `f` calls the host function `env.back`, which invokes `f` again.
fn reentrant_module() -> regwasm::Module {
    let mut builder = ModuleBuilder::new();
    let back = builder.import_func("env", "back", &[], &[]);
    let f = builder.func(&[], &[], &[], &[Call(back)]);
    let one = builder.func(&[], &[I32], &[], &[I32Const(1)]);
    builder.export_func("f", f).export_func("one", one);
    builder.build()
}

fn define_reentry(store: &mut Store, calls: Rc<RefCell<usize>>) -> Result<()> {
    store.define(
        "env",
        "back",
        Extern::typed_func(move |mut caller: Caller<'_>, ()| -> regwasm::Result<()> {
            *calls.borrow_mut() += 1;
            let instance = caller.instance().ok_or_else(|| Error::Other("called without an instance".into()))?;
            instance.invoke(caller.store_mut(), "f", &[])?;
            Ok(())
        }),
    )?;
    Ok(())
}

#[test]
fn test_host_reentry_depth() -> Result<()> {
    let calls = Rc::new(RefCell::new(0));
    let mut store = Store::with_config(Config::new().with_invocation_depth(4));
    define_reentry(&mut store, calls.clone())?;

    let instance = store.instantiate(&reentrant_module())?;
    let err = instance.invoke(&mut store, "f", &[]).unwrap_err();
    assert!(matches!(err, Error::Trap(Trap::CallStackExhausted)), "{err:?}");
    assert_eq!(*calls.borrow(), 4);

    // every unwound invocation was released again
    assert_eq!(instance.invoke(&mut store, "one", &[])?, [WasmValue::I32(1)]);
    Ok(())
}

#[test]
fn test_host_reentry_default_depth() -> Result<()> {
    // the stack size of a main thread
    let thread = std::thread::Builder::new().stack_size(8 << 20).spawn(|| -> Result<usize> {
        let calls = Rc::new(RefCell::new(0));
        let mut store = Store::default();
        define_reentry(&mut store, calls.clone())?;

        let instance = store.instantiate(&reentrant_module())?;
        let err = instance.invoke(&mut store, "f", &[]).unwrap_err();
        assert!(matches!(err, Error::Trap(Trap::CallStackExhausted)), "{err:?}");
        assert_eq!(instance.invoke(&mut store, "one", &[])?, [WasmValue::I32(1)]);

        let calls = *calls.borrow();
        Ok(calls)
    })?;

    let calls = thread.join().map_err(|_| eyre::eyre!("reentering thread panicked"))??;
    assert_eq!(calls, Config::default().invocation_depth());
    Ok(())
}

struct CallRecorder(Rc<RefCell<Vec<String>>>);

impl Interceptor for CallRecorder {
    fn on_enter_function(&self, store: &Store, func: Function) {
        self.0.borrow_mut().push(format!("> {}", store.symbolicate(func)));
    }

    fn on_exit_function(&self, store: &Store, func: Function) {
        self.0.borrow_mut().push(format!("< {}", store.symbolicate(func)));
    }
}

#[test]
fn test_interceptor_nesting() -> Result<()> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let mut store = Store::default();
    store.define("env", "tick", Extern::typed_func(|_: Caller<'_>, ()| Ok(())))?;
    store.set_interceptor(CallRecorder(events.clone()));

    let mut builder = ModuleBuilder::new();
    let tick = builder.import_func("env", "tick", &[], &[]);
    let table = builder.table(ValType::RefFunc, 1, None);
    let ty = builder.ty(&[], &[I32]);
    let leaf = builder.func(&[], &[I32], &[], &[I32Const(1)]);
    let inner = builder.func(&[], &[], &[], &[I32Const(0), CallIndirect(ty, table), Drop, Call(tick)]);
    let run = builder.func(&[], &[], &[], &[Call(inner), Call(leaf), Drop]);
    builder.active_elements(table, 0, &[leaf]);
    builder.name(leaf, "leaf").name(inner, "inner").name(run, "run").export_func("run", run);

    let instance = store.instantiate(&builder.build())?;
    instance.invoke(&mut store, "run", &[])?;
    assert_eq!(
        *events.borrow(),
        [
            "> run", "> inner", "> leaf", "< leaf", "> env.tick", "< env.tick", "< inner", "> leaf", "< leaf", "< run"
        ]
    );

    store.clear_interceptor();
    instance.invoke(&mut store, "run", &[])?;
    assert_eq!(events.borrow().len(), 10);
    Ok(())
}

#[test]
fn test_import_from_another_store() -> Result<()> {
    let mut other = Store::default();
    let foreign_global = other.define("env", "g", Extern::global(WasmValue::I32(1), true))?;
    let foreign_func = other.define("env", "f", Extern::typed_func(|_: Caller<'_>, ()| Ok(())))?;

    // the same entities exist in this store, at the same positions
    let mut store = Store::default();
    store.define("env", "g", Extern::global(WasmValue::I32(2), true))?;
    store.define("env", "f", Extern::typed_func(|_: Caller<'_>, ()| Ok(())))?;

    let mut builder = ModuleBuilder::new();
    builder.import("env", "g", ImportKind::Global(GlobalType::new(I32, true)));
    let err = store.instantiate_with(&builder.build(), &[foreign_global]).unwrap_err();
    assert!(matches!(err, Error::InvalidStore), "{err:?}");

    let mut builder = ModuleBuilder::new();
    builder.import_func("env", "f", &[], &[]);
    let err = store.instantiate_with(&builder.build(), &[foreign_func]).unwrap_err();
    assert!(matches!(err, Error::InvalidStore), "{err:?}");

    let ExternVal::Global(global) = foreign_global else { unreachable!() };
    assert!(matches!(store.global(global), Err(Error::InvalidStore)));
    assert_eq!(other.global(global)?.get(), WasmValue::I32(1));
    Ok(())
}

#[test]
fn test_host_result_mismatch() -> Result<()> {
    let mut store = Store::default();
    let ty = FuncType::new(&[], &[I32]);
    store.define("env", "bad", Extern::func(&ty, |_, _| Ok(vec![WasmValue::I64(1)])))?;

    let mut builder = ModuleBuilder::new();
    let bad = builder.import_func("env", "bad", &[], &[I32]);
    let run = builder.func(&[], &[I32], &[], &[Call(bad)]);
    builder.export_func("run", run);

    let instance = store.instantiate(&builder.build())?;
    let err = instance.invoke(&mut store, "run", &[]).unwrap_err();
    assert!(matches!(err, Error::Trap(Trap::ResultTypesMismatch)), "{err:?}");
    Ok(())
}

#[test]
fn test_host_exit() -> Result<()> {
    let mut store = Store::default();
    store.define(
        "wasi",
        "proc_exit",
        Extern::typed_func(|_: Caller<'_>, code: i32| -> regwasm::Result<()> { Err(Trap::Exit(code).into()) }),
    )?;

    let mut builder = ModuleBuilder::new();
    let exit = builder.import_func("wasi", "proc_exit", &[I32], &[]);
    let run = builder.func(&[], &[], &[], &[I32Const(3), Call(exit), Unreachable]);
    builder.export_func("run", run);

    let instance = store.instantiate(&builder.build())?;
    let err = instance.invoke(&mut store, "run", &[]).unwrap_err();
    assert!(matches!(err, Error::Trap(Trap::Exit(3))), "{err:?}");
    Ok(())
}

#[test]
fn test_unknown_import() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.import_func("env", "missing", &[], &[]);

    let mut store = Store::default();
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Linker(LinkingError::UnknownImport { .. })), "{err:?}");
    Ok(())
}

#[test]
fn test_incompatible_import_type() -> Result<()> {
    let mut store = Store::default();
    let called = Rc::new(RefCell::new(false));
    let flag = called.clone();
    store.define(
        "env",
        "f",
        Extern::typed_func(move |_: Caller<'_>, _: i64| {
            *flag.borrow_mut() = true;
            Ok(())
        }),
    )?;
    store.define("env", "g", Extern::global(WasmValue::I32(0), true))?;

    let mut builder = ModuleBuilder::new();
    let f = builder.import_func("env", "f", &[I32], &[]);
    let start = builder.func(&[], &[], &[], &[I32Const(0), Call(f)]);
    builder.start(start);
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Linker(LinkingError::IncompatibleImportType { .. })), "{err:?}");
    assert!(!*called.borrow());

    // wrong mutability
    let mut builder = ModuleBuilder::new();
    builder.import("env", "g", ImportKind::Global(GlobalType::new(I32, false)));
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Linker(LinkingError::IncompatibleImportType { .. })), "{err:?}");

    // wrong kind
    let mut builder = ModuleBuilder::new();
    builder.import("env", "g", ImportKind::Memory(MemoryType::new(1, None)));
    let err = store.instantiate(&builder.build()).unwrap_err();
    assert!(matches!(err, Error::Linker(LinkingError::IncompatibleImportType { .. })), "{err:?}");
    Ok(())
}

#[test]
fn test_import_limits() -> Result<()> {
    let mut store = Store::default();
    let table = TableType::new(ValType::RefFunc, 2, Some(4));
    store.define("env", "table", Extern::table(table, WasmValue::RefNull(ValType::RefFunc)))?;

    let import = |initial, max| {
        let mut builder = ModuleBuilder::new();
        builder.import("env", "table", ImportKind::Table(TableType::new(ValType::RefFunc, initial, max)));
        builder.build()
    };

    assert!(store.instantiate(&import(1, None)).is_ok());
    assert!(store.instantiate(&import(2, Some(4))).is_ok());
    assert!(store.instantiate(&import(3, None)).is_err());
    assert!(store.instantiate(&import(1, Some(3))).is_err());
    Ok(())
}

#[test]
fn test_import_count_mismatch() -> Result<()> {
    let mut builder = ModuleBuilder::new();
    builder.import_func("env", "f", &[], &[]);

    let mut store = Store::default();
    let err = store.instantiate_with(&builder.build(), &[]).unwrap_err();
    assert!(matches!(err, Error::Linker(LinkingError::ImportCountMismatch { expected: 1, actual: 0 })), "{err:?}");
    Ok(())
}

#[test]
fn test_instantiate_with_explicit_imports() -> Result<()> {
    let mut store = Store::default();
    let counter = store.define("host", "counter", Extern::global(WasmValue::I32(10), true))?;

    let mut builder = ModuleBuilder::new();
    let g = builder.import("anything", "at-all", ImportKind::Global(GlobalType::new(I32, true)));
    let bump = builder.func(&[], &[], &[], &[GlobalGet(g), I32Const(1), Binary(BinaryOp::I32Add), GlobalSet(g)]);
    builder.export_func("bump", bump);

    let module = builder.build();
    let a = store.instantiate_with(&module, &[counter])?;
    let b = store.instantiate_with(&module, &[counter])?;
    a.invoke(&mut store, "bump", &[])?;
    b.invoke(&mut store, "bump", &[])?;

    let ExternVal::Global(counter) = counter else { unreachable!() };
    assert_eq!(store.global(counter)?.get(), WasmValue::I32(12));
    Ok(())
}

#[test]
fn test_linking_guest_instances() -> Result<()> {
    let mut store = Store::default();

    // a library exporting its memory and a function operating on it
    let mut lib = ModuleBuilder::new();
    let memory = lib.memory(1, None);
    lib.active_data(0, &[5, 0, 0, 0]);
    let get = lib.func(&[], &[I32], &[], &[I32Const(0), Load(LoadOp::I32Load, MemArg::default())]);
    lib.export("memory", ExternalKind::Memory, memory).export_func("get", get);
    let lib = store.instantiate(&lib.build())?;
    store.register_instance("lib", &lib)?;

    // a client importing both and writing through the shared memory
    let mut client = ModuleBuilder::new();
    let get = client.import_func("lib", "get", &[], &[I32]);
    client.import("lib", "memory", ImportKind::Memory(MemoryType::new(1, None)));
    let run = client.func(
        &[],
        &[I32],
        &[],
        &[
            I32Const(0),
            I32Const(37),
            Instruction::Store(StoreOp::I32Store, MemArg::default()),
            Call(get),
            I32Const(5),
            Binary(BinaryOp::I32Add),
        ],
    );
    client.export_func("run", run);
    let client = store.instantiate(&client.build())?;

    assert_eq!(client.invoke(&mut store, "run", &[])?, [WasmValue::I32(42)]);
    assert_eq!(lib.memory(&store)?.load(0, 1)?, &[37]);
    Ok(())
}

#[test]
fn test_cross_instance_call_indirect() -> Result<()> {
    let mut store = Store::default();
    let table = TableType::new(ValType::RefFunc, 1, None);
    store.define("env", "table", Extern::table(table, WasmValue::RefNull(ValType::RefFunc)))?;

    // the provider stores its function into the shared table; the function reads its own global
    let mut provider = ModuleBuilder::new();
    provider.import("env", "table", ImportKind::Table(TableType::new(ValType::RefFunc, 1, None)));
    let g = provider.global(I32, false, ConstExpr::i32(7));
    let read = provider.func(&[], &[I32], &[], &[GlobalGet(g)]);
    provider.active_elements(0, 0, &[read]);
    store.instantiate(&provider.build())?;

    let mut consumer = ModuleBuilder::new();
    consumer.import("env", "table", ImportKind::Table(TableType::new(ValType::RefFunc, 1, None)));
    let g = consumer.global(I32, false, ConstExpr::i32(100));
    let ty = consumer.ty(&[], &[I32]);
    let body = [I32Const(0), CallIndirect(ty, 0), GlobalGet(g), Binary(BinaryOp::I32Add)];
    let run = consumer.func(&[], &[I32], &[], &body);
    consumer.export_func("run", run);
    let consumer = store.instantiate(&consumer.build())?;

    assert_eq!(consumer.invoke(&mut store, "run", &[])?, [WasmValue::I32(107)]);
    Ok(())
}
