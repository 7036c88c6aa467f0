use eyre::Result;
use regwasm::types::Instruction::*;
use regwasm::types::{
    ConstExpr, Data, DataKind, Export, ExternalKind, FuncType, Function, Import, ImportKind, MemoryType, ValType,
    WasmModule,
};
use regwasm::{Caller, Extern, Module, Store, Trap};

/// Calls `env.print(ptr, len)` on a greeting stored in its memory, then exits with code 7.
fn greeter_module() -> WasmModule {
    let greeting = b"hello from wasm";

    WasmModule {
        types: [FuncType::new(&[ValType::I32, ValType::I32], &[]), FuncType::new(&[ValType::I32], &[]), FuncType::default()]
            .into(),
        imports: [
            Import { module: "env".into(), name: "print".into(), kind: ImportKind::Function(0) },
            Import { module: "env".into(), name: "exit".into(), kind: ImportKind::Function(1) },
        ]
        .into(),
        funcs: [Function {
            ty: 2,
            locals: Box::default(),
            body: [I32Const(8), I32Const(greeting.len() as i32), Call(0), I32Const(7), Call(1), Unreachable, End].into(),
        }]
        .into(),
        memories: [MemoryType::new(1, None)].into(),
        data: [Data { kind: DataKind::Active { mem: 0, offset: ConstExpr::i32(8) }, data: greeting.as_slice().into() }]
            .into(),
        exports: [Export { name: "run".into(), kind: ExternalKind::Func, index: 2 }].into(),
        ..Default::default()
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let mut store = Store::default();
    store.define(
        "env",
        "print",
        Extern::typed_func(|caller: Caller<'_>, (ptr, len): (i32, i32)| {
            let bytes = caller.read_memory(ptr as usize, len as usize)?;
            println!("guest says: {}", String::from_utf8_lossy(&bytes));
            Ok(())
        }),
    )?;
    store.define("env", "exit", Extern::typed_func(|_: Caller<'_>, code: i32| -> regwasm::Result<()> {
        Err(Trap::Exit(code).into())
    }))?;

    let instance = store.instantiate(&Module::from(greeter_module()))?;
    match instance.invoke(&mut store, "run", &[]) {
        Err(regwasm::Error::Trap(Trap::Exit(code))) => println!("guest exited with code {code}"),
        other => eyre::bail!("expected the guest to exit, got {other:?}"),
    }

    Ok(())
}
