use eyre::Result;
use regwasm::types::Instruction::*;
use regwasm::types::{BinaryOp, Export, ExternalKind, FuncType, Function, Import, ImportKind, ValType, WasmModule};
use regwasm::{Module, Store};

/// Exports `add(i32, i32) -> i32`.
fn adder() -> WasmModule {
    WasmModule {
        types: [FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32])].into(),
        funcs: [Function {
            ty: 0,
            locals: Box::default(),
            body: [LocalGet(0), LocalGet(1), Binary(BinaryOp::I32Add), End].into(),
        }]
        .into(),
        exports: [Export { name: "add".into(), kind: ExternalKind::Func, index: 0 }].into(),
        ..Default::default()
    }
}

/// Imports `adder.add` and exports `main() -> i32` computing `add(1, 2)`.
fn client() -> WasmModule {
    WasmModule {
        types: [FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32]), FuncType::new(&[], &[ValType::I32])]
            .into(),
        imports: [Import { module: "adder".into(), name: "add".into(), kind: ImportKind::Function(0) }].into(),
        funcs: [Function { ty: 1, locals: Box::default(), body: [I32Const(1), I32Const(2), Call(0), End].into() }]
            .into(),
        exports: [Export { name: "main".into(), kind: ExternalKind::Func, index: 1 }].into(),
        ..Default::default()
    }
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    let mut store = Store::default();
    let adder = store.instantiate(&Module::from(adder()))?;
    store.register_instance("adder", &adder)?;

    let client = store.instantiate(&Module::from(client()))?;
    let main = client.typed_func::<(), i32>(&store, "main")?;
    assert_eq!(main.call(&mut store, ())?, 3);
    println!("adder.add(1, 2) = 3, called through the client instance");

    Ok(())
}
