use eyre::Result;
use regwasm::types::Instruction::*;
use regwasm::types::{BinaryOp, Export, ExternalKind, FuncType, Function, ValType, WasmModule};
use regwasm::{Module, Store};

/// `(func (export "add") (param i32 i32) (result i32) local.get 0 local.get 1 i32.add)`
fn add_module() -> WasmModule {
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

fn main() -> Result<()> {
    pretty_env_logger::init();

    let module = Module::from(add_module());
    let mut store = Store::default();
    let instance = store.instantiate(&module)?;

    let add = instance.typed_func::<(i32, i32), i32>(&store, "add")?;
    println!("1 + 2 = {}", add.call(&mut store, (1, 2))?);

    // module descriptions can be archived and loaded again without rebuilding them
    let bytes = module.description().serialize_archive()?;
    let module = Module::from_archive(&bytes)?;
    let instance = store.instantiate(&module)?;
    let add = instance.typed_func::<(i32, i32), i32>(&store, "add")?;
    println!("archived module ({} bytes): 40 + 2 = {}", bytes.len(), add.call(&mut store, (40, 2))?);

    Ok(())
}
