use criterion::{Criterion, criterion_group, criterion_main};
use regwasm::types::Instruction::*;
use regwasm::types::{BinaryOp, BlockType, Export, ExternalKind, FuncType, Function, UnaryOp, ValType, WasmModule};
use regwasm::{Module, ModuleInstance, Store};
use std::hint::black_box;

fn fibonacci_module() -> Module {
    use ValType::I32;

    let iterative = [
        // locals: 1 = last, 2 = current, 3 = next
        I32Const(1),
        LocalSet(2),
        Block(BlockType::Empty),
        Loop(BlockType::Empty),
        LocalGet(0),
        Unary(UnaryOp::I32Eqz),
        BrIf(1),
        LocalGet(1),
        LocalGet(2),
        Binary(BinaryOp::I32Add),
        LocalSet(3),
        LocalGet(2),
        LocalSet(1),
        LocalGet(3),
        LocalSet(2),
        LocalGet(0),
        I32Const(1),
        Binary(BinaryOp::I32Sub),
        LocalSet(0),
        Br(0),
        End,
        End,
        LocalGet(1),
        End,
    ];

    let recursive = [
        LocalGet(0),
        I32Const(2),
        Binary(BinaryOp::I32LtS),
        If(BlockType::Value(I32)),
        LocalGet(0),
        Else,
        LocalGet(0),
        I32Const(1),
        Binary(BinaryOp::I32Sub),
        Call(1),
        LocalGet(0),
        I32Const(2),
        Binary(BinaryOp::I32Sub),
        Call(1),
        Binary(BinaryOp::I32Add),
        End,
        End,
    ];

    Module::from(WasmModule {
        types: [FuncType::new(&[I32], &[I32])].into(),
        funcs: [
            Function { ty: 0, locals: [I32, I32, I32].into(), body: iterative.into() },
            Function { ty: 0, locals: Box::default(), body: recursive.into() },
        ]
        .into(),
        exports: [
            Export { name: "fibonacci".into(), kind: ExternalKind::Func, index: 0 },
            Export { name: "fibonacci_recursive".into(), kind: ExternalKind::Func, index: 1 },
        ]
        .into(),
        ..Default::default()
    })
}

fn run_regwasm(store: &mut Store, instance: &ModuleInstance, iterations: i32, name: &str) {
    let fib = instance.typed_func::<i32, i32>(store, name).expect("typed_func");
    fib.call(store, iterations).expect("call");
}

fn run_native(n: i32) -> i32 {
    let mut last = 0;
    let mut curr = 1;
    for _ in 0..n {
        let next = last + curr;
        last = curr;
        curr = next;
    }
    last
}

fn run_native_recursive(n: i32) -> i32 {
    if n < 2 {
        return n;
    }
    run_native_recursive(n - 1) + run_native_recursive(n - 2)
}

fn criterion_benchmark(c: &mut Criterion) {
    let module = fibonacci_module();
    let mut store = Store::default();
    let instance = store.instantiate(&module).expect("instantiate");

    {
        let mut group = c.benchmark_group("fibonacci");
        group.bench_function("native", |b| b.iter(|| run_native(black_box(40))));
        group.bench_function("regwasm", |b| b.iter(|| run_regwasm(&mut store, &instance, black_box(40), "fibonacci")));
    }

    {
        let mut group = c.benchmark_group("fibonacci-recursive");
        group.measurement_time(std::time::Duration::from_secs(5));
        group.bench_function("native", |b| b.iter(|| run_native_recursive(black_box(26))));
        group.bench_function("regwasm", |b| {
            b.iter(|| run_regwasm(&mut store, &instance, black_box(26), "fibonacci_recursive"))
        });
    }

    {
        // instantiation plus the first call, which includes translating the function
        let mut group = c.benchmark_group("fibonacci-cold");
        group.bench_function("regwasm", |b| {
            b.iter(|| {
                let mut store = Store::default();
                let instance = store.instantiate(&module).expect("instantiate");
                run_regwasm(&mut store, &instance, black_box(20), "fibonacci")
            })
        });
    }
}

criterion_group!(
    name = benches;
    config = Criterion::default().significance_level(0.1);
    targets = criterion_benchmark
);
criterion_main!(benches);
