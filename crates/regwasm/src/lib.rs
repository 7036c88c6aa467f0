#![no_std]
#![forbid(unsafe_code)]
#![doc(test(
    no_crate_inject,
    attr(deny(warnings, rust_2018_idioms), allow(dead_code, unused_assignments, unused_variables))
))]
#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

//! A WebAssembly interpreter built around a register-addressed internal encoding.
//!
//! ## Features
//! - **`std`**\
//!   Enables the use of `std`. Without it the crate is `no_std` + `alloc` and uses `libm` for float rounding. This is enabled by default.
//! - **`log`**\
//!   Enables logging using the `log` crate. This is enabled by default.
//! - **`archive`**\
//!   Enables reading and writing archived module descriptions. This is enabled by default.
//!
//! ## Getting started
//!
//! regwasm does not decode the WebAssembly binary format itself. It consumes an already validated
//! [`WasmModule`](regwasm_types::WasmModule) description, instantiates it in a [`Store`] and runs
//! its functions.
//!
//! ```rust
//! use regwasm::{Module, Store};
//! use regwasm::types::{Export, ExternalKind, FuncType, Function, Instruction, ValType, WasmModule, BinaryOp};
//!
//! let module = Module::from(WasmModule {
//!     types: Box::new([FuncType::new(&[ValType::I32, ValType::I32], &[ValType::I32])]),
//!     funcs: Box::new([Function {
//!         ty: 0,
//!         locals: Box::new([]),
//!         body: [
//!             Instruction::LocalGet(0),
//!             Instruction::LocalGet(1),
//!             Instruction::Binary(BinaryOp::I32Add),
//!             Instruction::End,
//!         ]
//!         .into(),
//!     }]),
//!     exports: Box::new([Export { name: "add".into(), kind: ExternalKind::Func, index: 0 }]),
//!     ..Default::default()
//! });
//!
//! let mut store = Store::default();
//! let instance = store.instantiate(&module)?;
//! let add = instance.typed_func::<(i32, i32), i32>(&store, "add")?;
//! assert_eq!(add.call(&mut store, (1, 2))?, 3);
//! # Ok::<(), regwasm::Error>(())
//! ```
//!
//! ## Architecture
//!
//! All runtime entities (functions, tables, memories, globals, segments, instances) live in
//! per-kind arenas owned by the [`Store`] and are referred to by typed [`Handle`]s. A function
//! body is lowered into the internal encoding the first time it is called; the interpreter then
//! executes it on a fixed-size register file shared by all frames of one invocation.

#[cfg(feature = "std")]
extern crate std;
extern crate alloc;

// log for logging (optional).
#[cfg(feature = "log")]
#[allow(clippy::single_component_path_imports, unused_imports)]
use log;

// noop fallback if logging is disabled.
#[cfg(not(feature = "log"))]
#[allow(unused_imports, unused_macros)]
pub(crate) mod log {
    macro_rules! trace    ( ($($tt:tt)*) => {{}} );
    macro_rules! debug    ( ($($tt:tt)*) => {{}} );
    macro_rules! info    ( ($($tt:tt)*) => {{}} );
    macro_rules! warn    ( ($($tt:tt)*) => {{}} );
    macro_rules! error    ( ($($tt:tt)*) => {{}} );
    pub(crate) use trace;
    pub(crate) use debug;
    pub(crate) use info;
    pub(crate) use warn;
    pub(crate) use error;
}

mod error;
pub use error::*;

mod arena;
pub use arena::Handle;

mod interner;
pub use interner::{FuncTypeId, Interned, Interner};

mod config;
pub use config::{Config, ResourceLimiter};

mod interceptor;
pub use interceptor::Interceptor;

mod value;
pub use value::WasmValue;

mod module;
pub use module::Module;

mod imports;
pub use imports::*;

mod func;
pub use func::{Caller, FromWasmValueTuple, FuncHandle, IntoWasmValueTuple, TypedFuncHandle, ValTypesFromTuple};

mod instance;
pub use instance::ModuleInstance;

mod store;
pub use store::*;

mod const_eval;
mod instantiate;
mod translator;

mod interpreter;

/// Re-export of [`regwasm_types`].
pub mod types {
    pub use regwasm_types::*;
}

#[cold]
pub(crate) fn cold() {}

pub(crate) fn unlikely(b: bool) -> bool {
    if b {
        cold();
    };
    b
}
